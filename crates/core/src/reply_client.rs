use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use little_chat_reply::{ErrorKind, ReplySource, ReplySourceError};
use tracing::Instrument;

pub(crate) type ReplyResult = Result<String, ReplyFailure>;
pub(crate) type BoxedReplyFuture =
    Pin<Box<dyn Future<Output = ReplyResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(String, Option<Duration>) -> BoxedReplyFuture + Send + Sync>;

/// Why a reply could not be obtained.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ReplyFailure {
    #[error("{0}")]
    Source(Box<dyn ReplySourceError>),
    #[error("no reply within {0:?}")]
    TimedOut(Duration),
}

impl ReplyFailure {
    #[inline]
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            ReplyFailure::Source(err) => err.kind(),
            ReplyFailure::TimedOut(_) => ErrorKind::TimedOut,
        }
    }
}

/// A wrapper around a reply source that applies the request policy and
/// provides a type-erased interface for the controller.
#[derive(Clone)]
pub(crate) struct ReplyClient {
    handler_fn: HandlerFn,
}

impl ReplyClient {
    pub(crate) fn new<S: ReplySource + 'static>(source: S) -> Self {
        // Erase `S` so the controller state doesn't need a generic
        // parameter.
        let handler_fn: HandlerFn = Arc::new(
            move |prompt: String,
                  timeout: Option<Duration>|
                  -> BoxedReplyFuture {
                let fut = source.get_reply(&prompt);
                Box::pin(
                    async move {
                        trace!("requesting a reply for {} bytes", prompt.len());
                        let res = match timeout {
                            Some(limit) => {
                                match tokio::time::timeout(limit, fut).await {
                                    Ok(res) => res.map_err(boxed),
                                    Err(_) => {
                                        Err(ReplyFailure::TimedOut(limit))
                                    }
                                }
                            }
                            None => fut.await.map_err(boxed),
                        };
                        match &res {
                            Ok(reply) => trace!("got {} bytes", reply.len()),
                            Err(err) => {
                                error!("reply failed ({}): {err}", err.kind());
                            }
                        }
                        res
                    }
                    .instrument(trace_span!("reply request")),
                )
            });
        Self { handler_fn }
    }

    /// Requests a reply for the prompt, giving up after `timeout`.
    ///
    /// The returned future owns everything it needs and can be moved to
    /// another task.
    #[inline]
    pub(crate) fn get_reply(
        &self,
        prompt: String,
        timeout: Option<Duration>,
    ) -> BoxedReplyFuture {
        (self.handler_fn)(prompt, timeout)
    }
}

#[inline]
fn boxed<E: ReplySourceError>(err: E) -> ReplyFailure {
    ReplyFailure::Source(Box::new(err))
}
