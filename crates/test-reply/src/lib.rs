//! A local scripted reply source for testing purpose.

#[macro_use]
extern crate tracing;

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use little_chat_reply::{ErrorKind, ReplySource, ReplySourceError};
use tokio::time::sleep;

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    /// Returns the message this error was created with.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ReplySourceError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A local scripted reply source for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how
/// the source should answer each request. The n-th request is answered
/// by the n-th preset. If there are not enough presets in the script, an
/// error will be returned.
///
/// Clones share the script position and the recorded prompts, so a test
/// can keep a clone around to inspect what the controller asked for.
#[derive(Clone, Default)]
pub struct ScriptedReplySource {
    script: Vec<PresetReply>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedReplySource {
    /// Creates a source answering with the presets in order.
    #[inline]
    pub fn with_presets(presets: impl IntoIterator<Item = PresetReply>) -> Self {
        Self {
            script: presets.into_iter().collect(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn add_reply(&mut self, preset: PresetReply) {
        self.script.push(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the prompts received so far, in request order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    /// Returns the number of requests received so far.
    #[inline]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReplySource for ScriptedReplySource {
    type Error = crate::Error;

    fn get_reply(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static
    {
        let step_idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_owned());
        }
        let step = self.script.get(step_idx).cloned();
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        trace!("scripted step {step_idx}: {step:?}");

        async move {
            sleep(delay).await;
            match step {
                Some(PresetReply::Text(text)) => Ok(text),
                Some(PresetReply::Failure(message)) => Err(Error {
                    message,
                    kind: ErrorKind::Other,
                }),
                Some(PresetReply::Pending) => pending().await,
                None => Err(Error {
                    message: "not enough steps".to_owned(),
                    kind: ErrorKind::Unavailable,
                }),
            }
        }
    }
}
