use std::error::Error;

use crate::error::ErrorKind;

/// The error type for a reply source.
pub trait ReplySourceError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that produces complete assistant replies for user prompts.
///
/// Once the source is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the source should be prepared for being dropped anytime.
pub trait ReplySource: Send + Sync {
    /// The error type that may be returned by the source.
    type Error: ReplySourceError;

    /// Requests a reply for the prompt.
    ///
    /// The returned future must not borrow from `self` or `prompt`, so
    /// that callers can drive it on another task and drop it to abandon
    /// the request.
    fn get_reply(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static;
}
