use std::time::Duration;

use crate::emitter::DEFAULT_TICK_INTERVAL;
use crate::persistence::DEFAULT_STORAGE_KEY;

/// Text written into an assistant message whose reply could not be
/// produced.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Sorry, I ran into a problem while \
                                           handling your request. Please try \
                                           again, or ask me another way.";

/// Builder for [`ChatConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChatConfigBuilder {
    tick_interval: Option<Duration>,
    storage_key: Option<String>,
    failure_message: Option<String>,
    reply_timeout: Option<Duration>,
}

impl ChatConfigBuilder {
    /// Sets the period between two revealed characters.
    #[inline]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = Some(tick_interval);
        self
    }

    /// Sets the key the transcript is persisted under.
    #[inline]
    pub fn with_storage_key<S: Into<String>>(mut self, key: S) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Sets the text shown in place of a reply that failed.
    #[inline]
    pub fn with_failure_message<S: Into<String>>(mut self, message: S) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Gives up on replies that take longer than `timeout`.
    #[inline]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> ChatConfig {
        ChatConfig {
            tick_interval: self.tick_interval.unwrap_or(DEFAULT_TICK_INTERVAL),
            storage_key: self
                .storage_key
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_owned()),
            failure_message: self
                .failure_message
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_owned()),
            reply_timeout: self.reply_timeout,
        }
    }
}

/// Configuration of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatConfig {
    pub(crate) tick_interval: Duration,
    pub(crate) storage_key: String,
    pub(crate) failure_message: String,
    pub(crate) reply_timeout: Option<Duration>,
}

impl ChatConfig {
    /// Returns a builder starting from the defaults.
    #[inline]
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    /// Returns the period between two revealed characters.
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Returns the key the transcript is persisted under.
    #[inline]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Returns the text shown in place of a reply that failed.
    #[inline]
    pub fn failure_message(&self) -> &str {
        &self.failure_message
    }

    /// Returns the reply timeout, if any.
    #[inline]
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout
    }
}

impl Default for ChatConfig {
    #[inline]
    fn default() -> Self {
        ChatConfig::builder().build()
    }
}
