use std::env;
use std::path::PathBuf;
use std::time::Duration;

use little_chat_core::ChatConfig;

use crate::canned::DEFAULT_REPLY_DELAY;

const DATA_DIR_VAR: &str = "LITTLE_CHAT_DATA_DIR";
const TICK_MS_VAR: &str = "LITTLE_CHAT_TICK_MS";
const REPLY_DELAY_MS_VAR: &str = "LITTLE_CHAT_REPLY_DELAY_MS";
const REPLY_TIMEOUT_MS_VAR: &str = "LITTLE_CHAT_REPLY_TIMEOUT_MS";

/// Settings of the terminal client, read from the environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    data_dir: Option<PathBuf>,
    tick_interval: Option<Duration>,
    reply_delay: Option<Duration>,
    reply_timeout: Option<Duration>,
}

impl Settings {
    /// Reads the settings from the process environment.
    #[inline]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the settings through `lookup`. Values that don't parse are
    /// ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(err) => {
                    warn!("ignoring {key}={raw:?}: {err}");
                    None
                }
            }
        };
        Self {
            data_dir: lookup(DATA_DIR_VAR)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            tick_interval: millis(TICK_MS_VAR),
            reply_delay: millis(REPLY_DELAY_MS_VAR),
            reply_timeout: millis(REPLY_TIMEOUT_MS_VAR),
        }
    }

    /// Directory the history is saved in, if there is one.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("little-chat")))
    }

    /// Latency of the canned reply source.
    #[inline]
    pub fn reply_delay(&self) -> Duration {
        self.reply_delay.unwrap_or(DEFAULT_REPLY_DELAY)
    }

    /// Builds the controller configuration.
    pub fn chat_config(&self) -> ChatConfig {
        let mut builder = ChatConfig::builder();
        if let Some(tick_interval) = self.tick_interval {
            builder = builder.with_tick_interval(tick_interval);
        }
        if let Some(reply_timeout) = self.reply_timeout {
            builder = builder.with_reply_timeout(reply_timeout);
        }
        builder.build()
    }
}
