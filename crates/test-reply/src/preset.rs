use serde::{Deserialize, Serialize};

/// How the source answers one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetReply {
    /// Resolves to the text.
    #[serde(rename = "text")]
    Text(String),
    /// Rejects with the message.
    #[serde(rename = "failure")]
    Failure(String),
    /// Never resolves. Useful for abandoning a turn while it is loading.
    #[serde(rename = "pending")]
    Pending,
}

impl PresetReply {
    /// Creates a `PresetReply` that resolves to the text.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text(text.into())
    }

    /// Creates a `PresetReply` that rejects with the message.
    #[inline]
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self::Failure(message.into())
    }
}
