//! Transcript entries and their read-only views.

use std::fmt::{self, Display};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// An opaque token identifying a message for its whole lifetime.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates an id from a raw token.
    #[inline]
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    #[inline]
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user.
    User,
    /// Produced by the reply source.
    Assistant,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Delivery stage of a message.
///
/// Everything except `Settled` is transient: it only exists while a turn
/// is in flight and is never written to storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Content is final.
    #[default]
    Settled,
    /// Waiting for the reply source.
    Loading,
    /// The reply is being revealed.
    Streaming,
}

impl Stage {
    /// Returns `true` for the in-flight stages.
    #[inline]
    pub fn is_transient(self) -> bool {
        self != Stage::Settled
    }
}

/// One transcript entry.
///
/// Fields can only be changed through the crate's own mutators, which keep
/// `id`, `role` and `timestamp` fixed for the message's lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    streamed_content: String,
    timestamp: DateTime<Utc>,
    stage: Stage,
}

impl Message {
    pub(crate) fn user(
        id: MessageId,
        content: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::settled(id, Role::User, content, timestamp)
    }

    pub(crate) fn assistant_placeholder(
        id: MessageId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            streamed_content: String::new(),
            timestamp,
            stage: Stage::Loading,
        }
    }

    pub(crate) fn settled(
        id: MessageId,
        role: Role,
        content: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            role,
            content,
            streamed_content: String::new(),
            timestamp,
            stage: Stage::Settled,
        }
    }

    /// Returns the id.
    #[inline]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Returns the author.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the finalized text. Empty for an assistant message that is
    /// still in flight.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the partially revealed text of an in-flight reply.
    #[inline]
    pub fn streamed_content(&self) -> &str {
        &self.streamed_content
    }

    /// Returns the creation time.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the delivery stage.
    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns `true` while the message belongs to an in-flight turn.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.stage.is_transient()
    }

    /// Returns the text a view should show right now.
    #[inline]
    pub fn display_text(&self) -> &str {
        if self.is_transient() {
            &self.streamed_content
        } else {
            &self.content
        }
    }

    /// Returns the read-only view handed to the rendering layer.
    pub fn view(&self) -> MessageView {
        MessageView {
            id: self.id.clone(),
            role: self.role,
            text: self.display_text().to_owned(),
            timestamp: self.timestamp,
            is_streaming: self.is_transient(),
            is_loading: self.stage == Stage::Loading,
        }
    }

    pub(crate) fn reset_for_regeneration(&mut self) {
        self.content.clear();
        self.streamed_content.clear();
        self.stage = Stage::Loading;
    }

    pub(crate) fn begin_streaming(&mut self) {
        self.streamed_content.clear();
        self.stage = Stage::Streaming;
    }

    /// Grows the revealed prefix. Shorter prefixes are ignored so that
    /// observers never see the text shrink.
    pub(crate) fn reveal(&mut self, prefix: &str) -> bool {
        if self.stage != Stage::Streaming
            || prefix.len() < self.streamed_content.len()
        {
            return false;
        }
        self.streamed_content.clear();
        self.streamed_content.push_str(prefix);
        true
    }

    pub(crate) fn finalize(&mut self, content: String) {
        self.content = content;
        self.streamed_content.clear();
        self.stage = Stage::Settled;
    }
}

/// What the rendering layer gets to see of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageView {
    /// Id of the message.
    pub id: MessageId,
    /// Author of the message.
    pub role: Role,
    /// The finalized content, or the revealed prefix while streaming.
    pub text: String,
    /// Creation time, for labeling only.
    pub timestamp: DateTime<Utc>,
    /// Set for any in-flight assistant message.
    pub is_streaming: bool,
    /// Set while the reply source has not answered yet.
    pub is_loading: bool,
}

/// Current time at the precision used by storage, so a persisted message
/// compares equal to the one that was saved.
#[inline]
pub(crate) fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
