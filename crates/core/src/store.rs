//! The ordered transcript, the single source of truth for messages.

use std::sync::Arc;

use crate::message::{Message, MessageId, MessageView, Role};

/// An append-only-with-replacement ordered collection of messages.
///
/// Insertion order is display order. Ids are unique. Messages are never
/// removed individually; [`TranscriptStore::clear`] is the only way to
/// delete them.
#[derive(Clone, Debug, Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
}

impl TranscriptStore {
    /// Creates a store from already ordered messages, e.g. loaded ones.
    ///
    /// Later duplicates of an id are dropped.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut store = Self::default();
        for message in messages {
            store.append(message);
        }
        store
    }

    /// Appends a message to the end of the transcript.
    ///
    /// Returns `false` and leaves the transcript untouched if a message
    /// with the same id is already present.
    pub fn append(&mut self, message: Message) -> bool {
        if self.contains(message.id()) {
            warn!("duplicated message id {}, discarded", message.id());
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Applies `updater` to the message with the given id.
    ///
    /// Stale ids (for example ones removed by [`TranscriptStore::clear`])
    /// are fine: the call is a no-op and returns `false`.
    pub fn replace<F>(&mut self, id: &MessageId, updater: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(message) = self.messages.iter_mut().find(|m| m.id() == id)
        else {
            trace!("replace on missing id {id}, ignored");
            return false;
        };
        updater(message);
        true
    }

    /// Removes every message.
    #[inline]
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Returns the ordered messages.
    #[inline]
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    /// Returns views of the ordered messages for the rendering layer.
    pub fn views(&self) -> Arc<[MessageView]> {
        self.messages.iter().map(Message::view).collect()
    }

    /// Returns the message with the given id.
    #[inline]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    /// Returns `true` if a message with the given id exists.
    #[inline]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the nearest user message before the one with the given id.
    ///
    /// The target itself is never considered.
    pub fn preceding_prompt(&self, id: &MessageId) -> Option<&Message> {
        let pos = self.messages.iter().position(|m| m.id() == id)?;
        self.messages[..pos]
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
    }

    /// Returns the number of messages in a transient stage.
    pub fn in_flight(&self) -> usize {
        self.messages.iter().filter(|m| m.is_transient()).count()
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
