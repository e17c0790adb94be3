use uuid::Uuid;

use crate::message::MessageId;

/// A source of fresh message ids.
pub trait IdGenerator: Send {
    /// Returns an id that this generator has not returned before.
    ///
    /// The controller retries a few times when the id is already in the
    /// transcript, then falls back to a random UUID.
    fn next_id(&mut self) -> MessageId;
}

/// Generates random v4 UUIDs. This is the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    #[inline]
    fn next_id(&mut self) -> MessageId {
        MessageId::new(Uuid::new_v4().to_string())
    }
}

/// Generates `prefix-1`, `prefix-2`, and so on.
#[derive(Clone, Debug)]
pub struct SequentialGenerator {
    prefix: String,
    next: u64,
}

impl SequentialGenerator {
    /// Creates a generator with the given prefix.
    #[inline]
    pub fn with_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl Default for SequentialGenerator {
    #[inline]
    fn default() -> Self {
        Self::with_prefix("msg")
    }
}

impl IdGenerator for SequentialGenerator {
    fn next_id(&mut self) -> MessageId {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        MessageId::new(id)
    }
}
