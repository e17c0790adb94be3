use crate::id::{IdGenerator, UuidGenerator};
use crate::message::{Message, MessageId, Role, timestamp_now};
use crate::store::TranscriptStore;

const MAX_ID_ATTEMPTS: usize = 16;

/// Whether a turn is in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Ready to accept a turn.
    #[default]
    Idle,
    /// A send or regenerate is in flight.
    Busy,
}

/// Why an operation was not accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Rejection {
    /// The prompt is empty or whitespace only.
    #[error("the prompt is empty")]
    EmptyInput,
    /// Another turn is in flight.
    #[error("a reply is already in progress")]
    Busy,
    /// No message has the id.
    #[error("message {0} does not exist")]
    TargetNotFound(MessageId),
    /// The message is not an assistant message.
    #[error("message {0} is not an assistant reply")]
    NotAssistant(MessageId),
    /// No user message precedes the target.
    #[error("no prompt precedes message {0}")]
    NoPrecedingPrompt(MessageId),
    /// The controller task is gone.
    #[error(transparent)]
    Gone(#[from] super::ControllerGone),
}

impl Rejection {
    /// Returns `true` if the user should be warned about the rejection.
    ///
    /// Empty input and busy rejections are expected while typing or while
    /// a reply streams, so they are silent.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Rejection::TargetNotFound(_)
                | Rejection::NotAssistant(_)
                | Rejection::NoPrecedingPrompt(_)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TurnId(u64);

/// An accepted turn, ready to ask the reply source.
#[derive(Clone, Debug)]
pub(crate) struct Turn {
    pub id: TurnId,
    pub target: MessageId,
    pub prompt: String,
}

#[derive(Debug)]
struct ActiveTurn {
    id: TurnId,
    target: MessageId,
    reply: Option<String>,
}

/// The conversation as a plain state machine.
///
/// Every method is synchronous. Callbacks that belong to a turn carry its
/// [`TurnId`]; once the turn is over (finished, failed, or abandoned by a
/// clear) they are ignored and return `false`.
pub(crate) struct ConversationState {
    store: TranscriptStore,
    ids: Box<dyn IdGenerator>,
    active: Option<ActiveTurn>,
    next_turn: u64,
}

impl ConversationState {
    pub(crate) fn new(store: TranscriptStore, ids: Box<dyn IdGenerator>) -> Self {
        Self {
            store,
            ids,
            active: None,
            next_turn: 1,
        }
    }

    #[inline]
    pub(crate) fn phase(&self) -> Phase {
        if self.active.is_some() {
            Phase::Busy
        } else {
            Phase::Idle
        }
    }

    #[inline]
    pub(crate) fn store(&self) -> &TranscriptStore {
        &self.store
    }

    /// Appends the prompt and a placeholder for its reply.
    pub(crate) fn begin_send(&mut self, prompt: &str) -> Result<Turn, Rejection> {
        if prompt.trim().is_empty() {
            return Err(Rejection::EmptyInput);
        }
        if self.active.is_some() {
            return Err(Rejection::Busy);
        }

        let now = timestamp_now();
        let user_id = self.fresh_id();
        self.store
            .append(Message::user(user_id, prompt.to_owned(), now));
        let target = self.fresh_id();
        self.store
            .append(Message::assistant_placeholder(target.clone(), now));

        Ok(self.start_turn(target, prompt.to_owned()))
    }

    /// Resets an assistant message so its reply can be produced again.
    pub(crate) fn begin_regenerate(
        &mut self,
        id: &MessageId,
    ) -> Result<Turn, Rejection> {
        if self.active.is_some() {
            return Err(Rejection::Busy);
        }
        let Some(target) = self.store.get(id) else {
            return Err(Rejection::TargetNotFound(id.clone()));
        };
        if target.role() != Role::Assistant {
            return Err(Rejection::NotAssistant(id.clone()));
        }
        let Some(prompt) = self.store.preceding_prompt(id) else {
            return Err(Rejection::NoPrecedingPrompt(id.clone()));
        };
        let prompt = prompt.content().to_owned();

        self.store.replace(id, Message::reset_for_regeneration);
        Ok(self.start_turn(id.clone(), prompt))
    }

    /// Records the full reply and starts revealing it.
    pub(crate) fn reply_arrived(&mut self, turn: TurnId, reply: String) -> bool {
        let Some(active) = self.active_mut(turn) else {
            return false;
        };
        active.reply = Some(reply);
        let target = active.target.clone();
        self.store.replace(&target, Message::begin_streaming)
    }

    /// Shows a longer prefix of the reply.
    pub(crate) fn apply_tick(&mut self, turn: TurnId, prefix: &str) -> bool {
        let Some(active) = self.active_mut(turn) else {
            return false;
        };
        let target = active.target.clone();
        let mut grown = false;
        self.store.replace(&target, |m| grown = m.reveal(prefix));
        grown
    }

    /// Settles the target with the full reply and ends the turn.
    pub(crate) fn finish(&mut self, turn: TurnId) -> bool {
        if self.active_mut(turn).is_none() {
            return false;
        }
        let Some(active) = self.active.take() else {
            return false;
        };
        let reply = active.reply.unwrap_or_default();
        self.store.replace(&active.target, |m| m.finalize(reply));
        true
    }

    /// Settles the target with `failure_message` and ends the turn.
    pub(crate) fn fail(&mut self, turn: TurnId, failure_message: &str) -> bool {
        if self.active_mut(turn).is_none() {
            return false;
        }
        let Some(active) = self.active.take() else {
            return false;
        };
        self.store.replace(&active.target, |m| {
            m.finalize(failure_message.to_owned())
        });
        true
    }

    /// Empties the transcript, abandoning the turn in flight if any.
    ///
    /// Returns `true` if a turn was abandoned.
    pub(crate) fn clear(&mut self) -> bool {
        self.store.clear();
        self.active.take().is_some()
    }

    fn start_turn(&mut self, target: MessageId, prompt: String) -> Turn {
        let id = TurnId(self.next_turn);
        self.next_turn += 1;
        self.active = Some(ActiveTurn {
            id,
            target: target.clone(),
            reply: None,
        });
        Turn { id, target, prompt }
    }

    fn active_mut(&mut self, turn: TurnId) -> Option<&mut ActiveTurn> {
        self.active.as_mut().filter(|active| active.id == turn)
    }

    /// Generated ids may collide with loaded ones when the generator is
    /// deterministic; skip those. A generator stuck on taken ids is
    /// replaced by a random UUID for this message.
    fn fresh_id(&mut self) -> MessageId {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            if !self.store.contains(&id) {
                return id;
            }
            debug!("generated id {id} is taken, retrying");
        }
        warn!("id generator keeps returning taken ids, using a UUID");
        loop {
            let id = UuidGenerator.next_id();
            if !self.store.contains(&id) {
                return id;
            }
        }
    }
}
