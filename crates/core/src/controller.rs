mod builder;
mod driver;
mod state;
#[cfg(test)]
mod tests;

use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::message::{MessageId, MessageView};
pub use builder::ControllerBuilder;
use driver::Command;
pub use state::{Phase, Rejection};

/// Error returned when the controller task has stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[error("the conversation controller has stopped")]
pub struct ControllerGone;

/// An immutable picture of the conversation, published after every change.
#[derive(Clone, Debug, Default)]
pub struct ChatSnapshot {
    /// Whether a turn is in flight.
    pub phase: Phase,
    /// The transcript in display order.
    pub messages: Arc<[MessageView]>,
}

impl ChatSnapshot {
    /// Returns `true` while a turn is in flight.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Busy
    }

    /// Returns the view of the message with the given id.
    pub fn message(&self, id: &MessageId) -> Option<&MessageView> {
        self.messages.iter().find(|m| &m.id == id)
    }
}

/// Something the user should be told about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A regenerate request was not accepted.
    RegenerateRejected(Rejection),
    /// The transcript could not be saved. The in-memory transcript is
    /// unaffected.
    SaveFailed(String),
}

/// Handle to a running conversation.
///
/// The conversation itself lives on a background task that owns the
/// transcript and processes one command at a time, so a turn is accepted
/// or rejected atomically. Clones refer to the same conversation. The task
/// stops when every handle has been dropped or [`Controller::shutdown`] is
/// called.
#[derive(Clone)]
pub struct Controller {
    cmd_tx: mpsc::UnboundedSender<Command>,
    kill_tx: Arc<watch::Sender<bool>>,
    snapshot_rx: watch::Receiver<ChatSnapshot>,
}

impl Controller {
    /// Sends a prompt.
    ///
    /// On acceptance the prompt and an empty assistant placeholder have
    /// been appended by the time this returns, and the id of the
    /// placeholder is returned. The reply is then requested and streamed
    /// into the placeholder in the background.
    pub async fn send<S: Into<String>>(
        &self,
        prompt: S,
    ) -> Result<MessageId, Rejection> {
        let (ack, rx) = oneshot::channel();
        self.dispatch(Command::Send {
            prompt: prompt.into(),
            ack,
        })?;
        rx.await.map_err(|_| ControllerGone)?
    }

    /// Produces the reply of an assistant message again, in place.
    ///
    /// The message keeps its id, role and timestamp; only its content is
    /// reset and streamed anew. The nearest preceding user message is used
    /// as the prompt.
    pub async fn regenerate(&self, id: &MessageId) -> Result<(), Rejection> {
        let (ack, rx) = oneshot::channel();
        self.dispatch(Command::Regenerate {
            id: id.clone(),
            ack,
        })?;
        rx.await.map_err(|_| ControllerGone)?
    }

    /// Asks to erase the whole history.
    ///
    /// Nothing happens until the returned request is confirmed.
    #[inline]
    pub fn request_clear(&self) -> ClearRequest {
        ClearRequest {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Returns the latest snapshot.
    #[inline]
    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Returns a receiver notified after every change.
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Waits until no turn is in flight and returns that snapshot.
    pub async fn wait_idle(&self) -> Result<ChatSnapshot, ControllerGone> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|snapshot| !snapshot.is_busy())
            .await
            .map_err(|_| ControllerGone)?;
        Ok(snapshot.clone())
    }

    /// Stops the controller. A turn in flight is abandoned.
    #[inline]
    pub fn shutdown(&self) {
        self.kill_tx.send(true).ok();
    }

    fn dispatch(&self, cmd: Command) -> Result<(), ControllerGone> {
        self.cmd_tx.send(cmd).map_err(|_| ControllerGone)
    }
}

impl Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("snapshot", &*self.snapshot_rx.borrow())
            .finish_non_exhaustive()
    }
}

/// A pending request to erase the history.
///
/// Erasing is destructive, so it needs an explicit confirmation. Dropping
/// the request without confirming it is the same as cancelling.
#[must_use = "the history is only cleared after `confirm`"]
pub struct ClearRequest {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl ClearRequest {
    /// Empties the transcript and the stored copy.
    ///
    /// A turn in flight is abandoned: its reveal stops and its reply is
    /// dropped.
    pub async fn confirm(self) -> Result<(), ControllerGone> {
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Clear { ack })
            .map_err(|_| ControllerGone)?;
        rx.await.map_err(|_| ControllerGone)
    }

    /// Leaves everything untouched.
    #[inline]
    pub fn cancel(self) {}
}

impl Debug for ClearRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClearRequest").finish_non_exhaustive()
    }
}
