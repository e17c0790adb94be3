use std::fmt::{self, Debug};

use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::state::{ConversationState, Phase, Rejection, Turn, TurnId};
use super::{ChatSnapshot, Notice};
use crate::config::ChatConfig;
use crate::emitter::{StreamEmitter, StreamHandle};
use crate::message::MessageId;
use crate::persistence::TranscriptPersistence;
use crate::reply_client::{ReplyClient, ReplyResult};

pub(crate) type IdleHook = Box<dyn Fn() + Send + Sync>;
pub(crate) type NoticeHook = Box<dyn Fn(Notice) + Send + Sync>;

pub(crate) enum Command {
    Send {
        prompt: String,
        ack: oneshot::Sender<Result<MessageId, Rejection>>,
    },
    Regenerate {
        id: MessageId,
        ack: oneshot::Sender<Result<(), Rejection>>,
    },
    Clear {
        ack: oneshot::Sender<()>,
    },
    ReplyFinished {
        turn: TurnId,
        result: ReplyResult,
    },
    Tick {
        turn: TurnId,
        prefix: String,
    },
    StreamDone {
        turn: TurnId,
    },
}

impl Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Send { prompt, .. } => {
                f.debug_struct("Send").field("prompt", prompt).finish()
            }
            Command::Regenerate { id, .. } => {
                f.debug_struct("Regenerate").field("id", id).finish()
            }
            Command::Clear { .. } => f.debug_struct("Clear").finish(),
            Command::ReplyFinished { turn, result } => f
                .debug_struct("ReplyFinished")
                .field("turn", turn)
                .field("ok", &result.is_ok())
                .finish(),
            Command::Tick { turn, prefix } => f
                .debug_struct("Tick")
                .field("turn", turn)
                .field("len", &prefix.len())
                .finish(),
            Command::StreamDone { turn } => {
                f.debug_struct("StreamDone").field("turn", turn).finish()
            }
        }
    }
}

/// Owns the conversation state and wires the reply source and the
/// emitter into it. Only ever touched by the controller task.
pub(crate) struct Driver {
    pub state: ConversationState,
    pub reply_client: ReplyClient,
    pub emitter: StreamEmitter,
    pub persistence: TranscriptPersistence,
    pub config: ChatConfig,
    pub snapshot_tx: watch::Sender<ChatSnapshot>,
    pub self_tx: mpsc::WeakUnboundedSender<Command>,
    pub on_idle: Option<IdleHook>,
    pub on_notice: Option<NoticeHook>,
    pub reply_task: Option<JoinHandle<()>>,
    pub stream: Option<StreamHandle>,
}

impl Driver {
    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Send { prompt, ack } => {
                let res = self.state.begin_send(&prompt);
                let res = res.map(|turn| {
                    let target = turn.target.clone();
                    self.publish();
                    self.request_reply(turn);
                    target
                });
                if let Err(rejection) = &res {
                    debug!("send rejected: {rejection}");
                }
                ack.send(res).ok();
            }
            Command::Regenerate { id, ack } => {
                let res = self.state.begin_regenerate(&id).map(|turn| {
                    self.publish();
                    self.request_reply(turn);
                });
                if let Err(rejection) = &res {
                    debug!("regenerate rejected: {rejection}");
                    if rejection.is_user_visible() {
                        self.notify(Notice::RegenerateRejected(
                            rejection.clone(),
                        ));
                    }
                }
                ack.send(res).ok();
            }
            Command::Clear { ack } => {
                self.clear();
                ack.send(()).ok();
            }
            Command::ReplyFinished { turn, result } => {
                self.reply_finished(turn, result);
            }
            Command::Tick { turn, prefix } => {
                if self.state.apply_tick(turn, &prefix) {
                    self.publish();
                }
            }
            Command::StreamDone { turn } => {
                if self.state.finish(turn) {
                    self.stream = None;
                    debug!("turn finished");
                    self.settle();
                }
            }
        }
    }

    fn request_reply(&mut self, turn: Turn) {
        let Turn { id, target, prompt } = turn;
        debug!("turn accepted, target: {target}");

        let fut = self
            .reply_client
            .get_reply(prompt, self.config.reply_timeout());
        let self_tx = self.self_tx.clone();
        self.reply_task = Some(tokio::spawn(async move {
            let result = fut.await;
            if let Some(tx) = self_tx.upgrade() {
                tx.send(Command::ReplyFinished { turn: id, result }).ok();
            }
        }));
    }

    fn reply_finished(&mut self, turn: TurnId, result: ReplyResult) {
        match result {
            Ok(reply) => {
                if !self.state.reply_arrived(turn, reply.clone()) {
                    trace!("stale reply dropped");
                    return;
                }
                self.reply_task = None;
                self.publish();

                let tick_tx = self.self_tx.clone();
                let done_tx = self.self_tx.clone();
                self.stream = Some(self.emitter.start(
                    reply,
                    move |prefix| {
                        if let Some(tx) = tick_tx.upgrade() {
                            tx.send(Command::Tick {
                                turn,
                                prefix: prefix.to_owned(),
                            })
                            .ok();
                        }
                    },
                    move || {
                        if let Some(tx) = done_tx.upgrade() {
                            tx.send(Command::StreamDone { turn }).ok();
                        }
                    },
                ));
            }
            Err(err) => {
                if !self
                    .state
                    .fail(turn, self.config.failure_message())
                {
                    trace!("stale failure dropped");
                    return;
                }
                warn!("turn failed: {err}");
                self.reply_task = None;
                self.settle();
            }
        }
    }

    /// The turn is over and the transcript is quiescent: publish, persist,
    /// and report idleness, in that order.
    fn settle(&mut self) {
        debug_assert_eq!(self.state.store().in_flight(), 0);
        self.publish();
        self.persist();
        if let Some(on_idle) = &self.on_idle {
            on_idle();
        }
    }

    fn clear(&mut self) {
        self.stop_turn();
        let abandoned = self.state.clear();
        if let Err(err) = self.persistence.erase() {
            warn!("failed to erase the stored transcript: {err}");
        }
        debug!("history cleared");
        self.publish();
        if abandoned {
            if let Some(on_idle) = &self.on_idle {
                on_idle();
            }
        }
    }

    /// Cancels the reveal and the pending reply, if any.
    pub(crate) fn stop_turn(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.cancel();
        }
        if let Some(task) = self.reply_task.take() {
            task.abort();
        }
    }

    fn persist(&mut self) {
        match self.persistence.save(self.state.store().snapshot()) {
            Ok(count) => trace!("persisted {count} messages"),
            Err(err) => {
                warn!("failed to save the transcript: {err}");
                self.notify(Notice::SaveFailed(err.to_string()));
            }
        }
    }

    pub(crate) fn publish(&self) {
        self.snapshot_tx.send_replace(ChatSnapshot {
            phase: self.state.phase(),
            messages: self.state.store().views(),
        });
    }

    fn notify(&self, notice: Notice) {
        if let Some(on_notice) = &self.on_notice {
            on_notice(notice);
        }
    }
}

/// Processes commands one at a time until the controller is shut down or
/// every handle is gone. A shutdown takes effect before queued commands.
pub(crate) async fn run_controller(
    mut driver: Driver,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut kill_rx: watch::Receiver<bool>,
) {
    debug!("restored {} messages", driver.state.store().len());
    let reason = loop {
        let cmd = select! {
            biased;

            _ = kill_rx.changed() => break "shut down",
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break "all handles dropped",
            },
        };
        trace!(phase = ?driver.state.phase(), "handling {cmd:?}");
        driver.handle(cmd);
    };

    let abandoned = driver.state.phase() == Phase::Busy;
    driver.stop_turn();
    debug!(abandoned, "stopped: {reason}");
}
