use std::sync::Arc;

use little_chat_reply::ReplySource;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use super::driver::{Driver, IdleHook, NoticeHook, run_controller};
use super::state::ConversationState;
use super::{ChatSnapshot, Controller, Notice};
use crate::config::ChatConfig;
use crate::emitter::StreamEmitter;
use crate::id::{IdGenerator, UuidGenerator};
use crate::persistence::{KeyValueStore, MemoryStore, TranscriptPersistence};
use crate::reply_client::ReplyClient;
use crate::store::TranscriptStore;

/// [`Controller`] builder.
pub struct ControllerBuilder {
    reply_client: ReplyClient,
    config: ChatConfig,
    storage: Option<Box<dyn KeyValueStore>>,
    ids: Box<dyn IdGenerator>,
    on_idle: Option<IdleHook>,
    on_notice: Option<NoticeHook>,
}

impl ControllerBuilder {
    /// Creates a new builder with the specified reply source.
    #[inline]
    pub fn with_reply_source<S: ReplySource + 'static>(source: S) -> Self {
        Self {
            reply_client: ReplyClient::new(source),
            config: ChatConfig::default(),
            storage: None,
            ids: Box::new(UuidGenerator),
            on_idle: None,
            on_notice: None,
        }
    }

    /// Replaces the default configuration.
    #[inline]
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Persists the transcript into `storage`. Without it, the transcript
    /// only lives in memory.
    #[inline]
    pub fn with_storage<S: KeyValueStore + 'static>(mut self, storage: S) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Replaces the default UUID-based id generator.
    #[inline]
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, ids: G) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Attaches a callback to be invoked whenever a turn ends.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Attaches a callback to be invoked with user-facing notices.
    #[inline]
    pub fn on_notice(
        mut self,
        on_notice: impl Fn(Notice) + Send + Sync + 'static,
    ) -> Self {
        self.on_notice = Some(Box::new(on_notice));
        self
    }

    /// Restores the stored transcript and starts the controller.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Controller {
        let ControllerBuilder {
            reply_client,
            config,
            storage,
            ids,
            on_idle,
            on_notice,
        } = self;

        let storage: Box<dyn KeyValueStore> = match storage {
            Some(storage) => storage,
            None => Box::new(MemoryStore::default()),
        };
        let persistence =
            TranscriptPersistence::new(storage, config.storage_key());
        let store = TranscriptStore::from_messages(persistence.load());
        let state = ConversationState::new(store, ids);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(ChatSnapshot::default());

        let driver = Driver {
            state,
            reply_client,
            emitter: StreamEmitter::new(config.tick_interval()),
            persistence,
            config,
            snapshot_tx,
            self_tx: cmd_tx.downgrade(),
            on_idle,
            on_notice,
            reply_task: None,
            stream: None,
        };
        driver.publish();

        tokio::spawn(
            run_controller(driver, cmd_rx, kill_rx)
                .instrument(debug_span!("conversation")),
        );

        Controller {
            cmd_tx,
            kill_tx: Arc::new(kill_tx),
            snapshot_rx,
        }
    }
}
