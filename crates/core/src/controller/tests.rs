use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use little_chat_test_reply::{PresetReply, ScriptedReplySource};
use tokio::time::{sleep, timeout};

use super::*;
use crate::config::{ChatConfig, DEFAULT_FAILURE_MESSAGE};
use crate::id::SequentialGenerator;
use crate::message::Role;
use crate::persistence::{
    DEFAULT_STORAGE_KEY, KeyValueStore, MemoryStore, TranscriptPersistence,
};

fn builder(source: &ScriptedReplySource) -> ControllerBuilder {
    ControllerBuilder::with_reply_source(source.clone())
        .with_id_generator(SequentialGenerator::default())
}

async fn idle(controller: &Controller) -> ChatSnapshot {
    timeout(Duration::from_secs(30), controller.wait_idle())
        .await
        .unwrap()
        .unwrap()
}

fn texts(snapshot: &ChatSnapshot) -> Vec<(Role, String, bool)> {
    snapshot
        .messages
        .iter()
        .map(|m| (m.role, m.text.clone(), m.is_streaming))
        .collect()
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let hook = {
        let count = Arc::clone(&count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    };
    (count, hook)
}

fn notices() -> (
    Arc<Mutex<Vec<Notice>>>,
    impl Fn(Notice) + Send + Sync + 'static,
) {
    let notices = Arc::new(Mutex::new(Vec::new()));
    let hook = {
        let notices = Arc::clone(&notices);
        move |notice| notices.lock().unwrap().push(notice)
    };
    (notices, hook)
}

#[tokio::test(start_paused = true)]
async fn test_send_and_stream() {
    let source = ScriptedReplySource::with_presets([PresetReply::text("hello")]);
    let storage = MemoryStore::default();
    let (idle_count, on_idle) = counter();
    let controller = builder(&source)
        .with_storage(storage.clone())
        .on_idle(on_idle)
        .build();

    let mut rx = controller.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if let Some(reply) = snapshot.messages.get(1) {
                seen.push(reply.text.clone());
            }
            if snapshot.messages.len() == 2 && !snapshot.is_busy() {
                break;
            }
        }
        seen
    });

    let reply_id = controller.send("hi").await.unwrap();

    // Both messages are there before any tick.
    let snapshot = controller.snapshot();
    assert!(snapshot.is_busy());
    assert_eq!(
        texts(&snapshot),
        [
            (Role::User, "hi".to_owned(), false),
            (Role::Assistant, String::new(), true),
        ]
    );
    assert_eq!(snapshot.messages[1].id, reply_id);

    // Nothing is stored until the turn settles.
    assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);
    sleep(Duration::from_millis(50)).await;
    assert!(controller.snapshot().is_busy());
    assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);

    let snapshot = idle(&controller).await;
    assert_eq!(
        texts(&snapshot),
        [
            (Role::User, "hi".to_owned(), false),
            (Role::Assistant, "hello".to_owned(), false),
        ]
    );
    assert_eq!(source.prompts(), ["hi"]);
    assert_eq!(idle_count.load(Ordering::SeqCst), 1);

    let seen = timeout(Duration::from_secs(1), observer)
        .await
        .unwrap()
        .unwrap();
    assert!(seen.windows(2).all(|w| w[0].len() <= w[1].len()));
    assert!(seen.iter().all(|text| "hello".starts_with(text.as_str())));
    assert_eq!(seen.last().map(String::as_str), Some("hello"));

    let stored = TranscriptPersistence::new(storage, DEFAULT_STORAGE_KEY).load();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content(), "hello");
    assert_eq!(stored[1].id(), &reply_id);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_sends_change_nothing() {
    let source = ScriptedReplySource::with_presets([PresetReply::text("hello")]);
    let controller = builder(&source).build();

    assert_eq!(controller.send("").await, Err(Rejection::EmptyInput));
    assert_eq!(controller.send(" \n ").await, Err(Rejection::EmptyInput));
    let snapshot = controller.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(!snapshot.is_busy());

    controller.send("first").await.unwrap();
    let before = controller.snapshot();
    assert_eq!(controller.send("second").await, Err(Rejection::Busy));
    assert_eq!(controller.send("  ").await, Err(Rejection::EmptyInput));
    let after = controller.snapshot();
    assert_eq!(before.messages, after.messages);
    assert!(after.is_busy());

    let snapshot = idle(&controller).await;
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reply_failure() {
    let source =
        ScriptedReplySource::with_presets([PresetReply::failure("boom")]);
    let storage = MemoryStore::default();
    let (idle_count, on_idle) = counter();
    let controller = builder(&source)
        .with_storage(storage.clone())
        .on_idle(on_idle)
        .build();

    controller.send("hi").await.unwrap();
    let snapshot = idle(&controller).await;
    assert_eq!(
        texts(&snapshot),
        [
            (Role::User, "hi".to_owned(), false),
            (Role::Assistant, DEFAULT_FAILURE_MESSAGE.to_owned(), false),
        ]
    );
    assert_eq!(idle_count.load(Ordering::SeqCst), 1);

    let stored = TranscriptPersistence::new(storage, DEFAULT_STORAGE_KEY).load();
    assert_eq!(stored[1].content(), DEFAULT_FAILURE_MESSAGE);

    // Failure is terminal for the turn, but the next one works.
    assert!(controller.send("again").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_reply_timeout() {
    let source = ScriptedReplySource::with_presets([PresetReply::Pending]);
    let controller = builder(&source)
        .with_config(
            ChatConfig::builder()
                .with_reply_timeout(Duration::from_secs(10))
                .with_failure_message("took too long")
                .build(),
        )
        .build();

    controller.send("hi").await.unwrap();
    let snapshot = idle(&controller).await;
    assert_eq!(snapshot.messages[1].text, "took too long");
}

#[tokio::test(start_paused = true)]
async fn test_empty_reply() {
    let source = ScriptedReplySource::with_presets([PresetReply::text("")]);
    let controller = builder(&source).build();

    controller.send("hi").await.unwrap();
    let snapshot = idle(&controller).await;
    assert_eq!(snapshot.messages[1].text, "");
    assert!(!snapshot.messages[1].is_streaming);
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_in_place() {
    let source = ScriptedReplySource::with_presets([
        PresetReply::text("hello"),
        PresetReply::text("hi there"),
    ]);
    let storage = MemoryStore::default();
    let controller = builder(&source).with_storage(storage.clone()).build();

    let reply_id = controller.send("hi").await.unwrap();
    let before = idle(&controller).await;
    let original = before.message(&reply_id).unwrap().clone();
    assert_eq!(original.text, "hello");

    controller.regenerate(&reply_id).await.unwrap();
    let reset = controller.snapshot();
    assert!(reset.is_busy());
    assert_eq!(reset.messages.len(), 2);
    assert_eq!(reset.message(&reply_id).unwrap().text, "");
    assert!(reset.message(&reply_id).unwrap().is_streaming);

    let after = idle(&controller).await;
    assert_eq!(after.messages.len(), 2);
    assert_eq!(after.messages[0], before.messages[0]);
    let regenerated = &after.messages[1];
    assert_eq!(regenerated.id, original.id);
    assert_eq!(regenerated.role, Role::Assistant);
    assert_eq!(regenerated.timestamp, original.timestamp);
    assert_eq!(regenerated.text, "hi there");
    assert_eq!(source.prompts(), ["hi", "hi"]);

    let stored = TranscriptPersistence::new(storage, DEFAULT_STORAGE_KEY).load();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content(), "hi there");
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_failure_in_place() {
    let source = ScriptedReplySource::with_presets([
        PresetReply::text("hello"),
        PresetReply::failure("boom"),
    ]);
    let storage = MemoryStore::default();
    let controller = builder(&source).with_storage(storage.clone()).build();

    let reply_id = controller.send("hi").await.unwrap();
    let before = idle(&controller).await;
    let original = before.message(&reply_id).unwrap().clone();
    let stored_before = storage.get(DEFAULT_STORAGE_KEY).unwrap();

    controller.regenerate(&reply_id).await.unwrap();
    assert!(controller.snapshot().is_busy());
    assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), stored_before);

    let after = idle(&controller).await;
    assert_eq!(after.messages.len(), 2);
    assert_eq!(after.messages[0], before.messages[0]);
    let failed = &after.messages[1];
    assert_eq!(failed.id, original.id);
    assert_eq!(failed.role, Role::Assistant);
    assert_eq!(failed.timestamp, original.timestamp);
    assert_eq!(failed.text, DEFAULT_FAILURE_MESSAGE);
    assert!(!failed.is_streaming);

    let stored = TranscriptPersistence::new(storage, DEFAULT_STORAGE_KEY).load();
    let stored: Vec<_> = stored
        .iter()
        .map(|m| (m.id().clone(), m.content().to_owned(), m.timestamp()))
        .collect();
    assert_eq!(
        stored,
        [
            (
                before.messages[0].id.clone(),
                "hi".to_owned(),
                before.messages[0].timestamp,
            ),
            (
                original.id.clone(),
                DEFAULT_FAILURE_MESSAGE.to_owned(),
                original.timestamp,
            ),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_leaves_later_messages() {
    let source = ScriptedReplySource::with_presets([
        PresetReply::text("one"),
        PresetReply::text("two"),
        PresetReply::text("uno"),
    ]);
    let controller = builder(&source).build();

    let first = controller.send("first").await.unwrap();
    idle(&controller).await;
    controller.send("second").await.unwrap();
    idle(&controller).await;

    controller.regenerate(&first).await.unwrap();
    let snapshot = idle(&controller).await;
    let all: Vec<_> = snapshot.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(all, ["first", "uno", "second", "two"]);
    assert_eq!(source.prompts(), ["first", "second", "first"]);
}

#[tokio::test(start_paused = true)]
async fn test_regenerate_rejections() {
    let mut storage = MemoryStore::default();
    storage
        .set(
            DEFAULT_STORAGE_KEY,
            r#"[
                {"id": "a0", "role": "assistant", "content": "welcome", "timestamp": 1},
                {"id": "u1", "role": "user", "content": "hi", "timestamp": 2},
                {"id": "a1", "role": "assistant", "content": "hello", "timestamp": 3}
            ]"#
            .to_owned(),
        )
        .unwrap();
    let source = ScriptedReplySource::with_presets([PresetReply::Pending]);
    let (notices, on_notice) = notices();
    let controller = builder(&source)
        .with_storage(storage)
        .on_notice(on_notice)
        .build();
    let before = controller.snapshot();
    assert_eq!(before.messages.len(), 3);

    let missing = MessageId::new("missing");
    let cases = [
        (missing.clone(), Rejection::TargetNotFound(missing)),
        ("u1".into(), Rejection::NotAssistant("u1".into())),
        ("a0".into(), Rejection::NoPrecedingPrompt("a0".into())),
    ];
    for (id, expected) in &cases {
        assert_eq!(controller.regenerate(id).await.as_ref(), Err(expected));
    }

    let after = controller.snapshot();
    assert_eq!(before.messages, after.messages);
    assert!(!after.is_busy());
    assert_eq!(source.calls(), 0);
    assert_eq!(
        *notices.lock().unwrap(),
        cases
            .into_iter()
            .map(|(_, rejection)| Notice::RegenerateRejected(rejection))
            .collect::<Vec<_>>()
    );

    // Busy is silent.
    controller.regenerate(&"a1".into()).await.unwrap();
    assert_eq!(
        controller.regenerate(&"a1".into()).await,
        Err(Rejection::Busy)
    );
    assert_eq!(notices.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_clear_needs_confirmation() {
    let source = ScriptedReplySource::with_presets([PresetReply::text("hello")]);
    let storage = MemoryStore::default();
    let controller = builder(&source).with_storage(storage.clone()).build();

    controller.send("hi").await.unwrap();
    let before = idle(&controller).await;

    controller.request_clear().cancel();
    drop(controller.request_clear());
    sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.snapshot().messages, before.messages);
    assert!(storage.get(DEFAULT_STORAGE_KEY).unwrap().is_some());

    controller.request_clear().confirm().await.unwrap();
    assert!(controller.snapshot().messages.is_empty());
    assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_clear_mid_stream() {
    let source = ScriptedReplySource::with_presets([
        PresetReply::text("a reply long enough to be interrupted"),
        PresetReply::text("again"),
    ]);
    let storage = MemoryStore::default();
    let (idle_count, on_idle) = counter();
    let controller = builder(&source)
        .with_storage(storage.clone())
        .on_idle(on_idle)
        .build();

    controller.send("hi").await.unwrap();
    sleep(Duration::from_millis(100)).await;
    let streaming = controller.snapshot();
    assert!(streaming.is_busy());
    assert!(!streaming.messages[1].text.is_empty());

    controller.request_clear().confirm().await.unwrap();
    let cleared = controller.snapshot();
    assert!(cleared.messages.is_empty());
    assert!(!cleared.is_busy());
    assert_eq!(idle_count.load(Ordering::SeqCst), 1);

    // No late tick resurrects anything.
    sleep(Duration::from_secs(5)).await;
    assert!(controller.snapshot().messages.is_empty());
    assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);
    assert_eq!(idle_count.load(Ordering::SeqCst), 1);

    controller.send("hello").await.unwrap();
    let snapshot = idle(&controller).await;
    assert_eq!(
        texts(&snapshot),
        [
            (Role::User, "hello".to_owned(), false),
            (Role::Assistant, "again".to_owned(), false),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_clear_while_loading() {
    let source = ScriptedReplySource::with_presets([
        PresetReply::Pending,
        PresetReply::text("ok"),
    ]);
    let controller = builder(&source).build();

    controller.send("hi").await.unwrap();
    controller.request_clear().confirm().await.unwrap();
    assert!(!controller.snapshot().is_busy());

    controller.send("hi").await.unwrap();
    let snapshot = idle(&controller).await;
    assert_eq!(snapshot.messages[1].text, "ok");
}

#[tokio::test(start_paused = true)]
async fn test_save_failure_keeps_transcript() {
    let source = ScriptedReplySource::with_presets([PresetReply::text("hello")]);
    let storage = MemoryStore::with_quota(8);
    let (notices, on_notice) = notices();
    let controller = builder(&source)
        .with_storage(storage.clone())
        .on_notice(on_notice)
        .build();

    controller.send("hi").await.unwrap();
    let snapshot = idle(&controller).await;
    assert_eq!(snapshot.messages[1].text, "hello");
    assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);

    let notices = notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert!(matches!(notices[0], Notice::SaveFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_restore_on_start() {
    let source = ScriptedReplySource::with_presets([PresetReply::text("hello")]);
    let storage = MemoryStore::default();
    let controller = builder(&source).with_storage(storage.clone()).build();
    controller.send("hi").await.unwrap();
    let finished = idle(&controller).await;
    controller.shutdown();

    let restored = builder(&ScriptedReplySource::default())
        .with_storage(storage)
        .build();
    let snapshot = restored.snapshot();
    assert!(!snapshot.is_busy());
    assert_eq!(snapshot.messages, finished.messages);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_storage_starts_empty() {
    let mut storage = MemoryStore::default();
    storage
        .set(DEFAULT_STORAGE_KEY, "{not valid".to_owned())
        .unwrap();
    let controller = builder(&ScriptedReplySource::default())
        .with_storage(storage)
        .build();
    assert!(controller.snapshot().messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown() {
    let source = ScriptedReplySource::with_presets([PresetReply::text("hello")]);
    let controller = builder(&source).build();

    controller.shutdown();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(
        controller.send("hi").await,
        Err(Rejection::Gone(ControllerGone))
    );
    assert_eq!(controller.wait_idle().await.map(|_| ()), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_abandons_turn() {
    let source = ScriptedReplySource::with_presets([PresetReply::text(
        "a reply long enough to be interrupted",
    )]);
    let storage = MemoryStore::default();
    let (idle_count, on_idle) = counter();
    let controller = builder(&source)
        .with_storage(storage.clone())
        .on_idle(on_idle)
        .build();
    let mut snapshot_rx = controller.subscribe();

    controller.send("hi").await.unwrap();
    sleep(Duration::from_millis(100)).await;
    drop(controller);

    // The task stops and the reveal never finishes.
    timeout(Duration::from_secs(5), async {
        while snapshot_rx.changed().await.is_ok() {}
    })
    .await
    .unwrap();
    sleep(Duration::from_secs(5)).await;
    assert!(snapshot_rx.borrow().is_busy());
    assert_eq!(storage.get(DEFAULT_STORAGE_KEY).unwrap(), None);
    assert_eq!(idle_count.load(Ordering::SeqCst), 0);
}
