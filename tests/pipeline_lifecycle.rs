//! End-to-end routing through the public pipeline API

mod common;

use common::{at_second, eventually, millis, RecordingBroker};
use lanerouter::core::time::{Clock, ManualClock};
use lanerouter::pipeline::{AgeParityPolicy, Message, Phase, Pipeline, PipelineSettings};
use lanerouter::store::MemoryStore;
use std::sync::Arc;

const TOPIC: &str = "routing";

async fn start(broker: &RecordingBroker, store: &MemoryStore, clock: &ManualClock) -> Pipeline {
    Pipeline::start(
        broker,
        Box::new(store.clone()),
        PipelineSettings {
            topic: TOPIC.to_string(),
        },
        Arc::new(AgeParityPolicy::default()),
        Arc::new(clock.clone()) as Arc<dyn Clock>,
    )
    .await
    .expect("pipeline should start")
}

#[tokio::test]
async fn test_even_message_written_once() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new();
    let clock = ManualClock::new(at_second(10));
    let pipeline = start(&broker, &store, &clock).await;

    broker
        .inject(TOPIC, Message::new("hello", at_second(10)))
        .await;
    pipeline.shutdown().await.unwrap();

    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].text, "hello");
    assert_eq!(rows[0].timestamp, at_second(10));
    assert!(broker.sent().is_empty());
}

#[tokio::test]
async fn test_stale_message_dropped_silently() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new();
    let clock = ManualClock::new(at_second(10));
    let pipeline = start(&broker, &store, &clock).await;
    let stats = pipeline.stats();

    broker
        .inject(TOPIC, Message::new("old", at_second(10) - millis(61_000)))
        .await;
    pipeline.shutdown().await.unwrap();

    assert!(store.rows().is_empty());
    assert!(broker.sent().is_empty());
    assert_eq!(stats.snapshot().dropped, 1);
    assert_eq!(stats.snapshot().classified, 1);
}

#[tokio::test]
async fn test_message_exactly_at_max_age_is_dropped() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new();
    let clock = ManualClock::new(at_second(40));
    let pipeline = start(&broker, &store, &clock).await;

    broker
        .inject(TOPIC, Message::new("boundary", at_second(40) - millis(60_000)))
        .await;
    broker
        .inject(TOPIC, Message::new("fresh", at_second(40) - millis(59_999)))
        .await;
    pipeline.shutdown().await.unwrap();

    let texts: Vec<_> = store.rows().into_iter().map(|r| r.text).collect();
    assert_eq!(texts, vec!["fresh"]);
    assert!(broker.sent().is_empty());
}

#[tokio::test]
async fn test_odd_message_republished_with_later_timestamp() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new();
    let clock = ManualClock::new(at_second(13) + millis(250));
    let pipeline = start(&broker, &store, &clock).await;
    let stats = pipeline.stats();

    let original = Message::new("odd", at_second(13));
    broker.inject(TOPIC, original.clone()).await;
    eventually(|| stats.snapshot().republished == 1).await;
    pipeline.shutdown().await.unwrap();

    let sent = broker.sent();
    assert_eq!(sent.len(), 1);
    let (topic, republished) = &sent[0];
    assert_eq!(topic, TOPIC);
    assert_eq!(republished.payload(), "odd");
    assert_eq!(republished.timestamp(), clock.now());
    assert!(republished.timestamp() > original.timestamp());
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_odd_message_stamped_now_still_moves_forward() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new();
    let clock = ManualClock::new(at_second(21));
    let pipeline = start(&broker, &store, &clock).await;
    let stats = pipeline.stats();

    broker
        .inject(TOPIC, Message::new("now", at_second(21)))
        .await;
    eventually(|| stats.snapshot().republished == 1).await;
    pipeline.shutdown().await.unwrap();

    let sent = broker.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.timestamp() > at_second(21));
}

#[tokio::test]
async fn test_lanes_preserve_arrival_order() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new();
    let clock = ManualClock::new(at_second(30) + millis(500));
    let pipeline = start(&broker, &store, &clock).await;

    for i in 0..10 {
        let second = if i % 2 == 0 { 29 } else { 30 };
        broker
            .inject(TOPIC, Message::new(format!("m{}", i), at_second(second)))
            .await;
    }
    pipeline.shutdown().await.unwrap();

    let persisted: Vec<_> = store.rows().into_iter().map(|r| r.text).collect();
    let republished: Vec<_> = broker
        .sent()
        .into_iter()
        .map(|(_, m)| m.payload().to_string())
        .collect();
    assert_eq!(persisted, vec!["m1", "m3", "m5", "m7", "m9"]);
    assert_eq!(republished, vec!["m0", "m2", "m4", "m6", "m8"]);
}

#[tokio::test]
async fn test_shutdown_commits_queued_items_before_stopped() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new().with_append_delay(std::time::Duration::from_millis(25));
    let clock = ManualClock::new(at_second(44));
    let pipeline = start(&broker, &store, &clock).await;
    let mut phase = pipeline.watch_phase();

    for i in 0..5 {
        broker
            .inject(TOPIC, Message::new(format!("q{}", i), at_second(44)))
            .await;
    }
    assert!(store.rows().len() < 5);

    let observer = {
        let store = store.clone();
        tokio::spawn(async move {
            loop {
                if phase.changed().await.is_err() {
                    return None;
                }
                let current = *phase.borrow_and_update();
                if current == Phase::Stopped {
                    return Some(store.rows().len());
                }
            }
        })
    };

    pipeline.shutdown().await.unwrap();
    assert_eq!(store.rows().len(), 5);
    assert_eq!(observer.await.unwrap(), Some(5));
}

#[tokio::test]
async fn test_teardown_releases_everything_once() {
    let broker = RecordingBroker::new();
    let store = MemoryStore::new();
    let clock = ManualClock::new(at_second(2));
    let pipeline = start(&broker, &store, &clock).await;
    assert_eq!(broker.subscriber_count(), 1);
    assert_eq!(pipeline.phase(), Phase::Running);

    pipeline.shutdown().await.unwrap();
    assert_eq!(broker.subscriber_count(), 0);
    assert!(broker.is_closed());
    assert_eq!(broker.close_calls(), 1);
}
