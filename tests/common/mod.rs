//! Shared helpers for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lanerouter::broker::{
    Broker, BrokerConnector, BrokerError, BrokerResult, MessageCallback, Subscription,
};
use lanerouter::pipeline::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Broker that records every send instead of delivering it
///
/// Messages only reach subscribers through [`RecordingBroker::inject`], so a
/// republished message does not loop back into the pipeline.
#[derive(Clone, Default)]
pub struct RecordingBroker {
    inner: Arc<RecordingInner>,
}

#[derive(Default)]
struct RecordingInner {
    sent: Mutex<Vec<(String, Message)>>,
    callbacks: Mutex<HashMap<u64, (String, MessageCallback)>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    close_calls: AtomicU64,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to every subscriber of `topic` and wait for the callbacks
    pub async fn inject(&self, topic: &str, message: Message) {
        let callbacks: Vec<MessageCallback> = self
            .inner
            .callbacks
            .lock()
            .unwrap()
            .values()
            .filter(|(t, _)| t == topic)
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(message.clone()).await;
        }
    }

    pub fn sent(&self) -> Vec<(String, Message)> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.callbacks.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u64 {
        self.inner.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn send(&self, topic: &str, message: Message) -> BrokerResult<()> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        self.inner
            .sent
            .lock()
            .unwrap()
            .push((topic.to_string(), message));
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        callback: MessageCallback,
    ) -> BrokerResult<Box<dyn Subscription>> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .callbacks
            .lock()
            .unwrap()
            .insert(id, (topic.to_string(), callback));
        Ok(Box::new(RecordingSubscription {
            id,
            topic: topic.to_string(),
            broker: self.clone(),
        }))
    }

    async fn close(&self) -> BrokerResult<()> {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnector for RecordingBroker {
    async fn connect(&self) -> BrokerResult<Arc<dyn Broker>> {
        Ok(Arc::new(self.clone()))
    }
}

struct RecordingSubscription {
    id: u64,
    topic: String,
    broker: RecordingBroker,
}

#[async_trait]
impl Subscription for RecordingSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn cancel(self: Box<Self>) -> BrokerResult<()> {
        self.broker.inner.callbacks.lock().unwrap().remove(&self.id);
        Ok(())
    }
}

/// Fixed instant on a chosen second of the minute
pub fn at_second(second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, second).unwrap()
}

pub fn millis(ms: i64) -> Duration {
    Duration::milliseconds(ms)
}

/// Poll `condition` until it holds, failing after two seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
