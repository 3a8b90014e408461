//! In-process broker
//!
//! Topic-addressed fan-out to subscribers, each with its own unbounded
//! channel and dispatch task. Delivery to one subscriber spawns one task per
//! message, so callbacks run concurrently.

use crate::broker::error::{BrokerError, BrokerResult};
use crate::broker::traits::{Broker, BrokerConnector, MessageCallback, Subscription};
use crate::pipeline::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle, JoinSet};

struct SubscriberInfo {
    topic: String,
    sender: UnboundedSender<Message>,
}

#[derive(Default)]
struct BrokerInner {
    subscribers: Mutex<HashMap<u64, SubscriberInfo>>,
    next_subscription_id: AtomicU64,
    closed: AtomicBool,
    messages_sent: AtomicUsize,
}

impl BrokerInner {
    fn subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SubscriberInfo>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Broker living inside the process
///
/// Clones share the same topics and subscribers.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscribers()
            .values()
            .filter(|info| info.topic == topic)
            .count()
    }

    /// Total accepted sends since creation
    pub fn messages_sent(&self) -> usize {
        self.inner.messages_sent.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, topic: &str, message: Message) -> BrokerResult<()> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let mut subscribers = self.inner.subscribers();
        let mut gone = Vec::new();
        let mut delivered = 0usize;
        for (id, info) in subscribers.iter().filter(|(_, info)| info.topic == topic) {
            if info.sender.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                gone.push(*id);
            }
        }
        for id in gone {
            subscribers.remove(&id);
        }
        drop(subscribers);

        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "Broker: message on '{}' delivered to {} subscriber(s)",
            topic,
            delivered
        );
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

        let id = self
            .inner
            .next_subscription_id
            .fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded_channel();
        self.inner.subscribers().insert(
            id,
            SubscriberInfo {
                topic: topic.to_string(),
                sender,
            },
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let dispatch = tokio::spawn(dispatch_loop(topic.to_string(), receiver, stop_rx, callback));
        log::debug!("Broker: subscription {} registered on '{}'", id, topic);

        Ok(Box::new(InMemorySubscription {
            id,
            topic: topic.to_string(),
            broker: Arc::downgrade(&self.inner),
            stop: Some(stop_tx),
            dispatch: Some(dispatch),
        }))
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(BrokerError::Closed);
        }
        // Dropping the senders ends every dispatch loop.
        self.inner.subscribers().clear();
        log::debug!("Broker: connection closed");
        Ok(())
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self) -> BrokerResult<Arc<dyn Broker>> {
        if self.is_closed() {
            return Err(BrokerError::ConnectFailed {
                message: "in-memory broker has been closed".to_string(),
            });
        }
        Ok(Arc::new(self.clone()))
    }
}

async fn dispatch_loop(
    topic: String,
    mut receiver: UnboundedReceiver<Message>,
    mut stop_rx: oneshot::Receiver<()>,
    callback: MessageCallback,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            next = receiver.recv() => match next {
                Some(message) => {
                    in_flight.spawn(callback(message));
                }
                None => break,
            },
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                report_callback_outcome(&topic, done);
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        report_callback_outcome(&topic, done);
    }
    log::trace!("Broker: dispatch for '{}' finished", topic);
}

fn report_callback_outcome(topic: &str, outcome: Result<(), JoinError>) {
    if let Err(e) = outcome {
        log::error!("Broker: callback for '{}' failed: {}", topic, e);
    }
}

/// Subscription on an [`InMemoryBroker`]
pub struct InMemorySubscription {
    id: u64,
    topic: String,
    broker: Weak<BrokerInner>,
    stop: Option<oneshot::Sender<()>>,
    dispatch: Option<JoinHandle<()>>,
}

impl InMemorySubscription {
    fn detach(&mut self) {
        if let Some(inner) = self.broker.upgrade() {
            inner.subscribers().remove(&self.id);
        }
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn cancel(mut self: Box<Self>) -> BrokerResult<()> {
        self.detach();
        if let Some(dispatch) = self.dispatch.take() {
            if let Err(e) = dispatch.await {
                log::error!("Broker: dispatch for '{}' ended abnormally: {}", self.topic, e);
            }
        }
        log::debug!(
            "Broker: subscription {} on '{}' cancelled",
            self.id,
            self.topic
        );
        Ok(())
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::time::{sleep, timeout, Duration};

    fn recording_callback() -> (MessageCallback, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: MessageCallback = Arc::new(move |message: Message| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(message);
            }
            .boxed()
        });
        (callback, seen)
    }

    async fn settle() {
        sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_send_reaches_subscribers_on_same_topic_only() {
        let broker = InMemoryBroker::new();
        let (on_a, seen_a) = recording_callback();
        let (on_b, seen_b) = recording_callback();
        let _sub_a = broker.subscribe("a", on_a).await.unwrap();
        let _sub_b = broker.subscribe("b", on_b).await.unwrap();

        broker.send("a", Message::now("one")).await.unwrap();
        settle().await;

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert!(seen_b.lock().unwrap().is_empty());
        assert_eq!(broker.messages_sent(), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let broker = InMemoryBroker::new();
        let (callback, seen) = recording_callback();
        let sub = broker.subscribe("t", callback).await.unwrap();
        assert_eq!(sub.topic(), "t");
        assert_eq!(broker.subscriber_count("t"), 1);

        sub.cancel().await.unwrap();
        assert_eq!(broker.subscriber_count("t"), 0);

        broker.send("t", Message::now("late")).await.unwrap();
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_waits_for_in_flight_callbacks() {
        let broker = InMemoryBroker::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        let callback: MessageCallback = Arc::new(move |_message: Message| {
            let counter = counter.clone();
            async move {
                sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        let sub = broker.subscribe("slow", callback).await.unwrap();

        broker.send("slow", Message::now("x")).await.unwrap();
        broker.send("slow", Message::now("y")).await.unwrap();
        settle().await;

        timeout(Duration::from_secs(1), sub.cancel())
            .await
            .expect("cancel should finish")
            .unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_callbacks_run_concurrently() {
        let broker = InMemoryBroker::new();
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let callback: MessageCallback = Arc::new(move |_message: Message| {
            let counter = counter.clone();
            let mut release = release_rx.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = release.wait_for(|go| *go).await;
            }
            .boxed()
        });
        let sub = broker.subscribe("c", callback).await.unwrap();

        for i in 0..3 {
            broker
                .send("c", Message::now(format!("m{}", i)))
                .await
                .unwrap();
        }
        settle().await;
        // All three are in flight at once while none has been released.
        assert_eq!(started.load(Ordering::SeqCst), 3);

        release_tx.send(true).unwrap();
        sub.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_broker_rejects_operations() {
        let broker = InMemoryBroker::new();
        broker.close().await.unwrap();
        assert!(broker.is_closed());

        assert!(matches!(
            broker.send("t", Message::now("x")).await,
            Err(BrokerError::Closed)
        ));
        let (callback, _) = recording_callback();
        assert!(broker.subscribe("t", callback).await.is_err());
        assert!(matches!(broker.close().await, Err(BrokerError::Closed)));
        assert!(broker.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscription_detaches() {
        let broker = InMemoryBroker::new();
        let (callback, _) = recording_callback();
        let sub = broker.subscribe("t", callback).await.unwrap();
        drop(sub);
        assert_eq!(broker.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_connect_shares_state() {
        let broker = InMemoryBroker::new();
        let connection = broker.connect().await.unwrap();
        let (callback, seen) = recording_callback();
        let _sub = broker.subscribe("shared", callback).await.unwrap();

        connection
            .send("shared", Message::now("via connection"))
            .await
            .unwrap();
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
