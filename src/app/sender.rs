//! Demo message producer
//!
//! Publishes `message #n` stamped with the current time at a fixed
//! interval, so a standalone run has traffic to route.

use crate::broker::{BrokerError, BrokerResult, Outbound};
use crate::core::time::Clock;
use crate::pipeline::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background producer bound to the pipeline's outbound handle
pub struct DemoSender {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<BrokerResult<u64>>,
}

impl DemoSender {
    /// Start sending. A `count` of 0 keeps sending until stopped.
    pub fn spawn(
        outbound: Outbound,
        topic: String,
        clock: Arc<dyn Clock>,
        interval: Duration,
        count: u64,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sent = 0u64;

            while count == 0 || sent < count {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                let message = Message::new(format!("message #{}", sent + 1), clock.now());
                outbound.send(&topic, message).await?;
                sent += 1;
                log::debug!("Demo sender: published message #{}", sent);
            }
            Ok(sent)
        });

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// True once the sender has stopped on its own
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop sending and return how many messages went out
    pub async fn stop(mut self) -> BrokerResult<u64> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(BrokerError::SendFailed {
                topic: String::new(),
                message: format!("demo sender task failed: {}", e),
            }),
        }
    }
}
