//! Pipeline lifecycle
//!
//! ```text
//!  Starting ──subscribed──► Running ──trigger──► Draining ──both lanes done──► Stopped
//! ```
//!
//! The orchestrator is the only owner of the broker connection. Teardown
//! order: cancel the subscription, close both lanes, wait for both workers,
//! close the connection.

use crate::broker::{Broker, BrokerConnector, MessageCallback, Outbound, Subscription};
use crate::core::time::Clock;
use crate::lane::{create_lane, LaneTask, LaneWriter};
use crate::pipeline::classifier::{Classifier, RoutingPolicy};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::Message;
use crate::pipeline::persistence::run_persistence;
use crate::pipeline::republish::run_republish;
use crate::pipeline::stats::PipelineStats;
use crate::store::StoreConnector;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

pub const PERSISTENCE_LANE: &str = "persistence";
pub const REPUBLISH_LANE: &str = "republish";

/// Lifecycle phase of a [`Pipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Topic consumed, and republished to
    pub topic: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            topic: "lanerouter".to_string(),
        }
    }
}

/// A running routing pipeline
pub struct Pipeline {
    topic: String,
    broker: Arc<dyn Broker>,
    subscription: Option<Box<dyn Subscription>>,
    persistence: LaneWriter<Message>,
    republish: LaneWriter<Message>,
    persistence_task: LaneTask<PipelineError>,
    republish_task: LaneTask<PipelineError>,
    phase: watch::Sender<Phase>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Open the broker, bring up both lanes and subscribe the classifier.
    ///
    /// Returns only once the store is migrated and the subscription is
    /// registered. On failure everything opened so far is released and the
    /// pipeline never reaches `Running`.
    pub async fn start(
        broker_connector: &dyn BrokerConnector,
        store_connector: Box<dyn StoreConnector>,
        settings: PipelineSettings,
        policy: Arc<dyn RoutingPolicy>,
        clock: Arc<dyn Clock>,
    ) -> PipelineResult<Self> {
        let (phase, _) = watch::channel(Phase::Starting);
        let stats = Arc::new(PipelineStats::new());
        let topic = settings.topic;
        log::info!("Pipeline starting on topic '{}'", topic);

        let broker = broker_connector.connect().await?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let worker_stats = stats.clone();
        let (persistence, persistence_task) = create_lane(PERSISTENCE_LANE, move |reader| {
            run_persistence(reader, store_connector, ready_tx, worker_stats)
        });
        if ready_rx.await.is_err() {
            persistence.close();
            let err = match persistence_task.join().await {
                Err(e) => e,
                Ok(()) => PipelineError::Startup {
                    message: "persistence lane ended before the store was ready".to_string(),
                },
            };
            close_quietly(broker.as_ref()).await;
            return Err(err);
        }

        let outbound = Outbound::new(broker.clone());
        let worker_stats = stats.clone();
        let republish_topic = topic.clone();
        let (republish, republish_task) = create_lane(REPUBLISH_LANE, move |reader| {
            run_republish(reader, outbound, republish_topic, worker_stats)
        });

        let classifier = Arc::new(Classifier::new(
            policy,
            clock,
            persistence.clone(),
            republish.clone(),
            stats.clone(),
        ));
        let callback: MessageCallback = Arc::new(move |message: Message| {
            let classifier = classifier.clone();
            async move {
                if let Err(e) = classifier.classify(message) {
                    log::error!("Classification failed: {}", e);
                }
            }
            .boxed()
        });

        let subscription = match broker.subscribe(&topic, callback).await {
            Ok(subscription) => subscription,
            Err(e) => {
                persistence.close();
                republish.close();
                for task in [persistence_task, republish_task] {
                    let lane = task.lane();
                    if let Err(worker) = task.join().await {
                        log::error!("Lane '{}' failed during aborted start: {}", lane, worker);
                    }
                }
                close_quietly(broker.as_ref()).await;
                return Err(e.into());
            }
        };

        phase.send_replace(Phase::Running);
        log::info!("Pipeline running");

        Ok(Self {
            topic,
            broker,
            subscription: Some(subscription),
            persistence,
            republish,
            persistence_task,
            republish_task,
            phase,
            stats,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Receiver that observes every later phase change
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Send-only handle on the pipeline's broker connection
    pub fn outbound(&self) -> Outbound {
        Outbound::new(self.broker.clone())
    }

    /// Run until `trigger` resolves, then drain and stop.
    ///
    /// A lane worker can only end early by failing; in that case the
    /// pipeline is drained anyway and the failure is returned.
    pub async fn run_until<F>(mut self, trigger: F) -> PipelineResult<()>
    where
        F: Future<Output = ()>,
    {
        let early_exit = tokio::select! {
            _ = trigger => None,
            _ = self.persistence_task.wait() => Some(PERSISTENCE_LANE),
            _ = self.republish_task.wait() => Some(REPUBLISH_LANE),
        };

        match early_exit {
            None => self.shutdown().await,
            Some(lane) => {
                log::error!("Lane '{}' stopped while running; draining", lane);
                match self.shutdown().await {
                    Ok(()) => Err(PipelineError::WorkerExited { lane }),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Drain in-flight work and release the broker connection.
    ///
    /// Both workers are always awaited and the connection is always closed.
    /// `Stopped` is entered only when everything shut down cleanly;
    /// otherwise the first failure is returned.
    pub async fn shutdown(mut self) -> PipelineResult<()> {
        self.phase.send_replace(Phase::Draining);
        log::info!("Pipeline draining");

        let mut failure: Option<PipelineError> = None;

        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.cancel().await {
                keep_first(&mut failure, e.into());
            }
        }

        self.persistence.close();
        self.republish.close();

        let lanes = [self.persistence_task.lane(), self.republish_task.lane()];
        let (persisted, republished) = tokio::join!(
            self.persistence_task.join(),
            self.republish_task.join()
        );
        for (lane, outcome) in lanes.into_iter().zip([persisted, republished]) {
            if let Err(e) = outcome {
                log::debug!("Lane '{}' ended with: {}", lane, e);
                keep_first(&mut failure, e);
            }
        }

        if let Err(e) = self.broker.close().await {
            keep_first(&mut failure, e.into());
        }

        match failure {
            None => {
                self.phase.send_replace(Phase::Stopped);
                log::info!("Pipeline stopped ({})", self.stats.snapshot());
                Ok(())
            }
            Some(e) => Err(e),
        }
    }
}

fn keep_first(slot: &mut Option<PipelineError>, error: PipelineError) {
    if slot.is_none() {
        *slot = Some(error);
    } else {
        log::error!("Additional shutdown failure: {}", error);
    }
}

async fn close_quietly(broker: &dyn Broker) {
    if let Err(e) = broker.close().await {
        log::warn!("Broker close after failed start: {}", e);
    }
}
