//! Ingest classification: the single point that decides a message's fate

use crate::core::time::Clock;
use crate::lane::LaneWriter;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::message::Message;
use crate::pipeline::stats::PipelineStats;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::Arc;

/// Outcome of a routing decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Discard without further processing
    Drop,
    /// Hand to the persistence lane
    Persist(Message),
    /// Hand to the republish lane
    Republish(Message),
}

/// Payload-free summary of a [`Route`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Dropped,
    Persisted,
    Republished,
}

impl Route {
    pub fn kind(&self) -> RouteKind {
        match self {
            Route::Drop => RouteKind::Dropped,
            Route::Persist(_) => RouteKind::Persisted,
            Route::Republish(_) => RouteKind::Republished,
        }
    }
}

/// Decides what happens to an inbound message
pub trait RoutingPolicy: Send + Sync {
    fn route(&self, message: Message, now: DateTime<Utc>) -> Route;
}

/// Age filter followed by timestamp-second parity
///
/// - elapsed time of at least `max_age`: dropped
/// - even second-of-minute: persisted unchanged
/// - odd second-of-minute: re-stamped with `now` and republished, so its
///   parity is evaluated again when it comes back from the broker
#[derive(Debug, Clone)]
pub struct AgeParityPolicy {
    max_age: Duration,
}

impl AgeParityPolicy {
    pub const DEFAULT_MAX_AGE_SECS: i64 = 60;

    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl Default for AgeParityPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(Self::DEFAULT_MAX_AGE_SECS))
    }
}

impl RoutingPolicy for AgeParityPolicy {
    fn route(&self, message: Message, now: DateTime<Utc>) -> Route {
        if now - message.timestamp() >= self.max_age {
            return Route::Drop;
        }
        if message.timestamp().second() % 2 == 0 {
            Route::Persist(message)
        } else {
            Route::Republish(message.restamped(now))
        }
    }
}

/// Applies a [`RoutingPolicy`] and enqueues onto the chosen lane
pub struct Classifier {
    policy: Arc<dyn RoutingPolicy>,
    clock: Arc<dyn Clock>,
    persistence: LaneWriter<Message>,
    republish: LaneWriter<Message>,
    stats: Arc<PipelineStats>,
}

impl Classifier {
    pub fn new(
        policy: Arc<dyn RoutingPolicy>,
        clock: Arc<dyn Clock>,
        persistence: LaneWriter<Message>,
        republish: LaneWriter<Message>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            policy,
            clock,
            persistence,
            republish,
            stats,
        }
    }

    /// Route one inbound message onto at most one lane.
    ///
    /// A drop is a normal outcome, not an error. Fails only if the chosen
    /// lane has already been closed.
    pub fn classify(&self, message: Message) -> PipelineResult<RouteKind> {
        let now = self.clock.now();
        let route = self.policy.route(message, now);
        let kind = route.kind();
        self.stats.record_classified();

        match route {
            Route::Drop => {
                self.stats.record_dropped();
                log::trace!("Classifier: stale message dropped");
            }
            Route::Persist(message) => enqueue(&self.persistence, message)?,
            Route::Republish(message) => enqueue(&self.republish, message)?,
        }
        Ok(kind)
    }
}

fn enqueue(lane: &LaneWriter<Message>, message: Message) -> PipelineResult<()> {
    lane.send(message)?;
    log::trace!("Classifier: message enqueued on lane '{}'", lane.lane());
    Ok(())
}
