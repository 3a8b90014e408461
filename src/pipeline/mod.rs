//! Message routing pipeline
//!
//! ```text
//!  topic ──► Classifier ──even──► persistence lane ──► store append
//!    ▲          │    └──odd, re-stamped──► republish lane ──┐
//!    │        stale                                         │
//!    │          ▼                                           │
//!    │        drop                                          │
//!    └──────────────────── broker send ◄────────────────────┘
//! ```
//!
//! [`Pipeline`] wires the pieces together and owns their teardown.

pub mod classifier;
mod error;
pub mod message;
pub mod orchestrator;
pub mod persistence;
pub mod republish;
pub mod stats;

pub use classifier::{AgeParityPolicy, Classifier, Route, RouteKind, RoutingPolicy};
pub use error::{PipelineError, PipelineResult};
pub use message::Message;
pub use orchestrator::{Phase, Pipeline, PipelineSettings, PERSISTENCE_LANE, REPUBLISH_LANE};
pub use stats::{PipelineStats, StatsSnapshot};
