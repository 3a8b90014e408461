//! Lanes
//!
//! A lane is one unbounded in-process queue paired with the single worker
//! task that drains it. The pipeline runs two of them, one per treatment.
//!
//! ```text
//!   producer ──send──► LaneWriter ──► [ 1 | 2 | 3 | ... ] ──► LaneReader ──► handler
//!                          │                                                   │
//!                        close ─────────── end of stream ──────────────► returns
//! ```
//!
//! Writes never block. There is no capacity bound, which is only acceptable
//! because the producer is the in-process classifier.

mod channel;
mod error;

pub use channel::{create_lane, LaneReader, LaneTask, LaneWriter};
pub use error::{LaneError, LaneResult};
