//! The unit of work flowing through the pipeline

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A message received from, or sent to, the broker
///
/// The payload is opaque to routing. Only the timestamp is ever replaced,
/// and only by the routing policy through [`Message::restamped`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    payload: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(payload: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload: payload.into(),
            timestamp,
        }
    }

    /// Message stamped with the current system time
    pub fn now(payload: impl Into<String>) -> Self {
        Self::new(payload, Utc::now())
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The same message carrying a new timestamp.
    ///
    /// The new timestamp is `now`, unless `now` is not strictly after the
    /// current one, in which case it is the current one plus a microsecond.
    pub fn restamped(self, now: DateTime<Utc>) -> Self {
        let timestamp = if now > self.timestamp {
            now
        } else {
            self.timestamp + Duration::microseconds(1)
        };
        Self {
            payload: self.payload,
            timestamp,
        }
    }
}
