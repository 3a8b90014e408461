//! Persistence store contracts and row types

use crate::pipeline::message::Message;
use crate::store::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A row before the store has assigned its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for NewRow {
    fn from(message: &Message) -> Self {
        Self {
            text: message.payload().to_string(),
            timestamp: message.timestamp(),
        }
    }
}

impl NewRow {
    pub(crate) fn with_id(self, id: u64) -> Row {
        Row {
            id,
            text: self.text,
            timestamp: self.timestamp,
        }
    }
}

/// An open store connection, owned by a single task
#[async_trait]
pub trait Store: Send {
    /// Apply pending schema migrations. Safe to run repeatedly.
    async fn migrate(&mut self) -> StoreResult<()>;

    /// Write and commit one row
    async fn append(&mut self, row: NewRow) -> StoreResult<Row>;
}

/// Opens a store connection inside the task that will own it
#[async_trait]
pub trait StoreConnector: Send + 'static {
    async fn connect(self: Box<Self>) -> StoreResult<Box<dyn Store>>;
}
