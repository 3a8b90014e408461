//! In-memory store
//!
//! Rows live in a shared vector that stays readable after the owning
//! connection is gone. Optional append delay and failure injection make it
//! the store of choice for pipeline tests.

use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::{NewRow, Row, Store, StoreConnector};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct SharedRows {
    rows: Mutex<Vec<Row>>,
    migrate_calls: AtomicUsize,
    schema_version: AtomicUsize,
}

/// Process-local store
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<SharedRows>,
    append_delay: Option<Duration>,
    fail_after: Option<usize>,
    fail_migration: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every append before committing
    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    /// Reject every append once `committed` rows exist
    pub fn failing_after(mut self, committed: usize) -> Self {
        self.fail_after = Some(committed);
        self
    }

    /// Make `migrate` fail
    pub fn failing_migration(mut self) -> Self {
        self.fail_migration = true;
        self
    }

    /// Snapshot of every committed row
    pub fn rows(&self) -> Vec<Row> {
        self.shared
            .rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn migrate_calls(&self) -> usize {
        self.shared.migrate_calls.load(Ordering::SeqCst)
    }

    pub fn schema_version(&self) -> usize {
        self.shared.schema_version.load(Ordering::SeqCst)
    }
}

const SCHEMA_VERSION: usize = 1;

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(self: Box<Self>) -> StoreResult<Box<dyn Store>> {
        Ok(Box::new(MemoryConnection { store: *self }))
    }
}

struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl Store for MemoryConnection {
    async fn migrate(&mut self) -> StoreResult<()> {
        self.store.shared.migrate_calls.fetch_add(1, Ordering::SeqCst);
        if self.store.fail_migration {
            return Err(StoreError::MigrationFailed {
                message: "injected migration failure".to_string(),
            });
        }
        self.store
            .shared
            .schema_version
            .fetch_max(SCHEMA_VERSION, Ordering::SeqCst);
        Ok(())
    }

    async fn append(&mut self, row: NewRow) -> StoreResult<Row> {
        if self.store.schema_version() < SCHEMA_VERSION {
            return Err(StoreError::NotMigrated);
        }
        if let Some(delay) = self.store.append_delay {
            tokio::time::sleep(delay).await;
        }

        let mut rows = self
            .store
            .shared
            .rows
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if self.store.fail_after.is_some_and(|limit| rows.len() >= limit) {
            return Err(StoreError::AppendRejected {
                message: format!("injected failure after {} rows", rows.len()),
            });
        }
        let row = row.with_id(rows.len() as u64 + 1);
        rows.push(row.clone());
        Ok(row)
    }
}
