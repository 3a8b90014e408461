//! Persistence store boundary
//!
//! The persistence lane owns exactly one [`Store`] connection, opened through
//! a [`StoreConnector`] inside the lane's worker.

mod error;
pub mod jsonl;
pub mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use jsonl::{JsonlConnector, JsonlStore};
pub use memory::MemoryStore;
pub use traits::{NewRow, Row, Store, StoreConnector};
