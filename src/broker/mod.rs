//! Publish/subscribe broker boundary
//!
//! The pipeline talks to its broker only through the [`Broker`] trait. The
//! crate ships [`InMemoryBroker`] as the process-local implementation.

mod error;
pub mod memory;
mod traits;

pub use error::{BrokerError, BrokerResult};
pub use memory::InMemoryBroker;
pub use traits::{Broker, BrokerConnector, MessageCallback, Outbound, Subscription};
