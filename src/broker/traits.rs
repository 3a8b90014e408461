//! Broker collaborator contracts

use crate::broker::error::BrokerResult;
use crate::pipeline::message::Message;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Invoked once per delivered message, possibly concurrently for distinct
/// messages
pub type MessageCallback = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// An open connection to a publish/subscribe broker
///
/// Shared by reference between the subscription dispatch and senders. Only
/// the owner of the connection calls `close`.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish one message on `topic`
    async fn send(&self, topic: &str, message: Message) -> BrokerResult<()>;

    /// Register `callback` for every message delivered on `topic`
    async fn subscribe(
        &self,
        topic: &str,
        callback: MessageCallback,
    ) -> BrokerResult<Box<dyn Subscription>>;

    /// Release the connection
    async fn close(&self) -> BrokerResult<()>;
}

/// Handle to an active subscription
#[async_trait]
pub trait Subscription: Send {
    fn topic(&self) -> &str;

    /// Stop delivery.
    ///
    /// Resolves once no callback for this subscription is running or will
    /// run again.
    async fn cancel(self: Box<Self>) -> BrokerResult<()>;
}

/// Opens broker connections
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> BrokerResult<Arc<dyn Broker>>;
}

/// Send-only view of a broker connection
///
/// Handed to tasks that publish but must not dispose of the connection.
#[derive(Clone)]
pub struct Outbound {
    broker: Arc<dyn Broker>,
}

impl Outbound {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub async fn send(&self, topic: &str, message: Message) -> BrokerResult<()> {
        self.broker.send(topic, message).await
    }
}
