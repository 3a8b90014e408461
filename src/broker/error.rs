//! Broker Error Types

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection is closed")]
    Closed,

    #[error("Unable to connect to broker: {message}")]
    ConnectFailed { message: String },

    #[error("Send to topic '{topic}' failed: {message}")]
    SendFailed { topic: String, message: String },

    #[error("Subscription to topic '{topic}' failed: {message}")]
    SubscribeFailed { topic: String, message: String },
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

impl crate::core::error_handling::ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
