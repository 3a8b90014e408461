//! Pipeline Error Types

use crate::broker::BrokerError;
use crate::lane::LaneError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lane(#[from] LaneError),

    #[error("Lane '{lane}' worker stopped while the pipeline was running")]
    WorkerExited { lane: &'static str },

    #[error("Startup failed: {message}")]
    Startup { message: String },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl crate::core::error_handling::ContextualError for PipelineError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
