//! Lane Error Types

#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    #[error("Lane '{lane}' is closed")]
    Closed { lane: &'static str },

    #[error("Lane '{lane}' worker panicked: {message}")]
    WorkerPanicked { lane: &'static str, message: String },

    #[error("Lane '{lane}' worker was cancelled")]
    WorkerCancelled { lane: &'static str },
}

/// Result type for lane operations
pub type LaneResult<T> = Result<T, LaneError>;

impl crate::core::error_handling::ContextualError for LaneError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
