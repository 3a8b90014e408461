//! Generic error handling utilities
//!
//! Fatal errors from every layer end up in `log_error_with_context` at the
//! top of the process. Errors decide for themselves whether their message is
//! fit for an operator or whether only the surrounding context should be shown.

/// Errors that can tell a user-actionable problem from a system failure
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// True for problems the operator can fix directly (bad configuration,
    /// invalid arguments). Broker, store and worker failures are not.
    fn is_user_actionable(&self) -> bool;

    /// The message to show when the error is user-actionable
    fn user_message(&self) -> Option<&str>;
}

/// Log a fatal error with a detail level suited to its kind
///
/// User-actionable errors log their own message. System errors log the
/// operation context followed by the error itself, and the debug
/// representation at debug level.
///
/// # Examples
/// ```rust,no_run
/// # use lanerouter::core::error_handling::log_error_with_context;
/// # use lanerouter::app::config::ConfigError;
/// let err = ConfigError::Invalid("topic must not be empty".to_string());
/// log_error_with_context(&err, "Loading configuration");
/// // Logs: "FATAL: topic must not be empty"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => {
            log::error!("FATAL: {}", user_msg);
        }
        _ => {
            log::error!("FATAL: {}: {}", operation_context, error);
        }
    }
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
