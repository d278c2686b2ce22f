//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while driving a wizard.
///
/// A step refusing to validate is not an error; it surfaces as
/// [`Transition::Blocked`](crate::controller::Transition::Blocked).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Wizard session is closed")]
    SessionClosed,

    #[error("Stale commit {token}: {reason}")]
    StaleCommit { token: String, reason: String },

    #[error("Step action failed: {step} - {message}")]
    ActionFailed { step: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    pub(crate) fn stale(token: impl ToString, reason: impl Into<String>) -> Self {
        Self::StaleCommit {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}
