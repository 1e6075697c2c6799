//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::SessionStateError;
use storage::sqlite::SqliteInitError;

/// Failures surfaced by exam-session operations.
///
/// `Clone` so a single submission outcome can be handed to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ExamError {
    #[error("attempt not found")]
    NotFound,
    #[error("attempt belongs to another user")]
    Forbidden,
    #[error(transparent)]
    InvalidState(#[from] SessionStateError),
    #[error("exam service unavailable: {0}")]
    Transient(String),
    #[error("exam service rejected the request: {0}")]
    Rejected(String),
}

impl ExamError {
    /// Network or timeout failures that may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ExamError::Transient(_))
    }
}

/// Errors raised while reading client configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
