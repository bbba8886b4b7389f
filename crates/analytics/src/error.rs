use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// A boxed, thread-safe underlying cause kept for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by an `AnalyticsStore` or one of its snapshots.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A failure that may succeed if the whole operation is attempted again,
    /// e.g. a dropped connection or a serialization conflict.
    #[error("Transient storage failure: {0}")]
    Transient(#[source] BoxError),

    /// A failure that retrying will not fix.
    #[error("Storage failure: {0}")]
    Failed(#[source] BoxError),

    /// The store itself is in an unusable state.
    #[error("Storage internal failure: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn transient(cause: impl Into<BoxError>) -> Self {
        StoreError::Transient(cause.into())
    }

    pub fn failed(cause: impl Into<BoxError>) -> Self {
        StoreError::Failed(cause.into())
    }
}

/// Everything that can go wrong between receiving a date range and returning analytics.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid date range: from {from} is after to {to}")]
    InvalidDateRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Date range exceeds the maximum allowed period of {max_days} days")]
    PeriodTooLarge { max_days: i64 },

    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("Analytics query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analytics query was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AnalyticsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Internal(message) => AnalyticsError::Internal(message),
            other => AnalyticsError::Storage(other),
        }
    }
}

/// The coarse class of an `AnalyticsError`, stable for callers to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself was malformed.
    InvalidInput,
    /// The backend failed while serving a well-formed request.
    Storage,
    /// The deadline passed or the caller gave up.
    Timeout,
    Internal,
}

impl ErrorCategory {
    /// A machine-readable code for the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Storage => "database_error",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Internal => "internal_error",
        }
    }
}

impl AnalyticsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalyticsError::MissingParameter(_)
            | AnalyticsError::InvalidDateRange { .. }
            | AnalyticsError::PeriodTooLarge { .. } => ErrorCategory::InvalidInput,
            AnalyticsError::Storage(_) => ErrorCategory::Storage,
            AnalyticsError::Timeout(_) | AnalyticsError::Cancelled => ErrorCategory::Timeout,
            AnalyticsError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the caller, rather than the backend, is at fault.
    pub fn is_client_error(&self) -> bool {
        self.category() == ErrorCategory::InvalidInput
    }

    /// A message safe to show to untrusted callers. Storage and internal
    /// causes are replaced by a generic text.
    pub fn public_message(&self) -> String {
        match self.category() {
            ErrorCategory::InvalidInput | ErrorCategory::Timeout => self.to_string(),
            ErrorCategory::Storage => "A storage error occurred".to_string(),
            ErrorCategory::Internal => "An internal error occurred".to_string(),
        }
    }
}
