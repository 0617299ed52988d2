use std::time::Duration;
use thiserror::Error;

/// Crate-wide error type with categorization for retry decisions
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // I/O errors (potentially transient)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors (usually permanent)
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Network errors (transient - should retry)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Client errors (permanent - don't retry)
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    // Search pipeline errors. The field cannot be called `source`:
    // thiserror would treat it as the error's cause.
    #[error("Source unavailable: {source_name} - {reason}")]
    SourceUnavailable {
        source_name: String,
        reason: String,
    },

    #[error("All {attempted} sources failed to return results")]
    AllSourcesFailed { attempted: usize },

    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        /// Server-mandated wait, when the response carried one
        retry_after: Option<Duration>,
    },

    // PDF acquisition errors (per-paper, non-fatal for the batch)
    #[error("PDF unavailable: {reason}")]
    PdfUnavailable { reason: String },

    #[error("Storage failure: {reason}")]
    StorageFailure { reason: String },

    // Deadline errors
    #[error("Request deadline exceeded after {elapsed:?}")]
    RequestTimeout { elapsed: Duration },

    // Parse errors
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    // General service error
    #[error("Service error: {0}")]
    Service(String),

    // Source adapter catch-all
    #[error("Source error: {0}")]
    Source(String),
}

/// Error categorization for retry strategies
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Permanent errors - should not retry
    Permanent,
    /// Transient errors - safe to retry
    Transient,
    /// Rate limited - retry with backoff
    RateLimited,
}

impl Error {
    /// Categorize error for retry logic
    pub fn category(&self) -> ErrorCategory {
        match self {
            // Permanent errors - don't retry
            Error::Config(_)
            | Error::InvalidInput { .. }
            | Error::Parse { .. }
            | Error::PdfUnavailable { .. }
            | Error::AllSourcesFailed { .. }
            | Error::Serde(_) => ErrorCategory::Permanent,

            // Rate limited - retry with backoff
            Error::RateLimitExceeded { .. } => ErrorCategory::RateLimited,

            // Transient errors - retry with exponential backoff
            Error::Http(_)
            | Error::SourceUnavailable { .. }
            | Error::StorageFailure { .. }
            | Error::RequestTimeout { .. }
            | Error::Io(_)
            | Error::Service(_)
            | Error::Source(_) => ErrorCategory::Transient,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::RateLimited
        )
    }

    /// Get suggested retry delay for rate limited errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// Source adapter error conversion
impl From<crate::sources::SourceError> for Error {
    fn from(err: crate::sources::SourceError) -> Self {
        match err {
            crate::sources::SourceError::Network(msg) => {
                Error::Source(format!("Network error: {}", msg))
            }
            crate::sources::SourceError::Parse(msg) => Error::Parse {
                context: "source".to_string(),
                message: msg,
            },
            crate::sources::SourceError::RateLimit => {
                Error::RateLimitExceeded { retry_after: None }
            }
            crate::sources::SourceError::Auth(msg) => {
                Error::Source(format!("Authentication failed: {}", msg))
            }
            crate::sources::SourceError::InvalidQuery(msg) => Error::InvalidInput {
                field: "query".to_string(),
                reason: msg,
            },
            crate::sources::SourceError::ServiceUnavailable(msg) => {
                Error::Source(format!("Service unavailable: {}", msg))
            }
            crate::sources::SourceError::Timeout => Error::RequestTimeout {
                elapsed: Duration::from_secs(30),
            },
        }
    }
}
