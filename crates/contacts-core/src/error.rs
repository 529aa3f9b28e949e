//! Error Types

use thiserror::Error;

/// Result type alias for ledger and contact operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or invalid configuration (never retried)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record absent, or owned by someone else
    #[error("Not found: {0}")]
    NotFound(String),

    /// Balance below one credit
    #[error("Insufficient credits")]
    InsufficientCredits,

    /// Store unreachable (connection loss, pool exhausted)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Operation exceeded its deadline
    #[error("Timed out: {operation} after {millis}ms")]
    Timeout { operation: String, millis: u128 },

    /// Concurrent writers kept winning the compare-and-set
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ledger could not be reached after retries
    #[error("Credit ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Data that should never exist (bad payment metadata, duplicate rows)
    #[error("Integrity anomaly: {0}")]
    Integrity(String),

    /// Non-transient store failure (constraint violation, bad query)
    #[error("Store error: {0}")]
    Store(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl CoreError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout { .. } | Self::Conflict(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => "Service configuration error.".into(),
            Self::Validation(msg) => format!("Invalid input: {msg}"),
            Self::NotFound(_) => "Contact not found.".into(),
            Self::InsufficientCredits => {
                "You don't have enough credits to create a new contact.".into()
            }
            Self::Unavailable(_)
            | Self::Timeout { .. }
            | Self::Conflict(_)
            | Self::LedgerUnavailable(_) => {
                "The service is temporarily unavailable. Please try again.".into()
            }
            Self::Auth(_) => "Authentication failed. Please sign in again.".into(),
            Self::Integrity(_) | Self::Store(_) => "An unexpected error occurred.".into(),
        }
    }
}
