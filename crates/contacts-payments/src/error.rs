//! Payment Error Types

use std::time::Duration;

use contacts_core::{CoreError, RetryableError};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Missing secret key, webhook secret or price (never retried)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request (non-positive credit amount, bad user id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider unreachable, rate limited or failing server-side
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider refused the request
    #[error("Payment provider rejected request: {0}")]
    ProviderRejected(String),

    /// No such payment intent
    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),

    /// Provider call exceeded its deadline
    #[error("Timed out: {operation} after {millis}ms")]
    Timeout { operation: String, millis: u128 },

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Intent metadata missing or malformed; nothing may be credited
    #[error("Invalid payment metadata: {0}")]
    InvalidMetadata(String),

    /// Credit ledger failure
    #[error(transparent)]
    Ledger(#[from] CoreError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_) | Self::Timeout { .. } => true,
            Self::Ledger(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => "Payments are not configured.".into(),
            Self::Validation(msg) => format!("Invalid request: {msg}"),
            Self::ProviderUnavailable(_) | Self::Timeout { .. } => {
                "Payment processing is temporarily unavailable. Please try again.".into()
            }
            Self::ProviderRejected(_) => "Payment processing failed. Please try again.".into(),
            Self::IntentNotFound(_) => "Payment not found.".into(),
            Self::WebhookSignature(_) => "Webhook signature verification failed.".into(),
            Self::WebhookParse(_) => "Malformed webhook payload.".into(),
            Self::InvalidMetadata(_) => "Invalid payment metadata.".into(),
            Self::Ledger(err) => err.user_message(),
        }
    }
}

impl RetryableError for PaymentError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            millis: after.as_millis(),
        }
    }

    fn offline(operation: &str) -> Self {
        Self::ProviderUnavailable(format!("{operation}: provider offline"))
    }
}
