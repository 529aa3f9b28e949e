//! HTTP error responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use contacts_core::CoreError;
use contacts_payments::PaymentError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            code,
        }
    }

    pub fn bad_request(code: &'static str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, error)
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", error)
    }

    pub fn payments_disabled() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "PAYMENTS_DISABLED",
            "Payments not configured",
        )
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let (status, code) = core_status(&err);
        log(status, &err);
        Self::new(status, code, err.user_message())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        let (status, code) = match &err {
            PaymentError::Ledger(inner) => core_status(inner),
            PaymentError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED"),
            PaymentError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            PaymentError::InvalidMetadata(_) => (StatusCode::BAD_REQUEST, "INVALID_METADATA"),
            PaymentError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
            PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
            PaymentError::IntentNotFound(_) => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
            PaymentError::ProviderUnavailable(_) | PaymentError::Timeout { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE")
            }
            PaymentError::ProviderRejected(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
        };

        log(status, &err);
        Self::new(status, code, err.user_message())
    }
}

const fn core_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "CONFIG_ERROR"),
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CoreError::InsufficientCredits => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS"),
        CoreError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        CoreError::Unavailable(_)
        | CoreError::Timeout { .. }
        | CoreError::Conflict(_)
        | CoreError::LedgerUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        CoreError::Integrity(_) | CoreError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    }
}

fn log(status: StatusCode, err: &dyn std::fmt::Display) {
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::debug!(status = status.as_u16(), error = %err, "Request rejected");
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (CoreError::InsufficientCredits.into(), StatusCode::PAYMENT_REQUIRED),
            (CoreError::NotFound("c".into()).into(), StatusCode::NOT_FOUND),
            (CoreError::Validation("phone".into()).into(), StatusCode::BAD_REQUEST),
            (CoreError::Unavailable("down".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::Config("x".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::Store("x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (PaymentError::ProviderRejected("card".into()).into(), StatusCode::BAD_GATEWAY),
            (PaymentError::InvalidMetadata("credits".into()).into(), StatusCode::BAD_REQUEST),
            (PaymentError::IntentNotFound("pi".into()).into(), StatusCode::NOT_FOUND),
            (
                PaymentError::Ledger(CoreError::LedgerUnavailable("down".into())).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status, status, "{}", err.code);
        }
    }
}
