//! HTTP Handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use contacts_core::{AuthenticatedUser, Contact, ContactFields, ContactId, PaymentRecord, UserId};
use contacts_payments::{
    CreatedIntent, CreditPackage, PaymentError, SIGNATURE_HEADER, StatusReport, WebhookOutcome,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_connected: Option<bool>,
    pub payments_configured: bool,
    pub webhook_configured: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub user_id: String,
    /// Number of credits to buy
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagesResponse {
    pub currency: String,
    pub unit_price: i64,
    pub packages: Vec<CreditPackage>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i64,
}

/// Contact as shown to its owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    #[serde(flatten)]
    pub contact: Contact,
    pub phone_display: String,
}

impl From<Contact> for ContactView {
    fn from(contact: Contact) -> Self {
        Self {
            phone_display: contact.formatted_phone(),
            contact,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedContactResponse {
    pub contact: ContactView,
    /// Balance after paying for this contact; `null` if it could not be read
    pub credits: Option<i64>,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request("INVALID_BODY", rejection.body_text()))
}

// ============================================================================
// Health
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_connected = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_backend,
        database_connected,
        payments_configured: state.payments.is_some(),
        webhook_configured: state.webhooks.is_some(),
    })
}

// ============================================================================
// Payments
// ============================================================================

/// Start a credit purchase
pub async fn create_payment(
    State(state): State<AppState>,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<Json<CreatedIntent>, ApiError> {
    let payments = state.payments.as_ref().ok_or_else(ApiError::payments_disabled)?;
    let request = json_body(body)?;

    let user = UserId::parse(&request.user_id)?;
    let created = payments.create_intent(&user, request.amount).await?;

    Ok(Json(created))
}

/// Poll a purchase; credits are added once it has succeeded
pub async fn payment_status(
    State(state): State<AppState>,
    Query(query): Query<PaymentStatusQuery>,
) -> Result<Json<StatusReport>, ApiError> {
    let payments = state.payments.as_ref().ok_or_else(ApiError::payments_disabled)?;

    let intent_id = query
        .payment_intent_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_INTENT_ID", "Missing payment intent ID"))?;

    Ok(Json(payments.get_status(&intent_id).await?))
}

/// Credit packages and prices
pub async fn list_packages(State(state): State<AppState>) -> Result<Json<PackagesResponse>, ApiError> {
    let payments = state.payments.as_ref().ok_or_else(ApiError::payments_disabled)?;
    let pricing = payments.pricing();

    Ok(Json(PackagesResponse {
        currency: pricing.currency().to_string(),
        unit_price: pricing.unit_price_minor(),
        packages: payments.packages(),
    }))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let webhooks = state.webhooks.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "WEBHOOK_DISABLED",
            "Webhook secret is not configured",
        )
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("MISSING_SIGNATURE", "Missing Stripe signature"))?;

    match webhooks.handle(&body, signature).await {
        Ok(outcome) => {
            if let WebhookOutcome::Anomaly { intent_id, reason } = &outcome {
                tracing::warn!(%intent_id, %reason, "Acknowledged payment with invalid metadata");
            }
            Ok(Json(WebhookResponse { received: true }))
        }
        Err(err @ PaymentError::WebhookSignature(_)) => {
            tracing::warn!(error = %err, "Webhook rejected");
            Err(ApiError::bad_request(
                "INVALID_SIGNATURE",
                "Webhook signature verification failed",
            ))
        }
        Err(err @ PaymentError::WebhookParse(_)) => {
            tracing::warn!(error = %err, "Webhook payload rejected");
            Err(ApiError::bad_request("INVALID_PAYLOAD", "Webhook payload is malformed"))
        }
        Err(err) => {
            // A non-2xx makes the provider redeliver later
            tracing::error!(error = %err, "Webhook processing failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "WEBHOOK_ERROR",
                "Webhook processing failed",
            ))
        }
    }
}

// ============================================================================
// Credits
// ============================================================================

pub async fn get_credits(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let credits = state.ledger.get_balance(&user.id).await?;
    Ok(Json(CreditsResponse { credits }))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    Ok(Json(state.ledger.payments(&user.id).await?))
}

// ============================================================================
// Contacts
// ============================================================================

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<ContactView>>, ApiError> {
    let contacts = state.contacts.list(&user.id).await?;
    Ok(Json(contacts.into_iter().map(ContactView::from).collect()))
}

/// Create a contact, paying one credit
pub async fn create_contact(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<ContactFields>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = json_body(body)?;

    let contact = state.contacts.create(&user.id, fields).await?;

    // The contact is committed; a failed balance read must not turn that into an error
    let credits = match state.ledger.get_balance(&user.id).await {
        Ok(credits) => Some(credits),
        Err(err) => {
            tracing::warn!(
                user_id = %user.id,
                contact_id = %contact.id,
                error = %err,
                "Balance unavailable after contact creation"
            );
            None
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(CreatedContactResponse {
            contact: contact.into(),
            credits,
        }),
    ))
}

pub async fn get_contact(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ContactView>, ApiError> {
    let id = ContactId::parse(&id)?;
    Ok(Json(state.contacts.get(&user.id, &id).await?.into()))
}

pub async fn update_contact(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    body: Result<Json<ContactFields>, JsonRejection>,
) -> Result<Json<ContactView>, ApiError> {
    let id = ContactId::parse(&id)?;
    let fields = json_body(body)?;

    Ok(Json(state.contacts.update(&user.id, &id, fields).await?.into()))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = ContactId::parse(&id)?;
    state.contacts.delete(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
