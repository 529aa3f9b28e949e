//! Stripe Payment Intents
//!
//! Thin wrapper around the async-stripe client. Only the two calls the
//! purchase flow needs are exposed.

use async_trait::async_trait;
use stripe::{
    Client, CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods, Currency,
    PaymentIntent as StripePaymentIntent, PaymentIntentId, RequestStrategy, StripeError,
};

use super::PaymentProvider;
use crate::error::{PaymentError, Result};
use crate::intent::{IntentRequest, IntentStatus, PaymentIntent};

/// Stripe client wrapper
#[derive(Clone)]
pub struct StripeProvider {
    client: Client,
}

impl StripeProvider {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;

        Ok(Self::new(&secret_key))
    }

    /// Get the underlying Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

impl std::fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent> {
        let currency = parse_currency(&request.currency)?;

        let mut params = CreatePaymentIntent::new(request.amount_minor, currency);
        params.metadata = Some(request.metadata.to_map());
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            allow_redirects: None,
        });

        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(request.idempotency_key.clone()));

        let intent = StripePaymentIntent::create(&client, params)
            .await
            .map_err(|e| map_stripe_error(e, "create payment intent"))?;

        tracing::debug!(intent_id = %intent.id, amount = intent.amount, "Stripe payment intent created");

        Ok(to_view(intent))
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        let id = intent_id
            .parse::<PaymentIntentId>()
            .map_err(|_| PaymentError::IntentNotFound(intent_id.to_string()))?;

        let intent = StripePaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| match e {
                StripeError::Stripe(ref request) if request.http_status == 404 => {
                    PaymentError::IntentNotFound(intent_id.to_string())
                }
                other => map_stripe_error(other, "retrieve payment intent"),
            })?;

        Ok(to_view(intent))
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

fn parse_currency(code: &str) -> Result<Currency> {
    serde_json::from_value(serde_json::Value::String(code.to_lowercase()))
        .map_err(|_| PaymentError::Config(format!("currency '{code}' is not supported by Stripe")))
}

fn to_view(intent: StripePaymentIntent) -> PaymentIntent {
    PaymentIntent {
        id: intent.id.to_string(),
        client_secret: intent.client_secret,
        amount: intent.amount,
        currency: intent.currency.to_string(),
        status: IntentStatus::parse(intent.status.as_str()),
        metadata: intent.metadata,
    }
}

/// Rate limits and 5xx are transient; everything else the provider says no to
/// is final.
fn map_stripe_error(error: StripeError, operation: &str) -> PaymentError {
    match error {
        StripeError::Stripe(request) => {
            let message = request
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            let status = request.http_status;

            if status == 429 || (500..600).contains(&status) {
                PaymentError::ProviderUnavailable(format!("{operation}: {status} {message}"))
            } else {
                PaymentError::ProviderRejected(format!("{operation}: {status} {message}"))
            }
        }
        StripeError::Timeout => PaymentError::ProviderUnavailable(format!("{operation}: request timed out")),
        StripeError::ClientError(msg) => {
            PaymentError::ProviderUnavailable(format!("{operation}: HTTP client error: {msg}"))
        }
        other => PaymentError::ProviderRejected(format!("{operation}: {other}")),
    }
}
