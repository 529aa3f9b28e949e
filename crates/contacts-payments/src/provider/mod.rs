//! Payment Providers
//!
//! Abstractions and implementations for the external payment provider.

mod mock;
mod stripe_client;

pub use mock::MockPaymentProvider;
pub use stripe_client::StripeProvider;

use async_trait::async_trait;

use crate::error::Result;
use crate::intent::{IntentRequest, PaymentIntent};

/// Payment provider trait (Strategy pattern)
///
/// Stripe in production, [`MockPaymentProvider`] in tests and local runs.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a payment intent. Calls with the same idempotency key must
    /// return the same intent.
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent>;

    /// Fetch an intent by id
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent>;

    /// Provider name
    fn name(&self) -> &str;
}
