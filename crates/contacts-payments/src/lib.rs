//! # contacts-payments
//!
//! Credit purchases for contacts-paywall: payment intents, the status poll and
//! the provider webhook, all converging on one idempotent reconciliation.
//!
//! ## Purchase Flow
//!
//! ```text
//! ┌─────────┐  POST /payment   ┌────────────────┐  create intent  ┌──────────┐
//! │ Client  │─────────────────▶│ PaymentGateway │────────────────▶│  Stripe  │
//! │         │◀─────────────────│                │◀────────────────│          │
//! └─────────┘  client secret   └────────────────┘                 └──────────┘
//!      │                              │                                │
//!      │ GET /payment?paymentIntentId │ retrieve                       │ POST /webhook
//!      └─────────────────────────────▶│                                ▼
//!                                     │                       ┌────────────────┐
//!                                     └──────────────────────▶│   Reconciler   │
//!                                       succeeded             │ (by intent id) │
//!                                                             └───────┬────────┘
//!                                                                     ▼
//!                                                               CreditLedger
//! ```
//!
//! Whichever of the poll or the webhook sees the succeeded intent first
//! credits it; the other finds the audit row and does nothing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use contacts_payments::{CreditPricing, PaymentGateway, StripeProvider};
//!
//! let provider = Arc::new(StripeProvider::from_env()?);
//! let gateway = PaymentGateway::new(provider, ledger, CreditPricing::from_env()?, retry);
//!
//! let created = gateway.create_intent(&user_id, 5).await?;
//! // Hand created.client_secret to the payment form
//! ```

mod error;
mod gateway;
mod intent;
mod pricing;
mod provider;
mod reconcile;
mod webhook;

pub use error::{PaymentError, Result};
pub use gateway::PaymentGateway;
pub use intent::{
    CreatedIntent, IntentMetadata, IntentRequest, IntentStatus, PaymentIntent, StatusReport,
};
pub use pricing::{CreditPackage, CreditPricing, MAX_CREDITS_PER_INTENT};
pub use provider::{MockPaymentProvider, PaymentProvider, StripeProvider};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use webhook::{
    DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER, WebhookEvent, WebhookHandler, WebhookOutcome,
    signature_header, verify_signature,
};
