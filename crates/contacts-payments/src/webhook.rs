//! Stripe Webhook Handling
//!
//! Verifies the `Stripe-Signature` header, parses the event envelope and
//! routes payment intent events into the [`Reconciler`].
//!
//! Signatures are checked by hand (HMAC-SHA256 over `"{t}.{payload}"`) so the
//! handler does not depend on the event schema of any one Stripe API version.
//! Only the fields reconciliation needs are parsed out of the payload.

use std::collections::HashMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::error::{PaymentError, Result};
use crate::intent::{IntentStatus, PaymentIntent};
use crate::reconcile::{ReconcileOutcome, Reconciler};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Accepted clock skew between the signature timestamp and now
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verify a `t=<unix>,v1=<hex>[,v1=<hex>...]` signature header.
///
/// Any matching `v1` entry is accepted, which is how Stripe signs during a
/// secret rotation.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::WebhookSignature("missing v1 signature".into()));
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(PaymentError::WebhookSignature(format!(
            "timestamp {timestamp} outside the {tolerance_secs}s tolerance"
        )));
    }

    let mac = signing_mac(payload, secret, timestamp)?;
    let matched = signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|expected| mac.clone().verify_slice(&expected).is_ok());

    if matched {
        Ok(())
    } else {
        Err(PaymentError::WebhookSignature("signature mismatch".into()))
    }
}

/// Build a header the way Stripe does
pub fn signature_header(payload: &str, secret: &str, timestamp: i64) -> Result<String> {
    let mac = signing_mac(payload, secret, timestamp)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={timestamp},v1={signature}"))
}

fn signing_mac(payload: &str, secret: &str, timestamp: i64) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::Config("invalid webhook secret".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(mac)
}

#[derive(Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: IntentObject,
}

#[derive(Deserialize)]
struct IntentObject {
    #[serde(default)]
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    metadata: Value,
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// `payment_intent.succeeded`
    PaymentSucceeded { event_id: String, intent: PaymentIntent },

    /// `payment_intent.payment_failed`
    PaymentFailed { event_id: String, intent_id: String },

    /// `payment_intent.canceled`
    PaymentCanceled { event_id: String, intent_id: String },

    /// Unhandled event type
    Other { event_id: String, event_type: String },
}

/// What handling a delivery did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Succeeded intent reconciled (or found already reconciled)
    Reconciled(ReconcileOutcome),

    /// Succeeded intent with unusable metadata; acknowledged, nothing credited
    Anomaly { intent_id: String, reason: String },

    /// Failed or canceled payment, logged only
    Noted { intent_id: String, event_type: String },

    /// Event type this system does not act on
    Ignored { event_type: String },
}

/// Webhook handler
#[derive(Clone)]
pub struct WebhookHandler {
    secret: String,
    tolerance_secs: i64,
    reconciler: Reconciler,
}

impl WebhookHandler {
    pub fn new(secret: &str, reconciler: Reconciler) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(PaymentError::Config("webhook secret is empty".into()));
        }

        Ok(Self {
            secret: secret.to_string(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            reconciler,
        })
    }

    /// Create from environment variables
    pub fn from_env(reconciler: Reconciler) -> Result<Self> {
        let secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Self::new(&secret, reconciler)
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str) -> Result<WebhookEvent> {
        verify_signature(
            payload,
            signature,
            &self.secret,
            Utc::now().timestamp(),
            self.tolerance_secs,
        )?;

        parse_webhook_event(payload)
    }

    /// Verify and process a delivery.
    ///
    /// Errors mean the delivery should be redelivered (or was forged);
    /// anything acknowledged comes back as `Ok`.
    pub async fn handle(&self, payload: &str, signature: &str) -> Result<WebhookOutcome> {
        let event = self.parse_event(payload, signature)?;

        match event {
            WebhookEvent::PaymentSucceeded { event_id, intent } => {
                tracing::info!(%event_id, intent_id = %intent.id, "Processing payment_intent.succeeded");

                match self.reconciler.reconcile_intent(&intent).await {
                    Ok(outcome) => {
                        if let ReconcileOutcome::Credited { user_id, credits, balance } = &outcome {
                            tracing::info!(
                                %user_id,
                                intent_id = %intent.id,
                                credits,
                                balance,
                                "Payment succeeded, credits added"
                            );
                        }
                        Ok(WebhookOutcome::Reconciled(outcome))
                    }
                    Err(PaymentError::InvalidMetadata(reason)) => Ok(WebhookOutcome::Anomaly {
                        intent_id: intent.id,
                        reason,
                    }),
                    Err(err) => Err(err),
                }
            }

            WebhookEvent::PaymentFailed { event_id, intent_id } => {
                tracing::warn!(%event_id, %intent_id, "Payment failed");
                Ok(WebhookOutcome::Noted {
                    intent_id,
                    event_type: "payment_intent.payment_failed".into(),
                })
            }

            WebhookEvent::PaymentCanceled { event_id, intent_id } => {
                tracing::info!(%event_id, %intent_id, "Payment canceled");
                Ok(WebhookOutcome::Noted {
                    intent_id,
                    event_type: "payment_intent.canceled".into(),
                })
            }

            WebhookEvent::Other { event_id, event_type } => {
                tracing::debug!(%event_id, %event_type, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored { event_type })
            }
        }
    }
}

/// Parse a Stripe event into our event type
fn parse_webhook_event(payload: &str) -> Result<WebhookEvent> {
    let envelope: EventEnvelope =
        serde_json::from_str(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
    let EventEnvelope {
        id: event_id,
        event_type,
        data,
    } = envelope;

    let event = match event_type.as_str() {
        "payment_intent.succeeded" => {
            let object = data.object;
            if object.id.is_empty() {
                return Err(PaymentError::WebhookParse("payment intent without id".into()));
            }

            WebhookEvent::PaymentSucceeded {
                event_id,
                intent: PaymentIntent {
                    status: IntentStatus::Succeeded,
                    metadata: metadata_strings(&object.metadata),
                    id: object.id,
                    client_secret: None,
                    amount: object.amount,
                    currency: object.currency,
                },
            }
        }
        "payment_intent.payment_failed" => WebhookEvent::PaymentFailed {
            event_id,
            intent_id: data.object.id,
        },
        "payment_intent.canceled" => WebhookEvent::PaymentCanceled {
            event_id,
            intent_id: data.object.id,
        },
        _ => WebhookEvent::Other { event_id, event_type },
    };

    Ok(event)
}

/// Stripe metadata values are strings; anything else is kept as its JSON
/// text so validation can reject it with context.
fn metadata_strings(metadata: &Value) -> HashMap<String, String> {
    metadata
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}
