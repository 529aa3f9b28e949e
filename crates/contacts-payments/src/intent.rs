//! Payment Intents
//!
//! The provider owns the intent; this system only keeps the view it needs to
//! drive the purchase and reconcile it. The intent metadata (`userId`,
//! `credits`) is the sole link between the provider's object and the ledger,
//! so it is written verbatim on creation and re-parsed, never re-derived, on
//! reconciliation.

use std::collections::HashMap;

use contacts_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

const META_USER_ID: &str = "userId";
const META_CREDITS: &str = "credits";

/// Provider-side intent status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    RequiresCapture,
    Processing,
    Succeeded,
    Canceled,
    #[serde(untagged)]
    Unknown(String),
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "requires_capture" => Self::RequiresCapture,
            "processing" => Self::Processing,
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::RequiresCapture => "requires_capture",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Unknown(raw) => raw,
        }
    }

    /// Human-readable status for the purchase screen
    pub const fn message(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "Payment requires a payment method",
            Self::RequiresConfirmation => "Payment requires confirmation",
            Self::RequiresAction => "Payment requires additional action",
            Self::Processing => "Payment is processing",
            Self::Canceled => "Payment was canceled",
            Self::Succeeded => "Payment successful and credits added",
            Self::RequiresCapture | Self::Unknown(_) => "Payment status unknown",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation link carried in the intent's metadata
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntentMetadata {
    pub user_id: UserId,
    pub credits: i64,
}

impl IntentMetadata {
    pub const fn new(user_id: UserId, credits: i64) -> Self {
        Self { user_id, credits }
    }

    /// Key-value form sent to the provider
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (META_USER_ID.to_string(), self.user_id.to_string()),
            (META_CREDITS.to_string(), self.credits.to_string()),
        ])
    }

    /// Parse the provider's copy.
    ///
    /// `userId` must be a UUID and `credits` a positive integer; anything else
    /// is an integrity problem and nothing may be credited.
    pub fn from_map(metadata: &HashMap<String, String>) -> Result<Self> {
        let user_id = metadata
            .get(META_USER_ID)
            .ok_or_else(|| PaymentError::InvalidMetadata("missing userId".into()))?;
        let user_id = UserId::parse(user_id)
            .map_err(|_| PaymentError::InvalidMetadata(format!("userId '{user_id}' is not a valid user id")))?;

        let credits = metadata
            .get(META_CREDITS)
            .ok_or_else(|| PaymentError::InvalidMetadata("missing credits".into()))?;
        let credits = credits
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                PaymentError::InvalidMetadata(format!("credits '{credits}' is not a positive integer"))
            })?;

        Ok(Self { user_id, credits })
    }
}

/// Provider-neutral view of a payment intent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    /// Amount in minor currency units
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == IntentStatus::Succeeded
    }
}

/// Parameters for a new intent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: IntentMetadata,
    /// Sent with every attempt so provider-side retries collapse into one intent
    pub idempotency_key: String,
}

/// Result of starting a purchase, as returned to the client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIntent {
    pub client_secret: String,
    pub amount: i64,
    pub credits: i64,
    #[serde(rename = "paymentIntentId")]
    pub intent_id: String,
}

/// Result of a status poll
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: IntentStatus,
    pub message: String,
}

impl StatusReport {
    pub fn from_status(status: IntentStatus) -> Self {
        let message = status.message().to_string();
        Self { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "0b7e4c6a-2f4e-4f1e-9a55-6d2f0c8e1a33";

    fn meta(user: &str, credits: &str) -> HashMap<String, String> {
        HashMap::from([
            ("userId".to_string(), user.to_string()),
            ("credits".to_string(), credits.to_string()),
        ])
    }

    #[test]
    fn test_metadata_round_trip() {
        let parsed = IntentMetadata::from_map(&meta(USER, "5")).unwrap();
        assert_eq!(parsed.credits, 5);
        assert_eq!(parsed.to_map(), meta(USER, "5"));
    }

    #[test]
    fn test_metadata_rejects_garbage() {
        for (user, credits) in [
            ("not-a-uuid", "5"),
            (USER, "0"),
            (USER, "-2"),
            (USER, "ten"),
            (USER, "5abc"),
        ] {
            let result = IntentMetadata::from_map(&meta(user, credits));
            assert!(
                matches!(result, Err(PaymentError::InvalidMetadata(_))),
                "{user}/{credits} should be rejected"
            );
        }

        let missing = HashMap::from([("userId".to_string(), USER.to_string())]);
        assert!(IntentMetadata::from_map(&missing).is_err());
    }

    #[test]
    fn test_status_parsing_and_messages() {
        assert_eq!(IntentStatus::parse("succeeded"), IntentStatus::Succeeded);
        assert_eq!(
            IntentStatus::parse("requires_action").message(),
            "Payment requires additional action"
        );
        let odd = IntentStatus::parse("something_new");
        assert_eq!(odd.as_str(), "something_new");
        assert_eq!(odd.message(), "Payment status unknown");
    }

    #[test]
    fn test_created_intent_wire_format() {
        let created = CreatedIntent {
            client_secret: "pi_1_secret_x".into(),
            amount: 1000,
            credits: 5,
            intent_id: "pi_1".into(),
        };
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["clientSecret"], "pi_1_secret_x");
        assert_eq!(json["paymentIntentId"], "pi_1");

        let report = serde_json::to_value(StatusReport::from_status(IntentStatus::Processing)).unwrap();
        assert_eq!(report["status"], "processing");
        assert_eq!(report["message"], "Payment is processing");
    }
}
