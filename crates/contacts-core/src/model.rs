//! Domain Model
//!
//! Contacts, credit balances and the payment audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{CoreError, Result};

/// Authenticated user identifier (issued by the hosted auth provider)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse a user id, rejecting anything that is not a UUID
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| CoreError::Validation(format!("invalid user id '{s}'")))
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contact identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(Uuid);

impl ContactId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| CoreError::NotFound(format!("contact {s}")))
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContactId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Writable contact fields, as submitted by the contact form
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactFields {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100))]
    pub last_name: String,

    #[validate(length(min = 1, max = 32))]
    pub phone: String,

    #[serde(default)]
    #[validate(email, length(max = 254))]
    pub email: Option<String>,

    #[serde(default)]
    #[validate(length(max = 500))]
    pub address: Option<String>,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

impl ContactFields {
    /// Trim everything and drop empty optionals, then validate
    pub fn normalized(self) -> Result<Self> {
        let fields = Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: non_empty(self.email),
            address: non_empty(self.address),
            postal_code: non_empty(self.postal_code),
            note: non_empty(self.note),
        };

        fields.validate().map_err(|errors| {
            let mut names: Vec<String> = errors
                .field_errors()
                .keys()
                .map(ToString::to_string)
                .collect();
            names.sort();
            CoreError::Validation(format!("invalid or missing fields: {}", names.join(", ")))
        })?;

        Ok(fields)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A contact record, owned exclusively by its creator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,

    #[serde(flatten)]
    pub fields: ContactFields,

    pub created_by: UserId,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Create a new contact owned by `owner`
    pub fn new(owner: UserId, fields: ContactFields) -> Self {
        let now = Utc::now();
        Self {
            id: ContactId::generate(),
            fields,
            created_by: owner,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.created_by == *user
    }

    /// Full display name
    pub fn display_name(&self) -> String {
        format!("{} {}", self.fields.first_name, self.fields.last_name)
    }

    pub fn formatted_phone(&self) -> String {
        format_phone(&self.fields.phone)
    }
}

/// Format a phone number for display.
///
/// Recognises North American numbers with or without the leading `1`, and
/// 12-digit numbers with the `33` country code (the trailing digit is kept
/// after the last group). Anything else is returned as-is.
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();

    match digits.len() {
        10 => format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10]),
        11 if digits.starts_with('1') => {
            format!("1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..11])
        }
        12 if digits.starts_with("33") => format!(
            "+33 {} {} {} {} {}{}",
            &digits[2..3],
            &digits[3..5],
            &digits[5..7],
            &digits[7..9],
            &digits[9..11],
            &digits[11..]
        ),
        _ => phone.to_string(),
    }
}

/// Per-user credit balance. Exactly one per user, never negative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub user_id: UserId,
    pub credits: i64,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            credits: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Audit row status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Credits granted for a reconciled payment intent
    Completed,
    /// Credit returned after a failed contact insert
    Refunded,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// Append-only audit record of a credit grant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: UserId,
    /// Provider intent id; the dedup key for purchases
    pub intent_id: Option<String>,
    /// Charged amount in minor currency units
    pub amount: i64,
    pub credits: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn new(user_id: UserId, credits: i64, grant: &CreditGrant) -> Self {
        let (intent_id, amount, status) = match grant {
            CreditGrant::Purchase {
                intent_id,
                amount_minor,
            } => (Some(intent_id.clone()), *amount_minor, PaymentStatus::Completed),
            CreditGrant::Refund => (None, 0, PaymentStatus::Refunded),
        };

        Self {
            id: Uuid::new_v4(),
            user_id,
            intent_id,
            amount,
            credits,
            status,
            created_at: Utc::now(),
        }
    }
}

/// Why credits are being added
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreditGrant {
    /// Confirmed external payment, deduplicated by intent id
    Purchase { intent_id: String, amount_minor: i64 },
    /// Compensation for a consumed credit whose contact insert failed
    Refund,
}

impl CreditGrant {
    pub fn intent_id(&self) -> Option<&str> {
        match self {
            Self::Purchase { intent_id, .. } => Some(intent_id),
            Self::Refund => None,
        }
    }
}

/// Result of adding credits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Balance increased; carries the new balance
    Applied { balance: i64 },
    /// A record for this intent already exists; nothing changed
    AlreadyApplied,
}

impl GrantOutcome {
    pub const fn applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
