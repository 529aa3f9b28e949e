//! # contacts-core
//!
//! Credit ledger and owner-scoped contact access for contacts-paywall.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ContactService                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ CreditLedger │──▶│ CreditStore  │   │  ContactStore    │  │
//! │  │  (CAS spend) │   │  (Strategy)  │   │   (Strategy)     │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────┘  │
//! │           └──────────── RetryPolicy + ConnectivityProbe ──┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store traits let the service run against PostgreSQL
//! (`contacts-store`) or the in-memory stores here without code changes.

pub mod contacts;
pub mod error;
pub mod ledger;
pub mod model;
pub mod retry;
pub mod session;
pub mod store;

pub use contacts::ContactService;
pub use error::{CoreError, Result};
pub use ledger::CreditLedger;
pub use model::{
    Contact, ContactFields, ContactId, CreditBalance, CreditGrant, GrantOutcome, PaymentRecord,
    PaymentStatus, UserId, format_phone,
};
pub use retry::{AlwaysOnline, ConnectivityProbe, RetryPolicy, RetryableError};
pub use session::{AuthenticatedUser, IdentityProvider, Session};
pub use store::{ContactStore, CreditStore, MemoryContactStore, MemoryCreditStore};
