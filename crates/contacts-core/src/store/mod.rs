//! Store Abstractions
//!
//! The relational data store is an external collaborator. These traits are
//! the query surface the ledger and contact service need; `memory` provides
//! in-process implementations and the `contacts-store` crate provides
//! PostgreSQL ones.

mod memory;

pub use memory::{MemoryContactStore, MemoryCreditStore};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    Contact, ContactFields, ContactId, CreditBalance, CreditGrant, GrantOutcome, PaymentRecord,
    UserId,
};

/// Credit balance and payment audit storage
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Read a balance row, if one exists
    async fn fetch_balance(&self, user: &UserId) -> Result<Option<CreditBalance>>;

    /// Insert a zero balance if absent, then return the stored row
    async fn ensure_balance(&self, user: &UserId) -> Result<CreditBalance>;

    /// Set `credits` to `new` only if it still equals `expected`.
    ///
    /// Returns `false` when another writer changed the row first. A negative
    /// `new` is rejected as a validation error.
    async fn compare_and_set(&self, user: &UserId, expected: i64, new: i64) -> Result<bool>;

    /// Add credits and append the audit row in a single commit.
    ///
    /// For purchases the intent id is a uniqueness barrier: if a record for
    /// it already exists nothing is written and `AlreadyApplied` is returned.
    async fn apply_grant(
        &self,
        user: &UserId,
        credits: i64,
        grant: &CreditGrant,
    ) -> Result<GrantOutcome>;

    /// Look up the audit row for a payment intent
    async fn find_payment(&self, intent_id: &str) -> Result<Option<PaymentRecord>>;

    /// Audit trail for a user, newest first
    async fn list_payments(&self, user: &UserId) -> Result<Vec<PaymentRecord>>;
}

/// Owner-scoped contact storage.
///
/// Every lookup filters by owner; a row that belongs to someone else is
/// indistinguishable from a missing one.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Insert a contact. Re-inserting the same id is a no-op that returns
    /// the stored row, so retries after an ambiguous failure are safe.
    async fn insert(&self, contact: &Contact) -> Result<Contact>;

    async fn get(&self, owner: &UserId, id: &ContactId) -> Result<Option<Contact>>;

    /// Replace the writable fields; `None` when not found for this owner
    async fn update(
        &self,
        owner: &UserId,
        id: &ContactId,
        fields: &ContactFields,
    ) -> Result<Option<Contact>>;

    /// Returns whether a row was removed
    async fn delete(&self, owner: &UserId, id: &ContactId) -> Result<bool>;

    /// All contacts of `owner`, newest first
    async fn list(&self, owner: &UserId) -> Result<Vec<Contact>>;
}
