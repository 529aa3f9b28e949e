//! Contact Store Access
//!
//! Owner-scoped CRUD over a [`ContactStore`], with the paywall in front of
//! creation: one credit is spent before the insert and handed back if the
//! insert fails.
//!
//! The refund is best-effort. If the insert fails and the refund fails too,
//! the user is left one credit short; that case is logged at error level with
//! enough context for a manual correction.

use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::ledger::CreditLedger;
use crate::model::{Contact, ContactFields, ContactId, UserId};
use crate::retry::RetryPolicy;
use crate::store::ContactStore;

/// Contact service
#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn ContactStore>,
    ledger: CreditLedger,
    retry: RetryPolicy,
}

impl ContactService {
    pub fn new(store: Arc<dyn ContactStore>, ledger: CreditLedger, retry: RetryPolicy) -> Self {
        Self {
            store,
            ledger,
            retry,
        }
    }

    pub const fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Create a contact, paying one credit for it
    pub async fn create(&self, user: &UserId, fields: ContactFields) -> Result<Contact> {
        // Reject bad input before any credit moves
        let fields = fields.normalized()?;

        if !self.ledger.try_decrement(user).await? {
            return Err(CoreError::InsufficientCredits);
        }

        let contact = Contact::new(*user, fields);

        match self
            .retry
            .run("insert contact", || self.store.insert(&contact))
            .await
        {
            Ok(stored) => {
                tracing::info!(user_id = %user, contact_id = %stored.id, "Contact created");
                Ok(stored)
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %user,
                    contact_id = %contact.id,
                    error = %err,
                    "Contact insert failed, refunding credit"
                );

                match self.ledger.refund(user, 1).await {
                    Ok(_) => tracing::info!(user_id = %user, "Credit refunded"),
                    Err(refund_err) => tracing::error!(
                        user_id = %user,
                        contact_id = %contact.id,
                        insert_error = %err,
                        refund_error = %refund_err,
                        "Credit refund failed; user is one credit short and needs manual reconciliation"
                    ),
                }

                Err(err)
            }
        }
    }

    pub async fn get(&self, user: &UserId, id: &ContactId) -> Result<Contact> {
        self.retry
            .run("get contact", || self.store.get(user, id))
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Replace a contact's fields. Contacts of other users are not found.
    pub async fn update(
        &self,
        user: &UserId,
        id: &ContactId,
        fields: ContactFields,
    ) -> Result<Contact> {
        let fields = fields.normalized()?;

        let updated = self
            .retry
            .run("update contact", || self.store.update(user, id, &fields))
            .await?
            .ok_or_else(|| not_found(id))?;

        tracing::info!(user_id = %user, contact_id = %id, "Contact updated");
        Ok(updated)
    }

    /// Delete a contact. Missing, already deleted and foreign ids are all
    /// reported as not found.
    pub async fn delete(&self, user: &UserId, id: &ContactId) -> Result<()> {
        let removed = self
            .retry
            .run("delete contact", || self.store.delete(user, id))
            .await?;

        if !removed {
            return Err(not_found(id));
        }

        tracing::info!(user_id = %user, contact_id = %id, "Contact deleted");
        Ok(())
    }

    /// The user's contacts, newest first
    pub async fn list(&self, user: &UserId) -> Result<Vec<Contact>> {
        self.retry
            .run("list contacts", || self.store.list(user))
            .await
    }
}

fn not_found(id: &ContactId) -> CoreError {
    CoreError::NotFound(format!("contact {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreditBalance, CreditGrant, GrantOutcome, PaymentRecord};
    use crate::store::{CreditStore, MemoryContactStore, MemoryCreditStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    fn fields() -> ContactFields {
        ContactFields {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            phone: "5551234567".into(),
            email: Some("grace@example.com".into()),
            ..Default::default()
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(1))
    }

    fn service(
        credits: Arc<MemoryCreditStore>,
        contacts: Arc<dyn ContactStore>,
    ) -> ContactService {
        ContactService::new(contacts, CreditLedger::new(credits, retry()), retry())
    }

    /// Contact store that rejects every insert
    struct BrokenInserts;

    #[async_trait]
    impl ContactStore for BrokenInserts {
        async fn insert(&self, _: &Contact) -> Result<Contact> {
            Err(CoreError::Unavailable("connection reset".into()))
        }
        async fn get(&self, _: &UserId, _: &ContactId) -> Result<Option<Contact>> {
            Ok(None)
        }
        async fn update(&self, _: &UserId, _: &ContactId, _: &ContactFields) -> Result<Option<Contact>> {
            Ok(None)
        }
        async fn delete(&self, _: &UserId, _: &ContactId) -> Result<bool> {
            Ok(false)
        }
        async fn list(&self, _: &UserId) -> Result<Vec<Contact>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_create_spends_one_credit() {
        let credits = Arc::new(MemoryCreditStore::new());
        let contacts = Arc::new(MemoryContactStore::new());
        let svc = service(credits.clone(), contacts.clone());
        let u = user();
        credits.set_balance(u, 3).await;

        let contact = svc.create(&u, fields()).await.unwrap();

        assert_eq!(svc.ledger().get_balance(&u).await.unwrap(), 2);
        assert_eq!(contact.created_by, u);
        let listed = svc.list(&u).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, contact.id);
    }

    #[tokio::test]
    async fn test_create_without_credits() {
        let credits = Arc::new(MemoryCreditStore::new());
        let contacts = Arc::new(MemoryContactStore::new());
        let svc = service(credits, contacts.clone());

        let result = svc.create(&user(), fields()).await;

        assert!(matches!(result, Err(CoreError::InsufficientCredits)));
        assert!(contacts.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_fields_spend_nothing() {
        let credits = Arc::new(MemoryCreditStore::new());
        let svc = service(credits.clone(), Arc::new(MemoryContactStore::new()));
        let u = user();
        credits.set_balance(u, 1).await;

        let mut bad = fields();
        bad.first_name = "  ".into();

        assert!(matches!(svc.create(&u, bad).await, Err(CoreError::Validation(_))));
        assert_eq!(svc.ledger().get_balance(&u).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_refunds_credit() {
        let credits = Arc::new(MemoryCreditStore::new());
        let svc = service(credits.clone(), Arc::new(BrokenInserts));
        let u = user();
        credits.set_balance(u, 2).await;

        let result = svc.create(&u, fields()).await;

        assert!(result.is_err());
        assert_eq!(svc.ledger().get_balance(&u).await.unwrap(), 2);
        let audit = credits.list_payments(&u).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, crate::model::PaymentStatus::Refunded);
    }

    /// Credit store whose refunds always fail
    struct NoRefunds(MemoryCreditStore);

    #[async_trait]
    impl CreditStore for NoRefunds {
        async fn fetch_balance(&self, user: &UserId) -> Result<Option<CreditBalance>> {
            self.0.fetch_balance(user).await
        }
        async fn ensure_balance(&self, user: &UserId) -> Result<CreditBalance> {
            self.0.ensure_balance(user).await
        }
        async fn compare_and_set(&self, user: &UserId, expected: i64, new: i64) -> Result<bool> {
            self.0.compare_and_set(user, expected, new).await
        }
        async fn apply_grant(&self, _: &UserId, _: i64, _: &CreditGrant) -> Result<GrantOutcome> {
            Err(CoreError::Unavailable("ledger offline".into()))
        }
        async fn find_payment(&self, intent_id: &str) -> Result<Option<PaymentRecord>> {
            self.0.find_payment(intent_id).await
        }
        async fn list_payments(&self, user: &UserId) -> Result<Vec<PaymentRecord>> {
            self.0.list_payments(user).await
        }
    }

    #[tokio::test]
    async fn test_failed_refund_returns_insert_error() {
        let credits = Arc::new(NoRefunds(MemoryCreditStore::new()));
        let u = user();
        credits.0.set_balance(u, 2).await;
        let svc = ContactService::new(
            Arc::new(BrokenInserts),
            CreditLedger::new(credits.clone(), retry()),
            retry(),
        );

        let result = svc.create(&u, fields()).await;

        // The insert error wins; the spent credit stays spent
        assert!(matches!(result, Err(CoreError::Unavailable(msg)) if msg == "connection reset"));
        assert_eq!(svc.ledger().get_balance(&u).await.unwrap(), 1);
        assert!(credits.0.list_payments(&u).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_cannot_modify() {
        let credits = Arc::new(MemoryCreditStore::new());
        let svc = service(credits.clone(), Arc::new(MemoryContactStore::new()));
        let (alice, bob) = (user(), user());
        credits.set_balance(alice, 1).await;

        let contact = svc.create(&alice, fields()).await.unwrap();

        assert!(matches!(
            svc.update(&bob, &contact.id, fields()).await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete(&bob, &contact.id).await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            svc.get(&bob, &contact.id).await,
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(svc.get(&alice, &contact.id).await.unwrap().id, contact.id);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let credits = Arc::new(MemoryCreditStore::new());
        let svc = service(credits.clone(), Arc::new(MemoryContactStore::new()));
        let u = user();
        credits.set_balance(u, 1).await;
        let contact = svc.create(&u, fields()).await.unwrap();

        let mut changed = fields();
        changed.note = Some("met at the conference".into());
        let updated = svc.update(&u, &contact.id, changed).await.unwrap();
        assert_eq!(updated.fields.note.as_deref(), Some("met at the conference"));
        assert!(updated.updated_at >= contact.updated_at);

        svc.delete(&u, &contact.id).await.unwrap();
        assert!(matches!(
            svc.delete(&u, &contact.id).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let credits = Arc::new(MemoryCreditStore::new());
        let svc = service(credits.clone(), Arc::new(MemoryContactStore::new()));
        let u = user();
        credits.set_balance(u, 2).await;

        let first = svc.create(&u, fields()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = svc.create(&u, fields()).await.unwrap();

        let ids: Vec<_> = svc.list(&u).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
