//! In-Memory Stores
//!
//! For development and tests. Each store keeps all state behind one mutex, so
//! every trait method is a single atomic step.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ContactStore, CreditStore};
use crate::error::{CoreError, Result};
use crate::model::{
    Contact, ContactFields, ContactId, CreditBalance, CreditGrant, GrantOutcome, PaymentRecord,
    UserId,
};

#[derive(Default)]
struct CreditState {
    balances: HashMap<UserId, CreditBalance>,
    payments: Vec<PaymentRecord>,
}

/// In-memory credit store
#[derive(Default)]
pub struct MemoryCreditStore {
    state: Mutex<CreditState>,
}

impl MemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a balance directly (fixtures and local development)
    pub async fn set_balance(&self, user: UserId, credits: i64) {
        let mut state = self.state.lock().await;
        state.balances.insert(
            user,
            CreditBalance {
                user_id: user,
                credits,
                updated_at: Utc::now(),
            },
        );
    }

    /// Total number of audit rows
    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn fetch_balance(&self, user: &UserId) -> Result<Option<CreditBalance>> {
        Ok(self.state.lock().await.balances.get(user).cloned())
    }

    async fn ensure_balance(&self, user: &UserId) -> Result<CreditBalance> {
        let mut state = self.state.lock().await;
        Ok(state
            .balances
            .entry(*user)
            .or_insert_with(|| CreditBalance::empty(*user))
            .clone())
    }

    async fn compare_and_set(&self, user: &UserId, expected: i64, new: i64) -> Result<bool> {
        if new < 0 {
            return Err(CoreError::Validation(format!(
                "credit balance cannot become negative ({new})"
            )));
        }

        let mut state = self.state.lock().await;
        match state.balances.get_mut(user) {
            Some(balance) if balance.credits == expected => {
                balance.credits = new;
                balance.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_grant(
        &self,
        user: &UserId,
        credits: i64,
        grant: &CreditGrant,
    ) -> Result<GrantOutcome> {
        let mut state = self.state.lock().await;

        if let Some(intent_id) = grant.intent_id() {
            if state
                .payments
                .iter()
                .any(|p| p.intent_id.as_deref() == Some(intent_id))
            {
                return Ok(GrantOutcome::AlreadyApplied);
            }
        }

        let balance = state
            .balances
            .entry(*user)
            .or_insert_with(|| CreditBalance::empty(*user));
        balance.credits += credits;
        balance.updated_at = Utc::now();
        let new_balance = balance.credits;

        state.payments.push(PaymentRecord::new(*user, credits, grant));

        Ok(GrantOutcome::Applied {
            balance: new_balance,
        })
    }

    async fn find_payment(&self, intent_id: &str) -> Result<Option<PaymentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn list_payments(&self, user: &UserId) -> Result<Vec<PaymentRecord>> {
        let state = self.state.lock().await;
        let mut result: Vec<_> = state
            .payments
            .iter()
            .filter(|p| p.user_id == *user)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }
}

/// In-memory contact store
#[derive(Default)]
pub struct MemoryContactStore {
    contacts: Mutex<HashMap<ContactId, Contact>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.contacts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contacts.lock().await.is_empty()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn insert(&self, contact: &Contact) -> Result<Contact> {
        let mut contacts = self.contacts.lock().await;
        Ok(contacts
            .entry(contact.id)
            .or_insert_with(|| contact.clone())
            .clone())
    }

    async fn get(&self, owner: &UserId, id: &ContactId) -> Result<Option<Contact>> {
        let contacts = self.contacts.lock().await;
        Ok(contacts.get(id).filter(|c| c.is_owned_by(owner)).cloned())
    }

    async fn update(
        &self,
        owner: &UserId,
        id: &ContactId,
        fields: &ContactFields,
    ) -> Result<Option<Contact>> {
        let mut contacts = self.contacts.lock().await;
        Ok(contacts
            .get_mut(id)
            .filter(|c| c.is_owned_by(owner))
            .map(|contact| {
                contact.fields = fields.clone();
                contact.updated_at = Utc::now();
                contact.clone()
            }))
    }

    async fn delete(&self, owner: &UserId, id: &ContactId) -> Result<bool> {
        let mut contacts = self.contacts.lock().await;
        if contacts.get(id).is_some_and(|c| c.is_owned_by(owner)) {
            contacts.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list(&self, owner: &UserId) -> Result<Vec<Contact>> {
        let contacts = self.contacts.lock().await;
        let mut result: Vec<_> = contacts
            .values()
            .filter(|c| c.is_owned_by(owner))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    fn fields(first: &str) -> ContactFields {
        ContactFields {
            first_name: first.into(),
            last_name: "Doe".into(),
            phone: "5551234567".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = MemoryCreditStore::new();
        let u = user();
        store.set_balance(u, 2).await;

        assert!(store.compare_and_set(&u, 2, 1).await.unwrap());
        assert!(!store.compare_and_set(&u, 2, 1).await.unwrap());
        assert!(store.compare_and_set(&u, 1, -1).await.is_err());
        assert_eq!(store.fetch_balance(&u).await.unwrap().unwrap().credits, 1);
    }

    #[tokio::test]
    async fn test_compare_and_set_missing_row() {
        let store = MemoryCreditStore::new();
        assert!(!store.compare_and_set(&user(), 0, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_dedups_by_intent() {
        let store = MemoryCreditStore::new();
        let u = user();
        let grant = CreditGrant::Purchase {
            intent_id: "pi_1".into(),
            amount_minor: 500,
        };

        let first = store.apply_grant(&u, 5, &grant).await.unwrap();
        let second = store.apply_grant(&u, 5, &grant).await.unwrap();

        assert_eq!(first, GrantOutcome::Applied { balance: 5 });
        assert_eq!(second, GrantOutcome::AlreadyApplied);
        assert_eq!(store.payment_count().await, 1);
        assert!(store.find_payment("pi_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refunds_are_not_deduplicated() {
        let store = MemoryCreditStore::new();
        let u = user();

        store.apply_grant(&u, 1, &CreditGrant::Refund).await.unwrap();
        let outcome = store.apply_grant(&u, 1, &CreditGrant::Refund).await.unwrap();

        assert_eq!(outcome, GrantOutcome::Applied { balance: 2 });
        assert_eq!(store.list_payments(&u).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_contacts_are_owner_scoped() {
        let store = MemoryContactStore::new();
        let (alice, bob) = (user(), user());
        let contact = store.insert(&Contact::new(alice, fields("Ann"))).await.unwrap();

        assert!(store.get(&bob, &contact.id).await.unwrap().is_none());
        assert!(
            store
                .update(&bob, &contact.id, &fields("Eve"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(!store.delete(&bob, &contact.id).await.unwrap());
        assert_eq!(store.list(&bob).await.unwrap().len(), 0);

        let updated = store
            .update(&alice, &contact.id, &fields("Anna"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.fields.first_name, "Anna");
        assert!(store.delete(&alice, &contact.id).await.unwrap());
        assert!(!store.delete(&alice, &contact.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_by_id() {
        let store = MemoryContactStore::new();
        let contact = Contact::new(user(), fields("Ann"));

        store.insert(&contact).await.unwrap();
        store.insert(&contact).await.unwrap();

        assert_eq!(store.len().await, 1);
    }
}
