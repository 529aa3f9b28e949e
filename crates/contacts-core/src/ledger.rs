//! Credit Ledger
//!
//! Owns the per-user credit balance. One credit pays for one contact.
//!
//! ```text
//!   try_decrement ──read──▶ credits ≥ 1 ? ──CAS(n → n-1)──▶ true
//!         ▲                      │ no                 │ lost
//!         └──────── re-read ◀────┼────────────────────┘
//!                                ▼
//!                              false
//! ```
//!
//! Decrements are compare-and-set against the last value read, so concurrent
//! spenders of the last credit serialise to a single winner. Increments go
//! through [`CreditStore::apply_grant`], which writes the balance and the
//! audit row in one commit and deduplicates purchases by intent id.

use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::model::{CreditGrant, GrantOutcome, PaymentRecord, UserId};
use crate::retry::RetryPolicy;
use crate::store::CreditStore;

/// Rounds of lost compare-and-set before giving up
const MAX_CAS_ROUNDS: u32 = 16;

/// Credit ledger over a [`CreditStore`]
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn CreditStore>,
    retry: RetryPolicy,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn CreditStore> {
        &self.store
    }

    /// Current credits, creating a zero balance on first access
    pub async fn get_balance(&self, user: &UserId) -> Result<i64> {
        let balance = self
            .retry
            .run("ensure balance", || self.store.ensure_balance(user))
            .await
            .map_err(unavailable)?;

        Ok(balance.credits)
    }

    /// Spend one credit if available.
    ///
    /// Returns `false` without touching the balance when it is below one. A
    /// failed swap is reported as [`CoreError::LedgerUnavailable`] and never
    /// re-issued, since it may have been applied before the error.
    pub async fn try_decrement(&self, user: &UserId) -> Result<bool> {
        for round in 1..=MAX_CAS_ROUNDS {
            let current = self.get_balance(user).await?;
            if current < 1 {
                tracing::debug!(user_id = %user, credits = current, "Not enough credits to spend");
                return Ok(false);
            }

            // Single attempt: a swap that failed ambiguously may already be applied
            let swapped = self
                .retry
                .single_attempt()
                .run("decrement credits", || {
                    self.store.compare_and_set(user, current, current - 1)
                })
                .await
                .map_err(unavailable)?;

            if swapped {
                tracing::info!(user_id = %user, credits = current - 1, "Spent one credit");
                return Ok(true);
            }

            tracing::debug!(user_id = %user, round, "Lost credit compare-and-set, re-reading");
        }

        Err(CoreError::Conflict(format!(
            "credit balance for {user} kept changing during decrement"
        )))
    }

    /// Add credits and append the audit row.
    ///
    /// Purchases are idempotent by intent id, so retries (and duplicate
    /// deliveries) are safe; refunds go out as a single attempt.
    pub async fn increment(
        &self,
        user: &UserId,
        credits: i64,
        grant: CreditGrant,
    ) -> Result<GrantOutcome> {
        if credits <= 0 {
            return Err(CoreError::Validation(format!(
                "credit amount must be positive, got {credits}"
            )));
        }

        let policy = match grant {
            CreditGrant::Purchase { .. } => self.retry.clone(),
            CreditGrant::Refund => self.retry.single_attempt(),
        };

        let outcome = policy
            .run("grant credits", || self.store.apply_grant(user, credits, &grant))
            .await
            .map_err(unavailable)?;

        match outcome {
            GrantOutcome::Applied { balance } => tracing::info!(
                user_id = %user,
                credits,
                balance,
                intent_id = grant.intent_id().unwrap_or("-"),
                "Credits granted"
            ),
            GrantOutcome::AlreadyApplied => tracing::warn!(
                user_id = %user,
                intent_id = grant.intent_id().unwrap_or("-"),
                "Duplicate grant ignored, intent already reconciled"
            ),
        }

        Ok(outcome)
    }

    /// Give back credits consumed by a failed operation
    pub async fn refund(&self, user: &UserId, credits: i64) -> Result<GrantOutcome> {
        self.increment(user, credits, CreditGrant::Refund).await
    }

    /// Audit trail, newest first
    pub async fn payments(&self, user: &UserId) -> Result<Vec<PaymentRecord>> {
        self.retry
            .run("list payments", || self.store.list_payments(user))
            .await
            .map_err(unavailable)
    }
}

/// Transient failures that survived the retry policy mean the ledger is down
fn unavailable(err: CoreError) -> CoreError {
    if err.is_retryable() {
        CoreError::LedgerUnavailable(err.to_string())
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreditBalance;
    use crate::store::MemoryCreditStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    fn ledger_with(store: Arc<MemoryCreditStore>) -> CreditLedger {
        CreditLedger::new(
            store,
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_secs(1)),
        )
    }

    /// Store whose every call fails with a transient error
    struct DownStore;

    #[async_trait]
    impl CreditStore for DownStore {
        async fn fetch_balance(&self, _: &UserId) -> Result<Option<CreditBalance>> {
            Err(CoreError::Unavailable("connection refused".into()))
        }
        async fn ensure_balance(&self, _: &UserId) -> Result<CreditBalance> {
            Err(CoreError::Unavailable("connection refused".into()))
        }
        async fn compare_and_set(&self, _: &UserId, _: i64, _: i64) -> Result<bool> {
            Err(CoreError::Unavailable("connection refused".into()))
        }
        async fn apply_grant(&self, _: &UserId, _: i64, _: &CreditGrant) -> Result<GrantOutcome> {
            Err(CoreError::Unavailable("connection refused".into()))
        }
        async fn find_payment(&self, _: &str) -> Result<Option<PaymentRecord>> {
            Err(CoreError::Unavailable("connection refused".into()))
        }
        async fn list_payments(&self, _: &UserId) -> Result<Vec<PaymentRecord>> {
            Err(CoreError::Unavailable("connection refused".into()))
        }
    }

    /// Commits the first swap, then reports it as failed
    struct LostReply {
        inner: MemoryCreditStore,
        tripped: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl CreditStore for LostReply {
        async fn fetch_balance(&self, user: &UserId) -> Result<Option<CreditBalance>> {
            self.inner.fetch_balance(user).await
        }
        async fn ensure_balance(&self, user: &UserId) -> Result<CreditBalance> {
            self.inner.ensure_balance(user).await
        }
        async fn compare_and_set(&self, user: &UserId, expected: i64, new: i64) -> Result<bool> {
            let swapped = self.inner.compare_and_set(user, expected, new).await?;
            if !self.tripped.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(CoreError::Unavailable("connection reset after commit".into()));
            }
            Ok(swapped)
        }
        async fn apply_grant(&self, user: &UserId, credits: i64, grant: &CreditGrant) -> Result<GrantOutcome> {
            self.inner.apply_grant(user, credits, grant).await
        }
        async fn find_payment(&self, intent_id: &str) -> Result<Option<PaymentRecord>> {
            self.inner.find_payment(intent_id).await
        }
        async fn list_payments(&self, user: &UserId) -> Result<Vec<PaymentRecord>> {
            self.inner.list_payments(user).await
        }
    }

    #[tokio::test]
    async fn test_balance_created_lazily() {
        let store = Arc::new(MemoryCreditStore::new());
        let ledger = ledger_with(store.clone());
        let u = user();

        assert!(store.fetch_balance(&u).await.unwrap().is_none());
        assert_eq!(ledger.get_balance(&u).await.unwrap(), 0);
        assert!(store.fetch_balance(&u).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_decrement_with_zero_balance() {
        let ledger = ledger_with(Arc::new(MemoryCreditStore::new()));
        let u = user();

        assert!(!ledger.try_decrement(&u).await.unwrap());
        assert_eq!(ledger.get_balance(&u).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_decrement_spends_one() {
        let store = Arc::new(MemoryCreditStore::new());
        let ledger = ledger_with(store.clone());
        let u = user();
        store.set_balance(u, 3).await;

        assert!(ledger.try_decrement(&u).await.unwrap());
        assert_eq!(ledger.get_balance(&u).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_of_last_credit() {
        let store = Arc::new(MemoryCreditStore::new());
        let ledger = ledger_with(store.clone());
        let u = user();
        store.set_balance(u, 1).await;

        let attempts = (0..16).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.try_decrement(&u).await })
        });
        let results = futures::future::join_all(attempts).await;

        let wins = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(ledger.get_balance(&u).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_positive() {
        let ledger = ledger_with(Arc::new(MemoryCreditStore::new()));
        let result = ledger.refund(&user(), 0).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_purchase_increment_is_idempotent() {
        let store = Arc::new(MemoryCreditStore::new());
        let ledger = ledger_with(store.clone());
        let u = user();
        let grant = CreditGrant::Purchase {
            intent_id: "pi_abc".into(),
            amount_minor: 2000,
        };

        let first = ledger.increment(&u, 10, grant.clone()).await.unwrap();
        let second = ledger.increment(&u, 10, grant).await.unwrap();

        assert!(first.applied());
        assert!(!second.applied());
        assert_eq!(ledger.get_balance(&u).await.unwrap(), 10);
        assert_eq!(ledger.payments(&u).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_swap_failure_spends_at_most_one() {
        let store = Arc::new(LostReply {
            inner: MemoryCreditStore::new(),
            tripped: std::sync::atomic::AtomicBool::new(false),
        });
        let u = user();
        store.inner.set_balance(u, 3).await;
        let ledger = CreditLedger::new(
            store.clone(),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_secs(1)),
        );

        let result = ledger.try_decrement(&u).await;

        assert!(matches!(result, Err(CoreError::LedgerUnavailable(_))));
        assert_eq!(ledger.get_balance(&u).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_outage_is_ledger_unavailable() {
        let ledger = CreditLedger::new(
            Arc::new(DownStore),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(1)),
        );

        let result = ledger.try_decrement(&user()).await;
        assert!(matches!(result, Err(CoreError::LedgerUnavailable(_))));
    }
}
