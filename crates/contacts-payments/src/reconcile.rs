//! Payment Reconciliation
//!
//! Turns a succeeded intent into credits exactly once. Both the webhook and
//! the status poll end up here; the ledger's unique intent id is what keeps
//! the two paths (and provider redeliveries) from double-crediting.

use contacts_core::{CreditGrant, CreditLedger, GrantOutcome, UserId};

use crate::error::{PaymentError, Result};
use crate::intent::{IntentMetadata, PaymentIntent};

/// What a reconciliation did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Credits were added
    Credited {
        user_id: UserId,
        credits: i64,
        balance: i64,
    },
    /// The intent had already been credited
    AlreadyReconciled { user_id: UserId, credits: i64 },
}

impl ReconcileOutcome {
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::Credited { user_id, .. } | Self::AlreadyReconciled { user_id, .. } => user_id,
        }
    }

    pub const fn credited(&self) -> bool {
        matches!(self, Self::Credited { .. })
    }
}

/// Reconciles succeeded payment intents into the credit ledger
#[derive(Clone)]
pub struct Reconciler {
    ledger: CreditLedger,
}

impl Reconciler {
    pub fn new(ledger: CreditLedger) -> Self {
        Self { ledger }
    }

    pub const fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Credit a provider-confirmed intent
    pub async fn reconcile_intent(&self, intent: &PaymentIntent) -> Result<ReconcileOutcome> {
        if !intent.is_succeeded() {
            return Err(PaymentError::Validation(format!(
                "intent {} is {}, not succeeded",
                intent.id, intent.status
            )));
        }

        let metadata = IntentMetadata::from_map(&intent.metadata).inspect_err(|err| {
            tracing::warn!(
                intent_id = %intent.id,
                error = %err,
                "Succeeded payment carries unusable metadata; nothing credited"
            );
        })?;

        self.reconcile(&intent.id, metadata, intent.amount).await
    }

    /// Credit `metadata.credits` to `metadata.user_id` under `intent_id`.
    ///
    /// The credit count always comes from the metadata, never from the amount.
    pub async fn reconcile(
        &self,
        intent_id: &str,
        metadata: IntentMetadata,
        amount_minor: i64,
    ) -> Result<ReconcileOutcome> {
        let IntentMetadata { user_id, credits } = metadata;
        let grant = CreditGrant::Purchase {
            intent_id: intent_id.to_string(),
            amount_minor,
        };

        let outcome = match self.ledger.increment(&user_id, credits, grant).await? {
            GrantOutcome::Applied { balance } => ReconcileOutcome::Credited {
                user_id,
                credits,
                balance,
            },
            GrantOutcome::AlreadyApplied => ReconcileOutcome::AlreadyReconciled { user_id, credits },
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentStatus;
    use contacts_core::{CreditStore, MemoryCreditStore, RetryPolicy};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn setup() -> (Arc<MemoryCreditStore>, Reconciler) {
        let store = Arc::new(MemoryCreditStore::new());
        let ledger = CreditLedger::new(
            store.clone(),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(1)),
        );
        (store, Reconciler::new(ledger))
    }

    fn intent(id: &str, status: IntentStatus, metadata: HashMap<String, String>) -> PaymentIntent {
        PaymentIntent {
            id: id.into(),
            client_secret: None,
            amount: 2000,
            currency: "eur".into(),
            status,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_reconcile_twice_credits_once() {
        let (store, reconciler) = setup();
        let user = UserId::new(Uuid::new_v4());
        let pi = intent(
            "pi_1",
            IntentStatus::Succeeded,
            IntentMetadata::new(user, 10).to_map(),
        );

        let first = reconciler.reconcile_intent(&pi).await.unwrap();
        let second = reconciler.reconcile_intent(&pi).await.unwrap();

        assert_eq!(
            first,
            ReconcileOutcome::Credited {
                user_id: user,
                credits: 10,
                balance: 10
            }
        );
        assert_eq!(second, ReconcileOutcome::AlreadyReconciled { user_id: user, credits: 10 });
        assert_eq!(store.payment_count().await, 1);

        let record = store.find_payment("pi_1").await.unwrap().unwrap();
        assert_eq!(record.amount, 2000);
        assert_eq!(record.credits, 10);
    }

    #[tokio::test]
    async fn test_unsucceeded_intent_is_rejected() {
        let (store, reconciler) = setup();
        let user = UserId::new(Uuid::new_v4());
        let pi = intent(
            "pi_2",
            IntentStatus::Processing,
            IntentMetadata::new(user, 3).to_map(),
        );

        assert!(matches!(
            reconciler.reconcile_intent(&pi).await,
            Err(PaymentError::Validation(_))
        ));
        assert_eq!(store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_bad_metadata_credits_nothing() {
        let (store, reconciler) = setup();
        let metadata = HashMap::from([
            ("userId".to_string(), "someone".to_string()),
            ("credits".to_string(), "10".to_string()),
        ]);
        let pi = intent("pi_3", IntentStatus::Succeeded, metadata);

        assert!(matches!(
            reconciler.reconcile_intent(&pi).await,
            Err(PaymentError::InvalidMetadata(_))
        ));
        assert_eq!(store.payment_count().await, 0);
    }
}
