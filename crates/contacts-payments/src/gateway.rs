//! Payment Intent Gateway
//!
//! Starts purchases and answers status polls. A poll that finds the intent
//! succeeded reconciles it on the spot, so a user who returns from the
//! payment form sees the credits even if the webhook is late.

use std::sync::Arc;

use contacts_core::{CreditLedger, RetryPolicy, UserId};
use uuid::Uuid;

use crate::error::{PaymentError, Result};
use crate::intent::{CreatedIntent, IntentMetadata, IntentRequest, StatusReport};
use crate::pricing::{CreditPackage, CreditPricing};
use crate::provider::PaymentProvider;
use crate::reconcile::{ReconcileOutcome, Reconciler};

/// Payment gateway over a [`PaymentProvider`]
#[derive(Clone)]
pub struct PaymentGateway {
    provider: Arc<dyn PaymentProvider>,
    ledger: CreditLedger,
    reconciler: Reconciler,
    pricing: CreditPricing,
    retry: RetryPolicy,
}

impl PaymentGateway {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        ledger: CreditLedger,
        pricing: CreditPricing,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            reconciler: Reconciler::new(ledger.clone()),
            ledger,
            pricing,
            retry,
        }
    }

    pub const fn pricing(&self) -> &CreditPricing {
        &self.pricing
    }

    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start a purchase of `credits` for `user`
    pub async fn create_intent(&self, user: &UserId, credits: i64) -> Result<CreatedIntent> {
        let amount = self.pricing.charge_for(credits)?;

        // First-time purchasers get their ledger row now
        self.ledger.get_balance(user).await?;

        let request = IntentRequest {
            amount_minor: amount,
            currency: self.pricing.currency().to_string(),
            metadata: IntentMetadata::new(*user, credits),
            idempotency_key: Uuid::new_v4().to_string(),
        };

        let intent = self
            .retry
            .run("create payment intent", || self.provider.create_intent(&request))
            .await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            PaymentError::ProviderRejected(format!("intent {} has no client secret", intent.id))
        })?;

        tracing::info!(
            user_id = %user,
            intent_id = %intent.id,
            credits,
            amount,
            provider = self.provider.name(),
            "Payment intent created"
        );

        Ok(CreatedIntent {
            client_secret,
            amount,
            credits,
            intent_id: intent.id,
        })
    }

    /// Current status of an intent, crediting it if it has succeeded
    pub async fn get_status(&self, intent_id: &str) -> Result<StatusReport> {
        let intent_id = intent_id.trim();
        if intent_id.is_empty() {
            return Err(PaymentError::Validation("missing payment intent id".into()));
        }

        let intent = self
            .retry
            .run("retrieve payment intent", || self.provider.retrieve_intent(intent_id))
            .await?;

        if intent.is_succeeded() {
            match self.reconciler.reconcile_intent(&intent).await? {
                ReconcileOutcome::Credited { user_id, credits, .. } => {
                    tracing::info!(%user_id, %intent_id, credits, "Payment reconciled from status poll");
                }
                ReconcileOutcome::AlreadyReconciled { user_id, .. } => {
                    tracing::debug!(%user_id, %intent_id, "Status poll for already reconciled payment");
                }
            }
        }

        Ok(StatusReport::from_status(intent.status))
    }

    /// Purchasable credit bundles
    pub fn packages(&self) -> Vec<CreditPackage> {
        self.pricing.packages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentStatus;
    use crate::provider::MockPaymentProvider;
    use contacts_core::{CreditStore, MemoryCreditStore};
    use std::collections::HashMap;
    use std::time::Duration;

    struct Fixture {
        provider: Arc<MockPaymentProvider>,
        store: Arc<MemoryCreditStore>,
        gateway: PaymentGateway,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(MockPaymentProvider::new());
        let store = Arc::new(MemoryCreditStore::new());
        let retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_secs(1));
        let ledger = CreditLedger::new(store.clone(), retry.clone());
        let pricing = CreditPricing::new(200, "eur").unwrap();
        let gateway = PaymentGateway::new(provider.clone(), ledger, pricing, retry);

        Fixture {
            provider,
            store,
            gateway,
        }
    }

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_purchase_round_trip() {
        let f = fixture();
        let u = user();

        let created = f.gateway.create_intent(&u, 5).await.unwrap();
        assert_eq!(created.amount, 1000);
        assert_eq!(created.credits, 5);

        let pending = f.gateway.get_status(&created.intent_id).await.unwrap();
        assert_eq!(pending.status, IntentStatus::RequiresPaymentMethod);
        assert_eq!(f.store.payment_count().await, 0);

        f.provider.succeed(&created.intent_id).await;
        let report = f.gateway.get_status(&created.intent_id).await.unwrap();

        assert_eq!(report.status, IntentStatus::Succeeded);
        assert_eq!(report.message, "Payment successful and credits added");
        assert_eq!(f.gateway.ledger.get_balance(&u).await.unwrap(), 5);

        let records = f.store.list_payments(&u).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].credits, 5);
        assert_eq!(records[0].intent_id.as_deref(), Some(created.intent_id.as_str()));
    }

    #[tokio::test]
    async fn test_repeated_polls_credit_once() {
        let f = fixture();
        let u = user();
        let created = f.gateway.create_intent(&u, 3).await.unwrap();
        f.provider.succeed(&created.intent_id).await;

        for _ in 0..3 {
            f.gateway.get_status(&created.intent_id).await.unwrap();
        }

        assert_eq!(f.gateway.ledger.get_balance(&u).await.unwrap(), 3);
        assert_eq!(f.store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_initialises_balance() {
        let f = fixture();
        let u = user();

        f.gateway.create_intent(&u, 1).await.unwrap();

        assert!(f.store.fetch_balance(&u).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_amount_never_reaches_provider() {
        let f = fixture();

        for credits in [0, -1, 1001] {
            let result = f.gateway.create_intent(&user(), credits).await;
            assert!(matches!(result, Err(PaymentError::Validation(_))));
        }
        assert_eq!(f.provider.create_count().await, 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_with_same_key() {
        let f = fixture();
        f.provider.fail_next(2).await;

        let created = f.gateway.create_intent(&user(), 2).await.unwrap();

        assert_eq!(f.provider.create_count().await, 3);
        assert!(f.provider.intent(&created.intent_id).await.is_some());

        let keys = f.provider.create_keys().await;
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| *k == keys[0]));

        // A new purchase gets its own key
        f.gateway.create_intent(&user(), 1).await.unwrap();
        assert_ne!(f.provider.create_keys().await[3], keys[0]);
    }

    #[tokio::test]
    async fn test_status_messages() {
        let f = fixture();
        let created = f.gateway.create_intent(&user(), 1).await.unwrap();
        f.provider
            .set_status(&created.intent_id, IntentStatus::Canceled)
            .await;

        let report = f.gateway.get_status(&created.intent_id).await.unwrap();
        assert_eq!(report.message, "Payment was canceled");

        assert!(matches!(
            f.gateway.get_status("  ").await,
            Err(PaymentError::Validation(_))
        ));
        assert!(matches!(
            f.gateway.get_status("pi_unknown").await,
            Err(PaymentError::IntentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_succeeded_intent_with_bad_metadata() {
        let f = fixture();
        let created = f.gateway.create_intent(&user(), 4).await.unwrap();
        f.provider
            .set_metadata(
                &created.intent_id,
                HashMap::from([("credits".to_string(), "4".to_string())]),
            )
            .await;
        f.provider.succeed(&created.intent_id).await;

        let result = f.gateway.get_status(&created.intent_id).await;

        assert!(matches!(result, Err(PaymentError::InvalidMetadata(_))));
        assert_eq!(f.store.payment_count().await, 0);
    }
}
