//! Mock Payment Provider
//!
//! In-memory stand-in for Stripe, for tests and local runs without keys.
//! Intents start in `requires_payment_method`; tests drive them forward with
//! [`MockPaymentProvider::succeed`] or [`MockPaymentProvider::set_status`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::PaymentProvider;
use crate::error::{PaymentError, Result};
use crate::intent::{IntentRequest, IntentStatus, PaymentIntent};

#[derive(Default)]
struct MockState {
    intents: HashMap<String, PaymentIntent>,
    by_idempotency_key: HashMap<String, String>,
    next_id: u64,
    failures_remaining: u32,
    /// Idempotency key of every create call, in arrival order
    create_keys: Vec<String>,
}

/// Mock payment provider
#[derive(Default)]
pub struct MockPaymentProvider {
    state: Mutex<MockState>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a transient error
    pub async fn fail_next(&self, n: u32) {
        self.state.lock().await.failures_remaining = n;
    }

    /// Mark an intent as paid
    pub async fn succeed(&self, intent_id: &str) {
        self.set_status(intent_id, IntentStatus::Succeeded).await;
    }

    pub async fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.state.lock().await.intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Overwrite an intent's metadata
    pub async fn set_metadata(&self, intent_id: &str, metadata: HashMap<String, String>) {
        if let Some(intent) = self.state.lock().await.intents.get_mut(intent_id) {
            intent.metadata = metadata;
        }
    }

    pub async fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.state.lock().await.intents.get(intent_id).cloned()
    }

    /// Create calls that reached the provider, retries and replays included
    pub async fn create_count(&self) -> u32 {
        u32::try_from(self.state.lock().await.create_keys.len()).unwrap_or(u32::MAX)
    }

    /// Idempotency keys sent with each create call
    pub async fn create_keys(&self) -> Vec<String> {
        self.state.lock().await.create_keys.clone()
    }
}

fn take_failure(state: &mut MockState, operation: &str) -> Result<()> {
    if state.failures_remaining > 0 {
        state.failures_remaining -= 1;
        return Err(PaymentError::ProviderUnavailable(format!(
            "{operation}: simulated outage"
        )));
    }
    Ok(())
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent> {
        let mut state = self.state.lock().await;
        state.create_keys.push(request.idempotency_key.clone());
        take_failure(&mut state, "create payment intent")?;

        if let Some(existing) = state
            .by_idempotency_key
            .get(&request.idempotency_key)
            .and_then(|id| state.intents.get(id))
        {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let id = format!("pi_mock_{:06}", state.next_id);
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret_mock")),
            id: id.clone(),
            amount: request.amount_minor,
            currency: request.currency.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            metadata: request.metadata.to_map(),
        };

        state
            .by_idempotency_key
            .insert(request.idempotency_key.clone(), id.clone());
        state.intents.insert(id, intent.clone());

        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        let mut state = self.state.lock().await;
        take_failure(&mut state, "retrieve payment intent")?;

        state
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::IntentNotFound(intent_id.to_string()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentMetadata;
    use contacts_core::UserId;
    use uuid::Uuid;

    fn request(key: &str) -> IntentRequest {
        IntentRequest {
            amount_minor: 1000,
            currency: "eur".into(),
            metadata: IntentMetadata::new(UserId::new(Uuid::new_v4()), 5),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_intent() {
        let provider = MockPaymentProvider::new();

        let first = provider.create_intent(&request("k1")).await.unwrap();
        let replay = provider.create_intent(&request("k1")).await.unwrap();
        let other = provider.create_intent(&request("k2")).await.unwrap();

        assert_eq!(first.id, replay.id);
        assert_ne!(first.id, other.id);
        assert_eq!(provider.create_count().await, 3);
        assert_eq!(provider.create_keys().await, vec!["k1", "k1", "k2"]);
    }

    #[tokio::test]
    async fn test_simulated_outage() {
        let provider = MockPaymentProvider::new();
        provider.fail_next(1).await;

        let err = provider.create_intent(&request("k")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(provider.create_intent(&request("k")).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let provider = MockPaymentProvider::new();
        let intent = provider.create_intent(&request("k")).await.unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);

        provider.succeed(&intent.id).await;
        assert!(provider.retrieve_intent(&intent.id).await.unwrap().is_succeeded());

        assert!(matches!(
            provider.retrieve_intent("pi_missing").await,
            Err(PaymentError::IntentNotFound(_))
        ));
    }
}
