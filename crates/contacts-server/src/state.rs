//! Application State

use std::sync::Arc;

use contacts_core::{
    ContactService, ContactStore, CreditLedger, CreditStore, IdentityProvider, RetryPolicy,
};
use contacts_payments::{CreditPricing, PaymentGateway, PaymentProvider, Reconciler, WebhookHandler};
use contacts_store::Database;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Owner-scoped contacts behind the credit paywall
    pub contacts: ContactService,

    pub ledger: CreditLedger,

    /// Payment gateway (optional - None if not configured)
    pub payments: Option<PaymentGateway>,

    /// Webhook handler (optional - None if no signing secret)
    pub webhooks: Option<WebhookHandler>,

    /// Bearer token validation (optional - None if no JWT secret)
    pub identity: Option<Arc<dyn IdentityProvider>>,

    pub session_refresh_leeway: chrono::Duration,

    /// PostgreSQL pool, when that backend is in use
    pub database: Option<Database>,

    pub store_backend: &'static str,
}

impl AppState {
    pub fn new(
        credits: Arc<dyn CreditStore>,
        contacts: Arc<dyn ContactStore>,
        retry: RetryPolicy,
        store_backend: &'static str,
    ) -> Self {
        let ledger = CreditLedger::new(credits, retry.clone());

        Self {
            contacts: ContactService::new(contacts, ledger.clone(), retry),
            ledger,
            payments: None,
            webhooks: None,
            identity: None,
            session_refresh_leeway: chrono::Duration::minutes(5),
            database: None,
            store_backend,
        }
    }

    #[must_use]
    pub fn with_payments(
        mut self,
        provider: Arc<dyn PaymentProvider>,
        pricing: CreditPricing,
        retry: RetryPolicy,
    ) -> Self {
        self.payments = Some(PaymentGateway::new(provider, self.ledger.clone(), pricing, retry));
        self
    }

    #[must_use]
    pub fn with_webhooks(mut self, handler: WebhookHandler) -> Self {
        self.webhooks = Some(handler);
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn with_session_refresh_leeway(mut self, leeway: chrono::Duration) -> Self {
        self.session_refresh_leeway = leeway;
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Reconciler over this state's ledger, for building a webhook handler
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.ledger.clone())
    }
}
