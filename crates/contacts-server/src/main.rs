//! contacts-paywall HTTP Server
//!
//! Axum-based server for owner-scoped contacts paid for with credits, and
//! for buying those credits through Stripe.

mod app;
mod auth;
mod config;
mod error;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contacts_core::{MemoryContactStore, MemoryCreditStore};
use contacts_payments::{CreditPricing, StripeProvider, WebhookHandler};
use contacts_store::{Database, DatabaseProbe, PgContactStore, PgCreditStore};

use crate::auth::JwtIdentityProvider;
use crate::config::{ServerConfig, StoreBackend};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    // Initialize stores
    let mut database = None;
    let state = match &config.store {
        StoreBackend::Postgres {
            url,
            max_connections,
        } => {
            let db = Database::connect(url, *max_connections).await?;
            db.migrate().await?;
            tracing::info!("✓ Connected to PostgreSQL");

            let probe = DatabaseProbe::new(db.pool().clone(), Duration::from_secs(2));
            let retry = config.retry.clone().with_probe(Arc::new(probe));
            database = Some(db.clone());

            AppState::new(
                Arc::new(PgCreditStore::new(db.pool().clone())),
                Arc::new(PgContactStore::new(db.pool().clone())),
                retry,
                config.store.name(),
            )
            .with_database(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("⚠ Using in-memory store - data is lost on restart");
            AppState::new(
                Arc::new(MemoryCreditStore::new()),
                Arc::new(MemoryContactStore::new()),
                config.retry.clone(),
                config.store.name(),
            )
        }
    }
    .with_session_refresh_leeway(config.session_refresh_leeway);

    // Initialize payments
    let state = match (StripeProvider::from_env(), CreditPricing::from_env()) {
        (Ok(stripe), Ok(pricing)) => {
            tracing::info!(
                "✓ Stripe configured ({} {} per credit)",
                pricing.unit_price_minor(),
                pricing.currency()
            );
            state.with_payments(Arc::new(stripe), pricing, config.retry.clone())
        }
        (stripe, pricing) => {
            tracing::warn!("⚠ Payments disabled");
            if let Err(e) = stripe {
                tracing::warn!("  {}", e);
            }
            if let Err(e) = pricing {
                tracing::warn!("  {}", e);
            }
            state
        }
    };

    let state = match WebhookHandler::from_env(state.reconciler()) {
        Ok(handler) => {
            tracing::info!("✓ Stripe webhook signing secret configured");
            state.with_webhooks(handler)
        }
        Err(_) => {
            tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhook disabled");
            state
        }
    };

    let state = if let Some(secret) = &config.jwt_secret {
        state.with_identity(Arc::new(JwtIdentityProvider::new(secret)))
    } else {
        tracing::warn!("⚠ AUTH_JWT_SECRET not set - /api routes will return 503");
        state
    };

    // CORS configuration
    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new().allow_origin(origin.parse::<HeaderValue>()?),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let app = app::router(state, cors);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 contacts-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health            - Health check");
    tracing::info!("  POST   /payment           - Create payment intent");
    tracing::info!("  GET    /payment           - Payment status (credits on success)");
    tracing::info!("  GET    /payment/packages  - Credit packages");
    tracing::info!("  POST   /webhook           - Stripe webhook");
    tracing::info!("  GET    /api/credits       - Credit balance");
    tracing::info!("  GET    /api/payments      - Payment history");
    tracing::info!("  GET    /api/contacts      - List contacts");
    tracing::info!("  POST   /api/contacts      - Create contact (1 credit)");
    tracing::info!("  GET    /api/contacts/{{id}} - Get contact");
    tracing::info!("  PUT    /api/contacts/{{id}} - Update contact");
    tracing::info!("  DELETE /api/contacts/{{id}} - Delete contact");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.close().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
