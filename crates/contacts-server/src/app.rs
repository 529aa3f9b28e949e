//! Router

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::handlers::{
    create_contact, create_payment, delete_contact, get_contact, get_credits, health_check,
    list_contacts, list_packages, list_payments, payment_status, stripe_webhook, update_contact,
};
use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    // Everything under /api acts on the caller's own data
    let api = Router::new()
        .route("/api/credits", get(get_credits))
        .route("/api/payments", get(list_payments))
        .route("/api/contacts", get(list_contacts).post(create_contact))
        .route(
            "/api/contacts/{id}",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_user));

    Router::new()
        // Health
        .route("/health", get(health_check))
        // Payments
        .route("/payment", post(create_payment).get(payment_status))
        .route("/payment/packages", get(list_packages))
        .route("/webhook", post(stripe_webhook))
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
