//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                      - Liveness
//! GET    /health/ready                - Database readiness
//!
//! # Cart (session required)
//! GET    /cart                        - Priced cart
//! POST   /cart                        - Add item
//! PUT    /cart/items/{product_id}     - Set quantity
//! DELETE /cart/items/{product_id}     - Remove item
//! POST   /cart/merge                  - Merge a guest cart
//!
//! # Orders (session required)
//! POST   /orders                      - Checkout (rate limited)
//! GET    /orders                      - Own orders
//! GET    /orders/{id}                 - One order (?invoice=true)
//! PATCH  /orders/{id}                 - Cancel or request refund
//!
//! # Payments (rate limited)
//! POST   /payments/verify             - Signed callback (no session)
//! POST   /payments/failure            - Failure report
//!
//! # Admin (admin session required)
//! GET    /admin/orders                - Filtered listing
//! GET    /admin/orders/{id}           - One order
//! PUT    /admin/orders/{id}           - Status and tracking
//! PUT    /admin/orders/{id}/refund    - Resolve refund
//! POST   /admin/orders/bulk-status    - Bulk status change
//! ```

pub mod admin;
pub mod cart;
pub mod extract;
pub mod orders;
pub mod payments;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};

use crate::middleware::{checkout_rate_limiter, payment_rate_limiter};
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add))
        .route(
            "/items/{product_id}",
            put(cart::update).delete(cart::remove),
        )
        .route("/merge", post(cart::merge))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            // Layer covers only the checkout handler added before it
            post(orders::checkout)
                .layer(checkout_rate_limiter())
                .get(orders::index),
        )
        .route("/{id}", get(orders::show).patch(orders::update))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/verify", post(payments::verify))
        .route("/failure", post(payments::failure))
        .layer(payment_rate_limiter())
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::index))
        .route("/orders/bulk-status", post(admin::bulk_status))
        .route("/orders/{id}", get(admin::show).put(admin::update))
        .route("/orders/{id}/refund", put(admin::resolve_refund))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/payments", payment_routes())
        .nest("/admin", admin_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.catalog().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
