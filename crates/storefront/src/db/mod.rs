//! Database operations for storefront `PostgreSQL`.
//!
//! # Schema: `storefront`
//!
//! ## Tables
//!
//! - `user` - Identities issued by the sign-in flow (read-only here)
//! - `product` - Catalog (read-only here)
//! - `cart`, `cart_item` - One cart per user, one line per product
//! - `customer_order`, `order_item` - Orders and their frozen lines
//! - `tower_sessions.session` - Session storage
//!
//! # Storage traits
//!
//! Services talk to [`CatalogStore`], [`CartStore`] and [`OrderStore`] rather
//! than to `PgPool` directly, so the same service code runs against the
//! `PostgreSQL` repositories in production and an in-memory store in tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p marigold-cli -- migrate
//! ```

pub mod carts;
pub mod orders;
pub mod products;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use marigold_core::{
    CartId, NewOrder, Order, OrderId, OrderStatus, PaymentStatus, ProductId, Quantity,
    RefundStatus, UserId,
};

use crate::models::{CartClaim, CartLine, Product};

pub use carts::PgCartStore;
pub use orders::PgOrderStore;
pub use products::PgCatalogStore;

/// Largest page an admin listing may request.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Default admin listing page size.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or a concurrent change to claimed rows.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The row changed since it was read (optimistic version check failed).
    #[error("stale write to order {0}")]
    StaleWrite(OrderId),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Storage traits
// =============================================================================

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch one product.
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Fetch every product in `ids` that exists, in no particular order.
    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Per-user cart persistence.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The user's cart id, creating an empty cart on first use.
    async fn ensure_cart(&self, user_id: UserId) -> Result<CartId, RepositoryError>;

    /// Current lines of a cart, oldest first.
    async fn lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError>;

    /// Add `quantity` to a line, creating it if absent.
    ///
    /// Returns the resulting quantity, or `None` if the sum would exceed
    /// [`Quantity::MAX`] (nothing is written in that case).
    async fn add(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<Option<Quantity>, RepositoryError>;

    /// Overwrite the quantity of an existing line. Returns `false` if absent.
    async fn set_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError>;

    /// Delete a line. Returns `false` if absent.
    async fn remove(&self, cart_id: CartId, product_id: ProductId)
    -> Result<bool, RepositoryError>;
}

/// Admin listing filters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub refund_status: Option<RefundStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl OrderFilter {
    /// Page size clamped to `1..=MAX_LIST_LIMIT`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    /// Non-negative offset.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Whether `order` passes the status filters.
    #[must_use]
    pub fn accepts(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| s == order.status)
            && self.payment_status.is_none_or(|s| s == order.payment_status)
            && self
                .refund_status
                .is_none_or(|s| s == order.refund.refund_status)
    }
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order and its items in one transaction.
    ///
    /// With a `cart` claim, the cart's rows are locked, compared against the
    /// claim, and deleted in the same transaction. A mismatch fails with
    /// [`RepositoryError::Conflict`] and writes nothing.
    async fn create(
        &self,
        order: NewOrder,
        cart: Option<&CartClaim>,
    ) -> Result<Order, RepositoryError>;

    /// Fetch one order with its items.
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// All orders matching `filter`, newest first.
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;

    /// Persist the mutable fields of `order` if its version is still current.
    ///
    /// Returns the new version. Fails with [`RepositoryError::StaleWrite`] if
    /// another writer got there first.
    async fn save(&self, order: &Order) -> Result<i32, RepositoryError>;
}

/// Map a unique/check constraint violation to `Conflict`, other errors to `Database`.
pub(crate) fn map_constraint_error(error: sqlx::Error) -> RepositoryError {
    let conflict = error
        .as_database_error()
        .filter(|e| e.is_unique_violation() || e.is_check_violation())
        .map(|e| e.message().to_string());
    match conflict {
        Some(message) => RepositoryError::Conflict(message),
        None => RepositoryError::Database(error),
    }
}
