//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{CartStore, CatalogStore, OrderStore, PgCartStore, PgCatalogStore, PgOrderStore};
use crate::payments::{AuthorityError, HttpPaymentAuthority, PaymentAuthority, SignatureVerifier};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Stores and the payment
/// authority are held as trait objects so tests can swap in in-memory
/// implementations through [`AppState::from_parts`].
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    catalog: Arc<dyn CatalogStore>,
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    authority: Arc<dyn PaymentAuthority>,
    signatures: SignatureVerifier,
}

/// Collaborators for [`AppState::from_parts`].
pub struct StateParts {
    pub catalog: Arc<dyn CatalogStore>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub authority: Arc<dyn PaymentAuthority>,
}

impl AppState {
    /// Create the production state backed by `PostgreSQL` and the HTTP
    /// payment authority.
    ///
    /// # Errors
    ///
    /// Returns an error if the payment authority HTTP client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, AuthorityError> {
        let authority = HttpPaymentAuthority::new(&config.payment)?;
        let signatures = SignatureVerifier::new(config.payment.key_secret.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                catalog: Arc::new(PgCatalogStore::new(pool.clone())),
                carts: Arc::new(PgCartStore::new(pool.clone())),
                orders: Arc::new(PgOrderStore::new(pool.clone())),
                authority: Arc::new(authority),
                signatures,
                pool: Some(pool),
                config,
            }),
        })
    }

    /// Create a state from explicit collaborators, without a database pool.
    #[must_use]
    pub fn from_parts(config: StorefrontConfig, parts: StateParts) -> Self {
        let signatures = SignatureVerifier::new(config.payment.key_secret.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool: None,
                catalog: parts.catalog,
                carts: parts.carts,
                orders: parts.orders,
                authority: parts.authority,
                signatures,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The `PostgreSQL` pool, absent for states built with `from_parts`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.inner.catalog.as_ref()
    }

    #[must_use]
    pub fn carts(&self) -> &dyn CartStore {
        self.inner.carts.as_ref()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }

    #[must_use]
    pub fn authority(&self) -> &dyn PaymentAuthority {
        self.inner.authority.as_ref()
    }

    /// Verifier for payment callback signatures.
    #[must_use]
    pub fn signatures(&self) -> &SignatureVerifier {
        &self.inner.signatures
    }
}
