//! Payment authority integration.
//!
//! The storefront never handles card data. Checkout registers an order with
//! the payment authority and hands its id to the browser; the browser
//! completes payment with the authority and posts back a signed callback,
//! which [`SignatureVerifier`] checks before the order is marked paid.
//!
//! - [`client`] - HTTP client for the authority's orders API
//! - [`signature`] - Callback signature verification

pub mod client;
pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use marigold_core::CurrencyCode;

pub use client::HttpPaymentAuthority;
pub use signature::SignatureVerifier;

/// Errors talking to the payment authority.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The request did not complete (connect failure, timeout).
    #[error("payment authority request failed: {0}")]
    Request(String),

    /// The authority answered with a non-success status.
    #[error("payment authority returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("payment authority response error: {0}")]
    Response(String),

    /// The order amount cannot be expressed in minor units.
    #[error("invalid payment amount: {0}")]
    Amount(String),
}

/// Request to register an order with the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorityOrderRequest {
    /// Amount in minor currency units (paise).
    pub amount: i64,
    pub currency: CurrencyCode,
    /// Our idempotency reference, unique per checkout attempt.
    pub receipt: String,
}

/// An order registered with the authority.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorityOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// A payment authority that can register orders for client-side payment.
#[async_trait]
pub trait PaymentAuthority: Send + Sync {
    /// Register an order and return the authority's reference.
    async fn create_order(
        &self,
        request: &AuthorityOrderRequest,
    ) -> Result<AuthorityOrder, AuthorityError>;

    /// Public key id the browser-side widget needs.
    fn key_id(&self) -> &str;
}
