//! Errors shared by the order lifecycle services.

use thiserror::Error;

use marigold_core::{OrderError, OrderId, RefundRequestError};

use crate::db::RepositoryError;

/// Errors raised while reading or transitioning an existing order.
#[derive(Debug, Error)]
pub enum OrderServiceError {
    /// No order with this id.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The order belongs to someone else.
    #[error("order does not belong to the current user")]
    Forbidden,

    /// Callback signature or authority reference did not match.
    #[error("payment signature verification failed")]
    SignatureInvalid,

    /// Malformed request that is not a domain rule.
    #[error("{0}")]
    Validation(String),

    /// A domain rule rejected the transition.
    #[error(transparent)]
    Transition(#[from] OrderError),

    /// Refund request failed validation.
    #[error(transparent)]
    RefundRequest(#[from] RefundRequestError),

    /// Every retry lost the optimistic version race.
    #[error("order {0} is being modified concurrently, please retry")]
    Contention(OrderId),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl OrderServiceError {
    /// Whether this is a client error rather than a storage fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Repository(_))
    }
}
