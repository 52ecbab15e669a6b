//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`; the body is always `{"error": "<message>"}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{CartError, CheckoutError, OrderServiceError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Order read or transition failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderServiceError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "Internal server error";
const UPSTREAM_MESSAGE: &str = "Payment service unavailable, please try again";

impl AppError {
    /// Status code and client-safe message.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Database(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
            Self::Cart(err) => match err {
                CartError::Quantity(_) | CartError::QuantityLimit { .. } | CartError::Pricing(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                CartError::ProductNotFound(_) | CartError::ItemNotFound(_) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                CartError::Repository(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
                }
            },
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart
                | CheckoutError::Quantity(_)
                | CheckoutError::Amount(_)
                | CheckoutError::NothingToCharge => (StatusCode::BAD_REQUEST, err.to_string()),
                CheckoutError::Order(order_err) if order_err.is_validation() => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                CheckoutError::Order(_) | CheckoutError::CartChanged => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                CheckoutError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                CheckoutError::Authority(_) => {
                    (StatusCode::BAD_GATEWAY, UPSTREAM_MESSAGE.to_string())
                }
                CheckoutError::Repository(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
                }
            },
            Self::Order(err) => match err {
                OrderServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "Order not found".to_string()),
                OrderServiceError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
                OrderServiceError::SignatureInvalid
                | OrderServiceError::Validation(_)
                | OrderServiceError::RefundRequest(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                OrderServiceError::Transition(order_err) if order_err.is_validation() => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                OrderServiceError::Transition(_) | OrderServiceError::Contention(_) => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                OrderServiceError::Repository(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
                }
            },
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, format!("Not found: {msg}")),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
        }
    }
}

impl AppError {
    /// Map an extractor rejection: client mistakes become 400, anything axum
    /// reports as a server fault stays a 500.
    fn rejected(status: StatusCode, message: String) -> Self {
        if status.is_server_error() {
            Self::Internal(message)
        } else {
            Self::BadRequest(message)
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called by the auth extractors so errors are associated with the user.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
