//! Authentication extractors.
//!
//! The sign-in flow that issues sessions lives outside this service; it stores
//! a [`CurrentUser`] under [`keys::CURRENT_USER`]. These extractors read it back
//! and reject before any handler logic runs.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_sessions::Session;

use crate::error::set_sentry_user;
use crate::models::{CurrentUser, session::keys};

/// Extractor that requires an authenticated user.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires an authenticated operator.
pub struct RequireAdmin(pub CurrentUser);

/// Error returned when an extractor rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No session or no user in it.
    Unauthorized,
    /// Signed in, but not an operator.
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Admin access required"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn current_user(parts: &Parts) -> Result<CurrentUser, AuthRejection> {
    // Get the session from extensions (set by SessionManagerLayer)
    let session = parts
        .extensions
        .get::<Session>()
        .ok_or(AuthRejection::Unauthorized)?;

    let user: CurrentUser = session
        .get(keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
        .ok_or(AuthRejection::Unauthorized)?;

    set_sentry_user(&user.id);
    Ok(user)
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts).await.map(Self)
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.id, "Non-admin user attempted admin access");
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Store the signed-in user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::CURRENT_USER, user).await
}
