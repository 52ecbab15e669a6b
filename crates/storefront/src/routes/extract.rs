//! Request extractors that reject with [`AppError`].
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text bodies and
//! 415/422 statuses. These wrappers route the rejection through `AppError`
//! so malformed input gets the usual `{"error": ...}` body and a 400.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);
