//! Cart route handlers.
//!
//! Every handler answers with the freshly priced [`CartView`], so the client
//! never has to re-fetch after a mutation.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marigold_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::extract::{AppJson, AppPath};
use crate::models::{CartView, MergeReport};
use crate::services::{CartService, GuestCartLine};
use crate::state::AppState;

/// Body of `POST /cart`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Body of `PUT /cart/items/{product_id}`.
#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i64,
}

/// Body of `POST /cart/merge`.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub items: Vec<GuestCartLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    #[serde(flatten)]
    pub report: MergeReport,
    pub cart: CartView,
}

fn service(state: &AppState) -> CartService<'_> {
    CartService::new(state.catalog(), state.carts())
}

/// Show the cart, creating an empty one on first visit.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(service(&state).view(user.id).await?))
}

/// Add to cart, merging into an existing line.
#[instrument(skip(state, user, body), fields(user_id = %user.id, product_id = %body.product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(body): AppJson<AddItemRequest>,
) -> Result<Json<CartView>> {
    let cart = service(&state)
        .add_item(user.id, body.product_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppPath(product_id): AppPath<ProductId>,
    AppJson(body): AppJson<SetQuantityRequest>,
) -> Result<Json<CartView>> {
    let cart = service(&state)
        .set_quantity(user.id, product_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppPath(product_id): AppPath<ProductId>,
) -> Result<Json<CartView>> {
    Ok(Json(service(&state).remove_item(user.id, product_id).await?))
}

/// Fold a guest cart into the signed-in user's cart.
#[instrument(skip(state, user, body), fields(user_id = %user.id, lines = body.items.len()))]
pub async fn merge(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(body): AppJson<MergeRequest>,
) -> Result<Json<MergeResponse>> {
    let (report, cart) = service(&state).merge(user.id, &body.items).await?;
    Ok(Json(MergeResponse { report, cart }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_item_request_decodes_camel_case() {
        let body: AddItemRequest =
            serde_json::from_str(r#"{"productId": 12, "quantity": 2}"#).unwrap();
        assert_eq!(body.product_id, ProductId::new(12));
        assert_eq!(body.quantity, 2);
    }

    #[test]
    fn test_out_of_range_quantity_still_decodes() {
        // Range checks happen in the service so the client gets a domain error.
        let body: SetQuantityRequest = serde_json::from_str(r#"{"quantity": 0}"#).unwrap();
        assert_eq!(body.quantity, 0);
    }

    #[test]
    fn test_merge_request_requires_items() {
        assert!(serde_json::from_str::<MergeRequest>("{}").is_err());

        let body: MergeRequest = serde_json::from_str(
            r#"{"items": [{"productId": 1, "quantity": 3}, {"productId": 2, "quantity": 1}]}"#,
        )
        .unwrap();
        assert_eq!(body.items.len(), 2);
    }
}
