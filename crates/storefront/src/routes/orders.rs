//! Customer order routes: checkout, history, cancellation and refund requests.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use marigold_core::{Order, OrderId, ProductId, Quantity, RefundReason};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::extract::{AppJson, AppPath, AppQuery};
use crate::services::{CheckoutError, CheckoutReceipt, CheckoutService, CheckoutSource, OrderService};
use crate::state::AppState;

/// Which items a checkout request covers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CheckoutItems {
    Cart,
    BuyNow { product_id: ProductId, quantity: i64 },
}

/// Body of `POST /orders`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub items: CheckoutItems,
    pub shipping_address: String,
}

impl TryFrom<CheckoutItems> for CheckoutSource {
    type Error = CheckoutError;

    fn try_from(items: CheckoutItems) -> std::result::Result<Self, Self::Error> {
        Ok(match items {
            CheckoutItems::Cart => Self::Cart,
            CheckoutItems::BuyNow {
                product_id,
                quantity,
            } => Self::BuyNow {
                product_id,
                quantity: Quantity::new(quantity)?,
            },
        })
    }
}

/// Body of `PATCH /orders/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OrderAction {
    Cancel,
    RequestRefund {
        reason: RefundReason,
        #[serde(default)]
        reason_other: Option<String>,
        #[serde(default)]
        comment: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    #[serde(default)]
    pub invoice: bool,
}

/// Create an order from the cart or a single product and open a payment
/// with the authority.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(body): AppJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>)> {
    let source = CheckoutSource::try_from(body.items)?;
    let receipt = CheckoutService::new(
        state.catalog(),
        state.carts(),
        state.orders(),
        state.authority(),
    )
    .checkout(user.id, source, &body.shipping_address)
    .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// The user's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(OrderService::new(state.orders()).list(user.id).await?))
}

/// One order, or its invoice projection with `?invoice=true`.
#[instrument(skip(state, user, query), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppPath(id): AppPath<OrderId>,
    AppQuery(query): AppQuery<OrderQuery>,
) -> Result<Response> {
    let order = OrderService::new(state.orders()).get(user.id, id).await?;

    if query.invoice {
        return Ok(Json(order.invoice()).into_response());
    }
    Ok(Json(order).into_response())
}

#[instrument(skip(state, user, action), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppPath(id): AppPath<OrderId>,
    AppJson(action): AppJson<OrderAction>,
) -> Result<Json<Order>> {
    let service = OrderService::new(state.orders());
    let order = match action {
        OrderAction::Cancel => service.cancel(user.id, id).await,
        OrderAction::RequestRefund {
            reason,
            reason_other,
            comment,
        } => {
            service
                .request_refund(
                    user.id,
                    id,
                    reason,
                    reason_other.as_deref(),
                    comment.as_deref(),
                )
                .await
        }
    }?;

    Ok(Json(order))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_request_from_cart() {
        let body: CheckoutRequest = serde_json::from_str(
            r#"{"source": "cart", "shippingAddress": "12 MG Road, Pune 411001"}"#,
        )
        .unwrap();
        assert_eq!(body.items, CheckoutItems::Cart);
        assert_eq!(body.shipping_address, "12 MG Road, Pune 411001");
    }

    #[test]
    fn test_checkout_request_buy_now() {
        let body: CheckoutRequest = serde_json::from_str(
            r#"{"source": "buyNow", "productId": 4, "quantity": 3, "shippingAddress": "x"}"#,
        )
        .unwrap();
        assert_eq!(
            body.items,
            CheckoutItems::BuyNow {
                product_id: ProductId::new(4),
                quantity: 3,
            }
        );

        let source = CheckoutSource::try_from(body.items).unwrap();
        assert_eq!(
            source,
            CheckoutSource::BuyNow {
                product_id: ProductId::new(4),
                quantity: Quantity::new(3).unwrap(),
            }
        );
    }

    #[test]
    fn test_buy_now_quantity_is_range_checked() {
        let items = CheckoutItems::BuyNow {
            product_id: ProductId::new(4),
            quantity: 0,
        };
        assert!(matches!(
            CheckoutSource::try_from(items),
            Err(CheckoutError::Quantity(_))
        ));
    }

    #[test]
    fn test_unknown_checkout_source_rejected() {
        let result = serde_json::from_str::<CheckoutRequest>(
            r#"{"source": "wishlist", "shippingAddress": "x"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_order_action_cancel() {
        let action: OrderAction = serde_json::from_str(r#"{"action": "cancel"}"#).unwrap();
        assert_eq!(action, OrderAction::Cancel);
    }

    #[test]
    fn test_order_action_request_refund() {
        let action: OrderAction = serde_json::from_str(
            r#"{"action": "requestRefund", "reason": "other", "reasonOther": "Wrong colour", "comment": "Box was fine"}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            OrderAction::RequestRefund {
                reason: RefundReason::Other,
                reason_other: Some("Wrong colour".to_string()),
                comment: Some("Box was fine".to_string()),
            }
        );

        let action: OrderAction =
            serde_json::from_str(r#"{"action": "requestRefund", "reason": "defective"}"#).unwrap();
        assert!(matches!(
            action,
            OrderAction::RequestRefund {
                reason: RefundReason::Defective,
                reason_other: None,
                comment: None,
            }
        ));
    }

    #[test]
    fn test_invoice_query_defaults_off() {
        let query: OrderQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.invoice);
    }
}
