//! Payment authority callbacks.
//!
//! `POST /payments/verify` carries no session requirement: the browser relays
//! the authority's signed callback, and the signature is what authenticates it.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marigold_core::{Order, OrderId, PaymentOutcome};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::extract::AppJson;
use crate::services::{PaymentCallback, PaymentVerifier};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub order: Order,
    /// True when the callback was a redelivery for an already paid order.
    pub already_paid: bool,
}

/// Body of `POST /payments/failure`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[instrument(skip(state, callback), fields(order_id = %callback.order_id))]
pub async fn verify(
    State(state): State<AppState>,
    AppJson(callback): AppJson<PaymentCallback>,
) -> Result<Json<VerifyResponse>> {
    let (order, outcome) = PaymentVerifier::new(state.orders(), state.signatures())
        .verify(&callback)
        .await?;

    Ok(Json(VerifyResponse {
        order,
        already_paid: outcome == PaymentOutcome::AlreadyPaid,
    }))
}

/// Record that the customer's payment attempt failed.
#[instrument(skip(state, user, report), fields(user_id = %user.id, order_id = %report.order_id))]
pub async fn failure(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(report): AppJson<FailureReport>,
) -> Result<Json<Order>> {
    let order = PaymentVerifier::new(state.orders(), state.signatures())
        .report_failure(user.id, report.order_id, report.reason.as_deref())
        .await?;
    Ok(Json(order))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_decodes() {
        let callback: PaymentCallback = serde_json::from_str(
            r#"{
                "paymentAuthorityOrderId": "order_Nx81",
                "paymentId": "pay_Qa9",
                "signature": "ab12",
                "orderId": 17
            }"#,
        )
        .unwrap();
        assert_eq!(callback.order_id, OrderId::new(17));
        assert_eq!(callback.payment_id, "pay_Qa9");
    }

    #[test]
    fn test_callback_missing_signature_rejected() {
        let result = serde_json::from_str::<PaymentCallback>(
            r#"{"paymentAuthorityOrderId": "order_Nx81", "paymentId": "pay_Qa9", "orderId": 17}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_reason_optional() {
        let report: FailureReport = serde_json::from_str(r#"{"orderId": 3}"#).unwrap();
        assert_eq!(report.order_id, OrderId::new(3));
        assert!(report.reason.is_none());
    }
}
