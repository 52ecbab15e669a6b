//! Payment verification.
//!
//! [`PaymentVerifier`] checks a payment-completion callback against the
//! order it names and marks the order paid. Delivering the same callback
//! twice is harmless: the second delivery sees a paid order and succeeds
//! without writing.

use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use marigold_core::{Order, OrderId, PaymentOutcome, UserId};

use super::{OrderServiceError, modify_order};
use crate::db::OrderStore;
use crate::payments::SignatureVerifier;

/// A payment-completion callback relayed by the browser.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallback {
    pub payment_authority_order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub order_id: OrderId,
}

/// Payment verification service.
pub struct PaymentVerifier<'a> {
    orders: &'a dyn OrderStore,
    signatures: &'a SignatureVerifier,
}

impl<'a> PaymentVerifier<'a> {
    #[must_use]
    pub const fn new(orders: &'a dyn OrderStore, signatures: &'a SignatureVerifier) -> Self {
        Self { orders, signatures }
    }

    /// Verify a callback and mark the order paid.
    ///
    /// The signature must be valid for the supplied authority order id and
    /// payment id, and that authority order id must be the one stored on
    /// the order. Fulfillment status is not touched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order, `SignatureInvalid` on any
    /// mismatch, and a conflict if the payment was already reported failed.
    #[instrument(skip(self, callback), fields(order_id = %callback.order_id))]
    pub async fn verify(
        &self,
        callback: &PaymentCallback,
    ) -> Result<(Order, PaymentOutcome), OrderServiceError> {
        let (order, outcome) = modify_order(self.orders, callback.order_id, |order| {
            let reference_matches =
                order.payment_authority_order_id == callback.payment_authority_order_id;
            let signature_valid = self.signatures.verify(
                &callback.payment_authority_order_id,
                &callback.payment_id,
                &callback.signature,
            );
            if !(reference_matches && signature_valid) {
                return Err(OrderServiceError::SignatureInvalid);
            }

            let outcome = order.apply_payment(&callback.payment_id, Utc::now())?;
            Ok((outcome, outcome == PaymentOutcome::Applied))
        })
        .await
        .inspect_err(|e| {
            if matches!(e, OrderServiceError::SignatureInvalid) {
                tracing::warn!("Payment signature verification failed");
            }
        })?;

        match outcome {
            PaymentOutcome::Applied => {
                tracing::info!(payment_id = %callback.payment_id, "Order paid");
            }
            PaymentOutcome::AlreadyPaid => {
                tracing::debug!("Duplicate payment callback ignored");
            }
        }
        Ok((order, outcome))
    }

    /// Record a failed payment attempt reported by the order's owner.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Forbidden` for another user's order, or a
    /// conflict if the order is already paid.
    #[instrument(skip(self, reason), fields(order_id = %order_id, user_id = %user_id))]
    pub async fn report_failure(
        &self,
        user_id: UserId,
        order_id: OrderId,
        reason: Option<&str>,
    ) -> Result<Order, OrderServiceError> {
        let (order, changed) = modify_order(self.orders, order_id, |order| {
            if !order.is_owned_by(user_id) {
                return Err(OrderServiceError::Forbidden);
            }
            let changed = order.mark_payment_failed(Utc::now())?;
            Ok((changed, changed))
        })
        .await?;

        if changed {
            tracing::info!(reason = reason.unwrap_or("unspecified"), "Payment marked failed");
        }
        Ok(order)
    }
}
