//! Customer-facing order operations.

use chrono::Utc;
use tracing::instrument;

use marigold_core::{Order, OrderId, RefundReason, RefundRequest, UserId};

use super::{OrderServiceError, modify_order};
use crate::db::OrderStore;

/// Order service for the order's owner.
pub struct OrderService<'a> {
    orders: &'a dyn OrderStore,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(orders: &'a dyn OrderStore) -> Self {
        Self { orders }
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderServiceError::Repository` on storage failure.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Order>, OrderServiceError> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    /// One of the user's orders.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Forbidden`.
    pub async fn get(&self, user_id: UserId, id: OrderId) -> Result<Order, OrderServiceError> {
        let order = self
            .orders
            .get(id)
            .await?
            .ok_or(OrderServiceError::NotFound(id))?;
        if !order.is_owned_by(user_id) {
            return Err(OrderServiceError::Forbidden);
        }
        Ok(order)
    }

    /// Cancel one of the user's orders.
    ///
    /// # Errors
    ///
    /// Returns a conflict once the order has shipped.
    #[instrument(skip(self), fields(order_id = %id, user_id = %user_id))]
    pub async fn cancel(&self, user_id: UserId, id: OrderId) -> Result<Order, OrderServiceError> {
        let (order, change) = modify_order(self.orders, id, |order| {
            if !order.is_owned_by(user_id) {
                return Err(OrderServiceError::Forbidden);
            }
            let change = order.cancel(Utc::now())?;
            Ok((change, change.is_changed()))
        })
        .await?;

        if change.is_changed() {
            tracing::info!("Order cancelled by customer");
        }
        Ok(order)
    }

    /// File a refund request on one of the user's paid orders.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad reason/comment, and a conflict
    /// if the order is unpaid or a refund was already requested.
    #[instrument(skip(self, reason_other, comment), fields(order_id = %id, user_id = %user_id))]
    pub async fn request_refund(
        &self,
        user_id: UserId,
        id: OrderId,
        reason: RefundReason,
        reason_other: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Order, OrderServiceError> {
        let request = RefundRequest::new(reason, reason_other, comment)?;

        let (order, ()) = modify_order(self.orders, id, |order| {
            if !order.is_owned_by(user_id) {
                return Err(OrderServiceError::Forbidden);
            }
            order.file_refund(request.clone(), Utc::now())?;
            Ok(((), true))
        })
        .await?;

        tracing::info!(reason = %reason, "Refund requested");
        Ok(order)
    }
}
