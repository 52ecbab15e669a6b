//! Operator order operations.
//!
//! Status moves, tracking edits and refund resolution. Callers must have
//! already checked that the session belongs to an admin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marigold_core::{Order, OrderId, OrderStatus, RefundStatus, StatusChange, TrackingUpdate};

use super::{OrderServiceError, modify_order};
use crate::db::{MAX_LIST_LIMIT, OrderFilter, OrderStore};

/// Largest number of orders one bulk status request may touch.
pub const MAX_BULK_ORDERS: usize = 200;

/// Edits an operator can make in one request.
///
/// Absent tracking fields are left alone; blank ones are cleared.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderUpdate {
    pub status: Option<OrderStatus>,
    pub courier_name: Option<String>,
    pub tracking_number: Option<String>,
    pub expected_delivery_at: Option<DateTime<Utc>>,
}

impl AdminOrderUpdate {
    fn tracking(&self) -> TrackingUpdate {
        TrackingUpdate {
            courier_name: self.courier_name.clone(),
            tracking_number: self.tracking_number.clone(),
            expected_delivery_at: self.expected_delivery_at,
        }
    }
}

/// Per-order outcome of a bulk status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusResult {
    pub order_id: OrderId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Admin order service.
pub struct AdminOrderService<'a> {
    orders: &'a dyn OrderStore,
}

impl<'a> AdminOrderService<'a> {
    #[must_use]
    pub const fn new(orders: &'a dyn OrderStore) -> Self {
        Self { orders }
    }

    /// Orders matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the requested page size is over the limit.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderServiceError> {
        if filter.limit.is_some_and(|l| l > MAX_LIST_LIMIT) {
            return Err(OrderServiceError::Validation(format!(
                "limit must be at most {MAX_LIST_LIMIT}"
            )));
        }
        Ok(self.orders.list(filter).await?)
    }

    /// Any order by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order, OrderServiceError> {
        self.orders
            .get(id)
            .await?
            .ok_or(OrderServiceError::NotFound(id))
    }

    /// Apply a status move and/or tracking edits atomically.
    ///
    /// # Errors
    ///
    /// Returns a conflict for illegal moves or tracking edits on a cancelled
    /// order, a validation error for over-long tracking fields.
    #[instrument(skip(self, update), fields(order_id = %id, status = ?update.status))]
    pub async fn update(
        &self,
        id: OrderId,
        update: &AdminOrderUpdate,
    ) -> Result<Order, OrderServiceError> {
        let tracking = update.tracking();
        let (order, change) = modify_order(self.orders, id, |order| {
            let now = Utc::now();
            let change = match update.status {
                Some(next) => order.advance_status(next, now)?,
                None => StatusChange::Unchanged,
            };
            let tracking_changed = order.update_tracking(&tracking, now)?;
            Ok((change, change.is_changed() || tracking_changed))
        })
        .await?;

        if let StatusChange::Changed { from, to } = change {
            tracing::info!(%from, %to, "Order status changed");
        }
        Ok(order)
    }

    /// Move many orders to `status`, reporting each outcome separately.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty or oversized id list. Per-order
    /// failures are reported in the results, not as an error.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_status(
        &self,
        ids: &[OrderId],
        status: OrderStatus,
    ) -> Result<Vec<BulkStatusResult>, OrderServiceError> {
        if ids.is_empty() {
            return Err(OrderServiceError::Validation(
                "orderIds must not be empty".to_string(),
            ));
        }
        if ids.len() > MAX_BULK_ORDERS {
            return Err(OrderServiceError::Validation(format!(
                "at most {MAX_BULK_ORDERS} orders per bulk update"
            )));
        }

        let update = AdminOrderUpdate {
            status: Some(status),
            ..AdminOrderUpdate::default()
        };

        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = match self.update(id, &update).await {
                Ok(order) => BulkStatusResult {
                    order_id: id,
                    success: true,
                    status: Some(order.status),
                    error: None,
                },
                Err(OrderServiceError::Repository(e)) => {
                    let event_id = sentry::capture_error(&e);
                    tracing::error!(
                        order_id = %id,
                        error = %e,
                        sentry_event_id = %event_id,
                        "Bulk status update failed"
                    );
                    BulkStatusResult {
                        order_id: id,
                        success: false,
                        status: None,
                        error: Some("Internal server error".to_string()),
                    }
                }
                Err(e) => BulkStatusResult {
                    order_id: id,
                    success: false,
                    status: None,
                    error: Some(e.to_string()),
                },
            };
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(failed, "Bulk status update finished");
        Ok(results)
    }

    /// Resolve a refund: `requested → approved | rejected`, `approved → refunded`.
    ///
    /// # Errors
    ///
    /// Returns a conflict for any other move.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn resolve_refund(
        &self,
        id: OrderId,
        status: RefundStatus,
    ) -> Result<Order, OrderServiceError> {
        let (order, changed) = modify_order(self.orders, id, |order| {
            let changed = order.resolve_refund(status, Utc::now())?;
            Ok((changed, changed))
        })
        .await?;

        if changed {
            tracing::info!("Refund status changed");
        }
        Ok(order)
    }
}
