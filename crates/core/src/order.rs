//! The `Order` aggregate.
//!
//! An order is created once from a priced draft and then only moves through
//! the transitions defined here. Each transition validates against the
//! current state and mutates in place; the storefront persists the result
//! under an optimistic version check, so a transition is always applied to
//! the freshest copy of the order.
//!
//! ```text
//! pending → confirmed → processing → shipped → out_for_delivery → delivered
//! pending | confirmed | processing → cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pricing::{DeliveryPolicy, LineAmount, PricingError, Totals};
use crate::refund::RefundRequest;
use crate::types::{
    OrderId, OrderItemId, OrderStatus, PaymentStatus, Price, ProductId, Quantity, RefundReason,
    RefundStatus, UserId,
};

/// Maximum length of a shipping address, after trimming.
pub const MAX_SHIPPING_ADDRESS_LEN: usize = 500;

/// Maximum length of the courier name and tracking number.
pub const MAX_TRACKING_FIELD_LEN: usize = 100;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by order construction and transitions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    // Validation
    #[error("shipping address is required")]
    EmptyShippingAddress,
    #[error("shipping address must be at most {MAX_SHIPPING_ADDRESS_LEN} characters")]
    ShippingAddressTooLong,
    #[error("{field} must be at most {MAX_TRACKING_FIELD_LEN} characters")]
    TrackingFieldTooLong { field: &'static str },
    #[error("refund status can only be set to approved, rejected or refunded")]
    InvalidRefundResolution,
    #[error(transparent)]
    Pricing(#[from] PricingError),

    // Conflicts
    #[error("cannot cancel after shipment (order is {0})")]
    NotCancellable(OrderStatus),
    #[error("order is {0} and can no longer change status")]
    StatusTerminal(OrderStatus),
    #[error("cannot move order from {from} back to {to}")]
    BackwardTransition { from: OrderStatus, to: OrderStatus },
    #[error("payment for this order has already failed")]
    PaymentAlreadyFailed,
    #[error("payment for this order has already been completed")]
    PaymentAlreadyCompleted,
    #[error("refunds can only be requested for paid orders")]
    RefundRequiresPayment,
    #[error("a refund has already been requested for this order")]
    RefundAlreadyRequested,
    #[error("cannot move refund from {from} to {to}")]
    IllegalRefundTransition { from: RefundStatus, to: RefundStatus },
    #[error("tracking cannot be changed on a cancelled order")]
    TrackingOnCancelled,
}

impl OrderError {
    /// Whether the error is a malformed request rather than a state conflict.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyShippingAddress
                | Self::ShippingAddressTooLong
                | Self::TrackingFieldTooLong { .. }
                | Self::InvalidRefundResolution
                | Self::Pricing(_)
        )
    }
}

// =============================================================================
// Order
// =============================================================================

/// A frozen line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Price,
}

impl OrderItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> rust_decimal::Decimal {
        self.unit_price.amount() * rust_decimal::Decimal::from(self.quantity.get())
    }
}

/// Shipment tracking and lifecycle timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracking {
    pub courier_name: Option<String>,
    pub tracking_number: Option<String>,
    pub expected_delivery_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Refund sub-record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRecord {
    pub refund_requested: bool,
    pub refund_reason: Option<RefundReason>,
    pub refund_reason_other: Option<String>,
    pub refund_comment: Option<String>,
    pub refund_status: RefundStatus,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_updated_at: Option<DateTime<Utc>>,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    #[serde(flatten)]
    pub totals: Totals,
    pub shipping_address: String,
    #[serde(skip_serializing)]
    pub receipt: String,
    pub payment_authority_order_id: String,
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub tracking: Tracking,
    #[serde(flatten)]
    pub refund: RefundRecord,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(skip_serializing)]
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying a verified payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The order moved from pending to paid.
    Applied,
    /// The order was already paid; nothing changed.
    AlreadyPaid,
}

/// Result of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    Changed { from: OrderStatus, to: OrderStatus },
}

impl StatusChange {
    #[must_use]
    pub const fn is_changed(self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Operator edits to tracking fields.
///
/// `None` leaves a field as it is; a blank string clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingUpdate {
    pub courier_name: Option<String>,
    pub tracking_number: Option<String>,
    pub expected_delivery_at: Option<DateTime<Utc>>,
}

impl TrackingUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.courier_name.is_none()
            && self.tracking_number.is_none()
            && self.expected_delivery_at.is_none()
    }
}

impl Order {
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Record a verified payment.
    ///
    /// Fulfillment status is not touched.
    ///
    /// # Errors
    ///
    /// Returns `PaymentAlreadyFailed` if the payment was reported failed.
    pub fn apply_payment(
        &mut self,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome, OrderError> {
        match self.payment_status {
            PaymentStatus::Paid => Ok(PaymentOutcome::AlreadyPaid),
            PaymentStatus::Failed => Err(OrderError::PaymentAlreadyFailed),
            PaymentStatus::Pending => {
                self.payment_status = PaymentStatus::Paid;
                self.payment_id = Some(payment_id.to_owned());
                self.paid_at = Some(now);
                self.updated_at = now;
                Ok(PaymentOutcome::Applied)
            }
        }
    }

    /// Record that the customer's payment attempt failed.
    ///
    /// Returns `false` if the payment was already marked failed.
    ///
    /// # Errors
    ///
    /// Returns `PaymentAlreadyCompleted` if the order is paid.
    pub fn mark_payment_failed(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        match self.payment_status {
            PaymentStatus::Failed => Ok(false),
            PaymentStatus::Paid => Err(OrderError::PaymentAlreadyCompleted),
            PaymentStatus::Pending => {
                self.payment_status = PaymentStatus::Failed;
                self.updated_at = now;
                Ok(true)
            }
        }
    }

    /// Cancel the order. Payment status is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotCancellable` once the order has shipped.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<StatusChange, OrderError> {
        let from = self.status;
        if from == OrderStatus::Cancelled {
            return Ok(StatusChange::Unchanged);
        }
        if !from.is_cancellable() {
            return Err(OrderError::NotCancellable(from));
        }

        self.status = OrderStatus::Cancelled;
        self.tracking.cancelled_at.get_or_insert(now);
        self.updated_at = now;
        Ok(StatusChange::Changed {
            from,
            to: OrderStatus::Cancelled,
        })
    }

    /// Move the order to `next` on an operator's behalf.
    ///
    /// Forward moves may skip states. Re-applying the current status is a
    /// no-op. Reaching `shipped` or later stamps `shipped_at` once; reaching
    /// `delivered` stamps `delivered_at` once.
    ///
    /// # Errors
    ///
    /// Returns a conflict for backward moves, moves out of a terminal status,
    /// and cancellation after shipment.
    pub fn advance_status(
        &mut self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, OrderError> {
        let from = self.status;
        if next == from {
            return Ok(StatusChange::Unchanged);
        }
        if from.is_terminal() {
            return Err(OrderError::StatusTerminal(from));
        }
        if next == OrderStatus::Cancelled {
            return self.cancel(now);
        }

        // Neither side is Cancelled here, so both ranks exist.
        if next.rank() < from.rank() {
            return Err(OrderError::BackwardTransition { from, to: next });
        }

        self.status = next;
        if next.rank() >= OrderStatus::Shipped.rank() {
            self.tracking.shipped_at.get_or_insert(now);
        }
        if next == OrderStatus::Delivered {
            self.tracking.delivered_at.get_or_insert(now);
        }
        self.updated_at = now;
        Ok(StatusChange::Changed { from, to: next })
    }

    /// Apply operator edits to courier, tracking number and expected delivery.
    ///
    /// Returns `true` if any field changed.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long fields or a cancelled order.
    pub fn update_tracking(
        &mut self,
        update: &TrackingUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, OrderError> {
        if update.is_empty() {
            return Ok(false);
        }
        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::TrackingOnCancelled);
        }

        let courier = normalize_tracking_field("courierName", update.courier_name.as_deref())?;
        let number = normalize_tracking_field("trackingNumber", update.tracking_number.as_deref())?;

        let before = self.tracking.clone();
        if let Some(courier) = courier {
            self.tracking.courier_name = courier;
        }
        if let Some(number) = number {
            self.tracking.tracking_number = number;
        }
        if let Some(expected) = update.expected_delivery_at {
            self.tracking.expected_delivery_at = Some(expected);
        }

        let changed = self.tracking != before;
        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// File a customer refund request.
    ///
    /// # Errors
    ///
    /// Returns a conflict if the order is unpaid or a refund was already
    /// requested.
    pub fn file_refund(
        &mut self,
        request: RefundRequest,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::RefundRequiresPayment);
        }
        if self.refund.refund_requested {
            return Err(OrderError::RefundAlreadyRequested);
        }

        self.refund = RefundRecord {
            refund_requested: true,
            refund_reason: Some(request.reason()),
            refund_reason_other: request.reason_other().map(ToOwned::to_owned),
            refund_comment: request.comment().map(ToOwned::to_owned),
            refund_status: RefundStatus::Requested,
            refund_requested_at: Some(now),
            refund_updated_at: Some(now),
        };
        self.updated_at = now;
        Ok(())
    }

    /// Resolve a refund on an operator's behalf.
    ///
    /// Returns `false` if the refund is already in `next`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the move is `requested → approved | rejected`
    /// or `approved → refunded`.
    pub fn resolve_refund(
        &mut self,
        next: RefundStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, OrderError> {
        if matches!(next, RefundStatus::None | RefundStatus::Requested) {
            return Err(OrderError::InvalidRefundResolution);
        }
        let from = self.refund.refund_status;
        if from == next {
            return Ok(false);
        }
        if !from.can_resolve_to(next) {
            return Err(OrderError::IllegalRefundTransition { from, to: next });
        }

        self.refund.refund_status = next;
        self.refund.refund_updated_at = Some(now);
        self.updated_at = now;
        Ok(true)
    }

    /// Flattened line-item projection used for invoices.
    #[must_use]
    pub fn invoice(&self) -> Invoice {
        Invoice {
            order_id: self.id,
            issued_at: self.paid_at.unwrap_or(self.created_at),
            shipping_address: self.shipping_address.clone(),
            payment_id: self.payment_id.clone(),
            lines: self
                .items
                .iter()
                .map(|item| InvoiceLine {
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total(),
                })
                .collect(),
            totals: self.totals,
        }
    }
}

/// `Some(None)` clears a field, `Some(Some(_))` sets it, `None` leaves it.
fn normalize_tracking_field(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<Option<String>>, OrderError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.chars().count() > MAX_TRACKING_FIELD_LEN {
        return Err(OrderError::TrackingFieldTooLong { field });
    }
    Ok(Some((!trimmed.is_empty()).then(|| trimmed.to_owned())))
}

// =============================================================================
// Invoice projection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Price,
    #[serde(with = "rust_decimal::serde::str")]
    pub line_total: rust_decimal::Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub order_id: OrderId,
    pub issued_at: DateTime<Utc>,
    pub shipping_address: String,
    pub payment_id: Option<String>,
    pub lines: Vec<InvoiceLine>,
    #[serde(flatten)]
    pub totals: Totals,
}

// =============================================================================
// Creation
// =============================================================================

/// A line to be frozen into a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Price,
}

/// A priced order that has not been registered with the payment authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub items: Vec<NewOrderItem>,
    pub totals: Totals,
    pub shipping_address: String,
    pub receipt: String,
}

impl OrderDraft {
    /// Price `items` and validate the shipping address.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty item list or a blank or
    /// over-long address.
    pub fn new(
        user_id: UserId,
        items: Vec<NewOrderItem>,
        shipping_address: &str,
        receipt: String,
    ) -> Result<Self, OrderError> {
        let shipping_address = validate_shipping_address(shipping_address)?;
        let lines: Vec<LineAmount> = items
            .iter()
            .map(|item| LineAmount::new(item.unit_price, item.quantity))
            .collect();
        let totals = Totals::calculate(&lines, DeliveryPolicy::default())?;

        Ok(Self {
            user_id,
            items,
            totals,
            shipping_address,
            receipt,
        })
    }

    /// Attach the payment authority's order reference.
    #[must_use]
    pub fn with_authority_order(self, payment_authority_order_id: String) -> NewOrder {
        NewOrder {
            user_id: self.user_id,
            items: self.items,
            totals: self.totals,
            shipping_address: self.shipping_address,
            receipt: self.receipt,
            payment_authority_order_id,
        }
    }
}

/// Everything needed to insert an order row and its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<NewOrderItem>,
    pub totals: Totals,
    pub shipping_address: String,
    pub receipt: String,
    pub payment_authority_order_id: String,
}

impl NewOrder {
    /// Build the stored order once ids have been assigned.
    #[must_use]
    pub fn into_order(
        self,
        id: OrderId,
        item_ids: impl IntoIterator<Item = OrderItemId>,
        now: DateTime<Utc>,
    ) -> Order {
        let items = self
            .items
            .into_iter()
            .zip(item_ids)
            .map(|(item, item_id)| OrderItem {
                id: item_id,
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Order {
            id,
            user_id: self.user_id,
            items,
            totals: self.totals,
            shipping_address: self.shipping_address,
            receipt: self.receipt,
            payment_authority_order_id: self.payment_authority_order_id,
            payment_id: None,
            payment_status: PaymentStatus::Pending,
            paid_at: None,
            status: OrderStatus::Pending,
            tracking: Tracking::default(),
            refund: RefundRecord::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trim and bound a shipping address.
///
/// # Errors
///
/// Returns an error if the trimmed address is empty or too long.
pub fn validate_shipping_address(address: &str) -> Result<String, OrderError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(OrderError::EmptyShippingAddress);
    }
    if trimmed.chars().count() > MAX_SHIPPING_ADDRESS_LEN {
        return Err(OrderError::ShippingAddressTooLong);
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    fn item(product: i32, name: &str, price: i64, quantity: i64) -> NewOrderItem {
        NewOrderItem {
            product_id: ProductId::new(product),
            product_name: name.to_owned(),
            quantity: Quantity::new(quantity).unwrap(),
            unit_price: Price::new(Decimal::from(price)).unwrap(),
        }
    }

    fn order() -> Order {
        OrderDraft::new(
            UserId::new(1),
            vec![item(10, "Masala chai", 100, 2), item(11, "Ginger tea", 50, 1)],
            "  12 MG Road, Bengaluru  ",
            "rcpt-1".to_owned(),
        )
        .unwrap()
        .with_authority_order("order_abc".to_owned())
        .into_order(OrderId::new(7), [OrderItemId::new(1), OrderItemId::new(2)], t0())
    }

    fn paid_order() -> Order {
        let mut order = order();
        order.apply_payment("pay_1", t0()).unwrap();
        order
    }

    #[test]
    fn test_new_order_is_priced_and_pending() {
        let order = order();
        assert_eq!(order.totals.subtotal.amount(), Decimal::from(250));
        assert_eq!(order.totals.tax.amount(), Decimal::new(1250, 2));
        assert_eq!(order.totals.total.amount(), Decimal::new(26250, 2));
        assert!(order.totals.is_consistent());
        assert_eq!(order.shipping_address, "12 MG Road, Bengaluru");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.refund.refund_status, RefundStatus::None);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[1].id, OrderItemId::new(2));
    }

    #[test]
    fn test_draft_rejects_empty_items_and_bad_address() {
        assert!(matches!(
            OrderDraft::new(UserId::new(1), vec![], "addr", "r".to_owned()),
            Err(OrderError::Pricing(PricingError::Empty))
        ));
        assert_eq!(
            OrderDraft::new(UserId::new(1), vec![item(1, "x", 1, 1)], "   ", "r".to_owned()),
            Err(OrderError::EmptyShippingAddress)
        );
        let long = "a".repeat(MAX_SHIPPING_ADDRESS_LEN + 1);
        assert_eq!(
            OrderDraft::new(UserId::new(1), vec![item(1, "x", 1, 1)], &long, "r".to_owned()),
            Err(OrderError::ShippingAddressTooLong)
        );
    }

    #[test]
    fn test_apply_payment_is_idempotent() {
        let mut order = order();
        let later = t0() + Duration::minutes(5);
        assert_eq!(
            order.apply_payment("pay_1", later).unwrap(),
            PaymentOutcome::Applied
        );
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.paid_at, Some(later));

        assert_eq!(
            order.apply_payment("pay_2", later + Duration::minutes(1)).unwrap(),
            PaymentOutcome::AlreadyPaid
        );
        assert_eq!(order.payment_id.as_deref(), Some("pay_1"));
        assert_eq!(order.paid_at, Some(later));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_failed_payment_is_not_revived() {
        let mut order = order();
        assert!(order.mark_payment_failed(t0()).unwrap());
        assert!(!order.mark_payment_failed(t0()).unwrap());
        assert_eq!(
            order.apply_payment("pay_1", t0()),
            Err(OrderError::PaymentAlreadyFailed)
        );
    }

    #[test]
    fn test_paid_order_cannot_be_marked_failed() {
        let mut order = paid_order();
        assert_eq!(
            order.mark_payment_failed(t0()),
            Err(OrderError::PaymentAlreadyCompleted)
        );
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_cancel_from_processing() {
        let mut order = paid_order();
        order.advance_status(OrderStatus::Processing, t0()).unwrap();
        let at = t0() + Duration::hours(1);
        assert_eq!(
            order.cancel(at).unwrap(),
            StatusChange::Changed {
                from: OrderStatus::Processing,
                to: OrderStatus::Cancelled
            }
        );
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.tracking.cancelled_at, Some(at));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_cancel_after_shipment_conflicts() {
        let mut order = paid_order();
        order.advance_status(OrderStatus::Shipped, t0()).unwrap();
        assert_eq!(
            order.cancel(t0()),
            Err(OrderError::NotCancellable(OrderStatus::Shipped))
        );
        assert_eq!(order.status, OrderStatus::Shipped);
        assert!(order.tracking.cancelled_at.is_none());
    }

    #[test]
    fn test_cancel_twice_is_a_no_op() {
        let mut order = order();
        order.cancel(t0()).unwrap();
        let stamped = order.tracking.cancelled_at;
        assert_eq!(
            order.cancel(t0() + Duration::hours(1)).unwrap(),
            StatusChange::Unchanged
        );
        assert_eq!(order.tracking.cancelled_at, stamped);
    }

    #[test]
    fn test_advance_stamps_shipped_and_delivered_once() {
        let mut order = paid_order();
        let shipped = t0() + Duration::days(1);
        order.advance_status(OrderStatus::Shipped, shipped).unwrap();
        assert_eq!(order.tracking.shipped_at, Some(shipped));

        let out = t0() + Duration::days(2);
        order.advance_status(OrderStatus::OutForDelivery, out).unwrap();
        assert_eq!(order.tracking.shipped_at, Some(shipped));

        let delivered = t0() + Duration::days(3);
        order.advance_status(OrderStatus::Delivered, delivered).unwrap();
        assert_eq!(order.tracking.delivered_at, Some(delivered));
        assert_eq!(order.tracking.shipped_at, Some(shipped));
    }

    #[test]
    fn test_skipping_to_delivered_stamps_shipped() {
        let mut order = paid_order();
        order.advance_status(OrderStatus::Delivered, t0()).unwrap();
        assert_eq!(order.tracking.shipped_at, Some(t0()));
        assert_eq!(order.tracking.delivered_at, Some(t0()));
    }

    #[test]
    fn test_advance_rejects_backwards_and_terminal() {
        let mut order = paid_order();
        order.advance_status(OrderStatus::Shipped, t0()).unwrap();
        assert_eq!(
            order.advance_status(OrderStatus::Confirmed, t0()),
            Err(OrderError::BackwardTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Confirmed
            })
        );

        order.advance_status(OrderStatus::Delivered, t0()).unwrap();
        assert_eq!(
            order.advance_status(OrderStatus::Cancelled, t0()),
            Err(OrderError::StatusTerminal(OrderStatus::Delivered))
        );
    }

    #[test]
    fn test_same_status_is_unchanged() {
        let mut order = order();
        let before = order.clone();
        assert_eq!(
            order.advance_status(OrderStatus::Pending, t0() + Duration::hours(1)),
            Ok(StatusChange::Unchanged)
        );
        assert_eq!(order, before);
    }

    #[test]
    fn test_operator_cancel_through_advance() {
        let mut order = order();
        order.advance_status(OrderStatus::Confirmed, t0()).unwrap();
        assert!(order
            .advance_status(OrderStatus::Cancelled, t0())
            .unwrap()
            .is_changed());
        assert_eq!(
            order.advance_status(OrderStatus::Processing, t0()),
            Err(OrderError::StatusTerminal(OrderStatus::Cancelled))
        );
    }

    #[test]
    fn test_tracking_update() {
        let mut order = paid_order();
        let expected = t0() + Duration::days(4);
        let update = TrackingUpdate {
            courier_name: Some(" Blue Dart ".to_owned()),
            tracking_number: Some("BD123".to_owned()),
            expected_delivery_at: Some(expected),
        };
        assert!(order.update_tracking(&update, t0()).unwrap());
        assert_eq!(order.tracking.courier_name.as_deref(), Some("Blue Dart"));
        assert_eq!(order.tracking.expected_delivery_at, Some(expected));

        // Same values again change nothing.
        assert!(!order.update_tracking(&update, t0()).unwrap());

        let clear = TrackingUpdate {
            tracking_number: Some(String::new()),
            ..TrackingUpdate::default()
        };
        assert!(order.update_tracking(&clear, t0()).unwrap());
        assert_eq!(order.tracking.tracking_number, None);
        assert_eq!(order.tracking.courier_name.as_deref(), Some("Blue Dart"));
    }

    #[test]
    fn test_tracking_validation() {
        let mut order = paid_order();
        let update = TrackingUpdate {
            courier_name: Some("c".repeat(MAX_TRACKING_FIELD_LEN + 1)),
            ..TrackingUpdate::default()
        };
        let err = order.update_tracking(&update, t0()).unwrap_err();
        assert!(err.is_validation());

        order.cancel(t0()).unwrap();
        let update = TrackingUpdate {
            tracking_number: Some("X1".to_owned()),
            ..TrackingUpdate::default()
        };
        assert_eq!(
            order.update_tracking(&update, t0()),
            Err(OrderError::TrackingOnCancelled)
        );
    }

    #[test]
    fn test_refund_requires_payment() {
        let mut order = order();
        let request = RefundRequest::new(RefundReason::Defective, None, None).unwrap();
        assert_eq!(
            order.file_refund(request, t0()),
            Err(OrderError::RefundRequiresPayment)
        );
        assert!(!order.refund.refund_requested);
    }

    #[test]
    fn test_refund_filed_exactly_once() {
        let mut order = paid_order();
        let request =
            RefundRequest::new(RefundReason::Other, Some("arrived late"), Some("sorry")).unwrap();
        order.file_refund(request.clone(), t0()).unwrap();
        assert!(order.refund.refund_requested);
        assert_eq!(order.refund.refund_status, RefundStatus::Requested);
        assert_eq!(order.refund.refund_reason, Some(RefundReason::Other));
        assert_eq!(order.refund.refund_reason_other.as_deref(), Some("arrived late"));
        assert_eq!(order.refund.refund_requested_at, Some(t0()));

        assert_eq!(
            order.file_refund(request, t0()),
            Err(OrderError::RefundAlreadyRequested)
        );
    }

    #[test]
    fn test_refund_resolution_paths() {
        let mut order = paid_order();
        order
            .file_refund(
                RefundRequest::new(RefundReason::Defective, None, None).unwrap(),
                t0(),
            )
            .unwrap();

        assert_eq!(
            order.resolve_refund(RefundStatus::Refunded, t0()),
            Err(OrderError::IllegalRefundTransition {
                from: RefundStatus::Requested,
                to: RefundStatus::Refunded
            })
        );

        let approved_at = t0() + Duration::days(1);
        assert!(order.resolve_refund(RefundStatus::Approved, approved_at).unwrap());
        assert_eq!(order.refund.refund_updated_at, Some(approved_at));
        assert!(!order.resolve_refund(RefundStatus::Approved, t0()).unwrap());
        assert!(order.resolve_refund(RefundStatus::Refunded, t0()).unwrap());
        assert_eq!(order.refund.refund_status, RefundStatus::Refunded);
    }

    #[test]
    fn test_rejected_refund_is_terminal() {
        let mut order = paid_order();
        order
            .file_refund(
                RefundRequest::new(RefundReason::ChangedMind, None, None).unwrap(),
                t0(),
            )
            .unwrap();
        order.resolve_refund(RefundStatus::Rejected, t0()).unwrap();
        assert!(order.refund.refund_requested);
        assert!(order.resolve_refund(RefundStatus::Approved, t0()).is_err());
        assert_eq!(
            order.resolve_refund(RefundStatus::Requested, t0()),
            Err(OrderError::InvalidRefundResolution)
        );
    }

    #[test]
    fn test_resolve_without_request_conflicts() {
        let mut order = paid_order();
        assert!(matches!(
            order.resolve_refund(RefundStatus::Approved, t0()),
            Err(OrderError::IllegalRefundTransition { .. })
        ));
    }

    #[test]
    fn test_invoice_projection() {
        let order = paid_order();
        let invoice = order.invoice();
        assert_eq!(invoice.lines.len(), 2);
        assert_eq!(invoice.lines[0].product_name, "Masala chai");
        assert_eq!(invoice.lines[0].line_total, Decimal::from(200));
        assert_eq!(invoice.payment_id.as_deref(), Some("pay_1"));
        assert_eq!(invoice.totals, order.totals);
    }

    #[test]
    fn test_order_serializes_flat_camel_case() {
        let json = serde_json::to_value(order()).unwrap();
        assert_eq!(json["total"], "262.50");
        assert_eq!(json["paymentStatus"], "pending");
        assert_eq!(json["refundStatus"], "none");
        assert_eq!(json["refundRequested"], false);
        assert_eq!(json["paymentAuthorityOrderId"], "order_abc");
        assert!(json.get("version").is_none());
        assert!(json.get("receipt").is_none());
    }
}
