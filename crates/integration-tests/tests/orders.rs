//! Order lifecycle tests: customer cancellation, refunds and operator moves.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use marigold_core::{
    Order, OrderError, OrderId, OrderStatus, PaymentStatus, Quantity, RefundReason,
    RefundRequestError, RefundStatus, UserId,
};
use marigold_integration_tests::{MemoryStore, StubAuthority, signed_callback, signer};
use marigold_storefront::db::OrderFilter;
use marigold_storefront::services::{
    AdminOrderService, AdminOrderUpdate, CheckoutService, CheckoutSource, OrderService,
    OrderServiceError, PaymentVerifier,
};

const OWNER: UserId = UserId::new(20);
const STRANGER: UserId = UserId::new(21);

async fn place(store: &Arc<MemoryStore>, user: UserId) -> Order {
    let authority = StubAuthority::new();
    let lamp = store.add_product("Brass Lamp", 89_900);
    CheckoutService::new(&**store, &**store, &**store, &*authority)
        .checkout(
            user,
            CheckoutSource::BuyNow {
                product_id: lamp,
                quantity: Quantity::ONE,
            },
            "7 Lake View, Udaipur",
        )
        .await
        .unwrap()
        .order
}

async fn place_paid(store: &Arc<MemoryStore>) -> Order {
    let order = place(store, OWNER).await;
    let signatures = signer();
    PaymentVerifier::new(&**store, &signatures)
        .verify(&signed_callback(&order, "pay_lamp"))
        .await
        .unwrap()
        .0
}

async fn move_to(store: &Arc<MemoryStore>, id: OrderId, status: OrderStatus) -> Order {
    AdminOrderService::new(&**store)
        .update(
            id,
            &AdminOrderUpdate {
                status: Some(status),
                ..AdminOrderUpdate::default()
            },
        )
        .await
        .unwrap()
}

// =============================================================================
// Customer reads
// =============================================================================

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;
    place(&store, STRANGER).await;
    let service = OrderService::new(&*store);

    assert_eq!(service.get(OWNER, order.id).await.unwrap().id, order.id);
    assert!(matches!(
        service.get(STRANGER, order.id).await.unwrap_err(),
        OrderServiceError::Forbidden
    ));
    assert!(matches!(
        service.get(OWNER, OrderId::new(777)).await.unwrap_err(),
        OrderServiceError::NotFound(_)
    ));

    let mine = service.list(OWNER).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(mine.iter().all(|o| o.user_id == OWNER));
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let store = MemoryStore::new();
    let first = place(&store, OWNER).await;
    let second = place(&store, OWNER).await;

    let ids: Vec<OrderId> = OrderService::new(&*store)
        .list(OWNER)
        .await
        .unwrap()
        .iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn test_invoice_projection() {
    let store = MemoryStore::new();
    let order = place_paid(&store).await;

    let invoice = order.invoice();
    assert_eq!(invoice.order_id, order.id);
    assert_eq!(invoice.payment_id.as_deref(), Some("pay_lamp"));
    assert_eq!(invoice.lines.len(), 1);
    assert_eq!(invoice.lines[0].product_name, "Brass Lamp");
    assert_eq!(invoice.totals, order.totals);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_processing_order_can_be_cancelled() {
    let store = MemoryStore::new();
    let order = place_paid(&store).await;
    move_to(&store, order.id, OrderStatus::Processing).await;

    let cancelled = OrderService::new(&*store)
        .cancel(OWNER, order.id)
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.tracking.cancelled_at.is_some());
    // Payment is settled separately through the refund flow
    assert_eq!(cancelled.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_shipped_order_cannot_be_cancelled() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;
    move_to(&store, order.id, OrderStatus::Shipped).await;

    let err = OrderService::new(&*store)
        .cancel(OWNER, order.id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderServiceError::Transition(OrderError::NotCancellable(OrderStatus::Shipped))
    ));
    assert_eq!(
        store.order(order.id).unwrap().status,
        OrderStatus::Shipped
    );
}

#[tokio::test]
async fn test_cancel_twice_is_a_no_op() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;
    let service = OrderService::new(&*store);

    let first = service.cancel(OWNER, order.id).await.unwrap();
    let second = service.cancel(OWNER, order.id).await.unwrap();

    assert_eq!(second.tracking.cancelled_at, first.tracking.cancelled_at);
    assert_eq!(second.version, first.version);
}

#[tokio::test]
async fn test_stranger_cannot_cancel() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;

    let err = OrderService::new(&*store)
        .cancel(STRANGER, order.id)
        .await
        .unwrap_err();

    assert!(matches!(err, OrderServiceError::Forbidden));
    assert_eq!(store.order(order.id).unwrap().status, OrderStatus::Pending);
}

// =============================================================================
// Refunds
// =============================================================================

#[tokio::test]
async fn test_refund_requires_payment() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;

    let err = OrderService::new(&*store)
        .request_refund(OWNER, order.id, RefundReason::Defective, None, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderServiceError::Transition(OrderError::RefundRequiresPayment)
    ));
}

#[tokio::test]
async fn test_refund_is_filed_exactly_once() {
    let store = MemoryStore::new();
    let order = place_paid(&store).await;
    let service = OrderService::new(&*store);

    let filed = service
        .request_refund(
            OWNER,
            order.id,
            RefundReason::DamagedInTransit,
            None,
            Some("  Glass cracked  "),
        )
        .await
        .unwrap();
    assert!(filed.refund.refund_requested);
    assert_eq!(filed.refund.refund_status, RefundStatus::Requested);
    assert_eq!(filed.refund.refund_comment.as_deref(), Some("Glass cracked"));

    let err = service
        .request_refund(OWNER, order.id, RefundReason::ChangedMind, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderServiceError::Transition(OrderError::RefundAlreadyRequested)
    ));
}

#[tokio::test]
async fn test_other_reason_needs_text() {
    let store = MemoryStore::new();
    let order = place_paid(&store).await;

    let err = OrderService::new(&*store)
        .request_refund(OWNER, order.id, RefundReason::Other, Some("   "), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderServiceError::RefundRequest(RefundRequestError::MissingReasonOther)
    ));
    assert!(!store.order(order.id).unwrap().refund.refund_requested);
}

#[tokio::test]
async fn test_refund_resolution_path() {
    let store = MemoryStore::new();
    let order = place_paid(&store).await;
    OrderService::new(&*store)
        .request_refund(OWNER, order.id, RefundReason::WrongItem, None, None)
        .await
        .unwrap();
    let admin = AdminOrderService::new(&*store);

    let err = admin
        .resolve_refund(order.id, RefundStatus::Refunded)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderServiceError::Transition(OrderError::IllegalRefundTransition { .. })
    ));

    let approved = admin
        .resolve_refund(order.id, RefundStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.refund.refund_status, RefundStatus::Approved);

    let refunded = admin
        .resolve_refund(order.id, RefundStatus::Refunded)
        .await
        .unwrap();
    assert_eq!(refunded.refund.refund_status, RefundStatus::Refunded);
}

#[tokio::test]
async fn test_rejected_refund_is_final() {
    let store = MemoryStore::new();
    let order = place_paid(&store).await;
    OrderService::new(&*store)
        .request_refund(OWNER, order.id, RefundReason::QualityIssue, None, None)
        .await
        .unwrap();
    let admin = AdminOrderService::new(&*store);

    admin
        .resolve_refund(order.id, RefundStatus::Rejected)
        .await
        .unwrap();
    let err = admin
        .resolve_refund(order.id, RefundStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderServiceError::Transition(_)));

    let err = OrderService::new(&*store)
        .request_refund(OWNER, order.id, RefundReason::QualityIssue, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderServiceError::Transition(OrderError::RefundAlreadyRequested)
    ));
}

// =============================================================================
// Operator updates
// =============================================================================

#[tokio::test]
async fn test_forward_skip_stamps_shipped_at() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;

    let moved = move_to(&store, order.id, OrderStatus::OutForDelivery).await;
    assert_eq!(moved.status, OrderStatus::OutForDelivery);
    assert!(moved.tracking.shipped_at.is_some());
    assert!(moved.tracking.delivered_at.is_none());

    let delivered = move_to(&store, order.id, OrderStatus::Delivered).await;
    assert_eq!(delivered.tracking.shipped_at, moved.tracking.shipped_at);
    assert!(delivered.tracking.delivered_at.is_some());
}

#[tokio::test]
async fn test_backward_and_terminal_moves_conflict() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;
    let admin = AdminOrderService::new(&*store);
    move_to(&store, order.id, OrderStatus::Shipped).await;

    let back = AdminOrderUpdate {
        status: Some(OrderStatus::Confirmed),
        ..AdminOrderUpdate::default()
    };
    assert!(matches!(
        admin.update(order.id, &back).await.unwrap_err(),
        OrderServiceError::Transition(OrderError::BackwardTransition { .. })
    ));

    move_to(&store, order.id, OrderStatus::Delivered).await;
    let cancel = AdminOrderUpdate {
        status: Some(OrderStatus::Cancelled),
        ..AdminOrderUpdate::default()
    };
    assert!(matches!(
        admin.update(order.id, &cancel).await.unwrap_err(),
        OrderServiceError::Transition(OrderError::StatusTerminal(OrderStatus::Delivered))
    ));
}

#[tokio::test]
async fn test_tracking_fields_set_and_clear() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;
    let admin = AdminOrderService::new(&*store);
    let eta = Utc.with_ymd_and_hms(2026, 11, 2, 12, 0, 0).unwrap();

    let updated = admin
        .update(
            order.id,
            &AdminOrderUpdate {
                status: Some(OrderStatus::Shipped),
                courier_name: Some("Delhivery".to_string()),
                tracking_number: Some("DLV123456".to_string()),
                expected_delivery_at: Some(eta),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.tracking.courier_name.as_deref(), Some("Delhivery"));
    assert_eq!(updated.tracking.expected_delivery_at, Some(eta));

    let cleared = admin
        .update(
            order.id,
            &AdminOrderUpdate {
                tracking_number: Some(String::new()),
                ..AdminOrderUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.tracking.tracking_number.is_none());
    assert_eq!(cleared.tracking.courier_name.as_deref(), Some("Delhivery"));
}

#[tokio::test]
async fn test_overlong_tracking_field_is_rejected_atomically() {
    let store = MemoryStore::new();
    let order = place(&store, OWNER).await;

    let err = AdminOrderService::new(&*store)
        .update(
            order.id,
            &AdminOrderUpdate {
                status: Some(OrderStatus::Shipped),
                courier_name: Some("x".repeat(101)),
                ..AdminOrderUpdate::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderServiceError::Transition(OrderError::TrackingFieldTooLong { .. })
    ));
    assert_eq!(store.order(order.id).unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_bulk_status_reports_each_order() {
    let store = MemoryStore::new();
    let open = place(&store, OWNER).await;
    let cancelled = place(&store, OWNER).await;
    OrderService::new(&*store)
        .cancel(OWNER, cancelled.id)
        .await
        .unwrap();
    let missing = OrderId::new(5_000);

    let results = AdminOrderService::new(&*store)
        .bulk_status(&[open.id, cancelled.id, missing], OrderStatus::Confirmed)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert_eq!(results[0].status, Some(OrderStatus::Confirmed));
    assert!(!results[1].success);
    assert!(results[1].error.is_some());
    assert!(!results[2].success);
    assert_eq!(
        store.order(cancelled.id).unwrap().status,
        OrderStatus::Cancelled
    );
}

#[tokio::test]
async fn test_bulk_status_rejects_empty_list() {
    let store = MemoryStore::new();
    let err = AdminOrderService::new(&*store)
        .bulk_status(&[], OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderServiceError::Validation(_)));
}

#[tokio::test]
async fn test_admin_list_filters_and_limits() {
    let store = MemoryStore::new();
    let paid = place_paid(&store).await;
    place(&store, STRANGER).await;
    let admin = AdminOrderService::new(&*store);

    let filter = OrderFilter {
        payment_status: Some(PaymentStatus::Paid),
        ..OrderFilter::default()
    };
    let found = admin.list(&filter).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, paid.id);

    let all = admin.list(&OrderFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let too_many = OrderFilter {
        limit: Some(201),
        ..OrderFilter::default()
    };
    assert!(matches!(
        admin.list(&too_many).await.unwrap_err(),
        OrderServiceError::Validation(_)
    ));
}
