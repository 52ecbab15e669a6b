//! Order repository.
//!
//! Orders are written once by [`OrderStore::create`] and afterwards only
//! through [`OrderStore::save`], which bumps `version` and refuses to
//! overwrite a row that changed since it was read.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use marigold_core::{
    NewOrder, Order, OrderId, OrderItem, OrderItemId, OrderStatus, PaymentStatus, Price,
    ProductId, Quantity, RefundReason, RefundRecord, RefundStatus, Totals, Tracking, UserId,
};

use super::carts::CartLineRow;
use super::{OrderFilter, OrderStore, RepositoryError, map_constraint_error};
use crate::models::{CartClaim, CartLine};

const SELECT_ORDER: &str = r"
    SELECT id, user_id, subtotal, tax, delivery, total, shipping_address,
           receipt, payment_authority_order_id, payment_id, payment_status, paid_at,
           status, courier_name, tracking_number, expected_delivery_at,
           shipped_at, delivered_at, cancelled_at,
           refund_requested, refund_reason, refund_reason_other, refund_comment,
           refund_status, refund_requested_at, refund_updated_at,
           version, created_at, updated_at
    FROM storefront.customer_order
";

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    subtotal: Decimal,
    tax: Decimal,
    delivery: Decimal,
    total: Decimal,
    shipping_address: String,
    receipt: String,
    payment_authority_order_id: String,
    payment_id: Option<String>,
    payment_status: PaymentStatus,
    paid_at: Option<DateTime<Utc>>,
    status: OrderStatus,
    courier_name: Option<String>,
    tracking_number: Option<String>,
    expected_delivery_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    refund_requested: bool,
    refund_reason: Option<RefundReason>,
    refund_reason_other: Option<String>,
    refund_comment: Option<String>,
    refund_status: RefundStatus,
    refund_requested_at: Option<DateTime<Utc>>,
    refund_updated_at: Option<DateTime<Utc>>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

fn corrupt(order_id: OrderId, what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("order {order_id}: invalid {what}: {err}"))
}

impl OrderItemRow {
    fn into_item(self) -> Result<OrderItem, RepositoryError> {
        let quantity = Quantity::new(i64::from(self.quantity))
            .map_err(|e| corrupt(self.order_id, "item quantity", e))?;
        let unit_price =
            Price::new(self.unit_price).map_err(|e| corrupt(self.order_id, "item price", e))?;
        Ok(OrderItem {
            id: self.id,
            product_id: self.product_id,
            product_name: self.product_name,
            quantity,
            unit_price,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let id = self.id;
        let price = |value: Decimal, what: &str| Price::new(value).map_err(|e| corrupt(id, what, e));
        let totals = Totals {
            subtotal: price(self.subtotal, "subtotal")?,
            tax: price(self.tax, "tax")?,
            delivery: price(self.delivery, "delivery")?,
            total: price(self.total, "total")?,
        };
        if !totals.is_consistent() {
            return Err(corrupt(id, "totals", "total != subtotal + tax + delivery"));
        }

        Ok(Order {
            id,
            user_id: self.user_id,
            items,
            totals,
            shipping_address: self.shipping_address,
            receipt: self.receipt,
            payment_authority_order_id: self.payment_authority_order_id,
            payment_id: self.payment_id,
            payment_status: self.payment_status,
            paid_at: self.paid_at,
            status: self.status,
            tracking: Tracking {
                courier_name: self.courier_name,
                tracking_number: self.tracking_number,
                expected_delivery_at: self.expected_delivery_at,
                shipped_at: self.shipped_at,
                delivered_at: self.delivered_at,
                cancelled_at: self.cancelled_at,
            },
            refund: RefundRecord {
                refund_requested: self.refund_requested,
                refund_reason: self.refund_reason,
                refund_reason_other: self.refund_reason_other,
                refund_comment: self.refund_comment,
                refund_status: self.refund_status,
                refund_requested_at: self.refund_requested_at,
                refund_updated_at: self.refund_updated_at,
            },
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` order repository.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach items to order rows, preserving row order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT id, order_id, product_id, product_name, quantity, unit_price
            FROM storefront.order_item
            WHERE order_id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.into_item()?);
        }

        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect()
    }
}

/// Lock the claimed cart and confirm its lines are unchanged.
///
/// Locking the cart row also blocks concurrent inserts of new lines, since
/// their foreign key check needs a share lock on it.
async fn lock_claimed_cart(
    tx: &mut Transaction<'_, Postgres>,
    claim: &CartClaim,
) -> Result<(), RepositoryError> {
    sqlx::query("SELECT id FROM storefront.cart WHERE id = $1 FOR UPDATE")
        .bind(claim.cart_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

    let rows: Vec<CartLineRow> = sqlx::query_as(
        r"
        SELECT product_id, quantity
        FROM storefront.cart_item
        WHERE cart_id = $1
        FOR UPDATE
        ",
    )
    .bind(claim.cart_id)
    .fetch_all(&mut **tx)
    .await?;

    let current = rows
        .into_iter()
        .map(CartLine::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    if !claim.matches(&current) {
        return Err(RepositoryError::Conflict(
            "cart changed during checkout".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(
        &self,
        order: NewOrder,
        cart: Option<&CartClaim>,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(claim) = cart {
            lock_claimed_cart(&mut tx, claim).await?;
        }

        let (id, created_at): (OrderId, DateTime<Utc>) = sqlx::query_as(
            r"
            INSERT INTO storefront.customer_order
                (user_id, subtotal, tax, delivery, total, shipping_address,
                 receipt, payment_authority_order_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, created_at
            ",
        )
        .bind(order.user_id)
        .bind(order.totals.subtotal.amount())
        .bind(order.totals.tax.amount())
        .bind(order.totals.delivery.amount())
        .bind(order.totals.total.amount())
        .bind(&order.shipping_address)
        .bind(&order.receipt)
        .bind(&order.payment_authority_order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint_error)?;

        let mut item_ids = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let item_id: OrderItemId = sqlx::query_scalar(
                r"
                INSERT INTO storefront.order_item
                    (order_id, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                ",
            )
            .bind(id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity.get())
            .bind(item.unit_price.amount())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_constraint_error)?;
            item_ids.push(item_id);
        }

        if let Some(claim) = cart {
            sqlx::query("DELETE FROM storefront.cart_item WHERE cart_id = $1")
                .bind(claim.cart_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE storefront.cart SET updated_at = NOW() WHERE id = $1")
                .bind(claim.cart_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(order.into_order(id, item_ids, created_at))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{SELECT_ORDER} WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"{SELECT_ORDER}
            WHERE ($1::storefront.order_status IS NULL OR status = $1)
              AND ($2::storefront.payment_status IS NULL OR payment_status = $2)
              AND ($3::storefront.refund_status IS NULL OR refund_status = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5"
        ))
        .bind(filter.status)
        .bind(filter.payment_status)
        .bind(filter.refund_status)
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn save(&self, order: &Order) -> Result<i32, RepositoryError> {
        let version: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE storefront.customer_order
            SET payment_id = $3,
                payment_status = $4,
                paid_at = $5,
                status = $6,
                courier_name = $7,
                tracking_number = $8,
                expected_delivery_at = $9,
                shipped_at = $10,
                delivered_at = $11,
                cancelled_at = $12,
                refund_requested = $13,
                refund_reason = $14,
                refund_reason_other = $15,
                refund_comment = $16,
                refund_status = $17,
                refund_requested_at = $18,
                refund_updated_at = $19,
                updated_at = $20,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            ",
        )
        .bind(order.id)
        .bind(order.version)
        .bind(&order.payment_id)
        .bind(order.payment_status)
        .bind(order.paid_at)
        .bind(order.status)
        .bind(&order.tracking.courier_name)
        .bind(&order.tracking.tracking_number)
        .bind(order.tracking.expected_delivery_at)
        .bind(order.tracking.shipped_at)
        .bind(order.tracking.delivered_at)
        .bind(order.tracking.cancelled_at)
        .bind(order.refund.refund_requested)
        .bind(order.refund.refund_reason)
        .bind(&order.refund.refund_reason_other)
        .bind(&order.refund.refund_comment)
        .bind(order.refund.refund_status)
        .bind(order.refund.refund_requested_at)
        .bind(order.refund.refund_updated_at)
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_constraint_error)?;

        version.ok_or(RepositoryError::StaleWrite(order.id))
    }
}
