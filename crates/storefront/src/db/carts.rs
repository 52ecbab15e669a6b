//! Cart repository.
//!
//! Every mutation is a single statement against the `(cart_id, product_id)`
//! unique key, so concurrent adds for the same product merge instead of
//! racing.

use async_trait::async_trait;
use sqlx::PgPool;

use marigold_core::{CartId, ProductId, Quantity, UserId};

use super::{CartStore, RepositoryError, map_constraint_error};
use crate::models::CartLine;

#[derive(sqlx::FromRow)]
pub(super) struct CartLineRow {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(i64::from(row.quantity)).map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "invalid cart quantity for product {}: {e}",
                row.product_id
            ))
        })?;
        Ok(Self {
            product_id: row.product_id,
            quantity,
        })
    }
}

/// `PostgreSQL` cart repository.
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn ensure_cart(&self, user_id: UserId) -> Result<CartId, RepositoryError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let id: CartId = sqlx::query_scalar(
            r"
            INSERT INTO storefront.cart (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING id
            ",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows: Vec<CartLineRow> = sqlx::query_as(
            r"
            SELECT product_id, quantity
            FROM storefront.cart_item
            WHERE cart_id = $1
            ORDER BY id
            ",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn add(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<Option<Quantity>, RepositoryError> {
        // When the merged quantity would exceed the limit the WHERE clause
        // suppresses the update and no row comes back.
        let merged: Option<i32> = sqlx::query_scalar(
            r"
            INSERT INTO storefront.cart_item (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE
                SET quantity = cart_item.quantity + EXCLUDED.quantity,
                    updated_at = NOW()
                WHERE cart_item.quantity + EXCLUDED.quantity <= $4
            RETURNING quantity
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity.get())
        .bind(Quantity::MAX)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_constraint_error)?;

        if merged.is_some() {
            touch_cart(&self.pool, cart_id).await?;
        }

        merged
            .map(|q| {
                Quantity::new(i64::from(q)).map_err(|e| {
                    RepositoryError::DataCorruption(format!("invalid merged quantity: {e}"))
                })
            })
            .transpose()
    }

    async fn set_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.cart_item
            SET quantity = $3, updated_at = NOW()
            WHERE cart_id = $1 AND product_id = $2
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity.get())
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            touch_cart(&self.pool, cart_id).await?;
        }
        Ok(updated)
    }

    async fn remove(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM storefront.cart_item
            WHERE cart_id = $1 AND product_id = $2
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            touch_cart(&self.pool, cart_id).await?;
        }
        Ok(removed)
    }
}

async fn touch_cart(pool: &PgPool, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE storefront.cart SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(())
}
