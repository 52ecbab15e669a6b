//! Catalog repository.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use marigold_core::{Price, ProductId};

use super::{CatalogStore, RepositoryError};
use crate::models::Product;

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    price: Decimal,
    in_stock: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = Price::new(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for product {}: {e}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            price,
            in_stock: row.in_stock,
        })
    }
}

/// `PostgreSQL` catalog reader.
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, price, in_stock
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw_ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();

        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, price, in_stock
            FROM storefront.product
            WHERE id = ANY($1)
            ",
        )
        .bind(&raw_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
