//! Catalog product as seen by the order engine.

use serde::Serialize;

use marigold_core::{Price, ProductId};

/// A product row. Prices are always read fresh; nothing downstream caches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub in_stock: bool,
}
