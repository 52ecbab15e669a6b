//! Cart service.
//!
//! A cart stores product ids and quantities only. Every read prices the
//! lines against the current catalog.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use marigold_core::{
    CartId, DeliveryPolicy, LineAmount, Price, PricingError, ProductId, Quantity, QuantityError,
    Totals, UserId,
};

use crate::db::{CartStore, CatalogStore, RepositoryError};
use crate::models::{CartLine, CartView, MergeReport, PricedCartLine, Product};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Quantity(#[from] QuantityError),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("product {0} is not in the cart")]
    ItemNotFound(ProductId),

    #[error("a cart line cannot hold more than {max} units")]
    QuantityLimit { max: i32 },

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One line of a guest cart being merged in.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestCartLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Cart service.
pub struct CartService<'a> {
    catalog: &'a dyn CatalogStore,
    carts: &'a dyn CartStore,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(catalog: &'a dyn CatalogStore, carts: &'a dyn CartStore) -> Self {
        Self { catalog, carts }
    }

    /// The user's cart, created empty on first read.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` on storage failure.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, CartError> {
        let cart_id = self.carts.ensure_cart(user_id).await?;
        self.priced(cart_id).await
    }

    /// Add units of a product, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid quantity, an unknown product, or a
    /// line that would exceed the per-line limit.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView, CartError> {
        let quantity = Quantity::new(quantity)?;
        self.catalog
            .product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        let cart_id = self.carts.ensure_cart(user_id).await?;
        let merged = self
            .carts
            .add(cart_id, product_id, quantity)
            .await?
            .ok_or(CartError::QuantityLimit { max: Quantity::MAX })?;

        tracing::debug!(quantity = %merged, "Cart line updated");
        self.priced(cart_id).await
    }

    /// Set the quantity of a line already in the cart.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid quantity or a product not in the cart.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView, CartError> {
        let quantity = Quantity::new(quantity)?;
        let cart_id = self.carts.ensure_cart(user_id).await?;
        if !self.carts.set_quantity(cart_id, product_id, quantity).await? {
            return Err(CartError::ItemNotFound(product_id));
        }
        self.priced(cart_id).await
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the product is not in the cart.
    pub async fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<CartView, CartError> {
        let cart_id = self.carts.ensure_cart(user_id).await?;
        if !self.carts.remove(cart_id, product_id).await? {
            return Err(CartError::ItemNotFound(product_id));
        }
        self.priced(cart_id).await
    }

    /// Merge a guest cart into the user's cart.
    ///
    /// Quantities are validated up front; unknown products are skipped and
    /// reported. A line that would exceed the per-line limit is capped.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Quantity` if any quantity is invalid (nothing is
    /// merged in that case).
    #[instrument(skip(self, lines), fields(user_id = %user_id, lines = lines.len()))]
    pub async fn merge(
        &self,
        user_id: UserId,
        lines: &[GuestCartLine],
    ) -> Result<(MergeReport, CartView), CartError> {
        let validated = lines
            .iter()
            .map(|line| Ok((line.product_id, Quantity::new(line.quantity)?)))
            .collect::<Result<Vec<_>, QuantityError>>()?;

        let ids: Vec<ProductId> = validated.iter().map(|(id, _)| *id).collect();
        let known: HashMap<ProductId, Product> = self
            .catalog
            .products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let cart_id = self.carts.ensure_cart(user_id).await?;
        let mut report = MergeReport::default();
        for (product_id, quantity) in validated {
            if !known.contains_key(&product_id) {
                report.skipped.push(product_id);
                continue;
            }
            if self.carts.add(cart_id, product_id, quantity).await?.is_none() {
                let max = Quantity::new(i64::from(Quantity::MAX))?;
                self.carts.set_quantity(cart_id, product_id, max).await?;
            }
            report.merged.push(product_id);
        }

        tracing::info!(
            merged = report.merged.len(),
            skipped = report.skipped.len(),
            "Guest cart merged"
        );
        Ok((report, self.priced(cart_id).await?))
    }

    async fn priced(&self, cart_id: CartId) -> Result<CartView, CartError> {
        let lines = self.carts.lines(cart_id).await?;
        let items = price_lines(self.catalog, &lines).await?;

        let totals = if items.is_empty() {
            Totals {
                subtotal: Price::ZERO,
                tax: Price::ZERO,
                delivery: Price::ZERO,
                total: Price::ZERO,
            }
        } else {
            let amounts: Vec<LineAmount> = items
                .iter()
                .map(|i| LineAmount::new(i.unit_price, i.quantity))
                .collect();
            Totals::calculate(&amounts, DeliveryPolicy::default())?
        };

        Ok(CartView {
            cart_id,
            items,
            totals,
        })
    }
}

/// Price cart lines against the catalog, dropping lines whose product is gone.
async fn price_lines(
    catalog: &dyn CatalogStore,
    lines: &[CartLine],
) -> Result<Vec<PricedCartLine>, RepositoryError> {
    let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<ProductId, Product> = catalog
        .products(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(lines
        .iter()
        .filter_map(|line| {
            let product = products.get(&line.product_id)?;
            Some(PricedCartLine {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price,
                quantity: line.quantity,
                in_stock: product.in_stock,
                line_total: product.price.amount() * Decimal::from(line.quantity.get()),
            })
        })
        .collect())
}
