//! Checkout orchestration.
//!
//! Turns the user's cart (or a single buy-now item) into an order and a
//! payment authority order. The authority is called first with a fresh
//! receipt; only once it answers is the order written, in one transaction
//! that also clears the cart. A failure at any step leaves no order and the
//! cart untouched.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use marigold_core::{
    CurrencyCode, NewOrderItem, Order, OrderDraft, OrderError, PriceError, ProductId, Quantity,
    QuantityError, UserId,
};

use crate::db::{CartStore, CatalogStore, OrderStore, RepositoryError};
use crate::models::{CartClaim, Product};
use crate::payments::{AuthorityError, AuthorityOrderRequest, PaymentAuthority};

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error(transparent)]
    Quantity(#[from] QuantityError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("order total cannot be charged: {0}")]
    Amount(#[from] PriceError),

    /// Free orders have nothing to collect and the authority refuses them.
    #[error("order total must be greater than zero")]
    NothingToCharge,

    /// The cart was modified between pricing and order creation.
    #[error("cart changed during checkout, please review it and try again")]
    CartChanged,

    #[error("payment authority error: {0}")]
    Authority(#[from] AuthorityError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What to check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutSource {
    /// Everything in the user's cart; the cart is emptied on success.
    Cart,
    /// A single product, bypassing the cart.
    BuyNow {
        product_id: ProductId,
        quantity: Quantity,
    },
}

/// Everything the client needs to open the payment widget.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order: Order,
    pub payment_authority_order_id: String,
    pub payment_authority_key: String,
    /// Amount in minor units (paise).
    pub amount: i64,
    pub currency: &'static str,
}

/// Checkout service.
pub struct CheckoutService<'a> {
    catalog: &'a dyn CatalogStore,
    carts: &'a dyn CartStore,
    orders: &'a dyn OrderStore,
    authority: &'a dyn PaymentAuthority,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        catalog: &'a dyn CatalogStore,
        carts: &'a dyn CartStore,
        orders: &'a dyn OrderStore,
        authority: &'a dyn PaymentAuthority,
    ) -> Self {
        Self {
            catalog,
            carts,
            orders,
            authority,
        }
    }

    /// Create an order and its payment authority order.
    ///
    /// Prices are read from the catalog at this moment; whatever the client
    /// displayed is ignored.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty cart, unknown product, bad
    /// shipping address or a zero total; `CartChanged` if the cart moved underneath us;
    /// `Authority` if the payment authority is unreachable or refuses.
    #[instrument(skip(self, shipping_address), fields(user_id = %user_id))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        source: CheckoutSource,
        shipping_address: &str,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let (items, claim) = match source {
            CheckoutSource::Cart => {
                let (items, claim) = self.cart_items(user_id).await?;
                (items, Some(claim))
            }
            CheckoutSource::BuyNow {
                product_id,
                quantity,
            } => (self.buy_now_item(product_id, quantity).await?, None),
        };

        let receipt = Uuid::new_v4().to_string();
        let draft = OrderDraft::new(user_id, items, shipping_address, receipt)?;
        let amount = draft.totals.total.to_minor_units()?;
        if amount <= 0 {
            return Err(CheckoutError::NothingToCharge);
        }
        let currency = CurrencyCode::default();

        let authority_order = self
            .authority
            .create_order(&AuthorityOrderRequest {
                amount,
                currency,
                receipt: draft.receipt.clone(),
            })
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Payment authority order failed"))?;

        let new_order = draft.with_authority_order(authority_order.id.clone());
        let order = self
            .orders
            .create(new_order, claim.as_ref())
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => CheckoutError::CartChanged,
                other => CheckoutError::Repository(other),
            })?;

        tracing::info!(
            order_id = %order.id,
            authority_order_id = %authority_order.id,
            total = %order.totals.total,
            items = order.items.len(),
            "Order created"
        );

        Ok(CheckoutReceipt {
            order,
            payment_authority_order_id: authority_order.id,
            payment_authority_key: self.authority.key_id().to_string(),
            amount,
            currency: currency.code(),
        })
    }

    async fn cart_items(
        &self,
        user_id: UserId,
    ) -> Result<(Vec<NewOrderItem>, CartClaim), CheckoutError> {
        let cart_id = self.carts.ensure_cart(user_id).await?;
        let lines = self.carts.lines(cart_id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .catalog
            .products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let items = lines
            .iter()
            .map(|line| {
                let product = products
                    .get(&line.product_id)
                    .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
                Ok(snapshot(product, line.quantity))
            })
            .collect::<Result<Vec<_>, CheckoutError>>()?;

        Ok((items, CartClaim { cart_id, lines }))
    }

    async fn buy_now_item(
        &self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<Vec<NewOrderItem>, CheckoutError> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))?;
        Ok(vec![snapshot(&product, quantity)])
    }
}

fn snapshot(product: &Product, quantity: Quantity) -> NewOrderItem {
    NewOrderItem {
        product_id: product.id,
        product_name: product.name.clone(),
        quantity,
        unit_price: product.price,
    }
}
