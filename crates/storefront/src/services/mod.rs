//! Business logic services for the order lifecycle.
//!
//! # Services
//!
//! - [`cart`] - Cart reads and mutations, priced against the live catalog
//! - [`checkout`] - Cart or buy-now item to a persisted order and authority order
//! - [`payment`] - Payment callback verification and failure reports
//! - [`orders`] - Customer order reads, cancellation and refund requests
//! - [`admin`] - Operator status changes, tracking edits and refund resolution
//!
//! Services borrow their collaborators from [`AppState`](crate::state::AppState)
//! for the duration of one request.

pub mod admin;
pub mod cart;
pub mod checkout;
mod error;
pub mod orders;
pub mod payment;

pub use admin::{AdminOrderService, AdminOrderUpdate, BulkStatusResult};
pub use cart::{CartError, CartService, GuestCartLine};
pub use checkout::{CheckoutError, CheckoutReceipt, CheckoutService, CheckoutSource};
pub use error::OrderServiceError;
pub use orders::OrderService;
pub use payment::{PaymentCallback, PaymentVerifier};

use marigold_core::{Order, OrderId};

use crate::db::{OrderStore, RepositoryError};

/// How many times a transition is re-read and re-applied after losing a
/// version race before giving up.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Load an order, apply `apply` to it, and save it under the version check.
///
/// `apply` returns its result and whether it changed the order; unchanged
/// orders are not written. On a stale write the order is re-read and
/// `apply` runs again against the fresh copy.
pub(crate) async fn modify_order<T, F>(
    orders: &dyn OrderStore,
    id: OrderId,
    mut apply: F,
) -> Result<(Order, T), OrderServiceError>
where
    F: FnMut(&mut Order) -> Result<(T, bool), OrderServiceError> + Send,
    T: Send,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut order = orders
            .get(id)
            .await?
            .ok_or(OrderServiceError::NotFound(id))?;

        let (value, changed) = apply(&mut order)?;
        if !changed {
            return Ok((order, value));
        }

        match orders.save(&order).await {
            Ok(version) => {
                order.version = version;
                return Ok((order, value));
            }
            Err(RepositoryError::StaleWrite(_)) => {
                tracing::debug!(order_id = %id, attempt, "Stale order write, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::warn!(order_id = %id, "Gave up on order write after repeated version conflicts");
    Err(OrderServiceError::Contention(id))
}
