//! Marigold Core - Order lifecycle domain library.
//!
//! This crate holds the pure part of the storefront's order lifecycle engine:
//! - [`types`] - Newtype IDs, prices, quantities and status enums
//! - [`pricing`] - Subtotal/tax/delivery/total calculation
//! - [`order`] - The `Order` aggregate and its fulfillment state machine
//! - [`refund`] - Refund request validation
//!
//! # Architecture
//!
//! The core crate contains only types and rules - no I/O, no database access,
//! no HTTP clients. The storefront crate loads an `Order`, applies one of the
//! transitions defined here, and persists the result.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod order;
pub mod pricing;
pub mod refund;
pub mod types;

pub use order::{
    Invoice, InvoiceLine, NewOrder, NewOrderItem, Order, OrderDraft, OrderError, OrderItem,
    PaymentOutcome, RefundRecord, StatusChange, Tracking, TrackingUpdate,
    validate_shipping_address,
};
pub use pricing::{DeliveryPolicy, LineAmount, PricingError, TAX_RATE, TAX_RATE_PERCENT, Totals};
pub use refund::{RefundRequest, RefundRequestError};
pub use types::*;
