//! Data models for the storefront.

pub mod cart;
pub mod product;
pub mod session;

pub use cart::{CartClaim, CartLine, CartView, MergeReport, PricedCartLine};
pub use product::Product;
pub use session::CurrentUser;
