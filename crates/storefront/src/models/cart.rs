//! Cart types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use marigold_core::{CartId, Price, ProductId, Quantity, Totals};

/// A stored cart line: product and quantity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// A cart line priced against the current catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    pub quantity: Quantity,
    pub in_stock: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub line_total: Decimal,
}

/// The cart as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart_id: CartId,
    pub items: Vec<PricedCartLine>,
    #[serde(flatten)]
    pub totals: Totals,
}

/// The cart contents a checkout was priced from.
///
/// The order store re-reads the cart under a row lock and refuses to create
/// the order unless the lines still match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartClaim {
    pub cart_id: CartId,
    pub lines: Vec<CartLine>,
}

impl CartClaim {
    /// Whether `current` holds exactly the claimed lines, in any order.
    #[must_use]
    pub fn matches(&self, current: &[CartLine]) -> bool {
        let mut expected = self.lines.clone();
        let mut actual = current.to_vec();
        expected.sort_by_key(|l| l.product_id);
        actual.sort_by_key(|l| l.product_id);
        expected == actual
    }
}

/// Outcome of merging a guest cart into the user's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub merged: Vec<ProductId>,
    pub skipped: Vec<ProductId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(product: i32, quantity: i64) -> CartLine {
        CartLine {
            product_id: ProductId::new(product),
            quantity: Quantity::new(quantity).unwrap(),
        }
    }

    #[test]
    fn test_claim_matches_ignores_order() {
        let claim = CartClaim {
            cart_id: CartId::new(1),
            lines: vec![line(1, 2), line(2, 1)],
        };
        assert!(claim.matches(&[line(2, 1), line(1, 2)]));
    }

    #[test]
    fn test_claim_detects_changes() {
        let claim = CartClaim {
            cart_id: CartId::new(1),
            lines: vec![line(1, 2), line(2, 1)],
        };
        assert!(!claim.matches(&[line(1, 3), line(2, 1)]));
        assert!(!claim.matches(&[line(1, 2)]));
        assert!(!claim.matches(&[line(1, 2), line(2, 1), line(3, 1)]));
        assert!(!claim.matches(&[]));
    }
}
