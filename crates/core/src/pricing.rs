//! Order pricing.
//!
//! A pure function from line amounts to `{subtotal, tax, delivery, total}`.
//! Tax is a flat rate on the subtotal, rounded half-up to two places; the
//! total is the exact sum of the three components and is never recomputed
//! once an order has been written.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::{Price, PriceError, Quantity};

/// Flat GST rate applied to the subtotal (5%).
pub const TAX_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Tax rate as a whole percentage, for display.
pub const TAX_RATE_PERCENT: u32 = 5;

/// Errors that can occur while pricing an order.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// No lines were supplied.
    #[error("cannot price an empty order")]
    Empty,
    /// A unit price was negative.
    #[error("unit price cannot be negative (got {0})")]
    NegativePrice(Decimal),
    /// A quantity was zero or negative.
    #[error("quantity must be positive (got {0})")]
    NonPositiveQuantity(i64),
    /// Intermediate arithmetic overflowed.
    #[error("order amount overflow")]
    Overflow,
    /// A computed amount is not a valid price.
    #[error(transparent)]
    Price(#[from] PriceError),
}

/// One priced line: a unit price and how many units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    /// Unit price at pricing time.
    pub unit_price: Decimal,
    /// Number of units.
    pub quantity: i64,
}

impl LineAmount {
    /// Build a line from already-validated domain values.
    #[must_use]
    pub fn new(unit_price: Price, quantity: Quantity) -> Self {
        Self {
            unit_price: unit_price.amount(),
            quantity: i64::from(quantity.get()),
        }
    }
}

/// How delivery is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Delivery is always free.
    #[default]
    Free,
    /// A flat charge per order.
    Flat(Price),
}

impl DeliveryPolicy {
    fn charge(self) -> Price {
        match self {
            Self::Free => Price::ZERO,
            Self::Flat(price) => price,
        }
    }
}

/// The computed amounts of an order.
///
/// Invariant: `total == subtotal + tax + delivery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Price,
    pub tax: Price,
    pub delivery: Price,
    pub total: Price,
}

impl Totals {
    /// Price a sequence of lines with the storefront's flat tax rate.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty line list, a negative price, a
    /// non-positive quantity, or arithmetic overflow.
    pub fn calculate(lines: &[LineAmount], delivery: DeliveryPolicy) -> Result<Self, PricingError> {
        Self::calculate_with_rate(lines, TAX_RATE, delivery)
    }

    /// Price a sequence of lines with an explicit tax rate.
    ///
    /// # Errors
    ///
    /// See [`Totals::calculate`].
    pub fn calculate_with_rate(
        lines: &[LineAmount],
        rate: Decimal,
        delivery: DeliveryPolicy,
    ) -> Result<Self, PricingError> {
        if lines.is_empty() {
            return Err(PricingError::Empty);
        }

        let mut subtotal = Decimal::ZERO;
        for line in lines {
            if line.unit_price.is_sign_negative() && !line.unit_price.is_zero() {
                return Err(PricingError::NegativePrice(line.unit_price));
            }
            if line.quantity <= 0 {
                return Err(PricingError::NonPositiveQuantity(line.quantity));
            }
            let line_total = line
                .unit_price
                .checked_mul(Decimal::from(line.quantity))
                .ok_or(PricingError::Overflow)?;
            subtotal = subtotal
                .checked_add(line_total)
                .ok_or(PricingError::Overflow)?;
        }

        let tax = subtotal
            .checked_mul(rate)
            .ok_or(PricingError::Overflow)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let delivery = delivery.charge();
        let total = subtotal
            .checked_add(tax)
            .and_then(|sum| sum.checked_add(delivery.amount()))
            .ok_or(PricingError::Overflow)?;

        Ok(Self {
            subtotal: Price::new(subtotal)?,
            tax: Price::new(tax)?,
            delivery,
            total: Price::new(total)?,
        })
    }

    /// Whether the stored components still add up.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.subtotal.amount() + self.tax.amount() + self.delivery.amount() == self.total.amount()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(price: &str, quantity: i64) -> LineAmount {
        LineAmount {
            unit_price: price.parse().unwrap(),
            quantity,
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_cart_example() {
        let totals =
            Totals::calculate(&[line("100", 2), line("50", 1)], DeliveryPolicy::Free).unwrap();
        assert_eq!(totals.subtotal.amount(), dec("250"));
        assert_eq!(totals.tax.amount(), dec("12.5"));
        assert_eq!(totals.delivery, Price::ZERO);
        assert_eq!(totals.total.amount(), dec("262.5"));
        assert!(totals.is_consistent());
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // 0.05 * 10.10 = 0.505 -> 0.51
        let totals = Totals::calculate(&[line("10.10", 1)], DeliveryPolicy::Free).unwrap();
        assert_eq!(totals.tax.amount(), dec("0.51"));
        assert_eq!(totals.total.amount(), dec("10.61"));

        // 0.05 * 10.30 = 0.515 -> 0.52
        let totals = Totals::calculate(&[line("10.30", 1)], DeliveryPolicy::Free).unwrap();
        assert_eq!(totals.tax.amount(), dec("0.52"));

        // 0.05 * 10.20 = 0.51 exactly
        let totals = Totals::calculate(&[line("10.20", 1)], DeliveryPolicy::Free).unwrap();
        assert_eq!(totals.tax.amount(), dec("0.51"));
    }

    #[test]
    fn test_tax_rounds_down_below_midpoint() {
        // 0.05 * 0.89 = 0.0445 -> 0.04
        let totals = Totals::calculate(&[line("0.89", 1)], DeliveryPolicy::Free).unwrap();
        assert_eq!(totals.tax.amount(), dec("0.04"));
    }

    #[test]
    fn test_flat_delivery_is_added() {
        let delivery = DeliveryPolicy::Flat(Price::new(dec("40")).unwrap());
        let totals = Totals::calculate(&[line("100", 1)], delivery).unwrap();
        assert_eq!(totals.total.amount(), dec("145"));
        assert!(totals.is_consistent());
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            Totals::calculate(&[], DeliveryPolicy::Free),
            Err(PricingError::Empty)
        );
    }

    #[test]
    fn test_rejects_negative_price() {
        assert!(matches!(
            Totals::calculate(&[line("-1", 1)], DeliveryPolicy::Free),
            Err(PricingError::NegativePrice(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        assert_eq!(
            Totals::calculate(&[line("5", 0)], DeliveryPolicy::Free),
            Err(PricingError::NonPositiveQuantity(0))
        );
        assert_eq!(
            Totals::calculate(&[line("5", -2)], DeliveryPolicy::Free),
            Err(PricingError::NonPositiveQuantity(-2))
        );
    }

    #[test]
    fn test_zero_priced_line_is_allowed() {
        let totals = Totals::calculate(&[line("0", 3)], DeliveryPolicy::Free).unwrap();
        assert_eq!(totals.total, Price::ZERO);
    }

    #[test]
    fn test_tax_rate_constant() {
        assert_eq!(TAX_RATE, dec("0.05"));
        assert_eq!(TAX_RATE * Decimal::ONE_HUNDRED, Decimal::from(TAX_RATE_PERCENT));
    }
}
