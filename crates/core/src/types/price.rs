//! Type-safe price representation using decimal arithmetic.
//!
//! All amounts in the storefront are in a single currency and carry exactly
//! two fractional digits. A [`Price`] is always non-negative and normalized
//! to scale 2, so it serializes as `"262.50"` rather than `"262.5"`.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Number of fractional digits carried by every amount.
pub const PRICE_SCALE: u32 = 2;

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative (got {0})")]
    Negative(Decimal),
    /// The amount has more than two fractional digits.
    #[error("price must have at most {PRICE_SCALE} decimal places (got {0})")]
    TooPrecise(Decimal),
    /// The amount does not fit the target integer type.
    #[error("price {0} is out of range")]
    OutOfRange(Decimal),
}

/// A non-negative monetary amount with two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or has more than two
    /// significant fractional digits (`12.500` is accepted, `12.505` is not).
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }

        let normalized = amount.normalize();
        if normalized.scale() > PRICE_SCALE {
            return Err(PriceError::TooPrecise(amount));
        }

        let mut value = normalized;
        value.rescale(PRICE_SCALE);
        Ok(Self(value))
    }

    /// Create a price from minor currency units (paise).
    ///
    /// # Errors
    ///
    /// Returns an error if `minor` is negative.
    pub fn from_minor_units(minor: i64) -> Result<Self, PriceError> {
        Self::new(Decimal::new(minor, PRICE_SCALE))
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Convert to minor currency units (paise), as payment authorities expect.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::OutOfRange` if the amount does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, PriceError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or(PriceError::OutOfRange(self.0))
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency codes accepted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    /// Indian rupee; the only currency the store sells in.
    #[default]
    INR,
}

impl CurrencyCode {
    /// The three-letter ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::INR => "INR",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_price_normalizes_to_two_places() {
        let price = Price::new(Decimal::new(2625, 1)).unwrap();
        assert_eq!(price.to_string(), "262.50");
        assert_eq!(price.amount().scale(), 2);
    }

    #[test]
    fn test_price_accepts_trailing_zeros() {
        assert!(Price::new(Decimal::new(12_500, 3)).is_ok());
    }

    #[test]
    fn test_price_rejects_negative() {
        assert!(matches!(
            Price::new(Decimal::new(-1, 0)),
            Err(PriceError::Negative(_))
        ));
    }

    #[test]
    fn test_price_rejects_sub_paisa_precision() {
        assert!(matches!(
            Price::new(Decimal::new(12_505, 3)),
            Err(PriceError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_minor_units_round_trip() {
        let price = Price::from_minor_units(26_250).unwrap();
        assert_eq!(price.amount(), Decimal::new(26_250, 2));
        assert_eq!(price.to_minor_units().unwrap(), 26_250);
    }

    #[test]
    fn test_price_serializes_as_string() {
        let price = Price::new(Decimal::new(125, 1)).unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"12.50\"");

        let parsed: Result<Price, _> = serde_json::from_str("\"-3.00\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_currency_code() {
        assert_eq!(CurrencyCode::default().code(), "INR");
    }
}
