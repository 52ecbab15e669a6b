//! Line-item quantity.

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Zero or negative quantity.
    #[error("quantity must be at least 1 (got {0})")]
    TooSmall(i64),
    /// Quantity exceeds the per-line maximum.
    #[error("quantity must be at most {max} (got {got})")]
    TooLarge {
        /// The rejected value.
        got: i64,
        /// Maximum allowed per line.
        max: i32,
    },
}

/// A quantity of one product on a cart or order line.
///
/// ## Constraints
///
/// - At least 1 (an empty line is removed, never stored with quantity 0)
/// - At most [`Quantity::MAX`] per line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct Quantity(i32);

impl Quantity {
    /// Maximum quantity of a single product per line.
    pub const MAX: i32 = 999;

    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Create a validated quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is below 1 or above [`Quantity::MAX`].
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value < 1 {
            return Err(QuantityError::TooSmall(value));
        }
        i32::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or(QuantityError::TooLarge {
                got: value,
                max: Self::MAX,
            })
    }

    /// The quantity as an `i32` (the database column type).
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Add two quantities, failing if the sum exceeds [`Quantity::MAX`].
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::TooLarge` on overflow of the per-line limit.
    pub fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        Self::new(i64::from(self.0) + i64::from(other.0))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
