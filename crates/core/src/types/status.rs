//! Status enums for orders, payments and refunds.
//!
//! Every enum serializes as `snake_case` (the wire format and the
//! PostgreSQL enum labels are identical).

use serde::{Deserialize, Serialize};

/// Implements `Display` and `FromStr` over the snake_case labels.
macro_rules! impl_labels {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The snake_case label used on the wire and in the database.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

/// Order fulfillment status.
///
/// Declaration order is the forward progression; `Cancelled` sits outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl_labels!(OrderStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    OutForDelivery => "out_for_delivery",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Position in the forward progression, `None` for `Cancelled`.
    #[must_use]
    pub const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::OutForDelivery => Some(4),
            Self::Delivered => Some(5),
            Self::Cancelled => None,
        }
    }

    /// Whether the order may still be cancelled from this status.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Processing)
    }

    /// Whether no further status transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

/// Payment status, driven by the payment authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl_labels!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
});

/// Refund status, tracked independently of fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.refund_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    None,
    Requested,
    Approved,
    Rejected,
    Refunded,
}

impl_labels!(RefundStatus {
    None => "none",
    Requested => "requested",
    Approved => "approved",
    Rejected => "rejected",
    Refunded => "refunded",
});

impl RefundStatus {
    /// Whether an operator may move a refund from `self` to `next`.
    ///
    /// `requested -> approved | rejected`, `approved -> refunded`.
    #[must_use]
    pub const fn can_resolve_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Approved | Self::Rejected) | (Self::Approved, Self::Refunded)
        )
    }
}

/// Reason given by a customer when requesting a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.refund_reason", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    Defective,
    WrongItem,
    DamagedInTransit,
    QualityIssue,
    ChangedMind,
    /// Requires a free-text explanation.
    Other,
}

impl_labels!(RefundReason {
    Defective => "defective",
    WrongItem => "wrong_item",
    DamagedInTransit => "damaged_in_transit",
    QualityIssue => "quality_issue",
    ChangedMind => "changed_mind",
    Other => "other",
});
