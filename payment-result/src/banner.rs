//! The transient result banner.

use crate::event::{PaymentResultEvent, PaymentStatus};
use std::fmt;

/// Banner tone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    /// Payment went through
    Success,
    /// Payment failed or was abandoned
    Error,
}

impl BannerKind {
    /// Leading icon
    #[must_use]
    pub const fn icon(self) -> char {
        match self {
            Self::Success => '✔',
            Self::Error => '✖',
        }
    }
}

/// What the banner shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Tone
    pub kind: BannerKind,
    /// Text
    pub message: String,
}

impl Banner {
    /// Banner announcing `event`
    #[must_use]
    pub fn for_event(event: &PaymentResultEvent) -> Self {
        let order = event.order_ref.as_deref().map(str::trim).filter(|r| !r.is_empty());
        match (event.status, order) {
            (PaymentStatus::Success, Some(order)) => Self {
                kind: BannerKind::Success,
                message: format!("Payment successful for order {order}."),
            },
            (PaymentStatus::Success, None) => Self {
                kind: BannerKind::Success,
                message: "Payment successful.".to_string(),
            },
            (PaymentStatus::Failure, Some(order)) => Self {
                kind: BannerKind::Error,
                message: format!("Payment for order {order} was not completed."),
            },
            (PaymentStatus::Failure, None) => Self {
                kind: BannerKind::Error,
                message: "Payment was not completed.".to_string(),
            },
        }
    }
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.icon(), self.message)
    }
}
