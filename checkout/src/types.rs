//! State and actions of the checkout surface.

use crate::error::CheckoutError;
use crate::selection::SelectionSet;
use cinepay_api::{Order, PaymentLink, PaymentSession, Promotion, PromotionDecision, ResourceId, SeatLayout};
use cinepay_core::CancellationToken;

/// What the checkout surface was opened for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreeningRef {
    /// Screening being booked
    pub screening_id: Option<ResourceId>,
    /// Room, used when the screening has no seat map of its own
    pub room_id: Option<ResourceId>,
    /// Price of a seat without an explicit price
    pub base_price: Option<u64>,
}

/// The two observable steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Step {
    /// Choosing seats and a promotion
    #[default]
    Seats,
    /// Order and payment session exist; showing the link
    Payment,
}

/// Seat map loading
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LayoutStatus {
    /// Surface closed
    #[default]
    Idle,
    /// Fetch in flight
    Loading,
    /// Layout ready
    Ready(SeatLayout),
    /// No seat map; shown as an empty state
    Unavailable(String),
}

impl LayoutStatus {
    /// The layout, once loaded
    #[must_use]
    pub const fn layout(&self) -> Option<&SeatLayout> {
        match self {
            Self::Ready(layout) => Some(layout),
            _ => None,
        }
    }
}

/// Promotion input and its latest verdict
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionState {
    /// Code as typed
    pub code: String,
    /// Verdict for the current code, seats and subtotal
    pub decision: Option<PromotionDecision>,
    /// Rejection or failure message
    pub error: Option<String>,
    /// Validation in flight
    pub loading: bool,
    /// Promotions on offer
    pub active: Vec<Promotion>,
    /// Sequence of the latest validation request
    pub request_seq: u64,
}

impl PromotionState {
    /// Drop the verdict; the next validation result must match a new request
    pub fn invalidate(&mut self) {
        self.decision = None;
        self.error = None;
        self.loading = false;
        self.request_seq += 1;
    }

    /// The verdict, when it grants a discount
    #[must_use]
    pub fn valid_decision(&self) -> Option<&PromotionDecision> {
        self.decision.as_ref().filter(|d| d.is_valid)
    }
}

/// The three figures shown to the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Before discount
    pub subtotal: u64,
    /// Discount, never above the subtotal
    pub discount: u64,
    /// Amount to pay
    pub total: u64,
}

impl Totals {
    /// Totals with the discount clamped to `[0, subtotal]`
    #[must_use]
    pub fn clamped(subtotal: u64, discount: u64) -> Self {
        let discount = discount.min(subtotal);
        Self {
            subtotal,
            discount,
            total: subtotal - discount,
        }
    }
}

/// Checkout surface state
#[derive(Debug, Clone, Default)]
pub struct CheckoutState {
    /// What the surface was opened for; `None` while closed
    pub screening: Option<ScreeningRef>,
    /// Current step
    pub step: Step,
    /// Seat map
    pub layout: LayoutStatus,
    /// Picked seats
    pub selection: SelectionSet,
    /// Promotion input
    pub promotion: PromotionState,
    /// Payment provider
    pub provider: String,
    /// Order/session/URL chain in flight
    pub submitting: bool,
    /// Payment URL refresh in flight
    pub url_loading: bool,
    /// Totals sent with the order of the current attempt
    pub submitted: Option<Totals>,
    /// Created order
    pub order: Option<Order>,
    /// Created payment session
    pub session: Option<PaymentSession>,
    /// Resolved payment link
    pub link: Option<PaymentLink>,
    /// Last failure shown to the user
    pub error: Option<String>,
    /// Informational message
    pub notice: Option<String>,
    /// Bumped on open and close; loads tagged with an older value are stale
    pub generation: u64,
    /// Bumped per checkout attempt and on back; chain results tagged with an older value are stale
    pub attempt: u64,
    /// Cancelled when the surface closes
    pub surface: CancellationToken,
}

impl CheckoutState {
    /// Fresh state with `provider` preselected
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Base price of the open screening
    #[must_use]
    pub fn base_price(&self) -> Option<u64> {
        self.screening.as_ref().and_then(|s| s.base_price)
    }

    /// Subtotal of the selection
    #[must_use]
    pub fn subtotal(&self) -> u64 {
        self.layout
            .layout()
            .map_or(0, |layout| self.selection.subtotal(layout, self.base_price()))
    }

    /// Totals from the selection and the promotion verdict
    #[must_use]
    pub fn client_totals(&self) -> Totals {
        let subtotal = self.subtotal();
        let discount = self
            .promotion
            .valid_decision()
            .map_or(0, |decision| decision.applied_discount(subtotal));
        Totals::clamped(subtotal, discount)
    }

    /// Totals to display
    ///
    /// Once an order is submitted its figures replace the client-computed
    /// ones, and each amount the server reported replaces those in turn.
    #[must_use]
    pub fn totals(&self) -> Totals {
        let client = self.submitted.unwrap_or_else(|| self.client_totals());
        let Some(order) = &self.order else {
            return client;
        };

        let subtotal = order.amounts.subtotal.unwrap_or(client.subtotal);
        let discount = order.amounts.discount.unwrap_or(client.discount).min(subtotal);
        let total = order
            .amounts
            .total
            .or(order.payable)
            .unwrap_or(subtotal - discount);

        Totals {
            subtotal,
            discount,
            total,
        }
    }

    /// Amount to charge for the payment session
    #[must_use]
    pub fn payable(&self) -> u64 {
        self.order
            .as_ref()
            .and_then(|order| order.payable)
            .unwrap_or_else(|| self.totals().total)
    }

    /// Selection summary: sorted labels joined by commas
    #[must_use]
    pub fn selection_summary(&self) -> String {
        self.layout
            .layout()
            .map(|layout| self.selection.labels(layout).join(", "))
            .unwrap_or_default()
    }

    /// QR image for the payment link
    #[must_use]
    pub fn qr_image_url(&self) -> Option<String> {
        self.link.as_ref().map(PaymentLink::qr_image_url)
    }

    /// Whether seat and promotion controls accept input
    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.step == Step::Seats && !self.submitting && self.screening.is_some()
    }
}

/// Everything that can happen to the checkout surface
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutAction {
    /// Open the surface for a screening
    Open {
        /// Screening, room and base price
        screening: ScreeningRef,
    },
    /// Seat map fetch finished
    LayoutLoaded {
        /// Generation the fetch was started in
        generation: u64,
        /// Layout or why there is none
        result: Result<SeatLayout, CheckoutError>,
    },
    /// Active promotion list arrived
    PromotionsLoaded {
        /// Generation the fetch was started in
        generation: u64,
        /// Promotions on offer
        promotions: Vec<Promotion>,
    },
    /// Dismiss the surface
    Close,

    /// Toggle a seat by selection key
    ToggleSeat {
        /// [`cinepay_api::Seat::key`] of the seat
        key: String,
    },

    /// Promotion code text changed
    SetPromotionCode {
        /// New text
        code: String,
    },
    /// Pick one of the active promotions
    SelectPromotion {
        /// Its code
        code: String,
    },
    /// Validate the current code against the current subtotal
    ApplyPromotion,
    /// Validation finished
    PromotionValidated {
        /// Request sequence it answers
        seq: u64,
        /// Verdict or failure
        result: Result<PromotionDecision, CheckoutError>,
    },

    /// Choose the payment provider
    SetProvider {
        /// Provider name
        provider: String,
    },

    /// Start the order, session, URL chain
    Checkout,
    /// Order creation finished
    OrderSubmitted {
        /// Attempt it belongs to
        attempt: u64,
        /// Created order or failure
        result: Result<Order, CheckoutError>,
    },
    /// Payment session creation finished
    SessionCreated {
        /// Attempt it belongs to
        attempt: u64,
        /// Session or failure
        result: Result<PaymentSession, CheckoutError>,
    },
    /// Payment URL resolution finished
    PaymentUrlResolved {
        /// Attempt it belongs to
        attempt: u64,
        /// Link or failure
        result: Result<PaymentLink, CheckoutError>,
    },

    /// Leave the payment step
    Back,
    /// Resolve the payment URL again for the same session
    RefreshPaymentUrl,
    /// URL refresh finished
    PaymentUrlRefreshed {
        /// Attempt it belongs to
        attempt: u64,
        /// Link or failure
        result: Result<PaymentLink, CheckoutError>,
    },

    /// Clear the notice and error lines
    DismissMessages,
}
