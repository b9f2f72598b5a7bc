//! Checkout reducer.
//!
//! Drives the surface from seat selection to a payable link:
//!
//! 1. `Open` loads the seat map and the active promotions
//! 2. `ToggleSeat` / `ApplyPromotion` edit the selection and its discount
//! 3. `Checkout` runs order creation, then session creation, then URL
//!    resolution, each step feeding the next through an action
//! 4. `Back` and `RefreshPaymentUrl` act on the payment step
//!
//! Results of async work carry the generation or attempt they were started
//! in; anything older than the current state is dropped.

use crate::environment::CheckoutEnvironment;
use crate::error::CheckoutError;
use crate::types::{CheckoutAction, CheckoutState, LayoutStatus, PromotionState, ScreeningRef, Step, Totals};
use cinepay_api::{ApiError, OrderRequest, PaymentSession, ResourceId, SessionRequest, TicketLine};
use cinepay_core::effect::{Effect, EffectId};
use cinepay_core::reducer::Reducer;
use cinepay_core::{CancellationToken, SmallVec, smallvec};

/// Seat map fetch
pub const SEAT_LAYOUT: EffectId = EffectId::new("checkout.seat-layout");
/// Active promotion list fetch
pub const PROMOTIONS: EffectId = EffectId::new("checkout.promotions");
/// Promotion code validation
pub const PROMOTION_CHECK: EffectId = EffectId::new("checkout.promotion-check");
/// Order, session and URL chain
pub const SUBMIT: EffectId = EffectId::new("checkout.submit");
/// Payment URL refresh
pub const PAYMENT_URL: EffectId = EffectId::new("checkout.payment-url");

const ALL_EFFECTS: [EffectId; 5] = [SEAT_LAYOUT, PROMOTIONS, PROMOTION_CHECK, SUBMIT, PAYMENT_URL];

const NO_SEAT_MAP: &str = "No seat map is available for this screening.";
const NO_SCREENING: &str = "Missing screening information.";
const LAYOUT_NOT_READY: &str = "The seat map is not loaded yet.";
const NO_SEATS: &str = "Please select at least one seat.";
const PROMOTION_PENDING: &str = "Wait for the promotion code check to finish.";
const NO_CODE: &str = "Enter a promotion code.";
const NO_AMOUNT: &str = "Select seats before applying a promotion code.";
const ORDER_FAILED: &str = "Could not create the order.";
const SESSION_FAILED: &str = "Could not create the payment session.";
const URL_FAILED: &str = "Could not get the payment link.";
const PROMOTION_FAILED: &str = "Could not validate the promotion code.";
const PROMOTION_REJECTED: &str = "This promotion code cannot be applied.";
const LINK_READY: &str = "Payment link ready. Scan the QR code or open the link to pay.";
const LINK_REFRESHED: &str = "Payment link refreshed.";

type Effects = SmallVec<[Effect<CheckoutAction>; 4]>;

/// Reducer for the checkout surface
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new checkout reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn none() -> Effects {
        smallvec![Effect::None]
    }

    fn cancel(ids: &[EffectId]) -> Effect<CheckoutAction> {
        Effect::Parallel(ids.iter().map(|&id| Effect::Cancel { id }).collect())
    }

    /// Start over for `screening`, keeping the provider and the staleness counters
    fn reset(state: &mut CheckoutState, env: &CheckoutEnvironment, screening: Option<ScreeningRef>) {
        state.surface.cancel();

        let provider = if state.provider.trim().is_empty() {
            env.config.payment_provider.clone()
        } else {
            std::mem::take(&mut state.provider)
        };
        let mut promotion = PromotionState {
            request_seq: state.promotion.request_seq,
            ..PromotionState::default()
        };
        promotion.invalidate();

        *state = CheckoutState {
            screening,
            provider,
            promotion,
            generation: state.generation + 1,
            attempt: state.attempt + 1,
            ..CheckoutState::default()
        };
    }

    fn open(state: &mut CheckoutState, env: &CheckoutEnvironment, screening: ScreeningRef) -> Effects {
        Self::reset(state, env, Some(screening.clone()));
        let generation = state.generation;

        let layout = if screening.screening_id.is_none() && screening.room_id.is_none() {
            state.layout = LayoutStatus::Unavailable(NO_SEAT_MAP.to_string());
            Effect::Cancel { id: SEAT_LAYOUT }
        } else {
            state.layout = LayoutStatus::Loading;
            load_layout(env, &screening, generation, state.surface.clone()).cancellable(SEAT_LAYOUT)
        };

        tracing::debug!(generation, "Checkout opened");
        smallvec![
            Self::cancel(&[PROMOTION_CHECK, SUBMIT, PAYMENT_URL]),
            layout,
            load_promotions(env, generation, state.surface.clone()).cancellable(PROMOTIONS),
        ]
    }

    fn set_code(state: &mut CheckoutState, code: String) -> Effects {
        if !state.is_editable() || state.promotion.code == code {
            return Self::none();
        }
        state.promotion.code = code;
        state.promotion.invalidate();
        smallvec![Effect::Cancel { id: PROMOTION_CHECK }]
    }

    fn apply_promotion(state: &mut CheckoutState, env: &CheckoutEnvironment) -> Effects {
        if !state.is_editable() || state.promotion.loading {
            return Self::none();
        }

        let code = state.promotion.code.trim().to_string();
        if code.is_empty() {
            state.promotion.error = Some(NO_CODE.to_string());
            return Self::none();
        }
        let subtotal = state.subtotal();
        if subtotal == 0 {
            state.promotion.error = Some(NO_AMOUNT.to_string());
            return Self::none();
        }

        state.promotion.invalidate();
        state.promotion.loading = true;
        let seq = state.promotion.request_seq;

        let promotions = env.api.promotions.clone();
        let user_id = env.user_id.clone();
        let cancel = state.surface.clone();
        smallvec![
            Effect::future(async move {
                let result = promotions.apply(&code, subtotal, user_id.as_ref(), &cancel).await;
                settle(result, PROMOTION_FAILED).map(|result| CheckoutAction::PromotionValidated { seq, result })
            })
            .cancellable(PROMOTION_CHECK)
        ]
    }

    fn order_request(state: &CheckoutState, screening_id: ResourceId) -> Option<OrderRequest> {
        let layout = state.layout.layout()?;
        let seats = state.selection.seats(layout);
        let base_price = state.base_price();
        let totals = state.client_totals();
        let decision = state.promotion.valid_decision();

        Some(OrderRequest {
            screening_id,
            seat_ids: seats
                .iter()
                .filter_map(|seat| seat.id.clone().or_else(|| ResourceId::parse(&seat.label)))
                .collect(),
            seat_codes: seats.iter().map(|seat| seat.label.clone()).collect(),
            tickets: seats
                .iter()
                .map(|seat| TicketLine {
                    seat_id: seat.id.clone(),
                    label: seat.label.clone(),
                    tier: seat.tier.clone(),
                    price: seat.price_or(base_price),
                })
                .collect(),
            promotion_code: decision.map(|_| state.promotion.code.trim().to_string()),
            promotion_id: decision.and_then(|d| d.promotion_id.clone()),
            subtotal: totals.subtotal,
            discount: totals.discount,
            total: totals.total,
            provider: state.provider.clone(),
        })
    }

    fn checkout(state: &mut CheckoutState, env: &CheckoutEnvironment) -> Effects {
        if state.step != Step::Seats || state.submitting {
            return Self::none();
        }

        let Some(screening_id) = state.screening.as_ref().and_then(|s| s.screening_id.clone()) else {
            state.error = Some(NO_SCREENING.to_string());
            return Self::none();
        };
        if state.selection.is_empty() {
            state.error = Some(NO_SEATS.to_string());
            return Self::none();
        }
        if state.promotion.loading {
            state.error = Some(PROMOTION_PENDING.to_string());
            return Self::none();
        }
        let Some(request) = Self::order_request(state, screening_id) else {
            state.error = Some(LAYOUT_NOT_READY.to_string());
            return Self::none();
        };

        state.submitting = true;
        state.submitted = Some(Totals {
            subtotal: request.subtotal,
            discount: request.discount,
            total: request.total,
        });
        state.attempt += 1;
        state.error = None;
        state.notice = None;
        state.order = None;
        state.session = None;
        state.link = None;

        tracing::info!(
            attempt = state.attempt,
            seats = request.seat_codes.len(),
            total = request.total,
            "Submitting order"
        );

        let orders = env.api.orders.clone();
        let cancel = state.surface.clone();
        let attempt = state.attempt;
        smallvec![
            Effect::future(async move {
                let result = orders.submit(&request, &cancel).await;
                settle(result, ORDER_FAILED).map(|result| CheckoutAction::OrderSubmitted { attempt, result })
            })
            .cancellable(SUBMIT)
        ]
    }

    /// Whether a chain result still belongs to the in-flight attempt
    fn is_current(state: &CheckoutState, attempt: u64) -> bool {
        let current = attempt == state.attempt && state.submitting;
        if !current {
            tracing::debug!(attempt, current = state.attempt, "Dropping stale checkout result");
        }
        current
    }

    fn return_url(state: &CheckoutState, env: &CheckoutEnvironment) -> Option<String> {
        state
            .order
            .as_ref()
            .map(|order| env.config.return_url(&order.reference))
    }

    /// Abandon the attempt: back to seats, no order or session kept, selection intact
    fn fail(state: &mut CheckoutState, error: &CheckoutError) -> Effects {
        tracing::warn!(attempt = state.attempt, %error, "Checkout attempt failed");
        state.submitting = false;
        state.submitted = None;
        state.step = Step::Seats;
        state.order = None;
        state.session = None;
        state.link = None;
        state.error = Some(error.to_string());
        Self::none()
    }

    fn create_session(state: &CheckoutState, env: &CheckoutEnvironment, order_id: ResourceId) -> Effects {
        let request = SessionRequest {
            order_id,
            provider: state.provider.clone(),
            return_url: Self::return_url(state, env),
            amount: state.payable(),
        };

        let payments = env.api.payments.clone();
        let cancel = state.surface.clone();
        let attempt = state.attempt;
        smallvec![
            Effect::future(async move {
                let result = payments.create_session(&request, &cancel).await;
                settle(result, SESSION_FAILED).map(|result| CheckoutAction::SessionCreated { attempt, result })
            })
            .cancellable(SUBMIT)
        ]
    }

    fn resolve_url(
        state: &CheckoutState,
        env: &CheckoutEnvironment,
        session: PaymentSession,
        refresh: bool,
    ) -> Effect<CheckoutAction> {
        let return_url = Self::return_url(state, env);
        let payments = env.api.payments.clone();
        let cancel = state.surface.clone();
        let attempt = state.attempt;

        Effect::future(async move {
            let result = payments.refresh(&session, return_url.as_deref(), &cancel).await;
            settle(result, URL_FAILED).map(|result| {
                if refresh {
                    CheckoutAction::PaymentUrlRefreshed { attempt, result }
                } else {
                    CheckoutAction::PaymentUrlResolved { attempt, result }
                }
            })
        })
    }
}

/// Drop cancelled results, convert the rest for display
fn settle<T>(result: Result<T, ApiError>, fallback: &str) -> Option<Result<T, CheckoutError>> {
    match result {
        Err(ApiError::Cancelled) => None,
        other => Some(other.map_err(|error| CheckoutError::from_api(&error, fallback))),
    }
}

fn load_layout(
    env: &CheckoutEnvironment,
    screening: &ScreeningRef,
    generation: u64,
    cancel: CancellationToken,
) -> Effect<CheckoutAction> {
    let seats = env.api.seats.clone();
    let screening_id = screening.screening_id.clone();
    let room_id = screening.room_id.clone();

    Effect::future(async move {
        let result = match &screening_id {
            Some(id) => seats.fetch(id, &cancel).await,
            None => Err(ApiError::NotFound(NO_SEAT_MAP.to_string())),
        };
        let result = match (result, &room_id) {
            (Err(ApiError::NotFound(_)), Some(room_id)) => seats.fetch_room(room_id, &cancel).await,
            (result, _) => result,
        };
        settle(result, NO_SEAT_MAP).map(|result| CheckoutAction::LayoutLoaded { generation, result })
    })
}

fn load_promotions(env: &CheckoutEnvironment, generation: u64, cancel: CancellationToken) -> Effect<CheckoutAction> {
    let promotions = env.api.promotions.clone();

    Effect::future(async move {
        match promotions.active(&cancel).await {
            Ok(promotions) => Some(CheckoutAction::PromotionsLoaded { generation, promotions }),
            Err(ApiError::Cancelled) => None,
            Err(error) => {
                tracing::debug!(%error, "Active promotions unavailable");
                None
            },
        }
    })
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    #[allow(clippy::too_many_lines)] // one arm per action
    fn reduce(&self, state: &mut CheckoutState, action: CheckoutAction, env: &CheckoutEnvironment) -> Effects {
        match action {
            CheckoutAction::Open { screening } => Self::open(state, env, screening),

            CheckoutAction::LayoutLoaded { generation, result } => {
                if generation != state.generation || state.screening.is_none() {
                    tracing::debug!(generation, "Dropping stale seat layout");
                    return Self::none();
                }
                state.layout = match result {
                    Ok(layout) => LayoutStatus::Ready(layout),
                    Err(error) => LayoutStatus::Unavailable(error.to_string()),
                };
                Self::none()
            },

            CheckoutAction::PromotionsLoaded { generation, promotions } => {
                if generation == state.generation {
                    state.promotion.active = promotions;
                }
                Self::none()
            },

            CheckoutAction::Close => {
                Self::reset(state, env, None);
                smallvec![Self::cancel(&ALL_EFFECTS)]
            },

            CheckoutAction::ToggleSeat { key } => {
                if !state.is_editable() {
                    return Self::none();
                }
                let Some(seat) = state.layout.layout().and_then(|layout| layout.seat(&key)) else {
                    return Self::none();
                };
                if !state.selection.toggle(seat) {
                    return Self::none();
                }
                state.promotion.invalidate();
                smallvec![Effect::Cancel { id: PROMOTION_CHECK }]
            },

            CheckoutAction::SetPromotionCode { code } | CheckoutAction::SelectPromotion { code } => {
                Self::set_code(state, code)
            },

            CheckoutAction::ApplyPromotion => Self::apply_promotion(state, env),

            CheckoutAction::PromotionValidated { seq, result } => {
                if seq != state.promotion.request_seq || !state.is_editable() {
                    tracing::debug!(seq, "Dropping stale promotion verdict");
                    return Self::none();
                }
                state.promotion.loading = false;
                match result {
                    Ok(decision) => {
                        state.promotion.error = (!decision.is_valid).then(|| {
                            decision
                                .error_message
                                .clone()
                                .unwrap_or_else(|| PROMOTION_REJECTED.to_string())
                        });
                        state.promotion.decision = Some(decision);
                    },
                    Err(error) => {
                        state.promotion.decision = None;
                        state.promotion.error = Some(error.to_string());
                    },
                }
                Self::none()
            },

            CheckoutAction::SetProvider { provider } => {
                if state.is_editable() {
                    let provider = provider.trim();
                    state.provider = if provider.is_empty() {
                        env.config.payment_provider.clone()
                    } else {
                        provider.to_string()
                    };
                }
                Self::none()
            },

            CheckoutAction::Checkout => Self::checkout(state, env),

            CheckoutAction::OrderSubmitted { attempt, result } => {
                if !Self::is_current(state, attempt) {
                    return Self::none();
                }
                match result {
                    Ok(order) => {
                        tracing::info!(order = %order.id, reference = %order.reference, "Order created");
                        let order_id = order.id.clone();
                        state.order = Some(order);
                        Self::create_session(state, env, order_id)
                    },
                    Err(error) => Self::fail(state, &error),
                }
            },

            CheckoutAction::SessionCreated { attempt, result } => {
                if !Self::is_current(state, attempt) {
                    return Self::none();
                }
                match result {
                    Ok(session) => {
                        state.session = Some(session.clone());
                        smallvec![Self::resolve_url(state, env, session, false).cancellable(SUBMIT)]
                    },
                    Err(error) => Self::fail(state, &error),
                }
            },

            CheckoutAction::PaymentUrlResolved { attempt, result } => {
                if !Self::is_current(state, attempt) {
                    return Self::none();
                }
                match result {
                    Ok(link) => {
                        tracing::info!(endpoint = %link.endpoint, "Payment link ready");
                        state.link = Some(link);
                        state.submitting = false;
                        state.step = Step::Payment;
                        state.notice = Some(LINK_READY.to_string());
                        Self::none()
                    },
                    Err(error) => Self::fail(state, &error),
                }
            },

            CheckoutAction::Back => {
                if state.step != Step::Payment {
                    return Self::none();
                }
                state.step = Step::Seats;
                state.attempt += 1;
                state.submitted = None;
                state.order = None;
                state.session = None;
                state.link = None;
                state.url_loading = false;
                state.notice = None;
                state.error = None;
                smallvec![Effect::Cancel { id: PAYMENT_URL }]
            },

            CheckoutAction::RefreshPaymentUrl => {
                if state.step != Step::Payment || state.url_loading {
                    return Self::none();
                }
                let Some(session) = state.session.clone() else {
                    return Self::none();
                };
                state.url_loading = true;
                state.error = None;
                smallvec![Self::resolve_url(state, env, session, true).cancellable(PAYMENT_URL)]
            },

            CheckoutAction::PaymentUrlRefreshed { attempt, result } => {
                if attempt != state.attempt || state.step != Step::Payment {
                    return Self::none();
                }
                state.url_loading = false;
                match result {
                    Ok(link) => {
                        state.link = Some(link);
                        state.notice = Some(LINK_REFRESHED.to_string());
                    },
                    Err(error) => state.error = Some(error.to_string()),
                }
                Self::none()
            },

            CheckoutAction::DismissMessages => {
                state.error = None;
                state.notice = None;
                state.promotion.error = None;
                Self::none()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use cinepay_api::mocks::MockTransport;
    use cinepay_api::{ApiStack, Order, PaymentLink, PromotionDecision, Seat, SeatLayout, SeatStatus, ServerAmounts};
    use cinepay_testing::{ReducerTest, assertions};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn env() -> CheckoutEnvironment {
        CheckoutEnvironment::new(ApiStack::new(Arc::new(MockTransport::new())), Config::default())
    }

    fn seat(id: i64, label: &str, col: u32, status: SeatStatus) -> Seat {
        Seat {
            id: Some(ResourceId::Numeric(id)),
            label: label.into(),
            row: Some(1),
            col: Some(col),
            tier: "Standard".into(),
            status,
            price: None,
        }
    }

    fn ready() -> CheckoutState {
        let mut state = CheckoutState::new("VNPay");
        state.screening = Some(ScreeningRef {
            screening_id: Some(ResourceId::Numeric(12)),
            room_id: None,
            base_price: Some(100_000),
        });
        state.generation = 1;
        state.layout = LayoutStatus::Ready(SeatLayout {
            rows: 1,
            cols: 3,
            seats: vec![
                seat(101, "A1", 1, SeatStatus::Available),
                seat(102, "A2", 2, SeatStatus::Available),
                seat(103, "A3", 3, SeatStatus::Booked),
            ],
        });
        state
    }

    fn with_seats(mut state: CheckoutState, keys: &[&str]) -> CheckoutState {
        let reducer = CheckoutReducer::new();
        let env = env();
        for key in keys {
            let _ = reducer.reduce(&mut state, CheckoutAction::ToggleSeat { key: (*key).into() }, &env);
        }
        state
    }

    fn order() -> Order {
        Order {
            id: ResourceId::Numeric(77),
            reference: "CP-77".into(),
            amounts: ServerAmounts::default(),
            payable: None,
            endpoint: "/Order".into(),
        }
    }

    fn in_payment() -> CheckoutState {
        let mut state = with_seats(ready(), &["101"]);
        state.step = Step::Payment;
        state.attempt = 3;
        state.order = Some(order());
        state.session = Some(PaymentSession {
            payment_id: ResourceId::Numeric(88),
            endpoint: "/Payment".into(),
        });
        state.link = Some(PaymentLink {
            url: "https://pay.example/88".parse().unwrap_or_else(|_| unreachable!()),
            endpoint: "/Payment/88/payment-url".into(),
        });
        state
    }

    #[test]
    fn open_loads_layout_and_promotions() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(CheckoutState::default())
            .when_action(CheckoutAction::Open {
                screening: ScreeningRef {
                    screening_id: Some(ResourceId::Numeric(12)),
                    room_id: Some(ResourceId::Numeric(3)),
                    base_price: Some(90_000),
                },
            })
            .then_state(|state| {
                assert_eq!(state.layout, LayoutStatus::Loading);
                assert_eq!(state.generation, 1);
                assert_eq!(state.provider, "VNPay");
                assert_eq!(state.base_price(), Some(90_000));
            })
            .then_effects(|effects| {
                assertions::assert_has_cancellable(effects, SEAT_LAYOUT);
                assertions::assert_has_cancellable(effects, PROMOTIONS);
                assertions::assert_cancels(effects, SUBMIT);
            })
            .run();
    }

    #[test]
    fn open_without_screening_or_room_shows_empty_state() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(CheckoutState::default())
            .when_action(CheckoutAction::Open {
                screening: ScreeningRef::default(),
            })
            .then_state(|state| {
                assert_eq!(state.layout, LayoutStatus::Unavailable(NO_SEAT_MAP.into()));
            })
            .then_effects(|effects| {
                assertions::assert_cancels(effects, SEAT_LAYOUT);
                assertions::assert_has_cancellable(effects, PROMOTIONS);
            })
            .run();
    }

    #[test]
    fn stale_layout_is_dropped() {
        let mut state = ready();
        state.generation = 2;
        state.layout = LayoutStatus::Loading;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::LayoutLoaded {
                generation: 1,
                result: Err(CheckoutError::SeatMapUnavailable(NO_SEAT_MAP.into())),
            })
            .then_state(|state| assert_eq!(state.layout, LayoutStatus::Loading))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn missing_seat_map_is_an_empty_state() {
        let mut state = ready();
        state.layout = LayoutStatus::Loading;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::LayoutLoaded {
                generation: 1,
                result: Err(CheckoutError::SeatMapUnavailable(NO_SEAT_MAP.into())),
            })
            .then_state(|state| {
                assert_eq!(state.layout, LayoutStatus::Unavailable(NO_SEAT_MAP.into()));
                assert!(state.screening.is_some());
            })
            .run();
    }

    #[test]
    fn booked_seat_does_not_toggle() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(ready())
            .when_action(CheckoutAction::ToggleSeat { key: "103".into() })
            .then_state(|state| assert!(state.selection.is_empty()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn toggling_invalidates_the_promotion_verdict() {
        let mut state = with_seats(ready(), &["101"]);
        state.promotion.code = "SALE10".into();
        state.promotion.decision = Some(PromotionDecision {
            is_valid: true,
            discount_amount: 10_000,
            promotion_id: None,
            error_message: None,
        });
        let seq = state.promotion.request_seq;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::ToggleSeat { key: "102".into() })
            .then_state(move |state| {
                assert_eq!(state.selection.len(), 2);
                assert_eq!(state.promotion.decision, None);
                assert_eq!(state.promotion.request_seq, seq + 1);
                assert_eq!(state.promotion.code, "SALE10");
            })
            .then_effects(|effects| assertions::assert_cancels(effects, PROMOTION_CHECK))
            .run();
    }

    #[test]
    fn seats_are_locked_while_submitting() {
        let mut state = with_seats(ready(), &["101"]);
        state.submitting = true;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::ToggleSeat { key: "101".into() })
            .then_state(|state| assert!(state.selection.contains("101")))
            .run();
    }

    #[test]
    fn promotion_needs_an_amount() {
        let mut state = ready();
        state.promotion.code = "SALE10".into();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::ApplyPromotion)
            .then_state(|state| {
                assert_eq!(state.promotion.error.as_deref(), Some(NO_AMOUNT));
                assert!(!state.promotion.loading);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn apply_promotion_validates_in_background() {
        let mut state = with_seats(ready(), &["101", "102"]);
        state.promotion.code = " SALE10 ".into();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::ApplyPromotion)
            .then_state(|state| assert!(state.promotion.loading))
            .then_effects(|effects| {
                assertions::assert_has_cancellable(effects, PROMOTION_CHECK);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn rejected_code_is_shown_but_does_not_block() {
        let mut state = with_seats(ready(), &["101"]);
        state.promotion.code = "OLD".into();
        state.promotion.loading = true;
        let seq = state.promotion.request_seq;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::PromotionValidated {
                seq,
                result: Ok(PromotionDecision {
                    is_valid: false,
                    discount_amount: 0,
                    promotion_id: None,
                    error_message: Some("Code expired".into()),
                }),
            })
            .then_state(|state| {
                assert_eq!(state.promotion.error.as_deref(), Some("Code expired"));
                assert_eq!(state.client_totals().discount, 0);
                assert!(state.is_editable());
            })
            .run();
    }

    #[test]
    fn stale_promotion_verdict_is_ignored() {
        let mut state = with_seats(ready(), &["101"]);
        state.promotion.code = "SALE10".into();
        let stale = state.promotion.request_seq;
        state.promotion.invalidate();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::PromotionValidated {
                seq: stale,
                result: Ok(PromotionDecision {
                    is_valid: true,
                    discount_amount: 10_000,
                    promotion_id: None,
                    error_message: None,
                }),
            })
            .then_state(|state| assert_eq!(state.promotion.decision, None))
            .run();
    }

    #[test]
    fn checkout_requires_a_selection() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(ready())
            .when_action(CheckoutAction::Checkout)
            .then_state(|state| {
                assert_eq!(state.error.as_deref(), Some(NO_SEATS));
                assert!(!state.submitting);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn checkout_starts_the_chain() {
        let state = with_seats(ready(), &["101", "102"]);
        let attempt = state.attempt;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::Checkout)
            .then_state(move |state| {
                assert!(state.submitting);
                assert_eq!(state.attempt, attempt + 1);
                assert_eq!(state.step, Step::Seats);
            })
            .then_effects(|effects| assertions::assert_has_cancellable(effects, SUBMIT))
            .run();
    }

    #[test]
    fn checkout_waits_for_the_promotion_verdict() {
        let mut state = with_seats(ready(), &["101", "102"]);
        state.promotion.code = "SALE10".into();
        state.promotion.loading = true;
        let attempt = state.attempt;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::Checkout)
            .then_state(move |state| {
                assert_eq!(state.error.as_deref(), Some(PROMOTION_PENDING));
                assert!(!state.submitting);
                assert!(state.promotion.loading);
                assert_eq!(state.attempt, attempt);
                assert_eq!(state.submitted, None);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn verdict_during_submission_is_ignored() {
        let mut state = with_seats(ready(), &["101", "102"]);
        state.submitting = true;
        state.submitted = Some(Totals::clamped(200_000, 0));
        let seq = state.promotion.request_seq;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::PromotionValidated {
                seq,
                result: Ok(PromotionDecision {
                    is_valid: true,
                    discount_amount: 20_000,
                    promotion_id: None,
                    error_message: None,
                }),
            })
            .then_state(|state| {
                assert_eq!(state.promotion.decision, None);
                assert_eq!(state.payable(), 200_000);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn submitted_totals_back_the_session_amount() {
        let mut state = with_seats(ready(), &["101", "102"]);
        state.submitting = true;
        state.submitted = Some(Totals::clamped(200_000, 0));
        state.promotion.decision = Some(PromotionDecision {
            is_valid: true,
            discount_amount: 20_000,
            promotion_id: None,
            error_message: None,
        });
        state.order = Some(order());

        assert_eq!(state.client_totals().total, 180_000);
        assert_eq!(state.totals(), Totals::clamped(200_000, 0));
        assert_eq!(state.payable(), 200_000);
    }

    #[test]
    fn second_checkout_while_submitting_is_ignored() {
        let mut state = with_seats(ready(), &["101"]);
        state.submitting = true;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::Checkout)
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn order_request_carries_seats_and_clamped_discount() {
        let mut state = with_seats(ready(), &["102", "101"]);
        state.promotion.code = "BIG".into();
        state.promotion.decision = Some(PromotionDecision {
            is_valid: true,
            discount_amount: 500_000,
            promotion_id: Some(ResourceId::Numeric(4)),
            error_message: None,
        });

        let request = CheckoutReducer::order_request(&state, ResourceId::Numeric(12));
        let request = request.unwrap_or_else(|| unreachable!());

        assert_eq!(request.seat_ids, vec![ResourceId::Numeric(101), ResourceId::Numeric(102)]);
        assert_eq!(request.seat_codes, vec!["A1", "A2"]);
        assert_eq!((request.subtotal, request.discount, request.total), (200_000, 200_000, 0));
        assert_eq!(request.promotion_code.as_deref(), Some("BIG"));
        assert_eq!(request.promotion_id, Some(ResourceId::Numeric(4)));
    }

    #[test]
    fn order_created_moves_on_to_the_session() {
        let mut state = with_seats(ready(), &["101"]);
        state.submitting = true;
        let attempt = state.attempt;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::OrderSubmitted {
                attempt,
                result: Ok(order()),
            })
            .then_state(|state| {
                assert_eq!(state.order.as_ref().map(|o| o.reference.as_str()), Some("CP-77"));
                assert!(state.submitting);
            })
            .then_effects(|effects| assertions::assert_has_cancellable(effects, SUBMIT))
            .run();
    }

    #[test]
    fn failure_after_order_clears_refs_and_keeps_seats() {
        let mut state = with_seats(ready(), &["101", "102"]);
        state.submitting = true;
        state.order = Some(order());
        state.session = Some(PaymentSession {
            payment_id: ResourceId::Numeric(88),
            endpoint: "/Payment".into(),
        });
        let attempt = state.attempt;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::PaymentUrlResolved {
                attempt,
                result: Err(CheckoutError::EndpointNotSupported("payment url")),
            })
            .then_state(|state| {
                assert_eq!(state.step, Step::Seats);
                assert!(!state.submitting);
                assert!(state.order.is_none());
                assert!(state.session.is_none());
                assert_eq!(state.selection.len(), 2);
                assert_eq!(
                    state.error.as_deref(),
                    Some("The payment url service is not available right now.")
                );
            })
            .run();
    }

    #[test]
    fn result_from_an_abandoned_attempt_is_dropped() {
        let state = in_payment();
        let old_attempt = state.attempt - 1;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::OrderSubmitted {
                attempt: old_attempt,
                result: Err(CheckoutError::Business("late".into())),
            })
            .then_state(|state| {
                assert_eq!(state.step, Step::Payment);
                assert_eq!(state.error, None);
            })
            .run();
    }

    #[test]
    fn back_clears_payment_state() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(in_payment())
            .when_action(CheckoutAction::Back)
            .then_state(|state| {
                assert_eq!(state.step, Step::Seats);
                assert!(state.order.is_none() && state.session.is_none() && state.link.is_none());
                assert!(state.selection.contains("101"));
                assert_eq!(state.attempt, 4);
            })
            .then_effects(|effects| assertions::assert_cancels(effects, PAYMENT_URL))
            .run();
    }

    #[test]
    fn refresh_keeps_order_and_session() {
        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(in_payment())
            .when_action(CheckoutAction::RefreshPaymentUrl)
            .then_state(|state| {
                assert!(state.url_loading);
                assert_eq!(state.step, Step::Payment);
                assert!(state.order.is_some() && state.session.is_some());
            })
            .then_effects(|effects| assertions::assert_has_cancellable(effects, PAYMENT_URL))
            .run();
    }

    #[test]
    fn refresh_failure_stays_on_payment() {
        let mut state = in_payment();
        state.url_loading = true;

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::PaymentUrlRefreshed {
                attempt: 3,
                result: Err(CheckoutError::Transport(URL_FAILED.into())),
            })
            .then_state(|state| {
                assert_eq!(state.step, Step::Payment);
                assert!(state.link.is_some());
                assert_eq!(state.error.as_deref(), Some(URL_FAILED));
            })
            .run();
    }

    #[test]
    fn close_cancels_everything() {
        let state = in_payment();
        let surface = state.surface.clone();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(CheckoutAction::Close)
            .then_state(move |state| {
                assert!(surface.is_cancelled());
                assert!(!state.surface.is_cancelled());
                assert!(state.screening.is_none());
                assert_eq!(state.layout, LayoutStatus::Idle);
                assert_eq!(state.provider, "VNPay");
            })
            .then_effects(|effects| {
                for id in ALL_EFFECTS {
                    assertions::assert_cancels(effects, id);
                }
            })
            .run();
    }

    #[test]
    fn server_amounts_override_client_totals() {
        let mut state = in_payment();
        if let Some(order) = state.order.as_mut() {
            order.amounts = ServerAmounts {
                subtotal: Some(110_000),
                discount: None,
                total: Some(105_000),
            };
        }

        assert_eq!(state.client_totals(), Totals::clamped(100_000, 0));
        assert_eq!(
            state.totals(),
            Totals {
                subtotal: 110_000,
                discount: 0,
                total: 105_000
            }
        );
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_subtotal(subtotal in 0u64..10_000_000, discount in any::<u64>()) {
            let totals = Totals::clamped(subtotal, discount);
            prop_assert!(totals.discount <= subtotal);
            prop_assert_eq!(totals.total, subtotal - totals.discount);
        }

        #[test]
        fn displayed_discount_is_clamped(discount in any::<u64>(), seats in 0usize..3) {
            let keys: Vec<&str> = ["101", "102"].into_iter().take(seats).collect();
            let mut state = with_seats(ready(), &keys);
            state.promotion.decision = Some(PromotionDecision {
                is_valid: true,
                discount_amount: discount,
                promotion_id: None,
                error_message: None,
            });

            let totals = state.client_totals();
            prop_assert!(totals.discount <= totals.subtotal);
            prop_assert_eq!(totals.subtotal, 100_000 * keys.len() as u64);
        }
    }
}
