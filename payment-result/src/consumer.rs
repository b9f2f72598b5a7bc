//! Primary-context consumer of payment results.
//!
//! Every delivery path feeds [`ConsumerAction::Delivered`]. The reducer
//! keeps the key of the last event it processed. A repeat changes nothing
//! the user can see; it only drops the event from the durable slot if a
//! late write left it there. A new event:
//!
//! - shows the banner and arms its auto-dismiss timer
//! - navigates the primary window to the root view
//! - clears the durable-store slot
//! - closes the secondary window if one is known, forgetting it either way

use crate::banner::Banner;
use crate::config::ResultConfig;
use crate::context::{ROOT_PATH, Window};
use crate::durable::DurableChannel;
use crate::event::PaymentResultEvent;
use cinepay_core::effect::{Effect, EffectId};
use cinepay_core::reducer::Reducer;
use cinepay_core::{SmallVec, smallvec};
use std::sync::Arc;

/// Banner auto-dismiss timer
pub const BANNER_TIMER: EffectId = EffectId::new("payment-result.banner");

/// Consumer state
#[derive(Debug, Clone, Default)]
pub struct ConsumerState {
    /// Dedup key of the last processed event
    pub last_id: Option<String>,
    /// Banner on screen
    pub banner: Option<Banner>,
    /// Events processed so far; also tags the banner timer
    pub processed: u64,
    /// Window hosting the gateway, while known
    pub secondary: Option<Arc<Window>>,
}

/// Consumer actions
#[derive(Debug, Clone)]
pub enum ConsumerAction {
    /// The primary window opened the gateway window
    SecondaryOpened {
        /// The new window
        window: Arc<Window>,
    },
    /// A result arrived
    Delivered {
        /// The result
        event: PaymentResultEvent,
        /// Delivery path, for logs and metrics
        via: &'static str,
    },
    /// Banner timer fired
    BannerExpired {
        /// Which banner the timer was armed for
        seq: u64,
    },
    /// The user closed the banner
    DismissBanner,
}

/// Consumer dependencies
#[derive(Debug, Clone)]
pub struct ConsumerEnvironment {
    /// The primary window
    pub window: Arc<Window>,
    /// Durable-store endpoint of the primary window
    pub durable: DurableChannel,
    /// Banner duration
    pub config: ResultConfig,
}

/// Dedup-and-present reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultConsumer;

impl ResultConsumer {
    /// Creates a new consumer reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn navigate_home(window: Arc<Window>) -> Effect<ConsumerAction> {
    Effect::future(async move {
        if window.path() != ROOT_PATH {
            window.navigate(ROOT_PATH);
        }
        None
    })
}

fn clear_pending(durable: DurableChannel) -> Effect<ConsumerAction> {
    Effect::future(async move {
        if !durable.clear() {
            tracing::debug!("No stored payment result to clear");
        }
        None
    })
}

fn clear_consumed(durable: DurableChannel, key: String) -> Effect<ConsumerAction> {
    Effect::future(async move {
        if durable.clear_if_consumed(&key) {
            tracing::debug!(id = %key, "Cleared late write of a consumed payment result");
        }
        None
    })
}

fn close_secondary(window: Option<Arc<Window>>) -> Effect<ConsumerAction> {
    let Some(window) = window else {
        return Effect::None;
    };
    Effect::future(async move {
        if let Err(error) = window.close() {
            tracing::debug!(%error, "Secondary window could not be closed");
        }
        None
    })
}

impl Reducer for ResultConsumer {
    type State = ConsumerState;
    type Action = ConsumerAction;
    type Environment = ConsumerEnvironment;

    fn reduce(
        &self,
        state: &mut ConsumerState,
        action: ConsumerAction,
        env: &ConsumerEnvironment,
    ) -> SmallVec<[Effect<ConsumerAction>; 4]> {
        match action {
            ConsumerAction::SecondaryOpened { window } => {
                state.secondary = Some(window);
                smallvec![Effect::None]
            },

            ConsumerAction::Delivered { event, via } => {
                let key = event.dedup_key();
                metrics::counter!("payment_result.deliveries", "channel" => via).increment(1);

                if state.last_id.as_deref() == Some(key.as_str()) {
                    tracing::debug!(id = %key, via, "Duplicate payment result ignored");
                    metrics::counter!("payment_result.duplicates", "channel" => via).increment(1);
                    return smallvec![clear_consumed(env.durable.clone(), key)];
                }

                tracing::info!(
                    id = %key,
                    via,
                    status = %event.status,
                    order = event.order_ref.as_deref().unwrap_or("-"),
                    "Payment result received"
                );

                state.last_id = Some(key);
                state.processed += 1;
                state.banner = Some(Banner::for_event(&event));

                smallvec![
                    Effect::Delay {
                        duration: env.config.banner_duration(),
                        action: Box::new(ConsumerAction::BannerExpired { seq: state.processed }),
                    }
                    .cancellable(BANNER_TIMER),
                    navigate_home(Arc::clone(&env.window)),
                    clear_pending(env.durable.clone()),
                    close_secondary(state.secondary.take()),
                ]
            },

            ConsumerAction::BannerExpired { seq } => {
                if seq == state.processed {
                    state.banner = None;
                }
                smallvec![Effect::None]
            },

            ConsumerAction::DismissBanner => {
                state.banner = None;
                smallvec![Effect::Cancel { id: BANNER_TIMER }]
            },
        }
    }
}
