//! # cinepay checkout
//!
//! The seat checkout surface as a reducer: pick seats from a screening's
//! layout, optionally validate a promotion code, then create an order, open
//! a payment session for it and resolve the gateway URL.
//!
//! ```no_run
//! use cinepay_api::mocks::MockTransport;
//! use cinepay_api::ApiStack;
//! use cinepay_checkout::{CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState, Config, ScreeningRef};
//! use cinepay_runtime::Store;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), cinepay_runtime::StoreError> {
//! let env = CheckoutEnvironment::new(ApiStack::new(Arc::new(MockTransport::new())), Config::default());
//! let store = Store::new(CheckoutState::default(), CheckoutReducer::new(), env);
//!
//! store.send(CheckoutAction::Open { screening: ScreeningRef::default() }).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod reducer;
pub mod selection;
pub mod types;

pub use config::Config;
pub use environment::CheckoutEnvironment;
pub use error::CheckoutError;
pub use reducer::CheckoutReducer;
pub use selection::SelectionSet;
pub use types::{CheckoutAction, CheckoutState, LayoutStatus, PromotionState, ScreeningRef, Step, Totals};

/// A store running the checkout reducer
pub type CheckoutStore = cinepay_runtime::Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;
