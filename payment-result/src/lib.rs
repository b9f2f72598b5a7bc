//! # cinepay payment result
//!
//! Getting a payment outcome from the window the gateway returns to back
//! into the window that started checkout.
//!
//! The landing window ([`SecondaryContext`]) publishes the result on three
//! channels at once: a direct post to its opener, a write to the shared
//! durable store, and a broadcast topic. The primary window
//! ([`ResultListener`]) listens on all three, reads the durable slot once
//! when it starts, and decodes its own URL if it was sent to the landing
//! route. Everything ends up in one deduplicating reducer, so any subset
//! of paths may deliver, in any order, any number of times.
//!
//! ```no_run
//! use cinepay_core::environment::SystemClock;
//! use cinepay_payment_result::{ResultConfig, ResultListener, SecondaryContext, Site};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), cinepay_runtime::StoreError> {
//! let config = ResultConfig::default();
//! let site = Site::new(config.app_origin.clone());
//! let primary = site.window("/booking");
//! let listener = ResultListener::new(&site, primary, config.clone(), Arc::new(SystemClock));
//! let _handle = listener.start().await?;
//!
//! let popup = listener.open_secondary("/payment/result?vnp_ResponseCode=00&vnp_TxnRef=CP-77").await?;
//! SecondaryContext::new(&site, popup, &config, Arc::new(SystemClock)).land().await;
//! # Ok(())
//! # }
//! ```

pub mod banner;
pub mod broadcast;
pub mod channel;
pub mod config;
pub mod consumer;
pub mod context;
pub mod direct;
pub mod durable;
pub mod event;
pub mod landing;
pub mod listener;
pub mod secondary;

pub use banner::{Banner, BannerKind};
pub use broadcast::{BroadcastChannel, BroadcastHub};
pub use channel::{ChannelError, EventChannel, EventStream};
pub use config::ResultConfig;
pub use consumer::{ConsumerAction, ConsumerEnvironment, ConsumerState, ResultConsumer};
pub use context::{ContextId, Site, Window};
pub use direct::DirectChannel;
pub use durable::{DurableChannel, DurableStore};
pub use event::{PaymentResultEvent, PaymentStatus};
pub use landing::LandingOutcome;
pub use listener::{ListenerHandle, ResultListener, ResultStore};
pub use secondary::{LandingReport, SecondaryContext};
