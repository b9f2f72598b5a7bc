//! The window the gateway redirects back to.
//!
//! It decodes the outcome from its own URL and pushes it down every
//! channel at once. A channel that fails is logged and skipped; the others
//! are expected to cover for it.

use crate::broadcast::BroadcastChannel;
use crate::channel::{ChannelError, EventChannel};
use crate::config::ResultConfig;
use crate::context::{ROOT_PATH, Site, Window};
use crate::direct::DirectChannel;
use crate::durable::DurableChannel;
use crate::event::PaymentResultEvent;
use crate::landing::LandingOutcome;
use cinepay_core::environment::Clock;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay before the window closes itself
pub const CLOSE_DELAY: Duration = Duration::from_millis(400);

/// How long one channel may take to accept an event
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// What happened when the window landed
#[derive(Debug)]
pub struct LandingReport {
    /// The event that was sent
    pub event: PaymentResultEvent,
    /// Channels that accepted it
    pub delivered: Vec<&'static str>,
    /// Channels that did not
    pub failed: Vec<ChannelError>,
    /// Pending self-close, when the window had an opener to return to
    pub close: Option<JoinHandle<()>>,
}

/// Publisher side of the result protocol
pub struct SecondaryContext {
    window: Arc<Window>,
    channels: Vec<Arc<dyn EventChannel>>,
    clock: Arc<dyn Clock>,
    publish_timeout: Duration,
}

impl SecondaryContext {
    /// A landing window on `site` using the direct, durable and broadcast paths
    #[must_use]
    pub fn new(site: &Site, window: Arc<Window>, config: &ResultConfig, clock: Arc<dyn Clock>) -> Self {
        let channels: Vec<Arc<dyn EventChannel>> = vec![
            Arc::new(DirectChannel::new(Arc::clone(&window))),
            Arc::new(DurableChannel::new(
                Arc::clone(site.store()),
                config.storage_key.clone(),
                window.id(),
            )),
            Arc::new(BroadcastChannel::new(
                Arc::clone(site.hub()),
                config.topic.clone(),
                window.id(),
            )),
        ];
        Self::with_channels(window, channels, clock)
    }

    /// A landing window publishing on `channels`
    #[must_use]
    pub fn with_channels(window: Arc<Window>, channels: Vec<Arc<dyn EventChannel>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            channels,
            clock,
            publish_timeout: PUBLISH_TIMEOUT,
        }
    }

    /// Override [`PUBLISH_TIMEOUT`]
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// The landing window
    #[must_use]
    pub const fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Decode the outcome and publish it everywhere
    ///
    /// With a live opener the window schedules its own close after
    /// [`CLOSE_DELAY`]. Without one it becomes the application and moves
    /// to the root view carrying the status.
    #[tracing::instrument(skip(self), fields(window = %self.window.id()))]
    pub async fn land(&self) -> LandingReport {
        let location = self.window.location();
        let query = location.split_once('?').map_or("", |(_, q)| q);
        let event = LandingOutcome::from_query(query).into_event(self.clock.as_ref());

        tracing::info!(
            status = %event.status,
            order = event.order_ref.as_deref().unwrap_or("-"),
            "Payment landing decoded"
        );

        let had_opener = self.window.opener().is_some();
        let (delivered, failed) = self.publish(&event).await;

        let close = if had_opener {
            let window = Arc::clone(&self.window);
            Some(tokio::spawn(async move {
                tokio::time::sleep(CLOSE_DELAY).await;
                if let Err(error) = window.close() {
                    tracing::debug!(%error, "Landing window already closed");
                }
            }))
        } else {
            self.window
                .navigate(format!("{ROOT_PATH}?paymentStatus={}", event.status));
            None
        };

        LandingReport {
            event,
            delivered,
            failed,
            close,
        }
    }

    async fn publish(&self, event: &PaymentResultEvent) -> (Vec<&'static str>, Vec<ChannelError>) {
        let attempts = self.channels.iter().map(|channel| async move {
            let outcome = match tokio::time::timeout(self.publish_timeout, channel.publish(event)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::DeliveryFailed {
                    channel: channel.name(),
                    reason: "timed out".to_string(),
                }),
            };
            (channel.name(), outcome)
        });

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => {
                    metrics::counter!("payment_result.published", "channel" => name).increment(1);
                    delivered.push(name);
                },
                Err(error) => {
                    tracing::warn!(channel = name, %error, "ChannelDeliveryFailure");
                    metrics::counter!("payment_result.publish_failures", "channel" => name).increment(1);
                    failed.push(error);
                },
            }
        }
        (delivered, failed)
    }
}

impl std::fmt::Debug for SecondaryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryContext")
            .field("window", &self.window)
            .field("channels", &self.channels.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
