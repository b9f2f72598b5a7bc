//! The primary window's side of the result protocol.
//!
//! A [`ResultListener`] owns a store running [`ResultConsumer`] and wires
//! every delivery path into it: the live channels, a one-time read of the
//! durable slot on resume, and the landing query if the primary window
//! itself was sent back to the landing route.

use crate::banner::Banner;
use crate::broadcast::BroadcastChannel;
use crate::channel::EventChannel;
use crate::config::ResultConfig;
use crate::consumer::{ConsumerAction, ConsumerEnvironment, ConsumerState, ResultConsumer};
use crate::context::{Site, Window};
use crate::direct::DirectChannel;
use crate::durable::DurableChannel;
use crate::event::PaymentResultEvent;
use crate::landing::{LandingOutcome, landing_query};
use cinepay_core::environment::Clock;
use cinepay_runtime::{Store, StoreError};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Delivery path name for the resume read
pub const VIA_RESUME: &str = "resume";
/// Delivery path name for the primary window's own landing query
pub const VIA_LANDING: &str = "landing";

/// A store running the result consumer
pub type ResultStore = Store<ConsumerState, ConsumerAction, ConsumerEnvironment, ResultConsumer>;

/// Running listener tasks; dropping the handle stops them
#[derive(Debug)]
pub struct ListenerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Number of live channel subscriptions
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.tasks.len()
    }

    /// Stop listening
    pub fn stop(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Consumer side of the result protocol for one primary window
pub struct ResultListener {
    store: ResultStore,
    channels: Vec<Arc<dyn EventChannel>>,
    clock: Arc<dyn Clock>,
}

impl ResultListener {
    /// Listener for `window` on `site`, over the direct, durable and broadcast paths
    #[must_use]
    pub fn new(site: &Site, window: Arc<Window>, config: ResultConfig, clock: Arc<dyn Clock>) -> Self {
        let durable = DurableChannel::new(Arc::clone(site.store()), config.storage_key.clone(), window.id());
        let channels: Vec<Arc<dyn EventChannel>> = vec![
            Arc::new(DirectChannel::new(Arc::clone(&window))),
            Arc::new(durable.clone()),
            Arc::new(BroadcastChannel::new(
                Arc::clone(site.hub()),
                config.topic.clone(),
                window.id(),
            )),
        ];
        let env = ConsumerEnvironment {
            window,
            durable,
            config,
        };
        Self {
            store: Store::new(ConsumerState::default(), ResultConsumer::new(), env),
            channels,
            clock,
        }
    }

    /// The consumer store
    #[must_use]
    pub const fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Banner currently shown
    pub async fn banner(&self) -> Option<Banner> {
        self.store.state(|s| s.banner.clone()).await
    }

    /// Subscribe to every channel, then replay what arrived while away
    ///
    /// Subscriptions are taken before the durable slot and the landing
    /// query are read, so nothing published in between is missed. A
    /// channel that cannot subscribe is logged and left out.
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownInProgress`] when the store is shutting down.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<ListenerHandle, StoreError> {
        let mut tasks = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let via = channel.name();
            match channel.subscribe() {
                Ok(mut events) => {
                    let store = self.store.clone();
                    tasks.push(tokio::spawn(async move {
                        while let Some(event) = events.next().await {
                            if let Err(error) = store.send(ConsumerAction::Delivered { event, via }).await {
                                tracing::debug!(%error, via, "Result listener stopped");
                                break;
                            }
                        }
                    }));
                },
                Err(error) => {
                    tracing::warn!(channel = via, %error, "ChannelDeliveryFailure");
                },
            }
        }
        let handle = ListenerHandle { tasks };

        let env = self.store.environment();
        if let Some(event) = env.durable.read_pending() {
            self.deliver(event, VIA_RESUME).await?;
        }

        let location = env.window.location();
        if let Some(query) = landing_query(&location, &env.config.return_path) {
            let event = LandingOutcome::from_query(query).into_event(self.clock.as_ref());
            self.deliver(event, VIA_LANDING).await?;
        }

        Ok(handle)
    }

    /// Open the gateway window and remember it for cleanup
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownInProgress`] when the store is shutting down.
    pub async fn open_secondary(&self, location: impl Into<String>) -> Result<Arc<Window>, StoreError> {
        let window = self.store.environment().window.open(location);
        self.store
            .send(ConsumerAction::SecondaryOpened {
                window: Arc::clone(&window),
            })
            .await?;
        Ok(window)
    }

    /// Close the banner early
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownInProgress`] when the store is shutting down.
    pub async fn dismiss_banner(&self) -> Result<(), StoreError> {
        self.store.send(ConsumerAction::DismissBanner).await.map(drop)
    }

    async fn deliver(&self, event: PaymentResultEvent, via: &'static str) -> Result<(), StoreError> {
        self.store.send(ConsumerAction::Delivered { event, via }).await.map(drop)
    }
}

impl std::fmt::Debug for ResultListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultListener")
            .field("window", &self.store.environment().window)
            .field("channels", &self.channels.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
