//! The event channel abstraction shared by every delivery path.
//!
//! Each backend is an endpoint bound to one window: `publish` sends from
//! that window, `subscribe` yields what other windows sent. The consumer
//! only ever sees [`PaymentResultEvent`]s and the channel name.
//!
//! # Dyn Compatibility
//!
//! `publish` returns an explicit `Pin<Box<dyn Future>>` so channels can be
//! held as `Arc<dyn EventChannel>`.

use crate::context::ContextId;
use crate::event::PaymentResultEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::broadcast;

/// A delivery path that could not deliver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No live opener to post to
    #[error("No live opener window")]
    NoOpener,

    /// The target window is closed
    #[error("Window {0} is closed")]
    WindowClosed(ContextId),

    /// The event could not be encoded
    #[error("Could not encode the payment result: {0}")]
    Encoding(String),

    /// Backend failure
    #[error("{channel} delivery failed: {reason}")]
    DeliveryFailed {
        /// Channel name
        channel: &'static str,
        /// Why
        reason: String,
    },
}

/// Events arriving on a channel
pub type EventStream = Pin<Box<dyn Stream<Item = PaymentResultEvent> + Send>>;

/// Future returned by [`EventChannel::publish`]
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>>;

/// One way of moving a payment result between windows
pub trait EventChannel: Send + Sync {
    /// Short name for logs and metrics
    fn name(&self) -> &'static str;

    /// Send `event` from this endpoint's window
    ///
    /// # Errors
    ///
    /// A [`ChannelError`] when this path cannot deliver. Callers log it and
    /// rely on the other paths.
    fn publish(&self, event: &PaymentResultEvent) -> PublishFuture<'_>;

    /// Events sent by other windows, from now on
    ///
    /// # Errors
    ///
    /// A [`ChannelError`] when this endpoint cannot listen.
    fn subscribe(&self) -> Result<EventStream, ChannelError>;
}

/// Message from a topic or store, tagged with the window that sent it
#[derive(Debug, Clone)]
pub struct Tagged<T> {
    /// Sender
    pub from: ContextId,
    /// Payload
    pub payload: T,
}

/// Turn a broadcast receiver into a stream, skipping over lag
pub(crate) fn receiver_stream<T>(rx: broadcast::Receiver<T>) -> impl Stream<Item = T> + Send
where
    T: Clone + Send + 'static,
{
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((item, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Channel listener lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}
