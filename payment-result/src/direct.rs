//! Direct post to the opener window.

use crate::channel::{ChannelError, EventChannel, EventStream, PublishFuture, receiver_stream};
use crate::context::{Envelope, Window};
use crate::event::PaymentResultEvent;
use futures::StreamExt;
use std::sync::Arc;

/// Posts to the opener and focuses it; listens on its own window, same origin only
#[derive(Debug, Clone)]
pub struct DirectChannel {
    window: Arc<Window>,
}

impl DirectChannel {
    /// Endpoint for `window`
    #[must_use]
    pub const fn new(window: Arc<Window>) -> Self {
        Self { window }
    }

    fn post(&self, event: &PaymentResultEvent) -> Result<(), ChannelError> {
        let opener = self.window.opener().ok_or(ChannelError::NoOpener)?;
        opener.post(Envelope {
            origin: self.window.origin().to_string(),
            event: event.clone(),
        })?;
        opener.focus();
        Ok(())
    }
}

impl EventChannel for DirectChannel {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn publish(&self, event: &PaymentResultEvent) -> PublishFuture<'_> {
        let result = self.post(event);
        Box::pin(async move { result })
    }

    fn subscribe(&self) -> Result<EventStream, ChannelError> {
        if self.window.is_closed() {
            return Err(ChannelError::WindowClosed(self.window.id()));
        }
        let origin = self.window.origin().to_string();
        let stream = receiver_stream(self.window.messages()).filter_map(move |envelope| {
            let accepted = envelope.origin == origin;
            if !accepted {
                tracing::warn!(from = %envelope.origin, "Dropping cross-origin payment result");
            }
            futures::future::ready(accepted.then_some(envelope.event))
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PaymentStatus;
    use cinepay_testing::test_clock;
    use std::time::Duration;

    fn event() -> PaymentResultEvent {
        PaymentResultEvent::new(PaymentStatus::Success, Some("CP-77".into()), &test_clock())
    }

    #[tokio::test]
    async fn post_reaches_and_focuses_the_opener() {
        let primary = Window::new("http://localhost:5173", "/booking");
        let popup = primary.open("/payment/result");
        let mut received = DirectChannel::new(primary.clone()).subscribe().unwrap_or_else(|e| unreachable!("{e}"));

        let sent = event();
        DirectChannel::new(popup).publish(&sent).await.unwrap_or_else(|e| unreachable!("{e}"));

        let got = tokio::time::timeout(Duration::from_secs(1), received.next()).await;
        assert_eq!(got.ok().flatten(), Some(sent));
        assert!(primary.has_focus());
    }

    #[tokio::test]
    async fn without_opener_post_fails() {
        let popup = Window::new("http://localhost:5173", "/payment/result");
        let result = DirectChannel::new(popup).publish(&event()).await;
        assert_eq!(result, Err(ChannelError::NoOpener));
    }

    #[tokio::test]
    async fn cross_origin_posts_are_dropped() {
        let primary = Window::new("http://localhost:5173", "/booking");
        let mut received = DirectChannel::new(primary.clone()).subscribe().unwrap_or_else(|e| unreachable!("{e}"));

        primary
            .post(Envelope {
                origin: "https://evil.example".into(),
                event: event(),
            })
            .unwrap_or_else(|e| unreachable!("{e}"));

        let got = tokio::time::timeout(Duration::from_millis(50), received.next()).await;
        assert!(got.is_err());
    }
}
