//! Named pub/sub topics shared by the windows of a site.

use crate::channel::{ChannelError, EventChannel, EventStream, PublishFuture, Tagged, receiver_stream};
use crate::context::ContextId;
use crate::event::PaymentResultEvent;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

type Topic = broadcast::Sender<Tagged<PaymentResultEvent>>;

/// Topic registry; a topic exists from its first use
#[derive(Debug, Default)]
pub struct BroadcastHub {
    topics: Mutex<HashMap<String, Topic>>,
}

impl BroadcastHub {
    /// No topics yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Topic {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

/// Publishes on a topic; hears everyone on it but itself
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    hub: Arc<BroadcastHub>,
    topic: String,
    context: ContextId,
}

impl BroadcastChannel {
    /// Endpoint for window `context` on `topic`
    #[must_use]
    pub fn new(hub: Arc<BroadcastHub>, topic: impl Into<String>, context: ContextId) -> Self {
        Self {
            hub,
            topic: topic.into(),
            context,
        }
    }
}

impl EventChannel for BroadcastChannel {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn publish(&self, event: &PaymentResultEvent) -> PublishFuture<'_> {
        // No subscriber is fine: nobody on the topic to tell
        let _ = self.hub.topic(&self.topic).send(Tagged {
            from: self.context,
            payload: event.clone(),
        });
        Box::pin(async { Ok(()) })
    }

    fn subscribe(&self) -> Result<EventStream, ChannelError> {
        let me = self.context;
        let stream = receiver_stream(self.hub.topic(&self.topic).subscribe())
            .filter_map(move |message| futures::future::ready((message.from != me).then_some(message.payload)));
        Ok(Box::pin(stream))
    }
}
