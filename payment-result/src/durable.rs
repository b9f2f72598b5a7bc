//! Shared durable store with change notification.
//!
//! One slot per key, not a queue: a second write before the first is
//! consumed overwrites it. Change notifications reach every window except
//! the one that wrote.

use crate::channel::{ChannelError, EventChannel, EventStream, PublishFuture, Tagged, receiver_stream};
use crate::context::ContextId;
use crate::event::PaymentResultEvent;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// A write or removal of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Key that changed
    pub key: String,
    /// New value; `None` when removed
    pub new_value: Option<String>,
}

/// Same-origin key-value store shared by every window of a site
#[derive(Debug)]
pub struct DurableStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<Tagged<StorageChange>>,
}

impl Default for DurableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Current value of `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Write `value` under `key` on behalf of `writer`
    pub fn set(&self, key: &str, value: String, writer: ContextId) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        self.notify(writer, key, Some(value));
    }

    /// Remove `key`; notifies only when something was removed
    pub fn remove(&self, key: &str, writer: ContextId) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.notify(writer, key, None);
        }
        removed
    }

    /// Remove `key` if its current value satisfies `predicate`
    pub fn remove_if(&self, key: &str, writer: ContextId, predicate: impl FnOnce(&str) -> bool) -> bool {
        let removed = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let matches = entries.get(key).is_some_and(|value| predicate(value));
            matches && entries.remove(key).is_some()
        };
        if removed {
            self.notify(writer, key, None);
        }
        removed
    }

    /// Every change, tagged with its writer
    #[must_use]
    pub fn watch(&self) -> broadcast::Receiver<Tagged<StorageChange>> {
        self.changes.subscribe()
    }

    fn notify(&self, writer: ContextId, key: &str, new_value: Option<String>) {
        let _ = self.changes.send(Tagged {
            from: writer,
            payload: StorageChange {
                key: key.to_string(),
                new_value,
            },
        });
    }
}

/// Writes the result under a well-known key; picks up writes from other windows
#[derive(Debug, Clone)]
pub struct DurableChannel {
    store: Arc<DurableStore>,
    key: String,
    context: ContextId,
}

impl DurableChannel {
    /// Endpoint for window `context` using `key`
    #[must_use]
    pub fn new(store: Arc<DurableStore>, key: impl Into<String>, context: ContextId) -> Self {
        Self {
            store,
            key: key.into(),
            context,
        }
    }

    /// The result left in the store, if any (read once at startup)
    #[must_use]
    pub fn read_pending(&self) -> Option<PaymentResultEvent> {
        let raw = self.store.get(&self.key)?;
        match PaymentResultEvent::from_json(&raw) {
            Ok(event) => Some(event),
            Err(error) => {
                tracing::debug!(%error, key = %self.key, "Ignoring unreadable stored payment result");
                None
            },
        }
    }

    /// Remove the stored result
    pub fn clear(&self) -> bool {
        self.store.remove(&self.key, self.context)
    }

    /// Remove the stored result only if it is the event keyed `dedup_key`
    pub fn clear_if_consumed(&self, dedup_key: &str) -> bool {
        self.store.remove_if(&self.key, self.context, |raw| {
            PaymentResultEvent::from_json(raw).is_ok_and(|event| event.dedup_key() == dedup_key)
        })
    }
}

impl EventChannel for DurableChannel {
    fn name(&self) -> &'static str {
        "durable"
    }

    fn publish(&self, event: &PaymentResultEvent) -> PublishFuture<'_> {
        let result = event
            .to_json()
            .map_err(|e| ChannelError::Encoding(e.to_string()))
            .map(|json| self.store.set(&self.key, json, self.context));
        Box::pin(async move { result })
    }

    fn subscribe(&self) -> Result<EventStream, ChannelError> {
        let key = self.key.clone();
        let me = self.context;
        let stream = receiver_stream(self.store.watch()).filter_map(move |change| {
            let event = (change.from != me && change.payload.key == key)
                .then_some(change.payload.new_value)
                .flatten()
                .and_then(|raw| PaymentResultEvent::from_json(&raw).ok());
            futures::future::ready(event)
        });
        Ok(Box::pin(stream))
    }
}
