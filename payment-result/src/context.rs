//! Execution contexts: windows of one site and what they share.
//!
//! A [`Site`] is one origin. Its windows share a [`DurableStore`] and a
//! [`BroadcastHub`]. A window opened by another keeps a weak reference to
//! its opener, which it can lose (opener closed or dropped, or detached).

use crate::broadcast::BroadcastHub;
use crate::channel::ChannelError;
use crate::durable::DurableStore;
use crate::event::PaymentResultEvent;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::broadcast;

/// Path of the application's root view
pub const ROOT_PATH: &str = "/";

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identity of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A message posted straight to a window
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Origin of the sender
    pub origin: String,
    /// Payload
    pub event: PaymentResultEvent,
}

/// One window or tab
pub struct Window {
    id: ContextId,
    origin: String,
    location: Mutex<String>,
    closed: AtomicBool,
    focused: AtomicBool,
    opener: Mutex<Option<Weak<Window>>>,
    inbox: broadcast::Sender<Envelope>,
}

impl Window {
    /// A top-level window at `location` (path plus optional query)
    #[must_use]
    pub fn new(origin: impl Into<String>, location: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(origin.into(), location.into(), None))
    }

    fn build(origin: String, location: String, opener: Option<Weak<Self>>) -> Self {
        let (inbox, _) = broadcast::channel(16);
        Self {
            id: ContextId::next(),
            origin,
            location: Mutex::new(location),
            closed: AtomicBool::new(false),
            focused: AtomicBool::new(true),
            opener: Mutex::new(opener),
            inbox,
        }
    }

    /// Open a secondary window at `location`, with this one as its opener
    #[must_use]
    pub fn open(self: &Arc<Self>, location: impl Into<String>) -> Arc<Self> {
        self.focused.store(false, Ordering::SeqCst);
        let child = Self::build(self.origin.clone(), location.into(), Some(Arc::downgrade(self)));
        tracing::debug!(opener = %self.id, window = %child.id, "Secondary window opened");
        Arc::new(child)
    }

    /// Identity
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Origin (`scheme://host:port`)
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Current path and query
    #[must_use]
    pub fn location(&self) -> String {
        self.location.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current path, without the query
    #[must_use]
    pub fn path(&self) -> String {
        let location = self.location();
        location.split_once('?').map_or(location.as_str(), |(path, _)| path).to_string()
    }

    /// Replace the current location
    pub fn navigate(&self, location: impl Into<String>) {
        let location = location.into();
        tracing::debug!(window = %self.id, %location, "Navigating");
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = location;
    }

    /// Whether the window has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the window
    ///
    /// # Errors
    ///
    /// [`ChannelError::WindowClosed`] when it was already closed.
    pub fn close(&self) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::WindowClosed(self.id));
        }
        self.focused.store(false, Ordering::SeqCst);
        tracing::debug!(window = %self.id, "Window closed");
        Ok(())
    }

    /// Bring the window to the front
    pub fn focus(&self) {
        if !self.is_closed() {
            self.focused.store(true, Ordering::SeqCst);
        }
    }

    /// Whether the window has focus
    #[must_use]
    pub fn has_focus(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    /// The window that opened this one, while it is still open
    #[must_use]
    pub fn opener(&self) -> Option<Arc<Self>> {
        self.opener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|opener| !opener.is_closed())
    }

    /// Forget the opener reference
    pub fn detach_opener(&self) {
        *self.opener.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Deliver `envelope` to this window's message listeners
    ///
    /// A post nobody is listening for is not an error.
    ///
    /// # Errors
    ///
    /// [`ChannelError::WindowClosed`] when the window is closed.
    pub fn post(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::WindowClosed(self.id));
        }
        let _ = self.inbox.send(envelope);
        Ok(())
    }

    /// Listen for posted messages
    #[must_use]
    pub fn messages(&self) -> broadcast::Receiver<Envelope> {
        self.inbox.subscribe()
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("location", &self.location())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// One origin: its shared durable store and broadcast topics
#[derive(Debug, Clone)]
pub struct Site {
    origin: String,
    store: Arc<DurableStore>,
    hub: Arc<BroadcastHub>,
}

impl Site {
    /// A site with empty storage and no subscribers
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            store: Arc::new(DurableStore::new()),
            hub: Arc::new(BroadcastHub::new()),
        }
    }

    /// Origin
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Open a top-level window of this site
    #[must_use]
    pub fn window(&self, location: impl Into<String>) -> Arc<Window> {
        Window::new(self.origin.clone(), location)
    }

    /// Shared durable store
    #[must_use]
    pub const fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    /// Shared broadcast topics
    #[must_use]
    pub const fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}
