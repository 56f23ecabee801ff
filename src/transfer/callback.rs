//! Handle-indexed listener table bridging engine callbacks to typed listeners.
//!
//! A transfer engine can only carry a small integer back through its progress
//! callbacks. The [`CallbackRegistry`] maps those integers
//! ([`ListenerHandle`]s) to the caller's listener objects and invokes the typed
//! handler synchronously, on whatever task or thread the engine emits from.
//! Listener objects never cross the engine boundary.
//!
//! # Handles
//!
//! Handles come from one process-wide monotonic counter, so a handle is never
//! handed out twice. Each session owns its own registry and releases its
//! entries when closed. A late callback for a released handle finds nothing
//! and is dropped, so it can never reach a newer listener.
//!
//! # Concurrency
//!
//! Registration and dispatch may run concurrently. Dispatch clones the
//! listener out of the table before invoking it, so a slow listener never
//! holds the table lock; it only slows the engine that is waiting on it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{Event, Marker};
use crate::engine::CallbackSink;

/// Source of every handle in the process.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Receives transfer events.
pub trait EventListener: Send + Sync {
    /// Called once per event, in emission order.
    fn notify_event(&self, event: &Event);
}

/// Receives transfer performance markers.
pub trait MonitorListener: Send + Sync {
    /// Called once per marker, in emission order.
    fn notify_performance_marker(&self, marker: &Marker);
}

impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn notify_event(&self, event: &Event) {
        self(event);
    }
}

impl<F> MonitorListener for F
where
    F: Fn(&Marker) + Send + Sync,
{
    fn notify_performance_marker(&self, marker: &Marker) {
        self(marker);
    }
}

/// Integer key of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw integer carried across the engine boundary.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
enum Listener {
    Event(Arc<dyn EventListener>),
    Monitor(Arc<dyn MonitorListener>),
}

impl Listener {
    fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Monitor(_) => "monitor",
        }
    }
}

/// Table of listeners keyed by [`ListenerHandle`].
#[derive(Default)]
pub struct CallbackRegistry {
    listeners: DashMap<ListenerHandle, Listener>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event listener and returns its handle.
    pub fn register_event(&self, listener: Arc<dyn EventListener>) -> ListenerHandle {
        self.insert(Listener::Event(listener))
    }

    /// Registers a monitor listener and returns its handle.
    pub fn register_monitor(&self, listener: Arc<dyn MonitorListener>) -> ListenerHandle {
        self.insert(Listener::Monitor(listener))
    }

    fn insert(&self, listener: Listener) -> ListenerHandle {
        let handle = ListenerHandle::next();
        debug!(%handle, kind = listener.kind(), "registered listener");
        self.listeners.insert(handle, listener);
        handle
    }

    /// Invokes the event listener behind `handle`.
    ///
    /// Returns false, without invoking anything, if the handle is unknown or
    /// belongs to a monitor listener.
    pub fn dispatch_event(&self, handle: ListenerHandle, event: &Event) -> bool {
        match self.lookup(handle) {
            Some(Listener::Event(listener)) => {
                trace!(%handle, stage = %event.stage, "dispatching event");
                listener.notify_event(event);
                true
            }
            Some(Listener::Monitor(_)) => {
                warn!(%handle, "event dispatched to a monitor handle, dropped");
                false
            }
            None => {
                warn!(%handle, stage = %event.stage, "event for unknown handle dropped");
                false
            }
        }
    }

    /// Invokes the monitor listener behind `handle`.
    ///
    /// Returns false, without invoking anything, if the handle is unknown or
    /// belongs to an event listener.
    pub fn dispatch_marker(&self, handle: ListenerHandle, marker: &Marker) -> bool {
        match self.lookup(handle) {
            Some(Listener::Monitor(listener)) => {
                trace!(%handle, bytes = marker.bytes_transferred, "dispatching marker");
                listener.notify_performance_marker(marker);
                true
            }
            Some(Listener::Event(_)) => {
                warn!(%handle, "marker dispatched to an event handle, dropped");
                false
            }
            None => {
                warn!(%handle, "marker for unknown handle dropped");
                false
            }
        }
    }

    // Clone out so the shard lock is released before the listener runs.
    fn lookup(&self, handle: ListenerHandle) -> Option<Listener> {
        self.listeners.get(&handle).map(|entry| entry.value().clone())
    }

    /// Removes one listener. Returns false if the handle was not registered.
    pub fn release(&self, handle: ListenerHandle) -> bool {
        let removed = self.listeners.remove(&handle).is_some();
        if removed {
            debug!(%handle, "released listener");
        }
        removed
    }

    /// Removes every listener, returning how many were registered.
    pub fn release_all(&self) -> usize {
        let count = self.listeners.len();
        self.listeners.clear();
        count
    }

    /// Returns true if `handle` is registered here.
    #[must_use]
    pub fn contains(&self, handle: ListenerHandle) -> bool {
        self.listeners.contains_key(&handle)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl CallbackSink for CallbackRegistry {
    fn emit_event(&self, handle: ListenerHandle, event: &Event) {
        self.dispatch_event(handle, event);
    }

    fn emit_marker(&self, handle: ListenerHandle, marker: &Marker) {
        self.dispatch_marker(handle, marker);
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}
