//! One configurable copy operation with its own listeners.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{
    CallbackRegistry, EventListener, ListenerHandle, MonitorListener, TransferParams,
};
use crate::context::OperationTracker;
use crate::engine::{CopyRequest, TransferEngine};
use crate::error::EngineFault;

/// Configuration plus registered listeners for copies issued through one
/// engine.
///
/// Created by [`Context::new_transfer_session`](crate::Context::new_transfer_session).
/// Listeners registered on a session are reclaimed when it is closed or
/// dropped. Because registering or removing a listener needs `&mut self`
/// while [`copy_file`](Self::copy_file) borrows the session, the listener set
/// cannot change while a copy runs.
pub struct TransferSession {
    engine: Arc<dyn TransferEngine>,
    operations: Arc<OperationTracker>,
    params: TransferParams,
    callbacks: CallbackRegistry,
    event_handles: Vec<ListenerHandle>,
    monitor_handles: Vec<ListenerHandle>,
}

impl TransferSession {
    pub(crate) fn new(engine: Arc<dyn TransferEngine>, operations: Arc<OperationTracker>) -> Self {
        Self {
            engine,
            operations,
            params: TransferParams::default(),
            callbacks: CallbackRegistry::new(),
            event_handles: Vec::new(),
            monitor_handles: Vec::new(),
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn params(&self) -> &TransferParams {
        &self.params
    }

    /// Mutable access to the configuration read by the next copy.
    pub fn params_mut(&mut self) -> &mut TransferParams {
        &mut self.params
    }

    /// Replaces the whole configuration.
    pub fn set_params(&mut self, params: TransferParams) {
        self.params = params;
    }

    /// Registers a listener that receives every event of later copies.
    pub fn add_event_callback(&mut self, listener: Arc<dyn EventListener>) -> ListenerHandle {
        let handle = self.callbacks.register_event(listener);
        self.event_handles.push(handle);
        handle
    }

    /// Registers a listener that receives every performance marker of later
    /// copies.
    pub fn add_monitor_callback(&mut self, listener: Arc<dyn MonitorListener>) -> ListenerHandle {
        let handle = self.callbacks.register_monitor(listener);
        self.monitor_handles.push(handle);
        handle
    }

    /// Removes one listener of this session. Returns false if the handle was
    /// not registered here.
    pub fn remove_callback(&mut self, handle: ListenerHandle) -> bool {
        self.event_handles.retain(|known| *known != handle);
        self.monitor_handles.retain(|known| *known != handle);
        self.callbacks.release(handle)
    }

    /// Number of listeners registered on this session.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Copies `source` to `destination`, completing only once the engine is
    /// done.
    ///
    /// Events and markers are delivered synchronously to this session's
    /// listeners while the copy runs.
    ///
    /// # Errors
    ///
    /// Returns the engine's single [`EngineFault`] for the whole copy. A
    /// source checksum mismatch detected before the copy carries the domain
    /// `transfer.checksum.source`; a mismatch found afterwards carries
    /// `transfer.checksum.destination` or `transfer.checksum.compare`.
    #[instrument(
        skip(self),
        fields(
            engine = self.engine.name(),
            events = self.event_handles.len(),
            monitors = self.monitor_handles.len(),
        )
    )]
    pub async fn copy_file(&self, source: &str, destination: &str) -> Result<(), EngineFault> {
        let operation = self.operations.begin("copy_file");
        let request = CopyRequest {
            source,
            destination,
            params: &self.params,
            event_handles: &self.event_handles,
            monitor_handles: &self.monitor_handles,
            cancel: operation.signal(),
        };
        debug!(
            checksum_mode = %self.params.checksum_mode(),
            overwrite = self.params.overwrite(),
            "issuing copy"
        );

        match self.engine.copy(&request, &self.callbacks).await {
            Ok(()) => {
                info!("copy completed");
                Ok(())
            }
            Err(fault) => {
                warn!(%fault, "copy failed");
                Err(fault)
            }
        }
    }

    /// Closes the session, releasing its listeners.
    pub fn close(self) {
        drop(self);
    }
}

/// The clone gets an independent copy of the configuration and no listeners.
impl Clone for TransferSession {
    fn clone(&self) -> Self {
        let mut session = Self::new(Arc::clone(&self.engine), Arc::clone(&self.operations));
        session.params = self.params.clone();
        session
    }
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        let released = self.callbacks.release_all();
        if released > 0 {
            debug!(released, "released session listeners");
        }
    }
}

impl fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("engine", &self.engine.name())
            .field("params", &self.params)
            .field("event_handles", &self.event_handles)
            .field("monitor_handles", &self.monitor_handles)
            .finish()
    }
}
