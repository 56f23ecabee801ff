//! Client context: engine handles, in-flight operation tracking and cancel.
//!
//! A [`Context`] is the entry point of the library. It owns the staging
//! orchestrator, creates transfer sessions, and tracks every operation started
//! through it so that [`Context::cancel`] can flag them all at once.
//!
//! Cancellation is cooperative. Flagging an operation does not interrupt the
//! engine call; the engine observes the flag at its own checkpoints and fails
//! the operation with `ECANCELED`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::engine::{MockEngine, StagingEngine, TransferEngine};
use crate::staging::StagingOrchestrator;
use crate::transfer::TransferSession;

/// Shared cancellation flag of one operation.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Creates a signal that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Flags the operation. Returns true if it was not already flagged.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }
}

/// Registry of in-flight operations.
#[derive(Debug, Default)]
pub(crate) struct OperationTracker {
    next_id: AtomicU64,
    active: DashMap<u64, (&'static str, CancelSignal)>,
}

impl OperationTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new operation; it stays tracked until the guard drops.
    pub(crate) fn begin(self: &Arc<Self>, kind: &'static str) -> OperationGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let signal = CancelSignal::new();
        self.active.insert(id, (kind, signal.clone()));
        debug!(operation_id = id, kind, "operation started");
        OperationGuard {
            id,
            tracker: Arc::clone(self),
            signal,
        }
    }

    /// Flags every tracked operation, returning how many were newly flagged.
    pub(crate) fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.active.iter() {
            let (kind, signal) = entry.value();
            if signal.cancel() {
                debug!(operation_id = *entry.key(), kind, "operation flagged cancelled");
                cancelled += 1;
            }
        }
        cancelled
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.active.len()
    }
}

/// Keeps an operation registered for as long as it is alive.
#[derive(Debug)]
pub(crate) struct OperationGuard {
    id: u64,
    tracker: Arc<OperationTracker>,
    signal: CancelSignal,
}

impl OperationGuard {
    pub(crate) fn signal(&self) -> &CancelSignal {
        &self.signal
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.tracker.active.remove(&self.id);
    }
}

/// Handle to one instantiation of the client library.
///
/// Cloning is cheap; clones share the engines, the token registry and the
/// operation tracker.
#[derive(Clone)]
pub struct Context {
    staging: Arc<StagingOrchestrator>,
    transfer: Arc<dyn TransferEngine>,
    operations: Arc<OperationTracker>,
    plugins: Vec<String>,
}

impl Context {
    /// Creates a context backed by a single engine implementing both contracts.
    pub fn new<E>(engine: Arc<E>) -> Self
    where
        E: StagingEngine + TransferEngine + 'static,
    {
        let staging: Arc<dyn StagingEngine> = engine.clone();
        let transfer: Arc<dyn TransferEngine> = engine;
        Self::with_engines(staging, transfer)
    }

    /// Creates a context from separate staging and transfer engines.
    #[instrument(level = "debug", skip_all)]
    pub fn with_engines(
        staging: Arc<dyn StagingEngine>,
        transfer: Arc<dyn TransferEngine>,
    ) -> Self {
        let mut plugins = vec![format!("{}-{}", staging.name(), staging.version())];
        let transfer_plugin = format!("{}-{}", transfer.name(), transfer.version());
        if !plugins.contains(&transfer_plugin) {
            plugins.push(transfer_plugin);
        }
        debug!(?plugins, "creating context");

        let operations = Arc::new(OperationTracker::new());
        Self {
            staging: Arc::new(StagingOrchestrator::new(staging, Arc::clone(&operations))),
            transfer,
            operations,
            plugins,
        }
    }

    /// Creates a context backed by a fresh [`MockEngine`].
    #[must_use]
    pub fn mock() -> Self {
        Self::new(Arc::new(MockEngine::new()))
    }

    /// Returns the library version.
    #[must_use]
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Returns `name-version` for every loaded engine plugin.
    #[must_use]
    pub fn plugin_names(&self) -> &[String] {
        &self.plugins
    }

    /// Returns the staging orchestrator.
    #[must_use]
    pub fn staging(&self) -> &StagingOrchestrator {
        &self.staging
    }

    /// Creates a transfer session with default parameters.
    #[must_use]
    pub fn new_transfer_session(&self) -> TransferSession {
        TransferSession::new(Arc::clone(&self.transfer), Arc::clone(&self.operations))
    }

    /// Number of operations currently running through this context.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.operations.in_flight()
    }

    /// Flags every running operation as cancelled and returns how many were
    /// flagged. Operations observe the flag once their engine reaches a
    /// checkpoint.
    pub fn cancel(&self) -> usize {
        let cancelled = self.operations.cancel_all();
        info!(cancelled, "cancel requested");
        cancelled
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("plugins", &self.plugins)
            .field("in_flight", &self.operations.in_flight())
            .finish_non_exhaustive()
    }
}
