//! Boundary contracts with the underlying storage and transfer engine.
//!
//! The library never talks to storage protocols itself. Staging requests go
//! through a [`StagingEngine`], copies through a [`TransferEngine`]. Both are
//! object-safe async traits so a [`Context`](crate::Context) can hold any
//! implementation behind an `Arc<dyn ...>`.
//!
//! # Staging replies
//!
//! A batch staging call answers with one status slot per submitted URL. A
//! [`ReplyState::Queued`] reply means the engine accepted the whole batch and
//! nothing has settled yet. The statuses are ignored and every URL counts as
//! pending. A [`ReplyState::Settled`] reply carries a meaningful status for each
//! URL: `None` for success, or a fault (possibly `EAGAIN`).
//!
//! # Transfer callbacks
//!
//! A copy request carries the integer handles of the listeners registered on
//! the session, never the listeners themselves. The engine reports progress by
//! calling back into a [`CallbackSink`] with one of those handles, on whatever
//! task or thread it is running on.

pub mod mock;

pub use mock::MockEngine;

use async_trait::async_trait;

use crate::context::CancelSignal;
use crate::error::EngineFault;
use crate::transfer::{Event, ListenerHandle, Marker, TransferParams};

/// Size of the fixed buffer an engine writes a staging token into.
pub const TOKEN_BUFFER_LEN: usize = 256;

/// Fixed-size, NUL-terminated buffer receiving a staging token.
#[derive(Clone)]
pub struct TokenBuffer {
    bytes: [u8; TOKEN_BUFFER_LEN],
}

impl TokenBuffer {
    /// Creates a zeroed buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: [0; TOKEN_BUFFER_LEN],
        }
    }

    /// Writes `token`, truncating it on a character boundary so a
    /// terminating NUL always fits.
    pub fn write(&mut self, token: &str) {
        self.bytes = [0; TOKEN_BUFFER_LEN];
        let mut len = token.len().min(TOKEN_BUFFER_LEN - 1);
        while !token.is_char_boundary(len) {
            len -= 1;
        }
        self.bytes[..len].copy_from_slice(&token.as_bytes()[..len]);
    }

    /// Returns the raw buffer contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the bytes up to (not including) the first NUL.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TOKEN_BUFFER_LEN);
        &self.bytes[..end]
    }
}

impl Default for TokenBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBuffer")
            .field("contents", &String::from_utf8_lossy(self.contents()))
            .finish()
    }
}

/// Whether a staging reply carries settled per-URL statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    /// Request accepted, nothing settled yet.
    Queued,
    /// Each status slot is meaningful.
    Settled,
}

/// Engine answer to a bring-online or poll call.
#[derive(Debug, Clone)]
pub struct StagingReply {
    /// Whether `statuses` should be inspected.
    pub state: ReplyState,
    /// One slot per URL, in submission order.
    pub statuses: Vec<Option<EngineFault>>,
}

impl StagingReply {
    /// A reply meaning every URL is queued.
    #[must_use]
    pub fn queued(count: usize) -> Self {
        Self {
            state: ReplyState::Queued,
            statuses: vec![None; count],
        }
    }

    /// A reply with per-URL statuses.
    #[must_use]
    pub fn settled(statuses: Vec<Option<EngineFault>>) -> Self {
        Self {
            state: ReplyState::Settled,
            statuses,
        }
    }
}

/// Parameters of a bring-online submission.
#[derive(Debug)]
pub struct BringOnlineRequest<'a> {
    /// URLs to stage, in caller order.
    pub urls: &'a [String],
    /// Requested pin lifetime in seconds.
    pub pin_lifetime_secs: u64,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Return as soon as the request is accepted.
    pub asynchronous: bool,
    /// Cancellation flag of the owning operation.
    pub cancel: &'a CancelSignal,
}

/// Parameters of a poll, release or abort call.
#[derive(Debug)]
pub struct TokenRequest<'a> {
    /// URLs the call applies to, in caller order.
    pub urls: &'a [String],
    /// Token returned by the bring-online call.
    pub token: &'a str,
    /// Cancellation flag of the owning operation.
    pub cancel: &'a CancelSignal,
}

/// Parameters of a copy.
#[derive(Debug)]
pub struct CopyRequest<'a> {
    /// Source URL.
    pub source: &'a str,
    /// Destination URL.
    pub destination: &'a str,
    /// Snapshot of the session configuration.
    pub params: &'a TransferParams,
    /// Handles to notify with [`Event`]s.
    pub event_handles: &'a [ListenerHandle],
    /// Handles to notify with [`Marker`]s.
    pub monitor_handles: &'a [ListenerHandle],
    /// Cancellation flag of the owning operation.
    pub cancel: &'a CancelSignal,
}

/// Callback entry points an engine invokes during a copy.
pub trait CallbackSink: Send + Sync {
    /// Delivers an event to the listener behind `handle`.
    fn emit_event(&self, handle: ListenerHandle, event: &Event);

    /// Delivers a performance marker to the listener behind `handle`.
    fn emit_marker(&self, handle: ListenerHandle, marker: &Marker);
}

/// Identification shared by both engine contracts.
pub trait Engine: Send + Sync {
    /// Short plugin name, e.g. `"mock"`.
    fn name(&self) -> &str;

    /// Plugin version string.
    fn version(&self) -> &str;
}

/// Staging (bring-online) contract.
#[async_trait]
pub trait StagingEngine: Engine {
    /// Submits the URLs and writes the shared token into `token`.
    ///
    /// An `Err` means the request was not accepted at all.
    async fn bring_online(
        &self,
        request: &BringOnlineRequest<'_>,
        token: &mut TokenBuffer,
    ) -> Result<StagingReply, EngineFault>;

    /// Re-queries status without re-submitting.
    async fn poll(&self, request: &TokenRequest<'_>) -> Result<StagingReply, EngineFault>;

    /// Releases pinned copies. One status per URL.
    async fn release(
        &self,
        request: &TokenRequest<'_>,
    ) -> Result<Vec<Option<EngineFault>>, EngineFault>;

    /// Cancels in-flight staging. One status per URL.
    async fn abort(
        &self,
        request: &TokenRequest<'_>,
    ) -> Result<Vec<Option<EngineFault>>, EngineFault>;
}

/// Copy contract.
#[async_trait]
pub trait TransferEngine: Engine {
    /// Runs one copy to completion, reporting progress through `sink`.
    async fn copy(&self, request: &CopyRequest<'_>, sink: &dyn CallbackSink)
    -> Result<(), EngineFault>;
}
