//! Copy sessions and the listener bridge used during a copy.
//!
//! A [`TransferSession`] holds a [`TransferParams`] record and the listeners
//! registered on it. [`TransferSession::copy_file`] hands the engine the
//! parameters and the listener handles; the engine reports progress by
//! handle and the session's [`CallbackRegistry`] routes each [`Event`] or
//! [`Marker`] to the matching listener.

mod callback;
mod event;
mod params;
mod session;

pub use callback::{CallbackRegistry, EventListener, ListenerHandle, MonitorListener};
pub use event::{Event, EventSide, Marker};
pub use params::{
    ChecksumMode, DEFAULT_CHECKSUM_ALGORITHM, DEFAULT_TRANSFER_TIMEOUT, TransferParams,
};
pub use session::TransferSession;
