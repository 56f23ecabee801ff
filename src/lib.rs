//! Gridstage Core Library
//!
//! Client library for grid storage: bring files online (staging) and run
//! third-party copies, on top of a pluggable storage/transfer engine.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`context`] - Entry point: engine handles, operation tracking, cancel
//! - [`staging`] - Bring-online orchestration, tokens, caller-side backoff
//! - [`classify`] - Three-way classification of engine statuses
//! - [`transfer`] - Copy sessions, parameters and the listener bridge
//! - [`engine`] - Engine contracts and the in-memory `mock://` engine
//! - [`error`] - Engine fault record and call-level staging errors

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod context;
pub mod engine;
pub mod error;
pub mod staging;
pub mod transfer;

// Re-export commonly used types
pub use classify::{Classification, Outcome, classify};
pub use context::{CancelSignal, Context};
pub use engine::{MockEngine, StagingEngine, TransferEngine};
pub use error::{EngineFault, StagingError};
pub use staging::{
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, OutcomeSummary, PollBackoff, StagingOrchestrator,
    StagingToken, TokenRegistry,
};
pub use transfer::{
    CallbackRegistry, ChecksumMode, Event, EventListener, EventSide, ListenerHandle, Marker,
    MonitorListener, TransferParams, TransferSession,
};
