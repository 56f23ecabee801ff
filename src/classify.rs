//! Outcome classification for engine statuses.
//!
//! Every status an engine reports is mapped onto one of three classes:
//!
//! | Engine status | Class | Meaning |
//! |---------------|-------|---------|
//! | no fault | [`Classification::Success`] | operation done |
//! | `EAGAIN` | [`Classification::Pending`] | queued or in progress, poll again |
//! | any other code | [`Classification::Fatal`] | terminal failure |
//!
//! The retry indicator is never treated as a failure. Deciding *when* to poll
//! again is left to the caller.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::EngineFault;

/// Three-way classification of an engine status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The operation completed.
    Success,
    /// The engine asked to try again later.
    Pending,
    /// Terminal failure, propagated as-is.
    Fatal(EngineFault),
}

/// Per-URL result of a batch staging call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    /// The file is online.
    Ready,
    /// Still queued or being staged.
    Pending,
    /// Staging failed for this URL.
    Failed(EngineFault),
}

impl Outcome {
    /// Returns true for `Ready` and `Failed`, the outcomes polling cannot change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if the file is online.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns the fault for failed outcomes.
    #[must_use]
    pub fn fault(&self) -> Option<&EngineFault> {
        match self {
            Self::Failed(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Classification> for Outcome {
    fn from(class: Classification) -> Self {
        match class {
            Classification::Success => Self::Ready,
            Classification::Pending => Self::Pending,
            Classification::Fatal(fault) => Self::Failed(fault),
        }
    }
}

/// Classifies one engine status.
///
/// `None` means the engine reported no error for the item.
#[instrument(level = "trace", skip_all)]
pub fn classify(status: Option<&EngineFault>) -> Classification {
    match status {
        None => Classification::Success,
        Some(fault) if fault.is_again() => Classification::Pending,
        Some(fault) => Classification::Fatal(fault.clone()),
    }
}

/// Classifies an owned engine status without cloning the fault.
pub fn classify_owned(status: Option<EngineFault>) -> Classification {
    match status {
        None => Classification::Success,
        Some(fault) if fault.is_again() => Classification::Pending,
        Some(fault) => Classification::Fatal(fault),
    }
}
