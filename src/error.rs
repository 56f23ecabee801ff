//! Error types shared by the staging and transfer subsystems.
//!
//! [`EngineFault`] is the error record reported by the underlying storage or
//! transfer engine: an errno-style code, the domain that raised it (usually a
//! plugin or transfer phase) and a human-readable message.
//!
//! [`StagingError`] is the call-level error of the staging orchestrator. Most
//! variants mean the batch request could not be submitted at all; per-URL
//! failures are never reported through it by the batch operations, they live in
//! the outcome vector instead.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error record produced by an engine for one URL or one whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFault {
    /// errno-style status code (`libc::EAGAIN`, `libc::ENOENT`, ...).
    pub code: i32,
    /// Origin of the error, for instance the plugin or transfer phase.
    pub domain: String,
    /// Human-readable description.
    pub message: String,
}

impl EngineFault {
    /// Creates a new fault record.
    pub fn new(code: i32, domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Creates the retry indicator ("try again") used for queued requests.
    pub fn again(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(libc::EAGAIN, domain, message)
    }

    /// Creates a cancellation fault.
    pub fn cancelled(domain: impl Into<String>) -> Self {
        Self::new(libc::ECANCELED, domain, "operation cancelled")
    }

    /// Returns true if this fault is the retry indicator.
    #[must_use]
    pub fn is_again(&self) -> bool {
        self.code == libc::EAGAIN
    }
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (code {})", self.domain, self.message, self.code)
    }
}

impl std::error::Error for EngineFault {}

/// Call-level errors of the staging orchestrator.
#[derive(Debug, Error)]
pub enum StagingError {
    /// A batch call was issued without any URL.
    #[error("request rejected: URL list is empty")]
    EmptyUrlList,

    /// Pin lifetime or timeout was not a positive number of seconds.
    #[error("request rejected: {field} must be at least one second, got {value:?}")]
    InvalidDuration {
        /// Name of the offending parameter.
        field: &'static str,
        /// The value that was supplied.
        value: Duration,
    },

    /// The token supplied to poll/release/abort is not usable.
    #[error("request rejected: malformed staging token ({reason})")]
    MalformedToken {
        /// Why the token was refused.
        reason: &'static str,
    },

    /// The engine refused the whole request.
    #[error("request rejected by engine: {0}")]
    Rejected(#[source] EngineFault),

    /// The engine answered with a status vector of the wrong length.
    #[error("engine reply carries {actual} statuses for {expected} URLs")]
    ReplyMismatch {
        /// Number of URLs submitted.
        expected: usize,
        /// Number of statuses received.
        actual: usize,
    },

    /// The single URL of a single-item operation failed.
    #[error("staging failed: {0}")]
    Failed(#[source] EngineFault),
}

impl StagingError {
    /// Creates an invalid-duration error.
    pub fn invalid_duration(field: &'static str, value: Duration) -> Self {
        Self::InvalidDuration { field, value }
    }

    /// Creates a malformed-token error.
    pub fn malformed_token(reason: &'static str) -> Self {
        Self::MalformedToken { reason }
    }

    /// Returns true when the request itself could not be submitted, as opposed
    /// to a single item reaching a fatal outcome.
    #[must_use]
    pub fn is_request_rejected(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Returns the engine fault carried by this error, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&EngineFault> {
        match self {
            Self::Rejected(fault) | Self::Failed(fault) => Some(fault),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_fault_display_contains_all_parts() {
        let fault = EngineFault::new(libc::ENOENT, "mock", "no such file");
        let msg = fault.to_string();
        assert!(msg.contains("mock"), "Expected domain in: {msg}");
        assert!(msg.contains("no such file"), "Expected message in: {msg}");
        assert!(msg.contains(&libc::ENOENT.to_string()), "Expected code in: {msg}");
    }

    #[test]
    fn test_engine_fault_again_is_retry_indicator() {
        assert!(EngineFault::again("mock", "queued").is_again());
        assert!(!EngineFault::new(2, "mock", "gone").is_again());
    }

    #[test]
    fn test_engine_fault_cancelled_code() {
        let fault = EngineFault::cancelled("context");
        assert_eq!(fault.code, libc::ECANCELED);
        assert_eq!(fault.domain, "context");
    }

    #[test]
    fn test_staging_error_request_rejected_classification() {
        assert!(StagingError::EmptyUrlList.is_request_rejected());
        assert!(StagingError::malformed_token("empty").is_request_rejected());
        assert!(
            StagingError::Rejected(EngineFault::new(libc::EINVAL, "mock", "bad"))
                .is_request_rejected()
        );
        assert!(
            !StagingError::Failed(EngineFault::new(2, "mock", "gone")).is_request_rejected()
        );
    }

    #[test]
    fn test_staging_error_invalid_duration_display() {
        let error = StagingError::invalid_duration("pin_lifetime", Duration::from_millis(10));
        let msg = error.to_string();
        assert!(msg.contains("pin_lifetime"), "Expected field in: {msg}");
        assert!(msg.contains("request rejected"), "Expected prefix in: {msg}");
    }

    #[test]
    fn test_staging_error_fault_accessor() {
        let fault = EngineFault::new(2, "mock", "gone");
        let error = StagingError::Failed(fault.clone());
        assert_eq!(error.fault(), Some(&fault));
        assert!(StagingError::EmptyUrlList.fault().is_none());
    }
}
