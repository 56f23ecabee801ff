//! Transfer configuration record.
//!
//! [`TransferParams`] is a plain value: setters store what they are given and
//! the engine decides at copy time whether a combination is acceptable.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default copy timeout.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default checksum algorithm when validation is enabled without one.
pub const DEFAULT_CHECKSUM_ALGORITHM: &str = "sha256";

/// Which endpoints are checksummed around a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumMode {
    /// No validation.
    #[default]
    None,
    /// Validate the source before any byte moves.
    Source,
    /// Validate the destination after the copy.
    Target,
    /// Validate both ends.
    Both,
}

impl ChecksumMode {
    /// Returns true if the source is checked before the copy.
    #[must_use]
    pub fn validates_source(self) -> bool {
        matches!(self, Self::Source | Self::Both)
    }

    /// Returns true if the destination is checked after the copy.
    #[must_use]
    pub fn validates_target(self) -> bool {
        matches!(self, Self::Target | Self::Both)
    }

    /// Returns the stable label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Source => "source",
            Self::Target => "target",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for ChecksumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration read by the engine when a copy is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    timeout: Duration,
    nbstreams: u32,
    tcp_buffer_size: u64,
    src_space_token: Option<String>,
    dst_space_token: Option<String>,
    overwrite: bool,
    strict_copy: bool,
    create_parent: bool,
    checksum_mode: ChecksumMode,
    checksum_algorithm: String,
    checksum_value: Option<String>,
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TRANSFER_TIMEOUT,
            nbstreams: 1,
            tcp_buffer_size: 0,
            src_space_token: None,
            dst_space_token: None,
            overwrite: false,
            strict_copy: false,
            create_parent: false,
            checksum_mode: ChecksumMode::None,
            checksum_algorithm: DEFAULT_CHECKSUM_ALGORITHM.to_string(),
            checksum_value: None,
        }
    }
}

impl TransferParams {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-copy timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Number of parallel streams.
    #[must_use]
    pub fn nbstreams(&self) -> u32 {
        self.nbstreams
    }

    pub fn set_nbstreams(&mut self, nbstreams: u32) {
        self.nbstreams = nbstreams;
    }

    /// TCP buffer size in bytes; zero lets the engine choose.
    #[must_use]
    pub fn tcp_buffer_size(&self) -> u64 {
        self.tcp_buffer_size
    }

    pub fn set_tcp_buffer_size(&mut self, size: u64) {
        self.tcp_buffer_size = size;
    }

    #[must_use]
    pub fn src_space_token(&self) -> Option<&str> {
        self.src_space_token.as_deref()
    }

    /// Sets the source space token; an empty string clears it.
    pub fn set_src_space_token(&mut self, token: impl Into<String>) {
        self.src_space_token = non_empty(token.into());
    }

    #[must_use]
    pub fn dst_space_token(&self) -> Option<&str> {
        self.dst_space_token.as_deref()
    }

    /// Sets the destination space token; an empty string clears it.
    pub fn set_dst_space_token(&mut self, token: impl Into<String>) {
        self.dst_space_token = non_empty(token.into());
    }

    /// Replace an existing destination.
    #[must_use]
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn set_overwrite(&mut self, overwrite: bool) {
        self.overwrite = overwrite;
    }

    /// Skip every check that is not strictly needed to move the bytes.
    #[must_use]
    pub fn strict_copy(&self) -> bool {
        self.strict_copy
    }

    pub fn set_strict_copy(&mut self, strict: bool) {
        self.strict_copy = strict;
    }

    /// Create missing destination parent directories.
    #[must_use]
    pub fn create_parent(&self) -> bool {
        self.create_parent
    }

    pub fn set_create_parent(&mut self, create: bool) {
        self.create_parent = create;
    }

    #[must_use]
    pub fn checksum_mode(&self) -> ChecksumMode {
        self.checksum_mode
    }

    pub fn set_checksum_mode(&mut self, mode: ChecksumMode) {
        self.checksum_mode = mode;
    }

    #[must_use]
    pub fn checksum_algorithm(&self) -> &str {
        &self.checksum_algorithm
    }

    /// Expected checksum, if the caller supplied one.
    #[must_use]
    pub fn checksum_value(&self) -> Option<&str> {
        self.checksum_value.as_deref()
    }

    /// Sets mode, algorithm and expected value together.
    ///
    /// An empty `value` means "no expected value": with [`ChecksumMode::Both`]
    /// the engine then compares source and destination with each other.
    pub fn set_checksum(
        &mut self,
        mode: ChecksumMode,
        algorithm: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.checksum_mode = mode;
        self.checksum_algorithm = algorithm.into();
        self.checksum_value = non_empty(value.into());
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
