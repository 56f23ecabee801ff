//! Notification records delivered to transfer listeners.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Which endpoint of a copy an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSide {
    /// The source endpoint.
    Source,
    /// The destination endpoint.
    Destination,
    /// The transfer as a whole.
    None,
}

impl EventSide {
    /// Returns the stable label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
            Self::None => "none",
        }
    }
}

impl fmt::Display for EventSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a transfer, such as protocol negotiation or a checksum check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Endpoint the event refers to.
    pub side: EventSide,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Transfer stage, e.g. `TRANSFER_ENTER`.
    pub stage: String,
    /// Component that emitted the event.
    pub domain: String,
    /// Free-form detail.
    pub description: String,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn now(
        side: EventSide,
        stage: impl Into<String>,
        domain: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            side,
            timestamp: unix_millis(),
            stage: stage.into(),
            domain: domain.into(),
            description: description.into(),
        }
    }
}

/// Periodic performance sample of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Average throughput since the start, in bytes per second.
    pub average_throughput: u64,
    /// Throughput over the last interval, in bytes per second.
    pub instant_throughput: u64,
    /// Bytes transferred so far.
    pub bytes_transferred: u64,
    /// Time since the transfer started.
    pub elapsed_time: Duration,
}

#[allow(clippy::cast_possible_truncation)]
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}
