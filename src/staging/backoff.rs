//! Caller-side backoff for bring-online polling loops.
//!
//! The orchestrator never sleeps or retries on its own. Callers that poll a
//! batch until every URL settles use [`PollBackoff`] to space their
//! `poll_online` calls: the delay starts at [`DEFAULT_INITIAL_DELAY`] and
//! doubles after every round that still has pending URLs, capped at
//! [`DEFAULT_MAX_DELAY`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gridstage_core::PollBackoff;
//!
//! let mut backoff = PollBackoff::new(Duration::from_secs(2), Duration::from_secs(10));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(2));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(4));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(8));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(10));
//! ```

use std::time::Duration;

use tracing::debug;

/// Default delay before the first poll.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Default ceiling for the poll delay (30 minutes).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30 * 60);

/// Doubling delay sequence for polling pending staging requests.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    /// Delay handed out by the first call to `next_delay`.
    initial: Duration,
    /// Upper bound for any delay.
    ceiling: Duration,
    /// Delay the next call will return.
    current: Duration,
    /// Number of delays handed out so far.
    rounds: u32,
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl PollBackoff {
    /// Creates a backoff sequence.
    ///
    /// A zero `initial` delay is raised to one millisecond so the sequence
    /// can grow; a `ceiling` below `initial` is raised to `initial`.
    #[must_use]
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let ceiling = ceiling.max(initial);
        Self {
            initial,
            ceiling,
            current: initial,
            rounds: 0,
        }
    }

    /// Returns the configured initial delay.
    #[must_use]
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Number of delays handed out since creation or the last reset.
    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Returns the delay to wait before the next poll and doubles the
    /// following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.rounds += 1;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        debug!(
            round = self.rounds,
            delay_ms = delay.as_millis(),
            "next poll delay"
        );
        delay
    }

    /// Restarts the sequence from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.rounds = 0;
    }
}
