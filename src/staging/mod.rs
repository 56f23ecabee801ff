//! Bring-online (staging) lifecycle orchestration.
//!
//! The [`StagingOrchestrator`] submits, polls, releases and aborts
//! bring-online requests for one or many URLs. Every batch call returns one
//! [`Outcome`] per input URL, in input order, whatever mix of successes and
//! failures the engine reports. The whole call fails only when the request
//! could not be submitted at all (empty input, bad durations, malformed token,
//! engine refusal).
//!
//! Nothing here runs in the background. A caller that wants to wait for
//! staging submits with `asynchronous = true`, then calls
//! [`StagingOrchestrator::poll_online`] at intervals of its choosing (see
//! [`PollBackoff`]) until every outcome is terminal.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gridstage_core::{Context, Outcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = Context::mock();
//! let urls = vec!["mock://host/a?staging_time=1".to_string()];
//! let staging = context.staging();
//!
//! let (token, mut outcomes) = staging
//!     .bring_online(&urls, Duration::from_secs(600), Duration::from_secs(300), true)
//!     .await?;
//! while outcomes.iter().any(|o| *o == Outcome::Pending) {
//!     tokio::time::sleep(Duration::from_secs(1)).await;
//!     outcomes = staging.poll_online(&urls, &token).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod token;

pub use backoff::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, PollBackoff};
pub use token::{StagingToken, TokenRegistry};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::classify::{Outcome, classify_owned};
use crate::context::OperationTracker;
use crate::engine::{
    BringOnlineRequest, ReplyState, StagingEngine, StagingReply, TokenBuffer, TokenRequest,
};
use crate::error::{EngineFault, StagingError};

/// Counts of each outcome kind in a batch result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    /// URLs online (or released/aborted successfully).
    pub ready: usize,
    /// URLs still queued.
    pub pending: usize,
    /// URLs that failed.
    pub failed: usize,
}

impl OutcomeSummary {
    /// Tallies a batch result.
    #[must_use]
    pub fn of(outcomes: &[Outcome]) -> Self {
        outcomes
            .iter()
            .fold(Self::default(), |mut summary, outcome| {
                match outcome {
                    Outcome::Ready => summary.ready += 1,
                    Outcome::Pending => summary.pending += 1,
                    Outcome::Failed(_) => summary.failed += 1,
                }
                summary
            })
    }

    /// Total number of outcomes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.ready + self.pending + self.failed
    }

    /// Returns true when no outcome is pending.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }
}

/// Drives bring-online, poll, release and abort calls against a staging
/// engine.
pub struct StagingOrchestrator {
    engine: Arc<dyn StagingEngine>,
    operations: Arc<OperationTracker>,
    tokens: TokenRegistry,
}

impl StagingOrchestrator {
    pub(crate) fn new(engine: Arc<dyn StagingEngine>, operations: Arc<OperationTracker>) -> Self {
        Self {
            engine,
            operations,
            tokens: TokenRegistry::new(),
        }
    }

    /// Returns the token correlation record.
    #[must_use]
    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Requests that every URL be brought online under one shared token.
    ///
    /// With `asynchronous = false` the call waits until every URL settles or
    /// `timeout` elapses. With `asynchronous = true` it returns once the
    /// request is accepted, and URLs not yet online are reported
    /// [`Outcome::Pending`].
    ///
    /// # Errors
    ///
    /// Returns a request-rejected [`StagingError`] if `urls` is empty, either
    /// duration is under one second, or the engine refuses the submission.
    /// Per-URL failures are reported in the outcome vector instead.
    #[instrument(skip(self, urls), fields(url_count = urls.len()))]
    pub async fn bring_online(
        &self,
        urls: &[String],
        pin_lifetime: Duration,
        timeout: Duration,
        asynchronous: bool,
    ) -> Result<(StagingToken, Vec<Outcome>), StagingError> {
        if urls.is_empty() {
            return Err(StagingError::EmptyUrlList);
        }
        let pin_lifetime_secs = whole_seconds("pin_lifetime", pin_lifetime)?;
        let timeout_secs = whole_seconds("timeout", timeout)?;

        let operation = self.operations.begin("bring_online");
        let request = BringOnlineRequest {
            urls,
            pin_lifetime_secs,
            timeout_secs,
            asynchronous,
            cancel: operation.signal(),
        };

        let mut buffer = TokenBuffer::new();
        let reply = self
            .engine
            .bring_online(&request, &mut buffer)
            .await
            .map_err(|fault| reject("bring_online", fault))?;

        let token = StagingToken::from_buffer(&buffer);
        let outcomes = collect_outcomes(urls, reply)?;
        self.tokens.record(&token, urls);

        log_summary("bring_online", &token, &outcomes);
        Ok((token, outcomes))
    }

    /// Re-queries the staging status of `urls` under `token` without
    /// re-submitting them.
    ///
    /// # Errors
    ///
    /// Returns a request-rejected [`StagingError`] if `urls` is empty, the
    /// token is empty, or the engine refuses the call.
    #[instrument(skip(self, urls), fields(url_count = urls.len(), %token))]
    pub async fn poll_online(
        &self,
        urls: &[String],
        token: &StagingToken,
    ) -> Result<Vec<Outcome>, StagingError> {
        validate_token_call(urls, token)?;
        self.tokens.check_correlation(token, urls);

        let operation = self.operations.begin("poll_online");
        let request = TokenRequest {
            urls,
            token: token.as_str(),
            cancel: operation.signal(),
        };
        let reply = self
            .engine
            .poll(&request)
            .await
            .map_err(|fault| reject("poll_online", fault))?;

        let outcomes = collect_outcomes(urls, reply)?;
        log_summary("poll_online", token, &outcomes);
        Ok(outcomes)
    }

    /// Tells the storage system the pinned copies of `urls` are no longer
    /// needed.
    ///
    /// Best-effort: a failure for one URL does not stop the others. A
    /// successful release is reported as [`Outcome::Ready`].
    ///
    /// # Errors
    ///
    /// Returns a request-rejected [`StagingError`] if the call could not be
    /// submitted.
    #[instrument(skip(self, urls), fields(url_count = urls.len(), %token))]
    pub async fn release_online(
        &self,
        urls: &[String],
        token: &StagingToken,
    ) -> Result<Vec<Outcome>, StagingError> {
        validate_token_call(urls, token)?;
        self.tokens.check_correlation(token, urls);

        let operation = self.operations.begin("release_online");
        let request = TokenRequest {
            urls,
            token: token.as_str(),
            cancel: operation.signal(),
        };
        let statuses = self
            .engine
            .release(&request)
            .await
            .map_err(|fault| reject("release_online", fault))?;

        let outcomes = collect_outcomes(urls, StagingReply::settled(statuses))?;
        self.forget_released(token, urls, &outcomes);
        log_summary("release_online", token, &outcomes);
        Ok(outcomes)
    }

    /// Cancels in-flight staging of `urls` under `token`.
    ///
    /// Same best-effort, per-URL semantics as [`Self::release_online`].
    ///
    /// # Errors
    ///
    /// Returns a request-rejected [`StagingError`] if the call could not be
    /// submitted.
    #[instrument(skip(self, urls), fields(url_count = urls.len(), %token))]
    pub async fn abort(
        &self,
        urls: &[String],
        token: &StagingToken,
    ) -> Result<Vec<Outcome>, StagingError> {
        validate_token_call(urls, token)?;
        self.tokens.check_correlation(token, urls);

        let operation = self.operations.begin("abort");
        let request = TokenRequest {
            urls,
            token: token.as_str(),
            cancel: operation.signal(),
        };
        let statuses = self
            .engine
            .abort(&request)
            .await
            .map_err(|fault| reject("abort", fault))?;

        let outcomes = collect_outcomes(urls, StagingReply::settled(statuses))?;
        self.forget_released(token, urls, &outcomes);
        log_summary("abort", token, &outcomes);
        Ok(outcomes)
    }

    /// Single-URL form of [`Self::bring_online`].
    ///
    /// Returns the token with [`Outcome::Ready`] or [`Outcome::Pending`].
    ///
    /// # Errors
    ///
    /// A fatal outcome for the URL is returned as [`StagingError::Failed`];
    /// request rejections as for the batch call.
    pub async fn bring_online_file(
        &self,
        url: &str,
        pin_lifetime: Duration,
        timeout: Duration,
        asynchronous: bool,
    ) -> Result<(StagingToken, Outcome), StagingError> {
        let urls = [url.to_owned()];
        let (token, outcomes) = self
            .bring_online(&urls, pin_lifetime, timeout, asynchronous)
            .await?;
        Ok((token, single(outcomes)?))
    }

    /// Single-URL form of [`Self::poll_online`].
    ///
    /// # Errors
    ///
    /// A fatal outcome is returned as [`StagingError::Failed`].
    pub async fn poll_file(
        &self,
        url: &str,
        token: &StagingToken,
    ) -> Result<Outcome, StagingError> {
        let urls = [url.to_owned()];
        single(self.poll_online(&urls, token).await?)
    }

    /// Single-URL form of [`Self::release_online`].
    ///
    /// # Errors
    ///
    /// A failed release is returned as [`StagingError::Failed`].
    pub async fn release_file(&self, url: &str, token: &StagingToken) -> Result<(), StagingError> {
        let urls = [url.to_owned()];
        single(self.release_online(&urls, token).await?).map(|_| ())
    }

    fn forget_released(&self, token: &StagingToken, urls: &[String], outcomes: &[Outcome]) {
        let done: Vec<String> = urls
            .iter()
            .zip(outcomes)
            .filter(|(_, outcome)| outcome.is_ready())
            .map(|(url, _)| url.clone())
            .collect();
        self.tokens.forget(token, &done);
    }
}

impl std::fmt::Debug for StagingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingOrchestrator")
            .field("engine", &self.engine.name())
            .field("tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

/// Converts a duration into whole seconds, rounding up, refusing anything
/// under one second.
fn whole_seconds(field: &'static str, value: Duration) -> Result<u64, StagingError> {
    if value < Duration::from_secs(1) {
        return Err(StagingError::invalid_duration(field, value));
    }
    Ok(value
        .as_secs()
        .saturating_add(u64::from(value.subsec_nanos() > 0)))
}

fn validate_token_call(urls: &[String], token: &StagingToken) -> Result<(), StagingError> {
    if urls.is_empty() {
        return Err(StagingError::EmptyUrlList);
    }
    if token.is_empty() {
        return Err(StagingError::malformed_token("empty token"));
    }
    Ok(())
}

fn reject(operation: &'static str, fault: EngineFault) -> StagingError {
    warn!(
        operation,
        code = fault.code,
        domain = %fault.domain,
        message = %fault.message,
        "engine rejected staging request"
    );
    StagingError::Rejected(fault)
}

/// Maps an engine reply onto one outcome per URL, in input order.
fn collect_outcomes(urls: &[String], reply: StagingReply) -> Result<Vec<Outcome>, StagingError> {
    if reply.statuses.len() != urls.len() {
        return Err(StagingError::ReplyMismatch {
            expected: urls.len(),
            actual: reply.statuses.len(),
        });
    }

    if reply.state == ReplyState::Queued {
        debug!(url_count = urls.len(), "request queued, all URLs pending");
        return Ok(vec![Outcome::Pending; urls.len()]);
    }

    let outcomes = urls
        .iter()
        .zip(reply.statuses)
        .map(|(url, status)| {
            let outcome = Outcome::from(classify_owned(status));
            if let Outcome::Failed(fault) = &outcome {
                warn!(
                    url = %url,
                    code = fault.code,
                    domain = %fault.domain,
                    message = %fault.message,
                    "staging failed for URL"
                );
            }
            outcome
        })
        .collect();
    Ok(outcomes)
}

fn single(outcomes: Vec<Outcome>) -> Result<Outcome, StagingError> {
    match outcomes.into_iter().next() {
        Some(Outcome::Failed(fault)) => Err(StagingError::Failed(fault)),
        Some(outcome) => Ok(outcome),
        None => Err(StagingError::ReplyMismatch {
            expected: 1,
            actual: 0,
        }),
    }
}

fn log_summary(operation: &'static str, token: &StagingToken, outcomes: &[Outcome]) {
    let summary = OutcomeSummary::of(outcomes);
    info!(
        operation,
        %token,
        ready = summary.ready,
        pending = summary.pending,
        failed = summary.failed,
        "staging call complete"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    // ==================== Duration Validation Tests ====================

    #[test]
    fn test_whole_seconds_rounds_up() {
        assert_eq!(whole_seconds("t", Duration::from_secs(5)).unwrap(), 5);
        assert_eq!(whole_seconds("t", Duration::from_millis(1500)).unwrap(), 2);
    }

    #[test]
    fn test_whole_seconds_saturates_at_maximum() {
        assert_eq!(whole_seconds("pin_lifetime", Duration::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn test_whole_seconds_rejects_sub_second() {
        let err = whole_seconds("timeout", Duration::from_millis(999)).unwrap_err();
        assert!(matches!(err, StagingError::InvalidDuration { field: "timeout", .. }));
        assert!(whole_seconds("timeout", Duration::ZERO).is_err());
    }

    // ==================== Outcome Collection Tests ====================

    #[test]
    fn test_collect_queued_reply_is_all_pending() {
        let outcomes = collect_outcomes(&urls(&["a", "b"]), StagingReply::queued(2)).unwrap();
        assert_eq!(outcomes, vec![Outcome::Pending, Outcome::Pending]);
    }

    #[test]
    fn test_collect_settled_reply_preserves_order() {
        let gone = EngineFault::new(2, "mock", "gone");
        let reply = StagingReply::settled(vec![
            None,
            Some(EngineFault::again("mock", "queued")),
            Some(gone.clone()),
        ]);
        let outcomes = collect_outcomes(&urls(&["a", "b", "c"]), reply).unwrap();
        assert_eq!(
            outcomes,
            vec![Outcome::Ready, Outcome::Pending, Outcome::Failed(gone)]
        );
    }

    #[test]
    fn test_collect_rejects_length_mismatch() {
        let err = collect_outcomes(&urls(&["a", "b"]), StagingReply::settled(vec![None]))
            .unwrap_err();
        assert!(matches!(
            err,
            StagingError::ReplyMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_single_propagates_failure() {
        let fault = EngineFault::new(2, "mock", "gone");
        let err = single(vec![Outcome::Failed(fault.clone())]).unwrap_err();
        assert_eq!(err.fault(), Some(&fault));
        assert!(!err.is_request_rejected());
    }

    #[test]
    fn test_single_passes_pending() {
        assert_eq!(single(vec![Outcome::Pending]).unwrap(), Outcome::Pending);
    }

    // ==================== Summary Tests ====================

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            Outcome::Ready,
            Outcome::Pending,
            Outcome::Failed(EngineFault::new(2, "d", "m")),
            Outcome::Ready,
        ];
        let summary = OutcomeSummary::of(&outcomes);
        assert_eq!(summary.ready, 2);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_settled());
    }

    #[test]
    fn test_summary_empty_is_settled() {
        assert!(OutcomeSummary::of(&[]).is_settled());
    }
}
