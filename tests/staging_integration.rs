//! Integration tests for bring-online staging against the mock engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridstage_core::engine::{
    BringOnlineRequest, Engine, StagingReply, TOKEN_BUFFER_LEN, TokenBuffer, TokenRequest,
};
use gridstage_core::{
    Context, EngineFault, MockEngine, Outcome, OutcomeSummary, StagingEngine, StagingError,
    StagingToken,
};

const PIN: Duration = Duration::from_secs(100);
const TIMEOUT: Duration = Duration::from_secs(100);

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn failed_code(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Failed(fault) => fault.code,
        other => panic!("expected a failed outcome, got {other:?}"),
    }
}

// ==================== Batch Shape Tests ====================

#[tokio::test]
async fn test_sync_batch_ready_and_failed() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a", "mock://host/b?staging_errno=2"]);

    let (token, outcomes) = context
        .staging()
        .bring_online(&batch, PIN, TIMEOUT, false)
        .await
        .unwrap();

    assert!(!token.is_empty());
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], Outcome::Ready);
    assert_eq!(failed_code(&outcomes[1]), 2);
}

#[tokio::test]
async fn test_outcomes_follow_input_order_for_any_mix() {
    let context = Context::mock();
    let batch = urls(&[
        "mock://host/1?staging_errno=5",
        "mock://host/2",
        "mock://host/3?staging_time=60",
        "srm://host/4",
        "mock://host/5?staging_errno=13",
        "mock://host/6",
    ]);

    let (_, outcomes) = context
        .staging()
        .bring_online(&batch, PIN, TIMEOUT, true)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), batch.len());
    assert_eq!(failed_code(&outcomes[0]), 5);
    assert_eq!(outcomes[1], Outcome::Ready);
    assert_eq!(outcomes[2], Outcome::Pending);
    assert_eq!(failed_code(&outcomes[3]), libc::EPROTONOSUPPORT);
    assert_eq!(failed_code(&outcomes[4]), 13);
    assert_eq!(outcomes[5], Outcome::Ready);
    assert_eq!(
        OutcomeSummary::of(&outcomes),
        OutcomeSummary {
            ready: 2,
            pending: 1,
            failed: 3
        }
    );
}

#[tokio::test]
async fn test_async_returns_ready_and_pending_in_one_call() {
    let context = Context::mock();
    let batch = urls(&["mock://host/now", "mock://host/later?staging_time=30"]);

    let (_, outcomes) = context
        .staging()
        .bring_online(&batch, PIN, TIMEOUT, true)
        .await
        .unwrap();

    assert_eq!(outcomes, vec![Outcome::Ready, Outcome::Pending]);
}

#[tokio::test]
async fn test_async_all_queued_reports_every_url_pending() {
    let context = Context::mock();
    let batch = urls(&[
        "mock://host/a?staging_time=30",
        "mock://host/b?staging_time=30&staging_errno=2",
    ]);

    let (token, outcomes) = context
        .staging()
        .bring_online(&batch, PIN, TIMEOUT, true)
        .await
        .unwrap();

    assert!(!token.is_empty());
    assert_eq!(outcomes, vec![Outcome::Pending, Outcome::Pending]);
}

// ==================== Polling Tests ====================

#[tokio::test]
async fn test_poll_after_delay_is_terminal_for_every_url() {
    let context = Context::mock();
    let batch = urls(&[
        "mock://host/file?staging_time=0.2",
        "mock://host/file?staging_time=0.2&staging_errno=2",
    ]);
    let staging = context.staging();

    let (token, outcomes) = staging.bring_online(&batch, PIN, TIMEOUT, true).await.unwrap();
    assert_eq!(outcomes, vec![Outcome::Pending, Outcome::Pending]);

    tokio::time::sleep(Duration::from_millis(500)).await;

    let polled = staging.poll_online(&batch, &token).await.unwrap();
    assert_eq!(polled[0], Outcome::Ready);
    assert_eq!(failed_code(&polled[1]), 2);
    assert!(polled.iter().all(Outcome::is_terminal));
}

#[tokio::test]
async fn test_poll_pending_is_idempotent() {
    let context = Context::mock();
    let batch = urls(&["mock://host/slow?staging_time=60"]);
    let staging = context.staging();
    let (token, _) = staging.bring_online(&batch, PIN, TIMEOUT, true).await.unwrap();

    for _ in 0..5 {
        let polled = staging.poll_online(&batch, &token).await.unwrap();
        assert_eq!(polled, vec![Outcome::Pending]);
    }
}

#[tokio::test]
async fn test_poll_terminal_outcome_is_stable() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a", "mock://host/b?staging_errno=2"]);
    let staging = context.staging();
    let (token, first) = staging.bring_online(&batch, PIN, TIMEOUT, false).await.unwrap();

    for _ in 0..3 {
        assert_eq!(staging.poll_online(&batch, &token).await.unwrap(), first);
    }
}

#[tokio::test]
async fn test_poll_with_foreign_token_fails_per_url() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a", "mock://host/b"]);
    let token = StagingToken::parse("not-issued-here").unwrap();

    let polled = context.staging().poll_online(&batch, &token).await.unwrap();
    assert_eq!(polled.len(), 2);
    assert!(
        polled
            .iter()
            .all(|outcome| failed_code(outcome) == libc::EINVAL)
    );
}

#[tokio::test]
async fn test_sync_bring_online_waits_for_staging() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a?staging_time=0.2"]);

    let started = std::time::Instant::now();
    let (_, outcomes) = context
        .staging()
        .bring_online(&batch, PIN, TIMEOUT, false)
        .await
        .unwrap();

    assert_eq!(outcomes, vec![Outcome::Ready]);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_sync_bring_online_timeout_leaves_url_pending() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a?staging_time=30"]);

    let (_, outcomes) = context
        .staging()
        .bring_online(&batch, PIN, Duration::from_secs(1), false)
        .await
        .unwrap();

    assert_eq!(outcomes, vec![Outcome::Pending]);
}

// ==================== Release / Abort Tests ====================

#[tokio::test]
async fn test_release_subset_leaves_other_urls_pollable() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a", "mock://host/b"]);
    let staging = context.staging();
    let (token, _) = staging.bring_online(&batch, PIN, TIMEOUT, false).await.unwrap();

    let released = staging
        .release_online(&batch[..1], &token)
        .await
        .unwrap();
    assert_eq!(released, vec![Outcome::Ready]);
    assert!(staging.tokens().contains(&token));

    let polled = staging.poll_online(&batch, &token).await.unwrap();
    assert_eq!(failed_code(&polled[0]), libc::EINVAL);
    assert_eq!(polled[1], Outcome::Ready);

    staging.release_online(&batch[1..], &token).await.unwrap();
    assert!(!staging.tokens().contains(&token));
}

#[tokio::test]
async fn test_release_failure_does_not_stop_siblings() {
    let context = Context::mock();
    let batch = urls(&[
        "mock://host/a?release_errno=13",
        "mock://host/b",
        "mock://host/c",
    ]);
    let staging = context.staging();
    let (token, _) = staging.bring_online(&batch, PIN, TIMEOUT, false).await.unwrap();

    let released = staging.release_online(&batch, &token).await.unwrap();
    assert_eq!(released.len(), 3);
    assert_eq!(failed_code(&released[0]), 13);
    assert_eq!(released[1], Outcome::Ready);
    assert_eq!(released[2], Outcome::Ready);
    // The failed URL keeps the token alive in the registry
    assert_eq!(
        staging.tokens().urls_for(&token).unwrap(),
        vec![batch[0].clone()]
    );
}

#[tokio::test]
async fn test_abort_pending_then_poll_reports_cancelled() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a?staging_time=60", "mock://host/b?abort_errno=16"]);
    let staging = context.staging();
    let (token, _) = staging.bring_online(&batch, PIN, TIMEOUT, true).await.unwrap();

    let aborted = staging.abort(&batch, &token).await.unwrap();
    assert_eq!(aborted[0], Outcome::Ready);
    assert_eq!(failed_code(&aborted[1]), 16);

    let polled = staging.poll_online(&batch[..1], &token).await.unwrap();
    assert_eq!(failed_code(&polled[0]), libc::ECANCELED);
}

// ==================== Request Rejection Tests ====================

#[tokio::test]
async fn test_empty_url_list_is_rejected() {
    let context = Context::mock();
    let err = context
        .staging()
        .bring_online(&[], PIN, TIMEOUT, false)
        .await
        .unwrap_err();
    assert!(matches!(err, StagingError::EmptyUrlList));
    assert!(err.is_request_rejected());
}

#[tokio::test]
async fn test_sub_second_durations_are_rejected() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a"]);
    let err = context
        .staging()
        .bring_online(&batch, Duration::from_millis(10), TIMEOUT, false)
        .await
        .unwrap_err();
    assert!(matches!(err, StagingError::InvalidDuration { .. }));

    let err = context
        .staging()
        .bring_online(&batch, PIN, Duration::ZERO, false)
        .await
        .unwrap_err();
    assert!(matches!(err, StagingError::InvalidDuration { .. }));
}

#[tokio::test]
async fn test_poll_with_empty_url_list_is_rejected() {
    let context = Context::mock();
    let token = StagingToken::parse("tok").unwrap();
    let err = context.staging().poll_online(&[], &token).await.unwrap_err();
    assert!(err.is_request_rejected());
}

#[test]
fn test_malformed_tokens_are_rejected() {
    assert!(StagingToken::parse("").is_err());
    assert!(StagingToken::parse("a\0b").is_err());
}

// ==================== Single-File Tests ====================

#[tokio::test]
async fn test_single_file_helpers() {
    let context = Context::mock();
    let staging = context.staging();

    let (token, outcome) = staging
        .bring_online_file("mock://host/one", PIN, TIMEOUT, false)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Ready);
    assert_eq!(
        staging.poll_file("mock://host/one", &token).await.unwrap(),
        Outcome::Ready
    );
    staging.release_file("mock://host/one", &token).await.unwrap();
}

#[tokio::test]
async fn test_single_file_fatal_error_is_propagated() {
    let context = Context::mock();
    let err = context
        .staging()
        .bring_online_file("mock://host/file?staging_errno=2", PIN, TIMEOUT, false)
        .await
        .unwrap_err();

    assert!(!err.is_request_rejected());
    assert_eq!(err.fault().unwrap().code, 2);
}

// ==================== Cancellation Tests ====================

#[tokio::test]
async fn test_context_cancel_interrupts_sync_bring_online() {
    let context = Context::mock();
    let worker = context.clone();
    let task = tokio::spawn(async move {
        let batch = urls(&["mock://host/a?staging_time=30", "mock://host/b"]);
        worker
            .staging()
            .bring_online(&batch, PIN, TIMEOUT, false)
            .await
    });

    while context.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(context.cancel(), 1);

    let (_, outcomes) = task.await.unwrap().unwrap();
    assert_eq!(failed_code(&outcomes[0]), libc::ECANCELED);
    assert_eq!(outcomes[1], Outcome::Ready);
    assert_eq!(context.in_flight(), 0);
}

#[tokio::test]
async fn test_cancel_with_nothing_running_returns_zero() {
    let context = Context::mock();
    assert_eq!(context.cancel(), 0);
}

#[test]
fn test_staging_from_blocking_caller() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a"]);
    tokio_test::block_on(async {
        let staging = context.staging();
        let (token, outcomes) = staging
            .bring_online(&batch, PIN, TIMEOUT, false)
            .await
            .unwrap();
        assert_eq!(outcomes, vec![Outcome::Ready]);
        let released = staging.release_online(&batch, &token).await.unwrap();
        assert_eq!(released, vec![Outcome::Ready]);
    });
}

// ==================== Engine Boundary Tests ====================

/// Issues a token that fills the whole buffer and ends in a multibyte char.
struct LongTokenEngine;

impl LongTokenEngine {
    fn issued() -> String {
        format!("{}\u{e9}", "x".repeat(TOKEN_BUFFER_LEN - 2))
    }
}

impl Engine for LongTokenEngine {
    fn name(&self) -> &str {
        "long-token"
    }

    fn version(&self) -> &str {
        "1"
    }
}

#[async_trait]
impl StagingEngine for LongTokenEngine {
    async fn bring_online(
        &self,
        request: &BringOnlineRequest<'_>,
        token: &mut TokenBuffer,
    ) -> Result<StagingReply, EngineFault> {
        token.write(&Self::issued());
        Ok(StagingReply::settled(vec![None; request.urls.len()]))
    }

    async fn poll(&self, request: &TokenRequest<'_>) -> Result<StagingReply, EngineFault> {
        Ok(StagingReply::settled(vec![None; request.urls.len()]))
    }

    async fn release(
        &self,
        request: &TokenRequest<'_>,
    ) -> Result<Vec<Option<EngineFault>>, EngineFault> {
        Ok(vec![None; request.urls.len()])
    }

    async fn abort(
        &self,
        request: &TokenRequest<'_>,
    ) -> Result<Vec<Option<EngineFault>>, EngineFault> {
        Ok(vec![None; request.urls.len()])
    }
}

#[tokio::test]
async fn test_full_length_multibyte_token_keeps_outcomes() {
    let context = Context::with_engines(Arc::new(LongTokenEngine), Arc::new(MockEngine::new()));
    let batch = urls(&["mock://host/a", "mock://host/b"]);

    let (token, outcomes) = context
        .staging()
        .bring_online(&batch, PIN, TIMEOUT, false)
        .await
        .unwrap();

    assert_eq!(token.as_str(), "x".repeat(TOKEN_BUFFER_LEN - 2));
    assert_eq!(outcomes, vec![Outcome::Ready, Outcome::Ready]);
    assert!(context.staging().tokens().contains(&token));
}

#[tokio::test]
async fn test_unbounded_durations_do_not_panic() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a"]);

    let (_, outcomes) = context
        .staging()
        .bring_online(&batch, Duration::MAX, Duration::from_secs(u64::MAX), false)
        .await
        .unwrap();
    assert_eq!(outcomes, vec![Outcome::Ready]);

    let slow = urls(&["mock://host/b?staging_time=1e19", "mock://host/c"]);
    let (_, outcomes) = context
        .staging()
        .bring_online(&slow, PIN, TIMEOUT, true)
        .await
        .unwrap();
    assert_eq!(failed_code(&outcomes[0]), libc::EINVAL);
    assert_eq!(outcomes[1], Outcome::Ready);
}

#[tokio::test]
async fn test_pending_release_keeps_url_in_registry() {
    let context = Context::mock();
    let batch = urls(&["mock://host/a?staging_time=60&release_errno=11"]);
    let staging = context.staging();
    let (token, _) = staging.bring_online(&batch, PIN, TIMEOUT, true).await.unwrap();

    let released = staging.release_online(&batch, &token).await.unwrap();
    assert_eq!(released, vec![Outcome::Pending]);
    assert_eq!(staging.tokens().urls_for(&token).unwrap(), batch);
}
