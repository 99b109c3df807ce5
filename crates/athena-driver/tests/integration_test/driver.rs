//! Tests for ExecutionDriver: submission checks, the poll loop, and its bounds.

use std::sync::Arc;
use std::time::Duration;

use athena_driver::*;
use tokio::time::Instant;

use crate::fake::FakeService;

const OUTPUT: &str = "s3://query-results/adhoc/";

fn policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(1),
        max_attempts: None,
        timeout: None,
        max_status_errors: 3,
    }
}

fn driver(service: &Arc<FakeService>, policy: PollPolicy) -> ExecutionDriver<FakeService> {
    ExecutionDriver::new(service.clone(), policy)
}

// ── Submit ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_submit_returns_handle() {
    let service = Arc::new(FakeService::new());
    let handle = driver(&service, policy())
        .submit("SELECT 1", OUTPUT)
        .await
        .expect("submit");

    assert_eq!(handle.as_str(), "exec-1");
    let submissions = service.submissions.lock().unwrap();
    assert_eq!(submissions.as_slice(), [("SELECT 1".to_string(), OUTPUT.to_string())]);
}

#[tokio::test]
async fn test_submit_rejects_empty_query() {
    let service = Arc::new(FakeService::new());
    let err = driver(&service, policy()).submit("   ", OUTPUT).await.unwrap_err();

    assert!(matches!(err, AthenaError::InvalidQuery));
    assert!(service.submissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_rejects_non_s3_output() {
    let service = Arc::new(FakeService::new());
    let err = driver(&service, policy())
        .submit("SELECT 1", "/tmp/results")
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::InvalidOutputLocation { .. }));
    assert!(service.submissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_failure_is_submission_error() {
    let service = Arc::new(
        FakeService::new().failing_submit(AthenaError::AwsSdk("AccessDeniedException".into())),
    );
    let err = driver(&service, policy()).submit("SELECT 1", OUTPUT).await.unwrap_err();

    match err {
        AthenaError::Submission(msg) => assert!(msg.contains("AccessDeniedException")),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Poll loop ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_polls_until_succeeded_with_fixed_interval() {
    use ExecutionStatus::*;
    let service = Arc::new(FakeService::new().with_statuses(&[Queued, Running, Running, Succeeded]));
    let handle = ExecutionHandle::new("exec-1");

    let start = Instant::now();
    let status = driver(&service, policy()).await_completion(&handle).await.unwrap();

    assert_eq!(status, Succeeded);
    assert_eq!(service.status_calls(), 4);
    // One wait after each of the three non-terminal observations.
    assert_eq!(start.elapsed(), Duration::from_secs(3));

    let times = service.poll_times.lock().unwrap();
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn test_terminal_status_is_never_polled_again() {
    use ExecutionStatus::*;

    for terminal in [Succeeded, Failed, Cancelled] {
        // Anything after the terminal state must not be read.
        let service = Arc::new(FakeService::new().with_statuses(&[Running, terminal, Running]));
        let handle = ExecutionHandle::new("exec-1");

        let start = Instant::now();
        let _ = driver(&service, policy()).await_completion(&handle).await;

        assert_eq!(service.status_calls(), 2, "terminal {terminal}");
        assert_eq!(start.elapsed(), Duration::from_secs(1), "terminal {terminal}");
        assert_eq!(service.stop_calls(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_execution_is_explicit_error() {
    use ExecutionStatus::*;
    let service = Arc::new(
        FakeService::new()
            .with_statuses(&[Queued, Running])
            .push_status(Ok(StatusReport::from(Failed).with_reason("SYNTAX_ERROR: line 1:8"))),
    );

    let err = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    match err {
        AthenaError::QueryFailed { query_id, reason } => {
            assert_eq!(query_id, "exec-1");
            assert_eq!(reason, "SYNTAX_ERROR: line 1:8");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_without_reason_reports_unknown() {
    let service = Arc::new(FakeService::new().with_statuses(&[ExecutionStatus::Failed]));
    let err = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::QueryFailed { ref reason, .. } if reason == "unknown"));
}

#[tokio::test]
async fn test_cancelled_execution_is_explicit_error() {
    let service = Arc::new(FakeService::new().with_statuses(&[ExecutionStatus::Cancelled]));
    let err = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::QueryCancelled { ref query_id } if query_id == "exec-1"));
}

#[tokio::test]
async fn test_unknown_status_is_protocol_error() {
    let service = Arc::new(FakeService::new().push_status(Ok(StatusReport::new("PAUSED"))));
    let err = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    match err {
        AthenaError::Protocol { message, .. } => assert!(message.contains("PAUSED")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backward_transition_is_protocol_error() {
    use ExecutionStatus::*;
    let service = Arc::new(FakeService::new().with_statuses(&[Running, Queued]));
    let err = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::Protocol { .. }));
    assert_eq!(service.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_direct_queued_to_succeeded() {
    use ExecutionStatus::*;
    let service = Arc::new(FakeService::new().with_statuses(&[Queued, Succeeded]));
    let status = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap();
    assert_eq!(status, Succeeded);
}

// ── Transient status errors ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_transient_status_errors_are_retried() {
    let transient = || Err(AthenaError::AwsSdk("ThrottlingException".into()));
    let service = Arc::new(
        FakeService::new()
            .push_status(transient())
            .push_status(transient())
            .push_status(Ok(ExecutionStatus::Running.into()))
            .push_status(transient())
            .push_status(Ok(ExecutionStatus::Succeeded.into())),
    );

    let start = Instant::now();
    let status = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap();

    assert_eq!(status, ExecutionStatus::Succeeded);
    assert_eq!(service.status_calls(), 5);
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_status_errors_give_up() {
    let transient = || Err(AthenaError::AwsSdk("ThrottlingException".into()));
    let service = Arc::new(
        FakeService::new()
            .push_status(transient())
            .push_status(transient())
            .push_status(transient()),
    );

    let err = driver(&service, policy())
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    match err {
        AthenaError::StatusFetch { attempts, message, .. } => {
            assert_eq!(attempts, 3);
            assert!(message.contains("ThrottlingException"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(service.status_calls() == 3);
}

// ── Bounds and cancellation ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_poll_limit_stops_query() {
    let service = Arc::new(FakeService::new());
    let bounded = PollPolicy {
        max_attempts: Some(3),
        ..policy()
    };

    let err = driver(&service, bounded)
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::PollLimitExceeded { attempts: 3, .. }));
    assert_eq!(service.status_calls(), 3);
    assert_eq!(service.stop_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_stop_keeps_poll_error() {
    let service = Arc::new(
        FakeService::new().failing_stop(AthenaError::AwsSdk("InvalidRequestException".into())),
    );
    let bounded = PollPolicy {
        max_attempts: Some(2),
        ..policy()
    };

    let err = driver(&service, bounded)
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::PollLimitExceeded { attempts: 2, .. }));
    assert_eq!(service.stop_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_stops_query() {
    let service = Arc::new(FakeService::new());
    let bounded = PollPolicy {
        timeout: Some(Duration::from_secs(5)),
        ..policy()
    };

    let start = Instant::now();
    let err = driver(&service, bounded)
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::PollTimeout { seconds: 5, .. }));
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(service.status_calls(), 6);
    assert_eq!(service.stop_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_last_wait_is_cut_to_the_deadline() {
    let service = Arc::new(FakeService::new());
    let bounded = PollPolicy {
        interval: Duration::from_secs(2),
        timeout: Some(Duration::from_secs(3)),
        ..policy()
    };

    let start = Instant::now();
    let err = driver(&service, bounded)
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::PollTimeout { seconds: 3, .. }));
    // Polls at 0s, 2s and 3s; the second wait is shortened to 1s.
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(service.status_calls(), 3);
    assert_eq!(service.stop_calls(), 1);
}

#[tokio::test]
async fn test_cancel_before_first_poll() {
    let service = Arc::new(FakeService::new());
    let (cancel, signal) = CancelHandle::new();
    cancel.cancel();

    let err = driver(&service, policy())
        .with_cancel(signal)
        .await_completion(&ExecutionHandle::new("exec-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::Aborted { .. }));
    assert_eq!(service.status_calls(), 0);
    assert_eq!(service.stop_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_wait() {
    let service = Arc::new(FakeService::new());
    let (cancel, signal) = CancelHandle::new();
    let driver = driver(&service, policy()).with_cancel(signal);
    let handle = ExecutionHandle::new("exec-1");

    let start = Instant::now();
    let (result, _) = tokio::join!(driver.await_completion(&handle), async {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();
    });

    assert!(matches!(result, Err(AthenaError::Aborted { .. })));
    // Polls at 0s, 1s, 2s; the sleep towards 3s is cut short.
    assert_eq!(service.status_calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(2500));
    assert_eq!(service.stop_calls(), 1);
}

// ── run ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_run_submits_and_waits() {
    use ExecutionStatus::*;
    let service = Arc::new(FakeService::new().with_statuses(&[Queued, Running, Succeeded]));

    let handle = driver(&service, policy()).run("SELECT 1", OUTPUT).await.unwrap();

    assert_eq!(handle.as_str(), "exec-1");
    assert_eq!(service.status_calls(), 3);
}

#[tokio::test]
async fn test_run_surfaces_failure() {
    let service = Arc::new(FakeService::new().with_statuses(&[ExecutionStatus::Failed]));
    let err = driver(&service, policy()).run("SELECT 1", OUTPUT).await.unwrap_err();
    assert!(matches!(err, AthenaError::QueryFailed { .. }));
}
