//! Query submission and the execution-state poll loop.
//!
//! [`ExecutionDriver`] submits one query and polls its status at a fixed
//! interval until a terminal state, bounded by a [`PollPolicy`] and
//! interruptible through a [`CancelSignal`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cancel::CancelSignal;
use crate::error::AthenaError;
use crate::execution::{ExecutionHandle, ExecutionStatus};
use crate::service::QueryService;

/// Bounds for the status poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed delay between two status requests.
    pub interval: Duration,
    /// Give up after this many status requests (`None` = unlimited).
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first request.
    pub timeout: Option<Duration>,
    /// Consecutive failed status requests tolerated before giving up.
    pub max_status_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: None,
            timeout: Some(Duration::from_secs(300)),
            max_status_errors: 5,
        }
    }
}

/// Submits queries and waits for their executions to finish.
///
/// The driver holds no per-query state; every call is scoped to the handle
/// it is given, so one driver can serve many queries in sequence.
pub struct ExecutionDriver<S: ?Sized> {
    service: Arc<S>,
    policy: PollPolicy,
    cancel: CancelSignal,
}

impl<S: QueryService + ?Sized> ExecutionDriver<S> {
    pub fn new(service: Arc<S>, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            cancel: CancelSignal::never(),
        }
    }

    /// Abort the poll loop when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Submit a query. The submission is never retried.
    pub async fn submit(
        &self,
        query: &str,
        output_location: &str,
    ) -> Result<ExecutionHandle, AthenaError> {
        if query.trim().is_empty() {
            return Err(AthenaError::InvalidQuery);
        }
        validate_output_location(output_location)?;

        info!(query = %query, output_location = %output_location, "Submitting query");

        let handle = self
            .service
            .start_execution(query, output_location)
            .await
            .map_err(|e| match e {
                AthenaError::Submission(_) => e,
                other => AthenaError::Submission(other.to_string()),
            })?;

        info!(query_id = %handle, "Query execution started");
        Ok(handle)
    }

    /// Poll until the execution reaches a terminal state.
    ///
    /// Returns `Ok(Succeeded)` on success. `Failed` and `Cancelled` come back
    /// as [`AthenaError::QueryFailed`] and [`AthenaError::QueryCancelled`].
    /// A terminal state is never polled twice.
    pub async fn await_completion(
        &self,
        handle: &ExecutionHandle,
    ) -> Result<ExecutionStatus, AthenaError> {
        let start = Instant::now();
        let mut cancel = self.cancel.clone();
        let mut attempts: u32 = 0;
        let mut consecutive_errors: u32 = 0;
        let mut last: Option<ExecutionStatus> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(self.abort(handle).await);
            }

            attempts += 1;
            match self.service.get_execution_status(handle).await {
                Ok(report) => {
                    consecutive_errors = 0;

                    let status: ExecutionStatus = report
                        .state
                        .parse()
                        .map_err(|e| AthenaError::protocol(handle, format!("{e}")))?;

                    if let Some(prev) = last {
                        if !prev.can_transition_to(status) {
                            return Err(AthenaError::protocol(
                                handle,
                                format!("illegal status transition {prev} -> {status}"),
                            ));
                        }
                    }
                    last = Some(status);

                    debug!(
                        query_id = %handle,
                        state = %status,
                        attempt = attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Polling query status"
                    );

                    match status {
                        ExecutionStatus::Succeeded => {
                            info!(query_id = %handle, attempts, "Query succeeded");
                            return Ok(status);
                        }
                        ExecutionStatus::Failed => {
                            let reason = report.reason.unwrap_or_else(|| "unknown".to_string());
                            error!(query_id = %handle, reason = %reason, "Query failed");
                            return Err(AthenaError::QueryFailed {
                                query_id: handle.to_string(),
                                reason,
                            });
                        }
                        ExecutionStatus::Cancelled => {
                            warn!(query_id = %handle, "Query was cancelled");
                            return Err(AthenaError::QueryCancelled {
                                query_id: handle.to_string(),
                            });
                        }
                        ExecutionStatus::Queued | ExecutionStatus::Running => {}
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        query_id = %handle,
                        attempt = attempts,
                        consecutive_errors,
                        error = %e,
                        "Status fetch failed"
                    );
                    if consecutive_errors >= self.policy.max_status_errors {
                        return Err(AthenaError::StatusFetch {
                            query_id: handle.to_string(),
                            attempts: consecutive_errors,
                            message: e.to_string(),
                        });
                    }
                }
            }

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    warn!(query_id = %handle, attempts, "Poll limit reached, stopping query");
                    self.stop_best_effort(handle).await;
                    return Err(AthenaError::PollLimitExceeded {
                        query_id: handle.to_string(),
                        attempts,
                    });
                }
            }

            if let Some(timeout) = self.policy.timeout {
                if start.elapsed() >= timeout {
                    warn!(
                        query_id = %handle,
                        timeout_seconds = timeout.as_secs(),
                        "Query timed out, stopping query"
                    );
                    self.stop_best_effort(handle).await;
                    return Err(AthenaError::PollTimeout {
                        query_id: handle.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
            }

            // Never sleep past the deadline.
            let wait = match self.policy.timeout {
                Some(timeout) => self.policy.interval.min(timeout.saturating_sub(start.elapsed())),
                None => self.policy.interval,
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(self.abort(handle).await),
            }
        }
    }

    /// Submit and wait; returns the handle of a succeeded execution.
    pub async fn run(
        &self,
        query: &str,
        output_location: &str,
    ) -> Result<ExecutionHandle, AthenaError> {
        let handle = self.submit(query, output_location).await?;
        self.await_completion(&handle).await?;
        Ok(handle)
    }

    async fn abort(&self, handle: &ExecutionHandle) -> AthenaError {
        info!(query_id = %handle, "Cancel signal received");
        self.stop_best_effort(handle).await;
        AthenaError::Aborted {
            query_id: handle.to_string(),
        }
    }

    /// Ask the service to stop the execution; failures are only logged.
    async fn stop_best_effort(&self, handle: &ExecutionHandle) {
        if let Err(e) = self.service.stop_execution(handle).await {
            warn!(query_id = %handle, error = %e, "Failed to stop query execution");
        }
    }
}

/// Check that `location` is an `s3://bucket[/prefix]` URI.
pub fn validate_output_location(location: &str) -> Result<(), AthenaError> {
    let invalid = |reason: &str| AthenaError::InvalidOutputLocation {
        location: location.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(location).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "s3" {
        return Err(invalid("scheme must be s3"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing bucket name"));
    }
    Ok(())
}
