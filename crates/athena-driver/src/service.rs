//! The remote query service capability the driver and paginator depend on.

use async_trait::async_trait;

use crate::error::AthenaError;
use crate::execution::{ExecutionHandle, StatusReport};
use crate::result::ResultPage;

/// Trait for remote query service backends.
///
/// Implementations handle the transport (SDK calls, HTTP, a fake in tests)
/// and map responses onto the driver's types. They should not retry on
/// their own; retry policy belongs to the caller.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submit `query` with results materialized under `output_location`.
    ///
    /// Failures should be reported as [`AthenaError::Submission`].
    async fn start_execution(
        &self,
        query: &str,
        output_location: &str,
    ) -> Result<ExecutionHandle, AthenaError>;

    /// Fetch the current execution state.
    ///
    /// Any error returned here is treated as a transient status-fetch
    /// failure by the driver's poll loop.
    async fn get_execution_status(
        &self,
        handle: &ExecutionHandle,
    ) -> Result<StatusReport, AthenaError>;

    /// Fetch one page of results. `token` is `None` for the first page.
    async fn get_results_page(
        &self,
        handle: &ExecutionHandle,
        token: Option<&str>,
        page_size: u32,
    ) -> Result<ResultPage, AthenaError>;

    /// Ask the service to stop a running execution.
    ///
    /// Called when the poll loop times out, runs out of attempts or is
    /// aborted. Backends that cannot stop an execution should return an
    /// error so the caller can log it.
    async fn stop_execution(&self, handle: &ExecutionHandle) -> Result<(), AthenaError>;
}
