//! AWS Athena implementation of [`QueryService`].
//!
//! [`SdkQueryService`] maps the four protocol steps onto
//! `StartQueryExecution`, `GetQueryExecution`, `GetQueryResults` and
//! `StopQueryExecution`. It performs no retries or polling of its own.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_athena::operation::get_query_results::GetQueryResultsOutput;
use aws_sdk_athena::types::{QueryExecution, QueryExecutionContext, ResultConfiguration};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DriverConfig;
use crate::error::AthenaError;
use crate::execution::{ExecutionHandle, ExecutionStatus, StatusReport};
use crate::result::ResultPage;
use crate::service::QueryService;

/// Athena-backed query service.
pub struct SdkQueryService {
    config: DriverConfig,
    athena_client: aws_sdk_athena::Client,
}

impl SdkQueryService {
    /// Create a new [`SdkQueryService`] from the given configuration.
    ///
    /// Uses static credentials when the config carries a key pair and the
    /// default AWS provider chain otherwise.
    pub async fn new(config: DriverConfig) -> Self {
        let region = aws_sdk_athena::config::Region::new(config.region.clone());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                config.session_token.clone(),
                None,
                "athena-driver-static",
            );
            loader = loader.credentials_provider(creds);
        }

        let aws_cfg = loader.load().await;
        let athena_client = aws_sdk_athena::Client::new(&aws_cfg);

        info!(
            region = %config.region,
            database = %config.database,
            workgroup = %config.workgroup,
            static_credentials = config.has_static_credentials(),
            "SdkQueryService initialised"
        );

        Self {
            config,
            athena_client,
        }
    }

    /// Wrap an already constructed SDK client.
    pub fn from_client(config: DriverConfig, athena_client: aws_sdk_athena::Client) -> Self {
        Self {
            config,
            athena_client,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

#[async_trait]
impl QueryService for SdkQueryService {
    async fn start_execution(
        &self,
        query: &str,
        output_location: &str,
    ) -> Result<ExecutionHandle, AthenaError> {
        let mut ctx = QueryExecutionContext::builder();
        if !self.config.database.is_empty() {
            ctx = ctx.database(&self.config.database);
        }

        let resp = self
            .athena_client
            .start_query_execution()
            .query_string(query)
            .query_execution_context(ctx.build())
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(output_location)
                    .build(),
            )
            .work_group(&self.config.workgroup)
            .client_request_token(Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| AthenaError::Submission(e.to_string()))?;

        let query_id = resp
            .query_execution_id()
            .ok_or_else(|| AthenaError::Submission("No query execution ID returned".into()))?;

        Ok(ExecutionHandle::new(query_id))
    }

    async fn get_execution_status(
        &self,
        handle: &ExecutionHandle,
    ) -> Result<StatusReport, AthenaError> {
        let resp = self
            .athena_client
            .get_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(|e| AthenaError::AwsSdk(e.to_string()))?;

        let qe = resp
            .query_execution()
            .ok_or_else(|| AthenaError::AwsSdk("No query execution in response".into()))?;

        Ok(status_report(qe))
    }

    async fn get_results_page(
        &self,
        handle: &ExecutionHandle,
        token: Option<&str>,
        page_size: u32,
    ) -> Result<ResultPage, AthenaError> {
        let output = self
            .athena_client
            .get_query_results()
            .query_execution_id(handle.as_str())
            .max_results(page_size as i32)
            .set_next_token(token.map(str::to_string))
            .send()
            .await
            .map_err(|e| AthenaError::AwsSdk(e.to_string()))?;

        let page = result_page(&output);
        debug!(
            query_id = %handle,
            rows = page.rows.len(),
            has_next = page.next_token.is_some(),
            "Fetched results page"
        );
        Ok(page)
    }

    async fn stop_execution(&self, handle: &ExecutionHandle) -> Result<(), AthenaError> {
        info!(query_id = %handle, "Stopping query execution");

        self.athena_client
            .stop_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(|e| AthenaError::AwsSdk(e.to_string()))?;

        Ok(())
    }
}

/// Extract the raw state and reason from an SDK [`QueryExecution`].
///
/// A missing state is reported as `QUEUED`: Athena omits it for executions
/// that have not been scheduled yet.
fn status_report(qe: &QueryExecution) -> StatusReport {
    let status = qe.status();
    let state = status
        .and_then(|s| s.state())
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| ExecutionStatus::Queued.as_str().to_string());

    let reason = status
        .and_then(|s| s.state_change_reason())
        .or_else(|| status.and_then(|s| s.athena_error()).and_then(|e| e.error_message()))
        .map(str::to_string);

    StatusReport { state, reason }
}

/// Convert the raw SDK [`GetQueryResultsOutput`] into a [`ResultPage`].
///
/// A response without a `ResultSet` becomes an empty page with no column
/// metadata; the decoder decides whether that is acceptable.
fn result_page(output: &GetQueryResultsOutput) -> ResultPage {
    let Some(result_set) = output.result_set() else {
        return ResultPage {
            columns: None,
            rows: Vec::new(),
            next_token: next_token(output),
        };
    };

    let columns = result_set.result_set_metadata().map(|meta| {
        meta.column_info()
            .iter()
            .map(|ci| ci.name().to_string())
            .collect()
    });

    let rows = result_set
        .rows()
        .iter()
        .map(|row| {
            row.data()
                .iter()
                .map(|datum| datum.var_char_value().map(str::to_string))
                .collect()
        })
        .collect();

    ResultPage {
        columns,
        rows,
        next_token: next_token(output),
    }
}

fn next_token(output: &GetQueryResultsOutput) -> Option<String> {
    output
        .next_token()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests: response mapping only, no AWS calls
// ---------------------------------------------------------------------------
