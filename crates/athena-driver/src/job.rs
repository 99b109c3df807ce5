use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::config::DriverConfig;
use crate::driver::ExecutionDriver;
use crate::error::AthenaError;
use crate::execution::ExecutionHandle;
use crate::paginator::{RecordStream, ResultPaginator};
use crate::service::QueryService;

// ---------------------------------------------------------------------------
// Job description
// ---------------------------------------------------------------------------

/// One query run described as data.
///
/// # Example JSON
/// ```json
/// {
///   "sql": "SELECT * FROM \"analytics\".\"events\" LIMIT 100",
///   "output_location": "s3://query-results/adhoc/",
///   "page_size": 200
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryJob {
    /// SQL text to submit.
    pub sql: String,
    /// Result destination; falls back to the config's `output_location`.
    #[serde(default)]
    pub output_location: Option<String>,
    /// Rows per results page; falls back to the config's `page_size`.
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// A succeeded execution and the lazy stream over its records.
pub struct JobOutput {
    pub handle: ExecutionHandle,
    pub records: RecordStream,
}

impl QueryJob {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            output_location: None,
            page_size: None,
        }
    }

    /// The output location this job will use.
    pub fn resolve_output_location<'a>(
        &'a self,
        config: &'a DriverConfig,
    ) -> Result<&'a str, AthenaError> {
        let location = self
            .output_location
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&config.output_location);

        if location.is_empty() {
            return Err(AthenaError::InvalidOutputLocation {
                location: String::new(),
                reason: "no output location configured".into(),
            });
        }
        Ok(location)
    }

    /// Submit, wait for success, and hand back the record stream.
    ///
    /// `cancel` is shared by the poll loop and the pagination loop.
    pub async fn execute<S>(
        &self,
        service: Arc<S>,
        config: &DriverConfig,
        cancel: CancelSignal,
    ) -> Result<JobOutput, AthenaError>
    where
        S: QueryService + ?Sized + 'static,
    {
        let output_location = self.resolve_output_location(config)?;

        let driver = ExecutionDriver::new(service.clone(), config.poll_policy())
            .with_cancel(cancel.clone());
        let handle = driver.run(&self.sql, output_location).await?;

        let paginator = ResultPaginator::new(service, self.page_size.unwrap_or(config.page_size))
            .with_cancel(cancel);
        let records = paginator.fetch_all(&handle);

        Ok(JobOutput { handle, records })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
