//! Error taxonomy for the execution driver and result paginator.

use crate::execution::ExecutionHandle;

/// Errors that can occur while driving a query through its lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AthenaError {
    /// The query text was empty.
    #[error("Query text must not be empty")]
    InvalidQuery,

    /// The output location is not an `s3://bucket/...` URI.
    #[error("Invalid output location '{location}': {reason}")]
    InvalidOutputLocation { location: String, reason: String },

    /// The service rejected the submission, or the transport failed.
    #[error("Query submission failed: {0}")]
    Submission(String),

    /// The service reported something this client does not understand.
    #[error("Protocol error for query {query_id}: {message}")]
    Protocol { query_id: String, message: String },

    /// Status polling failed more times in a row than the policy allows.
    #[error("Status fetch for query {query_id} failed after {attempts} consecutive errors: {message}")]
    StatusFetch {
        query_id: String,
        attempts: u32,
        message: String,
    },

    /// The query execution failed on the service side.
    #[error("Query {query_id} failed: {reason}")]
    QueryFailed { query_id: String, reason: String },

    /// The query was cancelled (either by the user or by the service).
    #[error("Query {query_id} was cancelled")]
    QueryCancelled { query_id: String },

    /// The poll loop ran out of attempts before a terminal state.
    #[error("Query {query_id} still running after {attempts} status polls")]
    PollLimitExceeded { query_id: String, attempts: u32 },

    /// The poll loop exceeded its deadline.
    #[error("Query {query_id} timed out after {seconds}s")]
    PollTimeout { query_id: String, seconds: u64 },

    /// An external cancel signal interrupted the operation.
    #[error("Query {query_id} aborted by cancel signal")]
    Aborted { query_id: String },

    /// A results page could not be fetched.
    #[error("Results page {page} of query {query_id} failed (token: {}): {message}", .token.as_deref().unwrap_or("none"))]
    Retrieval {
        query_id: String,
        page: usize,
        token: Option<String>,
        message: String,
    },

    /// A results page did not have the expected shape.
    #[error("Malformed results page {page} of query {query_id}: {message}")]
    MalformedPage {
        query_id: String,
        page: usize,
        message: String,
    },

    /// An AWS SDK or transport error (stringified).
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    /// The sink refused a record.
    #[error("Row sink error: {0}")]
    Sink(String),
}

impl AthenaError {
    pub(crate) fn protocol(handle: &ExecutionHandle, message: impl Into<String>) -> Self {
        Self::Protocol {
            query_id: handle.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed(handle: &ExecutionHandle, page: usize, message: impl Into<String>) -> Self {
        Self::MalformedPage {
            query_id: handle.to_string(),
            page,
            message: message.into(),
        }
    }

    /// Whether retrying the same step later could succeed.
    ///
    /// Only transport-level failures qualify; terminal query states,
    /// protocol violations and malformed pages will not fix themselves.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StatusFetch { .. } | Self::Retrieval { .. } | Self::AwsSdk(_)
        )
    }

    /// The query execution id this error refers to, if any.
    pub fn query_id(&self) -> Option<&str> {
        match self {
            Self::Protocol { query_id, .. }
            | Self::StatusFetch { query_id, .. }
            | Self::QueryFailed { query_id, .. }
            | Self::QueryCancelled { query_id }
            | Self::PollLimitExceeded { query_id, .. }
            | Self::PollTimeout { query_id, .. }
            | Self::Aborted { query_id }
            | Self::Retrieval { query_id, .. }
            | Self::MalformedPage { query_id, .. } => Some(query_id),
            Self::InvalidQuery
            | Self::InvalidOutputLocation { .. }
            | Self::Submission(_)
            | Self::AwsSdk(_)
            | Self::Sink(_) => None,
        }
    }
}
