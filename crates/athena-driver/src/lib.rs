pub mod cancel;
pub mod client;
pub mod config;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod execution;
pub mod job;
pub mod paginator;
pub mod result;
pub mod service;

pub use cancel::{CancelHandle, CancelSignal};
pub use client::SdkQueryService;
pub use config::DriverConfig;
pub use decoder::PageDecoder;
pub use driver::{validate_output_location, ExecutionDriver, PollPolicy};
pub use error::AthenaError;
pub use execution::{ExecutionHandle, ExecutionStatus, StatusReport, UnknownStatus};
pub use job::{JobOutput, QueryJob};
pub use paginator::{drain_stream, RecordStream, ResultPaginator, RowSink};
pub use result::{ColumnSchema, ResultPage, RowRecord};
pub use service::QueryService;
