//! athena-query: run one SQL query on Athena and stream its rows.
//!
//! Submits the query, waits for it to finish, then pages through the
//! results and writes one JSON object per row to stdout. Logs go to stderr.

use std::io::{self, BufWriter, Stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};

use athena_driver::{
    drain_stream, AthenaError, CancelHandle, DriverConfig, QueryJob, RowRecord, RowSink,
    SdkQueryService,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run a SQL query on AWS Athena and print the result rows as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "athena-query", version, about)]
struct Cli {
    /// SQL text to run. Mutually exclusive with --file.
    #[arg(conflicts_with = "file")]
    query: Option<String>,

    /// Read the SQL text from a file.
    #[arg(long, short)]
    file: Option<PathBuf>,

    /// S3 URI where Athena writes result files.
    #[arg(long, env = "ATHENA_OUTPUT_LOCATION")]
    output_location: Option<String>,

    /// Rows requested per results page.
    #[arg(long)]
    page_size: Option<u32>,

    /// Delay between status polls in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up after this many status polls (0 = unlimited).
    #[arg(long)]
    max_polls: Option<u32>,

    /// Give up waiting after this many seconds (0 = unlimited).
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn sql(&self) -> anyhow::Result<String> {
        match (&self.query, &self.file) {
            (Some(q), _) => Ok(q.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read query file {}", path.display())),
            (None, None) => anyhow::bail!("no query given; pass SQL text or --file"),
        }
    }

    fn apply(&self, config: &mut DriverConfig) {
        if let Some(ref loc) = self.output_location {
            config.output_location = loc.clone();
        }
        if let Some(n) = self.page_size {
            config.page_size = n;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(n) = self.max_polls {
            config.max_polls = n;
        }
        if let Some(s) = self.timeout_secs {
            config.timeout_seconds = s;
        }
    }
}

// ── Sink ────────────────────────────────────────────────────────────

/// Writes each record as one line of JSON.
struct JsonLinesSink {
    out: BufWriter<Stdout>,
}

#[async_trait]
impl RowSink for JsonLinesSink {
    async fn accept(&mut self, record: RowRecord) -> Result<(), AthenaError> {
        serde_json::to_writer(&mut self.out, &record).map_err(|e| AthenaError::Sink(e.to_string()))?;
        self.out
            .write_all(b"\n")
            .map_err(|e| AthenaError::Sink(e.to_string()))
    }

    async fn finish(&mut self) -> Result<(), AthenaError> {
        self.out.flush().map_err(|e| AthenaError::Sink(e.to_string()))
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let sql = cli.sql()?;

    let mut config = DriverConfig::from_env();
    cli.apply(&mut config);

    let (cancel, signal) = CancelHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling query");
            cancel.cancel();
        }
    });

    let service = Arc::new(SdkQueryService::new(config.clone()).await);
    let job = QueryJob::new(sql);

    let output = job.execute(service, &config, signal).await?;

    let mut sink = JsonLinesSink {
        out: BufWriter::new(io::stdout()),
    };
    let rows = drain_stream(output.records, &mut sink).await?;

    info!(query_id = %output.handle, rows, "athena-query finished");
    Ok(())
}
