//! Continuation-token pagination over a finished execution's results.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::decoder::PageDecoder;
use crate::error::AthenaError;
use crate::execution::ExecutionHandle;
use crate::result::RowRecord;
use crate::service::QueryService;

/// Stream of decoded records for one pass over a result set.
pub type RecordStream = BoxStream<'static, Result<RowRecord, AthenaError>>;

/// Consumer of decoded records, fed one at a time in result order.
#[async_trait]
pub trait RowSink: Send {
    async fn accept(&mut self, record: RowRecord) -> Result<(), AthenaError>;

    /// Called once after the last record was accepted.
    async fn finish(&mut self) -> Result<(), AthenaError> {
        Ok(())
    }
}

#[async_trait]
impl RowSink for Vec<RowRecord> {
    async fn accept(&mut self, record: RowRecord) -> Result<(), AthenaError> {
        self.push(record);
        Ok(())
    }
}

/// Fetches every page of a result set and decodes it lazily.
pub struct ResultPaginator<S: ?Sized> {
    service: Arc<S>,
    page_size: u32,
    cancel: CancelSignal,
}

impl<S: QueryService + ?Sized + 'static> ResultPaginator<S> {
    /// `page_size` is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(service: Arc<S>, page_size: u32) -> Self {
        Self {
            service,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            cancel: CancelSignal::never(),
        }
    }

    /// Paginator with the default page size.
    pub fn with_default_page_size(service: Arc<S>) -> Self {
        Self::new(service, DEFAULT_PAGE_SIZE)
    }

    /// End the stream with [`AthenaError::Aborted`] once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Lazily stream every record of `handle`'s result set in service order.
    ///
    /// Pages are fetched one at a time, each with the previous page's token.
    /// The first error ends the stream; records yielded before it remain
    /// valid. Calling this again starts over from the first page.
    pub fn fetch_all(&self, handle: &ExecutionHandle) -> RecordStream {
        struct State<S: ?Sized> {
            service: Arc<S>,
            handle: ExecutionHandle,
            decoder: PageDecoder,
            page_size: u32,
            cancel: CancelSignal,
            token: Option<String>,
            page: usize,
            pending: VecDeque<RowRecord>,
            done: bool,
        }

        let state = State {
            service: self.service.clone(),
            handle: handle.clone(),
            decoder: PageDecoder::new(handle.clone()),
            page_size: self.page_size,
            cancel: self.cancel.clone(),
            token: None,
            page: 0,
            pending: VecDeque::new(),
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(record) = state.pending.pop_front() {
                    return Some((Ok(record), state));
                }
                if state.done {
                    return None;
                }
                if state.cancel.is_cancelled() {
                    state.done = true;
                    info!(query_id = %state.handle, page = state.page, "Pagination aborted");
                    let err = AthenaError::Aborted {
                        query_id: state.handle.to_string(),
                    };
                    return Some((Err(err), state));
                }

                let token = state.token.take();
                let page_index = state.page;

                debug!(
                    query_id = %state.handle,
                    page = page_index,
                    token = token.as_deref().unwrap_or("none"),
                    "Fetching results page"
                );

                let fetched = state
                    .service
                    .get_results_page(&state.handle, token.as_deref(), state.page_size)
                    .await;
                let page = match fetched {
                    Ok(page) => page,
                    Err(e) => {
                        state.done = true;
                        let message = match e {
                            AthenaError::Retrieval { message, .. } => message,
                            other => other.to_string(),
                        };
                        let err = AthenaError::Retrieval {
                            query_id: state.handle.to_string(),
                            page: page_index,
                            token,
                            message,
                        };
                        return Some((Err(err), state));
                    }
                };

                let next_token = page.next_token.clone();
                match state.decoder.decode(page, token.as_deref()) {
                    Ok(records) => state.pending.extend(records),
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }

                state.page += 1;
                match next_token {
                    Some(next) => state.token = Some(next),
                    None => {
                        info!(
                            query_id = %state.handle,
                            pages = state.page,
                            "Result set fully fetched"
                        );
                        state.done = true;
                    }
                }
            }
        })
        .boxed()
    }

    /// Buffer the whole result set.
    pub async fn collect_all(&self, handle: &ExecutionHandle) -> Result<Vec<RowRecord>, AthenaError> {
        let mut records = Vec::new();
        self.drain(handle, &mut records).await?;
        Ok(records)
    }

    /// Push every record into `sink`; returns how many were accepted.
    pub async fn drain<K: RowSink + ?Sized>(
        &self,
        handle: &ExecutionHandle,
        sink: &mut K,
    ) -> Result<usize, AthenaError> {
        drain_stream(self.fetch_all(handle), sink).await
    }
}

/// Feed `records` into `sink` in order until the stream ends or fails.
///
/// The first error, from the stream or from the sink, stops the drain and
/// is returned; `finish` is only called after a complete stream.
pub async fn drain_stream<St, K>(records: St, sink: &mut K) -> Result<usize, AthenaError>
where
    St: Stream<Item = Result<RowRecord, AthenaError>>,
    K: RowSink + ?Sized,
{
    futures::pin_mut!(records);
    let mut count = 0;
    while let Some(record) = records.next().await {
        sink.accept(record?).await?;
        count += 1;
    }
    sink.finish().await?;
    Ok(count)
}
