use tracing::{debug, warn};

use crate::error::AthenaError;
use crate::execution::ExecutionHandle;
use crate::result::{ColumnSchema, ResultPage, RowRecord};

/// Turns raw result pages into [`RowRecord`]s.
///
/// One decoder covers one pass over a result set. The schema is taken from
/// the first page (the one fetched without a continuation token), whose
/// first row echoes the column names and is dropped.
#[derive(Debug)]
pub struct PageDecoder {
    handle: ExecutionHandle,
    schema: Option<ColumnSchema>,
    pages: usize,
}

impl PageDecoder {
    pub fn new(handle: ExecutionHandle) -> Self {
        Self {
            handle,
            schema: None,
            pages: 0,
        }
    }

    pub fn schema(&self) -> Option<&ColumnSchema> {
        self.schema.as_ref()
    }

    pub fn pages_decoded(&self) -> usize {
        self.pages
    }

    /// Decode `page`, which was fetched with continuation `token`.
    ///
    /// Fails with [`AthenaError::MalformedPage`] if the first page has no
    /// column metadata, if a continuation page arrives before any schema,
    /// if its column names are not unique, or if any row's value count
    /// differs from the schema length. No records of a failing page are
    /// returned.
    pub fn decode(
        &mut self,
        page: ResultPage,
        token: Option<&str>,
    ) -> Result<Vec<RowRecord>, AthenaError> {
        let index = self.pages;
        let first = token.is_none();

        if first {
            let columns = page.columns.ok_or_else(|| {
                AthenaError::malformed(&self.handle, index, "first page carries no column metadata")
            })?;
            let schema = ColumnSchema::new(columns);
            if let Some(name) = schema.duplicate_name() {
                return Err(AthenaError::malformed(
                    &self.handle,
                    index,
                    format!("column name {name:?} appears more than once"),
                ));
            }
            self.schema = Some(schema);
        }

        let schema = self.schema.as_ref().ok_or_else(|| {
            AthenaError::malformed(&self.handle, index, "continuation page received before any schema")
        })?;

        let mut rows = page.rows.into_iter().enumerate();

        // Header echo is only present on the token-less first fetch.
        if first {
            if let Some((_, header)) = rows.next() {
                if !schema.matches_header(&header) {
                    warn!(
                        query_id = %self.handle,
                        "First row of first page does not echo the column names; skipping it anyway"
                    );
                }
            }
        }

        let mut records = Vec::with_capacity(rows.size_hint().0);
        for (row_index, row) in rows {
            let actual = row.len();
            let record = RowRecord::from_row(schema, row).ok_or_else(|| {
                AthenaError::malformed(
                    &self.handle,
                    index,
                    format!(
                        "row {row_index} has {actual} values, expected {}",
                        schema.len()
                    ),
                )
            })?;
            records.push(record);
        }

        debug!(
            query_id = %self.handle,
            page = index,
            columns = schema.len(),
            rows = records.len(),
            "Decoded results page"
        );

        self.pages += 1;
        Ok(records)
    }
}
