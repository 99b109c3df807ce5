use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One raw page as returned by the results endpoint.
///
/// Cells are `Option<String>` where `None` represents SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPage {
    /// Column names from the page's result-set metadata, when present.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Raw rows in service order.
    pub rows: Vec<Vec<Option<String>>>,
    /// Continuation token; `None` marks the last page.
    #[serde(default)]
    pub next_token: Option<String>,
}

impl ResultPage {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

/// Ordered column names, fixed for a whole result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSchema(Vec<String>);

impl ColumnSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Finds the zero-based index of a column by name (case-sensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|c| c == name)
    }

    /// First column name that appears more than once, if any.
    pub fn duplicate_name(&self) -> Option<&str> {
        self.0
            .iter()
            .enumerate()
            .find(|(i, name)| self.0[..*i].contains(*name))
            .map(|(_, name)| name.as_str())
    }

    /// Whether a raw row echoes the column names, i.e. is a header row.
    pub fn matches_header(&self, row: &[Option<String>]) -> bool {
        row.len() == self.0.len()
            && row
                .iter()
                .zip(&self.0)
                .all(|(cell, name)| cell.as_deref() == Some(name.as_str()))
    }
}

/// A single decoded data row keyed by column name, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowRecord(IndexMap<String, Option<String>>);

impl RowRecord {
    /// Zip a raw row against the schema.
    ///
    /// Returns `None` when the value count differs from the column count, or
    /// when repeated column names would collapse two cells into one key.
    pub fn from_row(schema: &ColumnSchema, row: Vec<Option<String>>) -> Option<Self> {
        if row.len() != schema.len() {
            return None;
        }
        let map: IndexMap<_, _> = schema.names().iter().cloned().zip(row).collect();
        (map.len() == schema.len()).then_some(Self(map))
    }

    /// Value of `column`; `None` if the column is unknown or the cell is NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column)?.as_deref()
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl fmt::Display for RowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value.unwrap_or("NULL"))?;
        }
        Ok(())
    }
}
