use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ErrorPayload;
use crate::types::{CellValue, QueryEncoding};

/// Fully materialized rows of a query, shaped per [`QueryEncoding`].
///
/// ```rust
/// use sqlite_broker::prelude::*;
///
/// let result = QueryResult::Columns {
///     columns: vec!["name".into()],
///     rows: vec![vec![CellValue::Text("a".into())]],
/// };
/// assert_eq!(result.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// One column-name to value map per row.
    MapList(Vec<BTreeMap<String, CellValue>>),
    /// Column names once, then one value list per row.
    Columns {
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    },
}

impl QueryResult {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            QueryResult::MapList(rows) => rows.len(),
            QueryResult::Columns { rows, .. } => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accumulates rows while a cursor is walked on the worker.
pub(crate) struct ResultBuilder {
    encoding: QueryEncoding,
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ResultBuilder {
    pub(crate) fn new(encoding: QueryEncoding, columns: Vec<String>) -> Self {
        Self {
            encoding,
            columns,
            rows: Vec::with_capacity(10),
        }
    }

    pub(crate) fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub(crate) fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub(crate) fn finish(self) -> QueryResult {
        match self.encoding {
            QueryEncoding::Columns => QueryResult::Columns {
                columns: self.columns,
                rows: self.rows,
            },
            QueryEncoding::MapList => QueryResult::MapList(
                self.rows
                    .into_iter()
                    .map(|row| self.columns.iter().cloned().zip(row).collect())
                    .collect(),
            ),
        }
    }
}

/// Value produced by one operation, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationOutput {
    /// Execute succeeded; nothing to report.
    Nothing,
    /// Inserted row id, or `None` when nothing was inserted or no result was wanted.
    RowId(Option<i64>),
    /// Affected row count, or `None` when it could not be read or no result was wanted.
    Changes(Option<u64>),
    Rows(QueryResult),
}

/// One entry of a batch result sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchEntry {
    Result(OperationOutput),
    Error(ErrorPayload),
}

impl BatchEntry {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, BatchEntry::Error(_))
    }

    #[must_use]
    pub fn output(&self) -> Option<&OperationOutput> {
        match self {
            BatchEntry::Result(output) => Some(output),
            BatchEntry::Error(_) => None,
        }
    }
}
