use serde::Deserialize;

use crate::config::ExecContext;
use crate::error::BrokerError;
use crate::results::BatchEntry;
use crate::session::DatabasePath;
use crate::types::CellValue;

use super::{Operation, OperationKind, SqlCommand, run_operation};

/// One item of a batch as sent by the caller: a method name plus its statement.
///
/// The method is resolved when the item is reached, so an unknown method only fails the
/// batch after the items before it have run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchOperation {
    pub method: String,
    #[serde(default)]
    pub sql: String,
    #[serde(default, deserialize_with = "super::nullable_arguments")]
    pub arguments: Vec<CellValue>,
}

impl BatchOperation {
    #[must_use]
    pub fn new(method: impl Into<String>, command: SqlCommand) -> Self {
        Self {
            method: method.into(),
            sql: command.sql,
            arguments: command.arguments,
        }
    }

    #[must_use]
    pub fn execute(command: impl Into<SqlCommand>) -> Self {
        Self::new(super::METHOD_EXECUTE, command.into())
    }

    #[must_use]
    pub fn insert(command: impl Into<SqlCommand>) -> Self {
        Self::new(super::METHOD_INSERT, command.into())
    }

    #[must_use]
    pub fn update(command: impl Into<SqlCommand>) -> Self {
        Self::new(super::METHOD_UPDATE, command.into())
    }

    #[must_use]
    pub fn query(command: impl Into<SqlCommand>) -> Self {
        Self::new(super::METHOD_QUERY, command.into())
    }

    fn resolve(&self, no_result: bool) -> Result<Operation, BrokerError> {
        let kind = OperationKind::from_method(&self.method).ok_or_else(|| {
            BrokerError::BadParameter(format!("Batch method '{}' not supported", self.method))
        })?;
        let command = SqlCommand::new(self.sql.clone(), self.arguments.clone());
        Ok(Operation::new(kind, command).with_no_result(no_result))
    }
}

/// An ordered list of operations run as one unit on the worker.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub operations: Vec<BatchOperation>,
    #[serde(default)]
    pub no_result: bool,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl BatchRequest {
    #[must_use]
    pub fn new(operations: Vec<BatchOperation>) -> Self {
        Self {
            operations,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn no_result(mut self, no_result: bool) -> Self {
        self.no_result = no_result;
        self
    }

    #[must_use]
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// Run every item in order.
///
/// Returns `None` when `no_result` is set, otherwise one entry per item (error entries
/// included when `continue_on_error` is set). Without `continue_on_error` the first failure
/// aborts the batch and is returned on its own. No transaction is opened here.
pub(crate) fn run_batch(
    conn: &rusqlite::Connection,
    batch: &BatchRequest,
    ctx: ExecContext,
    path: &DatabasePath,
) -> Result<Option<Vec<BatchEntry>>, BrokerError> {
    let mut results = Vec::with_capacity(if batch.no_result { 0 } else { batch.operations.len() });

    for (index, item) in batch.operations.iter().enumerate() {
        let operation = item.resolve(batch.no_result)?;
        match run_operation(conn, &operation, ctx, path) {
            Ok(output) => {
                if !batch.no_result {
                    results.push(BatchEntry::Result(output));
                }
            }
            Err(err) if batch.continue_on_error => {
                tracing::warn!(index, error = %err, "batch item failed, continuing");
                if !batch.no_result {
                    results.push(BatchEntry::Error(err.to_payload()));
                }
            }
            Err(err) => return Err(err),
        }
    }

    Ok((!batch.no_result).then_some(results))
}
