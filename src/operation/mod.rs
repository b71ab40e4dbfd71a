// Operation module - typed database operations run on the confined worker
//
// - mutation: execute / insert / update plus the introspection follow-ups
// - query: sanitized reads materialized into a QueryResult
// - batch: ordered heterogeneous operations with continue-on-error handling

pub mod batch;
pub mod mutation;
pub mod query;

use serde::Deserialize;

use crate::config::ExecContext;
use crate::error::{BrokerError, classify};
use crate::results::OperationOutput;
use crate::session::DatabasePath;
use crate::types::CellValue;

pub use batch::{BatchOperation, BatchRequest};

pub const METHOD_EXECUTE: &str = "execute";
pub const METHOD_INSERT: &str = "insert";
pub const METHOD_UPDATE: &str = "update";
pub const METHOD_QUERY: &str = "query";

/// A statement and the arguments bound to it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqlCommand {
    pub sql: String,
    #[serde(default, deserialize_with = "nullable_arguments")]
    pub arguments: Vec<CellValue>,
}

impl SqlCommand {
    #[must_use]
    pub fn new(sql: impl Into<String>, arguments: Vec<CellValue>) -> Self {
        Self {
            sql: sql.into(),
            arguments,
        }
    }

    #[must_use]
    pub fn without_arguments(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    /// Rebind integer arguments as literals for read queries.
    #[must_use]
    pub fn sanitize_for_query(&self) -> SqlCommand {
        match crate::sanitize::inline_integer_arguments(&self.sql, &self.arguments) {
            Some((sql, arguments)) => SqlCommand { sql, arguments },
            None => self.clone(),
        }
    }
}

impl From<&str> for SqlCommand {
    fn from(sql: &str) -> Self {
        SqlCommand::without_arguments(sql)
    }
}

pub(crate) fn nullable_arguments<'de, D>(deserializer: D) -> Result<Vec<CellValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<CellValue>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The four single-statement operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Execute,
    Insert,
    Update,
    Query,
}

impl OperationKind {
    #[must_use]
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            METHOD_EXECUTE => Some(OperationKind::Execute),
            METHOD_INSERT => Some(OperationKind::Insert),
            METHOD_UPDATE => Some(OperationKind::Update),
            METHOD_QUERY => Some(OperationKind::Query),
            _ => None,
        }
    }
}

/// One decoded operation ready to run against a session's engine handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub command: SqlCommand,
    /// Skip the introspection query for insert/update.
    pub no_result: bool,
}

impl Operation {
    #[must_use]
    pub fn new(kind: OperationKind, command: SqlCommand) -> Self {
        Self {
            kind,
            command,
            no_result: false,
        }
    }

    #[must_use]
    pub fn with_no_result(mut self, no_result: bool) -> Self {
        self.no_result = no_result;
        self
    }
}

/// Run one operation and classify any engine failure against its statement.
///
/// Must be called on the worker: insert/update rely on nothing else touching the engine
/// between the mutation and its introspection query.
pub(crate) fn run_operation(
    conn: &rusqlite::Connection,
    operation: &Operation,
    ctx: ExecContext,
    path: &DatabasePath,
) -> Result<OperationOutput, BrokerError> {
    let command = &operation.command;
    match operation.kind {
        OperationKind::Execute => {
            run_classified(conn, command, operation.kind, ctx, path, mutation::execute)
                .map(|()| OperationOutput::Nothing)
        }
        OperationKind::Insert => run_classified(conn, command, operation.kind, ctx, path, |c, cmd| {
            mutation::insert(c, cmd, operation.no_result)
        })
        .map(OperationOutput::RowId),
        OperationKind::Update => run_classified(conn, command, operation.kind, ctx, path, |c, cmd| {
            mutation::update(c, cmd, operation.no_result)
        })
        .map(OperationOutput::Changes),
        OperationKind::Query => run_classified(conn, command, operation.kind, ctx, path, |c, cmd| {
            query::query(c, cmd, ctx.encoding)
        })
        .map(OperationOutput::Rows),
    }
}

pub(crate) fn run_classified<T, F>(
    conn: &rusqlite::Connection,
    command: &SqlCommand,
    kind: OperationKind,
    ctx: ExecContext,
    path: &DatabasePath,
    f: F,
) -> Result<T, BrokerError>
where
    F: FnOnce(&rusqlite::Connection, &SqlCommand) -> rusqlite::Result<T>,
{
    if ctx.log_sql {
        tracing::debug!(%path, ?kind, sql = %command.sql, arguments = ?command.arguments, "running");
    }
    f(conn, command).map_err(|err| classify(&err, command, path))
}
