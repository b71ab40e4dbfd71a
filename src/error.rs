use serde::Serialize;
use thiserror::Error;

use crate::operation::SqlCommand;
use crate::session::DatabasePath;
use crate::types::{CellValue, SessionId};

/// Stable error kinds reported back over the request channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Engine failure while executing or querying.
    SqlError,
    /// The database file could not be opened or created.
    OpenFailed,
    /// Malformed request.
    BadParameter,
    /// The referenced session id is not registered.
    DatabaseClosed,
}

/// The statement that was running when the engine failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlErrorContext {
    pub sql: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<CellValue>,
}

impl From<&SqlCommand> for SqlErrorContext {
    fn from(command: &SqlCommand) -> Self {
        Self {
            sql: command.sql.clone(),
            arguments: command.arguments.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("open_failed {path} ({reason})")]
    OpenFailed { path: String, reason: String },

    #[error("{message}")]
    Sql {
        message: String,
        context: Option<SqlErrorContext>,
    },

    #[error("bad parameter: {0}")]
    BadParameter(String),

    #[error("database_closed {0}")]
    DatabaseClosed(SessionId),
}

impl BrokerError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::OpenFailed { .. } => ErrorKind::OpenFailed,
            BrokerError::Sql { .. } => ErrorKind::SqlError,
            BrokerError::BadParameter(_) => ErrorKind::BadParameter,
            BrokerError::DatabaseClosed(_) => ErrorKind::DatabaseClosed,
        }
    }

    #[must_use]
    pub fn context(&self) -> Option<&SqlErrorContext> {
        match self {
            BrokerError::Sql { context, .. } => context.as_ref(),
            _ => None,
        }
    }

    /// Wire form of this error: kind, message and optional statement context.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.kind(),
            message: self.to_string(),
            data: self.context().cloned(),
        }
    }

    pub(crate) fn open_failed(path: &DatabasePath, reason: impl ToString) -> Self {
        BrokerError::OpenFailed {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Serializable error as delivered to callers and embedded in batch results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SqlErrorContext>,
}

/// Classify an engine failure raised while running `command` against the session at `path`.
///
/// `CANTOPEN` surfaces as [`BrokerError::OpenFailed`]; everything else becomes
/// [`BrokerError::Sql`] carrying the statement and its arguments.
pub(crate) fn classify(
    err: &rusqlite::Error,
    command: &SqlCommand,
    path: &DatabasePath,
) -> BrokerError {
    if let rusqlite::Error::SqliteFailure(failure, _) = err
        && failure.code == rusqlite::ErrorCode::CannotOpen
    {
        return BrokerError::open_failed(path, err);
    }
    BrokerError::Sql {
        message: err.to_string(),
        context: Some(SqlErrorContext::from(command)),
    }
}
