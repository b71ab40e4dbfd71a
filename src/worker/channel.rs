use std::sync::Arc;

use tokio::sync::oneshot;

use crate::config::ExecContext;
use crate::error::BrokerError;
use crate::operation::{BatchRequest, SqlCommand};
use crate::results::{BatchEntry, QueryResult};
use crate::session::Session;

pub(crate) type Responder<T> = oneshot::Sender<Result<T, BrokerError>>;

/// One unit of work. Units run one at a time, in the order they were sent.
pub(crate) enum Command {
    Execute {
        session: Arc<Session>,
        command: SqlCommand,
        ctx: ExecContext,
        respond_to: Responder<()>,
    },
    Insert {
        session: Arc<Session>,
        command: SqlCommand,
        no_result: bool,
        ctx: ExecContext,
        respond_to: Responder<Option<i64>>,
    },
    Update {
        session: Arc<Session>,
        command: SqlCommand,
        no_result: bool,
        ctx: ExecContext,
        respond_to: Responder<Option<u64>>,
    },
    Query {
        session: Arc<Session>,
        command: SqlCommand,
        ctx: ExecContext,
        respond_to: Responder<QueryResult>,
    },
    Batch {
        session: Arc<Session>,
        batch: BatchRequest,
        ctx: ExecContext,
        respond_to: Responder<Option<Vec<BatchEntry>>>,
    },
    Shutdown,
}
