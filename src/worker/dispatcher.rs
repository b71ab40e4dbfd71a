use std::sync::mpsc::Receiver;

use crate::config::ExecContext;
use crate::error::BrokerError;
use crate::operation::batch::run_batch;
use crate::operation::{OperationKind, SqlCommand, mutation, query, run_classified};
use crate::session::Session;

use super::channel::Command;

pub(super) fn run_worker(receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Execute {
                session,
                command,
                ctx,
                respond_to,
            } => {
                let outcome = run_on(&session, &command, OperationKind::Execute, ctx, |conn, cmd| {
                    mutation::execute(conn, cmd)
                });
                let _ = respond_to.send(outcome);
            }
            Command::Insert {
                session,
                command,
                no_result,
                ctx,
                respond_to,
            } => {
                let outcome = run_on(&session, &command, OperationKind::Insert, ctx, |conn, cmd| {
                    mutation::insert(conn, cmd, no_result)
                });
                let _ = respond_to.send(outcome);
            }
            Command::Update {
                session,
                command,
                no_result,
                ctx,
                respond_to,
            } => {
                let outcome = run_on(&session, &command, OperationKind::Update, ctx, |conn, cmd| {
                    mutation::update(conn, cmd, no_result)
                });
                let _ = respond_to.send(outcome);
            }
            Command::Query {
                session,
                command,
                ctx,
                respond_to,
            } => {
                let outcome = run_on(&session, &command, OperationKind::Query, ctx, |conn, cmd| {
                    query::query(conn, cmd, ctx.encoding)
                });
                let _ = respond_to.send(outcome);
            }
            Command::Batch {
                session,
                batch,
                ctx,
                respond_to,
            } => {
                let outcome =
                    session.with_connection(|conn| run_batch(conn, &batch, ctx, session.path()));
                let _ = respond_to.send(outcome);
            }
        }
    }
    tracing::debug!("worker drained");
}

fn run_on<T, F>(
    session: &Session,
    command: &SqlCommand,
    kind: OperationKind,
    ctx: ExecContext,
    f: F,
) -> Result<T, BrokerError>
where
    F: FnOnce(&rusqlite::Connection, &SqlCommand) -> rusqlite::Result<T>,
{
    session.with_connection(|conn| run_classified(conn, command, kind, ctx, session.path(), f))
}
