use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use serde::Serialize;
use serde_json::Value;

use crate::config::{BrokerOptions, ExecContext, OptionsUpdate, RuntimeSettings};
use crate::error::BrokerError;
use crate::operation::{BatchRequest, SqlCommand};
use crate::registry::{OpenOutcome, OpenRequest, RegistrySnapshot, SessionRegistry};
use crate::request::{MethodCall, Request};
use crate::results::{BatchEntry, QueryResult};
use crate::session::Session;
use crate::types::SessionId;
use crate::worker::{Command, Reply, Responder};

static GLOBAL: LazyLock<Broker> = LazyLock::new(|| Broker::new(BrokerOptions::default()));

/// Entry point for every database call.
///
/// Every broker in the process shares one session registry and one confined worker, so session
/// ids are unique process-wide. Only the runtime options belong to the broker itself.
///
/// Open and close run on the calling thread. Everything that touches an engine handle is
/// queued to the confined worker, in submission order, and comes back as a [`Reply`].
///
/// ```rust,no_run
/// use sqlite_broker::prelude::*;
///
/// # async fn demo() -> Result<(), BrokerError> {
/// let broker = Broker::new(BrokerOptions::default());
/// let OpenOutcome { id, .. } = broker.open_database(OpenRequest::in_memory())?;
/// broker.execute(id, "CREATE TABLE t (name TEXT)".into()).await?;
/// let row_id = broker
///     .insert(id, SqlCommand::new("INSERT INTO t VALUES (?)", vec!["a".into()]), false)
///     .await?;
/// assert_eq!(row_id, Some(1));
/// broker.close_database(id)?;
/// # Ok(())
/// # }
/// ```
pub struct Broker {
    registry: &'static SessionRegistry,
    settings: RuntimeSettings,
}

impl Broker {
    #[must_use]
    pub fn new(options: BrokerOptions) -> Self {
        Self {
            registry: SessionRegistry::process(),
            settings: RuntimeSettings::new(options),
        }
    }

    /// The process-wide broker, created with default options on first use.
    pub fn global() -> &'static Broker {
        &GLOBAL
    }

    /// Open a session, or hand back the live one registered for the same path.
    ///
    /// # Errors
    /// [`BrokerError::OpenFailed`] when the file (or its directory) cannot be opened or
    /// created, or the worker cannot be started.
    pub fn open_database(&self, request: OpenRequest) -> Result<OpenOutcome, BrokerError> {
        let priority = self.settings.snapshot().worker_priority;
        self.registry.open(request, priority)
    }

    /// Close a session. Units already queued for it resolve to
    /// [`BrokerError::DatabaseClosed`].
    ///
    /// # Errors
    /// [`BrokerError::DatabaseClosed`] if `id` is not registered.
    pub fn close_database(&self, id: SessionId) -> Result<(), BrokerError> {
        self.registry.close(id)
    }

    pub fn execute(&self, id: SessionId, command: SqlCommand) -> Reply<()> {
        self.submit(id, |session, ctx, respond_to| Command::Execute {
            session,
            command,
            ctx,
            respond_to,
        })
    }

    /// Run an insert and report the new row id. `None` when nothing was inserted or
    /// `no_result` is set.
    pub fn insert(&self, id: SessionId, command: SqlCommand, no_result: bool) -> Reply<Option<i64>> {
        self.submit(id, |session, ctx, respond_to| Command::Insert {
            session,
            command,
            no_result,
            ctx,
            respond_to,
        })
    }

    /// Run an update or delete and report the changed row count. `None` when `no_result` is
    /// set.
    pub fn update(&self, id: SessionId, command: SqlCommand, no_result: bool) -> Reply<Option<u64>> {
        self.submit(id, |session, ctx, respond_to| Command::Update {
            session,
            command,
            no_result,
            ctx,
            respond_to,
        })
    }

    /// Encoded with the row shape in effect when the call is made.
    pub fn query(&self, id: SessionId, command: SqlCommand) -> Reply<QueryResult> {
        self.submit(id, |session, ctx, respond_to| Command::Query {
            session,
            command,
            ctx,
            respond_to,
        })
    }

    pub fn batch(&self, id: SessionId, batch: BatchRequest) -> Reply<Option<Vec<BatchEntry>>> {
        self.submit(id, |session, ctx, respond_to| Command::Batch {
            session,
            batch,
            ctx,
            respond_to,
        })
    }

    #[must_use]
    pub fn databases_path(&self) -> PathBuf {
        self.settings.snapshot().databases_path
    }

    pub fn set_options(&self, update: &OptionsUpdate) {
        self.settings.apply(update);
        tracing::debug!(?update, "options updated");
    }

    /// Toggle logging of every statement the worker runs.
    pub fn set_debug_mode(&self, on: bool) {
        self.settings.set_log_sql(on);
    }

    #[must_use]
    pub fn settings(&self) -> BrokerOptions {
        self.settings.snapshot()
    }

    #[must_use]
    pub fn registry_snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    /// Close the engine handle of `id` while leaving its registry entries in place.
    #[doc(hidden)]
    pub fn release_handle_for_tests(&self, id: SessionId) -> Result<(), BrokerError> {
        self.registry.release_handle(id)
    }

    /// Decode and run one method-channel call, producing its JSON result.
    ///
    /// # Errors
    /// [`BrokerError::BadParameter`] for an unknown method or malformed arguments, otherwise
    /// whatever the call itself fails with.
    pub async fn handle(&self, call: MethodCall) -> Result<Value, BrokerError> {
        match Request::try_from(call)? {
            Request::OpenDatabase(request) => to_json(&self.open_database(request)?),
            Request::CloseDatabase(id) => {
                self.close_database(id)?;
                Ok(Value::Null)
            }
            Request::Execute { id, command } => {
                self.execute(id, command).await?;
                Ok(Value::Null)
            }
            Request::Insert {
                id,
                command,
                no_result,
            } => to_json(&self.insert(id, command, no_result).await?),
            Request::Update {
                id,
                command,
                no_result,
            } => to_json(&self.update(id, command, no_result).await?),
            Request::Query { id, command } => to_json(&self.query(id, command).await?),
            Request::Batch { id, batch } => to_json(&self.batch(id, batch).await?),
            Request::GetDatabasesPath => Ok(Value::String(
                self.databases_path().to_string_lossy().into_owned(),
            )),
            Request::Options(update) => {
                self.set_options(&update);
                Ok(Value::Null)
            }
            Request::DebugMode(on) => {
                self.set_debug_mode(on);
                Ok(Value::Null)
            }
        }
    }

    fn submit<T>(
        &self,
        id: SessionId,
        build: impl FnOnce(Arc<Session>, ExecContext, Responder<T>) -> Command,
    ) -> Reply<T> {
        let (session, worker) = match self.registry.lookup(id) {
            Ok(found) => found,
            Err(err) => return Reply::failed(id, err),
        };
        let ctx = self.settings.exec_context();
        worker.request(id, |respond_to| build(session, ctx, respond_to))
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerOptions::default())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, BrokerError> {
    serde_json::to_value(value).map_err(|err| BrokerError::Sql {
        message: format!("failed to encode result: {err}"),
        context: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn calls_on_unknown_sessions_resolve_closed() {
        let broker = Broker::default();
        let err = broker
            .query(SessionId(u64::MAX), "SELECT 1".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseClosed);
        let err = broker.close_database(SessionId(u64::MAX)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseClosed);
    }

    #[tokio::test]
    #[serial]
    async fn insert_reports_row_ids_in_order() {
        let broker = Broker::default();
        let id = broker.open_database(OpenRequest::in_memory()).unwrap().id;
        broker
            .execute(id, "CREATE TABLE t (name TEXT)".into())
            .await
            .unwrap();
        let first = broker.insert(id, SqlCommand::new("INSERT INTO t VALUES (?)", vec!["a".into()]), false);
        let second = broker.insert(id, SqlCommand::new("INSERT INTO t VALUES (?)", vec!["b".into()]), false);
        assert_eq!(second.await.unwrap(), Some(2));
        assert_eq!(first.await.unwrap(), Some(1));
        broker.close_database(id).unwrap();
        assert!(!broker.registry_snapshot().worker_running);
    }

    #[test]
    #[serial]
    fn brokers_share_ids_and_the_worker() {
        let a = Broker::default();
        let b = Broker::default();
        let first = a.open_database(OpenRequest::in_memory()).unwrap().id;
        let second = b.open_database(OpenRequest::in_memory()).unwrap().id;
        assert!(second > first);
        assert_eq!(a.registry_snapshot(), b.registry_snapshot());
        assert_eq!(a.registry_snapshot().open_count, 2);

        // each broker can reach the other's session
        assert_eq!(a.query(second, "SELECT 1".into()).wait().unwrap().len(), 1);
        b.close_database(first).unwrap();
        a.close_database(second).unwrap();
        assert!(!b.registry_snapshot().worker_running);
    }
}
