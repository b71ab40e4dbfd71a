use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::BrokerError;
use crate::session::{DatabasePath, Session};
use crate::types::SessionId;
use crate::worker::{ConfinedWorker, WorkerHandle};

/// Arguments of an open call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub path: DatabasePath,
    pub read_only: bool,
    /// Reuse an already open session for the same path. Ignored for in-memory databases.
    pub single_instance: bool,
}

impl OpenRequest {
    #[must_use]
    pub fn new(path: impl Into<DatabasePath>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            single_instance: true,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(DatabasePath::Memory)
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn single_instance(mut self, single_instance: bool) -> Self {
        self.single_instance = single_instance;
        self
    }

    fn effective_single_instance(&self) -> bool {
        self.single_instance && !self.path.is_memory()
    }
}

/// Result of an open call. `recovered` is set when an existing session was reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpenOutcome {
    pub id: SessionId,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub recovered: bool,
}

static REGISTRY: LazyLock<SessionRegistry> = LazyLock::new(SessionRegistry::new);

/// Process-wide session bookkeeping plus the worker lifecycle.
///
/// Opens run end to end under one lock, so a lookup-then-open for a path cannot race another
/// open of the same path. Close takes the lock twice: once to unlink the path entry and refuse
/// new work, then again after the native close to drop the id and the open count. The native
/// close itself waits for the worker, so it never runs under the lock. Worker start/stop is
/// decided in the same critical sections that change the open count.
pub(crate) struct SessionRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    last_id: u64,
    by_id: HashMap<SessionId, Arc<Session>>,
    by_path: HashMap<PathBuf, SessionId>,
    /// Ids whose close has unlinked them but not yet released the handle.
    closing: HashSet<SessionId>,
    open_count: usize,
    worker: Option<ConfinedWorker>,
    worker_generation: u64,
}

impl SessionRegistry {
    fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// The registry shared by every broker in the process.
    pub(crate) fn process() -> &'static SessionRegistry {
        &REGISTRY
    }

    pub(crate) fn open(
        &self,
        request: OpenRequest,
        worker_priority: i32,
    ) -> Result<OpenOutcome, BrokerError> {
        let single_instance = request.effective_single_instance();
        let mut state = self.lock();

        if single_instance
            && let Some(file) = request.path.file()
            && let Some(&id) = state.by_path.get(file)
            && let Some(existing) = state.by_id.get(&id)
        {
            if existing.is_open() {
                tracing::debug!(%id, path = %request.path, open_count = state.open_count, "re-opened single instance");
                return Ok(OpenOutcome {
                    id,
                    recovered: true,
                });
            }
            // the stale path entry stays until it is overwritten below
            tracing::debug!(%id, path = %request.path, "single instance not open");
        }

        if let Some(file) = request.path.file() {
            ensure_parent_dir(file).map_err(|err| BrokerError::open_failed(&request.path, err))?;
        }

        state.last_id += 1;
        let id = SessionId(state.last_id);
        let session = Session::open(id, request.path.clone(), request.read_only, single_instance)?;

        if state.open_count == 0 {
            state.worker_generation += 1;
            let worker = ConfinedWorker::spawn(state.worker_generation, worker_priority).map_err(
                |err| {
                    BrokerError::open_failed(
                        &request.path,
                        format!("failed to spawn worker thread: {err}"),
                    )
                },
            )?;
            state.worker = Some(worker);
        }
        state.open_count += 1;

        if single_instance && let Some(file) = request.path.file() {
            state.by_path.insert(file.to_path_buf(), id);
        }
        state.by_id.insert(id, Arc::new(session));
        tracing::debug!(%id, path = %request.path, open_count = state.open_count, "opened");

        Ok(OpenOutcome {
            id,
            recovered: false,
        })
    }

    pub(crate) fn close(&self, id: SessionId) -> Result<(), BrokerError> {
        let session = {
            let mut state = self.lock();
            if state.closing.contains(&id) {
                return Err(BrokerError::DatabaseClosed(id));
            }
            let session = state
                .by_id
                .get(&id)
                .cloned()
                .ok_or(BrokerError::DatabaseClosed(id))?;
            tracing::debug!(%id, path = %session.path(), open_count = state.open_count, "closing");

            if session.single_instance()
                && let Some(file) = session.path().file()
            {
                // removed by path, whichever id it currently names
                state.by_path.remove(file);
            }
            session.mark_closed();
            state.closing.insert(id);
            session
        };

        // the handle is released before the id disappears from the registry
        session.release();

        let mut state = self.lock();
        state.closing.remove(&id);
        state.by_id.remove(&id);
        state.open_count = state.open_count.saturating_sub(1);
        if state.open_count == 0 {
            state.worker = None;
        }
        tracing::debug!(%id, open_count = state.open_count, "closed");
        Ok(())
    }

    /// The session for `id` and a handle to submit work for it.
    pub(crate) fn lookup(&self, id: SessionId) -> Result<(Arc<Session>, WorkerHandle), BrokerError> {
        let state = self.lock();
        if state.closing.contains(&id) {
            return Err(BrokerError::DatabaseClosed(id));
        }
        let session = state
            .by_id
            .get(&id)
            .cloned()
            .ok_or(BrokerError::DatabaseClosed(id))?;
        let worker = state
            .worker
            .as_ref()
            .map(ConfinedWorker::handle)
            .ok_or(BrokerError::DatabaseClosed(id))?;
        Ok((session, worker))
    }

    pub(crate) fn snapshot(&self) -> RegistrySnapshot {
        let state = self.lock();
        let mut sessions: Vec<SessionId> = state.by_id.keys().copied().collect();
        sessions.sort();
        let mut paths: Vec<(PathBuf, SessionId)> = state
            .by_path
            .iter()
            .map(|(path, id)| (path.clone(), *id))
            .collect();
        paths.sort();
        RegistrySnapshot {
            sessions,
            paths,
            open_count: state.open_count,
            worker_running: state.worker.is_some(),
            worker_generation: state.worker_generation,
        }
    }

    pub(crate) fn release_handle(&self, id: SessionId) -> Result<(), BrokerError> {
        let session = self.lookup(id)?.0;
        session.release();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Point-in-time copy of the registry, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Registered session ids, ascending.
    pub sessions: Vec<SessionId>,
    /// Single-instance path entries, sorted by path.
    pub paths: Vec<(PathBuf, SessionId)>,
    pub open_count: usize,
    pub worker_running: bool,
    /// How many times the worker has been started.
    pub worker_generation: u64,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn path_entry(&self, path: &Path) -> Option<SessionId> {
        self.paths
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, id)| *id)
    }
}

fn ensure_parent_dir(file: &Path) -> std::io::Result<()> {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
