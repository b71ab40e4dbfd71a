use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags};

use crate::error::BrokerError;
use crate::types::SessionId;

/// Path sentinel for a private in-memory database.
pub const MEMORY_DATABASE_PATH: &str = ":memory:";

/// Where a session's database lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatabasePath {
    /// Private in-memory database; never shared, never reused.
    Memory,
    File(PathBuf),
}

impl DatabasePath {
    /// Interpret a caller-supplied path; an absent path or `:memory:` means in-memory.
    #[must_use]
    pub fn parse(path: Option<&str>) -> Self {
        match path {
            None | Some(MEMORY_DATABASE_PATH) => DatabasePath::Memory,
            Some(path) => DatabasePath::File(PathBuf::from(path)),
        }
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(self, DatabasePath::Memory)
    }

    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        match self {
            DatabasePath::Memory => None,
            DatabasePath::File(path) => Some(path),
        }
    }
}

impl fmt::Display for DatabasePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabasePath::Memory => f.write_str(MEMORY_DATABASE_PATH),
            DatabasePath::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<&str> for DatabasePath {
    fn from(path: &str) -> Self {
        DatabasePath::parse(Some(path))
    }
}

impl From<PathBuf> for DatabasePath {
    fn from(path: PathBuf) -> Self {
        DatabasePath::File(path)
    }
}

impl From<&Path> for DatabasePath {
    fn from(path: &Path) -> Self {
        DatabasePath::File(path.to_path_buf())
    }
}

/// One open handle to a database file or in-memory instance.
///
/// The engine handle is owned exclusively by the session. Once registered it is only touched
/// from the confined worker, except for the final release performed by close.
///
/// `open` is cleared before the handle is released, so bookkeeping can ask whether the
/// session is live without waiting on the handle while the worker is using it.
pub struct Session {
    id: SessionId,
    path: DatabasePath,
    single_instance: bool,
    read_only: bool,
    open: AtomicBool,
    handle: Mutex<Option<Connection>>,
}

impl Session {
    /// Open (or create) the database and wrap it in a session.
    ///
    /// # Errors
    /// Returns [`BrokerError::OpenFailed`] if the engine refuses the path.
    pub(crate) fn open(
        id: SessionId,
        path: DatabasePath,
        read_only: bool,
        single_instance: bool,
    ) -> Result<Self, BrokerError> {
        let conn = match (&path, read_only) {
            (DatabasePath::Memory, _) => Connection::open_in_memory(),
            (DatabasePath::File(file), false) => Connection::open(file),
            (DatabasePath::File(file), true) => Connection::open_with_flags(
                file,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        }
        .map_err(|err| BrokerError::open_failed(&path, err))?;

        Ok(Self {
            id,
            path,
            single_instance,
            read_only,
            open: AtomicBool::new(true),
            handle: Mutex::new(Some(conn)),
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn path(&self) -> &DatabasePath {
        &self.path
    }

    #[must_use]
    pub fn single_instance(&self) -> bool {
        self.single_instance
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the session still accepts work. Cleared as soon as a close begins.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Refuse any unit that has not started yet. The handle itself stays until `release`.
    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Run `f` against the engine handle.
    ///
    /// # Errors
    /// Returns [`BrokerError::DatabaseClosed`] once the handle has been released, otherwise
    /// whatever `f` returns.
    pub(crate) fn with_connection<T, F>(&self, f: F) -> Result<T, BrokerError>
    where
        F: FnOnce(&mut Connection) -> Result<T, BrokerError>,
    {
        if !self.is_open() {
            return Err(BrokerError::DatabaseClosed(self.id));
        }
        let mut guard = self.lock_handle();
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(BrokerError::DatabaseClosed(self.id)),
        }
    }

    /// Release the engine handle. Waits for any unit of work currently using it.
    pub(crate) fn release(&self) {
        self.mark_closed();
        let Some(conn) = self.lock_handle().take() else {
            return;
        };
        if let Err((_conn, err)) = conn.close() {
            // the handle is dropped either way; dropping finalizes it
            tracing::warn!(id = %self.id, path = %self.path, error = %err, "native close reported an error");
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<Connection>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("single_instance", &self.single_instance)
            .field("read_only", &self.read_only)
            .field("open", &self.is_open())
            .finish()
    }
}
