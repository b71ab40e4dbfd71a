use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::types::QueryEncoding;

/// Background priority, matching the value callers send when they do not override it.
pub const DEFAULT_WORKER_PRIORITY: i32 = 10;

const DATABASES_DIR: &str = "databases";

/// Options for configuring a [`crate::Broker`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerOptions {
    /// Directory reported by `getDatabasesPath`.
    pub databases_path: PathBuf,
    /// Return query rows as one map per row instead of columns plus value lists.
    pub query_as_map_list: bool,
    /// Priority requested for the worker thread; applied on its next start.
    pub worker_priority: i32,
    /// Log every statement the worker runs.
    pub log_sql: bool,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            databases_path: default_databases_path(),
            query_as_map_list: false,
            worker_priority: DEFAULT_WORKER_PRIORITY,
            log_sql: false,
        }
    }
}

impl BrokerOptions {
    #[must_use]
    pub fn builder() -> BrokerOptionsBuilder {
        BrokerOptionsBuilder::new()
    }
}

/// Fluent builder for [`BrokerOptions`].
#[derive(Debug, Clone, Default)]
pub struct BrokerOptionsBuilder {
    opts: BrokerOptions,
}

impl BrokerOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn databases_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.databases_path = path.into();
        self
    }

    #[must_use]
    pub fn query_as_map_list(mut self, query_as_map_list: bool) -> Self {
        self.opts.query_as_map_list = query_as_map_list;
        self
    }

    #[must_use]
    pub fn worker_priority(mut self, priority: i32) -> Self {
        self.opts.worker_priority = priority;
        self
    }

    #[must_use]
    pub fn log_sql(mut self, log_sql: bool) -> Self {
        self.opts.log_sql = log_sql;
        self
    }

    #[must_use]
    pub fn finish(self) -> BrokerOptions {
        self.opts
    }

    #[must_use]
    pub fn build(self) -> crate::Broker {
        crate::Broker::new(self.finish())
    }
}

/// Partial update sent through the `options` request. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsUpdate {
    #[serde(default)]
    pub query_as_map_list: Option<bool>,
    #[serde(default, alias = "threadPriority")]
    pub worker_priority: Option<i32>,
}

/// Snapshot of the settings a unit of work runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExecContext {
    pub(crate) encoding: QueryEncoding,
    pub(crate) log_sql: bool,
}

/// Process-wide mutable settings. Every update is last-write-wins and only affects calls
/// submitted after it returns.
#[derive(Debug)]
pub(crate) struct RuntimeSettings {
    inner: RwLock<BrokerOptions>,
}

impl RuntimeSettings {
    pub(crate) fn new(options: BrokerOptions) -> Self {
        Self {
            inner: RwLock::new(options),
        }
    }

    pub(crate) fn snapshot(&self) -> BrokerOptions {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn exec_context(&self) -> ExecContext {
        let opts = self.snapshot();
        ExecContext {
            encoding: QueryEncoding::from_map_list_flag(opts.query_as_map_list),
            log_sql: opts.log_sql,
        }
    }

    pub(crate) fn apply(&self, update: &OptionsUpdate) {
        self.modify(|opts| {
            if let Some(flag) = update.query_as_map_list {
                opts.query_as_map_list = flag;
            }
            if let Some(priority) = update.worker_priority {
                opts.worker_priority = priority;
            }
        });
    }

    pub(crate) fn set_log_sql(&self, on: bool) {
        self.modify(|opts| opts.log_sql = on);
    }

    fn modify(&self, f: impl FnOnce(&mut BrokerOptions)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

fn default_databases_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(DATABASES_DIR))
        .unwrap_or_else(|| PathBuf::from(DATABASES_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_are_partial_and_last_write_wins() {
        let settings = RuntimeSettings::new(BrokerOptions::default());
        assert_eq!(settings.exec_context().encoding, QueryEncoding::Columns);

        settings.apply(&OptionsUpdate {
            query_as_map_list: Some(true),
            worker_priority: None,
        });
        settings.apply(&OptionsUpdate {
            query_as_map_list: None,
            worker_priority: Some(-4),
        });

        let snapshot = settings.snapshot();
        assert!(snapshot.query_as_map_list);
        assert_eq!(snapshot.worker_priority, -4);
        assert_eq!(settings.exec_context().encoding, QueryEncoding::MapList);
    }

    #[test]
    fn thread_priority_is_accepted_as_alias() {
        let update: OptionsUpdate =
            serde_json::from_value(serde_json::json!({"threadPriority": 0})).unwrap();
        assert_eq!(update.worker_priority, Some(0));
        assert_eq!(update.query_as_map_list, None);
    }
}
