use std::collections::VecDeque;
use std::path::PathBuf;

use sqlite_broker::{BatchEntry, QueryResult, Reply, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Open(usize),
    Close(usize),
    Insert(usize),
    Update(usize),
    Count(usize),
    Batch(usize, usize),
    ToggleEncoding,
    Await,
    Sleep(u64),
}

/// What the oracle expects a reply to resolve to, fixed when the unit is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expect {
    RowId(i64),
    Changes(u64),
    Count { rows: i64, map_list: bool },
    /// Row ids of the inserted items, then the trailing count.
    Batch { row_ids: Vec<i64>, rows: i64 },
    /// Submitted against a session that was already closed.
    Closed,
}

pub(crate) enum PendingReply {
    Insert(Reply<Option<i64>>),
    Update(Reply<Option<u64>>),
    Count(Reply<QueryResult>),
    Batch(Reply<Option<Vec<BatchEntry>>>),
}

/// A submitted unit as the oracle sees it.
#[derive(Debug, Clone)]
pub(crate) struct Submitted {
    pub(crate) session: SessionId,
    /// Position of the unit among everything submitted for `session`.
    pub(crate) seq: u64,
    pub(crate) expect: Expect,
}

pub(crate) struct Pending {
    pub(crate) unit: Submitted,
    pub(crate) reply: PendingReply,
}

/// Replies a simulated caller has not awaited yet, oldest first.
#[derive(Default)]
pub(crate) struct Caller {
    pub(crate) pending: VecDeque<Pending>,
}

/// One database the simulation opens and closes repeatedly.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    /// `None` for the in-memory slot.
    pub(crate) path: Option<PathBuf>,
    /// Currently open session, if any.
    pub(crate) session: Option<SessionId>,
    /// Last session this slot had, kept so work can still be aimed at it after close.
    pub(crate) last_session: Option<SessionId>,
    /// Rows the slot's table holds once every submitted unit has run.
    pub(crate) rows: i64,
    pub(crate) submitted: u64,
}

impl Slot {
    pub(crate) fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            session: None,
            last_session: None,
            rows: 0,
            submitted: 0,
        }
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.submitted += 1;
        self.submitted
    }

    pub(crate) fn label(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }
}
