use std::collections::{HashMap, HashSet};

use sqlite_broker::{
    BatchEntry, BrokerError, ErrorKind, OperationOutput, QueryResult, RegistrySnapshot, SessionId,
};

use crate::model::{Expect, PendingReply, Slot, Submitted};

/// A reply after it has been awaited.
#[derive(Debug)]
pub(crate) enum Resolved {
    RowId(Option<i64>),
    Changes(Option<u64>),
    Rows(QueryResult),
    Batch(Option<Vec<BatchEntry>>),
}

pub(crate) fn resolve(reply: PendingReply) -> Result<Resolved, BrokerError> {
    match reply {
        PendingReply::Insert(reply) => reply.wait().map(Resolved::RowId),
        PendingReply::Update(reply) => reply.wait().map(Resolved::Changes),
        PendingReply::Count(reply) => reply.wait().map(Resolved::Rows),
        PendingReply::Batch(reply) => reply.wait().map(Resolved::Batch),
    }
}

#[derive(Default)]
struct Progress {
    last_ok: u64,
    first_closed: Option<u64>,
}

/// Tracks per-session completion so a unit can never succeed after an earlier one was
/// refused as closed.
#[derive(Default)]
pub(crate) struct Oracle {
    progress: HashMap<SessionId, Progress>,
    closed: HashSet<SessionId>,
}

impl Oracle {
    pub(crate) fn session_closed(&mut self, id: SessionId) {
        self.closed.insert(id);
    }

    pub(crate) fn check_reply(
        &mut self,
        pending: &Submitted,
        outcome: &Result<Resolved, BrokerError>,
    ) -> Result<(), String> {
        let id = pending.session;
        if pending.expect == Expect::Closed {
            return match outcome {
                Err(err) if err.kind() == ErrorKind::DatabaseClosed => Ok(()),
                Err(err) => Err(format!("closed session {id} failed with {err}")),
                Ok(got) => Err(format!("closed session {id} produced {got:?}")),
            };
        }
        let progress = self.progress.entry(id).or_default();
        match outcome {
            Err(err) if err.kind() == ErrorKind::DatabaseClosed => {
                if !self.closed.contains(&id) {
                    return Err(format!(
                        "session {id} seq {} refused as closed while still open",
                        pending.seq
                    ));
                }
                if pending.seq < progress.last_ok {
                    return Err(format!(
                        "session {id} seq {} refused after seq {} ran",
                        pending.seq, progress.last_ok
                    ));
                }
                progress.first_closed = Some(
                    progress
                        .first_closed
                        .map_or(pending.seq, |seq| seq.min(pending.seq)),
                );
                Ok(())
            }
            Err(err) => Err(format!(
                "session {id} seq {} failed unexpectedly: {err}",
                pending.seq
            )),
            Ok(resolved) => {
                if let Some(first_closed) = progress.first_closed
                    && pending.seq > first_closed
                {
                    return Err(format!(
                        "session {id} seq {} ran after seq {first_closed} was refused",
                        pending.seq
                    ));
                }
                progress.last_ok = progress.last_ok.max(pending.seq);
                check_value(&pending.expect, resolved)
                    .map_err(|reason| format!("session {id} seq {}: {reason}", pending.seq))
            }
        }
    }

    pub(crate) fn check_registry(slots: &[Slot], snapshot: &RegistrySnapshot) -> Result<(), String> {
        let mut open: Vec<SessionId> = slots.iter().filter_map(|slot| slot.session).collect();
        open.sort();
        if snapshot.sessions != open {
            return Err(format!(
                "registry holds {:?}, model expects {:?}",
                snapshot.sessions, open
            ));
        }
        if snapshot.open_count != open.len() {
            return Err(format!(
                "open count {} but {} sessions open",
                snapshot.open_count,
                open.len()
            ));
        }
        if snapshot.worker_running != !open.is_empty() {
            return Err(format!(
                "worker running={} with {} sessions open",
                snapshot.worker_running,
                open.len()
            ));
        }
        for slot in slots {
            let Some(path) = &slot.path else {
                continue;
            };
            let entry = snapshot.path_entry(path);
            if entry != slot.session {
                return Err(format!(
                    "path {} maps to {entry:?}, model expects {:?}",
                    path.display(),
                    slot.session
                ));
            }
        }
        Ok(())
    }
}

fn check_value(expect: &Expect, resolved: &Resolved) -> Result<(), String> {
    match (expect, resolved) {
        (Expect::RowId(want), Resolved::RowId(got)) if *got == Some(*want) => Ok(()),
        (Expect::Changes(want), Resolved::Changes(got)) if *got == Some(*want) => Ok(()),
        (Expect::Count { rows, map_list }, Resolved::Rows(result)) => {
            if matches!(result, QueryResult::MapList(_)) != *map_list {
                return Err(format!("query shape {result:?}, map_list={map_list}"));
            }
            expect_count(result, *rows)
        }
        (Expect::Batch { row_ids, rows }, Resolved::Batch(Some(entries))) => {
            if entries.len() != row_ids.len() + 1 {
                return Err(format!("batch returned {} entries", entries.len()));
            }
            for (entry, want) in entries.iter().zip(row_ids) {
                if entry.output() != Some(&OperationOutput::RowId(Some(*want))) {
                    return Err(format!("batch insert gave {entry:?}, expected row {want}"));
                }
            }
            match entries.last().and_then(BatchEntry::output) {
                Some(OperationOutput::Rows(result)) => expect_count(result, *rows),
                other => Err(format!("batch count gave {other:?}")),
            }
        }
        (want, got) => Err(format!("expected {want:?}, got {got:?}")),
    }
}

/// The single `n` cell of a count query, in either encoding.
pub(crate) fn count_of(result: &QueryResult) -> Option<i64> {
    match result {
        QueryResult::Columns { rows, .. } => rows.first().and_then(|row| row.first()),
        QueryResult::MapList(rows) => rows.first().and_then(|row| row.get("n")),
    }
    .and_then(|cell| cell.as_integer())
}

fn expect_count(result: &QueryResult, rows: i64) -> Result<(), String> {
    let got = count_of(result);
    if got == Some(rows) {
        Ok(())
    } else {
        Err(format!("count {got:?}, expected {rows}"))
    }
}
