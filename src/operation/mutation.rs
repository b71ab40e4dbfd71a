use rusqlite::Connection;

use crate::params::as_params;

use super::SqlCommand;

const CHANGES_AND_ROWID: &str = "SELECT changes(), last_insert_rowid()";
const CHANGES: &str = "SELECT changes()";

/// Run a statement for its side effect, stepping it to completion.
///
/// Statements that produce rows (`PRAGMA journal_mode = WAL`, a stray `SELECT`) are tolerated;
/// their rows are discarded.
pub(crate) fn execute(conn: &Connection, command: &SqlCommand) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(&command.sql)?;
    let params = as_params(&command.arguments);
    let mut rows = stmt.query(&params[..])?;
    while rows.next()?.is_some() {}
    Ok(())
}

/// Insert, then read `changes()` and `last_insert_rowid()` in the same worker turn.
///
/// Zero changes (e.g. `INSERT OR IGNORE` hitting a conflict) yields `None` rather than the
/// rowid of some earlier insert.
pub(crate) fn insert(
    conn: &Connection,
    command: &SqlCommand,
    no_result: bool,
) -> rusqlite::Result<Option<i64>> {
    execute(conn, command)?;
    if no_result {
        return Ok(None);
    }

    let mut stmt = conn.prepare(CHANGES_AND_ROWID)?;
    let mut rows = stmt.query([])?;
    let Some(row) = rows.next()? else {
        tracing::error!("failed to read changes for insert");
        return Ok(None);
    };
    let changed: i64 = row.get(0)?;
    let id: i64 = row.get(1)?;
    if changed == 0 {
        tracing::debug!(last_insert_rowid = id, "insert made no changes");
        return Ok(None);
    }
    tracing::trace!(id, "inserted");
    Ok(Some(id))
}

/// Update or delete, then read `changes()` in the same worker turn.
pub(crate) fn update(
    conn: &Connection,
    command: &SqlCommand,
    no_result: bool,
) -> rusqlite::Result<Option<u64>> {
    execute(conn, command)?;
    if no_result {
        return Ok(None);
    }

    let mut stmt = conn.prepare(CHANGES)?;
    let mut rows = stmt.query([])?;
    let Some(row) = rows.next()? else {
        tracing::error!("failed to read changes for update/delete");
        return Ok(None);
    };
    let changed: i64 = row.get(0)?;
    Ok(u64::try_from(changed).ok())
}
