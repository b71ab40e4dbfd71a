use rusqlite::Connection;

use crate::params::{as_params, extract_cell};
use crate::results::{QueryResult, ResultBuilder};
use crate::types::QueryEncoding;

use super::SqlCommand;

/// Run a read query and materialize every row before returning.
///
/// Integer arguments are inlined first (see [`SqlCommand::sanitize_for_query`]). The
/// statement and its cursor are finalized when this returns, on success or error.
pub(crate) fn query(
    conn: &Connection,
    command: &SqlCommand,
    encoding: QueryEncoding,
) -> rusqlite::Result<QueryResult> {
    let command = command.sanitize_for_query();
    let mut stmt = conn.prepare(&command.sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();

    let mut builder = ResultBuilder::new(encoding, column_names);
    let col_count = builder.column_count();

    let params = as_params(&command.arguments);
    let mut rows = stmt.query(&params[..])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            values.push(extract_cell(row, i)?);
        }
        builder.push_row(values);
    }

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;

    #[test]
    fn keeps_engine_storage_class_per_cell() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE v (x);
             INSERT INTO v VALUES (NULL), (1), (2.5), ('three'), (x'04');",
        )
        .unwrap();
        let result = query(
            &conn,
            &SqlCommand::from("SELECT x FROM v ORDER BY rowid"),
            QueryEncoding::Columns,
        )
        .unwrap();
        let QueryResult::Columns { columns, rows } = result else {
            panic!("expected columns encoding");
        };
        assert_eq!(columns, vec!["x".to_string()]);
        let cells: Vec<CellValue> = rows.into_iter().flatten().collect();
        assert_eq!(
            cells,
            vec![
                CellValue::Null,
                CellValue::Integer(1),
                CellValue::Real(2.5),
                CellValue::Text("three".into()),
                CellValue::Blob(vec![4]),
            ]
        );
    }

    #[test]
    fn empty_result_still_reports_columns() {
        let conn = Connection::open_in_memory().unwrap();
        let result = query(
            &conn,
            &SqlCommand::new("SELECT 1 AS a WHERE 0 = ?", vec![CellValue::Integer(1)]),
            QueryEncoding::Columns,
        )
        .unwrap();
        assert_eq!(
            result,
            QueryResult::Columns {
                columns: vec!["a".into()],
                rows: Vec::new(),
            }
        );
    }
}
