use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

use crate::types::CellValue;

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            CellValue::Null => ValueRef::Null,
            CellValue::Integer(i) => ValueRef::Integer(*i),
            CellValue::Real(f) => ValueRef::Real(*f),
            CellValue::Text(s) => ValueRef::Text(s.as_bytes()),
            CellValue::Blob(bytes) => ValueRef::Blob(bytes),
        }))
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Integer(i) => CellValue::Integer(i),
            Value::Real(f) => CellValue::Real(f),
            Value::Text(s) => CellValue::Text(s),
            Value::Blob(b) => CellValue::Blob(b),
        }
    }
}

/// Extract the cell at `idx`, keeping the storage class the engine reports for it.
///
/// # Errors
///
/// Returns the engine error if the column cannot be read.
pub fn extract_cell(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<CellValue> {
    let value: Value = row.get(idx)?;
    Ok(CellValue::from(value))
}

/// Build a borrowed params slice suitable for rusqlite execution.
#[must_use]
pub fn as_params(values: &[CellValue]) -> Vec<&dyn ToSql> {
    values.iter().map(|v| v as &dyn ToSql).collect()
}
