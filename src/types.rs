use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};

/// Process-unique identifier handed out when a session is opened.
///
/// Ids grow monotonically and are never reused within a broker, even after the session they
/// named has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single cell value, either bound as an argument or read back from a row.
///
/// The tag is whatever the engine reports for that row/column pair; no coercion happens
/// between tags:
/// ```rust
/// use sqlite_broker::prelude::*;
///
/// let args = vec![
///     CellValue::Integer(1),
///     CellValue::Text("alice".into()),
///     CellValue::Blob(vec![0xde, 0xad]),
/// ];
/// # let _ = args;
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum CellValue {
    /// SQL NULL
    Null,
    /// Integer value (64-bit)
    Integer(i64),
    /// Floating point value (64-bit)
    Real(f64),
    /// Text value
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl CellValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        if let CellValue::Integer(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        if let CellValue::Real(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let CellValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let CellValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Real(f) => serializer.serialize_f64(*f),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Blob(bytes) => bytes.serialize(serializer),
        }
    }
}

impl TryFrom<serde_json::Value> for CellValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;

        match value {
            Json::Null => Ok(CellValue::Null),
            Json::Bool(b) => Ok(CellValue::Integer(i64::from(b))),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CellValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(CellValue::Real(f))
                } else {
                    Err(format!("unsupported numeric argument {n}"))
                }
            }
            Json::String(s) => Ok(CellValue::Text(s)),
            // byte lists arrive as plain integer arrays
            Json::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| format!("unsupported array argument element {item}"))
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(CellValue::Blob),
            Json::Object(_) => Err("map arguments are not supported".to_string()),
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Real(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(value: Vec<u8>) -> Self {
        CellValue::Blob(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Null, Into::into)
    }
}

/// How query results are shaped on their way back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize)]
pub enum QueryEncoding {
    /// One column-name to value map per row.
    MapList,
    /// Column names once, then one value list per row.
    #[default]
    Columns,
}

impl QueryEncoding {
    #[must_use]
    pub fn from_map_list_flag(query_as_map_list: bool) -> Self {
        if query_as_map_list {
            QueryEncoding::MapList
        } else {
            QueryEncoding::Columns
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_json_arguments_without_cross_tag_coercion() {
        let args: Vec<CellValue> =
            serde_json::from_value(json!([null, 7, 1.5, "x", [1, 2, 255], true])).unwrap();
        assert_eq!(
            args,
            vec![
                CellValue::Null,
                CellValue::Integer(7),
                CellValue::Real(1.5),
                CellValue::Text("x".into()),
                CellValue::Blob(vec![1, 2, 255]),
                CellValue::Integer(1),
            ]
        );
    }

    #[test]
    fn rejects_maps_and_wide_byte_arrays() {
        assert!(serde_json::from_value::<CellValue>(json!({"a": 1})).is_err());
        assert!(serde_json::from_value::<CellValue>(json!([1, 256])).is_err());
    }

    #[test]
    fn serializes_to_plain_json() {
        let cells = vec![
            CellValue::Null,
            CellValue::Integer(3),
            CellValue::Text("a".into()),
            CellValue::Blob(vec![9]),
        ];
        assert_eq!(serde_json::to_value(cells).unwrap(), json!([null, 3, "a", [9]]));
    }
}
