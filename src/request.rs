use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::OptionsUpdate;
use crate::error::BrokerError;
use crate::operation::{BatchRequest, SqlCommand};
pub use crate::operation::{METHOD_EXECUTE, METHOD_INSERT, METHOD_QUERY, METHOD_UPDATE};
use crate::registry::OpenRequest;
use crate::session::DatabasePath;
use crate::types::SessionId;

pub const METHOD_OPEN_DATABASE: &str = "openDatabase";
pub const METHOD_CLOSE_DATABASE: &str = "closeDatabase";
pub const METHOD_BATCH: &str = "batch";
pub const METHOD_GET_DATABASES_PATH: &str = "getDatabasesPath";
pub const METHOD_OPTIONS: &str = "options";
pub const METHOD_DEBUG_MODE: &str = "debugMode";

/// A call as carried by the request channel: a method name and its argument map.
///
/// ```rust
/// use sqlite_broker::prelude::*;
/// use serde_json::json;
///
/// let call = MethodCall::new("openDatabase", json!({"path": ":memory:"}));
/// let request = Request::try_from(call).unwrap();
/// assert!(matches!(request, Request::OpenDatabase(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl MethodCall {
    #[must_use]
    pub fn new(method: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// A decoded, typed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    OpenDatabase(OpenRequest),
    CloseDatabase(SessionId),
    Execute {
        id: SessionId,
        command: SqlCommand,
    },
    Insert {
        id: SessionId,
        command: SqlCommand,
        no_result: bool,
    },
    Update {
        id: SessionId,
        command: SqlCommand,
        no_result: bool,
    },
    Query {
        id: SessionId,
        command: SqlCommand,
    },
    Batch {
        id: SessionId,
        batch: BatchRequest,
    },
    GetDatabasesPath,
    Options(OptionsUpdate),
    DebugMode(bool),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    read_only: Option<bool>,
    #[serde(default)]
    single_instance: Option<bool>,
}

#[derive(Deserialize)]
struct IdArgs {
    id: SessionId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqlArgs {
    id: SessionId,
    #[serde(flatten)]
    command: SqlCommand,
    #[serde(default)]
    no_result: Option<bool>,
}

#[derive(Deserialize)]
struct BatchArgs {
    id: SessionId,
    #[serde(flatten)]
    batch: BatchRequest,
}

impl TryFrom<MethodCall> for Request {
    type Error = BrokerError;

    fn try_from(call: MethodCall) -> Result<Self, Self::Error> {
        let MethodCall { method, arguments } = call;
        let request = match method.as_str() {
            METHOD_OPEN_DATABASE => {
                let args: OpenArgs = decode(&method, arguments)?;
                Request::OpenDatabase(OpenRequest {
                    path: DatabasePath::parse(args.path.as_deref()),
                    read_only: args.read_only.unwrap_or(false),
                    // only an explicit false disables reuse
                    single_instance: args.single_instance != Some(false),
                })
            }
            METHOD_CLOSE_DATABASE => {
                let args: IdArgs = decode(&method, arguments)?;
                Request::CloseDatabase(args.id)
            }
            METHOD_EXECUTE => {
                let args: SqlArgs = decode(&method, arguments)?;
                Request::Execute {
                    id: args.id,
                    command: args.command,
                }
            }
            METHOD_INSERT => {
                let args: SqlArgs = decode(&method, arguments)?;
                Request::Insert {
                    id: args.id,
                    command: args.command,
                    no_result: args.no_result.unwrap_or(false),
                }
            }
            METHOD_UPDATE => {
                let args: SqlArgs = decode(&method, arguments)?;
                Request::Update {
                    id: args.id,
                    command: args.command,
                    no_result: args.no_result.unwrap_or(false),
                }
            }
            METHOD_QUERY => {
                let args: SqlArgs = decode(&method, arguments)?;
                Request::Query {
                    id: args.id,
                    command: args.command,
                }
            }
            METHOD_BATCH => {
                let args: BatchArgs = decode(&method, arguments)?;
                Request::Batch {
                    id: args.id,
                    batch: args.batch,
                }
            }
            METHOD_GET_DATABASES_PATH => Request::GetDatabasesPath,
            METHOD_OPTIONS => Request::Options(decode(&method, arguments)?),
            METHOD_DEBUG_MODE => Request::DebugMode(arguments.as_bool().unwrap_or(false)),
            other => {
                return Err(BrokerError::BadParameter(format!(
                    "method '{other}' not implemented"
                )));
            }
        };
        Ok(request)
    }
}

fn decode<T: DeserializeOwned>(method: &str, arguments: serde_json::Value) -> Result<T, BrokerError> {
    let arguments = if arguments.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|err| BrokerError::BadParameter(format!("invalid arguments for '{method}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::CellValue;
    use serde_json::json;

    fn decode_call(method: &str, arguments: serde_json::Value) -> Result<Request, BrokerError> {
        Request::try_from(MethodCall::new(method, arguments))
    }

    #[test]
    fn open_defaults_to_single_instance_unless_explicitly_disabled() {
        let req = decode_call("openDatabase", json!({"path": "/tmp/a.db"})).unwrap();
        assert_eq!(
            req,
            Request::OpenDatabase(OpenRequest::new("/tmp/a.db"))
        );
        let req = decode_call(
            "openDatabase",
            json!({"path": "/tmp/a.db", "singleInstance": null, "readOnly": true}),
        )
        .unwrap();
        assert_eq!(
            req,
            Request::OpenDatabase(OpenRequest::new("/tmp/a.db").read_only(true))
        );
        let req = decode_call("openDatabase", json!({"path": "/tmp/a.db", "singleInstance": false}))
            .unwrap();
        assert_eq!(
            req,
            Request::OpenDatabase(OpenRequest::new("/tmp/a.db").single_instance(false))
        );
    }

    #[test]
    fn operation_methods_are_accepted_at_top_level_and_in_batches() {
        use crate::operation::OperationKind;

        for method in [METHOD_EXECUTE, METHOD_INSERT, METHOD_UPDATE, METHOD_QUERY] {
            assert!(OperationKind::from_method(method).is_some(), "{method}");
            decode_call(method, json!({"id": 1, "sql": "SELECT 1"})).unwrap();
        }
        assert_eq!(OperationKind::from_method(METHOD_BATCH), None);
    }

    #[test]
    fn sql_arguments_may_be_missing_or_null() {
        let req = decode_call("insert", json!({"id": 1, "sql": "INSERT", "arguments": null}))
            .unwrap();
        assert_eq!(
            req,
            Request::Insert {
                id: SessionId(1),
                command: SqlCommand::from("INSERT"),
                no_result: false,
            }
        );
        let req = decode_call(
            "update",
            json!({"id": 2, "sql": "UPDATE", "arguments": [1, "a"], "noResult": true}),
        )
        .unwrap();
        assert_eq!(
            req,
            Request::Update {
                id: SessionId(2),
                command: SqlCommand::new("UPDATE", vec![CellValue::Integer(1), "a".into()]),
                no_result: true,
            }
        );
    }

    #[test]
    fn batch_items_are_flat_maps() {
        let req = decode_call(
            "batch",
            json!({
                "id": 3,
                "continueOnError": true,
                "operations": [
                    {"method": "execute", "sql": "CREATE TABLE t (x)"},
                    {"method": "insert", "sql": "INSERT INTO t VALUES (?)", "arguments": [5]}
                ]
            }),
        )
        .unwrap();
        let Request::Batch { id, batch } = req else {
            panic!("expected batch");
        };
        assert_eq!(id, SessionId(3));
        assert!(batch.continue_on_error);
        assert!(!batch.no_result);
        assert_eq!(batch.operations.len(), 2);
        assert_eq!(batch.operations[1].arguments, vec![CellValue::Integer(5)]);
    }

    #[test]
    fn malformed_calls_are_bad_parameters() {
        let err = decode_call("query", json!({"sql": "SELECT 1"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
        let err = decode_call("getPlatformVersion", json!(null)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
        let err = decode_call("execute", json!({"id": 1, "sql": "x", "arguments": [{"a": 1}]}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }

    #[test]
    fn options_and_debug_mode() {
        let req = decode_call("options", json!({"queryAsMapList": true})).unwrap();
        assert_eq!(
            req,
            Request::Options(OptionsUpdate {
                query_as_map_list: Some(true),
                worker_priority: None,
            })
        );
        assert_eq!(decode_call("debugMode", json!(true)).unwrap(), Request::DebugMode(true));
    }
}
