use serde_json::{Value, json};
use serial_test::serial;
use sqlite_broker::prelude::*;

async fn call(broker: &Broker, method: &str, arguments: Value) -> Result<Value, BrokerError> {
    broker.handle(MethodCall::new(method, arguments)).await
}

#[tokio::test]
#[serial]
async fn full_session_over_method_calls() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("calls.db");
    let path_arg = path.to_string_lossy().into_owned();
    let broker = Broker::default();

    let opened = call(&broker, "openDatabase", json!({"path": path_arg})).await?;
    let id = opened["id"].as_u64().expect("numeric session id");
    assert_eq!(opened, json!({"id": id}));
    let reopened = call(&broker, "openDatabase", json!({"path": path_arg})).await?;
    assert_eq!(reopened, json!({"id": id, "recovered": true}));

    let done = call(
        &broker,
        "execute",
        json!({"id": id, "sql": "CREATE TABLE t (id INTEGER PRIMARY KEY, flag INTEGER, body BLOB)"}),
    )
    .await?;
    assert_eq!(done, Value::Null);

    let row = call(
        &broker,
        "insert",
        json!({"id": id, "sql": "INSERT INTO t (flag, body) VALUES (?, ?)", "arguments": [true, [1, 2]]}),
    )
    .await?;
    assert_eq!(row, json!(1));

    let quiet = call(
        &broker,
        "insert",
        json!({"id": id, "sql": "INSERT INTO t (flag) VALUES (?)", "arguments": [false], "noResult": true}),
    )
    .await?;
    assert_eq!(quiet, Value::Null);

    let changed = call(
        &broker,
        "update",
        json!({"id": id, "sql": "UPDATE t SET flag = ?", "arguments": [7]}),
    )
    .await?;
    assert_eq!(changed, json!(2));

    call(&broker, "options", json!({"queryAsMapList": true})).await?;
    let rows = call(
        &broker,
        "query",
        json!({"id": id, "sql": "SELECT id, flag, body FROM t ORDER BY id"}),
    )
    .await?;
    assert_eq!(
        rows,
        json!([
            {"id": 1, "flag": 7, "body": [1, 2]},
            {"id": 2, "flag": 7, "body": null}
        ])
    );

    let batch = call(
        &broker,
        "batch",
        json!({
            "id": id,
            "operations": [
                {"method": "insert", "sql": "INSERT INTO t (flag) VALUES (?)", "arguments": [3]},
                {"method": "query", "sql": "SELECT count(*) AS n FROM t"}
            ]
        }),
    )
    .await?;
    assert_eq!(
        batch,
        json!([{"result": 3}, {"result": [{"n": 3}]}])
    );

    assert_eq!(call(&broker, "closeDatabase", json!({"id": id})).await?, Value::Null);
    let err = call(&broker, "query", json!({"id": id, "sql": "SELECT 1"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DatabaseClosed);
    Ok(())
}

#[tokio::test]
#[serial]
async fn settings_calls() -> Result<(), BrokerError> {
    let broker = BrokerOptions::builder()
        .databases_path("/data/app/databases")
        .build();

    assert_eq!(
        call(&broker, "getDatabasesPath", Value::Null).await?,
        json!("/data/app/databases")
    );

    call(&broker, "options", json!({"threadPriority": 0})).await?;
    assert_eq!(broker.settings().worker_priority, 0);
    assert!(!broker.settings().query_as_map_list);

    call(&broker, "debugMode", json!(true)).await?;
    assert!(broker.settings().log_sql);
    call(&broker, "debugMode", json!(false)).await?;
    assert!(!broker.settings().log_sql);
    Ok(())
}

#[tokio::test]
#[serial]
async fn malformed_calls_are_rejected_before_running() -> Result<(), BrokerError> {
    let broker = Broker::default();

    let err = call(&broker, "dropEverything", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadParameter);

    let err = call(&broker, "insert", json!({"sql": "INSERT INTO t VALUES (1)"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadParameter);

    let err = call(
        &broker,
        "query",
        json!({"id": 1, "sql": "SELECT ?", "arguments": [{"nested": true}]}),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadParameter);
    assert_eq!(err.to_payload().code, ErrorKind::BadParameter);

    assert_eq!(broker.registry_snapshot().open_count, 0);
    Ok(())
}

#[tokio::test]
#[serial]
async fn absent_path_opens_in_memory() -> Result<(), BrokerError> {
    let broker = Broker::default();
    let a = call(&broker, "openDatabase", json!({})).await?;
    let b = call(&broker, "openDatabase", json!({"path": ":memory:"})).await?;
    let a = a["id"].as_u64().expect("numeric session id");
    let b = b["id"].as_u64().expect("numeric session id");
    assert_eq!(b, a + 1);
    assert_eq!(broker.registry_snapshot().open_count, 2);

    call(&broker, "closeDatabase", json!({"id": a})).await?;
    call(&broker, "closeDatabase", json!({"id": b})).await?;
    Ok(())
}
