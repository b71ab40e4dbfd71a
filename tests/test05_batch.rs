use serde_json::json;
use sqlite_broker::prelude::*;

async fn open_with_table(broker: &Broker) -> Result<SessionId, BrokerError> {
    let id = broker.open_database(OpenRequest::in_memory())?.id;
    broker
        .execute(
            id,
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)".into(),
        )
        .await?;
    Ok(id)
}

fn insert(name: &str) -> BatchOperation {
    BatchOperation::insert(SqlCommand::new(
        "INSERT INTO t (name) VALUES (?)",
        vec![name.into()],
    ))
}

#[tokio::test]
async fn continue_on_error_keeps_going_and_records_each_item() -> Result<(), Box<dyn std::error::Error>> {
    let broker = Broker::default();
    let id = open_with_table(&broker).await?;

    let batch = BatchRequest::new(vec![
        insert("a"),
        insert("a"),
        BatchOperation::update("UPDATE t SET name = 'b' WHERE name = 'a'"),
        BatchOperation::query("SELECT name FROM t"),
    ])
    .continue_on_error(true);

    let entries = broker.batch(id, batch).await?.expect("results requested");
    assert_eq!(entries.len(), 4);
    assert!(entries[1].is_error());
    assert_eq!(entries[0].output(), Some(&OperationOutput::RowId(Some(1))));
    assert_eq!(entries[2].output(), Some(&OperationOutput::Changes(Some(1))));

    let wire = serde_json::to_value(&entries)?;
    assert_eq!(wire[0], json!({"result": 1}));
    assert_eq!(wire[1]["error"]["code"], json!("sql_error"));
    assert_eq!(
        wire[1]["error"]["data"],
        json!({"sql": "INSERT INTO t (name) VALUES (?)", "arguments": ["a"]})
    );
    assert_eq!(wire[2], json!({"result": 1}));
    assert_eq!(
        wire[3],
        json!({"result": {"columns": ["name"], "rows": [["b"]]}})
    );

    broker.close_database(id)?;
    Ok(())
}

#[tokio::test]
async fn first_failure_aborts_without_continue_on_error() -> Result<(), BrokerError> {
    let broker = Broker::default();
    let id = open_with_table(&broker).await?;

    let batch = BatchRequest::new(vec![insert("a"), insert("a"), insert("b")]);
    let err = broker.batch(id, batch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SqlError);

    // items before the failure stay applied, items after it never ran
    let rows = broker.query(id, "SELECT name FROM t ORDER BY id".into()).await?;
    assert_eq!(
        rows,
        QueryResult::Columns {
            columns: vec!["name".into()],
            rows: vec![vec![CellValue::Text("a".into())]],
        }
    );
    broker.close_database(id)?;
    Ok(())
}

#[tokio::test]
async fn no_result_returns_nothing_even_with_errors() -> Result<(), BrokerError> {
    let broker = Broker::default();
    let id = open_with_table(&broker).await?;

    let batch = BatchRequest::new(vec![insert("a"), insert("a"), insert("b")])
        .no_result(true)
        .continue_on_error(true);
    assert_eq!(broker.batch(id, batch).await?, None);

    let count = broker.query(id, "SELECT count(*) AS n FROM t".into()).await?;
    assert_eq!(
        count,
        QueryResult::Columns {
            columns: vec!["n".into()],
            rows: vec![vec![CellValue::Integer(2)]],
        }
    );
    broker.close_database(id)?;
    Ok(())
}

#[tokio::test]
async fn unknown_method_fails_the_batch_when_reached() -> Result<(), BrokerError> {
    let broker = Broker::default();
    let id = open_with_table(&broker).await?;

    let batch = BatchRequest::new(vec![
        insert("a"),
        BatchOperation::new("vacuum", SqlCommand::from("VACUUM")),
        insert("b"),
    ])
    .continue_on_error(true);
    let err = broker.batch(id, batch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadParameter);
    assert!(err.to_string().contains("vacuum"));

    let rows = broker.query(id, "SELECT name FROM t".into()).await?;
    assert_eq!(rows.len(), 1);
    broker.close_database(id)?;
    Ok(())
}

#[tokio::test]
async fn batch_runs_without_interleaving() -> Result<(), BrokerError> {
    let broker = Broker::default();
    let id = open_with_table(&broker).await?;

    let batch = broker.batch(
        id,
        BatchRequest::new((0..50).map(|i| insert(&format!("batch-{i}"))).collect()),
    );
    // submitted after the batch, so it sees every row the batch inserted
    let single = broker.insert(id, SqlCommand::new("INSERT INTO t (name) VALUES (?)", vec!["single".into()]), false);

    let entries = batch.await?.expect("results requested");
    assert_eq!(entries.len(), 50);
    for (i, entry) in entries.iter().enumerate() {
        let expected = i64::try_from(i + 1).expect("small index");
        assert_eq!(entry.output(), Some(&OperationOutput::RowId(Some(expected))));
    }
    assert_eq!(single.await?, Some(51));
    broker.close_database(id)?;
    Ok(())
}
