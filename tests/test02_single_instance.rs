use serial_test::serial;
use sqlite_broker::prelude::*;

#[tokio::test]
#[serial]
async fn second_open_of_same_path_reuses_the_session() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shared.db");
    let broker = Broker::default();

    let first = broker.open_database(OpenRequest::new(path.as_path()))?;
    assert!(!first.recovered);
    let second = broker.open_database(OpenRequest::new(path.as_path()))?;
    assert_eq!(second.id, first.id);
    assert!(second.recovered);

    let snapshot = broker.registry_snapshot();
    assert_eq!(snapshot.open_count, 1);
    assert_eq!(snapshot.path_entry(&path), Some(first.id));

    broker.close_database(first.id)?;
    let snapshot = broker.registry_snapshot();
    assert_eq!(snapshot.path_entry(&path), None);
    assert!(snapshot.sessions.is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn reuse_is_skipped_for_memory_and_when_disabled() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("solo.db");
    let broker = Broker::default();

    let a = broker.open_database(OpenRequest::in_memory())?;
    let b = broker.open_database(OpenRequest::in_memory())?;
    assert_ne!(a.id, b.id);
    assert!(!b.recovered);

    let c = broker.open_database(OpenRequest::new(path.as_path()).single_instance(false))?;
    let d = broker.open_database(OpenRequest::new(path.as_path()).single_instance(false))?;
    assert_ne!(c.id, d.id);
    assert!(!d.recovered);
    assert_eq!(broker.registry_snapshot().path_entry(&path), None);

    // the non-shared sessions do not block a later shared one
    let e = broker.open_database(OpenRequest::new(path.as_path()))?;
    assert!(!e.recovered);
    assert_eq!(broker.registry_snapshot().path_entry(&path), Some(e.id));
    assert_eq!(broker.registry_snapshot().open_count, 5);

    for id in [a.id, b.id, c.id, d.id, e.id] {
        broker.close_database(id)?;
    }
    assert!(!broker.registry_snapshot().worker_running);
    Ok(())
}

#[tokio::test]
#[serial]
async fn stale_path_entry_is_overwritten_then_cleared_by_old_close()
-> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stale.db");
    let broker = Broker::default();

    let old = broker.open_database(OpenRequest::new(path.as_path()))?.id;
    broker.release_handle_for_tests(old)?;

    // the old entry names a session whose handle is gone, so a new session is opened
    let new = broker.open_database(OpenRequest::new(path.as_path()))?;
    assert_ne!(new.id, old);
    assert!(!new.recovered);
    assert_eq!(broker.registry_snapshot().path_entry(&path), Some(new.id));

    // closing the old id removes the path entry even though it now names the new session
    broker.close_database(old)?;
    let snapshot = broker.registry_snapshot();
    assert_eq!(snapshot.path_entry(&path), None);
    assert_eq!(snapshot.sessions, vec![new.id]);

    // the new session keeps working but is no longer found by path
    broker.execute(new.id, "CREATE TABLE t (x)".into()).await?;
    let third = broker.open_database(OpenRequest::new(path.as_path()))?;
    assert_ne!(third.id, new.id);
    assert!(!third.recovered);

    broker.close_database(new.id)?;
    broker.close_database(third.id)?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn work_on_a_released_handle_reports_closed() -> Result<(), BrokerError> {
    let broker = Broker::default();
    let id = broker.open_database(OpenRequest::in_memory())?.id;
    broker.release_handle_for_tests(id)?;

    let err = broker.query(id, "SELECT 1".into()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DatabaseClosed);
    broker.close_database(id)?;
    Ok(())
}
