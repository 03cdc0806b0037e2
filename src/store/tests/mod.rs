//! State store tests against a real SQLite file

use std::path::PathBuf;

use crate::store::{Database, RecordChanges, StateStore};
use crate::types::{DownloadId, DownloadRecord, Method, Status};

async fn temp_db() -> (Database, tempfile::NamedTempFile) {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

fn record(status: Status) -> DownloadRecord {
    let id = DownloadId::new();
    DownloadRecord {
        id,
        method: Method::Direct,
        url: "http://host/file.bin".to_string(),
        destination: PathBuf::from(format!("/data/v1/{id}")),
        status,
        created_at: 1_700_000_000,
        error_message: None,
    }
}

#[tokio::test]
async fn add_then_get_round_trips_a_record() {
    let (db, _temp) = temp_db().await;
    let original = record(Status::Pending);

    db.add(&original).await.unwrap();
    let fetched = db.get(original.id).await.unwrap().unwrap();

    assert_eq!(fetched, original);
}

#[tokio::test]
async fn get_unknown_id_returns_none() {
    let (db, _temp) = temp_db().await;
    assert!(db.get(DownloadId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_id_insert_is_rejected() {
    let (db, _temp) = temp_db().await;
    let original = record(Status::Pending);

    db.add(&original).await.unwrap();
    let result = db.add(&original).await;

    assert!(
        result.is_err(),
        "id is the primary key, inserting it twice must fail"
    );
}

#[tokio::test]
async fn update_status_only_leaves_other_fields_untouched() {
    let (db, _temp) = temp_db().await;
    let original = record(Status::Pending);
    db.add(&original).await.unwrap();

    db.update(original.id, &RecordChanges::status(Status::Downloading))
        .await
        .unwrap();

    let fetched = db.get(original.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, Status::Downloading);
    assert_eq!(fetched.url, original.url);
    assert_eq!(fetched.error_message, None);
}

#[tokio::test]
async fn update_with_error_message_records_the_failure() {
    let (db, _temp) = temp_db().await;
    let original = record(Status::Downloading);
    db.add(&original).await.unwrap();

    db.update(
        original.id,
        &RecordChanges::status(Status::Failed).with_error("connection reset"),
    )
    .await
    .unwrap();

    let fetched = db.get(original.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, Status::Failed);
    assert_eq!(fetched.error_message.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn empty_change_set_is_a_no_op() {
    let (db, _temp) = temp_db().await;
    let original = record(Status::Pending);
    db.add(&original).await.unwrap();

    db.update(original.id, &RecordChanges::default())
        .await
        .unwrap();

    let fetched = db.get(original.id).await.unwrap().unwrap();
    assert_eq!(fetched, original);
}

#[tokio::test]
async fn remove_deletes_the_record() {
    let (db, _temp) = temp_db().await;
    let original = record(Status::Cancelled);
    db.add(&original).await.unwrap();

    db.remove(original.id).await.unwrap();
    assert!(db.get(original.id).await.unwrap().is_none());
}

#[tokio::test]
async fn get_all_returns_records_in_creation_order() {
    let (db, _temp) = temp_db().await;

    let mut first = record(Status::Completed);
    first.created_at = 100;
    let mut second = record(Status::Pending);
    second.created_at = 200;

    // Insert out of order to prove the ORDER BY
    db.add(&second).await.unwrap();
    db.add(&first).await.unwrap();

    let all = db.get_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, first.id);
    assert_eq!(all[1].id, second.id);
}

#[tokio::test]
async fn in_memory_database_supports_full_crud() {
    let db = Database::in_memory().await.unwrap();
    let original = record(Status::Pending);

    db.add(&original).await.unwrap();
    db.update(original.id, &RecordChanges::status(Status::Completed))
        .await
        .unwrap();

    let fetched = db.get(original.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, Status::Completed);
}

#[tokio::test]
async fn prepare_is_inert() {
    let (db, _temp) = temp_db().await;
    // Session-restore hook; currently a documented gap with no behavior
    db.prepare().await.unwrap();
}
