mod common;

use common::{ORDERS_DDL, Scratch, orders};
use dataset_upload::audit::LogStatus;
use dataset_upload::config::UploadConfig;
use dataset_upload::connection::{ConnectionManager, SqliteDriver};
use dataset_upload::job::{CommitState, LogTarget, UploadTarget};
use dataset_upload::{UploadRequest, Uploader};
use std::sync::Arc;

const LOG_DDL: &str = "CREATE TABLE upload_log (
    log_date TEXT, log_time TEXT, target TEXT, duration_s INTEGER, row_count INTEGER, status TEXT
);";

fn log_rows(scratch: &Scratch) -> Vec<(String, i64, String)> {
    let conn = rusqlite::Connection::open(&scratch.db).unwrap();
    let mut stmt = conn
        .prepare("SELECT target, row_count, status FROM upload_log ORDER BY rowid")
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn committed_upload_writes_one_audit_row() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    scratch.sql(LOG_DDL);

    let uploader = Uploader::new(scratch.manager());
    let request = UploadRequest::new(orders(4), UploadTarget::new("orders").unwrap())
        .log_to(LogTarget::new("upload_log").unwrap());
    let report = uploader.upload(&request);

    assert_eq!(report.commit_state(), CommitState::Committed);
    let record = report.log.expect("log requested").unwrap();
    assert_eq!(record.status, LogStatus::Commit);
    assert_eq!(record.row_count, 4);
    assert_eq!(record.date.len(), 10);
    assert_eq!(record.time.len(), 8);
    assert!(record.duration_seconds >= 0);

    assert_eq!(log_rows(&scratch), vec![("orders".to_string(), 4, "Commit".to_string())]);
}

#[test]
fn rolled_back_upload_is_logged_as_rollback() {
    let scratch = Scratch::new();
    scratch.sql(LOG_DDL);

    let uploader = Uploader::new(scratch.manager());
    let request = UploadRequest::new(orders(2), UploadTarget::new("missing").unwrap())
        .log_to(LogTarget::new("upload_log").unwrap());
    let report = uploader.upload(&request);

    assert_eq!(report.commit_state(), CommitState::RolledBack);
    assert_eq!(log_rows(&scratch), vec![("missing".to_string(), 2, "RollBack".to_string())]);
}

#[test]
fn audit_failure_does_not_change_the_upload_outcome() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);

    let uploader = Uploader::new(scratch.manager());
    let request = UploadRequest::new(orders(2), UploadTarget::new("orders").unwrap())
        .log_to(LogTarget::new("no_log_table").unwrap());
    let report = uploader.upload(&request);

    assert!(report.is_success());
    assert!(matches!(report.log, Some(Err(_))));
    assert_eq!(scratch.count("orders"), 2);
}

#[test]
fn config_file_drives_a_logged_upload() {
    let scratch = Scratch::new();
    scratch.sql(ORDERS_DDL);
    scratch.sql(LOG_DDL);

    let config_path = scratch.dir.path().join("upload.json");
    let json = serde_json::json!({
        "connection": { "database": scratch.db, "driver": "sqlite", "pool_size": 2 },
        "chunk_size": 2,
        "strategy": { "kind": "bulk_file_load", "folder": scratch.dir.path() },
        "log_table": "upload_log"
    });
    std::fs::write(&config_path, json.to_string()).unwrap();

    let config = UploadConfig::from_path(&config_path).unwrap();
    let conn = ConnectionManager::connect(config.connection.clone(), Arc::new(SqliteDriver)).unwrap();
    let uploader = Uploader::new(Arc::new(conn));
    let request = config
        .request_for(orders(3), UploadTarget::new("orders").unwrap())
        .unwrap();
    let report = uploader.upload(&request);

    assert!(report.is_success(), "{:?}", report.outcome);
    assert_eq!(scratch.count("orders"), 3);
    assert_eq!(log_rows(&scratch), vec![("orders".to_string(), 3, "Commit".to_string())]);
}
