#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dataset_upload::connection::{ConnectionManager, ConnectionParams, SqliteDriver};
use dataset_upload::execution::{UploadEvent, UploadObserver};
use dataset_upload::types::{DataSet, DataType, Field, Schema, Value};
use tempfile::TempDir;

/// A scratch SQLite database in its own temp directory.
pub struct Scratch {
    pub dir: TempDir,
    pub db: PathBuf,
}

impl Scratch {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("warehouse.db");
        Self { dir, db }
    }

    pub fn sql(&self, batch: &str) {
        let conn = rusqlite::Connection::open(&self.db).unwrap();
        conn.execute_batch(batch).unwrap();
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = rusqlite::Connection::open(&self.db).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    pub fn ids(&self, table: &str) -> Vec<i64> {
        let conn = rusqlite::Connection::open(&self.db).unwrap();
        let mut stmt = conn.prepare(&format!("SELECT id FROM {table} ORDER BY id")).unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<Vec<i64>, _>>()
            .unwrap()
    }

    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::connect(ConnectionParams::sqlite(&self.db), Arc::new(SqliteDriver)).unwrap())
    }

    pub fn staging_dir(&self) -> &Path {
        self.dir.path()
    }
}

pub fn orders_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("customer", DataType::Utf8),
        Field::new("amount", DataType::Float64),
        Field::new("paid", DataType::Bool),
    ])
}

pub const ORDERS_DDL: &str = "CREATE TABLE orders (id INTEGER, customer TEXT, amount REAL, paid INTEGER);";

/// `n` orders with ids `1..=n`.
pub fn orders(n: usize) -> Arc<DataSet> {
    let rows = (1..=n as i64)
        .map(|i| {
            vec![
                Value::Int64(i),
                if i % 3 == 0 {
                    Value::Null
                } else {
                    Value::Utf8(format!("customer {i}"))
                },
                Value::Float64(i as f64 * 1.25),
                Value::Bool(i % 2 == 0),
            ]
        })
        .collect();
    Arc::new(DataSet::try_new(orders_schema(), rows).unwrap())
}

/// Records every event it sees.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UploadEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl UploadObserver for RecordingObserver {
    fn on_event(&self, event: &UploadEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
