//! SQLite driver.
//!
//! Backs the pool with `rusqlite` connections to a database file. Targets are used verbatim, so
//! a fully-qualified target looks like `main.orders`. SQLite has no server-side bulk copy;
//! [`SqliteSession`] implements [`Session::bulk_load`] by streaming the staged file into the
//! target inside the caller's transaction.

use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, params_from_iter};

use super::driver::{BulkLoadCommand, Driver, QueryResult, Session, placeholder_rows};
use super::{ConnectionParams, Credentials};
use crate::error::{UploadError, UploadResult};
use crate::format::DATETIME_FORMAT;
use crate::types::{DataType, Value};

/// SQLite's compiled-in `SQLITE_MAX_VARIABLE_NUMBER` for the bundled library.
const SQLITE_MAX_VARIABLES: usize = 32_766;

/// Opens [`SqliteSession`]s on `ConnectionParams::database` (a file path).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(
        &self,
        params: &ConnectionParams,
        _credentials: Option<&Credentials>,
    ) -> UploadResult<Box<dyn Session>> {
        let conn = Connection::open(&params.database).map_err(|e| UploadError::Connection {
            message: format!("cannot open {}: {e}", params.database),
        })?;
        conn.busy_timeout(Duration::from_millis(params.busy_timeout_ms))
            .map_err(classify)?;
        // Fail on unreadable files here rather than on the first statement.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| UploadError::Connection {
                message: format!("cannot read {}: {e}", params.database),
            })?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

/// One SQLite connection.
pub struct SqliteSession {
    conn: Connection,
}

impl Session for SqliteSession {
    fn begin(&mut self) -> UploadResult<()> {
        // IMMEDIATE takes the write lock up front so concurrent writers queue on busy_timeout
        // instead of deadlocking on lock upgrade.
        self.conn.execute_batch("BEGIN IMMEDIATE").map_err(classify)
    }

    fn commit(&mut self) -> UploadResult<()> {
        self.conn.execute_batch("COMMIT").map_err(classify)
    }

    fn rollback(&mut self) -> UploadResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(classify)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> UploadResult<usize> {
        self.conn
            .execute(sql, params_from_iter(params.iter().map(to_sqlite)))
            .map_err(classify)
    }

    fn query(&mut self, sql: &str) -> UploadResult<QueryResult> {
        let mut stmt = self.conn.prepare(sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut out = Vec::new();
        let mut rows = stmt.query([]).map_err(classify)?;
        while let Some(row) = rows.next().map_err(classify)? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(from_sqlite(row.get_ref(idx).map_err(classify)?));
            }
            out.push(values);
        }
        Ok(QueryResult { columns, rows: out })
    }

    fn max_bind_params(&self) -> usize {
        SQLITE_MAX_VARIABLES
    }

    fn column_type(&self, data_type: DataType, _width: Option<usize>) -> String {
        match data_type {
            DataType::Int64 | DataType::Bool => "INTEGER",
            DataType::Float64 => "REAL",
            DataType::Utf8 | DataType::DateTime => "TEXT",
        }
        .to_string()
    }

    fn bulk_load(&mut self, command: &BulkLoadCommand) -> UploadResult<usize> {
        let source_error = |e: csv::Error| UploadError::Execution {
            message: format!("bulk load source {}: {e}", command.path.display()),
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(command.delimiter)
            .from_path(&command.path)
            .map_err(source_error)?;

        let mut sql: Option<String> = None;
        let mut loaded = 0;
        for record in rdr.records() {
            let record = record.map_err(source_error)?;
            let sql = sql.get_or_insert_with(|| {
                format!(
                    "INSERT INTO {} VALUES {}",
                    command.target,
                    placeholder_rows(record.len(), 1)
                )
            });
            let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
            let params = record.iter().map(|field| {
                if field.is_empty() {
                    SqlValue::Null
                } else {
                    SqlValue::Text(field.to_string())
                }
            });
            loaded += stmt.execute(params_from_iter(params)).map_err(classify)?;
        }
        Ok(loaded)
    }
}

fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int64(v) => SqlValue::Integer(*v),
        Value::Float64(v) => SqlValue::Real(*v),
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Value::Utf8(v) => SqlValue::Text(v.clone()),
        Value::DateTime(v) => SqlValue::Text(v.format(DATETIME_FORMAT).to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int64(v),
        ValueRef::Real(v) => Value::Float64(v),
        ValueRef::Text(v) | ValueRef::Blob(v) => Value::Utf8(String::from_utf8_lossy(v).into_owned()),
    }
}

/// Split SQLite failures into transport problems and rejected statements.
fn classify(err: rusqlite::Error) -> UploadError {
    let transport = match &err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseCorrupt
        ),
        _ => false,
    };
    if transport {
        UploadError::Connection {
            message: err.to_string(),
        }
    } else {
        UploadError::Execution {
            message: err.to_string(),
        }
    }
}
