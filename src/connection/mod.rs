//! Database connection management.
//!
//! A [`ConnectionManager`] is built once per logical database and passed by reference into every
//! upload. It owns a bounded pool of driver sessions and exposes:
//!
//! - [`ConnectionManager::with_transaction`]: a scope that commits on `Ok` and rolls back on `Err`
//! - [`ConnectionManager::execute`] / [`ConnectionManager::query`]: ad-hoc statements
//! - [`ConnectionManager::count_rows`]: the verification read used after a load
//!
//! The pool is safe for concurrent use; each transaction scope holds its session exclusively.
//! There is no per-target locking: two uploads racing on the same table must be serialized by
//! the caller.

mod driver;
mod pool;
pub mod sqlite;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{UploadError, UploadResult};
use crate::types::{DataType, Value};

pub use driver::{placeholder_rows, BulkLoadCommand, Driver, QueryResult, Session};
pub use sqlite::SqliteDriver;

use pool::Pool;

/// Login used when opening a connection.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// User name.
    pub user: String,
    /// Password. Never printed by `Debug`.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials each time the pool opens a new physical connection.
///
/// Implement this to fetch rotating secrets or tokens; `Ok(None)` means integrated auth.
pub trait CredentialProvider: Send + Sync {
    /// Credentials for the next connection.
    fn credentials(&self) -> UploadResult<Option<Credentials>>;
}

/// A fixed set of credentials (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<Credentials>);

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> UploadResult<Option<Credentials>> {
        Ok(self.0.clone())
    }
}

/// Connection parameters for one logical database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Server host (ignored by file-based drivers).
    pub host: String,
    /// Database name; for SQLite, the database file path.
    pub database: String,
    /// Driver identifier, e.g. `ODBC Driver 18 for SQL Server`.
    pub driver: String,
    /// Optional SQL login; `None` means integrated auth.
    pub credentials: Option<Credentials>,
    /// Upper bound on concurrently open sessions.
    pub pool_size: usize,
    /// How long a session waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: String::new(),
            database: String::new(),
            driver: String::new(),
            credentials: None,
            pool_size: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a SQLite database file.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            database: path.as_ref().to_string_lossy().into_owned(),
            driver: "sqlite".to_string(),
            ..Self::default()
        }
    }

    /// Set the SQL login.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the pool size.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// ODBC-style connection string for drivers that take one.
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("Driver={{{}}}", self.driver),
            format!("Server={}", self.host),
            format!("Database={}", self.database),
        ];
        match &self.credentials {
            None => parts.push("Trusted_Connection=yes".to_string()),
            Some(c) => {
                parts.push(format!("UID={}", escape_attribute_value(&c.user)));
                parts.push(format!("PWD={}", escape_attribute_value(&c.password)));
            }
        }
        parts.join(";") + ";"
    }

    pub(crate) fn validate(&self) -> UploadResult<()> {
        if self.database.trim().is_empty() {
            return Err(UploadError::InvalidOptions {
                message: "database must not be empty".to_string(),
            });
        }
        if self.pool_size == 0 {
            return Err(UploadError::InvalidOptions {
                message: "pool_size must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn escape_attribute_value(value: &str) -> String {
    if value.contains([';', '{', '}']) || value.starts_with(' ') || value.ends_with(' ') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

/// Owns the pooled sessions for one logical database.
pub struct ConnectionManager {
    params: ConnectionParams,
    pool: Pool,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("params", &self.params)
            .field("idle_sessions", &self.pool.idle_count())
            .finish()
    }
}

impl ConnectionManager {
    /// Build a manager using the credentials in `params`.
    ///
    /// One session is opened immediately so unreachable databases fail here, as
    /// [`UploadError::Connection`].
    pub fn connect(params: ConnectionParams, driver: Arc<dyn Driver>) -> UploadResult<Self> {
        let credentials = StaticCredentials(params.credentials.clone());
        Self::connect_with_credentials(params, driver, Arc::new(credentials))
    }

    /// Build a manager that asks `credentials` for a login on every new session.
    pub fn connect_with_credentials(
        params: ConnectionParams,
        driver: Arc<dyn Driver>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> UploadResult<Self> {
        params.validate()?;
        let manager = Self {
            pool: Pool::new(driver, params.clone(), credentials),
            params,
        };
        drop(manager.pool.checkout()?);
        Ok(manager)
    }

    /// Parameters this manager was built from.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Database name (used to qualify bulk-load statements).
    pub fn database(&self) -> &str {
        &self.params.database
    }

    /// Total time callers have spent waiting for a pooled session.
    pub fn pool_wait(&self) -> Duration {
        self.pool.total_wait()
    }

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`, and returns `f`'s error
    /// unchanged. A failed commit is reported as the error.
    pub fn with_transaction<T, F>(&self, f: F) -> UploadResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> UploadResult<T>,
    {
        let mut pooled = self.pool.checkout()?;
        let result = {
            let session = pooled.session()?;
            run_in_transaction(session, f)
        };
        if let Err(err) = &result {
            pooled.note_error(err);
        }
        result
    }

    /// Execute one statement in its own transaction. Returns the affected row count.
    pub fn execute(&self, sql: &str) -> UploadResult<usize> {
        self.with_transaction(|tx| tx.execute(sql, &[]))
    }

    /// Execute one parameterized statement in its own transaction.
    pub fn execute_with(&self, sql: &str, params: &[Value]) -> UploadResult<usize> {
        self.with_transaction(|tx| tx.execute(sql, params))
    }

    /// Run a query and collect its rows.
    pub fn query(&self, sql: &str) -> UploadResult<QueryResult> {
        self.with_transaction(|tx| tx.query(sql))
    }

    /// `SELECT COUNT(*) FROM <target>`.
    pub fn count_rows(&self, target: &str) -> UploadResult<u64> {
        let result = self.query(&format!("SELECT COUNT(*) FROM {target}"))?;
        match result.scalar() {
            Some(Value::Int64(n)) if *n >= 0 => Ok(*n as u64),
            Some(Value::Utf8(s)) => s.trim().parse::<u64>().map_err(|e| UploadError::Execution {
                message: format!("row count for {target} is not a number ('{s}'): {e}"),
            }),
            other => Err(UploadError::Execution {
                message: format!("unexpected row count for {target}: {other:?}"),
            }),
        }
    }
}

fn run_in_transaction<T, F>(session: &mut dyn Session, f: F) -> UploadResult<T>
where
    F: FnOnce(&mut Transaction<'_>) -> UploadResult<T>,
{
    session.begin()?;
    let outcome = {
        let mut tx = Transaction { session: &mut *session };
        f(&mut tx)
    };
    match outcome {
        Ok(value) => match session.commit() {
            Ok(()) => Ok(value),
            Err(err) => {
                if let Err(rollback_err) = session.rollback() {
                    warn!(error = %rollback_err, "rollback after failed commit also failed");
                }
                Err(err)
            }
        },
        Err(err) => {
            if let Err(rollback_err) = session.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

/// An open transaction, exclusively owned by the scope that opened it.
pub struct Transaction<'s> {
    session: &'s mut dyn Session,
}

impl Transaction<'_> {
    /// Run one statement with positional parameters.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> UploadResult<usize> {
        self.session.execute(sql, params)
    }

    /// Run a query.
    pub fn query(&mut self, sql: &str) -> UploadResult<QueryResult> {
        self.session.query(sql)
    }

    /// Driver-native multi-row insert.
    pub fn insert_rows(&mut self, target: &str, columns: &[&str], rows: &[Vec<Value>]) -> UploadResult<usize> {
        self.session.insert_rows(target, columns, rows)
    }

    /// Server-side bulk copy of a staged file.
    pub fn bulk_load(&mut self, command: &BulkLoadCommand) -> UploadResult<usize> {
        self.session.bulk_load(command)
    }

    /// Upper bound on bound parameters per statement.
    pub fn max_bind_params(&self) -> usize {
        self.session.max_bind_params()
    }

    /// Quote a column name.
    pub fn quote_identifier(&self, name: &str) -> String {
        self.session.quote_identifier(name)
    }

    /// Column type for (re)created tables.
    pub fn column_type(&self, data_type: DataType, width: Option<usize>) -> String {
        self.session.column_type(data_type, width)
    }
}
