//! The seam between upload orchestration and a concrete database driver.
//!
//! A [`Driver`] opens [`Session`]s; a session runs statements on one physical connection. The
//! connection manager owns sessions through its pool and only lends them out inside a
//! transaction scope.

use std::path::PathBuf;

use crate::chunk::ChunkPlan;
use crate::connection::{ConnectionParams, Credentials};
use crate::error::UploadResult;
use crate::types::{DataType, Value};

/// Rows and column names returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Row-major values.
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// First column of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// A server-side bulk-copy request for a staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLoadCommand {
    /// Database name the target lives in.
    pub database: String,
    /// Target table, used verbatim.
    pub target: String,
    /// Staging file path as seen by the server.
    pub path: PathBuf,
    /// Field separator byte.
    pub delimiter: u8,
}

impl BulkLoadCommand {
    /// Render the vendor statement:
    /// `BULK INSERT <database>.<target> FROM '<path>' WITH (FIELDTERMINATOR = '<d>')`.
    pub fn to_sql(&self) -> String {
        let path = self.path.to_string_lossy().replace('\'', "''");
        let terminator = char::from(self.delimiter).to_string().replace('\'', "''");
        format!(
            "BULK INSERT {}.{} FROM '{path}' WITH (FIELDTERMINATOR = '{terminator}')",
            self.database, self.target
        )
    }
}

/// Opens sessions for a [`crate::connection::ConnectionManager`].
pub trait Driver: Send + Sync {
    /// Short driver name used in diagnostics.
    fn name(&self) -> &str;

    /// Open one physical connection.
    ///
    /// Transport and authentication problems must be reported as
    /// [`crate::UploadError::Connection`].
    fn connect(
        &self,
        params: &ConnectionParams,
        credentials: Option<&Credentials>,
    ) -> UploadResult<Box<dyn Session>>;
}

/// One physical connection.
///
/// Statements rejected by the database must be reported as [`crate::UploadError::Execution`];
/// a broken transport as [`crate::UploadError::Connection`], which makes the pool discard the
/// session.
pub trait Session: Send {
    /// Start a transaction.
    fn begin(&mut self) -> UploadResult<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> UploadResult<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> UploadResult<()>;

    /// Run one statement with positional `?` parameters. Returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> UploadResult<usize>;

    /// Run a query and collect every row.
    fn query(&mut self, sql: &str) -> UploadResult<QueryResult>;

    /// Upper bound on bound parameters in one statement.
    fn max_bind_params(&self) -> usize {
        2_000
    }

    /// Quote a column name for generated DDL and insert column lists.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Column type used when a table is (re)created. `width` is set for text columns.
    fn column_type(&self, data_type: DataType, width: Option<usize>) -> String {
        match data_type {
            DataType::Int64 => "BIGINT".to_string(),
            DataType::Float64 => "DECIMAL(19, 4)".to_string(),
            DataType::Bool => "BIT".to_string(),
            DataType::Utf8 => match width {
                Some(w) if w <= 4_000 => format!("NVARCHAR({w})"),
                _ => "NVARCHAR(MAX)".to_string(),
            },
            DataType::DateTime => "DATETIME2(0)".to_string(),
        }
    }

    /// Driver-native multi-row insert of typed values.
    ///
    /// The default builds `INSERT INTO <target> (<columns>) VALUES (?, ..), (?, ..)` statements,
    /// splitting `rows` so no statement exceeds [`Session::max_bind_params`].
    fn insert_rows(&mut self, target: &str, columns: &[&str], rows: &[Vec<Value>]) -> UploadResult<usize> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }
        let column_list = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let rows_per_statement = (self.max_bind_params() / columns.len()).max(1);

        let mut affected = 0;
        for range in ChunkPlan::new(rows.len(), rows_per_statement)? {
            let batch = &rows[range];
            let sql = format!(
                "INSERT INTO {target} ({column_list}) VALUES {}",
                placeholder_rows(columns.len(), batch.len())
            );
            let params: Vec<Value> = batch.iter().flatten().cloned().collect();
            affected += self.execute(&sql, &params)?;
        }
        Ok(affected)
    }

    /// Server-side bulk copy of a staged file. The default issues [`BulkLoadCommand::to_sql`].
    fn bulk_load(&mut self, command: &BulkLoadCommand) -> UploadResult<usize> {
        self.execute(&command.to_sql(), &[])
    }
}

/// `(?, ?), (?, ?)` for `rows` rows of `columns` placeholders.
pub fn placeholder_rows(columns: usize, rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_insert_statement_shape() {
        let cmd = BulkLoadCommand {
            database: "Sales".to_string(),
            target: "dbo.[orders]".to_string(),
            path: PathBuf::from("\\\\srv\\drop\\tmp.csv"),
            delimiter: b',',
        };
        assert_eq!(
            cmd.to_sql(),
            "BULK INSERT Sales.dbo.[orders] FROM '\\\\srv\\drop\\tmp.csv' WITH (FIELDTERMINATOR = ',')"
        );
    }

    #[test]
    fn placeholders_repeat_per_row() {
        assert_eq!(placeholder_rows(2, 3), "(?, ?), (?, ?), (?, ?)");
    }
}
