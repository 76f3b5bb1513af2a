//! Load strategies.
//!
//! Three interchangeable ways to move a [`DataSet`] into a table:
//!
//! - [`Strategy::BatchedAppend`]: typed values through the driver's multi-row insert
//! - [`Strategy::MassStatementInsert`]: formatted tokens in generated `INSERT ... VALUES` batches
//! - [`Strategy::BulkFileLoad`]: a staged delimited file plus a server-side bulk copy
//!
//! Whatever the strategy, the [`ExistencePolicy`] step and every chunk run inside one
//! transaction, so a failure anywhere leaves the target as it was.

mod batched;
mod bulk;
mod statement;

use std::path::PathBuf;

use serde::Deserialize;

use crate::connection::{ConnectionManager, Transaction};
use crate::error::UploadResult;
use crate::execution::{Telemetry, UploadEvent};
use crate::files::FileService;
use crate::format::text_widths;
use crate::job::UploadTarget;
use crate::types::DataSet;

/// What happens to the target's existing rows (and definition) before loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistencePolicy {
    /// Drop the table if it exists and create it from the dataset's schema.
    CreateOrReplace,
    /// Keep existing rows; insert after them.
    Append,
    /// Delete every existing row, keep the table definition, then insert.
    #[default]
    DeleteThenInsert,
}

impl ExistencePolicy {
    /// Whether the post-load row count must equal the dataset's row count.
    ///
    /// Append has no baseline to check against.
    pub fn verifies_row_count(self) -> bool {
        !matches!(self, ExistencePolicy::Append)
    }
}

/// Fieldless tag of a [`Strategy`], recorded on the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    BatchedAppend,
    MassStatementInsert,
    BulkFileLoad,
}

/// How [`Strategy::MassStatementInsert`] puts values into its statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// Bind each formatted token as a parameter.
    #[default]
    Parameterized,
    /// Concatenate the tokens into the statement text.
    InlineLiterals,
}

/// Where and how the bulk-load staging file is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingOptions {
    /// Folder visible to both this process and the database server.
    pub folder: PathBuf,
    /// File name inside `folder`.
    pub file_name: String,
    /// Field separator.
    pub delimiter: u8,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            folder: std::env::temp_dir(),
            file_name: "tmp.csv".to_string(),
            delimiter: b',',
        }
    }
}

impl StagingOptions {
    /// Stage in `folder` with the default file name and delimiter.
    pub fn in_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    /// Full staging file path.
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.file_name)
    }
}

/// A load algorithm plus its strategy-specific options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Driver-native multi-row inserts of typed values.
    #[default]
    BatchedAppend,
    /// Generated `INSERT INTO <target> VALUES (...), (...)` statements, one per chunk.
    MassStatementInsert {
        /// Parameter binding or inline literals.
        binding: Binding,
    },
    /// Delimited staging file plus a server-side bulk copy.
    BulkFileLoad(StagingOptions),
}

impl Strategy {
    /// The fieldless tag for this strategy.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::BatchedAppend => StrategyKind::BatchedAppend,
            Strategy::MassStatementInsert { .. } => StrategyKind::MassStatementInsert,
            Strategy::BulkFileLoad(_) => StrategyKind::BulkFileLoad,
        }
    }
}

/// Everything a strategy needs for one invocation.
pub(crate) struct LoadContext<'a> {
    pub(crate) conn: &'a ConnectionManager,
    pub(crate) files: &'a dyn FileService,
    pub(crate) dataset: &'a DataSet,
    pub(crate) target: &'a UploadTarget,
    pub(crate) policy: ExistencePolicy,
    pub(crate) chunk_size: usize,
    pub(crate) telemetry: &'a Telemetry,
}

/// Run `strategy`. Returns the number of dataset rows sent to the database.
pub(crate) fn run(ctx: &LoadContext<'_>, strategy: &Strategy) -> UploadResult<usize> {
    match strategy {
        Strategy::BatchedAppend => batched::load(ctx),
        Strategy::MassStatementInsert { binding } => statement::load(ctx, *binding),
        Strategy::BulkFileLoad(staging) => bulk::load(ctx, staging),
    }
}

/// The [`ExistencePolicy`] step, inside the load transaction.
fn apply_policy(tx: &mut Transaction<'_>, ctx: &LoadContext<'_>) -> UploadResult<()> {
    let target = ctx.target.as_str();
    match ctx.policy {
        ExistencePolicy::Append => return Ok(()),
        ExistencePolicy::DeleteThenInsert => {
            tx.execute(&format!("DELETE FROM {target}"), &[])?;
        }
        ExistencePolicy::CreateOrReplace => {
            tx.execute(&format!("DROP TABLE IF EXISTS {target}"), &[])?;
            let create = create_table_sql(tx, target, ctx.dataset);
            tx.execute(&create, &[])?;
        }
    }
    ctx.telemetry.emit(UploadEvent::PreloadApplied {
        target: target.to_string(),
        policy: ctx.policy,
    });
    Ok(())
}

fn create_table_sql(tx: &Transaction<'_>, target: &str, dataset: &DataSet) -> String {
    let columns = dataset
        .schema
        .fields
        .iter()
        .zip(text_widths(dataset))
        .map(|(field, width)| {
            format!(
                "{} {}",
                tx.quote_identifier(&field.name),
                tx.column_type(field.data_type, width)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {target} ({columns})")
}
