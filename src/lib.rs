//! `dataset-upload` moves an in-memory [`types::DataSet`] into a relational table, choosing
//! between three load strategies and verifying the result.
//!
//! The primary entrypoint is [`Uploader::upload`], which runs one [`UploadRequest`] and always
//! returns an [`UploadReport`]: the finished [`job::UploadJob`] plus an explicit outcome.
//!
//! ## Strategies
//!
//! - [`strategy::Strategy::BatchedAppend`]: typed values through the driver's multi-row insert
//! - [`strategy::Strategy::MassStatementInsert`]: generated `INSERT ... VALUES` statements of
//!   formatted tokens (bound as parameters by default)
//! - [`strategy::Strategy::BulkFileLoad`]: a delimited staging file plus a server-side bulk copy;
//!   the staging file is removed however the load ends
//!
//! ## Existing rows
//!
//! [`strategy::ExistencePolicy`] decides what happens to the target first:
//!
//! - `CreateOrReplace`: drop and recreate from the dataset's schema
//! - `Append`: keep existing rows
//! - `DeleteThenInsert` (default): empty the table, keep its definition
//!
//! The policy step and every chunk run in one transaction. Under `CreateOrReplace` and
//! `DeleteThenInsert` the target's row count is checked afterwards:
//!
//! - load failed: [`job::CommitState::RolledBack`], target unchanged
//! - load committed, count matches: [`job::CommitState::Committed`]
//! - load committed, count differs: [`job::CommitState::Fault`]
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dataset_upload::connection::{ConnectionManager, ConnectionParams, SqliteDriver};
//! use dataset_upload::job::UploadTarget;
//! use dataset_upload::types::{DataSet, DataType, Field, Schema, Value};
//! use dataset_upload::{UploadRequest, Uploader};
//!
//! # fn main() -> Result<(), dataset_upload::UploadError> {
//! let conn = ConnectionManager::connect(ConnectionParams::sqlite("warehouse.db"), Arc::new(SqliteDriver))?;
//! let uploader = Uploader::new(Arc::new(conn));
//!
//! let schema = Schema::new(vec![
//!     Field::new("id", DataType::Int64),
//!     Field::new("name", DataType::Utf8),
//! ]);
//! let ds = DataSet::try_new(
//!     schema,
//!     vec![
//!         vec![Value::Int64(1), Value::Utf8("a".to_string())],
//!         vec![Value::Int64(2), Value::Null],
//!     ],
//! )?;
//!
//! let request = UploadRequest::new(Arc::new(ds), UploadTarget::new("customers")?);
//! let job = uploader.upload(&request).into_result()?;
//! println!("{} rows, {:?}", job.row_count(), job.commit_state());
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrent uploads
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dataset_upload::execution::TaskScheduler;
//! use dataset_upload::{UploadRequest, Uploader};
//!
//! fn load_all(uploader: Arc<Uploader>, requests: Vec<UploadRequest>) -> dataset_upload::UploadResult<()> {
//!     let scheduler = TaskScheduler::new(uploader);
//!     let handles = requests
//!         .into_iter()
//!         .map(|r| scheduler.submit(r))
//!         .collect::<Result<Vec<_>, _>>()?;
//!     for report in TaskScheduler::wait_all(handles) {
//!         println!("{}: {:?}", report.job.target(), report.commit_state());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Uploads to distinct targets are independent. Two uploads to the same target at the same time
//! are not serialized by this crate.
//!
//! ## Modules
//!
//! - [`types`]: schema + in-memory dataset types
//! - [`format`]: value formatting per strategy
//! - [`chunk`]: chunk planning
//! - [`strategy`]: load strategies and existence policies
//! - [`connection`]: driver seam, pooled sessions, transactions
//! - [`execution`]: background scheduling, observers, metrics
//! - [`audit`]: audit rows
//! - [`config`]: JSON configuration
//! - [`error`]: error types used across the crate

pub mod audit;
pub mod chunk;
pub mod config;
pub mod connection;
pub mod error;
pub mod execution;
pub mod files;
pub mod format;
pub mod job;
pub mod strategy;
pub mod types;
pub mod upload;

pub use error::{ErrorKind, UploadError, UploadResult};
pub use upload::{UploadReport, UploadRequest, Uploader};
