//! JSON configuration for uploads.
//!
//! ```json
//! {
//!   "connection": { "database": "warehouse.db", "driver": "sqlite", "pool_size": 2 },
//!   "chunk_size": 500,
//!   "policy": "delete_then_insert",
//!   "strategy": { "kind": "bulk_file_load", "folder": "/srv/share", "delimiter": ";" },
//!   "log_table": "upload_log"
//! }
//! ```
//!
//! Every key is optional; missing keys take the same defaults as [`UploadRequest::new`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::connection::ConnectionParams;
use crate::error::{UploadError, UploadResult};
use crate::job::{LogTarget, UploadTarget};
use crate::strategy::{Binding, ExistencePolicy, StagingOptions, Strategy};
use crate::types::DataSet;
use crate::upload::{DEFAULT_CHUNK_SIZE, UploadRequest};

/// Connection plus per-request defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub connection: ConnectionParams,
    pub chunk_size: usize,
    pub policy: ExistencePolicy,
    pub strategy: StrategyConfig,
    /// Audit table; `None` disables audit rows.
    pub log_table: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            policy: ExistencePolicy::default(),
            strategy: StrategyConfig::default(),
            log_table: None,
        }
    }
}

/// Serialized form of [`Strategy`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    BatchedAppend,
    MassStatementInsert {
        #[serde(default)]
        binding: Binding,
    },
    BulkFileLoad {
        #[serde(default)]
        folder: Option<PathBuf>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        delimiter: Option<char>,
    },
}

impl UploadConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> UploadResult<Self> {
        serde_json::from_str(json).map_err(|e| UploadError::Config {
            message: e.to_string(),
        })
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| UploadError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// The configured strategy. The delimiter must be a single-byte character.
    pub fn strategy(&self) -> UploadResult<Strategy> {
        Ok(match &self.strategy {
            StrategyConfig::BatchedAppend => Strategy::BatchedAppend,
            StrategyConfig::MassStatementInsert { binding } => Strategy::MassStatementInsert { binding: *binding },
            StrategyConfig::BulkFileLoad {
                folder,
                file_name,
                delimiter,
            } => {
                let mut staging = StagingOptions::default();
                if let Some(folder) = folder {
                    staging.folder = folder.clone();
                }
                if let Some(file_name) = file_name {
                    staging.file_name = file_name.clone();
                }
                if let Some(d) = delimiter {
                    staging.delimiter = u8::try_from(*d)
                        .ok()
                        .filter(u8::is_ascii)
                        .ok_or_else(|| UploadError::Config {
                            message: format!("delimiter '{d}' is not a single-byte character"),
                        })?;
                }
                Strategy::BulkFileLoad(staging)
            }
        })
    }

    /// A request for `dataset` into `target` carrying the configured defaults.
    pub fn request_for(&self, dataset: Arc<DataSet>, target: UploadTarget) -> UploadResult<UploadRequest> {
        let mut request = UploadRequest::new(dataset, target)
            .strategy(self.strategy()?)
            .policy(self.policy)
            .chunk_size(self.chunk_size);
        if let Some(log_table) = &self.log_table {
            request = request.log_to(LogTarget::new(log_table.clone())?);
        }
        Ok(request)
    }
}
