//! Staging-file access for bulk loads.
//!
//! The bulk-file strategy only needs three file operations, behind [`FileService`] so tests (and
//! deployments that stage through a share) can swap the implementation.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::UploadResult;

/// File operations used for the bulk-load staging file.
pub trait FileService: Send + Sync {
    /// Remove `path`. A missing file is not an error.
    fn delete(&self, path: &Path) -> UploadResult<()>;

    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Write `rows` as delimiter-separated lines without a header.
    ///
    /// Fields are written as-is; callers strip the delimiter and quote characters beforehand.
    fn write_delimited(&self, path: &Path, delimiter: u8, rows: &[Vec<String>]) -> UploadResult<()>;
}

/// [`FileService`] over the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileService;

impl FileService for LocalFileService {
    fn delete(&self, path: &Path) -> UploadResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn write_delimited(&self, path: &Path, delimiter: u8, rows: &[Vec<String>]) -> UploadResult<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .quote_style(csv::QuoteStyle::Never)
            .from_path(path)?;
        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
