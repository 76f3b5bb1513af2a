use std::path::{Path, PathBuf};

use tracing::warn;

use super::{LoadContext, StagingOptions, apply_policy};
use crate::connection::BulkLoadCommand;
use crate::error::UploadResult;
use crate::execution::{Telemetry, UploadEvent};
use crate::files::FileService;
use crate::format::format_delimited;

/// Stage the dataset as a delimited file and have the server bulk-copy it.
///
/// The staging file is removed on every exit path once it has been claimed.
pub(super) fn load(ctx: &LoadContext<'_>, staging: &StagingOptions) -> UploadResult<usize> {
    let fields = format_delimited(ctx.dataset, staging.delimiter)?;
    let target = ctx.target.as_str();

    let file = StagingFile::claim(ctx.files, staging.path(), ctx.telemetry)?;
    ctx.files.write_delimited(file.path(), staging.delimiter, &fields)?;
    ctx.telemetry.emit(UploadEvent::StagingFileWritten {
        path: file.path().to_path_buf(),
        rows: fields.len(),
    });

    let command = BulkLoadCommand {
        database: ctx.conn.database().to_string(),
        target: target.to_string(),
        path: file.path().to_path_buf(),
        delimiter: staging.delimiter,
    };
    ctx.conn.with_transaction(|tx| {
        apply_policy(tx, ctx)?;
        tx.bulk_load(&command)?;
        Ok(())
    })?;

    if !fields.is_empty() {
        ctx.telemetry.chunk_sent(target, 0, &(0..fields.len()));
    }
    Ok(fields.len())
}

/// Owns the staging path: clears it on claim, deletes it on drop.
struct StagingFile<'a> {
    files: &'a dyn FileService,
    path: PathBuf,
    telemetry: &'a Telemetry,
}

impl<'a> StagingFile<'a> {
    fn claim(files: &'a dyn FileService, path: PathBuf, telemetry: &'a Telemetry) -> UploadResult<Self> {
        files.delete(&path)?;
        Ok(Self { files, path, telemetry })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingFile<'_> {
    fn drop(&mut self) {
        match self.files.delete(&self.path) {
            Ok(()) => self.telemetry.emit(UploadEvent::StagingFileRemoved {
                path: self.path.clone(),
            }),
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed to remove staging file"),
        }
    }
}
