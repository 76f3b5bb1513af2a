use tracing::debug;

use super::{LoadContext, apply_policy};
use crate::chunk::ChunkPlan;
use crate::error::UploadResult;
use crate::format::format_native;

/// Hand typed rows to the driver's multi-row insert, one chunk at a time.
pub(super) fn load(ctx: &LoadContext<'_>) -> UploadResult<usize> {
    let rows = format_native(ctx.dataset)?;
    let columns: Vec<&str> = ctx.dataset.schema.field_names().collect();
    let target = ctx.target.as_str();
    let plan = ChunkPlan::new(rows.len(), ctx.chunk_size)?;

    ctx.conn.with_transaction(|tx| {
        apply_policy(tx, ctx)?;
        let mut sent = 0;
        for (index, range) in plan.enumerate() {
            let reported = tx.insert_rows(target, &columns, &rows[range.clone()])?;
            debug!(target_table = target, index, reported, "batch inserted");
            ctx.telemetry.chunk_sent(target, index, &range);
            sent += range.len();
        }
        Ok(sent)
    })
}
