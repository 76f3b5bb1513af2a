use super::{Binding, LoadContext, apply_policy};
use crate::chunk::ChunkPlan;
use crate::connection::placeholder_rows;
use crate::error::UploadResult;
use crate::format::{Literal, format_statement};
use crate::types::Value;

/// Format every value to a token, then send one `INSERT ... VALUES` statement per chunk.
///
/// With [`Binding::Parameterized`] a chunk is also capped so it never exceeds the driver's bind
/// parameter limit.
pub(super) fn load(ctx: &LoadContext<'_>, binding: Binding) -> UploadResult<usize> {
    let rows = format_statement(ctx.dataset)?;
    let columns = ctx.dataset.column_count();
    let target = ctx.target.as_str();

    ctx.conn.with_transaction(|tx| {
        apply_policy(tx, ctx)?;
        let rows_per_statement = match binding {
            Binding::Parameterized => ctx.chunk_size.min((tx.max_bind_params() / columns).max(1)),
            Binding::InlineLiterals => ctx.chunk_size,
        };

        let mut sent = 0;
        for (index, range) in ChunkPlan::new(rows.len(), rows_per_statement)?.enumerate() {
            let batch = &rows[range.clone()];
            match binding {
                Binding::Parameterized => {
                    let sql = format!(
                        "INSERT INTO {target} VALUES {}",
                        placeholder_rows(columns, batch.len())
                    );
                    let params: Vec<Value> = batch.iter().flatten().map(Literal::to_param).collect();
                    tx.execute(&sql, &params)?;
                }
                Binding::InlineLiterals => {
                    tx.execute(&inline_insert_sql(target, batch), &[])?;
                }
            }
            ctx.telemetry.chunk_sent(target, index, &range);
            sent += range.len();
        }
        Ok(sent)
    })
}

/// `INSERT INTO <target> VALUES (a,b), (c,d)` with every token inlined.
pub(super) fn inline_insert_sql(target: &str, batch: &[Vec<Literal>]) -> String {
    let values = batch
        .iter()
        .map(|row| {
            let tokens = row.iter().map(|t| t.to_sql()).collect::<Vec<_>>();
            format!("({})", tokens.join(","))
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {target} VALUES {values}")
}
