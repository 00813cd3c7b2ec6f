use super::error::SyncError;
use super::job::RunContext;
use super::progress::{PhaseProgress, COPY_END, COPY_START};
use super::schema::TableDescriptor;
use super::stats::SyncStats;
use crate::db::{DbError, SqlSession};

/// Copy every row of each table from source to target.
///
/// A failing table is logged, recorded in `stats.failed_tables` and skipped;
/// only cancellation ends the loop early.
pub(crate) async fn copy_tables(
    source: &mut dyn SqlSession,
    target: &mut dyn SqlSession,
    tables: &mut [TableDescriptor],
    ctx: &RunContext,
    stats: &mut SyncStats,
) -> Result<(), SyncError> {
    let total = tables.len();
    let band = PhaseProgress::new(COPY_START, COPY_END, total);
    ctx.status.checkpoint("Syncing data...", band.at(0)).await;

    for (index, table) in tables.iter_mut().enumerate() {
        ctx.ensure_active()?;

        match copy_table(source, target, table, ctx, index, total).await {
            Ok(rows) => {
                stats.tables_synced += 1;
                stats.rows_synced += rows;
                log::info!("Synced {rows} rows to table {}", table.name);
            }
            Err(e) => {
                log::error!("Error syncing table {}: {e}", table.name);
                stats.mark_failed(&table.name);
                ctx.status
                    .operation(format!("Error syncing table {}: {e}", table.name))
                    .await;
            }
        }
        ctx.status.progress(band.at(index + 1)).await;
    }
    ctx.status.progress(band.at(total)).await;

    Ok(())
}

async fn copy_table(
    source: &mut dyn SqlSession,
    target: &mut dyn SqlSession,
    table: &mut TableDescriptor,
    ctx: &RunContext,
    index: usize,
    total: usize,
) -> Result<u64, DbError> {
    let rows = source.fetch_rows(&table.name).await?;
    ctx.status
        .operation(format!(
            "[{}/{}] Syncing {} rows from {}...",
            index + 1,
            total,
            rows.len(),
            table.name
        ))
        .await;

    target.truncate_table(&table.name).await?;

    table.columns = source.column_names(&table.name).await?;

    let written = target
        .insert_rows(&table.name, &table.columns, &rows)
        .await?;
    if written != rows.len() as u64 {
        log::warn!(
            "Table {}: read {} rows from source but target reported {} written",
            table.name,
            rows.len(),
            written
        );
    }

    Ok(rows.len() as u64)
}
