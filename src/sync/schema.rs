use super::error::SyncError;
use super::job::{RunContext, SyncPhase};
use super::progress::{
    PhaseProgress, CREATE_END, CREATE_START, DROP_END, FOREIGN_KEYS_DISABLED,
};
use super::stats::SyncStats;
use crate::db::{DbError, SqlSession};

/// A source table as the copier sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    /// `SHOW CREATE TABLE` output, replayed verbatim on the target.
    pub create_statement: String,
    /// Filled in by the copier from the source at copy time.
    pub columns: Vec<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, create_statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create_statement: create_statement.into(),
            columns: Vec::new(),
        }
    }
}

fn schema_error(action: String) -> impl FnOnce(DbError) -> SyncError {
    move |source| SyncError::Phase {
        phase: SyncPhase::MirroringSchema,
        action,
        source,
    }
}

/// Drop every table in the target. Any single failure aborts the run.
pub(crate) async fn wipe_target(
    target: &mut dyn SqlSession,
    ctx: &RunContext,
    stats: &mut SyncStats,
) -> Result<(), SyncError> {
    ctx.status.operation("Deleting all tables from target").await;
    let tables = target
        .list_tables()
        .await
        .map_err(schema_error("listing target tables".to_string()))?;

    let band = PhaseProgress::new(FOREIGN_KEYS_DISABLED, DROP_END, tables.len());
    for (index, table) in tables.iter().enumerate() {
        ctx.ensure_active()?;
        target
            .drop_table(table)
            .await
            .map_err(schema_error(format!("dropping target table {table}")))?;
        stats.tables_deleted += 1;
        log::debug!("Dropped table {table} from target");
        ctx.status.progress(band.at(index + 1)).await;
    }
    ctx.status.progress(band.at(tables.len())).await;

    log::info!("Deleted {} tables from target", stats.tables_deleted);
    Ok(())
}

/// Recreate every source table on the target, one at a time.
///
/// Tables whose creation fails are recorded in `stats.failed_tables` and left
/// out of the returned list.
pub(crate) async fn mirror_tables(
    source: &mut dyn SqlSession,
    target: &mut dyn SqlSession,
    ctx: &RunContext,
    stats: &mut SyncStats,
) -> Result<Vec<TableDescriptor>, SyncError> {
    ctx.status.operation("Getting tables from source").await;
    let tables = source
        .list_tables()
        .await
        .map_err(schema_error("listing source tables".to_string()))?;
    ctx.status.progress(DROP_END).await;

    let total = tables.len();
    let band = PhaseProgress::new(CREATE_START, CREATE_END, total);
    ctx.status.checkpoint("Creating tables...", band.at(0)).await;

    let mut created = Vec::with_capacity(total);
    for (index, table) in tables.into_iter().enumerate() {
        ctx.ensure_active()?;
        ctx.status
            .operation(format!("[{}/{}] Creating table {}...", index + 1, total, table))
            .await;

        match create_table(source, target, &table).await {
            Ok(statement) => {
                log::info!("Created table {table} in target");
                stats.tables_created += 1;
                created.push(TableDescriptor::new(table, statement));
            }
            Err(e) => {
                log::error!("Error creating table {table}: {e}");
                stats.mark_failed(&table);
            }
        }
        ctx.status.progress(band.at(index + 1)).await;
    }
    ctx.status.progress(band.at(total)).await;

    Ok(created)
}

async fn create_table(
    source: &mut dyn SqlSession,
    target: &mut dyn SqlSession,
    table: &str,
) -> Result<String, DbError> {
    let statement = source.show_create_table(table).await?;
    target.execute(&statement).await?;
    Ok(statement)
}
