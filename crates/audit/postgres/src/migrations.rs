use sqlx::PgPool;

/// Run the audit table migration, creating the table and indexes if they do
/// not already exist.
///
/// The five row kinds (`request_log`, `message_log`, `error_log`,
/// `load_balancer_log`, `number_load_stats`) share one table, discriminated
/// by `kind`, with the row's own fields in `data` -- each kind's shape
/// differs enough that per-table columns would mostly be nullable anyway.
pub async fn run_migrations(pool: &PgPool, prefix: &str) -> Result<(), sqlx::Error> {
    let table = format!("{prefix}audit");

    let create_table = format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id         TEXT PRIMARY KEY,
            kind       TEXT NOT NULL,
            data       JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "
    );
    sqlx::query(&create_table).execute(pool).await?;

    let indexes = [
        format!("CREATE INDEX IF NOT EXISTS idx_{prefix}audit_kind_time ON {table} (kind, created_at DESC)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{prefix}audit_time ON {table} (created_at)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{prefix}audit_data ON {table} USING GIN (data)"),
    ];
    for idx in &indexes {
        sqlx::query(idx).execute(pool).await?;
    }

    Ok(())
}
