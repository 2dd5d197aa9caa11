use async_trait::async_trait;
use sqlx::PgPool;

use msgbridge_audit::error::AuditError;
use msgbridge_audit::record::{AuditEntry, AuditPage, AuditQuery};
use msgbridge_audit::store::AuditStore;

use crate::config::PostgresAuditConfig;
use crate::migrations;

/// Postgres-backed audit store using `sqlx`.
pub struct PostgresAuditStore {
    pool: PgPool,
    table: String,
}

impl PostgresAuditStore {
    /// Connect to Postgres and run migrations.
    ///
    /// # Errors
    /// Returns [`AuditError::Storage`] if the connection or migration fails.
    pub async fn new(config: &PostgresAuditConfig) -> Result<Self, AuditError> {
        let pool =
            PgPool::connect(&config.url).await.map_err(|e| AuditError::Storage(e.to_string()))?;
        Self::from_pool(pool, &config.prefix).await
    }

    /// Build from an existing pool (useful for testing).
    ///
    /// # Errors
    /// Returns [`AuditError::Storage`] if migrations fail.
    pub async fn from_pool(pool: PgPool, prefix: &str) -> Result<Self, AuditError> {
        migrations::run_migrations(&pool, prefix)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        Ok(Self { pool, table: format!("{prefix}audit") })
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let sql = format!(
            "INSERT INTO {} (id, kind, data, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
            self.table
        );

        let data = serde_json::to_value(&entry).map_err(|e| AuditError::Serialization(e.to_string()))?;

        sqlx::query(&sql)
            .bind(entry.id())
            .bind(entry.kind())
            .bind(data)
            .bind(entry.created_at())
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuditEntry>, AuditError> {
        let sql = format!("SELECT data FROM {} WHERE id = $1", self.table);

        let row: Option<(serde_json::Value,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        row.map(|(data,)| serde_json::from_value(data).map_err(|e| AuditError::Serialization(e.to_string())))
            .transpose()
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        let limit = query.effective_limit();
        let offset = query.effective_offset();
        let (where_clause, bind_idx) = build_where_clause(query);

        let count_sql = format!("SELECT COUNT(*) FROM {} {where_clause}", self.table);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(ref kind) = query.kind {
            count_q = count_q.bind(kind);
        }
        if let Some(from) = query.from {
            count_q = count_q.bind(from);
        }
        if let Some(to) = query.to {
            count_q = count_q.bind(to);
        }
        let total = count_q.fetch_one(&self.pool).await.map_err(|e| AuditError::Storage(e.to_string()))?;

        let limit_idx = bind_idx;
        let offset_idx = bind_idx + 1;
        let data_sql = format!(
            "SELECT data FROM {} {where_clause} ORDER BY created_at DESC LIMIT ${limit_idx} OFFSET ${offset_idx}",
            self.table
        );
        let mut data_q = sqlx::query_as::<_, (serde_json::Value,)>(&data_sql);
        if let Some(ref kind) = query.kind {
            data_q = data_q.bind(kind);
        }
        if let Some(from) = query.from {
            data_q = data_q.bind(from);
        }
        if let Some(to) = query.to {
            data_q = data_q.bind(to);
        }
        data_q = data_q.bind(i64::from(limit)).bind(i64::from(offset));

        let rows: Vec<(serde_json::Value,)> =
            data_q.fetch_all(&self.pool).await.map_err(|e| AuditError::Storage(e.to_string()))?;

        let records = rows
            .into_iter()
            .map(|(data,)| serde_json::from_value(data).map_err(|e| AuditError::Serialization(e.to_string())))
            .collect::<Result<Vec<AuditEntry>, AuditError>>()?;

        #[allow(clippy::cast_sign_loss)]
        let total = total as u64;

        Ok(AuditPage { records, total, limit, offset })
    }

    async fn cleanup_expired(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64, AuditError> {
        let sql = format!("DELETE FROM {} WHERE created_at <= $1", self.table);

        let result = sqlx::query(&sql)
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

fn build_where_clause(query: &AuditQuery) -> (String, u32) {
    let mut conditions = Vec::new();
    let mut bind_idx = 1u32;

    if query.kind.is_some() {
        conditions.push(format!("kind = ${bind_idx}"));
        bind_idx += 1;
    }
    if query.from.is_some() {
        conditions.push(format!("created_at >= ${bind_idx}"));
        bind_idx += 1;
    }
    if query.to.is_some() {
        conditions.push(format!("created_at <= ${bind_idx}"));
        bind_idx += 1;
    }

    let where_clause =
        if conditions.is_empty() { String::new() } else { format!("WHERE {}", conditions.join(" AND ")) };

    (where_clause, bind_idx)
}
