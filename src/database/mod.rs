use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::audit::record::{AuditRecord, Payload};
use crate::audit::store::RecordStore;
use crate::error::AuditError;

/// SQLite-backed durable storage for the audit chain.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AuditError::Config(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Database { pool })
    }

    /// In-memory database for tests. A single connection keeps every
    /// operation on the same SQLite memory instance.
    pub async fn new_in_memory() -> Result<Self, AuditError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Database { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), AuditError> {
        sqlx::raw_sql(include_str!("migrations/001_audit_records.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Records for one actor, most recent first. Lookup path only; chain
    /// verification always walks the full store in append order.
    pub async fn records_for_actor(&self, actor_id: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, payload, created_at, origin, prev_hash, hash
            FROM audit_records
            WHERE actor_id = ?1
            ORDER BY seq DESC
            "#,
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<AuditRecord, AuditError> {
    let payload_text: String = row.try_get("payload")?;
    let payload: Payload = serde_json::from_str(&payload_text)?;

    let created_at_text: String = row.try_get("created_at")?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at_text)
        .map_err(|e| AuditError::Storage(format!("Invalid created_at in storage: {}", e)))?
        .with_timezone(&Utc);

    Ok(AuditRecord {
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        action: row.try_get("action")?,
        payload,
        created_at,
        origin: row.try_get("origin")?,
        prev_hash: row.try_get("prev_hash")?,
        hash: row.try_get("hash")?,
    })
}

#[async_trait]
impl RecordStore for Database {
    async fn tip_hash(&self) -> Result<Option<String>, AuditError> {
        let row = sqlx::query("SELECT hash FROM audit_records ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("hash")?)),
            None => Ok(None),
        }
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (id, actor_id, action, payload, created_at, origin, prev_hash, hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.actor_id)
        .bind(&record.action)
        .bind(record.payload_canonical())
        .bind(record.created_at.to_rfc3339())
        .bind(&record.origin)
        .bind(&record.prev_hash)
        .bind(&record.hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, payload, created_at, origin, prev_hash, hash
            FROM audit_records
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}
