use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, instrument};

/// Stored media record: the persisted mapping from an ingested file to its
/// canonical and thumbnail public URLs. Insert-once, immutable, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Unique file id
    pub id: i64,
    /// Public URL of the original upload
    pub file_uri: String,
    /// Public URL of the derived thumbnail
    pub thumbnail_uri: String,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Store adapter for stored media records
#[derive(Clone)]
pub struct MediaStore {
    pool: PgPool,
}

impl MediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a stored media record, capturing the generated id
    #[instrument(skip(self))]
    pub async fn insert_file(
        &self,
        file_uri: &str,
        thumbnail_uri: &str,
    ) -> Result<FileRecord, sqlx::Error> {
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO files (file_uri, thumbnail_uri)
            VALUES ($1, $2)
            RETURNING id, file_uri, thumbnail_uri, created_at
            "#,
        )
        .bind(file_uri)
        .bind(thumbnail_uri)
        .fetch_one(&self.pool)
        .await?;

        debug!(file_id = record.id, "Media record persisted");

        Ok(record)
    }

    /// Get a stored media record by id
    pub async fn get_file(&self, id: i64) -> Result<Option<FileRecord>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, file_uri, thumbnail_uri, created_at
            FROM files
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get the connection pool (for readiness checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
