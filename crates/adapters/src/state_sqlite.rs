//! SQLite poll-state store implementation

use async_trait::async_trait;
use skyrelay_domain::{FeedIdentity, PollCheckpoint, PollStateStore, StateError};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// SQLite-backed poll-state store
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Create a new SQLite state store, initializing the database if needed
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::Database(format!("Failed to create directory: {}", e)))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StateError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StateError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_state (
                identity TEXT PRIMARY KEY,
                last_emitted_post_id TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl PollStateStore for SqliteStateStore {
    async fn load(&self, identity: &FeedIdentity) -> Result<Option<PollCheckpoint>, StateError> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT identity, last_emitted_post_id, updated_at FROM poll_state WHERE identity = ?",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateError::Database(e.to_string()))?;

        let Some((stored_identity, last_emitted_post_id, updated_at_str)) = row else {
            return Ok(None);
        };

        let identity = FeedIdentity::parse(&stored_identity).ok_or_else(|| {
            StateError::Serialization(format!("Invalid stored identity: {:?}", stored_identity))
        })?;
        let updated_at = OffsetDateTime::parse(&updated_at_str, &Rfc3339)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        Ok(Some(PollCheckpoint {
            identity,
            last_emitted_post_id,
            updated_at,
        }))
    }

    async fn save(&self, checkpoint: &PollCheckpoint) -> Result<(), StateError> {
        let updated_at_str = checkpoint
            .updated_at
            .format(&Rfc3339)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO poll_state (identity, last_emitted_post_id, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(identity) DO UPDATE SET
                last_emitted_post_id = excluded.last_emitted_post_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(checkpoint.identity.as_str())
        .bind(&checkpoint.last_emitted_post_id)
        .bind(&updated_at_str)
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(())
    }
}
