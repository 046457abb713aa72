use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use welcomebot_core::errors::HostError;
use welcomebot_core::kv::KvStore;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum KvStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<KvStoreError> for HostError {
    fn from(error: KvStoreError) -> Self {
        HostError::Kv(error.to_string())
    }
}

/// Plugin key-value storage in the `plugin_kv` table.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: DbPool,
}

impl SqliteKvStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), KvStoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Number of stored keys starting with `prefix`.
    pub async fn count_with_prefix(&self, prefix: &str) -> Result<i64, KvStoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM plugin_kv WHERE instr(key, ?) = 1")
            .bind(prefix)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, KvStoreError> {
        let value = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM plugin_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn upsert(&self, key: &str, value: &[u8]) -> Result<(), KvStoreError> {
        sqlx::query(
            "INSERT INTO plugin_kv (key, value, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<u64, KvStoreError> {
        let result = sqlx::query("DELETE FROM plugin_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.fetch(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), HostError> {
        self.upsert(key, value).await?;
        debug!(event_name = "welcomebot.kv.set", key, bytes = value.len(), "stored kv value");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), HostError> {
        let removed = self.remove(key).await?;
        debug!(event_name = "welcomebot.kv.delete", key, removed, "deleted kv value");
        Ok(())
    }
}
