//! Postgres-backed key-value store.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::info;

use super::{DbConfig, DbError, KvStore};

/// Stores every key in a single `kv_entries` table with a JSONB value.
#[derive(Clone)]
pub struct PostgresKvStore {
    pool: PgPool,
}

impl PostgresKvStore {
    /// Create a connection pool and make sure the table exists.
    pub async fn connect(database_url: &str, config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(database_url)
            .await
            .map_err(DbError::Connect)?;

        let store = Self { pool };
        store.ensure_table().await?;

        info!("Database connection pool established");
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_table(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for PostgresKvStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let row = sqlx::query("SELECT value::text AS value FROM kv_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;

        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(DbError::Query)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT key, value::text AS value
            FROM kv_entries
            WHERE starts_with(key, $1)
            ORDER BY key
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.into_iter()
            .map(|r| {
                let key: String = r.try_get("key")?;
                let value: String = r.try_get("value")?;
                Ok((key, value))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(DbError::Query)
    }

    async fn create(&self, key: &str, value: String) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES ($1, $2::jsonb, now())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(DbError::AlreadyExists(key.to_string()));
        }
        Ok(())
    }

    async fn update(&self, key: &str, value: String) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE kv_entries SET value = $2::jsonb, updated_at = now() WHERE key = $1",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES ($1, $2::jsonb, now())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}
