// Rust guideline compliant 2026-10-08

//! SQLite adapter for the `SessionStore` port (demo).
//!
//! Persists session keys to a SQLite file via `sqlx`, so a staged payment
//! survives a restart of the binary. `remove_many` and `replace` each run
//! in one SQL transaction: either every change lands or none does.

use domain::{SessionStore, StoreError};

/// `SessionStore` adapter backed by a SQLite database via `sqlx`.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: sqlx::SqlitePool,
}

impl SqliteSessionStore {
    /// Open or create a SQLite database and initialize the schema.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or schema creation fails.
    pub async fn new(db_url: &str) -> Result<Self, sqlx::Error> {
        // sqlx 0.8 does not create file databases unless asked to.
        let opts = db_url.parse::<sqlx::sqlite::SqliteConnectOptions>()?.create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(opts).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

fn unavailable(op: &'static str, e: &sqlx::Error) -> StoreError {
    tracing::error!(op, error = %e, "sqlite_session.failed");
    StoreError::Unavailable { reason: format!("sqlite {op}: {e}") }
}

impl SessionStore for SqliteSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM session_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("get", &e))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO session_kv (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| unavailable("set", &e))?;
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| unavailable("begin", &e))?;
        for key in keys {
            sqlx::query("DELETE FROM session_kv WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await
                .map_err(|e| unavailable("delete", &e))?;
        }
        tx.commit().await.map_err(|e| unavailable("commit", &e))
    }

    async fn replace(&self, key: &str, value: String, remove: &[&str]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| unavailable("begin", &e))?;
        for stale in remove {
            sqlx::query("DELETE FROM session_kv WHERE key = ?")
                .bind(*stale)
                .execute(&mut *tx)
                .await
                .map_err(|e| unavailable("delete", &e))?;
        }
        sqlx::query("INSERT OR REPLACE INTO session_kv (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| unavailable("set", &e))?;
        tx.commit().await.map_err(|e| unavailable("commit", &e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
