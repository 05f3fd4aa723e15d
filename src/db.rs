use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the metadata database
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection; called once at shutdown
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                filename TEXT NOT NULL,
                original_name TEXT,
                filepath TEXT NOT NULL,
                filesize INTEGER NOT NULL,
                mimetype TEXT,
                uploaded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Databases created before original names were tracked
        let _ = sqlx::query("ALTER TABLE documents ADD COLUMN original_name TEXT")
            .execute(&self.pool)
            .await;

        // Legacy CURRENT_TIMESTAMP values ("YYYY-MM-DD HH:MM:SS") must sort with RFC 3339 ones
        sqlx::query(
            r#"
            UPDATE documents
            SET uploaded_at = strftime('%Y-%m-%dT%H:%M:%fZ', uploaded_at)
            WHERE uploaded_at NOT LIKE '%T%'
              AND strftime('%Y-%m-%dT%H:%M:%fZ', uploaded_at) IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_title ON documents(title)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploaded_at ON documents(uploaded_at)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }
}
