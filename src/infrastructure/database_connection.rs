// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 10).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Ensure the database file exists by creating it if necessary
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_shipments_sql = r#"
            CREATE TABLE IF NOT EXISTS shipments (
                tracking_id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                recipient_email TEXT NOT NULL,
                shipped_at DATETIME NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                phase TEXT NOT NULL DEFAULT 'processed',
                last_checked_at DATETIME,
                picked_up_at DATETIME,
                delivered_at DATETIME,
                resolved_at DATETIME,
                duration_human TEXT,
                duration_days REAL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_action_log_sql = r#"
            CREATE TABLE IF NOT EXISTS action_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tracking_id TEXT NOT NULL,
                order_id TEXT NOT NULL,
                recipient_email TEXT NOT NULL,
                kind TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_settings_sql = r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_shipments_active ON shipments (active)",
            "CREATE INDEX IF NOT EXISTS idx_action_log_tracking ON action_log (tracking_id, kind)",
            "CREATE INDEX IF NOT EXISTS idx_action_log_created ON action_log (created_at)",
        ];

        sqlx::query(create_shipments_sql).execute(&self.pool).await?;
        sqlx::query(create_action_log_sql).execute(&self.pool).await?;
        sqlx::query(create_settings_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}
