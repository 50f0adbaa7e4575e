use anyhow::{Context, Result};
use directories::ProjectDirs;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;

const DB_FILE_NAME: &str = "orgdraw.db";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = std::env::var("ORGDRAW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());
        Self { path }
    }
}

fn default_db_path() -> PathBuf {
    ProjectDirs::from("dev", "orgdraw", "orgdraw")
        .map(|dirs| dirs.data_dir().join(DB_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
}

impl DatabaseConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let db = Self { pool, config };
        db.run_migrations().await?;
        tracing::debug!(path = %db.config.path.display(), "database ready");
        Ok(db)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                token TEXT PRIMARY KEY NOT NULL,
                owner TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_activity_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create credentials table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS diagrams (
                id TEXT PRIMARY KEY NOT NULL,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                node_count INTEGER NOT NULL DEFAULT 0,
                connection_count INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create diagrams table")?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_diagrams_owner ON diagrams(owner, updated_at DESC)"#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create diagrams_owner index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS diagram_items (
                diagram_id TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('node', 'connection')),
                position INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (diagram_id, kind, position),
                FOREIGN KEY (diagram_id) REFERENCES diagrams(id) ON DELETE CASCADE
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create diagram_items table")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_missing_file_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let db = Database::new(DatabaseConfig::at(&db_path)).await.unwrap();
        assert!(db_path.exists());
        for table in ["credentials", "diagrams", "diagram_items"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(db.pool())
                .await
                .unwrap();
            assert_eq!(count, 0);
        }

        // migrations are idempotent
        Database::new(DatabaseConfig::at(&db_path)).await.unwrap();
    }
}
