use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    BindOutcome, IndexWarning, NewIndexWarning, NewPatternIndex, PatternIndexRecord,
};
use crate::database::sqlite::queries::{IndexWarningQueries, PatternIndexQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("metadata.db");

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_path).await
    }

    // Pattern index operations
    pub async fn list_indexes(&self) -> Result<Vec<PatternIndexRecord>> {
        PatternIndexQueries::list_all(&self.pool).await
    }

    pub async fn get_index(&self, name: &str) -> Result<Option<PatternIndexRecord>> {
        PatternIndexQueries::get_by_name(&self.pool, name).await
    }

    pub async fn bind_index(
        &self,
        new: &NewPatternIndex,
        warnings: &[NewIndexWarning],
    ) -> Result<BindOutcome> {
        PatternIndexQueries::bind(&self.pool, new, warnings).await
    }

    pub async fn delete_index(&self, name: &str) -> Result<Option<PatternIndexRecord>> {
        PatternIndexQueries::delete_by_name(&self.pool, name).await
    }

    pub async fn bound_tables(&self) -> Result<Vec<String>> {
        PatternIndexQueries::bound_tables(&self.pool).await
    }

    // Warning operations
    pub async fn warnings_for_index(&self, index_id: i64) -> Result<Vec<IndexWarning>> {
        IndexWarningQueries::list_for_index(&self.pool, index_id).await
    }
}
