
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

const SELECT_INDEX: &str = r#"
    SELECT id,
           name,
           source,
           table_name,
           embedding_model,
           dimension,
           unit_count,
           file_count,
           statistics,
           created_date,
           indexed_date
    FROM pattern_indexes
"#;

pub struct PatternIndexQueries;

impl PatternIndexQueries {
    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<PatternIndexRecord>> {
        let result = sqlx::query_as::<_, PatternIndexRecord>(&format!("{SELECT_INDEX} WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get pattern index by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<PatternIndexRecord>> {
        let result =
            sqlx::query_as::<_, PatternIndexRecord>(&format!("{SELECT_INDEX} WHERE name = ?"))
                .bind(name)
                .fetch_optional(pool)
                .await
                .context("Failed to get pattern index by name")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<PatternIndexRecord>> {
        let results = sqlx::query_as::<_, PatternIndexRecord>(&format!("{SELECT_INDEX} ORDER BY name"))
            .fetch_all(pool)
            .await
            .context("Failed to list pattern indexes")?;

        Ok(results)
    }

    /// Point `new.name` at a freshly written snapshot and replace its warnings.
    ///
    /// Runs in one transaction, so readers see either the previous binding or
    /// the new one.
    #[inline]
    pub async fn bind(
        pool: &SqlitePool,
        new: &NewPatternIndex,
        warnings: &[NewIndexWarning],
    ) -> Result<BindOutcome> {
        let statistics =
            serde_json::to_string(&new.statistics).context("Failed to serialize statistics")?;
        let now = Utc::now().naive_utc();

        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        let existing =
            sqlx::query_as::<_, PatternIndexRecord>(&format!("{SELECT_INDEX} WHERE name = ?"))
                .bind(&new.name)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to look up existing pattern index")?;

        let id = match &existing {
            Some(previous) => {
                sqlx::query(
                    r#"
                    UPDATE pattern_indexes
                    SET source = ?,
                        table_name = ?,
                        embedding_model = ?,
                        dimension = ?,
                        unit_count = ?,
                        file_count = ?,
                        statistics = ?,
                        indexed_date = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&new.source)
                .bind(&new.table_name)
                .bind(&new.embedding_model)
                .bind(new.dimension)
                .bind(new.unit_count)
                .bind(new.file_count)
                .bind(&statistics)
                .bind(now)
                .bind(previous.id)
                .execute(&mut *tx)
                .await
                .context("Failed to update pattern index")?;

                sqlx::query("DELETE FROM index_warnings WHERE index_id = ?")
                    .bind(previous.id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear index warnings")?;

                previous.id
            }
            None => sqlx::query(
                r#"
                INSERT INTO pattern_indexes
                    (name, source, table_name, embedding_model, dimension,
                     unit_count, file_count, statistics, created_date, indexed_date)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&new.name)
            .bind(&new.source)
            .bind(&new.table_name)
            .bind(&new.embedding_model)
            .bind(new.dimension)
            .bind(new.unit_count)
            .bind(new.file_count)
            .bind(&statistics)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to create pattern index")?
            .last_insert_rowid(),
        };

        for warning in warnings {
            sqlx::query("INSERT INTO index_warnings (index_id, file_path, reason) VALUES (?, ?, ?)")
                .bind(id)
                .bind(&warning.file_path)
                .bind(&warning.reason)
                .execute(&mut *tx)
                .await
                .context("Failed to record index warning")?;
        }

        tx.commit().await.context("Failed to commit index binding")?;

        let previous_table = existing
            .map(|previous| previous.table_name)
            .filter(|table| *table != new.table_name);

        let record = Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve bound pattern index"))?;

        info!(
            "Bound pattern index '{}' to table {}",
            record.name, record.table_name
        );

        Ok(BindOutcome {
            record,
            previous_table,
        })
    }

    /// Remove an index and its warnings, returning the removed row
    #[inline]
    pub async fn delete_by_name(pool: &SqlitePool, name: &str) -> Result<Option<PatternIndexRecord>> {
        let Some(existing) = Self::get_by_name(pool, name).await? else {
            debug!("No pattern index named '{}' to delete", name);
            return Ok(None);
        };

        sqlx::query("DELETE FROM pattern_indexes WHERE id = ?")
            .bind(existing.id)
            .execute(pool)
            .await
            .context("Failed to delete pattern index")?;

        Ok(Some(existing))
    }

    /// Vector tables referenced by any catalog row
    #[inline]
    pub async fn bound_tables(pool: &SqlitePool) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>("SELECT table_name FROM pattern_indexes")
            .fetch_all(pool)
            .await
            .context("Failed to list bound tables")?;

        Ok(tables)
    }
}

pub struct IndexWarningQueries;

impl IndexWarningQueries {
    #[inline]
    pub async fn list_for_index(pool: &SqlitePool, index_id: i64) -> Result<Vec<IndexWarning>> {
        let results = sqlx::query_as::<_, IndexWarning>(
            "SELECT id, index_id, file_path, reason FROM index_warnings WHERE index_id = ? ORDER BY file_path, id",
        )
        .bind(index_id)
        .fetch_all(pool)
        .await
        .context("Failed to list index warnings")?;

        Ok(results)
    }
}
