#[cfg(test)]
mod tests;

use crate::index::IndexedUnit;
use crate::parser::CodeUnit;
use crate::patterns::PatternFingerprint;
use crate::retry::RetryPolicy;
use crate::{ReviewError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const WRITE_BATCH_ROWS: usize = 1024;

/// Snapshot storage: one LanceDB table per index version.
///
/// Every table operation runs under the retry policy.
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
    retry: RetryPolicy,
}

fn db_error(context: &str, error: impl std::fmt::Display) -> ReviewError {
    ReviewError::Database(format!("{context}: {error}"))
}

fn column<'b, T: 'static>(batch: &'b RecordBatch, name: &str) -> Result<&'b T, ReviewError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ReviewError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ReviewError::Database(format!("Invalid {name} column type")))
}

fn row_index(value: usize) -> Result<u32, ReviewError> {
    u32::try_from(value).map_err(|_| ReviewError::Database(format!("Row value {value} overflows")))
}

impl VectorStore {
    /// Open the vector database under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, ReviewError> {
        let db_path = config
            .vector_database_path()
            .map_err(|e| ReviewError::Config(format!("Failed to get vector path: {}", e)))?;
        Ok(Self::open(&db_path).await?.with_retry(config.retry.policy()))
    }

    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self, ReviewError> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path)
            .map_err(|e| db_error("Failed to create vector database directory", e))?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            db_error("Failed to connect to LanceDB", e)
        })?;

        info!("Vector store initialized successfully");
        Ok(Self {
            connection,
            path: db_path.to_path_buf(),
            retry: RetryPolicy::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub async fn table_names(&self) -> Result<Vec<String>, ReviewError> {
        self.retry
            .storage("list tables", move || self.list_tables())
            .await
    }

    async fn list_tables(&self) -> Result<Vec<String>, ReviewError> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("ordinal", DataType::UInt32, false),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("start_line", DataType::UInt32, false),
            Field::new("end_line", DataType::UInt32, false),
            Field::new("unit", DataType::Utf8, false),
            Field::new("fingerprint", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
        ]))
    }

    /// Write every unit of a new snapshot into a fresh table.
    ///
    /// Snapshots are never patched: a retried write first discards what the
    /// failed attempt left behind. The per-attempt timeout grows with the
    /// number of row batches.
    #[inline]
    pub async fn write_snapshot(
        &self,
        table_name: &str,
        dimension: usize,
        units: &[IndexedUnit],
    ) -> Result<(), ReviewError> {
        let vector_dim = i32::try_from(dimension)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| ReviewError::Database(format!("Invalid vector dimension {dimension}")))?;

        if let Some(unit) = units.iter().find(|u| u.embedding.len() != dimension) {
            return Err(ReviewError::Database(format!(
                "Embedding of {} has {} dimensions, expected {}",
                unit.unit.label(),
                unit.embedding.len(),
                dimension
            )));
        }

        let schema = Self::create_schema(vector_dim);
        let batches = u32::try_from(units.len().div_ceil(WRITE_BATCH_ROWS)).unwrap_or(u32::MAX);
        let mut attempt = 0_u32;
        self.retry
            .scaled(batches)
            .storage(&format!("write {table_name}"), move || {
                attempt += 1;
                let retrying = attempt > 1;
                let schema = Arc::clone(&schema);
                async move {
                    if retrying {
                        self.discard(table_name).await?;
                    }
                    self.write_rows(table_name, &schema, vector_dim, units)
                        .await
                }
            })
            .await?;

        info!(
            "Stored {} units in snapshot table {}",
            units.len(),
            table_name
        );
        Ok(())
    }

    async fn write_rows(
        &self,
        table_name: &str,
        schema: &Arc<Schema>,
        vector_dim: i32,
        units: &[IndexedUnit],
    ) -> Result<(), ReviewError> {
        let table = self
            .connection
            .create_empty_table(table_name, Arc::clone(schema))
            .execute()
            .await
            .map_err(|e| db_error("Failed to create snapshot table", e))?;

        for chunk in units.chunks(WRITE_BATCH_ROWS) {
            let record_batch = Self::create_record_batch(schema, vector_dim, chunk)?;
            let batch_schema = record_batch.schema();
            let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), batch_schema);
            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| db_error("Failed to insert units", e))?;
        }
        Ok(())
    }

    /// Drop a partially written table left by a failed attempt
    async fn discard(&self, table_name: &str) -> Result<bool, ReviewError> {
        if !self.list_tables().await?.iter().any(|t| t == table_name) {
            return Ok(false);
        }
        self.connection
            .drop_table(table_name)
            .await
            .map_err(|e| db_error("Failed to drop table", e))?;
        Ok(true)
    }

    /// Create a RecordBatch from indexed units
    fn create_record_batch(
        schema: &Arc<Schema>,
        vector_dim: i32,
        units: &[IndexedUnit],
    ) -> Result<RecordBatch, ReviewError> {
        let len = units.len();

        let mut ids = Vec::with_capacity(len);
        let mut ordinals = Vec::with_capacity(len);
        let mut file_paths = Vec::with_capacity(len);
        let mut names = Vec::with_capacity(len);
        let mut languages = Vec::with_capacity(len);
        let mut kinds = Vec::with_capacity(len);
        let mut start_lines = Vec::with_capacity(len);
        let mut end_lines = Vec::with_capacity(len);
        let mut unit_json = Vec::with_capacity(len);
        let mut fingerprint_json = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim as usize);

        for entry in units {
            ids.push(entry.unit.id.to_string());
            ordinals.push(row_index(entry.ordinal)?);
            file_paths.push(entry.unit.file_path.as_str());
            names.push(entry.unit.name.as_str());
            languages.push(entry.unit.language.as_str());
            kinds.push(entry.unit.kind.as_str());
            start_lines.push(entry.unit.start_line);
            end_lines.push(entry.unit.end_line);
            unit_json.push(
                serde_json::to_string(&entry.unit)
                    .map_err(|e| db_error("Failed to encode unit", e))?,
            );
            fingerprint_json.push(
                serde_json::to_string(&entry.fingerprint)
                    .map_err(|e| db_error("Failed to encode fingerprint", e))?,
            );
            flat_values.extend_from_slice(&entry.embedding);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim, Arc::new(values_array), None)
                .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(UInt32Array::from(ordinals)),
            Arc::new(StringArray::from(file_paths)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(languages)),
            Arc::new(StringArray::from(kinds)),
            Arc::new(UInt32Array::from(start_lines)),
            Arc::new(UInt32Array::from(end_lines)),
            Arc::new(StringArray::from(unit_json)),
            Arc::new(StringArray::from(fingerprint_json)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(Arc::clone(schema), arrays)
            .map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Read every row of a snapshot table, ordered by insertion ordinal
    #[inline]
    pub async fn load_snapshot(&self, table_name: &str) -> Result<Vec<IndexedUnit>, ReviewError> {
        self.retry
            .storage(&format!("load {table_name}"), move || self.read_rows(table_name))
            .await
    }

    async fn read_rows(&self, table_name: &str) -> Result<Vec<IndexedUnit>, ReviewError> {
        let table = self
            .connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| db_error("Failed to open snapshot table", e))?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;
        if rows == 0 {
            return Ok(Vec::new());
        }

        let mut results = table
            .query()
            .limit(rows)
            .execute()
            .await
            .map_err(|e| db_error("Failed to scan snapshot table", e))?;

        let mut units = Vec::with_capacity(rows);
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            units.extend(Self::parse_batch(&batch)?);
        }

        units.sort_by_key(|u| u.ordinal);
        debug!("Loaded {} units from {}", units.len(), table_name);
        Ok(units)
    }

    /// Parse a single record batch of snapshot rows
    fn parse_batch(batch: &RecordBatch) -> Result<Vec<IndexedUnit>, ReviewError> {
        let ordinals = column::<UInt32Array>(batch, "ordinal")?;
        let unit_json = column::<StringArray>(batch, "unit")?;
        let fingerprint_json = column::<StringArray>(batch, "fingerprint")?;
        let vectors = column::<FixedSizeListArray>(batch, "vector")?;

        let mut units = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let unit: CodeUnit = serde_json::from_str(unit_json.value(row))
                .map_err(|e| db_error("Corrupt unit row", e))?;
            let fingerprint: PatternFingerprint = serde_json::from_str(fingerprint_json.value(row))
                .map_err(|e| db_error("Corrupt fingerprint row", e))?;

            let vector = vectors.value(row);
            let embedding = vector
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| ReviewError::Database("Invalid vector item type".to_string()))?
                .values()
                .to_vec();

            units.push(IndexedUnit {
                ordinal: ordinals.value(row) as usize,
                unit,
                fingerprint,
                embedding,
            });
        }

        Ok(units)
    }

    #[inline]
    pub async fn count_rows(&self, table_name: &str) -> Result<usize, ReviewError> {
        self.retry
            .storage(&format!("count {table_name}"), move || async move {
                let table = self
                    .connection
                    .open_table(table_name)
                    .execute()
                    .await
                    .map_err(|e| db_error("Failed to open table", e))?;

                table
                    .count_rows(None)
                    .await
                    .map_err(|e| db_error("Failed to count rows", e))
            })
            .await
    }

    /// Drop a table, returning whether it existed
    #[inline]
    pub async fn drop_table(&self, table_name: &str) -> Result<bool, ReviewError> {
        let dropped = self
            .retry
            .storage(&format!("drop {table_name}"), move || self.discard(table_name))
            .await?;
        if dropped {
            info!("Dropped snapshot table {}", table_name);
        }
        Ok(dropped)
    }

    /// Check that a snapshot table exists and can be read
    #[inline]
    pub async fn validate_integrity(&self, table_name: &str) -> Result<bool, ReviewError> {
        debug!("Validating integrity of {}", table_name);

        let table_names = match self.table_names().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.iter().any(|t| t == table_name) {
            warn!("Snapshot table {} missing during integrity check", table_name);
            return Ok(false);
        }

        match self.count_rows(table_name).await {
            Ok(count) => {
                debug!("Integrity check passed, {} rows found", count);
                Ok(true)
            }
            Err(e) => {
                error!("Failed to count rows during integrity check: {}", e);
                Ok(false)
            }
        }
    }
}
