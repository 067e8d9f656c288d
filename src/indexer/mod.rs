// Indexer module
// Turns a repository snapshot into a persisted pattern index

pub mod source;
pub mod staging;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, normalize_extensions};
use crate::database::lancedb::{VectorStore, is_snapshot_of, snapshot_table_name};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{NewIndexWarning, NewPatternIndex};
use crate::embeddings::{Embedder, check_dimensions, embedding_text};
use crate::index::{IndexMetadata, PatternIndex};
use crate::parser::{CodeUnit, ParserRegistry};
use crate::patterns::{PatternFingerprint, extract};
use crate::{Result, ReviewError};

pub use source::{Discovery, RepositorySource, Workspace, discover_files, relative_label};
pub use staging::StagingLock;

/// What to learn and under which name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnRequest {
    /// Local path or remote git URL
    pub source: String,
    /// Extension filter; empty means the configured default
    #[serde(default)]
    pub extensions: Vec<String>,
    pub index_name: String,
}

/// A file left out of the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingWarning {
    pub path: String,
    pub reason: String,
}

impl From<&IndexingWarning> for NewIndexWarning {
    #[inline]
    fn from(warning: &IndexingWarning) -> Self {
        Self {
            file_path: warning.path.clone(),
            reason: warning.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingSummary {
    pub index_name: String,
    pub source: String,
    pub table_name: String,
    pub files_discovered: usize,
    pub files_indexed: usize,
    pub units_indexed: usize,
    pub warnings: Vec<IndexingWarning>,
    pub duration: Duration,
}

/// Lowercase file-system safe form of an index name
pub(crate) fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn storage_dir(dir: anyhow::Result<PathBuf>) -> Result<PathBuf> {
    dir.map_err(|e| ReviewError::Config(format!("{e:#}")))
}

fn catalog_error(error: &anyhow::Error) -> ReviewError {
    ReviewError::Database(format!("{error:#}"))
}

type Triple = (CodeUnit, PatternFingerprint, Vec<f32>);

enum FileOutcome {
    Indexed(Vec<Triple>),
    Skipped(IndexingWarning),
}

/// Read, parse and fingerprint one file
fn analyze_file(
    parsers: &ParserRegistry,
    label: &str,
    path: &Path,
) -> std::result::Result<Vec<(CodeUnit, PatternFingerprint)>, IndexingWarning> {
    let skip = |reason: String| IndexingWarning {
        path: label.to_string(),
        reason,
    };

    let bytes = std::fs::read(path).map_err(|e| skip(e.to_string()))?;
    let source = String::from_utf8(bytes).map_err(|_| skip("not valid UTF-8".to_string()))?;
    let units = parsers
        .parse(label, &source, None)
        .map_err(|e| skip(e.to_string()))?;

    Ok(units
        .into_iter()
        .map(|unit| {
            let fingerprint = extract(&unit);
            (unit, fingerprint)
        })
        .collect())
}

fn progress_bar(enabled: bool, len: usize) -> ProgressBar {
    if enabled && console::user_attended_stderr() {
        ProgressBar::new(len as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}

/// Builds pattern indexes and swaps them into the catalog
pub struct RepositoryIndexer {
    config: Config,
    database: Database,
    vector_store: VectorStore,
    embedder: Arc<dyn Embedder>,
    parsers: Arc<ParserRegistry>,
    show_progress: bool,
}

impl RepositoryIndexer {
    #[inline]
    pub fn new(
        config: Config,
        database: Database,
        vector_store: VectorStore,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            config,
            database,
            vector_store,
            embedder,
            parsers: Arc::new(ParserRegistry::new()),
            show_progress: false,
        }
    }

    /// Draw a progress bar on an attended terminal
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Learn `request.source` and bind the result to `request.index_name`.
    ///
    /// Readers keep seeing the previous snapshot until the catalog switch.
    #[inline]
    pub async fn learn(&self, request: &LearnRequest) -> Result<(IndexingSummary, Arc<PatternIndex>)> {
        let started = Instant::now();
        let index_name = request.index_name.trim();
        if index_name.is_empty() {
            return Err(ReviewError::Config("Index name must not be empty".to_string()));
        }

        let extensions = if request.extensions.is_empty() {
            self.config.indexing.normalized_extensions()
        } else {
            normalize_extensions(&request.extensions)
        };
        if extensions.is_empty() {
            return Err(ReviewError::Config(
                "At least one file extension is required".to_string(),
            ));
        }

        let staging_dir = storage_dir(self.config.staging_path())?;
        let _lock = StagingLock::acquire(&staging_dir, index_name)?;

        let checkouts_dir = storage_dir(self.config.checkouts_path())?;
        let workspace = source::prepare(
            &request.source,
            index_name,
            &checkouts_dir,
            &self.config.retry.policy(),
        )
        .await?;

        info!(
            "Learning '{}' from {} ({})",
            index_name,
            request.source,
            extensions.join(", ")
        );

        let root = workspace.root().to_path_buf();
        let discovery = tokio::task::spawn_blocking({
            let root = root.clone();
            let extensions = extensions.clone();
            let ignore_dirs = self.config.indexing.ignore_dirs.clone();
            let max_bytes = self.config.indexing.max_file_bytes;
            move || discover_files(&root, &extensions, &ignore_dirs, max_bytes)
        })
        .await
        .map_err(|e| ReviewError::Other(anyhow::anyhow!("file discovery failed: {e}")))?;

        let files_discovered = discovery.discovered();
        let mut warnings = discovery.skipped;

        let bar = progress_bar(self.show_progress, discovery.files.len());
        let workers = self.config.review.workers.max(1);
        let outcomes: Vec<FileOutcome> = stream::iter(discovery.files)
            .map(|path| self.index_file(&root, path))
            .buffered(workers)
            .inspect_ok(|_| bar.inc(1))
            .try_collect()
            .await?;
        bar.finish_and_clear();

        let mut files_indexed = 0;
        let mut triples = Vec::new();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Indexed(file_triples) => {
                    files_indexed += 1;
                    triples.extend(file_triples);
                }
                FileOutcome::Skipped(warning) => {
                    warn!("Skipping {}: {}", warning.path, warning.reason);
                    warnings.push(warning);
                }
            }
        }
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        if files_indexed == 0 || triples.is_empty() {
            return Err(ReviewError::NothingIndexed(request.source.clone()));
        }

        let metadata = IndexMetadata {
            name: index_name.to_string(),
            source: request.source.clone(),
            table_name: snapshot_table_name(index_name),
            embedding_model: self.embedder.model_name().to_string(),
            dimension: self.embedder.dimension(),
            created_date: Utc::now(),
        };
        let index = Arc::new(PatternIndex::build(metadata, triples));
        self.persist(&index, files_indexed, &warnings).await?;

        drop(workspace);

        let summary = IndexingSummary {
            index_name: index_name.to_string(),
            source: request.source.clone(),
            table_name: index.metadata().table_name.clone(),
            files_discovered,
            files_indexed,
            units_indexed: index.len(),
            warnings,
            duration: started.elapsed(),
        };
        info!(
            "Indexed {} units from {}/{} files into '{}' in {:?}",
            summary.units_indexed,
            summary.files_indexed,
            summary.files_discovered,
            summary.index_name,
            summary.duration
        );

        Ok((summary, index))
    }

    async fn index_file(&self, root: &Path, path: PathBuf) -> Result<FileOutcome> {
        let label = relative_label(root, &path);
        let parsers = Arc::clone(&self.parsers);
        let analyzed = tokio::task::spawn_blocking({
            let label = label.clone();
            move || analyze_file(&parsers, &label, &path)
        })
        .await
        .unwrap_or_else(|e| {
            Err(IndexingWarning {
                path: label.clone(),
                reason: format!("analysis task failed: {e}"),
            })
        });

        let units = match analyzed {
            Ok(units) => units,
            Err(warning) => return Ok(FileOutcome::Skipped(warning)),
        };
        if units.is_empty() {
            return Ok(FileOutcome::Indexed(Vec::new()));
        }

        let texts: Vec<String> = units.iter().map(|(unit, _)| embedding_text(unit)).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != units.len() {
            return Err(ReviewError::Embedding(format!(
                "{} embeddings for {} units of {}",
                embeddings.len(),
                units.len(),
                label
            )));
        }
        check_dimensions(&embeddings, self.embedder.dimension())?;
        debug!("Embedded {} units of {}", units.len(), label);

        Ok(FileOutcome::Indexed(
            units
                .into_iter()
                .zip(embeddings)
                .map(|((unit, fingerprint), embedding)| (unit, fingerprint, embedding))
                .collect(),
        ))
    }

    /// Write the snapshot table, switch the catalog binding, then drop stale tables.
    ///
    /// The replaced snapshot survives until the next rebuild so readers that
    /// looked it up before the switch can still load it.
    async fn persist(
        &self,
        index: &PatternIndex,
        files_indexed: usize,
        warnings: &[IndexingWarning],
    ) -> Result<()> {
        let metadata = index.metadata();
        self.vector_store
            .write_snapshot(&metadata.table_name, metadata.dimension, index.units())
            .await?;

        let record = NewPatternIndex {
            name: metadata.name.clone(),
            source: metadata.source.clone(),
            table_name: metadata.table_name.clone(),
            embedding_model: metadata.embedding_model.clone(),
            dimension: i64::try_from(metadata.dimension).unwrap_or(i64::MAX),
            unit_count: i64::try_from(index.len()).unwrap_or(i64::MAX),
            file_count: i64::try_from(files_indexed).unwrap_or(i64::MAX),
            statistics: index.statistics().clone(),
        };
        let warning_rows: Vec<NewIndexWarning> = warnings.iter().map(NewIndexWarning::from).collect();

        let record = &record;
        let warning_rows = warning_rows.as_slice();
        let bound = self
            .config
            .retry
            .policy()
            .storage("catalog bind", move || async move {
                self.database
                    .bind_index(record, warning_rows)
                    .await
                    .map_err(|e| catalog_error(&e))
            })
            .await;

        let outcome = match bound {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(drop_error) = self.vector_store.drop_table(&metadata.table_name).await {
                    warn!(
                        "Failed to drop unbound table {}: {}",
                        metadata.table_name, drop_error
                    );
                }
                return Err(e);
            }
        };
        info!(
            "Bound '{}' to {}",
            outcome.record.name, outcome.record.table_name
        );

        self.sweep_stale_tables(
            &metadata.name,
            &metadata.table_name,
            outcome.previous_table.as_deref(),
        )
        .await;
        Ok(())
    }

    /// Drop tables of `index_name` other than the current and the just
    /// replaced snapshot
    async fn sweep_stale_tables(&self, index_name: &str, current: &str, replaced: Option<&str>) {
        let tables = match self.vector_store.table_names().await {
            Ok(tables) => tables,
            Err(e) => {
                warn!("Skipping stale table sweep: {}", e);
                return;
            }
        };

        for table in tables.iter().filter(|t| {
            t.as_str() != current && Some(t.as_str()) != replaced && is_snapshot_of(t, index_name)
        }) {
            debug!("Dropping stale snapshot table {}", table);
            if let Err(e) = self.vector_store.drop_table(table).await {
                warn!("Failed to drop stale table {}: {}", table, e);
            }
        }
    }
}
