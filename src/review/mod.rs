//! The review orchestrator.
//!
//! [`ReviewEngine`] wires the pipeline together: it learns repositories into
//! named pattern indexes, and reviews candidates against them by parsing,
//! retrieving neighbors, measuring deviations and generating findings.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::DifferenceAnalyzer;
use crate::config::{Config, normalize_extensions};
use crate::database::lancedb::{VectorStore, is_snapshot_of};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{IndexWarning, PatternIndexRecord};
use crate::embeddings::{Embedder, create_embedder};
use crate::index::{IndexMetadata, IndexRegistry, PatternIndex};
use crate::indexer::{IndexingSummary, LearnRequest, RepositoryIndexer, StagingLock, discover_files};
use crate::llm::{ModelBackend, create_backend};
use crate::parser::{CodeUnit, ParserRegistry};
use crate::patterns::{PatternFingerprint, extract};
use crate::recommend::{QualitativePass, RecommendationGenerator, UnitReview};
use crate::report::{Finding, Praise, Report};
use crate::retrieval::{RetrievalEngine, nearest};
use crate::{Result, ReviewError};

/// Code submitted for review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// File or directory path, or the label inline text is reported under
    pub path: String,
    /// Inline text; read from `path` when absent
    #[serde(default)]
    pub source: Option<String>,
    /// Overrides detection from the extension
    #[serde(default)]
    pub language: Option<String>,
}

impl Candidate {
    #[inline]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: None,
            language: None,
        }
    }

    #[inline]
    pub fn inline(path: impl Into<String>, source: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            path: path.into(),
            source: Some(source.into()),
            language: language.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub index_name: String,
    pub candidates: Vec<Candidate>,
    /// Extensions of the files reviewed under directory candidates; the
    /// configured ones when empty
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn catalog_error(error: &anyhow::Error) -> ReviewError {
    ReviewError::Database(format!("{error:#}"))
}

/// Reading a learned index failed in the stores
fn backend_unavailable(error: ReviewError) -> ReviewError {
    match error {
        ReviewError::RetrievalBackendUnavailable(_) => error,
        other => ReviewError::RetrievalBackendUnavailable(other.to_string()),
    }
}

pub struct ReviewEngine {
    config: Config,
    database: Database,
    vector_store: VectorStore,
    registry: Arc<IndexRegistry>,
    indexer: RepositoryIndexer,
    retrieval: RetrievalEngine,
    analyzer: DifferenceAnalyzer,
    generator: RecommendationGenerator,
    parsers: ParserRegistry,
}

impl ReviewEngine {
    /// Open the stores under the configured base directory and build the
    /// configured embedding and model backends
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ReviewError::Config(e.to_string()))?;

        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(|e| catalog_error(&e))?;
        let vector_store = VectorStore::new(&config).await?;
        let embedder = create_embedder(&config)?;
        let backend = create_backend(&config)?;

        Ok(Self::from_parts(config, database, vector_store, embedder, backend))
    }

    #[inline]
    pub fn from_parts(
        config: Config,
        database: Database,
        vector_store: VectorStore,
        embedder: Arc<dyn Embedder>,
        backend: Option<Arc<dyn ModelBackend>>,
    ) -> Self {
        let indexer = RepositoryIndexer::new(
            config.clone(),
            database.clone(),
            vector_store.clone(),
            Arc::clone(&embedder),
        );
        let retrieval = RetrievalEngine::new(embedder, config.review.top_k);
        let analyzer = DifferenceAnalyzer::new(config.review.thresholds());
        let generator = RecommendationGenerator::new(backend, config.review.categories);

        Self {
            config,
            database,
            vector_store,
            registry: Arc::new(IndexRegistry::new()),
            indexer,
            retrieval,
            analyzer,
            generator,
            parsers: ParserRegistry::new(),
        }
    }

    /// Draw progress bars while learning
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.indexer = self.indexer.with_progress(show_progress);
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Learn a repository and bind the new snapshot to its name
    #[inline]
    pub async fn learn(&self, request: &LearnRequest) -> Result<IndexingSummary> {
        let (summary, index) = self.indexer.learn(request).await?;
        if let Some(previous) = self.registry.bind(index).await {
            debug!(
                "Replaced snapshot {} of '{}'",
                previous.metadata().table_name,
                previous.name()
            );
        }
        Ok(summary)
    }

    /// Run one catalog operation under the retry policy
    async fn catalog<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.config
            .retry
            .policy()
            .storage(label, || {
                let attempt = operation();
                async move { attempt.await.map_err(|e| catalog_error(&e)) }
            })
            .await
    }

    async fn lookup(&self, name: &str) -> Result<PatternIndexRecord> {
        self.catalog("catalog lookup", move || self.database.get_index(name))
            .await
            .map_err(backend_unavailable)?
            .ok_or_else(|| ReviewError::IndexNotFound(name.to_string()))
    }

    /// The current snapshot bound to `name`, loading it from storage if needed.
    ///
    /// A load that races with a rebuild retries once against the new binding.
    #[inline]
    pub async fn index(&self, name: &str) -> Result<Arc<PatternIndex>> {
        let record = self.lookup(name).await?;

        if let Some(index) = self.registry.get(name).await {
            if index.metadata().table_name == record.table_name {
                return Ok(index);
            }
        }

        match self.load(&record).await {
            Ok(index) => Ok(index),
            Err(error) => {
                let current = self.lookup(name).await?;
                if current.table_name == record.table_name {
                    return Err(error);
                }
                debug!(
                    "'{}' was rebound from {} to {} while loading",
                    name, record.table_name, current.table_name
                );
                self.load(&current).await
            }
        }
    }

    async fn load(&self, record: &PatternIndexRecord) -> Result<Arc<PatternIndex>> {
        let model = self.retrieval.embedder().model_name();
        if record.embedding_model != model {
            return Err(ReviewError::RetrievalBackendUnavailable(format!(
                "index '{}' was learned with {} but {} is configured; learn it again",
                record.name, record.embedding_model, model
            )));
        }

        let units = self
            .vector_store
            .load_snapshot(&record.table_name)
            .await
            .map_err(backend_unavailable)?;
        let metadata = IndexMetadata {
            name: record.name.clone(),
            source: record.source.clone(),
            table_name: record.table_name.clone(),
            embedding_model: record.embedding_model.clone(),
            dimension: usize::try_from(record.dimension).map_err(|_| {
                ReviewError::RetrievalBackendUnavailable(format!(
                    "invalid dimension {} for '{}'",
                    record.dimension, record.name
                ))
            })?,
            created_date: record.indexed_date.and_utc(),
        };

        let index = Arc::new(PatternIndex::from_units(metadata, units));
        info!("Loaded '{}' with {} units", record.name, index.len());
        self.registry.bind(Arc::clone(&index)).await;
        Ok(index)
    }

    #[inline]
    pub async fn list_indexes(&self) -> Result<Vec<PatternIndexRecord>> {
        self.catalog("catalog listing", move || self.database.list_indexes())
            .await
    }

    /// Catalog entry and indexing warnings of one index
    #[inline]
    pub async fn describe_index(&self, name: &str) -> Result<(PatternIndexRecord, Vec<IndexWarning>)> {
        let record = self
            .catalog("catalog lookup", move || self.database.get_index(name))
            .await?
            .ok_or_else(|| ReviewError::IndexNotFound(name.to_string()))?;
        let index_id = record.id;
        let warnings = self
            .catalog("warning listing", move || {
                self.database.warnings_for_index(index_id)
            })
            .await?;
        Ok((record, warnings))
    }

    /// Remove an index and every snapshot of it, returning whether it existed
    #[inline]
    pub async fn delete_index(&self, name: &str) -> Result<bool> {
        let staging_dir = self
            .config
            .staging_path()
            .map_err(|e| ReviewError::Config(format!("{e:#}")))?;
        let _lock = StagingLock::acquire(&staging_dir, name)?;

        let Some(record) = self
            .catalog("catalog delete", move || self.database.delete_index(name))
            .await?
        else {
            return Ok(false);
        };

        self.vector_store.drop_table(&record.table_name).await?;
        for table in self.vector_store.table_names().await? {
            if is_snapshot_of(&table, name) {
                self.vector_store.drop_table(&table).await?;
            }
        }
        self.registry.remove(name).await;
        info!("Deleted index '{}'", name);
        Ok(true)
    }

    async fn load_candidate(&self, candidate: &Candidate) -> Result<Vec<CodeUnit>> {
        let source = match &candidate.source {
            Some(source) => source.clone(),
            None => tokio::fs::read_to_string(&candidate.path).await?,
        };
        let label = candidate.path.replace('\\', "/");
        let label = label.strip_prefix("./").unwrap_or(&label);

        self.parsers
            .parse(label, &source, candidate.language.as_deref())
    }

    /// Replace directory candidates by the matching files beneath them
    async fn expand_candidates(
        &self,
        request: &ReviewRequest,
        notes: &mut Vec<String>,
    ) -> Result<Vec<Candidate>> {
        let extensions = if request.extensions.is_empty() {
            self.config.indexing.normalized_extensions()
        } else {
            normalize_extensions(&request.extensions)
        };

        let mut expanded = Vec::new();
        for candidate in &request.candidates {
            let is_dir = candidate.source.is_none()
                && tokio::fs::metadata(&candidate.path)
                    .await
                    .is_ok_and(|m| m.is_dir());
            if !is_dir {
                expanded.push(candidate.clone());
                continue;
            }

            let root = PathBuf::from(&candidate.path);
            let discovery = tokio::task::spawn_blocking({
                let extensions = extensions.clone();
                let ignore_dirs = self.config.indexing.ignore_dirs.clone();
                let max_bytes = self.config.indexing.max_file_bytes;
                move || discover_files(&root, &extensions, &ignore_dirs, max_bytes)
            })
            .await
            .map_err(|e| ReviewError::Other(anyhow::anyhow!("file discovery failed: {e}")))?;

            debug!(
                "Expanded {} into {} files",
                candidate.path,
                discovery.files.len()
            );
            let dir = candidate.path.trim_end_matches(['/', '\\']);
            if discovery.discovered() == 0 {
                notes.push(format!(
                    "No files with extension {} under {}",
                    extensions.join(", "),
                    dir
                ));
            }
            notes.extend(
                discovery
                    .skipped
                    .iter()
                    .map(|s| format!("Skipped {}/{}: {}", dir, s.path, s.reason)),
            );
            expanded.extend(discovery.files.iter().map(|file| Candidate {
                path: file.display().to_string(),
                source: None,
                language: candidate.language.clone(),
            }));
        }
        Ok(expanded)
    }

    async fn review_unit(
        &self,
        index: &PatternIndex,
        unit: &CodeUnit,
        embedding: &[f32],
        cancel: &CancellationToken,
    ) -> Result<UnitReview> {
        let fingerprint = extract(unit);
        let neighbors = nearest(index, embedding, self.retrieval.top_k())?;
        let neighbor_fingerprints: Vec<&PatternFingerprint> =
            neighbors.iter().map(|n| &n.entry.fingerprint).collect();
        let deviations = self.analyzer.analyze(&fingerprint, &neighbor_fingerprints);
        debug!(
            "{}: {} neighbors, {} deviations",
            unit.label(),
            neighbors.len(),
            deviations.len()
        );

        Ok(self
            .generator
            .review_unit(unit, &neighbors, &deviations, cancel)
            .await)
    }

    /// Review every candidate against the index named in `request`.
    ///
    /// Directory candidates are walked recursively for files with the
    /// requested extensions.
    /// Fails only when the index is missing or cannot be queried; problems
    /// with single candidates and skipped model critique become notes.
    #[inline]
    pub async fn review(&self, request: &ReviewRequest, cancel: CancellationToken) -> Result<Report> {
        let index = self.index(&request.index_name).await?;

        let mut notes = Vec::new();
        let candidates = self.expand_candidates(request, &mut notes).await?;
        let mut units = Vec::new();
        for candidate in &candidates {
            match self.load_candidate(candidate).await {
                Ok(candidate_units) => units.extend(candidate_units),
                Err(e) => {
                    warn!("Skipping candidate {}: {}", candidate.path, e);
                    notes.push(format!("Skipped {}: {}", candidate.path, e));
                }
            }
        }
        notes.extend(
            units
                .iter()
                .filter(|u| u.low_confidence)
                .map(|u| format!("{} has syntax errors and was reviewed with low confidence", u.label())),
        );

        let embeddings = if units.is_empty() {
            Vec::new()
        } else {
            self.retrieval.embed_units(&units).await?
        };

        let workers = self.config.review.workers.max(1);
        let reviews: Vec<UnitReview> = stream::iter(units.iter().zip(&embeddings))
            .map(|(unit, embedding)| self.review_unit(&index, unit, embedding, &cancel))
            .buffered(workers)
            .try_collect()
            .await?;

        let mut findings: Vec<Finding> = Vec::new();
        let mut praised: Vec<Praise> = Vec::new();
        let mut skipped: BTreeMap<String, usize> = BTreeMap::new();
        for review in reviews {
            findings.extend(review.findings);
            praised.extend(review.praise);
            if let QualitativePass::Skipped(reason) = review.qualitative {
                *skipped.entry(reason).or_default() += 1;
            }
        }
        notes.extend(skipped.iter().map(|(reason, count)| {
            format!("Qualitative review skipped for {count} unit(s): {reason}")
        }));

        let degraded = !notes.is_empty();
        let report = Report::assemble(index.name(), findings, praised, degraded, notes);
        info!(
            "Reviewed {} units against '{}': {} findings, {} praised",
            units.len(),
            index.name(),
            report.findings.len(),
            report.praised.len()
        );
        Ok(report)
    }
}
