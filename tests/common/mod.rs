//! Shared fixtures for the end-to-end tests: an engine over temporary
//! storage with the hashing embedder, and scripted model backends.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use pattern_review::config::{Config, EmbeddingProvider};
use pattern_review::database::lancedb::VectorStore;
use pattern_review::database::sqlite::Database;
use pattern_review::embeddings::HashingEmbedder;
use pattern_review::indexer::{IndexingSummary, LearnRequest};
use pattern_review::llm::ModelBackend;
use pattern_review::report::Report;
use pattern_review::review::{Candidate, ReviewEngine, ReviewRequest};
use pattern_review::{Result, ReviewError};

pub const DIMENSION: u32 = 64;

pub enum Script {
    Answer(String),
    Fail,
}

/// A model backend that replays a fixed answer
pub struct ScriptedBackend {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn answering(answer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Answer(answer.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Script::Fail,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Answer(answer) => Ok(answer.clone()),
            Script::Fail => Err(ReviewError::ModelBackendTimeout(
                "scripted backend gave up".to_string(),
            )),
        }
    }
}

pub struct Harness {
    pub engine: ReviewEngine,
    pub vector_store: VectorStore,
    pub repo: TempDir,
    base: TempDir,
}

pub fn offline_config(base: &Path) -> Config {
    let mut config = Config::with_base_dir(base);
    config.embedding.provider = EmbeddingProvider::Hashing;
    config.embedding.dimension = DIMENSION;
    config.llm.enabled = false;
    config
}

impl Harness {
    pub async fn new(backend: Option<Arc<dyn ModelBackend>>) -> Self {
        Self::with_config(backend, offline_config).await
    }

    pub async fn with_config(
        backend: Option<Arc<dyn ModelBackend>>,
        configure: impl FnOnce(&Path) -> Config,
    ) -> Self {
        let base = TempDir::new().expect("should create base dir");
        let repo = TempDir::new().expect("should create repo dir");
        let config = configure(base.path());

        let database = Database::initialize_from_config_dir(base.path())
            .await
            .expect("should open database");
        let vector_store = VectorStore::new(&config)
            .await
            .expect("should open vector store");
        let embedder = Arc::new(HashingEmbedder::new(DIMENSION as usize));
        let engine = ReviewEngine::from_parts(
            config,
            database,
            vector_store.clone(),
            embedder,
            backend,
        );

        Self {
            engine,
            vector_store,
            repo,
            base,
        }
    }

    pub fn base_dir(&self) -> &Path {
        self.base.path()
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.repo.path().join(relative);
        fs::create_dir_all(path.parent().expect("file has a parent")).expect("should create dirs");
        fs::write(path, contents).expect("should write file");
    }

    pub fn learn_request(&self, name: &str) -> LearnRequest {
        LearnRequest {
            source: self.repo.path().display().to_string(),
            extensions: vec!["py".to_string()],
            index_name: name.to_string(),
        }
    }

    pub async fn learn(&self, name: &str) -> IndexingSummary {
        self.engine
            .learn(&self.learn_request(name))
            .await
            .expect("learning should succeed")
    }

    pub async fn review(&self, name: &str, candidates: &[(&str, &str)]) -> Result<Report> {
        let request = ReviewRequest {
            index_name: name.to_string(),
            candidates: candidates
                .iter()
                .map(|(path, source)| Candidate::inline(*path, *source, None))
                .collect(),
            extensions: Vec::new(),
        };
        self.engine.review(&request, CancellationToken::new()).await
    }

    /// LanceDB tables holding snapshots of `name`
    pub async fn snapshot_tables(&self, name: &str) -> Vec<String> {
        self.vector_store
            .table_names()
            .await
            .expect("should list tables")
            .into_iter()
            .filter(|t| pattern_review::database::lancedb::is_snapshot_of(t, name))
            .collect()
    }
}

/// A snake_case helper module; every function has the same shape
pub fn snake_case_module(prefix: &str, count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "def {prefix}_record_{i}(record_id):\n    stored_record = fetch_row(record_id)\n    return stored_record\n\n\n"
            )
        })
        .collect()
}

/// Like [`snake_case_module`], but every function guards its lookup
pub fn guarded_module(prefix: &str, count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "def {prefix}_record_{i}(record_id):\n    try:\n        stored_record = fetch_row(record_id)\n    except KeyError:\n        stored_record = None\n    return stored_record\n\n\n"
            )
        })
        .collect()
}
