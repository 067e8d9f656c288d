use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewError>;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to parse {path}: {message}")]
    ParseFailure { path: String, message: String },

    #[error("Pattern index '{0}' not found; run `learn` for this repository first")]
    IndexNotFound(String),

    #[error("Pattern index '{0}' is already being rebuilt")]
    IndexBusy(String),

    #[error("Retrieval backend unavailable: {0}")]
    RetrievalBackendUnavailable(String),

    #[error("Model backend timed out: {0}")]
    ModelBackendTimeout(String),

    #[error("Model backend rejected the request: {0}")]
    ModelBackendRejected(String),

    #[error("Repository unreachable: {0}")]
    RepositoryUnreachable(String),

    #[error("No file in {0} could be indexed")]
    NothingIndexed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ReviewError {
    /// Whether the error ends the enclosing learning or review operation.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IndexNotFound(_)
                | Self::RetrievalBackendUnavailable(_)
                | Self::RepositoryUnreachable(_)
        )
    }
}

pub mod analysis;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod parser;
pub mod patterns;
pub mod recommend;
pub mod report;
pub mod retrieval;
pub mod retry;
pub mod review;
