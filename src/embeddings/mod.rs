// Embeddings module
// Turns code units into fixed-length vectors for similarity search

pub mod hashing;
pub mod ollama;


use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, EmbeddingProvider};
use crate::parser::CodeUnit;
use crate::{Result, ReviewError};

pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

/// Maps text to vectors of a fixed dimension
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored with an index so mismatched models are detected
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ReviewError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Text that represents a unit in embedding space
#[inline]
pub fn embedding_text(unit: &CodeUnit) -> String {
    format!(
        "{} {} {}\n{}",
        unit.language, unit.kind, unit.name, unit.source
    )
}

/// Build the embedder selected by `[embedding] provider`
#[inline]
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider {
        EmbeddingProvider::Ollama => {
            let client = OllamaClient::new(config)
                .map_err(|e| ReviewError::Embedding(format!("{e:#}")))?;
            Ok(Arc::new(client))
        }
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.embedding.dimension as usize,
        ))),
    }
}

/// Reject vectors whose length differs from `expected`
#[inline]
pub fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<()> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(vector) => Err(ReviewError::Embedding(format!(
            "expected {} dimensions, got {}",
            expected,
            vector.len()
        ))),
        None => Ok(()),
    }
}
