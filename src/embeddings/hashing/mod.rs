//! Deterministic local embeddings via signed feature hashing.
//!
//! Each lowercased token and each adjacent token pair is hashed into one of
//! `dimension` buckets with a hash-derived sign, and the result is L2
//! normalized. The same text always produces the same vector, which makes
//! indexes built with this embedder exactly reproducible.


use async_trait::async_trait;

use super::Embedder;
use crate::Result;

pub const DEFAULT_HASHING_DIMENSION: u32 = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const PAIR_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("hashing-{dimension}"),
        }
    }

    /// Embed synchronously
    #[inline]
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let tokens = tokenize(text);

        for token in &tokens {
            self.add(&mut vector, &[token.as_str()], 1.0);
        }
        for pair in tokens.windows(2) {
            self.add(&mut vector, &[pair[0].as_str(), pair[1].as_str()], PAIR_WEIGHT);
        }

        normalize(&mut vector);
        vector
    }

    fn add(&self, vector: &mut [f32], parts: &[&str], weight: f32) {
        let hash = fnv1a(parts);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION as usize)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}

/// Lowercased runs of alphanumerics and underscores
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn fnv1a(parts: &[&str]) -> u64 {
    let mut hash = FNV_OFFSET;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hash ^= 0x1f;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        for byte in part.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
