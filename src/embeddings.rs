//! Embedding capability provider.
//!
//! [`EmbeddingProvider`] is the seam between the orchestration core and
//! whatever model turns text into vectors. The crate ships
//! [`HashEmbeddingProvider`], a deterministic, dependency-free provider:
//! tokens are hashed into a fixed number of signed buckets and the result
//! is L2-normalized. Identical text always maps to an identical unit
//! vector, which is exactly what the retrieval recall tests rely on, and
//! lexically similar texts land near each other — good enough for offline
//! use and CI, with hosted embedders plugged in through the same trait in
//! production.

use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;

use crate::types::ParlorError;

/// Capability trait: turn text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ParlorError>;

    /// Embed a batch of texts; the default embeds sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ParlorError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Dimensionality of the vectors this provider produces.
    fn dimensions(&self) -> usize;
}

/// Default vector dimensionality for the hashing provider.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Deterministic local embedder: signed token hashing into fixed buckets.
#[derive(Clone, Debug)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashEmbeddingProvider {
    /// Creates a provider emitting vectors of the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let digest = hasher.finish();
            let bucket = (digest % self.dimensions as u64) as usize;
            let sign = if (digest >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ParlorError> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns zero when either vector is all-zero or lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
