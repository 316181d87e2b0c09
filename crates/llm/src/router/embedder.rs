//! Pluggable embedding seam for the router's local semantic selection cache.

use async_trait::async_trait;

/// Produces a unit vector embedding for a piece of text. Implementations
/// must return vectors of consistent dimensionality and unit length, so
/// cosine similarity between two embeddings reduces to a dot product.
#[async_trait]
pub(crate) trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>>;
}

/// A deterministic, dependency-free embedder used when no external
/// embedding model is configured. It hashes overlapping character trigrams
/// into a fixed-size vector and normalizes it, which is enough to give
/// near-duplicate prompts high cosine similarity without calling out to a
/// model.
pub(crate) struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];

        let chars: Vec<char> = text.to_lowercase().chars().collect();
        if chars.is_empty() {
            vector[0] = 1.0;
            return Ok(vector);
        }

        let window = 3.min(chars.len());
        for i in 0..=chars.len() - window {
            let gram: String = chars[i..i + window].iter().collect();
            let bucket = fnv1a(gram.as_bytes()) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two equal-length unit vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn similar_text_has_high_cosine_similarity() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("what is the capital of france").await.unwrap();
        let b = embedder.embed("what is the capital of france?").await.unwrap();
        let sim = cosine_similarity(&a, &b);
        assert!(sim > 0.9, "expected high similarity, got {sim}");
    }

    #[tokio::test]
    async fn unrelated_text_has_low_cosine_similarity() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("what is the capital of france").await.unwrap();
        let b = embedder.embed("recommend a good pasta recipe for dinner").await.unwrap();
        let sim = cosine_similarity(&a, &b);
        assert!(sim < 0.5, "expected low similarity, got {sim}");
    }
}
