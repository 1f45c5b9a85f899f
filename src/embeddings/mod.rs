// Embeddings module
// Report chunking and the embedding provider integration

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::RiskError;

pub use chunking::{ChunkingConfig, ChunkingPolicy, chunk_text, tokenize_words};
pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaClient};

/// Maps text units to fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input, in input order, and every
/// vector must have length [`Embedder::dimension`]. A failing provider aborts the whole call.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity of the embedding model, reported by health probes
    fn model(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RiskError>;
}

/// Enforce the fixed dimension on a batch of provider vectors.
///
/// Empty vectors are replaced with zero vectors so a single degenerate embedding does not
/// fail the batch. Any other length mismatch is a provider error.
#[inline]
pub fn normalize_embeddings(
    vectors: Vec<Vec<f32>>,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, RiskError> {
    vectors
        .into_iter()
        .enumerate()
        .map(|(position, vector)| {
            if vector.is_empty() {
                tracing::warn!(
                    "Provider returned an empty embedding at position {}, substituting zero vector",
                    position
                );
                Ok(vec![0.0; dimension])
            } else if vector.len() == dimension {
                Ok(vector)
            } else {
                Err(RiskError::Provider(format!(
                    "Embedding at position {} has {} dimensions, expected {}",
                    position,
                    vector.len(),
                    dimension
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vectors_become_zero_vectors() {
        let normalized = normalize_embeddings(vec![vec![1.0, 2.0, 3.0], vec![]], 3)
            .expect("should normalize embeddings");

        assert_eq!(normalized, vec![vec![1.0, 2.0, 3.0], vec![0.0, 0.0, 0.0]]);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let result = normalize_embeddings(vec![vec![1.0, 2.0]], 3);

        assert!(matches!(result, Err(RiskError::Provider(_))));
    }
}
