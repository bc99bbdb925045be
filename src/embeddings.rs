use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity with another vector of the same dimension.
    /// Returns 0.0 when either vector has zero norm.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let norm_a = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b = other.values.iter().map(|v| v * v).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

/// Maps text to fixed-dimension vectors
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Dimension of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed a batch of chunk texts, one vector per input, in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single query text
    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_documents(&[text.to_string()]).await?;
        anyhow::ensure!(
            embeddings.len() == 1,
            "expected one embedding for the query, got {}",
            embeddings.len()
        );
        Ok(embeddings.remove(0))
    }
}

/// Check that an embedder answered with one vector of the expected
/// dimension per input.
pub fn validate_embeddings(
    embeddings: &[Embedding],
    expected_count: usize,
    dimension: usize,
) -> Result<()> {
    anyhow::ensure!(
        embeddings.len() == expected_count,
        "expected {} embeddings, got {}",
        expected_count,
        embeddings.len()
    );
    if let Some((idx, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, e)| e.dimension() != dimension)
    {
        anyhow::bail!(
            "embedding {} has dimension {}, expected {}",
            idx,
            bad.dimension(),
            dimension
        );
    }
    Ok(())
}
