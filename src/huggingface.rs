use crate::config::{self, ProcessEnv, VarSource};
use crate::embeddings::{validate_embeddings, Embedder, Embedding};
use anyhow::{Context, Result};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_DIMENSION: usize = 384;
pub const DEFAULT_INFERENCE_URL: &str =
    "https://api-inference.huggingface.co/pipeline/feature-extraction";
const DEFAULT_BATCH_SIZE: usize = 32;

/// Configuration for the Hugging Face feature-extraction endpoint
#[derive(Clone)]
pub struct HuggingFaceConfig {
    pub api_key: String,
    pub inference_url: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for HuggingFaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceConfig")
            .field("api_key", &"<redacted>")
            .field("inference_url", &self.inference_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HuggingFaceConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &impl VarSource) -> Result<Self> {
        let api_key = config::required(vars, "HUGGINGFACE_API_KEY")?;
        let inference_url = config::or_default(vars, "HF_INFERENCE_URL", DEFAULT_INFERENCE_URL)
            .trim_end_matches('/')
            .to_string();
        let model = config::or_default(vars, "HF_EMBEDDING_MODEL", DEFAULT_MODEL);
        let dimension = config::parsed_or(vars, "HF_EMBEDDING_DIM", DEFAULT_DIMENSION)?;
        let batch_size = config::parsed_or(vars, "HF_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        anyhow::ensure!(dimension > 0, "HF_EMBEDDING_DIM must be greater than zero");

        Ok(HuggingFaceConfig {
            api_key,
            inference_url,
            model,
            dimension,
            batch_size: batch_size.max(1),
            timeout: config::http_timeout(vars)?,
        })
    }

    /// Endpoint for the configured model
    pub fn model_url(&self) -> String {
        format!("{}/{}", self.inference_url, self.model)
    }
}

/// Sentence-embedding client backed by the Hugging Face inference API
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    config: HuggingFaceConfig,
    client: reqwest::Client,
}

impl HuggingFaceEmbedder {
    /// Create a new embedder; the API key becomes a default bearer header
    pub fn new(config: HuggingFaceConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid Hugging Face API key")?,
        );

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed to build Hugging Face HTTP client")?;

        Ok(HuggingFaceEmbedder { config, client })
    }

    /// Get the client configuration
    pub fn config(&self) -> &HuggingFaceConfig {
        &self.config
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Embedding>> {
        let request = FeatureExtractionRequest {
            inputs,
            options: RequestOptions {
                wait_for_model: true,
            },
        };

        let url = self.config.model_url();
        debug!("Embedding {} inputs via {}", inputs.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to call Hugging Face inference at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Hugging Face request failed: {} {}",
                status,
                error_text
            ));
        }

        let payload: FeatureExtractionResponse = response
            .json()
            .await
            .context("failed to parse Hugging Face embedding response")?;

        Ok(payload.into_embeddings())
    }
}

impl Embedder for HuggingFaceEmbedder {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size) {
            let mut batch_embeddings = self.embed_batch(batch).await?;
            validate_embeddings(&batch_embeddings, batch.len(), self.config.dimension)?;
            embeddings.append(&mut batch_embeddings);
        }

        Ok(embeddings)
    }
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

/// Sentence-transformers models return one pooled vector per input;
/// plain encoders return one vector per token, which we mean-pool.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Pooled(Vec<Vec<f32>>),
    PerToken(Vec<Vec<Vec<f32>>>),
}

impl FeatureExtractionResponse {
    fn into_embeddings(self) -> Vec<Embedding> {
        match self {
            FeatureExtractionResponse::Pooled(vectors) => {
                vectors.into_iter().map(Embedding::new).collect()
            }
            FeatureExtractionResponse::PerToken(inputs) => inputs
                .into_iter()
                .map(|tokens| Embedding::new(mean_pool(&tokens)))
                .collect(),
        }
    }
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = tokens.first() else {
        return Vec::new();
    };
    let mut pooled = vec![0.0f32; first.len()];
    for token in tokens {
        for (acc, v) in pooled.iter_mut().zip(token.iter()) {
            *acc += v;
        }
    }
    let count = tokens.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= count);
    pooled
}
