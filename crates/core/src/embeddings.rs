use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Dimension of sentence-transformers/all-MiniLM-L6-v2, the default
/// remote model.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Text-to-vector provider. One instance always produces vectors of the
/// same fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Scales a vector to unit length. Stored and query vectors are both
/// normalized so inner product equals cosine similarity.
pub fn unit_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Deterministic character-trigram hashing embedder. No model download,
/// no network; suitable for offline use and tests. Output is already
/// unit-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        unit_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embedding endpoint.
pub struct HttpEmbeddingProvider {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    client: Client,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        dimensions: usize,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            model: model.into(),
            api_key,
            dimensions,
            client: Client::new(),
        })
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let payload = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(ProviderError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!(
                    "{} embeddings returned for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for row in parsed.data {
            if row.embedding.len() != self.dimensions {
                return Err(ProviderError::BackendResponse {
                    backend: "embeddings".to_string(),
                    details: format!(
                        "embedding dimension {} is not {}",
                        row.embedding.len(),
                        self.dimensions
                    ),
                });
            }
            vectors.push(row.embedding);
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.request_embeddings(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "empty embedding response".to_string(),
        })
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }
}
