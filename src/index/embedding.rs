//! 嵌入模型服务

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{AppError, Result};

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query.
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed documents for indexing, preserving order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifies the model a stored index was built with.
    fn name(&self) -> String;
}

/// Offline embeddings: signed feature hashing of lowercase word tokens,
/// L2-normalised. Deterministic across runs and builds.
pub struct HashingEmbeddingModel {
    dimension: usize,
}

impl HashingEmbeddingModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket =
                u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                    % self.dimension;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
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
impl EmbeddingModel for HashingEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn name(&self) -> String {
        format!("hashing-{}", self.dimension)
    }
}

/// Ollama embedding client
pub struct OllamaEmbeddingModel {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    batch_size: usize,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingModel {
    pub fn new(
        base_url: &str,
        model_name: &str,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            model_name: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": texts,
                "truncate": true
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Ollama embedding failed ({}): {}",
                status, error_text
            )));
        }

        let embed_response: OllamaEmbedResponse = response.json().await?;
        if embed_response.embeddings.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Ollama returned {} embeddings for {} inputs",
                embed_response.embeddings.len(),
                texts.len()
            )));
        }
        Ok(embed_response.embeddings)
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("empty embedding response".to_string()))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.embed(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn name(&self) -> String {
        format!("ollama/{}", self.model_name)
    }
}

/// Google Generative Language embedding client
pub struct GoogleEmbeddingModel {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    api_key: String,
}

/// Largest batch `batchEmbedContents` accepts
const GOOGLE_MAX_BATCH: usize = 100;

#[derive(Deserialize)]
struct GoogleEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GoogleEmbedResponse {
    embedding: GoogleEmbedding,
}

#[derive(Deserialize)]
struct GoogleBatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<GoogleEmbedding>,
}

impl GoogleEmbeddingModel {
    pub fn new(base_url: &str, model_name: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            model_name: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request_body(&self, text: &str, task_type: &str) -> serde_json::Value {
        serde_json::json!({
            "model": format!("models/{}", self.model_name),
            "content": { "parts": [{ "text": text }] },
            "taskType": task_type,
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!(
            "{}/v1beta/models/{}:{}",
            self.base_url, self.model_name, method
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Google embedding failed ({}): {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl EmbeddingModel for GoogleEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let body = self.request_body(text, "RETRIEVAL_QUERY");
        let response: GoogleEmbedResponse = self.post("embedContent", &body).await?;
        Ok(response.embedding.values)
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(GOOGLE_MAX_BATCH) {
            let requests: Vec<_> = chunk
                .iter()
                .map(|t| self.request_body(t, "RETRIEVAL_DOCUMENT"))
                .collect();
            let body = serde_json::json!({ "requests": requests });
            let response: GoogleBatchEmbedResponse =
                self.post("batchEmbedContents", &body).await?;
            if response.embeddings.len() != chunk.len() {
                return Err(AppError::Embedding(format!(
                    "Google returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    chunk.len()
                )));
            }
            debug!("Embedded a batch of {} documents", chunk.len());
            all_embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(all_embeddings)
    }

    fn name(&self) -> String {
        format!("google/{}", self.model_name)
    }
}

pub fn create_embedding_model(config: &AppConfig) -> Result<Arc<dyn EmbeddingModel>> {
    let timeout = Duration::from_secs(config.provider.request_timeout_secs);
    let embedding = &config.embedding;

    match config.provider.resolve(&embedding.backend) {
        "google" => Ok(Arc::new(GoogleEmbeddingModel::new(
            &config.provider.google_base_url,
            &embedding.google_model,
            &config.provider.google_api_key,
            timeout,
        )?)),
        "ollama" => Ok(Arc::new(OllamaEmbeddingModel::new(
            &config.provider.ollama_url,
            &embedding.local_model,
            embedding.batch_size,
            timeout,
        )?)),
        "hashing" => Ok(Arc::new(HashingEmbeddingModel::new(embedding.dimension))),
        other => Err(AppError::Config(format!(
            "unknown embedding backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_hashing_embedding_model() {
        let model: Box<dyn EmbeddingModel> = Box::new(HashingEmbeddingModel::new(64));

        let a = model.encode("Customer interviews").await.unwrap();
        let b = model.encode("customer INTERVIEWS!").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_empty_text_is_zero_vector() {
        let model = HashingEmbeddingModel::new(16);
        let v = model.encode("  ...  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_encoding() {
        let model = HashingEmbeddingModel::new(32);
        let texts = vec!["hello".to_string(), "world".to_string(), "test".to_string()];
        let results = model.encode_batch(&texts).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], model.encode("hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_ollama_batches_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[1.0, 0.0], [0.0, 1.0]]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let model =
            OllamaEmbeddingModel::new(&server.uri(), "all-minilm", 2, Duration::from_secs(5))
                .unwrap();
        let texts: Vec<String> = (0..4).map(|i| format!("text {}", i)).collect();
        let embeddings = model.encode_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 4);
        assert_eq!(model.name(), "ollama/all-minilm");
    }

    #[tokio::test]
    async fn test_ollama_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let model =
            OllamaEmbeddingModel::new(&server.uri(), "missing", 8, Duration::from_secs(5))
                .unwrap();
        let err = model.encode("q").await.unwrap_err();
        assert!(matches!(err, AppError::Embedding(msg) if msg.contains("model not found")));
    }

    #[tokio::test]
    async fn test_google_query_and_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-embedding-004:embedContent"))
            .and(header("x-goog-api-key", "secret"))
            .and(body_partial_json(serde_json::json!({ "taskType": "RETRIEVAL_QUERY" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": { "values": [0.5, 0.5] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-embedding-004:batchEmbedContents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [{ "values": [1.0, 0.0] }, { "values": [0.0, 1.0] }]
            })))
            .mount(&server)
            .await;

        let model = GoogleEmbeddingModel::new(
            &server.uri(),
            "text-embedding-004",
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(model.encode("q").await.unwrap(), vec![0.5, 0.5]);
        let docs = model
            .encode_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(docs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_create_embedding_model_resolves_backend() {
        let config = AppConfig::offline("/tmp/unused");
        let model = create_embedding_model(&config).unwrap();
        assert_eq!(model.name(), "hashing-384");
    }
}
