//! Gemini 生成模型客户端

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{GenerationOptions, LanguageModel};
use crate::error::{AppError, Result};

pub struct GeminiModel {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    api_key: String,
    options: GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiModel {
    pub fn new(
        base_url: &str,
        model_name: &str,
        api_key: &str,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            model_name: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            options,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model_name
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.options.temperature,
                "maxOutputTokens": self.options.max_tokens,
            }
        });

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!(
                "Gemini request failed ({}): {}",
                status, error_text
            )));
        }

        let response: GenerateResponse = response.json().await?;
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AppError::Generation(
                "Gemini returned no candidate text".to_string(),
            ));
        }
        debug!("Gemini generated {} characters", text.len());
        Ok(text)
    }

    fn name(&self) -> String {
        format!("google/{}", self.model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model(server: &MockServer) -> GeminiModel {
        GeminiModel::new(
            &server.uri(),
            "gemini-2.5-flash",
            "secret",
            GenerationOptions {
                temperature: 0.3,
                max_tokens: 256,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_joins_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": { "maxOutputTokens": 256 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] }
                }]
            })))
            .mount(&server)
            .await;

        let text = model(&server).generate("hi").await.unwrap();
        assert_eq!(text, "Hello, world");
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;

        assert!(matches!(
            model(&server).generate("hi").await,
            Err(AppError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = model(&server).generate("hi").await.unwrap_err();
        assert!(err.to_string().contains("quota"));
    }
}
