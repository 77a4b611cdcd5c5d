//! Ollama 生成模型客户端

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{GenerationOptions, LanguageModel};
use crate::error::{AppError, Result};

pub struct OllamaModel {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    options: GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaModel {
    pub fn new(
        base_url: &str,
        model_name: &str,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            model_name: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&serde_json::json!({
                "model": self.model_name,
                "prompt": prompt,
                "stream": false,
                "options": {
                    "temperature": self.options.temperature,
                    "num_predict": self.options.max_tokens,
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!(
                "Ollama generation failed ({}): {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await?;
        Ok(generated.response)
    }

    fn name(&self) -> String {
        format!("ollama/{}", self.model_name)
    }
}
