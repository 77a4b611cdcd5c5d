//! 语言模型服务

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiModel;
pub use ollama::OllamaModel;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{AppError, Result};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> String;
}

/// Sampling parameters shared by all backends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

pub fn create_language_model(config: &AppConfig) -> Result<Arc<dyn LanguageModel>> {
    let timeout = Duration::from_secs(config.provider.request_timeout_secs);
    let options = GenerationOptions {
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
    };

    match config.provider.resolve(&config.llm.backend) {
        "google" => Ok(Arc::new(GeminiModel::new(
            &config.provider.google_base_url,
            &config.llm.google_model,
            &config.provider.google_api_key,
            options,
            timeout,
        )?)),
        "ollama" => Ok(Arc::new(OllamaModel::new(
            &config.provider.ollama_url,
            &config.llm.local_model,
            options,
            timeout,
        )?)),
        other => Err(AppError::Config(format!("unknown llm backend: {}", other))),
    }
}
