//! 错误处理模块
//!
//! 应用错误类型、HTTP 映射以及全局 `Result` 别名。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Outbound HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Embedding model error
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Language model error
    #[error("generation error: {0}")]
    Generation(String),

    /// Vector index error
    #[error("vector index error: {0}")]
    VectorIndex(String),

    /// Neither robots.txt nor /sitemap.xml pointed at a sitemap
    #[error("could not find a sitemap for {0}")]
    SitemapNotFound(String),

    /// Input validation error
    #[error("validation failed: {0}")]
    Validation(String),

    /// The knowledge base could not be built
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// Another update is already running
    #[error("a knowledge base update is already in progress")]
    UpdateInProgress,

    /// The knowledge base is not available
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Telegram Bot API error
    #[error("telegram error: {0}")]
    Telegram(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the message may be shown to an end user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::SitemapNotFound(_) | AppError::UpdateInProgress
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Http(e.to_string())
    }
}

/// Axum response implementation for AppError
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = (&self).into();
        let body = Json(ErrorResponse::new(&code, &self.to_string()));
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// HTTP status mapping
impl From<&AppError> for (u16, String) {
    fn from(err: &AppError) -> (u16, String) {
        match err {
            AppError::Validation(_) => (400, "BAD_REQUEST".to_string()),
            AppError::UpdateInProgress => (409, "UPDATE_IN_PROGRESS".to_string()),
            AppError::SitemapNotFound(_) => (422, "SITEMAP_NOT_FOUND".to_string()),
            AppError::Unavailable(_) => (503, "SERVICE_UNAVAILABLE".to_string()),
            AppError::Http(_) => (502, "UPSTREAM_ERROR".to_string()),
            AppError::VectorIndex(_) => (500, "INDEX_ERROR".to_string()),
            AppError::Embedding(_) => (500, "EMBEDDING_ERROR".to_string()),
            AppError::Generation(_) => (500, "GENERATION_ERROR".to_string()),
            _ => (500, "INTERNAL_ERROR".to_string()),
        }
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, AppError>;
