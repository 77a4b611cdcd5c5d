use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Update request. Missing fields fall back to the configured site and
/// page limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateRequest {
    pub url: Option<String>,
    pub max_links: Option<usize>,
}

impl UpdateRequest {
    /// Parse a request body. An empty body means "all defaults"; anything
    /// else must be a valid JSON request.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("invalid update request: {}", e)))
    }
}

/// Update response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// "updated" or "up_to_date"
    pub status: String,
    pub pages: usize,
    pub chunks: usize,
    /// Human-readable summary
    pub message: String,
    pub took_ms: u64,
}
