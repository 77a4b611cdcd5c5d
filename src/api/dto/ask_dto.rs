use serde::{Deserialize, Serialize};

use crate::models::SourceLink;

/// Ask request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// Question text
    pub question: String,
}

/// Ask response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    /// Answer split into message-sized parts
    pub messages: Vec<String>,
    /// Pages the answer was grounded on
    pub sources: Vec<SourceLink>,
    /// Time taken (ms)
    pub took_ms: u64,
}
