use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a chunk came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    /// Page URL
    pub source: String,

    /// Page `<title>`, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl DocumentMetadata {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Title for display, falling back to the URL.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.source)
    }
}

/// A chunk of cleaned page text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Chunk ID
    #[serde(default = "new_document_id")]
    pub id: String,

    /// Chunk text
    pub text: String,

    /// Page metadata
    pub metadata: DocumentMetadata,
}

fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

impl Document {
    pub fn new(text: &str, metadata: DocumentMetadata) -> Self {
        Self {
            id: new_document_id(),
            text: text.to_string(),
            metadata,
        }
    }

    /// Identity used to merge the same chunk found by different retrievers:
    /// the first 50 characters of text plus the source URL.
    pub fn fusion_key(&self) -> (String, String) {
        (
            self.text.chars().take(50).collect(),
            self.metadata.source.clone(),
        )
    }
}
