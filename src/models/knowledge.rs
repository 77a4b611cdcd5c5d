use serde::{Deserialize, Serialize};
use std::fmt;

/// A distinct page cited by an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub title: String,
    pub url: String,
}

/// Generated answer, already split into message-sized parts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub messages: Vec<String>,
    pub sources: Vec<SourceLink>,
}

/// Knowledge base statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    /// Distinct source pages
    pub documents: usize,
    /// Stored chunks
    pub chunks: usize,
    /// ISO-8601 UTC, second precision
    pub last_updated: String,
}

/// Outcome of a knowledge base update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub pages: usize,
    pub chunks: usize,
}

impl UpdateReport {
    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(
                f,
                "The knowledge base is already up to date. No new or changed pages were found."
            )
        } else {
            write!(
                f,
                "Done: added {} pages, {} chunks.",
                self.pages, self.chunks
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_report_display() {
        let report = UpdateReport { pages: 3, chunks: 17 };
        assert_eq!(report.to_string(), "Done: added 3 pages, 17 chunks.");

        let empty = UpdateReport { pages: 0, chunks: 0 };
        assert!(empty.is_empty());
        assert!(empty.to_string().contains("already up to date"));
    }
}
