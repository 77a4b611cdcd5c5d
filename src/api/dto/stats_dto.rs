use serde::{Deserialize, Serialize};

use crate::models::KnowledgeStats;

/// Stats response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub documents: usize,
    pub chunks: usize,
    pub last_updated: String,
}

impl From<KnowledgeStats> for StatsResponse {
    fn from(stats: KnowledgeStats) -> Self {
        Self {
            documents: stats.documents,
            chunks: stats.chunks,
            last_updated: stats.last_updated,
        }
    }
}
