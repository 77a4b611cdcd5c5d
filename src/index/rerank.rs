//! 候选重排序
//!
//! 对融合后的候选结果进行第二轮打分，同时考虑查询词覆盖率和短语顺序。
//! 稠密索引（语义整体）和 BM25（独立词项）都无法捕捉这一信号。

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::Result;
use crate::index::bm25::tokenize;
use crate::models::Document;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder `candidates` by relevance to `query`, best first.
    async fn rerank(&self, query: &str, candidates: Vec<Document>) -> Result<Vec<Document>>;
}

/// Scores each candidate by the share of distinct query terms it contains
/// plus the share of adjacent query term pairs it contains in the same order.
/// Equal scores keep the incoming (fused) order.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermCoverageReranker;

impl TermCoverageReranker {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, query: &str, text: &str) -> f32 {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return 0.0;
        }
        let doc_tokens = tokenize(text);

        let doc_terms: HashSet<&str> = doc_tokens.iter().map(String::as_str).collect();
        let query_terms: HashSet<&str> = query_tokens.iter().map(String::as_str).collect();
        let covered = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
        let coverage = covered as f32 / query_terms.len() as f32;

        let query_pairs: HashSet<(&str, &str)> = pairs(&query_tokens).collect();
        let phrase = if query_pairs.is_empty() {
            0.0
        } else {
            let doc_pairs: HashSet<(&str, &str)> = pairs(&doc_tokens).collect();
            let matched = query_pairs.iter().filter(|p| doc_pairs.contains(*p)).count();
            matched as f32 / query_pairs.len() as f32
        };

        coverage + phrase
    }
}

fn pairs(tokens: &[String]) -> impl Iterator<Item = (&str, &str)> {
    tokens.windows(2).map(|w| (w[0].as_str(), w[1].as_str()))
}

#[async_trait]
impl Reranker for TermCoverageReranker {
    async fn rerank(&self, query: &str, candidates: Vec<Document>) -> Result<Vec<Document>> {
        if candidates.len() < 2 {
            return Ok(candidates);
        }

        let mut scored: Vec<(Document, f32)> = candidates
            .into_iter()
            .map(|doc| {
                let score = self.score(query, &doc.text);
                (doc, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        debug!("Reranked {} candidates", scored.len());
        Ok(scored.into_iter().map(|(doc, _)| doc).collect())
    }
}

/// Rerank, keeping the incoming order if the reranker fails.
pub async fn rerank_or_keep(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<Document>,
) -> Vec<Document> {
    match reranker.rerank(query, candidates.clone()).await {
        Ok(reranked) => reranked,
        Err(e) => {
            warn!("Reranking failed, keeping fused order: {}", e);
            candidates
        }
    }
}
