//! 向量索引

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::Document;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    document: Document,
    vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub document: Document,
    pub score: f32,
}

/// Flat in-memory index searched by cosine similarity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStore {
    /// Embedding model the vectors came from
    model: String,
    dimension: Option<usize>,
    entries: Vec<VectorEntry>,
}

impl VectorStore {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dimension: None,
            entries: Vec::new(),
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add documents with their vectors. The first vector fixes the
    /// dimension; vectors of any other length are rejected.
    pub fn add(&mut self, documents: Vec<Document>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if documents.len() != vectors.len() {
            return Err(AppError::VectorIndex(format!(
                "{} documents but {} vectors",
                documents.len(),
                vectors.len()
            )));
        }

        let dimension = match (self.dimension, vectors.first()) {
            (Some(d), _) => d,
            (None, Some(v)) => v.len(),
            (None, None) => return Ok(()),
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(AppError::VectorIndex(format!(
                "vector dimension {} does not match index dimension {}",
                bad.len(),
                dimension
            )));
        }

        self.dimension = Some(dimension);
        self.entries.extend(
            documents
                .into_iter()
                .zip(vectors)
                .map(|(document, vector)| VectorEntry { document, vector }),
        );
        Ok(())
    }

    /// Best `limit` documents for `query`, highest similarity first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<VectorSearchResult>> {
        match self.dimension {
            None => return Ok(Vec::new()),
            Some(d) if d != query.len() => {
                return Err(AppError::VectorIndex(format!(
                    "query dimension {} does not match index dimension {}",
                    query.len(),
                    d
                )));
            }
            Some(_) => {}
        }

        let mut results: Vec<_> = self
            .entries
            .iter()
            .map(|entry| VectorSearchResult {
                document: entry.document.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|e| &e.document)
    }

    pub fn distinct_sources(&self) -> usize {
        self.documents()
            .map(|d| d.metadata.source.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Write the index to `dir/index.json`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, dir.join(INDEX_FILE))?;
        info!("Saved vector store with {} chunks", self.entries.len());
        Ok(())
    }

    /// Read an index written by [`VectorStore::save`]. An index built with a
    /// different embedding model is rejected.
    pub fn load(dir: &Path, expected_model: &str) -> Result<Self> {
        let raw = std::fs::read(dir.join(INDEX_FILE))?;
        let store: VectorStore = serde_json::from_slice(&raw)?;
        if store.model != expected_model {
            return Err(AppError::VectorIndex(format!(
                "index was built with {} but the configured model is {}",
                store.model, expected_model
            )));
        }
        info!("Loaded vector store with {} chunks", store.entries.len());
        Ok(store)
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
