//! BM25 全文索引

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::Document;

const K1: f64 = 1.5;
const B: f64 = 0.75;
const EPSILON: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct Bm25Result {
    pub document: Document,
    pub score: f32,
}

/// Lowercase whitespace tokens with surrounding punctuation removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Debug, Default)]
pub struct Bm25Index {
    documents: Vec<Document>,
    doc_freqs: Vec<HashMap<String, usize>>,
    doc_len: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    pub fn new(documents: Vec<Document>) -> Self {
        let mut doc_freqs = Vec::with_capacity(documents.len());
        let mut doc_len = Vec::with_capacity(documents.len());
        let mut containing: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for document in &documents {
            let tokens = tokenize(&document.text);
            total_len += tokens.len();
            doc_len.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_default() += 1;
            }
            for token in freqs.keys() {
                *containing.entry(token.clone()).or_default() += 1;
            }
            doc_freqs.push(freqs);
        }

        let corpus_size = documents.len() as f64;
        let avgdl = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / corpus_size
        };

        // Terms present in more than half of the corpus get a negative IDF;
        // those are floored to a fraction of the average IDF.
        let mut idf = HashMap::with_capacity(containing.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (token, freq) in containing {
            let freq = freq as f64;
            let value = (corpus_size - freq + 0.5).ln() - (freq + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(token.clone());
            }
            idf.insert(token, value);
        }
        if !idf.is_empty() {
            let floor = EPSILON * idf_sum / idf.len() as f64;
            for token in negative {
                idf.insert(token, floor);
            }
        }

        info!("BM25 index built over {} chunks", documents.len());
        Self {
            documents,
            doc_freqs,
            doc_len,
            avgdl,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Score of every document for `query`, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let query = tokenize(query);
        self.doc_freqs
            .iter()
            .zip(&self.doc_len)
            .map(|(freqs, &len)| {
                query
                    .iter()
                    .map(|token| {
                        let tf = freqs.get(token).copied().unwrap_or(0) as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let idf = self.idf.get(token).copied().unwrap_or(0.0);
                        let norm = 1.0 - B + B * len as f64 / self.avgdl;
                        idf * (tf * (K1 + 1.0)) / (tf + K1 * norm)
                    })
                    .sum()
            })
            .collect()
    }

    /// Best `limit` documents with a positive score, highest first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Bm25Result> {
        let scores = self.scores(query);
        let mut ranked: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);

        ranked
            .into_iter()
            .map(|(i, score)| Bm25Result {
                document: self.documents[i].clone(),
                score: score as f32,
            })
            .collect()
    }
}

/// Rewrite the corpus file with `documents`, one JSON object per line.
pub fn save_corpus(path: &Path, documents: &[Document]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_rows(file, documents)
}

/// Append `documents` to the corpus file.
pub fn append_corpus(path: &Path, documents: &[Document]) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    write_rows(file, documents)
}

fn write_rows(file: std::fs::File, documents: &[Document]) -> Result<()> {
    let mut writer = BufWriter::new(file);
    for document in documents {
        serde_json::to_writer(&mut writer, document)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a corpus file. Any malformed line fails the whole load.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut documents = Vec::new();
    let mut seen = HashSet::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document: Document = serde_json::from_str(&line).map_err(|e| {
            AppError::Serialization(format!("corpus line {}: {}", line_no + 1, e))
        })?;
        if seen.insert(document.id.clone()) {
            documents.push(document);
        }
    }
    Ok(documents)
}
