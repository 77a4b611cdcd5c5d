//! 文本分块
//!
//! [`TextSplitter`] 将页面文本切分为带重叠的索引块；
//! [`split_message`] 将回答切分为适合聊天消息长度的片段。

use tracing::warn;

use crate::config::config::ChunkingConfig;
use crate::models::{Document, DocumentMetadata};

/// Separators tried in order; the empty separator splits into characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "; ", ""];

/// Recursive character splitter. Lengths are counted in characters.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Chunk a page into documents that all carry the page metadata.
    pub fn split_document(&self, text: &str, metadata: &DocumentMetadata) -> Vec<Document> {
        self.split_text(text)
            .into_iter()
            .map(|chunk| Document::new(&chunk, metadata.clone()))
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                if let Some(piece) = trimmed(piece) {
                    chunks.push(piece);
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Greedily merge small pieces up to `chunk_size`, starting each new
    /// chunk with up to `chunk_overlap` characters of trailing pieces.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of {} characters, longer than {}",
                        total, self.chunk_size
                    );
                }
                if !window.is_empty() {
                    if let Some(chunk) = trimmed(&window.iter().copied().collect::<String>()) {
                        chunks.push(chunk);
                    }
                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        match window.pop_front() {
                            Some(front) => total -= char_len(front),
                            None => break,
                        }
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(chunk) = trimmed(&window.iter().copied().collect::<String>()) {
            chunks.push(chunk);
        }
        chunks
    }
}

fn trimmed(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator yields single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(separator) {
        if i > start {
            pieces.push(&text[start..i]);
        }
        start = i;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Split `text` into messages of at most `limit` characters, preferring to
/// cut at the last line break, then at the last space.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut rest = text.trim();

    while char_len(rest) > limit {
        let window_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];
        let cut = window
            .rfind('\n')
            .filter(|&i| i > 0)
            .or_else(|| window.rfind(' ').filter(|&i| i > 0))
            .unwrap_or(window_end);

        let head = rest[..cut].trim();
        if !head.is_empty() {
            parts.push(head.to_string());
        }
        rest = rest[cut..].trim();
    }

    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}
