//! 倒数排名融合 (RRF)

use std::collections::HashMap;

use crate::models::Document;

/// Fuse ranked lists with RRF and keep the best `limit` documents.
///
/// A document's score is the sum of `1 / (rrf_k + rank + 1)` over the lists
/// it appears in, with 0-based ranks. The same chunk found by several
/// retrievers is merged by [`Document::fusion_key`]; its first occurrence is
/// the one returned. Equal scores keep first-seen order.
pub fn rrf_fusion(lists: Vec<Vec<Document>>, limit: usize, rrf_k: usize) -> Vec<Document> {
    let mut slots: HashMap<(String, String), usize> = HashMap::new();
    let mut fused: Vec<(Document, f64)> = Vec::new();

    for list in lists {
        for (rank, document) in list.into_iter().enumerate() {
            let score = 1.0 / (rrf_k + rank + 1) as f64;
            match slots.get(&document.fusion_key()) {
                Some(&slot) => fused[slot].1 += score,
                None => {
                    slots.insert(document.fusion_key(), fused.len());
                    fused.push((document, score));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(limit);
    fused.into_iter().map(|(document, _)| document).collect()
}
