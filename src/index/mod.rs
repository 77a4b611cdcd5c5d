//! 检索索引模块
//!
//! 扁平向量存储中的稠密嵌入、同一批文本块上的 BM25 全文索引、
//! 两路结果的倒数排名融合，以及可选的重排序。

pub mod bm25;
pub mod embedding;
pub mod fusion;
pub mod rerank;
pub mod vector;

pub use bm25::{Bm25Index, Bm25Result};
pub use embedding::{
    EmbeddingModel, GoogleEmbeddingModel, HashingEmbeddingModel, OllamaEmbeddingModel,
    create_embedding_model,
};
pub use fusion::rrf_fusion;
pub use rerank::{Reranker, TermCoverageReranker, rerank_or_keep};
pub use vector::{VectorSearchResult, VectorStore};
