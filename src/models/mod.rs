//! 核心数据模型
//!
//! 分块文档以及知识库返回给调用方的数据。

pub mod document;
pub mod knowledge;

pub use document::{Document, DocumentMetadata};
pub use knowledge::{Answer, KnowledgeStats, SourceLink, UpdateReport};
