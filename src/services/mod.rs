//! 业务服务层

pub mod chunking;
pub mod knowledge_base;
pub mod prompts;

pub use chunking::{TextSplitter, split_message};
pub use knowledge_base::KnowledgeBase;
