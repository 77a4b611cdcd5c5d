use crate::error::{AppError, Result};
use crate::observability::AppMetrics;
use crate::services::KnowledgeBase;
use std::sync::Arc;

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// `None` when the knowledge base failed to load at startup
    pub knowledge_base: Option<Arc<KnowledgeBase>>,
    pub metrics: Arc<AppMetrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("knowledge_base", &self.knowledge_base.is_some())
            .finish()
    }
}

impl AppState {
    pub fn new(knowledge_base: Option<Arc<KnowledgeBase>>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            knowledge_base,
            metrics,
        }
    }

    /// The knowledge base, or `Unavailable` if it never loaded.
    pub fn knowledge_base(&self) -> Result<&Arc<KnowledgeBase>> {
        self.knowledge_base.as_ref().ok_or_else(|| {
            AppError::Unavailable("the knowledge base is not loaded".to_string())
        })
    }
}
