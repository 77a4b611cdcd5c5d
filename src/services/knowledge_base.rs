//! 知识库服务
//!
//! 持有两个检索索引及其相关模型。爬取和嵌入过程不持有索引锁，
//! 替换新数据时只短暂获取写锁，因此更新期间仍可继续回答问题。

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::crawler::{CrawledPage, Crawler};
use crate::error::{AppError, Result};
use crate::index::{
    Bm25Index, EmbeddingModel, Reranker, TermCoverageReranker, VectorStore, bm25,
    create_embedding_model, rerank_or_keep, rrf_fusion,
};
use crate::llm::{LanguageModel, create_language_model};
use crate::models::{Answer, Document, KnowledgeStats, UpdateReport};
use crate::services::chunking::{TextSplitter, split_message};
use crate::services::prompts;

/// Resolve the site and page limit of an update request, falling back to
/// the configured defaults. The site must be an absolute URL with a host.
pub fn update_target(
    url: Option<&str>,
    max_links: Option<usize>,
    default_site: &str,
    default_max_links: usize,
) -> Result<(String, usize)> {
    let url = url.map(str::trim).filter(|u| !u.is_empty()).unwrap_or(default_site);
    match reqwest::Url::parse(url) {
        Ok(parsed)
            if matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty()) =>
        {
            Ok((url.to_string(), max_links.unwrap_or(default_max_links)))
        }
        _ => Err(AppError::Validation(format!(
            "invalid URL {}: it must start with http:// or https://",
            url
        ))),
    }
}

struct Indices {
    vectors: VectorStore,
    bm25: Bm25Index,
}

pub struct KnowledgeBase {
    config: AppConfig,
    embeddings: Arc<dyn EmbeddingModel>,
    llm: Arc<dyn LanguageModel>,
    reranker: Option<Arc<dyn Reranker>>,
    crawler: Crawler,
    splitter: TextSplitter,
    indices: RwLock<Indices>,
    last_updated: RwLock<DateTime<Utc>>,
    update_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// Create the configured models, then load the stored indices or build
    /// them from the default site.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let embeddings = create_embedding_model(&config)?;
        let llm = create_language_model(&config)?;
        Self::open_with(config, embeddings, llm).await
    }

    pub async fn open_with(
        config: AppConfig,
        embeddings: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let kb = Self::new(config, embeddings, llm)?;

        let vector_dir = kb.config.storage.vector_dir();
        if VectorStore::exists(&vector_dir) {
            info!("Loading vector index from {}", vector_dir.display());
            let store = VectorStore::load(&vector_dir, &kb.embeddings.name())?;
            kb.indices.write().vectors = store;
            kb.load_or_rebuild_bm25()?;
        } else {
            let site = kb.config.crawler.default_site.clone();
            warn!("No vector index found, building from {}", site);
            let report = kb
                .build(&site, kb.config.crawler.default_update_max_links)
                .await?;
            info!("Initial build finished: {}", report);
        }

        Ok(kb)
    }

    /// A knowledge base with empty indices.
    pub fn new(
        config: AppConfig,
        embeddings: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let crawler = Crawler::new(&config.crawler, config.storage.hash_store_path())?;
        let reranker: Option<Arc<dyn Reranker>> = if config.retrieval.use_reranker {
            Some(Arc::new(TermCoverageReranker::new()))
        } else {
            None
        };

        Ok(Self {
            splitter: TextSplitter::from_config(&config.chunking),
            indices: RwLock::new(Indices {
                vectors: VectorStore::new(&embeddings.name()),
                bm25: Bm25Index::default(),
            }),
            last_updated: RwLock::new(Utc::now()),
            update_lock: Mutex::new(()),
            config,
            embeddings,
            llm,
            reranker,
            crawler,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn load_or_rebuild_bm25(&self) -> Result<()> {
        let path = self.config.storage.bm25_corpus_path();
        if path.exists() {
            match bm25::load_corpus(&path) {
                Ok(documents) => {
                    info!("BM25 corpus loaded from {}", path.display());
                    self.indices.write().bm25 = Bm25Index::new(documents);
                    return Ok(());
                }
                Err(e) => warn!("Could not load the BM25 corpus ({}), rebuilding", e),
            }
        }

        let documents: Vec<Document> = self.indices.read().vectors.documents().cloned().collect();
        bm25::save_corpus(&path, &documents)?;
        self.indices.write().bm25 = Bm25Index::new(documents);
        Ok(())
    }

    /// Replace both indices with a fresh crawl of `site`.
    #[instrument(skip(self))]
    pub async fn build(&self, site: &str, max_links: usize) -> Result<UpdateReport> {
        let _guard = self
            .update_lock
            .try_lock()
            .map_err(|_| AppError::UpdateInProgress)?;

        let crawl = self
            .crawler
            .collect_changed_pages(site, max_links, true)
            .await?;
        let (chunks, pages) = self.chunk_pages(&crawl.pages);
        if chunks.is_empty() {
            return Err(AppError::Initialization(format!(
                "could not collect any documents from {}",
                site
            )));
        }

        info!(
            "Building indices from {} pages, {} chunks",
            pages,
            chunks.len()
        );
        let vectors = self.embed(&chunks).await?;
        let mut store = VectorStore::new(&self.embeddings.name());
        store.add(chunks.clone(), vectors)?;
        store.save(&self.config.storage.vector_dir())?;
        bm25::save_corpus(&self.config.storage.bm25_corpus_path(), &chunks)?;
        crawl.commit()?;

        let report = UpdateReport {
            pages,
            chunks: chunks.len(),
        };
        let bm25 = Bm25Index::new(chunks);
        {
            let mut indices = self.indices.write();
            indices.vectors = store;
            indices.bm25 = bm25;
        }
        *self.last_updated.write() = Utc::now();
        Ok(report)
    }

    /// Index the new and changed pages of `site`.
    #[instrument(skip(self))]
    pub async fn update(&self, site: &str, max_links: usize) -> Result<UpdateReport> {
        let _guard = self
            .update_lock
            .try_lock()
            .map_err(|_| AppError::UpdateInProgress)?;

        let crawl = self
            .crawler
            .collect_changed_pages(site, max_links, false)
            .await?;
        let (chunks, pages) = self.chunk_pages(&crawl.pages);
        if chunks.is_empty() {
            crawl.commit()?;
            info!("No new or changed pages on {}", site);
            return Ok(UpdateReport {
                pages: 0,
                chunks: 0,
            });
        }

        let vectors = self.embed(&chunks).await?;
        let mut corpus = self.indices.read().bm25.documents().to_vec();
        corpus.extend(chunks.iter().cloned());
        let bm25 = Bm25Index::new(corpus);

        {
            let mut indices = self.indices.write();
            indices.vectors.add(chunks.clone(), vectors)?;
            indices.bm25 = bm25;
        }
        self.indices
            .read()
            .vectors
            .save(&self.config.storage.vector_dir())?;
        bm25::append_corpus(&self.config.storage.bm25_corpus_path(), &chunks)?;
        crawl.commit()?;
        *self.last_updated.write() = Utc::now();

        let report = UpdateReport {
            pages,
            chunks: chunks.len(),
        };
        info!("Update of {} finished: {}", site, report);
        Ok(report)
    }

    /// Answer `question` from the indexed content.
    #[instrument(skip(self))]
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("question must not be empty".to_string()));
        }

        let retrieval = &self.config.retrieval;
        let query_vector = self.embeddings.encode(question).await?;
        let (dense, sparse) = {
            let indices = self.indices.read();
            let dense: Vec<Document> = indices
                .vectors
                .search(&query_vector, retrieval.top_k_dense)?
                .into_iter()
                .map(|r| r.document)
                .collect();
            let sparse: Vec<Document> = indices
                .bm25
                .search(question, retrieval.top_k_bm25)
                .into_iter()
                .map(|r| r.document)
                .collect();
            (dense, sparse)
        };

        let mut fused = rrf_fusion(vec![dense, sparse], retrieval.top_k_fused, retrieval.rrf_k);
        if let Some(reranker) = &self.reranker {
            fused = rerank_or_keep(reranker.as_ref(), question, fused).await;
        }

        let (context, sources) = prompts::build_context(&fused);
        if context.is_empty() {
            return Ok(Answer {
                messages: vec![prompts::NO_INFORMATION.to_string()],
                sources: Vec::new(),
            });
        }

        let prompt = prompts::answer_prompt(&context, question);
        let generated = self.llm.generate(&prompt).await?;
        let messages = split_message(&generated, self.config.telegram.message_limit);
        if messages.is_empty() {
            return Err(AppError::Generation(format!(
                "{} returned an empty answer",
                self.llm.name()
            )));
        }

        Ok(Answer { messages, sources })
    }

    pub fn stats(&self) -> KnowledgeStats {
        let indices = self.indices.read();
        KnowledgeStats {
            documents: indices.vectors.distinct_sources(),
            chunks: indices.vectors.len(),
            last_updated: self
                .last_updated
                .read()
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string(),
        }
    }

    /// Chunks of every page with enough text, and the number of such pages.
    fn chunk_pages(&self, pages: &[CrawledPage]) -> (Vec<Document>, usize) {
        let mut chunks = Vec::new();
        let mut used = 0;
        for page in pages {
            if page.text.chars().count() < self.config.crawler.min_document_chars {
                continue;
            }
            let page_chunks = self.splitter.split_document(&page.text, &page.metadata);
            if !page_chunks.is_empty() {
                used += 1;
                chunks.extend(page_chunks);
            }
        }
        (chunks, used)
    }

    async fn embed(&self, chunks: &[Document]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|d| d.text.clone()).collect();
        self.embeddings.encode_batch(&texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HashingEmbeddingModel;
    use crate::llm::MockLanguageModel;
    use crate::models::DocumentMetadata;
    use rstest::rstest;

    #[rstest]
    #[case(None, None, Some(("https://delprof.ru", 200)))]
    #[case(Some("https://e.com/docs"), Some(5), Some(("https://e.com/docs", 5)))]
    #[case(Some("  "), Some(5), Some(("https://delprof.ru", 5)))]
    #[case(Some("e.com"), None, None)]
    #[case(Some("mailto:me@e.com"), None, None)]
    #[case(Some("ftp://e.com"), None, None)]
    fn test_update_target(
        #[case] url: Option<&str>,
        #[case] max: Option<usize>,
        #[case] expected: Option<(&str, usize)>,
    ) {
        let result = update_target(url, max, "https://delprof.ru", 200).ok();
        assert_eq!(
            result.as_ref().map(|(u, m)| (u.as_str(), *m)),
            expected
        );
    }

    fn knowledge_base(dir: &std::path::Path, llm: MockLanguageModel) -> KnowledgeBase {
        let config = AppConfig::offline(dir);
        KnowledgeBase::new(config, Arc::new(HashingEmbeddingModel::new(128)), Arc::new(llm))
            .unwrap()
    }

    async fn seed(kb: &KnowledgeBase, texts: &[(&str, &str)]) {
        let docs: Vec<Document> = texts
            .iter()
            .map(|(text, source)| {
                Document::new(text, DocumentMetadata::new(source).with_title("Page"))
            })
            .collect();
        let model = HashingEmbeddingModel::new(128);
        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        let vectors = model.encode_batch(&texts).await.unwrap();
        let mut indices = kb.indices.write();
        indices.vectors.add(docs.clone(), vectors).unwrap();
        indices.bm25 = Bm25Index::new(docs);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge_base(dir.path(), MockLanguageModel::new());
        assert!(matches!(kb.ask("   ").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_no_context_gives_fixed_reply_without_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut llm = MockLanguageModel::new();
        llm.expect_generate().never();
        let kb = knowledge_base(dir.path(), llm);

        let answer = kb.ask("anything at all?").await.unwrap();
        assert_eq!(answer.messages, vec![prompts::NO_INFORMATION.to_string()]);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_ask_builds_prompt_from_retrieved_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut llm = MockLanguageModel::new();
        llm.expect_generate()
            .withf(|prompt: &str| {
                prompt.contains("QUESTION: How do customer interviews work?")
                    && prompt.contains("URL: https://e.com/interviews")
            })
            .times(1)
            .returning(|_| Ok("Interviews uncover real problems.".to_string()));
        llm.expect_name().returning(|| "mock".to_string());
        let kb = knowledge_base(dir.path(), llm);
        seed(
            &kb,
            &[
                ("customer interviews uncover real problems", "https://e.com/interviews"),
                ("pricing pages should be simple", "https://e.com/pricing"),
                ("roadmaps follow evidence", "https://e.com/roadmap"),
            ],
        )
        .await;

        let answer = kb.ask("How do customer interviews work?").await.unwrap();
        assert_eq!(answer.messages, vec!["Interviews uncover real problems."]);
        assert_eq!(answer.sources[0].url, "https://e.com/interviews");
    }

    #[tokio::test]
    async fn test_long_answers_are_split() {
        let dir = tempfile::tempdir().unwrap();
        let mut llm = MockLanguageModel::new();
        llm.expect_generate()
            .returning(|_| Ok(format!("{}\n{}", "a".repeat(3000), "b".repeat(3000))));
        let kb = knowledge_base(dir.path(), llm);
        seed(&kb, &[("some indexed text", "https://e.com/a")]).await;

        let answer = kb.ask("indexed text").await.unwrap();
        assert_eq!(answer.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_count_distinct_sources() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge_base(dir.path(), MockLanguageModel::new());
        seed(
            &kb,
            &[
                ("one", "https://e.com/a"),
                ("two", "https://e.com/a"),
                ("three", "https://e.com/b"),
            ],
        )
        .await;

        let stats = kb.stats();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.last_updated.len(), "2024-01-01T00:00:00".len());
    }

    #[tokio::test]
    async fn test_concurrent_update_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let kb = knowledge_base(dir.path(), MockLanguageModel::new());

        let _held = kb.update_lock.lock().await;
        assert!(matches!(
            kb.update("https://example.com", 5).await,
            Err(AppError::UpdateInProgress)
        ));
    }

    #[tokio::test]
    async fn test_open_rebuilds_missing_bm25_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::offline(dir.path());
        let model = HashingEmbeddingModel::new(config.embedding.dimension);

        let doc = Document::new("stored chunk", DocumentMetadata::new("https://e.com/a"));
        let mut store = VectorStore::new(&model.name());
        store
            .add(vec![doc], vec![model.encode("stored chunk").await.unwrap()])
            .unwrap();
        store.save(&config.storage.vector_dir()).unwrap();

        let kb = KnowledgeBase::open_with(
            config.clone(),
            Arc::new(model),
            Arc::new(MockLanguageModel::new()),
        )
        .await
        .unwrap();

        assert_eq!(kb.stats().chunks, 1);
        let corpus = bm25::load_corpus(&config.storage.bm25_corpus_path()).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].text, "stored chunk");
    }
}
