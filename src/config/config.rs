use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token; the bot is disabled when empty
    pub bot_token: String,
    /// Bot API base URL
    pub api_url: String,
    /// Long polling timeout (seconds)
    pub poll_timeout_secs: u64,
    /// Maximum characters per outgoing message
    pub message_limit: usize,
    /// Append a list of source links to answers
    pub show_sources: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: "https://api.telegram.org".into(),
            poll_timeout_secs: 30,
            message_limit: 3900,
            show_sources: false,
        }
    }
}

/// Remote model provider endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Google Generative Language API key
    pub google_api_key: String,
    /// Google Generative Language API base URL
    pub google_base_url: String,
    /// Ollama server address
    pub ollama_url: String,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            google_base_url: "https://generativelanguage.googleapis.com".into(),
            ollama_url: "http://localhost:11434".into(),
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    pub fn has_google_key(&self) -> bool {
        !self.google_api_key.trim().is_empty()
    }

    /// Resolve `auto` to a concrete backend: google when an API key is
    /// configured, ollama otherwise.
    pub fn resolve<'a>(&self, backend: &'a str) -> &'a str {
        match backend {
            "auto" if self.has_google_key() => "google",
            "auto" => "ollama",
            other => other,
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend: "auto", "google", "ollama" or "hashing"
    pub backend: String,
    /// Google embedding model
    pub google_model: String,
    /// Ollama embedding model
    pub local_model: String,
    /// Vector dimension of the hashing backend
    pub dimension: usize,
    /// Texts per embedding request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "auto".into(),
            google_model: "text-embedding-004".into(),
            local_model: "all-minilm".into(),
            dimension: 384,
            batch_size: 32,
        }
    }
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend: "auto", "google" or "ollama"
    pub backend: String,
    pub google_model: String,
    pub local_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "auto".into(),
            google_model: "gemini-2.5-flash".into(),
            local_model: "gemma3:4b".into(),
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

/// Retrieval parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k_dense: usize,
    pub top_k_bm25: usize,
    pub top_k_fused: usize,
    /// RRF smoothing constant
    pub rrf_k: usize,
    pub use_reranker: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_dense: 8,
            top_k_bm25: 12,
            top_k_fused: 8,
            rrf_k: 60,
            use_reranker: true,
        }
    }
}

/// Chunking parameters (characters)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 900,
            chunk_overlap: 150,
        }
    }
}

/// On-disk state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vector_store")
    }

    pub fn bm25_corpus_path(&self) -> PathBuf {
        self.data_dir.join("bm25_corpus.jsonl")
    }

    pub fn hash_store_path(&self) -> PathBuf {
        self.data_dir.join("hash_storage.json")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Create the data and cache directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.cache_dir())
    }
}

/// Site crawler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Site indexed at first start and by `/update` without arguments
    pub default_site: String,
    /// Page limit for the initial build and argument-less updates
    pub default_update_max_links: usize,
    pub request_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    /// Pages with less cleaned text are skipped during the crawl
    pub min_page_chars: usize,
    /// Pages with less cleaned text are not indexed
    pub min_document_chars: usize,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            default_site: "https://delprof.ru".into(),
            default_update_max_links: 200,
            request_timeout_secs: 15,
            max_concurrent_fetches: 8,
            min_page_chars: 100,
            min_document_chars: 200,
            user_agent: concat!("ragram/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Emit JSON lines
    pub structured: bool,
    /// Directory for daily rolling log files
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub provider: ProviderConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkingConfig,
    pub storage: StorageConfig,
    pub crawler: CrawlerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Offline configuration rooted at `data_dir`: hashing embeddings and a
    /// local model endpoint, no Telegram.
    pub fn offline(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = data_dir.into();
        config.embedding.backend = "hashing".into();
        config.llm.backend = "ollama".into();
        config
    }

    pub fn telegram_enabled(&self) -> bool {
        !self.telegram.bot_token.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retrieval.top_k_dense, 8);
        assert_eq!(config.retrieval.top_k_bm25, 12);
        assert_eq!(config.retrieval.top_k_fused, 8);
        assert_eq!(config.chunking.chunk_size, 900);
        assert_eq!(config.chunking.chunk_overlap, 150);
        assert_eq!(config.crawler.default_update_max_links, 200);
        assert!(!config.telegram_enabled());
    }

    #[test]
    fn test_resolve_auto_backend() {
        let mut provider = ProviderConfig::default();
        assert_eq!(provider.resolve("auto"), "ollama");
        assert_eq!(provider.resolve("hashing"), "hashing");

        provider.google_api_key = "key".into();
        assert_eq!(provider.resolve("auto"), "google");
        assert_eq!(provider.resolve("ollama"), "ollama");
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/srv/data"),
        };
        assert_eq!(storage.vector_dir(), PathBuf::from("/srv/data/vector_store"));
        assert_eq!(
            storage.bm25_corpus_path(),
            PathBuf::from("/srv/data/bm25_corpus.jsonl")
        );
        assert_eq!(
            storage.hash_store_path(),
            PathBuf::from("/srv/data/hash_storage.json")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            data_dir: dir.path().join("nested"),
        };
        storage.ensure_dirs().unwrap();
        assert!(storage.cache_dir().is_dir());
    }
}
