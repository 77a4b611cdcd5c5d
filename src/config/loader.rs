use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// Bare environment variables understood for compatibility with existing
/// deployments, and the configuration key each one sets.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TELEGRAM_BOT_TOKEN", "telegram.bot_token"),
    ("GOOGLE_API_KEY", "provider.google_api_key"),
    ("LOCAL_EMBEDDING_MODEL", "embedding.local_model"),
    ("LOCAL_LLM_MODEL", "llm.local_model"),
    ("TOP_K_DENSE", "retrieval.top_k_dense"),
    ("TOP_K_BM25", "retrieval.top_k_bm25"),
    ("TOP_K_FUSED", "retrieval.top_k_fused"),
    ("CHUNK_SIZE", "chunking.chunk_size"),
    ("CHUNK_OVERLAP", "chunking.chunk_overlap"),
    ("DATA_DIR", "storage.data_dir"),
    ("TEMPERATURE", "llm.temperature"),
    ("MAX_TOKENS", "llm.max_tokens"),
    ("LOG_LEVEL", "logging.level"),
    ("DEFAULT_SITE", "crawler.default_site"),
    ("DEFAULT_UPDATE_MAX_LINKS", "crawler.default_update_max_links"),
];

/// Legacy boolean variables. Only a case-insensitive `true` enables them,
/// any other value disables them.
const LEGACY_BOOL_ENV: &[(&str, &str)] = &[("USE_RERANKER", "retrieval.use_reranker")];

const EMBEDDING_BACKENDS: &[&str] = &["auto", "google", "ollama", "hashing"];
const LLM_BACKENDS: &[&str] = &["auto", "google", "ollama"];

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from the default path.
    ///
    /// Sources, later ones win:
    /// 1. built-in defaults
    /// 2. ./config.toml
    /// 3. `RAGRAM_<SECTION>__<KEY>` environment variables
    /// 4. legacy bare environment variables (`TELEGRAM_BOT_TOKEN`, ...)
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::figment(&default_config_path()).extract()
    }

    /// Load using the given TOML file.
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        Self::figment(&path).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RAGRAM_").split("__"))
            .merge(legacy_env())
            .merge(legacy_bool_env())
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.chunking.chunk_size == 0
            || config.chunking.chunk_overlap >= config.chunking.chunk_size
        {
            return Err(ConfigValidationError::InvalidChunking {
                size: config.chunking.chunk_size,
                overlap: config.chunking.chunk_overlap,
            });
        }

        let retrieval = &config.retrieval;
        for (name, value) in [
            ("top_k_dense", retrieval.top_k_dense),
            ("top_k_bm25", retrieval.top_k_bm25),
            ("top_k_fused", retrieval.top_k_fused),
            ("rrf_k", retrieval.rrf_k),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::ZeroParameter(name));
            }
        }

        if !(0.0..=2.0).contains(&config.llm.temperature) {
            return Err(ConfigValidationError::InvalidTemperature(
                config.llm.temperature,
            ));
        }

        if !EMBEDDING_BACKENDS.contains(&config.embedding.backend.as_str()) {
            return Err(ConfigValidationError::UnknownBackend(
                config.embedding.backend.clone(),
            ));
        }
        if !LLM_BACKENDS.contains(&config.llm.backend.as_str()) {
            return Err(ConfigValidationError::UnknownBackend(
                config.llm.backend.clone(),
            ));
        }
        if (config.embedding.backend == "google" || config.llm.backend == "google")
            && !config.provider.has_google_key()
        {
            return Err(ConfigValidationError::MissingGoogleKey);
        }
        if config.embedding.backend == "hashing" && config.embedding.dimension == 0 {
            return Err(ConfigValidationError::ZeroParameter("embedding.dimension"));
        }

        match reqwest::Url::parse(&config.crawler.default_site) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => {
                return Err(ConfigValidationError::InvalidSite(
                    config.crawler.default_site.clone(),
                ));
            }
        }

        Ok(())
    }
}

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| path.to_string().into())
            .unwrap_or_else(|| key.as_str().to_string().into())
    })
}

fn legacy_bool_env() -> Figment {
    LEGACY_BOOL_ENV
        .iter()
        .fold(Figment::new(), |figment, (name, path)| match std::env::var(name) {
            Ok(value) => figment.merge(Serialized::default(
                path,
                value.trim().eq_ignore_ascii_case("true"),
            )),
            Err(_) => figment,
        })
}

/// Configuration validation errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("server port must be greater than 0")]
    InvalidPort,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("{0} must be greater than 0")]
    ZeroParameter(&'static str),

    #[error("temperature {0} is outside [0, 2]")]
    InvalidTemperature(f32),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("the google backend requires GOOGLE_API_KEY")]
    MissingGoogleKey,

    #[error("default site is not an absolute http(s) URL: {0}")]
    InvalidSite(String),
}

impl From<ConfigValidationError> for crate::error::AppError {
    fn from(e: ConfigValidationError) -> Self {
        crate::error::AppError::Config(e.to_string())
    }
}

/// Default configuration file path
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_sources() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::load()?;
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.llm.google_model, "gemini-2.5-flash");
            Ok(())
        });
    }

    #[test]
    fn test_toml_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [retrieval]
                top_k_dense = 4
                top_k_bm25 = 5

                [crawler]
                default_site = "https://docs.example.com"
                "#,
            )?;
            jail.set_env("RAGRAM_RETRIEVAL__TOP_K_BM25", "20");

            let config = ConfigLoader::load()?;
            assert_eq!(config.retrieval.top_k_dense, 4);
            assert_eq!(config.retrieval.top_k_bm25, 20);
            assert_eq!(config.crawler.default_site, "https://docs.example.com");
            Ok(())
        });
    }

    #[test]
    fn test_legacy_env_names() {
        Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_BOT_TOKEN", "123:abc");
            jail.set_env("CHUNK_SIZE", "500");
            jail.set_env("DEFAULT_SITE", "https://legacy.example.org");

            let config = ConfigLoader::load()?;
            assert_eq!(config.telegram.bot_token, "123:abc");
            assert_eq!(config.chunking.chunk_size, 500);
            assert_eq!(config.crawler.default_site, "https://legacy.example.org");
            assert!(config.telegram_enabled());
            Ok(())
        });
    }

    #[rstest::rstest]
    #[case("True", true)]
    #[case("true", true)]
    #[case("FALSE", false)]
    #[case("no", false)]
    fn test_legacy_boolean_is_case_insensitive(#[case] value: &str, #[case] expected: bool) {
        Jail::expect_with(|jail| {
            jail.set_env("USE_RERANKER", value);

            let config = ConfigLoader::load()?;
            assert_eq!(config.retrieval.use_reranker, expected);
            Ok(())
        });
    }

    #[test]
    fn test_validate_defaults() {
        assert!(ConfigLoader::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut config = AppConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_google_without_key() {
        let mut config = AppConfig::default();
        config.llm.backend = "google".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::MissingGoogleKey)
        ));
    }

    #[test]
    fn test_validate_rejects_relative_site() {
        let mut config = AppConfig::default();
        config.crawler.default_site = "delprof.ru".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::InvalidSite(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = AppConfig::default();
        config.embedding.backend = "faiss".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::UnknownBackend(_))
        ));
    }
}
