use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ragmcp: RagmcpConfig,
    pub embeddings: EmbeddingsConfig,
    pub pipeline: PipelineConfig,
    pub performance: PerformanceConfig,
}

/// RAGMcp-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RagmcpConfig {
    /// Path to the root directory containing documents to index.
    pub rag_folder: PathBuf,
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub batch_size: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_capacity() -> usize {
    1000
}

/// Query-pipeline configuration: the retrieval/fusion/reranking/generation
/// knobs that drive a single query's run through the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_initial_fetch_multiplier")]
    pub initial_fetch_multiplier: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_reranker_enabled")]
    pub reranker_enabled: bool,
    #[serde(default)]
    pub call_timeouts: CallTimeoutsConfig,
    pub reranker_api_key_env: String,
    pub reranker_model: String,
    pub generator_api_key_env: String,
    pub generator_model: String,
}

/// Per-collaborator timeout, in milliseconds. Every external call must be
/// cancellable at its await point, so each collaborator gets its own budget.
#[derive(Debug, Clone, Deserialize)]
pub struct CallTimeoutsConfig {
    #[serde(default = "default_embedder_timeout_ms")]
    pub embedder_ms: u64,
    #[serde(default = "default_search_timeout_ms")]
    pub vector_search_ms: u64,
    #[serde(default = "default_search_timeout_ms")]
    pub lexical_search_ms: u64,
    #[serde(default = "default_reranker_timeout_ms")]
    pub reranker_ms: u64,
    #[serde(default = "default_generator_timeout_ms")]
    pub generator_ms: u64,
}

impl Default for CallTimeoutsConfig {
    fn default() -> Self {
        Self {
            embedder_ms: default_embedder_timeout_ms(),
            vector_search_ms: default_search_timeout_ms(),
            lexical_search_ms: default_search_timeout_ms(),
            reranker_ms: default_reranker_timeout_ms(),
            generator_ms: default_generator_timeout_ms(),
        }
    }
}

fn default_embedding_dimension() -> usize {
    1024
}

fn default_max_results() -> usize {
    4
}

fn default_initial_fetch_multiplier() -> usize {
    4
}

fn default_rrf_k() -> usize {
    60
}

fn default_reranker_enabled() -> bool {
    true
}

fn default_system_prompt() -> String {
    "You are a helpful assistant that answers questions strictly from the \
     provided context. If the context does not contain the answer, say so \
     plainly rather than guessing."
        .to_string()
}

fn default_embedder_timeout_ms() -> u64 {
    10_000
}

fn default_search_timeout_ms() -> u64 {
    5_000
}

fn default_reranker_timeout_ms() -> u64 {
    8_000
}

fn default_generator_timeout_ms() -> u64 {
    30_000
}

/// Performance tuning configuration (chunking knobs for the ingestion surface)
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RAGMCP_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RAGMCP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config =
            toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !self.ragmcp.rag_folder.exists() {
            anyhow::bail!(
                "rag_folder path does not exist: {}. Set rag_folder in config.toml to your docs directory.",
                self.ragmcp.rag_folder.display()
            );
        }

        if !self.ragmcp.rag_folder.is_dir() {
            anyhow::bail!(
                "rag_folder must be a directory, not a file: {}",
                self.ragmcp.rag_folder.display()
            );
        }

        std::env::var(&self.embeddings.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your embeddings API key.",
                self.embeddings.api_key_env
            )
        })?;

        if self.pipeline.embedding_dimension == 0 {
            anyhow::bail!("pipeline.embedding_dimension must be greater than 0");
        }

        if self.pipeline.max_results == 0 {
            anyhow::bail!("pipeline.max_results must be greater than 0");
        }

        if self.pipeline.initial_fetch_multiplier == 0 {
            anyhow::bail!("pipeline.initial_fetch_multiplier must be greater than 0");
        }

        if self.pipeline.rrf_k == 0 {
            anyhow::bail!("pipeline.rrf_k must be greater than 0");
        }

        if self.performance.chunk_size_tokens == 0 {
            anyhow::bail!("performance.chunk_size_tokens must be greater than 0");
        }

        if self.performance.chunk_overlap_tokens >= self.performance.chunk_size_tokens {
            anyhow::bail!("performance.chunk_overlap_tokens must be less than chunk_size_tokens");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.ragmcp.db_path
    }

    /// Get the docs root path (rag_folder from config.toml)
    pub fn rag_folder(&self) -> &Path {
        &self.ragmcp.rag_folder
    }

    /// initial_limit = max_results * initial_fetch_multiplier, the number of
    /// candidates each retrieval arm fetches before fusion trims to max_results.
    pub fn initial_fetch_limit(&self) -> usize {
        self.pipeline.max_results * self.pipeline.initial_fetch_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide cwd and env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn create_test_config(temp_dir: &TempDir) -> String {
        let rag_folder = temp_dir.path().canonicalize().unwrap();
        let rag_folder_str = rag_folder.to_str().unwrap().replace('\\', "\\\\");
        format!(
            r#"
[ragmcp]
rag_folder = "{}"
db_path = "./test.db"
log_level = "debug"

[embeddings]
provider = "openai"
model = "text-embedding-3-small"
api_key_env = "OPENAI_API_KEY"
batch_size = 100

[pipeline]
reranker_api_key_env = "RERANKER_API_KEY"
reranker_model = "cross-encoder-test"
generator_api_key_env = "GENERATOR_API_KEY"
generator_model = "generator-test"

[performance]
chunk_size_tokens = 300
chunk_overlap_tokens = 50
"#,
            rag_folder_str
        )
    }

    /// Restores cwd when dropped (e.g. on panic).
    struct CwdGuard(std::path::PathBuf);
    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    fn with_config_env(config_path: &std::path::Path, api_key: Option<&str>, f: impl FnOnce()) {
        let original_config = std::env::var("RAGMCP_CONFIG").ok();
        let original_key = std::env::var("OPENAI_API_KEY").ok();
        std::env::set_var("RAGMCP_CONFIG", config_path.to_str().unwrap());
        match api_key {
            Some(k) => std::env::set_var("OPENAI_API_KEY", k),
            None => std::env::remove_var("OPENAI_API_KEY"),
        }
        f();
        std::env::remove_var("RAGMCP_CONFIG");
        std::env::remove_var("OPENAI_API_KEY");
        if let Some(val) = original_config {
            std::env::set_var("RAGMCP_CONFIG", val);
        }
        if let Some(val) = original_key {
            std::env::set_var("OPENAI_API_KEY", val);
        }
    }

    #[test]
    fn test_config_load_success_with_defaults() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_content = create_test_config(&temp_dir);
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, config_content).unwrap();
        let config_path = config_path.canonicalize().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let _cwd = CwdGuard(original_dir.clone());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, Some("test-key"), || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.ragmcp.log_level, "debug");
            assert_eq!(config.pipeline.embedding_dimension, 1024);
            assert_eq!(config.pipeline.max_results, 4);
            assert_eq!(config.pipeline.initial_fetch_multiplier, 4);
            assert_eq!(config.pipeline.rrf_k, 60);
            assert!(config.pipeline.reranker_enabled);
            assert_eq!(config.initial_fetch_limit(), 16);
        });
    }

    #[test]
    fn test_config_missing_api_key() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_content = create_test_config(&temp_dir);
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, config_content).unwrap();
        let config_path = config_path.canonicalize().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let _cwd = CwdGuard(original_dir.clone());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, None, || {
            let config = Config::load();
            assert!(config.is_err(), "Expected missing API key error");
            assert!(config.unwrap_err().to_string().contains("OPENAI_API_KEY"));
        });
    }

    #[test]
    fn test_config_loads_from_env_file() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_content = create_test_config(&temp_dir);
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, config_content).unwrap();

        let env_file = temp_dir.path().join(".env");
        fs::write(&env_file, "OPENAI_API_KEY=test-key-from-env-file\n").unwrap();
        let config_path = config_path.canonicalize().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let _cwd = CwdGuard(original_dir.clone());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, None, || {
            let config = Config::load();
            assert!(
                config.is_ok(),
                "Config should load with API key from .env file"
            );
            let config = config.unwrap();
            assert_eq!(config.embeddings.api_key_env, "OPENAI_API_KEY");
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("RAGMCP_CONFIG").ok();
        std::env::set_var("RAGMCP_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("RAGMCP_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RAGMCP_CONFIG", v);
        }
    }

    #[test]
    fn test_config_overrides_pipeline_defaults() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let rag_folder = temp_dir.path().canonicalize().unwrap();
        let config_content = format!(
            r#"
[ragmcp]
rag_folder = "{}"
db_path = "./test.db"
log_level = "debug"

[embeddings]
provider = "openai"
model = "text-embedding-3-small"
api_key_env = "OPENAI_API_KEY"
batch_size = 100

[pipeline]
embedding_dimension = 768
max_results = 8
reranker_api_key_env = "RERANKER_API_KEY"
reranker_model = "m"
generator_api_key_env = "GENERATOR_API_KEY"
generator_model = "g"

[performance]
chunk_size_tokens = 300
chunk_overlap_tokens = 50
"#,
            rag_folder.to_str().unwrap().replace('\\', "\\\\")
        );
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, config_content).unwrap();
        let config_path = config_path.canonicalize().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let _cwd = CwdGuard(original_dir.clone());
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(&config_path, Some("test-key"), || {
            let config = Config::load().unwrap();
            assert_eq!(config.pipeline.embedding_dimension, 768);
            assert_eq!(config.pipeline.max_results, 8);
        });
    }
}
