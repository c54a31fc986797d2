//! Configuration management for medallion
//!
//! Handles loading, saving, and validating configuration from TOML files,
//! and derives the table and index names every stage writes to.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Databricks workspace connection
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Source volume with PDF files
    #[serde(default)]
    pub source: SourceConfig,

    /// Vector search configuration
    #[serde(default)]
    pub vector_search: VectorSearchConfig,

    /// Embedding endpoint configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Chain model registration and deployment
    #[serde(default)]
    pub model: ModelConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Workspace connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace URL, e.g. https://adb-123.4.azuredatabricks.net
    #[serde(default = "default_workspace_host")]
    pub host: String,

    /// Environment variable name holding the access token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

/// Source volume configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unity Catalog catalog
    #[serde(default)]
    pub catalog: String,

    /// Unity Catalog schema
    #[serde(default)]
    pub schema: String,

    /// Volume holding the PDF files
    #[serde(default)]
    pub volume: String,

    /// Directory to scan (defaults to /Volumes/<catalog>/<schema>/<volume>)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// File name glob applied during the scan
    #[serde(default = "default_source_glob")]
    pub glob: String,
}

/// Vector search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchConfig {
    /// Vector search endpoint hosting the index
    #[serde(default)]
    pub endpoint_name: String,

    /// Sync pipeline type (TRIGGERED or CONTINUOUS)
    #[serde(default = "default_pipeline_type")]
    pub pipeline_type: String,

    /// Number of chunks the chain retrieves
    #[serde(default = "default_retrieval_k")]
    pub k: usize,
}

/// Embedding endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model serving endpoint that computes embeddings
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint_name: String,

    /// Task the endpoint must serve
    #[serde(default = "default_embedding_task")]
    pub task: String,

    /// Context window override for endpoints not known to medallion
    #[serde(default)]
    pub context_window_tokens: Option<usize>,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum tokens per chunk
    #[serde(default = "default_chunk_size_tokens")]
    pub size_tokens: usize,

    /// Tokens shared by consecutive chunks
    #[serde(default = "default_chunk_overlap_tokens")]
    pub overlap_tokens: usize,

    /// Tokenizer: a tokenizer.json path, a Hugging Face hub id, or "words"
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

/// Chain model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Catalog the model is registered in
    #[serde(default)]
    pub catalog: String,

    /// Schema the model is registered in
    #[serde(default)]
    pub schema: String,

    /// Registered model name
    #[serde(default)]
    pub name: String,

    /// Local chain code file (or directory) uploaded when logging
    #[serde(default)]
    pub code_path: String,

    /// Local chain config YAML uploaded next to the code
    #[serde(default)]
    pub config_path: Option<String>,

    /// MLflow experiment that receives logged runs
    #[serde(default)]
    pub experiment_id: String,

    /// Serving workload size
    #[serde(default = "default_workload_size")]
    pub workload_size: String,

    /// Scale the serving endpoint to zero when idle
    #[serde(default = "default_scale_to_zero")]
    pub scale_to_zero: bool,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for medallion data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the SQLite database holding the pipeline tables
    pub db_file: PathBuf,
}

/// Fully qualified names of the tables and index one pipeline run writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    pub bronze: String,
    pub silver: String,
    pub gold: String,
    pub index: String,
}

impl TableNames {
    pub fn new(catalog: &str, schema: &str, volume: &str) -> Self {
        let prefix = format!("{}.{}", catalog, schema);
        Self {
            bronze: format!("{}.bronze_{}_raw", prefix, volume),
            silver: format!("{}.silver_{}_parsed", prefix, volume),
            gold: format!("{}.gold_{}_chunked", prefix, volume),
            index: format!("{}.gold_{}_chunked_index", prefix, volume),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            host: default_workspace_host(),
            token_env: default_token_env(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            catalog: String::new(),
            schema: String::new(),
            volume: String::new(),
            root: None,
            glob: default_source_glob(),
        }
    }
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        Self {
            endpoint_name: String::new(),
            pipeline_type: default_pipeline_type(),
            k: default_retrieval_k(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint_name: default_embedding_endpoint(),
            task: default_embedding_task(),
            context_window_tokens: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            catalog: String::new(),
            schema: String::new(),
            name: String::new(),
            code_path: String::new(),
            config_path: None,
            experiment_id: String::new(),
            workload_size: default_workload_size(),
            scale_to_zero: default_scale_to_zero(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size_tokens: default_chunk_size_tokens(),
            overlap_tokens: default_chunk_overlap_tokens(),
            tokenizer: default_tokenizer(),
        }
    }
}

fn check_identifier(field: &str, value: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9_\-]+$")
        .map_err(|e| Error::Other(format!("Invalid identifier pattern: {}", e)))?;
    if value.is_empty() || pattern.is_match(value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} `{}` may only contain letters, digits, '_' and '-'",
            field, value
        )))
    }
}

impl Config {
    /// Get the default base directory for medallion (~/.medallion)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".medallion")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("tables.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("tables.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Access token from the configured environment variable
    pub fn workspace_token(&self) -> Option<String> {
        std::env::var(&self.workspace.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    /// Structural validation, run on every load
    pub fn validate(&self) -> Result<()> {
        if self.chunk.size_tokens == 0 {
            return Err(Error::Config(
                "chunk.size_tokens must be greater than 0".to_string(),
            ));
        }

        if self.chunk.overlap_tokens >= self.chunk.size_tokens {
            return Err(Error::Config(
                "chunk.overlap_tokens must be < chunk.size_tokens".to_string(),
            ));
        }

        check_identifier("source.catalog", &self.source.catalog)?;
        check_identifier("source.schema", &self.source.schema)?;
        check_identifier("source.volume", &self.source.volume)?;

        match self.vector_search.pipeline_type.as_str() {
            "TRIGGERED" | "CONTINUOUS" => {}
            other => {
                return Err(Error::Config(format!(
                    "vector_search.pipeline_type must be TRIGGERED or CONTINUOUS, got `{}`",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Inputs every pipeline run needs before touching any table
    pub fn require_pipeline_inputs(&self) -> Result<()> {
        if self.vector_search.endpoint_name.trim().is_empty() {
            return Err(Error::Config(
                "Please select a Vector Search endpoint to continue (vector_search.endpoint_name)."
                    .to_string(),
            ));
        }

        if self.source.catalog.is_empty() || self.source.schema.is_empty() {
            return Err(Error::Config(
                "Please select a UC Catalog & Schema to continue (source.catalog, source.schema)."
                    .to_string(),
            ));
        }

        if self.source.volume.is_empty() {
            return Err(Error::Config(
                "Please select a source UC Volume w/ PDF files to continue (source.volume)."
                    .to_string(),
            ));
        }

        if self.embedding.endpoint_name.trim().is_empty() {
            return Err(Error::Config(
                "Please set an embedding endpoint to continue (embedding.endpoint_name)."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Names of the bronze, silver and gold tables and the index
    pub fn table_names(&self) -> TableNames {
        TableNames::new(&self.source.catalog, &self.source.schema, &self.source.volume)
    }

    /// Directory the ingestion stage scans
    pub fn source_root(&self) -> PathBuf {
        self.source.root.clone().unwrap_or_else(|| {
            PathBuf::from("/Volumes")
                .join(&self.source.catalog)
                .join(&self.source.schema)
                .join(&self.source.volume)
        })
    }

    /// Context window of the embedding endpoint, when known
    pub fn context_window_tokens(&self) -> Option<usize> {
        self.embedding
            .context_window_tokens
            .or_else(|| known_context_window(&self.embedding.endpoint_name))
    }

    /// Whether chunk size plus overlap exceeds the embedding context window
    pub fn chunk_exceeds_context_window(&self) -> Option<usize> {
        let window = self.context_window_tokens()?;
        if self.chunk.size_tokens + self.chunk.overlap_tokens > window {
            Some(window)
        } else {
            None
        }
    }

    /// Browser URL of a table in the workspace data explorer
    pub fn table_url(&self, table_fqdn: &str) -> String {
        let path = table_fqdn.split('.').collect::<Vec<_>>().join("/");
        let host = self.workspace.host.trim_end_matches('/');
        let scheme = if host.contains("://") { "" } else { "https://" };
        format!("{}{}/explore/data/{}", scheme, host, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pipeline_config() -> Config {
        let mut config = Config::default();
        config.source.catalog = "main".to_string();
        config.source.schema = "rag".to_string();
        config.source.volume = "pdfs".to_string();
        config.vector_search.endpoint_name = "vs-endpoint".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk.size_tokens, 425);
        assert_eq!(config.chunk.overlap_tokens, 75);
        assert_eq!(config.embedding.endpoint_name, "databricks-bge-large-en");
        assert_eq!(config.source.glob, "*.pdf");
        assert_eq!(config.model.workload_size, "Small");
        assert!(config.model.scale_to_zero);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = pipeline_config();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.chunk.size_tokens = 300;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.chunk.size_tokens, 300);
        assert_eq!(loaded.source.volume, "pdfs");
        assert_eq!(loaded.paths.db_file, tmp.path().join("tables.db"));
    }

    #[test]
    fn test_load_from_validates() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[chunk]\nsize_tokens = 100\noverlap_tokens = 100\n",
        )
        .unwrap();

        let err = Config::load_from(Some(tmp.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Config::load(&tmp.path().join("config.toml")).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.chunk.overlap_tokens = config.chunk.size_tokens;
        assert!(config.validate().is_err());

        config.chunk.overlap_tokens = 10;
        assert!(config.validate().is_ok());

        config.source.volume = "bad volume".to_string();
        assert!(config.validate().is_err());

        config.source.volume = "pdfs".to_string();
        config.vector_search.pipeline_type = "HOURLY".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_inputs_required() {
        let mut config = pipeline_config();
        assert!(config.require_pipeline_inputs().is_ok());

        config.vector_search.endpoint_name.clear();
        let err = config.require_pipeline_inputs().unwrap_err();
        assert!(err.to_string().contains("Vector Search endpoint"));

        let mut config = pipeline_config();
        config.source.schema.clear();
        let err = config.require_pipeline_inputs().unwrap_err();
        assert!(err.to_string().contains("Catalog & Schema"));
    }

    #[test]
    fn test_table_names_follow_volume_convention() {
        let names = pipeline_config().table_names();
        assert_eq!(names.bronze, "main.rag.bronze_pdfs_raw");
        assert_eq!(names.silver, "main.rag.silver_pdfs_parsed");
        assert_eq!(names.gold, "main.rag.gold_pdfs_chunked");
        assert_eq!(names.index, "main.rag.gold_pdfs_chunked_index");
    }

    #[test]
    fn test_source_root_defaults_to_volume_path() {
        let mut config = pipeline_config();
        assert_eq!(config.source_root(), PathBuf::from("/Volumes/main/rag/pdfs"));

        config.source.root = Some(PathBuf::from("/tmp/pdfs"));
        assert_eq!(config.source_root(), PathBuf::from("/tmp/pdfs"));
    }

    #[test]
    fn test_context_window_warning_threshold() {
        let mut config = pipeline_config();
        // 425 + 75 fits the 512-token BGE window
        assert_eq!(config.chunk_exceeds_context_window(), None);

        config.chunk.size_tokens = 500;
        assert_eq!(config.chunk_exceeds_context_window(), Some(512));

        config.embedding.endpoint_name = "custom-embeddings".to_string();
        assert_eq!(config.chunk_exceeds_context_window(), None);

        config.embedding.context_window_tokens = Some(256);
        assert_eq!(config.chunk_exceeds_context_window(), Some(256));
    }

    #[test]
    fn test_table_url() {
        let mut config = pipeline_config();
        config.workspace.host = "https://adb-1.azuredatabricks.net/".to_string();
        assert_eq!(
            config.table_url("main.rag.gold_pdfs_chunked"),
            "https://adb-1.azuredatabricks.net/explore/data/main/rag/gold_pdfs_chunked"
        );
    }
}
