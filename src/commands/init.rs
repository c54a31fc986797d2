//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tables::TableStore;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub config_path: PathBuf,
    pub force: bool,
    pub host: Option<String>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub volume: Option<String>,
    pub vector_search_endpoint: Option<String>,
}

/// Write a default configuration file and create the table database
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        config_path,
        force,
        host,
        catalog,
        schema,
        volume,
        vector_search_endpoint,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite it.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    let base_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_base_dir);
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path.clone();

    if let Some(host) = host {
        config.workspace.host = host;
    }
    if let Some(catalog) = catalog {
        config.source.catalog = catalog.clone();
        config.model.catalog = catalog;
    }
    if let Some(schema) = schema {
        config.source.schema = schema.clone();
        config.model.schema = schema;
    }
    if let Some(volume) = volume {
        config.source.volume = volume;
    }
    if let Some(endpoint) = vector_search_endpoint {
        config.vector_search.endpoint_name = endpoint;
    }

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config_path);

    TableStore::open(&config.paths.db_file).await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

/// Print what init wrote
pub fn print_init(config: &Config) {
    println!("\n✓ medallion initialized\n");
    println!("Configuration: {}", config.paths.config_file.display());
    println!("Database: {}", config.paths.db_file.display());
    if config.require_pipeline_inputs().is_err() {
        println!("\nEdit the configuration to set the source volume and Vector Search endpoint before `medallion run`.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_writes_config_and_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        let options = InitOptions {
            config_path: config_path.clone(),
            catalog: Some("main".to_string()),
            schema: Some("rag".to_string()),
            volume: Some("pdfs".to_string()),
            ..Default::default()
        };

        let config = cmd_init(options.clone()).await.unwrap();
        assert!(config_path.exists());
        assert!(config.paths.db_file.exists());

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.source.volume, "pdfs");
        assert_eq!(loaded.model.catalog, "main");
        assert_eq!(loaded.chunk.size_tokens, 425);

        assert!(matches!(cmd_init(options.clone()).await, Err(Error::Config(_))));

        let forced = InitOptions {
            force: true,
            volume: Some("other".to_string()),
            ..options
        };
        let config = cmd_init(forced).await.unwrap();
        assert_eq!(config.source.volume, "other");
    }
}
