//! Model lifecycle commands: log, register, deploy, list deployments

use crate::config::Config;
use crate::databricks::{
    filter_deployments, ChainSource, Deployment, LoggedModel, ModelName, ModelPlatform,
    RegisteredModelVersion, ServedEntityOptions,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Run tag naming the config variant a run was logged with
pub const CONFIG_NAME_TAG: &str = "config_name";

/// One named chain configuration to log as its own run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigVariant {
    pub name: String,
    pub config: serde_json::Value,
}

/// A logged chain, with the variant it was logged with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedChain {
    pub config_name: Option<String>,
    pub config_path: Option<String>,
    pub run_id: String,
    pub model_uri: String,
}

impl LoggedChain {
    fn new(logged: LoggedModel, config_name: Option<String>, config_path: Option<String>) -> Self {
        Self {
            config_name,
            config_path,
            run_id: logged.run_id,
            model_uri: logged.model_uri,
        }
    }
}

/// Outcome of a release (log, register, deploy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseReport {
    pub logged: LoggedChain,
    pub registered: Option<RegisteredModelVersion>,
    pub registration_error: Option<String>,
    pub deployment: Option<Deployment>,
}

/// Three-part model name from the config, or an explicit override
pub fn resolve_model_name(config: &Config, name: Option<&str>) -> Result<ModelName> {
    match name {
        Some(name) => ModelName::parse(name),
        None => ModelName::parse(&format!(
            "{}.{}.{}",
            config.model.catalog, config.model.schema, config.model.name
        )),
    }
}

fn chain_source(config: &Config, config_path: Option<String>) -> Result<ChainSource> {
    if config.model.experiment_id.trim().is_empty() {
        return Err(Error::Config(
            "model.experiment_id must be set to log a chain".to_string(),
        ));
    }
    if config.model.code_path.trim().is_empty() {
        return Err(Error::Config(
            "model.code_path must point at the chain code".to_string(),
        ));
    }
    Ok(ChainSource {
        experiment_id: config.model.experiment_id.clone(),
        code_path: config.model.code_path.clone(),
        config_path,
    })
}

/// Load config variants from a JSON file: `[{"name": ..., "config": {...}}, ...]`
pub fn load_variants(path: &Path) -> Result<Vec<ConfigVariant>> {
    let content = std::fs::read_to_string(path)?;
    let variants: Vec<ConfigVariant> = serde_json::from_str(&content)?;
    if variants.is_empty() {
        return Err(Error::Config(format!(
            "{} does not contain any config variants",
            path.display()
        )));
    }
    Ok(variants)
}

/// File a variant's config is written to, next to the chain config
///
/// Variants are written as JSON, so the file always carries a `.json`
/// extension whatever the chain config's own format is.
pub fn variant_config_path(chain_config: &Path, variant: &str) -> PathBuf {
    let stem = chain_config
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "config".to_string());
    chain_config.with_file_name(format!("{}_{}.json", stem, variant))
}

/// Log the chain, once per config variant when variants are given
pub async fn cmd_model_log(
    config: &Config,
    platform: &dyn ModelPlatform,
    variants: &[ConfigVariant],
) -> Result<Vec<LoggedChain>> {
    if variants.is_empty() {
        let source = chain_source(config, config.model.config_path.clone())?;
        let logged = platform.log_model(&source).await?;
        info!("MLflow Run: {}", logged.run_id);
        return Ok(vec![LoggedChain::new(logged, None, source.config_path)]);
    }

    let chain_config = config.model.config_path.as_deref().ok_or_else(|| {
        Error::Config("model.config_path must be set to log config variants".to_string())
    })?;

    let mut logged_chains = Vec::with_capacity(variants.len());
    for variant in variants {
        info!("Config: {}", variant.name);
        let path = variant_config_path(Path::new(chain_config), &variant.name);
        std::fs::write(&path, serde_json::to_string_pretty(&variant.config)?)?;

        let path = path.display().to_string();
        let source = chain_source(config, Some(path.clone()))?;
        let logged = platform.log_model(&source).await?;
        platform
            .set_run_tag(&logged.run_id, CONFIG_NAME_TAG, &variant.name)
            .await?;
        info!("MLflow Run: {}", logged.run_id);

        logged_chains.push(LoggedChain::new(logged, Some(variant.name.clone()), Some(path)));
    }

    Ok(logged_chains)
}

/// Register a logged chain under a three-part name
pub async fn cmd_model_register(
    config: &Config,
    platform: &dyn ModelPlatform,
    model_uri: &str,
    name: Option<&str>,
) -> Result<RegisteredModelVersion> {
    let name = resolve_model_name(config, name)?;
    info!("Attempting to register model with FQDN: {}", name);
    let registered = platform.register_model(model_uri, &name).await?;
    info!("Model registered successfully: {} version {}", registered.name, registered.version);
    Ok(registered)
}

/// Deploy a registered model version
pub async fn cmd_model_deploy(
    config: &Config,
    platform: &dyn ModelPlatform,
    name: Option<&str>,
    version: &str,
) -> Result<Deployment> {
    let name = resolve_model_name(config, name)?;
    let options = ServedEntityOptions {
        workload_size: config.model.workload_size.clone(),
        scale_to_zero: config.model.scale_to_zero,
    };
    platform.deploy_model(&name, version, &options).await
}

/// Deployments of a model, optionally of one version
pub async fn cmd_model_deployments(
    config: &Config,
    platform: &dyn ModelPlatform,
    name: Option<&str>,
    version: Option<&str>,
) -> Result<Vec<Deployment>> {
    let name = resolve_model_name(config, name)?;
    let deployments = platform.list_deployments().await?;
    Ok(filter_deployments(deployments, &name, version))
}

/// Log, register and deploy the chain
///
/// A registration failure is reported and ends the release without deploying;
/// every other failure propagates.
pub async fn cmd_model_release(config: &Config, platform: &dyn ModelPlatform) -> Result<ReleaseReport> {
    let name = resolve_model_name(config, None)?;

    let mut logged = cmd_model_log(config, platform, &[]).await?;
    let logged = logged.remove(0);

    let registered = match cmd_model_register(config, platform, &logged.model_uri, None).await {
        Ok(registered) => registered,
        Err(e) => {
            error!("Failed to register model: {}", e);
            return Ok(ReleaseReport {
                logged,
                registered: None,
                registration_error: Some(e.to_string()),
                deployment: None,
            });
        }
    };

    let deployment =
        cmd_model_deploy(config, platform, Some(&name.to_string()), &registered.version).await?;

    Ok(ReleaseReport {
        logged,
        registered: Some(registered),
        registration_error: None,
        deployment: Some(deployment),
    })
}

/// Human-readable deployment summary
pub fn format_deployment_message(deployment: &Deployment, browser_host: &str) -> String {
    format!(
        "Deployment of {} version {} initiated. This can take up to 15 minutes and the Review App & REST API will not work until this deployment finishes.\n\n  View status: https://{}/ml/endpoints/{}\n  Review App: {}",
        deployment.model_name,
        deployment.model_version,
        browser_host,
        deployment.endpoint_name,
        deployment.review_app_url.as_deref().unwrap_or("not available yet")
    )
}

/// Print logged runs to console
pub fn print_logged_chains(chains: &[LoggedChain]) {
    for chain in chains {
        match &chain.config_name {
            Some(name) => println!("Config {}: MLflow Run {} ({})", name, chain.run_id, chain.model_uri),
            None => println!("MLflow Run: {} ({})", chain.run_id, chain.model_uri),
        }
    }
}

/// Print deployments to console
pub fn print_deployments(deployments: &[Deployment], browser_host: &str) {
    if deployments.is_empty() {
        println!("No deployments found.");
        return;
    }
    for deployment in deployments {
        println!("{}\n", format_deployment_message(deployment, browser_host));
    }
}

/// Print a release report to console
pub fn print_release(report: &ReleaseReport, browser_host: &str) {
    print_logged_chains(std::slice::from_ref(&report.logged));
    if let Some(error) = &report.registration_error {
        println!("Failed to register model: {}", error);
        return;
    }
    if let Some(registered) = &report.registered {
        println!("Registered {} version {}", registered.name, registered.version);
    }
    if let Some(deployment) = &report.deployment {
        println!("{}", format_deployment_message(deployment, browser_host));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::databricks::test_support::FakePlatform;
    use tempfile::TempDir;

    fn model_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.model.catalog = "main".to_string();
        config.model.schema = "rag".to_string();
        config.model.name = "chain".to_string();
        config.model.experiment_id = "42".to_string();
        config.model.code_path = "/Workspace/Users/me/chain".to_string();
        config.model.config_path = Some(dir.join("chain_config.yaml").display().to_string());
        config
    }

    #[tokio::test]
    async fn test_register_rejects_bad_name_before_calling_platform() {
        let tmp = TempDir::new().unwrap();
        let config = model_config(tmp.path());
        let platform = FakePlatform::default();

        let err = cmd_model_register(&config, &platform, "runs:/r/chain", Some("rag.chain"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidModelName(_)));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_log_variants_writes_configs_and_tags_runs() {
        let tmp = TempDir::new().unwrap();
        let config = model_config(tmp.path());
        let platform = FakePlatform::default();
        let variants = vec![
            ConfigVariant {
                name: "config_1".to_string(),
                config: serde_json::json!({"sample_param": "do this thing"}),
            },
            ConfigVariant {
                name: "config_2".to_string(),
                config: serde_json::json!({"sample_param": "do that thing"}),
            },
        ];

        let logged = cmd_model_log(&config, &platform, &variants).await.unwrap();

        assert_eq!(logged.len(), 2);
        let written = tmp.path().join("chain_config_config_2.json");
        let content: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
        assert_eq!(content["sample_param"], "do that thing");

        let tags = platform.tags.lock().unwrap().clone();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], (logged[0].run_id.clone(), "config_name".to_string(), "config_1".to_string()));
    }

    #[tokio::test]
    async fn test_release_deploys_registered_version() {
        let tmp = TempDir::new().unwrap();
        let config = model_config(tmp.path());
        let platform = FakePlatform::default();

        let report = cmd_model_release(&config, &platform).await.unwrap();

        let deployment = report.deployment.unwrap();
        assert_eq!(deployment.model_name, "main.rag.chain");
        assert_eq!(deployment.model_version, "1");
        let calls = platform.calls();
        assert!(calls[1].starts_with("register:runs:/"));
        assert_eq!(calls[2], "deploy:main.rag.chain:1");
    }

    #[tokio::test]
    async fn test_release_stops_after_registration_failure() {
        let tmp = TempDir::new().unwrap();
        let config = model_config(tmp.path());
        let platform = FakePlatform {
            fail_register: true,
            ..Default::default()
        };

        let report = cmd_model_release(&config, &platform).await.unwrap();

        assert!(report.registered.is_none());
        assert!(report.deployment.is_none());
        assert!(report.registration_error.unwrap().contains("CREATE MODEL"));
        assert!(!platform.calls().iter().any(|c| c.starts_with("deploy:")));
    }

    #[test]
    fn test_deployment_message() {
        let deployment = Deployment {
            model_name: "main.rag.chain".to_string(),
            model_version: "2".to_string(),
            endpoint_name: "agents_main-rag-chain".to_string(),
            review_app_url: None,
        };
        let message = format_deployment_message(&deployment, "adb-1.azuredatabricks.net");
        assert!(message.starts_with("Deployment of main.rag.chain version 2 initiated."));
        assert!(message.contains("View status: https://adb-1.azuredatabricks.net/ml/endpoints/agents_main-rag-chain"));
    }

    #[test]
    fn test_variant_config_path() {
        let path = variant_config_path(Path::new("/tmp/x/2_hello_world_config.yaml"), "config_1");
        assert_eq!(path, PathBuf::from("/tmp/x/2_hello_world_config_config_1.json"));

        let path = variant_config_path(Path::new("chain_config.json"), "fast");
        assert_eq!(path, PathBuf::from("chain_config_fast.json"));
    }
}
