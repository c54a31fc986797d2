//! Chain model lifecycle: log, register, deploy

use super::{Empty, WorkspaceClient};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Artifact path the chain is logged under
pub const CHAIN_ARTIFACT_PATH: &str = "chain";

/// Credential type whose uploads need the block blob header
const AZURE_SAS_URI: &str = "AZURE_SAS_URI";

/// Three-part Unity Catalog model name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelName {
    pub catalog: String,
    pub schema: String,
    pub name: String,
}

impl ModelName {
    /// Parse `catalog.schema.model`; exactly three non-empty parts
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('.').collect();
        match parts.as_slice() {
            [catalog, schema, name]
                if !catalog.is_empty() && !schema.is_empty() && !name.is_empty() =>
            {
                Ok(Self {
                    catalog: catalog.to_string(),
                    schema: schema.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(Error::InvalidModelName(value.to_string())),
        }
    }

    /// Serving endpoint created for this model's deployments
    pub fn endpoint_name(&self) -> String {
        format!("agents_{}-{}-{}", self.catalog, self.schema, self.name)
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.name)
    }
}

/// Chain to log into an experiment run
///
/// `code_path` (a file or a directory) and `config_path` are local paths;
/// their contents become the run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSource {
    pub experiment_id: String,
    pub code_path: String,
    pub config_path: Option<String>,
}

/// Result of logging a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedModel {
    pub run_id: String,
    pub model_uri: String,
}

/// A registered model version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModelVersion {
    pub name: String,
    pub version: String,
}

/// Serving options for a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedEntityOptions {
    pub workload_size: String,
    pub scale_to_zero: bool,
}

/// A model version served by an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub model_name: String,
    pub model_version: String,
    pub endpoint_name: String,
    pub review_app_url: Option<String>,
}

/// Model registry and serving operations
#[async_trait]
pub trait ModelPlatform: Send + Sync {
    async fn log_model(&self, source: &ChainSource) -> Result<LoggedModel>;

    async fn set_run_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    async fn register_model(&self, model_uri: &str, name: &ModelName) -> Result<RegisteredModelVersion>;

    async fn deploy_model(
        &self,
        name: &ModelName,
        version: &str,
        options: &ServedEntityOptions,
    ) -> Result<Deployment>;

    async fn list_deployments(&self) -> Result<Vec<Deployment>>;
}

/// Deployments of `name`, optionally only of one version
pub fn filter_deployments(
    deployments: Vec<Deployment>,
    name: &ModelName,
    version: Option<&str>,
) -> Vec<Deployment> {
    let full_name = name.to_string();
    deployments
        .into_iter()
        .filter(|d| d.model_name == full_name)
        .filter(|d| version.map_or(true, |v| d.model_version == v))
        .collect()
}

#[derive(Deserialize)]
struct RunResponse {
    run: RunBody,
}

#[derive(Deserialize)]
struct RunBody {
    info: RunInfoBody,
}

#[derive(Deserialize)]
struct RunInfoBody {
    run_id: String,
    #[serde(default)]
    artifact_uri: Option<String>,
}

#[derive(Deserialize)]
struct ArtifactCredentialsResponse {
    #[serde(default)]
    credential_infos: Vec<ArtifactCredentialBody>,
}

#[derive(Deserialize)]
struct ArtifactCredentialBody {
    path: String,
    signed_uri: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    headers: Vec<HttpHeaderBody>,
}

#[derive(Deserialize)]
struct HttpHeaderBody {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersionBody,
}

#[derive(Deserialize)]
struct ModelVersionBody {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct ServingEndpointsResponse {
    #[serde(default)]
    endpoints: Vec<ServingEndpointBody>,
}

#[derive(Deserialize)]
struct ServingEndpointBody {
    name: String,
    #[serde(default)]
    config: Option<EndpointConfigBody>,
    #[serde(default)]
    tags: Vec<TagBody>,
}

#[derive(Deserialize)]
struct EndpointConfigBody {
    #[serde(default)]
    served_entities: Vec<ServedEntityBody>,
}

#[derive(Deserialize)]
struct ServedEntityBody {
    #[serde(default)]
    entity_name: Option<String>,
    #[serde(default)]
    entity_version: Option<String>,
}

#[derive(Deserialize)]
struct TagBody {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

/// Endpoint tag carrying the review app URL
const REVIEW_APP_TAG: &str = "review_app_url";

impl ServingEndpointBody {
    fn review_app_url(&self) -> Option<String> {
        self.tags
            .iter()
            .find(|t| t.key == REVIEW_APP_TAG)
            .and_then(|t| t.value.clone())
    }

    fn into_deployments(self) -> Vec<Deployment> {
        let review_app_url = self.review_app_url();
        let endpoint_name = self.name;
        self.config
            .map(|c| c.served_entities)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entity| {
                Some(Deployment {
                    model_name: entity.entity_name?,
                    model_version: entity.entity_version?,
                    endpoint_name: endpoint_name.clone(),
                    review_app_url: review_app_url.clone(),
                })
            })
            .collect()
    }
}

/// A local file to upload, keyed by its artifact path under the run
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChainArtifact {
    artifact_path: String,
    local_path: PathBuf,
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))
}

/// Local chain files and the flavor fields that point at them
///
/// Code lands under `chain/code/`, the config directly under `chain/`.
fn chain_artifacts(source: &ChainSource) -> Result<(Vec<ChainArtifact>, serde_json::Value)> {
    let code = Path::new(&source.code_path);
    let mut artifacts = Vec::new();
    let mut flavor = serde_json::Map::new();

    if code.is_file() {
        let name = file_name(code)?;
        flavor.insert("code_path".to_string(), json!(format!("code/{}", name)));
        artifacts.push(ChainArtifact {
            artifact_path: format!("{}/code/{}", CHAIN_ARTIFACT_PATH, name),
            local_path: code.to_path_buf(),
        });
    } else if code.is_dir() {
        flavor.insert("code_path".to_string(), json!("code"));
        let walker = WalkBuilder::new(code).standard_filters(false).hidden(true).build();
        for entry in walker {
            let entry = entry.map_err(|e| Error::Other(format!("Reading chain code failed: {}", e)))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(code)
                .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            artifacts.push(ChainArtifact {
                artifact_path: format!("{}/code/{}", CHAIN_ARTIFACT_PATH, relative),
                local_path: entry.into_path(),
            });
        }
        artifacts.sort_by(|a, b| a.artifact_path.cmp(&b.artifact_path));
    } else {
        return Err(Error::Config(format!(
            "model.code_path {} is not a local file or directory",
            source.code_path
        )));
    }

    if let Some(config_path) = &source.config_path {
        let config = Path::new(config_path);
        if !config.is_file() {
            return Err(Error::Config(format!(
                "model.config_path {} is not a local file",
                config_path
            )));
        }
        let name = file_name(config)?;
        flavor.insert("config_path".to_string(), json!(name));
        artifacts.push(ChainArtifact {
            artifact_path: format!("{}/{}", CHAIN_ARTIFACT_PATH, name),
            local_path: config.to_path_buf(),
        });
    }

    Ok((artifacts, serde_json::Value::Object(flavor)))
}

/// Split `runs:/<run_id>/<artifact path>`
fn split_runs_uri(model_uri: &str) -> Option<(&str, &str)> {
    let rest = model_uri.strip_prefix("runs:/")?;
    let (run_id, artifact_path) = rest.split_once('/')?;
    if run_id.is_empty() || artifact_path.is_empty() {
        return None;
    }
    Some((run_id, artifact_path.trim_end_matches('/')))
}

impl WorkspaceClient {
    /// Upload files into a run's artifact store through signed write URLs
    async fn upload_artifacts(&self, run_id: &str, files: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut query = vec![("run_id", run_id)];
        query.extend(files.iter().map(|(path, _)| ("path", path.as_str())));
        let response: ArtifactCredentialsResponse = self
            .get_with_query("/api/2.0/mlflow/artifacts/credentials-for-write", &query)
            .await?;

        let mut credentials: HashMap<String, ArtifactCredentialBody> = response
            .credential_infos
            .into_iter()
            .map(|c| (c.path.clone(), c))
            .collect();

        for (path, bytes) in files {
            let credential = credentials.remove(&path).ok_or_else(|| {
                Error::Other(format!("No write credential returned for artifact {}", path))
            })?;
            let mut headers: Vec<(String, String)> = credential
                .headers
                .into_iter()
                .map(|h| (h.name, h.value))
                .collect();
            if credential.kind == AZURE_SAS_URI {
                headers.push(("x-ms-blob-type".to_string(), "BlockBlob".to_string()));
            }
            debug!("Uploading {} ({} bytes)", path, bytes.len());
            self.upload_signed(&credential.signed_uri, &headers, bytes).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ModelPlatform for WorkspaceClient {
    async fn log_model(&self, source: &ChainSource) -> Result<LoggedModel> {
        let (artifacts, flavor) = chain_artifacts(source)?;
        let mut files = Vec::with_capacity(artifacts.len() + 1);
        for artifact in &artifacts {
            files.push((artifact.artifact_path.clone(), std::fs::read(&artifact.local_path)?));
        }

        let created: RunResponse = self
            .post(
                "/api/2.0/mlflow/runs/create",
                &json!({
                    "experiment_id": source.experiment_id,
                    "start_time": Utc::now().timestamp_millis(),
                    "tags": [{"key": "mlflow.source.name", "value": source.code_path}],
                }),
            )
            .await?;
        let run_id = created.run.info.run_id;
        debug!("Created run {}", run_id);

        let model_json = json!({
            "artifact_path": CHAIN_ARTIFACT_PATH,
            "run_id": run_id,
            "utc_time_created": Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            "flavors": { "langchain": flavor },
        });
        files.push((
            format!("{}/MLmodel", CHAIN_ARTIFACT_PATH),
            serde_json::to_vec_pretty(&model_json)?,
        ));
        self.upload_artifacts(&run_id, files).await?;

        let _: Empty = self
            .post(
                "/api/2.0/mlflow/runs/log-model",
                &json!({ "run_id": run_id, "model_json": model_json.to_string() }),
            )
            .await?;

        let model_uri = format!("runs:/{}/{}", run_id, CHAIN_ARTIFACT_PATH);
        info!("Logged chain {} as {}", source.code_path, model_uri);
        Ok(LoggedModel { run_id, model_uri })
    }

    async fn set_run_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        let _: Empty = self
            .post(
                "/api/2.0/mlflow/runs/set-tag",
                &json!({ "run_id": run_id, "key": key, "value": value }),
            )
            .await?;
        Ok(())
    }

    async fn register_model(&self, model_uri: &str, name: &ModelName) -> Result<RegisteredModelVersion> {
        let full_name = name.to_string();
        let created: Result<Empty> = self
            .post(
                "/api/2.0/mlflow/unity-catalog/registered-models/create",
                &json!({
                    "name": full_name,
                    "catalog_name": name.catalog,
                    "schema_name": name.schema,
                }),
            )
            .await;
        match created {
            Ok(_) => info!("Created registered model {}", full_name),
            Err(Error::Api { code, .. }) if code == "RESOURCE_ALREADY_EXISTS" => {
                debug!("Registered model {} already exists", full_name)
            }
            Err(e) => return Err(e),
        }

        // Unity Catalog versions point at storage, not at the runs:/ alias
        let mut body = json!({ "name": full_name, "source": model_uri });
        if let Some((run_id, artifact_path)) = split_runs_uri(model_uri) {
            let run: RunResponse = self
                .get_with_query("/api/2.0/mlflow/runs/get", &[("run_id", run_id)])
                .await?;
            let artifact_uri = run.run.info.artifact_uri.ok_or_else(|| {
                Error::Other(format!("Run {} has no artifact location", run_id))
            })?;
            body["source"] = json!(format!(
                "{}/{}",
                artifact_uri.trim_end_matches('/'),
                artifact_path
            ));
            body["run_id"] = json!(run_id);
        }
        debug!("Registering {} from {}", full_name, body["source"]);

        let response: ModelVersionResponse = self
            .post("/api/2.0/mlflow/unity-catalog/model-versions/create", &body)
            .await?;

        Ok(RegisteredModelVersion {
            name: response.model_version.name,
            version: response.model_version.version,
        })
    }

    async fn deploy_model(
        &self,
        name: &ModelName,
        version: &str,
        options: &ServedEntityOptions,
    ) -> Result<Deployment> {
        let endpoint_name = name.endpoint_name();
        let served_entities = json!([{
            "entity_name": name.to_string(),
            "entity_version": version,
            "workload_size": options.workload_size,
            "scale_to_zero_enabled": options.scale_to_zero,
        }]);

        let endpoint_path = format!("/api/2.0/serving-endpoints/{}", endpoint_name);
        let endpoint = match self.get::<ServingEndpointBody>(&endpoint_path).await {
            Ok(existing) => {
                info!("Updating serving endpoint {}", existing.name);
                let _: Empty = self
                    .put(
                        &format!("{}/config", endpoint_path),
                        &json!({ "served_entities": served_entities }),
                    )
                    .await?;
                existing
            }
            Err(Error::ResourceNotFound(_)) => {
                info!("Creating serving endpoint {}", endpoint_name);
                self.post(
                    "/api/2.0/serving-endpoints",
                    &json!({
                        "name": endpoint_name,
                        "config": { "served_entities": served_entities },
                    }),
                )
                .await?
            }
            Err(e) => return Err(e),
        };

        Ok(Deployment {
            model_name: name.to_string(),
            model_version: version.to_string(),
            review_app_url: endpoint.review_app_url(),
            endpoint_name: endpoint.name,
        })
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let response: ServingEndpointsResponse = self.get("/api/2.0/serving-endpoints").await?;
        Ok(response
            .endpoints
            .into_iter()
            .flat_map(ServingEndpointBody::into_deployments)
            .collect())
    }
}
