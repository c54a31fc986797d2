//! Model serving endpoints

use super::WorkspaceClient;
use crate::config::DEFAULT_BGE_ENDPOINT;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A serving endpoint as reported by the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingEndpoint {
    pub name: String,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub state: Option<EndpointState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    #[serde(default)]
    pub ready: Option<String>,
    #[serde(default)]
    pub config_update: Option<String>,
}

#[async_trait]
pub trait ServingEndpoints: Send + Sync {
    async fn get_endpoint(&self, name: &str) -> Result<ServingEndpoint>;
}

#[async_trait]
impl ServingEndpoints for WorkspaceClient {
    async fn get_endpoint(&self, name: &str) -> Result<ServingEndpoint> {
        self.get(&format!("/api/2.0/serving-endpoints/{}", name)).await
    }
}

/// Check that the embedding endpoint exists and serves the expected task
pub async fn validate_embedding_endpoint(
    service: &dyn ServingEndpoints,
    name: &str,
    expected_task: &str,
) -> Result<ServingEndpoint> {
    let endpoint = match service.get_endpoint(name).await {
        Ok(endpoint) => endpoint,
        Err(Error::ResourceNotFound(_)) => {
            let mut message = format!("Model serving endpoint {} does not exist.", name);
            if name == DEFAULT_BGE_ENDPOINT {
                message.push_str(
                    " This is likely because Foundation Model APIs are not available in your region. \
                     Deploy the BGE embedding model with provisioned throughput and set embedding.endpoint_name.",
                );
            } else {
                message.push_str(" Verify your endpoint is properly configured.");
            }
            return Err(Error::EndpointNotFound(message));
        }
        Err(e) => return Err(e),
    };

    let actual = endpoint.task.clone().unwrap_or_default();
    if actual != expected_task {
        return Err(Error::EndpointTask {
            endpoint: name.to_string(),
            expected: expected_task.to_string(),
            actual: if actual.is_empty() {
                "unknown".to_string()
            } else {
                actual
            },
        });
    }

    info!("Embedding model endpoint: `{}`", name);
    Ok(endpoint)
}
