//! Vector search indexes synced to the gold table

use super::{Empty, WorkspaceClient};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Column the index uses as its primary key
pub const PRIMARY_KEY_COLUMN: &str = "chunk_id";

/// Column embedded by the index
pub const EMBEDDING_SOURCE_COLUMN: &str = "chunked_text";

/// Column identifying the source document
pub const DOCUMENT_SOURCE_COLUMN: &str = "doc_uri";

/// Everything needed to create a delta-sync index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub endpoint_name: String,
    pub primary_key: String,
    pub source_table: String,
    pub pipeline_type: String,
    pub embedding_source_column: String,
    pub embedding_model_endpoint_name: String,
}

impl IndexSpec {
    /// Index over the configured gold table
    pub fn from_config(config: &Config) -> Self {
        let tables = config.table_names();
        Self {
            name: tables.index,
            endpoint_name: config.vector_search.endpoint_name.clone(),
            primary_key: PRIMARY_KEY_COLUMN.to_string(),
            source_table: tables.gold,
            pipeline_type: config.vector_search.pipeline_type.clone(),
            embedding_source_column: EMBEDDING_SOURCE_COLUMN.to_string(),
            embedding_model_endpoint_name: config.embedding.endpoint_name.clone(),
        }
    }
}

/// Index state as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub name: String,
    pub ready: bool,
    pub message: Option<String>,
    pub indexed_row_count: Option<i64>,
}

/// Vector search endpoint and its state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSearchEndpoint {
    pub name: String,
    pub state: Option<String>,
}

impl VectorSearchEndpoint {
    pub fn is_online(&self) -> bool {
        self.state.as_deref() == Some("ONLINE")
    }
}

/// What the index step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSyncOutcome {
    /// Existing index asked to resync
    Synced,
    /// Index did not exist and was created
    Created,
}

impl std::fmt::Display for IndexSyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexSyncOutcome::Synced => write!(f, "synced"),
            IndexSyncOutcome::Created => write!(f, "created"),
        }
    }
}

/// Managed vector search operations
#[async_trait]
pub trait VectorIndexService: Send + Sync {
    /// Trigger a sync of an existing index; `ResourceNotFound` when it does not exist
    async fn sync_index(&self, name: &str) -> Result<()>;

    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    async fn get_index(&self, name: &str) -> Result<IndexStatus>;

    async fn list_endpoints(&self) -> Result<Vec<VectorSearchEndpoint>>;
}

/// Sync the index, creating it only when the service reports it missing
pub async fn ensure_index(
    service: &dyn VectorIndexService,
    spec: &IndexSpec,
) -> Result<IndexSyncOutcome> {
    match service.sync_index(&spec.name).await {
        Ok(()) => {
            info!("Triggered sync of index `{}`", spec.name);
            Ok(IndexSyncOutcome::Synced)
        }
        Err(Error::ResourceNotFound(_)) => {
            info!(
                "Index `{}` does not exist, creating it on endpoint `{}`",
                spec.name, spec.endpoint_name
            );
            service.create_index(spec).await?;
            Ok(IndexSyncOutcome::Created)
        }
        Err(e) => Err(e),
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    endpoint_name: &'a str,
    primary_key: &'a str,
    index_type: &'static str,
    delta_sync_index_spec: DeltaSyncIndexSpec<'a>,
}

#[derive(Serialize)]
struct DeltaSyncIndexSpec<'a> {
    source_table: &'a str,
    pipeline_type: &'a str,
    embedding_source_columns: Vec<EmbeddingSourceColumn<'a>>,
}

#[derive(Serialize)]
struct EmbeddingSourceColumn<'a> {
    name: &'a str,
    embedding_model_endpoint_name: &'a str,
}

impl<'a> From<&'a IndexSpec> for CreateIndexRequest<'a> {
    fn from(spec: &'a IndexSpec) -> Self {
        Self {
            name: &spec.name,
            endpoint_name: &spec.endpoint_name,
            primary_key: &spec.primary_key,
            index_type: "DELTA_SYNC",
            delta_sync_index_spec: DeltaSyncIndexSpec {
                source_table: &spec.source_table,
                pipeline_type: &spec.pipeline_type,
                embedding_source_columns: vec![EmbeddingSourceColumn {
                    name: &spec.embedding_source_column,
                    embedding_model_endpoint_name: &spec.embedding_model_endpoint_name,
                }],
            },
        }
    }
}

#[derive(Deserialize)]
struct IndexResponse {
    name: String,
    #[serde(default)]
    status: Option<IndexStatusBody>,
}

#[derive(Deserialize)]
struct IndexStatusBody {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    indexed_row_count: Option<i64>,
}

#[derive(Deserialize)]
struct ListEndpointsResponse {
    #[serde(default)]
    endpoints: Vec<EndpointBody>,
}

#[derive(Deserialize)]
struct EndpointBody {
    name: String,
    #[serde(default)]
    endpoint_status: Option<EndpointStatusBody>,
}

#[derive(Deserialize)]
struct EndpointStatusBody {
    #[serde(default)]
    state: Option<String>,
}

#[async_trait]
impl VectorIndexService for WorkspaceClient {
    async fn sync_index(&self, name: &str) -> Result<()> {
        let path = format!("/api/2.0/vector-search/indexes/{}/sync", name);
        let _: Empty = self.post(&path, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let request = CreateIndexRequest::from(spec);
        let _: Empty = self.post("/api/2.0/vector-search/indexes", &request).await?;
        Ok(())
    }

    async fn get_index(&self, name: &str) -> Result<IndexStatus> {
        let path = format!("/api/2.0/vector-search/indexes/{}", name);
        let response: IndexResponse = self.get(&path).await?;
        let status = response.status;
        Ok(IndexStatus {
            name: response.name,
            ready: status.as_ref().map(|s| s.ready).unwrap_or(false),
            message: status.as_ref().and_then(|s| s.message.clone()),
            indexed_row_count: status.and_then(|s| s.indexed_row_count),
        })
    }

    async fn list_endpoints(&self) -> Result<Vec<VectorSearchEndpoint>> {
        let response: ListEndpointsResponse = self.get("/api/2.0/vector-search/endpoints").await?;
        Ok(response
            .endpoints
            .into_iter()
            .map(|e| VectorSearchEndpoint {
                name: e.name,
                state: e.endpoint_status.and_then(|s| s.state),
            })
            .collect())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeIndexService;
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec() -> IndexSpec {
        let mut config = Config::default();
        config.source.catalog = "main".to_string();
        config.source.schema = "rag".to_string();
        config.source.volume = "pdfs".to_string();
        config.vector_search.endpoint_name = "vs-endpoint".to_string();
        IndexSpec::from_config(&config)
    }

    #[test]
    fn test_spec_from_config() {
        let spec = spec();
        assert_eq!(spec.name, "main.rag.gold_pdfs_chunked_index");
        assert_eq!(spec.source_table, "main.rag.gold_pdfs_chunked");
        assert_eq!(spec.primary_key, "chunk_id");
        assert_eq!(spec.embedding_source_column, "chunked_text");
        assert_eq!(spec.embedding_model_endpoint_name, "databricks-bge-large-en");
        assert_eq!(spec.pipeline_type, "TRIGGERED");
    }

    #[tokio::test]
    async fn test_existing_index_is_synced_not_created() {
        let spec = spec();
        let fake = FakeIndexService::with_index(&spec.name);

        let outcome = ensure_index(&fake, &spec).await.unwrap();

        assert_eq!(outcome, IndexSyncOutcome::Synced);
        assert_eq!(fake.calls(), vec![format!("sync:{}", spec.name)]);
        assert!(fake.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_index_is_created_with_spec() {
        let spec = spec();
        let fake = FakeIndexService::default();

        let outcome = ensure_index(&fake, &spec).await.unwrap();

        assert_eq!(outcome, IndexSyncOutcome::Created);
        assert_eq!(
            fake.calls(),
            vec![format!("sync:{}", spec.name), format!("create:{}", spec.name)]
        );
        assert_eq!(fake.created.lock().unwrap().as_slice(), &[spec]);
    }

    #[tokio::test]
    async fn test_other_sync_errors_propagate() {
        let spec = spec();
        let fake = FakeIndexService::default();
        *fake.fail_sync_with.lock().unwrap() = Some("boom".to_string());

        let err = ensure_index(&fake, &spec).await.unwrap_err();

        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_http_create_sends_full_spec() {
        let server = MockServer::start().await;
        let spec = spec();

        Mock::given(method("POST"))
            .and(path(format!("/api/2.0/vector-search/indexes/{}/sync", spec.name)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_code": "RESOURCE_DOES_NOT_EXIST",
                "message": "Index not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/2.0/vector-search/indexes"))
            .and(body_json(json!({
                "name": "main.rag.gold_pdfs_chunked_index",
                "endpoint_name": "vs-endpoint",
                "primary_key": "chunk_id",
                "index_type": "DELTA_SYNC",
                "delta_sync_index_spec": {
                    "source_table": "main.rag.gold_pdfs_chunked",
                    "pipeline_type": "TRIGGERED",
                    "embedding_source_columns": [{
                        "name": "chunked_text",
                        "embedding_model_endpoint_name": "databricks-bge-large-en"
                    }]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = WorkspaceClient::new(&server.uri(), "t", Duration::from_secs(5)).unwrap();
        let outcome = ensure_index(&client, &spec).await.unwrap();
        assert_eq!(outcome, IndexSyncOutcome::Created);
    }

    #[tokio::test]
    async fn test_http_get_index_and_endpoints() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/2.0/vector-search/indexes/main.rag.idx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "main.rag.idx",
                "status": {
                    "ready": true,
                    "message": "Index is online",
                    "indexed_row_count": 42
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/vector-search/endpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "endpoints": [
                    {"name": "one", "endpoint_status": {"state": "ONLINE"}},
                    {"name": "two", "endpoint_status": {"state": "PROVISIONING"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = WorkspaceClient::new(&server.uri(), "t", Duration::from_secs(5)).unwrap();

        let status = client.get_index("main.rag.idx").await.unwrap();
        assert!(status.ready);
        assert_eq!(status.indexed_row_count, Some(42));
        assert_eq!(status.message.as_deref(), Some("Index is online"));

        let endpoints = client.list_endpoints().await.unwrap();
        assert_eq!(endpoints.len(), 2);
        assert!(endpoints[0].is_online());
        assert!(!endpoints[1].is_online());
    }
}
