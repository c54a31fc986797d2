//! Databricks workspace REST clients
//!
//! This module handles:
//! - Authenticated calls to the workspace REST API
//! - Mapping Databricks error bodies onto [`Error`]
//! - The vector search, model serving and model registry seams

mod models;
mod serving;
mod vector_search;

pub use models::*;
pub use serving::*;
pub use vector_search::*;

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Error code the workspace returns for missing resources
pub const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

/// Client for one Databricks workspace
#[derive(Clone)]
pub struct WorkspaceClient {
    client: Client,
    host: Url,
    token: String,
}

impl WorkspaceClient {
    pub fn new(host: &str, token: &str, timeout: Duration) -> Result<Self> {
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            Url::parse(host)?
        } else {
            Url::parse(&format!("https://{}", host))?
        };
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("medallion/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            host,
            token: token.to_string(),
        })
    }

    /// Build a client from the workspace section of the config
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.workspace.host.trim().is_empty() {
            return Err(Error::Config(
                "workspace.host is not set (or export DATABRICKS_HOST)".to_string(),
            ));
        }
        let token = config.workspace_token().ok_or_else(|| {
            Error::Config(format!(
                "No access token found in ${}",
                config.workspace.token_env
            ))
        })?;
        Self::new(
            &config.workspace.host,
            &token,
            Duration::from_secs(config.workspace.timeout_secs),
        )
    }

    /// Host name as shown in browser URLs
    pub fn host_name(&self) -> &str {
        self.host.host_str().unwrap_or_default()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.host
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid workspace URL: {}", e)))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        self.send(self.client.post(url).json(body)).await
    }

    pub(crate) async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        self.send(self.client.get(url).query(query)).await
    }

    pub(crate) async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("PUT {}", url);
        self.send(self.client.put(url).json(body)).await
    }

    /// PUT raw bytes to a pre-signed storage URL
    ///
    /// The signature in the URL authorizes the write, so no bearer token is
    /// sent. Only the URL path is logged; the query holds the signature.
    pub(crate) async fn upload_signed(
        &self,
        signed_uri: &str,
        headers: &[(String, String)],
        bytes: Vec<u8>,
    ) -> Result<()> {
        let url = Url::parse(signed_uri)?;
        debug!("PUT {}", url.path());
        let mut request = self.client.put(url).body(bytes);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                code: "ARTIFACT_UPLOAD_FAILED".to_string(),
                message: if message.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    message
                },
            });
        }
        Ok(())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let body: ApiErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
            return Err(api_error(status.as_u16(), body));
        }

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn api_error(status: u16, body: ApiErrorBody) -> Error {
    let message = if body.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        body.message
    };

    if body.error_code == RESOURCE_DOES_NOT_EXIST || status == 404 {
        Error::ResourceNotFound(message)
    } else {
        Error::Api {
            status,
            code: body.error_code,
            message,
        }
    }
}

/// Response body with no fields of interest
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Empty {}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> WorkspaceClient {
        WorkspaceClient::new(&server.uri(), "dapi-test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_host_without_scheme_defaults_to_https() {
        let client =
            WorkspaceClient::new("adb-123.azuredatabricks.net", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(client.host_name(), "adb-123.azuredatabricks.net");
        assert_eq!(client.host.scheme(), "https");
    }

    #[test]
    fn test_from_config_requires_host_and_token() {
        let mut config = Config::default();
        config.workspace.host = String::new();
        assert!(matches!(
            WorkspaceClient::from_config(&config),
            Err(Error::Config(_))
        ));

        config.workspace.host = "example.cloud.databricks.com".to_string();
        config.workspace.token_env = "MEDALLION_TEST_TOKEN_THAT_IS_NOT_SET".to_string();
        assert!(matches!(
            WorkspaceClient::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/ping"))
            .and(header("authorization", "Bearer dapi-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let _: Empty = client.get("/api/2.0/ping").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_success_body_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.0/noop"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let _: Empty = client.post("/api/2.0/noop", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_bodies_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/missing"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "RESOURCE_DOES_NOT_EXIST",
                "message": "Index main.rag.idx does not exist"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/denied"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error_code": "PERMISSION_DENIED",
                "message": "no access"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;

        let missing = client.get::<Empty>("/api/2.0/missing").await.unwrap_err();
        assert!(matches!(missing, Error::ResourceNotFound(m) if m.contains("main.rag.idx")));

        let denied = client.get::<Empty>("/api/2.0/denied").await.unwrap_err();        match denied {
            Error::Api { status, code, message } => {
                assert_eq!(status, 403);
                assert_eq!(code, "PERMISSION_DENIED");
                assert_eq!(message, "no access");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signed_upload_skips_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bucket/run/chain/MLmodel"))
            .and(header("x-amz-acl", "private"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/bucket/run/chain/denied"))
            .respond_with(ResponseTemplate::new(403).set_body_string("signature expired"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let headers = vec![("x-amz-acl".to_string(), "private".to_string())];
        client
            .upload_signed(
                &format!("{}/bucket/run/chain/MLmodel?sig=abc", server.uri()),
                &headers,
                b"flavors: {}".to_vec(),
            )
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());

        let err = client
            .upload_signed(
                &format!("{}/bucket/run/chain/denied?sig=abc", server.uri()),
                &[],
                Vec::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 403, message, .. } if message == "signature expired"));
    }
}
