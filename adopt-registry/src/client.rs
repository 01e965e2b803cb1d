//! HTTP client for the registry API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::types::{
    ClusterInfoResponse, ClusterRegisterRequest, ClusterRegisterResponse, ErrorResponse,
    HealthCheckResponse, NodeInfoResponse, NodeRegisterRequest, NodeRegisterResponse,
    StatusUpdateRequest, StatusUpdateResponse,
};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const API_VERSION: &str = "v1";
const CONTENT_TYPE_JSON: &str = "application/json";
const API_KEY_HEADER: &str = "X-API-Key";

/// Builder for [`RegistryClient`].
#[derive(Debug, Clone)]
pub struct RegistryClientBuilder {
    base_url: String,
    timeout: Duration,
    api_key: Option<String>,
    user_agent: String,
}

impl RegistryClientBuilder {
    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `X-API-Key` on every request. Empty keys are ignored.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validate the base URL and build the client.
    pub fn build(self) -> Result<RegistryClient> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RegistryError::InvalidScheme(url.scheme().to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| RegistryError::InvalidUrl(format!("invalid user agent: {}", e)))?,
        );
        if let Some(key) = &self.api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| RegistryError::InvalidUrl(format!("invalid API key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(RegistryError::Client)?;

        Ok(RegistryClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            http,
            timeout: self.timeout,
        })
    }
}

/// Stateless request executor against one registry endpoint.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl RegistryClient {
    /// Create a client with default options.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            api_key: None,
            user_agent: format!("adopt-registry-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that the registry is reachable and healthy.
    pub async fn health_check(&self) -> Result<HealthCheckResponse> {
        self.request(Method::GET, "/health", None::<&()>).await
    }

    pub async fn register_cluster(
        &self,
        req: &ClusterRegisterRequest,
    ) -> Result<ClusterRegisterResponse> {
        self.request(Method::POST, &format!("/api/{}/clusters", API_VERSION), Some(req))
            .await
    }

    pub async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterInfoResponse> {
        let path = format!("/api/{}/clusters/{}", API_VERSION, cluster_id);
        self.request(Method::GET, &path, None::<&()>).await
    }

    pub async fn update_cluster_status(
        &self,
        cluster_id: &str,
        req: &StatusUpdateRequest,
    ) -> Result<StatusUpdateResponse> {
        let path = format!("/api/{}/clusters/{}/status", API_VERSION, cluster_id);
        self.request(Method::PATCH, &path, Some(req)).await
    }

    /// Register a node. The registry deduplicates on cluster and hostname.
    pub async fn register_node(&self, req: &NodeRegisterRequest) -> Result<NodeRegisterResponse> {
        self.request(Method::POST, &format!("/api/{}/nodes", API_VERSION), Some(req))
            .await
    }

    pub async fn get_node(&self, node_id: &str) -> Result<NodeInfoResponse> {
        let path = format!("/api/{}/nodes/{}", API_VERSION, node_id);
        self.request(Method::GET, &path, None::<&()>).await
    }

    pub async fn update_node_status(
        &self,
        node_id: &str,
        req: &StatusUpdateRequest,
    ) -> Result<StatusUpdateResponse> {
        let path = format!("/api/{}/nodes/{}/status", API_VERSION, node_id);
        self.request(Method::PATCH, &path, Some(req)).await
    }

    /// Execute one request and decode the response.
    async fn request<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Registry request");

        let mut builder = self.http.request(method, &url);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(RegistryError::Encode)?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(RegistryError::from_reqwest)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(RegistryError::from_reqwest)?;

        if !status.is_success() {
            return Err(decode_error(status.as_u16(), &bytes));
        }

        decode_body(&bytes)
    }
}

/// Turn a non-2xx body into an error, preferring the structured `detail`.
fn decode_error(status: u16, body: &[u8]) -> RegistryError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) => RegistryError::Api {
            status,
            detail: err.detail,
        },
        Err(_) => RegistryError::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// Decode a 2xx body. An empty body decodes as JSON `null`, so callers that
/// expect `()` or `Option<T>` accept it.
fn decode_body<R: DeserializeOwned>(body: &[u8]) -> Result<R> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(RegistryError::Decode)
}
