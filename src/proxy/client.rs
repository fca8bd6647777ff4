//! Upstream client
//!
//! One pooled HTTP client per configured endpoint. Clients carry no request
//! timeout since a streamed completion may run for as long as the model
//! keeps generating.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error};

use crate::{
    config::{EndpointConfig, HttpClientConfig},
    error::{ProxyError, ProxyResult},
};

use super::headers::build_upstream_headers;

/// Reasons an endpoint cannot be turned into a client
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("api_base is empty")]
    MissingBase,

    #[error("api_key is empty")]
    MissingKey,

    #[error("api_key is not a valid header value")]
    InvalidKey,

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Check that an endpoint is usable and return its authorization header
pub fn validate_endpoint(endpoint: &EndpointConfig) -> Result<HeaderValue, EndpointError> {
    if endpoint.api_base.trim().trim_end_matches('/').is_empty() {
        return Err(EndpointError::MissingBase);
    }
    if endpoint.api_key.trim().is_empty() {
        return Err(EndpointError::MissingKey);
    }

    HeaderValue::from_str(&format!("Bearer {}", endpoint.api_key))
        .map_err(|_| EndpointError::InvalidKey)
}

/// Pooled client bound to one upstream endpoint
pub struct UpstreamClient {
    name: String,
    base_url: String,
    authorization: HeaderValue,
    http: reqwest::Client,
    conn_limit: Option<Arc<Semaphore>>,
}

/// An upstream response together with the connection permit it occupies
pub struct UpstreamResponse {
    pub response: reqwest::Response,
    pub conn_permit: Option<OwnedSemaphorePermit>,
}

impl UpstreamClient {
    /// Create a client for an endpoint using the shared pool settings
    pub fn new(endpoint: &EndpointConfig, pool: &HttpClientConfig) -> Result<Self, EndpointError> {
        let mut authorization = validate_endpoint(endpoint)?;
        authorization.set_sensitive(true);
        let base_url = endpoint.api_base.trim().trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(pool.idle_per_client())
            .pool_idle_timeout(pool.idle_conn_timeout())
            .build()?;

        let conn_limit =
            (pool.max_conns_per_host > 0).then(|| Arc::new(Semaphore::new(pool.max_conns_per_host)));

        Ok(Self {
            name: endpoint.name.clone(),
            base_url,
            authorization,
            http,
            conn_limit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Target URL for a sub-path under the proxy prefix
    pub fn target_url(&self, sub_path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, sub_path, q),
            _ => format!("{}{}", self.base_url, sub_path),
        }
    }

    /// Send one request upstream.
    ///
    /// Waits for a connection permit when `max_conns_per_host` is set; the
    /// permit travels with the response and is released when the relay ends.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        incoming_headers: &HeaderMap,
        body: Bytes,
    ) -> ProxyResult<UpstreamResponse> {
        let conn_permit = match &self.conn_limit {
            Some(limit) => Some(limit.clone().acquire_owned().await.map_err(|e| {
                ProxyError::Internal(anyhow::anyhow!("connection limiter closed: {}", e))
            })?),
            None => None,
        };

        let headers = build_upstream_headers(incoming_headers, &self.authorization);

        debug!(
            client = %self.name,
            url = %url,
            method = %method,
            body_len = body.len(),
            "Sending request upstream"
        );

        let mut request = self.http.request(method, url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            error!(client = %self.name, url = %url, error = %e, "Upstream request failed");
            e
        })?;

        Ok(UpstreamResponse {
            response,
            conn_permit,
        })
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
