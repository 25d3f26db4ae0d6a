//! Upstream resource fetching.
//!
//! A [`ResourceFetcher`] turns a [`ResourceKey`] into a JSON payload or a
//! classified [`FetchError`]. [`RestFetcher`] is the HTTP implementation; the
//! backend answers with the envelope `{ success, data?, error? }`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use concierge_core::{ApiConfig, FetchError, ResourceKey, ResourceSettings};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Fetches the current payload of a named resource.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, resource: &ResourceKey) -> Result<Value, FetchError>;
}

/// Error body inside a failed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub status: u16,
    pub message: String,
}

/// Response envelope returned by the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl FetchResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(EnvelopeError {
                status,
                message: message.into(),
            }),
        }
    }

    /// Collapse the envelope into a payload or a classified error.
    ///
    /// A failed envelope without an error body is treated as a server
    /// failure, since the backend gave no reason the client could act on.
    pub fn into_result(self) -> Result<Value, FetchError> {
        if self.success {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        match self.error {
            Some(error) => Err(FetchError::from_status(error.status, error.message)),
            None => Err(FetchError::from_status(500, "request failed without error detail")),
        }
    }
}

/// Errors building a [`RestFetcher`].
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

/// HTTP fetcher mapping each resource to a path under the API base URL.
#[derive(Clone)]
pub struct RestFetcher {
    client: reqwest::Client,
    base_url: String,
    routes: HashMap<ResourceKey, String>,
    auth_header: HeaderMap,
}

impl RestFetcher {
    pub fn new(config: &ApiConfig, resources: &[ResourceSettings]) -> Result<Self, FetcherError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let auth_header = build_auth_headers(config.bearer_token.as_deref())?;
        let routes = resources
            .iter()
            .map(|r| (ResourceKey::new(r.key.clone()), r.path.clone()))
            .collect();

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            routes,
            auth_header,
        })
    }

    pub fn with_route(mut self, resource: impl Into<ResourceKey>, path: impl Into<String>) -> Self {
        self.routes.insert(resource.into(), path.into());
        self
    }

    pub fn url_for(&self, resource: &ResourceKey) -> Option<String> {
        self.routes
            .get(resource)
            .map(|path| format!("{}{}", self.base_url, path))
    }
}

#[async_trait]
impl ResourceFetcher for RestFetcher {
    async fn fetch(&self, resource: &ResourceKey) -> Result<Value, FetchError> {
        let url = self.url_for(resource).ok_or_else(|| {
            FetchError::from_status(404, format!("no route configured for resource '{}'", resource))
        })?;
        let request_id = Uuid::now_v7();

        let response = self
            .client
            .get(&url)
            .headers(self.auth_header.clone())
            .header("x-request-id", request_id.to_string())
            .send()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(e.to_string()))?;

        tracing::debug!(
            resource = %resource,
            %request_id,
            status,
            bytes = body.len(),
            "fetched resource"
        );
        decode_body(status, &body)
    }
}

/// Interpret an HTTP response body.
///
/// Envelopes are unwrapped; a successful response that is not an envelope is
/// taken as the payload itself. Non-2xx responses always fail, preferring the
/// envelope's error detail when present.
pub fn decode_body(status: u16, body: &str) -> Result<Value, FetchError> {
    let is_success = (200..300).contains(&status);

    let parsed = serde_json::from_str::<Value>(body);
    let envelope = parsed
        .as_ref()
        .ok()
        .filter(|value| value.get("success").map_or(false, Value::is_boolean))
        .and_then(|value| serde_json::from_value::<FetchResponse>(value.clone()).ok());

    if !is_success {
        if let Some(FetchResponse {
            error: Some(error), ..
        }) = envelope
        {
            return Err(FetchError::from_status(status, error.message));
        }
        return Err(FetchError::from_status(status, snippet(body, status)));
    }

    match (envelope, parsed) {
        (Some(envelope), _) => envelope.into_result(),
        (None, Ok(value)) => Ok(value),
        (None, Err(e)) => Err(FetchError::from_status(
            502,
            format!("response body is not JSON: {}", e),
        )),
    }
}

fn snippet(body: &str, status: u16) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {}", status);
    }
    trimmed.chars().take(200).collect()
}

fn build_auth_headers(bearer_token: Option<&str>) -> Result<HeaderMap, FetcherError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = bearer_token {
        let value = format!("Bearer {}", token);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| FetcherError::InvalidHeader(e.to_string()))?,
        );
    }
    Ok(headers)
}
