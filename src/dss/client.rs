//! reqwest-backed [`DssApi`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use super::{ApiRequest, DssApi, Method};
use crate::config::DssConfig;
use crate::error::DssError;

/// Longest slice of a non-JSON error body kept in an error message.
const MAX_ERROR_BODY: usize = 300;

/// Authenticated HTTP client for one DSS instance.
pub struct DssClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl std::fmt::Debug for DssClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DssClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl DssClient {
    /// Builds a client from the DSS section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or API key is missing, the host is not
    /// a valid URL, or the TLS backend cannot be initialised.
    pub fn new(config: &DssConfig) -> Result<Self, DssError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| DssError::ClientBuild("DSS host is not configured".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| DssError::ClientBuild("DSS API key is not configured".to_string()))?;

        let base = Url::parse(host.trim())
            .map_err(|e| DssError::ClientBuild(format!("invalid DSS host: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(DssError::ClientBuild(
                "DSS host must be an absolute http(s) URL".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure_tls)
            .user_agent(concat!("dataiku-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DssError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base,
            api_key,
        })
    }

    /// Returns the DSS host this client talks to.
    #[must_use]
    pub fn host(&self) -> &str {
        self.base.as_str()
    }

    /// Builds the full URL for a request.
    fn url(&self, request: &ApiRequest) -> Result<Url, DssError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                DssError::ClientBuild("DSS host must be an absolute http(s) URL".to_string())
            })?;
            segments.pop_if_empty();
            segments.extend(["public", "api"]);
            segments.extend(&request.segments);
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    /// Sends a request and checks the response status.
    async fn send(&self, request: ApiRequest) -> Result<reqwest::Response, DssError> {
        let url = self.url(&request)?;
        debug!(method = %request.method, path = %request.path(), "DSS request");

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, url)
            .basic_auth(&self.api_key, Some(""));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DssError::Transport(describe_reqwest_error(e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), path = %request.path(), "DSS error response");
        Err(DssError::Api {
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }
}

#[async_trait]
impl DssApi for DssClient {
    async fn request(&self, request: ApiRequest) -> Result<Value, DssError> {
        let text = self.request_text(request).await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| DssError::InvalidResponse(e.to_string()))
    }

    async fn request_text(&self, request: ApiRequest) -> Result<String, DssError> {
        let response = self.send(request).await?;
        response
            .text()
            .await
            .map_err(|e| DssError::InvalidResponse(e.to_string()))
    }
}

/// Extracts a human-readable message from a DSS error body.
///
/// DSS answers errors with `{"errorType": ..., "message": ..., "detailedMessage": ...}`.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .get("detailedMessage")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

/// Describes a transport error without echoing the request URL.
fn describe_reqwest_error(error: reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "could not connect to DSS host".to_string()
    } else {
        error.without_url().to_string()
    }
}
