//! Client adapter for the Dataiku DSS public REST API.
//!
//! Every tool talks to DSS through the [`DssApi`] trait. The production
//! implementation is [`DssClient`]; tests substitute an in-memory double.
//!
//! # Layout
//!
//! ```text
//! tools ──▶ Dss / Project (typed endpoints) ──▶ dyn DssApi ──▶ DssClient (reqwest)
//! ```
//!
//! Entities are owned by DSS, so responses are relayed as
//! [`serde_json::Value`] rather than mirrored in local types.

mod client;
pub mod jobs;
mod project;

pub use client::DssClient;
pub use jobs::Polling;
pub use project::{project_label, recipe_refs, Dss, Project};

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DssError;

/// HTTP method of a DSS API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Returns the method name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call against the DSS public API.
///
/// The path is kept as unencoded segments below `/public/api`; the client
/// percent-encodes each segment, so object names containing `/` or spaces
/// are safe. An empty trailing segment produces a trailing slash, which
/// several DSS listing endpoints require.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path segments below `/public/api`.
    pub segments: Vec<String>,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Creates a request without query or body.
    #[must_use]
    pub fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| (*s).to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(segments: &[&str]) -> Self {
        Self::new(Method::Get, segments)
    }

    /// Creates a `POST` request.
    #[must_use]
    pub fn post(segments: &[&str]) -> Self {
        Self::new(Method::Post, segments)
    }

    /// Creates a `PUT` request.
    #[must_use]
    pub fn put(segments: &[&str]) -> Self {
        Self::new(Method::Put, segments)
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(segments: &[&str]) -> Self {
        Self::new(Method::Delete, segments)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns the unencoded path, e.g. `/projects/PROJ/datasets/`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}

/// Transport to the DSS public API.
#[async_trait]
pub trait DssApi: Send + Sync {
    /// Sends a request and decodes the JSON response.
    ///
    /// An empty response body decodes to [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or a
    /// body that is not JSON.
    async fn request(&self, request: ApiRequest) -> Result<Value, DssError>;

    /// Sends a request and returns the raw response body.
    ///
    /// Used for logs and TSV data exports.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    async fn request_text(&self, request: ApiRequest) -> Result<String, DssError>;
}
