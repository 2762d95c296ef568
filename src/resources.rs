//! MCP resources: the project list and per-project summaries.
//!
//! | URI | Contents |
//! |-----|----------|
//! | `projects://` | `{"projects": [keys]}` |
//! | `project://{project_key}` | `{"key", "name", "description"}` |
//!
//! DSS failures are reported inside the document as an `error` field, so a
//! read of a known URI always succeeds at the protocol level.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::dss::{project_label, Dss};

/// URI of the project list.
pub const PROJECTS_URI: &str = "projects://";

const PROJECT_SCHEME: &str = "project://";
const MIME_JSON: &str = "application/json";

/// A concrete resource for `resources/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mime_type: String,
}

/// A parameterised resource for `resources/templates/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mime_type: String,
}

/// One item of a `resources/read` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

/// Static resources.
#[must_use]
pub fn definitions() -> Vec<ResourceDefinition> {
    vec![ResourceDefinition {
        uri: PROJECTS_URI.to_string(),
        name: "projects".to_string(),
        description: Some("Keys of all accessible Dataiku projects".to_string()),
        mime_type: MIME_JSON.to_string(),
    }]
}

/// Resource templates.
#[must_use]
pub fn templates() -> Vec<ResourceTemplate> {
    vec![ResourceTemplate {
        uri_template: format!("{PROJECT_SCHEME}{{project_key}}"),
        name: "project".to_string(),
        description: Some("Name and description of one Dataiku project".to_string()),
        mime_type: MIME_JSON.to_string(),
    }]
}

/// Project key addressed by a `project://` URI.
fn project_key(uri: &str) -> Option<&str> {
    uri.strip_prefix(PROJECT_SCHEME)
        .map(|key| key.trim_end_matches('/'))
        .filter(|key| !key.is_empty())
}

async fn projects(dss: &Dss) -> Value {
    match dss.list_project_keys().await {
        Ok(keys) => json!({ "projects": keys }),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

async fn project(dss: &Dss, key: &str) -> Value {
    match dss.project(key).metadata().await {
        Ok(metadata) => {
            json!({
                "key": key,
                "name": project_label(&metadata, key),
                "description": metadata.get("description").and_then(Value::as_str).unwrap_or(""),
            })
        }
        Err(e) => json!({ "error": e.to_string() }),
    }
}

/// Reads a resource. Returns `None` for URIs this server does not serve.
pub async fn read(dss: &Dss, uri: &str) -> Option<ResourceContents> {
    let document = if uri == PROJECTS_URI {
        projects(dss).await
    } else {
        project(dss, project_key(uri)?).await
    };
    debug!(uri, "Read resource");

    Some(ResourceContents {
        uri: uri.to_string(),
        mime_type: MIME_JSON.to_string(),
        text: document.to_string(),
    })
}
