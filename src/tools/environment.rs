//! Configuration tools: code environments, project variables and connections.
//!
//! Secrets never leave this module in clear: variables whose name is a
//! sensitive word and connection parameters whose name contains one are
//! replaced by [`HIDDEN`].

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::warn;

use super::fields::{self, type_name};
use super::{tool, Args, ToolResult};
use crate::dss::{project_label, recipe_refs, Dss, Project};
use crate::error::DssError;
use crate::mcp::server::ToolDefinition;

pub const HIDDEN: &str = "***HIDDEN***";

/// Variable names hidden when equal (case-insensitively) to one of these.
const SENSITIVE_VARIABLES: [&str; 4] = ["password", "secret", "key", "token"];

/// Connection parameters hidden when their name contains one of these.
const SENSITIVE_PARAMS: [&str; 5] = ["password", "secret", "key", "token", "credentials"];

/// Packages listed per code environment.
const SAMPLE_PACKAGES: usize = 10;

pub fn definitions() -> Vec<ToolDefinition> {
    let optional_project = |what: &str| {
        json!({
            "type": "object",
            "properties": {
                "project_key": { "type": "string", "description": format!("Project key, to include {what}") }
            },
            "required": []
        })
    };

    vec![
        tool(
            "get_code_environments",
            "List Python and R code environments, and the project's environment settings when a \
             project key is given.",
            optional_project("project environment settings"),
        ),
        tool(
            "get_project_variables",
            "Get project variables, metadata, settings summary and permissions. Sensitive \
             variables are masked.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" }
                },
                "required": ["project_key"]
            }),
        ),
        tool(
            "get_connections",
            "List data connections with sensitive parameters masked, and which connections a \
             project uses when a project key is given.",
            optional_project("per-project connection usage"),
        ),
    ]
}

// ==================== Code environments ====================

fn package_lines(env: &Value) -> Vec<&str> {
    ["actualPackageList", "specPackageList"]
        .iter()
        .find_map(|k| env.get(*k).and_then(Value::as_str).filter(|s| !s.trim().is_empty()))
        .map(|list| {
            list.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .collect()
        })
        .unwrap_or_default()
}

async fn code_env_info(dss: &Dss, env: &Value) -> Value {
    let name = fields::text(env, "envName");
    let lang = fields::text(env, "envLang");
    let mut info = json!({
        "name": name,
        "language": lang,
        "type": fields::field(env, "deploymentMode"),
        "owner": fields::text_or(env, "owner", "unknown"),
        "usable": fields::flag(env, "usable", false),
        "description": fields::text(env, "description"),
    });

    match dss.code_env(lang, name).await {
        Ok(details) => {
            let desc = fields::object(&details, "desc");
            let packages = package_lines(&details);
            info["python_interpreter"] =
                json!(fields::text_or(&desc, "pythonInterpreter", "unknown"));
            info["conda_environment"] = json!(fields::flag(&desc, "conda", false));
            info["desc"] = desc;
            info["package_count"] = json!(packages.len());
            let sample: Vec<&str> = packages.iter().take(SAMPLE_PACKAGES).copied().collect();
            info["sample_packages"] = json!(sample);
        }
        Err(e) => info["error"] = json!(format!("Could not get detailed info: {e}")),
    }
    info
}

fn env_mode(settings: &Value) -> (Value, bool) {
    let mode = fields::text_or(settings, "mode", "INHERIT");
    let env = settings
        .get("envName")
        .or_else(|| settings.get("preferredEnvName"))
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| json!("INHERIT"));
    (env, mode == "INHERIT")
}

async fn project_env_info(project: &Project<'_>) -> Result<Value, DssError> {
    let settings = project.settings().await?;
    let code_envs = settings
        .pointer("/settings/codeEnvs")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let (python_env, builtin_python) = env_mode(&fields::object(&code_envs, "python"));
    let (r_env, builtin_r) = env_mode(&fields::object(&code_envs, "r"));
    let overrides = fields::object(&code_envs, "envOverrides");

    Ok(json!({
        "project_key": project.key(),
        "default_python_env": python_env,
        "default_r_env": r_env,
        "use_builtin_python": builtin_python,
        "use_builtin_r": builtin_r,
        "override_count": overrides.as_object().map_or(0, Map::len),
        "environment_overrides": overrides,
    }))
}

pub async fn get_code_environments(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.opt_str("project_key")?;

    let envs = dss.list_code_envs().await.unwrap_or_else(|e| {
        warn!(error = %e, "Could not list code environments");
        Vec::new()
    });
    let mut global = Vec::with_capacity(envs.len());
    for env in &envs {
        global.push(code_env_info(dss, env).await);
    }

    let mut result = json!({
        "global_environment_count": global.len(),
        "global_environments": global,
    });
    if let Some(project_key) = project_key {
        match project_env_info(&dss.project(project_key)).await {
            Ok(info) => result["project_environment_info"] = info,
            Err(e) => {
                result["project_environment_error"] =
                    json!(format!("Could not get project environment settings: {e}"));
            }
        }
    }
    Ok(result)
}

// ==================== Variables ====================

/// Variables with their JSON type, values of sensitive names masked.
fn mask_variables(variables: &Value) -> Map<String, Value> {
    variables
        .as_object()
        .map(|vars| {
            vars.iter()
                .map(|(name, value)| {
                    let shown = if SENSITIVE_VARIABLES.contains(&name.to_lowercase().as_str()) {
                        json!(HIDDEN)
                    } else {
                        value.clone()
                    };
                    (name.clone(), json!({"type": type_name(value), "value": shown}))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn object_len(value: &Value, key: &str) -> usize {
    value
        .get(key)
        .and_then(Value::as_object)
        .map_or(0, Map::len)
}

pub async fn get_project_variables(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;

    let project = dss.project(project_key);
    let variables = project.variables().await?;
    let metadata = project.metadata().await?;
    let settings_summary = match project.settings().await {
        Ok(settings) => json!({
            "bundle_export_options": fields::object(&settings, "bundleExportOptions"),
            "git_reference": fields::object(&settings, "gitReference"),
            "flow_display_settings": fields::object(&settings, "flowDisplaySettings"),
            "notebook_exports": fields::object(&settings, "notebookExports"),
        }),
        Err(e) => {
            warn!(project_key, error = %e, "Project settings unavailable");
            json!({"error": "Settings not available (requires admin permission)"})
        }
    };
    let permissions = project
        .permissions()
        .await
        .unwrap_or_else(|_| json!({"error": "Permissions not available"}));

    let standard = fields::object(&variables, "standard");
    let local = fields::object(&variables, "local");
    let tags = fields::array(&metadata, "tags");
    let custom_fields = fields::object(&metadata, "customFields");

    Ok(json!({
        "project_info": {
            "key": project_key,
            "name": project_label(&metadata, project_key),
            "description": fields::text(&metadata, "description"),
            "short_description": fields::text(&metadata, "shortDesc"),
            "tags": tags,
            "owner": fields::text_or(&metadata, "owner", "unknown"),
            "creation_date": fields::field(&metadata, "creationDate"),
            "last_modified": fields::at(&metadata, "/versionTag/lastModifiedOn"),
        },
        "variables": {
            "standard": mask_variables(&standard),
            "custom": mask_variables(&local),
        },
        "variable_stats": {
            "standard_variable_count": object_len(&variables, "standard"),
            "custom_variable_count": object_len(&variables, "local"),
            "total_variables": object_len(&variables, "standard") + object_len(&variables, "local"),
            "custom_fields_count": object_len(&metadata, "customFields"),
            "tag_count": tags.as_array().map_or(0, Vec::len),
        },
        "metadata": {
            "custom_fields": custom_fields,
            "tags": tags,
            "checklists": fields::field_or(&metadata, "checklists", json!([])),
        },
        "settings_summary": settings_summary,
        "permissions": permissions,
    }))
}

// ==================== Connections ====================

/// Connection parameters with sensitive ones masked.
fn mask_params(params: &Value) -> Map<String, Value> {
    params
        .as_object()
        .map(|params| {
            params
                .iter()
                .map(|(name, value)| {
                    let lower = name.to_lowercase();
                    let shown = if SENSITIVE_PARAMS.iter().any(|s| lower.contains(s)) {
                        json!(HIDDEN)
                    } else {
                        value.clone()
                    };
                    (name.clone(), shown)
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn connection_info(dss: &Dss, connection: &Value) -> Value {
    let name = fields::text(connection, "name");
    let mut info = json!({
        "name": name,
        "type": fields::field(connection, "type"),
        "usable": fields::flag(connection, "usable", false),
        "allow_write": fields::flag(connection, "allowWrite", false),
        "allow_managed_datasets": fields::flag(connection, "allowManagedDatasets", false),
        "description": fields::text(connection, "description"),
    });
    match dss.connection(name).await {
        Ok(details) => {
            info["parameters"] = json!(mask_params(&fields::object(&details, "params")));
            info["description"] = json!(fields::text(&details, "description"));
        }
        Err(e) => info["error"] = json!(format!("Could not get detailed info: {e}")),
    }
    info
}

#[derive(Debug, Default)]
struct ConnectionUsage {
    datasets: Vec<Value>,
    recipes: Vec<String>,
}

/// Which connections the datasets and recipes of a project use.
async fn project_connection_info(project: &Project<'_>) -> Result<Value, DssError> {
    let datasets = project.list_datasets().await?;
    let mut usage: BTreeMap<String, ConnectionUsage> = BTreeMap::new();
    let mut dataset_connection: BTreeMap<String, String> = BTreeMap::new();

    for summary in &datasets {
        let name = fields::text(summary, "name");
        let Ok(dataset) = project.dataset(name).await else {
            continue;
        };
        let connection = dataset
            .pointer("/params/connection")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        usage
            .entry(connection.clone())
            .or_default()
            .datasets
            .push(json!({"name": name, "type": fields::field(summary, "type")}));
        dataset_connection.insert(name.to_string(), connection);
    }

    let recipes = project.list_recipes().await?;
    for summary in &recipes {
        let name = fields::text(summary, "name");
        let Ok(settings) = project.recipe(name).await else {
            continue;
        };
        let recipe = &settings["recipe"];
        let mut references = recipe_refs(recipe, "inputs");
        references.extend(recipe_refs(recipe, "outputs"));
        for reference in references {
            let connection = dataset_connection.get(&reference);
            let Some(entry) = connection.and_then(|c| usage.get_mut(c)) else {
                continue;
            };
            if !entry.recipes.iter().any(|r| r == name) {
                entry.recipes.push(name.to_string());
            }
        }
    }

    let connection_usage: Map<String, Value> = usage
        .iter()
        .map(|(connection, u)| {
            let mut entry = json!({"datasets": u.datasets, "count": u.datasets.len()});
            if !u.recipes.is_empty() {
                entry["used_by_recipes"] = json!(u.recipes);
            }
            (connection.clone(), entry)
        })
        .collect();

    Ok(json!({
        "project_key": project.key(),
        "unique_connections_used": connection_usage.len(),
        "connection_usage": connection_usage,
        "total_datasets": datasets.len(),
        "total_recipes": recipes.len(),
    }))
}

pub async fn get_connections(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.opt_str("project_key")?;

    let connections = dss.list_connections().await.unwrap_or_else(|e| {
        warn!(error = %e, "Could not list connections");
        Vec::new()
    });
    let mut global = Vec::with_capacity(connections.len());
    for connection in &connections {
        global.push(connection_info(dss, connection).await);
    }

    let mut by_type: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for connection in &global {
        by_type
            .entry(fields::text_or(connection, "type", "unknown").to_string())
            .or_default()
            .push(fields::field(connection, "name"));
    }

    let mut result = json!({
        "global_connection_count": global.len(),
        "global_connections": global,
        "connection_type_count": by_type.len(),
        "connection_types": by_type,
    });
    if let Some(project_key) = project_key {
        match project_connection_info(&dss.project(project_key)).await {
            Ok(info) => result["project_connection_info"] = info,
            Err(e) => {
                result["project_connection_error"] =
                    json!(format!("Could not get project connection info: {e}"));
            }
        }
    }
    Ok(result)
}
