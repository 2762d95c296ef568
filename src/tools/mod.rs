//! Tool registry for the DSS MCP server.
//!
//! Each category module exposes `definitions()` (name, description and JSON
//! input schema of its tools) and one async handler per tool. Handlers read
//! their arguments, call DSS through [`Dss`], and return a JSON object.
//!
//! # Categories
//!
//! | Module | Tools |
//! |--------|-------|
//! | `recipes` | create, update, delete, run, inspect and list recipes |
//! | `code` | recipe code retrieval, syntax checks, dry runs |
//! | `datasets` | dataset lifecycle, builds, schema, metrics |
//! | `scenarios` | scenario lifecycle, triggers, runs, logs, cloning |
//! | `jobs` | recent runs, job details, cancellation |
//! | `exploration` | flow graph, search, data samples |
//! | `environment` | code environments, variables, connections |
//! | `productivity` | project duplication, export, batch updates |

mod args;
mod code;
mod datasets;
mod environment;
mod exploration;
mod fields;
mod jobs;
mod productivity;
mod recipes;
mod scenarios;

pub use args::Args;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::dss::Dss;
use crate::error::DssError;
use crate::mcp::server::{ToolCallResult, ToolDefinition};

/// Errors a tool handler can report.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The caller supplied missing or invalid arguments.
    #[error("{0}")]
    InvalidArgument(String),

    /// A DSS call failed.
    #[error(transparent)]
    Dss(#[from] DssError),
}

/// Result of a tool handler: a JSON object on success.
pub type ToolResult = Result<Value, ToolError>;

/// Arguments that name the object a tool acts on, in lookup order.
const SUBJECT_ARGS: [&str; 5] = [
    "recipe_name",
    "dataset_name",
    "scenario_id",
    "source_scenario_id",
    "job_id",
];

/// Returns the definitions of every tool.
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    let mut tools = Vec::new();
    tools.extend(recipes::definitions());
    tools.extend(datasets::definitions());
    tools.extend(scenarios::definitions());
    tools.extend(code::definitions());
    tools.extend(exploration::definitions());
    tools.extend(environment::definitions());
    tools.extend(jobs::definitions());
    tools.extend(productivity::definitions());
    tools
}

/// Runs one tool and renders its outcome as an MCP tool result.
///
/// Failures are reported as tool errors (`isError: true`), never as
/// JSON-RPC errors.
pub async fn call_tool(dss: &Dss, name: &str, arguments: &Value) -> ToolCallResult {
    info!(tool = name, "Tool call");
    let args = Args::new(arguments);

    let outcome = match name {
        // Recipes
        "create_recipe" => recipes::create_recipe(dss, &args).await,
        "update_recipe" => recipes::update_recipe(dss, &args).await,
        "delete_recipe" => recipes::delete_recipe(dss, &args).await,
        "run_recipe" => recipes::run_recipe(dss, &args).await,
        "get_recipe_info" => recipes::get_recipe_info(dss, &args).await,
        "list_recipes" => recipes::list_recipes(dss, &args).await,
        // Datasets
        "create_dataset" => datasets::create_dataset(dss, &args).await,
        "update_dataset" => datasets::update_dataset(dss, &args).await,
        "delete_dataset" => datasets::delete_dataset(dss, &args).await,
        "build_dataset" => datasets::build_dataset(dss, &args).await,
        "inspect_dataset_schema" => datasets::inspect_dataset_schema(dss, &args).await,
        "check_dataset_metrics" => datasets::check_dataset_metrics(dss, &args).await,
        "get_dataset_post_write_statements" => {
            datasets::get_dataset_post_write_statements(dss, &args).await
        }
        "list_datasets" => datasets::list_datasets(dss, &args).await,
        "get_dataset_info" => datasets::get_dataset_info(dss, &args).await,
        "clear_dataset" => datasets::clear_dataset(dss, &args).await,
        // Scenarios
        "create_scenario" => scenarios::create_scenario(dss, &args).await,
        "update_scenario" => scenarios::update_scenario(dss, &args).await,
        "delete_scenario" => scenarios::delete_scenario(dss, &args).await,
        "add_scenario_trigger" => scenarios::add_scenario_trigger(dss, &args).await,
        "remove_scenario_trigger" => scenarios::remove_scenario_trigger(dss, &args).await,
        "run_scenario" => scenarios::run_scenario(dss, &args).await,
        "get_scenario_info" => scenarios::get_scenario_info(dss, &args).await,
        "list_scenarios" => scenarios::list_scenarios(dss, &args).await,
        "get_scenario_run_history" => scenarios::get_scenario_run_history(dss, &args).await,
        "get_scenario_logs" => scenarios::get_scenario_logs(dss, &args).await,
        "get_scenario_steps" => scenarios::get_scenario_steps(dss, &args).await,
        "clone_scenario" => scenarios::clone_scenario(dss, &args).await,
        // Code development
        "get_recipe_code" => code::get_recipe_code(dss, &args).await,
        "validate_recipe_syntax" => code::validate_recipe_syntax(dss, &args).await,
        "test_recipe_dry_run" => code::test_recipe_dry_run(dss, &args).await,
        // Project exploration
        "get_project_flow" => exploration::get_project_flow(dss, &args).await,
        "search_project_objects" => exploration::search_project_objects(dss, &args).await,
        "get_dataset_sample" => exploration::get_dataset_sample(dss, &args).await,
        // Environment and configuration
        "get_code_environments" => environment::get_code_environments(dss, &args).await,
        "get_project_variables" => environment::get_project_variables(dss, &args).await,
        "get_connections" => environment::get_connections(dss, &args).await,
        // Monitoring
        "get_recent_runs" => jobs::get_recent_runs(dss, &args).await,
        "get_job_details" => jobs::get_job_details(dss, &args).await,
        "cancel_running_jobs" => jobs::cancel_running_jobs(dss, &args).await,
        // Productivity
        "duplicate_project_structure" => {
            productivity::duplicate_project_structure(dss, &args).await
        }
        "export_project_config" => productivity::export_project_config(dss, &args).await,
        "batch_update_objects" => productivity::batch_update_objects(dss, &args).await,
        // Unknown tool
        _ => return ToolCallResult::error(format!("Unknown tool: {name}")),
    };

    render(name, &args, outcome)
}

/// Renders a handler outcome.
///
/// Successful objects get `"status": "ok"` unless the handler set a status
/// itself; a handler-reported `"status": "error"` is flagged as a tool error.
fn render(name: &str, args: &Args<'_>, outcome: ToolResult) -> ToolCallResult {
    match outcome {
        Ok(mut value) => {
            if let Value::Object(map) = &mut value {
                map.entry("status").or_insert_with(|| json!("ok"));
            }
            let failed = value.get("status").and_then(Value::as_str) == Some("error");
            if failed {
                ToolCallResult::error(pretty(&value))
            } else {
                ToolCallResult::text(pretty(&value))
            }
        }
        Err(ToolError::InvalidArgument(message)) => {
            ToolCallResult::error(pretty(&json!({"status": "error", "message": message})))
        }
        Err(ToolError::Dss(e)) => {
            warn!(tool = name, error = %e, "Tool call failed");
            let message = format!("Failed to {}: {e}", action(name, args));
            ToolCallResult::error(pretty(&json!({"status": "error", "message": message})))
        }
    }
}

/// Describes what a tool was doing, e.g. `create recipe 'compute_orders'`.
fn action(name: &str, args: &Args<'_>) -> String {
    let verb = name.replace('_', " ");
    SUBJECT_ARGS
        .iter()
        .find_map(|key| args.get(key).and_then(Value::as_str))
        .map_or_else(|| verb.clone(), |subject| format!("{verb} '{subject}'"))
}

/// Pretty-prints a JSON value.
fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Builds a tool definition.
fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}
