//! Scenario tools: lifecycle, triggers, runs, logs, steps and cloning.

use chrono::{Datelike, Local, NaiveDate};
use serde_json::{json, Map, Value};
use tracing::warn;

use super::fields::{self, edit_array, object_mut, quoted_list};
use super::jobs::scenario_run_summary;
use super::{tool, Args, ToolError, ToolResult};
use crate::dss::jobs::wait_for_scenario_run;
use crate::dss::{Dss, Project};
use crate::error::DssError;
use crate::mcp::server::ToolDefinition;

const SCENARIO_TYPES: [&str; 2] = ["step_based", "custom_python"];
const TRIGGER_TYPES: [&str; 5] = ["periodic", "hourly", "daily", "monthly", "dataset"];

/// How many past runs `get_scenario_logs` searches.
const LOG_RUN_WINDOW: u64 = 50;

pub fn definitions() -> Vec<ToolDefinition> {
    let key_and_id = json!({
        "type": "object",
        "properties": {
            "project_key": { "type": "string", "description": "The project key" },
            "scenario_id": { "type": "string", "description": "ID of the scenario" }
        },
        "required": ["project_key", "scenario_id"]
    });

    vec![
        tool(
            "create_scenario",
            "Create a new scenario. The type must be step_based or custom_python.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_name": { "type": "string", "description": "Name for the new scenario" },
                    "scenario_type": { "type": "string", "enum": SCENARIO_TYPES, "description": "Scenario type" },
                    "definition": { "type": "object", "description": "Scenario definition (defaults to {\"params\": {}})" }
                },
                "required": ["project_key", "scenario_name", "scenario_type"]
            }),
        ),
        tool(
            "update_scenario",
            "Update scenario metadata, name, active flag, definition, or the script of a \
             custom_python step.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_id": { "type": "string", "description": "ID of the scenario to update" },
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "active": { "type": "boolean" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "custom_fields": { "type": "object" },
                    "definition": { "type": "object", "description": "Settings merged into the scenario definition" },
                    "step_script": { "type": "string", "description": "Python code for a custom_python step" },
                    "step_index": { "type": "integer", "minimum": 0, "description": "Index of the step to update (default 0)" }
                },
                "required": ["project_key", "scenario_id"]
            }),
        ),
        tool(
            "delete_scenario",
            "Delete a scenario from a project.",
            key_and_id.clone(),
        ),
        tool(
            "add_scenario_trigger",
            "Add a trigger to a scenario. Types: periodic (every_minutes), \
             hourly (starting_hour, minute_of_hour, repeat_every), \
             daily (hour, minute, year, month, day, repeat_every, timezone), \
             monthly (day, hour, minute, year, month), \
             dataset (dataset_name, dataset_project_key).",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_id": { "type": "string", "description": "ID of the scenario" },
                    "trigger_type": { "type": "string", "enum": TRIGGER_TYPES, "description": "Trigger type" },
                    "every_minutes": { "type": "integer", "minimum": 1 },
                    "starting_hour": { "type": "integer", "minimum": 0, "maximum": 23 },
                    "minute_of_hour": { "type": "integer", "minimum": 0, "maximum": 59 },
                    "repeat_every": { "type": "integer", "minimum": 1 },
                    "hour": { "type": "integer", "minimum": 0, "maximum": 23 },
                    "minute": { "type": "integer", "minimum": 0, "maximum": 59 },
                    "year": { "type": "integer" },
                    "month": { "type": "integer", "minimum": 1, "maximum": 12 },
                    "day": { "type": "integer", "minimum": 1, "maximum": 31 },
                    "timezone": { "type": "string", "description": "Timezone (default SERVER)" },
                    "dataset_name": { "type": "string", "description": "Watched dataset for dataset triggers" },
                    "dataset_project_key": { "type": "string", "description": "Project of the watched dataset (default: this project)" }
                },
                "required": ["project_key", "scenario_id", "trigger_type"]
            }),
        ),
        tool(
            "remove_scenario_trigger",
            "Remove a trigger from a scenario by its 0-based index.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_id": { "type": "string", "description": "ID of the scenario" },
                    "trigger_idx": { "type": "integer", "description": "Index of the trigger to remove" }
                },
                "required": ["project_key", "scenario_id", "trigger_idx"]
            }),
        ),
        tool(
            "run_scenario",
            "Run a scenario, by default waiting for it to finish.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_id": { "type": "string", "description": "ID of the scenario to run" },
                    "wait": { "type": "boolean", "description": "Wait for completion (default true)" },
                    "no_fail": { "type": "boolean", "description": "Report a failed run as ok (default false)" }
                },
                "required": ["project_key", "scenario_id"]
            }),
        ),
        tool(
            "get_scenario_info",
            "Get scenario information including triggers, last run and next run.",
            key_and_id.clone(),
        ),
        tool(
            "list_scenarios",
            "List scenarios in a project, optionally filtered by type or active status.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_type": { "type": "string", "description": "Only list scenarios of this type" },
                    "active_only": { "type": "boolean", "description": "Only list active scenarios (default false)" }
                },
                "required": ["project_key"]
            }),
        ),
        tool(
            "get_scenario_run_history",
            "Get the most recent runs of a scenario.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_id": { "type": "string", "description": "ID of the scenario" },
                    "limit": { "type": "integer", "minimum": 0, "description": "Maximum number of runs (default 10)" }
                },
                "required": ["project_key", "scenario_id"]
            }),
        ),
        tool(
            "get_scenario_logs",
            "Get step results, error messages and job logs of a scenario run (latest run by \
             default).",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "scenario_id": { "type": "string", "description": "ID of the scenario" },
                    "run_id": { "type": "string", "description": "Specific run ID (defaults to latest)" }
                },
                "required": ["project_key", "scenario_id"]
            }),
        ),
        tool(
            "get_scenario_steps",
            "Get detailed step configuration of a scenario, including Python code.",
            key_and_id,
        ),
        tool(
            "clone_scenario",
            "Clone a scenario with its steps and triggers, optionally applying modifications \
             (description, tags, active, step_modifications, trigger_modifications, \
             new_triggers, remove_triggers).",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "source_scenario_id": { "type": "string", "description": "ID of the scenario to clone" },
                    "new_scenario_name": { "type": "string", "description": "Name for the new scenario" },
                    "modifications": { "type": "object", "description": "Modifications to apply to the clone" }
                },
                "required": ["project_key", "source_scenario_id", "new_scenario_name"]
            }),
        ),
    ]
}

// ==================== Helpers ====================

fn invalid(message: String) -> ToolError {
    ToolError::InvalidArgument(message)
}

fn steps(settings: &Value) -> &[Value] {
    settings
        .pointer("/params/steps")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

fn edit_steps<R>(settings: &mut Value, edit: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    edit_array(object_mut(settings, "params"), "steps", edit)
}

fn edit_triggers<R>(settings: &mut Value, edit: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    edit_array(settings, "triggers", edit)
}

fn trigger_summary(trigger: &Value) -> Value {
    json!({
        "type": fields::text_or(trigger, "type", "unknown"),
        "name": fields::text_or(trigger, "name", "unnamed"),
        "active": fields::flag(trigger, "active", false),
        "params": fields::object(trigger, "params"),
    })
}

/// Integer trigger parameter with a default.
fn int_or(args: &Args<'_>, name: &str, default: i64) -> Result<i64, ToolError> {
    Ok(args.opt_i64(name)?.unwrap_or(default))
}

/// `YYYY-MM-DD` start date, today unless overridden.
fn starting_date(
    year: Option<i64>,
    month: Option<i64>,
    day: Option<i64>,
) -> Result<String, ToolError> {
    let today = Local::now().date_naive();
    let part = |value: Option<i64>, fallback: u32| -> Result<u32, ToolError> {
        value.map_or(Ok(fallback), |v| {
            u32::try_from(v).map_err(|_| invalid(format!("Invalid date component: {v}")))
        })
    };
    let year = match year {
        Some(y) => i32::try_from(y).map_err(|_| invalid(format!("Invalid year: {y}")))?,
        None => today.year(),
    };
    let month = part(month, today.month())?;
    let day = part(day, today.day())?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| invalid(format!("Invalid start date: {year}-{month:02}-{day:02}")))
}

/// Builds the DSS trigger and the summary reported back to the caller.
///
/// Runs before any DSS call so that bad requests never touch the scenario.
fn build_trigger(
    args: &Args<'_>,
    project_key: &str,
    trigger_type: &str,
) -> Result<(Value, Value), ToolError> {
    if trigger_type == "time" {
        return Err(invalid(
            "Use specific time trigger types: periodic, hourly, daily, or monthly".to_string(),
        ));
    }
    if !TRIGGER_TYPES.contains(&trigger_type) {
        return Err(invalid(format!(
            "Unsupported trigger type '{trigger_type}'. Supported types: {}",
            TRIGGER_TYPES.join(", ")
        )));
    }

    match trigger_type {
        "periodic" => {
            let every_minutes = int_or(args, "every_minutes", 60)?;
            let trigger = json!({
                "type": "temporal",
                "name": format!("Every {every_minutes} minutes"),
                "active": true,
                "params": { "frequency": "Minutely", "count": every_minutes },
            });
            let details = json!({"type": trigger_type, "every_minutes": every_minutes});
            Ok((trigger, details))
        }
        "hourly" => {
            let starting_hour = int_or(args, "starting_hour", 0)?;
            let minute_of_hour = int_or(args, "minute_of_hour", 0)?;
            let repeat_every = int_or(args, "repeat_every", 1)?;
            let trigger = json!({
                "type": "temporal",
                "name": "Hourly",
                "active": true,
                "params": {
                    "frequency": "Hourly",
                    "repeatFrequency": repeat_every,
                    "startingFrom": starting_date(None, None, None)?,
                    "hour": starting_hour,
                    "minute": minute_of_hour,
                    "daysOfWeek": [],
                    "monthlyRunOn": "ON_THE_DAY",
                    "timezone": "SERVER",
                },
            });
            let details = json!({
                "type": trigger_type,
                "starting_hour": starting_hour,
                "minute_of_hour": minute_of_hour,
                "repeat_every": repeat_every,
            });
            Ok((trigger, details))
        }
        "daily" => {
            let hour = int_or(args, "hour", 2)?;
            let minute = int_or(args, "minute", 0)?;
            let year = args.opt_i64("year")?;
            let month = args.opt_i64("month")?;
            let day = args.opt_i64("day")?;
            let repeat_every = int_or(args, "repeat_every", 1)?;
            let timezone = args.opt_str("timezone")?.unwrap_or("SERVER");
            let trigger = json!({
                "type": "temporal",
                "name": "Daily",
                "active": true,
                "params": {
                    "frequency": "Daily",
                    "repeatFrequency": repeat_every,
                    "startingFrom": starting_date(year, month, day)?,
                    "hour": hour,
                    "minute": minute,
                    "daysOfWeek": [],
                    "monthlyRunOn": "ON_THE_DAY",
                    "timezone": timezone,
                },
            });
            let details = json!({
                "type": trigger_type,
                "hour": hour,
                "minute": minute,
                "year": year,
                "month": month,
                "day": day,
                "repeat_every": repeat_every,
                "timezone": timezone,
            });
            Ok((trigger, details))
        }
        "monthly" => {
            let day = int_or(args, "day", 1)?;
            let hour = int_or(args, "hour", 2)?;
            let minute = int_or(args, "minute", 0)?;
            let (year, month) = (args.opt_i64("year")?, args.opt_i64("month")?);
            let trigger = json!({
                "type": "temporal",
                "name": "Monthly",
                "active": true,
                "params": {
                    "frequency": "Monthly",
                    "repeatFrequency": 1,
                    "startingFrom": starting_date(year, month, Some(day))?,
                    "hour": hour,
                    "minute": minute,
                    "daysOfWeek": [],
                    "monthlyRunOn": "ON_THE_DAY",
                    "timezone": "SERVER",
                },
            });
            let details = json!({
                "type": trigger_type,
                "day": day,
                "hour": hour,
                "minute": minute,
                "year": year,
                "month": month,
            });
            Ok((trigger, details))
        }
        _ => {
            let dataset_name = args
                .opt_str("dataset_name")?
                .ok_or_else(|| {
                    invalid("dataset_name is required for dataset triggers".to_string())
                })?;
            let dataset_project = args.opt_str("dataset_project_key")?.unwrap_or(project_key);
            let trigger = json!({
                "type": "ds_modified",
                "name": format!("On change of {dataset_name}"),
                "active": true,
                "params": {
                    "datasets": [{ "projectKey": dataset_project, "datasetName": dataset_name }],
                },
            });
            let details = json!({
                "type": trigger_type,
                "dataset_name": dataset_name,
                "project_key": dataset_project,
            });
            Ok((trigger, details))
        }
    }
}

/// Applies updates to the metadata document; returns the names of the
/// fields that changed.
fn apply_metadata(
    metadata: &mut Value,
    description: Option<&str>,
    tags: Option<&Value>,
    custom_fields: Option<&Map<String, Value>>,
) -> Vec<&'static str> {
    let mut updated = Vec::new();
    if let Some(description) = description {
        metadata["description"] = json!(description);
        updated.push("description");
    }
    if let Some(tags) = tags {
        metadata["tags"] = tags.clone();
        updated.push("tags");
    }
    if let Some(custom_fields) = custom_fields {
        fields::merge(object_mut(metadata, "customFields"), custom_fields);
        updated.push("custom_fields");
    }
    updated
}

/// Replaces the script of the custom_python step at `index`.
fn set_step_script(settings: &mut Value, index: usize, script: &str) -> Result<(), ToolError> {
    edit_steps(settings, |steps| {
        let step = steps
            .get_mut(index)
            .ok_or_else(|| invalid(format!("Step index {index} is out of range")))?;
        if fields::text(step, "type") != "custom_python" {
            return Err(invalid(format!("Step {index} is not a custom_python step")));
        }
        object_mut(step, "params")["script"] = json!(script);
        Ok(())
    })
}

// ==================== Lifecycle ====================

pub async fn create_scenario(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_name = args.str("scenario_name")?;
    let scenario_type = args.str("scenario_type")?;
    if !SCENARIO_TYPES.contains(&scenario_type) {
        return Err(invalid(format!(
            "Invalid scenario type '{scenario_type}'. Must be one of: {}",
            quoted_list(&SCENARIO_TYPES)
        )));
    }
    let mut definition = args
        .opt_object("definition")?
        .map_or_else(|| json!({"params": {}}), |d| Value::Object(d.clone()));
    definition["name"] = json!(scenario_name);
    definition["type"] = json!(scenario_type);

    let created = dss.project(project_key).create_scenario(definition).await?;

    Ok(json!({
        "scenario_name": scenario_name,
        "scenario_id": fields::field(&created, "id"),
        "scenario_type": scenario_type,
        "project_key": project_key,
        "message": format!("Scenario '{scenario_name}' created successfully"),
    }))
}

pub async fn update_scenario(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;
    let description = args.opt_str("description")?;
    let tags = args.opt_str_list("tags")?.map(|t| json!(t));
    let custom_fields = args.opt_object("custom_fields")?;
    let name = args.opt_str("name")?;
    let active = args
        .get("active")
        .map(|_| args.bool_or("active", false))
        .transpose()?;
    let definition = args.opt_object("definition")?;
    let step_script = args.opt_str("step_script")?;
    let step_index = usize::try_from(args.u64_or("step_index", 0)?).unwrap_or(usize::MAX);

    let project = dss.project(project_key);
    let mut updated_fields: Vec<&str> = Vec::new();

    // Settings changes are prepared first so that a bad step index fails
    // before anything is written.
    let mut settings = None;
    let mut settings_fields = Vec::new();
    if name.is_some() || active.is_some() || definition.is_some() || step_script.is_some() {
        let mut current = project.scenario(scenario_id).await?;
        if let Some(name) = name {
            current["name"] = json!(name);
            settings_fields.push("name");
        }
        if let Some(active) = active {
            current["active"] = json!(active);
            settings_fields.push("active");
        }
        if let Some(definition) = definition {
            fields::merge(&mut current, definition);
            settings_fields.push("definition");
        }
        if let Some(script) = step_script {
            set_step_script(&mut current, step_index, script)?;
            settings_fields.push("step_script");
        }
        settings = Some(current);
    }

    if description.is_some() || tags.is_some() || custom_fields.is_some() {
        let mut metadata = project.scenario_metadata(scenario_id).await?;
        updated_fields.extend(apply_metadata(
            &mut metadata,
            description,
            tags.as_ref(),
            custom_fields,
        ));
        project.set_scenario_metadata(scenario_id, &metadata).await?;
    }
    if let Some(settings) = settings {
        project.set_scenario(scenario_id, &settings).await?;
        updated_fields.extend(settings_fields);
    }

    Ok(json!({
        "scenario_id": scenario_id,
        "updated_fields": updated_fields,
        "message": format!("Scenario '{scenario_id}' updated successfully"),
    }))
}

pub async fn delete_scenario(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;

    let project = dss.project(project_key);
    let settings = project.scenario(scenario_id).await?;
    let scenario_info = json!({
        "id": scenario_id,
        "name": fields::text_or(&settings, "name", scenario_id),
        "type": fields::text_or(&settings, "type", "unknown"),
    });

    project.delete_scenario(scenario_id).await?;

    Ok(json!({
        "deleted_scenario": scenario_info,
        "message": format!("Scenario '{scenario_id}' deleted successfully"),
    }))
}

// ==================== Triggers ====================

pub async fn add_scenario_trigger(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;
    let trigger_type = args.str("trigger_type")?;
    let (trigger, trigger_details) = build_trigger(args, project_key, trigger_type)?;

    let project = dss.project(project_key);
    let mut settings = project.scenario(scenario_id).await?;
    edit_triggers(&mut settings, |triggers| triggers.push(trigger));
    project.set_scenario(scenario_id, &settings).await?;

    Ok(json!({
        "scenario_id": scenario_id,
        "trigger_details": trigger_details,
        "message": format!("Trigger '{trigger_type}' added to scenario '{scenario_id}' successfully"),
    }))
}

pub async fn remove_scenario_trigger(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;
    let trigger_idx = args
        .opt_i64("trigger_idx")?
        .ok_or_else(|| invalid("Missing required parameter: trigger_idx".to_string()))?;

    let project = dss.project(project_key);
    let mut settings = project.scenario(scenario_id).await?;
    let (index, removed, remaining) = edit_triggers(&mut settings, |triggers| {
        let index = usize::try_from(trigger_idx)
            .ok()
            .filter(|&i| i < triggers.len())
            .ok_or_else(|| {
                invalid(format!(
                    "Invalid trigger index {trigger_idx}. Valid range: 0-{}",
                    i64::try_from(triggers.len()).unwrap_or(i64::MAX) - 1
                ))
            })?;
        let removed = triggers.remove(index);
        Ok::<_, ToolError>((index, removed, triggers.len()))
    })?;
    project.set_scenario(scenario_id, &settings).await?;

    Ok(json!({
        "scenario_id": scenario_id,
        "removed_trigger": {
            "index": index,
            "type": fields::text_or(&removed, "type", "unknown"),
            "name": fields::text_or(&removed, "name", "unnamed"),
        },
        "remaining_triggers": remaining,
        "message": format!("Trigger at index {index} removed from scenario '{scenario_id}' successfully"),
    }))
}

// ==================== Runs ====================

pub async fn run_scenario(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;
    let wait = args.bool_or("wait", true)?;
    let no_fail = args.bool_or("no_fail", false)?;

    let project = dss.project(project_key);
    let trigger_fire = project.run_scenario(scenario_id).await?;

    if !wait {
        return Ok(json!({
            "scenario_id": scenario_id,
            "trigger_fire_id": fields::text_or(&trigger_fire, "runId", "unknown"),
            "waited_for_completion": false,
            "message": format!("Scenario '{scenario_id}' run initiated successfully"),
        }));
    }

    let run = wait_for_scenario_run(&project, scenario_id, &trigger_fire, dss.polling()).await?;
    let summary = scenario_run_summary(&run);
    let outcome = fields::text_or(&summary, "outcome", "unknown").to_uppercase();

    let (status, message) = match outcome.as_str() {
        "SUCCESS" => ("ok", format!("Scenario '{scenario_id}' ran successfully")),
        "FAILED" => (
            if no_fail { "ok" } else { "error" },
            format!("Scenario '{scenario_id}' run failed"),
        ),
        _ => (
            "ok",
            format!("Scenario '{scenario_id}' run completed with outcome: {outcome}"),
        ),
    };

    Ok(json!({
        "status": status,
        "run_info": {
            "scenario_id": scenario_id,
            "run_id": summary["run_id"],
            "outcome": outcome,
            "start_time": summary["start_time"],
            "end_time": summary["end_time"],
            "duration": summary["duration"],
            "waited_for_completion": true,
        },
        "message": message,
    }))
}

pub async fn get_scenario_run_history(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;
    let limit = args.u64_or("limit", 10)?;

    let runs = dss
        .project(project_key)
        .scenario_last_runs(scenario_id, limit)
        .await?;
    let run_history: Vec<Value> = runs.iter().map(scenario_run_summary).collect();

    Ok(json!({
        "scenario_id": scenario_id,
        "total_runs": run_history.len(),
        "message": format!("Retrieved {} runs for scenario '{scenario_id}'", run_history.len()),
        "run_history": run_history,
    }))
}

/// Collects step results and job logs of one run.
async fn run_logs(project: &Project<'_>, scenario_id: &str, run: &Value) -> Vec<Value> {
    let run_id = fields::text(run, "runId");
    let start = fields::field(run, "start");
    let mut logs = Vec::new();

    let details = match project.scenario_run_details(scenario_id, run_id).await {
        Ok(details) => details,
        Err(e) => {
            logs.push(json!({
                "type": "error",
                "content": format!("Could not retrieve step runs: {e}"),
                "timestamp": start,
            }));
            return logs;
        }
    };

    let mut job_ids: Vec<String> = Vec::new();
    for (index, step_run) in fields::list(&details, "stepRuns").iter().enumerate() {
        let step_name = step_run
            .pointer("/step/name")
            .and_then(Value::as_str)
            .map_or_else(|| format!("Step {index}"), str::to_string);
        let outcome = step_run
            .pointer("/result/outcome")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let mut content = format!("Outcome: {outcome}");
        if let Some(message) = step_run
            .pointer("/result/thrown/message")
            .and_then(Value::as_str)
        {
            content.push_str("\nError: ");
            content.push_str(message);
        }
        logs.push(json!({
            "type": "step_log",
            "step_index": index,
            "step_name": step_name,
            "content": content,
            "timestamp": step_run.get("start").cloned().unwrap_or_else(|| start.clone()),
        }));

        for item in fields::list(step_run, "additionalReportItems") {
            if let Some(job_id) = item.get("jobId").and_then(Value::as_str) {
                job_ids.push(job_id.to_string());
            }
        }
    }

    for job_id in job_ids {
        match project.job_log(&job_id).await {
            Ok(content) if !content.is_empty() => logs.push(json!({
                "type": "job_log",
                "job_id": job_id,
                "content": content,
                "timestamp": start,
            })),
            Ok(_) => {}
            Err(e) => logs.push(json!({
                "type": "job_error",
                "job_id": job_id,
                "content": format!("Could not retrieve job log: {e}"),
                "timestamp": start,
            })),
        }
    }
    logs
}

pub async fn get_scenario_logs(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;
    let run_id = args.opt_str("run_id")?;

    let project = dss.project(project_key);
    let runs = project
        .scenario_last_runs(scenario_id, LOG_RUN_WINDOW)
        .await?;
    if runs.is_empty() {
        return Ok(json!({
            "message": "No runs found for this scenario",
            "logs": [],
            "run_info": {},
        }));
    }

    let run = match run_id {
        Some(id) => runs
            .iter()
            .find(|r| fields::text(r, "runId") == id)
            .ok_or_else(|| invalid(format!("Run ID '{id}' not found")))?,
        None => &runs[0],
    };

    let summary = scenario_run_summary(run);
    let logs = run_logs(&project, scenario_id, run).await;

    Ok(json!({
        "scenario_id": scenario_id,
        "run_info": {
            "run_id": summary["run_id"],
            "start_time": summary["start_time"],
            "end_time": summary["end_time"],
            "outcome": summary["outcome"],
            "duration": summary["duration"],
            "trigger": summary["trigger_type"],
        },
        "log_count": logs.len(),
        "logs": logs,
    }))
}

// ==================== Inspection ====================

pub async fn get_scenario_info(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;

    let project = dss.project(project_key);
    let settings = project.scenario(scenario_id).await?;
    let metadata = project.scenario_metadata(scenario_id).await.unwrap_or_else(|e| {
        warn!(scenario_id, error = %e, "Scenario metadata unavailable");
        json!({})
    });
    let status = project.scenario_status(scenario_id).await.unwrap_or_else(|e| {
        warn!(scenario_id, error = %e, "Scenario status unavailable");
        json!({})
    });
    let last_run = project
        .scenario_last_runs(scenario_id, 1)
        .await
        .ok()
        .and_then(|runs| runs.first().map(scenario_run_summary));

    let triggers: Vec<Value> = fields::list(&settings, "triggers")
        .iter()
        .map(trigger_summary)
        .collect();

    Ok(json!({
        "scenario_info": {
            "id": scenario_id,
            "name": fields::text_or(&settings, "name", scenario_id),
            "type": fields::text_or(&settings, "type", "unknown"),
            "active": fields::flag(&settings, "active", false),
            "description": fields::text(&metadata, "description"),
            "tags": fields::array(&metadata, "tags"),
            "custom_fields": fields::object(&metadata, "customFields"),
            "trigger_count": triggers.len(),
            "triggers": triggers,
            "last_run": {
                "outcome": last_run.as_ref().map(|r| r["outcome"].clone()),
                "start_time": last_run.as_ref().map(|r| r["start_time"].clone()),
                "end_time": last_run.as_ref().map(|r| r["end_time"].clone()),
                "duration": last_run.as_ref().map(|r| r["duration"].clone()),
            },
            "next_run": fields::field(&status, "nextRun"),
            "is_active": fields::field(&status, "active"),
        }
    }))
}

pub async fn list_scenarios(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_type = args.opt_str("scenario_type")?;
    let active_only = args.bool_or("active_only", false)?;

    let project = dss.project(project_key);
    let mut scenarios = Vec::new();

    for summary in project.list_scenarios().await? {
        let id = fields::text_or(&summary, "id", fields::text(&summary, "name"));
        match project.scenario(id).await {
            Ok(settings) => {
                let stype = fields::text(&settings, "type");
                let active = fields::flag(&settings, "active", false);
                if scenario_type.is_some_and(|t| t != stype) || (active_only && !active) {
                    continue;
                }
                scenarios.push(json!({
                    "id": id,
                    "name": fields::text_or(&settings, "name", id),
                    "type": fields::text_or(&settings, "type", "unknown"),
                    "active": active,
                    "description": fields::text(&summary, "description"),
                    "tags": fields::array(&summary, "tags"),
                    "trigger_count": fields::list(&settings, "triggers").len(),
                }));
            }
            Err(e) => scenarios.push(json!({
                "id": id,
                "name": fields::text_or(&summary, "name", id),
                "type": fields::text_or(&summary, "type", "unknown"),
                "active": fields::flag(&summary, "active", false),
                "description": fields::text(&summary, "description"),
                "tags": fields::array(&summary, "tags"),
                "trigger_count": 0,
                "error": format!("Could not get full details: {e}"),
            })),
        }
    }

    Ok(json!({
        "total_count": scenarios.len(),
        "scenarios": scenarios,
        "project_key": project_key,
        "filters": {
            "scenario_type": scenario_type,
            "active_only": active_only,
        },
    }))
}

fn step_info(index: usize, step: &Value) -> Value {
    let step_type = fields::text_or(step, "type", "unknown");
    let params = fields::object(step, "params");
    let name = step
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| format!("Step {index}"), str::to_string);
    let mut info = json!({
        "index": index,
        "name": name,
        "type": step_type,
        "enabled": fields::flag(step, "enabled", true),
        "params": params,
    });
    match step_type {
        "custom_python" => {
            let script = fields::text(&params, "script");
            info["code"] = json!(script);
            let code_lines = if script.is_empty() {
                0
            } else {
                fields::line_count(script)
            };
            info["code_lines"] = json!(code_lines);
        }
        "build_flowitem" => {
            let items = fields::array(&params, "items");
            info["build_count"] = json!(items.as_array().map_or(0, Vec::len));
            info["build_items"] = items;
        }
        "invalidate_cache" => info["invalidate_items"] = fields::array(&params, "items"),
        "sync_hive" => info["sync_items"] = fields::array(&params, "items"),
        "run_scenario" => info["nested_scenarios"] = fields::array(&params, "scenarioRuns"),
        _ => {}
    }
    info
}

pub async fn get_scenario_steps(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let scenario_id = args.str("scenario_id")?;

    let settings = dss.project(project_key).scenario(scenario_id).await?;
    let steps: Vec<Value> = steps(&settings)
        .iter()
        .enumerate()
        .map(|(i, s)| step_info(i, s))
        .collect();

    Ok(json!({
        "scenario_info": {
            "id": scenario_id,
            "name": fields::text_or(&settings, "name", scenario_id),
            "type": fields::text_or(&settings, "type", "unknown"),
            "active": fields::flag(&settings, "active", false),
            "step_count": steps.len(),
        },
        "step_count": steps.len(),
        "steps": steps,
    }))
}

// ==================== Cloning ====================

/// Index-keyed modification map (`{"0": {...}}`), skipping non-numeric keys.
fn indexed(map: Option<&Value>) -> Vec<(usize, &Value)> {
    map.and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Applies clone modifications to the new scenario settings.
fn apply_clone_modifications(settings: &mut Value, modifications: &Map<String, Value>) {
    if let Some(active) = modifications.get("active").and_then(Value::as_bool) {
        settings["active"] = json!(active);
    }

    edit_steps(settings, |steps| {
        for (index, changes) in indexed(modifications.get("step_modifications")) {
            if let Some(step) = steps.get_mut(index) {
                modify_step(step, changes);
            }
        }
    });

    edit_triggers(settings, |triggers| {
        for (index, changes) in indexed(modifications.get("trigger_modifications")) {
            if let (Some(trigger), Some(changes)) = (triggers.get_mut(index), changes.as_object()) {
                fields::merge(trigger, changes);
            }
        }
        if let Some(new_triggers) = modifications.get("new_triggers").and_then(Value::as_array) {
            triggers.extend(new_triggers.iter().cloned());
        }
        if let Some(remove) = modifications.get("remove_triggers").and_then(Value::as_array) {
            let mut indices: Vec<usize> = remove
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|i| usize::try_from(i).ok())
                .collect();
            indices.sort_unstable_by(|a, b| b.cmp(a));
            indices.dedup();
            for index in indices {
                if index < triggers.len() {
                    triggers.remove(index);
                }
            }
        }
    });
}

fn modify_step(step: &mut Value, changes: &Value) {
    if let Some(params) = changes.get("params").and_then(Value::as_object) {
        fields::merge(object_mut(step, "params"), params);
    }
    if let Some(code) = changes.get("code").and_then(Value::as_str) {
        if fields::text(step, "type") == "custom_python" {
            object_mut(step, "params")["script"] = json!(code);
        }
    }
    if let Some(name) = changes.get("name") {
        step["name"] = name.clone();
    }
    if let Some(enabled) = changes.get("enabled") {
        step["enabled"] = enabled.clone();
    }
}

pub async fn clone_scenario(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let source_id = args.str("source_scenario_id")?;
    let new_name = args.str("new_scenario_name")?;
    let modifications = args.opt_object("modifications")?;

    let project = dss.project(project_key);
    let source = project.scenario(source_id).await?;
    let scenario_type = fields::text_or(&source, "type", "step_based");

    let created = project
        .create_scenario(json!({
            "name": new_name,
            "type": scenario_type,
            "params": fields::object(&source, "params"),
        }))
        .await?;
    let new_id = fields::text(&created, "id").to_string();
    if new_id.is_empty() {
        return Err(
            DssError::InvalidResponse("scenario creation returned no id".to_string()).into(),
        );
    }

    let mut settings = project.scenario(&new_id).await?;
    settings["name"] = json!(new_name);
    settings["active"] = json!(fields::flag(&source, "active", false));
    settings["params"] = fields::object(&source, "params");
    settings["triggers"] = fields::array(&source, "triggers");
    if let Some(modifications) = modifications {
        apply_clone_modifications(&mut settings, modifications);

        let description = modifications.get("description").and_then(Value::as_str);
        let tags = modifications.get("tags");
        if description.is_some() || tags.is_some() {
            let mut metadata = project.scenario_metadata(&new_id).await?;
            apply_metadata(&mut metadata, description, tags, None);
            project.set_scenario_metadata(&new_id, &metadata).await?;
        }
    }
    project.set_scenario(&new_id, &settings).await?;

    let applied: Vec<String> = modifications.map_or_else(Vec::new, |m| m.keys().cloned().collect());
    Ok(json!({
        "source_scenario_id": source_id,
        "new_scenario_id": new_id,
        "new_scenario_name": new_name,
        "scenario_info": {
            "id": new_id,
            "name": new_name,
            "type": scenario_type,
            "active": fields::flag(&settings, "active", false),
            "step_count": steps(&settings).len(),
            "trigger_count": fields::list(&settings, "triggers").len(),
        },
        "modifications_applied": applied,
    }))
}
