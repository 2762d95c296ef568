//! Productivity tools: project duplication, configuration export and batch
//! updates by name pattern.

use chrono::Local;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::fields::{self, object_mut, percentage, Matcher};
use super::{tool, Args, ToolError, ToolResult};
use crate::dss::{project_label, recipe_refs, Dss, Project};
use crate::error::DssError;
use crate::mcp::server::ToolDefinition;

/// Recipe types whose payload is source code.
const CODE_RECIPE_TYPES: [&str; 6] = ["python", "r", "sql", "pyspark", "scala", "shell"];

const BATCH_OBJECT_TYPES: [&str; 3] = ["datasets", "recipes", "scenarios"];

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "duplicate_project_structure",
            "Copy the variables, datasets, recipes and scenarios of a project into another \
             project, creating the target project if needed.",
            json!({
                "type": "object",
                "properties": {
                    "source_project_key": { "type": "string", "description": "Project to copy from" },
                    "target_project_key": { "type": "string", "description": "Project to copy into" },
                    "include_data": { "type": "boolean", "description": "Also copy dataset contents (default false)" }
                },
                "required": ["source_project_key", "target_project_key"]
            }),
        ),
        tool(
            "export_project_config",
            "Export the configuration of a project (info, variables, settings, datasets, \
             recipes, scenarios) as JSON or YAML.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "format": { "type": "string", "enum": ["json", "yaml"], "description": "Output format (default json)" }
                },
                "required": ["project_key"]
            }),
        ),
        tool(
            "batch_update_objects",
            "Apply the same updates to every dataset, recipe or scenario whose name matches a \
             pattern. Datasets accept description, tags, settings; recipes description, tags, \
             code, recipe_params; scenarios description, tags, active.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "object_type": { "type": "string", "enum": BATCH_OBJECT_TYPES, "description": "Kind of objects to update" },
                    "pattern": { "type": "string", "description": "Name pattern (case-insensitive regex, or substring)" },
                    "updates": { "type": "object", "description": "Updates to apply" }
                },
                "required": ["project_key", "object_type", "pattern", "updates"]
            }),
        ),
    ]
}

// ==================== Duplication ====================

/// Objects copied so far, plus the errors that did not stop the copy.
#[derive(Debug, Default)]
struct Copied {
    variables: Vec<String>,
    datasets: Vec<Value>,
    recipes: Vec<Value>,
    scenarios: Vec<Value>,
    errors: Vec<String>,
}

async fn copy_variables(source: &Project<'_>, target: &Project<'_>, copied: &mut Copied) {
    let result = async {
        let variables = source.variables().await?;
        target.set_variables(&variables).await?;
        Ok::<_, DssError>(variables)
    }
    .await;
    match result {
        Ok(variables) => {
            for scope in ["standard", "local"] {
                if let Some(vars) = variables.get(scope).and_then(Value::as_object) {
                    copied.variables.extend(vars.keys().cloned());
                }
            }
        }
        Err(e) => copied.errors.push(format!("Failed to copy variables: {e}")),
    }
}

async fn copy_dataset(
    source: &Project<'_>,
    target: &Project<'_>,
    name: &str,
    include_data: bool,
    copied: &mut Copied,
) -> Result<(), DssError> {
    let definition = source.dataset(name).await?;
    let dataset_type = fields::text(&definition, "type");
    if dataset_type == "UploadedFiles" {
        copied
            .errors
            .push(format!("Skipped uploaded file dataset: {name}"));
        return Ok(());
    }
    let schema = source.dataset_schema(name).await?;

    target
        .create_dataset(json!({
            "projectKey": target.key(),
            "name": name,
            "type": dataset_type,
            "params": fields::object(&definition, "params"),
            "formatType": fields::text_or(&definition, "formatType", "csv"),
            "formatParams": fields::object(&definition, "formatParams"),
        }))
        .await?;
    target.set_dataset_schema(name, &schema).await?;

    if include_data {
        copied
            .errors
            .push(format!("Data not copied for {name}: rebuild the dataset in the target project"));
    }
    copied.datasets.push(json!({
        "name": name,
        "type": dataset_type,
        "data_copied": false,
    }));
    Ok(())
}

async fn copy_recipe(
    source: &Project<'_>,
    target: &Project<'_>,
    name: &str,
    copied: &mut Copied,
) -> Result<(), DssError> {
    let settings = source.recipe(name).await?;
    let recipe = &settings["recipe"];
    let recipe_type = fields::text(recipe, "type");

    target
        .create_recipe(json!({
            "recipePrototype": {
                "type": recipe_type,
                "name": name,
                "projectKey": target.key(),
                "inputs": fields::object(recipe, "inputs"),
                "outputs": fields::object(recipe, "outputs"),
            },
            "creationSettings": {},
        }))
        .await?;

    let mut target_settings = target.recipe(name).await?;
    object_mut(&mut target_settings, "recipe")["params"] = fields::object(recipe, "params");
    if CODE_RECIPE_TYPES.contains(&recipe_type) {
        target_settings["payload"] = settings["payload"].clone();
    }
    if let Err(e) = target.set_recipe(name, &target_settings).await {
        copied
            .errors
            .push(format!("Failed to copy code and parameters for recipe {name}: {e}"));
    }

    copied.recipes.push(json!({
        "name": name,
        "type": recipe_type,
        "inputs": recipe_refs(recipe, "inputs"),
        "outputs": recipe_refs(recipe, "outputs"),
    }));
    Ok(())
}

async fn copy_scenario(
    source: &Project<'_>,
    target: &Project<'_>,
    id: &str,
    copied: &mut Copied,
) -> Result<(), DssError> {
    let settings = source.scenario(id).await?;
    let metadata = source.scenario_metadata(id).await?;
    let name = fields::text_or(&settings, "name", id);
    let scenario_type = fields::text(&settings, "type");

    let created = target
        .create_scenario(json!({
            "name": name,
            "type": scenario_type,
            "params": fields::object(&settings, "params"),
        }))
        .await?;
    let new_id = fields::text_or(&created, "id", id);

    let mut target_settings = target.scenario(new_id).await?;
    target_settings["params"] = fields::object(&settings, "params");
    target_settings["triggers"] = fields::array(&settings, "triggers");
    target_settings["active"] = json!(fields::flag(&settings, "active", false));
    target.set_scenario(new_id, &target_settings).await?;
    target.set_scenario_metadata(new_id, &metadata).await?;

    copied.scenarios.push(json!({
        "name": name,
        "type": scenario_type,
        "id": new_id,
        "steps": settings.pointer("/params/steps").and_then(Value::as_array).map_or(0, Vec::len),
        "triggers": fields::list(&settings, "triggers").len(),
    }));
    Ok(())
}

pub async fn duplicate_project_structure(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let source_key = args.str("source_project_key")?;
    let target_key = args.str("target_project_key")?;
    let include_data = args.bool_or("include_data", false)?;

    if let Err(e) = dss.create_project(target_key, target_key).await {
        if !e.to_string().to_lowercase().contains("already exists") {
            return Ok(json!({
                "status": "error",
                "message": format!("Failed to create target project: {e}"),
            }));
        }
        info!(target_key, "Target project exists, copying into it");
    }

    let source = dss.project(source_key);
    let target = dss.project(target_key);
    let mut copied = Copied::default();

    copy_variables(&source, &target, &mut copied).await;

    let datasets = source.list_datasets().await?;
    for summary in &datasets {
        let name = fields::text(summary, "name");
        if let Err(e) = copy_dataset(&source, &target, name, include_data, &mut copied).await {
            copied
                .errors
                .push(format!("Failed to copy dataset {name}: {e}"));
        }
    }

    let recipes = source.list_recipes().await?;
    for summary in &recipes {
        let name = fields::text(summary, "name");
        if let Err(e) = copy_recipe(&source, &target, name, &mut copied).await {
            copied
                .errors
                .push(format!("Failed to copy recipe {name}: {e}"));
        }
    }

    let scenarios = source.list_scenarios().await?;
    for summary in &scenarios {
        let id = fields::text(summary, "id");
        if let Err(e) = copy_scenario(&source, &target, id, &mut copied).await {
            let name = fields::text_or(summary, "name", id);
            copied
                .errors
                .push(format!("Failed to copy scenario {name}: {e}"));
        }
    }

    let total_copied = copied.datasets.len() + copied.recipes.len() + copied.scenarios.len();
    let total_source = datasets.len() + recipes.len() + scenarios.len();
    if !copied.errors.is_empty() {
        warn!(
            errors = copied.errors.len(),
            "Project duplicated with errors"
        );
    }

    Ok(json!({
        "duplication_summary": {
            "source_project": source_key,
            "target_project": target_key,
            "include_data": include_data,
            "datasets_copied": copied.datasets.len(),
            "recipes_copied": copied.recipes.len(),
            "scenarios_copied": copied.scenarios.len(),
            "variables_copied": copied.variables.len(),
            "total_errors": copied.errors.len(),
            "success_rate": percentage(total_copied, total_source),
        },
        "copied_objects": {
            "datasets": copied.datasets,
            "recipes": copied.recipes,
            "scenarios": copied.scenarios,
            "variables": copied.variables,
            "errors": copied.errors,
        },
    }))
}

// ==================== Export ====================

async fn export_dataset(project: &Project<'_>, summary: &Value) -> Value {
    let name = fields::text(summary, "name");
    let exported = async {
        let settings = project.dataset(name).await?;
        let schema = project.dataset_schema(name).await?;
        Ok::<_, DssError>(json!({
            "name": name,
            "type": fields::field(summary, "type"),
            "description": fields::text(summary, "description"),
            "tags": fields::array(summary, "tags"),
            "settings": settings,
            "schema": schema,
        }))
    }
    .await;
    exported.unwrap_or_else(|e| {
        json!({"name": name, "error": format!("Failed to export dataset: {e}")})
    })
}

async fn export_recipe(project: &Project<'_>, summary: &Value) -> Value {
    let name = fields::text(summary, "name");
    match project.recipe(name).await {
        Ok(settings) => {
            let recipe_type = fields::text(summary, "type");
            let mut exported = json!({
                "name": name,
                "type": recipe_type,
                "description": fields::text(summary, "description"),
                "tags": fields::array(summary, "tags"),
                "definition": settings["recipe"],
            });
            if CODE_RECIPE_TYPES.contains(&recipe_type) {
                let code = settings["payload"]
                    .as_str()
                    .unwrap_or("# Could not retrieve code");
                exported["code"] = json!(code);
            }
            exported
        }
        Err(e) => json!({"name": name, "error": format!("Failed to export recipe: {e}")}),
    }
}

async fn export_scenario(project: &Project<'_>, summary: &Value) -> Value {
    let id = fields::text(summary, "id");
    let exported = async {
        let settings = project.scenario(id).await?;
        let metadata = project.scenario_metadata(id).await?;
        Ok::<_, DssError>(json!({
            "id": id,
            "name": fields::field(summary, "name"),
            "type": fields::field(summary, "type"),
            "description": fields::text(summary, "description"),
            "tags": fields::array(summary, "tags"),
            "active": fields::flag(summary, "active", false),
            "metadata": metadata,
            "steps": settings.pointer("/params/steps").cloned().unwrap_or_else(|| json!([])),
            "triggers": fields::array(&settings, "triggers"),
            "settings": settings,
        }))
    }
    .await;
    exported.unwrap_or_else(|e| {
        json!({
            "id": id,
            "name": fields::field(summary, "name"),
            "error": format!("Failed to export scenario: {e}"),
        })
    })
}

fn exported_count(entries: &[Value]) -> usize {
    entries.iter().filter(|e| e.get("error").is_none()).count()
}

fn object_len(value: &Value) -> usize {
    value.as_object().map_or(0, Map::len)
}

pub async fn export_project_config(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let yaml = args
        .opt_str("format")?
        .is_some_and(|f| f.eq_ignore_ascii_case("yaml"));

    let project = dss.project(project_key);
    let metadata = project.metadata().await?;
    let variables = project.variables().await?;
    let settings = project.settings().await?;

    let mut datasets = Vec::new();
    for summary in project.list_datasets().await? {
        datasets.push(export_dataset(&project, &summary).await);
    }
    let mut recipes = Vec::new();
    for summary in project.list_recipes().await? {
        recipes.push(export_recipe(&project, &summary).await);
    }
    let mut scenarios = Vec::new();
    for summary in project.list_scenarios().await? {
        scenarios.push(export_scenario(&project, &summary).await);
    }

    let standard = fields::object(&variables, "standard");
    let local = fields::object(&variables, "local");
    let mut stats = json!({
        "project_key": project_key,
        "format": if yaml { "yaml" } else { "json" },
        "datasets_exported": exported_count(&datasets),
        "recipes_exported": exported_count(&recipes),
        "scenarios_exported": exported_count(&scenarios),
        "variables_exported": object_len(&standard) + object_len(&local),
        "total_objects": datasets.len() + recipes.len() + scenarios.len(),
    });

    let code_envs = settings
        .pointer("/settings/codeEnvs")
        .cloned()
        .unwrap_or_else(|| json!({}));
    let config = json!({
        "project_info": {
            "key": project_key,
            "name": project_label(&metadata, project_key),
            "description": fields::text(&metadata, "description"),
            "tags": fields::array(&metadata, "tags"),
            "owner": fields::text_or(&metadata, "owner", "unknown"),
            "custom_fields": fields::object(&metadata, "customFields"),
            "creation_date": fields::field(&metadata, "creationDate"),
            "export_date": Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        },
        "variables": {
            "standard": standard,
            "local": local,
        },
        "settings": {
            "code_env_settings": code_envs,
            "bundle_export_options": fields::object(&settings, "bundleExportOptions"),
            "git_reference": fields::object(&settings, "gitReference"),
            "flow_display_settings": fields::object(&settings, "flowDisplaySettings"),
        },
        "datasets": datasets,
        "recipes": recipes,
        "scenarios": scenarios,
    });

    let output = if yaml {
        match serde_yaml::to_string(&config) {
            Ok(output) => output,
            Err(e) => {
                return Ok(json!({
                    "status": "error",
                    "message": format!("Failed to format as YAML: {e}"),
                }))
            }
        }
    } else {
        super::pretty(&config)
    };

    stats["export_size"] = json!(output.chars().count());
    Ok(json!({
        "export_stats": stats,
        "content_type": if yaml { "yaml" } else { "json" },
        "config": config,
        "config_output": output,
    }))
}

// ==================== Batch updates ====================

/// Writes `description` and `tags` updates into a metadata document.
/// Returns `true` if anything changed.
fn apply_metadata_updates(metadata: &mut Value, updates: &Map<String, Value>) -> bool {
    let mut changed = false;
    for key in ["description", "tags"] {
        if let Some(value) = updates.get(key) {
            if !metadata.is_object() {
                *metadata = json!({});
            }
            metadata[key] = value.clone();
            changed = true;
        }
    }
    changed
}

fn wants_metadata(updates: &Map<String, Value>) -> bool {
    updates.contains_key("description") || updates.contains_key("tags")
}

async fn update_dataset(
    project: &Project<'_>,
    name: &str,
    updates: &Map<String, Value>,
) -> Result<(), DssError> {
    if wants_metadata(updates) {
        let mut metadata = project.dataset_metadata(name).await?;
        apply_metadata_updates(&mut metadata, updates);
        project.set_dataset_metadata(name, &metadata).await?;
    }
    if let Some(settings) = updates.get("settings").and_then(Value::as_object) {
        let mut definition = project.dataset(name).await?;
        fields::merge(&mut definition, settings);
        project.set_dataset(name, &definition).await?;
    }
    Ok(())
}

async fn update_recipe(
    project: &Project<'_>,
    name: &str,
    recipe_type: &str,
    updates: &Map<String, Value>,
) -> Result<(), DssError> {
    if wants_metadata(updates) {
        let mut metadata = project.recipe_metadata(name).await?;
        apply_metadata_updates(&mut metadata, updates);
        project.set_recipe_metadata(name, &metadata).await?;
    }
    let code = updates
        .get("code")
        .and_then(Value::as_str)
        .filter(|_| CODE_RECIPE_TYPES.contains(&recipe_type));
    let params = updates.get("recipe_params");
    if code.is_some() || params.is_some() {
        let mut settings = project.recipe(name).await?;
        if let Some(code) = code {
            settings["payload"] = json!(code);
        }
        if let Some(params) = params {
            object_mut(&mut settings, "recipe")["params"] = params.clone();
        }
        project.set_recipe(name, &settings).await?;
    }
    Ok(())
}

async fn update_scenario(
    project: &Project<'_>,
    id: &str,
    updates: &Map<String, Value>,
) -> Result<(), DssError> {
    if wants_metadata(updates) {
        let mut metadata = project.scenario_metadata(id).await?;
        apply_metadata_updates(&mut metadata, updates);
        project.set_scenario_metadata(id, &metadata).await?;
    }
    if let Some(active) = updates.get("active") {
        let mut settings = project.scenario(id).await?;
        settings["active"] = active.clone();
        project.set_scenario(id, &settings).await?;
    }
    Ok(())
}

pub async fn batch_update_objects(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let object_type = args.str("object_type")?;
    let pattern = args.str("pattern")?;
    let updates = args.object("updates")?;

    let kind = object_type.to_lowercase();
    if !BATCH_OBJECT_TYPES.contains(&kind.as_str()) {
        return Err(ToolError::InvalidArgument(format!(
            "Unsupported object type: {object_type}. Supported types: {}",
            BATCH_OBJECT_TYPES.join(", ")
        )));
    }

    let project = dss.project(project_key);
    let matcher = Matcher::new(pattern);
    let applied: Vec<&String> = updates.keys().collect();
    let mut updated = Vec::new();
    let mut failed = Vec::new();

    let objects = match kind.as_str() {
        "datasets" => project.list_datasets().await?,
        "recipes" => project.list_recipes().await?,
        _ => project.list_scenarios().await?,
    };

    for object in objects
        .iter()
        .filter(|o| matcher.is_match(fields::text(o, "name")))
    {
        let name = fields::text(object, "name");
        let (label, result) = match kind.as_str() {
            "datasets" => ("dataset", update_dataset(&project, name, updates).await),
            "recipes" => (
                "recipe",
                update_recipe(&project, name, fields::text(object, "type"), updates).await,
            ),
            _ => (
                "scenario",
                update_scenario(&project, fields::text(object, "id"), updates).await,
            ),
        };

        let mut entry = json!({"name": name, "type": label});
        if label == "scenario" {
            entry["id"] = fields::field(object, "id");
        }
        match result {
            Ok(()) => {
                entry["updates_applied"] = json!(applied);
                updated.push(entry);
            }
            Err(e) => {
                entry["error"] = json!(e.to_string());
                failed.push(entry);
            }
        }
    }

    Ok(json!({
        "project_key": project_key,
        "update_summary": {
            "object_type": object_type,
            "pattern": pattern,
            "updates_requested": updates,
            "objects_updated": updated.len(),
            "objects_failed": failed.len(),
            "success_rate": percentage(updated.len(), updated.len() + failed.len()),
        },
        "updated_objects": updated,
        "failed_updates": failed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_updates_only_touch_description_and_tags() {
        let mut metadata = json!({"description": "old", "customFields": {"a": 1}});
        let updates = json!({"tags": ["x"], "active": true});
        assert!(apply_metadata_updates(&mut metadata, updates.as_object().unwrap()));
        assert_eq!(
            metadata,
            json!({"description": "old", "tags": ["x"], "customFields": {"a": 1}})
        );

        let nothing = json!({"code": "print(1)"});
        assert!(!apply_metadata_updates(&mut metadata, nothing.as_object().unwrap()));
    }

    #[test]
    fn exported_count_skips_failures() {
        let entries = vec![json!({"name": "a"}), json!({"name": "b", "error": "boom"})];
        assert_eq!(exported_count(&entries), 1);
    }
}
