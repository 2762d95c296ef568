//! Recipe tools: create, update, delete, run, inspect and list recipes.

use serde_json::{json, Value};

use super::fields::{self, object_mut};
use super::jobs::{build_and_wait, check_build_mode};
use super::{tool, Args, ToolError, ToolResult};
use crate::dss::{recipe_refs, Dss};
use crate::mcp::server::ToolDefinition;

/// Recipe types whose payload is source code.
const CODE_RECIPE_TYPES: [&str; 6] = ["python", "r", "sql", "pyspark", "sparkr", "sparksql"];

/// Connection used for new managed outputs when none is given.
const DEFAULT_CONNECTION: &str = "filesystem_managed";

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "create_recipe",
            "Create a new recipe in a Dataiku project. Outputs are dataset names or \
             {name, new, connection, append} objects; 'new' outputs are created as managed \
             datasets.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_type": { "type": "string", "description": "Type of recipe (e.g. 'python', 'sql', 'join')" },
                    "recipe_name": { "type": "string", "description": "Name for the new recipe" },
                    "inputs": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Input dataset names"
                    },
                    "outputs": {
                        "type": "array",
                        "items": {
                            "oneOf": [
                                { "type": "string" },
                                {
                                    "type": "object",
                                    "properties": {
                                        "name": { "type": "string" },
                                        "new": { "type": "boolean" },
                                        "connection": { "type": "string" },
                                        "append": { "type": "boolean" }
                                    },
                                    "required": ["name"]
                                }
                            ]
                        },
                        "description": "Output dataset names or specifications"
                    },
                    "code": { "type": "string", "description": "Code for code recipes (python, r, sql, pyspark, sparkr, sparksql)" }
                },
                "required": ["project_key", "recipe_type", "recipe_name", "inputs", "outputs"]
            }),
        ),
        tool(
            "update_recipe",
            "Update an existing recipe's code, metadata or engine settings.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_name": { "type": "string", "description": "Name of the recipe to update" },
                    "code": { "type": "string", "description": "New code content" },
                    "description": { "type": "string", "description": "Recipe description" },
                    "tags": { "type": "array", "items": { "type": "string" }, "description": "Recipe tags" },
                    "custom_fields": { "type": "object", "description": "Custom metadata fields to merge" },
                    "engine_type": { "type": "string", "description": "Execution engine" },
                    "container_conf": { "type": "object", "description": "Container execution configuration" },
                    "resource_settings": { "type": "object", "description": "Resource settings" }
                },
                "required": ["project_key", "recipe_name"]
            }),
        ),
        tool(
            "delete_recipe",
            "Delete a recipe from a project.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_name": { "type": "string", "description": "Name of the recipe to delete" }
                },
                "required": ["project_key", "recipe_name"]
            }),
        ),
        tool(
            "run_recipe",
            "Run a recipe by building its outputs and wait for the job to finish.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_name": { "type": "string", "description": "Name of the recipe to run" },
                    "build_mode": {
                        "type": "string",
                        "enum": ["RECURSIVE_BUILD", "NON_RECURSIVE_FORCED_BUILD", "RECURSIVE_FORCED_BUILD"],
                        "description": "Build mode (default NON_RECURSIVE_FORCED_BUILD)"
                    }
                },
                "required": ["project_key", "recipe_name"]
            }),
        ),
        tool(
            "get_recipe_info",
            "Get detailed information about a recipe: type, inputs, outputs and metadata.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_name": { "type": "string", "description": "Name of the recipe to inspect" }
                },
                "required": ["project_key", "recipe_name"]
            }),
        ),
        tool(
            "list_recipes",
            "List all recipes in a project, optionally filtered by type.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_type": { "type": "string", "description": "Only list recipes of this type" }
                },
                "required": ["project_key"]
            }),
        ),
    ]
}

/// One parsed entry of `create_recipe.outputs`.
#[derive(Debug, PartialEq, Eq)]
struct OutputSpec<'a> {
    name: &'a str,
    new: bool,
    connection: &'a str,
    append: bool,
}

fn parse_output(spec: &Value) -> Result<OutputSpec<'_>, ToolError> {
    match spec {
        Value::String(name) => Ok(OutputSpec {
            name,
            new: false,
            connection: DEFAULT_CONNECTION,
            append: false,
        }),
        Value::Object(_) => {
            let name = spec
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    ToolError::InvalidArgument(
                        "Output specification must include 'name' field".to_string(),
                    )
                })?;
            Ok(OutputSpec {
                name,
                new: fields::flag(spec, "new", false),
                connection: fields::text_or(spec, "connection", DEFAULT_CONNECTION),
                append: fields::flag(spec, "append", false),
            })
        }
        other => Err(ToolError::InvalidArgument(format!("Invalid output specification: {other}"))),
    }
}

/// Splits a `PROJECT.name` reference into `{name, project}`.
fn reference(reference: &str, project_key: &str) -> Value {
    match reference.split_once('.') {
        Some((project, name)) => json!({"name": name, "project": project}),
        None => json!({"name": reference, "project": project_key}),
    }
}

pub async fn create_recipe(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_type = args.str("recipe_type")?;
    let recipe_name = args.str("recipe_name")?;
    let inputs = args.str_list("inputs")?;
    let outputs = args
        .array("outputs")?
        .iter()
        .map(parse_output)
        .collect::<Result<Vec<_>, _>>()?;
    let code = args.opt_str("code")?;

    let project = dss.project(project_key);
    for output in outputs.iter().filter(|o| o.new) {
        project
            .create_managed_dataset(output.name, output.connection, None)
            .await?;
    }

    let input_items: Vec<Value> = inputs
        .iter()
        .map(|name| json!({"ref": name, "deps": []}))
        .collect();
    let output_items: Vec<Value> = outputs
        .iter()
        .map(|o| json!({"ref": o.name, "appendMode": o.append}))
        .collect();
    let created = project
        .create_recipe(json!({
            "recipePrototype": {
                "type": recipe_type,
                "name": recipe_name,
                "projectKey": project_key,
                "inputs": { "main": { "items": input_items } },
                "outputs": { "main": { "items": output_items } },
            },
            "creationSettings": {},
        }))
        .await?;

    if let Some(code) = code.filter(|c| !c.is_empty()) {
        if CODE_RECIPE_TYPES.contains(&recipe_type) {
            let mut settings = project.recipe(recipe_name).await?;
            settings["payload"] = json!(code);
            project.set_recipe(recipe_name, &settings).await?;
        }
    }

    Ok(json!({
        "recipe_id": fields::text_or(&created, "name", recipe_name),
        "recipe_name": recipe_name,
        "recipe_type": recipe_type,
        "inputs": inputs,
        "outputs": outputs.iter().map(|o| o.name).collect::<Vec<_>>(),
    }))
}

pub async fn update_recipe(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_name = args.str("recipe_name")?;
    let code = args.opt_str("code")?;
    let description = args.opt_str("description")?;
    let tags = args.opt_str_list("tags")?;
    let custom_fields = args.opt_object("custom_fields")?;
    let engine_type = args.opt_str("engine_type")?;
    let container_conf = args.get("container_conf");
    let resource_settings = args.get("resource_settings");

    let project = dss.project(project_key);
    let mut updated_fields = Vec::new();

    if let Some(code) = code {
        let mut settings = project.recipe(recipe_name).await?;
        settings["payload"] = json!(code);
        project.set_recipe(recipe_name, &settings).await?;
        updated_fields.push("code");
    }

    if description.is_some() || tags.is_some() || custom_fields.is_some() {
        let mut metadata = project.recipe_metadata(recipe_name).await?;
        if let Some(description) = description {
            metadata["description"] = json!(description);
            updated_fields.push("description");
        }
        if let Some(tags) = tags {
            metadata["tags"] = json!(tags);
            updated_fields.push("tags");
        }
        if let Some(custom_fields) = custom_fields {
            fields::merge(object_mut(&mut metadata, "customFields"), custom_fields);
            updated_fields.push("custom_fields");
        }
        project.set_recipe_metadata(recipe_name, &metadata).await?;
    }

    if engine_type.is_some() || container_conf.is_some() || resource_settings.is_some() {
        let mut settings = project.recipe(recipe_name).await?;
        let params = object_mut(object_mut(&mut settings, "recipe"), "params");
        if let Some(engine_type) = engine_type {
            params["engineType"] = json!(engine_type);
            updated_fields.push("engine_type");
        }
        if let Some(container_conf) = container_conf {
            params["containerSelection"] = container_conf.clone();
            updated_fields.push("container_conf");
        }
        if let Some(resource_settings) = resource_settings {
            params["resourceSettings"] = resource_settings.clone();
            updated_fields.push("resource_settings");
        }
        project.set_recipe(recipe_name, &settings).await?;
    }

    Ok(json!({
        "recipe_name": recipe_name,
        "updated_fields": updated_fields,
        "message": format!("Recipe '{recipe_name}' updated successfully"),
    }))
}

pub async fn delete_recipe(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_name = args.str("recipe_name")?;

    let project = dss.project(project_key);
    let settings = project.recipe(recipe_name).await?;
    let recipe = &settings["recipe"];
    let recipe_info = json!({
        "id": fields::text_or(recipe, "name", recipe_name),
        "type": fields::field(recipe, "type"),
        "name": recipe_name,
    });

    project.delete_recipe(recipe_name).await?;

    Ok(json!({
        "deleted_recipe": recipe_info,
        "message": format!("Recipe '{recipe_name}' deleted successfully"),
    }))
}

pub async fn run_recipe(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_name = args.str("recipe_name")?;
    let build_mode = check_build_mode(args.opt_str("build_mode")?, "Invalid build_mode.")?;

    let project = dss.project(project_key);
    let settings = project.recipe(recipe_name).await?;
    let outputs = recipe_refs(&settings["recipe"], "outputs");
    if outputs.is_empty() {
        return Err(ToolError::InvalidArgument(format!(
            "Recipe '{recipe_name}' has no outputs to build"
        )));
    }

    let build = build_and_wait(dss, &project, &outputs, build_mode, None).await?;
    let mut result = build.to_json();
    result["recipe_name"] = json!(recipe_name);
    result["status"] = json!(if build.failed() { "error" } else { "ok" });
    result["message"] = json!(if build.failed() {
        format!("Recipe '{recipe_name}' job {} failed", build.job_id)
    } else {
        format!("Recipe '{recipe_name}' executed successfully")
    });
    Ok(result)
}

pub async fn get_recipe_info(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_name = args.str("recipe_name")?;

    let project = dss.project(project_key);
    let settings = project.recipe(recipe_name).await?;
    let metadata = project.recipe_metadata(recipe_name).await?;
    let recipe = &settings["recipe"];

    let refs = |side: &str| -> Vec<Value> {
        recipe_refs(recipe, side)
            .iter()
            .map(|r| reference(r, project_key))
            .collect()
    };

    Ok(json!({
        "recipe_info": {
            "id": fields::text_or(recipe, "name", recipe_name),
            "name": recipe_name,
            "type": fields::field(recipe, "type"),
            "description": fields::text(&metadata, "description"),
            "tags": fields::array(&metadata, "tags"),
            "inputs": refs("inputs"),
            "outputs": refs("outputs"),
            "creation_date": fields::field(&metadata, "creationDate"),
            "last_modified": fields::field(&metadata, "lastModifiedDate"),
            "last_modified_by": fields::at(&metadata, "/lastModifiedBy/login"),
            "custom_fields": fields::object(&metadata, "customFields"),
        }
    }))
}

pub async fn list_recipes(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_type = args.opt_str("recipe_type")?;

    let recipes: Vec<Value> = dss
        .project(project_key)
        .list_recipes()
        .await?
        .iter()
        .filter(|r| recipe_type.map_or(true, |t| fields::text(r, "type") == t))
        .map(|r| {
            json!({
                "name": fields::field(r, "name"),
                "type": fields::field(r, "type"),
                "id": fields::field_or(r, "id", fields::field(r, "name")),
                "inputs": recipe_refs(r, "inputs"),
                "outputs": recipe_refs(r, "outputs"),
            })
        })
        .collect();

    Ok(json!({
        "total_count": recipes.len(),
        "recipes": recipes,
        "project_key": project_key,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_outputs_are_existing_datasets() {
        let spec = json!("orders_clean");
        let output = parse_output(&spec).unwrap();
        assert_eq!(output.name, "orders_clean");
        assert!(!output.new);
        assert!(!output.append);
    }

    #[test]
    fn object_outputs_default_connection() {
        let spec = json!({"name": "orders_clean", "new": true});
        let output = parse_output(&spec).unwrap();
        assert!(output.new);
        assert_eq!(output.connection, "filesystem_managed");
    }

    #[test]
    fn object_outputs_need_a_name() {
        let err = parse_output(&json!({"new": true})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Output specification must include 'name' field"
        );
        assert!(parse_output(&json!(3)).is_err());
    }

    #[test]
    fn references_split_foreign_projects() {
        assert_eq!(
            reference("SHARED.customers", "PROJ"),
            json!({"name": "customers", "project": "SHARED"})
        );
        assert_eq!(
            reference("orders", "PROJ"),
            json!({"name": "orders", "project": "PROJ"})
        );
    }
}
