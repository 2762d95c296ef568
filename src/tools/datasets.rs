//! Dataset tools: lifecycle, builds, schema, metrics and settings.

use serde_json::{json, Map, Value};

use super::fields::{self, object_mut};
use super::jobs::{build_and_wait, check_build_mode};
use super::{tool, Args, ToolError, ToolResult};
use crate::dss::Dss;
use crate::mcp::server::ToolDefinition;

const DEFAULT_CONNECTION: &str = "filesystem_managed";
const DEFAULT_SQL_TYPE: &str = "PostgreSQL";
const NUMERIC_TYPES: [&str; 4] = ["int", "bigint", "float", "double"];

pub fn definitions() -> Vec<ToolDefinition> {
    let key_and_name = json!({
        "type": "object",
        "properties": {
            "project_key": { "type": "string", "description": "The project key" },
            "dataset_name": { "type": "string", "description": "Name of the dataset" }
        },
        "required": ["project_key", "dataset_name"]
    });

    vec![
        tool(
            "create_dataset",
            "Create a new dataset. Supported types: managed, filesystem, sql, s3, uploaded, or any \
             other DSS dataset type with raw params.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "dataset_name": { "type": "string", "description": "Name for the new dataset" },
                    "dataset_type": { "type": "string", "description": "Dataset type (managed, filesystem, sql, s3, uploaded, ...)" },
                    "params": {
                        "type": "object",
                        "description": "Type-specific parameters: connection, path, table, schema, catalog, bucket, \
                                        sql_type, format_type, format_params, store_into"
                    }
                },
                "required": ["project_key", "dataset_name", "dataset_type"]
            }),
        ),
        tool(
            "update_dataset",
            "Update dataset metadata (description, tags, custom fields) or settings \
             (format, connection, path, table, schema).",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "dataset_name": { "type": "string", "description": "Name of the dataset to update" },
                    "description": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "custom_fields": { "type": "object" },
                    "format_type": { "type": "string", "description": "Format type (csv, parquet, ...)" },
                    "format_params": { "type": "object", "description": "Format-specific parameters" },
                    "connection": { "type": "string" },
                    "path": { "type": "string" },
                    "table": { "type": "string" },
                    "schema": { "type": "string" }
                },
                "required": ["project_key", "dataset_name"]
            }),
        ),
        tool(
            "delete_dataset",
            "Delete a dataset, optionally dropping its underlying data.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "dataset_name": { "type": "string", "description": "Name of the dataset to delete" },
                    "drop_data": { "type": "boolean", "description": "Also drop the stored data (default false)" }
                },
                "required": ["project_key", "dataset_name"]
            }),
        ),
        tool(
            "build_dataset",
            "Build a dataset and wait for the job to finish.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "dataset_name": { "type": "string", "description": "Name of the dataset to build" },
                    "mode": {
                        "type": "string",
                        "enum": ["RECURSIVE_BUILD", "NON_RECURSIVE_FORCED_BUILD", "RECURSIVE_FORCED_BUILD"],
                        "description": "Build mode (default NON_RECURSIVE_FORCED_BUILD)"
                    },
                    "partition": { "type": "string", "description": "Partition to build" }
                },
                "required": ["project_key", "dataset_name"]
            }),
        ),
        tool(
            "inspect_dataset_schema",
            "Get the column schema of a dataset.",
            key_and_name.clone(),
        ),
        tool(
            "check_dataset_metrics",
            "Get the last computed metrics of a dataset.",
            key_and_name.clone(),
        ),
        tool(
            "get_dataset_post_write_statements",
            "Get the SQL pre-write and post-write statements configured on a dataset. Post-write \
             statements run after a recipe writes the dataset and before downstream recipes \
             read it.",
            key_and_name.clone(),
        ),
        tool(
            "list_datasets",
            "List all datasets in a project, optionally filtered by type.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "dataset_type": { "type": "string", "description": "Only list datasets of this type" }
                },
                "required": ["project_key"]
            }),
        ),
        tool(
            "get_dataset_info",
            "Get detailed information about a dataset: type, metadata and storage settings.",
            key_and_name,
        ),
        tool(
            "clear_dataset",
            "Clear the data of a dataset, optionally for one partition.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "dataset_name": { "type": "string", "description": "Name of the dataset to clear" },
                    "partition": { "type": "string", "description": "Partition to clear" }
                },
                "required": ["project_key", "dataset_name"]
            }),
        ),
    ]
}

fn param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn invalid(message: &str) -> ToolError {
    ToolError::InvalidArgument(message.to_string())
}

/// Builds the creation body for a non-managed dataset.
fn dataset_definition(
    project_key: &str,
    name: &str,
    dataset_type: &str,
    params: &Map<String, Value>,
) -> Result<Value, ToolError> {
    let (dss_type, dss_params) = match dataset_type.to_lowercase().as_str() {
        "filesystem" => {
            let path = param(params, "path")
                .ok_or_else(|| invalid("Path is required for filesystem datasets"))?;
            let connection = param(params, "connection").unwrap_or(DEFAULT_CONNECTION);
            ("Filesystem", json!({"connection": connection, "path": path}))
        }
        "sql" => {
            let (Some(connection), Some(table)) =
                (param(params, "connection"), param(params, "table"))
            else {
                return Err(invalid("Connection and table are required for SQL datasets"));
            };
            let mut sql = json!({"connection": connection, "mode": "table", "table": table});
            if let Some(schema) = param(params, "schema") {
                sql["schema"] = json!(schema);
            }
            if let Some(catalog) = param(params, "catalog") {
                sql["catalog"] = json!(catalog);
            }
            (param(params, "sql_type").unwrap_or(DEFAULT_SQL_TYPE), sql)
        }
        "s3" => {
            let (Some(connection), Some(path)) =
                (param(params, "connection"), param(params, "path"))
            else {
                return Err(invalid("Connection and path are required for S3 datasets"));
            };
            let mut s3 = json!({"connection": connection, "path": path});
            if let Some(bucket) = param(params, "bucket") {
                s3["bucket"] = json!(bucket);
            }
            ("S3", s3)
        }
        "uploaded" => {
            let mut uploaded = json!({});
            if let Some(connection) = param(params, "connection") {
                uploaded["uploadConnection"] = json!(connection);
            }
            ("UploadedFiles", uploaded)
        }
        _ => (dataset_type, Value::Object(params.clone())),
    };

    let mut definition = json!({
        "projectKey": project_key,
        "name": name,
        "type": dss_type,
        "params": dss_params,
    });
    if let Some(format_type) = param(params, "format_type") {
        definition["formatType"] = json!(format_type);
        definition["formatParams"] = params
            .get("format_params")
            .cloned()
            .unwrap_or_else(|| json!({}));
    }
    Ok(definition)
}

pub async fn create_dataset(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;
    let dataset_type = args.str("dataset_type")?;
    let empty = Map::new();
    let params = args.opt_object("params")?.unwrap_or(&empty);

    let project = dss.project(project_key);
    if dataset_type.eq_ignore_ascii_case("managed") {
        let store_into = param(params, "store_into").unwrap_or(DEFAULT_CONNECTION);
        project
            .create_managed_dataset(dataset_name, store_into, param(params, "format_type"))
            .await?;
    } else {
        let definition = dataset_definition(project_key, dataset_name, dataset_type, params)?;
        project.create_dataset(definition).await?;
    }

    Ok(json!({
        "dataset_name": dataset_name,
        "dataset_type": dataset_type,
        "dataset_id": dataset_name,
        "project_key": project_key,
        "message": format!("Dataset '{dataset_name}' created successfully"),
    }))
}

pub async fn update_dataset(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;
    let description = args.opt_str("description")?;
    let tags = args.opt_str_list("tags")?;
    let custom_fields = args.opt_object("custom_fields")?;

    let project = dss.project(project_key);
    let mut updated_fields: Vec<&str> = Vec::new();

    if description.is_some() || tags.is_some() || custom_fields.is_some() {
        let mut metadata = project.dataset_metadata(dataset_name).await?;
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
        project.set_dataset_metadata(dataset_name, &metadata).await?;
    }

    let settings_keys = ["format_type", "format_params", "connection", "path", "table", "schema"];
    if settings_keys.iter().any(|key| args.has(key)) {
        let mut definition = project.dataset(dataset_name).await?;
        if let Some(format_type) = args.opt_str("format_type")? {
            definition["formatType"] = json!(format_type);
            updated_fields.push("format_type");
        }
        if let Some(format_params) = args.opt_object("format_params")? {
            definition["formatParams"] = Value::Object(format_params.clone());
            updated_fields.push("format_params");
        }
        let params = object_mut(&mut definition, "params");
        for key in ["connection", "path", "table", "schema"] {
            if let Some(value) = args.opt_str(key)? {
                params[key] = json!(value);
                updated_fields.push(key);
            }
        }
        project.set_dataset(dataset_name, &definition).await?;
    }

    Ok(json!({
        "dataset_name": dataset_name,
        "updated_fields": updated_fields,
        "message": format!("Dataset '{dataset_name}' updated successfully"),
    }))
}

pub async fn delete_dataset(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;
    let drop_data = args.bool_or("drop_data", false)?;

    let project = dss.project(project_key);
    let definition = project.dataset(dataset_name).await?;
    let dataset_info = json!({
        "name": dataset_name,
        "type": fields::field(&definition, "type"),
        "id": dataset_name,
    });

    project.delete_dataset(dataset_name, drop_data).await?;

    Ok(json!({
        "deleted_dataset": dataset_info,
        "drop_data": drop_data,
        "message": format!("Dataset '{dataset_name}' deleted successfully"),
    }))
}

pub async fn build_dataset(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;
    let mode = check_build_mode(args.opt_str("mode")?, "Invalid build mode.")?;
    let partition = args.opt_str("partition")?;

    let project = dss.project(project_key);
    let outputs = [dataset_name.to_string()];
    let build = build_and_wait(dss, &project, &outputs, mode, partition).await?;

    let mut result = build.to_json();
    result["dataset_name"] = json!(dataset_name);
    result["build_mode"] = json!(mode);
    result["partition"] = json!(partition);
    if build.failed() {
        result["status"] = json!("error");
        result["message"] = json!(format!(
            "Dataset '{dataset_name}' build ended with state {}",
            build.state()
        ));
    } else {
        result["message"] = json!(format!("Dataset '{dataset_name}' built successfully"));
    }
    Ok(result)
}

/// Flattens one schema column, adding type-specific details.
fn column_info(column: &Value) -> Value {
    let column_type = fields::text(column, "type");
    let mut info = json!({
        "name": fields::field(column, "name"),
        "type": fields::field(column, "type"),
        "meaning": fields::field(column, "meaning"),
        "comment": fields::text(column, "comment"),
        "nullable": fields::flag(column, "nullable", true),
    });
    match column_type {
        "string" => info["max_length"] = fields::field(column, "maxLength"),
        t if NUMERIC_TYPES.contains(&t) => {
            info["min_value"] = fields::field(column, "minValue");
            info["max_value"] = fields::field(column, "maxValue");
        }
        "array" => info["array_type"] = fields::field(column, "arrayContent"),
        "map" => {
            info["key_type"] = fields::field(column, "mapKeys");
            info["value_type"] = fields::field(column, "mapValues");
        }
        "object" => info["object_fields"] = fields::array(column, "objectFields"),
        _ => {}
    }
    info
}

pub async fn inspect_dataset_schema(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;

    let schema = dss.project(project_key).dataset_schema(dataset_name).await?;
    let columns: Vec<Value> = fields::list(&schema, "columns")
        .iter()
        .map(column_info)
        .collect();

    Ok(json!({
        "dataset_name": dataset_name,
        "schema": {
            "column_count": columns.len(),
            "columns": columns,
            "user_modified": fields::flag(&schema, "userModified", false),
        },
        "message": format!("Schema for dataset '{dataset_name}' retrieved successfully"),
    }))
}

/// Last value of one metric entry.
fn last_value(metric: &Value) -> Value {
    fields::list(metric, "lastValues")
        .first()
        .map_or(Value::Null, |v| fields::field(v, "value"))
}

/// Groups the `metrics` list of a last-values document.
///
/// Metric ids look like `records:COUNT_RECORDS` or `col_stats:MIN:price`.
fn process_metrics(document: &Value) -> Value {
    let mut values = Map::new();
    let mut column_stats: Map<String, Value> = Map::new();

    for metric in fields::list(document, "metrics") {
        let id = metric
            .get("metricId")
            .or_else(|| metric.pointer("/metric/id"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if id.is_empty() {
            continue;
        }
        let value = last_value(metric);
        let parts: Vec<&str> = id.splitn(3, ':').collect();
        if let ["col_stats", stat, column] = parts.as_slice() {
            let stats = column_stats
                .entry((*column).to_string())
                .or_insert_with(|| json!({}));
            stats[stat.to_lowercase()] = value.clone();
        }
        values.insert(id.to_string(), value);
    }

    let lookup = |id: &str| values.get(id).cloned().unwrap_or(Value::Null);
    json!({
        "basic": {
            "record_count": lookup("records:COUNT_RECORDS"),
            "column_count": lookup("basic:COUNT_COLUMNS"),
            "file_size": lookup("basic:SIZE"),
            "file_count": lookup("basic:COUNT_FILES"),
        },
        "column_stats": column_stats,
        "values": values,
    })
}

pub async fn check_dataset_metrics(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;

    let document = dss
        .project(project_key)
        .dataset_last_metrics(dataset_name, None)
        .await?;
    let has_metrics = !fields::list(&document, "metrics").is_empty();

    Ok(json!({
        "dataset_name": dataset_name,
        "metrics": if has_metrics { process_metrics(&document) } else { json!({}) },
        "has_metrics": has_metrics,
        "message": format!("Metrics for dataset '{dataset_name}' retrieved successfully"),
    }))
}

pub async fn get_dataset_post_write_statements(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;

    let definition = dss.project(project_key).dataset(dataset_name).await?;
    let params = &definition["params"];
    let pre_write = fields::array(params, "customPreWriteStatements");
    let post_write = fields::array(params, "customPostWriteStatements");

    Ok(json!({
        "dataset_name": dataset_name,
        "project_key": project_key,
        "has_pre_write": pre_write.as_array().is_some_and(|a| !a.is_empty()),
        "has_post_write": post_write.as_array().is_some_and(|a| !a.is_empty()),
        "pre_write_statements": pre_write,
        "post_write_statements": post_write,
        "message": format!("Post-write statements for dataset '{dataset_name}' retrieved successfully"),
    }))
}

pub async fn list_datasets(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_type = args.opt_str("dataset_type")?;

    let datasets: Vec<Value> = dss
        .project(project_key)
        .list_datasets()
        .await?
        .iter()
        .filter(|d| dataset_type.map_or(true, |t| fields::text(d, "type") == t))
        .map(|d| {
            json!({
                "name": fields::field(d, "name"),
                "type": fields::field(d, "type"),
                "id": fields::field_or(d, "id", fields::field(d, "name")),
                "tags": fields::array(d, "tags"),
                "managed": fields::flag(d, "managed", false),
                "flow_options": fields::object(d, "flowOptions"),
                "connection": fields::at(d, "/params/connection"),
            })
        })
        .collect();

    Ok(json!({
        "total_count": datasets.len(),
        "datasets": datasets,
        "project_key": project_key,
    }))
}

pub async fn get_dataset_info(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;

    let project = dss.project(project_key);
    let definition = project.dataset(dataset_name).await?;
    let metadata = project.dataset_metadata(dataset_name).await?;
    let params = &definition["params"];

    Ok(json!({
        "dataset_info": {
            "name": dataset_name,
            "type": fields::field(&definition, "type"),
            "id": dataset_name,
            "description": fields::text(&metadata, "description"),
            "tags": fields::array(&metadata, "tags"),
            "managed": fields::flag(&definition, "managed", false),
            "creation_date": fields::field(&metadata, "creationDate"),
            "last_modified": fields::field(&metadata, "lastModifiedDate"),
            "last_modified_by": fields::at(&metadata, "/lastModifiedBy/login"),
            "custom_fields": fields::object(&metadata, "customFields"),
            "flow_options": fields::object(&definition, "flowOptions"),
            "settings": {
                "format_type": fields::field(&definition, "formatType"),
                "connection": fields::field(params, "connection"),
                "path": fields::field(params, "path"),
                "table": fields::field(params, "table"),
                "schema": fields::field(params, "schema"),
            },
        }
    }))
}

pub async fn clear_dataset(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;
    let partition = args.opt_str("partition")?;

    let clear_result = dss
        .project(project_key)
        .clear_dataset(dataset_name, partition)
        .await?;

    Ok(json!({
        "dataset_name": dataset_name,
        "partition": partition,
        "clear_result": clear_result,
        "message": format!("Dataset '{dataset_name}' cleared successfully"),
    }))
}
