//! Project exploration tools: flow graph, object search and dataset samples.

use std::collections::{BTreeMap, HashSet};

use serde_json::{json, Map, Value};
use tracing::debug;

use super::fields::{self, percentage, quoted_list, Matcher};
use super::{tool, Args, ToolError, ToolResult};
use crate::dss::{recipe_refs, Dss};
use crate::error::DssError;
use crate::mcp::server::ToolDefinition;

const OBJECT_TYPES: [&str; 3] = ["datasets", "recipes", "scenarios"];
const NUMERIC_TYPES: [&str; 7] = [
    "tinyint", "smallint", "int", "bigint", "float", "double", "decimal",
];

/// Most common values reported per string column.
const TOP_VALUES: usize = 5;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_project_flow",
            "Get the data flow of a project: datasets and recipes as nodes, inputs and outputs \
             as edges, with dependencies, root and leaf nodes.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" }
                },
                "required": ["project_key"]
            }),
        ),
        tool(
            "search_project_objects",
            "Search datasets, recipes and scenarios by name, description or tag. The search \
             term is a case-insensitive regex, or a plain substring if it is not a valid regex.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "search_term": { "type": "string", "description": "Search pattern" },
                    "object_types": {
                        "type": "array",
                        "items": { "type": "string", "enum": OBJECT_TYPES },
                        "description": "Object types to search (default: all)"
                    }
                },
                "required": ["project_key", "search_term"]
            }),
        ),
        tool(
            "get_dataset_sample",
            "Get sample rows from a dataset with per-column statistics.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "dataset_name": { "type": "string", "description": "Name of the dataset" },
                    "rows": { "type": "integer", "minimum": 0, "description": "Number of sample rows (default 100)" },
                    "columns": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Columns to include (default: all)"
                    }
                },
                "required": ["project_key", "dataset_name"]
            }),
        ),
    ]
}

// ==================== Flow ====================

#[derive(Debug, Default)]
struct Dependencies {
    depends_on: Vec<String>,
    used_by: Vec<String>,
}

/// Dependency map keyed by node name, built from `(from, to)` edges.
fn dependencies(edges: &[(String, String)]) -> BTreeMap<String, Dependencies> {
    let mut deps: BTreeMap<String, Dependencies> = BTreeMap::new();
    for (from, to) in edges {
        deps.entry(to.clone())
            .or_default()
            .depends_on
            .push(from.clone());
        deps.entry(from.clone())
            .or_default()
            .used_by
            .push(to.clone());
    }
    deps
}

pub async fn get_project_flow(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;

    let project = dss.project(project_key);
    let datasets = project.list_datasets().await?;
    let recipes = project.list_recipes().await?;

    let mut nodes: Vec<Value> = datasets
        .iter()
        .map(|d| {
            json!({
                "id": fields::field(d, "name"),
                "name": fields::field(d, "name"),
                "type": "dataset",
                "dataset_type": fields::field(d, "type"),
                "tags": fields::array(d, "tags"),
            })
        })
        .collect();

    let mut edges: Vec<(String, String)> = Vec::new();
    let mut edge_docs = Vec::new();
    for summary in &recipes {
        let name = fields::text(summary, "name");
        nodes.push(json!({
            "id": name,
            "name": name,
            "type": "recipe",
            "recipe_type": fields::field(summary, "type"),
            "tags": fields::array(summary, "tags"),
        }));

        let settings = match project.recipe(name).await {
            Ok(settings) => settings,
            Err(e) => {
                debug!(recipe = name, error = %e, "Skipping unreadable recipe");
                continue;
            }
        };
        for input in recipe_refs(&settings["recipe"], "inputs") {
            edge_docs.push(json!({"from": input, "to": name, "type": "input"}));
            edges.push((input, name.to_string()));
        }
        for output in recipe_refs(&settings["recipe"], "outputs") {
            edge_docs.push(json!({"from": name, "to": output, "type": "output"}));
            edges.push((name.to_string(), output));
        }
    }

    let deps = dependencies(&edges);
    let root_nodes: Vec<&String> = deps
        .iter()
        .filter(|(_, d)| d.depends_on.is_empty())
        .map(|(k, _)| k)
        .collect();
    let leaf_nodes: Vec<&String> = deps
        .iter()
        .filter(|(_, d)| d.used_by.is_empty())
        .map(|(k, _)| k)
        .collect();
    let dependencies: Map<String, Value> = deps
        .iter()
        .map(|(k, d)| (k.clone(), json!({"depends_on": d.depends_on, "used_by": d.used_by})))
        .collect();

    Ok(json!({
        "project_key": project_key,
        "flow_stats": {
            "total_nodes": nodes.len(),
            "total_edges": edge_docs.len(),
            "datasets": datasets.len(),
            "recipes": recipes.len(),
            "root_nodes": root_nodes.len(),
            "leaf_nodes": leaf_nodes.len(),
        },
        "flow": {
            "nodes": nodes,
            "edges": edge_docs,
        },
        "dependencies": dependencies,
        "root_nodes": root_nodes,
        "leaf_nodes": leaf_nodes,
    }))
}

// ==================== Search ====================

/// Returns the match entry for an object, or `None` if nothing matches.
fn search_entry(object: &Value, matcher: &Matcher) -> Option<Value> {
    let name = fields::text(object, "name");
    let description = fields::text(object, "description");
    let tags = fields::list(object, "tags");
    let hit = matcher.is_match(name)
        || matcher.is_match(description)
        || tags.iter().filter_map(Value::as_str).any(|t| matcher.is_match(t));
    if !hit {
        return None;
    }
    Some(json!({
        "name": name,
        "type": fields::field(object, "type"),
        "description": description,
        "tags": tags,
        "match_type": if matcher.contains(name) { "name" } else { "metadata" },
    }))
}

pub async fn search_project_objects(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let search_term = args.str("search_term")?;
    let object_types = args
        .opt_str_list("object_types")?
        .unwrap_or_else(|| OBJECT_TYPES.iter().map(|t| (*t).to_string()).collect());

    let project = dss.project(project_key);
    let matcher = Matcher::new(search_term);
    let mut results = Map::new();

    for object_type in &object_types {
        let matches: Vec<Value> = match object_type.as_str() {
            "datasets" => project
                .list_datasets()
                .await?
                .iter()
                .filter_map(|d| search_entry(d, &matcher))
                .collect(),
            "recipes" => project
                .list_recipes()
                .await?
                .iter()
                .filter_map(|r| search_entry(r, &matcher))
                .collect(),
            "scenarios" => project
                .list_scenarios()
                .await?
                .iter()
                .filter_map(|s| {
                    search_entry(s, &matcher).map(|mut entry| {
                        entry["id"] = fields::field(s, "id");
                        entry["active"] = json!(fields::flag(s, "active", false));
                        entry
                    })
                })
                .collect(),
            other => {
                debug!(object_type = other, "Ignoring unknown object type");
                continue;
            }
        };
        results.insert(object_type.clone(), json!(matches));
    }

    let matches_by_type: Map<String, Value> = results
        .iter()
        .map(|(k, v)| (k.clone(), json!(v.as_array().map_or(0, Vec::len))))
        .collect();
    let total_matches: u64 = matches_by_type.values().filter_map(Value::as_u64).sum();

    Ok(json!({
        "project_key": project_key,
        "search_stats": {
            "search_term": search_term,
            "object_types_searched": object_types,
            "total_matches": total_matches,
            "matches_by_type": matches_by_type,
        },
        "results": results,
    }))
}

// ==================== Samples ====================

/// Parses header-less, Excel-style TSV as returned by the DSS data endpoint.
pub fn parse_tsv(text: &str) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect()
}

/// Converts a TSV cell to JSON using the schema type. Empty cells are null.
fn cell_value(cell: &str, column_type: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if NUMERIC_TYPES.contains(&column_type) {
        if let Ok(n) = cell.parse::<i64>() {
            return json!(n);
        }
        if let Ok(f) = cell.parse::<f64>() {
            return json!(f);
        }
    }
    if column_type == "boolean" {
        if let Ok(b) = cell.parse::<bool>() {
            return json!(b);
        }
    }
    json!(cell)
}

fn rows_to_records(rows: &[Vec<String>], columns: &[&Value]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            let record: Map<String, Value> = columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let cell = row.get(i).map_or("", String::as_str);
                    (
                        fields::text(column, "name").to_string(),
                        cell_value(cell, fields::text(column, "type")),
                    )
                })
                .collect();
            Value::Object(record)
        })
        .collect()
}

/// Null counts plus numeric or string statistics for one column.
#[allow(clippy::cast_precision_loss)]
fn column_stats(column: &Value, records: &[Value]) -> Value {
    let name = fields::text(column, "name");
    let column_type = fields::text(column, "type");
    let mut stats = json!({
        "name": name,
        "type": column_type,
        "meaning": fields::text(column, "meaning"),
        "description": fields::text(column, "comment"),
    });
    if records.is_empty() {
        return stats;
    }

    let values: Vec<&Value> = records
        .iter()
        .filter_map(|r| r.get(name))
        .filter(|v| !v.is_null())
        .collect();
    let null_count = records.len() - values.len();
    stats["null_count"] = json!(null_count);
    stats["null_percentage"] = json!(percentage(null_count, records.len()));
    if values.is_empty() {
        return stats;
    }

    if NUMERIC_TYPES.contains(&column_type) {
        let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
        if !numbers.is_empty() {
            let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
            let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            stats["min"] = json!(min);
            stats["max"] = json!(max);
            stats["mean"] = json!(numbers.iter().sum::<f64>() / numbers.len() as f64);
        }
    } else if column_type == "string" {
        let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();
        if !strings.is_empty() {
            let lengths: Vec<usize> = strings.iter().map(|s| s.chars().count()).collect();
            let unique: HashSet<&str> = strings.iter().copied().collect();
            stats["unique_count"] = json!(unique.len());
            let total: usize = lengths.iter().sum();
            stats["avg_length"] = json!(total as f64 / lengths.len() as f64);
            stats["max_length"] = json!(lengths.iter().max());
            stats["min_length"] = json!(lengths.iter().min());
            stats["most_common"] = json!(most_common(&strings, TOP_VALUES));
        }
    }
    stats
}

/// Most frequent values with counts, ties in first-seen order.
fn most_common<'a>(values: &[&'a str], limit: usize) -> Vec<(&'a str, usize)> {
    let mut counts: Vec<(&'a str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((*value, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    counts
}

pub async fn get_dataset_sample(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let dataset_name = args.str("dataset_name")?;
    let rows = args.u64_or("rows", 100)?;
    let requested = args.opt_str_list("columns")?.filter(|c| !c.is_empty());

    let project = dss.project(project_key);
    let schema = project.dataset_schema(dataset_name).await?;
    let schema_columns = fields::list(&schema, "columns");
    let available: Vec<&str> = schema_columns
        .iter()
        .map(|c| fields::text(c, "name"))
        .collect();

    let selected: Vec<&Value> = match &requested {
        Some(columns) => {
            let invalid: Vec<&String> = columns
                .iter()
                .filter(|c| !available.contains(&c.as_str()))
                .collect();
            if !invalid.is_empty() {
                return Err(ToolError::InvalidArgument(format!(
                    "Invalid columns: {}. Available columns: {}",
                    quoted_list(&invalid),
                    quoted_list(&available)
                )));
            }
            schema_columns
                .iter()
                .filter(|c| columns.iter().any(|n| n == fields::text(c, "name")))
                .collect()
        }
        None => schema_columns.iter().collect(),
    };
    let selected_names: Vec<String> = selected
        .iter()
        .map(|c| fields::text(c, "name").to_string())
        .collect();

    let fetch_columns: &[String] = if requested.is_some() {
        selected_names.as_slice()
    } else {
        &[]
    };
    let tsv = project
        .dataset_rows_tsv(dataset_name, fetch_columns, rows)
        .await?;
    let parsed = parse_tsv(&tsv)
        .map_err(|e| DssError::InvalidResponse(format!("malformed TSV sample: {e}")))?;
    let sample_data = rows_to_records(&parsed, &selected);

    let column_stats: Vec<Value> = selected
        .iter()
        .map(|c| column_stats(c, &sample_data))
        .collect();
    let dataset = project.dataset(dataset_name).await?;

    Ok(json!({
        "project_key": project_key,
        "dataset_info": {
            "name": dataset_name,
            "type": fields::field(&dataset, "type"),
            "format": fields::text_or(&dataset, "formatType", "unknown"),
            "connection": fields::text_at(&dataset, "/params/connection", "unknown"),
        },
        "sample_stats": {
            "requested_rows": rows,
            "actual_rows": sample_data.len(),
            "requested_columns": selected.len(),
            "total_columns": schema_columns.len(),
            "column_names": requested.as_ref().map_or_else(|| selected_names.clone(), Clone::clone),
        },
        "schema": {
            "columns": selected,
            "column_count": selected.len(),
        },
        "column_stats": column_stats,
        "sample_data": sample_data,
    }))
}
