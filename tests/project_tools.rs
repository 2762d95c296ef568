//! Integration tests for the project-wide tools: flow exploration,
//! environment inspection, monitoring and productivity.

mod common;

use common::{call, dss, MockDss};
use serde_json::{json, Value};

// =============================================================================
// Exploration
// =============================================================================

#[tokio::test]
async fn test_project_flow_links_datasets_through_recipes() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/",
        json!([
            {"name": "orders", "type": "PostgreSQL"},
            {"name": "orders_clean", "type": "PostgreSQL"}
        ]),
    )
    .on(
        "GET /projects/PROJ/recipes/",
        json!([{"name": "compute_orders_clean", "type": "python"}]),
    )
    .on(
        "GET /projects/PROJ/recipes/compute_orders_clean",
        json!({"recipe": {
            "inputs": {"main": {"items": [{"ref": "orders"}]}},
            "outputs": {"main": {"items": [{"ref": "orders_clean"}]}}
        }}),
    );

    let out = call(
        &dss(&mock),
        "get_project_flow",
        json!({"project_key": "PROJ"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["flow_stats"]["total_nodes"], 3);
    assert_eq!(out.body["flow_stats"]["total_edges"], 2);
    assert_eq!(out.body["root_nodes"], json!(["orders"]));
    assert_eq!(out.body["leaf_nodes"], json!(["orders_clean"]));
    assert_eq!(
        out.body["dependencies"]["orders_clean"]["depends_on"],
        json!(["compute_orders_clean"])
    );
}

#[tokio::test]
async fn test_search_matches_names_and_metadata() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/",
        json!([
            {"name": "orders", "type": "PostgreSQL"},
            {"name": "customers", "description": "Customers with open orders"},
            {"name": "products"}
        ]),
    );

    let out = call(
        &dss(&mock),
        "search_project_objects",
        json!({
            "project_key": "PROJ",
            "search_term": "ORDER",
            "object_types": ["datasets", "widgets"]
        }),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["search_stats"]["total_matches"], 2);
    let datasets = &out.body["results"]["datasets"];
    assert_eq!(datasets[0]["match_type"], "name");
    assert_eq!(datasets[1]["name"], "customers");
    assert_eq!(datasets[1]["match_type"], "metadata");
    assert!(out.body["results"].get("widgets").is_none());
    assert_eq!(mock.requests(), vec!["GET /projects/PROJ/datasets/"]);
}

// =============================================================================
// Environment
// =============================================================================

#[tokio::test]
async fn test_project_variables_hide_secrets() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/variables/",
        json!({
            "standard": {"token": "abc123", "region": "eu-west-1"},
            "local": {"API_KEY": "visible", "Key": "hidden", "retries": 3}
        }),
    )
    .on(
        "GET /projects/PROJ/metadata",
        json!({"label": "Sales Analytics", "tags": ["sales"], "owner": "analyst"}),
    )
    .fail("GET /projects/PROJ/settings", 403, "forbidden");

    let out = call(
        &dss(&mock),
        "get_project_variables",
        json!({"project_key": "PROJ"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["project_info"]["name"], "Sales Analytics");
    let standard = &out.body["variables"]["standard"];
    assert_eq!(standard["token"]["value"], "***HIDDEN***");
    assert_eq!(standard["region"]["value"], "eu-west-1");
    let custom = &out.body["variables"]["custom"];
    assert_eq!(custom["API_KEY"]["value"], "visible");
    assert_eq!(custom["Key"]["value"], "***HIDDEN***");
    assert_eq!(custom["retries"], json!({"type": "integer", "value": 3}));
    assert_eq!(out.body["variable_stats"]["total_variables"], 5);
    assert_eq!(
        out.body["settings_summary"]["error"],
        "Settings not available (requires admin permission)"
    );
    assert_eq!(
        out.body["permissions"]["error"],
        "Permissions not available"
    );
}

#[tokio::test]
async fn test_connections_mask_parameters_and_report_usage() {
    let mock = MockDss::new();
    mock.on(
        "GET /admin/connections/",
        json!({
            "warehouse": {"type": "PostgreSQL", "usable": true, "allowWrite": true},
            "lake": {"type": "EC2"}
        }),
    )
    .on(
        "GET /admin/connections/warehouse",
        json!({"params": {"host": "db.internal", "password": "s3cret", "port": 5432}}),
    )
    .on(
        "GET /projects/PROJ/datasets/",
        json!([{"name": "orders", "type": "PostgreSQL"}]),
    )
    .on(
        "GET /projects/PROJ/datasets/orders",
        json!({"params": {"connection": "warehouse"}}),
    )
    .on("GET /projects/PROJ/recipes/", json!([]));

    let out = call(
        &dss(&mock),
        "get_connections",
        json!({"project_key": "PROJ"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["global_connection_count"], 2);
    assert_eq!(
        out.body["connection_types"],
        json!({"EC2": ["lake"], "PostgreSQL": ["warehouse"]})
    );

    let connections = out.body["global_connections"].as_array().unwrap();
    let warehouse = connections
        .iter()
        .find(|c| c["name"] == "warehouse")
        .unwrap();
    assert_eq!(warehouse["parameters"]["host"], "db.internal");
    assert_eq!(warehouse["parameters"]["password"], "***HIDDEN***");
    let lake = connections.iter().find(|c| c["name"] == "lake").unwrap();
    assert!(lake["error"].as_str().unwrap().starts_with("Could not get detailed info"));

    let usage = &out.body["project_connection_info"];
    assert_eq!(usage["unique_connections_used"], 1);
    assert_eq!(usage["connection_usage"]["warehouse"]["count"], 1);
}

#[tokio::test]
async fn test_code_environments_survive_listing_failure() {
    let mock = MockDss::new();
    mock.fail("GET /admin/code-envs/", 403, "admin only").on(
        "GET /projects/PROJ/settings",
        json!({"settings": {"codeEnvs": {
            "python": {"mode": "EXPLICIT_ENV", "envName": "py39"},
            "envOverrides": {"recipe_a": "py311"}
        }}}),
    );

    let out = call(
        &dss(&mock),
        "get_code_environments",
        json!({"project_key": "PROJ"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["global_environment_count"], 0);
    let project = &out.body["project_environment_info"];
    assert_eq!(project["default_python_env"], "py39");
    assert_eq!(project["use_builtin_python"], false);
    assert_eq!(project["default_r_env"], "INHERIT");
    assert_eq!(project["use_builtin_r"], true);
    assert_eq!(project["override_count"], 1);
}

// =============================================================================
// Monitoring
// =============================================================================

#[tokio::test]
async fn test_recent_runs_merge_scenarios_and_jobs() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/scenarios/",
        json!([{"id": "NIGHTLY", "name": "Nightly build"}]),
    )
    .on(
        "GET /projects/PROJ/scenarios/NIGHTLY/get-last-runs",
        json!([{"runId": "run_1", "start": 2_000, "end": 5_000, "result": {"outcome": "FAILED"}}]),
    )
    .on(
        "GET /projects/PROJ/jobs/",
        json!([{
            "def": {"id": "build_orders", "initiationTimestamp": 1_000},
            "state": "DONE",
            "endTime": 1_500
        }]),
    );

    let out = call(
        &dss(&mock),
        "get_recent_runs",
        json!({"project_key": "PROJ"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    let summary = &out.body["summary"];
    assert_eq!(summary["total_runs"], 2);
    assert_eq!(summary["success_runs"], 1);
    assert_eq!(summary["failed_runs"], 1);
    assert_eq!(summary["success_rate"], 50.0);
    assert_eq!(summary["average_duration"], 1.75);
    assert_eq!(out.body["runs"][0]["type"], "scenario");
    assert_eq!(out.body["runs"][1]["object_id"], "build_orders");
    assert_eq!(out.body["recent_failures"][0]["run_id"], "run_1");
}

#[tokio::test]
async fn test_recent_runs_status_filter() {
    let mock = MockDss::new();
    mock.on("GET /projects/PROJ/scenarios/", json!([]))
        .on(
            "GET /projects/PROJ/jobs/",
            json!([
                {"def": {"id": "a"}, "state": "DONE"},
                {"def": {"id": "b"}, "state": "FAILED"}
            ]),
        );

    let out = call(
        &dss(&mock),
        "get_recent_runs",
        json!({"project_key": "PROJ", "status_filter": "FAILED"}),
    )
    .await;

    assert_eq!(out.body["summary"]["total_runs"], 1);
    assert_eq!(out.body["runs"][0]["object_id"], "b");
}

#[tokio::test]
async fn test_job_details() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/jobs/build_orders/",
        json!({"baseStatus": {
            "state": "DONE",
            "startTime": 1_000,
            "endTime": 9_000,
            "activities": {"a1": {"recipeName": "compute_orders", "recipeType": "python", "state": "DONE"}}
        }}),
    )
    .text(
        "GET /projects/PROJ/jobs/build_orders/log",
        "[INFO] build done\n",
    );

    let out = call(
        &dss(&mock),
        "get_job_details",
        json!({"project_key": "PROJ", "job_id": "build_orders"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["job_info"]["state"], "DONE");
    assert_eq!(out.body["logs"][0]["type"], "main_log");
    assert_eq!(out.body["activity_info"]["activity_count"], 1);
    assert_eq!(
        out.body["activity_info"]["activities"][0]["name"],
        "compute_orders"
    );
    assert_eq!(
        out.body["timeline"][1]["description"],
        "Job completed with status: DONE"
    );
}

#[tokio::test]
async fn test_cancel_only_aborts_active_jobs() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/jobs/running_job/",
        json!({"baseStatus": {"state": "RUNNING"}}),
    )
    .on(
        "GET /projects/PROJ/jobs/running_job/",
        json!({"baseStatus": {"state": "ABORTED"}}),
    )
    .on(
        "GET /projects/PROJ/jobs/done_job/",
        json!({"baseStatus": {"state": "DONE"}}),
    )
    .on("GET /projects/PROJ/jobs/", json!([]));

    let out = call(
        &dss(&mock),
        "cancel_running_jobs",
        json!({"project_key": "PROJ", "job_ids": ["running_job", "done_job"]}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    let summary = &out.body["cancellation_summary"];
    assert_eq!(summary["successful_cancellations"], 1);
    assert_eq!(summary["failed_cancellations"], 1);
    assert_eq!(out.body["cancelled_jobs"][0]["previous_state"], "RUNNING");
    assert_eq!(out.body["cancelled_jobs"][0]["new_state"], "ABORTED");
    assert_eq!(out.body["failed_cancellations"][0]["current_state"], "DONE");
    assert_eq!(
        mock.writes(),
        vec!["POST /projects/PROJ/jobs/running_job/abort"]
    );
}

// =============================================================================
// Productivity
// =============================================================================

fn source_project(mock: &MockDss) {
    mock.on(
        "GET /projects/SRC/variables/",
        json!({"standard": {"env": "prod"}, "local": {}}),
    )
    .on("GET /projects/SRC/datasets/", json!([{"name": "orders"}]))
    .on(
        "GET /projects/SRC/datasets/orders",
        json!({"type": "PostgreSQL", "params": {"connection": "warehouse", "table": "orders"}}),
    )
    .on(
        "GET /projects/SRC/datasets/orders/schema",
        json!({"columns": [{"name": "id", "type": "bigint"}]}),
    )
    .on("GET /projects/SRC/recipes/", json!([]))
    .on("GET /projects/SRC/scenarios/", json!([]));
}

#[tokio::test]
async fn test_duplicate_into_existing_project() {
    let mock = MockDss::new();
    source_project(&mock);
    mock.fail("POST /projects/", 409, "Project TGT already exists");

    let out = call(
        &dss(&mock),
        "duplicate_project_structure",
        json!({"source_project_key": "SRC", "target_project_key": "TGT", "include_data": true}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    let summary = &out.body["duplication_summary"];
    assert_eq!(summary["datasets_copied"], 1);
    assert_eq!(summary["variables_copied"], 1);
    assert_eq!(summary["total_errors"], 1);
    assert_eq!(
        out.body["copied_objects"]["datasets"][0]["data_copied"],
        false
    );

    assert_eq!(
        mock.writes(),
        vec![
            "POST /projects/",
            "PUT /projects/TGT/variables/",
            "POST /projects/TGT/datasets/",
            "PUT /projects/TGT/datasets/orders/schema",
        ]
    );
    let created = mock.body("POST /projects/TGT/datasets/");
    assert_eq!(created["projectKey"], "TGT");
    assert_eq!(created["formatType"], "csv");
}

#[tokio::test]
async fn test_duplicate_stops_when_target_cannot_be_created() {
    let mock = MockDss::new();
    source_project(&mock);
    mock.fail("POST /projects/", 403, "not allowed to create projects");

    let out = call(
        &dss(&mock),
        "duplicate_project_structure",
        json!({"source_project_key": "SRC", "target_project_key": "TGT"}),
    )
    .await;

    assert!(out.is_error);
    assert_eq!(
        out.body["message"],
        "Failed to create target project: DSS returned HTTP 403: not allowed to create projects"
    );
    assert_eq!(mock.requests(), vec!["POST /projects/"]);
}

fn exportable_project(mock: &MockDss) {
    mock.on(
        "GET /projects/PROJ/metadata",
        json!({"name": "Sales", "description": "Sales pipeline"}),
    )
    .on(
        "GET /projects/PROJ/variables/",
        json!({"standard": {"env": "prod"}, "local": {"owner": "me"}}),
    )
    .on("GET /projects/PROJ/settings", json!({"settings": {}}))
    .on("GET /projects/PROJ/datasets/", json!([]))
    .on(
        "GET /projects/PROJ/recipes/",
        json!([{"name": "compute_totals", "type": "python"}]),
    )
    .on(
        "GET /projects/PROJ/recipes/compute_totals",
        json!({"recipe": {"type": "python"}, "payload": "print(1)"}),
    )
    .on("GET /projects/PROJ/scenarios/", json!([]));
}

#[tokio::test]
async fn test_export_project_config_as_yaml() {
    let mock = MockDss::new();
    exportable_project(&mock);

    let out = call(
        &dss(&mock),
        "export_project_config",
        json!({"project_key": "PROJ", "format": "YAML"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["content_type"], "yaml");
    assert_eq!(out.body["export_stats"]["recipes_exported"], 1);
    assert_eq!(out.body["export_stats"]["variables_exported"], 2);
    assert_eq!(out.body["config"]["project_info"]["name"], "Sales");
    assert_eq!(out.body["config"]["recipes"][0]["code"], "print(1)");

    let output = out.body["config_output"].as_str().unwrap();
    assert!(output.contains("project_info:"));
    assert!(!output.trim_start().starts_with('{'));
}

#[tokio::test]
async fn test_export_defaults_to_json() {
    let mock = MockDss::new();
    exportable_project(&mock);

    let out = call(
        &dss(&mock),
        "export_project_config",
        json!({"project_key": "PROJ"}),
    )
    .await;

    assert_eq!(out.body["content_type"], "json");
    let output = out.body["config_output"].as_str().unwrap();
    let reparsed: Value = serde_json::from_str(output).unwrap();
    assert_eq!(reparsed["variables"]["local"]["owner"], "me");
}

#[tokio::test]
async fn test_batch_update_matches_pattern() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/",
        json!([{"name": "orders"}, {"name": "Orders_archive"}, {"name": "customers"}]),
    )
    .on(
        "GET /projects/PROJ/datasets/orders/metadata",
        json!({"description": "raw orders"}),
    );

    let out = call(
        &dss(&mock),
        "batch_update_objects",
        json!({
            "project_key": "PROJ",
            "object_type": "datasets",
            "pattern": "^orders",
            "updates": {"tags": ["sales"]}
        }),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    let summary = &out.body["update_summary"];
    assert_eq!(summary["objects_updated"], 1);
    assert_eq!(summary["objects_failed"], 1);
    assert_eq!(
        out.body["updated_objects"][0]["updates_applied"],
        json!(["tags"])
    );
    assert_eq!(out.body["failed_updates"][0]["name"], "Orders_archive");
    assert_eq!(
        mock.body("PUT /projects/PROJ/datasets/orders/metadata"),
        json!({"description": "raw orders", "tags": ["sales"]})
    );
}

#[tokio::test]
async fn test_batch_update_rejects_unknown_object_type() {
    let mock = MockDss::new();
    let out = call(
        &dss(&mock),
        "batch_update_objects",
        json!({"project_key": "PROJ", "object_type": "notebooks", "pattern": ".*", "updates": {}}),
    )
    .await;

    assert!(out.is_error);
    assert_eq!(
        out.body["message"],
        "Unsupported object type: notebooks. Supported types: datasets, recipes, scenarios"
    );
    assert!(mock.requests().is_empty());
}
