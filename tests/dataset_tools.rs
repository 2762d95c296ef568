//! Integration tests for the dataset tools and data sampling.

mod common;

use std::time::Duration;

use common::{call, dss, dss_waiting, MockDss};
use serde_json::json;

// =============================================================================
// Creation and updates
// =============================================================================

#[tokio::test]
async fn test_create_managed_dataset() {
    let mock = MockDss::new();
    let out = call(
        &dss(&mock),
        "create_dataset",
        json!({
            "project_key": "PROJ",
            "dataset_name": "orders_clean",
            "dataset_type": "managed",
            "params": {"store_into": "local_pg"}
        }),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(
        out.body["message"],
        "Dataset 'orders_clean' created successfully"
    );
    assert_eq!(mock.writes(), vec!["POST /projects/PROJ/datasets/managed"]);
    let body = mock.body("POST /projects/PROJ/datasets/managed");
    assert_eq!(body["creationSettings"]["connectionId"], "local_pg");
}

#[tokio::test]
async fn test_create_sql_dataset_builds_definition() {
    let mock = MockDss::new();
    let out = call(
        &dss(&mock),
        "create_dataset",
        json!({
            "project_key": "PROJ",
            "dataset_name": "customers",
            "dataset_type": "sql",
            "params": {"connection": "warehouse", "table": "customers", "schema": "crm"}
        }),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    let definition = mock.body("POST /projects/PROJ/datasets/");
    assert_eq!(definition["type"], "PostgreSQL");
    assert_eq!(
        definition["params"],
        json!({"connection": "warehouse", "mode": "table", "table": "customers", "schema": "crm"})
    );
}

#[tokio::test]
async fn test_create_sql_dataset_without_table_is_rejected() {
    let mock = MockDss::new();
    let out = call(
        &dss(&mock),
        "create_dataset",
        json!({
            "project_key": "PROJ",
            "dataset_name": "customers",
            "dataset_type": "sql",
            "params": {"connection": "warehouse"}
        }),
    )
    .await;

    assert!(out.is_error);
    assert_eq!(
        out.body["message"],
        "Connection and table are required for SQL datasets"
    );
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_update_dataset_touches_only_requested_parts() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/orders/metadata",
        json!({"description": "old", "tags": ["raw"]}),
    );

    let out = call(
        &dss(&mock),
        "update_dataset",
        json!({"project_key": "PROJ", "dataset_name": "orders", "tags": ["raw", "pii"]}),
    )
    .await;

    assert_eq!(out.body["updated_fields"], json!(["tags"]));
    assert_eq!(
        mock.writes(),
        vec!["PUT /projects/PROJ/datasets/orders/metadata"]
    );
    let metadata = mock.body("PUT /projects/PROJ/datasets/orders/metadata");
    assert_eq!(metadata["tags"], json!(["raw", "pii"]));
    assert_eq!(metadata["description"], "old");
}

#[tokio::test]
async fn test_delete_dataset_passes_drop_data() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/orders",
        json!({"name": "orders", "type": "Filesystem"}),
    );

    let out = call(
        &dss(&mock),
        "delete_dataset",
        json!({"project_key": "PROJ", "dataset_name": "orders", "drop_data": true}),
    )
    .await;

    assert_eq!(out.body["deleted_dataset"]["type"], "Filesystem");
    let request = mock.last("DELETE /projects/PROJ/datasets/orders").unwrap();
    assert_eq!(
        request.query,
        vec![("dropData".to_string(), "true".to_string())]
    );
}

#[tokio::test]
async fn test_clear_dataset_partition() {
    let mock = MockDss::new();
    let out = call(
        &dss(&mock),
        "clear_dataset",
        json!({"project_key": "PROJ", "dataset_name": "events", "partition": "2024-01-01"}),
    )
    .await;

    assert_eq!(out.body["partition"], "2024-01-01");
    let request = mock
        .last("DELETE /projects/PROJ/datasets/events/data")
        .unwrap();
    assert_eq!(
        request.query,
        vec![("partitions".to_string(), "2024-01-01".to_string())]
    );
}

// =============================================================================
// Builds and inspection
// =============================================================================

#[tokio::test]
async fn test_build_dataset_with_partition() {
    let mock = MockDss::new();
    mock.on("POST /projects/PROJ/jobs/", json!({"id": "build_events"}))
        .on(
            "GET /projects/PROJ/jobs/build_events/",
            json!({"baseStatus": {"state": "DONE"}}),
        );

    let out = call(
        &dss(&mock),
        "build_dataset",
        json!({
            "project_key": "PROJ",
            "dataset_name": "events",
            "mode": "RECURSIVE_BUILD",
            "partition": "2024-01-01"
        }),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    assert_eq!(out.body["build_mode"], "RECURSIVE_BUILD");
    let job = mock.body("POST /projects/PROJ/jobs/");
    assert_eq!(job["type"], "RECURSIVE_BUILD");
    assert_eq!(job["outputs"][0]["partition"], "2024-01-01");
}

#[tokio::test]
async fn test_build_dataset_failure_is_a_tool_error() {
    let mock = MockDss::new();
    mock.on("POST /projects/PROJ/jobs/", json!({"id": "build_events"}))
        .on(
            "GET /projects/PROJ/jobs/build_events/",
            json!({"baseStatus": {"state": "ABORTED"}}),
        );

    let out = call(
        &dss(&mock),
        "build_dataset",
        json!({"project_key": "PROJ", "dataset_name": "events"}),
    )
    .await;

    assert!(out.is_error);
    assert_eq!(
        out.body["message"],
        "Dataset 'events' build ended with state ABORTED"
    );
}

#[tokio::test]
async fn test_build_dataset_gives_up_after_max_wait() {
    let mock = MockDss::new();
    mock.on("POST /projects/PROJ/jobs/", json!({"id": "build_events"}))
        .on(
            "GET /projects/PROJ/jobs/build_events/",
            json!({"baseStatus": {"state": "RUNNING"}}),
        );

    let out = call(
        &dss_waiting(&mock, Duration::from_millis(20)),
        "build_dataset",
        json!({"project_key": "PROJ", "dataset_name": "events"}),
    )
    .await;

    assert!(out.is_error);
    assert_eq!(
        out.body["message"],
        "Failed to build dataset 'events': timed out after 20ms waiting for job build_events"
    );
    assert!(mock.count("GET /projects/PROJ/jobs/build_events/") >= 2);
}

#[tokio::test]
async fn test_inspect_schema_reports_type_specific_fields() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/orders/schema",
        json!({
            "columns": [
                {"name": "id", "type": "bigint"},
                {"name": "status", "type": "string", "maxLength": 32},
                {"name": "items", "type": "array", "arrayContent": {"type": "string"}}
            ],
            "userModified": true
        }),
    );

    let out = call(
        &dss(&mock),
        "inspect_dataset_schema",
        json!({"project_key": "PROJ", "dataset_name": "orders"}),
    )
    .await;

    let schema = &out.body["schema"];
    assert_eq!(schema["column_count"], 3);
    assert_eq!(schema["user_modified"], true);
    assert_eq!(schema["columns"][1]["max_length"], 32);
    assert_eq!(
        schema["columns"][2]["array_type"],
        json!({"type": "string"})
    );
    assert_eq!(schema["columns"][0]["nullable"], true);
}

#[tokio::test]
async fn test_dataset_without_metrics() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/orders/metrics/last/NP",
        json!({"metrics": []}),
    );

    let out = call(
        &dss(&mock),
        "check_dataset_metrics",
        json!({"project_key": "PROJ", "dataset_name": "orders"}),
    )
    .await;

    assert_eq!(out.body["has_metrics"], false);
    assert_eq!(out.body["metrics"], json!({}));
}

#[tokio::test]
async fn test_post_write_statements() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/orders_sql",
        json!({"params": {"customPostWriteStatements": ["GRANT SELECT ON orders TO analyst"]}}),
    );

    let out = call(
        &dss(&mock),
        "get_dataset_post_write_statements",
        json!({"project_key": "PROJ", "dataset_name": "orders_sql"}),
    )
    .await;

    assert_eq!(out.body["has_pre_write"], false);
    assert_eq!(out.body["has_post_write"], true);
}

#[tokio::test]
async fn test_list_datasets_reads_connection() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/",
        json!([
            {
                "name": "orders",
                "type": "PostgreSQL",
                "managed": true,
                "params": {"connection": "pg"}
            },
            {"name": "raw_upload", "type": "UploadedFiles"}
        ]),
    );

    let out = call(&dss(&mock), "list_datasets", json!({"project_key": "PROJ"})).await;

    assert_eq!(out.body["total_count"], 2);
    assert_eq!(out.body["datasets"][0]["connection"], "pg");
    assert_eq!(
        out.body["datasets"][1]["connection"],
        serde_json::Value::Null
    );
}

#[tokio::test]
async fn test_dataset_info_merges_definition_and_metadata() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/orders",
        json!({
            "name": "orders",
            "type": "PostgreSQL",
            "managed": true,
            "formatType": null,
            "params": {"connection": "pg", "table": "orders", "schema": "sales"},
            "flowOptions": {"rebuildBehavior": "NORMAL"}
        }),
    )
    .on(
        "GET /projects/PROJ/datasets/orders/metadata",
        json!({
            "description": "Cleaned orders",
            "tags": ["sales"],
            "lastModifiedBy": {"login": "alice"},
            "customFields": {"owner": "data-team"}
        }),
    );

    let out = call(
        &dss(&mock),
        "get_dataset_info",
        json!({"project_key": "PROJ", "dataset_name": "orders"}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    let info = &out.body["dataset_info"];
    assert_eq!(info["type"], "PostgreSQL");
    assert_eq!(info["managed"], true);
    assert_eq!(info["description"], "Cleaned orders");
    assert_eq!(info["tags"], json!(["sales"]));
    assert_eq!(info["last_modified_by"], "alice");
    assert_eq!(info["custom_fields"]["owner"], "data-team");
    assert_eq!(info["settings"]["connection"], "pg");
    assert_eq!(info["settings"]["table"], "orders");
    assert_eq!(info["settings"]["schema"], "sales");
    assert_eq!(info["settings"]["path"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_dataset_info_needs_metadata() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/PROJ/datasets/orders",
        json!({"name": "orders", "type": "Filesystem"}),
    )
    .fail(
        "GET /projects/PROJ/datasets/orders/metadata",
        403,
        "forbidden",
    );

    let out = call(
        &dss(&mock),
        "get_dataset_info",
        json!({"project_key": "PROJ", "dataset_name": "orders"}),
    )
    .await;

    assert!(out.is_error);
    assert_eq!(
        out.body["message"],
        "Failed to get dataset info 'orders': DSS returned HTTP 403: forbidden"
    );
}

// =============================================================================
// Sampling
// =============================================================================

fn orders_schema() -> serde_json::Value {
    json!({"columns": [
        {"name": "id", "type": "bigint"},
        {"name": "status", "type": "string"},
        {"name": "amount", "type": "double"}
    ]})
}

#[tokio::test]
async fn test_dataset_sample_types_values_and_stats() {
    let mock = MockDss::new();
    mock.on("GET /projects/PROJ/datasets/orders/schema", orders_schema())
        .text(
            "GET /projects/PROJ/datasets/orders/data/",
            "1\tshipped\t10.5\n2\tshipped\t\n3\tpending\t4\n",
        )
        .on(
            "GET /projects/PROJ/datasets/orders",
            json!({"type": "PostgreSQL", "formatType": "sql", "params": {"connection": "pg"}}),
        );

    let out = call(
        &dss(&mock),
        "get_dataset_sample",
        json!({"project_key": "PROJ", "dataset_name": "orders", "rows": 3}),
    )
    .await;

    assert!(!out.is_error, "{}", out.body);
    let data = &out.body["sample_data"];
    assert_eq!(
        data[0],
        json!({"id": 1, "status": "shipped", "amount": 10.5})
    );
    assert_eq!(data[1]["amount"], serde_json::Value::Null);
    assert_eq!(out.body["sample_stats"]["actual_rows"], 3);
    assert_eq!(out.body["dataset_info"]["connection"], "pg");

    let status = &out.body["column_stats"][1];
    assert_eq!(status["unique_count"], 2);
    let amount = &out.body["column_stats"][2];
    assert_eq!(amount["null_count"], 1);
    assert_eq!(amount["max"], 10.5);

    let request = mock
        .last("GET /projects/PROJ/datasets/orders/data/")
        .unwrap();
    assert!(request
        .query
        .contains(&("format".to_string(), "tsv-excel-noheader".to_string())));
}

#[tokio::test]
async fn test_dataset_sample_rejects_unknown_columns() {
    let mock = MockDss::new();
    mock.on("GET /projects/PROJ/datasets/orders/schema", orders_schema());

    let out = call(
        &dss(&mock),
        "get_dataset_sample",
        json!({"project_key": "PROJ", "dataset_name": "orders", "columns": ["id", "price"]}),
    )
    .await;

    assert!(out.is_error);
    assert_eq!(
        out.body["message"],
        "Invalid columns: ['price']. Available columns: ['id', 'status', 'amount']"
    );
    assert_eq!(
        mock.requests(),
        vec!["GET /projects/PROJ/datasets/orders/schema"]
    );
}
