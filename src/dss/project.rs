//! Typed endpoint helpers over a [`DssApi`] transport.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{ApiRequest, DssApi, Method, Polling};
use crate::error::DssError;

/// Shared handle to one DSS instance.
///
/// Cheap to clone; every tool handler receives one.
#[derive(Clone)]
pub struct Dss {
    api: Arc<dyn DssApi>,
    polling: Polling,
}

impl std::fmt::Debug for Dss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dss")
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::missing_errors_doc)] // each helper fails exactly like DssApi::request
impl Dss {
    /// Wraps a transport.
    #[must_use]
    pub fn new(api: Arc<dyn DssApi>, polling: Polling) -> Self {
        Self { api, polling }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub fn api(&self) -> &dyn DssApi {
        self.api.as_ref()
    }

    /// Returns the polling policy for jobs and scenario runs.
    #[must_use]
    pub const fn polling(&self) -> Polling {
        self.polling
    }

    /// Returns a handle on one project.
    #[must_use]
    pub fn project(&self, project_key: &str) -> Project<'_> {
        Project {
            api: self.api.as_ref(),
            key: project_key.to_string(),
        }
    }

    /// `GET /instance-info`
    pub async fn instance_info(&self) -> Result<Value, DssError> {
        self.api.request(ApiRequest::get(&["instance-info"])).await
    }

    /// `GET /projects/`
    pub async fn list_projects(&self) -> Result<Vec<Value>, DssError> {
        let projects = self.api.request(ApiRequest::get(&["projects", ""])).await?;
        Ok(into_list(projects))
    }

    /// Returns the keys of every project visible to the API key.
    pub async fn list_project_keys(&self) -> Result<Vec<String>, DssError> {
        Ok(self
            .list_projects()
            .await?
            .iter()
            .filter_map(|p| p.get("projectKey").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// `POST /projects/`; the owner defaults to the API key's user.
    pub async fn create_project(&self, project_key: &str, name: &str) -> Result<Value, DssError> {
        self.api
            .request(
                ApiRequest::post(&["projects", ""])
                    .json(json!({"projectKey": project_key, "name": name})),
            )
            .await
    }

    /// `GET /admin/code-envs/`
    pub async fn list_code_envs(&self) -> Result<Vec<Value>, DssError> {
        let envs = self
            .api
            .request(ApiRequest::get(&["admin", "code-envs", ""]))
            .await?;
        Ok(into_list(envs))
    }

    /// `GET /admin/code-envs/{lang}/{name}`
    pub async fn code_env(&self, lang: &str, name: &str) -> Result<Value, DssError> {
        self.api
            .request(ApiRequest::get(&["admin", "code-envs", lang, name]))
            .await
    }

    /// `GET /admin/connections/`
    ///
    /// DSS answers with a map keyed by connection name; entries are returned
    /// as a list with the name filled in.
    pub async fn list_connections(&self) -> Result<Vec<Value>, DssError> {
        let connections = self
            .api
            .request(ApiRequest::get(&["admin", "connections", ""]))
            .await?;
        Ok(match connections {
            Value::Object(map) => map
                .into_iter()
                .map(|(name, mut conn)| {
                    if let Value::Object(fields) = &mut conn {
                        fields.entry("name").or_insert_with(|| Value::String(name));
                    }
                    conn
                })
                .collect(),
            other => into_list(other),
        })
    }

    /// `GET /admin/connections/{name}`
    pub async fn connection(&self, name: &str) -> Result<Value, DssError> {
        self.api
            .request(ApiRequest::get(&["admin", "connections", name]))
            .await
    }
}

/// Endpoint helpers scoped to one project key.
pub struct Project<'a> {
    api: &'a dyn DssApi,
    key: String,
}

#[allow(clippy::missing_errors_doc)]
impl Project<'_> {
    /// Returns the project key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn request(&self, method: Method, tail: &[&str]) -> ApiRequest {
        let mut segments = vec!["projects", self.key.as_str()];
        segments.extend_from_slice(tail);
        ApiRequest::new(method, &segments)
    }

    async fn get(&self, tail: &[&str]) -> Result<Value, DssError> {
        self.api.request(self.request(Method::Get, tail)).await
    }

    async fn put(&self, tail: &[&str], body: &Value) -> Result<Value, DssError> {
        self.api
            .request(self.request(Method::Put, tail).json(body.clone()))
            .await
    }

    async fn post(&self, tail: &[&str], body: Value) -> Result<Value, DssError> {
        self.api
            .request(self.request(Method::Post, tail).json(body))
            .await
    }

    async fn delete(&self, tail: &[&str]) -> Result<Value, DssError> {
        self.api.request(self.request(Method::Delete, tail)).await
    }

    // ==================== Project ====================

    /// Project metadata (name, description, tags, custom fields).
    pub async fn metadata(&self) -> Result<Value, DssError> {
        self.get(&["metadata"]).await
    }

    /// Full project settings.
    pub async fn settings(&self) -> Result<Value, DssError> {
        self.get(&["settings"]).await
    }

    /// Project variables: `{"standard": {...}, "local": {...}}`.
    pub async fn variables(&self) -> Result<Value, DssError> {
        self.get(&["variables", ""]).await
    }

    /// Replaces the project variables.
    pub async fn set_variables(&self, variables: &Value) -> Result<Value, DssError> {
        self.put(&["variables", ""], variables).await
    }

    /// Project permissions.
    pub async fn permissions(&self) -> Result<Value, DssError> {
        self.get(&["permissions"]).await
    }

    // ==================== Datasets ====================

    /// Lists dataset summaries.
    pub async fn list_datasets(&self) -> Result<Vec<Value>, DssError> {
        Ok(into_list(self.get(&["datasets", ""]).await?))
    }

    /// Raw dataset definition (type, params, format, flow options).
    pub async fn dataset(&self, name: &str) -> Result<Value, DssError> {
        self.get(&["datasets", name]).await
    }

    /// Saves a raw dataset definition.
    pub async fn set_dataset(&self, name: &str, definition: &Value) -> Result<Value, DssError> {
        self.put(&["datasets", name], definition).await
    }

    /// Creates a dataset from a full definition.
    pub async fn create_dataset(&self, definition: Value) -> Result<Value, DssError> {
        self.post(&["datasets", ""], definition).await
    }

    /// Creates a managed dataset stored on `connection`.
    pub async fn create_managed_dataset(
        &self,
        name: &str,
        connection: &str,
        format_option: Option<&str>,
    ) -> Result<Value, DssError> {
        let mut specific = json!({});
        if let Some(format) = format_option {
            specific["formatOptionId"] = json!(format);
        }
        self.post(
            &["datasets", "managed"],
            json!({
                "name": name,
                "creationSettings": {
                    "connectionId": connection,
                    "specificSettings": specific,
                    "partitioningOptionId": "NP",
                },
            }),
        )
        .await
    }

    /// Deletes a dataset, optionally dropping its data.
    pub async fn delete_dataset(&self, name: &str, drop_data: bool) -> Result<Value, DssError> {
        self.api
            .request(
                self.request(Method::Delete, &["datasets", name])
                    .query("dropData", drop_data.to_string()),
            )
            .await
    }

    /// Dataset schema: `{"columns": [...], "userModified": bool}`.
    pub async fn dataset_schema(&self, name: &str) -> Result<Value, DssError> {
        self.get(&["datasets", name, "schema"]).await
    }

    /// Replaces a dataset schema.
    pub async fn set_dataset_schema(&self, name: &str, schema: &Value) -> Result<Value, DssError> {
        self.put(&["datasets", name, "schema"], schema).await
    }

    /// Dataset metadata.
    pub async fn dataset_metadata(&self, name: &str) -> Result<Value, DssError> {
        self.get(&["datasets", name, "metadata"]).await
    }

    /// Replaces dataset metadata.
    pub async fn set_dataset_metadata(
        &self,
        name: &str,
        metadata: &Value,
    ) -> Result<Value, DssError> {
        self.put(&["datasets", name, "metadata"], metadata).await
    }

    /// Last computed metric values; `partition` defaults to `NP`.
    pub async fn dataset_last_metrics(
        &self,
        name: &str,
        partition: Option<&str>,
    ) -> Result<Value, DssError> {
        self.get(&["datasets", name, "metrics", "last", partition.unwrap_or("NP")])
            .await
    }

    /// Clears dataset data, optionally for a single partition list.
    pub async fn clear_dataset(
        &self,
        name: &str,
        partitions: Option<&str>,
    ) -> Result<Value, DssError> {
        let mut request = self.request(Method::Delete, &["datasets", name, "data"]);
        if let Some(partitions) = partitions {
            request = request.query("partitions", partitions);
        }
        self.api.request(request).await
    }

    /// Reads up to `limit` rows as header-less TSV.
    pub async fn dataset_rows_tsv(
        &self,
        name: &str,
        columns: &[String],
        limit: u64,
    ) -> Result<String, DssError> {
        let sampling = json!({"samplingMethod": "HEAD_SEQUENTIAL", "maxRecords": limit});
        let mut request = self
            .request(Method::Get, &["datasets", name, "data", ""])
            .query("format", "tsv-excel-noheader")
            .query("sampling", sampling.to_string());
        if !columns.is_empty() {
            request = request.query("columns", columns.join(","));
        }
        self.api.request_text(request).await
    }

    // ==================== Recipes ====================

    /// Lists recipe summaries.
    pub async fn list_recipes(&self) -> Result<Vec<Value>, DssError> {
        Ok(into_list(self.get(&["recipes", ""]).await?))
    }

    /// Recipe definition and payload: `{"recipe": {...}, "payload": "..."}`.
    pub async fn recipe(&self, name: &str) -> Result<Value, DssError> {
        self.get(&["recipes", name]).await
    }

    /// Saves a recipe definition and payload.
    pub async fn set_recipe(&self, name: &str, recipe: &Value) -> Result<Value, DssError> {
        self.put(&["recipes", name], recipe).await
    }

    /// Creates a recipe from a prototype and creation settings.
    pub async fn create_recipe(&self, body: Value) -> Result<Value, DssError> {
        self.post(&["recipes", ""], body).await
    }

    /// Deletes a recipe.
    pub async fn delete_recipe(&self, name: &str) -> Result<Value, DssError> {
        self.delete(&["recipes", name]).await
    }

    /// Recipe metadata.
    pub async fn recipe_metadata(&self, name: &str) -> Result<Value, DssError> {
        self.get(&["recipes", name, "metadata"]).await
    }

    /// Replaces recipe metadata.
    pub async fn set_recipe_metadata(
        &self,
        name: &str,
        metadata: &Value,
    ) -> Result<Value, DssError> {
        self.put(&["recipes", name, "metadata"], metadata).await
    }

    // ==================== Scenarios ====================

    /// Lists scenario summaries.
    pub async fn list_scenarios(&self) -> Result<Vec<Value>, DssError> {
        Ok(into_list(self.get(&["scenarios", ""]).await?))
    }

    /// Full scenario settings (name, type, active, triggers, params).
    pub async fn scenario(&self, id: &str) -> Result<Value, DssError> {
        self.get(&["scenarios", id, ""]).await
    }

    /// Saves full scenario settings.
    pub async fn set_scenario(&self, id: &str, settings: &Value) -> Result<Value, DssError> {
        self.put(&["scenarios", id, ""], settings).await
    }

    /// Creates a scenario; returns the created scenario with its `id`.
    pub async fn create_scenario(&self, definition: Value) -> Result<Value, DssError> {
        self.post(&["scenarios", ""], definition).await
    }

    /// Deletes a scenario.
    pub async fn delete_scenario(&self, id: &str) -> Result<Value, DssError> {
        self.delete(&["scenarios", id, ""]).await
    }

    /// Scenario metadata.
    pub async fn scenario_metadata(&self, id: &str) -> Result<Value, DssError> {
        self.get(&["scenarios", id, "metadata"]).await
    }

    /// Replaces scenario metadata.
    pub async fn set_scenario_metadata(
        &self,
        id: &str,
        metadata: &Value,
    ) -> Result<Value, DssError> {
        self.put(&["scenarios", id, "metadata"], metadata).await
    }

    /// Light status: active flag, running state, next run.
    pub async fn scenario_status(&self, id: &str) -> Result<Value, DssError> {
        self.get(&["scenarios", id, "light"]).await
    }

    /// Requests a run; returns the trigger fire.
    pub async fn run_scenario(&self, id: &str) -> Result<Value, DssError> {
        self.post(&["scenarios", id, "run"], json!({})).await
    }

    /// Most recent runs, newest first.
    pub async fn scenario_last_runs(&self, id: &str, limit: u64) -> Result<Vec<Value>, DssError> {
        let runs = self
            .api
            .request(
                self.request(Method::Get, &["scenarios", id, "get-last-runs"])
                    .query("limit", limit.to_string()),
            )
            .await?;
        Ok(into_list(runs))
    }

    /// Run details including step runs.
    pub async fn scenario_run_details(&self, id: &str, run_id: &str) -> Result<Value, DssError> {
        self.api
            .request(
                self.request(Method::Get, &["scenarios", id, "get-run-details"])
                    .query("runId", run_id),
            )
            .await
    }

    /// Looks up the run started by a trigger fire.
    pub async fn scenario_run_for_trigger(
        &self,
        id: &str,
        trigger_id: &str,
        trigger_run_id: &str,
    ) -> Result<Value, DssError> {
        self.api
            .request(
                self.request(Method::Get, &["scenarios", id, "get-run-for-trigger"])
                    .query("triggerId", trigger_id)
                    .query("triggerRunId", trigger_run_id),
            )
            .await
    }

    // ==================== Jobs ====================

    /// Lists job summaries, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Value>, DssError> {
        Ok(into_list(self.get(&["jobs", ""]).await?))
    }

    /// Full job status.
    pub async fn job(&self, id: &str) -> Result<Value, DssError> {
        self.get(&["jobs", id, ""]).await
    }

    /// Raw job log.
    pub async fn job_log(&self, id: &str) -> Result<String, DssError> {
        self.api
            .request_text(self.request(Method::Get, &["jobs", id, "log"]))
            .await
    }

    /// Aborts a job.
    pub async fn abort_job(&self, id: &str) -> Result<Value, DssError> {
        self.post(&["jobs", id, "abort"], json!({})).await
    }

    /// Starts a build of the given datasets; returns the job id.
    pub async fn start_build(
        &self,
        outputs: &[String],
        job_type: &str,
        partition: Option<&str>,
    ) -> Result<String, DssError> {
        let outputs: Vec<Value> = outputs
            .iter()
            .map(|id| {
                let mut output = json!({"id": id, "type": "DATASET"});
                if let Some(partition) = partition {
                    output["partition"] = json!(partition);
                }
                output
            })
            .collect();
        let job = self
            .post(&["jobs", ""], json!({"outputs": outputs, "type": job_type}))
            .await?;
        job.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DssError::InvalidResponse("job start returned no id".to_string()))
    }
}

/// Returns the dataset names referenced by a recipe's `inputs` or `outputs`.
///
/// Recipes group references by role (`main`, `reference`, ...); every role
/// is flattened in order.
#[must_use]
pub fn recipe_refs(recipe: &Value, side: &str) -> Vec<String> {
    let Some(roles) = recipe.get(side).and_then(Value::as_object) else {
        return Vec::new();
    };
    roles
        .values()
        .filter_map(|role| role.get("items").and_then(Value::as_array))
        .flatten()
        .filter_map(|item| item.get("ref").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Display name of a project: its `label`, then its `name`, then `key`.
#[must_use]
pub fn project_label<'a>(metadata: &'a Value, key: &'a str) -> &'a str {
    metadata
        .get("label")
        .or_else(|| metadata.get("name"))
        .and_then(Value::as_str)
        .unwrap_or(key)
}

/// Turns a listing response into a vector; anything but an array is empty.
pub(crate) fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_refs_flattens_roles() {
        let recipe = json!({
            "inputs": {
                "main": {"items": [{"ref": "orders"}, {"ref": "customers"}]},
                "reference": {"items": [{"ref": "lookup"}]}
            },
            "outputs": {"main": {"items": [{"ref": "joined"}]}}
        });
        let inputs = recipe_refs(&recipe, "inputs");
        assert_eq!(inputs.len(), 3);
        assert!(inputs.contains(&"lookup".to_string()));
        assert_eq!(recipe_refs(&recipe, "outputs"), vec!["joined"]);
        assert!(recipe_refs(&json!({}), "inputs").is_empty());
    }

    #[test]
    fn project_label_prefers_label() {
        let both = json!({"label": "Sales", "name": "sales_v2"});
        assert_eq!(project_label(&both, "SALES"), "Sales");
        let named = json!({"name": "sales_v2"});
        assert_eq!(project_label(&named, "SALES"), "sales_v2");
        assert_eq!(project_label(&json!({}), "SALES"), "SALES");
    }

    #[test]
    fn into_list_ignores_non_arrays() {
        assert_eq!(into_list(json!([1, 2])).len(), 2);
        assert!(into_list(json!({"a": 1})).is_empty());
        assert!(into_list(Value::Null).is_empty());
    }
}
