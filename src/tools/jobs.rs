//! Monitoring tools (recent runs, job details, cancellation) and the build
//! helper shared by recipe and dataset tools.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::fields::{self, quoted_list};
use super::{tool, Args, ToolError, ToolResult};
use crate::dss::jobs::{job_state, wait_for_job, ACTIVE_STATES};
use crate::dss::{Dss, Project};
use crate::error::DssError;
use crate::mcp::server::ToolDefinition;

/// Accepted build modes.
pub const BUILD_MODES: [&str; 3] = [
    "RECURSIVE_BUILD",
    "NON_RECURSIVE_FORCED_BUILD",
    "RECURSIVE_FORCED_BUILD",
];

/// Build mode used when none is given.
pub const DEFAULT_BUILD_MODE: &str = "NON_RECURSIVE_FORCED_BUILD";

const SUCCESS_OUTCOMES: [&str; 2] = ["SUCCESS", "DONE"];
const FAILED_OUTCOMES: [&str; 2] = ["FAILED", "ABORTED"];
const MAX_RECENT_FAILURES: usize = 10;
const MAX_ACTIVITIES: usize = 10;

/// Validates an optional build mode, falling back to the default.
///
/// `message` starts the error text, e.g. `Invalid build_mode.`.
pub fn check_build_mode<'a>(mode: Option<&'a str>, message: &str) -> Result<&'a str, ToolError> {
    match mode {
        None => Ok(DEFAULT_BUILD_MODE),
        Some(mode) if BUILD_MODES.contains(&mode) => Ok(mode),
        Some(_) => Err(ToolError::InvalidArgument(format!(
            "{message} Must be one of: {}",
            quoted_list(&BUILD_MODES)
        ))),
    }
}

/// A finished build job.
#[derive(Debug)]
pub struct BuildOutcome {
    pub job_id: String,
    pub status: Value,
}

impl BuildOutcome {
    pub fn state(&self) -> &str {
        job_state(&self.status)
    }

    pub fn failed(&self) -> bool {
        FAILED_OUTCOMES.contains(&self.state())
    }

    /// Job fields reported by run and build tools.
    pub fn to_json(&self) -> Value {
        json!({
            "job_id": self.job_id,
            "job_status": self.state(),
            "job_start_time": fields::at(&self.status, "/baseStatus/startTime"),
            "job_end_time": fields::at(&self.status, "/baseStatus/endTime"),
        })
    }
}

/// Starts a build of `outputs` and waits for the job to finish.
pub async fn build_and_wait(
    dss: &Dss,
    project: &Project<'_>,
    outputs: &[String],
    mode: &str,
    partition: Option<&str>,
) -> Result<BuildOutcome, DssError> {
    let job_id = project.start_build(outputs, mode, partition).await?;
    debug!(job_id = %job_id, mode, "Build started");
    let status = wait_for_job(project, &job_id, dss.polling()).await?;
    Ok(BuildOutcome { job_id, status })
}

/// Flattens a job listing entry.
fn job_summary(job: &Value) -> Value {
    let def = &job["def"];
    let id = fields::text_or(def, "id", fields::text(job, "jobId"));
    let state = job
        .get("state")
        .or_else(|| job.pointer("/baseStatus/state"))
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN");
    let start =
        fields::millis(job, "startTime").or_else(|| fields::millis(def, "initiationTimestamp"));
    let end = fields::millis(job, "endTime");
    let name = def
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| format!("Job {id}"), str::to_string);
    json!({
        "job_id": id,
        "job_name": name,
        "state": state,
        "start_time": start,
        "end_time": end,
        "duration": fields::duration_secs(start, end),
    })
}

/// Flattens a scenario run.
pub fn scenario_run_summary(run: &Value) -> Value {
    let start = fields::millis(run, "start");
    let end = fields::millis(run, "end");
    json!({
        "run_id": fields::field(run, "runId"),
        "outcome": fields::text_at(run, "/result/outcome", "RUNNING"),
        "start_time": start,
        "end_time": end,
        "duration": fields::duration_secs(start, end),
        "trigger_name": fields::at(run, "/trigger/trigger/name"),
        "trigger_type": fields::text_at(run, "/trigger/trigger/type", "unknown"),
    })
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "get_recent_runs",
            "Get recent run history across all scenarios and jobs of a project, with summary \
             statistics.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "limit": { "type": "integer", "minimum": 0, "description": "Number of recent runs to return (default 50)" },
                    "status_filter": { "type": "string", "description": "Only include runs with this outcome (e.g. SUCCESS, FAILED, DONE)" }
                },
                "required": ["project_key"]
            }),
        ),
        tool(
            "get_job_details",
            "Get detailed job execution information: state, log, activities and timeline.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "job_id": { "type": "string", "description": "Job identifier" }
                },
                "required": ["project_key", "job_id"]
            }),
        ),
        tool(
            "cancel_running_jobs",
            "Abort running or pending jobs and report which were cancelled.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "job_ids": { "type": "array", "items": { "type": "string" }, "description": "Job IDs to cancel" }
                },
                "required": ["project_key", "job_ids"]
            }),
        ),
    ]
}

pub async fn get_recent_runs(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let limit = args.u64_or("limit", 50)?;
    let status_filter = args.opt_str("status_filter")?;
    let keep = |outcome: &str| status_filter.map_or(true, |f| f == outcome);

    let project = dss.project(project_key);
    let mut runs: Vec<Value> = Vec::new();

    for scenario in project.list_scenarios().await? {
        let id = fields::text(&scenario, "id");
        let last_runs = match project.scenario_last_runs(id, limit).await {
            Ok(last_runs) => last_runs,
            Err(e) => {
                warn!(scenario = id, error = %e, "Skipping scenario runs");
                continue;
            }
        };
        for run in &last_runs {
            let summary = scenario_run_summary(run);
            if !keep(fields::text(&summary, "outcome")) {
                continue;
            }
            runs.push(json!({
                "type": "scenario",
                "object_id": id,
                "object_name": fields::field(&scenario, "name"),
                "run_id": summary["run_id"],
                "outcome": summary["outcome"],
                "start_time": summary["start_time"],
                "end_time": summary["end_time"],
                "duration": summary["duration"],
                "trigger_type": summary["trigger_type"],
            }));
        }
    }

    match project.list_jobs().await {
        Ok(jobs) => {
            let take = usize::try_from(limit).unwrap_or(usize::MAX);
            for job in jobs.iter().take(take) {
                let summary = job_summary(job);
                if !keep(fields::text(&summary, "state")) {
                    continue;
                }
                runs.push(json!({
                    "type": "job",
                    "object_id": summary["job_id"],
                    "object_name": summary["job_name"],
                    "run_id": summary["job_id"],
                    "outcome": summary["state"],
                    "start_time": summary["start_time"],
                    "end_time": summary["end_time"],
                    "duration": summary["duration"],
                    "trigger_type": "manual",
                }));
            }
        }
        Err(e) => warn!(error = %e, "Job listing unavailable"),
    }

    runs.sort_by_key(|run| std::cmp::Reverse(run["start_time"].as_i64().unwrap_or(0)));
    runs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

    let outcome_of = |run: &Value| fields::text(run, "outcome").to_string();
    let count = |outcomes: &[&str]| {
        runs.iter()
            .filter(|r| outcomes.contains(&fields::text(r, "outcome")))
            .count()
    };
    let success_runs = count(&SUCCESS_OUTCOMES);
    let failed_runs = count(&FAILED_OUTCOMES);
    let running_runs = count(&ACTIVE_STATES);

    let durations: Vec<f64> = runs
        .iter()
        .filter(|r| ["SUCCESS", "DONE", "FAILED"].contains(&fields::text(r, "outcome")))
        .filter_map(|r| r["duration"].as_f64())
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let average_duration = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    let mut outcome_summary: BTreeMap<String, usize> = BTreeMap::new();
    let mut type_summary: BTreeMap<String, usize> = BTreeMap::new();
    for run in &runs {
        *outcome_summary.entry(outcome_of(run)).or_default() += 1;
        *type_summary.entry(fields::text(run, "type").to_string()).or_default() += 1;
    }

    let recent_failures: Vec<&Value> = runs
        .iter()
        .filter(|r| FAILED_OUTCOMES.contains(&fields::text(r, "outcome")))
        .take(MAX_RECENT_FAILURES)
        .collect();

    Ok(json!({
        "project_key": project_key,
        "summary": {
            "total_runs": runs.len(),
            "success_runs": success_runs,
            "failed_runs": failed_runs,
            "running_runs": running_runs,
            "success_rate": fields::percentage(success_runs, runs.len()),
            "average_duration": average_duration,
            "outcome_summary": outcome_summary,
            "type_summary": type_summary,
            "recent_failures_count": recent_failures.len(),
        },
        "recent_failures": recent_failures,
        "runs": runs,
        "filters_applied": {
            "limit": limit,
            "status_filter": status_filter,
        },
    }))
}

pub async fn get_job_details(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let job_id = args.str("job_id")?;

    let project = dss.project(project_key);
    let status = project.job(job_id).await?;
    let base = &status["baseStatus"];

    let start_time = fields::field(base, "startTime");
    let end_time = fields::field(base, "endTime");
    let state = fields::text_or(base, "state", "unknown");
    let initiator = base
        .pointer("/def/initiator")
        .or_else(|| base.get("initiator"))
        .cloned()
        .unwrap_or_else(|| json!("unknown"));
    let job_info = json!({
        "job_id": job_id,
        "state": state,
        "start_time": start_time,
        "end_time": end_time,
        "initiator": initiator,
        "warning": fields::flag(&status, "hasWarning", false),
    });

    let mut logs = Vec::new();
    match project.job_log(job_id).await {
        Ok(content) if !content.is_empty() => logs.push(json!({
            "type": "main_log",
            "content": content,
            "timestamp": start_time,
        })),
        Ok(_) => {}
        Err(e) => logs.push(json!({
            "type": "error",
            "content": format!("Could not retrieve job log: {e}"),
            "timestamp": start_time,
        })),
    }

    let activities: Vec<&Value> = match base.get("activities") {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(items)) => items.iter().collect(),
        _ => Vec::new(),
    };
    let activity_info = json!({
        "activity_count": activities.len(),
        "activities": activities
            .iter()
            .take(MAX_ACTIVITIES)
            .map(|a| json!({
                "type": fields::text_or(a, "recipeType", fields::text_or(a, "type", "unknown")),
                "name": fields::text_or(a, "recipeName", fields::text_or(a, "activityId", "unknown")),
                "state": fields::text_or(a, "state", "unknown"),
                "start_time": fields::field(a, "startTime"),
                "end_time": fields::field(a, "endTime"),
            }))
            .collect::<Vec<_>>(),
    });

    let mut timeline = Vec::new();
    if !start_time.is_null() {
        timeline.push(json!({
            "event": "job_started",
            "timestamp": start_time,
            "description": "Job execution started",
        }));
    }
    if !end_time.is_null() {
        timeline.push(json!({
            "event": "job_completed",
            "timestamp": end_time,
            "description": format!("Job completed with status: {state}"),
        }));
    }

    Ok(json!({
        "project_key": project_key,
        "job_info": job_info,
        "log_count": logs.len(),
        "logs": logs,
        "activity_info": activity_info,
        "timeline": timeline,
    }))
}

pub async fn cancel_running_jobs(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let job_ids = args.str_list("job_ids")?;

    let project = dss.project(project_key);
    let mut cancelled_jobs = Vec::new();
    let mut failed_cancellations = Vec::new();

    for job_id in &job_ids {
        let previous = match project.job(job_id).await {
            Ok(status) => job_state(&status).to_string(),
            Err(e) => {
                failed_cancellations.push(json!({
                    "job_id": job_id,
                    "error": format!("Failed to cancel job: {e}"),
                }));
                continue;
            }
        };
        if !ACTIVE_STATES.contains(&previous.as_str()) {
            failed_cancellations.push(json!({
                "job_id": job_id,
                "error": format!("Job is not running (state: {previous})"),
                "current_state": previous,
            }));
            continue;
        }
        if let Err(e) = project.abort_job(job_id).await {
            failed_cancellations.push(json!({
                "job_id": job_id,
                "error": format!("Failed to cancel job: {e}"),
            }));
            continue;
        }

        sleep(dss.polling().interval).await;
        let entry = match project.job(job_id).await {
            Ok(status) => {
                let new_state = job_state(&status);
                json!({
                    "job_id": job_id,
                    "previous_state": previous,
                    "new_state": new_state,
                    "cancelled_successfully": matches!(new_state, "ABORTED" | "CANCELLED"),
                })
            }
            Err(e) => json!({
                "job_id": job_id,
                "previous_state": previous,
                "new_state": "unknown",
                "cancelled_successfully": true,
                "verification_error": e.to_string(),
            }),
        };
        cancelled_jobs.push(entry);
    }

    let current_running_jobs: Vec<Value> = match project.list_jobs().await {
        Ok(jobs) => jobs
            .iter()
            .map(job_summary)
            .filter(|j| ACTIVE_STATES.contains(&fields::text(j, "state")))
            .collect(),
        Err(e) => {
            warn!(error = %e, "Could not list running jobs");
            Vec::new()
        }
    };

    let successful = cancelled_jobs
        .iter()
        .filter(|j| fields::flag(j, "cancelled_successfully", false))
        .count();

    Ok(json!({
        "project_key": project_key,
        "cancellation_summary": {
            "total_requested": job_ids.len(),
            "successful_cancellations": successful,
            "failed_cancellations": failed_cancellations.len(),
            "success_rate": fields::percentage(successful, job_ids.len()),
            "remaining_running_jobs": current_running_jobs.len(),
        },
        "cancelled_jobs": cancelled_jobs,
        "failed_cancellations": failed_cancellations,
        "current_running_jobs": current_running_jobs,
    }))
}
