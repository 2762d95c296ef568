//! Waiting on long-running DSS work: job builds and scenario runs.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::Project;
use crate::config::JobsConfig;
use crate::error::DssError;

/// Job states after which a job no longer changes.
pub const TERMINAL_STATES: [&str; 3] = ["DONE", "FAILED", "ABORTED"];

/// Job states that can still be aborted.
pub const ACTIVE_STATES: [&str; 2] = ["RUNNING", "PENDING"];

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polling {
    /// Delay between two polls.
    pub interval: Duration,
    /// Upper bound on the total wait.
    pub max_wait: Duration,
}

impl Default for Polling {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for Polling {
    fn from(config: &JobsConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_wait: Duration::from_secs(config.max_wait_secs),
        }
    }
}

/// Returns the state of a job status document (`baseStatus.state`).
#[must_use]
pub fn job_state(status: &Value) -> &str {
    status
        .pointer("/baseStatus/state")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
}

/// Returns `true` once a job can no longer change state.
#[must_use]
pub fn is_terminal(state: &str) -> bool {
    TERMINAL_STATES.contains(&state)
}

/// Polls a job until it reaches a terminal state and returns its final status.
///
/// # Errors
///
/// Returns [`DssError::Timeout`] if the job is still running after
/// `polling.max_wait`, or any error raised while reading the status.
pub async fn wait_for_job(
    project: &Project<'_>,
    job_id: &str,
    polling: Polling,
) -> Result<Value, DssError> {
    let deadline = Instant::now() + polling.max_wait;
    loop {
        let status = project.job(job_id).await?;
        let state = job_state(&status);
        if is_terminal(state) {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            return Err(DssError::Timeout {
                what: format!("job {job_id}"),
                waited: polling.max_wait,
            });
        }
        debug!(job_id, state, "Waiting for job");
        sleep(polling.interval).await;
    }
}

/// Polls the scenario run started by `trigger_fire` until it has a result.
///
/// `trigger_fire` is the document returned when a run is requested; it
/// carries `trigger.id` and `runId`. Returns the finished `scenarioRun`.
///
/// # Errors
///
/// Returns an error if the trigger fire is malformed, the run does not finish
/// within `polling.max_wait`, or a status read fails.
pub async fn wait_for_scenario_run(
    project: &Project<'_>,
    scenario_id: &str,
    trigger_fire: &Value,
    polling: Polling,
) -> Result<Value, DssError> {
    let trigger_id = trigger_fire
        .pointer("/trigger/id")
        .and_then(Value::as_str)
        .ok_or_else(|| DssError::InvalidResponse("trigger fire has no trigger id".to_string()))?;
    let trigger_run_id = trigger_fire
        .get("runId")
        .and_then(Value::as_str)
        .ok_or_else(|| DssError::InvalidResponse("trigger fire has no run id".to_string()))?;

    let deadline = Instant::now() + polling.max_wait;
    loop {
        let found = project
            .scenario_run_for_trigger(scenario_id, trigger_id, trigger_run_id)
            .await?;
        if let Some(run) = found.get("scenarioRun").filter(|r| !r.is_null()) {
            if run.get("result").is_some_and(|r| !r.is_null()) {
                return Ok(run.clone());
            }
        }
        if Instant::now() >= deadline {
            return Err(DssError::Timeout {
                what: format!("scenario {scenario_id}"),
                waited: polling.max_wait,
            });
        }
        debug!(scenario_id, "Waiting for scenario run");
        sleep(polling.interval).await;
    }
}
