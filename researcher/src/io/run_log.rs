//! Run artifacts written to `--out`: `run_state.json`, `report.md`, `meta.json`.
//!
//! Artifacts are output only. A run is never resumed from them.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::state::RunState;
use crate::core::types::WorkStatus;

pub const RUN_STATE_FILE: &str = "run_state.json";
pub const REPORT_FILE: &str = "report.md";
pub const META_FILE: &str = "meta.json";

/// Summary of one run, persisted to `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMeta {
    pub query: String,
    pub status: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub planning_iterations: u32,
    pub phases: usize,
    pub tasks: usize,
    pub failed_tasks: usize,
    pub total_tool_calls: u64,
    pub total_tokens_used: u64,
    pub errors: usize,
}

impl RunMeta {
    pub fn from_state(state: &RunState, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        let tasks = state
            .plan_history
            .iter()
            .flat_map(|plan| &plan.phases)
            .flat_map(|phase| &phase.tasks);
        let (task_count, failed) = tasks.fold((0, 0), |(all, failed), task| {
            (all + 1, failed + usize::from(task.status == WorkStatus::Failed))
        });
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0);

        Self {
            query: state.query.clone(),
            status: state.status.as_str().to_string(),
            start_time: started_at.to_rfc3339(),
            end_time: finished_at.to_rfc3339(),
            duration_secs: duration_ms as f64 / 1000.0,
            planning_iterations: state.planning_iteration,
            phases: state.consumed_phases(),
            tasks: task_count,
            failed_tasks: failed,
            total_tool_calls: state.total_tool_calls,
            total_tokens_used: state.total_tokens_used,
            errors: state.errors.len(),
        }
    }
}

/// Write all artifacts for a finished run into `dir`.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn write_run_artifacts(
    dir: &Path,
    state: &RunState,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;

    write_json(&dir.join(RUN_STATE_FILE), state)?;
    if let Some(report) = &state.final_report {
        let mut buf = report.clone();
        if !buf.ends_with('\n') {
            buf.push('\n');
        }
        write_atomic(&dir.join(REPORT_FILE), &buf)?;
    }
    let meta = RunMeta::from_state(state, started_at, finished_at);
    write_json(&dir.join(META_FILE), &meta)?;

    debug!(status = %meta.status, "run artifacts written");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
