//! Post-barrier settlement of a phase.

use crate::core::types::{Phase, WorkStatus, WorkerOutcome};

/// Mark every task of `phase` as in progress ahead of dispatch.
pub fn start_phase(phase: &mut Phase) {
    phase.status = WorkStatus::InProgress;
    phase.error = None;
    for task in &mut phase.tasks {
        task.status = WorkStatus::InProgress;
    }
}

/// Copy worker outcomes into their owning tasks and derive the phase outcome.
///
/// `outcomes` must be in task order. Returns one error string per failed task,
/// in task order, for the run-level error list.
pub fn settle_phase(phase: &mut Phase, outcomes: Vec<WorkerOutcome>) -> Vec<String> {
    let mut task_errors = Vec::new();

    for (task, outcome) in phase.tasks.iter_mut().zip(outcomes) {
        task.status = outcome.status;
        task.output = outcome.output;
        task.error = outcome.error;
        task.tool_calls_made = outcome.tool_calls_made;

        if task.status == WorkStatus::Failed {
            let reason = task.error.as_deref().unwrap_or("unknown error");
            task_errors.push(format!(
                "Task '{}' ({}) failed: {}",
                task.name, task.id, reason
            ));
        }
    }

    if task_errors.is_empty() {
        phase.status = WorkStatus::Completed;
        phase.error = None;
    } else {
        phase.status = WorkStatus::Failed;
        phase.error = Some(format!(
            "{} of {} task(s) failed",
            task_errors.len(),
            phase.tasks.len()
        ));
    }

    task_errors
}
