//! Run-state invariants not expressible in the type system.

use std::collections::HashSet;

use crate::core::budget::PlanBudget;
use crate::core::state::RunState;
use crate::core::types::{RunStatus, WorkStatus};

/// Check run-state invariants:
/// - `planning_iteration == plan_history.len()`
/// - every governed plan fits the per-plan and per-phase caps
/// - cumulative phases never exceed the total ceiling
/// - no duplicate task ids within a plan
/// - a completed run carries a report
pub fn validate_run_state(state: &RunState, budget: &PlanBudget) -> Vec<String> {
    let mut errors = Vec::new();

    if state.planning_iteration as usize != state.plan_history.len() {
        errors.push(format!(
            "planning_iteration {} does not match plan history length {}",
            state.planning_iteration,
            state.plan_history.len()
        ));
    }

    for (idx, plan) in state.plan_history.iter().enumerate() {
        if plan.phases.len() > budget.max_phases_per_plan {
            errors.push(format!(
                "plan {}: {} phases exceeds cap {}",
                idx + 1,
                plan.phases.len(),
                budget.max_phases_per_plan
            ));
        }

        let mut seen = HashSet::new();
        for phase in &plan.phases {
            if phase.tasks.len() > budget.max_tasks_per_phase {
                errors.push(format!(
                    "plan {}: phase '{}' has {} tasks, cap is {}",
                    idx + 1,
                    phase.id,
                    phase.tasks.len(),
                    budget.max_tasks_per_phase
                ));
            }
            for task in &phase.tasks {
                if !seen.insert(task.id.as_str()) {
                    errors.push(format!("plan {}: duplicate task id '{}'", idx + 1, task.id));
                }
            }
        }
    }

    let consumed = state.consumed_phases();
    if consumed > budget.max_total_phases {
        errors.push(format!(
            "cumulative phases {} exceeds ceiling {}",
            consumed, budget.max_total_phases
        ));
    }

    if state.status == RunStatus::Completed && state.final_report.is_none() {
        errors.push("completed run has no final report".to_string());
    }

    if state.status == RunStatus::Failed && state.errors.is_empty() {
        errors.push("failed run has no recorded error".to_string());
    }

    if state.status != RunStatus::Executing {
        for phase in state.plan_history.iter().flat_map(|plan| &plan.phases) {
            if phase.status == WorkStatus::InProgress {
                errors.push(format!("phase '{}' left in progress", phase.id));
            }
        }
    }

    errors
}
