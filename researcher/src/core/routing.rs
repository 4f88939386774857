//! Deterministic routing decisions at the planning and evaluation checkpoints.

use crate::core::budget::PlanBudget;
use crate::core::state::RunState;
use crate::core::types::EvaluationVerdict;

/// Where the run goes after the evaluation checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationRoute {
    /// Findings are sufficient.
    Synthesize,
    /// Gaps remain; plan again.
    Replan,
}

/// Where the run goes when it enters the planning checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningRoute {
    Plan,
    /// Cumulative phase ceiling already reached; skip planning.
    Bypass,
}

pub fn route_before_planning(state: &RunState, budget: &PlanBudget) -> PlanningRoute {
    if budget.phase_ceiling_reached(state.consumed_phases()) {
        PlanningRoute::Bypass
    } else {
        PlanningRoute::Plan
    }
}

/// Checked before any evaluation request is made.
pub fn evaluation_capped(state: &RunState, budget: &PlanBudget) -> bool {
    budget.iteration_cap_reached(state.planning_iteration)
}

/// Route on a verdict. Depends only on the verdict, so a fixed oracle reply
/// always yields the same route.
pub fn route_after_verdict(verdict: &EvaluationVerdict) -> EvaluationRoute {
    if verdict.is_complete {
        EvaluationRoute::Synthesize
    } else {
        EvaluationRoute::Replan
    }
}
