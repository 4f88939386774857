//! The single mutable aggregate threaded through the control loop.

use serde::{Deserialize, Serialize};

use crate::core::governor::total_phases;
use crate::core::types::{EvaluationVerdict, Plan, RunStatus, TokenUsage};

/// Run-wide state. Owned by the orchestrator and mutated only between phase
/// barriers; workers never see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub query: String,
    /// Append-only, one entry per planning iteration. The last entry is the
    /// current plan.
    pub plan_history: Vec<Plan>,
    pub planning_iteration: u32,
    pub current_phase_index: usize,
    pub evaluation: Option<EvaluationVerdict>,
    /// Append-only across iterations.
    pub identified_gaps: Vec<String>,
    pub ready_for_synthesis: bool,
    pub final_report: Option<String>,
    pub status: RunStatus,
    /// Append-only, in the order errors were observed.
    pub errors: Vec<String>,
    pub total_tool_calls: u64,
    pub total_tokens_used: u64,
}

impl RunState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            plan_history: Vec::new(),
            planning_iteration: 0,
            current_phase_index: 0,
            evaluation: None,
            identified_gaps: Vec::new(),
            ready_for_synthesis: false,
            final_report: None,
            status: RunStatus::Planning,
            errors: Vec::new(),
            total_tool_calls: 0,
            total_tokens_used: 0,
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan_history.last()
    }

    pub fn plan_mut(&mut self) -> Option<&mut Plan> {
        if self.status.is_terminal() {
            return None;
        }
        self.plan_history.last_mut()
    }

    pub fn consumed_phases(&self) -> usize {
        total_phases(&self.plan_history)
    }

    /// Gaps to hand to the planner; `None` on the first iteration.
    pub fn gaps_for_planning(&self) -> Option<&[String]> {
        if self.planning_iteration == 0 || self.identified_gaps.is_empty() {
            return None;
        }
        Some(&self.identified_gaps)
    }

    /// Install a governed plan as the current plan.
    pub fn record_plan(&mut self, plan: Plan) {
        if self.status.is_terminal() {
            return;
        }
        self.plan_history.push(plan);
        self.planning_iteration += 1;
        self.current_phase_index = 0;
        self.status = RunStatus::Executing;
    }

    /// Every phase of the current plan has run; hand over to evaluation.
    pub fn finish_execution(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Evaluating;
    }

    pub fn record_usage(&mut self, usage: TokenUsage) {
        self.total_tokens_used += usage.total_tokens;
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Skip any further planning or evaluation and go straight to synthesis.
    pub fn force_synthesis(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.ready_for_synthesis = true;
        self.status = RunStatus::Synthesizing;
    }

    /// Record an evaluation that found gaps and loop back to planning.
    pub fn request_follow_up(&mut self, verdict: EvaluationVerdict) {
        if self.status.is_terminal() {
            return;
        }
        if let Some(plan) = self.plan_history.last_mut() {
            plan.needs_additional_research = true;
        }
        self.identified_gaps
            .extend(verdict.missing_aspects.iter().cloned());
        self.evaluation = Some(verdict);
        self.status = RunStatus::Planning;
    }

    /// Record an evaluation that accepted the findings.
    pub fn accept(&mut self, verdict: EvaluationVerdict) {
        if self.status.is_terminal() {
            return;
        }
        self.evaluation = Some(verdict);
        self.force_synthesis();
    }

    pub fn complete(&mut self, report: String) {
        if self.status.is_terminal() {
            return;
        }
        self.final_report = Some(report);
        self.status = RunStatus::Completed;
    }

    /// One-way transition to `failed`.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.errors.push(message.into());
        self.status = RunStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{phase_with_tasks, plan_with_phases, task, verdict};

    #[test]
    fn record_plan_advances_iteration() {
        let mut state = RunState::new("q");
        state.record_plan(plan_with_phases(vec![phase_with_tasks("p1", vec![task("t1")])]));

        assert_eq!(state.planning_iteration, 1);
        assert_eq!(state.plan_history.len(), 1);
        assert_eq!(state.status, RunStatus::Executing);
        assert_eq!(state.consumed_phases(), 1);
    }

    #[test]
    fn gaps_are_withheld_on_first_iteration() {
        let mut state = RunState::new("q");
        state.identified_gaps.push("gap".to_string());
        assert!(state.gaps_for_planning().is_none());

        state.record_plan(plan_with_phases(Vec::new()));
        assert_eq!(state.gaps_for_planning(), Some(&["gap".to_string()][..]));
    }

    #[test]
    fn follow_up_marks_plan_and_appends_gaps() {
        let mut state = RunState::new("q");
        state.record_plan(plan_with_phases(Vec::new()));
        state.identified_gaps.push("earlier".to_string());

        state.request_follow_up(verdict(false, 0.4, &["pricing", "timeline"]));

        assert_eq!(state.status, RunStatus::Planning);
        assert!(state.plan().expect("plan").needs_additional_research);
        assert_eq!(state.identified_gaps, vec!["earlier", "pricing", "timeline"]);
    }

    #[test]
    fn failed_is_absorbing() {
        let mut state = RunState::new("q");
        state.fail("Planning failed: boom");
        state.record_plan(plan_with_phases(Vec::new()));
        state.complete("report".to_string());
        state.force_synthesis();
        state.fail("second");

        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.plan_history.is_empty());
        assert!(state.final_report.is_none());
        assert!(state.plan_mut().is_none());
        assert_eq!(state.errors, vec!["Planning failed: boom"]);
    }

    #[test]
    fn accept_moves_to_synthesis() {
        let mut state = RunState::new("q");
        state.record_plan(plan_with_phases(Vec::new()));
        state.accept(verdict(true, 0.8, &[]));

        assert!(state.ready_for_synthesis);
        assert_eq!(state.status, RunStatus::Synthesizing);
        assert!(state.evaluation.is_some());
    }
}
