//! Plan governor: asks the oracle for a plan and truncates it to budget.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::budget::PlanBudget;
use crate::core::governor::{Truncation, enforce_plan_constraints};
use crate::core::types::{Plan, TokenUsage};
use crate::io::oracle::{Oracle, ask_structured};
use crate::io::prompt::{PlannerPrompt, PromptEngine};

/// A plan that already fits the budget, plus what governance cut.
#[derive(Debug, Clone)]
pub struct GovernedPlan {
    pub plan: Plan,
    pub truncations: Vec<Truncation>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy)]
pub struct PlannerAgent {
    budget: PlanBudget,
    temperature: f32,
}

impl PlannerAgent {
    pub fn new(budget: PlanBudget, temperature: f32) -> Self {
        Self {
            budget,
            temperature,
        }
    }

    /// Produce the next governed plan. `consumed` is the number of phases
    /// spent by earlier plans. Oracle failures are returned, not retried.
    #[instrument(skip_all, fields(consumed = consumed, follow_up = gaps.is_some()))]
    pub async fn run(
        &self,
        oracle: &dyn Oracle,
        prompts: &PromptEngine,
        query: &str,
        gaps: Option<&[String]>,
        consumed: usize,
    ) -> Result<GovernedPlan> {
        let remaining = self.budget.remaining_phases(consumed);
        let messages = prompts.planner_messages(&PlannerPrompt {
            query,
            gaps,
            remaining_phases: remaining,
            max_phases_per_plan: self.budget.max_phases_per_plan,
            max_tasks_per_phase: self.budget.max_tasks_per_phase,
            max_total_phases: self.budget.max_total_phases,
        })?;

        let answer = ask_structured::<Plan>(oracle, "planner", messages, self.temperature).await?;
        let mut plan = answer.value;
        let truncations = enforce_plan_constraints(&mut plan, &self.budget, consumed);
        for note in &truncations {
            warn!(%note, "plan truncated");
        }
        info!(
            phases = plan.phases.len(),
            tasks = plan.task_count(),
            remaining,
            "plan governed"
        );

        Ok(GovernedPlan {
            plan,
            truncations,
            usage: answer.usage,
        })
    }
}
