//! Post-hoc governance of oracle-produced plans.
//!
//! Governance only ever truncates: phases beyond the allowance and tasks beyond
//! the per-phase cap are dropped in order. A plan that exceeds its budget is
//! corrected silently, never rejected.

use crate::core::budget::PlanBudget;
use crate::core::types::Plan;

/// A single truncation applied during governance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Truncation {
    Phases {
        from: usize,
        to: usize,
    },
    Tasks {
        phase: String,
        from: usize,
        to: usize,
    },
}

impl std::fmt::Display for Truncation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Truncation::Phases { from, to } => {
                write!(f, "plan had {from} phases, truncated to {to}")
            }
            Truncation::Tasks { phase, from, to } => {
                write!(f, "phase '{phase}' had {from} tasks, truncated to {to}")
            }
        }
    }
}

/// Truncate `plan` in place so it fits `budget`, given `consumed` phases
/// already spent by earlier plans.
pub fn enforce_plan_constraints(
    plan: &mut Plan,
    budget: &PlanBudget,
    consumed: usize,
) -> Vec<Truncation> {
    let mut applied = Vec::new();

    let allowance = budget.phase_allowance(consumed);
    if plan.phases.len() > allowance {
        applied.push(Truncation::Phases {
            from: plan.phases.len(),
            to: allowance,
        });
        plan.phases.truncate(allowance);
    }

    for phase in &mut plan.phases {
        if phase.tasks.len() > budget.max_tasks_per_phase {
            applied.push(Truncation::Tasks {
                phase: phase.name.clone(),
                from: phase.tasks.len(),
                to: budget.max_tasks_per_phase,
            });
            phase.tasks.truncate(budget.max_tasks_per_phase);
        }
    }

    applied
}

/// Phases consumed across every plan in `history`.
pub fn total_phases(history: &[Plan]) -> usize {
    history.iter().map(|plan| plan.phases.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{phase_with_tasks, plan_with_phases, task};

    fn wide_phase(id: &str, tasks: usize) -> crate::core::types::Phase {
        let tasks = (0..tasks).map(|i| task(&format!("{id}-t{i}"))).collect();
        phase_with_tasks(id, tasks)
    }

    #[test]
    fn oversized_plan_is_truncated_to_caps() {
        let mut plan = plan_with_phases((0..6).map(|i| wide_phase(&format!("p{i}"), 7)).collect());

        let applied = enforce_plan_constraints(&mut plan, &PlanBudget::default(), 0);

        assert_eq!(plan.phases.len(), 4);
        assert!(plan.phases.iter().all(|phase| phase.tasks.len() == 4));
        assert_eq!(applied.len(), 5);
        assert_eq!(applied[0], Truncation::Phases { from: 6, to: 4 });
        let ids: Vec<&str> = plan.phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3"]);
    }

    #[test]
    fn plan_within_budget_is_untouched() {
        let mut plan = plan_with_phases(vec![wide_phase("a", 2), wide_phase("b", 1)]);
        let before = plan.clone();

        let applied = enforce_plan_constraints(&mut plan, &PlanBudget::default(), 0);

        assert!(applied.is_empty());
        assert_eq!(plan, before);
    }

    #[test]
    fn follow_up_plan_respects_remaining_total() {
        let mut plan = plan_with_phases((0..4).map(|i| wide_phase(&format!("p{i}"), 1)).collect());

        enforce_plan_constraints(&mut plan, &PlanBudget::default(), 8);

        assert_eq!(plan.phases.len(), 2);
    }

    #[test]
    fn total_phases_sums_history() {
        let history = vec![
            plan_with_phases(vec![wide_phase("a", 1), wide_phase("b", 1)]),
            plan_with_phases(vec![wide_phase("c", 1)]),
        ];
        assert_eq!(total_phases(&history), 3);
        assert_eq!(total_phases(&[]), 0);
    }

    #[test]
    fn truncation_messages_name_the_phase() {
        let note = Truncation::Tasks {
            phase: "Landscape".to_string(),
            from: 6,
            to: 4,
        };
        assert_eq!(note.to_string(), "phase 'Landscape' had 6 tasks, truncated to 4");
    }
}
