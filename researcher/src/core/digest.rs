//! Deterministic collection of task outputs for evaluation and synthesis.

use serde::Serialize;

use crate::core::types::Plan;

/// One finding as shown to the evaluation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindingPreview {
    pub phase: String,
    pub task: String,
    pub preview: String,
}

/// A task's full output, grouped under its phase for synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFinding {
    pub name: String,
    pub description: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseFindings {
    pub name: String,
    pub description: String,
    pub tasks: Vec<TaskFinding>,
}

/// Previews of every non-empty task output in `plan`, each cut to
/// `preview_chars` characters.
pub fn findings_for_evaluation(plan: &Plan, preview_chars: usize) -> Vec<FindingPreview> {
    let mut findings = Vec::new();
    for phase in &plan.phases {
        for task in &phase.tasks {
            let Some(output) = task.non_empty_output() else {
                continue;
            };
            findings.push(FindingPreview {
                phase: phase.name.clone(),
                task: task.name.clone(),
                preview: preview(output, preview_chars),
            });
        }
    }
    findings
}

/// Full outputs of every plan in `history`, in plan, phase, task order.
/// Phases without any output are omitted.
pub fn findings_for_synthesis(history: &[Plan]) -> Vec<PhaseFindings> {
    let mut phases = Vec::new();
    for plan in history {
        for phase in &plan.phases {
            let tasks: Vec<TaskFinding> = phase
                .tasks
                .iter()
                .filter_map(|task| {
                    task.non_empty_output().map(|output| TaskFinding {
                        name: task.name.clone(),
                        description: task.description.clone(),
                        output: output.to_string(),
                    })
                })
                .collect();
            if tasks.is_empty() {
                continue;
            }
            phases.push(PhaseFindings {
                name: phase.name.clone(),
                description: phase.description.clone(),
                tasks,
            });
        }
    }
    phases
}

/// Cut `text` to at most `limit` characters, marking the cut with `...`.
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{phase_with_tasks, plan_with_phases, task, task_with_output};

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 500), "short");
        assert_eq!(preview("exact", 5), "exact");
    }

    #[test]
    fn evaluation_skips_empty_outputs() {
        let plan = plan_with_phases(vec![phase_with_tasks(
            "p1",
            vec![
                task_with_output("a", "alpha findings"),
                task("b"),
                task_with_output("c", "  "),
            ],
        )]);

        let findings = findings_for_evaluation(&plan, 500);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].task, "a name");
        assert_eq!(findings[0].phase, "p1 name");
        assert_eq!(findings[0].preview, "alpha findings");
    }

    #[test]
    fn evaluation_truncates_long_outputs() {
        let long = "x".repeat(600);
        let plan = plan_with_phases(vec![phase_with_tasks(
            "p1",
            vec![task_with_output("a", &long)],
        )]);

        let findings = findings_for_evaluation(&plan, 500);

        assert_eq!(findings[0].preview.len(), 503);
        assert!(findings[0].preview.ends_with("..."));
    }

    #[test]
    fn synthesis_orders_by_plan_phase_task_and_drops_empty_phases() {
        let first = plan_with_phases(vec![
            phase_with_tasks(
                "p1",
                vec![task_with_output("a", "A"), task_with_output("b", "B")],
            ),
            phase_with_tasks("p2", vec![task("c")]),
        ]);
        let second = plan_with_phases(vec![phase_with_tasks(
            "p3",
            vec![task_with_output("d", "D")],
        )]);

        let phases = findings_for_synthesis(&[first, second]);

        let names: Vec<&str> = phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p1 name", "p3 name"]);
        let outputs: Vec<&str> = phases
            .iter()
            .flat_map(|p| p.tasks.iter().map(|t| t.output.as_str()))
            .collect();
        assert_eq!(outputs, vec!["A", "B", "D"]);
    }
}
