//! Evaluation gate: judges whether the current plan's findings answer the query.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::digest::findings_for_evaluation;
use crate::core::types::{EvaluationVerdict, Plan, Recommendation};
use crate::io::oracle::{Answer, Oracle, ask_structured};
use crate::io::prompt::{EvaluatorPrompt, PromptEngine};

#[derive(Debug, Clone, Copy)]
pub struct EvaluatorAgent {
    preview_chars: usize,
    temperature: f32,
}

impl EvaluatorAgent {
    pub fn new(preview_chars: usize, temperature: f32) -> Self {
        Self {
            preview_chars,
            temperature,
        }
    }

    /// Ask for a verdict over the non-empty outputs of `plan`.
    #[instrument(skip_all, fields(planning_iteration = planning_iteration))]
    pub async fn run(
        &self,
        oracle: &dyn Oracle,
        prompts: &PromptEngine,
        query: &str,
        plan: &Plan,
        planning_iteration: u32,
    ) -> Result<Answer<EvaluationVerdict>> {
        let findings = findings_for_evaluation(plan, self.preview_chars);
        let messages = prompts.evaluator_messages(&EvaluatorPrompt {
            query,
            strategy_rationale: &plan.strategy_rationale,
            findings: &findings,
            planning_iteration,
        })?;

        let answer =
            ask_structured::<EvaluationVerdict>(oracle, "evaluator", messages, self.temperature)
                .await
                .context("evaluation request")?;
        let verdict = &answer.value;
        if verdict.recommendation == Recommendation::Escalate {
            warn!(justification = %verdict.justification, "evaluator recommends escalation");
        }
        info!(
            findings = findings.len(),
            is_complete = verdict.is_complete,
            score = verdict.completeness_score,
            gaps = verdict.missing_aspects.len(),
            "findings evaluated"
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::oracle::OracleError;
    use crate::test_support::{
        ScriptedOracle, phase_with_tasks, plan_with_phases, task, task_with_output, verdict_reply,
    };

    #[tokio::test]
    async fn only_non_empty_outputs_reach_the_prompt() {
        let oracle = ScriptedOracle::new(|_| Ok(verdict_reply(true, 0.9, &[])));
        let plan = plan_with_phases(vec![phase_with_tasks(
            "p1",
            vec![task_with_output("a", "alpha findings"), task("b")],
        )]);

        let answer = EvaluatorAgent::new(500, 0.0)
            .run(&oracle, &PromptEngine::new(), "q", &plan, 1)
            .await
            .expect("verdict");

        assert!(answer.value.is_complete);
        let prompt = &oracle.requests()[0].messages[1].content;
        assert!(prompt.contains("alpha findings"));
        assert!(prompt.contains("### Finding 1: a name"));
        assert!(!prompt.contains("### Finding 2"));
    }

    #[tokio::test]
    async fn gaps_are_returned_verbatim() {
        let oracle = ScriptedOracle::new(|_| Ok(verdict_reply(false, 0.3, &["pricing", "risks"])));
        let plan = plan_with_phases(vec![phase_with_tasks(
            "p1",
            vec![task_with_output("a", "x")],
        )]);

        let answer = EvaluatorAgent::new(500, 0.0)
            .run(&oracle, &PromptEngine::new(), "q", &plan, 1)
            .await
            .expect("verdict");

        assert!(!answer.value.is_complete);
        assert_eq!(answer.value.missing_aspects, vec!["pricing", "risks"]);
    }

    #[tokio::test]
    async fn malformed_verdict_is_an_error() {
        let oracle = ScriptedOracle::new(|_| Ok(crate::io::oracle::OracleReply::text("not json")));
        let plan = plan_with_phases(Vec::new());

        let err = EvaluatorAgent::new(500, 0.0)
            .run(&oracle, &PromptEngine::new(), "q", &plan, 1)
            .await
            .expect_err("malformed");

        assert!(format!("{err:#}").contains("not JSON"));
    }

    #[tokio::test]
    async fn oracle_failure_is_returned() {
        let oracle = ScriptedOracle::failing(OracleError::Api {
            status: 500,
            body: "boom".into(),
        });
        let plan = plan_with_phases(Vec::new());

        let result = EvaluatorAgent::new(500, 0.0)
            .run(&oracle, &PromptEngine::new(), "q", &plan, 1)
            .await;

        assert!(result.is_err());
        assert_eq!(oracle.requests().len(), 1);
    }
}
