//! Prompt rendering for the planner, workers, evaluator and synthesizer.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::digest::{FindingPreview, PhaseFindings};
use crate::core::types::TaskUnit;
use crate::io::oracle::Message;

const PLANNER_SYSTEM: &str = include_str!("prompts/planner_system.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const WORKER_SYSTEM: &str = include_str!("prompts/worker_system.md");
const WORKER_TASK_TEMPLATE: &str = include_str!("prompts/worker_task.md");
const EVALUATOR_SYSTEM: &str = include_str!("prompts/evaluator_system.md");
const EVALUATOR_TEMPLATE: &str = include_str!("prompts/evaluator.md");
const SYNTHESIZER_SYSTEM: &str = include_str!("prompts/synthesizer_system.md");
const SYNTHESIZER_TEMPLATE: &str = include_str!("prompts/synthesizer.md");

/// Inputs for one planning request.
#[derive(Debug, Clone)]
pub struct PlannerPrompt<'a> {
    pub query: &'a str,
    /// Present only on follow-up iterations.
    pub gaps: Option<&'a [String]>,
    pub remaining_phases: usize,
    pub max_phases_per_plan: usize,
    pub max_tasks_per_phase: usize,
    pub max_total_phases: usize,
}

#[derive(Debug, Clone)]
pub struct EvaluatorPrompt<'a> {
    pub query: &'a str,
    pub strategy_rationale: &'a str,
    pub findings: &'a [FindingPreview],
    pub planning_iteration: u32,
}

#[derive(Debug, Clone)]
pub struct SynthesizerPrompt<'a> {
    pub query: &'a str,
    pub strategy_rationale: &'a str,
    pub phases: &'a [PhaseFindings],
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("worker_task", WORKER_TASK_TEMPLATE)
            .expect("worker task template should be valid");
        env.add_template("evaluator", EVALUATOR_TEMPLATE)
            .expect("evaluator template should be valid");
        env.add_template("synthesizer", SYNTHESIZER_TEMPLATE)
            .expect("synthesizer template should be valid");
        Self { env }
    }

    pub fn planner_messages(&self, input: &PlannerPrompt<'_>) -> Result<Vec<Message>> {
        let template = self.env.get_template("planner")?;
        let rendered = template
            .render(context! {
                query => input.query.trim(),
                gaps => input.gaps.filter(|gaps| !gaps.is_empty()),
                remaining_phases => input.remaining_phases,
                max_phases_per_plan => input.max_phases_per_plan,
                max_tasks_per_phase => input.max_tasks_per_phase,
                max_total_phases => input.max_total_phases,
            })
            .context("render planner prompt")?;
        Ok(vec![Message::system(PLANNER_SYSTEM.trim()), Message::user(rendered)])
    }

    pub fn worker_messages(&self, task: &TaskUnit) -> Result<Vec<Message>> {
        let template = self.env.get_template("worker_task")?;
        let rendered = template
            .render(context! { task => task })
            .with_context(|| format!("render worker prompt for task {}", task.id))?;
        Ok(vec![Message::system(WORKER_SYSTEM.trim()), Message::user(rendered)])
    }

    pub fn evaluator_messages(&self, input: &EvaluatorPrompt<'_>) -> Result<Vec<Message>> {
        let template = self.env.get_template("evaluator")?;
        let rendered = template
            .render(context! {
                query => input.query.trim(),
                strategy_rationale => input.strategy_rationale.trim(),
                findings => input.findings,
                planning_iteration => input.planning_iteration,
            })
            .context("render evaluator prompt")?;
        Ok(vec![Message::system(EVALUATOR_SYSTEM.trim()), Message::user(rendered)])
    }

    pub fn synthesizer_messages(&self, input: &SynthesizerPrompt<'_>) -> Result<Vec<Message>> {
        let template = self.env.get_template("synthesizer")?;
        let rendered = template
            .render(context! {
                query => input.query.trim(),
                strategy_rationale => input.strategy_rationale.trim(),
                phases => input.phases,
            })
            .context("render synthesizer prompt")?;
        Ok(vec![
            Message::system(SYNTHESIZER_SYSTEM.trim()),
            Message::user(rendered),
        ])
    }
}
