//! Orchestration for one research run: plan, execute phases, evaluate, and
//! either re-plan or synthesize.
//!
//! The loop dispatches on [`RunStatus`]. All routing decisions live in
//! `core::routing`; this module only sequences the agents, the scheduler and
//! the state transitions between them. Every phase is a barrier: its tasks
//! complete (or fail) before the next phase starts.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::agents::evaluator::EvaluatorAgent;
use crate::agents::planner::PlannerAgent;
use crate::agents::synthesizer::SynthesizerAgent;
use crate::agents::worker::WorkerAgent;
use crate::core::budget::PlanBudget;
use crate::core::invariants::validate_run_state;
use crate::core::routing::{
    EvaluationRoute, PlanningRoute, evaluation_capped, route_after_verdict, route_before_planning,
};
use crate::core::state::RunState;
use crate::core::types::RunStatus;
use crate::io::config::ResearchConfig;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::tools::ToolSet;
use crate::scheduler::{PhaseScheduler, SchedulerError};

pub struct Orchestrator {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptEngine>,
    budget: PlanBudget,
    planner: PlannerAgent,
    evaluator: EvaluatorAgent,
    synthesizer: SynthesizerAgent,
    scheduler: Result<PhaseScheduler, SchedulerError>,
}

impl Orchestrator {
    pub fn new(oracle: Arc<dyn Oracle>, tools: Arc<ToolSet>, cfg: ResearchConfig) -> Self {
        let prompts = Arc::new(PromptEngine::new());
        let budget = cfg.plan_budget();
        let worker = WorkerAgent::new(cfg.worker_limits(), cfg.retry_policy());
        let scheduler = PhaseScheduler::new(
            cfg.worker.concurrency,
            cfg.worker.jitter_min_ms,
            cfg.worker.jitter_max_ms,
            worker,
            Arc::clone(&oracle),
            tools,
            Arc::clone(&prompts),
        );

        Self {
            oracle,
            prompts,
            budget,
            planner: PlannerAgent::new(budget, cfg.oracle.planning_temperature),
            evaluator: EvaluatorAgent::new(
                cfg.digest.evaluation_preview_chars,
                cfg.oracle.evaluation_temperature,
            ),
            synthesizer: SynthesizerAgent::new(cfg.oracle.synthesis_temperature),
            scheduler,
        }
    }

    /// Drive `query` to a terminal state. Never returns an error: every
    /// failure is recorded in the returned state.
    #[instrument(skip_all)]
    pub async fn run(&self, query: &str) -> RunState {
        let mut state = RunState::new(query);
        info!(query, "research run started");

        while !state.status.is_terminal() {
            match state.status {
                RunStatus::Planning => self.plan(&mut state).await,
                RunStatus::Executing => self.execute(&mut state).await,
                RunStatus::Evaluating => self.evaluate(&mut state).await,
                RunStatus::Synthesizing => self.synthesize(&mut state).await,
                RunStatus::Completed | RunStatus::Failed => break,
            }
            for violation in validate_run_state(&state, &self.budget) {
                warn!(%violation, status = state.status.as_str(), "run state invariant violated");
            }
        }

        match state.status {
            RunStatus::Completed => info!(
                planning_iterations = state.planning_iteration,
                phases = state.consumed_phases(),
                errors = state.errors.len(),
                tool_calls = state.total_tool_calls,
                tokens = state.total_tokens_used,
                "research run completed"
            ),
            _ => error!(errors = ?state.errors, "research run failed"),
        }
        state
    }

    async fn plan(&self, state: &mut RunState) {
        if route_before_planning(state, &self.budget) == PlanningRoute::Bypass {
            warn!(
                consumed = state.consumed_phases(),
                ceiling = self.budget.max_total_phases,
                "phase ceiling reached; skipping planning"
            );
            state.force_synthesis();
            return;
        }

        let result = self
            .planner
            .run(
                self.oracle.as_ref(),
                &self.prompts,
                &state.query,
                state.gaps_for_planning(),
                state.consumed_phases(),
            )
            .await;
        match result {
            Ok(governed) => {
                state.record_usage(governed.usage);
                state.record_plan(governed.plan);
            }
            Err(err) => state.fail(format!("Planning failed: {err:#}")),
        }
    }

    async fn execute(&self, state: &mut RunState) {
        let scheduler = match &self.scheduler {
            Ok(scheduler) => scheduler,
            Err(err) => {
                state.fail(format!("Execution failed: {err}"));
                return;
            }
        };
        let phase_count = state.plan().map_or(0, |plan| plan.phases.len());

        for idx in 0..phase_count {
            state.current_phase_index = idx;
            let Some(plan) = state.plan_mut() else {
                return;
            };
            let phase = &mut plan.phases[idx];
            let report = match scheduler.run_phase(phase).await {
                Ok(report) => report,
                Err(err) => {
                    state.fail(format!("Execution failed: {err}"));
                    return;
                }
            };
            for message in report.task_errors {
                state.push_error(message);
            }
            state.total_tool_calls += report.tool_calls;
            state.record_usage(report.usage);
        }
        state.finish_execution();
    }

    async fn evaluate(&self, state: &mut RunState) {
        if evaluation_capped(state, &self.budget) {
            warn!(
                planning_iteration = state.planning_iteration,
                "planning iteration cap reached; forcing synthesis"
            );
            state.force_synthesis();
            return;
        }
        let Some(plan) = state.plan() else {
            state.fail("Evaluation failed: no plan to evaluate");
            return;
        };

        let result = self
            .evaluator
            .run(
                self.oracle.as_ref(),
                &self.prompts,
                &state.query,
                plan,
                state.planning_iteration,
            )
            .await;
        match result {
            Ok(answer) => {
                state.record_usage(answer.usage);
                let verdict = answer.value;
                match route_after_verdict(&verdict) {
                    EvaluationRoute::Synthesize => state.accept(verdict),
                    EvaluationRoute::Replan => state.request_follow_up(verdict),
                }
            }
            Err(err) => state.fail(format!("Evaluation failed: {err:#}")),
        }
    }

    async fn synthesize(&self, state: &mut RunState) {
        let result = self
            .synthesizer
            .run(
                self.oracle.as_ref(),
                &self.prompts,
                &state.query,
                &state.plan_history,
            )
            .await;
        match result {
            Ok(answer) => {
                state.record_usage(answer.usage);
                state.complete(answer.value);
            }
            Err(err) => state.fail(format!("Synthesis failed: {err:#}")),
        }
    }
}
