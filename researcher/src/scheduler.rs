//! Phase scheduler: runs every task of a phase on a bounded worker pool and
//! waits for all of them before the phase settles.
//!
//! Concurrency is bounded by a semaphore; each task sleeps a random jitter
//! after acquiring its permit so the pool does not fire requests in lockstep.
//! Workers never see run state. Their outcomes are written back into the
//! phase only after the barrier.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::agents::worker::WorkerAgent;
use crate::core::phase::{settle_phase, start_phase};
use crate::core::types::{Phase, TokenUsage, WorkStatus, WorkerOutcome};
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::tools::ToolSet;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("worker pool size must be at least 1")]
    InvalidPool,
    #[error("worker pool closed: {0}")]
    PoolClosed(String),
}

/// What one phase produced, for the run-level totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseReport {
    /// One message per failed task, in task order.
    pub task_errors: Vec<String>,
    pub tool_calls: u64,
    pub usage: TokenUsage,
    pub failed: usize,
}

pub struct PhaseScheduler {
    permits: Arc<Semaphore>,
    jitter_ms: (u64, u64),
    worker: WorkerAgent,
    oracle: Arc<dyn Oracle>,
    tools: Arc<ToolSet>,
    prompts: Arc<PromptEngine>,
}

impl PhaseScheduler {
    pub fn new(
        concurrency: usize,
        jitter_min_ms: u64,
        jitter_max_ms: u64,
        worker: WorkerAgent,
        oracle: Arc<dyn Oracle>,
        tools: Arc<ToolSet>,
        prompts: Arc<PromptEngine>,
    ) -> Result<Self, SchedulerError> {
        if concurrency == 0 {
            return Err(SchedulerError::InvalidPool);
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(concurrency)),
            jitter_ms: (jitter_min_ms, jitter_max_ms.max(jitter_min_ms)),
            worker,
            oracle,
            tools,
            prompts,
        })
    }

    /// Run all tasks of `phase` and settle it.
    ///
    /// Individual task failures are reported in the returned [`PhaseReport`];
    /// `Err` means the pool itself could not run the phase. The phase is
    /// settled either way once it has started.
    #[instrument(skip_all, fields(phase = %phase.id, tasks = phase.tasks.len()))]
    pub async fn run_phase(&self, phase: &mut Phase) -> Result<PhaseReport, SchedulerError> {
        if self.permits.is_closed() {
            return Err(SchedulerError::PoolClosed(format!(
                "cannot start phase '{}'",
                phase.id
            )));
        }
        start_phase(phase);

        let mut handles = Vec::with_capacity(phase.tasks.len());
        for task in &phase.tasks {
            let permits = Arc::clone(&self.permits);
            let oracle = Arc::clone(&self.oracle);
            let tools = Arc::clone(&self.tools);
            let prompts = Arc::clone(&self.prompts);
            let worker = self.worker;
            let task = task.clone();
            let jitter = self.jitter();

            handles.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|err| SchedulerError::PoolClosed(err.to_string()))?;
                if !jitter.is_zero() {
                    tokio::time::sleep(jitter).await;
                }
                Ok::<_, SchedulerError>(worker.run(oracle.as_ref(), &tools, &prompts, &task).await)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut pool_error = None;
        for (joined, task) in join_all(handles).await.into_iter().zip(&phase.tasks) {
            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    warn!(task = %task.id, error = %err, "worker never started");
                    let outcome = WorkerOutcome::failed(err.to_string());
                    pool_error.get_or_insert(err);
                    outcome
                }
                Err(err) => {
                    warn!(task = %task.id, error = %err, "worker task aborted");
                    WorkerOutcome::failed(format!("Worker aborted: {err}"))
                }
            };
            outcomes.push(outcome);
        }

        let mut report = PhaseReport::default();
        for outcome in &outcomes {
            report.tool_calls += u64::from(outcome.tool_calls_made);
            report.usage.add(outcome.usage);
        }
        report.task_errors = settle_phase(phase, outcomes);
        report.failed = phase
            .tasks
            .iter()
            .filter(|task| task.status == WorkStatus::Failed)
            .count();

        info!(
            status = phase.status.as_str(),
            failed = report.failed,
            tool_calls = report.tool_calls,
            "phase settled"
        );
        match pool_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn jitter(&self) -> Duration {
        let (min, max) = self.jitter_ms;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::WorkerLimits;
    use crate::io::oracle::{OracleError, OracleReply};
    use crate::test_support::{ScriptedOracle, fast_retry, phase_with_tasks, task};

    fn scheduler(oracle: Arc<ScriptedOracle>, concurrency: usize) -> PhaseScheduler {
        PhaseScheduler::new(
            concurrency,
            0,
            0,
            WorkerAgent::new(WorkerLimits::default(), fast_retry()),
            oracle,
            Arc::new(ToolSet::new()),
            Arc::new(PromptEngine::new()),
        )
        .expect("scheduler")
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok(OracleReply::text("ok"))));
        let result = PhaseScheduler::new(
            0,
            0,
            0,
            WorkerAgent::new(WorkerLimits::default(), fast_retry()),
            oracle,
            Arc::new(ToolSet::new()),
            Arc::new(PromptEngine::new()),
        );
        assert!(matches!(result, Err(SchedulerError::InvalidPool)));
    }

    #[tokio::test]
    async fn all_tasks_settle_in_task_order() {
        let oracle = Arc::new(ScriptedOracle::new(|request| {
            Ok(OracleReply::text(format!("output of {}", request.label)))
        }));
        let mut phase = phase_with_tasks("p1", vec![task("a"), task("b"), task("c")]);

        let report = scheduler(Arc::clone(&oracle), 3)
            .run_phase(&mut phase)
            .await
            .expect("phase");

        assert_eq!(phase.status, WorkStatus::Completed);
        assert!(report.task_errors.is_empty());
        assert_eq!(report.usage.total_tokens, 45);
        let outputs: Vec<&str> = phase
            .tasks
            .iter()
            .map(|t| t.output.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(
            outputs,
            vec!["output of worker:a", "output of worker:b", "output of worker:c"]
        );
    }

    #[tokio::test]
    async fn one_failure_marks_phase_failed_but_keeps_siblings() {
        let oracle = Arc::new(ScriptedOracle::new(|request| {
            if request.label == "worker:c" {
                Err(OracleError::Api {
                    status: 401,
                    body: "denied".into(),
                })
            } else {
                Ok(OracleReply::text("fine"))
            }
        }));
        let mut phase = phase_with_tasks("p1", vec![task("a"), task("b"), task("c"), task("d")]);

        let report = scheduler(oracle, 3).run_phase(&mut phase).await.expect("phase");

        assert_eq!(phase.status, WorkStatus::Failed);
        assert_eq!(report.failed, 1);
        assert_eq!(report.task_errors.len(), 1);
        assert!(report.task_errors[0].starts_with("Task 'c name' (c) failed:"));
        let completed = phase
            .tasks
            .iter()
            .filter(|t| t.status == WorkStatus::Completed)
            .count();
        assert_eq!(completed, 3);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let oracle = Arc::new(
            ScriptedOracle::new(|_| Ok(OracleReply::text("ok")))
                .with_latency(Duration::from_millis(20)),
        );
        let tasks = (0..8).map(|i| task(&format!("t{i}"))).collect();
        let mut phase = phase_with_tasks("p1", tasks);

        scheduler(Arc::clone(&oracle), 3)
            .run_phase(&mut phase)
            .await
            .expect("phase");

        assert_eq!(oracle.count("worker:"), 8);
        assert!(oracle.peak_in_flight() <= 3);
        assert!(oracle.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn closed_pool_still_settles_the_phase() {
        let oracle = Arc::new(
            ScriptedOracle::new(|_| Ok(OracleReply::text("done")))
                .with_latency(Duration::from_millis(50)),
        );
        let scheduler = scheduler(oracle, 1);
        let mut phase = phase_with_tasks("p1", vec![task("a"), task("b"), task("c")]);

        let (result, ()) = tokio::join!(scheduler.run_phase(&mut phase), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            scheduler.permits.close();
        });

        assert!(matches!(result, Err(SchedulerError::PoolClosed(_))));
        assert_eq!(phase.status, WorkStatus::Failed);
        assert_eq!(phase.tasks[0].status, WorkStatus::Completed);
        assert_eq!(phase.tasks[0].output.as_deref(), Some("done"));
        assert!(
            phase.tasks[1..]
                .iter()
                .all(|t| t.status == WorkStatus::Failed && t.error.is_some())
        );
    }

    #[tokio::test]
    async fn empty_phase_completes() {
        let oracle = Arc::new(ScriptedOracle::new(|_| Ok(OracleReply::text("ok"))));
        let mut phase = phase_with_tasks("p1", Vec::new());

        let report = scheduler(Arc::clone(&oracle), 3)
            .run_phase(&mut phase)
            .await
            .expect("phase");

        assert_eq!(phase.status, WorkStatus::Completed);
        assert_eq!(report, PhaseReport::default());
        assert!(oracle.requests().is_empty());
    }
}
