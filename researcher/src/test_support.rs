//! Test-only helpers: deterministic plan builders, a scripted oracle and stub
//! tools.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::retry::RetryPolicy;
use crate::core::types::{
    EvaluationVerdict, Phase, Plan, Recommendation, TaskUnit, TokenUsage, WorkStatus,
};
use crate::io::config::ResearchConfig;
use crate::io::oracle::{Oracle, OracleError, OracleReply, OracleRequest, ToolCall, ToolDefinition};
use crate::io::tools::{Tool, ToolError};

/// Create a deterministic pending task that does not use tools.
pub fn task(id: &str) -> TaskUnit {
    TaskUnit {
        id: id.to_string(),
        name: format!("{} name", id),
        description: format!("{} description", id),
        instructions: format!("{} instructions", id),
        expected_output: format!("{} expected output", id),
        needs_external_tools: false,
        temperature: 0.0,
        status: WorkStatus::Pending,
        output: None,
        error: None,
        tool_calls_made: 0,
    }
}

/// Create a completed task carrying `output`.
pub fn task_with_output(id: &str, output: &str) -> TaskUnit {
    let mut task = task(id);
    task.status = WorkStatus::Completed;
    task.output = Some(output.to_string());
    task
}

/// Create a pending task that is offered tools.
pub fn tool_task(id: &str) -> TaskUnit {
    let mut task = task(id);
    task.needs_external_tools = true;
    task
}

pub fn phase_with_tasks(id: &str, tasks: Vec<TaskUnit>) -> Phase {
    Phase {
        id: id.to_string(),
        name: format!("{} name", id),
        description: format!("{} description", id),
        tasks,
        status: WorkStatus::Pending,
        error: None,
    }
}

pub fn plan_with_phases(phases: Vec<Phase>) -> Plan {
    Plan {
        summary: "test plan".to_string(),
        strategy_rationale: "test strategy".to_string(),
        phases,
        needs_additional_research: false,
    }
}

pub fn verdict(is_complete: bool, score: f64, missing: &[&str]) -> EvaluationVerdict {
    EvaluationVerdict {
        is_complete,
        completeness_score: score,
        missing_aspects: missing.iter().map(|s| s.to_string()).collect(),
        recommendation: if is_complete {
            Recommendation::Conclude
        } else {
            Recommendation::Continue
        },
        justification: "test verdict".to_string(),
    }
}

/// A planner reply with `phases` phases of `tasks_per_phase` tasks each.
/// Task ids are `p{phase}-t{task}`, both 1-indexed.
pub fn plan_reply(phases: usize, tasks_per_phase: usize) -> OracleReply {
    let phases: Vec<Value> = (1..=phases)
        .map(|p| {
            let tasks: Vec<Value> = (1..=tasks_per_phase)
                .map(|t| {
                    json!({
                        "id": format!("p{p}-t{t}"),
                        "name": format!("Task p{p}-t{t}"),
                        "description": format!("Investigate aspect {t} of phase {p}"),
                        "instructions": "Research and report findings.",
                        "expected_output": "Markdown notes.",
                        "needs_external_tools": false,
                        "temperature": 0.0
                    })
                })
                .collect();
            json!({
                "id": format!("p{p}"),
                "name": format!("Phase {p}"),
                "description": format!("Phase {p} description"),
                "tasks": tasks
            })
        })
        .collect();
    let body = json!({
        "summary": "scripted plan",
        "strategy_rationale": "scripted strategy",
        "phases": phases
    });
    OracleReply::text(body.to_string())
}

pub fn verdict_reply(is_complete: bool, score: f64, missing: &[&str]) -> OracleReply {
    let verdict = verdict(is_complete, score, missing);
    let body = serde_json::to_string(&verdict).expect("serialize verdict");
    OracleReply::text(body)
}

/// An assistant reply requesting one call per entry in `names`.
pub fn tool_call_reply(names: &[&str]) -> OracleReply {
    let calls = names
        .iter()
        .enumerate()
        .map(|(idx, name)| ToolCall {
            id: format!("call_{idx}"),
            name: name.to_string(),
            arguments: json!({"query": "scripted"}),
        })
        .collect();
    OracleReply::tool_calls(calls)
}

/// Retry policy with the default attempt count and no delays.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        rate_limit_unit: Duration::ZERO,
        api_error_delay: Duration::ZERO,
        ..RetryPolicy::default()
    }
}

/// Default configuration with jitter and backoff disabled.
pub fn test_config() -> ResearchConfig {
    let mut cfg = ResearchConfig::default();
    cfg.worker.jitter_min_ms = 0;
    cfg.worker.jitter_max_ms = 0;
    cfg.retry.rate_limit_unit_ms = 0;
    cfg.retry.api_error_delay_ms = 0;
    cfg
}

type Script = dyn Fn(&OracleRequest) -> Result<OracleReply, OracleError> + Send + Sync;

/// Oracle whose replies come from a closure. Records every request and the
/// peak number of requests in flight at once.
pub struct ScriptedOracle {
    script: Box<Script>,
    latency: Duration,
    requests: Mutex<Vec<OracleRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&OracleRequest) -> Result<OracleReply, OracleError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every request fails with `err`.
    pub fn failing(err: OracleError) -> Self {
        Self::new(move |_| Err(err.clone()))
    }

    /// Hold each request for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Requests whose label starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|request| request.label.starts_with(prefix))
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn respond(&self, request: OracleRequest) -> Result<OracleReply, OracleError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = (self.script)(&request).map(|reply| {
            if reply.usage == TokenUsage::default() {
                reply.with_usage(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                })
            } else {
                reply
            }
        });
        self.requests.lock().expect("requests lock").push(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"query": {"type": "string"}},
        "required": ["query"]
    })
}

/// Tool that always returns the same content.
pub struct StaticTool {
    name: String,
    content: String,
}

impl StaticTool {
    pub fn new(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
        }
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: format!("{} stub", self.name),
            parameters: query_schema(),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<String, ToolError> {
        Ok(self.content.clone())
    }
}

/// Tool that always fails with the same message.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: format!("{} stub", self.name),
            parameters: query_schema(),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<String, ToolError> {
        Err(ToolError::Failed(self.message.clone()))
    }
}
