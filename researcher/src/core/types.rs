//! Shared deterministic types for the research core.
//!
//! Plans, phases and tasks are authored by the oracle (see the JSON schemas in
//! `schemas/`) and then owned by the run. Fields the oracle never writes
//! (`status`, `output`, `error`, `tool_calls_made`) default on deserialization
//! and are only mutated by the control loop after a phase barrier.

use serde::{Deserialize, Serialize};

/// Execution state of a task or a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
        }
    }
}

/// Top-level state of a research run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Planning,
    Executing,
    Evaluating,
    Synthesizing,
    Completed,
    Failed,
}

impl RunStatus {
    /// `completed` and `failed` are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Planning => "planning",
            RunStatus::Executing => "executing",
            RunStatus::Evaluating => "evaluating",
            RunStatus::Synthesizing => "synthesizing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Smallest schedulable unit of research work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUnit {
    pub id: String,
    pub name: String,
    pub description: String,
    /// What to do, how, what counts as success, and the output format.
    pub instructions: String,
    pub expected_output: String,
    #[serde(default)]
    pub needs_external_tools: bool,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub status: WorkStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tool_calls_made: u32,
}

impl TaskUnit {
    /// Output text if the task produced any non-blank content.
    pub fn non_empty_output(&self) -> Option<&str> {
        self.output.as_deref().filter(|text| !text.trim().is_empty())
    }
}

/// A barrier-synchronized group of concurrently executed tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<TaskUnit>,
    #[serde(default)]
    pub status: WorkStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Ordered sequence of phases produced by one planning iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub summary: String,
    pub strategy_rationale: String,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub needs_additional_research: bool,
}

impl Plan {
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.tasks.len()).sum()
    }
}

/// Next-step recommendation attached to an evaluation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Continue,
    Conclude,
    Escalate,
}

/// Completion verdict produced by the evaluation gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    pub is_complete: bool,
    pub completeness_score: f64,
    #[serde(default)]
    pub missing_aspects: Vec<String>,
    pub recommendation: Recommendation,
    pub justification: String,
}

/// Token accounting reported by the oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Coarse classification of an oracle failure, used by the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    PayloadTooLarge,
    Transient,
    Fatal,
}

/// Result of driving one task through the worker loop.
///
/// Workers return this value; the scheduler copies it into the owning
/// [`TaskUnit`] after the phase barrier.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutcome {
    pub status: WorkStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub tool_calls_made: u32,
    /// Oracle requests issued (retries of one request count once).
    pub requests: u32,
    pub usage: TokenUsage,
}

impl WorkerOutcome {
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            status: WorkStatus::Completed,
            output: Some(output.into()),
            error: None,
            tool_calls_made: 0,
            requests: 0,
            usage: TokenUsage::default(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: WorkStatus::Failed,
            output: None,
            error: Some(error.into()),
            tool_calls_made: 0,
            requests: 0,
            usage: TokenUsage::default(),
        }
    }
}
