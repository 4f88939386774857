//! Worker executor: drives one task through a bounded request/tool loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Request ──tool calls──▶ ToolExec ──▶ Request
//!    │                        │
//!    └──text / cap / error──▶ Done ◀──tool budget spent
//! ```
//!
//! Every path ends in a [`WorkerOutcome`]. Budget exhaustion and oversized
//! payloads are degraded completions; exhausted retries and fatal oracle
//! errors are failures. Nothing escapes as a panic or `Err`.

use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::core::budget::{WorkerCounters, WorkerLimits};
use crate::core::retry::{RetryDecision, RetryPolicy};
use crate::core::types::{FailureKind, TaskUnit, TokenUsage, WorkStatus, WorkerOutcome};
use crate::io::oracle::{Message, Oracle, OracleReply, OracleRequest, ResponseShape, ToolCall};
use crate::io::prompt::PromptEngine;
use crate::io::tools::ToolSet;

pub const ITERATION_CAP_MESSAGE: &str =
    "Maximum iterations reached. Using accumulated information.";
pub const SIZE_LIMIT_MESSAGE: &str =
    "Response size limit exceeded. Unable to complete task with current context.";

enum WorkerState {
    Request,
    ToolExec(Vec<ToolCall>),
    Done(Ending),
}

/// How the loop ended, before bookkeeping is attached.
enum Ending {
    Answered(String),
    Degraded(String),
    Failed(String),
}

/// Why a request could not produce a reply.
enum RequestFailure {
    SizeLimit,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerAgent {
    limits: WorkerLimits,
    retry: RetryPolicy,
}

impl WorkerAgent {
    pub fn new(limits: WorkerLimits, retry: RetryPolicy) -> Self {
        Self { limits, retry }
    }

    #[instrument(skip_all, fields(task = %task.id, tools = task.needs_external_tools))]
    pub async fn run(
        &self,
        oracle: &dyn Oracle,
        tools: &ToolSet,
        prompts: &PromptEngine,
        task: &TaskUnit,
    ) -> WorkerOutcome {
        let mut messages = match prompts.worker_messages(task) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "worker prompt failed");
                return WorkerOutcome::failed(format!("Prompt rendering failed: {err:#}"));
            }
        };
        let definitions = match (task.needs_external_tools, tools.is_empty()) {
            (true, false) => tools.definitions(),
            (true, true) => {
                warn!("task needs tools but none are registered");
                Vec::new()
            }
            (false, _) => Vec::new(),
        };
        let label = format!("worker:{}", task.id);

        let mut counters = WorkerCounters::default();
        let mut usage = TokenUsage::default();
        let mut last_text = String::new();
        let mut state = WorkerState::Request;

        let ending = loop {
            state = match state {
                WorkerState::Request => {
                    if !counters.begin_request(&self.limits) {
                        warn!(requests = counters.requests, "iteration cap reached");
                        WorkerState::Done(Ending::Degraded(with_accumulated(
                            ITERATION_CAP_MESSAGE,
                            &last_text,
                        )))
                    } else {
                        let request = OracleRequest {
                            label: label.clone(),
                            messages: messages.clone(),
                            tools: definitions.clone(),
                            temperature: task.temperature,
                            response: ResponseShape::Text,
                        };
                        match self.request_with_retry(oracle, request).await {
                            Ok(reply) => {
                                usage.add(reply.usage);
                                let message = reply.message;
                                if !message.content.trim().is_empty() {
                                    last_text.clone_from(&message.content);
                                }
                                if message.tool_calls.is_empty() || definitions.is_empty() {
                                    WorkerState::Done(Ending::Answered(message.content))
                                } else {
                                    let calls = message.tool_calls.clone();
                                    messages.push(message);
                                    WorkerState::ToolExec(calls)
                                }
                            }
                            Err(RequestFailure::SizeLimit) => {
                                warn!("payload too large; ending task");
                                WorkerState::Done(Ending::Degraded(SIZE_LIMIT_MESSAGE.to_string()))
                            }
                            Err(RequestFailure::Failed(reason)) => {
                                WorkerState::Done(Ending::Failed(reason))
                            }
                        }
                    }
                }
                WorkerState::ToolExec(calls) => {
                    let allowed = counters.tool_allowance(&self.limits, calls.len());
                    for (idx, call) in calls.iter().enumerate() {
                        let content = if idx < allowed {
                            counters.record_tool_call();
                            tools.execute(call).await.content
                        } else {
                            debug!(tool = %call.name, "tool call skipped");
                            format!("Skipped {}: tool call budget exhausted", call.name)
                        };
                        messages.push(Message::tool_result(call.id.clone(), content));
                    }
                    if counters.tool_budget_exhausted(&self.limits) {
                        warn!(tool_calls = counters.tool_calls, "tool call cap reached");
                        WorkerState::Done(Ending::Degraded(last_text.clone()))
                    } else {
                        WorkerState::Request
                    }
                }
                WorkerState::Done(ending) => break ending,
            };
        };

        let mut outcome = match ending {
            Ending::Answered(text) | Ending::Degraded(text) => WorkerOutcome::completed(text),
            Ending::Failed(reason) => WorkerOutcome::failed(reason),
        };
        outcome.tool_calls_made = counters.tool_calls;
        outcome.requests = counters.requests;
        outcome.usage = usage;

        match outcome.status {
            WorkStatus::Failed => warn!(
                requests = outcome.requests,
                error = outcome.error.as_deref().unwrap_or_default(),
                "worker failed"
            ),
            _ => info!(
                requests = outcome.requests,
                tool_calls = outcome.tool_calls_made,
                "worker finished"
            ),
        }
        outcome
    }

    /// Issue one logical request, retrying per the retry policy.
    async fn request_with_retry(
        &self,
        oracle: &dyn Oracle,
        request: OracleRequest,
    ) -> Result<OracleReply, RequestFailure> {
        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let err = match oracle.respond(request.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };
            match self.retry.decide(err.kind(), attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "oracle request failed; retrying"
                    );
                    sleep(delay).await;
                }
                RetryDecision::SizeLimit => return Err(RequestFailure::SizeLimit),
                RetryDecision::GiveUp => {
                    let reason = match err.kind() {
                        FailureKind::RateLimited => {
                            format!("Rate limit error after {attempt} attempts: {err}")
                        }
                        FailureKind::Transient => format!("API error: {err}"),
                        FailureKind::PayloadTooLarge | FailureKind::Fatal => {
                            format!("Unexpected error: {err}")
                        }
                    };
                    return Err(RequestFailure::Failed(reason));
                }
            }
        }
        Err(RequestFailure::Failed(
            "Unexpected error: request retry loop terminated".to_string(),
        ))
    }
}

fn with_accumulated(note: &str, accumulated: &str) -> String {
    if accumulated.trim().is_empty() {
        note.to_string()
    } else {
        format!("{note}\n\n{accumulated}")
    }
}
