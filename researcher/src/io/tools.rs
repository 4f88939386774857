//! Tool capability exposed to tool-capable workers.
//!
//! Tool failures never escape this module: unknown tools, schema-invalid
//! arguments and tool errors are all rendered as error content that the worker
//! appends to its conversation.

use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::Draft;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::io::oracle::{ToolCall, ToolDefinition};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn call(&self, arguments: Value) -> Result<String, ToolError>;
}

/// Result content for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

/// Named registry of tools, in registration order.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.tools.iter().map(|t| t.definition().name).collect();
        f.debug_struct("ToolSet").field("tools", &names).finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        let Some(tool) = self
            .tools
            .iter()
            .find(|tool| tool.definition().name == call.name)
        else {
            warn!(tool = %call.name, "unknown tool requested");
            return error_outcome(&call.name, &ToolError::Failed("unknown tool".to_string()));
        };

        let definition = tool.definition();
        if let Err(err) = validate_arguments(&call.arguments, &definition.parameters) {
            warn!(tool = %call.name, error = %err, "tool arguments rejected");
            return error_outcome(&call.name, &err);
        }

        match tool.call(call.arguments.clone()).await {
            Ok(content) => {
                debug!(tool = %call.name, bytes = content.len(), "tool call succeeded");
                ToolOutcome {
                    content,
                    is_error: false,
                }
            }
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                error_outcome(&call.name, &err)
            }
        }
    }
}

fn error_outcome(name: &str, err: &ToolError) -> ToolOutcome {
    ToolOutcome {
        content: format!("Error executing {name}: {err}"),
        is_error: true,
    }
}

fn validate_arguments(arguments: &Value, schema: &Value) -> Result<(), ToolError> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| ToolError::Failed(format!("invalid parameter schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(arguments)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(ToolError::InvalidArguments(messages.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingTool, StaticTool};
    use serde_json::json;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[tokio::test]
    async fn successful_call_returns_content() {
        let tools = ToolSet::new().with(StaticTool::new("search", "three results"));

        let outcome = tools.execute(&call("search", json!({"query": "rust"}))).await;

        assert_eq!(
            outcome,
            ToolOutcome {
                content: "three results".to_string(),
                is_error: false
            }
        );
    }

    #[tokio::test]
    async fn tool_failure_becomes_inline_error() {
        let tools = ToolSet::new().with(FailingTool::new("fetch", "connection refused"));

        let outcome = tools.execute(&call("fetch", json!({"query": "x"}))).await;

        assert!(outcome.is_error);
        assert_eq!(outcome.content, "Error executing fetch: connection refused");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_inline_error() {
        let tools = ToolSet::new().with(StaticTool::new("search", "ok"));

        let outcome = tools.execute(&call("browse", json!({}))).await;

        assert!(outcome.is_error);
        assert_eq!(outcome.content, "Error executing browse: unknown tool");
    }

    #[tokio::test]
    async fn schema_invalid_arguments_are_rejected_before_call() {
        let tools = ToolSet::new().with(StaticTool::new("search", "ok"));

        let outcome = tools.execute(&call("search", json!({"limit": 3}))).await;

        assert!(outcome.is_error);
        assert!(outcome.content.starts_with("Error executing search: invalid arguments"));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let tools = ToolSet::new()
            .with(StaticTool::new("search", ""))
            .with(StaticTool::new("fetch", ""));
        let names: Vec<String> = tools.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["search", "fetch"]);
        assert!(!tools.is_empty());
        assert!(ToolSet::new().is_empty());
    }
}
