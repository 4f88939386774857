//! The oracle boundary: conversation types, the `Oracle` trait, and typed
//! structured-output requests validated against JSON Schema.

use async_trait::async_trait;
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::types::{EvaluationVerdict, FailureKind, Plan, TokenUsage};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");
const EVALUATION_SCHEMA: &str = include_str!("../../schemas/evaluation.schema.json");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the oracle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool advertised to the oracle. `parameters` is a JSON Schema object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    pub fn assistant_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Shape the caller expects back.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    Text,
    Structured { name: String, schema: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    /// Caller role, e.g. `planner` or `worker:t1`. Used for logging and by
    /// scripted oracles in tests.
    pub label: String,
    pub messages: Vec<Message>,
    /// Empty unless the caller is tool capable.
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub response: ResponseShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleReply {
    /// Always an assistant message.
    pub message: Message,
    pub usage: TokenUsage,
}

impl OracleReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(text),
            usage: TokenUsage::default(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            message: Message::assistant_tool_calls(String::new(), tool_calls),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request too large: {0}")]
    PayloadTooLarge(String),
    #[error("oracle returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
}

impl OracleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            OracleError::RateLimited(_) => FailureKind::RateLimited,
            OracleError::PayloadTooLarge(_) => FailureKind::PayloadTooLarge,
            OracleError::Transport(_) => FailureKind::Transient,
            OracleError::Api { status, .. } if is_transient_status(*status) => {
                FailureKind::Transient
            }
            OracleError::Api { .. } | OracleError::Malformed(_) | OracleError::MissingCredential(_) => {
                FailureKind::Fatal
            }
        }
    }
}

pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 409 || status == 425 || status >= 500
}

/// The external reasoning capability.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn respond(&self, request: OracleRequest) -> Result<OracleReply, OracleError>;
}

/// A result type the oracle can be asked to produce directly.
pub trait StructuredOutput: DeserializeOwned {
    /// Schema name sent to the oracle.
    const NAME: &'static str;
    /// JSON Schema (Draft 2020-12) source.
    const SCHEMA: &'static str;

    fn schema() -> Result<Value, OracleError> {
        serde_json::from_str(Self::SCHEMA)
            .map_err(|err| OracleError::Malformed(format!("invalid {} schema: {err}", Self::NAME)))
    }
}

impl StructuredOutput for Plan {
    const NAME: &'static str = "research_plan";
    const SCHEMA: &'static str = PLAN_SCHEMA;
}

impl StructuredOutput for EvaluationVerdict {
    const NAME: &'static str = "evaluation_verdict";
    const SCHEMA: &'static str = EVALUATION_SCHEMA;
}

/// A typed oracle answer and the tokens it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer<T> {
    pub value: T,
    pub usage: TokenUsage,
}

/// Ask for a structured `T`. The reply is validated against `T`'s schema
/// before deserialization; any mismatch is `OracleError::Malformed`.
pub async fn ask_structured<T: StructuredOutput>(
    oracle: &dyn Oracle,
    label: &str,
    messages: Vec<Message>,
    temperature: f32,
) -> Result<Answer<T>, OracleError> {
    let schema = T::schema()?;
    let request = OracleRequest {
        label: label.to_string(),
        messages,
        tools: Vec::new(),
        temperature,
        response: ResponseShape::Structured {
            name: T::NAME.to_string(),
            schema: schema.clone(),
        },
    };
    let reply = oracle.respond(request).await?;
    let value = parse_structured::<T>(&reply.message.content, &schema)?;
    Ok(Answer {
        value,
        usage: reply.usage,
    })
}

/// Ask for freeform text.
pub async fn ask_text(
    oracle: &dyn Oracle,
    label: &str,
    messages: Vec<Message>,
    temperature: f32,
) -> Result<Answer<String>, OracleError> {
    let request = OracleRequest {
        label: label.to_string(),
        messages,
        tools: Vec::new(),
        temperature,
        response: ResponseShape::Text,
    };
    let reply = oracle.respond(request).await?;
    Ok(Answer {
        value: reply.message.content,
        usage: reply.usage,
    })
}

fn parse_structured<T: StructuredOutput>(raw: &str, schema: &Value) -> Result<T, OracleError> {
    let instance: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|err| OracleError::Malformed(format!("{} is not JSON: {err}", T::NAME)))?;
    validate_schema(&instance, schema)?;
    serde_json::from_value(instance)
        .map_err(|err| OracleError::Malformed(format!("deserialize {}: {err}", T::NAME)))
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
pub fn validate_schema(instance: &Value, schema: &Value) -> Result<(), OracleError> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| OracleError::Malformed(format!("compile json schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(OracleError::Malformed(format!(
            "schema validation failed: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

/// Models occasionally wrap JSON in a markdown fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Recommendation;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedOracle {
        content: String,
        seen: Mutex<Vec<OracleRequest>>,
    }

    impl FixedOracle {
        fn new(content: &str) -> Self {
            Self {
                content: content.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Oracle for FixedOracle {
        async fn respond(&self, request: OracleRequest) -> Result<OracleReply, OracleError> {
            self.seen.lock().expect("lock").push(request);
            Ok(OracleReply::text(self.content.clone()).with_usage(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            }))
        }
    }

    fn verdict_json() -> String {
        json!({
            "is_complete": false,
            "completeness_score": 0.4,
            "missing_aspects": ["pricing"],
            "recommendation": "continue",
            "justification": "thin"
        })
        .to_string()
    }

    #[test]
    fn schemas_parse() {
        assert!(Plan::schema().is_ok());
        assert!(EvaluationVerdict::schema().is_ok());
    }

    #[test]
    fn error_kinds_classify_for_retry() {
        assert_eq!(
            OracleError::RateLimited("slow down".into()).kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            OracleError::PayloadTooLarge("big".into()).kind(),
            FailureKind::PayloadTooLarge
        );
        assert_eq!(
            OracleError::Transport("reset".into()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            OracleError::Api {
                status: 503,
                body: String::new()
            }
            .kind(),
            FailureKind::Transient
        );
        assert_eq!(
            OracleError::Api {
                status: 400,
                body: String::new()
            }
            .kind(),
            FailureKind::Fatal
        );
        assert_eq!(
            OracleError::Malformed("x".into()).kind(),
            FailureKind::Fatal
        );
    }

    #[tokio::test]
    async fn structured_request_carries_schema_and_parses_reply() {
        let oracle = FixedOracle::new(&verdict_json());

        let answer = ask_structured::<EvaluationVerdict>(
            &oracle,
            "evaluator",
            vec![Message::user("judge")],
            0.0,
        )
        .await
        .expect("verdict");

        assert_eq!(answer.value.recommendation, Recommendation::Continue);
        assert_eq!(answer.value.missing_aspects, vec!["pricing"]);
        assert_eq!(answer.usage.total_tokens, 15);
        let seen = oracle.seen.lock().expect("lock");
        assert!(matches!(
            &seen[0].response,
            ResponseShape::Structured { name, .. } if name == "evaluation_verdict"
        ));
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let oracle = FixedOracle::new(&format!("```json\n{}\n```", verdict_json()));
        let answer =
            ask_structured::<EvaluationVerdict>(&oracle, "evaluator", Vec::new(), 0.0).await;
        assert!(answer.is_ok());
    }

    #[tokio::test]
    async fn schema_violation_is_malformed() {
        let oracle = FixedOracle::new(r#"{"is_complete": true}"#);
        let err = ask_structured::<EvaluationVerdict>(&oracle, "evaluator", Vec::new(), 0.0)
            .await
            .expect_err("invalid");
        assert!(matches!(err, OracleError::Malformed(msg) if msg.contains("schema validation failed")));
    }

    #[tokio::test]
    async fn plan_exceeding_caps_still_parses() {
        let task = json!({
            "id": "t", "name": "n", "description": "d", "instructions": "i",
            "expected_output": "e", "needs_external_tools": true, "temperature": 0.2
        });
        let phases: Vec<Value> = (0..6)
            .map(|i| json!({"id": format!("p{i}"), "name": "n", "description": "d", "tasks": [task.clone()]}))
            .collect();
        let raw = json!({"summary": "s", "strategy_rationale": "r", "phases": phases}).to_string();
        let oracle = FixedOracle::new(&raw);

        let answer = ask_structured::<Plan>(&oracle, "planner", Vec::new(), 0.0)
            .await
            .expect("plan");

        assert_eq!(answer.value.phases.len(), 6);
        assert!(answer.value.phases[0].tasks[0].needs_external_tools);
    }

    #[tokio::test]
    async fn text_request_returns_content() {
        let oracle = FixedOracle::new("# Report");
        let answer = ask_text(&oracle, "synthesizer", Vec::new(), 0.3)
            .await
            .expect("text");
        assert_eq!(answer.value, "# Report");
        let seen = oracle.seen.lock().expect("lock");
        assert_eq!(seen[0].response, ResponseShape::Text);
        assert!((seen[0].temperature - 0.3).abs() < f32::EPSILON);
    }
}
