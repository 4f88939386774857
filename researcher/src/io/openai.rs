//! OpenAI-compatible chat completions oracle.
//!
//! The client performs exactly one HTTP request per `respond` call. Retry and
//! backoff are owned by the worker loop, not by the transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::core::types::TokenUsage;
use crate::io::oracle::{
    Message, Oracle, OracleError, OracleReply, OracleRequest, ResponseShape, Role, ToolCall,
    ToolDefinition,
};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OpenAiOracle {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiOracle {
    pub fn new(config: OpenAiConfig) -> Result<Self, OracleError> {
        if config.api_key.trim().is_empty() {
            return Err(OracleError::MissingCredential("empty API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                OracleError::MissingCredential(format!("invalid API key header: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|e| OracleError::Transport(format!("build http client: {e}")))?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    #[instrument(skip_all, fields(label = %request.label, model = %self.config.model))]
    async fn respond(&self, request: OracleRequest) -> Result<OracleReply, OracleError> {
        let body = build_chat_request_body(&self.config.model, &request)?;
        debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(self.chat_completions_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, raw));
        }

        let reply = parse_chat_response(&raw)?;
        debug!(
            total_tokens = reply.usage.total_tokens,
            tool_calls = reply.message.tool_calls.len(),
            "chat completion received"
        );
        Ok(reply)
    }
}

/// Map a non-success HTTP status to an oracle error.
pub fn classify_status(status: u16, body: String) -> OracleError {
    let lowered = body.to_ascii_lowercase();
    let too_large =
        lowered.contains("too large") || lowered.contains("context_length_exceeded");
    match status {
        413 => OracleError::PayloadTooLarge(body),
        429 if too_large => OracleError::PayloadTooLarge(body),
        429 => OracleError::RateLimited(body),
        400 if lowered.contains("context_length_exceeded") => OracleError::PayloadTooLarge(body),
        _ => OracleError::Api { status, body },
    }
}

fn build_chat_request_body(model: &str, request: &OracleRequest) -> Result<Value, OracleError> {
    let mut body = json!({
        "model": model,
        "messages": to_openai_messages(&request.messages)?,
        "temperature": request.temperature,
    });

    if !request.tools.is_empty() {
        body["tools"] = to_openai_tools(&request.tools);
    }

    if let ResponseShape::Structured { name, schema } = &request.response {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": strip_meta_keywords(schema),
                "strict": false,
            }
        });
    }

    Ok(body)
}

/// The chat API rejects `$schema` at the top of a response schema.
fn strip_meta_keywords(schema: &Value) -> Value {
    let mut cleaned = schema.clone();
    if let Some(object) = cleaned.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    cleaned
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<Value>, OracleError> {
    let mut serialized = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => serialized.push(json!({
                "role": "system",
                "content": message.content,
            })),
            Role::User => serialized.push(json!({
                "role": "user",
                "content": message.content,
            })),
            Role::Assistant => {
                if message.tool_calls.is_empty() {
                    serialized.push(json!({
                        "role": "assistant",
                        "content": message.content,
                    }));
                    continue;
                }
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if message.content.trim().is_empty() {
                    Value::Null
                } else {
                    Value::String(message.content.clone())
                };
                serialized.push(json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": tool_calls,
                }));
            }
            Role::Tool => {
                let Some(tool_call_id) = message.tool_call_id.as_deref() else {
                    return Err(OracleError::Malformed(
                        "tool message is missing tool_call_id".to_string(),
                    ));
                };
                serialized.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": message.content,
                }));
            }
        }
    }

    Ok(serialized)
}

fn parse_chat_response(raw: &str) -> Result<OracleReply, OracleError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)
        .map_err(|e| OracleError::Malformed(format!("decode chat response: {e}")))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::Malformed("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|call| call.call_type == "function")
        .map(|call| {
            let arguments = match serde_json::from_str::<Value>(&call.function.arguments) {
                Ok(value) => value,
                Err(_) => Value::String(call.function.arguments),
            };
            ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    let usage = parsed
        .usage
        .map(|usage| TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(OracleReply {
        message: Message::assistant_tool_calls(choice.message.content.unwrap_or_default(), tool_calls),
        usage,
    })
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FailureKind;

    fn request(response: ResponseShape) -> OracleRequest {
        OracleRequest {
            label: "worker:t1".to_string(),
            messages: vec![
                Message::system("sys"),
                Message::user("go"),
                Message::assistant_tool_calls(
                    "",
                    vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "search".to_string(),
                        arguments: json!({"query": "rust"}),
                    }],
                ),
                Message::tool_result("call_1", "results"),
            ],
            tools: vec![ToolDefinition {
                name: "search".to_string(),
                description: "Search the web".to_string(),
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.2,
            response,
        }
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = OpenAiOracle::new(OpenAiConfig {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: "  ".to_string(),
            model: "gpt-5-nano".to_string(),
            request_timeout: Duration::from_secs(5),
        })
        .expect_err("missing key");
        assert!(matches!(err, OracleError::MissingCredential(_)));
    }

    #[test]
    fn body_includes_tools_and_tool_messages() {
        let body = build_chat_request_body("gpt-5-nano", &request(ResponseShape::Text)).expect("body");

        assert_eq!(body["model"], "gpt-5-nano");
        assert_eq!(body["tools"][0]["function"]["name"], "search");
        assert_eq!(body["messages"][2]["content"], Value::Null);
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"rust\"}"
        );
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn structured_body_uses_json_schema_format() {
        let schema = json!({"$schema": "x", "type": "object"});
        let body = build_chat_request_body(
            "m",
            &request(ResponseShape::Structured {
                name: "research_plan".to_string(),
                schema,
            }),
        )
        .expect("body");

        let format = &body["response_format"];
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "research_plan");
        assert!(format["json_schema"]["schema"].get("$schema").is_none());
    }

    #[test]
    fn parses_text_tool_calls_and_usage() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "fetch", "arguments": "{\"url\":\"https://a.b\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })
        .to_string();

        let reply = parse_chat_response(&raw).expect("reply");

        assert_eq!(reply.message.content, "");
        assert_eq!(reply.message.tool_calls[0].name, "fetch");
        assert_eq!(reply.message.tool_calls[0].arguments["url"], "https://a.b");
        assert_eq!(reply.usage.total_tokens, 15);
    }

    #[test]
    fn empty_choices_are_malformed() {
        let err = parse_chat_response(r#"{"choices": []}"#).expect_err("no choices");
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[test]
    fn statuses_map_to_failure_kinds() {
        assert_eq!(
            classify_status(429, "Rate limit reached".into()).kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_status(429, "Request too large for gpt-5-nano".into()).kind(),
            FailureKind::PayloadTooLarge
        );
        assert_eq!(
            classify_status(413, String::new()).kind(),
            FailureKind::PayloadTooLarge
        );
        assert_eq!(
            classify_status(400, "{\"code\":\"context_length_exceeded\"}".into()).kind(),
            FailureKind::PayloadTooLarge
        );
        assert_eq!(classify_status(502, String::new()).kind(), FailureKind::Transient);
        assert_eq!(classify_status(401, String::new()).kind(), FailureKind::Fatal);
    }
}
