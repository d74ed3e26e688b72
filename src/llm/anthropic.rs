//! Anthropic Messages API backend for [`LlmProvider`].
//!
//! Plain reqwest transport: completions, tool calling (tool_use /
//! tool_result content blocks), and SSE streaming.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic-backed provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
        })
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
        tools: Option<&[crate::llm::provider::ToolDefinition]>,
        stream: bool,
    ) -> Value {
        let (system, converted) = convert_messages(messages);
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": converted,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }
        if let Some(tools) = tools
            && !tools.is_empty()
        {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: "anthropic".to_string(),
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: "anthropic".to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: "anthropic".to_string(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("HTTP {status}: {text}"),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.request_body(
            &request.messages,
            request.max_tokens,
            request.temperature,
            None,
            false,
        );
        let response = self.send(&body).await?;
        let parsed: Value = response.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: "anthropic".to_string(),
            reason: e.to_string(),
        })?;

        let (content, tool_calls, input_tokens, output_tokens) = parse_message(&parsed)?;
        if !tool_calls.is_empty() {
            tracing::warn!("Model returned tool calls on a plain completion; ignoring");
        }
        Ok(CompletionResponse {
            content: content.unwrap_or_default(),
            input_tokens,
            output_tokens,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let body = self.request_body(
            &request.messages,
            request.max_tokens,
            request.temperature,
            Some(&request.tools),
            false,
        );
        let response = self.send(&body).await?;
        let parsed: Value = response.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: "anthropic".to_string(),
            reason: e.to_string(),
        })?;

        let (content, tool_calls, input_tokens, output_tokens) = parse_message(&parsed)?;
        Ok(ToolCompletionResponse {
            content,
            tool_calls,
            input_tokens,
            output_tokens,
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let body = self.request_body(
            &request.messages,
            request.max_tokens,
            request.temperature,
            None,
            true,
        );
        let response = self.send(&body).await?;
        let bytes = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));

        // Line-buffered SSE decode: text_delta events become chunks.
        let state = SseState {
            inner: bytes.boxed(),
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        };
        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Some((Ok(chunk), state));
                }
                if state.done {
                    return None;
                }
                match state.inner.next().await {
                    Some(Ok(bytes)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_lines(&mut state.buffer, &mut state.pending, &mut state.done);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((
                            Err(LlmError::RequestFailed {
                                provider: "anthropic".to_string(),
                                reason: e.to_string(),
                            }),
                            state,
                        ));
                    }
                    None => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

struct SseState {
    inner: BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>>,
    buffer: String,
    pending: VecDeque<String>,
    done: bool,
}

/// Drain complete SSE lines from `buffer`, pushing text deltas to `pending`.
fn drain_sse_lines(buffer: &mut String, pending: &mut VecDeque<String>, done: &mut bool) {
    while let Some(newline) = buffer.find('\n') {
        let line: String = buffer.drain(..=newline).collect();
        let line = line.trim();
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        let Ok(event) = serde_json::from_str::<Value>(data) else {
            continue;
        };
        match event.get("type").and_then(|t| t.as_str()) {
            Some("content_block_delta") => {
                if let Some(text) = event
                    .pointer("/delta/text")
                    .and_then(|t| t.as_str())
                    .filter(|t| !t.is_empty())
                {
                    pending.push_back(text.to_string());
                }
            }
            Some("message_stop") => *done = true,
            _ => {}
        }
    }
}

/// Convert provider-agnostic messages into the Messages API shape.
///
/// System messages concatenate into the top-level `system` field; tool
/// results become `tool_result` blocks on a user turn.
fn convert_messages(messages: &[ChatMessage]) -> (String, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut converted: Vec<Value> = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system_parts.push(message.content.clone()),
            Role::User => converted.push(json!({
                "role": "user",
                "content": [{"type": "text", "text": message.content}],
            })),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": message.content}));
                }
                for call in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                converted.push(json!({"role": "assistant", "content": blocks}));
            }
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content,
                });
                // Consecutive tool results share one user turn.
                if let Some(last) = converted.last_mut()
                    && last["role"] == "user"
                    && last["content"]
                        .as_array()
                        .is_some_and(|blocks| blocks.iter().all(|b| b["type"] == "tool_result"))
                {
                    last["content"].as_array_mut().expect("checked").push(block);
                } else {
                    converted.push(json!({"role": "user", "content": [block]}));
                }
            }
        }
    }

    (system_parts.join("\n\n"), converted)
}

/// Pull text, tool calls, and usage out of a Messages API response.
fn parse_message(value: &Value) -> Result<(Option<String>, Vec<ToolCall>, u32, u32), LlmError> {
    let blocks = value
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: "anthropic".to_string(),
            reason: "missing content array".to_string(),
        })?;

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(text.to_string());
                }
            }
            Some("tool_use") => {
                tool_calls.push(ToolCall {
                    id: block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    name: block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    arguments: block.get("input").cloned().unwrap_or(Value::Null),
                });
            }
            _ => {}
        }
    }

    let content = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join(""))
    };
    let input_tokens = value
        .pointer("/usage/input_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let output_tokens = value
        .pointer("/usage/output_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    Ok((content, tool_calls, input_tokens, output_tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_lift_into_system_field() {
        let messages = vec![
            ChatMessage::system("You are a coach."),
            ChatMessage::user("hi"),
        ];
        let (system, converted) = convert_messages(&messages);
        assert_eq!(system, "You are a coach.");
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0]["role"], "user");
    }

    #[test]
    fn tool_results_merge_into_one_user_turn() {
        let messages = vec![
            ChatMessage::user("plan my day"),
            ChatMessage::assistant_with_tools(
                "",
                vec![
                    ToolCall {
                        id: "a".into(),
                        name: "get_upcoming_schedule".into(),
                        arguments: json!({}),
                    },
                    ToolCall {
                        id: "b".into(),
                        name: "get_current_meal_plan".into(),
                        arguments: json!({}),
                    },
                ],
            ),
            ChatMessage::tool_result("a", "{\"success\":true}"),
            ChatMessage::tool_result("b", "{\"success\":true}"),
        ];
        let (_, converted) = convert_messages(&messages);
        assert_eq!(converted.len(), 3);
        let results = converted[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "a");
        assert_eq!(results[1]["tool_use_id"], "b");
    }

    #[test]
    fn parse_message_extracts_text_and_tools() {
        let value = json!({
            "content": [
                {"type": "text", "text": "Checking your plan."},
                {"type": "tool_use", "id": "c1", "name": "get_current_workout", "input": {}},
            ],
            "usage": {"input_tokens": 12, "output_tokens": 7},
        });
        let (content, calls, input, output) = parse_message(&value).unwrap();
        assert_eq!(content.as_deref(), Some("Checking your plan."));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_current_workout");
        assert_eq!((input, output), (12, 7));
    }

    #[test]
    fn sse_drain_emits_text_deltas() {
        let mut buffer = String::from(
            "event: content_block_delta\n\
             data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\
             data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\
             data: {\"type\":\"message_stop\"}\n",
        );
        let mut pending = VecDeque::new();
        let mut done = false;
        drain_sse_lines(&mut buffer, &mut pending, &mut done);
        assert_eq!(pending, VecDeque::from(["Hel".to_string(), "lo".to_string()]));
        assert!(done);
        assert!(buffer.is_empty());
    }

    #[test]
    fn sse_drain_keeps_partial_line() {
        let mut buffer = String::from("data: {\"type\":\"content_bl");
        let mut pending = VecDeque::new();
        let mut done = false;
        drain_sse_lines(&mut buffer, &mut pending, &mut done);
        assert!(pending.is_empty());
        assert_eq!(buffer, "data: {\"type\":\"content_bl");
    }
}
