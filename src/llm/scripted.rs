//! Deterministic scripted provider.
//!
//! Backs the `test` agent tag and every integration test: responses are
//! popped from a queue, and when the queue is dry the provider echoes the
//! last user message. No network involved.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};

/// One scripted turn.
#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Error(String),
}

/// Scripted LLM provider.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .expect("script lock")
            .push_back(Scripted::Text(text.into()));
    }

    /// Queue a tool-call response.
    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        let call = ToolCall {
            id: format!("scripted_{name}"),
            name: name.to_string(),
            arguments,
        };
        self.script
            .lock()
            .expect("script lock")
            .push_back(Scripted::ToolCalls(vec![call]));
    }

    /// Queue a provider failure.
    pub fn push_error(&self, reason: impl Into<String>) {
        self.script
            .lock()
            .expect("script lock")
            .push_back(Scripted::Error(reason.into()));
    }

    /// Message lists of every request seen so far.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next(&self, messages: &[ChatMessage]) -> Result<Scripted, LlmError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        let scripted = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Scripted::Text(echo(messages)));
        match scripted {
            Scripted::Error(reason) => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason,
            }),
            other => Ok(other),
        }
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

fn echo(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| format!("echo: {}", m.content))
        .unwrap_or_else(|| "echo".to_string())
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let content = match self.next(&request.messages)? {
            Scripted::Text(text) => text,
            // Tool calls on a plain completion collapse to their names.
            Scripted::ToolCalls(calls) => calls
                .iter()
                .map(|c| c.name.clone())
                .collect::<Vec<_>>()
                .join(","),
            Scripted::Error(_) => unreachable!("errors returned by next()"),
        };
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let response = match self.next(&request.messages)? {
            Scripted::Text(text) => ToolCompletionResponse {
                content: Some(text),
                tool_calls: Vec::new(),
                input_tokens: 0,
                output_tokens: 0,
            },
            Scripted::ToolCalls(calls) => ToolCompletionResponse {
                content: None,
                tool_calls: calls,
                input_tokens: 0,
                output_tokens: 0,
            },
            Scripted::Error(_) => unreachable!("errors returned by next()"),
        };
        Ok(response)
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let response = self.complete(request).await?;
        // Chunk on whitespace so consumers see a real multi-part stream.
        let chunks: Vec<Result<String, LlmError>> = response
            .content
            .split_inclusive(' ')
            .map(|part| Ok(part.to_string()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}
