//! Agents: kinds, the shared request loop, registry, classifier, and the
//! orchestrator entry point.

pub mod classifier;
pub mod orchestrator;
pub mod prompts;
pub mod registry;

pub use classifier::Classifier;
pub use orchestrator::Orchestrator;
pub use registry::AgentRegistry;

use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::AgentContext;
use crate::error::{Error, LlmError, ToolError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, ToolCompletionRequest};
use crate::store::Database;
use crate::tools::{diet, scheduler, supplement, workout, Tool, ToolDeps, ToolRegistry};

/// Agent tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Workout,
    Diet,
    Scheduler,
    Supplement,
    General,
    Tracker,
    Test,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workout => "workout",
            Self::Diet => "diet",
            Self::Scheduler => "scheduler",
            Self::Supplement => "supplement",
            Self::General => "general",
            Self::Tracker => "tracker",
            Self::Test => "test",
        }
    }

    /// The four onboarding specialists.
    pub fn is_specialised(&self) -> bool {
        matches!(
            self,
            Self::Workout | Self::Diet | Self::Scheduler | Self::Supplement
        )
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workout" => Ok(Self::Workout),
            "diet" => Ok(Self::Diet),
            "scheduler" => Ok(Self::Scheduler),
            "supplement" => Ok(Self::Supplement),
            "general" => Ok(Self::General),
            "tracker" => Ok(Self::Tracker),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown agent tag: {other}")),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Text vs. voice request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Text,
    Voice,
}

/// The response returned by `process_text` (and wrapped voice replies).
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub content: String,
    pub agent_type: String,
    pub tools_used: Vec<String>,
    pub metadata: serde_json::Value,
}

/// Fallback when the follow-up LLM call after tool execution fails.
const TOOL_APOLOGY: &str =
    "Sorry, I ran into a problem finishing that action. Please try again.";

/// Build the fixed tool set for an agent kind.
fn toolset(kind: AgentKind, deps: &ToolDeps, onboarding_mode: bool) -> Vec<Arc<dyn Tool>> {
    match kind {
        AgentKind::Workout => workout::workout_tools(deps, onboarding_mode),
        AgentKind::Diet => diet::diet_tools(deps, onboarding_mode),
        AgentKind::Scheduler => scheduler::scheduler_tools(deps, onboarding_mode),
        AgentKind::Supplement => supplement::supplement_tools(deps, onboarding_mode),
        // General (and the forward-compatible tracker) delegate to every
        // family's post-onboarding tools; they add no mutations of their own.
        AgentKind::General | AgentKind::Tracker => {
            let mut tools = workout::read_tools(deps);
            tools.extend(diet::read_tools(deps));
            tools.extend(scheduler::read_write_tools(deps));
            tools.extend(supplement::read_tools());
            tools
        }
        AgentKind::Test => Vec::new(),
    }
}

/// A specialised conversational agent.
///
/// Stateless except for its immutable context: the LLM client and database
/// handle are shared, and nothing mutates between requests.
pub struct Agent {
    kind: AgentKind,
    ctx: Arc<AgentContext>,
    llm: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    text_window: usize,
    voice_window: usize,
}

impl Agent {
    pub fn new(
        kind: AgentKind,
        ctx: Arc<AgentContext>,
        db: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        onboarding_mode: bool,
        text_window: usize,
        voice_window: usize,
    ) -> Self {
        let deps = ToolDeps {
            db,
            ctx: Arc::clone(&ctx),
        };
        let tools = ToolRegistry::with_tools(toolset(kind, &deps, onboarding_mode));
        Self {
            kind,
            ctx,
            llm,
            tools,
            text_window,
            voice_window,
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    fn history_messages(&self, window: usize) -> Vec<ChatMessage> {
        let history = self.ctx.conversation_history();
        let start = history.len().saturating_sub(window);
        history[start..]
            .iter()
            .filter_map(|item| match item.role.as_str() {
                "user" => Some(ChatMessage::user(&item.content)),
                "assistant" => Some(ChatMessage::assistant(&item.content)),
                _ => None,
            })
            .collect()
    }

    fn compose(&self, query: &str, voice_mode: bool) -> Vec<ChatMessage> {
        let window = if voice_mode {
            self.voice_window
        } else {
            self.text_window
        };
        let mut messages = vec![ChatMessage::system(prompts::system_prompt(
            self.kind,
            &self.ctx,
            voice_mode,
        ))];
        messages.extend(self.history_messages(window));
        messages.push(ChatMessage::user(query));
        messages
    }

    /// Full request loop: one LLM call, then at most one tool round
    /// followed by one final LLM call.
    pub async fn process_text(&self, query: &str) -> Result<AgentResponse, Error> {
        let mut messages = self.compose(query, false);
        let mut tools_used = Vec::new();

        let content = if self.tools.is_empty() {
            let response = self
                .llm
                .complete(CompletionRequest::new(messages))
                .await?;
            response.content
        } else {
            let response = self
                .llm
                .complete_with_tools(ToolCompletionRequest::new(
                    messages.clone(),
                    self.tools.definitions(),
                ))
                .await?;

            if response.tool_calls.is_empty() {
                response.content.unwrap_or_default()
            } else {
                messages.push(ChatMessage::assistant_with_tools(
                    response.content.clone().unwrap_or_default(),
                    response.tool_calls.clone(),
                ));

                for call in &response.tool_calls {
                    let result = self.run_tool(&call.name, call.arguments.clone()).await;
                    tools_used.push(call.name.clone());
                    messages.push(ChatMessage::tool_result(&call.id, result.to_string()));
                }

                // Exactly one follow-up completion for the final answer.
                match self.llm.complete(CompletionRequest::new(messages)).await {
                    Ok(response) => response.content,
                    Err(e) => {
                        tracing::error!(agent = %self.kind, error = %e,
                            "Follow-up completion failed after tool round");
                        TOOL_APOLOGY.to_string()
                    }
                }
            }
        };

        Ok(AgentResponse {
            content,
            agent_type: self.kind.as_str().to_string(),
            tools_used,
            metadata: json!({"model": self.llm.model_name()}),
        })
    }

    /// Voice request: no tools, short context, ≤ ~75-word answers.
    pub async fn process_voice(&self, query: &str) -> Result<String, Error> {
        let messages = self.compose(query, true);
        let response = self
            .llm
            .complete(CompletionRequest::new(messages).with_max_tokens(256))
            .await?;
        Ok(response.content)
    }

    /// Stream the answer as text chunks. Finite and non-restartable.
    pub async fn stream_response(
        &self,
        query: &str,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, Error> {
        let messages = self.compose(query, false);
        Ok(self.llm.stream(CompletionRequest::new(messages)).await?)
    }

    /// Execute one tool call; failures become failed envelopes the model
    /// reads rather than request-level errors.
    async fn run_tool(&self, name: &str, arguments: serde_json::Value) -> serde_json::Value {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(agent = %self.kind, tool = name, "Model requested unknown tool");
            return crate::tools::ToolOutput::failure(format!("Unknown tool '{name}'")).to_json();
        };
        match tool.execute(arguments).await {
            Ok(output) => output.to_json(),
            Err(e @ ToolError::InvalidParameters { .. }) => {
                crate::tools::ToolOutput::failure(e.to_string()).to_json()
            }
            Err(e) => {
                tracing::error!(agent = %self.kind, tool = name, error = %e,
                    "Tool execution failed");
                crate::tools::ToolOutput::failure(
                    "The action could not be completed right now; apologise to the user",
                )
                .to_json()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::context::ContextLoader;
    use crate::llm::ScriptedLlm;
    use crate::store::LibSqlBackend;
    use futures::StreamExt;
    use uuid::Uuid;

    async fn agent_with(kind: AgentKind, onboarding: bool) -> (Agent, Arc<ScriptedLlm>, Arc<dyn Database>, Uuid) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user_id = Uuid::new_v4();
        db.register_user(user_id, "Agent").await.unwrap();
        let ctx = ContextLoader::new(Arc::clone(&db), 10)
            .load(user_id, true, onboarding)
            .await
            .unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        let agent = Agent::new(
            kind,
            ctx,
            Arc::clone(&db),
            llm.clone() as Arc<dyn LlmProvider>,
            onboarding,
            10,
            4,
        );
        (agent, llm, db, user_id)
    }

    #[tokio::test]
    async fn plain_text_response() {
        let (agent, llm, _, _) = agent_with(AgentKind::Workout, true).await;
        llm.push_text("Let's get started with your fitness level.");

        let response = agent.process_text("hi").await.unwrap();
        assert_eq!(response.agent_type, "workout");
        assert!(response.tools_used.is_empty());
        assert!(response.content.contains("fitness level"));
    }

    #[tokio::test]
    async fn single_tool_round_then_final_answer() {
        let (agent, llm, db, user_id) = agent_with(AgentKind::Workout, true).await;
        llm.push_tool_call(
            "save_fitness_level",
            serde_json::json!({"fitness_level": "beginner"}),
        );
        llm.push_text("Saved! You're set as a beginner.");

        let response = agent.process_text("I'm new to this").await.unwrap();
        assert_eq!(response.tools_used, vec!["save_fitness_level"]);
        assert!(response.content.contains("Saved"));

        // The tool really persisted the step
        let state = db.get_onboarding_state(user_id).await.unwrap().unwrap();
        assert_eq!(state.current_step, 1);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_failed_envelope() {
        let (agent, llm, _, _) = agent_with(AgentKind::Workout, true).await;
        llm.push_tool_call("rm_rf", serde_json::json!({}));
        llm.push_text("done");

        let response = agent.process_text("?").await.unwrap();
        assert_eq!(response.tools_used, vec!["rm_rf"]);
        // The follow-up request saw a failure envelope, not an error
        let requests = llm.requests();
        let followup = requests.last().unwrap();
        let tool_result = followup
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_result.content.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn followup_failure_yields_apology() {
        let (agent, llm, _, _) = agent_with(AgentKind::Workout, true).await;
        llm.push_tool_call(
            "save_fitness_level",
            serde_json::json!({"fitness_level": "beginner"}),
        );
        llm.push_error("provider down");

        let response = agent.process_text("set me up").await.unwrap();
        assert_eq!(response.content, TOOL_APOLOGY);
    }

    #[tokio::test]
    async fn voice_has_no_tools() {
        let (agent, llm, _, _) = agent_with(AgentKind::Diet, true).await;
        llm.push_text("Keep protein steady through the day.");

        let reply = agent.process_voice("protein tips?").await.unwrap();
        assert!(reply.contains("protein"));

        // The request carried the voice constraint and no tool round
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let system = &requests[0][0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("75 words"));
    }

    #[tokio::test]
    async fn stream_terminates() {
        let (agent, llm, _, _) = agent_with(AgentKind::Test, false).await;
        llm.push_text("chunk one two");
        let mut stream = agent.stream_response("go").await.unwrap();
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            out.push_str(&chunk.unwrap());
        }
        assert_eq!(out, "chunk one two");
    }

    #[tokio::test]
    async fn general_agent_unions_families() {
        let (agent, _, _, _) = agent_with(AgentKind::General, false).await;
        let names = agent.tool_names();
        assert!(names.contains(&"get_current_workout"));
        assert!(names.contains(&"get_current_meal_plan"));
        assert!(names.contains(&"reschedule_workout"));
        assert!(names.contains(&"get_supplement_info"));
        // No onboarding save tools post-onboarding
        assert!(!names.iter().any(|n| n.starts_with("save_")));
    }
}
