//! Configuration types.

use std::time::Duration;

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name for identification.
    pub name: String,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Path to the local database file.
    pub db_path: String,
    /// Number of conversation messages loaded into agent context.
    pub history_window: usize,
    /// Conversation items passed to the LLM per text request.
    pub text_context_messages: usize,
    /// Conversation items passed to the LLM per voice request.
    pub voice_context_messages: usize,
    /// Deadline for a single LLM call.
    pub llm_timeout: Duration,
    /// Maximum chat message length accepted on the HTTP surface.
    pub max_message_chars: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "fitcoach".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: "./data/fitcoach.db".to_string(),
            history_window: 10,
            text_context_messages: 10,
            voice_context_messages: 4,
            llm_timeout: Duration::from_secs(60),
            max_message_chars: 2000,
        }
    }
}
