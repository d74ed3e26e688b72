//! LLM integration.
//!
//! The model is an opaque completion + tool-calling service behind the
//! [`LlmProvider`] trait. Two backends:
//! - **Anthropic**: Messages API over reqwest
//! - **Scripted**: deterministic queue, for tests and the `test` agent

pub mod anthropic;
pub mod provider;
pub mod scripted;

pub use anthropic::AnthropicProvider;
pub use provider::*;
pub use scripted::ScriptedLlm;

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    Scripted,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            let provider =
                AnthropicProvider::new(config.api_key.clone(), &config.model, config.timeout)?;
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(provider))
        }
        LlmBackend::Scripted => {
            tracing::info!("Using scripted provider");
            Ok(Arc::new(ScriptedLlm::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_anthropic_provider() {
        // Construction never fails on a bad key; auth errors happen at
        // request time.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-sonnet-4-20250514".to_string(),
            timeout: Duration::from_secs(30),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn create_scripted_provider() {
        let config = LlmConfig {
            backend: LlmBackend::Scripted,
            api_key: secrecy::SecretString::from(""),
            model: String::new(),
            timeout: Duration::from_secs(1),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "scripted");
    }
}
