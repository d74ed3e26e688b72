//! Query classifier (C7) — one LLM call mapping free text to an agent tag.
//!
//! The output alphabet depends on the onboarding phase; anything the model
//! says outside the alphabet (or any provider failure) falls back to the
//! phase default. Only voice mode caches results.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agents::{prompts, AgentKind};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Tags reachable during onboarding.
const ONBOARDING_ALPHABET: &[AgentKind] = &[
    AgentKind::Workout,
    AgentKind::Diet,
    AgentKind::Scheduler,
    AgentKind::Supplement,
];

/// Tags reachable after onboarding.
const REGULAR_ALPHABET: &[AgentKind] = &[
    AgentKind::Workout,
    AgentKind::Diet,
    AgentKind::Scheduler,
    AgentKind::Supplement,
    AgentKind::Tracker,
    AgentKind::General,
];

pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    /// Voice-mode cache; the phase flag keeps the two alphabets apart.
    cache: RwLock<HashMap<(String, bool), AgentKind>>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Classify a query into an agent tag.
    pub async fn classify(&self, query: &str, onboarding_mode: bool, voice_mode: bool) -> AgentKind {
        let cache_key = (query.to_string(), onboarding_mode);
        if voice_mode
            && let Some(tag) = self.cache.read().await.get(&cache_key)
        {
            return *tag;
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::classifier_prompt(onboarding_mode)),
            ChatMessage::user(query),
        ])
        .with_max_tokens(16)
        .with_temperature(0.0);

        let tag = match self.llm.complete(request).await {
            Ok(response) => parse_tag(&response.content, onboarding_mode),
            Err(e) => {
                tracing::warn!(error = %e, "Classification call failed, using default");
                default_tag(onboarding_mode)
            }
        };

        if voice_mode {
            self.cache.write().await.insert(cache_key, tag);
        }
        tag
    }

    #[cfg(test)]
    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

fn alphabet(onboarding_mode: bool) -> &'static [AgentKind] {
    if onboarding_mode {
        ONBOARDING_ALPHABET
    } else {
        REGULAR_ALPHABET
    }
}

fn default_tag(onboarding_mode: bool) -> AgentKind {
    if onboarding_mode {
        AgentKind::Workout
    } else {
        AgentKind::General
    }
}

/// Case-insensitive parse against the phase alphabet; anything else is the
/// phase default.
fn parse_tag(response: &str, onboarding_mode: bool) -> AgentKind {
    let token: String = response
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    if let Ok(kind) = AgentKind::from_str(&token)
        && alphabet(onboarding_mode).contains(&kind)
    {
        return kind;
    }

    // A chatty reply may still contain exactly one alphabet word.
    let lowered = response.to_lowercase();
    let contained: Vec<AgentKind> = alphabet(onboarding_mode)
        .iter()
        .copied()
        .filter(|k| lowered.contains(k.as_str()))
        .collect();
    if let [only] = contained.as_slice() {
        return *only;
    }

    default_tag(onboarding_mode)
}
