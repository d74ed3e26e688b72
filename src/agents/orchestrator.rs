//! Orchestrator (C8) — the chat entry point.
//!
//! Loads context, enforces the phase access table, classifies when no tag
//! was given, applies the post-onboarding override, and invokes the agent.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use uuid::Uuid;

use crate::agents::{AgentKind, AgentRegistry, AgentResponse, Classifier, Mode};
use crate::config::AppConfig;
use crate::context::ContextLoader;
use crate::error::{AccessError, Error, OnboardingError};
use crate::llm::LlmProvider;
use crate::store::Database;

/// The single access-control decision table.
///
/// `tag` is the caller's explicit request; `None` means "classify for me",
/// which only the phase-wide rows can reject.
pub fn decide_access(
    onboarding_mode: bool,
    complete: bool,
    current_step: u8,
    tag: Option<AgentKind>,
) -> Result<(), AccessError> {
    match (onboarding_mode, complete) {
        (true, true) => Err(AccessError::OnboardingAlreadyCompleted),
        (true, false) => match tag {
            Some(AgentKind::General) => Err(AccessError::GeneralDuringOnboarding),
            Some(AgentKind::Tracker) => Err(AccessError::TrackerDuringOnboarding),
            _ => Ok(()),
        },
        (false, false) => Err(AccessError::OnboardingNotCompleted { current_step }),
        (false, true) => match tag {
            Some(kind) if kind.is_specialised() => Err(AccessError::SpecialisedPostOnboarding {
                agent: kind.as_str().to_string(),
            }),
            _ => Ok(()),
        },
    }
}

pub struct Orchestrator {
    db: Arc<dyn Database>,
    loader: ContextLoader,
    registry: AgentRegistry,
    classifier: Classifier,
}

impl Orchestrator {
    /// Build a per-request orchestrator. The agent cache lives and dies
    /// with this instance; the classifier's voice cache is its own.
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>, config: &AppConfig) -> Self {
        let loader = ContextLoader::new(Arc::clone(&db), config.history_window);
        let registry = AgentRegistry::new(
            Arc::clone(&db),
            Arc::clone(&llm),
            config.text_context_messages,
            config.voice_context_messages,
        );
        let classifier = Classifier::new(llm);
        Self {
            db,
            loader,
            registry,
            classifier,
        }
    }

    /// Route one chat request to an agent.
    pub async fn route(
        &self,
        user_id: Uuid,
        query: &str,
        agent_tag: Option<AgentKind>,
        voice_mode: bool,
        onboarding_mode: bool,
    ) -> Result<AgentResponse, Error> {
        let started = Instant::now();

        let ctx = self
            .loader
            .load(user_id, true, onboarding_mode)
            .await?;
        let state = self
            .db
            .get_onboarding_state(user_id)
            .await?
            .ok_or(OnboardingError::StateNotFound(user_id))?;

        if let Err(violation) = decide_access(
            onboarding_mode,
            state.is_complete,
            state.current_step,
            agent_tag,
        ) {
            tracing::warn!(
                user_id = %user_id,
                reason = violation.reason(),
                requested = agent_tag.map(|t| t.as_str()).unwrap_or("none"),
                onboarding_mode,
                onboarding_complete = state.is_complete,
                "Access violation"
            );
            return Err(violation.into());
        }

        let classification_used = agent_tag.is_none();
        let mut tag = match agent_tag {
            Some(tag) => tag,
            None => {
                self.classifier
                    .classify(query, onboarding_mode, voice_mode)
                    .await
            }
        };

        // Post-onboarding, everything except the test agent converges on
        // the general agent.
        if !onboarding_mode && tag != AgentKind::Test && tag != AgentKind::General {
            tracing::info!(
                user_id = %user_id,
                from = tag.as_str(),
                "Post-onboarding override to general agent"
            );
            tag = AgentKind::General;
        }

        let mode = if voice_mode { Mode::Voice } else { Mode::Text };
        let agent = self
            .registry
            .get_or_create(tag, mode, Arc::clone(&ctx), onboarding_mode)
            .await;

        let response = if voice_mode {
            let content = agent.process_voice(query).await?;
            AgentResponse {
                content,
                agent_type: tag.as_str().to_string(),
                tools_used: Vec::new(),
                metadata: json!({"voice": true}),
            }
        } else {
            agent.process_text(query).await?
        };

        tracing::info!(
            user_id = %user_id,
            agent_type = response.agent_type,
            onboarding_mode,
            onboarding_complete = state.is_complete,
            current_step = state.current_step,
            classification_used,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Routed chat request"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::store::LibSqlBackend;
    use serde_json::json;

    // ── Decision table ──────────────────────────────────────────────

    #[test]
    fn access_table_matches_spec_exactly() {
        use AgentKind::*;
        let all = [Workout, Diet, Scheduler, Supplement, General, Tracker, Test];

        // onboarding_mode=true, complete=true: everything rejected
        for tag in all {
            assert!(decide_access(true, true, 9, Some(tag)).is_err());
        }
        assert!(decide_access(true, true, 9, None).is_err());

        // onboarding_mode=true, complete=false
        for tag in [Workout, Diet, Scheduler, Supplement, Test] {
            assert!(decide_access(true, false, 3, Some(tag)).is_ok());
        }
        assert!(matches!(
            decide_access(true, false, 3, Some(General)),
            Err(AccessError::GeneralDuringOnboarding)
        ));
        assert!(matches!(
            decide_access(true, false, 3, Some(Tracker)),
            Err(AccessError::TrackerDuringOnboarding)
        ));
        assert!(decide_access(true, false, 3, None).is_ok());

        // onboarding_mode=false, complete=false: everything rejected
        for tag in all {
            assert!(matches!(
                decide_access(false, false, 4, Some(tag)),
                Err(AccessError::OnboardingNotCompleted { current_step: 4 })
            ));
        }
        assert!(decide_access(false, false, 4, None).is_err());

        // onboarding_mode=false, complete=true
        for tag in [Workout, Diet, Scheduler, Supplement] {
            assert!(matches!(
                decide_access(false, true, 9, Some(tag)),
                Err(AccessError::SpecialisedPostOnboarding { .. })
            ));
        }
        for tag in [General, Tracker, Test] {
            assert!(decide_access(false, true, 9, Some(tag)).is_ok());
        }
        assert!(decide_access(false, true, 9, None).is_ok());
    }

    // ── Routing ─────────────────────────────────────────────────────

    async fn setup(complete: bool) -> (Orchestrator, Arc<ScriptedLlm>, Uuid) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user_id = Uuid::new_v4();
        db.register_user(user_id, "Router").await.unwrap();
        if complete {
            let mut state = db.get_onboarding_state(user_id).await.unwrap().unwrap();
            for k in 1..=9 {
                state.record_step(k, json!({}), None);
            }
            state.is_complete = true;
            db.save_onboarding_state(&state).await.unwrap();
        }
        let llm = Arc::new(ScriptedLlm::new());
        let orchestrator = Orchestrator::new(
            db,
            llm.clone() as Arc<dyn LlmProvider>,
            &AppConfig::default(),
        );
        (orchestrator, llm, user_id)
    }

    #[tokio::test]
    async fn onboarding_chat_reaches_specialised_agent() {
        let (orchestrator, llm, user_id) = setup(false).await;
        llm.push_text("Tell me about your training background.");

        let response = orchestrator
            .route(user_id, "hi", Some(AgentKind::Workout), false, true)
            .await
            .unwrap();
        assert_eq!(response.agent_type, "workout");
    }

    #[tokio::test]
    async fn general_rejected_during_onboarding() {
        let (orchestrator, _, user_id) = setup(false).await;
        let err = orchestrator
            .route(user_id, "hi", Some(AgentKind::General), false, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::GeneralDuringOnboarding)
        ));
    }

    #[tokio::test]
    async fn regular_chat_requires_completion() {
        let (orchestrator, _, user_id) = setup(false).await;
        let err = orchestrator
            .route(user_id, "hi", None, false, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::OnboardingNotCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn onboarding_chat_rejected_after_completion() {
        let (orchestrator, _, user_id) = setup(true).await;
        let err = orchestrator
            .route(user_id, "hi", Some(AgentKind::Workout), false, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::OnboardingAlreadyCompleted)
        ));
    }

    #[tokio::test]
    async fn explicit_specialised_tag_rejected_post_onboarding() {
        let (orchestrator, _, user_id) = setup(true).await;
        let err = orchestrator
            .route(user_id, "hi", Some(AgentKind::Workout), false, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::SpecialisedPostOnboarding { .. })
        ));
    }

    #[tokio::test]
    async fn classifier_output_overridden_to_general() {
        let (orchestrator, llm, user_id) = setup(true).await;
        // Classifier says workout; the override forces general
        llm.push_text("workout");
        llm.push_text("Here's your overview.");

        let response = orchestrator
            .route(user_id, "how's my training going?", None, false, false)
            .await
            .unwrap();
        assert_eq!(response.agent_type, "general");
    }

    #[tokio::test]
    async fn test_tag_escapes_override() {
        let (orchestrator, llm, user_id) = setup(true).await;
        llm.push_text("diagnostic ok");
        let response = orchestrator
            .route(user_id, "ping", Some(AgentKind::Test), false, false)
            .await
            .unwrap();
        assert_eq!(response.agent_type, "test");
    }

    #[tokio::test]
    async fn voice_route_wraps_plain_string() {
        let (orchestrator, llm, user_id) = setup(false).await;
        llm.push_text("Short spoken answer.");
        let response = orchestrator
            .route(user_id, "hi", Some(AgentKind::Diet), true, true)
            .await
            .unwrap();
        assert_eq!(response.agent_type, "diet");
        assert_eq!(response.metadata["voice"], true);
        assert!(response.tools_used.is_empty());
    }

    #[tokio::test]
    async fn unknown_user_fails_before_access_check() {
        let (orchestrator, _, _) = setup(false).await;
        let err = orchestrator
            .route(Uuid::new_v4(), "hi", None, false, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Context(_)));
    }
}
