//! Chat endpoints: regular chat, onboarding chat, and history.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::agents::{AgentKind, Orchestrator};
use crate::error::{Error, OnboardingError};
use crate::onboarding::model::step_info;
use crate::server::{AppState, CallerId};
use crate::store::Database;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    agent_type: Option<String>,
    #[serde(default)]
    voice_mode: bool,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    50
}

fn parse_tag(raw: &Option<String>) -> Result<Option<AgentKind>, Error> {
    match raw {
        None => Ok(None),
        Some(raw) => AgentKind::from_str(raw)
            .map(Some)
            .map_err(|e| OnboardingError::invalid("agent_type", e).into()),
    }
}

fn check_message(message: &str, max_chars: usize) -> Result<(), Error> {
    let length = message.chars().count();
    if length == 0 || length > max_chars {
        return Err(OnboardingError::invalid(
            "message",
            format!("message must be between 1 and {max_chars} characters"),
        )
        .into());
    }
    Ok(())
}

/// Persist the user turn then the assistant turn, in that order.
async fn persist_turn(
    db: &Arc<dyn Database>,
    user_id: Uuid,
    message: &str,
    response: &crate::agents::AgentResponse,
) -> Result<Uuid, Error> {
    db.add_conversation_message(user_id, "user", message, None)
        .await?;
    let assistant_id = db
        .add_conversation_message(
            user_id,
            "assistant",
            &response.content,
            Some(&response.agent_type),
        )
        .await?;
    Ok(assistant_id)
}

/// POST /chat/chat — post-onboarding conversation.
async fn chat(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    check_message(&body.message, state.config.max_message_chars)?;
    let tag = parse_tag(&body.agent_type)?;

    let orchestrator = Orchestrator::new(state.db.clone(), state.llm.clone(), &state.config);
    let response = orchestrator
        .route(user_id, &body.message, tag, body.voice_mode, false)
        .await?;

    persist_turn(&state.db, user_id, &body.message, &response).await?;

    Ok(Json(json!({
        "response": response.content,
        "conversation_id": user_id,
        "agent_type": response.agent_type,
        "tools_used": response.tools_used,
    })))
}

/// POST /chat/onboarding — onboarding conversation.
///
/// When no agent is named, the current step's owning agent is the default
/// rather than the classifier.
async fn onboarding_chat(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(body): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    check_message(&body.message, state.config.max_message_chars)?;
    let mut tag = parse_tag(&body.agent_type)?;

    if tag.is_none() {
        let onboarding_state = state
            .db
            .get_onboarding_state(user_id)
            .await?
            .ok_or(OnboardingError::StateNotFound(user_id))?;
        // current_step is the last saved step; the conversation targets the
        // next one (step 1 before anything is saved).
        let upcoming = (onboarding_state.current_step + 1).min(crate::onboarding::STEP_COUNT);
        tag = step_info(upcoming).map(|info| info.agent);
    }

    let orchestrator = Orchestrator::new(state.db.clone(), state.llm.clone(), &state.config);
    let response = orchestrator
        .route(user_id, &body.message, tag, body.voice_mode, true)
        .await?;

    persist_turn(&state.db, user_id, &body.message, &response).await?;

    Ok(Json(json!({
        "response": response.content,
        "conversation_id": user_id,
        "agent_type": response.agent_type,
        "tools_used": response.tools_used,
    })))
}

/// GET /chat/history?limit=N&offset=M — oldest → newest.
async fn history(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, Error> {
    let limit = query.limit.min(200);
    let messages = state
        .db
        .list_conversation_messages(user_id, limit, query.offset)
        .await?;
    let total = state.db.count_conversation_messages(user_id).await?;
    Ok(Json(json!({
        "messages": messages,
        "total": total,
        "limit": limit,
        "offset": query.offset,
    })))
}

/// DELETE /chat/history
async fn clear_history(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<serde_json::Value>, Error> {
    state.db.clear_conversation_messages(user_id).await?;
    Ok(Json(json!({"status": "cleared"})))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/chat", post(chat))
        .route("/chat/onboarding", post(onboarding_chat))
        .route("/chat/history", get(history))
        .route("/chat/history", delete(clear_history))
}
