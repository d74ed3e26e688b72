//! REST endpoints for onboarding step submission, progress, and completion.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::Error;
use crate::onboarding::model::{step_info, StepInfoView};
use crate::onboarding::{OnboardingManager, ProfileMaterialiser};
use crate::server::{AppState, CallerId};

#[derive(Debug, Deserialize)]
struct StepRequest {
    step: u8,
    data: serde_json::Value,
}

/// POST /onboarding/step
///
/// The optional `X-Agent-Context` header records which agent drove the
/// submission into the state's agent history.
async fn submit_step(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    headers: HeaderMap,
    Json(body): Json<StepRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    let agent_tag = headers
        .get("x-agent-context")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let manager = OnboardingManager::new(state.db.clone());
    let saved = manager
        .save_step(user_id, body.step, body.data, agent_tag.as_deref())
        .await?;

    let next_step = saved.current_step + 1;
    let next_info = step_info(next_step).map(StepInfoView::from);
    let mut response = json!({
        "current_step": saved.current_step,
        "is_complete": saved.is_complete,
        "message": format!("Step {} saved", body.step),
        "next_state": if next_step <= 9 { Some(next_step) } else { None },
    });
    if let Some(info) = next_info {
        response["next_state_info"] = serde_json::to_value(info)?;
    }
    Ok(Json(response))
}

/// GET /onboarding/progress
async fn get_progress(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<serde_json::Value>, Error> {
    let manager = OnboardingManager::new(state.db.clone());
    let progress = manager.get_progress(user_id).await?;
    Ok(Json(serde_json::to_value(progress)?))
}

/// POST /onboarding/complete
async fn complete(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<serde_json::Value>, Error> {
    let materialiser = ProfileMaterialiser::new(state.db.clone());
    let profile = materialiser.complete_onboarding(user_id).await?;
    Ok(Json(serde_json::to_value(profile)?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/onboarding/step", post(submit_step))
        .route("/onboarding/progress", get(get_progress))
        .route("/onboarding/complete", post(complete))
}
