//! `GET /users/me` — user record plus the feature access-control block.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::error::{DatabaseError, Error};
use crate::onboarding::model::Progress;
use crate::server::{AppState, CallerId};
use crate::store::Database;

/// GET /users/me
///
/// Chat is always accessible; everything else unlocks at onboarding
/// completion. `onboarding_progress` is present only while incomplete.
async fn me(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
) -> Result<Json<serde_json::Value>, Error> {
    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "user".to_string(),
            id: user_id.to_string(),
        })?;
    let onboarding = state
        .db
        .get_onboarding_state(user_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "onboarding_state".to_string(),
            id: user_id.to_string(),
        })?;

    let complete = onboarding.is_complete;
    let locked_features: Vec<&str> = if complete {
        Vec::new()
    } else {
        vec!["dashboard", "workouts", "meals", "profile"]
    };

    let mut access_control = json!({
        "dashboard": complete,
        "workouts": complete,
        "meals": complete,
        "chat": true,
        "profile": complete,
        "locked_features": locked_features,
    });
    if !complete {
        access_control["unlock_message"] = json!(
            "Finish onboarding to unlock your dashboard, workouts, meals, and profile."
        );
    }

    let mut body = json!({
        "user": {
            "id": user.id,
            "display_name": user.display_name,
            "created_at": user.created_at,
        },
        "access_control": access_control,
    });
    if !complete {
        body["onboarding_progress"] = serde_json::to_value(Progress::for_state(&onboarding))?;
    }
    Ok(Json(body))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/users/me", get(me))
}
