//! End-to-end onboarding through the HTTP surface.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{register_user, request, seed_catalogue, send, submit_all_steps, test_app};
use fitcoach::store::Database;

#[tokio::test]
async fn happy_path_onboarding() {
    let app = test_app().await;
    seed_catalogue(&app).await;
    let user_id = register_user(&app).await;

    submit_all_steps(&app, user_id).await;

    // Progress reports full completion
    let (status, progress) = send(
        &app.router,
        request("GET", "/onboarding/progress", user_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["completion_percentage"], 100);
    assert_eq!(progress["can_complete"], true);
    assert_eq!(progress["current_step"], 9);
    assert!(progress["next_state_info"].is_null());

    // Completion returns a locked profile
    let (status, profile) = send(
        &app.router,
        request("POST", "/onboarding/complete", user_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["profile"]["is_locked"], true);
    assert_eq!(profile["profile"]["fitness_level"], "beginner");
    assert_eq!(profile["meal_plan"]["daily_calorie_target"], 1800);

    // At least one week got a template
    let stored = app
        .db
        .get_profile_by_user(user_id)
        .await
        .unwrap()
        .unwrap();
    let mut weeks_with_templates = 0;
    for week in 1..=4 {
        if app
            .db
            .get_active_template(stored.id, week)
            .await
            .unwrap()
            .is_some()
        {
            weeks_with_templates += 1;
        }
    }
    assert!(weeks_with_templates >= 1);
}

#[tokio::test]
async fn step_response_advertises_next_state() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/onboarding/step",
            user_id,
            Some(json!({"step": 1, "data": {"fitness_level": "beginner"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_step"], 1);
    assert_eq!(body["is_complete"], false);
    assert_eq!(body["next_state"], 2);
    assert_eq!(body["next_state_info"]["name"], "Fitness goals");
    assert_eq!(body["next_state_info"]["agent"], "workout");
}

#[tokio::test]
async fn macro_sum_rejection() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/onboarding/step",
            user_id,
            Some(json!({"step": 5, "data": {
                "daily_calorie_target": 2000,
                "protein_percentage": 30,
                "carbs_percentage": 40,
                "fats_percentage": 40,
            }})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert_eq!(body["field"], "macros");
}

#[tokio::test]
async fn completion_requires_all_steps() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    let (status, body) = send(
        &app.router,
        request("POST", "/onboarding/complete", user_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn agent_context_header_lands_in_history() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/onboarding/step")
        .header("X-User-Id", user_id.to_string())
        .header("X-Agent-Context", "workout")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(
            json!({"step": 1, "data": {"fitness_level": "beginner"}}).to_string(),
        ))
        .unwrap();
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);

    let state = app.db.get_onboarding_state(user_id).await.unwrap().unwrap();
    assert_eq!(state.agent_history.len(), 1);
    assert_eq!(state.agent_history[0].agent.as_deref(), Some("workout"));
}

#[tokio::test]
async fn users_me_reflects_onboarding_phase() {
    let app = test_app().await;
    seed_catalogue(&app).await;
    let user_id = register_user(&app).await;

    let (status, body) = send(&app.router, request("GET", "/users/me", user_id, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_control"]["chat"], true);
    assert_eq!(body["access_control"]["dashboard"], false);
    assert!(body["access_control"]["locked_features"]
        .as_array()
        .unwrap()
        .contains(&json!("workouts")));
    assert!(body["onboarding_progress"].is_object());

    submit_all_steps(&app, user_id).await;
    let (_, _) = send(
        &app.router,
        request("POST", "/onboarding/complete", user_id, None),
    )
    .await;

    let (_, body) = send(&app.router, request("GET", "/users/me", user_id, None)).await;
    assert_eq!(body["access_control"]["dashboard"], true);
    assert!(body["access_control"]["locked_features"]
        .as_array()
        .unwrap()
        .is_empty());
    assert!(body.get("onboarding_progress").is_none());
}

#[tokio::test]
async fn invalid_user_header_is_a_400() {
    let app = test_app().await;
    let req = axum::http::Request::builder()
        .method("GET")
        .uri("/onboarding/progress")
        .header("X-User-Id", "not-a-uuid")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}
