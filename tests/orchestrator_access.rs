//! Access control and routing through the chat HTTP surface.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{register_user, request, send, submit_all_steps, test_app, TestApp};
use uuid::Uuid;

async fn complete_onboarding(app: &TestApp) -> Uuid {
    let user_id = register_user(app).await;
    submit_all_steps(app, user_id).await;
    let (status, _) = send(
        &app.router,
        request("POST", "/onboarding/complete", user_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    user_id
}

#[tokio::test]
async fn general_agent_forbidden_during_onboarding() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/onboarding",
            user_id,
            Some(json!({"message": "help me", "agent_type": "general"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "AGENT_NOT_ALLOWED");
    assert_eq!(body["reason"], "general_during_onboarding");
    let message = body["message"].as_str().unwrap().to_lowercase();
    assert!(message.contains("general"));
    assert!(message.contains("onboarding"));
}

#[tokio::test]
async fn regular_chat_forbidden_before_completion() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/chat",
            user_id,
            Some(json!({"message": "hello"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "ONBOARDING_REQUIRED");
    assert_eq!(body["reason"], "onboarding_not_completed");
}

#[tokio::test]
async fn onboarding_chat_forbidden_after_completion() {
    let app = test_app().await;
    let user_id = complete_onboarding(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/onboarding",
            user_id,
            Some(json!({"message": "one more step?"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "onboarding_already_completed");
}

#[tokio::test]
async fn specialised_agent_forbidden_after_completion() {
    let app = test_app().await;
    let user_id = complete_onboarding(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/chat",
            user_id,
            Some(json!({"message": "leg day plan", "agent_type": "workout"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "AGENT_NOT_ALLOWED");
    assert_eq!(body["reason"], "specialised_post_onboarding");
}

#[tokio::test]
async fn classified_workout_query_lands_on_general() {
    let app = test_app().await;
    let user_id = complete_onboarding(&app).await;

    // Classifier answers "workout"; the override must route to general
    app.llm.push_text("workout");
    app.llm.push_text("Your plan is one workout on Monday at 06:00.");

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/chat",
            user_id,
            Some(json!({"message": "what's my workout today?"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_type"], "general");
}

#[tokio::test]
async fn onboarding_default_agent_follows_current_step() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    // No steps saved: the step-1 owner (workout) answers
    app.llm.push_text("Let's talk about your fitness level.");
    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/onboarding",
            user_id,
            Some(json!({"message": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_type"], "workout");

    // After step 4 is current, the step-5 owner (diet) becomes the default
    for (step, data) in common::step_documents().into_iter().take(4) {
        let (status, _) = send(
            &app.router,
            request(
                "POST",
                "/onboarding/step",
                user_id,
                Some(json!({"step": step, "data": data})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    app.llm.push_text("Let's set your calories and macros.");
    let (_, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/onboarding",
            user_id,
            Some(json!({"message": "what's next?"})),
        ),
    )
    .await;
    assert_eq!(body["agent_type"], "diet");
}

#[tokio::test]
async fn message_length_is_enforced() {
    let app = test_app().await;
    let user_id = complete_onboarding(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/chat",
            user_id,
            Some(json!({"message": "x".repeat(2001)})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert_eq!(body["field"], "message");
}

#[tokio::test]
async fn unknown_agent_type_rejected() {
    let app = test_app().await;
    let user_id = complete_onboarding(&app).await;

    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/chat",
            user_id,
            Some(json!({"message": "hi", "agent_type": "wizard"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}
