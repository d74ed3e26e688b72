//! Conversation persistence, isolation, pagination, and clearing.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{register_user, request, send, submit_all_steps, test_app, TestApp};
use fitcoach::store::Database;
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
async fn chat_persists_exactly_two_rows_in_order() {
    let app = test_app().await;
    let user_id = complete_onboarding(&app).await;

    app.llm.push_text("general");
    app.llm.push_text("Here is your overview.");
    let (status, body) = send(
        &app.router,
        request(
            "POST",
            "/chat/chat",
            user_id,
            Some(json!({"message": "how am I doing?"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_type"], "general");

    let messages = app
        .db
        .list_conversation_messages(user_id, 10, 0)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "how am I doing?");
    assert!(messages[0].agent_type.is_none());
    assert_eq!(messages[1].role, "assistant");
    assert_eq!(messages[1].agent_type.as_deref(), Some("general"));
    assert!(messages[0].created_at <= messages[1].created_at);
}

#[tokio::test]
async fn failed_chat_persists_nothing() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    // Access violation before any agent runs
    let (status, _) = send(
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
    assert_eq!(
        app.db.count_conversation_messages(user_id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn history_pagination_is_chronological() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    for i in 0..7 {
        app.db
            .add_conversation_message(user_id, "user", &format!("m{i}"), None)
            .await
            .unwrap();
    }

    let (status, body) = send(
        &app.router,
        request("GET", "/chat/history?limit=3&offset=2", user_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 7);
    assert_eq!(body["limit"], 3);
    assert_eq!(body["offset"], 2);
    let contents: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m2", "m3", "m4"]);
}

#[tokio::test]
async fn history_is_isolated_per_user() {
    let app = test_app().await;
    let alice = register_user(&app).await;
    let bob = register_user(&app).await;

    app.db
        .add_conversation_message(alice, "user", "alice secret", None)
        .await
        .unwrap();
    app.db
        .add_conversation_message(bob, "user", "bob note", None)
        .await
        .unwrap();

    let (_, body) = send(&app.router, request("GET", "/chat/history", alice, None)).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["messages"][0]["content"], "alice secret");

    // Alice clearing her history leaves Bob's intact
    let (status, body) = send(
        &app.router,
        request("DELETE", "/chat/history", alice, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cleared");

    assert_eq!(app.db.count_conversation_messages(alice).await.unwrap(), 0);
    assert_eq!(app.db.count_conversation_messages(bob).await.unwrap(), 1);
}

#[tokio::test]
async fn onboarding_chat_also_persists_turns() {
    let app = test_app().await;
    let user_id = register_user(&app).await;

    app.llm.push_text("Welcome! What's your training background?");
    let (status, _) = send(
        &app.router,
        request(
            "POST",
            "/chat/onboarding",
            user_id,
            Some(json!({"message": "hi coach"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let messages = app
        .db
        .list_conversation_messages(user_id, 10, 0)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].agent_type.as_deref(), Some("workout"));
}
