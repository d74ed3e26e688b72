//! Shared fixtures for the integration suites: in-memory backend, scripted
//! LLM, and HTTP plumbing through the real router.
#![allow(dead_code)] // each suite uses its own subset

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use fitcoach::config::AppConfig;
use fitcoach::llm::{LlmProvider, ScriptedLlm};
use fitcoach::meals::model::{Dish, MealType};
use fitcoach::server::{build_router, AppState};
use fitcoach::store::{Database, LibSqlBackend};

pub struct TestApp {
    pub router: Router,
    pub db: Arc<dyn Database>,
    pub llm: Arc<ScriptedLlm>,
}

pub async fn test_app() -> TestApp {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let llm = Arc::new(ScriptedLlm::new());
    let state = AppState {
        db: Arc::clone(&db),
        llm: llm.clone() as Arc<dyn LlmProvider>,
        config: Arc::new(AppConfig::default()),
    };
    TestApp {
        router: build_router(state),
        db,
        llm,
    }
}

pub async fn register_user(app: &TestApp) -> Uuid {
    let user_id = Uuid::new_v4();
    app.db.register_user(user_id, "Test User").await.unwrap();
    user_id
}

pub fn request(method: &str, uri: &str, user_id: Uuid, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-User-Id", user_id.to_string())
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Valid documents for all nine steps (vegetarian, 1800 kcal, three meals).
pub fn step_documents() -> [(u8, Value); 9] {
    [
        (1, json!({"fitness_level": "beginner"})),
        (2, json!({"goals": [{"goal_type": "general_fitness"}]})),
        (3, json!({"equipment": [], "injuries": [], "limitations": []})),
        (4, json!({"diet_type": "vegetarian", "allergies": [],
            "intolerances": [], "dislikes": []})),
        (5, json!({"daily_calorie_target": 1800, "protein_percentage": 25,
            "carbs_percentage": 50, "fats_percentage": 25})),
        (6, json!({"meals": [
            {"meal_name": "Breakfast", "scheduled_time": "07:00"},
            {"meal_name": "Lunch", "scheduled_time": "12:00"},
            {"meal_name": "Dinner", "scheduled_time": "18:00"},
        ]})),
        (7, json!({"workouts": [{"day_of_week": 0, "scheduled_time": "06:00"}]})),
        (8, json!({"daily_water_target_ml": 2000})),
        (9, json!({"interested_in_supplements": false})),
    ]
}

pub async fn submit_all_steps(app: &TestApp, user_id: Uuid) {
    for (step, data) in step_documents() {
        let (status, body) = send(
            &app.router,
            request(
                "POST",
                "/onboarding/step",
                user_id,
                Some(json!({"step": step, "data": data})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "step {step} failed: {body}");
    }
}

/// A dish builder with sane defaults for catalogue seeding.
pub fn dish(name: &str, meal_type: MealType, calories: f64, protein: f64) -> Dish {
    Dish {
        id: Uuid::new_v4(),
        name: name.to_string(),
        meal_type,
        serving_size_g: 300.0,
        calories,
        protein_g: protein,
        carbs_g: 45.0,
        fats_g: 14.0,
        is_vegetarian: true,
        is_vegan: true,
        contains_red_meat: false,
        contains_poultry: false,
        contains_fish: false,
        contains_allergens: Vec::new(),
        ingredients: Vec::new(),
        popularity_score: 5.0,
        is_active: true,
    }
}

/// Seed three dishes per named slot around a 1800 kcal / 25 % protein plan.
pub async fn seed_catalogue(app: &TestApp) {
    // Targets: breakfast 540 kcal, lunch 630, dinner 540; ~34 g protein each
    for (i, cal) in [545.0, 550.0, 560.0].iter().enumerate() {
        app.db
            .insert_dish(&dish(&format!("breakfast {i}"), MealType::Breakfast, *cal, 34.0))
            .await
            .unwrap();
    }
    for (i, cal) in [635.0, 640.0, 650.0].iter().enumerate() {
        app.db
            .insert_dish(&dish(&format!("lunch {i}"), MealType::Lunch, *cal, 34.0))
            .await
            .unwrap();
    }
    for (i, cal) in [545.0, 550.0, 555.0].iter().enumerate() {
        app.db
            .insert_dish(&dish(&format!("dinner {i}"), MealType::Dinner, *cal, 34.0))
            .await
            .unwrap();
    }
}
