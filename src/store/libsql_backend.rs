//! libSQL backend — async `Database` trait implementation.
//!
//! Local file and in-memory databases. All timestamps are RFC 3339 text;
//! list/document columns are JSON text rewritten wholesale on save; every
//! read filters `deleted_at IS NULL`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::meals::model::{Dish, MealTemplate, MealType, TemplateMeal};
use crate::onboarding::model::{AgentHistoryEntry, OnboardingState};
use crate::profile::model::{
    DietaryPreference, FitnessGoal, HydrationPreference, MealPlan, MealSchedule,
    PhysicalConstraint, ProfileVersion, UserProfile, WorkoutSchedule,
};
use crate::store::migrations;
use crate::store::traits::{
    ConversationMessage, Database, ReminderKind, UserRecord, WorkoutLog,
};

/// libSQL database backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn to_json_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

/// Convert `Option<&str>` to a libsql value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

/// Map a libsql error to our error type, detecting constraint violations.
fn map_db_err(e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.to_lowercase().contains("constraint") {
        DatabaseError::Constraint(message)
    } else {
        DatabaseError::Query(message)
    }
}

// ── Row mappers ─────────────────────────────────────────────────────

// Column order: 0:user_id, 1:current_step, 2:is_complete, 3:step_data,
// 4:agent_history, 5:created_at, 6:updated_at
const ONBOARDING_COLUMNS: &str =
    "user_id, current_step, is_complete, step_data, agent_history, created_at, updated_at";

fn row_to_onboarding_state(row: &libsql::Row) -> Result<OnboardingState, DatabaseError> {
    let user_id: String = row.get(0).map_err(map_db_err)?;
    let current_step: i64 = row.get(1).map_err(map_db_err)?;
    let is_complete: i64 = row.get(2).map_err(map_db_err)?;
    let step_data_str: String = row.get(3).map_err(map_db_err)?;
    let history_str: String = row.get(4).map_err(map_db_err)?;
    let created_str: String = row.get(5).map_err(map_db_err)?;
    let updated_str: String = row.get(6).map_err(map_db_err)?;

    let step_data = serde_json::from_str(&step_data_str)
        .map_err(|e| DatabaseError::Serialization(format!("step_data: {e}")))?;
    let agent_history: Vec<AgentHistoryEntry> = serde_json::from_str(&history_str)
        .map_err(|e| DatabaseError::Serialization(format!("agent_history: {e}")))?;

    Ok(OnboardingState {
        user_id: parse_uuid(&user_id),
        current_step: current_step as u8,
        is_complete: is_complete != 0,
        step_data,
        agent_history,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// 0:id, 1:user_id, 2:fitness_level, 3:lifestyle_rating, 4:is_locked,
// 5:created_at, 6:updated_at
const PROFILE_COLUMNS: &str =
    "id, user_id, fitness_level, lifestyle_rating, is_locked, created_at, updated_at";

fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let user_id: String = row.get(1).map_err(map_db_err)?;
    let fitness_level: String = row.get(2).map_err(map_db_err)?;
    let lifestyle_rating: Option<i64> = row.get(3).ok();
    let is_locked: i64 = row.get(4).map_err(map_db_err)?;
    let created_str: String = row.get(5).map_err(map_db_err)?;
    let updated_str: String = row.get(6).map_err(map_db_err)?;

    Ok(UserProfile {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        fitness_level: fitness_level
            .parse()
            .map_err(DatabaseError::Serialization)?,
        lifestyle_rating,
        is_locked: is_locked != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// 0:id, 1:profile_id, 2:goal_type, 3:priority, 4:target_weight_kg,
// 5:target_body_fat_percentage
const GOAL_COLUMNS: &str =
    "id, profile_id, goal_type, priority, target_weight_kg, target_body_fat_percentage";

fn row_to_goal(row: &libsql::Row) -> Result<FitnessGoal, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let goal_type: String = row.get(2).map_err(map_db_err)?;
    let priority: i64 = row.get(3).map_err(map_db_err)?;
    let target_weight_kg: Option<f64> = row.get(4).ok();
    let target_body_fat_percentage: Option<f64> = row.get(5).ok();

    Ok(FitnessGoal {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        goal_type: goal_type.parse().map_err(DatabaseError::Serialization)?,
        priority,
        target_weight_kg,
        target_body_fat_percentage,
    })
}

// 0:id, 1:profile_id, 2:constraint_type, 3:description, 4:severity
const CONSTRAINT_COLUMNS: &str = "id, profile_id, constraint_type, description, severity";

fn row_to_constraint(row: &libsql::Row) -> Result<PhysicalConstraint, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let constraint_type: String = row.get(2).map_err(map_db_err)?;
    let description: String = row.get(3).map_err(map_db_err)?;
    let severity: Option<String> = row.get(4).ok();

    Ok(PhysicalConstraint {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        constraint_type: constraint_type
            .parse()
            .map_err(DatabaseError::Serialization)?,
        description,
        severity: severity.and_then(|s| s.parse().ok()),
    })
}

// 0:id, 1:profile_id, 2:diet_type, 3:allergies, 4:intolerances, 5:dislikes
const DIETARY_COLUMNS: &str = "id, profile_id, diet_type, allergies, intolerances, dislikes";

fn row_to_dietary(row: &libsql::Row) -> Result<DietaryPreference, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let diet_type: String = row.get(2).map_err(map_db_err)?;
    let allergies: String = row.get(3).map_err(map_db_err)?;
    let intolerances: String = row.get(4).map_err(map_db_err)?;
    let dislikes: String = row.get(5).map_err(map_db_err)?;

    Ok(DietaryPreference {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        diet_type: diet_type.parse().map_err(DatabaseError::Serialization)?,
        allergies: parse_json_list(&allergies),
        intolerances: parse_json_list(&intolerances),
        dislikes: parse_json_list(&dislikes),
    })
}

// 0:id, 1:profile_id, 2:daily_calorie_target, 3:protein_percentage,
// 4:carbs_percentage, 5:fats_percentage
const MEAL_PLAN_COLUMNS: &str =
    "id, profile_id, daily_calorie_target, protein_percentage, carbs_percentage, fats_percentage";

fn row_to_meal_plan(row: &libsql::Row) -> Result<MealPlan, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let daily_calorie_target: i64 = row.get(2).map_err(map_db_err)?;
    let protein: String = row.get(3).map_err(map_db_err)?;
    let carbs: String = row.get(4).map_err(map_db_err)?;
    let fats: String = row.get(5).map_err(map_db_err)?;

    let parse_pct = |s: &str| {
        s.parse::<rust_decimal::Decimal>()
            .map_err(|e| DatabaseError::Serialization(format!("macro percentage: {e}")))
    };

    Ok(MealPlan {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        daily_calorie_target,
        protein_percentage: parse_pct(&protein)?,
        carbs_percentage: parse_pct(&carbs)?,
        fats_percentage: parse_pct(&fats)?,
    })
}

// 0:id, 1:profile_id, 2:meal_name, 3:scheduled_time, 4:enable_notifications
const MEAL_SCHEDULE_COLUMNS: &str =
    "id, profile_id, meal_name, scheduled_time, enable_notifications";

fn row_to_meal_schedule(row: &libsql::Row) -> Result<MealSchedule, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let meal_name: String = row.get(2).map_err(map_db_err)?;
    let scheduled_time: String = row.get(3).map_err(map_db_err)?;
    let enable_notifications: i64 = row.get(4).map_err(map_db_err)?;

    Ok(MealSchedule {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        meal_name,
        scheduled_time,
        enable_notifications: enable_notifications != 0,
    })
}

// 0:id, 1:profile_id, 2:day_of_week, 3:scheduled_time, 4:enable_notifications
const WORKOUT_SCHEDULE_COLUMNS: &str =
    "id, profile_id, day_of_week, scheduled_time, enable_notifications";

fn row_to_workout_schedule(row: &libsql::Row) -> Result<WorkoutSchedule, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let day_of_week: i64 = row.get(2).map_err(map_db_err)?;
    let scheduled_time: String = row.get(3).map_err(map_db_err)?;
    let enable_notifications: i64 = row.get(4).map_err(map_db_err)?;

    Ok(WorkoutSchedule {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        day_of_week,
        scheduled_time,
        enable_notifications: enable_notifications != 0,
    })
}

// 0:id, 1:profile_id, 2:daily_water_target_ml, 3:reminder_frequency_minutes,
// 4:enable_notifications
const HYDRATION_COLUMNS: &str =
    "id, profile_id, daily_water_target_ml, reminder_frequency_minutes, enable_notifications";

fn row_to_hydration(row: &libsql::Row) -> Result<HydrationPreference, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let daily_water_target_ml: i64 = row.get(2).map_err(map_db_err)?;
    let reminder_frequency_minutes: i64 = row.get(3).map_err(map_db_err)?;
    let enable_notifications: i64 = row.get(4).map_err(map_db_err)?;

    Ok(HydrationPreference {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        daily_water_target_ml,
        reminder_frequency_minutes,
        enable_notifications: enable_notifications != 0,
    })
}

// 0:id, 1:name, 2:meal_type, 3:serving_size_g, 4:calories, 5:protein_g,
// 6:carbs_g, 7:fats_g, 8:is_vegetarian, 9:is_vegan, 10:contains_red_meat,
// 11:contains_poultry, 12:contains_fish, 13:contains_allergens,
// 14:ingredients, 15:popularity_score, 16:is_active
const DISH_COLUMNS: &str = "id, name, meal_type, serving_size_g, calories, protein_g, carbs_g, \
     fats_g, is_vegetarian, is_vegan, contains_red_meat, contains_poultry, contains_fish, \
     contains_allergens, ingredients, popularity_score, is_active";

fn row_to_dish(row: &libsql::Row) -> Result<Dish, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let name: String = row.get(1).map_err(map_db_err)?;
    let meal_type: String = row.get(2).map_err(map_db_err)?;
    let serving_size_g: f64 = row.get(3).map_err(map_db_err)?;
    let calories: f64 = row.get(4).map_err(map_db_err)?;
    let protein_g: f64 = row.get(5).map_err(map_db_err)?;
    let carbs_g: f64 = row.get(6).map_err(map_db_err)?;
    let fats_g: f64 = row.get(7).map_err(map_db_err)?;
    let is_vegetarian: i64 = row.get(8).map_err(map_db_err)?;
    let is_vegan: i64 = row.get(9).map_err(map_db_err)?;
    let contains_red_meat: i64 = row.get(10).map_err(map_db_err)?;
    let contains_poultry: i64 = row.get(11).map_err(map_db_err)?;
    let contains_fish: i64 = row.get(12).map_err(map_db_err)?;
    let contains_allergens: String = row.get(13).map_err(map_db_err)?;
    let ingredients: String = row.get(14).map_err(map_db_err)?;
    let popularity_score: f64 = row.get(15).map_err(map_db_err)?;
    let is_active: i64 = row.get(16).map_err(map_db_err)?;

    Ok(Dish {
        id: parse_uuid(&id),
        name,
        meal_type: meal_type.parse().map_err(DatabaseError::Serialization)?,
        serving_size_g,
        calories,
        protein_g,
        carbs_g,
        fats_g,
        is_vegetarian: is_vegetarian != 0,
        is_vegan: is_vegan != 0,
        contains_red_meat: contains_red_meat != 0,
        contains_poultry: contains_poultry != 0,
        contains_fish: contains_fish != 0,
        contains_allergens: parse_json_list(&contains_allergens),
        ingredients: parse_json_list(&ingredients),
        popularity_score,
        is_active: is_active != 0,
    })
}

// 0:id, 1:profile_id, 2:week_number, 3:is_active, 4:generated_by,
// 5:generation_reason, 6:created_at
const TEMPLATE_COLUMNS: &str =
    "id, profile_id, week_number, is_active, generated_by, generation_reason, created_at";

fn row_to_template(row: &libsql::Row) -> Result<MealTemplate, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let week_number: i64 = row.get(2).map_err(map_db_err)?;
    let is_active: i64 = row.get(3).map_err(map_db_err)?;
    let generated_by: String = row.get(4).map_err(map_db_err)?;
    let generation_reason: Option<String> = row.get(5).ok();
    let created_str: String = row.get(6).map_err(map_db_err)?;

    Ok(MealTemplate {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        week_number,
        is_active: is_active != 0,
        generated_by,
        generation_reason,
        created_at: parse_datetime(&created_str),
    })
}

// 0:id, 1:template_id, 2:meal_schedule_id, 3:dish_id, 4:day_of_week,
// 5:is_primary, 6:alternative_order
const TEMPLATE_MEAL_COLUMNS: &str =
    "id, template_id, meal_schedule_id, dish_id, day_of_week, is_primary, alternative_order";

fn row_to_template_meal(row: &libsql::Row) -> Result<TemplateMeal, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let template_id: String = row.get(1).map_err(map_db_err)?;
    let meal_schedule_id: String = row.get(2).map_err(map_db_err)?;
    let dish_id: String = row.get(3).map_err(map_db_err)?;
    let day_of_week: i64 = row.get(4).map_err(map_db_err)?;
    let is_primary: i64 = row.get(5).map_err(map_db_err)?;
    let alternative_order: i64 = row.get(6).map_err(map_db_err)?;

    Ok(TemplateMeal {
        id: parse_uuid(&id),
        template_id: parse_uuid(&template_id),
        meal_schedule_id: parse_uuid(&meal_schedule_id),
        dish_id: parse_uuid(&dish_id),
        day_of_week,
        is_primary: is_primary != 0,
        alternative_order,
    })
}

// 0:id, 1:user_id, 2:role, 3:content, 4:agent_type, 5:created_at
const MESSAGE_COLUMNS: &str = "id, user_id, role, content, agent_type, created_at";

fn row_to_message(row: &libsql::Row) -> Result<ConversationMessage, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let user_id: String = row.get(1).map_err(map_db_err)?;
    let role: String = row.get(2).map_err(map_db_err)?;
    let content: String = row.get(3).map_err(map_db_err)?;
    let agent_type: Option<String> = row.get(4).ok();
    let created_str: String = row.get(5).map_err(map_db_err)?;

    Ok(ConversationMessage {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        role,
        content,
        agent_type,
        created_at: parse_datetime(&created_str),
    })
}

// 0:id, 1:profile_id, 2:exercise, 3:set_number, 4:reps, 5:weight_kg, 6:logged_at
const WORKOUT_LOG_COLUMNS: &str =
    "id, profile_id, exercise, set_number, reps, weight_kg, logged_at";

fn row_to_workout_log(row: &libsql::Row) -> Result<WorkoutLog, DatabaseError> {
    let id: String = row.get(0).map_err(map_db_err)?;
    let profile_id: String = row.get(1).map_err(map_db_err)?;
    let exercise: String = row.get(2).map_err(map_db_err)?;
    let set_number: i64 = row.get(3).map_err(map_db_err)?;
    let reps: i64 = row.get(4).map_err(map_db_err)?;
    let weight_kg: Option<f64> = row.get(5).ok();
    let logged_str: String = row.get(6).map_err(map_db_err)?;

    Ok(WorkoutLog {
        id: parse_uuid(&id),
        profile_id: parse_uuid(&profile_id),
        exercise,
        set_number,
        reps,
        weight_kg,
        logged_at: parse_datetime(&logged_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn begin(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), DatabaseError> {
        self.conn().execute("COMMIT", ()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("ROLLBACK", ())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn register_user(&self, id: Uuid, display_name: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO users (id, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![id.to_string(), display_name, now.clone()],
            )
            .await
            .map_err(map_db_err)?;
        self.conn()
            .execute(
                "INSERT INTO onboarding_states (user_id, current_step, is_complete, step_data,
                     agent_history, created_at, updated_at)
                 VALUES (?1, 0, 0, '{}', '[]', ?2, ?2)",
                params![id.to_string(), now],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, display_name, created_at FROM users
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => {
                let id: String = row.get(0).map_err(map_db_err)?;
                let display_name: String = row.get(1).map_err(map_db_err)?;
                let created_str: String = row.get(2).map_err(map_db_err)?;
                Ok(Some(UserRecord {
                    id: parse_uuid(&id),
                    display_name,
                    created_at: parse_datetime(&created_str),
                }))
            }
            None => Ok(None),
        }
    }

    async fn get_onboarding_state(
        &self,
        user_id: Uuid,
    ) -> Result<Option<OnboardingState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ONBOARDING_COLUMNS} FROM onboarding_states
                     WHERE user_id = ?1 AND deleted_at IS NULL"
                ),
                params![user_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_onboarding_state(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_onboarding_state(&self, state: &OnboardingState) -> Result<(), DatabaseError> {
        let step_data = serde_json::to_string(&state.step_data)
            .map_err(|e| DatabaseError::Serialization(format!("step_data: {e}")))?;
        let agent_history = serde_json::to_string(&state.agent_history)
            .map_err(|e| DatabaseError::Serialization(format!("agent_history: {e}")))?;

        let affected = self
            .conn()
            .execute(
                "UPDATE onboarding_states
                 SET current_step = ?2, is_complete = ?3, step_data = ?4,
                     agent_history = ?5, updated_at = ?6
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![
                    state.user_id.to_string(),
                    state.current_step as i64,
                    state.is_complete as i64,
                    step_data,
                    agent_history,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(map_db_err)?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "onboarding_state".to_string(),
                id: state.user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO user_profiles (id, user_id, fitness_level, lifestyle_rating,
                     is_locked, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    profile.id.to_string(),
                    profile.user_id.to_string(),
                    profile.fitness_level.as_str(),
                    opt_int(profile.lifestyle_rating),
                    profile.is_locked as i64,
                    profile.created_at.to_rfc3339(),
                    profile.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM user_profiles
                     WHERE user_id = ?1 AND deleted_at IS NULL"
                ),
                params![user_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_profile(&self, profile_id: Uuid) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM user_profiles
                     WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    async fn set_profile_locked(
        &self,
        profile_id: Uuid,
        locked: bool,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE user_profiles SET is_locked = ?2, updated_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![
                    profile_id.to_string(),
                    locked as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn insert_fitness_goal(&self, goal: &FitnessGoal) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO fitness_goals (id, profile_id, goal_type, priority,
                     target_weight_kg, target_body_fat_percentage, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    goal.id.to_string(),
                    goal.profile_id.to_string(),
                    goal.goal_type.as_str(),
                    goal.priority,
                    opt_real(goal.target_weight_kg),
                    opt_real(goal.target_body_fat_percentage),
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_fitness_goals(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<FitnessGoal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {GOAL_COLUMNS} FROM fitness_goals
                     WHERE profile_id = ?1 AND deleted_at IS NULL
                     ORDER BY priority ASC"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        let mut goals = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            goals.push(row_to_goal(&row)?);
        }
        Ok(goals)
    }

    async fn insert_physical_constraint(
        &self,
        constraint: &PhysicalConstraint,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO physical_constraints (id, profile_id, constraint_type,
                     description, severity, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    constraint.id.to_string(),
                    constraint.profile_id.to_string(),
                    constraint.constraint_type.as_str(),
                    constraint.description.clone(),
                    opt_text(constraint.severity.map(|s| s.as_str())),
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_physical_constraints(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<PhysicalConstraint>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONSTRAINT_COLUMNS} FROM physical_constraints
                     WHERE profile_id = ?1 AND deleted_at IS NULL
                     ORDER BY created_at ASC"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        let mut constraints = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            constraints.push(row_to_constraint(&row)?);
        }
        Ok(constraints)
    }

    async fn insert_dietary_preference(
        &self,
        preference: &DietaryPreference,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO dietary_preferences (id, profile_id, diet_type, allergies,
                     intolerances, dislikes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    preference.id.to_string(),
                    preference.profile_id.to_string(),
                    preference.diet_type.as_str(),
                    to_json_list(&preference.allergies),
                    to_json_list(&preference.intolerances),
                    to_json_list(&preference.dislikes),
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_dietary_preference(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<DietaryPreference>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DIETARY_COLUMNS} FROM dietary_preferences
                     WHERE profile_id = ?1 AND deleted_at IS NULL"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_dietary(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_meal_plan(&self, plan: &MealPlan) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO meal_plans (id, profile_id, daily_calorie_target,
                     protein_percentage, carbs_percentage, fats_percentage,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    plan.id.to_string(),
                    plan.profile_id.to_string(),
                    plan.daily_calorie_target,
                    plan.protein_percentage.to_string(),
                    plan.carbs_percentage.to_string(),
                    plan.fats_percentage.to_string(),
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_meal_plan(&self, profile_id: Uuid) -> Result<Option<MealPlan>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MEAL_PLAN_COLUMNS} FROM meal_plans
                     WHERE profile_id = ?1 AND deleted_at IS NULL"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_meal_plan(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_meal_schedule(&self, schedule: &MealSchedule) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO meal_schedules (id, profile_id, meal_name, scheduled_time,
                     enable_notifications, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    schedule.id.to_string(),
                    schedule.profile_id.to_string(),
                    schedule.meal_name.clone(),
                    schedule.scheduled_time.clone(),
                    schedule.enable_notifications as i64,
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_meal_schedules(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<MealSchedule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MEAL_SCHEDULE_COLUMNS} FROM meal_schedules
                     WHERE profile_id = ?1 AND deleted_at IS NULL
                     ORDER BY scheduled_time ASC"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        let mut schedules = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            schedules.push(row_to_meal_schedule(&row)?);
        }
        Ok(schedules)
    }

    async fn insert_workout_schedule(
        &self,
        schedule: &WorkoutSchedule,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO workout_schedules (id, profile_id, day_of_week, scheduled_time,
                     enable_notifications, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    schedule.id.to_string(),
                    schedule.profile_id.to_string(),
                    schedule.day_of_week,
                    schedule.scheduled_time.clone(),
                    schedule.enable_notifications as i64,
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_workout_schedules(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<WorkoutSchedule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {WORKOUT_SCHEDULE_COLUMNS} FROM workout_schedules
                     WHERE profile_id = ?1 AND deleted_at IS NULL
                     ORDER BY day_of_week ASC"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        let mut schedules = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            schedules.push(row_to_workout_schedule(&row)?);
        }
        Ok(schedules)
    }

    async fn get_workout_schedule(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkoutSchedule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {WORKOUT_SCHEDULE_COLUMNS} FROM workout_schedules
                     WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_workout_schedule(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_workout_schedule_slot(
        &self,
        id: Uuid,
        new_day: i64,
        new_time: &str,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE workout_schedules SET day_of_week = ?2, scheduled_time = ?3,
                     updated_at = ?4
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id.to_string(), new_day, new_time, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(map_db_err)?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "workout_schedule".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_schedule_notifications(
        &self,
        profile_id: Uuid,
        kind: ReminderKind,
        enabled: bool,
    ) -> Result<usize, DatabaseError> {
        let table = match kind {
            ReminderKind::Workout => "workout_schedules",
            ReminderKind::Meal => "meal_schedules",
            ReminderKind::Hydration => "hydration_preferences",
        };
        let affected = self
            .conn()
            .execute(
                &format!(
                    "UPDATE {table} SET enable_notifications = ?2, updated_at = ?3
                     WHERE profile_id = ?1 AND deleted_at IS NULL"
                ),
                params![
                    profile_id.to_string(),
                    enabled as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(affected as usize)
    }

    async fn insert_hydration_preference(
        &self,
        preference: &HydrationPreference,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO hydration_preferences (id, profile_id, daily_water_target_ml,
                     reminder_frequency_minutes, enable_notifications, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    preference.id.to_string(),
                    preference.profile_id.to_string(),
                    preference.daily_water_target_ml,
                    preference.reminder_frequency_minutes,
                    preference.enable_notifications as i64,
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_hydration_preference(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<HydrationPreference>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {HYDRATION_COLUMNS} FROM hydration_preferences
                     WHERE profile_id = ?1 AND deleted_at IS NULL"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_hydration(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_profile_version(
        &self,
        version: &ProfileVersion,
    ) -> Result<(), DatabaseError> {
        let snapshot = serde_json::to_string(&version.snapshot)
            .map_err(|e| DatabaseError::Serialization(format!("snapshot: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO profile_versions (id, profile_id, version, reason, snapshot,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    version.id.to_string(),
                    version.profile_id.to_string(),
                    version.version,
                    version.reason.clone(),
                    snapshot,
                    version.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn insert_dish(&self, dish: &Dish) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO dishes (id, name, meal_type, serving_size_g, calories, protein_g,
                     carbs_g, fats_g, is_vegetarian, is_vegan, contains_red_meat,
                     contains_poultry, contains_fish, contains_allergens, ingredients,
                     popularity_score, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?18)",
                params![
                    dish.id.to_string(),
                    dish.name.clone(),
                    dish.meal_type.as_str(),
                    dish.serving_size_g,
                    dish.calories,
                    dish.protein_g,
                    dish.carbs_g,
                    dish.fats_g,
                    dish.is_vegetarian as i64,
                    dish.is_vegan as i64,
                    dish.contains_red_meat as i64,
                    dish.contains_poultry as i64,
                    dish.contains_fish as i64,
                    to_json_list(&dish.contains_allergens),
                    to_json_list(&dish.ingredients),
                    dish.popularity_score,
                    dish.is_active as i64,
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn dishes_by_meal_type(
        &self,
        meal_type: MealType,
    ) -> Result<Vec<Dish>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DISH_COLUMNS} FROM dishes
                     WHERE meal_type = ?1 AND is_active = 1 AND deleted_at IS NULL"
                ),
                params![meal_type.as_str()],
            )
            .await
            .map_err(map_db_err)?;
        let mut dishes = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            dishes.push(row_to_dish(&row)?);
        }
        Ok(dishes)
    }

    async fn get_dish(&self, id: Uuid) -> Result<Option<Dish>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DISH_COLUMNS} FROM dishes
                     WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_dish(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_meal_template(&self, template: &MealTemplate) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO meal_templates (id, profile_id, week_number, is_active,
                     generated_by, generation_reason, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    template.id.to_string(),
                    template.profile_id.to_string(),
                    template.week_number,
                    template.is_active as i64,
                    template.generated_by.clone(),
                    opt_text(template.generation_reason.as_deref()),
                    template.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn insert_template_meal(&self, meal: &TemplateMeal) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO template_meals (id, template_id, meal_schedule_id, dish_id,
                     day_of_week, is_primary, alternative_order, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    meal.id.to_string(),
                    meal.template_id.to_string(),
                    meal.meal_schedule_id.to_string(),
                    meal.dish_id.to_string(),
                    meal.day_of_week,
                    meal.is_primary as i64,
                    meal.alternative_order,
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn set_template_active(
        &self,
        template_id: Uuid,
        active: bool,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE meal_templates SET is_active = ?2, updated_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![
                    template_id.to_string(),
                    active as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn delete_meal_template(&self, template_id: Uuid) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE template_meals SET deleted_at = ?2, updated_at = ?2
                 WHERE template_id = ?1 AND deleted_at IS NULL",
                params![template_id.to_string(), now.clone()],
            )
            .await
            .map_err(map_db_err)?;
        self.conn()
            .execute(
                "UPDATE meal_templates SET deleted_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![template_id.to_string(), now],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn deactivate_meal_templates(
        &self,
        profile_id: Uuid,
        week_number: i64,
    ) -> Result<usize, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE meal_templates SET is_active = 0, updated_at = ?3
                 WHERE profile_id = ?1 AND week_number = ?2 AND is_active = 1
                     AND deleted_at IS NULL",
                params![
                    profile_id.to_string(),
                    week_number,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(affected as usize)
    }

    async fn get_active_template(
        &self,
        profile_id: Uuid,
        week_number: i64,
    ) -> Result<Option<MealTemplate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TEMPLATE_COLUMNS} FROM meal_templates
                     WHERE profile_id = ?1 AND week_number = ?2 AND is_active = 1
                         AND deleted_at IS NULL"
                ),
                params![profile_id.to_string(), week_number],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_template(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_template_meals(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<TemplateMeal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TEMPLATE_MEAL_COLUMNS} FROM template_meals
                     WHERE template_id = ?1 AND deleted_at IS NULL
                     ORDER BY day_of_week, meal_schedule_id, alternative_order"
                ),
                params![template_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        let mut meals = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            meals.push(row_to_template_meal(&row)?);
        }
        Ok(meals)
    }

    async fn add_conversation_message(
        &self,
        user_id: Uuid,
        role: &str,
        content: &str,
        agent_type: Option<&str>,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO conversation_messages (id, user_id, role, content, agent_type,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id.to_string(),
                    user_id.to_string(),
                    role,
                    content,
                    opt_text(agent_type),
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(id)
    }

    async fn recent_conversation_messages(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM conversation_messages
                     WHERE user_id = ?1 AND deleted_at IS NULL
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                ),
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(map_db_err)?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn list_conversation_messages(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM conversation_messages
                     WHERE user_id = ?1 AND deleted_at IS NULL
                     ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3"
                ),
                params![user_id.to_string(), limit as i64, offset as i64],
            )
            .await
            .map_err(map_db_err)?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_db_err)? {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn count_conversation_messages(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM conversation_messages
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![user_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => {
                let count: i64 = row.get(0).map_err(map_db_err)?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }

    async fn clear_conversation_messages(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE conversation_messages SET deleted_at = ?2, updated_at = ?2
                 WHERE user_id = ?1 AND deleted_at IS NULL",
                params![user_id.to_string(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(map_db_err)?;
        Ok(affected)
    }

    async fn insert_workout_log(&self, log: &WorkoutLog) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO workout_logs (id, profile_id, exercise, set_number, reps,
                     weight_kg, logged_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    log.id.to_string(),
                    log.profile_id.to_string(),
                    log.exercise.clone(),
                    log.set_number,
                    log.reps,
                    opt_real(log.weight_kg),
                    log.logged_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn last_workout_log(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<WorkoutLog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {WORKOUT_LOG_COLUMNS} FROM workout_logs
                     WHERE profile_id = ?1 AND deleted_at IS NULL
                     ORDER BY logged_at DESC LIMIT 1"
                ),
                params![profile_id.to_string()],
            )
            .await
            .map_err(map_db_err)?;
        match rows.next().await.map_err(map_db_err)? {
            Some(row) => Ok(Some(row_to_workout_log(&row)?)),
            None => Ok(None),
        }
    }
}
