//! Unified `Database` trait — single async interface for all persistence.
//!
//! One backend-agnostic seam covering users, onboarding state, the
//! materialised profile and its children, the dish catalogue, meal
//! templates, and conversation history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::meals::model::{Dish, MealTemplate, MealType, TemplateMeal};
use crate::onboarding::model::OnboardingState;
use crate::profile::model::{
    DietaryPreference, FitnessGoal, HydrationPreference, MealPlan, MealSchedule,
    PhysicalConstraint, ProfileVersion, UserProfile, WorkoutSchedule,
};

/// A registered user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted conversation message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    /// "user", "assistant", or "system".
    pub role: String,
    pub content: String,
    /// Populated only on assistant rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A logged workout set.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkoutLog {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub exercise: String,
    pub set_number: i64,
    pub reps: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    pub logged_at: DateTime<Utc>,
}

/// Schedule kinds whose notification flags can be flipped in bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Workout,
    Meal,
    Hydration,
}

impl std::str::FromStr for ReminderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workout" => Ok(Self::Workout),
            "meal" => Ok(Self::Meal),
            "hydration" => Ok(Self::Hydration),
            other => Err(format!("unknown reminder type: {other}")),
        }
    }
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Transactions ────────────────────────────────────────────────
    //
    // Scoped to the per-request connection; nothing holds a transaction
    // across an LLM suspension point.

    async fn begin(&self) -> Result<(), DatabaseError>;
    async fn commit(&self) -> Result<(), DatabaseError>;
    async fn rollback(&self) -> Result<(), DatabaseError>;

    // ── Users & onboarding state ────────────────────────────────────

    /// Create a user and their empty onboarding state.
    async fn register_user(&self, id: Uuid, display_name: &str) -> Result<(), DatabaseError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError>;

    async fn get_onboarding_state(
        &self,
        user_id: Uuid,
    ) -> Result<Option<OnboardingState>, DatabaseError>;

    /// Persist the full state row. The `step_data` and `agent_history`
    /// document columns are rewritten wholesale on every save.
    async fn save_onboarding_state(&self, state: &OnboardingState) -> Result<(), DatabaseError>;

    // ── Profile & children ──────────────────────────────────────────

    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError>;
    async fn get_profile_by_user(&self, user_id: Uuid)
        -> Result<Option<UserProfile>, DatabaseError>;
    async fn get_profile(&self, profile_id: Uuid) -> Result<Option<UserProfile>, DatabaseError>;
    async fn set_profile_locked(&self, profile_id: Uuid, locked: bool)
        -> Result<(), DatabaseError>;

    async fn insert_fitness_goal(&self, goal: &FitnessGoal) -> Result<(), DatabaseError>;
    /// Goals ordered by priority ascending.
    async fn get_fitness_goals(&self, profile_id: Uuid)
        -> Result<Vec<FitnessGoal>, DatabaseError>;

    async fn insert_physical_constraint(
        &self,
        constraint: &PhysicalConstraint,
    ) -> Result<(), DatabaseError>;
    async fn get_physical_constraints(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<PhysicalConstraint>, DatabaseError>;

    async fn insert_dietary_preference(
        &self,
        preference: &DietaryPreference,
    ) -> Result<(), DatabaseError>;
    async fn get_dietary_preference(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<DietaryPreference>, DatabaseError>;

    async fn insert_meal_plan(&self, plan: &MealPlan) -> Result<(), DatabaseError>;
    async fn get_meal_plan(&self, profile_id: Uuid) -> Result<Option<MealPlan>, DatabaseError>;

    async fn insert_meal_schedule(&self, schedule: &MealSchedule) -> Result<(), DatabaseError>;
    /// Schedules ordered by scheduled time.
    async fn get_meal_schedules(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<MealSchedule>, DatabaseError>;

    async fn insert_workout_schedule(
        &self,
        schedule: &WorkoutSchedule,
    ) -> Result<(), DatabaseError>;
    /// Schedules ordered by day of week.
    async fn get_workout_schedules(
        &self,
        profile_id: Uuid,
    ) -> Result<Vec<WorkoutSchedule>, DatabaseError>;
    async fn get_workout_schedule(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkoutSchedule>, DatabaseError>;
    async fn update_workout_schedule_slot(
        &self,
        id: Uuid,
        new_day: i64,
        new_time: &str,
    ) -> Result<(), DatabaseError>;

    /// Flip `enable_notifications` on all schedules of the given kind.
    /// Returns the number of rows updated.
    async fn set_schedule_notifications(
        &self,
        profile_id: Uuid,
        kind: ReminderKind,
        enabled: bool,
    ) -> Result<usize, DatabaseError>;

    async fn insert_hydration_preference(
        &self,
        preference: &HydrationPreference,
    ) -> Result<(), DatabaseError>;
    async fn get_hydration_preference(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<HydrationPreference>, DatabaseError>;

    async fn insert_profile_version(&self, version: &ProfileVersion)
        -> Result<(), DatabaseError>;

    // ── Dish catalogue (shared, read-only at request time) ──────────

    async fn insert_dish(&self, dish: &Dish) -> Result<(), DatabaseError>;
    /// Active dishes of the given meal type.
    async fn dishes_by_meal_type(&self, meal_type: MealType)
        -> Result<Vec<Dish>, DatabaseError>;
    async fn get_dish(&self, id: Uuid) -> Result<Option<Dish>, DatabaseError>;

    // ── Meal templates ──────────────────────────────────────────────

    async fn insert_meal_template(&self, template: &MealTemplate)
        -> Result<(), DatabaseError>;
    async fn insert_template_meal(&self, meal: &TemplateMeal) -> Result<(), DatabaseError>;
    /// Flip a template's `is_active` flag.
    async fn set_template_active(
        &self,
        template_id: Uuid,
        active: bool,
    ) -> Result<(), DatabaseError>;
    /// Soft-delete a template and its meals (compensation for a failed
    /// generation).
    async fn delete_meal_template(&self, template_id: Uuid) -> Result<(), DatabaseError>;
    /// Deactivate every active template for `(profile_id, week_number)`.
    /// Runs before inserting a replacement so the partial unique index on
    /// active templates never trips. Returns the number deactivated.
    async fn deactivate_meal_templates(
        &self,
        profile_id: Uuid,
        week_number: i64,
    ) -> Result<usize, DatabaseError>;
    async fn get_active_template(
        &self,
        profile_id: Uuid,
        week_number: i64,
    ) -> Result<Option<MealTemplate>, DatabaseError>;
    async fn get_template_meals(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<TemplateMeal>, DatabaseError>;

    // ── Conversation history ────────────────────────────────────────

    /// Append one message; returns its id.
    async fn add_conversation_message(
        &self,
        user_id: Uuid,
        role: &str,
        content: &str,
        agent_type: Option<&str>,
    ) -> Result<Uuid, DatabaseError>;

    /// Newest `limit` messages for the user, newest first.
    async fn recent_conversation_messages(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, DatabaseError>;

    /// Chronological page (oldest → newest).
    async fn list_conversation_messages(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationMessage>, DatabaseError>;

    async fn count_conversation_messages(&self, user_id: Uuid) -> Result<u64, DatabaseError>;

    /// Soft-delete all messages for the user. Returns the count removed.
    async fn clear_conversation_messages(&self, user_id: Uuid) -> Result<u64, DatabaseError>;

    // ── Workout logs ────────────────────────────────────────────────

    async fn insert_workout_log(&self, log: &WorkoutLog) -> Result<(), DatabaseError>;
    async fn last_workout_log(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<WorkoutLog>, DatabaseError>;
}
