//! Agent context — immutable per-request snapshot of user state (C1).
//!
//! Built fresh for every request and never cached; all fields are private
//! behind getters, so once constructed the snapshot cannot be mutated.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ContextError, Error};
use crate::profile::model::{EnergyLevel, FitnessLevel, GoalType};
use crate::store::Database;

/// One conversation item carried in the context.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot handed to agents.
#[derive(Debug, Clone, Serialize)]
pub struct AgentContext {
    user_id: Uuid,
    fitness_level: FitnessLevel,
    primary_goal: GoalType,
    secondary_goal: Option<GoalType>,
    energy_level: EnergyLevel,
    current_workout_plan: serde_json::Value,
    current_meal_plan: serde_json::Value,
    conversation_history: Vec<HistoryItem>,
    loaded_at: DateTime<Utc>,
}

impl AgentContext {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn fitness_level(&self) -> FitnessLevel {
        self.fitness_level
    }

    pub fn primary_goal(&self) -> GoalType {
        self.primary_goal
    }

    pub fn secondary_goal(&self) -> Option<GoalType> {
        self.secondary_goal
    }

    pub fn energy_level(&self) -> EnergyLevel {
        self.energy_level
    }

    pub fn current_workout_plan(&self) -> &serde_json::Value {
        &self.current_workout_plan
    }

    pub fn current_meal_plan(&self) -> &serde_json::Value {
        &self.current_meal_plan
    }

    pub fn conversation_history(&self) -> &[HistoryItem] {
        &self.conversation_history
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Loads [`AgentContext`] snapshots.
pub struct ContextLoader {
    db: Arc<dyn Database>,
    history_window: usize,
}

impl ContextLoader {
    pub fn new(db: Arc<dyn Database>, history_window: usize) -> Self {
        Self { db, history_window }
    }

    /// Build the context for a user.
    ///
    /// `onboarding_mode` selects the partial projection: plan fields stay
    /// empty maps regardless of database state. Fails with
    /// `UserProfileNotFound` when no onboarding record exists.
    pub async fn load(
        &self,
        user_id: Uuid,
        include_history: bool,
        onboarding_mode: bool,
    ) -> Result<Arc<AgentContext>, Error> {
        let state = self
            .db
            .get_onboarding_state(user_id)
            .await?
            .ok_or(ContextError::UserProfileNotFound(user_id))?;

        let profile = self.db.get_profile_by_user(user_id).await?;

        // Fitness level: profile wins; during onboarding fall back to the
        // step-1 document; beginner otherwise.
        let step1 = state.step_document(1);
        let fitness_level = match &profile {
            Some(p) => p.fitness_level,
            None => step1
                .and_then(|d| d.get("fitness_level"))
                .and_then(|v| v.as_str())
                .and_then(|s| FitnessLevel::from_str(s).ok())
                .unwrap_or_default(),
        };

        let lifestyle_rating = match &profile {
            Some(p) => p.lifestyle_rating,
            None => step1
                .and_then(|d| d.get("lifestyle_rating"))
                .and_then(|v| v.as_i64()),
        };
        let energy_level = EnergyLevel::from_rating(lifestyle_rating);

        let (primary_goal, secondary_goal) = self.load_goals(&profile, &state).await?;

        let conversation_history = if include_history {
            let mut recent = self
                .db
                .recent_conversation_messages(user_id, self.history_window)
                .await?;
            // Store returns newest first; callers see chronological order.
            recent.reverse();
            recent
                .into_iter()
                .map(|m| HistoryItem {
                    role: m.role,
                    content: m.content,
                    agent_type: m.agent_type,
                    created_at: m.created_at,
                })
                .collect()
        } else {
            Vec::new()
        };

        let (current_workout_plan, current_meal_plan) = if onboarding_mode {
            // Caller promises plans do not exist yet.
            (serde_json::json!({}), serde_json::json!({}))
        } else {
            self.load_plans(&profile).await?
        };

        Ok(Arc::new(AgentContext {
            user_id,
            fitness_level,
            primary_goal,
            secondary_goal,
            energy_level,
            current_workout_plan,
            current_meal_plan,
            conversation_history,
            loaded_at: Utc::now(),
        }))
    }

    async fn load_goals(
        &self,
        profile: &Option<crate::profile::model::UserProfile>,
        state: &crate::onboarding::model::OnboardingState,
    ) -> Result<(GoalType, Option<GoalType>), Error> {
        if let Some(profile) = profile {
            let goals = self.db.get_fitness_goals(profile.id).await?;
            let primary = goals
                .first()
                .map(|g| g.goal_type)
                .unwrap_or(GoalType::GeneralFitness);
            let secondary = goals.iter().find(|g| g.priority == 2).map(|g| g.goal_type);
            return Ok((primary, secondary));
        }

        // No profile yet: read the step-2 document.
        let parsed: Vec<GoalType> = state
            .step_document(2)
            .and_then(|d| d.get("goals"))
            .and_then(|v| v.as_array())
            .map(|goals| {
                goals
                    .iter()
                    .filter_map(|g| g.get("goal_type"))
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| GoalType::from_str(s).ok())
                    .collect()
            })
            .unwrap_or_default();
        let primary = parsed.first().copied().unwrap_or(GoalType::GeneralFitness);
        let secondary = parsed.get(1).copied();
        Ok((primary, secondary))
    }

    async fn load_plans(
        &self,
        profile: &Option<crate::profile::model::UserProfile>,
    ) -> Result<(serde_json::Value, serde_json::Value), Error> {
        let Some(profile) = profile else {
            return Ok((serde_json::json!({}), serde_json::json!({})));
        };

        let workouts = self.db.get_workout_schedules(profile.id).await?;
        let workout_plan = if workouts.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::json!({
                "days": workouts
                    .iter()
                    .map(|w| serde_json::json!({
                        "schedule_id": w.id,
                        "day_of_week": w.day_of_week,
                        "scheduled_time": w.scheduled_time,
                    }))
                    .collect::<Vec<_>>(),
            })
        };

        let meal_plan = match self.db.get_meal_plan(profile.id).await? {
            Some(plan) => {
                let schedules = self.db.get_meal_schedules(profile.id).await?;
                serde_json::json!({
                    "daily_calorie_target": plan.daily_calorie_target,
                    "protein_percentage": plan.protein_percentage,
                    "carbs_percentage": plan.carbs_percentage,
                    "fats_percentage": plan.fats_percentage,
                    "meals": schedules
                        .iter()
                        .map(|s| serde_json::json!({
                            "meal_name": s.meal_name,
                            "scheduled_time": s.scheduled_time,
                        }))
                        .collect::<Vec<_>>(),
                })
            }
            None => serde_json::json!({}),
        };

        Ok((workout_plan, meal_plan))
    }
}
