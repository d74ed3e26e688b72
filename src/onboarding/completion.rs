//! Profile materialiser (C3) — one-transaction onboarding completion.
//!
//! Turns the nine accumulated step documents into the locked relational
//! profile, generates the four weekly meal templates best-effort, snapshots
//! everything into a `ProfileVersion`, and freezes the onboarding state.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, OnboardingError};
use crate::meals::TemplateGenerator;
use crate::onboarding::model::{OnboardingState, STEP_COUNT};
use crate::onboarding::validators::normalize_time;
use crate::profile::model::{
    ConstraintType, DietaryPreference, DietType, FitnessGoal, FitnessLevel, FullProfile,
    GoalType, HydrationPreference, MealPlan, MealSchedule, PhysicalConstraint, ProfileVersion,
    Severity, UserProfile, WorkoutSchedule,
};
use crate::store::Database;

/// Default hydration reminder cadence when step 8 leaves it out.
const DEFAULT_REMINDER_MINUTES: i64 = 60;

/// Materialises a locked profile from completed onboarding.
pub struct ProfileMaterialiser {
    db: Arc<dyn Database>,
    generator: TemplateGenerator,
}

impl ProfileMaterialiser {
    pub fn new(db: Arc<dyn Database>) -> Self {
        let generator = TemplateGenerator::new(Arc::clone(&db));
        Self { db, generator }
    }

    /// Complete onboarding for a user.
    ///
    /// Fails unless all nine step documents are present and `current_step`
    /// is 9. Everything except template generation is atomic; a failed
    /// template week logs ERROR and completion proceeds.
    pub async fn complete_onboarding(&self, user_id: Uuid) -> Result<FullProfile, Error> {
        let state = self
            .db
            .get_onboarding_state(user_id)
            .await?
            .ok_or(OnboardingError::StateNotFound(user_id))?;
        if state.is_complete {
            return Err(OnboardingError::AlreadyComplete.into());
        }
        if state.current_step != STEP_COUNT || !state.all_steps_present() {
            return Err(OnboardingError::Incomplete {
                completed: state.completed_steps().len(),
            }
            .into());
        }

        self.db.begin().await?;
        match self.materialise(state).await {
            Ok(full) => {
                self.db.commit().await?;
                tracing::info!(user_id = %user_id, profile_id = %full.profile.id,
                    "Onboarding completed, profile locked");
                Ok(full)
            }
            Err(e) => {
                if let Err(rollback_err) = self.db.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed after completion error");
                }
                Err(e)
            }
        }
    }

    async fn materialise(&self, mut state: OnboardingState) -> Result<FullProfile, Error> {
        let user_id = state.user_id;
        let now = Utc::now();

        // Step 1 — profile shell
        let step1 = require_doc(&state, 1)?;
        let fitness_level = step1
            .get("fitness_level")
            .and_then(|v| v.as_str())
            .and_then(|s| FitnessLevel::from_str(s).ok())
            .unwrap_or_default();
        let lifestyle_rating = step1.get("lifestyle_rating").and_then(|v| v.as_i64());

        let profile = UserProfile {
            id: Uuid::new_v4(),
            user_id,
            fitness_level,
            lifestyle_rating,
            is_locked: true,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_profile(&profile).await?;

        // Step 2 + 3 targets — goals, priority by position
        let step3 = require_doc(&state, 3)?.clone();
        let target_weight_kg = step3.get("target_weight_kg").and_then(|v| v.as_f64());
        let target_body_fat = step3
            .get("target_body_fat_percentage")
            .and_then(|v| v.as_f64());

        let mut goals = Vec::new();
        let raw_goals = require_doc(&state, 2)?
            .get("goals")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for (index, raw) in raw_goals.iter().enumerate() {
            let goal_type = raw
                .get("goal_type")
                .and_then(|v| v.as_str())
                .and_then(|s| GoalType::from_str(s).ok())
                .unwrap_or(GoalType::GeneralFitness);
            let first = index == 0;
            let goal = FitnessGoal {
                id: Uuid::new_v4(),
                profile_id: profile.id,
                goal_type,
                priority: (index + 1) as i64,
                target_weight_kg: if first { target_weight_kg } else { None },
                target_body_fat_percentage: if first { target_body_fat } else { None },
            };
            self.db.insert_fitness_goal(&goal).await?;
            goals.push(goal);
        }

        // Step 3 — physical constraints
        let mut constraints = Vec::new();
        let constraint_groups = [
            ("equipment", ConstraintType::Equipment, None),
            ("injuries", ConstraintType::Injury, Some(Severity::Moderate)),
            (
                "limitations",
                ConstraintType::Limitation,
                Some(Severity::Moderate),
            ),
        ];
        for (field, constraint_type, severity) in constraint_groups {
            let entries = step3
                .get(field)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            for entry in entries {
                let Some(description) = entry.as_str() else {
                    continue;
                };
                let constraint = PhysicalConstraint {
                    id: Uuid::new_v4(),
                    profile_id: profile.id,
                    constraint_type,
                    description: description.to_string(),
                    severity,
                };
                self.db.insert_physical_constraint(&constraint).await?;
                constraints.push(constraint);
            }
        }

        // Step 4 — dietary preference
        let step4 = require_doc(&state, 4)?;
        let string_list = |doc: &Value, field: &str| -> Vec<String> {
            doc.get(field)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default()
        };
        let dietary = DietaryPreference {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            diet_type: step4
                .get("diet_type")
                .and_then(|v| v.as_str())
                .and_then(|s| DietType::from_str(s).ok())
                .unwrap_or(DietType::Omnivore),
            allergies: string_list(step4, "allergies"),
            intolerances: string_list(step4, "intolerances"),
            dislikes: string_list(step4, "dislikes"),
        };
        self.db.insert_dietary_preference(&dietary).await?;

        // Step 5 — meal plan, percentages as exact decimals
        let step5 = require_doc(&state, 5)?;
        let pct = |field: &str| -> Decimal {
            step5
                .get(field)
                .and_then(|v| v.as_f64())
                .and_then(Decimal::from_f64)
                .unwrap_or(Decimal::ZERO)
        };
        let meal_plan = MealPlan {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            daily_calorie_target: step5
                .get("daily_calorie_target")
                .and_then(|v| v.as_i64())
                .unwrap_or(2000),
            protein_percentage: pct("protein_percentage"),
            carbs_percentage: pct("carbs_percentage"),
            fats_percentage: pct("fats_percentage"),
        };
        self.db.insert_meal_plan(&meal_plan).await?;

        // Step 6 — meal schedules
        let mut meal_schedules = Vec::new();
        let raw_meals = require_doc(&state, 6)?
            .get("meals")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for raw in raw_meals {
            let Some(name) = raw.get("meal_name").and_then(|v| v.as_str()) else {
                continue;
            };
            let time = raw
                .get("scheduled_time")
                .and_then(|v| v.as_str())
                .and_then(|t| normalize_time(t).ok())
                .unwrap_or_else(|| "12:00".to_string());
            let schedule = MealSchedule {
                id: Uuid::new_v4(),
                profile_id: profile.id,
                meal_name: name.to_string(),
                scheduled_time: time,
                enable_notifications: raw
                    .get("enable_notifications")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true),
            };
            self.db.insert_meal_schedule(&schedule).await?;
            meal_schedules.push(schedule);
        }

        // Step 7 — workout schedules
        let mut workout_schedules = Vec::new();
        let raw_workouts = require_doc(&state, 7)?
            .get("workouts")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for raw in raw_workouts {
            let Some(day) = raw.get("day_of_week").and_then(|v| v.as_i64()) else {
                continue;
            };
            let time = raw
                .get("scheduled_time")
                .and_then(|v| v.as_str())
                .and_then(|t| normalize_time(t).ok())
                .unwrap_or_else(|| "06:00".to_string());
            let schedule = WorkoutSchedule {
                id: Uuid::new_v4(),
                profile_id: profile.id,
                day_of_week: day,
                scheduled_time: time,
                enable_notifications: raw
                    .get("enable_notifications")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true),
            };
            self.db.insert_workout_schedule(&schedule).await?;
            workout_schedules.push(schedule);
        }

        // Step 8 — hydration
        let step8 = require_doc(&state, 8)?;
        let hydration = HydrationPreference {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            daily_water_target_ml: step8
                .get("daily_water_target_ml")
                .and_then(|v| v.as_i64())
                .unwrap_or(2000),
            reminder_frequency_minutes: step8
                .get("reminder_frequency_minutes")
                .and_then(|v| v.as_i64())
                .unwrap_or(DEFAULT_REMINDER_MINUTES),
            enable_notifications: true,
        };
        self.db.insert_hydration_preference(&hydration).await?;

        // Step 9 stays in step_data for later agents; no entity.

        // Initial meal templates — best-effort, never fatal. The lock is
        // lifted only for the duration of generation.
        self.db.set_profile_locked(profile.id, false).await?;
        for week in 1..=4u8 {
            if let Err(e) = self
                .generator
                .generate_template(profile.id, week, Some("Onboarding completed"))
                .await
            {
                tracing::error!(
                    profile_id = %profile.id,
                    week,
                    error = %e,
                    "Initial template generation failed, continuing"
                );
            }
        }
        self.db.set_profile_locked(profile.id, true).await?;

        let full = FullProfile {
            profile: UserProfile {
                is_locked: true,
                ..profile.clone()
            },
            goals,
            constraints,
            dietary_preference: Some(dietary),
            meal_plan: Some(meal_plan),
            meal_schedules,
            workout_schedules,
            hydration_preference: Some(hydration),
        };

        // Version 1 snapshot
        let snapshot = serde_json::to_value(&full)
            .map_err(|e| OnboardingError::invalid_input(format!("snapshot failed: {e}")))?;
        self.db
            .insert_profile_version(&ProfileVersion {
                id: Uuid::new_v4(),
                profile_id: profile.id,
                version: 1,
                reason: "Onboarding completed".to_string(),
                snapshot,
                created_at: now,
            })
            .await?;

        state.is_complete = true;
        self.db.save_onboarding_state(&state).await?;

        Ok(full)
    }
}

fn require_doc(state: &OnboardingState, k: u8) -> Result<&Value, Error> {
    state
        .step_document(k)
        .ok_or_else(|| OnboardingError::invalid_input(format!("step {k} missing")).into())
}
