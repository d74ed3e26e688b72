//! Workout tool family.
//!
//! Read/log tools plus the onboarding-only `save_*` tools that forward to
//! the onboarding store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ToolError;
use crate::onboarding::OnboardingManager;
use crate::store::{Database, WorkoutLog};
use crate::tools::{require_i64, require_str, Tool, ToolDeps, ToolOutput};

/// All workout tools for one agent instance.
pub fn workout_tools(deps: &ToolDeps, onboarding_mode: bool) -> Vec<Arc<dyn Tool>> {
    let mut tools = read_tools(deps);
    if onboarding_mode {
        tools.push(Arc::new(SaveStepTool::fitness_level(deps)) as Arc<dyn Tool>);
        tools.push(Arc::new(SaveStepTool::fitness_goals(deps)) as Arc<dyn Tool>);
        tools.push(Arc::new(SaveStepTool::workout_constraints(deps)) as Arc<dyn Tool>);
    }
    tools
}

/// The non-mutating-state subset the general agent delegates to.
pub fn read_tools(deps: &ToolDeps) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetCurrentWorkoutTool { deps: deps.clone() }),
        Arc::new(ShowExerciseDemoTool),
        Arc::new(LogSetCompletionTool { deps: deps.clone() }),
        Arc::new(SuggestWorkoutModificationTool),
    ]
}

// ── get_current_workout ─────────────────────────────────────────────

struct GetCurrentWorkoutTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for GetCurrentWorkoutTool {
    fn name(&self) -> &str {
        "get_current_workout"
    }

    fn description(&self) -> &str {
        "Get the user's current workout plan: scheduled days and times."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<ToolOutput, ToolError> {
        let plan = self.deps.ctx.current_workout_plan();
        if plan.as_object().is_none_or(|o| o.is_empty()) {
            return Ok(ToolOutput::failure("No workout plan found")
                .with_metadata(json!({"error_code": "WORKOUT_PLAN_NOT_FOUND"})));
        }
        Ok(ToolOutput::success(plan.clone()))
    }
}

// ── show_exercise_demo ──────────────────────────────────────────────

struct ShowExerciseDemoTool;

#[async_trait]
impl Tool for ShowExerciseDemoTool {
    fn name(&self) -> &str {
        "show_exercise_demo"
    }

    fn description(&self) -> &str {
        "Look up a demonstration video and form cues for a named exercise."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "exercise": {"type": "string", "description": "Exercise name, e.g. 'goblet squat'"}
            },
            "required": ["exercise"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let exercise = require_str(&params, "exercise")?;
        let slug: String = exercise
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        Ok(ToolOutput::success(json!({
            "exercise": exercise,
            "demo_url": format!("https://demos.fitcoach.app/exercises/{slug}"),
        })))
    }
}

// ── log_set_completion ──────────────────────────────────────────────

struct LogSetCompletionTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for LogSetCompletionTool {
    fn name(&self) -> &str {
        "log_set_completion"
    }

    fn description(&self) -> &str {
        "Record a completed set: exercise, set number, reps, and optional weight in kg."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "exercise": {"type": "string"},
                "set_number": {"type": "integer", "minimum": 1},
                "reps": {"type": "integer", "minimum": 1},
                "weight_kg": {"type": "number"}
            },
            "required": ["exercise", "set_number", "reps"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let exercise = require_str(&params, "exercise")?;
        let set_number = require_i64(&params, "set_number")?;
        let reps = require_i64(&params, "reps")?;
        let weight_kg = params.get("weight_kg").and_then(|v| v.as_f64());

        let profile = self
            .deps
            .db
            .get_profile_by_user(self.deps.ctx.user_id())
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        let Some(profile) = profile else {
            return Ok(ToolOutput::failure("No profile found; complete onboarding first"));
        };

        let log = WorkoutLog {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            exercise: exercise.to_string(),
            set_number,
            reps,
            weight_kg,
            logged_at: Utc::now(),
        };
        self.deps
            .db
            .insert_workout_log(&log)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        Ok(ToolOutput::success(json!({
            "log_id": log.id,
            "exercise": exercise,
            "set_number": set_number,
            "reps": reps,
        })))
    }
}

// ── suggest_workout_modification ────────────────────────────────────

struct SuggestWorkoutModificationTool;

/// Substitution table keyed by body-area keywords in the stated limitation.
const MODIFICATIONS: &[(&str, &str, &str)] = &[
    ("knee", "squat", "box squat to a high target, or leg press with limited depth"),
    ("knee", "lunge", "step-up to a low box, or glute bridge"),
    ("shoulder", "press", "landmine press or neutral-grip floor press"),
    ("shoulder", "pull-up", "neutral-grip lat pulldown"),
    ("back", "deadlift", "hip hinge with a kettlebell from an elevated block"),
    ("wrist", "push-up", "push-up on handles or dumbbells to keep a neutral wrist"),
];

#[async_trait]
impl Tool for SuggestWorkoutModificationTool {
    fn name(&self) -> &str {
        "suggest_workout_modification"
    }

    fn description(&self) -> &str {
        "Suggest a joint-friendly substitute for an exercise, given a limitation \
         (e.g. 'knee pain', 'shoulder injury')."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "exercise": {"type": "string"},
                "limitation": {"type": "string", "description": "What hurts or is restricted"}
            },
            "required": ["exercise", "limitation"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let exercise = require_str(&params, "exercise")?.to_lowercase();
        let limitation = require_str(&params, "limitation")?.to_lowercase();

        let suggestion = MODIFICATIONS
            .iter()
            .find(|(area, movement, _)| limitation.contains(area) && exercise.contains(movement))
            .map(|(_, _, alternative)| *alternative)
            .unwrap_or(
                "reduce the load and range of motion, and stop if the movement provokes pain",
            );

        Ok(ToolOutput::success(json!({
            "exercise": exercise,
            "limitation": limitation,
            "suggestion": suggestion,
        })))
    }
}

// ── save_* (onboarding-only) ────────────────────────────────────────

/// Forwarding tool: one onboarding step per instance.
pub(crate) struct SaveStepTool {
    name: &'static str,
    description: &'static str,
    step: u8,
    agent_tag: &'static str,
    schema: Value,
    manager: OnboardingManager,
    user_id: Uuid,
}

impl SaveStepTool {
    pub(crate) fn forward(
        deps: &ToolDeps,
        name: &'static str,
        description: &'static str,
        step: u8,
        agent_tag: &'static str,
        schema: Value,
    ) -> Self {
        Self {
            name,
            description,
            step,
            agent_tag,
            schema,
            manager: OnboardingManager::new(Arc::clone(&deps.db)),
            user_id: deps.ctx.user_id(),
        }
    }

    fn fitness_level(deps: &ToolDeps) -> Self {
        Self::forward(
            deps,
            "save_fitness_level",
            "Save the user's fitness level (beginner, intermediate, or advanced) and \
             optional lifestyle rating (1-10).",
            1,
            "workout",
            json!({
                "type": "object",
                "properties": {
                    "fitness_level": {"type": "string", "enum": ["beginner", "intermediate", "advanced"]},
                    "lifestyle_rating": {"type": "integer", "minimum": 1, "maximum": 10}
                },
                "required": ["fitness_level"]
            }),
        )
    }

    fn fitness_goals(deps: &ToolDeps) -> Self {
        Self::forward(
            deps,
            "save_fitness_goals",
            "Save the user's prioritised fitness goals.",
            2,
            "workout",
            json!({
                "type": "object",
                "properties": {
                    "goals": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "goal_type": {"type": "string", "enum": ["fat_loss", "muscle_gain", "general_fitness"]},
                                "priority": {"type": "integer", "minimum": 1}
                            },
                            "required": ["goal_type"]
                        },
                        "minItems": 1
                    }
                },
                "required": ["goals"]
            }),
        )
    }

    fn workout_constraints(deps: &ToolDeps) -> Self {
        Self::forward(
            deps,
            "save_workout_constraints",
            "Save available equipment, injuries, limitations, and optional target \
             weight / body-fat metrics.",
            3,
            "workout",
            json!({
                "type": "object",
                "properties": {
                    "equipment": {"type": "array", "items": {"type": "string"}},
                    "injuries": {"type": "array", "items": {"type": "string"}},
                    "limitations": {"type": "array", "items": {"type": "string"}},
                    "target_weight_kg": {"type": "number", "minimum": 30, "maximum": 300},
                    "target_body_fat_percentage": {"type": "number", "minimum": 1, "maximum": 50}
                },
                "required": ["equipment", "injuries", "limitations"]
            }),
        )
    }
}

#[async_trait]
impl Tool for SaveStepTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn onboarding_only(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        match self
            .manager
            .save_step(self.user_id, self.step, params, Some(self.agent_tag))
            .await
        {
            Ok(state) => Ok(ToolOutput::success(json!({
                "step": self.step,
                "current_step": state.current_step,
                "completed_states": state.completed_steps(),
            }))),
            // Validation feedback goes back to the model as a failed
            // envelope it can repair from, not a hard error.
            Err(e) => Ok(ToolOutput::failure(e.to_string())
                .with_metadata(json!({"error_code": e.error_code()}))),
        }
    }
}
