//! Scheduler tool family: upcoming schedule, rescheduling, reminders.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::onboarding::validators::normalize_time;
use crate::store::{Database, ReminderKind};
use crate::tools::workout::SaveStepTool;
use crate::tools::{require_bool, require_i64, require_str, require_uuid, Tool, ToolDeps, ToolOutput};

/// All scheduler tools for one agent instance.
pub fn scheduler_tools(deps: &ToolDeps, onboarding_mode: bool) -> Vec<Arc<dyn Tool>> {
    let mut tools = read_write_tools(deps);
    if onboarding_mode {
        tools.push(Arc::new(save_meal_schedule(deps)) as Arc<dyn Tool>);
        tools.push(Arc::new(save_workout_schedule(deps)) as Arc<dyn Tool>);
        tools.push(Arc::new(save_hydration_schedule(deps)) as Arc<dyn Tool>);
    }
    tools
}

/// Post-onboarding scheduler tools (also delegated to by the general agent).
pub fn read_write_tools(deps: &ToolDeps) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetUpcomingScheduleTool { deps: deps.clone() }),
        Arc::new(RescheduleWorkoutTool { deps: deps.clone() }),
        Arc::new(UpdateReminderPreferencesTool { deps: deps.clone() }),
    ]
}

fn execution_failed(name: &str, e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

// ── get_upcoming_schedule ───────────────────────────────────────────

struct GetUpcomingScheduleTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for GetUpcomingScheduleTool {
    fn name(&self) -> &str {
        "get_upcoming_schedule"
    }

    fn description(&self) -> &str {
        "Get the user's workout days, meal times, and the most recent logged set."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<ToolOutput, ToolError> {
        let profile = self
            .deps
            .db
            .get_profile_by_user(self.deps.ctx.user_id())
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        let Some(profile) = profile else {
            return Ok(ToolOutput::failure("No profile found; complete onboarding first"));
        };

        let workouts = self
            .deps
            .db
            .get_workout_schedules(profile.id)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        let meals = self
            .deps
            .db
            .get_meal_schedules(profile.id)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        let last_logged = self
            .deps
            .db
            .last_workout_log(profile.id)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;

        Ok(ToolOutput::success(json!({
            "workouts": workouts
                .iter()
                .map(|w| json!({
                    "schedule_id": w.id,
                    "day_of_week": w.day_of_week,
                    "scheduled_time": w.scheduled_time,
                    "enable_notifications": w.enable_notifications,
                }))
                .collect::<Vec<_>>(),
            "meals": meals
                .iter()
                .map(|m| json!({
                    "schedule_id": m.id,
                    "meal_name": m.meal_name,
                    "scheduled_time": m.scheduled_time,
                    "enable_notifications": m.enable_notifications,
                }))
                .collect::<Vec<_>>(),
            "last_logged": last_logged.map(|l| json!({
                "exercise": l.exercise,
                "set_number": l.set_number,
                "reps": l.reps,
                "logged_at": l.logged_at,
            })),
        })))
    }
}

// ── reschedule_workout ──────────────────────────────────────────────

struct RescheduleWorkoutTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for RescheduleWorkoutTool {
    fn name(&self) -> &str {
        "reschedule_workout"
    }

    fn description(&self) -> &str {
        "Move a workout to a new day (0=Mon .. 6=Sun) and time (HH:MM). Fails when \
         another workout already occupies the target day."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "schedule_id": {"type": "string", "description": "UUID of the workout schedule"},
                "new_day": {"type": "integer", "minimum": 0, "maximum": 6},
                "new_time": {"type": "string", "description": "HH:MM, 24-hour"}
            },
            "required": ["schedule_id", "new_day", "new_time"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let schedule_id = require_uuid(&params, "schedule_id")?;
        let new_day = require_i64(&params, "new_day")?;
        let new_time = require_str(&params, "new_time")?;

        if !(0..=6).contains(&new_day) {
            return Ok(ToolOutput::failure("new_day must be between 0 and 6"));
        }
        let new_time = match normalize_time(new_time) {
            Ok(time) => time,
            Err(e) => return Ok(ToolOutput::failure(e)),
        };

        let schedule = self
            .deps
            .db
            .get_workout_schedule(schedule_id)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        let Some(schedule) = schedule else {
            return Ok(ToolOutput::failure("Workout schedule not found"));
        };

        // Conflict check: any other workout on the target day.
        let siblings = self
            .deps
            .db
            .get_workout_schedules(schedule.profile_id)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        if siblings
            .iter()
            .any(|s| s.id != schedule.id && s.day_of_week == new_day)
        {
            return Ok(ToolOutput::failure("Conflict detected")
                .with_metadata(json!({"error_code": "CONFLICT_DETECTED"})));
        }

        // Single-statement update; the unique (profile, day) index backs up
        // the in-flight check under concurrency.
        match self
            .deps
            .db
            .update_workout_schedule_slot(schedule.id, new_day, &new_time)
            .await
        {
            Ok(()) => Ok(ToolOutput::success(json!({
                "schedule_id": schedule.id,
                "day_of_week": new_day,
                "scheduled_time": new_time,
            }))),
            Err(crate::error::DatabaseError::Constraint(_)) => {
                Ok(ToolOutput::failure("Conflict detected")
                    .with_metadata(json!({"error_code": "CONFLICT_DETECTED"})))
            }
            Err(e) => Err(execution_failed(self.name(), e)),
        }
    }
}

// ── update_reminder_preferences ─────────────────────────────────────

struct UpdateReminderPreferencesTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for UpdateReminderPreferencesTool {
    fn name(&self) -> &str {
        "update_reminder_preferences"
    }

    fn description(&self) -> &str {
        "Enable or disable notifications for all workout, meal, or hydration reminders."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["workout", "meal", "hydration"]},
                "enabled": {"type": "boolean"}
            },
            "required": ["type", "enabled"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let kind: ReminderKind = require_str(&params, "type")?
            .parse()
            .map_err(|reason| ToolError::InvalidParameters { reason })?;
        let enabled = require_bool(&params, "enabled")?;

        let profile = self
            .deps
            .db
            .get_profile_by_user(self.deps.ctx.user_id())
            .await
            .map_err(|e| execution_failed(self.name(), e))?;
        let Some(profile) = profile else {
            return Ok(ToolOutput::failure("No profile found; complete onboarding first"));
        };

        let updated = self
            .deps
            .db
            .set_schedule_notifications(profile.id, kind, enabled)
            .await
            .map_err(|e| execution_failed(self.name(), e))?;

        Ok(ToolOutput::success(json!({
            "updated": updated,
            "enabled": enabled,
        })))
    }
}

// ── save_* (onboarding-only) ────────────────────────────────────────

fn save_meal_schedule(deps: &ToolDeps) -> SaveStepTool {
    SaveStepTool::forward(
        deps,
        "save_meal_schedule",
        "Save the user's named meals and their times.",
        6,
        "scheduler",
        json!({
            "type": "object",
            "properties": {
                "meals": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "meal_name": {"type": "string"},
                            "scheduled_time": {"type": "string", "description": "HH:MM"}
                        },
                        "required": ["meal_name", "scheduled_time"]
                    },
                    "minItems": 1
                }
            },
            "required": ["meals"]
        }),
    )
}

fn save_workout_schedule(deps: &ToolDeps) -> SaveStepTool {
    SaveStepTool::forward(
        deps,
        "save_workout_schedule",
        "Save the user's workout days (0=Mon .. 6=Sun) and times.",
        7,
        "scheduler",
        json!({
            "type": "object",
            "properties": {
                "workouts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "day_of_week": {"type": "integer", "minimum": 0, "maximum": 6},
                            "scheduled_time": {"type": "string", "description": "HH:MM"}
                        },
                        "required": ["day_of_week", "scheduled_time"]
                    },
                    "minItems": 1
                }
            },
            "required": ["workouts"]
        }),
    )
}

fn save_hydration_schedule(deps: &ToolDeps) -> SaveStepTool {
    SaveStepTool::forward(
        deps,
        "save_hydration_schedule",
        "Save the daily water target (ml) and optional reminder cadence (minutes).",
        8,
        "scheduler",
        json!({
            "type": "object",
            "properties": {
                "daily_water_target_ml": {"type": "integer", "minimum": 500, "maximum": 10000},
                "reminder_frequency_minutes": {"type": "integer", "minimum": 15, "maximum": 480}
            },
            "required": ["daily_water_target_ml"]
        }),
    )
}
