//! Per-step validators for onboarding documents (C2).
//!
//! Each validator checks one step's opaque JSON document and rejects with a
//! field pointer; a rejected document is never persisted.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::error::OnboardingError;
use crate::profile::model::{DietType, FitnessLevel, GoalType};

type ValidationResult = Result<(), OnboardingError>;

/// Run the validator for step `k`.
pub fn validate_step(k: u8, data: &Value) -> ValidationResult {
    if !data.is_object() {
        return Err(OnboardingError::invalid_input(
            "Step data must be a JSON object",
        ));
    }
    match k {
        1 => validate_fitness_level(data),
        2 => validate_fitness_goals(data),
        3 => validate_workout_constraints(data),
        4 => validate_diet_preferences(data),
        5 => validate_meal_plan(data),
        6 => validate_meal_schedule(data),
        7 => validate_workout_schedule(data),
        8 => validate_hydration(data),
        9 => validate_supplements(data),
        other => Err(OnboardingError::StepOutOfRange(other)),
    }
}

/// Parse a clock time with two or three colon-separated integer groups and
/// return it normalised to zero-padded "HH:MM".
pub fn normalize_time(raw: &str) -> Result<String, String> {
    let groups: Vec<&str> = raw.split(':').collect();
    if groups.len() != 2 && groups.len() != 3 {
        return Err(format!("time '{raw}' must be HH:MM or HH:MM:SS"));
    }
    let mut parsed = Vec::with_capacity(groups.len());
    for group in &groups {
        let n: u32 = group
            .trim()
            .parse()
            .map_err(|_| format!("time '{raw}' has a non-numeric component"))?;
        parsed.push(n);
    }
    let (hour, minute) = (parsed[0], parsed[1]);
    if hour > 23 {
        return Err(format!("hour {hour} out of range [0,23]"));
    }
    if minute > 59 {
        return Err(format!("minute {minute} out of range [0,59]"));
    }
    if let Some(&second) = parsed.get(2)
        && second > 59
    {
        return Err(format!("second {second} out of range [0,59]"));
    }
    Ok(format!("{hour:02}:{minute:02}"))
}

// ── Field helpers ───────────────────────────────────────────────────

fn require_str<'a>(data: &'a Value, field: &str) -> Result<&'a str, OnboardingError> {
    data.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| OnboardingError::invalid(field, format!("'{field}' must be a string")))
}

fn require_string_list(data: &Value, field: &str) -> Result<Vec<String>, OnboardingError> {
    let items = data
        .get(field)
        .and_then(|v| v.as_array())
        .ok_or_else(|| OnboardingError::invalid(field, format!("'{field}' must be a list")))?;
    items
        .iter()
        .map(|v| {
            v.as_str().map(String::from).ok_or_else(|| {
                OnboardingError::invalid(field, format!("'{field}' entries must be strings"))
            })
        })
        .collect()
}

fn require_int_in(data: &Value, field: &str, min: i64, max: i64) -> Result<i64, OnboardingError> {
    let n = data.get(field).and_then(|v| v.as_i64()).ok_or_else(|| {
        OnboardingError::invalid(field, format!("'{field}' must be an integer"))
    })?;
    if !(min..=max).contains(&n) {
        return Err(OnboardingError::invalid(
            field,
            format!("'{field}' must be between {min} and {max}"),
        ));
    }
    Ok(n)
}

fn optional_int_in(data: &Value, field: &str, min: i64, max: i64) -> ValidationResult {
    match data.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(_) => require_int_in(data, field, min, max).map(|_| ()),
    }
}

fn optional_number_in(data: &Value, field: &str, min: f64, max: f64) -> ValidationResult {
    match data.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(value) => {
            let n = value.as_f64().ok_or_else(|| {
                OnboardingError::invalid(field, format!("'{field}' must be a number"))
            })?;
            if !(min..=max).contains(&n) {
                return Err(OnboardingError::invalid(
                    field,
                    format!("'{field}' must be between {min} and {max}"),
                ));
            }
            Ok(())
        }
    }
}

// ── Step validators ─────────────────────────────────────────────────

fn validate_fitness_level(data: &Value) -> ValidationResult {
    let raw = require_str(data, "fitness_level")?;
    FitnessLevel::from_str(raw)
        .map_err(|_| OnboardingError::invalid("fitness_level", format!("'{raw}' is not a valid fitness level")))?;
    optional_int_in(data, "lifestyle_rating", 1, 10)
}

fn validate_fitness_goals(data: &Value) -> ValidationResult {
    let goals = data
        .get("goals")
        .and_then(|v| v.as_array())
        .ok_or_else(|| OnboardingError::invalid("goals", "'goals' must be a list"))?;
    if goals.is_empty() {
        return Err(OnboardingError::invalid(
            "goals",
            "at least one goal is required",
        ));
    }
    for goal in goals {
        let raw = goal
            .get("goal_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| OnboardingError::invalid("goals", "each goal needs a 'goal_type'"))?;
        GoalType::from_str(raw).map_err(|_| {
            OnboardingError::invalid("goals", format!("'{raw}' is not a valid goal type"))
        })?;
        if let Some(priority) = goal.get("priority")
            && !priority.is_null()
        {
            let n = priority.as_i64().ok_or_else(|| {
                OnboardingError::invalid("goals", "goal 'priority' must be an integer")
            })?;
            if n < 1 {
                return Err(OnboardingError::invalid(
                    "goals",
                    "goal 'priority' must be at least 1",
                ));
            }
        }
    }
    Ok(())
}

// Historically two steps; the targets are individually optional but range
// checked when present.
fn validate_workout_constraints(data: &Value) -> ValidationResult {
    require_string_list(data, "equipment")?;
    require_string_list(data, "injuries")?;
    require_string_list(data, "limitations")?;
    optional_number_in(data, "target_weight_kg", 30.0, 300.0)?;
    optional_number_in(data, "target_body_fat_percentage", 1.0, 50.0)
}

fn validate_diet_preferences(data: &Value) -> ValidationResult {
    let raw = require_str(data, "diet_type")?;
    DietType::from_str(raw).map_err(|_| {
        OnboardingError::invalid("diet_type", format!("'{raw}' is not a valid diet type"))
    })?;
    require_string_list(data, "allergies")?;
    require_string_list(data, "intolerances")?;
    require_string_list(data, "dislikes")?;
    Ok(())
}

/// Macro sum tolerance.
const MACRO_TOLERANCE: Decimal = dec!(0.01);

fn validate_meal_plan(data: &Value) -> ValidationResult {
    require_int_in(data, "daily_calorie_target", 1000, 5000)?;

    let mut sum = Decimal::ZERO;
    for field in ["protein_percentage", "carbs_percentage", "fats_percentage"] {
        let raw = data.get(field).and_then(|v| v.as_f64()).ok_or_else(|| {
            OnboardingError::invalid(field, format!("'{field}' must be a number"))
        })?;
        let pct = Decimal::from_f64(raw).ok_or_else(|| {
            OnboardingError::invalid(field, format!("'{field}' is not a finite number"))
        })?;
        if pct < Decimal::ZERO || pct > dec!(100) {
            return Err(OnboardingError::invalid(
                field,
                format!("'{field}' must be between 0 and 100"),
            ));
        }
        sum += pct;
    }
    if (sum - dec!(100)).abs() > MACRO_TOLERANCE {
        return Err(OnboardingError::invalid(
            "macros",
            format!("macro percentages must sum to 100, got {sum}"),
        ));
    }
    Ok(())
}

fn validate_meal_schedule(data: &Value) -> ValidationResult {
    let meals = data
        .get("meals")
        .and_then(|v| v.as_array())
        .ok_or_else(|| OnboardingError::invalid("meals", "'meals' must be a list"))?;
    if meals.is_empty() {
        return Err(OnboardingError::invalid(
            "meals",
            "at least one meal is required",
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for meal in meals {
        let name = meal
            .get("meal_name")
            .and_then(|v| v.as_str())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                OnboardingError::invalid("meals", "each meal needs a non-empty 'meal_name'")
            })?;
        if !seen.insert(name.to_lowercase()) {
            return Err(OnboardingError::invalid(
                "meals",
                format!("duplicate meal name '{name}'"),
            ));
        }
        let time = meal
            .get("scheduled_time")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OnboardingError::invalid("meals", "each meal needs a 'scheduled_time'")
            })?;
        normalize_time(time).map_err(|e| OnboardingError::invalid("meals", e))?;
    }
    Ok(())
}

fn validate_workout_schedule(data: &Value) -> ValidationResult {
    let workouts = data
        .get("workouts")
        .and_then(|v| v.as_array())
        .ok_or_else(|| OnboardingError::invalid("workouts", "'workouts' must be a list"))?;
    if workouts.is_empty() {
        return Err(OnboardingError::invalid(
            "workouts",
            "at least one workout is required",
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for workout in workouts {
        let day = workout
            .get("day_of_week")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                OnboardingError::invalid("workouts", "each workout needs a 'day_of_week'")
            })?;
        if !(0..=6).contains(&day) {
            return Err(OnboardingError::invalid(
                "workouts",
                format!("day_of_week {day} out of range [0,6]"),
            ));
        }
        if !seen.insert(day) {
            return Err(OnboardingError::invalid(
                "workouts",
                format!("duplicate workout day {day}"),
            ));
        }
        let time = workout
            .get("scheduled_time")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OnboardingError::invalid("workouts", "each workout needs a 'scheduled_time'")
            })?;
        normalize_time(time).map_err(|e| OnboardingError::invalid("workouts", e))?;
    }
    Ok(())
}

fn validate_hydration(data: &Value) -> ValidationResult {
    require_int_in(data, "daily_water_target_ml", 500, 10_000)?;
    optional_int_in(data, "reminder_frequency_minutes", 15, 480)
}

fn validate_supplements(data: &Value) -> ValidationResult {
    data.get("interested_in_supplements")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| {
            OnboardingError::invalid(
                "interested_in_supplements",
                "'interested_in_supplements' must be a boolean",
            )
        })?;
    match data.get("current_supplements") {
        None | Some(Value::Null) => Ok(()),
        Some(_) => require_string_list(data, "current_supplements").map(|_| ()),
    }
}
