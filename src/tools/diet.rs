//! Diet tool family.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::meals::selector::{CandidateQuery, DietaryFilter, DishSelector, VarietyBucket};
use crate::profile::model::DietType;
use crate::store::Database;
use crate::tools::workout::SaveStepTool;
use crate::tools::{require_uuid, Tool, ToolDeps, ToolOutput};

/// All diet tools for one agent instance.
pub fn diet_tools(deps: &ToolDeps, onboarding_mode: bool) -> Vec<Arc<dyn Tool>> {
    let mut tools = read_tools(deps);
    if onboarding_mode {
        tools.push(Arc::new(save_dietary_preferences(deps)) as Arc<dyn Tool>);
        tools.push(Arc::new(save_meal_plan(deps)) as Arc<dyn Tool>);
    }
    tools
}

/// The non-mutating subset the general agent delegates to.
pub fn read_tools(deps: &ToolDeps) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetCurrentMealPlanTool { deps: deps.clone() }),
        Arc::new(SuggestMealSubstitutionTool { deps: deps.clone() }),
        Arc::new(GetRecipeDetailsTool { deps: deps.clone() }),
        Arc::new(CalculateNutritionTool { deps: deps.clone() }),
    ]
}

// ── get_current_meal_plan ───────────────────────────────────────────

struct GetCurrentMealPlanTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for GetCurrentMealPlanTool {
    fn name(&self) -> &str {
        "get_current_meal_plan"
    }

    fn description(&self) -> &str {
        "Get the user's meal plan: calorie target, macro split, and meal times."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<ToolOutput, ToolError> {
        let plan = self.deps.ctx.current_meal_plan();
        if plan.as_object().is_none_or(|o| o.is_empty()) {
            return Ok(ToolOutput::failure("No meal plan configured")
                .with_metadata(json!({"error_code": "MEAL_PLAN_NOT_CONFIGURED"})));
        }
        Ok(ToolOutput::success(plan.clone()))
    }
}

// ── suggest_meal_substitution ───────────────────────────────────────

struct SuggestMealSubstitutionTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for SuggestMealSubstitutionTool {
    fn name(&self) -> &str {
        "suggest_meal_substitution"
    }

    fn description(&self) -> &str {
        "Suggest up to three swaps for a dish, matching its slot and staying close \
         to its calories and protein while honouring the user's dietary limits."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dish_id": {"type": "string", "description": "UUID of the dish to replace"}
            },
            "required": ["dish_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let dish_id = require_uuid(&params, "dish_id")?;
        let run = || async {
            let dish = self.deps.db.get_dish(dish_id).await?;
            let Some(dish) = dish else {
                return Ok::<_, crate::error::Error>(None);
            };

            let dietary = match self.deps.db.get_profile_by_user(self.deps.ctx.user_id()).await? {
                Some(profile) => self.deps.db.get_dietary_preference(profile.id).await?,
                None => None,
            };
            let filter = match dietary {
                Some(pref) => DietaryFilter {
                    diet_type: pref.diet_type,
                    allergies: pref.allergies,
                    dislikes: pref.dislikes,
                },
                None => DietaryFilter {
                    diet_type: DietType::Omnivore,
                    allergies: Vec::new(),
                    dislikes: Vec::new(),
                },
            };

            let selector = DishSelector::new(Arc::clone(&self.deps.db));
            let selection = selector
                .get_candidates(&CandidateQuery {
                    meal_type: dish.meal_type,
                    dietary: filter,
                    target_calories: dish.calories,
                    target_protein: dish.protein_g,
                    exclude_dish_ids: HashSet::from([dish.id]),
                    variety_bucket: VarietyBucket {
                        week: 0,
                        day: 0,
                        slot: 0,
                    },
                })
                .await?;
            Ok(Some((dish, selection)))
        };

        match run().await {
            Ok(Some((dish, selection))) => {
                let substitutes: Vec<Value> = selection
                    .dishes
                    .iter()
                    .take(3)
                    .map(|d| {
                        json!({
                            "dish_id": d.id,
                            "name": d.name,
                            "calories": d.calories,
                            "protein_g": d.protein_g,
                        })
                    })
                    .collect();
                Ok(ToolOutput::success(json!({
                    "replacing": {"dish_id": dish.id, "name": dish.name},
                    "substitutes": substitutes,
                })))
            }
            Ok(None) => Ok(ToolOutput::failure("Dish not found")
                .with_metadata(json!({"error_code": "DISH_NOT_FOUND"}))),
            Err(e) => Err(ToolError::ExecutionFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

// ── get_recipe_details ──────────────────────────────────────────────

struct GetRecipeDetailsTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for GetRecipeDetailsTool {
    fn name(&self) -> &str {
        "get_recipe_details"
    }

    fn description(&self) -> &str {
        "Get a dish's serving size, nutrition, ingredients, and allergen flags."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dish_id": {"type": "string", "description": "UUID of the dish"}
            },
            "required": ["dish_id"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let dish_id = require_uuid(&params, "dish_id")?;
        let dish = self
            .deps
            .db
            .get_dish(dish_id)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        match dish {
            Some(dish) => Ok(ToolOutput::success(json!({
                "dish_id": dish.id,
                "name": dish.name,
                "meal_type": dish.meal_type,
                "serving_size_g": dish.serving_size_g,
                "calories": dish.calories,
                "protein_g": dish.protein_g,
                "carbs_g": dish.carbs_g,
                "fats_g": dish.fats_g,
                "ingredients": dish.ingredients,
                "contains_allergens": dish.contains_allergens,
                "is_vegetarian": dish.is_vegetarian,
                "is_vegan": dish.is_vegan,
            }))),
            None => Ok(ToolOutput::failure("Dish not found")
                .with_metadata(json!({"error_code": "DISH_NOT_FOUND"}))),
        }
    }
}

// ── calculate_nutrition ─────────────────────────────────────────────

struct CalculateNutritionTool {
    deps: ToolDeps,
}

#[async_trait]
impl Tool for CalculateNutritionTool {
    fn name(&self) -> &str {
        "calculate_nutrition"
    }

    fn description(&self) -> &str {
        "Total the calories and macros for a list of dishes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dish_ids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 1
                }
            },
            "required": ["dish_ids"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let ids = params
            .get("dish_ids")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::InvalidParameters {
                reason: "'dish_ids' must be a list".to_string(),
            })?;

        let mut totals = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for raw in ids {
            let Some(id) = raw.as_str().and_then(|s| s.parse::<uuid::Uuid>().ok()) else {
                return Err(ToolError::InvalidParameters {
                    reason: "'dish_ids' entries must be UUIDs".to_string(),
                });
            };
            match self.deps.db.get_dish(id).await {
                Ok(Some(dish)) => {
                    totals.0 += dish.calories;
                    totals.1 += dish.protein_g;
                    totals.2 += dish.carbs_g;
                    totals.3 += dish.fats_g;
                    found.push(dish.name);
                }
                Ok(None) => missing.push(id.to_string()),
                Err(e) => {
                    return Err(ToolError::ExecutionFailed {
                        name: self.name().to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        if found.is_empty() {
            return Ok(ToolOutput::failure("No matching dishes")
                .with_metadata(json!({"error_code": "DISH_NOT_FOUND"})));
        }
        Ok(ToolOutput::success(json!({
            "dishes": found,
            "missing": missing,
            "calories": totals.0,
            "protein_g": totals.1,
            "carbs_g": totals.2,
            "fats_g": totals.3,
        })))
    }
}

// ── save_* (onboarding-only) ────────────────────────────────────────

fn save_dietary_preferences(deps: &ToolDeps) -> SaveStepTool {
    SaveStepTool::forward(
        deps,
        "save_dietary_preferences",
        "Save the user's diet type plus allergies, intolerances, and dislikes.",
        4,
        "diet",
        json!({
            "type": "object",
            "properties": {
                "diet_type": {"type": "string",
                    "enum": ["omnivore", "vegetarian", "vegan", "pescatarian", "keto", "paleo"]},
                "allergies": {"type": "array", "items": {"type": "string"}},
                "intolerances": {"type": "array", "items": {"type": "string"}},
                "dislikes": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["diet_type", "allergies", "intolerances", "dislikes"]
        }),
    )
}

fn save_meal_plan(deps: &ToolDeps) -> SaveStepTool {
    SaveStepTool::forward(
        deps,
        "save_meal_plan",
        "Save the daily calorie target and macro percentages (must sum to 100).",
        5,
        "diet",
        json!({
            "type": "object",
            "properties": {
                "daily_calorie_target": {"type": "integer", "minimum": 1000, "maximum": 5000},
                "protein_percentage": {"type": "number", "minimum": 0, "maximum": 100},
                "carbs_percentage": {"type": "number", "minimum": 0, "maximum": 100},
                "fats_percentage": {"type": "number", "minimum": 0, "maximum": 100}
            },
            "required": ["daily_calorie_target", "protein_percentage",
                "carbs_percentage", "fats_percentage"]
        }),
    )
}
