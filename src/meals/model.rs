//! Dish catalogue and meal-template entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalogue slot a dish belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    PreWorkout,
    PostWorkout,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
            Self::PreWorkout => "pre_workout",
            Self::PostWorkout => "post_workout",
        }
    }

    /// Map a meal-schedule name to its catalogue slot by keyword.
    ///
    /// "Post-workout shake" → PostWorkout, "Big Breakfast" → Breakfast;
    /// anything unrecognised falls back to Snack.
    pub fn for_slot_name(name: &str) -> Self {
        let normalised: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        // "post workout" must win over plain "workout" checks; order matters.
        if normalised.contains("breakfast") {
            Self::Breakfast
        } else if normalised.contains("lunch") {
            Self::Lunch
        } else if normalised.contains("dinner") {
            Self::Dinner
        } else if normalised.contains("pre workout") || normalised.contains("preworkout") {
            Self::PreWorkout
        } else if normalised.contains("post workout") || normalised.contains("postworkout") {
            Self::PostWorkout
        } else {
            Self::Snack
        }
    }
}

impl std::str::FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            "snack" => Ok(Self::Snack),
            "pre_workout" => Ok(Self::PreWorkout),
            "post_workout" => Ok(Self::PostWorkout),
            other => Err(format!("unknown meal type: {other}")),
        }
    }
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dish in the shared read-only catalogue.
///
/// Fish/seafood is a first-class flag; pescatarian filtering never guesses
/// from names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dish {
    pub id: Uuid,
    pub name: String,
    pub meal_type: MealType,
    pub serving_size_g: f64,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub contains_red_meat: bool,
    pub contains_poultry: bool,
    pub contains_fish: bool,
    pub contains_allergens: Vec<String>,
    pub ingredients: Vec<String>,
    pub popularity_score: f64,
    pub is_active: bool,
}

/// One generated weekly template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealTemplate {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub week_number: i64,
    pub is_active: bool,
    pub generated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One dish assignment in a template slot.
///
/// Per (day, schedule) slot: exactly one primary plus two alternatives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMeal {
    pub id: Uuid,
    pub template_id: Uuid,
    pub meal_schedule_id: Uuid,
    pub dish_id: Uuid,
    pub day_of_week: i64,
    pub is_primary: bool,
    pub alternative_order: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_name_keyword_mapping() {
        assert_eq!(MealType::for_slot_name("Breakfast"), MealType::Breakfast);
        assert_eq!(MealType::for_slot_name("big breakfast"), MealType::Breakfast);
        assert_eq!(MealType::for_slot_name("Lunch"), MealType::Lunch);
        assert_eq!(MealType::for_slot_name("dinner"), MealType::Dinner);
        assert_eq!(
            MealType::for_slot_name("Pre-Workout Fuel"),
            MealType::PreWorkout
        );
        assert_eq!(
            MealType::for_slot_name("post_workout shake"),
            MealType::PostWorkout
        );
        assert_eq!(
            MealType::for_slot_name("Afternoon bite"),
            MealType::Snack
        );
    }

    #[test]
    fn meal_type_round_trip() {
        for raw in [
            "breakfast",
            "lunch",
            "dinner",
            "snack",
            "pre_workout",
            "post_workout",
        ] {
            let parsed: MealType = raw.parse().unwrap();
            assert_eq!(parsed.as_str(), raw);
        }
        assert!("brunch".parse::<MealType>().is_err());
    }
}
