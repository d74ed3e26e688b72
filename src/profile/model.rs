//! Profile entities and their enums.
//!
//! Everything here is materialised in one transaction at onboarding
//! completion and locked afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Self-reported fitness level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl FitnessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl Default for FitnessLevel {
    fn default() -> Self {
        Self::Beginner
    }
}

impl std::str::FromStr for FitnessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown fitness level: {other}")),
        }
    }
}

impl std::fmt::Display for FitnessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fitness goal category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    FatLoss,
    MuscleGain,
    GeneralFitness,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FatLoss => "fat_loss",
            Self::MuscleGain => "muscle_gain",
            Self::GeneralFitness => "general_fitness",
        }
    }
}

impl std::str::FromStr for GoalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fat_loss" => Ok(Self::FatLoss),
            "muscle_gain" => Ok(Self::MuscleGain),
            "general_fitness" => Ok(Self::GeneralFitness),
            other => Err(format!("unknown goal type: {other}")),
        }
    }
}

impl std::fmt::Display for GoalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of physical constraint recorded during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    Equipment,
    Injury,
    Limitation,
}

impl ConstraintType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::Injury => "injury",
            Self::Limitation => "limitation",
        }
    }
}

impl std::str::FromStr for ConstraintType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equipment" => Ok(Self::Equipment),
            "injury" => Ok(Self::Injury),
            "limitation" => Ok(Self::Limitation),
            other => Err(format!("unknown constraint type: {other}")),
        }
    }
}

/// Constraint severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "moderate" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Dietary regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietType {
    Omnivore,
    Vegetarian,
    Vegan,
    Pescatarian,
    Keto,
    Paleo,
}

impl DietType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Omnivore => "omnivore",
            Self::Vegetarian => "vegetarian",
            Self::Vegan => "vegan",
            Self::Pescatarian => "pescatarian",
            Self::Keto => "keto",
            Self::Paleo => "paleo",
        }
    }
}

impl std::str::FromStr for DietType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "omnivore" => Ok(Self::Omnivore),
            "vegetarian" => Ok(Self::Vegetarian),
            "vegan" => Ok(Self::Vegan),
            "pescatarian" => Ok(Self::Pescatarian),
            "keto" => Ok(Self::Keto),
            "paleo" => Ok(Self::Paleo),
            other => Err(format!("unknown diet type: {other}")),
        }
    }
}

impl std::fmt::Display for DietType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Energy level derived from the lifestyle rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    /// Map a lifestyle rating in [1,10] to an energy level.
    ///
    /// [1,3] → low, [4,7] → medium, [8,10] → high; anything else (or no
    /// rating) defaults to medium.
    pub fn from_rating(rating: Option<i64>) -> Self {
        match rating {
            Some(1..=3) => Self::Low,
            Some(8..=10) => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// The locked user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub fitness_level: FitnessLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifestyle_rating: Option<i64>,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A prioritised fitness goal; priority is unique per profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessGoal {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub goal_type: GoalType,
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_body_fat_percentage: Option<f64>,
}

/// Equipment, injury, or limitation note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalConstraint {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub constraint_type: ConstraintType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Diet type plus the three free-form exclusion lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DietaryPreference {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub diet_type: DietType,
    pub allergies: Vec<String>,
    pub intolerances: Vec<String>,
    pub dislikes: Vec<String>,
}

/// Daily calorie target and macro split (percentages sum to 100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub daily_calorie_target: i64,
    pub protein_percentage: Decimal,
    pub carbs_percentage: Decimal,
    pub fats_percentage: Decimal,
}

/// A named meal slot; meal_name is unique per profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealSchedule {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub meal_name: String,
    /// "HH:MM", zero-padded.
    pub scheduled_time: String,
    pub enable_notifications: bool,
}

/// One workout day; day_of_week (Mon=0) is unique per profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutSchedule {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub day_of_week: i64,
    pub scheduled_time: String,
    pub enable_notifications: bool,
}

/// Daily water target and reminder cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationPreference {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub daily_water_target_ml: i64,
    pub reminder_frequency_minutes: i64,
    pub enable_notifications: bool,
}

/// Immutable JSON snapshot of a profile and its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileVersion {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub version: i64,
    pub reason: String,
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The profile with all child rows, as returned by completion and /users/me.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullProfile {
    pub profile: UserProfile,
    pub goals: Vec<FitnessGoal>,
    pub constraints: Vec<PhysicalConstraint>,
    pub dietary_preference: Option<DietaryPreference>,
    pub meal_plan: Option<MealPlan>,
    pub meal_schedules: Vec<MealSchedule>,
    pub workout_schedules: Vec<WorkoutSchedule>,
    pub hydration_preference: Option<HydrationPreference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_level_rating_bands() {
        assert_eq!(EnergyLevel::from_rating(Some(1)), EnergyLevel::Low);
        assert_eq!(EnergyLevel::from_rating(Some(3)), EnergyLevel::Low);
        assert_eq!(EnergyLevel::from_rating(Some(4)), EnergyLevel::Medium);
        assert_eq!(EnergyLevel::from_rating(Some(7)), EnergyLevel::Medium);
        assert_eq!(EnergyLevel::from_rating(Some(8)), EnergyLevel::High);
        assert_eq!(EnergyLevel::from_rating(Some(10)), EnergyLevel::High);
        assert_eq!(EnergyLevel::from_rating(None), EnergyLevel::Medium);
        // Out-of-range ratings never panic
        assert_eq!(EnergyLevel::from_rating(Some(42)), EnergyLevel::Medium);
    }

    #[test]
    fn enum_round_trips() {
        for level in ["beginner", "intermediate", "advanced"] {
            let parsed: FitnessLevel = level.parse().unwrap();
            assert_eq!(parsed.as_str(), level);
        }
        for goal in ["fat_loss", "muscle_gain", "general_fitness"] {
            let parsed: GoalType = goal.parse().unwrap();
            assert_eq!(parsed.as_str(), goal);
        }
        for diet in ["omnivore", "vegetarian", "vegan", "pescatarian", "keto", "paleo"] {
            let parsed: DietType = diet.parse().unwrap();
            assert_eq!(parsed.as_str(), diet);
        }
        assert!("cardio".parse::<GoalType>().is_err());
    }

    #[test]
    fn display_matches_serde() {
        let level = FitnessLevel::Intermediate;
        assert_eq!(
            format!("\"{level}\""),
            serde_json::to_string(&level).unwrap()
        );
        let diet = DietType::Pescatarian;
        assert_eq!(format!("\"{diet}\""), serde_json::to_string(&diet).unwrap());
    }
}
