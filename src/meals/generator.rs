//! Meal-template generator (C5).
//!
//! For every (day × configured meal slot) pick one primary and two
//! alternative dishes through the selector, under per-slot calorie and
//! protein shares derived from the user's meal plan.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::error::{Error, TemplateError};
use crate::meals::model::{MealTemplate, MealType, TemplateMeal};
use crate::meals::selector::{
    CandidateQuery, DietaryFilter, DishSelector, VarietyBucket, WindowTier,
};
use crate::profile::model::{DietType, MealSchedule};
use crate::store::Database;

/// Dishes required per slot: one primary + two alternatives.
const SLOT_SIZE: usize = 3;

/// Per-slot calorie/protein share for the named slot kinds.
fn named_share(meal_type: MealType) -> Option<(f64, f64)> {
    match meal_type {
        MealType::Breakfast => Some((0.30, 0.30)),
        MealType::Lunch => Some((0.35, 0.30)),
        MealType::Dinner => Some((0.30, 0.30)),
        MealType::PreWorkout => Some((0.10, 0.10)),
        MealType::PostWorkout => Some((0.15, 0.20)),
        MealType::Snack => None,
    }
}

/// Allocate `(calorie_share, protein_share)` per schedule.
///
/// Named slots take their table share; snack slots split the residual.
/// If the total exceeds 1.0 every share is renormalised.
fn allocate_shares(schedules: &[MealSchedule]) -> Vec<(f64, f64)> {
    let kinds: Vec<MealType> = schedules
        .iter()
        .map(|s| MealType::for_slot_name(&s.meal_name))
        .collect();

    let named_cal: f64 = kinds.iter().filter_map(|k| named_share(*k)).map(|s| s.0).sum();
    let named_protein: f64 = kinds.iter().filter_map(|k| named_share(*k)).map(|s| s.1).sum();
    let snack_count = kinds.iter().filter(|k| **k == MealType::Snack).count();

    let snack_cal = if snack_count > 0 {
        (1.0 - named_cal).max(0.0) / snack_count as f64
    } else {
        0.0
    };
    let snack_protein = if snack_count > 0 {
        (1.0 - named_protein).max(0.0) / snack_count as f64
    } else {
        0.0
    };

    let mut shares: Vec<(f64, f64)> = kinds
        .iter()
        .map(|k| named_share(*k).unwrap_or((snack_cal, snack_protein)))
        .collect();

    let total_cal: f64 = shares.iter().map(|s| s.0).sum();
    if total_cal > 1.0 {
        for share in &mut shares {
            share.0 /= total_cal;
        }
    }
    let total_protein: f64 = shares.iter().map(|s| s.1).sum();
    if total_protein > 1.0 {
        for share in &mut shares {
            share.1 /= total_protein;
        }
    }
    shares
}

/// What happened while generating, for logging and invariant tests.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    /// Slots filled from a relaxed or best-effort window.
    pub relaxed_slots: usize,
    /// Slots that needed duplicate dishes to reach three entries.
    pub duplicated_slots: usize,
}

/// A generated template plus its report.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub template: MealTemplate,
    pub report: GenerationReport,
}

/// Generates weekly meal templates.
pub struct TemplateGenerator {
    db: Arc<dyn Database>,
    selector: DishSelector,
}

impl TemplateGenerator {
    pub fn new(db: Arc<dyn Database>) -> Self {
        let selector = DishSelector::new(Arc::clone(&db));
        Self { db, selector }
    }

    /// Generate (and activate) the template for one profile-week.
    ///
    /// Requires an unlocked profile with a meal plan and at least one meal
    /// schedule. Any previously-active template for the same week is
    /// deactivated.
    pub async fn generate_template(
        &self,
        profile_id: Uuid,
        week_number: u8,
        reason: Option<&str>,
    ) -> Result<GenerationOutcome, Error> {
        if !(1..=4).contains(&week_number) {
            return Err(TemplateError::WeekOutOfRange(week_number).into());
        }
        let profile = self
            .db
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| TemplateError::PreconditionFailed("profile not found".into()))?;
        if profile.is_locked {
            return Err(TemplateError::ProfileLocked(profile_id).into());
        }
        let plan = self.db.get_meal_plan(profile_id).await?.ok_or_else(|| {
            TemplateError::PreconditionFailed("profile has no meal plan".into())
        })?;
        let schedules = self.db.get_meal_schedules(profile_id).await?;
        if schedules.is_empty() {
            return Err(
                TemplateError::PreconditionFailed("profile has no meal schedules".into()).into(),
            );
        }

        let dietary = match self.db.get_dietary_preference(profile_id).await? {
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

        let daily_calories = plan.daily_calorie_target as f64;
        // Total protein grams: calories × share / 4 kcal per gram.
        let daily_protein =
            daily_calories * plan.protein_percentage.to_f64().unwrap_or(0.0) / 400.0;
        let shares = allocate_shares(&schedules);

        // Insert inactive, fill slots, then swap activation at the end —
        // the partial unique index on active templates never sees two, and
        // a failed fill leaves no half-built active template behind.
        let mut template = MealTemplate {
            id: Uuid::new_v4(),
            profile_id,
            week_number: week_number as i64,
            is_active: false,
            generated_by: "ai_agent".to_string(),
            generation_reason: reason.map(String::from),
            created_at: Utc::now(),
        };
        self.db.insert_meal_template(&template).await?;

        let report = match self
            .fill_slots(&template, &schedules, &shares, &dietary, daily_calories, daily_protein)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                if let Err(cleanup) = self.db.delete_meal_template(template.id).await {
                    tracing::error!(template_id = %template.id, error = %cleanup,
                        "Failed to discard partial template");
                }
                return Err(e);
            }
        };

        self.db
            .deactivate_meal_templates(profile_id, week_number as i64)
            .await?;
        self.db.set_template_active(template.id, true).await?;
        template.is_active = true;

        tracing::info!(
            profile_id = %profile_id,
            week = week_number,
            relaxed_slots = report.relaxed_slots,
            duplicated_slots = report.duplicated_slots,
            "Meal template generated"
        );
        Ok(GenerationOutcome { template, report })
    }

    async fn fill_slots(
        &self,
        template: &MealTemplate,
        schedules: &[MealSchedule],
        shares: &[(f64, f64)],
        dietary: &DietaryFilter,
        daily_calories: f64,
        daily_protein: f64,
    ) -> Result<GenerationReport, Error> {
        let profile_id = template.profile_id;
        let week_number = template.week_number;
        let mut report = GenerationReport::default();

        for day in 0..7i64 {
            let mut chosen_today: HashSet<Uuid> = HashSet::new();

            for (slot, (schedule, &(cal_share, protein_share))) in
                schedules.iter().zip(shares.iter()).enumerate()
            {
                let meal_type = MealType::for_slot_name(&schedule.meal_name);
                let query = CandidateQuery {
                    meal_type,
                    dietary: dietary.clone(),
                    target_calories: daily_calories * cal_share,
                    target_protein: daily_protein * protein_share,
                    exclude_dish_ids: chosen_today.clone(),
                    variety_bucket: VarietyBucket {
                        week: week_number,
                        day,
                        slot,
                    },
                };

                let mut selection = self.selector.get_candidates(&query).await?;
                if selection.dishes.len() < SLOT_SIZE {
                    // Not enough variety left today; retry without the
                    // intra-day exclusions.
                    let mut retry = query.clone();
                    retry.exclude_dish_ids.clear();
                    selection = self.selector.get_candidates(&retry).await?;
                }
                if selection.dishes.is_empty() {
                    return Err(TemplateError::PreconditionFailed(format!(
                        "no eligible dishes for slot '{}'",
                        schedule.meal_name
                    ))
                    .into());
                }
                if selection.tier != WindowTier::Tight {
                    report.relaxed_slots += 1;
                }
                if selection.dishes.len() < SLOT_SIZE {
                    report.duplicated_slots += 1;
                    tracing::warn!(
                        profile_id = %profile_id,
                        week = week_number,
                        day,
                        slot = %schedule.meal_name,
                        candidates = selection.dishes.len(),
                        "Filling slot with duplicate dishes"
                    );
                }

                for order in 0..SLOT_SIZE {
                    let dish = &selection.dishes[order % selection.dishes.len()];
                    chosen_today.insert(dish.id);
                    self.db
                        .insert_template_meal(&TemplateMeal {
                            id: Uuid::new_v4(),
                            template_id: template.id,
                            meal_schedule_id: schedule.id,
                            dish_id: dish.id,
                            day_of_week: day,
                            is_primary: order == 0,
                            alternative_order: (order + 1) as i64,
                        })
                        .await?;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meals::model::Dish;
    use crate::profile::model::{FitnessLevel, MealPlan, UserProfile};
    use crate::store::LibSqlBackend;
    use rust_decimal_macros::dec;

    fn test_dish(name: &str, meal_type: MealType, calories: f64, protein: f64, pop: f64) -> Dish {
        Dish {
            id: Uuid::new_v4(),
            name: name.to_string(),
            meal_type,
            serving_size_g: 300.0,
            calories,
            protein_g: protein,
            carbs_g: 50.0,
            fats_g: 15.0,
            is_vegetarian: true,
            is_vegan: true,
            contains_red_meat: false,
            contains_poultry: false,
            contains_fish: false,
            contains_allergens: Vec::new(),
            ingredients: Vec::new(),
            popularity_score: pop,
            is_active: true,
        }
    }

    /// Profile (unlocked) + 2000 kcal plan + breakfast/lunch/dinner slots +
    /// three dishes per slot near each target.
    async fn fixture() -> (Arc<dyn Database>, Uuid) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user_id = Uuid::new_v4();
        db.register_user(user_id, "Gen").await.unwrap();

        let now = Utc::now();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            user_id,
            fitness_level: FitnessLevel::Beginner,
            lifestyle_rating: None,
            is_locked: false,
            created_at: now,
            updated_at: now,
        };
        db.insert_profile(&profile).await.unwrap();

        db.insert_meal_plan(&MealPlan {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            daily_calorie_target: 2000,
            protein_percentage: dec!(30),
            carbs_percentage: dec!(45),
            fats_percentage: dec!(25),
        })
        .await
        .unwrap();

        for (name, time) in [("Breakfast", "07:00"), ("Lunch", "12:00"), ("Dinner", "18:00")] {
            db.insert_meal_schedule(&crate::profile::model::MealSchedule {
                id: Uuid::new_v4(),
                profile_id: profile.id,
                meal_name: name.to_string(),
                scheduled_time: time.to_string(),
                enable_notifications: true,
            })
            .await
            .unwrap();
        }

        // Targets: breakfast 600 kcal / 45 g, lunch 700 / 45, dinner 600 / 45.
        // Primaries land slightly above target so daily totals stay inside
        // [0.95 C, 1.05 C].
        for (i, cal) in [620.0, 630.0, 640.0].iter().enumerate() {
            db.insert_dish(&test_dish(
                &format!("breakfast {i}"),
                MealType::Breakfast,
                *cal,
                46.0,
                5.0 - i as f64,
            ))
            .await
            .unwrap();
        }
        for (i, cal) in [720.0, 730.0, 740.0].iter().enumerate() {
            db.insert_dish(&test_dish(
                &format!("lunch {i}"),
                MealType::Lunch,
                *cal,
                47.0,
                5.0 - i as f64,
            ))
            .await
            .unwrap();
        }
        for (i, cal) in [620.0, 625.0, 635.0].iter().enumerate() {
            db.insert_dish(&test_dish(
                &format!("dinner {i}"),
                MealType::Dinner,
                *cal,
                44.0,
                5.0 - i as f64,
            ))
            .await
            .unwrap();
        }

        let profile_id = profile.id;
        (db, profile_id)
    }

    #[test]
    fn share_allocation_named_slots() {
        let schedule = |name: &str| MealSchedule {
            id: Uuid::new_v4(),
            profile_id: Uuid::new_v4(),
            meal_name: name.to_string(),
            scheduled_time: "08:00".to_string(),
            enable_notifications: true,
        };

        let shares = allocate_shares(&[
            schedule("Breakfast"),
            schedule("Lunch"),
            schedule("Dinner"),
        ]);
        assert_eq!(shares, vec![(0.30, 0.30), (0.35, 0.30), (0.30, 0.30)]);

        // Snacks split the residual
        let shares = allocate_shares(&[
            schedule("Breakfast"),
            schedule("Lunch"),
            schedule("Dinner"),
            schedule("Afternoon bite"),
        ]);
        let snack = shares[3];
        assert!((snack.0 - 0.05).abs() < 1e-9);
        assert!((snack.1 - 0.10).abs() < 1e-9);

        // Over-allocated slots renormalise to 1.0
        let shares = allocate_shares(&[
            schedule("Breakfast"),
            schedule("Lunch"),
            schedule("Dinner"),
            schedule("Pre-workout"),
            schedule("Post-workout"),
        ]);
        let total: f64 = shares.iter().map(|s| s.0).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn week_out_of_range() {
        let (db, profile_id) = fixture().await;
        let generator = TemplateGenerator::new(db);
        assert!(matches!(
            generator.generate_template(profile_id, 0, None).await,
            Err(Error::Template(TemplateError::WeekOutOfRange(0)))
        ));
        assert!(matches!(
            generator.generate_template(profile_id, 5, None).await,
            Err(Error::Template(TemplateError::WeekOutOfRange(5)))
        ));
    }

    #[tokio::test]
    async fn locked_profile_rejected() {
        let (db, profile_id) = fixture().await;
        db.set_profile_locked(profile_id, true).await.unwrap();
        let generator = TemplateGenerator::new(db);
        assert!(matches!(
            generator.generate_template(profile_id, 1, None).await,
            Err(Error::Template(TemplateError::ProfileLocked(_)))
        ));
    }

    #[tokio::test]
    async fn slot_completeness_and_balance() {
        let (db, profile_id) = fixture().await;
        let generator = TemplateGenerator::new(Arc::clone(&db));
        let outcome = generator
            .generate_template(profile_id, 1, Some("Onboarding completed"))
            .await
            .unwrap();
        assert_eq!(outcome.report.relaxed_slots, 0);
        assert_eq!(outcome.report.duplicated_slots, 0);

        let meals = db.get_template_meals(outcome.template.id).await.unwrap();
        // 7 days × 3 slots × 3 entries
        assert_eq!(meals.len(), 63);

        let schedules = db.get_meal_schedules(profile_id).await.unwrap();
        for day in 0..7i64 {
            let mut daily_calories = 0.0;
            for schedule in &schedules {
                let slot: Vec<_> = meals
                    .iter()
                    .filter(|m| m.day_of_week == day && m.meal_schedule_id == schedule.id)
                    .collect();
                assert_eq!(slot.len(), 3, "slot {} day {day}", schedule.meal_name);
                assert_eq!(slot.iter().filter(|m| m.is_primary).count(), 1);
                assert_eq!(slot.iter().filter(|m| !m.is_primary).count(), 2);

                let primary = slot.iter().find(|m| m.is_primary).unwrap();
                let dish = db.get_dish(primary.dish_id).await.unwrap().unwrap();
                daily_calories += dish.calories;
            }
            // Tight-path invariant: within ±5 % of the 2000 kcal target
            assert!(
                (1900.0..=2100.0).contains(&daily_calories),
                "day {day} total {daily_calories}"
            );
        }
    }

    #[tokio::test]
    async fn regeneration_deactivates_previous() {
        let (db, profile_id) = fixture().await;
        let generator = TemplateGenerator::new(Arc::clone(&db));
        let first = generator
            .generate_template(profile_id, 2, None)
            .await
            .unwrap();
        let second = generator
            .generate_template(profile_id, 2, Some("regenerate"))
            .await
            .unwrap();

        let active = db.get_active_template(profile_id, 2).await.unwrap().unwrap();
        assert_eq!(active.id, second.template.id);
        assert_ne!(active.id, first.template.id);
    }

    #[tokio::test]
    async fn thin_catalogue_duplicates_with_warning() {
        let (db, profile_id) = fixture().await;
        // A slot type with a single dish: add a snack schedule and one snack
        db.insert_meal_schedule(&crate::profile::model::MealSchedule {
            id: Uuid::new_v4(),
            profile_id,
            meal_name: "Evening bite".to_string(),
            scheduled_time: "21:00".to_string(),
            enable_notifications: true,
        })
        .await
        .unwrap();
        db.insert_dish(&test_dish("only snack", MealType::Snack, 100.0, 5.0, 1.0))
            .await
            .unwrap();

        let generator = TemplateGenerator::new(Arc::clone(&db));
        let outcome = generator.generate_template(profile_id, 3, None).await.unwrap();
        // One duplicated snack slot per day
        assert_eq!(outcome.report.duplicated_slots, 7);

        let meals = db.get_template_meals(outcome.template.id).await.unwrap();
        assert_eq!(meals.len(), 7 * 4 * 3);
    }

    #[tokio::test]
    async fn missing_meal_plan_is_a_precondition_failure() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user_id = Uuid::new_v4();
        db.register_user(user_id, "NoPlan").await.unwrap();
        let now = Utc::now();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            user_id,
            fitness_level: FitnessLevel::Beginner,
            lifestyle_rating: None,
            is_locked: false,
            created_at: now,
            updated_at: now,
        };
        db.insert_profile(&profile).await.unwrap();

        let generator = TemplateGenerator::new(db);
        assert!(matches!(
            generator.generate_template(profile.id, 1, None).await,
            Err(Error::Template(TemplateError::PreconditionFailed(_)))
        ));
    }
}
