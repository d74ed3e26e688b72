//! Dish selector (C4) — filtered, ranked candidates for one meal slot.
//!
//! Filtering is dietary-first (hard constraints), then a calorie/protein
//! window that relaxes once before going best-effort. Ranking is popularity
//! with a deterministic variety tie-break so adjacent days prefer
//! different top dishes.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::Error;
use crate::meals::model::{Dish, MealType};
use crate::profile::model::DietType;
use crate::store::Database;

/// Tight window: ±15 % calories, ±20 % protein.
const TIGHT_CALORIE_WINDOW: f64 = 0.15;
const TIGHT_PROTEIN_WINDOW: f64 = 0.20;
/// One relaxation step: ±25 % calories, ±30 % protein.
const RELAXED_CALORIE_WINDOW: f64 = 0.25;
const RELAXED_PROTEIN_WINDOW: f64 = 0.30;
/// Minimum candidates before the window relaxes.
const MIN_CANDIDATES: usize = 3;

/// Dietary constraints applied as hard filters.
#[derive(Debug, Clone)]
pub struct DietaryFilter {
    pub diet_type: DietType,
    pub allergies: Vec<String>,
    pub dislikes: Vec<String>,
}

/// `(week, day, slot)` tuple used as the ranking tie-break seed.
#[derive(Debug, Clone, Copy)]
pub struct VarietyBucket {
    pub week: i64,
    pub day: i64,
    pub slot: usize,
}

/// A candidate request for one slot.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub meal_type: MealType,
    pub dietary: DietaryFilter,
    pub target_calories: f64,
    pub target_protein: f64,
    pub exclude_dish_ids: HashSet<Uuid>,
    pub variety_bucket: VarietyBucket,
}

/// Which window produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTier {
    Tight,
    Relaxed,
    /// Both windows came up short; candidates are unwindowed.
    BestEffort,
}

/// Ranked candidates plus the window tier that produced them.
#[derive(Debug, Clone)]
pub struct Selection {
    pub dishes: Vec<Dish>,
    pub tier: WindowTier,
}

/// Selects dishes from the shared catalogue.
pub struct DishSelector {
    db: Arc<dyn Database>,
}

impl DishSelector {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Ranked candidate list for one slot.
    pub async fn get_candidates(&self, query: &CandidateQuery) -> Result<Selection, Error> {
        let catalogue = self.db.dishes_by_meal_type(query.meal_type).await?;

        let eligible: Vec<Dish> = catalogue
            .into_iter()
            .filter(|dish| !query.exclude_dish_ids.contains(&dish.id))
            .filter(|dish| passes_diet(dish, query.dietary.diet_type))
            .filter(|dish| !has_allergen(dish, &query.dietary.allergies))
            .filter(|dish| !is_disliked(dish, &query.dietary.dislikes))
            .collect();

        let tight: Vec<Dish> = eligible
            .iter()
            .filter(|d| {
                in_window(d.calories, query.target_calories, TIGHT_CALORIE_WINDOW)
                    && in_window(d.protein_g, query.target_protein, TIGHT_PROTEIN_WINDOW)
            })
            .cloned()
            .collect();

        let (mut dishes, tier) = if tight.len() >= MIN_CANDIDATES {
            (tight, WindowTier::Tight)
        } else {
            let relaxed: Vec<Dish> = eligible
                .iter()
                .filter(|d| {
                    in_window(d.calories, query.target_calories, RELAXED_CALORIE_WINDOW)
                        && in_window(d.protein_g, query.target_protein, RELAXED_PROTEIN_WINDOW)
                })
                .cloned()
                .collect();
            if relaxed.len() >= MIN_CANDIDATES {
                (relaxed, WindowTier::Relaxed)
            } else {
                (eligible, WindowTier::BestEffort)
            }
        };

        rank(&mut dishes, query.variety_bucket);
        Ok(Selection { dishes, tier })
    }
}

/// Popularity descending, variety hash as the deterministic tie-break.
fn rank(dishes: &mut [Dish], bucket: VarietyBucket) {
    dishes.sort_by(|a, b| {
        b.popularity_score
            .partial_cmp(&a.popularity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| variety_hash(a.id, bucket).cmp(&variety_hash(b.id, bucket)))
    });
}

/// FNV-1a over `(dish_id, week, day, slot)` — stable across runs, so the
/// same catalogue always yields the same rotation.
fn variety_hash(dish_id: Uuid, bucket: VarietyBucket) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    let mut eat = |bytes: &[u8]| {
        for &byte in bytes {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };
    eat(dish_id.as_bytes());
    eat(&bucket.week.to_le_bytes());
    eat(&bucket.day.to_le_bytes());
    eat(&(bucket.slot as u64).to_le_bytes());
    hash
}

fn passes_diet(dish: &Dish, diet: DietType) -> bool {
    match diet {
        DietType::Vegan => dish.is_vegan,
        DietType::Vegetarian => dish.is_vegetarian,
        DietType::Pescatarian => !dish.contains_red_meat && !dish.contains_poultry,
        // Keto/paleo have no flag filter; the macro windows carry the load.
        DietType::Omnivore | DietType::Keto | DietType::Paleo => true,
    }
}

fn has_allergen(dish: &Dish, allergies: &[String]) -> bool {
    dish.contains_allergens.iter().any(|allergen| {
        allergies
            .iter()
            .any(|a| a.trim().eq_ignore_ascii_case(allergen.trim()))
    })
}

/// Case-insensitive substring match of any dislike token against the dish
/// name or its ingredient names.
fn is_disliked(dish: &Dish, dislikes: &[String]) -> bool {
    let name = dish.name.to_lowercase();
    dislikes.iter().any(|token| {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return false;
        }
        name.contains(&token)
            || dish
                .ingredients
                .iter()
                .any(|i| i.to_lowercase().contains(&token))
    })
}

fn in_window(value: f64, target: f64, fraction: f64) -> bool {
    if target <= 0.0 {
        // No meaningful target for this slot; accept everything.
        return true;
    }
    (value - target).abs() <= target * fraction
}
