//! OnboardingManager — step submission, progress, and completion checks (C2).

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, OnboardingError};
use crate::onboarding::model::{OnboardingState, Progress, STEP_COUNT};
use crate::onboarding::validators::validate_step;
use crate::store::Database;

/// Coordinates the nine-step onboarding flow over the store.
pub struct OnboardingManager {
    db: Arc<dyn Database>,
}

impl OnboardingManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// The user's onboarding state, if any.
    pub async fn get_state(&self, user_id: Uuid) -> Result<Option<OnboardingState>, Error> {
        Ok(self.db.get_onboarding_state(user_id).await?)
    }

    /// Progress summary, including current/next step metadata.
    pub async fn get_progress(&self, user_id: Uuid) -> Result<Progress, Error> {
        let state = self.require_state(user_id).await?;
        Ok(Progress::for_state(&state))
    }

    /// Validate and persist one step document.
    ///
    /// A validation failure makes no persistent changes. A stale step
    /// (k ≤ current_step) is accepted and only updates `step_data`.
    pub async fn save_step(
        &self,
        user_id: Uuid,
        step: u8,
        data: serde_json::Value,
        agent_tag: Option<&str>,
    ) -> Result<OnboardingState, Error> {
        let mut state = self.require_state(user_id).await?;
        if state.is_complete {
            return Err(OnboardingError::AlreadyComplete.into());
        }
        if !(1..=STEP_COUNT).contains(&step) {
            return Err(OnboardingError::StepOutOfRange(step).into());
        }
        validate_step(step, &data)?;

        state.record_step(step, data, agent_tag);
        self.db.save_onboarding_state(&state).await?;
        tracing::debug!(
            user_id = %user_id,
            step,
            current_step = state.current_step,
            "Onboarding step saved"
        );
        Ok(state)
    }

    /// Whether all nine step documents are present.
    pub async fn can_complete(&self, user_id: Uuid) -> Result<bool, Error> {
        let state = self.require_state(user_id).await?;
        Ok(state.all_steps_present())
    }

    async fn require_state(&self, user_id: Uuid) -> Result<OnboardingState, Error> {
        self.db
            .get_onboarding_state(user_id)
            .await?
            .ok_or_else(|| OnboardingError::StateNotFound(user_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use serde_json::json;

    async fn setup() -> (OnboardingManager, Arc<dyn Database>, Uuid) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user_id = Uuid::new_v4();
        db.register_user(user_id, "Test").await.unwrap();
        (OnboardingManager::new(Arc::clone(&db)), db, user_id)
    }

    #[tokio::test]
    async fn save_step_persists_and_advances() {
        let (manager, _, user_id) = setup().await;
        let state = manager
            .save_step(
                user_id,
                1,
                json!({"fitness_level": "beginner"}),
                Some("workout"),
            )
            .await
            .unwrap();
        assert_eq!(state.current_step, 1);

        let progress = manager.get_progress(user_id).await.unwrap();
        assert_eq!(progress.completed_states, vec![1]);
        assert_eq!(progress.completion_percentage, 11);
    }

    #[tokio::test]
    async fn invalid_document_leaves_no_trace() {
        let (manager, _, user_id) = setup().await;
        let err = manager
            .save_step(user_id, 1, json!({"fitness_level": "olympian"}), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Onboarding(OnboardingError::Validation { .. })
        ));

        let progress = manager.get_progress(user_id).await.unwrap();
        assert!(progress.completed_states.is_empty());
        assert_eq!(progress.current_step, 0);
    }

    #[tokio::test]
    async fn step_out_of_range_rejected() {
        let (manager, _, user_id) = setup().await;
        assert!(matches!(
            manager.save_step(user_id, 0, json!({}), None).await,
            Err(Error::Onboarding(OnboardingError::StepOutOfRange(0)))
        ));
        assert!(matches!(
            manager.save_step(user_id, 10, json!({}), None).await,
            Err(Error::Onboarding(OnboardingError::StepOutOfRange(10)))
        ));
    }

    #[tokio::test]
    async fn unknown_user_rejected() {
        let (manager, _, _) = setup().await;
        let err = manager
            .save_step(Uuid::new_v4(), 1, json!({"fitness_level": "beginner"}), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Onboarding(OnboardingError::StateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stale_step_updates_without_advancing() {
        let (manager, _, user_id) = setup().await;
        manager
            .save_step(user_id, 1, json!({"fitness_level": "beginner"}), None)
            .await
            .unwrap();
        manager
            .save_step(
                user_id,
                3,
                json!({"equipment": [], "injuries": [], "limitations": []}),
                None,
            )
            .await
            .unwrap();

        // Resubmit step 1 with different data
        let state = manager
            .save_step(user_id, 1, json!({"fitness_level": "advanced"}), None)
            .await
            .unwrap();
        assert_eq!(state.current_step, 3);
        assert_eq!(
            state.step_document(1).unwrap()["fitness_level"],
            "advanced"
        );
    }

    #[tokio::test]
    async fn frozen_after_completion() {
        let (manager, db, user_id) = setup().await;
        let mut state = db.get_onboarding_state(user_id).await.unwrap().unwrap();
        state.is_complete = true;
        state.current_step = 9;
        db.save_onboarding_state(&state).await.unwrap();

        let err = manager
            .save_step(user_id, 1, json!({"fitness_level": "beginner"}), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Onboarding(OnboardingError::AlreadyComplete)
        ));
    }

    #[tokio::test]
    async fn can_complete_requires_all_nine() {
        let (manager, _, user_id) = setup().await;
        assert!(!manager.can_complete(user_id).await.unwrap());

        let documents: [(u8, serde_json::Value); 9] = [
            (1, json!({"fitness_level": "beginner"})),
            (2, json!({"goals": [{"goal_type": "general_fitness"}]})),
            (3, json!({"equipment": [], "injuries": [], "limitations": []})),
            (4, json!({"diet_type": "omnivore", "allergies": [], "intolerances": [], "dislikes": []})),
            (5, json!({"daily_calorie_target": 2000, "protein_percentage": 30,
                "carbs_percentage": 40, "fats_percentage": 30})),
            (6, json!({"meals": [{"meal_name": "Lunch", "scheduled_time": "12:00"}]})),
            (7, json!({"workouts": [{"day_of_week": 0, "scheduled_time": "06:00"}]})),
            (8, json!({"daily_water_target_ml": 2000})),
            (9, json!({"interested_in_supplements": false})),
        ];
        for (step, data) in documents {
            manager.save_step(user_id, step, data, None).await.unwrap();
            let expected = step == 9;
            assert_eq!(manager.can_complete(user_id).await.unwrap(), expected);
        }
    }
}
