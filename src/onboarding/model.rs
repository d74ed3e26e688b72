//! Onboarding state machine data: the nine-step progression record and its
//! immutable step metadata table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::AgentKind;

/// Number of onboarding steps.
pub const STEP_COUNT: u8 = 9;

/// Static metadata for one onboarding step.
#[derive(Debug, Clone, Copy)]
pub struct StepInfo {
    pub step: u8,
    pub name: &'static str,
    /// Specialised agent that owns this step's conversation.
    pub agent: AgentKind,
    pub required_fields: &'static [&'static str],
}

/// The immutable step table, referenced by the UI and by onboarding
/// classification defaults.
pub const STEPS: [StepInfo; STEP_COUNT as usize] = [
    StepInfo {
        step: 1,
        name: "Fitness level",
        agent: AgentKind::Workout,
        required_fields: &["fitness_level"],
    },
    StepInfo {
        step: 2,
        name: "Fitness goals",
        agent: AgentKind::Workout,
        required_fields: &["goals"],
    },
    StepInfo {
        step: 3,
        name: "Workout constraints",
        agent: AgentKind::Workout,
        required_fields: &["equipment", "injuries", "limitations"],
    },
    StepInfo {
        step: 4,
        name: "Diet preferences",
        agent: AgentKind::Diet,
        required_fields: &["diet_type", "allergies", "intolerances", "dislikes"],
    },
    StepInfo {
        step: 5,
        name: "Meal plan",
        agent: AgentKind::Diet,
        required_fields: &[
            "daily_calorie_target",
            "protein_percentage",
            "carbs_percentage",
            "fats_percentage",
        ],
    },
    StepInfo {
        step: 6,
        name: "Meal schedule",
        agent: AgentKind::Scheduler,
        required_fields: &["meals"],
    },
    StepInfo {
        step: 7,
        name: "Workout schedule",
        agent: AgentKind::Scheduler,
        required_fields: &["workouts"],
    },
    StepInfo {
        step: 8,
        name: "Hydration",
        agent: AgentKind::Scheduler,
        required_fields: &["daily_water_target_ml"],
    },
    StepInfo {
        step: 9,
        name: "Supplements",
        agent: AgentKind::Supplement,
        required_fields: &["interested_in_supplements"],
    },
];

/// Metadata for step `k`, if `k` ∈ [1,9].
pub fn step_info(k: u8) -> Option<&'static StepInfo> {
    if (1..=STEP_COUNT).contains(&k) {
        Some(&STEPS[(k - 1) as usize])
    } else {
        None
    }
}

/// Key under which step `k`'s document is stored in `step_data`.
pub fn step_key(k: u8) -> String {
    format!("step_{k}")
}

/// One entry in the append-only agent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHistoryEntry {
    pub state: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub previous_state: u8,
    pub timestamp: DateTime<Utc>,
}

/// Per-user onboarding progression record.
///
/// `step_data` is an opaque document map keyed `"step_k"`; each value has
/// the schema its step validator accepts. `current_step` is monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingState {
    pub user_id: Uuid,
    pub current_step: u8,
    pub is_complete: bool,
    pub step_data: BTreeMap<String, serde_json::Value>,
    pub agent_history: Vec<AgentHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingState {
    /// Fresh record created at user registration.
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            current_step: 0,
            is_complete: false,
            step_data: BTreeMap::new(),
            agent_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_step(&self, k: u8) -> bool {
        self.step_data.contains_key(&step_key(k))
    }

    /// Steps with a submitted document, ascending.
    pub fn completed_steps(&self) -> Vec<u8> {
        (1..=STEP_COUNT).filter(|&k| self.has_step(k)).collect()
    }

    pub fn step_document(&self, k: u8) -> Option<&serde_json::Value> {
        self.step_data.get(&step_key(k))
    }

    /// Record a validated step document.
    ///
    /// A stale step (k ≤ current_step) only updates `step_data`; a forward
    /// step advances `current_step` and appends to the agent history.
    pub fn record_step(&mut self, k: u8, data: serde_json::Value, agent_tag: Option<&str>) {
        self.step_data.insert(step_key(k), data);
        if k > self.current_step {
            let previous = self.current_step;
            self.current_step = k;
            self.agent_history.push(AgentHistoryEntry {
                state: k,
                agent: agent_tag.map(String::from),
                previous_state: previous,
                timestamp: Utc::now(),
            });
        }
        self.updated_at = Utc::now();
    }

    /// All nine step documents present.
    pub fn all_steps_present(&self) -> bool {
        self.completed_steps().len() == STEP_COUNT as usize
    }
}

/// Serializable view of a step's metadata.
#[derive(Debug, Clone, Serialize)]
pub struct StepInfoView {
    pub step: u8,
    pub name: &'static str,
    pub agent: &'static str,
    pub required_fields: Vec<&'static str>,
}

impl From<&'static StepInfo> for StepInfoView {
    fn from(info: &'static StepInfo) -> Self {
        Self {
            step: info.step,
            name: info.name,
            agent: info.agent.as_str(),
            required_fields: info.required_fields.to_vec(),
        }
    }
}

/// Progress summary returned by `GET /onboarding/progress`.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub current_step: u8,
    pub is_complete: bool,
    pub completed_states: Vec<u8>,
    pub completion_percentage: u8,
    pub can_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state_info: Option<StepInfoView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_state_info: Option<StepInfoView>,
}

impl Progress {
    pub fn for_state(state: &OnboardingState) -> Self {
        let completed = state.completed_steps();
        let percentage = (completed.len() * 100 / STEP_COUNT as usize) as u8;
        let can_complete = completed.len() == STEP_COUNT as usize;
        let next = state.current_step + 1;
        Self {
            current_step: state.current_step,
            is_complete: state.is_complete,
            completion_percentage: percentage,
            can_complete,
            completed_states: completed,
            current_state_info: step_info(state.current_step).map(StepInfoView::from),
            next_state_info: step_info(next).map(StepInfoView::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_table_covers_all_nine() {
        assert_eq!(STEPS.len(), 9);
        for (i, info) in STEPS.iter().enumerate() {
            assert_eq!(info.step as usize, i + 1);
            assert!(!info.required_fields.is_empty());
        }
        assert!(step_info(0).is_none());
        assert!(step_info(10).is_none());
        assert_eq!(step_info(4).unwrap().agent, AgentKind::Diet);
        assert_eq!(step_info(7).unwrap().agent, AgentKind::Scheduler);
        assert_eq!(step_info(9).unwrap().agent, AgentKind::Supplement);
    }

    #[test]
    fn record_step_is_monotonic() {
        let mut state = OnboardingState::new(Uuid::new_v4());
        state.record_step(3, json!({"equipment": []}), Some("workout"));
        assert_eq!(state.current_step, 3);
        assert_eq!(state.agent_history.len(), 1);
        assert_eq!(state.agent_history[0].previous_state, 0);

        // Stale resubmission updates data without moving the cursor or
        // growing history.
        state.record_step(1, json!({"fitness_level": "beginner"}), Some("workout"));
        assert_eq!(state.current_step, 3);
        assert_eq!(state.agent_history.len(), 1);
        assert!(state.has_step(1));

        state.record_step(5, json!({}), None);
        assert_eq!(state.current_step, 5);
        assert_eq!(state.agent_history.len(), 2);
        assert_eq!(state.agent_history[1].previous_state, 3);
    }

    #[test]
    fn progress_percentage_floors() {
        let mut state = OnboardingState::new(Uuid::new_v4());
        state.record_step(1, json!({}), None);
        state.record_step(2, json!({}), None);
        let progress = Progress::for_state(&state);
        // 2/9 = 22.2% floors to 22
        assert_eq!(progress.completion_percentage, 22);
        assert!(!progress.can_complete);
        assert_eq!(progress.completed_states, vec![1, 2]);
        assert_eq!(progress.current_state_info.as_ref().unwrap().step, 2);
        assert_eq!(progress.next_state_info.as_ref().unwrap().step, 3);
    }

    #[test]
    fn progress_at_final_step_has_no_next() {
        let mut state = OnboardingState::new(Uuid::new_v4());
        for k in 1..=9 {
            state.record_step(k, json!({}), None);
        }
        let progress = Progress::for_state(&state);
        assert_eq!(progress.completion_percentage, 100);
        assert!(progress.can_complete);
        assert!(progress.next_state_info.is_none());
        assert_eq!(progress.current_state_info.as_ref().unwrap().step, 9);
    }

    #[test]
    fn state_serde_round_trip() {
        let mut state = OnboardingState::new(Uuid::new_v4());
        state.record_step(1, json!({"fitness_level": "advanced"}), Some("workout"));
        let json = serde_json::to_string(&state).unwrap();
        let parsed: OnboardingState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.current_step, 1);
        assert_eq!(parsed.step_document(1).unwrap()["fitness_level"], "advanced");
        assert_eq!(parsed.agent_history.len(), 1);
    }
}
