//! System prompts for the specialised agents and the classifier.

use crate::agents::AgentKind;
use crate::context::AgentContext;

/// Persona paragraph per agent kind.
fn persona(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Workout => {
            "You are the workout coach. You help with training plans, exercise form, \
             logging sets, and working around injuries or missing equipment. During \
             onboarding you collect the user's fitness level, goals, and constraints \
             with your save tools."
        }
        AgentKind::Diet => {
            "You are the nutrition coach. You help with the meal plan, dish swaps, \
             recipes, and macro questions. During onboarding you collect diet type, \
             allergies, and the calorie/macro plan with your save tools."
        }
        AgentKind::Scheduler => {
            "You are the scheduling assistant. You manage workout days, meal times, \
             hydration reminders, and rescheduling. During onboarding you collect the \
             meal, workout, and hydration schedules with your save tools."
        }
        AgentKind::Supplement => {
            "You are the supplement advisor. You give general, evidence-aligned \
             information about common supplements and flag interaction cautions. You \
             never give medical advice and you always include the disclaimer your \
             tools return."
        }
        AgentKind::General => {
            "You are the user's personal fitness coach. You answer anything about \
             their training, nutrition, schedule, or supplements, using your tools to \
             look up their plans before answering."
        }
        AgentKind::Tracker => {
            "You are the progress tracker. You summarise what the user has logged and \
             how it relates to their goals."
        }
        AgentKind::Test => "You are a diagnostic agent. Answer plainly.",
    }
}

/// Compose the full system prompt for an agent.
pub fn system_prompt(kind: AgentKind, ctx: &AgentContext, voice_mode: bool) -> String {
    let mut sections = vec![persona(kind).to_string()];

    let mut profile = format!(
        "User snapshot: fitness level {}, primary goal {}, energy level {}.",
        ctx.fitness_level(),
        ctx.primary_goal(),
        ctx.energy_level().as_str(),
    );
    if let Some(secondary) = ctx.secondary_goal() {
        profile.push_str(&format!(" Secondary goal: {secondary}."));
    }
    sections.push(profile);

    if let Some(plan) = ctx.current_workout_plan().as_object()
        && !plan.is_empty()
    {
        sections.push(format!(
            "Current workout plan: {}",
            serde_json::Value::Object(plan.clone())
        ));
    }
    if let Some(plan) = ctx.current_meal_plan().as_object()
        && !plan.is_empty()
    {
        sections.push(format!(
            "Current meal plan: {}",
            serde_json::Value::Object(plan.clone())
        ));
    }

    if voice_mode {
        sections.push(
            "This is a voice conversation: answer in at most 75 words, no lists, no \
             markdown, speak naturally."
                .to_string(),
        );
    }

    sections.join("\n\n")
}

/// Classifier prompt; the output alphabet depends on the phase.
pub fn classifier_prompt(onboarding_mode: bool) -> String {
    let alphabet = if onboarding_mode {
        "workout, diet, scheduler, supplement"
    } else {
        "workout, diet, scheduler, supplement, tracker, general"
    };
    format!(
        "Classify the user's message into exactly one category. Reply with a single \
         word from this list and nothing else: {alphabet}.\n\
         workout = training, exercises, form, injuries\n\
         diet = food, meals, recipes, macros, calories\n\
         scheduler = times, days, reminders, rescheduling\n\
         supplement = supplements, vitamins, protein powder{}",
        if onboarding_mode {
            ""
        } else {
            "\ntracker = progress, history, logged workouts\ngeneral = anything else"
        }
    )
}
