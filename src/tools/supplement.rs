//! Supplement tool family.
//!
//! Every response carries the non-medical-advice disclaimer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::workout::SaveStepTool;
use crate::tools::{require_str, Tool, ToolDeps, ToolOutput};

/// Attached to every supplement tool response.
pub const DISCLAIMER: &str = "This is general information, not medical advice. Consult a \
     healthcare professional before starting or combining supplements.";

/// All supplement tools for one agent instance.
pub fn supplement_tools(deps: &ToolDeps, onboarding_mode: bool) -> Vec<Arc<dyn Tool>> {
    let mut tools = read_tools();
    if onboarding_mode {
        tools.push(Arc::new(save_supplement_preferences(deps)) as Arc<dyn Tool>);
    }
    tools
}

/// The informational subset the general agent delegates to.
pub fn read_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetSupplementInfoTool),
        Arc::new(CheckSupplementInteractionsTool),
    ]
}

/// Basic facts for the common supplements the coach discusses.
const SUPPLEMENTS: &[(&str, &str, &str)] = &[
    (
        "creatine",
        "3-5 g daily, timing does not matter; consistency does.",
        "Supports high-intensity performance and lean mass over weeks of use.",
    ),
    (
        "whey protein",
        "20-40 g per serving, typically after training or to fill a protein gap.",
        "Convenient complete protein; counts toward the daily protein target.",
    ),
    (
        "caffeine",
        "1-3 mg per kg bodyweight, 30-60 minutes before training.",
        "Acute performance aid; late doses disrupt sleep.",
    ),
    (
        "vitamin d",
        "1000-2000 IU daily with a meal containing fat.",
        "Worth testing blood levels before supplementing year-round.",
    ),
    (
        "omega-3",
        "1-2 g combined EPA/DHA daily with food.",
        "Supports recovery and general health; quality varies by brand.",
    ),
    (
        "magnesium",
        "200-400 mg in the evening.",
        "May help sleep quality; glycinate is gentler on digestion.",
    ),
];

/// Known interaction cautions between supplement pairs.
const INTERACTIONS: &[(&str, &str, &str)] = &[
    (
        "caffeine",
        "creatine",
        "Fine to combine, but very high caffeine may blunt some of creatine's benefit; keep doses moderate.",
    ),
    (
        "magnesium",
        "vitamin d",
        "Commonly combined; magnesium participates in vitamin D metabolism. Keep both within the usual dose ranges.",
    ),
    (
        "caffeine",
        "magnesium",
        "Caffeine increases magnesium excretion; separate doses by a few hours.",
    ),
];

// ── get_supplement_info ─────────────────────────────────────────────

struct GetSupplementInfoTool;

#[async_trait]
impl Tool for GetSupplementInfoTool {
    fn name(&self) -> &str {
        "get_supplement_info"
    }

    fn description(&self) -> &str {
        "Get typical dosing and purpose for a named supplement."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "supplement": {"type": "string", "description": "Supplement name, e.g. 'creatine'"}
            },
            "required": ["supplement"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let raw = require_str(&params, "supplement")?;
        let needle = raw.trim().to_lowercase();

        let found = SUPPLEMENTS
            .iter()
            .find(|(name, _, _)| needle.contains(name) || name.contains(&needle));

        let output = match found {
            Some((name, dosing, purpose)) => ToolOutput::success(json!({
                "supplement": name,
                "typical_dosing": dosing,
                "purpose": purpose,
                "disclaimer": DISCLAIMER,
            })),
            None => ToolOutput::failure(format!(
                "No information on '{raw}'. {DISCLAIMER}"
            )),
        };
        Ok(output.with_metadata(json!({"disclaimer": DISCLAIMER})))
    }
}

// ── check_supplement_interactions ───────────────────────────────────

struct CheckSupplementInteractionsTool;

#[async_trait]
impl Tool for CheckSupplementInteractionsTool {
    fn name(&self) -> &str {
        "check_supplement_interactions"
    }

    fn description(&self) -> &str {
        "Check a list of supplements for known interaction cautions."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "supplements": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 2
                }
            },
            "required": ["supplements"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let supplements: Vec<String> = params
            .get("supplements")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim().to_lowercase())
                    .collect()
            })
            .filter(|list: &Vec<String>| list.len() >= 2)
            .ok_or_else(|| ToolError::InvalidParameters {
                reason: "'supplements' must list at least two names".to_string(),
            })?;

        let mut cautions = Vec::new();
        for (a, b, caution) in INTERACTIONS {
            let has_a = supplements.iter().any(|s| s.contains(a));
            let has_b = supplements.iter().any(|s| s.contains(b));
            if has_a && has_b {
                cautions.push(json!({"pair": [a, b], "caution": caution}));
            }
        }

        Ok(ToolOutput::success(json!({
            "supplements": supplements,
            "cautions": cautions,
            "disclaimer": DISCLAIMER,
        }))
        .with_metadata(json!({"disclaimer": DISCLAIMER})))
    }
}

// ── save (onboarding-only) ──────────────────────────────────────────

// The supplements step (9) persists through the owning agent like the
// other onboarding states.
fn save_supplement_preferences(deps: &ToolDeps) -> SaveStepTool {
    SaveStepTool::forward(
        deps,
        "save_supplement_preferences",
        "Save whether the user is interested in supplements and what they already take.",
        9,
        "supplement",
        json!({
            "type": "object",
            "properties": {
                "interested_in_supplements": {"type": "boolean"},
                "current_supplements": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["interested_in_supplements"]
        }),
    )
}
