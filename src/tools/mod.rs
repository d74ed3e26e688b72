//! Tool abstraction for agent capabilities.
//!
//! Every tool returns a JSON envelope `{success, data?|error?, metadata}`
//! so the model sees a uniform result shape.

pub mod diet;
pub mod registry;
pub mod scheduler;
pub mod supplement;
pub mod workout;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::AgentContext;
use crate::error::ToolError;
use crate::store::Database;

pub use registry::ToolRegistry;

/// Shared dependencies handed to every tool at construction.
#[derive(Clone)]
pub struct ToolDeps {
    pub db: Arc<dyn Database>,
    pub ctx: Arc<AgentContext>,
}

/// The uniform tool result envelope.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub metadata: Value,
}

impl ToolOutput {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: json!({}),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The JSON document handed back to the model.
    pub fn to_json(&self) -> Value {
        let mut doc = json!({
            "success": self.success,
            "metadata": self.metadata,
        });
        if let Some(ref data) = self.data {
            doc["data"] = data.clone();
        }
        if let Some(ref error) = self.error {
            doc["error"] = Value::String(error.clone());
        }
        doc
    }
}

/// An executable agent capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Tools that forward to the onboarding store are bound only while
    /// onboarding is active.
    fn onboarding_only(&self) -> bool {
        false
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError>;
}

// ── Parameter helpers ───────────────────────────────────────────────

pub fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters {
            reason: format!("'{field}' must be a string"),
        })
}

pub fn require_i64(params: &Value, field: &str) -> Result<i64, ToolError> {
    params
        .get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ToolError::InvalidParameters {
            reason: format!("'{field}' must be an integer"),
        })
}

pub fn require_bool(params: &Value, field: &str) -> Result<bool, ToolError> {
    params
        .get(field)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| ToolError::InvalidParameters {
            reason: format!("'{field}' must be a boolean"),
        })
}

pub fn require_uuid(params: &Value, field: &str) -> Result<uuid::Uuid, ToolError> {
    let raw = require_str(params, field)?;
    raw.parse().map_err(|_| ToolError::InvalidParameters {
        reason: format!("'{field}' must be a UUID"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shapes() {
        let ok = ToolOutput::success(json!({"value": 1}));
        let doc = ok.to_json();
        assert_eq!(doc["success"], true);
        assert_eq!(doc["data"]["value"], 1);
        assert!(doc.get("error").is_none());

        let err = ToolOutput::failure("Conflict detected");
        let doc = err.to_json();
        assert_eq!(doc["success"], false);
        assert_eq!(doc["error"], "Conflict detected");
        assert!(doc.get("data").is_none());
    }

    #[test]
    fn helpers_reject_wrong_types() {
        let params = json!({"a": "text", "n": 3, "b": true});
        assert_eq!(require_str(&params, "a").unwrap(), "text");
        assert!(require_str(&params, "n").is_err());
        assert_eq!(require_i64(&params, "n").unwrap(), 3);
        assert!(require_i64(&params, "a").is_err());
        assert!(require_bool(&params, "b").unwrap());
        assert!(require_uuid(&params, "a").is_err());
    }
}
