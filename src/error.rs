//! Error types for the coaching backend.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Access violation: {0}")]
    Access(#[from] AccessError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out")]
    Timeout { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Context-loading errors (C1).
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("No onboarding record for user {0}")]
    UserProfileNotFound(Uuid),
}

/// Onboarding errors (C2/C3).
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("No onboarding record for user {0}")]
    StateNotFound(Uuid),

    #[error("Onboarding step out of range: {0}")]
    StepOutOfRange(u8),

    #[error("Onboarding is not complete: {completed} of 9 steps done")]
    Incomplete { completed: usize },

    #[error("Onboarding already completed")]
    AlreadyComplete,
}

impl OnboardingError {
    /// Validation failure with a field pointer.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Validation failure without a specific field.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }
}

/// Access-control violations (C8 decision table).
///
/// Each variant carries the machine-readable reason code the orchestrator
/// logs at WARN.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AccessError {
    #[error("Onboarding already completed; use regular chat")]
    OnboardingAlreadyCompleted,

    #[error("Complete onboarding first; currently at step {current_step}/9")]
    OnboardingNotCompleted { current_step: u8 },

    #[error("The general agent is not available during onboarding")]
    GeneralDuringOnboarding,

    #[error("The tracker agent is not available during onboarding")]
    TrackerDuringOnboarding,

    #[error("Specialised agent {agent} is not available after onboarding")]
    SpecialisedPostOnboarding { agent: String },
}

impl AccessError {
    /// Machine-readable reason code for WARN logs and response bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OnboardingAlreadyCompleted => "onboarding_already_completed",
            Self::OnboardingNotCompleted { .. } => "onboarding_not_completed",
            Self::GeneralDuringOnboarding => "general_during_onboarding",
            Self::TrackerDuringOnboarding => "tracker_during_onboarding",
            Self::SpecialisedPostOnboarding { .. } => "specialised_post_onboarding",
        }
    }
}

/// Meal-template generation errors (C5).
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Profile {0} is locked; unlock before regenerating templates")]
    ProfileLocked(Uuid),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Week number out of range: {0}")]
    WeekOutOfRange(u8),
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Invalid tool parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("Tool {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Conflict detected")]
    Conflict,
}

impl Error {
    /// The `error_code` string exposed on the HTTP surface.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Onboarding(OnboardingError::Incomplete { .. }) => "ONBOARDING_REQUIRED",
            Self::Onboarding(_) => "VALIDATION_ERROR",
            Self::Access(AccessError::OnboardingNotCompleted { .. }) => "ONBOARDING_REQUIRED",
            Self::Access(_) => "AGENT_NOT_ALLOWED",
            Self::Context(ContextError::InvalidUserId(_)) => "VALIDATION_ERROR",
            Self::Context(ContextError::UserProfileNotFound(_)) => "VALIDATION_ERROR",
            Self::Template(TemplateError::ProfileLocked(_)) => "PROFILE_LOCKED",
            Self::Template(_) => "MEAL_PLAN_NOT_CONFIGURED",
            Self::Database(DatabaseError::Constraint(_)) => "CONFLICT_DETECTED",
            Self::Database(DatabaseError::NotFound { .. }) => "VALIDATION_ERROR",
            Self::Tool(ToolError::Conflict) => "CONFLICT_DETECTED",
            _ => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Onboarding(OnboardingError::Validation { .. })
            | Self::Onboarding(OnboardingError::StepOutOfRange(_))
            | Self::Onboarding(OnboardingError::Incomplete { .. })
            | Self::Onboarding(OnboardingError::AlreadyComplete)
            | Self::Context(ContextError::InvalidUserId(_)) => StatusCode::BAD_REQUEST,
            Self::Onboarding(OnboardingError::StateNotFound(_))
            | Self::Context(ContextError::UserProfileNotFound(_))
            | Self::Database(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Access(_) => StatusCode::FORBIDDEN,
            Self::Database(DatabaseError::Constraint(_)) | Self::Tool(ToolError::Conflict) => {
                StatusCode::CONFLICT
            }
            Self::Template(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // User-input errors stay at INFO; anything internal gets ERROR and a
        // generic message so internals never leak out.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Something went wrong, please try again".to_string()
        } else {
            tracing::info!(error = %self, code = self.error_code(), "request rejected");
            self.to_string()
        };

        let field = match &self {
            Self::Onboarding(OnboardingError::Validation { field, .. }) => field.clone(),
            _ => None,
        };

        let mut body = serde_json::json!({
            "message": message,
            "error_code": self.error_code(),
        });
        if let Some(field) = field {
            body["field"] = serde_json::Value::String(field);
        }
        if let Self::Access(ref violation) = self {
            body["reason"] = serde_json::Value::String(violation.reason().to_string());
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for the backend.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_code() {
        let err = Error::from(OnboardingError::invalid("fats_percentage", "out of range"));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn access_errors_map_to_403() {
        let err = Error::from(AccessError::GeneralDuringOnboarding);
        assert_eq!(err.error_code(), "AGENT_NOT_ALLOWED");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = Error::from(AccessError::OnboardingNotCompleted { current_step: 3 });
        assert_eq!(err.error_code(), "ONBOARDING_REQUIRED");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(
            AccessError::OnboardingAlreadyCompleted.reason(),
            "onboarding_already_completed"
        );
        assert_eq!(
            AccessError::TrackerDuringOnboarding.reason(),
            "tracker_during_onboarding"
        );
        assert_eq!(
            AccessError::SpecialisedPostOnboarding {
                agent: "workout".into()
            }
            .reason(),
            "specialised_post_onboarding"
        );
    }

    #[test]
    fn locked_profile_maps_to_profile_locked() {
        let err = Error::from(TemplateError::ProfileLocked(Uuid::new_v4()));
        assert_eq!(err.error_code(), "PROFILE_LOCKED");
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = Error::from(DatabaseError::Constraint("unique".into()));
        assert_eq!(err.error_code(), "CONFLICT_DETECTED");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
