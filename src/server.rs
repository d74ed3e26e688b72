//! HTTP server assembly: shared state, caller extraction, router.
//!
//! Authentication is out of scope; the caller's identity arrives as an
//! `X-User-Id` header set by the gateway in front of this service.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ContextError, Error};
use crate::llm::LlmProvider;
use crate::store::Database;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub llm: Arc<dyn LlmProvider>,
    pub config: Arc<AppConfig>,
}

/// The authenticated caller, from the `X-User-Id` header.
#[derive(Debug)]
pub struct CallerId(pub Uuid);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ContextError::InvalidUserId("missing X-User-Id header".into()))?;
        let id = raw
            .parse()
            .map_err(|_| ContextError::InvalidUserId(raw.to_string()))?;
        Ok(Self(id))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(crate::onboarding::routes::router())
        .merge(crate::chat::routes::router())
        .merge(crate::users::routes::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn caller_id_parses_header() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header("X-User-Id", id.to_string())
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let caller = CallerId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller.0, id);
    }

    #[tokio::test]
    async fn caller_id_rejects_missing_and_malformed() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        assert!(CallerId::from_request_parts(&mut parts, &()).await.is_err());

        let request = Request::builder()
            .header("X-User-Id", "not-a-uuid")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let err = CallerId::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Context(ContextError::InvalidUserId(_))));
    }
}
