//! HTTP trigger surface for the sweeps and diagnostics.
//!
//! An external scheduler POSTs to the sweep endpoints (no body
//! required); each invocation is an independent, short-lived unit of
//! work with no shared in-process state beyond the store handle. When a
//! shared secret is configured, requests are rejected before any store
//! access. Diagnostics are served with `Cache-Control: no-store` since
//! the numbers go stale immediately.

use crate::config::StintConfig;
use crate::diagnostics::{Diagnostics, OpenSessionSnapshot};
use crate::error::StintError;
use crate::notify::NotificationSink;
use crate::store::WorkStore;
use crate::sweep::{OverrunDetector, Reconciler, SweepReport};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Shared handle for all endpoint invocations.
pub struct AppState {
    pub store: Arc<dyn WorkStore>,
    pub sink: Arc<dyn NotificationSink>,
    pub config: StintConfig,
}

/// JSON body returned by every sweep trigger.
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: SweepReport,
    pub timestamp: DateTime<Utc>,
}

impl SweepResponse {
    fn new(message: impl Into<String>, report: SweepReport) -> Self {
        Self {
            message: message.into(),
            report,
            timestamp: Utc::now(),
        }
    }
}

/// Error wrapper mapping the engine taxonomy onto HTTP statuses.
///
/// Bodies never leak store internals; the details are in the logs.
#[derive(Debug)]
pub struct ApiError(pub StintError);

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            StintError::Unauthorized => StatusCode::UNAUTHORIZED,
            StintError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StintError> for ApiError {
    fn from(err: StintError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self.0 {
            StintError::Unauthorized => "unauthorized".to_string(),
            StintError::SessionNotFound { session_id } => {
                format!("session not found: {session_id}")
            }
            StintError::Store { .. } => "store failure".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": body }))).into_response()
    }
}

/// Build the router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sweeps/overrun", post(trigger_overrun))
        .route("/sweeps/stale", post(trigger_stale))
        .route("/sweeps/ceiling", post(trigger_ceiling))
        .route("/sweeps/sessions/{id}/close", post(trigger_close_one))
        .route("/diagnostics/open-sessions", get(open_sessions))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let bind = state.config.bind.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "trigger surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Reject the request before any store access unless the bearer token
/// matches the configured shared secret.
fn authorize(config: &StintConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = &config.shared_secret else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if provided == Some(secret.as_str()) {
        Ok(())
    } else {
        Err(ApiError(StintError::Unauthorized))
    }
}

async fn trigger_overrun(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    authorize(&state.config, &headers)?;
    let detector = OverrunDetector::new(state.store.clone(), state.sink.clone(), &state.config);
    let report = detector.detect_and_enforce().await?;
    Ok(Json(SweepResponse::new("overrun sweep complete", report)))
}

async fn trigger_stale(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    authorize(&state.config, &headers)?;
    let reconciler = Reconciler::new(state.store.clone(), state.sink.clone(), &state.config);
    let report = reconciler.close_stale_sessions().await?;
    Ok(Json(SweepResponse::new(
        "stale-task sweep complete",
        report,
    )))
}

async fn trigger_ceiling(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    authorize(&state.config, &headers)?;
    let reconciler = Reconciler::new(state.store.clone(), state.sink.clone(), &state.config);
    let report = reconciler.close_over_ceiling().await?;
    Ok(Json(SweepResponse::new(
        "hard-ceiling sweep complete",
        report,
    )))
}

async fn trigger_close_one(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    authorize(&state.config, &headers)?;
    let reconciler = Reconciler::new(state.store.clone(), state.sink.clone(), &state.config);
    let report = reconciler.close_one(&session_id).await?;
    Ok(Json(SweepResponse::new("session close complete", report)))
}

async fn open_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let diagnostics = Diagnostics::new(state.store.clone(), state.config.budget);
    let snapshots: Vec<OpenSessionSnapshot> = diagnostics.open_sessions().await?;
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(json!({
            "open_sessions": snapshots,
            "timestamp": Utc::now(),
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, TaskDefinition, TaskProgress, TaskStatus, WorkSession};
    use crate::notify::RecordingSink;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn state_with_secret(secret: Option<&str>) -> Arc<AppState> {
        let mut session = WorkSession::start("u-1", "t-1", "p-1");
        session.started_at = Utc::now() - Duration::minutes(90);
        let store = MemoryStore::new()
            .with_project(Project::active("p-1"))
            .with_definition(TaskDefinition {
                task_id: "t-1".into(),
                title: "Task".into(),
                estimated_hours: Some(1.0),
            })
            .with_progress(TaskProgress {
                status: TaskStatus::InProgress,
                ..TaskProgress::pending("p-1", "t-1")
            })
            .with_session(session);
        Arc::new(AppState {
            store: Arc::new(store),
            sink: Arc::new(RecordingSink::new()),
            config: StintConfig {
                shared_secret: secret.map(String::from),
                ..StintConfig::default()
            },
        })
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_authorize_open_when_no_secret() {
        let state = state_with_secret(None);
        assert!(authorize(&state.config, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_authorize_rejects_missing_and_wrong_tokens() {
        let state = state_with_secret(Some("hunter2"));
        assert!(authorize(&state.config, &HeaderMap::new()).is_err());
        assert!(authorize(&state.config, &bearer("wrong")).is_err());
        assert!(authorize(&state.config, &bearer("hunter2")).is_ok());
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError(StintError::Unauthorized).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError(StintError::SessionNotFound {
                session_id: "s-1".into()
            })
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(StintError::store("q", "down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_do_not_leak_details() {
        let response =
            ApiError(StintError::store("find_open_sessions", "password in dsn")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_overrun_trigger_enforces_and_reports() {
        let state = state_with_secret(None);
        let Json(response) = trigger_overrun(State(state.clone()), HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.report.checked, 1);
        assert_eq!(response.report.applied, 1);
        assert_eq!(response.message, "overrun sweep complete");
    }

    #[tokio::test]
    async fn test_unauthorized_trigger_touches_nothing() {
        let state = state_with_secret(Some("hunter2"));
        let err = trigger_overrun(State(state.clone()), HeaderMap::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        // Rejected before any store access: the session is still open
        assert_eq!(
            state.store.find_open_sessions(None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_close_unknown_session_is_404() {
        let state = state_with_secret(None);
        let err = trigger_close_one(
            State(state),
            Path("missing".to_string()),
            HeaderMap::new(),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sweep_response_shape() {
        let state = state_with_secret(None);
        let Json(response) = trigger_stale(State(state), HeaderMap::new()).await.unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert!(value["message"].is_string());
        assert!(value["checked"].is_number());
        assert!(value["applied"].is_number());
        assert!(value["details"].is_array());
        assert!(value["timestamp"].is_string());
    }
}
