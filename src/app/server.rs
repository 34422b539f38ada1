//! HTTP boundary for the planner.
//!
//! Handlers stay thin: they decode the body as raw JSON, hand it to
//! [`StudyPlanner`] and map [`PlannerError`] onto status codes. Dropping a
//! request (client disconnect) cancels every backend call it still has in
//! flight.

use crate::core::StudyPlanner;
use crate::utils::error::{PlannerError, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<StudyPlanner>,
    pub expose_errors: bool,
}

impl AppState {
    pub fn new(planner: Arc<StudyPlanner>) -> Self {
        let expose_errors = planner.config().server.expose_error_details;
        Self {
            planner,
            expose_errors,
        }
    }
}

/// 錯誤回應，依錯誤類型對應狀態碼
pub struct ApiError {
    error: PlannerError,
    expose_details: bool,
}

impl ApiError {
    fn new(error: PlannerError, state: &AppState) -> Self {
        Self {
            error,
            expose_details: state.expose_errors,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.error {
            PlannerError::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PlannerError::BackendUnavailable { .. } | PlannerError::Cancelled { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": self.error.user_friendly_message(),
            "status_code": status.as_u16(),
        });

        // 內部錯誤的細節預設不回傳給呼叫端
        let internal = status == StatusCode::INTERNAL_SERVER_ERROR;
        if !internal || self.expose_details {
            body["detail"] = Value::String(self.error.to_string());
        }

        (status, Json(body)).into_response()
    }
}

fn json_body(payload: std::result::Result<Json<Value>, JsonRejection>) -> Result<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| PlannerError::validation("body", rejection.body_text()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/plan_rwe_study", post(plan_handler))
        .route("/quick_assessment", post(quick_assessment_handler))
        .route("/service_status", get(service_status_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn plan_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let body = json_body(payload).map_err(|e| ApiError::new(e, &state))?;
    let request = crate::domain::model::StudyRequest::from_json(body)
        .map_err(|e| ApiError::new(e, &state))?;

    let cancel = CancellationToken::new();
    let _on_disconnect = cancel.clone().drop_guard();

    let plan = state
        .planner
        .plan_study_with_cancel(request, cancel)
        .await
        .map_err(|e| ApiError::new(e, &state))?;
    Ok(Json(plan).into_response())
}

async fn quick_assessment_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let body = json_body(payload).map_err(|e| ApiError::new(e, &state))?;
    let assessment = state
        .planner
        .quick_assessment_from_json(body)
        .await
        .map_err(|e| ApiError::new(e, &state))?;
    Ok(Json(assessment).into_response())
}

async fn service_status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.planner.service_status().await)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "orchestrator",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Binds `bind_address` and serves until the process is stopped.
pub async fn run(planner: Arc<StudyPlanner>, bind_address: &str) -> Result<()> {
    let app = router(AppState::new(planner));
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!("🌐 RWE planner listening on {}", bind_address);
    axum::serve(listener, app).await?;
    Ok(())
}
