//! HTTP handlers for the `/api/learn` routes.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use tutor_core::ids::{LearnerKey, SessionId};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub learner: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub learner: String,
    pub message: String,
    pub session_id: Option<String>,
    pub interaction_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    pub learner: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub learner: String,
}

fn learner_key(raw: &str) -> Result<LearnerKey, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("learner must not be empty".into()));
    }
    Ok(LearnerKey::new(trimmed))
}

pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let learner = learner_key(&req.learner)?;
    let result = state.orchestrator.start(&learner, req.topics)?;
    Ok(Json(json!({ "success": true, "result": result })))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let learner = learner_key(&req.learner)?;
    let result = state
        .orchestrator
        .chat(
            &learner,
            &req.message,
            req.session_id.map(SessionId::from_raw),
            req.interaction_mode,
        )
        .await?;
    Ok(Json(json!({ "success": true, "result": result })))
}

pub async fn advance(
    State(state): State<AppState>,
    Json(req): Json<AdvanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let learner = learner_key(&req.learner)?;
    let result = state
        .orchestrator
        .advance(&learner, req.session_id.map(SessionId::from_raw), req.force)?;
    Ok(Json(json!({ "success": true, "result": result })))
}

pub async fn progress(
    State(state): State<AppState>,
    Path(learner): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let learner = learner_key(&learner)?;
    let (progress, flags) = state.orchestrator.progress(&learner)?;
    Ok(Json(json!({
        "success": true,
        "result": {
            "progress": progress,
            "flags": flags,
            "sessionId": state.orchestrator.active_session(&learner),
        },
    })))
}

/// Markdown transcript as a file download.
pub async fn export(
    State(state): State<AppState>,
    Path(learner): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let learner = learner_key(&learner)?;
    let markdown = state.orchestrator.export(&learner)?;
    let disposition = format!(
        "attachment; filename=\"study-notes-{}.md\"",
        filename_safe(learner.as_str())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        markdown,
    ))
}

pub async fn sessions(
    State(state): State<AppState>,
    Path(learner): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let learner = learner_key(&learner)?;
    let sessions = state.orchestrator.sessions(&learner)?;
    Ok(Json(json!({
        "success": true,
        "result": { "sessions": sessions, "totalCount": sessions.len() },
    })))
}

pub async fn resume(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ResumeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let learner = learner_key(&req.learner)?;
    let result = state
        .orchestrator
        .resume(&learner, &SessionId::from_raw(session_id))?;
    Ok(Json(json!({ "success": true, "result": result })))
}

pub async fn messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let turns = state.orchestrator.messages(&SessionId::from_raw(session_id))?;
    Ok(Json(json!({
        "success": true,
        "result": { "messages": turns, "totalCount": turns.len() },
    })))
}

/// Database and generator reachability.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state
        .orchestrator
        .db()
        .with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(true)
        })
        .unwrap_or(false);
    let generator = state.orchestrator.tutor().generator();
    let generator_ok = generator.health_check().await;

    let healthy = db_ok && generator_ok;
    let status = if healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "components": {
                "database": if db_ok { "ok" } else { "error" },
                "generator": {
                    "name": generator.name(),
                    "model": generator.model(),
                    "reachable": generator_ok,
                },
            },
        })),
    )
}

fn filename_safe(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
