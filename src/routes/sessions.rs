//! REST endpoints for session lifecycle (spec.md §6): list, create, terminate.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ErrorCode};
use crate::sessions::manager::{CreateError, CreateRequest, EngineKind};
use crate::sessions::SessionInfo;
use crate::AppState;

/// `GET /api/sessions` — snapshot of every live session.
pub async fn list(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    let sessions = state.sessions.list().await;
    let mut out = Vec::with_capacity(sessions.len());
    for s in sessions {
        out.push(s.info().await);
    }
    Json(out)
}

/// `mode` and `args` are accepted on the wire (spec.md §6) but unused by any
/// engine constructor today; kept as fields so forward-compatible clients
/// don't get a 400 for sending them.
#[allow(dead_code)]
#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "workspacePath")]
    pub workspace_path: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

/// `POST /api/sessions` — create a new session. `workspacePath` and
/// `workspace` are accepted as aliases for the same field.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionInfo>), ApiError> {
    let engine_str = body.engine.unwrap_or_default();
    let Some(engine) = EngineKind::parse(&engine_str) else {
        return Err(ApiError::new(
            ErrorCode::InvalidEngine,
            format!("unknown engine {engine_str:?}"),
        ));
    };

    let workspace = body.workspace_path.or(body.workspace).map(PathBuf::from);

    let req = CreateRequest {
        engine,
        name: body.name,
        workspace,
        prompt: body.prompt,
    };

    let session = state.sessions.create(req).await.map_err(|e| match e {
        CreateError::InvalidWorkspace => ApiError::new(
            ErrorCode::InvalidWorkspace,
            "workspacePath does not exist or is not a directory",
        ),
        CreateError::CodexUnavailable(msg) => ApiError::new(ErrorCode::CodexUnavailable, msg)
            .with_hint("install the codex CLI and ensure it is on PATH"),
        CreateError::CodexFailed(msg) => ApiError::new(ErrorCode::CodexFailed, msg),
        CreateError::Io(err) => {
            ApiError::new(ErrorCode::InternalError, format!("failed to start engine: {err}"))
        }
    })?;

    Ok((StatusCode::CREATED, Json(session.info().await)))
}

/// `POST /api/sessions/{id}/terminate`.
pub async fn terminate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.terminate(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(ErrorCode::NotFound, format!("no session {id}")))
    }
}
