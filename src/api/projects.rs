//! Project CRUD and per-project historical sessions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::tool::ToolKind;
use crate::sessions::{stats, SessionSummary};
use crate::server::state::AppState;
use crate::store::{Project, ProjectDraft};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub tool_type: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Project>>> {
    let tool = query
        .tool_type
        .as_deref()
        .map(str::parse::<ToolKind>)
        .transpose()?;
    Ok(Json(state.store.list_projects(tool).await))
}

pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<ProjectDraft>,
) -> Result<(StatusCode, Json<Project>)> {
    let project = state.store.create_project(draft).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Project>> {
    Ok(Json(state.store.get_project(id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ProjectDraft>,
) -> Result<Json<Project>> {
    Ok(Json(state.store.update_project(id, draft).await?))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.store.delete_project(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSessions {
    pub sessions: Vec<SessionSummary>,
    /// At least one archive file failed to parse completely.
    pub partial: bool,
}

/// Historical sessions whose recorded workspace matches the project's.
pub async fn sessions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectSessions>> {
    let project = state.store.get_project(id).await?;

    let scanner = state.scanner.clone();
    let tool = project.tool_kind;
    let outcome = tokio::task::spawn_blocking(move || {
        scanner.scan_root(tool, &crate::dirs::archive_root(tool), |_| {})
    })
    .await
    .map_err(|e| Error::Transport(format!("scan task failed: {e}")))?;

    let sessions: Vec<SessionSummary> =
        stats::sessions_for_workspace(&outcome.sessions, &project.workspace_path)
            .into_iter()
            .map(|s| (*s).clone())
            .collect();
    let partial = sessions.iter().any(|s| s.partial);
    Ok(Json(ProjectSessions { sessions, partial }))
}
