//! Provider CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::store::{Provider, ProviderDraft};

pub async fn list(State(state): State<AppState>) -> Json<Vec<Provider>> {
    Json(state.store.list_providers().await)
}

pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<ProviderDraft>,
) -> Result<(StatusCode, Json<Provider>)> {
    let provider = state.store.create_provider(draft).await?;
    Ok((StatusCode::CREATED, Json(provider)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ProviderDraft>,
) -> Result<Json<Provider>> {
    Ok(Json(state.store.update_provider(id, draft).await?))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    state.store.delete_provider(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
