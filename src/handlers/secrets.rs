//! Per-project secret values, substituted into `env` at deploy time via
//! `@secret:<name>` references (see `deployment::engine::resolve_service_refs`'s
//! sibling handling of `@{dep_id}` upstream references).

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::Secret;
use crate::AppState;

pub async fn list_secrets(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Vec<Secret>>, AppError> {
    Ok(Json(state.registry.get_project_secrets(&project_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetSecretRequest {
    pub name: String,
    pub value: String,
}

pub async fn set_secret(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    _user: AuthUser,
    Json(payload): Json<SetSecretRequest>,
) -> Result<Json<Secret>, AppError> {
    if state.registry.get_project(&project_id).await?.is_none() {
        return Err(AppError::not_found("project"));
    }
    let secret = Secret {
        id: Secret::make_id(&project_id, &payload.name),
        project_id,
        name: payload.name,
        value: payload.value,
        created_at: chrono::Utc::now().timestamp(),
    };
    state.registry.set_secret(&secret).await?;
    Ok(Json(secret))
}

pub async fn delete_secret(
    State(state): State<AppState>,
    Path((project_id, name)): Path<(String, String)>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let deleted = state.registry.delete_secret(&Secret::make_id(&project_id, &name)).await?;
    if !deleted {
        return Err(AppError::not_found("secret"));
    }
    Ok(Json(json!({"deleted": true})))
}
