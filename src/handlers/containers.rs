//! Direct container lifecycle control, for operator intervention outside
//! the normal deploy/rollback flow (e.g. restarting a wedged replica).

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::DockerContainer;
use crate::AppState;

pub async fn list_containers(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<DockerContainer>>, AppError> {
    Ok(Json(state.docker_manager.list_containers().await?))
}

pub async fn get_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<DockerContainer>, AppError> {
    state.docker_manager.get_container(&id).await?.map(Json).ok_or_else(|| AppError::not_found("container"))
}

pub async fn start_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let started = state.docker_manager.start_container(&id).await?;
    Ok(Json(json!({"started": started})))
}

#[derive(Debug, Deserialize)]
pub struct StopQuery {
    pub timeout: Option<i32>,
}

pub async fn stop_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StopQuery>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let stopped = state.docker_manager.stop_container(&id, query.timeout.unwrap_or(10)).await?;
    Ok(Json(json!({"stopped": stopped})))
}

pub async fn restart_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let restarted = state.docker_manager.restart_container(&id).await?;
    Ok(Json(json!({"restarted": restarted})))
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn remove_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RemoveQuery>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let removed = state.docker_manager.remove_container(&id, query.force).await?;
    Ok(Json(json!({"removed": removed})))
}
