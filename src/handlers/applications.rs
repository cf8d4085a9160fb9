//! Application CRUD plus the direct (non-webhook) deploy action, used when
//! a caller wants to push an application spec straight through the API
//! rather than via a git push.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::{Application, Deployment};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectScope {
    pub project_id: Option<String>,
}

pub async fn list_applications(
    State(state): State<AppState>,
    Query(scope): Query<ProjectScope>,
    _user: AuthUser,
) -> Result<Json<Vec<Application>>, AppError> {
    let Some(project_id) = scope.project_id else {
        return Err(AppError::bad_request("project_id query parameter required"));
    };
    Ok(Json(state.registry.list_applications_of_project(&project_id).await?))
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Application>, AppError> {
    state.registry.get_application(&id).await?.map(Json).ok_or_else(|| AppError::not_found("application"))
}

/// Triggers a fresh versioned deploy of an already-registered application
/// (e.g. after `image` or `env` was edited via a prior `set_application`).
pub async fn deploy_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Deployment>, AppError> {
    let app = state.registry.get_application(&id).await?.ok_or_else(|| AppError::not_found("application"))?;
    Ok(Json(state.deployment_engine.deploy(&app).await?))
}

pub async fn list_deployments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Vec<Deployment>>, AppError> {
    Ok(Json(state.registry.list_deployments_of_app(&id, 20).await?))
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub version: i32,
}

pub async fn rollback_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
    Json(payload): Json<RollbackRequest>,
) -> Result<Json<Value>, AppError> {
    let app = state.registry.get_application(&id).await?.ok_or_else(|| AppError::not_found("application"))?;
    match state.deployment_engine.rollback(&app, payload.version).await? {
        Some(deploy) => Ok(Json(json!({"deployment": deploy}))),
        None => Err(AppError::not_found(&format!("deployment version {}", payload.version))),
    }
}

pub async fn stop_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let app = state.registry.get_application(&id).await?.ok_or_else(|| AppError::not_found("application"))?;
    state.deployment_engine.stop_app(&app).await?;
    Ok(Json(json!({"stopped": true})))
}

pub async fn remove_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let app = state.registry.get_application(&id).await?.ok_or_else(|| AppError::not_found("application"))?;
    state.deployment_engine.remove_app(&app).await?;
    let deleted = state.registry.delete_application(&id).await?;
    Ok(Json(json!({"deleted": deleted})))
}

#[derive(Debug, Deserialize)]
pub struct AppLogsQuery {
    pub tail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationLogs {
    pub container_id: String,
    pub logs: String,
}

/// Live stdout/stderr for every container currently backing the
/// application, tailed individually (one container can be mid-rollout and
/// already replaced, so there may be more than one).
pub async fn application_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AppLogsQuery>,
    _user: AuthUser,
) -> Result<Json<Vec<ApplicationLogs>>, AppError> {
    let app = state.registry.get_application(&id).await?.ok_or_else(|| AppError::not_found("application"))?;
    let tail = query.tail.unwrap_or_else(|| "200".to_string());
    let mut logs = Vec::with_capacity(app.container_ids.len());
    for container_id in &app.container_ids {
        let text = state.docker_manager.get_container_logs(container_id, &tail).await?;
        logs.push(ApplicationLogs { container_id: container_id.clone(), logs: text });
    }
    Ok(Json(logs))
}

/// The build/rollout transcript captured by the deployment engine while it
/// ran, distinct from `application_logs`'s live container stdout — this is
/// what went wrong (or right) in `docker build`/`docker run`, not what the
/// app has printed since.
pub async fn application_deploy_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let deployments = state.registry.list_deployments_of_app(&id, 1).await?;
    let Some(latest) = deployments.into_iter().next() else {
        return Err(AppError::not_found("deployment"));
    };
    Ok(Json(json!({"deployment_id": latest.id, "version": latest.version, "logs": latest.logs})))
}
