//! Project CRUD. A project is the deploy unit a `deploy.yaml` describes;
//! deleting one cascades to its applications and secrets (registry
//! invariant, see `Registry::delete_project`).

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::{Application, Project};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 63))]
    pub id: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub async fn list_projects(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.registry.list_projects().await?))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Project>, AppError> {
    state.registry.get_project(&id).await?.map(Json).ok_or_else(|| AppError::not_found("project"))
}

pub async fn create_project(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    payload.validate()?;
    if state.registry.get_project(&payload.id).await?.is_some() {
        return Err(AppError::conflict("project"));
    }
    let mut project = Project::new(payload.id, payload.name);
    project.description = payload.description;
    state.registry.set_project(&project).await?;
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let apps = state.registry.list_applications_of_project(&id).await?;
    for app in &apps {
        state.deployment_engine.remove_app(app).await?;
    }
    let deleted = state.registry.delete_project(&id).await?;
    if !deleted {
        return Err(AppError::not_found("project"));
    }
    Ok(Json(json!({"deleted": true})))
}

/// Redeploys every application already registered under the project, in
/// whatever dependency order `DeploymentEngine::deploy` is called — each
/// application's own `deploy` call handles its own ordering concerns, so
/// this just fans the action out across the project's apps.
pub async fn deploy_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let apps = project_apps_or_404(&state, &id).await?;
    let mut deployed = Vec::with_capacity(apps.len());
    for app in &apps {
        deployed.push(state.deployment_engine.deploy(app).await?);
    }
    Ok(Json(json!({"deployments": deployed})))
}

/// Stops then redeploys every application under the project — a full
/// restart rather than a rolling one, since it tears every container down
/// before bringing any of them back.
pub async fn restart_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let apps = project_apps_or_404(&state, &id).await?;
    for app in &apps {
        state.deployment_engine.stop_app(app).await?;
    }
    let mut deployed = Vec::with_capacity(apps.len());
    for app in &apps {
        deployed.push(state.deployment_engine.deploy(app).await?);
    }
    Ok(Json(json!({"deployments": deployed})))
}

async fn project_apps_or_404(state: &AppState, project_id: &str) -> Result<Vec<Application>, AppError> {
    if state.registry.get_project(project_id).await?.is_none() {
        return Err(AppError::not_found("project"));
    }
    state.registry.list_applications_of_project(project_id).await
}
