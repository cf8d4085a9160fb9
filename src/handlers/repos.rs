//! Git repository registration. Webhooks from GitHub/GitLab/Gitea look
//! repos up by `(url, branch)` (see `webhook::WebhookHandler`); this surface
//! is where they get registered and where a manual deploy can be kicked off
//! outside of a push event.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::{Application, GitProvider, GitRepo};
use crate::AppState;

pub async fn list_repos(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Vec<GitRepo>>, AppError> {
    Ok(Json(state.registry.list_git_repos().await?))
}

pub async fn get_repo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<GitRepo>, AppError> {
    state.registry.get_git_repo(&id).await?.map(Json).ok_or_else(|| AppError::not_found("git repo"))
}

#[derive(Debug, Deserialize)]
pub struct CreateRepoRequest {
    pub provider: GitProvider,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_config_file")]
    pub config_file: String,
    #[serde(default)]
    pub webhook_secret: String,
    pub project_id: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_config_file() -> String {
    "deploy.yaml".to_string()
}

pub async fn create_repo(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<CreateRepoRequest>,
) -> Result<Json<GitRepo>, AppError> {
    if state.registry.get_git_repo_by_url(&payload.url, &payload.branch).await?.is_some() {
        return Err(AppError::conflict("git repo"));
    }
    let repo = GitRepo {
        id: Uuid::new_v4().to_string(),
        provider: payload.provider,
        url: payload.url,
        branch: payload.branch,
        config_file: payload.config_file,
        webhook_secret: payload.webhook_secret,
        project_id: payload.project_id,
        last_commit: String::new(),
        last_deploy_at: 0,
        enabled: true,
        created_at: chrono::Utc::now().timestamp(),
    };
    state.registry.set_git_repo(&repo).await?;
    Ok(Json(repo))
}

pub async fn delete_repo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let deleted = state.registry.delete_git_repo(&id).await?;
    if !deleted {
        return Err(AppError::not_found("git repo"));
    }
    Ok(Json(json!({"deleted": true})))
}

/// `POST /api/v1/repos/:id/deploy` — clones and deploys the repo's current
/// HEAD immediately, without waiting for a webhook push event.
pub async fn deploy_repo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Vec<Application>>, AppError> {
    let repo = state.registry.get_git_repo(&id).await?.ok_or_else(|| AppError::not_found("git repo"))?;
    Ok(Json(state.deployment_engine.deploy_from_repo(&repo).await?))
}
