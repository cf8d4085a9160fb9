//! Direct deploy submission: a caller posts a `deploy.yaml`/compose pair (or
//! a path to one already on disk) without going through a git repo or
//! webhook at all. Useful for local/offline deploys and for the CLI-style
//! demo workflow.

use axum::{extract::State, response::Json};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::Application;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeployYamlRequest {
    pub deploy_content: String,
    pub compose_content: String,
}

/// `POST /deploy/yaml` — `deploy_content`/`compose_content` are the raw YAML
/// text of `deploy.yaml` and `docker-compose.yml`, parsed and deployed in
/// one shot with no git repo behind them.
pub async fn deploy_yaml(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<DeployYamlRequest>,
) -> Result<Json<Vec<Application>>, AppError> {
    let deploy_config: serde_yaml::Value = serde_yaml::from_str(&payload.deploy_content)
        .map_err(|e| AppError::bad_request(&format!("invalid deploy_content: {e}")))?;
    let compose_config: serde_yaml::Value = serde_yaml::from_str(&payload.compose_content)
        .map_err(|e| AppError::bad_request(&format!("invalid compose_content: {e}")))?;

    let project_id = deploy_config
        .get("id")
        .and_then(serde_yaml::Value::as_str)
        .ok_or_else(|| AppError::bad_request("deploy.yaml is missing 'id'"))?;
    let repo_dir = format!("{}/{}", state.config.deploy_path, project_id);

    Ok(Json(state.deployment_engine.deploy_from_config(&deploy_config, &compose_config, None, &repo_dir).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeployLocalRequest {
    pub path: String,
}

/// `POST /deploy/local` — `path` is a directory on the server's own
/// filesystem already containing `deploy.yaml` and `docker-compose.yml`,
/// e.g. a checkout an operator dropped in by hand.
pub async fn deploy_local(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<DeployLocalRequest>,
) -> Result<Json<Vec<Application>>, AppError> {
    let deploy_path = format!("{}/deploy.yaml", payload.path);
    let deploy_raw = tokio::fs::read_to_string(&deploy_path)
        .await
        .map_err(|_| AppError::bad_request(&format!("deploy.yaml missing from {}", payload.path)))?;
    let deploy_config: serde_yaml::Value =
        serde_yaml::from_str(&deploy_raw).map_err(|e| AppError::bad_request(&format!("invalid deploy.yaml: {e}")))?;

    let compose_path = format!("{}/docker-compose.yml", payload.path);
    let compose_raw = tokio::fs::read_to_string(&compose_path)
        .await
        .map_err(|_| AppError::bad_request(&format!("docker-compose.yml missing from {}", payload.path)))?;
    let compose_config: serde_yaml::Value = serde_yaml::from_str(&compose_raw)
        .map_err(|e| AppError::bad_request(&format!("invalid docker-compose.yml: {e}")))?;

    Ok(Json(state.deployment_engine.deploy_from_config(&deploy_config, &compose_config, None, &payload.path).await?))
}
