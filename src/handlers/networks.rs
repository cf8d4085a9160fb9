//! Docker network management. Backed by `DockerManager`'s ephemeral mirror,
//! not the registry's Postgres tables — networks live and die with the
//! daemon, so there's nothing durable to persist beyond what Docker reports.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::DockerNetwork;
use crate::AppState;

pub async fn list_networks(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<DockerNetwork>>, AppError> {
    Ok(Json(state.docker_manager.list_networks().await?))
}

pub async fn get_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<DockerNetwork>, AppError> {
    state.docker_manager.get_network(&id).await?.map(Json).ok_or_else(|| AppError::not_found("network"))
}

#[derive(Debug, Deserialize)]
pub struct CreateNetworkRequest {
    pub name: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    #[serde(default)]
    pub internal: bool,
}

fn default_driver() -> String {
    "bridge".to_string()
}

pub async fn create_network(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<CreateNetworkRequest>,
) -> Result<Json<DockerNetwork>, AppError> {
    let network = state
        .docker_manager
        .create_network(&payload.name, &payload.driver, payload.subnet.as_deref(), payload.gateway.as_deref(), payload.internal)
        .await?;
    Ok(Json(network))
}

pub async fn delete_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let deleted = state.docker_manager.delete_network(&id).await?;
    if !deleted {
        return Err(AppError::not_found("network"));
    }
    Ok(Json(json!({"deleted": true})))
}

pub async fn connect_container(
    State(state): State<AppState>,
    Path((network_id, container_id)): Path<(String, String)>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let connected = state.docker_manager.connect_container(&network_id, &container_id).await?;
    Ok(Json(json!({"connected": connected})))
}

pub async fn disconnect_container(
    State(state): State<AppState>,
    Path((network_id, container_id)): Path<(String, String)>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let disconnected = state.docker_manager.disconnect_container(&network_id, &container_id).await?;
    Ok(Json(json!({"disconnected": disconnected})))
}
