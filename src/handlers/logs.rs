//! Container log retrieval: a plain HTTP tail endpoint and a WebSocket
//! stream that polls the Docker daemon on an interval (bollard's `logs()`
//! stream is consumed to completion per poll rather than kept open, mirroring
//! `DockerManager::get_container_logs`).

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::auth::{jwt::JwtManager, AuthUser};
use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct LogsQuery {
    pub tail: Option<String>,
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct LogsResponse {
    pub container_id: String,
    pub logs: String,
}

/// `GET /api/v1/containers/:container_id/logs?tail=200`
pub async fn get_logs_handler(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
    Query(query): Query<LogsQuery>,
    _user: AuthUser,
) -> Result<Json<LogsResponse>, AppError> {
    let tail = query.tail.unwrap_or_else(|| "200".to_string());
    let logs = state.docker_manager.get_container_logs(&container_id, &tail).await?;
    Ok(Json(LogsResponse { container_id, logs }))
}

/// `GET /api/v1/containers/:container_id/logs/ws?token=...` — authenticates
/// via a query-string bearer token since browsers can't set headers on the
/// WebSocket handshake.
pub async fn ws_logs_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(container_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let state = Arc::new(state);
    ws.on_upgrade(move |socket| handle_socket(socket, state, container_id, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, container_id: String, query: LogsQuery) {
    let (mut sender, _) = socket.split();

    if let Err(e) = authenticate(&state, query.token).await {
        let _ = sender.send(Message::Text(format!("Error: {e}"))).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    if state.docker_manager.get_container(&container_id).await.ok().flatten().is_none() {
        let _ = sender.send(Message::Text("Error: container not found".to_string())).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let _ = sender.send(Message::Text("Connected to log stream".to_string())).await;
    info!(container = %container_id, "log stream started");

    let mut last_len = 0usize;
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    loop {
        ticker.tick().await;
        match state.docker_manager.get_container_logs(&container_id, "500").await {
            Ok(logs) => {
                if logs.len() > last_len {
                    let chunk = &logs[last_len..];
                    if sender.send(Message::Text(chunk.to_string())).await.is_err() {
                        break;
                    }
                    last_len = logs.len();
                }
            }
            Err(e) => {
                error!("log poll failed for {container_id}: {e}");
                let _ = sender.send(Message::Text(format!("Error: {e}"))).await;
                break;
            }
        }
    }
    let _ = sender.send(Message::Close(None)).await;
    info!(container = %container_id, "log stream ended");
}

async fn authenticate(state: &AppState, token: Option<String>) -> Result<(), AppError> {
    let token = token.ok_or_else(|| AppError::auth("token required"))?;
    let token = token.strip_prefix("Bearer ").unwrap_or(&token);
    let jwt_manager = JwtManager::new(&state.config.jwt_secret, state.config.jwt_expires_in);
    jwt_manager.verify_token(token)?;
    Ok(())
}
