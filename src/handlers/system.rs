//! Plain operator info endpoint, unauthenticated like `/health`, plus the
//! restart action a process supervisor is expected to pick up.

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::AppState;

pub async fn system_info(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let stats = state.registry.stats().await?;
    Ok(Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "stats": stats,
    })))
}

/// Exits the process; a supervisor (systemd, docker `restart: unless-stopped`,
/// etc.) is expected to bring it back up with a clean state.
pub async fn system_restart(_user: AuthUser) -> Json<Value> {
    tracing::warn!("restart requested via API, exiting for supervisor restart");
    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        std::process::exit(0);
    });
    Json(json!({"restarting": true}))
}
