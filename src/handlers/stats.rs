//! Aggregate counts across the whole control plane, for a dashboard or
//! `GET /` landing summary.

use axum::{extract::State, response::Json};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::Stats;
use crate::AppState;

pub async fn get_stats(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Stats>, AppError> {
    Ok(Json(state.registry.stats().await?))
}
