//! Named middleware definitions (rate limiting, header injection, basic
//! auth, ...) that routes reference by name from their `middlewares` list.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::Middleware;
use crate::AppState;

pub async fn list_middlewares(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<Middleware>>, AppError> {
    Ok(Json(state.registry.list_middlewares().await?))
}

pub async fn get_middleware(
    State(state): State<AppState>,
    Path(name): Path<String>,
    _user: AuthUser,
) -> Result<Json<Middleware>, AppError> {
    state.registry.get_middleware(&name).await?.map(Json).ok_or_else(|| AppError::not_found("middleware"))
}

pub async fn set_middleware(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(middleware): Json<Middleware>,
) -> Result<Json<Middleware>, AppError> {
    state.registry.set_middleware(&middleware).await?;
    Ok(Json(middleware))
}

pub async fn delete_middleware(
    State(state): State<AppState>,
    Path(name): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let deleted = state.registry.delete_middleware(&name).await?;
    if !deleted {
        return Err(AppError::not_found("middleware"));
    }
    Ok(Json(json!({"deleted": true})))
}
