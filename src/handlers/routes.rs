//! Manual route management, for routes that aren't owned by an application
//! deploy (`deployment::engine::create_route` writes `app-{id}` routes
//! itself; these handlers cover hand-authored ones, e.g. a static upstream
//! or a redirect-only route).

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::Route;
use crate::AppState;

pub async fn list_routes(State(state): State<AppState>, _user: AuthUser) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(state.registry.list_routes().await?))
}

pub async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Route>, AppError> {
    state.registry.get_route(&id).await?.map(Json).ok_or_else(|| AppError::not_found("route"))
}

pub async fn set_route(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(route): Json<Route>,
) -> Result<Json<Route>, AppError> {
    state.registry.set_route(&route).await?;
    state.event_bus.emit(crate::events::ROUTES_UPDATED, serde_json::Value::Null).await;
    Ok(Json(route))
}

pub async fn delete_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    let deleted = state.registry.delete_route(&id).await?;
    if !deleted {
        return Err(AppError::not_found("route"));
    }
    state.event_bus.emit(crate::events::ROUTES_UPDATED, serde_json::Value::Null).await;
    Ok(Json(json!({"deleted": true})))
}
