//! Certificate listing and on-demand issuance. Renewal itself is driven by
//! `health::CertRenewalTask`, not this surface.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::Value;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::registry::models::Certificate;
use crate::AppState;

pub async fn list_certificates(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<Certificate>>, AppError> {
    Ok(Json(state.registry.list_certificates().await?))
}

pub async fn get_certificate(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    _user: AuthUser,
) -> Result<Json<Certificate>, AppError> {
    state.registry.get_certificate(&domain).await?.map(Json).ok_or_else(|| AppError::not_found("certificate"))
}

/// `POST /api/v1/certificates/:domain/request` — runs the ACME order
/// synchronously and returns the issued certificate record, or `204` if the
/// CA issued nothing usable (e.g. the challenge never validated).
pub async fn request_certificate(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    _user: AuthUser,
) -> Result<Json<Value>, AppError> {
    state.deployment_engine.request_certificate(&domain).await?;
    match state.registry.get_certificate(&domain).await? {
        Some(cert) => Ok(Json(serde_json::to_value(cert)?)),
        None => Err(AppError::internal("certificate issuance did not complete")),
    }
}
