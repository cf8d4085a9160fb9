//! `POST /webhook/:provider` — entry point for GitHub/GitLab/Gitea push
//! events. Unauthenticated by JWT/API-key; authenticity instead rests on
//! the provider-specific signature check inside `WebhookHandler`, which
//! needs the untouched raw body bytes (hence `Bytes`, not `Json`).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use tracing::warn;

use crate::error::AppError;
use crate::AppState;

pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let result = match provider.as_str() {
        "github" => state.webhook_handler.handle_github(&body, header_str("x-hub-signature-256")).await,
        "gitlab" => state.webhook_handler.handle_gitlab(&body, header_str("x-gitlab-token")).await,
        "gitea" => state.webhook_handler.handle_gitea(&body).await,
        other => {
            warn!(provider = %other, "unknown webhook provider");
            return Err(AppError::bad_request("unknown webhook provider"));
        }
    };

    result.map(|_| StatusCode::ACCEPTED)
}
