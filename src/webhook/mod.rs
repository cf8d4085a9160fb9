//! Incoming source-control webhook handling: GitHub/GitLab/Gitea push
//! events, each verified and debounced before triggering a deploy. Distinct
//! from the outgoing user-configured webhooks in `handlers::webhooks`, which
//! notify external services about deploy status rather than trigger deploys.
//!
//! The HMAC signature is computed over the raw request body rather than any
//! re-serialized form of it, so a byte-identical replay is required to pass.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::events::{self, EventBus};
use crate::registry::models::GitRepo;
use crate::registry::Registry;

type Result<T> = std::result::Result<T, AppError>;
type HmacSha256 = Hmac<Sha256>;

pub struct WebhookHandler {
    registry: Arc<Registry>,
    event_bus: EventBus,
    config: Arc<Config>,
}

impl WebhookHandler {
    pub fn new(registry: Arc<Registry>, event_bus: EventBus, config: Arc<Config>) -> Self {
        Self { registry, event_bus, config }
    }

    pub async fn handle_github(&self, raw_body: &[u8], signature_header: Option<&str>) -> Result<()> {
        let payload: Value = serde_json::from_slice(raw_body).map_err(|_| AppError::bad_request("malformed JSON body"))?;
        let repo_url = payload["repository"]["clone_url"].as_str().unwrap_or_default();
        let ssh_url = payload["repository"]["ssh_url"].as_str().unwrap_or_default();
        let branch = payload["ref"].as_str().unwrap_or_default().trim_start_matches("refs/heads/");
        let commit = payload["after"].as_str().or_else(|| payload["head_commit"]["id"].as_str()).unwrap_or_default();

        let repo = self.find_repo(repo_url, ssh_url, branch).await?;
        if !verify_github_signature(&repo.webhook_secret, raw_body, signature_header) {
            warn!(repo = %repo.id, "github webhook signature mismatch");
            return Err(AppError::SignatureMismatch);
        }
        self.trigger_deploy(&repo, commit).await
    }

    pub async fn handle_gitlab(&self, raw_body: &[u8], token_header: Option<&str>) -> Result<()> {
        let payload: Value = serde_json::from_slice(raw_body).map_err(|_| AppError::bad_request("malformed JSON body"))?;
        let repo_url = payload["project"]["git_http_url"].as_str().unwrap_or_default();
        let ssh_url = payload["project"]["git_ssh_url"].as_str().unwrap_or_default();
        let branch = payload["ref"].as_str().unwrap_or_default().trim_start_matches("refs/heads/");
        let commit = payload["checkout_sha"].as_str().unwrap_or_default();

        let repo = self.find_repo(repo_url, ssh_url, branch).await?;
        if repo.webhook_secret != token_header.unwrap_or_default() {
            warn!(repo = %repo.id, "gitlab webhook token mismatch");
            return Err(AppError::SignatureMismatch);
        }
        self.trigger_deploy(&repo, commit).await
    }

    pub async fn handle_gitea(&self, raw_body: &[u8]) -> Result<()> {
        let payload: Value = serde_json::from_slice(raw_body).map_err(|_| AppError::bad_request("malformed JSON body"))?;
        let repo_url = payload["repository"]["clone_url"].as_str().unwrap_or_default();
        let ssh_url = payload["repository"]["ssh_url"].as_str().unwrap_or_default();
        let branch = payload["ref"].as_str().unwrap_or_default().trim_start_matches("refs/heads/");
        let commit = payload["after"].as_str().unwrap_or_default();

        let repo = self.find_repo(repo_url, ssh_url, branch).await?;
        self.trigger_deploy(&repo, commit).await
    }

    async fn find_repo(&self, https_url: &str, ssh_url: &str, branch: &str) -> Result<GitRepo> {
        if let Some(repo) = self.registry.get_git_repo_by_url(https_url, branch).await? {
            return Ok(repo);
        }
        if !ssh_url.is_empty() {
            if let Some(repo) = self.registry.get_git_repo_by_url(ssh_url, branch).await? {
                return Ok(repo);
            }
        }
        Err(AppError::not_found("git repository registered for this push"))
    }

    async fn trigger_deploy(&self, repo: &GitRepo, commit: &str) -> Result<()> {
        if !repo.enabled {
            info!(repo = %repo.id, "webhook received for disabled repo, ignoring");
            return Ok(());
        }
        if repo.last_commit == commit {
            info!(repo = %repo.id, commit, "duplicate webhook delivery, ignoring");
            return Ok(());
        }
        self.registry.update_git_repo_commit(&repo.id, commit).await?;
        self.event_bus
            .emit(
                events::WEBHOOK_RECEIVED,
                serde_json::json!({
                    "repo_id": repo.id,
                    "project_id": repo.project_id,
                    "commit": commit,
                    "branch": repo.branch,
                }),
            )
            .await;
        info!(repo = %repo.id, commit, "webhook triggered deploy");
        Ok(())
    }

    /// Shallow-clones the repo at `repo.branch` into a scratch directory and
    /// reads back its deploy manifests. The deployment engine calls this
    /// once `webhook_received` is handled.
    pub async fn clone_and_parse_config(&self, repo: &GitRepo) -> Result<(serde_yaml::Value, Option<serde_yaml::Value>)> {
        let dest = format!("{}/{}", self.config.deploy_path, repo.id);
        let _ = tokio::fs::remove_dir_all(&dest).await;
        tokio::fs::create_dir_all(&self.config.deploy_path)
            .await
            .map_err(|e| AppError::internal(&format!("failed to create deploy scratch dir: {e}")))?;

        let status = tokio::process::Command::new("git")
            .args(["clone", "--depth", "1", "--branch", &repo.branch, &repo.url, &dest])
            .status()
            .await
            .map_err(|e| AppError::internal(&format!("git clone failed to spawn: {e}")))?;
        if !status.success() {
            return Err(AppError::internal(&format!("git clone of {} failed", repo.url)));
        }

        let deploy_path = format!("{dest}/{}", repo.config_file);
        let deploy_raw = tokio::fs::read_to_string(&deploy_path)
            .await
            .map_err(|_| AppError::bad_request(&format!("{} missing from {}", repo.config_file, repo.url)))?;
        let deploy_config: serde_yaml::Value = serde_yaml::from_str(&deploy_raw)
            .map_err(|e| AppError::bad_request(&format!("invalid {}: {e}", repo.config_file)))?;

        let compose_path = format!("{dest}/docker-compose.yml");
        let compose_config = match tokio::fs::read_to_string(&compose_path).await {
            Ok(raw) => Some(
                serde_yaml::from_str(&raw)
                    .map_err(|e| AppError::bad_request(&format!("invalid docker-compose.yml: {e}")))?,
            ),
            Err(_) => None,
        };

        Ok((deploy_config, compose_config))
    }
}

/// `sha256=<hex hmac>` computed over the *raw* request body, matching what
/// GitHub itself signs. Hashing a re-serialized copy of the parsed JSON
/// instead would silently invalidate every signature whose body round-trips
/// with different whitespace or key ordering, so the raw bytes are kept
/// until after verification.
fn verify_github_signature(secret: &str, raw_body: &[u8], signature_header: Option<&str>) -> bool {
    let Some(header) = signature_header else { return false };
    let Some(hex_sig) = header.strip_prefix("sha256=") else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(raw_body);
    let Ok(expected) = hex::decode(hex_sig) else { return false };
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_over_raw_bytes_matches_known_vector() {
        let secret = "mysecret";
        let body = br#"{"ref":"refs/heads/main"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
        assert!(verify_github_signature(secret, body, Some(&signature)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let mut mac = HmacSha256::new_from_slice(b"mysecret").unwrap();
        mac.update(body);
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
        assert!(!verify_github_signature("othersecret", body, Some(&signature)));
    }

    #[test]
    fn missing_header_is_rejected() {
        assert!(!verify_github_signature("mysecret", b"{}", None));
    }
}
