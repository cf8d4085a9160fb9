//! Canonical data model: Project, Application, Deployment, Route, Certificate,
//! GitRepo, Secret, Middleware, plus the ephemeral Docker mirror types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeploySource {
    Git,
    Image,
    Compose,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Pending,
    Building,
    Deploying,
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancer {
    RoundRobin,
    Random,
    LeastConn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    None,
    Http,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    Github,
    Gitlab,
    Gitea,
}

/// A container healthcheck test, normalized from the dynamically-typed JSON
/// shapes a compose/deploy manifest may carry (`["CMD", ...]`,
/// `["CMD-SHELL", cmd]`, or a bare shell string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HealthcheckTest {
    Exec(Vec<String>),
    Shell(String),
}

impl HealthcheckTest {
    /// Returns the argv to exec inside the container for this test.
    pub fn to_exec_argv(&self) -> Vec<String> {
        match self {
            HealthcheckTest::Exec(argv) if argv.first().map(String::as_str) == Some("CMD-SHELL") => {
                vec!["sh".into(), "-c".into(), argv.get(1).cloned().unwrap_or_default()]
            }
            HealthcheckTest::Exec(argv) if argv.first().map(String::as_str) == Some("CMD") => {
                argv[1..].to_vec()
            }
            HealthcheckTest::Exec(argv) => argv.clone(),
            HealthcheckTest::Shell(cmd) => vec!["sh".into(), "-c".into(), cmd.clone()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Healthcheck {
    pub test: HealthcheckTest,
    #[serde(default = "default_hc_interval")]
    pub interval: u64,
    #[serde(default = "default_hc_timeout")]
    pub timeout: u64,
}

fn default_hc_interval() -> u64 {
    5
}
fn default_hc_timeout() -> u64 {
    5
}

/// Env values as declared in a manifest: either a map or a `KEY=VAL` list,
/// always normalized to a map before being stored on an Application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum EnvShape {
    Map(HashMap<String, String>),
    List(Vec<String>),
    #[default]
    Empty,
}

impl EnvShape {
    pub fn normalize(self) -> HashMap<String, String> {
        match self {
            EnvShape::Map(m) => m,
            EnvShape::List(list) => list
                .into_iter()
                .filter_map(|kv| kv.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
                .collect(),
            EnvShape::Empty => HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    pub fn new(id: String, name: String) -> Self {
        let ts = now_ts();
        Self {
            id,
            name,
            description: String::new(),
            source_path: String::new(),
            env: HashMap::new(),
            created_at: ts,
            updated_at: ts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Application {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub source: DeploySource,
    #[serde(default)]
    pub source_url: String,
    #[serde(default = "default_branch")]
    pub source_branch: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default = "default_build_context")]
    pub build_context: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub compose_file: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub healthcheck: Option<Healthcheck>,
    pub status: DeployStatus,
    #[serde(default)]
    pub container_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_branch() -> String {
    "main".into()
}
fn default_dockerfile() -> String {
    "Dockerfile".into()
}
fn default_build_context() -> String {
    ".".into()
}
fn default_port() -> u16 {
    80
}
fn default_replicas() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Deployment {
    pub id: String,
    pub app_id: String,
    pub version: i32,
    pub status: DeployStatus,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub container_ids: Vec<String>,
    #[serde(default)]
    pub logs: String,
    pub started_at: i64,
    pub finished_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Upstream {
    pub address: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub healthy: bool,
    pub container_id: Option<String>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthCheckSpec {
    #[serde(rename = "type")]
    pub kind: HealthCheckType,
    #[serde(default = "default_hc_path")]
    pub path: String,
    #[serde(default = "default_hc_interval")]
    pub interval: u64,
    #[serde(default = "default_hc_timeout")]
    pub timeout: u64,
}

fn default_hc_path() -> String {
    "/".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Route {
    pub id: String,
    pub host: String,
    #[serde(default = "default_hc_path")]
    pub path: String,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub middlewares: Vec<String>,
    #[serde(default = "default_lb")]
    pub load_balancer: LoadBalancer,
    pub health_check: Option<HealthCheckSpec>,
    #[serde(default)]
    pub strip_path: bool,
    #[serde(default = "default_true")]
    pub preserve_host: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_protocol() -> Protocol {
    Protocol::Http
}
fn default_lb() -> LoadBalancer {
    LoadBalancer::RoundRobin
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Certificate {
    pub domain: String,
    pub cert_path: String,
    pub key_path: String,
    pub expires_at: i64,
    #[serde(default = "default_true")]
    pub auto_renew: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GitRepo {
    pub id: String,
    pub provider: GitProvider,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_config_file")]
    pub config_file: String,
    #[serde(default)]
    pub webhook_secret: String,
    pub project_id: Option<String>,
    #[serde(default)]
    pub last_commit: String,
    #[serde(default)]
    pub last_deploy_at: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: i64,
}

fn default_config_file() -> String {
    "deploy.yaml".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Secret {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub value: String,
    pub created_at: i64,
}

impl Secret {
    pub fn make_id(project_id: &str, name: &str) -> String {
        format!("{project_id}-{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Middleware {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DockerNetwork {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    #[serde(default)]
    pub containers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DockerContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub networks: HashMap<String, String>,
    pub app_id: Option<String>,
    pub project_id: Option<String>,
    pub deploy_id: Option<String>,
    pub created_at: i64,
}

/// Timestamp helper shared across handlers/tests that need a `DateTime<Utc>`
/// view of the epoch-seconds fields stored on the model.
pub fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_id_is_namespaced_by_project() {
        assert_eq!(Secret::make_id("proj-1", "DB_URL"), "proj-1-DB_URL");
        assert_ne!(Secret::make_id("proj-1", "DB_URL"), Secret::make_id("proj-2", "DB_URL"));
    }

    #[test]
    fn ts_to_datetime_roundtrips_through_epoch_seconds() {
        let dt = ts_to_datetime(1_700_000_000);
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
