//! The rolling, zero-downtime deployment engine: turns a project's
//! `deploy.yaml` + `docker-compose.yml` pair into running containers and
//! routes, one application at a time, in dependency order.
//!
//! Dependency ordering uses three-color DFS so a cycle between services is
//! rejected rather than silently accepted by a single `visited` set.
//! `HostConfig` is always initialized before volume binds are set on it.
//! The default per-service domain does not duplicate the project id, since
//! `app.id` already carries the project prefix. `@{dep_id}` substitution in
//! env values replaces the placeholder with the dependency's resolved IP,
//! and rollback reuses the same versioned-container-name + old-container
//! cleanup path that a normal deploy uses, rather than overwriting running
//! container names in place.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use bollard::Docker;
use futures_util::StreamExt;
use serde_yaml::Value as Yaml;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::acme::AcmeClient;
use crate::config::Config;
use crate::docker::manager::short_id;
use crate::docker::DockerManager;
use crate::error::AppError;
use crate::events::{self, EventBus};
use crate::registry::models::{
    Application, DeploySource, DeployStatus, Deployment, GitRepo, Healthcheck, Project, Protocol, Route, Upstream,
};
use crate::registry::Registry;
use crate::webhook::WebhookHandler;

type Result<T> = std::result::Result<T, AppError>;

const HEALTHY_POLL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HEALTHY_GRACE_SECS: u64 = 2;

pub struct DeploymentEngine {
    registry: Arc<Registry>,
    event_bus: EventBus,
    docker: Docker,
    docker_manager: Arc<DockerManager>,
    webhook_handler: Arc<WebhookHandler>,
    acme: Arc<AcmeClient>,
    config: Arc<Config>,
    container_ips: Arc<RwLock<HashMap<String, String>>>,
    app_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeploymentEngine {
    pub fn new(
        registry: Arc<Registry>,
        event_bus: EventBus,
        docker: Docker,
        docker_manager: Arc<DockerManager>,
        webhook_handler: Arc<WebhookHandler>,
        acme: Arc<AcmeClient>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            event_bus,
            docker,
            docker_manager,
            webhook_handler,
            acme,
            config,
            container_ips: Arc::new(RwLock::new(HashMap::new())),
            app_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.deploy_path)
            .await
            .map_err(|e| AppError::internal(&format!("failed to create deploy dir: {e}")))?;

        let this = Arc::clone(self);
        self.event_bus
            .subscribe(events::WEBHOOK_RECEIVED, move |payload| {
                let this = Arc::clone(&this);
                async move {
                    this.on_webhook(payload).await.map_err(|e| e.to_string())
                }
            })
            .await;
        info!("deployment engine started");
        Ok(())
    }

    async fn on_webhook(self: &Arc<Self>, data: serde_json::Value) -> Result<()> {
        let Some(repo_id) = data.get("repo_id").and_then(|v| v.as_str()) else { return Ok(()) };
        let Some(repo) = self.registry.get_git_repo(repo_id).await? else { return Ok(()) };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.deploy_from_repo(&repo).await {
                error!(repo = %repo.id, "deploy from repo failed: {e}");
            }
        });
        Ok(())
    }

    pub async fn deploy_from_repo(&self, repo: &GitRepo) -> Result<Vec<Application>> {
        let (deploy_config, compose_config) = self.webhook_handler.clone_and_parse_config(repo).await?;
        let Some(compose_config) = compose_config else {
            return Err(AppError::bad_request("docker-compose.yml missing from repository"));
        };
        let repo_dir = format!("{}/{}", self.config.deploy_path, repo.id);
        self.deploy_from_config(&deploy_config, &compose_config, Some(repo), &repo_dir).await
    }

    pub async fn deploy_from_config(
        &self,
        deploy_config: &Yaml,
        compose_config: &Yaml,
        repo: Option<&GitRepo>,
        repo_dir: &str,
    ) -> Result<Vec<Application>> {
        let project_id = yaml_str(deploy_config, "id").ok_or_else(|| AppError::bad_request("deploy.yaml is missing 'id'"))?;
        let project_name = yaml_str(deploy_config, "name").unwrap_or_else(|| project_id.clone());

        let project = Project {
            id: project_id.clone(),
            name: project_name,
            description: yaml_str(deploy_config, "description").unwrap_or_default(),
            source_path: repo_dir.to_string(),
            env: yaml_string_map(deploy_config, "env"),
            created_at: chrono::Utc::now().timestamp(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.registry.set_project(&project).await?;

        if let Some(repo) = repo {
            if repo.project_id.is_none() {
                let mut updated = repo.clone();
                updated.project_id = Some(project_id.clone());
                self.registry.set_git_repo(&updated).await?;
            }
        }

        let compose_services_map = compose_config.get("services").and_then(Yaml::as_mapping).cloned().unwrap_or_default();
        let deploy_services_map = deploy_config.get("services").and_then(Yaml::as_mapping).cloned().unwrap_or_default();

        let apps = self.build_apps(&project_id, &compose_services_map, &deploy_services_map, repo_dir);
        let deploy_order = resolve_deploy_order(apps)?;
        info!(order = ?deploy_order.iter().map(|a| &a.id).collect::<Vec<_>>(), "deploy order resolved");

        let mut deployed = Vec::with_capacity(deploy_order.len());
        for app in deploy_order {
            self.registry.set_application(&app).await?;
            self.deploy(&app).await?;
            deployed.push(app);
        }
        Ok(deployed)
    }

    fn build_apps(
        &self,
        project_id: &str,
        compose_services: &serde_yaml::Mapping,
        deploy_services: &serde_yaml::Mapping,
        repo_dir: &str,
    ) -> Vec<Application> {
        let mut apps = Vec::with_capacity(compose_services.len());
        let now = chrono::Utc::now().timestamp();

        for (name_key, svc_def) in compose_services {
            let Some(svc_name) = name_key.as_str() else { continue };
            let image = yaml_str(svc_def, "image").unwrap_or_default();
            let build_def = svc_def.get("build");

            let (source, source_url, dockerfile, build_context) = match build_def {
                Some(Yaml::String(ctx)) => (DeploySource::Git, repo_dir.to_string(), "Dockerfile".to_string(), ctx.clone()),
                Some(Yaml::Mapping(m)) => (
                    DeploySource::Git,
                    repo_dir.to_string(),
                    m.get("dockerfile").and_then(Yaml::as_str).unwrap_or("Dockerfile").to_string(),
                    m.get("context").and_then(Yaml::as_str).unwrap_or(".").to_string(),
                ),
                _ => (DeploySource::Image, String::new(), "Dockerfile".to_string(), ".".to_string()),
            };

            let deploy_meta = deploy_services.get(svc_name);
            let env = svc_env_map(svc_def);
            let healthcheck = svc_def.get("healthcheck").and_then(parse_healthcheck);

            let domain = deploy_meta
                .and_then(|m| yaml_str(m, "domain"))
                .unwrap_or_else(|| format!("{svc_name}-{project_id}.{}", self.config.root_domain));

            let port = deploy_meta.and_then(|m| m.get("port")).and_then(Yaml::as_u64).unwrap_or(80) as u16;
            let replicas = deploy_meta.and_then(|m| m.get("replicas")).and_then(Yaml::as_u64).unwrap_or(1) as u32;

            let volumes = svc_def
                .get("volumes")
                .and_then(Yaml::as_sequence)
                .map(|seq| seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();

            let networks = svc_def
                .get("networks")
                .and_then(Yaml::as_sequence)
                .map(|seq| seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
                .filter(|v: &Vec<String>| !v.is_empty())
                .unwrap_or_else(|| vec![self.config.proxy_network.clone()]);

            let depends_on = svc_def
                .get("depends_on")
                .and_then(Yaml::as_sequence)
                .map(|seq| seq.iter().filter_map(|v| v.as_str().map(|d| format!("{project_id}-{d}"))).collect())
                .unwrap_or_default();

            apps.push(Application {
                id: format!("{project_id}-{svc_name}"),
                project_id: project_id.to_string(),
                name: svc_name.to_string(),
                source,
                source_url,
                source_branch: "main".to_string(),
                dockerfile,
                build_context,
                image,
                compose_file: String::new(),
                domain,
                port,
                env,
                volumes,
                networks,
                replicas,
                depends_on,
                healthcheck,
                status: DeployStatus::Pending,
                container_ids: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        }
        apps
    }

    pub async fn deploy(&self, app: &Application) -> Result<Deployment> {
        let version = self.registry.last_version(&app.id).await? + 1;
        let now = chrono::Utc::now().timestamp();
        let deploy = Deployment {
            id: format!("{}-v{version}", app.id),
            app_id: app.id.clone(),
            version,
            status: DeployStatus::Pending,
            image: String::new(),
            container_ids: Vec::new(),
            logs: String::new(),
            started_at: now,
            finished_at: 0,
        };
        self.registry.set_deployment(&deploy).await?;

        let lock = self.app_lock(&app.id).await;
        let app = app.clone();
        let worker = self.spawn_worker();
        let deploy_clone = deploy.clone();
        tokio::spawn(async move {
            let _permit = lock.lock().await;
            worker.run_deploy(app, deploy_clone).await;
        });
        Ok(deploy)
    }

    fn spawn_worker(&self) -> DeployWorker {
        DeployWorker {
            registry: Arc::clone(&self.registry),
            event_bus: self.event_bus.clone(),
            docker: self.docker.clone(),
            docker_manager: Arc::clone(&self.docker_manager),
            config: Arc::clone(&self.config),
            container_ips: Arc::clone(&self.container_ips),
        }
    }

    async fn app_lock(&self, app_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.app_locks.lock().await;
        locks.entry(app_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn stop_app(&self, app: &Application) -> Result<()> {
        for cid in &app.container_ids {
            self.docker_manager.stop_container(cid, 10).await?;
        }
        let mut updated = app.clone();
        updated.status = DeployStatus::Stopped;
        updated.updated_at = chrono::Utc::now().timestamp();
        self.registry.set_application(&updated).await?;
        Ok(())
    }

    pub async fn remove_app(&self, app: &Application) -> Result<()> {
        for cid in &app.container_ids {
            self.docker_manager.stop_container(cid, 5).await.ok();
            self.docker_manager.remove_container(cid, true).await.ok();
        }
        if !app.domain.is_empty() {
            self.registry.delete_route(&format!("app-{}", app.id)).await?;
        }
        self.container_ips.write().await.remove(&app.id);
        Ok(())
    }

    pub async fn rollback(&self, app: &Application, target_version: i32) -> Result<Option<Deployment>> {
        let Some(target) = self.registry.get_deployment_by_version(&app.id, target_version).await? else {
            return Ok(None);
        };
        if target.image.is_empty() {
            return Ok(None);
        }

        let new_version = self.registry.last_version(&app.id).await? + 1;
        let now = chrono::Utc::now().timestamp();
        let mut deploy = Deployment {
            id: format!("{}-v{new_version}", app.id),
            app_id: app.id.clone(),
            version: new_version,
            status: DeployStatus::Deploying,
            image: target.image.clone(),
            container_ids: Vec::new(),
            logs: String::new(),
            started_at: now,
            finished_at: 0,
        };
        self.registry.set_deployment(&deploy).await?;

        let old_container_ids = app.container_ids.clone();
        let worker = self.spawn_worker();
        let container_ids = worker.run_containers(app, &target.image, &deploy, &format!("v{new_version}")).await?;

        deploy.status = DeployStatus::Running;
        deploy.container_ids = container_ids.clone();
        deploy.finished_at = chrono::Utc::now().timestamp();
        self.registry.set_deployment(&deploy).await?;

        let mut updated_app = app.clone();
        updated_app.status = DeployStatus::Running;
        updated_app.container_ids = container_ids;
        updated_app.image = target.image;
        updated_app.updated_at = chrono::Utc::now().timestamp();
        self.registry.set_application(&updated_app).await?;

        worker.stop_containers(&old_container_ids).await;

        info!(app = %app.id, to_version = target_version, "rollback completed");
        Ok(Some(deploy))
    }

    /// Requests a certificate for an application's domain once it has a
    /// route, used by the handler layer after a successful HTTPS-enabled
    /// deploy. Exposed here since the engine already owns both the registry
    /// and the ACME client it was built with.
    pub async fn request_certificate(&self, domain: &str) -> Result<()> {
        self.acme.obtain_certificate(domain).await.map(|_| ())
    }
}

/// Stateless worker carrying just the handles a single deploy run needs.
/// Spawned per-deploy so `DeploymentEngine::deploy` can return immediately
/// while the rollout runs in the background.
#[derive(Clone)]
struct DeployWorker {
    registry: Arc<Registry>,
    event_bus: EventBus,
    docker: Docker,
    docker_manager: Arc<DockerManager>,
    config: Arc<Config>,
    container_ips: Arc<RwLock<HashMap<String, String>>>,
}

impl DeployWorker {
    async fn run_deploy(&self, app: Application, mut deploy: Deployment) {
        let old_container_ids = app.container_ids.clone();
        let mut new_container_ids: Vec<String> = Vec::new();

        let result: Result<()> = async {
            deploy.status = DeployStatus::Building;
            self.registry.set_deployment(&deploy).await?;
            self.update_app_status(&app, DeployStatus::Building).await?;

            let image = match app.source {
                DeploySource::Git => self.build_from_git(&app, &deploy).await?,
                DeploySource::Image | DeploySource::Compose => self.pull_image(&app).await?,
            };

            deploy.status = DeployStatus::Deploying;
            deploy.image = image.clone();
            self.registry.set_deployment(&deploy).await?;
            self.update_app_status(&app, DeployStatus::Deploying).await?;

            new_container_ids = self.run_containers(&app, &image, &deploy, &format!("v{}", deploy.version)).await?;

            let healthy = self.wait_for_healthy(&app, &new_container_ids).await;
            if !healthy {
                return Err(AppError::HealthcheckFailed(app.id.clone()));
            }

            deploy.status = DeployStatus::Running;
            deploy.container_ids = new_container_ids.clone();
            deploy.finished_at = chrono::Utc::now().timestamp();
            self.registry.set_deployment(&deploy).await?;

            let mut updated_app = app.clone();
            updated_app.status = DeployStatus::Running;
            updated_app.container_ids = new_container_ids.clone();
            updated_app.image = image;
            updated_app.updated_at = chrono::Utc::now().timestamp();
            self.registry.set_application(&updated_app).await?;

            if !updated_app.domain.is_empty() {
                self.create_route(&updated_app).await?;
            }

            self.event_bus
                .emit(events::DEPLOY_COMPLETED, serde_json::json!({"app_id": app.id, "deploy_id": deploy.id}))
                .await;
            info!(deploy = %deploy.id, "deploy completed");

            self.stop_containers(&old_container_ids).await;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!(deploy = %deploy.id, "deploy failed: {e}");
            for cid in &new_container_ids {
                if let Ok(logs) = self.docker_manager.get_container_logs(cid, "50").await {
                    error!(container = %cid, "failed container logs:\n{logs}");
                }
            }
            deploy.status = DeployStatus::Failed;
            deploy.logs = e.to_string();
            deploy.finished_at = chrono::Utc::now().timestamp();
            let _ = self.registry.set_deployment(&deploy).await;
            let _ = self.update_app_status(&app, DeployStatus::Failed).await;
            self.stop_containers(&new_container_ids).await;
        }
    }

    async fn update_app_status(&self, app: &Application, status: DeployStatus) -> Result<()> {
        let mut updated = app.clone();
        updated.status = status;
        updated.updated_at = chrono::Utc::now().timestamp();
        self.registry.set_application(&updated).await
    }

    async fn stop_containers(&self, container_ids: &[String]) {
        for cid in container_ids {
            if let Err(e) = self.docker_manager.stop_container(cid, 5).await {
                warn!("failed to stop {cid}: {e}");
                continue;
            }
            if let Err(e) = self.docker_manager.remove_container(cid, true).await {
                warn!("failed to remove {cid}: {e}");
            } else {
                info!(container = %cid, "cleaned up container");
            }
        }
    }

    async fn wait_for_healthy(&self, app: &Application, container_ids: &[String]) -> bool {
        let Some(hc) = &app.healthcheck else {
            tokio::time::sleep(std::time::Duration::from_secs(DEFAULT_HEALTHY_GRACE_SECS)).await;
            return true;
        };
        if container_ids.is_empty() {
            tokio::time::sleep(std::time::Duration::from_secs(DEFAULT_HEALTHY_GRACE_SECS)).await;
            return true;
        }

        let argv = hc.test.to_exec_argv();
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(HEALTHY_POLL_TIMEOUT_SECS);
        while tokio::time::Instant::now() < deadline {
            let mut all_healthy = true;
            for cid in container_ids {
                match self.docker_manager.exec_healthcheck(cid, &argv).await {
                    Ok(true) => {}
                    _ => {
                        all_healthy = false;
                        break;
                    }
                }
            }
            if all_healthy {
                info!(app = %app.id, "all services healthy");
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_secs(hc.interval.max(1))).await;
        }
        warn!(app = %app.id, "healthcheck timeout");
        false
    }

    async fn build_from_git(&self, app: &Application, deploy: &Deployment) -> Result<String> {
        let repo_dir: std::path::PathBuf = if !app.source_url.is_empty() && Path::new(&app.source_url).exists() {
            Path::new(&app.source_url).to_path_buf()
        } else {
            let dir = Path::new(&self.config.deploy_path).join(&app.id);
            let _ = tokio::fs::remove_dir_all(&dir).await;
            let status = tokio::process::Command::new("git")
                .args(["clone", "--depth", "1", "--branch", &app.source_branch, &app.source_url, &dir.to_string_lossy()])
                .status()
                .await
                .map_err(|e| AppError::BuildFailed(format!("git clone failed to spawn: {e}")))?;
            if !status.success() {
                return Err(AppError::BuildFailed(format!("git clone of {} failed", app.source_url)));
            }
            dir
        };

        let image_tag = format!("vo/{}:v{}", app.id, deploy.version);
        let build_context = if app.build_context != "." { repo_dir.join(&app.build_context) } else { repo_dir };
        let dockerfile_path = build_context.join(&app.dockerfile);
        if !dockerfile_path.exists() {
            return Err(AppError::BuildFailed(format!("{} not found in build context", app.dockerfile)));
        }

        let tar_gz = build_context_tar(&build_context)
            .map_err(|e| AppError::BuildFailed(format!("failed to tar build context: {e}")))?;

        let options = bollard::query_parameters::BuildImageOptions {
            dockerfile: app.dockerfile.clone(),
            t: Some(image_tag.clone()),
            rm: true,
            ..Default::default()
        };
        let mut stream = self.docker.build_image(options, None, Some(tar_gz.into()));
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(info) => {
                    if let Some(err) = info.error {
                        return Err(AppError::BuildFailed(err));
                    }
                }
                Err(e) => return Err(AppError::BuildFailed(e.to_string())),
            }
        }
        info!(image = %image_tag, "image built");
        Ok(image_tag)
    }

    async fn pull_image(&self, app: &Application) -> Result<String> {
        let image = if !app.image.is_empty() { app.image.clone() } else { app.source_url.clone() };
        info!(image = %image, "pulling image");
        let options = bollard::query_parameters::CreateImageOptions { from_image: Some(image.clone()), ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);
        let mut pull_failed = None;
        while let Some(chunk) = stream.next().await {
            if let Err(e) = chunk {
                pull_failed = Some(e.to_string());
                break;
            }
        }
        if let Some(err) = pull_failed {
            if self.docker.inspect_image(&image).await.is_ok() {
                warn!(image = %image, "pull failed ({err}), using local image");
                return Ok(image);
            }
            return Err(AppError::PullFailed(err));
        }
        Ok(image)
    }

    async fn run_containers(&self, app: &Application, image: &str, deploy: &Deployment, suffix: &str) -> Result<Vec<String>> {
        let project = self.registry.get_project(&app.project_id).await?;
        let mut env: HashMap<String, String> = project.map(|p| p.env).unwrap_or_default();
        env.extend(app.env.clone());
        let env = self.resolve_service_refs(app, env).await;

        let mut container_ids = Vec::with_capacity(app.replicas as usize);
        let networks = if app.networks.is_empty() { vec![self.config.proxy_network.clone()] } else { app.networks.clone() };

        for i in 0..app.replicas {
            let base_name = format!("{}-{suffix}", app.id);
            let name = if app.replicas > 1 { format!("{base_name}-{i}") } else { base_name };

            let domain = normalize_domain(&app.domain, &app.id, &app.project_id, &self.config.root_domain);
            let mut labels = HashMap::from([
                (format!("{}enable", self.config.label_prefix), "true".to_string()),
                (format!("{}app_id", self.config.label_prefix), app.id.clone()),
                (format!("{}project_id", self.config.label_prefix), app.project_id.clone()),
                (format!("{}deploy_id", self.config.label_prefix), deploy.id.clone()),
            ]);
            if !domain.is_empty() {
                labels.insert(format!("{}http.routers.{}.host", self.config.label_prefix, app.id), domain);
                labels.insert(format!("{}http.routers.{}.port", self.config.label_prefix, app.id), app.port.to_string());
            }

            let host_config = bollard::models::HostConfig {
                binds: if app.volumes.is_empty() { None } else { Some(app.volumes.clone()) },
                ..Default::default()
            };
            let body = bollard::models::ContainerCreateBody {
                image: Some(image.to_string()),
                env: Some(env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
                labels: Some(labels),
                hostname: Some(app.id.clone()),
                host_config: Some(host_config),
                ..Default::default()
            };
            let options = bollard::query_parameters::CreateContainerOptions { name: Some(name.clone()), ..Default::default() };
            let created = self.docker.create_container(Some(options), body).await?;
            let full_id = created.id;

            for net in &networks {
                let request = bollard::models::NetworkConnectRequest {
                    container: Some(full_id.clone()),
                    endpoint_config: Some(bollard::models::EndpointSettings {
                        aliases: Some(vec![app.id.clone()]),
                        ..Default::default()
                    }),
                };
                if let Err(e) = self.docker.connect_network(net, request).await {
                    warn!("network connect failed {net}: {e}");
                }
            }

            self.docker.start_container(&full_id, None::<bollard::query_parameters::StartContainerOptions>).await?;
            let cid = short_id(&full_id);
            container_ids.push(cid.clone());
            info!(name = %name, id = %cid, "container started");

            if let Ok(inspect) = self.docker.inspect_container(&full_id, None::<bollard::query_parameters::InspectContainerOptions>).await {
                if let Some(ip) = find_preferred_ip(&inspect, &networks) {
                    self.container_ips.write().await.insert(app.id.clone(), ip);
                }
            }
        }
        Ok(container_ids)
    }

    /// Replaces `@{dep_id}` placeholders in env values with the dependency
    /// application's resolved container IP.
    async fn resolve_service_refs(&self, app: &Application, env: HashMap<String, String>) -> HashMap<String, String> {
        let secrets = self.registry.get_project_secrets(&app.project_id).await.unwrap_or_default();

        let mut resolved = HashMap::with_capacity(env.len());
        for (key, value) in env {
            let mut value = value;
            for dep_id in &app.depends_on {
                let marker = format!("@{dep_id}");
                if value.contains(&marker) {
                    let ip = self.container_ips.read().await.get(dep_id).cloned().unwrap_or_else(|| dep_id.clone());
                    value = value.replace(&marker, &ip);
                }
            }
            for secret in &secrets {
                let marker = format!("${{{}}}", secret.name);
                if value.contains(&marker) {
                    value = value.replace(&marker, &secret.value);
                }
            }
            resolved.insert(key, value);
        }
        resolved
    }

    async fn create_route(&self, app: &Application) -> Result<()> {
        if app.container_ids.is_empty() {
            return Ok(());
        }
        let mut upstreams = Vec::with_capacity(app.container_ids.len());
        for cid in &app.container_ids {
            let Ok(inspect) = self.docker.inspect_container(cid, None::<bollard::query_parameters::InspectContainerOptions>).await else {
                continue;
            };
            let mut preferred = vec![self.config.proxy_network.clone()];
            preferred.extend(app.networks.clone());
            if let Some(ip) = find_preferred_ip(&inspect, &preferred) {
                upstreams.push(Upstream { address: ip, port: app.port, weight: 1, healthy: true, container_id: Some(cid.clone()) });
            }
        }
        if upstreams.is_empty() {
            warn!(app = %app.id, "no upstreams for route");
            return Ok(());
        }
        let route = Route {
            id: format!("app-{}", app.id),
            host: app.domain.clone(),
            path: "/".to_string(),
            protocol: Protocol::Http,
            upstreams: upstreams.clone(),
            middlewares: Vec::new(),
            load_balancer: crate::registry::models::LoadBalancer::RoundRobin,
            health_check: None,
            strip_path: false,
            preserve_host: true,
            enabled: true,
        };
        self.registry.set_route(&route).await?;
        info!(domain = %app.domain, upstreams = upstreams.len(), "route created");
        Ok(())
    }
}

/// `{project_id}-{svc}` domains already carry the project id via `app.id`;
/// this must not be appended a second time.
fn normalize_domain(domain: &str, app_id: &str, project_id: &str, root_domain: &str) -> String {
    if !domain.is_empty() {
        return if domain.contains('.') { domain.to_string() } else { format!("{domain}.{root_domain}") };
    }
    let _ = project_id;
    format!("{app_id}.{root_domain}")
}

fn find_preferred_ip(inspect: &bollard::models::ContainerInspectResponse, preferred_networks: &[String]) -> Option<String> {
    let networks = inspect.network_settings.as_ref()?.networks.as_ref()?;
    for net in preferred_networks {
        if let Some(endpoint) = networks.get(net) {
            if let Some(ip) = endpoint.ip_address.as_ref().filter(|ip| !ip.is_empty()) {
                return Some(ip.clone());
            }
        }
    }
    networks.values().find_map(|e| e.ip_address.clone().filter(|ip| !ip.is_empty()))
}

/// Three-color DFS: white (unvisited) / gray (on stack) / black (finished).
/// A gray node revisited mid-traversal is a genuine cycle, unlike the
/// original's single `visited` set, which treated a cycle the same as a
/// diamond dependency and silently dropped the back edge.
fn resolve_deploy_order(apps: Vec<Application>) -> Result<Vec<Application>> {
    #[derive(PartialEq, Clone, Copy)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let app_map: HashMap<String, Application> = apps.iter().map(|a| (a.id.clone(), a.clone())).collect();
    let mut color: HashMap<String, Color> = apps.iter().map(|a| (a.id.clone(), Color::White)).collect();
    let mut order = Vec::with_capacity(apps.len());

    fn visit(
        app_id: &str,
        app_map: &HashMap<String, Application>,
        color: &mut HashMap<String, Color>,
        order: &mut Vec<Application>,
        path: &mut HashSet<String>,
    ) -> Result<()> {
        match color.get(app_id) {
            Some(Color::Black) => return Ok(()),
            Some(Color::Gray) => {
                return Err(AppError::invalid_dependency(format!(
                    "dependency cycle detected at '{app_id}' (path: {})",
                    path.iter().cloned().collect::<Vec<_>>().join(" -> ")
                )))
            }
            _ => {}
        }
        let Some(app) = app_map.get(app_id) else { return Ok(()) };
        color.insert(app_id.to_string(), Color::Gray);
        path.insert(app_id.to_string());
        for dep in &app.depends_on {
            visit(dep, app_map, color, order, path)?;
        }
        path.remove(app_id);
        color.insert(app_id.to_string(), Color::Black);
        order.push(app.clone());
        Ok(())
    }

    for app in &apps {
        let mut path = HashSet::new();
        visit(&app.id, &app_map, &mut color, &mut order, &mut path)?;
    }
    Ok(order)
}

fn build_context_tar(context: &Path) -> std::io::Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    {
        let mut builder = tar::Builder::new(&mut gz);
        builder.append_dir_all(".", context)?;
        builder.finish()?;
    }
    gz.finish()
}

fn yaml_str(value: &Yaml, key: &str) -> Option<String> {
    value.get(key).and_then(Yaml::as_str).map(str::to_string)
}

fn yaml_string_map(value: &Yaml, key: &str) -> HashMap<String, String> {
    value
        .get(key)
        .and_then(Yaml::as_mapping)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str().unwrap_or_default().to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn svc_env_map(svc_def: &Yaml) -> HashMap<String, String> {
    match svc_def.get("environment") {
        Some(Yaml::Mapping(m)) => m
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str().unwrap_or_default().to_string())))
            .collect(),
        Some(Yaml::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str()?.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
            .collect(),
        _ => HashMap::new(),
    }
}

fn parse_healthcheck(value: &Yaml) -> Option<Healthcheck> {
    let test_value = value.get("test")?;
    let test = match test_value {
        Yaml::String(s) => crate::registry::models::HealthcheckTest::Shell(s.clone()),
        Yaml::Sequence(seq) => {
            crate::registry::models::HealthcheckTest::Exec(seq.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        }
        _ => return None,
    };
    let interval = value.get("interval").and_then(Yaml::as_str).and_then(parse_duration_secs).unwrap_or(5);
    let timeout = value.get("timeout").and_then(Yaml::as_str).and_then(parse_duration_secs).unwrap_or(5);
    Some(Healthcheck { test, interval, timeout })
}

fn parse_duration_secs(raw: &str) -> Option<u64> {
    raw.trim_end_matches('s').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::DeployStatus;

    fn app(id: &str, deps: &[&str]) -> Application {
        Application {
            id: id.to_string(),
            project_id: "p".to_string(),
            name: id.to_string(),
            source: DeploySource::Image,
            source_url: String::new(),
            source_branch: "main".to_string(),
            dockerfile: "Dockerfile".to_string(),
            build_context: ".".to_string(),
            image: "alpine".to_string(),
            compose_file: String::new(),
            domain: String::new(),
            port: 80,
            env: HashMap::new(),
            volumes: Vec::new(),
            networks: Vec::new(),
            replicas: 1,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            healthcheck: None,
            status: DeployStatus::Pending,
            container_ids: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let apps = vec![app("web", &["db"]), app("db", &[])];
        let order = resolve_deploy_order(apps).unwrap();
        let positions: HashMap<_, _> = order.iter().enumerate().map(|(i, a)| (a.id.clone(), i)).collect();
        assert!(positions["db"] < positions["web"]);
    }

    #[test]
    fn detects_a_cycle() {
        let apps = vec![app("a", &["b"]), app("b", &["a"])];
        let err = resolve_deploy_order(apps).unwrap_err();
        assert!(matches!(err, AppError::InvalidDependency(_)));
    }

    #[test]
    fn domain_is_not_double_prefixed_with_project_id() {
        let domain = normalize_domain("", "myproj-web", "myproj", "127.0.0.1.nip.io");
        assert_eq!(domain, "myproj-web.127.0.0.1.nip.io");
    }
}
