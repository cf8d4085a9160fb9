//! Watches the Docker daemon for container lifecycle events and turns
//! routing-convention labels into `Route`s in the registry. This is the
//! bridge between "a container exists with the right labels" and "the data
//! plane has a route for it".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bollard::query_parameters::{EventsOptions, InspectContainerOptions, ListContainersOptions};
use bollard::Docker;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::docker::manager::short_id;
use crate::error::AppError;
use crate::events::{self, EventBus};
use crate::registry::models::{DockerContainer, HealthCheckType, LoadBalancer, Protocol, Route, Upstream};
use crate::registry::Registry;

type Result<T> = std::result::Result<T, AppError>;

const WATCHED_ACTIONS: [&str; 4] = ["start", "stop", "die", "kill"];

pub struct DockerProvider {
    docker: Docker,
    registry: Arc<Registry>,
    event_bus: EventBus,
    config: Arc<Config>,
    running: Arc<AtomicBool>,
    watch_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DockerProvider {
    pub fn new(docker: Docker, registry: Arc<Registry>, event_bus: EventBus, config: Arc<Config>) -> Self {
        Self {
            docker,
            registry,
            event_bus,
            config,
            running: Arc::new(AtomicBool::new(false)),
            watch_task: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.sync_all().await?;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.watch_events().await;
        });
        *self.watch_task.lock().await = Some(handle);
        info!("docker provider started");
        Ok(())
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.watch_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("docker provider stopped");
    }

    pub async fn sync_all(&self) -> Result<()> {
        let options = ListContainersOptions { all: true, ..Default::default() };
        let containers = self.docker.list_containers(Some(options)).await?;
        let count = containers.len();
        for c in containers {
            let Some(id) = c.id else { continue };
            if let Ok(info) = self.docker.inspect_container(&id, None::<InspectContainerOptions>).await {
                self.process_container(info, "start").await;
            }
        }
        info!(count, "synced containers");
        Ok(())
    }

    async fn watch_events(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let mut filters = HashMap::new();
            filters.insert("type".to_string(), vec!["container".to_string()]);
            filters.insert(
                "event".to_string(),
                WATCHED_ACTIONS.iter().map(|s| s.to_string()).collect(),
            );
            let options = EventsOptions { filters: Some(filters), ..Default::default() };
            let mut stream = self.docker.events(Some(options));

            while let Some(event) = stream.next().await {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(e) => {
                        warn!("docker event stream error: {e}");
                        break;
                    }
                }
            }

            if self.running.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    async fn handle_event(&self, event: bollard::models::EventMessage) {
        let Some(action) = event.action else { return };
        if !WATCHED_ACTIONS.contains(&action.as_str()) {
            return;
        }
        let Some(actor) = event.actor else { return };
        let Some(container_id) = actor.id else { return };

        if action == "start" {
            match self.docker.inspect_container(&container_id, None::<InspectContainerOptions>).await {
                Ok(info) => self.process_container(info, &action).await,
                Err(e) => warn!("container inspect failed {container_id}: {e}"),
            }
        } else {
            self.remove_container_routes(&short_id(&container_id)).await;
        }
    }

    async fn process_container(&self, info: bollard::models::ContainerInspectResponse, action: &str) {
        let Some(full_id) = info.id.clone() else { return };
        let id = short_id(&full_id);
        let name = info
            .name
            .clone()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default();
        let labels = info
            .config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default();

        if matches!(action, "stop" | "die" | "kill") {
            self.remove_container_routes(&id).await;
            if let Err(e) = self.registry.delete_container_by_short_id(&id).await {
                warn!("failed to purge container mirror for {id}: {e}");
            }
            return;
        }

        let networks: HashMap<String, String> = info
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.clone())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, endpoint)| endpoint.ip_address.filter(|ip| !ip.is_empty()).map(|ip| (name, ip)))
            .collect();

        let container = DockerContainer {
            id: id.clone(),
            name: name.clone(),
            image: info.config.as_ref().and_then(|c| c.image.clone()).unwrap_or_default(),
            status: info.state.as_ref().and_then(|s| s.status.as_ref()).map(|s| s.to_string()).unwrap_or_default(),
            labels: labels.clone(),
            networks: networks.clone(),
            app_id: labels.get(&format!("{}app_id", self.config.label_prefix)).cloned(),
            project_id: labels.get(&format!("{}project_id", self.config.label_prefix)).cloned(),
            deploy_id: labels.get(&format!("{}deploy_id", self.config.label_prefix)).cloned(),
            created_at: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = self.registry.set_container(container).await {
            warn!("failed to store container mirror for {id}: {e}");
            return;
        }

        let enable_key = format!("{}enable", self.config.label_prefix);
        if labels.get(&enable_key).map(String::as_str) != Some("true") {
            return;
        }

        let routes = self.parse_labels(&labels, &id, &networks);
        let count = routes.len();
        for route in &routes {
            if let Err(e) = self.registry.set_route(route).await {
                warn!("failed to store route {}: {e}", route.id);
            }
        }
        self.event_bus
            .emit(events::ROUTES_UPDATED, serde_json::json!({"container_id": id, "routes": count}))
            .await;
    }

    fn parse_labels(&self, labels: &HashMap<String, String>, container_id: &str, networks: &HashMap<String, String>) -> Vec<Route> {
        if networks.is_empty() {
            warn!("container {container_id} has no ip address, skipping label-derived routes");
            return Vec::new();
        }

        let ip_address = networks
            .get(&self.config.proxy_network)
            .or_else(|| networks.values().next())
            .cloned()
            .unwrap_or_default();

        let prefix = format!("{}http.routers.", self.config.label_prefix);
        let mut routers: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (key, value) in labels {
            let Some(rest) = key.strip_prefix(&prefix) else { continue };
            let Some((router_name, prop)) = rest.split_once('.') else { continue };
            routers.entry(router_name.to_string()).or_default().insert(prop.to_string(), value.clone());
        }

        let mut routes = Vec::new();
        for (router_name, props) in routers {
            let host = props.get("host").map(|h| h.trim_matches('`').trim().to_string()).unwrap_or_default();
            if host.is_empty() {
                continue;
            }
            let port: u16 = props.get("port").and_then(|p| p.parse().ok()).unwrap_or(80);
            let path = props.get("path").cloned().unwrap_or_else(|| "/".to_string());
            let tls = props.get("tls").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false);
            let middlewares = props
                .get("middlewares")
                .map(|m| m.split(',').map(str::trim).filter(|m| !m.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            let strip_path = props.get("strip_path").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false);
            let preserve_host = props.get("preserve_host").map(|v| !v.eq_ignore_ascii_case("false")).unwrap_or(true);

            let route = Route {
                id: format!("{container_id}-{router_name}"),
                host: host.clone(),
                path,
                protocol: if tls { Protocol::Https } else { Protocol::Http },
                upstreams: vec![Upstream {
                    address: ip_address.clone(),
                    port,
                    weight: 1,
                    healthy: false,
                    container_id: Some(container_id.to_string()),
                }],
                middlewares,
                load_balancer: LoadBalancer::RoundRobin,
                health_check: Some(crate::registry::models::HealthCheckSpec {
                    kind: HealthCheckType::None,
                    path: "/".to_string(),
                    interval: 5,
                    timeout: 5,
                }),
                strip_path,
                preserve_host,
                enabled: true,
            };
            info!(host = %route.host, path = %route.path, upstream = %ip_address, port, "route parsed");
            routes.push(route);
        }
        routes
    }

    async fn remove_container_routes(&self, container_id: &str) {
        let prefix = format!("{container_id}-");
        if let Err(e) = self.registry.delete_routes_by_prefix(&prefix).await {
            warn!("failed to remove routes for {container_id}: {e}");
        }
        self.event_bus
            .emit(events::ROUTES_UPDATED, serde_json::json!({"container_id": container_id, "removed": true}))
            .await;
    }
}
