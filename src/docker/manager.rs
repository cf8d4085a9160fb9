//! Operational facade over the Docker Engine API for networks and
//! containers. Every mutation re-reads the object back from the daemon and
//! re-stores it in the registry's ephemeral mirror, so a caller never has to
//! reconcile a partial local update against what Docker actually did.

use std::collections::HashMap;
use std::sync::Arc;

use bollard::models::{
    EndpointIpamConfig, EndpointSettings, Ipam, IpamConfig, NetworkConnectRequest,
    NetworkCreateRequest, NetworkDisconnectRequest,
};
use bollard::query_parameters::{
    InspectNetworkOptions, ListNetworksOptions, RemoveContainerOptions, RemoveNetworkOptions,
    RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use tracing::{error, info};

use crate::error::AppError;
use crate::registry::models::DockerNetwork;
use crate::registry::Registry;

type Result<T> = std::result::Result<T, AppError>;

pub struct DockerManager {
    docker: Docker,
    registry: Arc<Registry>,
}

impl DockerManager {
    pub fn new(docker: Docker, registry: Arc<Registry>) -> Self {
        Self { docker, registry }
    }

    /// Populate the ephemeral network mirror from whatever the daemon
    /// currently knows about. Called once at startup.
    pub async fn start(&self) -> Result<()> {
        self.sync_networks().await?;
        info!("docker manager started");
        Ok(())
    }

    async fn sync_networks(&self) -> Result<()> {
        let networks = self.docker.list_networks(None::<ListNetworksOptions>).await?;
        for net in networks {
            let Some(id) = net.id.clone() else { continue };
            match self.docker.inspect_network(&id, None::<InspectNetworkOptions>).await {
                Ok(info) => {
                    self.store_network(info).await?;
                }
                Err(e) => error!("network inspect failed for {id}: {e}"),
            }
        }
        Ok(())
    }

    async fn store_network(&self, info: bollard::models::Network) -> Result<DockerNetwork> {
        let ipam = info
            .ipam
            .as_ref()
            .and_then(|i| i.config.as_ref())
            .and_then(|c| c.first())
            .cloned()
            .unwrap_or_default();
        let containers = info
            .containers
            .as_ref()
            .map(|c| c.keys().map(|id| short_id(id)).collect())
            .unwrap_or_default();
        let full_id = info.id.clone().unwrap_or_default();
        let network = DockerNetwork {
            id: short_id(&full_id),
            name: info.name.clone().unwrap_or_default(),
            driver: info.driver.clone().unwrap_or_else(|| "bridge".to_string()),
            scope: info.scope.clone().unwrap_or_else(|| "local".to_string()),
            subnet: ipam.subnet.clone(),
            gateway: ipam.gateway.clone(),
            containers,
        };
        self.registry.set_network(network.clone()).await?;
        Ok(network)
    }

    pub async fn list_networks(&self) -> Result<Vec<DockerNetwork>> {
        Ok(self.registry.get_all_networks().await?)
    }

    pub async fn get_network(&self, id: &str) -> Result<Option<DockerNetwork>> {
        Ok(self.registry.get_network(id).await?)
    }

    pub async fn create_network(
        &self,
        name: &str,
        driver: &str,
        subnet: Option<&str>,
        gateway: Option<&str>,
        internal: bool,
    ) -> Result<DockerNetwork> {
        let ipam = subnet.map(|s| Ipam {
            config: Some(vec![IpamConfig {
                subnet: Some(s.to_string()),
                gateway: gateway.map(|g| g.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });
        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some(driver.to_string()),
            internal: Some(internal),
            ipam,
            ..Default::default()
        };
        let created = self.docker.create_network(request).await?;
        let id = created.id.unwrap_or_default();
        let info = self.docker.inspect_network(&id, None::<InspectNetworkOptions>).await?;
        let network = self.store_network(info).await?;
        info!(network = %name, "network created");
        Ok(network)
    }

    pub async fn delete_network(&self, network_id: &str) -> Result<bool> {
        match self
            .docker
            .remove_network(network_id, None::<RemoveNetworkOptions>)
            .await
        {
            Ok(()) => {
                self.registry.delete_network(&short_id(network_id)).await?;
                info!(network = %network_id, "network deleted");
                Ok(true)
            }
            Err(e) => {
                error!("network delete failed: {e}");
                Ok(false)
            }
        }
    }

    pub async fn connect_container(&self, network_id: &str, container_id: &str) -> Result<bool> {
        let request = NetworkConnectRequest {
            container: Some(container_id.to_string()),
            endpoint_config: Some(EndpointSettings {
                ipam_config: Some(EndpointIpamConfig::default()),
                ..Default::default()
            }),
        };
        match self.docker.connect_network(network_id, request).await {
            Ok(()) => {
                if let Ok(info) = self.docker.inspect_network(network_id, None::<InspectNetworkOptions>).await {
                    self.store_network(info).await?;
                }
                info!(container = %short_id(container_id), network = %short_id(network_id), "container connected");
                Ok(true)
            }
            Err(e) => {
                error!("connect failed: {e}");
                Ok(false)
            }
        }
    }

    pub async fn disconnect_container(&self, network_id: &str, container_id: &str) -> Result<bool> {
        let request = NetworkDisconnectRequest {
            container: Some(container_id.to_string()),
            force: Some(false),
        };
        match self.docker.disconnect_network(network_id, request).await {
            Ok(()) => {
                if let Ok(info) = self.docker.inspect_network(network_id, None::<InspectNetworkOptions>).await {
                    self.store_network(info).await?;
                }
                info!(container = %short_id(container_id), network = %short_id(network_id), "container disconnected");
                Ok(true)
            }
            Err(e) => {
                error!("disconnect failed: {e}");
                Ok(false)
            }
        }
    }

    pub async fn list_containers(&self) -> Result<Vec<crate::registry::models::DockerContainer>> {
        Ok(self.registry.get_all_containers().await?)
    }

    pub async fn get_container(&self, id: &str) -> Result<Option<crate::registry::models::DockerContainer>> {
        Ok(self.registry.get_container(id).await?)
    }

    pub async fn start_container(&self, container_id: &str) -> Result<bool> {
        match self.docker.start_container(container_id, None::<StartContainerOptions>).await {
            Ok(()) => {
                info!(container = %container_id, "container started");
                Ok(true)
            }
            Err(e) => {
                error!("start failed: {e}");
                Ok(false)
            }
        }
    }

    pub async fn stop_container(&self, container_id: &str, timeout_secs: i32) -> Result<bool> {
        let options = StopContainerOptions { signal: None, t: Some(timeout_secs) };
        match self.docker.stop_container(container_id, Some(options)).await {
            Ok(()) => {
                info!(container = %container_id, "container stopped");
                Ok(true)
            }
            Err(e) => {
                error!("stop failed: {e}");
                Ok(false)
            }
        }
    }

    pub async fn restart_container(&self, container_id: &str) -> Result<bool> {
        let options = RestartContainerOptions { signal: None, t: Some(10) };
        match self.docker.restart_container(container_id, Some(options)).await {
            Ok(()) => {
                info!(container = %container_id, "container restarted");
                Ok(true)
            }
            Err(e) => {
                error!("restart failed: {e}");
                Ok(false)
            }
        }
    }

    pub async fn remove_container(&self, container_id: &str, force: bool) -> Result<bool> {
        let options = RemoveContainerOptions { force, v: false, link: false };
        match self.docker.remove_container(container_id, Some(options)).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("remove failed: {e}");
                Ok(false)
            }
        }
    }

    pub async fn get_container_logs(&self, container_id: &str, tail: &str) -> Result<String> {
        use bollard::query_parameters::LogsOptions;
        use futures_util::StreamExt;

        let options = LogsOptions {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            timestamps: false,
            ..Default::default()
        };
        let mut stream = self.docker.logs(container_id, Some(options));
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(log_output) => out.push_str(&log_output.to_string()),
                Err(e) => {
                    error!("get logs failed: {e}");
                    break;
                }
            }
        }
        Ok(out)
    }

    pub async fn get_app_container_ids(&self, app_id: &str) -> Result<Vec<String>> {
        let app = self.registry.get_application(app_id).await?;
        Ok(app.map(|a| a.container_ids).unwrap_or_default())
    }

    /// Runs an exec healthcheck inside a container and returns whether it
    /// exited zero. Used by the deployment engine's cutover gate and by the
    /// periodic health checker for containers without a TCP/HTTP probe.
    pub async fn exec_healthcheck(&self, container_id: &str, argv: &[String]) -> Result<bool> {
        use bollard::exec::{CreateExecOptions, StartExecResults};
        use futures_util::StreamExt;

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(argv.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                while output.next().await.is_some() {}
            }
            StartExecResults::Detached => {}
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(inspect.exit_code == Some(0))
    }
}

/// Docker object ids are truncated to 12 hex chars everywhere routes,
/// networks, and containers are keyed in this crate.
pub fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}
