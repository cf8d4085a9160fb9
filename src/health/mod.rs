//! Background workers: periodic upstream health probes feeding the hot
//! cache's `upstreams:health:*` keys, and an hourly certificate renewal
//! sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::acme::AcmeClient;
use crate::registry::models::{HealthCheckType, Route};
use crate::registry::Registry;

pub struct HealthChecker {
    registry: Arc<Registry>,
    interval: Duration,
    running: Arc<AtomicBool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HealthChecker {
    pub fn new(registry: Arc<Registry>, interval_secs: u64) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(interval_secs.max(1)),
            running: Arc::new(AtomicBool::new(false)),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock().await = Some(handle);
        info!("health checker started");
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.check_all().await {
                error!("health check sweep failed: {e}");
            }
        }
    }

    async fn check_all(&self) -> Result<(), crate::error::AppError> {
        let routes = self.registry.list_enabled_routes().await?;
        for route in routes {
            let Some(hc) = route.health_check.as_ref().filter(|h| h.kind != HealthCheckType::None) else {
                continue;
            };
            for upstream in &route.upstreams {
                let healthy = check_upstream(&route, &upstream.address, upstream.port, hc.timeout).await;
                if let Err(e) = self
                    .registry
                    .update_upstream_health(&route.id, &upstream.address, upstream.port, healthy)
                    .await
                {
                    warn!("failed to record health for {}:{}: {e}", upstream.address, upstream.port);
                }
            }
        }
        Ok(())
    }
}

async fn check_upstream(route: &Route, address: &str, port: u16, timeout_secs: u64) -> bool {
    let Some(hc) = &route.health_check else { return true };
    let timeout = Duration::from_secs(timeout_secs.max(1));
    match hc.kind {
        HealthCheckType::Http => {
            let url = format!("http://{address}:{port}{}", hc.path);
            match reqwest::Client::builder().timeout(timeout).build() {
                Ok(client) => client.get(&url).send().await.map(|r| r.status().as_u16() < 500).unwrap_or(false),
                Err(_) => false,
            }
        }
        HealthCheckType::Tcp => {
            tokio::time::timeout(timeout, tokio::net::TcpStream::connect((address, port))).await.map(|r| r.is_ok()).unwrap_or(false)
        }
        HealthCheckType::None => true,
    }
}

/// Hourly sweep that renews any certificate within the configured
/// expiration window.
pub struct CertRenewalTask {
    acme: Arc<AcmeClient>,
    renewal_days: i64,
    running: Arc<AtomicBool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CertRenewalTask {
    pub fn new(acme: Arc<AcmeClient>, renewal_days: i64) -> Self {
        Self {
            acme,
            renewal_days,
            running: Arc::new(AtomicBool::new(false)),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock().await = Some(handle);
        info!("cert renewal task started");
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match self.acme.renew_expiring(self.renewal_days).await {
                Ok(renewed) if !renewed.is_empty() => info!(count = renewed.len(), "certificates renewed"),
                Ok(_) => {}
                Err(e) => error!("cert renewal sweep failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::models::{HealthCheckSpec, LoadBalancer, Protocol};

    fn route_with_check(kind: HealthCheckType) -> Route {
        Route {
            id: "r1".into(),
            host: "example.com".into(),
            path: "/".into(),
            protocol: Protocol::Http,
            upstreams: vec![],
            middlewares: vec![],
            load_balancer: LoadBalancer::RoundRobin,
            health_check: Some(HealthCheckSpec { kind, path: "/health".into(), interval: 5, timeout: 1 }),
            strip_path: false,
            preserve_host: true,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn tcp_check_against_unreachable_port_is_unhealthy() {
        let route = route_with_check(HealthCheckType::Tcp);
        let healthy = check_upstream(&route, "127.0.0.1", 1, 1).await;
        assert!(!healthy);
    }

    #[tokio::test]
    async fn none_healthcheck_is_always_healthy() {
        let route = route_with_check(HealthCheckType::None);
        let healthy = check_upstream(&route, "127.0.0.1", 1, 1).await;
        assert!(healthy);
    }
}
