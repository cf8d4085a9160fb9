use axum::{
    response::Json,
    routing::{delete as http_delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod acme;
mod auth;
mod config;
mod database;
mod deployment;
mod docker;
mod email;
mod error;
mod events;
mod handlers;
mod health;
mod notifications;
mod registry;
mod user;
mod webhook;

use acme::AcmeClient;
use config::Config;
use database::Database;
use deployment::DeploymentEngine;
use docker::{DockerManager, DockerProvider};
use error::AppError;
use events::EventBus;
use health::{CertRenewalTask, HealthChecker};
use notifications::NotificationManager;
use registry::models::{LoadBalancer, Protocol, Route, Upstream};
use registry::Registry;
use webhook::WebhookHandler;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub redis: redis::Client,
    pub config: Arc<Config>,
    pub notification_manager: NotificationManager,

    pub registry: Arc<Registry>,
    pub event_bus: EventBus,
    pub docker_manager: Arc<DockerManager>,
    pub docker_provider: Arc<DockerProvider>,
    pub acme_client: Arc<AcmeClient>,
    pub deployment_engine: Arc<DeploymentEngine>,
    pub webhook_handler: Arc<WebhookHandler>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "container_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::new()?;
    tracing::info!("Starting Container Engine API server");

    let db = Database::new(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!("Database migrations completed");

    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let mut redis_conn = redis_client.get_multiplexed_async_connection().await?;
    redis::cmd("PING").query_async::<_, String>(&mut redis_conn).await?;
    tracing::info!("Redis connection established");

    let config = Arc::new(config);

    let registry = Arc::new(Registry::connect(&config.database_url, &config.redis_url).await?);
    registry.migrate().await?;
    tracing::info!("registry migrations completed");

    register_system_routes(&registry, &config).await;

    let docker = bollard::Docker::connect_with_socket(&config.docker_socket, 120, bollard::API_DEFAULT_VERSION)?;
    let event_bus = EventBus::new();

    let docker_manager = Arc::new(DockerManager::new(docker.clone(), registry.clone()));
    docker_manager.start().await?;

    let docker_provider = Arc::new(DockerProvider::new(docker.clone(), registry.clone(), event_bus.clone(), config.clone()));
    docker_provider.start().await?;

    let acme_client = Arc::new(AcmeClient::new(registry.clone(), config.clone()));
    acme_client.start().await?;

    let webhook_handler = Arc::new(WebhookHandler::new(registry.clone(), event_bus.clone(), config.clone()));

    let deployment_engine = Arc::new(DeploymentEngine::new(
        registry.clone(),
        event_bus.clone(),
        docker.clone(),
        docker_manager.clone(),
        webhook_handler.clone(),
        acme_client.clone(),
        config.clone(),
    ));
    deployment_engine.start().await?;

    let health_checker = Arc::new(HealthChecker::new(registry.clone(), config.health_check_interval));
    health_checker.start().await;

    let cert_renewal = Arc::new(CertRenewalTask::new(acme_client.clone(), config.cert_renewal_days));
    cert_renewal.start().await;

    let notification_manager = NotificationManager::new();
    let notify_on_deploy = notification_manager.clone();
    event_bus
        .subscribe(events::DEPLOY_COMPLETED, move |payload| {
            let notification_manager = notify_on_deploy.clone();
            async move {
                let deploy_id = payload["deploy_id"].as_str().unwrap_or_default();
                let deployment_uuid = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, deploy_id.as_bytes());
                notification_manager
                    .broadcast(notifications::NotificationType::DeploymentStatusChanged {
                        deployment_id: deployment_uuid,
                        status: "running".to_string(),
                        url: None,
                        error_message: None,
                    })
                    .await;
                Ok(())
            }
        })
        .await;

    let state = AppState {
        db,
        redis: redis_client,
        config: config.clone(),
        notification_manager,
        registry,
        event_bus,
        docker_manager,
        docker_provider: docker_provider.clone(),
        acme_client,
        deployment_engine,
        webhook_handler,
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(docker_provider, health_checker, cert_renewal))
        .await?;

    Ok(())
}

/// Best-effort bootstrap routes so the data-plane proxy can reach the
/// frontend and this API process itself under `ROOT_DOMAIN` without an
/// operator having to register them by hand. Failure is logged and
/// non-fatal — the rest of startup does not depend on these existing.
async fn register_system_routes(registry: &Arc<Registry>, config: &Arc<Config>) {
    let bootstrap = [
        (
            "sys-frontend".to_string(),
            config.root_domain.clone(),
            config.local_ip.clone(),
            config.api_port,
        ),
        (
            "sys-api".to_string(),
            format!("sys-api.{}", config.root_domain),
            config.local_ip.clone(),
            config.port,
        ),
    ];

    for (id, host, address, port) in bootstrap {
        let route = Route {
            id: id.clone(),
            host: host.clone(),
            path: "/".to_string(),
            protocol: Protocol::Http,
            upstreams: vec![Upstream { address, port, weight: 1, healthy: true, container_id: None }],
            middlewares: Vec::new(),
            load_balancer: LoadBalancer::RoundRobin,
            health_check: None,
            strip_path: false,
            preserve_host: true,
            enabled: true,
        };
        if let Err(err) = registry.set_route(&route).await {
            tracing::warn!(route = %id, error = %err, "failed to register system route");
        }
    }
}

async fn shutdown_signal(docker_provider: Arc<DockerProvider>, health_checker: Arc<HealthChecker>, cert_renewal: Arc<CertRenewalTask>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, stopping subsystems");
    docker_provider.stop().await;
    health_checker.stop().await;
    cert_renewal.stop().await;
}

fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/system/info", get(handlers::system::system_info))
        .route("/api/v1/system/restart", post(handlers::system::system_restart))

        // Authentication
        .route("/v1/auth/register", post(handlers::auth::register))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/refresh", post(handlers::auth::refresh_token))
        .route("/v1/auth/logout", post(handlers::auth::logout))

        .route("/v1/api-keys", get(handlers::auth::list_api_keys))
        .route("/v1/api-keys", post(handlers::auth::create_api_key))
        .route("/v1/api-keys/:key_id", http_delete(handlers::auth::revoke_api_key))

        .route("/v1/user/profile", get(handlers::user::get_profile))
        .route("/v1/user/profile", put(handlers::user::update_profile))
        .route("/v1/user/password", put(handlers::user::change_password))

        .route("/v1/user/webhooks", get(handlers::webhooks::list_webhooks))
        .route("/v1/user/webhooks", post(handlers::webhooks::create_webhook))
        .route("/v1/user/webhooks/:webhook_id", get(handlers::webhooks::get_webhook))
        .route("/v1/user/webhooks/:webhook_id", put(handlers::webhooks::update_webhook))
        .route("/v1/user/webhooks/:webhook_id", http_delete(handlers::webhooks::delete_webhook))
        .route("/v1/user/webhooks/:webhook_id/test", post(handlers::webhooks::test_webhook))

        .route("/v1/notifications/test", post(handlers::notifications::send_test_notification))
        .route("/v1/notifications/stats", get(handlers::notifications::get_notification_stats))
        .route("/v1/notifications/ws", get(notifications::websocket::websocket_handler))

        // Projects
        .route("/api/v1/projects", get(handlers::projects::list_projects))
        .route("/api/v1/projects", post(handlers::projects::create_project))
        .route("/api/v1/projects/:id", get(handlers::projects::get_project))
        .route("/api/v1/projects/:id", http_delete(handlers::projects::delete_project))
        .route("/api/v1/projects/:id/deploy", post(handlers::projects::deploy_project))
        .route("/api/v1/projects/:id/restart", post(handlers::projects::restart_project))

        // Direct deploy submission (no git repo behind it)
        .route("/deploy/yaml", post(handlers::deploy_submission::deploy_yaml))
        .route("/deploy/local", post(handlers::deploy_submission::deploy_local))

        // Secrets
        .route("/api/v1/projects/:project_id/secrets", get(handlers::secrets::list_secrets))
        .route("/api/v1/projects/:project_id/secrets", post(handlers::secrets::set_secret))
        .route("/api/v1/projects/:project_id/secrets/:name", http_delete(handlers::secrets::delete_secret))

        // Applications
        .route("/api/v1/applications", get(handlers::applications::list_applications))
        .route("/api/v1/applications/:id", get(handlers::applications::get_application))
        .route("/api/v1/applications/:id", http_delete(handlers::applications::remove_application))
        .route("/api/v1/applications/:id/deploy", post(handlers::applications::deploy_application))
        .route("/api/v1/applications/:id/deployments", get(handlers::applications::list_deployments))
        .route("/api/v1/applications/:id/rollback", post(handlers::applications::rollback_application))
        .route("/api/v1/applications/:id/stop", post(handlers::applications::stop_application))
        .route("/api/v1/applications/:id/logs", get(handlers::applications::application_logs))
        .route("/api/v1/applications/:id/deploy-logs", get(handlers::applications::application_deploy_logs))

        // Git repos
        .route("/api/v1/repos", get(handlers::repos::list_repos))
        .route("/api/v1/repos", post(handlers::repos::create_repo))
        .route("/api/v1/repos/:id", get(handlers::repos::get_repo))
        .route("/api/v1/repos/:id", http_delete(handlers::repos::delete_repo))
        .route("/api/v1/repos/:id/deploy", post(handlers::repos::deploy_repo))

        // Routes (reverse-proxy)
        .route("/api/v1/routes", get(handlers::routes::list_routes))
        .route("/api/v1/routes", post(handlers::routes::set_route))
        .route("/api/v1/routes/:id", get(handlers::routes::get_route))
        .route("/api/v1/routes/:id", http_delete(handlers::routes::delete_route))

        // Middlewares
        .route("/api/v1/middlewares", get(handlers::middlewares::list_middlewares))
        .route("/api/v1/middlewares", post(handlers::middlewares::set_middleware))
        .route("/api/v1/middlewares/:name", get(handlers::middlewares::get_middleware))
        .route("/api/v1/middlewares/:name", http_delete(handlers::middlewares::delete_middleware))

        // Certificates
        .route("/api/v1/certificates", get(handlers::certificates::list_certificates))
        .route("/api/v1/certificates/:domain", get(handlers::certificates::get_certificate))
        .route("/api/v1/certificates/:domain/request", post(handlers::certificates::request_certificate))

        // Networks
        .route("/api/v1/networks", get(handlers::networks::list_networks))
        .route("/api/v1/networks", post(handlers::networks::create_network))
        .route("/api/v1/networks/:id", get(handlers::networks::get_network))
        .route("/api/v1/networks/:id", http_delete(handlers::networks::delete_network))
        .route("/api/v1/networks/:network_id/connect/:container_id", post(handlers::networks::connect_container))
        .route("/api/v1/networks/:network_id/disconnect/:container_id", post(handlers::networks::disconnect_container))

        // Containers
        .route("/api/v1/containers", get(handlers::containers::list_containers))
        .route("/api/v1/containers/:id", get(handlers::containers::get_container))
        .route("/api/v1/containers/:id", http_delete(handlers::containers::remove_container))
        .route("/api/v1/containers/:id/start", post(handlers::containers::start_container))
        .route("/api/v1/containers/:id/stop", post(handlers::containers::stop_container))
        .route("/api/v1/containers/:id/restart", post(handlers::containers::restart_container))
        .route("/api/v1/containers/:container_id/logs", get(handlers::logs::get_logs_handler))
        .route("/api/v1/containers/:container_id/logs/ws", get(handlers::logs::ws_logs_handler))

        // Stats
        .route("/api/v1/stats", get(handlers::stats::get_stats))

        // Incoming source-control webhooks
        .route("/api/v1/webhook/:provider", post(handlers::incoming_webhook::handle_webhook))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
        )
        .with_state(state)
}

async fn health_check() -> Result<Json<Value>, AppError> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "container-engine",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

