//! The authoritative state store: durable relational writes backed by
//! Postgres, mirrored into a Redis hot cache for the data-plane proxy, plus
//! an in-memory ephemeral mirror for Docker runtime state and ACME
//! challenges.

pub mod models;

use std::collections::HashMap;
use std::sync::Arc;

use redis::AsyncCommands;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::warn;

type Result<T> = std::result::Result<T, AppError>;

use crate::error::AppError;
use models::{
    Application, Certificate, DeployStatus, Deployment, DockerContainer, DockerNetwork, GitRepo,
    Middleware, Project, Route, Secret,
};

const CHALLENGE_TTL_SECS: i64 = 300;
const UPSTREAM_HEALTH_TTL_SECS: i64 = 60;

#[derive(Clone)]
pub struct Registry {
    pool: PgPool,
    redis: redis::Client,
    networks: Arc<RwLock<HashMap<String, DockerNetwork>>>,
    containers: Arc<RwLock<HashMap<String, DockerContainer>>>,
}

impl Registry {
    pub async fn connect(database_url: &str, redis_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let redis = redis::Client::open(redis_url)?;
        Ok(Self {
            pool,
            redis,
            networks: Arc::new(RwLock::new(HashMap::new())),
            containers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn redis_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.redis.get_multiplexed_async_connection().await?)
    }

    /// Bump the monotonic `config:version` counter. Called on every routing
    /// mutation (set_route, delete_route); upstream health updates never
    /// bump it, only structural route changes do.
    pub async fn bump_config_version(&self) -> Result<i64> {
        match self.redis_conn().await {
            Ok(mut conn) => match conn.incr::<_, _, i64>("config:version", 1).await {
                Ok(v) => Ok(v),
                Err(e) => {
                    warn!("config:version bump failed, cache will rehydrate lazily: {e}");
                    Ok(0)
                }
            },
            Err(e) => {
                warn!("redis unavailable for config:version bump: {e}");
                Ok(0)
            }
        }
    }

    pub async fn config_version(&self) -> Result<i64> {
        let mut conn = self.redis_conn().await?;
        let v: Option<i64> = conn.get("config:version").await?;
        Ok(v.unwrap_or(0))
    }

    // ---------------------------------------------------------------- Project

    pub async fn set_project(&self, p: &Project) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO projects (id, name, description, source_path, env, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 description = EXCLUDED.description,
                 source_path = EXCLUDED.source_path,
                 env = EXCLUDED.env,
                 updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&p.id)
        .bind(&p.name)
        .bind(&p.description)
        .bind(&p.source_path)
        .bind(serde_json::to_value(&p.env)?)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(project_from_row).transpose()
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(project_from_row).collect()
    }

    /// Cascade-deletes applications and secrets (invariant a).
    pub async fn delete_project(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM secrets WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM applications WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------ Application

    pub async fn set_application(&self, a: &Application) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO applications (
                 id, project_id, name, source, source_url, source_branch, dockerfile,
                 build_context, image, compose_file, domain, port, env, volumes, networks,
                 replicas, depends_on, healthcheck, status, container_ids, created_at, updated_at
               ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)
               ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name, source = EXCLUDED.source, source_url = EXCLUDED.source_url,
                 source_branch = EXCLUDED.source_branch, dockerfile = EXCLUDED.dockerfile,
                 build_context = EXCLUDED.build_context, image = EXCLUDED.image,
                 compose_file = EXCLUDED.compose_file, domain = EXCLUDED.domain, port = EXCLUDED.port,
                 env = EXCLUDED.env, volumes = EXCLUDED.volumes, networks = EXCLUDED.networks,
                 replicas = EXCLUDED.replicas, depends_on = EXCLUDED.depends_on,
                 healthcheck = EXCLUDED.healthcheck, status = EXCLUDED.status,
                 container_ids = EXCLUDED.container_ids, updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&a.id)
        .bind(&a.project_id)
        .bind(serde_json::to_value(&a.source)?.as_str().unwrap_or("image").to_string())
        .bind(&a.source_url)
        .bind(&a.source_branch)
        .bind(&a.dockerfile)
        .bind(&a.build_context)
        .bind(&a.image)
        .bind(&a.compose_file)
        .bind(&a.domain)
        .bind(a.port as i32)
        .bind(serde_json::to_value(&a.env)?)
        .bind(serde_json::to_value(&a.volumes)?)
        .bind(serde_json::to_value(&a.networks)?)
        .bind(a.replicas as i32)
        .bind(serde_json::to_value(&a.depends_on)?)
        .bind(serde_json::to_value(&a.healthcheck)?)
        .bind(serde_json::to_value(&a.status)?.as_str().unwrap_or("pending").to_string())
        .bind(serde_json::to_value(&a.container_ids)?)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_application(&self, id: &str) -> Result<Option<Application>> {
        let row = sqlx::query("SELECT * FROM applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(application_from_row).transpose()
    }

    pub async fn list_applications_of_project(&self, project_id: &str) -> Result<Vec<Application>> {
        let rows = sqlx::query("SELECT * FROM applications WHERE project_id = $1 ORDER BY created_at ASC")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(application_from_row).collect()
    }

    pub async fn delete_application(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM deployments WHERE app_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------- Deployment

    pub async fn last_version(&self, app_id: &str) -> Result<i32> {
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM deployments WHERE app_id = $1")
            .bind(app_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i32, _>("v")?)
    }

    pub async fn set_deployment(&self, d: &Deployment) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO deployments (id, app_id, version, status, image, container_ids, logs, started_at, finished_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
               ON CONFLICT (id) DO UPDATE SET
                 status = EXCLUDED.status, image = EXCLUDED.image,
                 container_ids = EXCLUDED.container_ids, logs = EXCLUDED.logs,
                 finished_at = EXCLUDED.finished_at"#,
        )
        .bind(&d.id)
        .bind(&d.app_id)
        .bind(d.version)
        .bind(serde_json::to_value(&d.status)?.as_str().unwrap_or("pending").to_string())
        .bind(&d.image)
        .bind(serde_json::to_value(&d.container_ids)?)
        .bind(&d.logs)
        .bind(d.started_at)
        .bind(d.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_deployment(&self, id: &str) -> Result<Option<Deployment>> {
        let row = sqlx::query("SELECT * FROM deployments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(deployment_from_row).transpose()
    }

    pub async fn get_deployment_by_version(&self, app_id: &str, version: i32) -> Result<Option<Deployment>> {
        let row = sqlx::query("SELECT * FROM deployments WHERE app_id = $1 AND version = $2")
            .bind(app_id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        row.map(deployment_from_row).transpose()
    }

    pub async fn list_deployments_of_app(&self, app_id: &str, limit: i64) -> Result<Vec<Deployment>> {
        let rows = sqlx::query("SELECT * FROM deployments WHERE app_id = $1 ORDER BY version DESC LIMIT $2")
            .bind(app_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(deployment_from_row).collect()
    }

    // ------------------------------------------------------------------ Route

    /// Upsert in durable store, then best-effort mirror into the hot cache
    /// and bump `config:version`. Cache failure after a successful durable
    /// write is logged and swallowed rather than failing the whole call.
    pub async fn set_route(&self, r: &Route) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO routes (id, host, path, protocol, upstreams, middlewares, load_balancer,
                 health_check, strip_path, preserve_host, enabled)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
               ON CONFLICT (id) DO UPDATE SET
                 host = EXCLUDED.host, path = EXCLUDED.path, protocol = EXCLUDED.protocol,
                 upstreams = EXCLUDED.upstreams, middlewares = EXCLUDED.middlewares,
                 load_balancer = EXCLUDED.load_balancer, health_check = EXCLUDED.health_check,
                 strip_path = EXCLUDED.strip_path, preserve_host = EXCLUDED.preserve_host,
                 enabled = EXCLUDED.enabled"#,
        )
        .bind(&r.id)
        .bind(&r.host)
        .bind(&r.path)
        .bind(serde_json::to_value(&r.protocol)?.as_str().unwrap_or("http").to_string())
        .bind(serde_json::to_value(&r.upstreams)?)
        .bind(serde_json::to_value(&r.middlewares)?)
        .bind(serde_json::to_value(&r.load_balancer)?.as_str().unwrap_or("round_robin").to_string())
        .bind(serde_json::to_value(&r.health_check)?)
        .bind(r.strip_path)
        .bind(r.preserve_host)
        .bind(r.enabled)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self.mirror_route(r).await {
            warn!("hot cache mirror failed for route {}: {e}", r.id);
        }
        self.bump_config_version().await?;
        Ok(())
    }

    async fn mirror_route(&self, r: &Route) -> Result<()> {
        let mut conn = self.redis_conn().await?;
        let payload = serde_json::to_string(r)?;
        let mut pipe = redis::pipe();
        pipe.set(format!("routes:{}", r.id), payload);
        pipe.sadd(format!("routes:index:host:{}", r.host), &r.id);
        if r.enabled {
            pipe.sadd("routes:index:enabled", &r.id);
        } else {
            pipe.srem("routes:index:enabled", &r.id);
        }
        let upstream_list: Vec<String> = r
            .upstreams
            .iter()
            .map(|u| format!("{}:{}:{}", u.address, u.port, u.weight))
            .collect();
        pipe.del(format!("upstreams:{}", r.id));
        if !upstream_list.is_empty() {
            pipe.rpush(format!("upstreams:{}", r.id), upstream_list);
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    pub async fn get_route(&self, id: &str) -> Result<Option<Route>> {
        let row = sqlx::query("SELECT * FROM routes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(route_from_row).transpose()
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>> {
        let rows = sqlx::query("SELECT * FROM routes ORDER BY id").fetch_all(&self.pool).await?;
        rows.into_iter().map(route_from_row).collect()
    }

    pub async fn list_enabled_routes(&self) -> Result<Vec<Route>> {
        Ok(self.list_routes().await?.into_iter().filter(|r| r.enabled).collect())
    }

    pub async fn get_routes_by_host(&self, host: &str) -> Result<Vec<Route>> {
        Ok(self.list_routes().await?.into_iter().filter(|r| r.host == host).collect())
    }

    /// Fetches the route *before* deleting so the host can still be removed
    /// from `routes:index:host:{host}`; deleting first would lose the host
    /// needed to find that index entry.
    pub async fn delete_route(&self, id: &str) -> Result<bool> {
        let existing = self.get_route(id).await?;
        let result = sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if let Some(route) = existing {
            if let Err(e) = self.unmirror_route(&route).await {
                warn!("hot cache cleanup failed for route {}: {e}", id);
            }
            self.bump_config_version().await?;
        }
        Ok(result.rows_affected() > 0)
    }

    /// Purges every route whose id begins with `"{short_id}-"`, used when a
    /// container stops/dies/is killed and its routes need to go with it.
    pub async fn delete_routes_by_prefix(&self, prefix: &str) -> Result<()> {
        let routes = self.list_routes().await?;
        for r in routes.into_iter().filter(|r| r.id.starts_with(prefix)) {
            self.delete_route(&r.id).await?;
        }
        Ok(())
    }

    async fn unmirror_route(&self, r: &Route) -> Result<()> {
        let mut conn = self.redis_conn().await?;
        let mut pipe = redis::pipe();
        pipe.del(format!("routes:{}", r.id));
        pipe.srem(format!("routes:index:host:{}", r.host), &r.id);
        pipe.srem("routes:index:enabled", &r.id);
        pipe.del(format!("upstreams:{}", r.id));
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    pub async fn update_upstream_health(
        &self,
        route_id: &str,
        address: &str,
        port: u16,
        healthy: bool,
    ) -> Result<()> {
        let mut conn = self.redis_conn().await?;
        let key = format!("upstreams:health:{route_id}:{address}:{port}");
        let _: () = conn.set_ex(key, healthy as i32, UPSTREAM_HEALTH_TTL_SECS as u64).await?;
        Ok(())
    }

    // ------------------------------------------------------------ Certificate

    pub async fn set_certificate(&self, c: &Certificate) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO certificates (domain, cert_path, key_path, expires_at, auto_renew)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (domain) DO UPDATE SET
                 cert_path = EXCLUDED.cert_path, key_path = EXCLUDED.key_path,
                 expires_at = EXCLUDED.expires_at, auto_renew = EXCLUDED.auto_renew"#,
        )
        .bind(&c.domain)
        .bind(&c.cert_path)
        .bind(&c.key_path)
        .bind(c.expires_at)
        .bind(c.auto_renew)
        .execute(&self.pool)
        .await?;

        if let Ok(mut conn) = self.redis_conn().await {
            let mut pipe = redis::pipe();
            if let Ok(payload) = serde_json::to_string(c) {
                pipe.set(format!("certs:{}", c.domain), payload);
            }
            pipe.zadd("certs:index:expiring", &c.domain, c.expires_at);
            let _: Result<(), _> = pipe.query_async::<_, ()>(&mut conn).await;
        }
        Ok(())
    }

    pub async fn get_certificate(&self, domain: &str) -> Result<Option<Certificate>> {
        let row = sqlx::query("SELECT * FROM certificates WHERE domain = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;
        row.map(certificate_from_row).transpose()
    }

    pub async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        let rows = sqlx::query("SELECT * FROM certificates ORDER BY domain").fetch_all(&self.pool).await?;
        rows.into_iter().map(certificate_from_row).collect()
    }

    pub async fn get_expiring_certificates(&self, threshold: i64) -> Result<Vec<Certificate>> {
        let rows = sqlx::query("SELECT * FROM certificates WHERE expires_at <= $1 ORDER BY expires_at ASC")
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(certificate_from_row).collect()
    }

    // ------------------------------------------------------------------ GitRepo

    pub async fn set_git_repo(&self, g: &GitRepo) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO git_repos (id, provider, url, branch, config_file, webhook_secret,
                 project_id, last_commit, last_deploy_at, enabled, created_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
               ON CONFLICT (id) DO UPDATE SET
                 branch = EXCLUDED.branch, config_file = EXCLUDED.config_file,
                 webhook_secret = EXCLUDED.webhook_secret, project_id = EXCLUDED.project_id,
                 last_commit = EXCLUDED.last_commit, last_deploy_at = EXCLUDED.last_deploy_at,
                 enabled = EXCLUDED.enabled"#,
        )
        .bind(&g.id)
        .bind(serde_json::to_value(&g.provider)?.as_str().unwrap_or("github").to_string())
        .bind(&g.url)
        .bind(&g.branch)
        .bind(&g.config_file)
        .bind(&g.webhook_secret)
        .bind(&g.project_id)
        .bind(&g.last_commit)
        .bind(g.last_deploy_at)
        .bind(g.enabled)
        .bind(g.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_git_repo(&self, id: &str) -> Result<Option<GitRepo>> {
        let row = sqlx::query("SELECT * FROM git_repos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(git_repo_from_row).transpose()
    }

    pub async fn get_git_repo_by_url(&self, url: &str, branch: &str) -> Result<Option<GitRepo>> {
        if url.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query("SELECT * FROM git_repos WHERE url = $1 AND branch = $2")
            .bind(url)
            .bind(branch)
            .fetch_optional(&self.pool)
            .await?;
        row.map(git_repo_from_row).transpose()
    }

    pub async fn update_git_repo_commit(&self, id: &str, commit: &str) -> Result<()> {
        sqlx::query("UPDATE git_repos SET last_commit = $1, last_deploy_at = $2 WHERE id = $3")
            .bind(commit)
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_git_repos(&self) -> Result<Vec<GitRepo>> {
        let rows = sqlx::query("SELECT * FROM git_repos ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        rows.into_iter().map(git_repo_from_row).collect()
    }

    pub async fn delete_git_repo(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM git_repos WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------- Secret

    pub async fn set_secret(&self, s: &Secret) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO secrets (id, project_id, name, value, created_at)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value"#,
        )
        .bind(&s.id)
        .bind(&s.project_id)
        .bind(&s.name)
        .bind(&s.value)
        .bind(s.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_project_secrets(&self, project_id: &str) -> Result<Vec<Secret>> {
        let rows = sqlx::query("SELECT * FROM secrets WHERE project_id = $1 ORDER BY name")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(secret_from_row).collect()
    }

    pub async fn delete_secret(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM secrets WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // --------------------------------------------------------------- Middleware

    pub async fn set_middleware(&self, m: &Middleware) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO middlewares (name, type, config) VALUES ($1,$2,$3)
               ON CONFLICT (name) DO UPDATE SET type = EXCLUDED.type, config = EXCLUDED.config"#,
        )
        .bind(&m.name)
        .bind(&m.kind)
        .bind(&m.config)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_middleware(&self, name: &str) -> Result<Option<Middleware>> {
        let row = sqlx::query("SELECT * FROM middlewares WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(middleware_from_row).transpose()
    }

    pub async fn list_middlewares(&self) -> Result<Vec<Middleware>> {
        let rows = sqlx::query("SELECT * FROM middlewares ORDER BY name").fetch_all(&self.pool).await?;
        rows.into_iter().map(middleware_from_row).collect()
    }

    pub async fn delete_middleware(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM middlewares WHERE name = $1").bind(name).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------- Ephemeral: networks

    pub async fn set_network(&self, n: DockerNetwork) -> Result<()> {
        self.networks.write().await.insert(n.id.clone(), n);
        Ok(())
    }

    pub async fn get_network(&self, id: &str) -> Result<Option<DockerNetwork>> {
        Ok(self.networks.read().await.get(id).cloned())
    }

    pub async fn get_all_networks(&self) -> Result<Vec<DockerNetwork>> {
        Ok(self.networks.read().await.values().cloned().collect())
    }

    pub async fn delete_network(&self, id: &str) -> Result<()> {
        self.networks.write().await.remove(id);
        Ok(())
    }

    // ------------------------------------------------------ Ephemeral: containers

    pub async fn set_container(&self, c: DockerContainer) -> Result<()> {
        self.containers.write().await.insert(c.id.clone(), c);
        Ok(())
    }

    pub async fn get_container(&self, id: &str) -> Result<Option<DockerContainer>> {
        Ok(self.containers.read().await.get(id).cloned())
    }

    pub async fn get_all_containers(&self) -> Result<Vec<DockerContainer>> {
        Ok(self.containers.read().await.values().cloned().collect())
    }

    pub async fn delete_container(&self, id: &str) -> Result<()> {
        self.containers.write().await.remove(id);
        Ok(())
    }

    /// Used by the Docker Provider on stop/die/kill to purge the mirror for
    /// that container's short id.
    pub async fn delete_container_by_short_id(&self, short_id: &str) -> Result<()> {
        let mut containers = self.containers.write().await;
        containers.retain(|id, _| !id.starts_with(short_id));
        Ok(())
    }

    // ----------------------------------------------------------- ACME challenges

    pub async fn set_acme_challenge(&self, token: &str, key_auth: &str) -> Result<()> {
        let mut conn = self.redis_conn().await?;
        let _: () = conn
            .set_ex(format!("acme:challenge:{token}"), key_auth, CHALLENGE_TTL_SECS as u64)
            .await?;
        Ok(())
    }

    pub async fn get_acme_challenge(&self, token: &str) -> Result<Option<String>> {
        let mut conn = self.redis_conn().await?;
        Ok(conn.get(format!("acme:challenge:{token}")).await?)
    }

    pub async fn delete_acme_challenge(&self, token: &str) -> Result<()> {
        let mut conn = self.redis_conn().await?;
        let _: () = conn.del(format!("acme:challenge:{token}")).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------- Stats

    pub async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            routes: self.list_routes().await?.len(),
            certificates: self.list_certificates().await?.len(),
            containers: self.get_all_containers().await?.len(),
            networks: self.get_all_networks().await?.len(),
            projects: self.list_projects().await?.len(),
            repos: self.list_git_repos().await?.len(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub routes: usize,
    pub certificates: usize,
    pub containers: usize,
    pub networks: usize,
    pub projects: usize,
    pub repos: usize,
}

fn project_from_row(row: sqlx::postgres::PgRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        source_path: row.try_get("source_path")?,
        env: serde_json::from_value(row.try_get("env")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn application_from_row(row: sqlx::postgres::PgRow) -> Result<Application> {
    let source_str: String = row.try_get("source")?;
    let status_str: String = row.try_get("status")?;
    Ok(Application {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        source: serde_json::from_value(serde_json::Value::String(source_str))?,
        source_url: row.try_get("source_url")?,
        source_branch: row.try_get("source_branch")?,
        dockerfile: row.try_get("dockerfile")?,
        build_context: row.try_get("build_context")?,
        image: row.try_get("image")?,
        compose_file: row.try_get("compose_file")?,
        domain: row.try_get("domain")?,
        port: row.try_get::<i32, _>("port")? as u16,
        env: serde_json::from_value(row.try_get("env")?)?,
        volumes: serde_json::from_value(row.try_get("volumes")?)?,
        networks: serde_json::from_value(row.try_get("networks")?)?,
        replicas: row.try_get::<i32, _>("replicas")? as u32,
        depends_on: serde_json::from_value(row.try_get("depends_on")?)?,
        healthcheck: serde_json::from_value(row.try_get("healthcheck")?).unwrap_or(None),
        status: serde_json::from_value(serde_json::Value::String(status_str))?,
        container_ids: serde_json::from_value(row.try_get("container_ids")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn deployment_from_row(row: sqlx::postgres::PgRow) -> Result<Deployment> {
    let status_str: String = row.try_get("status")?;
    Ok(Deployment {
        id: row.try_get("id")?,
        app_id: row.try_get("app_id")?,
        version: row.try_get("version")?,
        status: serde_json::from_value(serde_json::Value::String(status_str))?,
        image: row.try_get("image")?,
        container_ids: serde_json::from_value(row.try_get("container_ids")?)?,
        logs: row.try_get("logs")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

fn route_from_row(row: sqlx::postgres::PgRow) -> Result<Route> {
    let protocol_str: String = row.try_get("protocol")?;
    let lb_str: String = row.try_get("load_balancer")?;
    Ok(Route {
        id: row.try_get("id")?,
        host: row.try_get("host")?,
        path: row.try_get("path")?,
        protocol: serde_json::from_value(serde_json::Value::String(protocol_str))?,
        upstreams: serde_json::from_value(row.try_get("upstreams")?)?,
        middlewares: serde_json::from_value(row.try_get("middlewares")?)?,
        load_balancer: serde_json::from_value(serde_json::Value::String(lb_str))?,
        health_check: serde_json::from_value(row.try_get("health_check")?).unwrap_or(None),
        strip_path: row.try_get("strip_path")?,
        preserve_host: row.try_get("preserve_host")?,
        enabled: row.try_get("enabled")?,
    })
}

fn certificate_from_row(row: sqlx::postgres::PgRow) -> Result<Certificate> {
    Ok(Certificate {
        domain: row.try_get("domain")?,
        cert_path: row.try_get("cert_path")?,
        key_path: row.try_get("key_path")?,
        expires_at: row.try_get("expires_at")?,
        auto_renew: row.try_get("auto_renew")?,
    })
}

fn git_repo_from_row(row: sqlx::postgres::PgRow) -> Result<GitRepo> {
    let provider_str: String = row.try_get("provider")?;
    Ok(GitRepo {
        id: row.try_get("id")?,
        provider: serde_json::from_value(serde_json::Value::String(provider_str))?,
        url: row.try_get("url")?,
        branch: row.try_get("branch")?,
        config_file: row.try_get("config_file")?,
        webhook_secret: row.try_get("webhook_secret")?,
        project_id: row.try_get("project_id")?,
        last_commit: row.try_get("last_commit")?,
        last_deploy_at: row.try_get("last_deploy_at")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
    })
}

fn secret_from_row(row: sqlx::postgres::PgRow) -> Result<Secret> {
    Ok(Secret {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        value: row.try_get("value")?,
        created_at: row.try_get("created_at")?,
    })
}

fn middleware_from_row(row: sqlx::postgres::PgRow) -> Result<Middleware> {
    Ok(Middleware {
        name: row.try_get("name")?,
        kind: row.try_get("type")?,
        config: row.try_get("config")?,
    })
}
