use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use turnstile_auth::{
    Cache, Gatekeeper, MemoryCache, Permission, RateLimitPolicy, RouteClass, Scope,
};
use turnstile_auth_redis::{RedisCache, RedisConfig};

use crate::articles::ArticleStore;
use crate::config::AppConfig;
use crate::routes;
use crate::users::UserDirectory;

const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-endpoint budget for article creation, on top of the user policy.
const ARTICLE_CREATE_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct AppState {
    pub gatekeeper: Arc<Gatekeeper>,
    pub users: Arc<UserDirectory>,
    pub articles: ArticleStore,
}

/// Selected cache backend.
#[derive(Clone, Debug)]
pub enum CacheBackend {
    /// Single-instance: in-process map
    Local(MemoryCache),
    /// Multi-instance: shared Redis
    Redis(RedisCache),
}

impl CacheBackend {
    /// Connects to Redis when enabled, otherwise (or on failure) uses the
    /// in-process cache.
    pub async fn from_config(config: &RedisConfig) -> Self {
        if !config.enabled {
            tracing::info!("Redis disabled, using in-memory cache");
            return Self::Local(MemoryCache::new());
        }
        match turnstile_auth_redis::connect(config).await {
            Ok(redis) => Self::Redis(redis),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, falling back to in-memory cache");
                Self::Local(MemoryCache::new())
            }
        }
    }

    pub fn shared(&self) -> Arc<dyn Cache> {
        match self {
            Self::Local(cache) => Arc::new(cache.clone()),
            Self::Redis(cache) => Arc::new(cache.clone()),
        }
    }

    /// Spawns periodic eviction for the local cache. Redis expires keys itself.
    pub fn spawn_cleanup(&self) -> Option<JoinHandle<()>> {
        let Self::Local(cache) = self else {
            return None;
        };
        let cache = cache.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = cache.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "Evicted expired cache entries");
                }
            }
        }))
    }
}

/// Wires every route class through the gatekeeper.
pub fn build_app(state: AppState, body_limit: usize) -> Router {
    let gatekeeper = state.gatekeeper.clone();

    let public = Router::new()
        .route("/articles", get(routes::list_articles))
        .route("/articles/{id}", get(routes::get_article));

    let me = Router::new()
        .route("/auth/me", get(routes::me))
        .route("/auth/logout", post(routes::logout))
        .route("/auth/refresh", post(routes::refresh));

    let create_article = Router::new().route("/articles", post(routes::create_article));
    let create_article = gatekeeper.require_permission(
        create_article,
        Permission::new("article", "create"),
        None,
    );
    let create_article = gatekeeper
        .endpoint_guard(RateLimitPolicy::new(
            "article-create",
            ARTICLE_CREATE_LIMIT,
            Duration::from_secs(60),
        ))
        .apply(create_article);

    let delete_article = Router::new().route("/articles/{id}", delete(routes::delete_article));
    let delete_article = gatekeeper.require_permission(
        delete_article,
        Permission::new("article", "delete").with_scope(Scope::Own),
        Some("id"),
    );

    let login = Router::new().route("/auth/login", post(routes::login));
    let register = Router::new().route("/auth/register", post(routes::register));

    let upload = Router::new().route("/files", post(routes::upload));
    let upload = gatekeeper.require_permission(upload, Permission::new("file", "upload"), None);

    let admin = Router::new()
        .route(
            "/admin/permissions/{user_id}",
            delete(routes::clear_permission_cache),
        )
        .route(
            "/admin/rate-limits/{policy}/{key}",
            get(routes::rate_limit_status).delete(routes::clear_rate_limit),
        );

    Router::new()
        .route("/health", get(routes::health))
        .merge(gatekeeper.apply(public, RouteClass::Public))
        .merge(gatekeeper.apply(me, RouteClass::Protected))
        .merge(gatekeeper.apply(create_article, RouteClass::Protected))
        .merge(gatekeeper.apply(delete_article, RouteClass::Protected))
        .merge(gatekeeper.apply(login, RouteClass::Login))
        .merge(gatekeeper.apply(register, RouteClass::Register))
        .merge(gatekeeper.apply(upload, RouteClass::Upload))
        .merge(gatekeeper.apply(admin, RouteClass::Admin))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let config = AppConfig::default();
        Self {
            addr: config.addr(),
            config,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<TurnstileServer> {
        let backend = CacheBackend::from_config(&self.config.redis).await;
        let cleanup = backend.spawn_cleanup();

        let articles = ArticleStore::new();
        let gatekeeper = Gatekeeper::builder(self.config.gatekeeper.clone(), backend.shared())
            .ownership("article", Arc::new(articles.clone()))
            .build()?;

        let users = UserDirectory::from_config(&self.config.users)
            .map_err(|e| anyhow::anyhow!("failed to hash configured passwords: {e}"))?;
        if users.is_empty() {
            tracing::warn!("No users configured; only self-registered accounts can log in");
        }

        let state = AppState {
            gatekeeper,
            users: Arc::new(users),
            articles,
        };

        Ok(TurnstileServer {
            addr: self.addr,
            app: build_app(state, self.config.server.body_limit_bytes),
            cleanup,
        })
    }
}

pub struct TurnstileServer {
    addr: SocketAddr,
    app: Router,
    cleanup: Option<JoinHandle<()>>,
}

impl TurnstileServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Some(cleanup) = self.cleanup {
            cleanup.abort();
        }
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
