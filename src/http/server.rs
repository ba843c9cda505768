//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble the shared [`AppState`] from configuration
//! - Create the Axum router: proxy, traffic metrics, admin API, health
//! - Wire up middleware (request ID, tracing, body limit)
//! - Serve with client connect info and graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{ProxyConfig, UpstreamConfig};
use crate::error::StartupError;
use crate::http::proxy::proxy_handler;
use crate::http::request::MakeRequestUuid;
use crate::observability::TrafficRecorder;
use crate::security::allowlist::AllowList;
use crate::security::destination::{Resolver, SystemResolver};
use crate::security::rate_limit::RateLimiter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub allowlist: Arc<AllowList>,
    pub rate_limiter: Arc<RateLimiter>,
    pub traffic: Arc<TrafficRecorder>,
    pub resolver: Arc<dyn Resolver>,
    pub client: reqwest::Client,
    pub upstream: UpstreamConfig,
    pub admin_api_key: String,
}

impl AppState {
    /// Build state from configuration with the given resolver.
    pub fn from_config(
        config: &ProxyConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, StartupError> {
        let allowlist = AllowList::from_patterns(config.security.allowed_domains.as_slice())?;

        // Redirects would bypass the destination check, so they are relayed as-is.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .connect_timeout(config.upstream.connect_timeout())
            .build()?;

        Ok(Self {
            allowlist: Arc::new(allowlist),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            traffic: Arc::new(TrafficRecorder::new()),
            resolver,
            client,
            upstream: config.upstream.clone(),
            admin_api_key: config.admin.api_key.clone(),
        })
    }
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server that resolves destinations through the system resolver.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Create a server with a custom resolver.
    pub fn with_resolver(
        config: ProxyConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, StartupError> {
        let state = AppState::from_config(&config, resolver)?;
        let router = Self::build_router(&config, state.clone());

        tracing::info!(
            allowed_patterns = state.allowlist.patterns().len(),
            rate_limit_enabled = config.rate_limit.enabled,
            timeout_secs = config.upstream.timeout_secs,
            max_response_size = config.upstream.max_response_size,
            admin_auth = !config.admin.api_key.is_empty(),
            "HTTP server configured"
        );

        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/proxy/{*target}", any(proxy_handler))
            .route("/proxy/", any(proxy_handler))
            .route("/proxy", any(proxy_handler))
            .route("/metrics/traffic", get(admin::handlers::get_traffic))
            .route("/health", get(admin::handlers::health))
            .merge(admin::router(state.clone()))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_request_body))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router for in-process use (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
