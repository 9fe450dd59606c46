//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the site, auth and system routes
//! - Put tenant-scoped routes behind the admission middleware
//! - Put system routes behind the blocklist-only guard
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Run the rate bucket sweeper and apply blocklist reloads
//! - Serve until the shutdown broadcast fires

use axum::{
    http::HeaderName,
    middleware,
    routing::{any, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigError, GateConfig};
use crate::http::{handlers, X_REQUEST_ID};
use crate::pipeline::{admission_middleware, system_guard, Collaborators, RequestPipeline};
use crate::security::ip_filter::parse_cidrs;
use crate::security::rate_limit::run_sweeper;

/// HTTP server for the admission gate.
pub struct GateServer {
    router: Router,
    pipeline: Arc<RequestPipeline>,
    config: GateConfig,
}

impl GateServer {
    /// Build the pipeline and router. Fails when the signing secret is missing.
    pub fn new(config: GateConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        let pipeline = Arc::new(RequestPipeline::new(&config, collaborators)?);
        let router = Self::build_router(&config, pipeline.clone());
        Ok(Self {
            router,
            pipeline,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, pipeline: Arc<RequestPipeline>) -> Router {
        let site = Router::new()
            .route("/auth/login", post(handlers::login))
            .route("/auth/logout", post(handlers::logout))
            .route("/api/session", get(handlers::session_info))
            .route("/", any(handlers::site_page))
            .route("/{*path}", any(handlers::site_page))
            .layer(middleware::from_fn_with_state(pipeline.clone(), admission_middleware));

        let system = Router::new()
            .route("/_gate/health", get(handlers::health))
            .route("/_gate/status", get(handlers::status))
            .layer(middleware::from_fn_with_state(pipeline.clone(), system_guard));

        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .merge(site)
            .merge(system)
            .with_state(pipeline)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            base_domain = %self.config.tenancy.base_domain,
            "Gate server starting"
        );

        let rate = &self.config.rate_limit;
        if rate.enabled && !rate.rules.is_empty() {
            tokio::spawn(run_sweeper(
                self.pipeline.rate_limits().clone(),
                Duration::from_secs(rate.sweep_interval_secs),
                Duration::from_secs(rate.idle_ttl_secs),
                shutdown.resubscribe(),
            ));
        }

        let pipeline = self.pipeline.clone();
        let running = self.config.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                apply_reload(&pipeline, &running, &new_config);
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Apply the reloadable part of a new configuration: the global blocklist.
/// Changes to any other section are reported and wait for a restart.
fn apply_reload(pipeline: &RequestPipeline, running: &GateConfig, reloaded: &GateConfig) {
    match parse_cidrs(&reloaded.ip_filter.global_blocklist) {
        Ok(blocklist) => pipeline.ip_filter().replace_blocklist(blocklist),
        Err(e) => {
            tracing::error!(error = %e, "Reloaded blocklist invalid, keeping current one");
            return;
        }
    }

    let pending = restart_sections(running, reloaded);
    if pending.is_empty() {
        tracing::info!("Config reloaded");
    } else {
        tracing::warn!(sections = ?pending, "Config reloaded; changed sections take effect on restart");
    }
}

/// Sections other than `ip_filter` that differ between two configurations.
fn restart_sections(running: &GateConfig, reloaded: &GateConfig) -> Vec<&'static str> {
    fn differs<T: serde::Serialize>(a: &T, b: &T) -> bool {
        serde_json::to_value(a).ok() != serde_json::to_value(b).ok()
    }

    let sections = [
        ("listener", differs(&running.listener, &reloaded.listener)),
        ("tenancy", differs(&running.tenancy, &reloaded.tenancy)),
        ("session", differs(&running.session, &reloaded.session)),
        ("csrf", differs(&running.csrf, &reloaded.csrf)),
        ("rate_limit", differs(&running.rate_limit, &reloaded.rate_limit)),
        ("routes", differs(&running.routes, &reloaded.routes)),
        ("timeouts", differs(&running.timeouts, &reloaded.timeouts)),
        ("security", differs(&running.security, &reloaded.security)),
        ("observability", differs(&running.observability, &reloaded.observability)),
        ("seed", differs(&running.seed, &reloaded.seed)),
    ];
    sections
        .into_iter()
        .filter_map(|(name, changed)| changed.then_some(name))
        .collect()
}
