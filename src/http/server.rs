//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the credential pool, upstream client and dispatcher from config
//! - Create the Axum router for the caller dialect, health and admin routes
//! - Wire up middleware (request ID, tracing, body limit)
//! - Serve until the shutdown broadcast fires

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::RelayConfig;
use crate::dispatch::{DispatchSettings, Dispatcher, ModelMap};
use crate::error::RelayResult;
use crate::http::ollama;
use crate::load_balancer::Pool;
use crate::upstream::HttpUpstream;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<RelayConfig>,
}

/// HTTP front end of the relay.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create the server and every subsystem it drives.
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let pool = Arc::new(Pool::from_config(&config.upstream, &config.rate_limit)?);
        let settings = DispatchSettings::from_config(&config);
        let upstream = HttpUpstream::new(&config.upstream.base_url, settings.call_timeout)?;
        let models = ModelMap::new(config.models.clone());

        let dispatcher = Arc::new(Dispatcher::new(pool, upstream, settings, models));
        let state = AppState {
            dispatcher,
            config: Arc::new(config),
        };

        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let mut router = Router::new()
            .route("/api/chat", post(ollama::chat))
            .route("/api/generate", post(ollama::generate))
            .route("/api/tags", get(ollama::tags))
            .route("/api/version", get(ollama::version))
            .route("/health", get(health));

        if config.admin.enabled {
            router = router.merge(admin::router(state.clone()));
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(RequestBodyLimitLayer::new(config.listener.max_body_size)),
        )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = %self.state.dispatcher.mode(),
            backends = self.state.dispatcher.pool().len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.dispatcher.pool();
    Json(json!({
        "status": "ok",
        "mode": state.dispatcher.mode().as_str(),
        "backends": pool.len(),
        "penalized": pool.penalized_count(),
    }))
}
