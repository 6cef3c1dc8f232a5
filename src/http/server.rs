//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the home, asset and proxy handlers
//! - Wire up middleware (tracing, request ID)
//! - Start the session background workers
//! - Bind server to listener and drain on shutdown

use std::path::Path;
use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, response::Response, routing::any, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::home::{home_handler, HomePage};
use crate::http::request::{request_id, MakeRequestUuid};
use crate::proxy;
use crate::session::{RecencyUpdater, SessionStore, SessionSweeper};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub home: Arc<HomePage>,
    pub max_body_size: usize,
}

/// HTTP server for the web proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    sessions: Arc<SessionStore>,
    updater: RecencyUpdater,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig, home: HomePage) -> Self {
        let (sessions, updater) = SessionStore::new(&config.session);

        let state = AppState {
            sessions: sessions.clone(),
            home: Arc::new(home),
            max_body_size: config.limits.max_body_size,
        };

        let router = build_router(state, &config.assets.dir);
        Self {
            router,
            config,
            sessions,
            updater,
        }
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        tokio::spawn(self.updater.run(shutdown.resubscribe()));
        tokio::spawn(SessionSweeper::new(self.sessions.clone()).run(shutdown.resubscribe()));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The session store backing this server.
    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState, assets_dir: &Path) -> Router {
    Router::new()
        .route("/", any(home_handler))
        .nest_service("/assets", ServeDir::new(assets_dir))
        .fallback(proxy_handler)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Every path that is not the home page or an asset.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    tracing::debug!(
        request_id = %request_id(request.headers()),
        method = %request.method(),
        path = %request.uri().path(),
        "Proxying request"
    );
    proxy::proxy_request(&state.sessions, state.max_body_size, request).await
}
