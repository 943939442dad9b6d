use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tutor_engine::Tutor;
use tutor_store::Database;

use crate::handlers;
use crate::orchestrator::LearningOrchestrator;

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LearningOrchestrator>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let learn = Router::new()
        .route("/start", post(handlers::start))
        .route("/chat", post(handlers::chat))
        .route("/advance", post(handlers::advance))
        .route("/progress/{learner}", get(handlers::progress))
        .route("/export/{learner}", get(handlers::export))
        .route("/sessions/{learner}", get(handlers::sessions))
        .route("/resume/{session_id}", post(handlers::resume))
        .route("/session/{session_id}/messages", get(handlers::messages))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/learn", learn)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps it running.
pub async fn start(
    config: ServerConfig,
    db: Database,
    tutor: Arc<Tutor>,
) -> Result<ServerHandle, std::io::Error> {
    let orchestrator = Arc::new(LearningOrchestrator::new(tutor, db));
    let router = build_router(AppState {
        orchestrator: Arc::clone(&orchestrator),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "tutor server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        orchestrator,
        server,
    })
}

/// Handle returned by `start()`; dropping it does not stop the server.
pub struct ServerHandle {
    pub port: u16,
    pub orchestrator: Arc<LearningOrchestrator>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn shutdown(self) {
        self.server.abort();
    }
}
