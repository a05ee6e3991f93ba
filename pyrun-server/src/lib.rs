//! HTTP front end for the pyrun sandbox
//!
//! Accepts code submissions as JSON, runs them through a
//! [`SandboxService`] and answers with the classified result.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use config::{AppConfig, ServerConfig};
use pyrun_sandbox::{ProcessRuntime, SandboxError, SandboxService};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub sandbox: Arc<SandboxService>,
}

impl AppState {
    pub fn new(sandbox: SandboxService) -> Self {
        Self {
            sandbox: Arc::new(sandbox),
        }
    }
}

/// Resolve the interpreter and build the scheduler from configuration.
pub fn build_sandbox(config: &AppConfig) -> std::result::Result<SandboxService, SandboxError> {
    let runtime = ProcessRuntime::with_isolation(
        config.interpreter.clone(),
        config.watchdog.clone(),
        config.isolation.clone(),
    )?;
    info!(
        program = %runtime.program().display(),
        "interpreter resolved"
    );
    SandboxService::new(runtime, config.limits.clone(), config.scheduler.clone())
}

/// Create the HTTP router
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/api/run-code", post(routes::execute::run_code))
        .route("/api/execute-code", post(routes::execute::run_code))
        .route("/health", get(routes::health::health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_request_bytes))
        .layer(TraceLayer::new_for_http());

    if server.cors_allow_any {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve `app` on `listener` until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: tokio::net::TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = listener
        .local_addr()
        .context("Failed to obtain HTTP server bind address")?;
    info!("Starting HTTP server on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
