//! HTTP server for scan control, scheduled triggers and shipment overrides
//!
//! Built on axum: routes, shared state, graceful shutdown. The scheduled
//! endpoint is the one outward-facing surface and carries bearer auth; the
//! rest of the API is for the operator console on a trusted network.

pub mod routes;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;

use crate::application::session_manager::ScanSessionManager;
use crate::domain::error::ScanError;
use crate::infrastructure::action_log_repository::ActionLogRepository;
use crate::infrastructure::config::ServerConfig;
use crate::infrastructure::settings_repository::SettingsRepository;
use crate::infrastructure::shipment_repository::ShipmentRepository;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: ScanSessionManager,
    pub settings: SettingsRepository,
    pub shipments: ShipmentRepository,
    pub actions: ActionLogRepository,
    /// Bearer token for the scheduled trigger (None = auth disabled).
    pub scheduled_token: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::get_health))
        .route("/api/scan", get(routes::get_scan))
        .route("/api/scheduled-scan", get(routes::get_scheduled_scan))
        .route(
            "/api/shipments/{tracking_id}/resolve",
            post(routes::post_resolve),
        )
        .route(
            "/api/shipments/{tracking_id}/reactivate",
            post(routes::post_reactivate),
        )
        .route("/api/actions", get(routes::get_actions))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(error) = signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {error}");
        return;
    }
    tracing::info!("shutdown signal received, draining connections");
}

/// Bind and serve until interrupted. In-flight requests finish; detached
/// scan sessions are abandoned on exit, which is safe because every
/// milestone send is idempotent against the action ledger.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<(), ScanError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ScanError::Configuration(format!("failed to bind to {addr}: {e}")))?;

    tracing::info!("listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ScanError::Configuration(format!("server error: {e}")))?;

    Ok(())
}
