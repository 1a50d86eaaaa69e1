//! shipwatch: post-purchase shipment follow-up service
//!
//! Watches every active shipment's carrier status, sends milestone emails at
//! fixed day offsets (heads-up, customer choice, goodwill gift), and records
//! an immutable action ledger that also serves as the idempotency guard.
//! Batch scans run as pausable in-memory sessions driven over a small HTTP
//! control API.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::application::processor::ScanItemProcessor;
use crate::application::session_manager::{ScanSessionManager, SqlScanPlanSource};
use crate::infrastructure::action_log_repository::ActionLogRepository;
use crate::infrastructure::carrier::HttpCarrierAdapter;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::delivery::{DeliveryPipeline, RetryPolicy};
use crate::infrastructure::email::HttpEmailClient;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::settings_repository::SettingsRepository;
use crate::infrastructure::shipment_repository::ShipmentRepository;
use crate::server::AppState;

/// Wire everything together and serve until interrupted.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;
    tracing::info!("shipwatch {} starting", env!("CARGO_PKG_VERSION"));

    let db = DatabaseConnection::with_max_connections(
        &config.database.resolved_url(),
        config.database.max_connections,
    )
    .await
    .context("failed to open database")?;
    db.migrate().await.context("failed to run migrations")?;
    let pool = db.pool().clone();

    let settings = SettingsRepository::new(pool.clone());
    let shipments = ShipmentRepository::new(pool.clone());
    let actions = ActionLogRepository::new(pool);

    let carrier = HttpCarrierAdapter::new(
        config.carrier.endpoint.clone(),
        Duration::from_secs(config.carrier.request_timeout_seconds),
        &config.carrier.user_agent,
    )
    .context("failed to build carrier adapter")?;

    let transport = HttpEmailClient::new(
        config.email.endpoint.clone(),
        config.email.api_key.clone(),
        config.email.sender.clone(),
        Duration::from_secs(config.email.request_timeout_seconds),
    )
    .context("failed to build email transport")?;
    let pipeline = DeliveryPipeline::new(Arc::new(transport), RetryPolicy::from(&config.delivery));

    let processor = ScanItemProcessor::new(
        Arc::new(carrier),
        shipments.clone(),
        actions.clone(),
        pipeline,
    );
    let manager = ScanSessionManager::new(
        Arc::new(SqlScanPlanSource::new(settings.clone(), shipments.clone())),
        Arc::new(processor),
        config.session.clone(),
    );

    let state = AppState {
        manager,
        settings,
        shipments,
        actions,
        scheduled_token: config.server.scheduled_token.clone(),
    };

    server::serve(&config.server, state)
        .await
        .context("server terminated with an error")?;
    Ok(())
}
