//! Infrastructure layer for configuration, persistence, and external collaborators
//!
//! Database connections and repositories, the carrier status adapter, the
//! transactional email transport with its retrying pipeline, and the
//! logging/config bootstrap.

pub mod action_log_repository;
pub mod carrier;
pub mod config;
pub mod database_connection;
pub mod delivery;
pub mod email;
pub mod logging;
pub mod settings_repository;
pub mod shipment_repository;

// Re-export commonly used types
pub use action_log_repository::ActionLogRepository;
pub use carrier::{AdapterError, CarrierStatusAdapter, HttpCarrierAdapter};
pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use delivery::{DeliveryPipeline, DeliveryReport, RetryPolicy};
pub use email::{DeliveryErrorKind, EmailTransport, HttpEmailClient, ProviderResponse, TransportFailure};
pub use settings_repository::SettingsRepository;
pub use shipment_repository::ShipmentRepository;
