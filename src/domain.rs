//! Domain module - Core business logic and entities
//!
//! This module contains the entities, the milestone decision engine, and the
//! error taxonomy shared across the scan core.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod action_log;
pub mod decision;
pub mod error;
pub mod settings;
pub mod shipment;

// Re-export commonly used items for convenience
pub use action_log::{ActionKind, ActionLogEntry, MilestoneLedger};
pub use decision::{Decision, DisplayStatus, decide, display_status};
pub use error::ScanError;
pub use settings::{Milestone, ScanSettings, ScanThresholds};
pub use shipment::{CarrierPhase, Shipment, TrackingSnapshot};
