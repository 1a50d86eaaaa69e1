//! Application layer: per-shipment processing and batch session orchestration

pub mod processor;
pub mod session;
pub mod session_manager;

pub use processor::{ScanItemProcessor, ShipmentProcessor};
pub use session::{ItemResult, SessionMode, SessionSnapshot, SessionStatus};
pub use session_manager::{
    ScanPlan, ScanPlanSource, ScanSessionManager, SqlScanPlanSource, StartedSession,
};
