//! Error taxonomy for the scan core
//!
//! Per-item errors (adapter, persistence, delivery) are caught at the item
//! boundary and converted into counters plus ledger entries; only
//! configuration-load and initial shipment-list failures abort a session
//! before it starts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Carrier call failed or returned an unparseable snapshot. Logged,
    /// item skipped, scan continues.
    #[error("carrier adapter error: {0}")]
    Adapter(String),

    /// Datastore write/read failed. Never fatal to a running scan.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Terminal delivery failure after classification and bounded retries.
    #[error("delivery error ({kind}): {message}")]
    Delivery { kind: String, message: String },

    /// Thresholds or templates missing/invalid. Fails the entire batch
    /// start: no useful decision can be made without configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown session: {0}")]
    SessionNotFound(String),

    /// Control operation not valid for the session's state or mode
    /// (e.g. pausing a scheduled run, resuming a running session).
    #[error("invalid session control: {0}")]
    InvalidControl(String),
}
