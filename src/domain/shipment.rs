//! Shipment entity and carrier phase vocabulary
//!
//! A shipment is one tracked outbound parcel tied to one order and one
//! recipient. Records are never hard-deleted; the batch scanner deactivates
//! them instead, and only an explicit operator override re-activates one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical delivery-state vocabulary produced by the carrier adapter.
///
/// Only one carrier's status vocabulary is modeled; anything the adapter
/// cannot map lands on `Error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CarrierPhase {
    Processed,
    InTransit,
    Delivered,
    NotFound,
    Error,
}

impl CarrierPhase {
    /// Stable string form used for the `shipments.phase` column and JSON details.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processed" => Self::Processed,
            "in_transit" => Self::InTransit,
            "delivered" => Self::Delivered,
            "not_found" => Self::NotFound,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for CarrierPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked outbound parcel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    /// Unique, immutable tracking identifier (primary key).
    pub tracking_id: String,
    pub order_id: String,
    pub recipient_email: String,
    /// Timestamp the parcel was shipped; day counting starts here.
    pub shipped_at: DateTime<Utc>,
    /// Whether the batch scanner still considers this shipment outstanding.
    pub active: bool,
    /// Last known carrier phase from the most recent successful scan.
    pub phase: CarrierPhase,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set when the shipment is resolved (delivered, replaced, or the
    /// customer made a choice); stops the day clock.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Human-readable transit duration reported by the carrier.
    pub duration_human: Option<String>,
    /// Precise transit duration in days reported by the carrier.
    pub duration_days: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn new(
        tracking_id: impl Into<String>,
        order_id: impl Into<String>,
        recipient_email: impl Into<String>,
        shipped_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            tracking_id: tracking_id.into(),
            order_id: order_id.into(),
            recipient_email: recipient_email.into(),
            shipped_at,
            active: true,
            phase: CarrierPhase::Processed,
            last_checked_at: None,
            picked_up_at: None,
            delivered_at: None,
            resolved_at: None,
            duration_human: None,
            duration_days: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whole calendar days between ship date and `now`, with the clock
    /// stopped at the resolution timestamp once the shipment is resolved.
    ///
    /// A shipment delivered on day 6 keeps reporting 6 days forever, even
    /// when queried weeks later.
    pub fn days_in_transit(&self, now: DateTime<Utc>) -> i64 {
        let end = self.resolved_at.unwrap_or(now);
        (end.date_naive() - self.shipped_at.date_naive()).num_days()
    }
}

/// Fixed contract returned by the carrier status adapter for one tracking id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub phase: CarrierPhase,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub duration_human: Option<String>,
    pub duration_days: Option<f64>,
    pub raw_events: Vec<String>,
    pub processing_time_ms: u64,
}

impl TrackingSnapshot {
    /// Minimal snapshot for a given phase; timestamps and events empty.
    pub fn with_phase(phase: CarrierPhase) -> Self {
        Self {
            phase,
            picked_up_at: None,
            delivered_at: None,
            duration_human: None,
            duration_days: None,
            raw_events: Vec::new(),
            processing_time_ms: 0,
        }
    }
}
