//! Carrier status adapter
//!
//! External collaborator with a fixed contract: one tracking identifier in,
//! one canonical `TrackingSnapshot` out. The adapter's internal scraping is
//! not part of the scan core; this HTTP implementation talks to the carrier
//! bridge service and normalizes its JSON into the canonical snapshot.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::domain::shipment::{CarrierPhase, TrackingSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("carrier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unparseable carrier response: {0}")]
    Malformed(String),
}

/// Given a tracking identifier, return a canonical snapshot of the parcel's
/// delivery state.
#[async_trait::async_trait]
pub trait CarrierStatusAdapter: Send + Sync {
    async fn scrape(&self, tracking_id: &str) -> Result<TrackingSnapshot, AdapterError>;
}

/// Wire shape of the carrier bridge response.
#[derive(Debug, Deserialize)]
struct WireSnapshot {
    status: String,
    picked_up_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    duration_human: Option<String>,
    duration_days: Option<f64>,
    #[serde(default)]
    events: Vec<String>,
}

fn phase_from_wire(status: &str) -> CarrierPhase {
    match status.to_ascii_lowercase().as_str() {
        "processed" | "accepted" | "label_created" => CarrierPhase::Processed,
        "in_transit" | "out_for_delivery" => CarrierPhase::InTransit,
        "delivered" => CarrierPhase::Delivered,
        "not_found" => CarrierPhase::NotFound,
        _ => CarrierPhase::Error,
    }
}

pub struct HttpCarrierAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCarrierAdapter {
    pub fn new(endpoint: String, timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait::async_trait]
impl CarrierStatusAdapter for HttpCarrierAdapter {
    async fn scrape(&self, tracking_id: &str) -> Result<TrackingSnapshot, AdapterError> {
        let started = Instant::now();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("tracking_id", tracking_id)])
            .send()
            .await?
            .error_for_status()?;

        let wire: WireSnapshot = response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;

        tracing::debug!(
            tracking_id,
            status = %wire.status,
            "carrier snapshot fetched in {:?}",
            started.elapsed()
        );

        Ok(TrackingSnapshot {
            phase: phase_from_wire(&wire.status),
            picked_up_at: wire.picked_up_at,
            delivered_at: wire.delivered_at,
            duration_human: wire.duration_human,
            duration_days: wire.duration_days,
            raw_events: wire.events,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}
