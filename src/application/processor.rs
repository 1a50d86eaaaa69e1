//! Per-item scan processing
//!
//! One shipment per call: fetch the carrier snapshot, run the decision
//! engine, fire the delivery pipeline when a milestone is due, and persist
//! the bookkeeping. All failures are absorbed into the returned item result;
//! one bad shipment never aborts the batch.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::session::ItemResult;
use crate::domain::action_log::{ActionKind, ActionLogEntry};
use crate::domain::decision::{Decision, decide, display_status};
use crate::domain::error::ScanError;
use crate::domain::settings::ScanThresholds;
use crate::domain::shipment::Shipment;
use crate::infrastructure::action_log_repository::ActionLogRepository;
use crate::infrastructure::carrier::CarrierStatusAdapter;
use crate::infrastructure::delivery::DeliveryPipeline;
use crate::infrastructure::shipment_repository::ShipmentRepository;

/// Processes one shipment of a batch. Split out as a trait so the session
/// manager's loop can be driven deterministically in tests.
#[async_trait::async_trait]
pub trait ShipmentProcessor: Send + Sync {
    async fn process(&self, shipment: &Shipment, thresholds: &ScanThresholds) -> ItemResult;
}

pub struct ScanItemProcessor {
    carrier: Arc<dyn CarrierStatusAdapter>,
    shipments: ShipmentRepository,
    actions: ActionLogRepository,
    delivery: DeliveryPipeline,
}

impl ScanItemProcessor {
    pub fn new(
        carrier: Arc<dyn CarrierStatusAdapter>,
        shipments: ShipmentRepository,
        actions: ActionLogRepository,
        delivery: DeliveryPipeline,
    ) -> Self {
        Self {
            carrier,
            shipments,
            actions,
            delivery,
        }
    }

    async fn process_inner(
        &self,
        shipment: &Shipment,
        thresholds: &ScanThresholds,
    ) -> Result<String, ScanError> {
        let now = Utc::now();
        let snapshot = self
            .carrier
            .scrape(&shipment.tracking_id)
            .await
            .map_err(|e| ScanError::Adapter(e.to_string()))?;

        let decision = decide(shipment, &snapshot, thresholds, &self.actions, now).await?;
        let days = shipment.days_in_transit(now);

        match decision {
            Decision::MarkDelivered => {
                self.shipments
                    .mark_delivered(&shipment.tracking_id, &snapshot, now)
                    .await?;
                tracing::info!(
                    tracking_id = %shipment.tracking_id,
                    days,
                    "shipment delivered, deactivated"
                );
                Ok("delivered".to_string())
            }
            Decision::Send(milestone) => {
                let kind = milestone.action_kind();
                let template = thresholds.template_for(milestone);
                let merge_vars = HashMap::from([
                    ("order_id".to_string(), shipment.order_id.clone()),
                    ("tracking_id".to_string(), shipment.tracking_id.clone()),
                    ("days_in_transit".to_string(), days.to_string()),
                ]);

                let policy = self.delivery.default_policy();
                let report = self
                    .delivery
                    .send(&shipment.recipient_email, template, &merge_vars, &policy)
                    .await;

                // The shipment row is updated either way: the scan itself
                // succeeded even when the provider refused the email.
                self.shipments
                    .record_scan(&shipment.tracking_id, &snapshot, now)
                    .await?;

                match report.outcome {
                    Ok(ref response) => {
                        self.actions
                            .append_best_effort(&ActionLogEntry::new(
                                &shipment.tracking_id,
                                &shipment.order_id,
                                &shipment.recipient_email,
                                kind,
                                json!({
                                    "days": days,
                                    "phase": snapshot.phase.as_str(),
                                    "template": template,
                                    "message_id": response.message_id,
                                    "attempts": report.attempts.len(),
                                }),
                            ))
                            .await;
                        tracing::info!(
                            tracking_id = %shipment.tracking_id,
                            %kind,
                            days,
                            "milestone email sent"
                        );
                        Ok(format!("sent {kind}"))
                    }
                    Err(ref failure) => {
                        self.actions
                            .append_best_effort(&ActionLogEntry::new(
                                &shipment.tracking_id,
                                &shipment.order_id,
                                &shipment.recipient_email,
                                ActionKind::DeliveryFailed,
                                json!({
                                    "days": days,
                                    "template": template,
                                    "kind": failure.kind.as_str(),
                                    "error": failure.message,
                                    "history": report.history_json(),
                                }),
                            ))
                            .await;
                        Err(ScanError::Delivery {
                            kind: failure.kind.as_str().to_string(),
                            message: failure.message.clone(),
                        })
                    }
                }
            }
            Decision::None => {
                self.shipments
                    .record_scan(&shipment.tracking_id, &snapshot, now)
                    .await?;
                let status = display_status(shipment, thresholds, now);
                Ok(format!("no action ({})", status.color()))
            }
        }
    }
}

#[async_trait::async_trait]
impl ShipmentProcessor for ScanItemProcessor {
    async fn process(&self, shipment: &Shipment, thresholds: &ScanThresholds) -> ItemResult {
        match self.process_inner(shipment, thresholds).await {
            Ok(detail) => ItemResult::success(&shipment.tracking_id, detail),
            Err(e) => {
                // Adapter/persistence failures get a scrape-error ledger row;
                // terminal delivery failures already wrote delivery_failed.
                if !matches!(e, ScanError::Delivery { .. }) {
                    self.actions
                        .append_best_effort(&ActionLogEntry::new(
                            &shipment.tracking_id,
                            &shipment.order_id,
                            &shipment.recipient_email,
                            ActionKind::ScrapeError,
                            json!({ "error": e.to_string() }),
                        ))
                        .await;
                }
                tracing::warn!(
                    tracking_id = %shipment.tracking_id,
                    "item failed, continuing batch: {e}"
                );
                ItemResult::failure(&shipment.tracking_id, e.to_string())
            }
        }
    }
}
