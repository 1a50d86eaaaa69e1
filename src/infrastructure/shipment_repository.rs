//! Repository for shipment rows
//!
//! Shipments are never hard-deleted: the scan loop deactivates them on
//! delivery/resolution, and only the explicit operator override path sets
//! `active` back to 1.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::sync::Arc;

use crate::domain::error::ScanError;
use crate::domain::shipment::{CarrierPhase, Shipment, TrackingSnapshot};

#[derive(Clone)]
pub struct ShipmentRepository {
    pool: Arc<SqlitePool>,
}

fn row_to_shipment(row: &SqliteRow) -> Shipment {
    Shipment {
        tracking_id: row.get("tracking_id"),
        order_id: row.get("order_id"),
        recipient_email: row.get("recipient_email"),
        shipped_at: row.get("shipped_at"),
        active: row.get("active"),
        phase: CarrierPhase::parse(row.get::<String, _>("phase").as_str()),
        last_checked_at: row.get("last_checked_at"),
        picked_up_at: row.get("picked_up_at"),
        delivered_at: row.get("delivered_at"),
        resolved_at: row.get("resolved_at"),
        duration_human: row.get("duration_human"),
        duration_days: row.get("duration_days"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SHIPMENT_COLUMNS: &str = "tracking_id, order_id, recipient_email, shipped_at, active, phase, \
     last_checked_at, picked_up_at, delivered_at, resolved_at, duration_human, duration_days, \
     created_at, updated_at";

impl ShipmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Register (or refresh) a shipment when an order's parcel is first seen.
    pub async fn upsert(&self, shipment: &Shipment) -> Result<(), ScanError> {
        sqlx::query(
            r#"
            INSERT INTO shipments
            (tracking_id, order_id, recipient_email, shipped_at, active, phase,
             last_checked_at, picked_up_at, delivered_at, resolved_at,
             duration_human, duration_days, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tracking_id) DO UPDATE SET
                order_id = excluded.order_id,
                recipient_email = excluded.recipient_email,
                shipped_at = excluded.shipped_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&shipment.tracking_id)
        .bind(&shipment.order_id)
        .bind(&shipment.recipient_email)
        .bind(shipment.shipped_at)
        .bind(shipment.active)
        .bind(shipment.phase.as_str())
        .bind(shipment.last_checked_at)
        .bind(shipment.picked_up_at)
        .bind(shipment.delivered_at)
        .bind(shipment.resolved_at)
        .bind(&shipment.duration_human)
        .bind(shipment.duration_days)
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, tracking_id: &str) -> Result<Option<Shipment>, ScanError> {
        let row = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE tracking_id = ?"
        ))
        .bind(tracking_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_shipment))
    }

    /// Active shipments in stable creation order, capped at `limit`. This is
    /// the frozen set a batch session iterates over.
    pub async fn active_shipments(&self, limit: u32) -> Result<Vec<Shipment>, ScanError> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE active = 1 \
             ORDER BY created_at ASC, tracking_id ASC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.iter().map(row_to_shipment).collect())
    }

    /// Book-keeping update after a successful (non-delivered) carrier scan.
    pub async fn record_scan(
        &self,
        tracking_id: &str,
        snapshot: &TrackingSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), ScanError> {
        sqlx::query(
            r#"
            UPDATE shipments SET
                phase = ?,
                last_checked_at = ?,
                picked_up_at = COALESCE(?, picked_up_at),
                duration_human = COALESCE(?, duration_human),
                duration_days = COALESCE(?, duration_days),
                updated_at = ?
            WHERE tracking_id = ?
            "#,
        )
        .bind(snapshot.phase.as_str())
        .bind(now)
        .bind(snapshot.picked_up_at)
        .bind(&snapshot.duration_human)
        .bind(snapshot.duration_days)
        .bind(now)
        .bind(tracking_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Terminal delivery: deactivate, record the delivered phase and stop the
    /// day clock at the delivery timestamp.
    pub async fn mark_delivered(
        &self,
        tracking_id: &str,
        snapshot: &TrackingSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), ScanError> {
        let delivered_at = snapshot.delivered_at.unwrap_or(now);
        sqlx::query(
            r#"
            UPDATE shipments SET
                active = 0,
                phase = 'delivered',
                last_checked_at = ?,
                delivered_at = ?,
                resolved_at = COALESCE(resolved_at, ?),
                picked_up_at = COALESCE(?, picked_up_at),
                duration_human = COALESCE(?, duration_human),
                duration_days = COALESCE(?, duration_days),
                updated_at = ?
            WHERE tracking_id = ?
            "#,
        )
        .bind(now)
        .bind(delivered_at)
        .bind(delivered_at)
        .bind(snapshot.picked_up_at)
        .bind(&snapshot.duration_human)
        .bind(snapshot.duration_days)
        .bind(now)
        .bind(tracking_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Customer made a choice (refund/replacement/wait): deactivate and stop
    /// the day clock now. The carrier phase is left as last observed.
    pub async fn resolve(&self, tracking_id: &str, now: DateTime<Utc>) -> Result<bool, ScanError> {
        let result = sqlx::query(
            "UPDATE shipments SET active = 0, resolved_at = ?, updated_at = ? WHERE tracking_id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(tracking_id)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Operator override: the only sanctioned path back to `active = 1`.
    pub async fn reactivate(&self, tracking_id: &str, now: DateTime<Utc>) -> Result<bool, ScanError> {
        let result = sqlx::query(
            "UPDATE shipments SET active = 1, resolved_at = NULL, delivered_at = NULL, \
             updated_at = ? WHERE tracking_id = ?",
        )
        .bind(now)
        .bind(tracking_id)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
