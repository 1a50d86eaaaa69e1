//! Repository for the append-only action ledger
//!
//! `append` is the strict write path; `append_best_effort` is the scan-loop
//! variant whose failure must never abort the batch: the error is logged and
//! swallowed, because losing an audit row is preferable to re-sending a
//! customer email or crashing the run.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::sync::Arc;

use crate::domain::action_log::{ActionKind, ActionLogEntry, MilestoneLedger};
use crate::domain::error::ScanError;

#[derive(Clone)]
pub struct ActionLogRepository {
    pool: Arc<SqlitePool>,
}

fn row_to_entry(row: &SqliteRow) -> ActionLogEntry {
    let details: String = row.get("details");
    ActionLogEntry {
        id: row.get("id"),
        tracking_id: row.get("tracking_id"),
        order_id: row.get("order_id"),
        recipient_email: row.get("recipient_email"),
        kind: ActionKind::parse(row.get::<String, _>("kind").as_str())
            .unwrap_or(ActionKind::ManualOverride),
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
        created_at: row.get("created_at"),
    }
}

impl ActionLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Append one immutable ledger row.
    pub async fn append(&self, entry: &ActionLogEntry) -> Result<(), ScanError> {
        sqlx::query(
            r#"
            INSERT INTO action_log (tracking_id, order_id, recipient_email, kind, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.tracking_id)
        .bind(&entry.order_id)
        .bind(&entry.recipient_email)
        .bind(entry.kind.as_str())
        .bind(entry.details.to_string())
        .bind(entry.created_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Append with the failure swallowed. The triggering action (an email
    /// that already went out) is never rolled back; the loss is surfaced
    /// only via process logging.
    pub async fn append_best_effort(&self, entry: &ActionLogEntry) {
        if let Err(e) = self.append(entry).await {
            tracing::error!(
                tracking_id = %entry.tracking_id,
                kind = %entry.kind,
                "failed to append action log entry (audit row lost): {e}"
            );
        }
    }

    /// Idempotency oracle: has this kind already been recorded for this
    /// tracking identifier?
    pub async fn exists(&self, tracking_id: &str, kind: ActionKind) -> Result<bool, ScanError> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM action_log WHERE tracking_id = ? AND kind = ? LIMIT 1",
        )
        .bind(tracking_id)
        .bind(kind.as_str())
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Most recent entries, newest first, for the audit surface.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ActionLogEntry>, ScanError> {
        let rows = sqlx::query(
            "SELECT id, tracking_id, order_id, recipient_email, kind, details, created_at \
             FROM action_log ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.iter().map(row_to_entry).collect())
    }
}

#[async_trait::async_trait]
impl MilestoneLedger for ActionLogRepository {
    async fn exists(&self, tracking_id: &str, kind: ActionKind) -> Result<bool, ScanError> {
        ActionLogRepository::exists(self, tracking_id, kind).await
    }
}
