//! Append-only action ledger types
//!
//! The action log doubles as the audit trail and the idempotency oracle for
//! milestone emails: for the three milestone kinds at most one entry may
//! ever exist per tracking identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::ScanError;

/// Kind of action recorded against a shipment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    HeadsUpSent,
    ChoiceSent,
    GiftNoticeSent,
    CustomerChoiceRecorded,
    ScrapeError,
    ManualOverride,
    DeliveryFailed,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeadsUpSent => "heads_up_sent",
            Self::ChoiceSent => "choice_sent",
            Self::GiftNoticeSent => "gift_notice_sent",
            Self::CustomerChoiceRecorded => "customer_choice_recorded",
            Self::ScrapeError => "scrape_error",
            Self::ManualOverride => "manual_override",
            Self::DeliveryFailed => "delivery_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heads_up_sent" => Some(Self::HeadsUpSent),
            "choice_sent" => Some(Self::ChoiceSent),
            "gift_notice_sent" => Some(Self::GiftNoticeSent),
            "customer_choice_recorded" => Some(Self::CustomerChoiceRecorded),
            "scrape_error" => Some(Self::ScrapeError),
            "manual_override" => Some(Self::ManualOverride),
            "delivery_failed" => Some(Self::DeliveryFailed),
            _ => None,
        }
    }

    /// Whether this kind is one of the three day-threshold customer
    /// touchpoints guarded by the idempotency check.
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::HeadsUpSent | Self::ChoiceSent | Self::GiftNoticeSent
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable row in the action ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// Synthetic id; 0 until persisted.
    pub id: i64,
    pub tracking_id: String,
    pub order_id: String,
    pub recipient_email: String,
    pub kind: ActionKind,
    /// Free-form payload: day counts, carrier phase, error text, retry history.
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActionLogEntry {
    pub fn new(
        tracking_id: impl Into<String>,
        order_id: impl Into<String>,
        recipient_email: impl Into<String>,
        kind: ActionKind,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: 0,
            tracking_id: tracking_id.into(),
            order_id: order_id.into(),
            recipient_email: recipient_email.into(),
            kind,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Read-side of the ledger consumed by the decision engine.
///
/// Kept as a trait so the engine stays pure logic over an injectable
/// idempotency oracle.
#[async_trait::async_trait]
pub trait MilestoneLedger: Send + Sync {
    async fn exists(&self, tracking_id: &str, kind: ActionKind) -> Result<bool, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_subset_is_exactly_the_three_touchpoints() {
        assert!(ActionKind::HeadsUpSent.is_milestone());
        assert!(ActionKind::ChoiceSent.is_milestone());
        assert!(ActionKind::GiftNoticeSent.is_milestone());
        assert!(!ActionKind::ScrapeError.is_milestone());
        assert!(!ActionKind::CustomerChoiceRecorded.is_milestone());
        assert!(!ActionKind::DeliveryFailed.is_milestone());
    }

    #[test]
    fn kind_round_trips_through_column_form() {
        for kind in [
            ActionKind::HeadsUpSent,
            ActionKind::ChoiceSent,
            ActionKind::GiftNoticeSent,
            ActionKind::CustomerChoiceRecorded,
            ActionKind::ScrapeError,
            ActionKind::ManualOverride,
            ActionKind::DeliveryFailed,
        ] {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::parse("nope"), None);
    }
}
