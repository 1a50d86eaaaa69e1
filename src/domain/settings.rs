//! Scan settings and milestone threshold configuration
//!
//! Owned by the `settings` table and re-read before every run; never cached
//! indefinitely. Validation failures surface as `ScanError::Configuration`
//! and abort the batch before a session exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action_log::ActionKind;
use crate::domain::error::ScanError;

/// The three day-threshold customer touchpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    HeadsUp,
    Choice,
    GiftNotice,
}

impl Milestone {
    /// Ledger kind recorded when this milestone's email is sent.
    pub fn action_kind(&self) -> ActionKind {
        match self {
            Self::HeadsUp => ActionKind::HeadsUpSent,
            Self::Choice => ActionKind::ChoiceSent,
            Self::GiftNotice => ActionKind::GiftNoticeSent,
        }
    }
}

/// Day offsets, template assignments and per-run limits for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanThresholds {
    pub heads_up_day: i64,
    pub choice_day: i64,
    pub gift_notice_day: i64,
    pub heads_up_template: String,
    pub choice_template: String,
    pub gift_notice_template: String,
    /// Maximum shipments considered in a single batch run.
    pub max_shipments_per_run: u32,
    /// Fixed delay between carrier calls; also the loop's yield point for
    /// status polls and pause checks.
    pub inter_item_delay_ms: u64,
}

impl Default for ScanThresholds {
    fn default() -> Self {
        Self {
            heads_up_day: 3,
            choice_day: 5,
            gift_notice_day: 10,
            heads_up_template: "shipment-heads-up".to_string(),
            choice_template: "shipment-choice".to_string(),
            gift_notice_template: "shipment-gift-notice".to_string(),
            max_shipments_per_run: 500,
            inter_item_delay_ms: 250,
        }
    }
}

impl ScanThresholds {
    /// Milestones paired with their day offsets, ascending. The decision
    /// engine walks these in order and stops at the first match.
    pub fn milestones_ascending(&self) -> [(Milestone, i64); 3] {
        [
            (Milestone::HeadsUp, self.heads_up_day),
            (Milestone::Choice, self.choice_day),
            (Milestone::GiftNotice, self.gift_notice_day),
        ]
    }

    pub fn template_for(&self, milestone: Milestone) -> &str {
        match milestone {
            Milestone::HeadsUp => &self.heads_up_template,
            Milestone::Choice => &self.choice_template,
            Milestone::GiftNotice => &self.gift_notice_template,
        }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.heads_up_day < 1 {
            return Err(ScanError::Configuration(
                "heads_up_day must be at least 1".to_string(),
            ));
        }
        if !(self.heads_up_day < self.choice_day && self.choice_day < self.gift_notice_day) {
            return Err(ScanError::Configuration(format!(
                "milestone days must be strictly ascending, got {}/{}/{}",
                self.heads_up_day, self.choice_day, self.gift_notice_day
            )));
        }
        for (milestone, _) in self.milestones_ascending() {
            if self.template_for(milestone).trim().is_empty() {
                return Err(ScanError::Configuration(format!(
                    "missing email template for {milestone:?}"
                )));
            }
        }
        if self.max_shipments_per_run == 0 {
            return Err(ScanError::Configuration(
                "max_shipments_per_run must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full settings row set, including the operational kill switches consulted
/// by the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    pub thresholds: ScanThresholds,
    /// Operator kill switch: all scans report `skipped` while set.
    pub emergency_stop: bool,
    /// Gates only the scheduled (cron-style) endpoint.
    pub auto_scan_enabled: bool,
    pub min_scheduled_interval_minutes: i64,
    pub last_scheduled_run_at: Option<DateTime<Utc>>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            thresholds: ScanThresholds::default(),
            emergency_stop: false,
            auto_scan_enabled: true,
            min_scheduled_interval_minutes: 60,
            last_scheduled_run_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_validate() {
        assert!(ScanThresholds::default().validate().is_ok());
    }

    #[test]
    fn non_ascending_days_are_rejected() {
        let thresholds = ScanThresholds {
            choice_day: 3,
            ..ScanThresholds::default()
        };
        let err = thresholds.validate().unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
    }

    #[test]
    fn blank_template_is_rejected() {
        let thresholds = ScanThresholds {
            choice_template: "  ".to_string(),
            ..ScanThresholds::default()
        };
        assert!(thresholds.validate().is_err());
    }
}
