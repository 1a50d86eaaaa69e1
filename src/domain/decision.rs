//! Shipment lifecycle decision engine
//!
//! Maps (days-in-transit, carrier phase, thresholds, send history) to the
//! zero-or-one action that fires on this scan pass. Pure logic except for
//! the ledger existence reads; the engine itself performs no writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action_log::MilestoneLedger;
use crate::domain::error::ScanError;
use crate::domain::settings::{Milestone, ScanThresholds};
use crate::domain::shipment::{CarrierPhase, Shipment, TrackingSnapshot};

/// Outcome of one decision pass over one shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Nothing fires on this pass.
    None,
    Send(Milestone),
    /// Carrier reports delivered: caller deactivates the shipment and
    /// records the terminal phase. No email decision follows this pass.
    MarkDelivered,
}

/// Display-only status derived from days-in-transit vs thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayStatus {
    OnTrack,
    Approaching,
    Overdue,
    SeverelyOverdue,
    Delivered,
}

impl DisplayStatus {
    /// UI color keyword paired with the status label.
    pub fn color(&self) -> &'static str {
        match self {
            Self::OnTrack => "green",
            Self::Approaching => "yellow",
            Self::Overdue => "orange",
            Self::SeverelyOverdue => "red",
            Self::Delivered => "blue",
        }
    }
}

/// Decide which action, if any, fires for this shipment right now.
///
/// Milestones fire on their exact day only (`==`, not `>=`): a shipment
/// first observed on day 6 never retroactively fires the day-3 email. When
/// the scan cadence is coarser than the threshold granularity, milestones
/// are silently skipped. That trade-off is intentional and preserved from
/// the production behavior.
pub async fn decide(
    shipment: &Shipment,
    snapshot: &TrackingSnapshot,
    thresholds: &ScanThresholds,
    ledger: &dyn MilestoneLedger,
    now: DateTime<Utc>,
) -> Result<Decision, ScanError> {
    if snapshot.phase == CarrierPhase::Delivered {
        return Ok(Decision::MarkDelivered);
    }

    let days = shipment.days_in_transit(now);
    for (milestone, threshold_day) in thresholds.milestones_ascending() {
        if days != threshold_day {
            continue;
        }
        if ledger
            .exists(&shipment.tracking_id, milestone.action_kind())
            .await?
        {
            // Idempotency guard: this milestone already fired once.
            continue;
        }
        return Ok(Decision::Send(milestone));
    }

    Ok(Decision::None)
}

/// Derive the display status for one shipment. Pure; no side effects.
pub fn display_status(
    shipment: &Shipment,
    thresholds: &ScanThresholds,
    now: DateTime<Utc>,
) -> DisplayStatus {
    if shipment.phase == CarrierPhase::Delivered {
        return DisplayStatus::Delivered;
    }
    let days = shipment.days_in_transit(now);
    if days < thresholds.heads_up_day {
        DisplayStatus::OnTrack
    } else if days < thresholds.choice_day {
        DisplayStatus::Approaching
    } else if days < thresholds.gift_notice_day {
        DisplayStatus::Overdue
    } else {
        DisplayStatus::SeverelyOverdue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action_log::ActionKind;
    use chrono::TimeZone;
    use rstest::rstest;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeLedger {
        sent: Mutex<HashSet<(String, ActionKind)>>,
    }

    impl FakeLedger {
        fn empty() -> Self {
            Self {
                sent: Mutex::new(HashSet::new()),
            }
        }

        fn with(entries: &[(&str, ActionKind)]) -> Self {
            let ledger = Self::empty();
            {
                let mut sent = ledger.sent.lock().unwrap();
                for (id, kind) in entries {
                    sent.insert(((*id).to_string(), *kind));
                }
            }
            ledger
        }
    }

    #[async_trait::async_trait]
    impl MilestoneLedger for FakeLedger {
        async fn exists(&self, tracking_id: &str, kind: ActionKind) -> Result<bool, ScanError> {
            Ok(self
                .sent
                .lock()
                .unwrap()
                .contains(&(tracking_id.to_string(), kind)))
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, 9, 0, 0).unwrap()
    }

    fn shipment_shipped_on_day(d: u32) -> Shipment {
        Shipment::new("TRK-X", "ORD-1", "buyer@example.test", day(d))
    }

    #[rstest]
    #[case(3, Decision::Send(Milestone::HeadsUp))]
    #[case(5, Decision::Send(Milestone::Choice))]
    #[case(10, Decision::Send(Milestone::GiftNotice))]
    #[case(4, Decision::None)]
    #[case(6, Decision::None)]
    #[case(11, Decision::None)]
    #[tokio::test]
    async fn milestones_fire_on_exact_day_only(#[case] days: i64, #[case] expected: Decision) {
        let shipment = shipment_shipped_on_day(1);
        let snapshot = TrackingSnapshot::with_phase(CarrierPhase::InTransit);
        let thresholds = ScanThresholds::default();
        let ledger = FakeLedger::empty();

        let now = day(1) + chrono::Duration::days(days);
        let decision = decide(&shipment, &snapshot, &thresholds, &ledger, now)
            .await
            .unwrap();
        assert_eq!(decision, expected);
    }

    #[tokio::test]
    async fn already_sent_milestone_is_skipped() {
        let shipment = shipment_shipped_on_day(1);
        let snapshot = TrackingSnapshot::with_phase(CarrierPhase::InTransit);
        let thresholds = ScanThresholds::default();
        let ledger = FakeLedger::with(&[("TRK-X", ActionKind::ChoiceSent)]);

        let decision = decide(&shipment, &snapshot, &thresholds, &ledger, day(6))
            .await
            .unwrap();
        assert_eq!(decision, Decision::None);
    }

    #[tokio::test]
    async fn delivered_phase_short_circuits_milestones() {
        let shipment = shipment_shipped_on_day(1);
        let snapshot = TrackingSnapshot::with_phase(CarrierPhase::Delivered);
        let thresholds = ScanThresholds::default();
        let ledger = FakeLedger::empty();

        // Day 5 would otherwise be the choice milestone.
        let decision = decide(&shipment, &snapshot, &thresholds, &ledger, day(6))
            .await
            .unwrap();
        assert_eq!(decision, Decision::MarkDelivered);
    }

    #[tokio::test]
    async fn resolved_shipment_never_reaches_later_milestones() {
        let mut shipment = shipment_shipped_on_day(1);
        shipment.resolved_at = Some(day(5));
        let snapshot = TrackingSnapshot::with_phase(CarrierPhase::InTransit);
        let thresholds = ScanThresholds::default();
        let ledger = FakeLedger::with(&[("TRK-X", ActionKind::HeadsUpSent)]);

        // Clock stopped at 4 days; day 11 would be past gift-notice otherwise.
        let decision = decide(&shipment, &snapshot, &thresholds, &ledger, day(11))
            .await
            .unwrap();
        assert_eq!(decision, Decision::None);
    }

    #[rstest]
    #[case(1, DisplayStatus::OnTrack)]
    #[case(3, DisplayStatus::Approaching)]
    #[case(5, DisplayStatus::Overdue)]
    #[case(10, DisplayStatus::SeverelyOverdue)]
    fn display_status_tracks_threshold_bands(#[case] days: i64, #[case] expected: DisplayStatus) {
        let shipment = shipment_shipped_on_day(1);
        let thresholds = ScanThresholds::default();
        let now = day(1) + chrono::Duration::days(days);
        assert_eq!(display_status(&shipment, &thresholds, now), expected);
    }

    #[test]
    fn delivered_display_status_wins() {
        let mut shipment = shipment_shipped_on_day(1);
        shipment.phase = CarrierPhase::Delivered;
        let thresholds = ScanThresholds::default();
        assert_eq!(
            display_status(&shipment, &thresholds, day(20)),
            DisplayStatus::Delivered
        );
    }
}
