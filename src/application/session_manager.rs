//! Batch scan session manager
//!
//! Orchestrates "scan every active shipment" as a detached background task
//! with operator control: start, pause, resume, stop, status. The session
//! table is process-wide, owned exclusively by this manager, and mutated
//! only through its methods — callers never see the raw map.
//!
//! Pause and stop are cooperative: the loop observes the control signal
//! between items, so an in-flight item always finishes. Shipments are
//! processed in the fixed order frozen at start; pausing never reorders or
//! skips items.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::application::processor::ShipmentProcessor;
use crate::application::session::{
    ItemResult, ScanSession, SessionMode, SessionSnapshot, SessionStatus,
};
use crate::domain::error::ScanError;
use crate::domain::settings::ScanThresholds;
use crate::domain::shipment::Shipment;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::settings_repository::SettingsRepository;
use crate::infrastructure::shipment_repository::ShipmentRepository;

/// Immutable snapshot taken at `start()`: the shipment list and threshold
/// configuration a session iterates over, frozen for its whole lifetime.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub thresholds: ScanThresholds,
    pub shipments: Vec<Shipment>,
}

/// Source of the frozen plan. Settings are re-read on every call; they are
/// never cached across runs.
#[async_trait::async_trait]
pub trait ScanPlanSource: Send + Sync {
    async fn load_plan(&self) -> Result<ScanPlan, ScanError>;
}

/// Production plan source backed by the settings and shipments tables.
pub struct SqlScanPlanSource {
    settings: SettingsRepository,
    shipments: ShipmentRepository,
}

impl SqlScanPlanSource {
    pub fn new(settings: SettingsRepository, shipments: ShipmentRepository) -> Self {
        Self {
            settings,
            shipments,
        }
    }
}

#[async_trait::async_trait]
impl ScanPlanSource for SqlScanPlanSource {
    async fn load_plan(&self) -> Result<ScanPlan, ScanError> {
        let settings = self.settings.load().await?;
        let shipments = self
            .shipments
            .active_shipments(settings.thresholds.max_shipments_per_run)
            .await?;
        Ok(ScanPlan {
            thresholds: settings.thresholds,
            shipments,
        })
    }
}

/// Response to a successful `start()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StartedSession {
    pub session_id: String,
    pub total_items: usize,
}

/// Whether the scan loop may keep going at all (running or merely paused),
/// as opposed to having been told to halt. Split out so tests can drive the
/// control check directly.
pub fn should_continue(status: SessionStatus) -> bool {
    !status.is_terminal()
}

/// Block until the session is runnable again. Returns `false` when the
/// session was stopped (or the control channel vanished) and the loop must
/// exit.
async fn wait_until_runnable(control_rx: &mut watch::Receiver<SessionStatus>) -> bool {
    loop {
        let status = *control_rx.borrow();
        if !should_continue(status) {
            return false;
        }
        if status == SessionStatus::Running {
            return true;
        }
        // Paused: sleep until the next control transition.
        if control_rx.changed().await.is_err() {
            return false;
        }
    }
}

#[derive(Clone)]
pub struct ScanSessionManager {
    sessions: Arc<RwLock<HashMap<String, ScanSession>>>,
    plan_source: Arc<dyn ScanPlanSource>,
    processor: Arc<dyn ShipmentProcessor>,
    config: SessionConfig,
}

impl ScanSessionManager {
    pub fn new(
        plan_source: Arc<dyn ScanPlanSource>,
        processor: Arc<dyn ShipmentProcessor>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            plan_source,
            processor,
            config,
        }
    }

    /// Start a new batch scan. Loads the plan (settings re-read, shipment
    /// list frozen), registers the session and spawns the detached scan
    /// loop. The caller gets the session id back immediately; the loop
    /// outlives the request that triggered it.
    pub async fn start(&self, mode: SessionMode) -> Result<StartedSession, ScanError> {
        let plan = self.plan_source.load_plan().await?;
        let total = plan.shipments.len();
        let session_id = Uuid::new_v4().to_string();
        let (control_tx, control_rx) = watch::channel(SessionStatus::Running);

        let session = ScanSession {
            id: session_id.clone(),
            mode,
            status: SessionStatus::Running,
            cursor: 0,
            total,
            success_count: 0,
            error_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            trailing: VecDeque::new(),
            trailing_capacity: self.config.trailing_results,
            control_tx,
        };

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session_id.clone(), session);
        }

        tracing::info!(session_id, total, ?mode, "scan session started");

        let manager = self.clone();
        let loop_id = session_id.clone();
        tokio::spawn(async move {
            manager.run_scan_loop(loop_id, plan, control_rx).await;
        });

        Ok(StartedSession {
            session_id,
            total_items: total,
        })
    }

    async fn run_scan_loop(
        &self,
        session_id: String,
        plan: ScanPlan,
        mut control_rx: watch::Receiver<SessionStatus>,
    ) {
        let inter_item_delay = Duration::from_millis(plan.thresholds.inter_item_delay_ms);

        for shipment in &plan.shipments {
            if !wait_until_runnable(&mut control_rx).await {
                self.finalize(&session_id, SessionStatus::Stopped).await;
                return;
            }

            let result = self.processor.process(shipment, &plan.thresholds).await;
            self.record_item(&session_id, result).await;

            // Fixed yield between items: status polls and control flips get
            // a turn here before the next carrier call.
            tokio::time::sleep(inter_item_delay).await;
        }

        self.finalize(&session_id, SessionStatus::Completed).await;
    }

    async fn record_item(&self, session_id: &str, result: ItemResult) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.record_item(result);
        }
    }

    /// Stamp the terminal status and schedule eviction after the grace
    /// window. A stop requested mid-run wins over natural completion.
    async fn finalize(&self, session_id: &str, terminal: SessionStatus) {
        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(session_id) {
                if !session.status.is_terminal() {
                    session.status = terminal;
                }
                session.completed_at = Some(Utc::now());
                let _ = session.control_tx.send(session.status);
                tracing::info!(
                    session_id,
                    status = session.status.as_str(),
                    success = session.success_count,
                    errors = session.error_count,
                    "scan session finished"
                );
            }
        }

        let sessions = Arc::clone(&self.sessions);
        let evict_id = session_id.to_string();
        let grace = Duration::from_secs(self.config.removal_grace_secs);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut sessions = sessions.write().await;
            if sessions.remove(&evict_id).is_some() {
                tracing::debug!(session_id = %evict_id, "scan session evicted");
            }
        });
    }

    /// Pause a running interactive session. Takes effect before the next
    /// item; the in-flight item finishes first.
    pub async fn pause(&self, session_id: &str) -> Result<SessionSnapshot, ScanError> {
        self.transition(session_id, SessionStatus::Running, SessionStatus::Paused)
            .await
    }

    /// Resume a paused session from the exact cursor it stopped at.
    pub async fn resume(&self, session_id: &str) -> Result<SessionSnapshot, ScanError> {
        self.transition(session_id, SessionStatus::Paused, SessionStatus::Running)
            .await
    }

    // Pause/resume transitions; interactive sessions only.
    async fn transition(
        &self,
        session_id: &str,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<SessionSnapshot, ScanError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ScanError::SessionNotFound(session_id.to_string()))?;

        if session.mode == SessionMode::Scheduled {
            return Err(ScanError::InvalidControl(
                "scheduled sessions cannot be paused or resumed".to_string(),
            ));
        }
        if session.status != expected {
            return Err(ScanError::InvalidControl(format!(
                "session is {}, expected {}",
                session.status.as_str(),
                expected.as_str()
            )));
        }

        session.status = next;
        let _ = session.control_tx.send(next);
        tracing::info!(session_id, status = next.as_str(), "scan session control");
        Ok(session.snapshot())
    }

    /// Cooperatively stop a session. The loop exits after the current item;
    /// stopping an already-terminal session is idempotent and returns the
    /// final counters.
    pub async fn stop(&self, session_id: &str) -> Result<SessionSnapshot, ScanError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ScanError::SessionNotFound(session_id.to_string()))?;

        if !session.status.is_terminal() {
            session.status = SessionStatus::Stopped;
            let _ = session.control_tx.send(SessionStatus::Stopped);
            tracing::info!(session_id, "scan session stop requested");
        }
        Ok(session.snapshot())
    }

    /// Progress snapshot; safe to poll concurrently and frequently.
    pub async fn status(&self, session_id: &str) -> Result<SessionSnapshot, ScanError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(ScanSession::snapshot)
            .ok_or_else(|| ScanError::SessionNotFound(session_id.to_string()))
    }

    /// Snapshots of all live (not yet evicted) sessions.
    pub async fn all_sessions(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.values().map(ScanSession::snapshot).collect()
    }
}
