//! Batch scan session state
//!
//! Session state lives in process memory only: a restart loses in-flight
//! sessions, which is acceptable because the scheduled job is idempotent and
//! safe to re-run from scratch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::watch;

/// Status of one batch scan session.
///
/// `Running` is the only state in which the scan loop advances the cursor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Stopped,
    Completed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }
}

/// How the session was started. Scheduled runs are non-interactive and
/// reject pause/resume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Interactive,
    Scheduled,
}

/// Trimmed per-item record kept in the trailing results window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub tracking_id: String,
    pub succeeded: bool,
    pub detail: String,
    pub finished_at: DateTime<Utc>,
}

impl ItemResult {
    pub fn success(tracking_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            succeeded: true,
            detail: detail.into(),
            finished_at: Utc::now(),
        }
    }

    pub fn failure(tracking_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            succeeded: false,
            detail: detail.into(),
            finished_at: Utc::now(),
        }
    }
}

/// In-memory state of one session. Owned exclusively by the session manager;
/// the scan loop and control operations mutate it only through the manager.
#[derive(Debug)]
pub(crate) struct ScanSession {
    pub id: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    /// Index of the next item to process in the frozen shipment list.
    pub cursor: usize,
    pub total: usize,
    pub success_count: u32,
    pub error_count: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Bounded trailing window of per-item results for status polling.
    pub trailing: VecDeque<ItemResult>,
    pub trailing_capacity: usize,
    /// Control signal observed by the scan loop between items.
    pub control_tx: watch::Sender<SessionStatus>,
}

impl ScanSession {
    pub fn record_item(&mut self, result: ItemResult) {
        if result.succeeded {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        self.cursor += 1;
        if self.trailing.len() == self.trailing_capacity {
            self.trailing.pop_front();
        }
        self.trailing.push_back(result);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let elapsed_end = self.completed_at.unwrap_or_else(Utc::now);
        SessionSnapshot {
            session_id: self.id.clone(),
            mode: self.mode,
            status: self.status,
            cursor: self.cursor,
            total: self.total,
            success_count: self.success_count,
            error_count: self.error_count,
            elapsed_seconds: (elapsed_end - self.started_at).num_seconds().max(0),
            remaining: self.total.saturating_sub(self.cursor),
            recent_results: self.trailing.iter().cloned().collect(),
        }
    }
}

/// Progress snapshot returned by `status` polls and terminal control calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub cursor: usize,
    pub total: usize,
    pub success_count: u32,
    pub error_count: u32,
    pub elapsed_seconds: i64,
    pub remaining: usize,
    pub recent_results: Vec<ItemResult>,
}
