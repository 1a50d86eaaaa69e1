//! HTTP request handlers for the scan control API.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::application::session::SessionMode;
use crate::domain::action_log::{ActionKind, ActionLogEntry};
use crate::domain::error::ScanError;
use crate::server::AppState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Map a scan error to its HTTP status. Unknown sessions are a 404, caller
/// mistakes a 400, everything else is on us.
fn status_for(error: &ScanError) -> StatusCode {
    match error {
        ScanError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ScanError::InvalidControl(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn scan_error(error: ScanError) -> Response {
    error_response(status_for(&error), error.to_string())
}

/// GET /health
pub async fn get_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Query parameters for GET /api/scan.
#[derive(Debug, Deserialize)]
pub struct ScanParams {
    pub action: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// GET /api/scan?action=start|pause|resume|stop|status
///
/// `start` needs no session id and returns one; every other action requires
/// the `session_id` of a live session.
pub async fn get_scan(State(state): State<AppState>, Query(params): Query<ScanParams>) -> Response {
    if params.action == "start" {
        return start_interactive(&state).await;
    }

    let Some(session_id) = params.session_id.as_deref() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("action '{}' requires session_id", params.action),
        );
    };

    let result = match params.action.as_str() {
        "pause" => state.manager.pause(session_id).await,
        "resume" => state.manager.resume(session_id).await,
        "stop" => state.manager.stop(session_id).await,
        "status" => state.manager.status(session_id).await,
        other => {
            return error_response(StatusCode::BAD_REQUEST, format!("unknown action '{other}'"));
        }
    };

    match result {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(error) => scan_error(error),
    }
}

async fn start_interactive(state: &AppState) -> Response {
    let settings = match state.settings.load().await {
        Ok(settings) => settings,
        Err(error) => return scan_error(error),
    };
    if settings.emergency_stop {
        tracing::warn!("scan request refused: emergency stop is engaged");
        return Json(json!({
            "status": "skipped",
            "reason": "emergency_stop",
        }))
        .into_response();
    }

    match state.manager.start(SessionMode::Interactive).await {
        Ok(started) => Json(started).into_response(),
        Err(error) => scan_error(error),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// GET /api/scheduled-scan
///
/// Endpoint for the external cron trigger. Guarded three ways: bearer token
/// (when configured), the `auto_scan_enabled` flag, and a minimum interval
/// since the last scheduled run. Guard refusals are 200 "skipped" so the
/// cron job does not alert on them.
pub async fn get_scheduled_scan(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(expected) = state.scheduled_token.as_deref() {
        if bearer_token(&headers) != Some(expected) {
            return error_response(StatusCode::UNAUTHORIZED, "invalid or missing bearer token");
        }
    }

    let settings = match state.settings.load().await {
        Ok(settings) => settings,
        Err(error) => return scan_error(error),
    };

    if settings.emergency_stop {
        return Json(json!({ "status": "skipped", "reason": "emergency_stop" })).into_response();
    }
    if !settings.auto_scan_enabled {
        return Json(json!({ "status": "skipped", "reason": "auto_scan_disabled" })).into_response();
    }

    let now = Utc::now();
    if let Some(last_run) = settings.last_scheduled_run_at {
        let elapsed_minutes = (now - last_run).num_minutes();
        if elapsed_minutes < settings.min_scheduled_interval_minutes {
            tracing::info!(
                elapsed_minutes,
                min = settings.min_scheduled_interval_minutes,
                "scheduled scan skipped, ran too recently"
            );
            return Json(json!({
                "status": "skipped",
                "reason": "min_interval",
                "minutes_since_last_run": elapsed_minutes,
            }))
            .into_response();
        }
    }

    if let Err(error) = state.settings.record_scheduled_run(now).await {
        return scan_error(error);
    }
    match state.manager.start(SessionMode::Scheduled).await {
        Ok(started) => Json(started).into_response(),
        Err(error) => scan_error(error),
    }
}

/// Request body for POST /api/shipments/{tracking_id}/resolve.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// The customer's pick: "wait", "resend" or "refund".
    pub choice: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/shipments/{tracking_id}/resolve
///
/// Records the customer's choice in the action ledger and deactivates the
/// shipment so no further follow-ups fire for it.
pub async fn post_resolve(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Response {
    let shipment = match state.shipments.get(&tracking_id).await {
        Ok(Some(shipment)) => shipment,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("no shipment with tracking id '{tracking_id}'"),
            );
        }
        Err(error) => return scan_error(error),
    };

    let entry = ActionLogEntry::new(
        &shipment.tracking_id,
        &shipment.order_id,
        &shipment.recipient_email,
        ActionKind::CustomerChoiceRecorded,
        json!({
            "choice": body.choice,
            "note": body.note,
        }),
    );
    if let Err(error) = state.actions.append(&entry).await {
        return scan_error(error);
    }
    if let Err(error) = state.shipments.resolve(&tracking_id, Utc::now()).await {
        return scan_error(error);
    }

    tracing::info!(%tracking_id, choice = %body.choice, "shipment resolved");
    Json(json!({ "status": "resolved", "tracking_id": tracking_id })).into_response()
}

/// Request body for POST /api/shipments/{tracking_id}/reactivate.
#[derive(Debug, Deserialize, Default)]
pub struct ReactivateRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/shipments/{tracking_id}/reactivate
///
/// Operator override: puts a resolved or delivered shipment back into the
/// active scan set, with a `manual_override` ledger row for the audit trail.
pub async fn post_reactivate(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    Json(body): Json<ReactivateRequest>,
) -> Response {
    let shipment = match state.shipments.get(&tracking_id).await {
        Ok(Some(shipment)) => shipment,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("no shipment with tracking id '{tracking_id}'"),
            );
        }
        Err(error) => return scan_error(error),
    };

    let entry = ActionLogEntry::new(
        &shipment.tracking_id,
        &shipment.order_id,
        &shipment.recipient_email,
        ActionKind::ManualOverride,
        json!({
            "operation": "reactivate",
            "reason": body.reason,
        }),
    );
    if let Err(error) = state.actions.append(&entry).await {
        return scan_error(error);
    }
    if let Err(error) = state.shipments.reactivate(&tracking_id, Utc::now()).await {
        return scan_error(error);
    }

    tracing::info!(%tracking_id, "shipment reactivated");
    Json(json!({ "status": "reactivated", "tracking_id": tracking_id })).into_response()
}

/// Query parameters for GET /api/actions.
#[derive(Debug, Deserialize)]
pub struct ActionsParams {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /api/actions?limit=
///
/// Newest-first slice of the action ledger.
pub async fn get_actions(
    State(state): State<AppState>,
    Query(params): Query<ActionsParams>,
) -> Response {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    match state.actions.recent(limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(error) => scan_error(error),
    }
}
