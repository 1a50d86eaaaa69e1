//! End-to-end tests of the scan control API over a real listener.
//!
//! Boots the axum router against a temp sqlite database with stubbed carrier
//! and email collaborators, then drives the full lifecycle the operator
//! console uses: start a scan, poll it to completion, inspect the ledger,
//! resolve a shipment and re-run.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;

use shipwatch::application::processor::ScanItemProcessor;
use shipwatch::application::session_manager::{ScanSessionManager, SqlScanPlanSource};
use shipwatch::domain::shipment::{CarrierPhase, Shipment, TrackingSnapshot};
use shipwatch::infrastructure::action_log_repository::ActionLogRepository;
use shipwatch::infrastructure::carrier::{AdapterError, CarrierStatusAdapter};
use shipwatch::infrastructure::config::SessionConfig;
use shipwatch::infrastructure::database_connection::DatabaseConnection;
use shipwatch::infrastructure::delivery::{DeliveryPipeline, RetryPolicy};
use shipwatch::infrastructure::email::{EmailTransport, ProviderResponse, TransportFailure};
use shipwatch::infrastructure::settings_repository::SettingsRepository;
use shipwatch::infrastructure::shipment_repository::ShipmentRepository;
use shipwatch::server::{AppState, build_router};

struct InTransitCarrier;

#[async_trait::async_trait]
impl CarrierStatusAdapter for InTransitCarrier {
    async fn scrape(&self, _tracking_id: &str) -> Result<TrackingSnapshot, AdapterError> {
        Ok(TrackingSnapshot::with_phase(CarrierPhase::InTransit))
    }
}

struct CountingTransport {
    sends: AtomicU32,
}

#[async_trait::async_trait]
impl EmailTransport for CountingTransport {
    async fn send_templated(
        &self,
        _recipient: &str,
        _template: &str,
        _merge_vars: &HashMap<String, String>,
    ) -> Result<ProviderResponse, TransportFailure> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderResponse {
            message_id: format!("msg-{n}"),
            status: "sent".to_string(),
        })
    }
}

struct TestServer {
    _dir: tempfile::TempDir,
    addr: SocketAddr,
    shipments: ShipmentRepository,
    settings: SettingsRepository,
    transport: Arc<CountingTransport>,
    client: reqwest::Client,
}

impl TestServer {
    async fn spawn() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("e2e.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let pool = db.pool().clone();

        let settings = SettingsRepository::new(pool.clone());
        let shipments = ShipmentRepository::new(pool.clone());
        let actions = ActionLogRepository::new(pool);
        // No inter-item throttle in tests.
        settings.set("inter_item_delay_ms", "0").await.unwrap();

        let transport = Arc::new(CountingTransport {
            sends: AtomicU32::new(0),
        });
        let pipeline = DeliveryPipeline::new(transport.clone(), RetryPolicy::default());
        let processor = ScanItemProcessor::new(
            Arc::new(InTransitCarrier),
            shipments.clone(),
            actions.clone(),
            pipeline,
        );
        let manager = ScanSessionManager::new(
            Arc::new(SqlScanPlanSource::new(settings.clone(), shipments.clone())),
            Arc::new(processor),
            SessionConfig::default(),
        );

        let state = AppState {
            manager,
            settings: settings.clone(),
            shipments: shipments.clone(),
            actions,
            scheduled_token: Some("cron-token".to_string()),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        Self {
            _dir: dir,
            addr,
            shipments,
            settings,
            transport,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn get_json(&self, path: &str) -> serde_json::Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn seed_shipment(&self, tracking_id: &str, days_ago: i64) {
        let shipped_at = Utc::now() - chrono::Duration::days(days_ago);
        let shipment = Shipment::new(tracking_id, "ORD-1", "buyer@example.test", shipped_at);
        self.shipments.upsert(&shipment).await.unwrap();
    }

    async fn run_scan_to_completion(&self) -> serde_json::Value {
        let started = self.get_json("/api/scan?action=start").await;
        let session_id = started["session_id"].as_str().unwrap().to_string();
        for _ in 0..200 {
            let status = self
                .get_json(&format!("/api/scan?action=status&session_id={session_id}"))
                .await;
            if status["status"] == "completed" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scan did not complete in time");
    }
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let server = TestServer::spawn().await;
    let body = server.get_json("/health").await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn full_scan_sends_milestone_emails_once() {
    let server = TestServer::spawn().await;
    server.seed_shipment("TRK-A", 5).await;
    server.seed_shipment("TRK-B", 4).await;

    let status = server.run_scan_to_completion().await;
    assert_eq!(status["total"], 2);
    assert_eq!(status["success_count"], 2);
    assert_eq!(status["error_count"], 0);

    // Only the day-5 shipment hits a milestone.
    assert_eq!(server.transport.sends.load(Ordering::SeqCst), 1);
    let actions = server.get_json("/api/actions").await;
    let kinds: Vec<&str> = actions
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["choice_sent"]);

    // A second scan on the same day sends nothing new.
    server.run_scan_to_completion().await;
    assert_eq!(server.transport.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resolved_shipment_is_excluded_from_later_scans() {
    let server = TestServer::spawn().await;
    server.seed_shipment("TRK-C", 3).await;

    let response = server
        .client
        .post(server.url("/api/shipments/TRK-C/resolve"))
        .json(&serde_json::json!({ "choice": "refund" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let status = server.run_scan_to_completion().await;
    assert_eq!(status["total"], 0);
    assert_eq!(server.transport.sends.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scheduled_scan_requires_token_and_min_interval() {
    let server = TestServer::spawn().await;

    let unauthorized = server
        .client
        .get(server.url("/api/scheduled-scan"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), reqwest::StatusCode::UNAUTHORIZED);

    let first: serde_json::Value = server
        .client
        .get(server.url("/api/scheduled-scan"))
        .bearer_auth("cron-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(first["session_id"].is_string());

    // Immediately re-triggering falls inside the minimum interval.
    let second: serde_json::Value = server
        .client
        .get(server.url("/api/scheduled-scan"))
        .bearer_auth("cron-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["status"], "skipped");
    assert_eq!(second["reason"], "min_interval");
}

#[tokio::test]
async fn emergency_stop_blocks_new_scans() {
    let server = TestServer::spawn().await;
    server.settings.set("emergency_stop", "true").await.unwrap();
    server.seed_shipment("TRK-D", 5).await;

    let body = server.get_json("/api/scan?action=start").await;
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["reason"], "emergency_stop");
    assert_eq!(server.transport.sends.load(Ordering::SeqCst), 0);
}
