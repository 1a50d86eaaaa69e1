//! Retrying outbound-delivery pipeline
//!
//! Wraps the transactional email transport with bounded, classified retries
//! and an attempt history suitable for audit. Hard bound: at most
//! `max_retries + 1` transport attempts, so the wall-clock cost is
//! deterministic given the policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::config::DeliveryRetryConfig;
use crate::infrastructure::email::{
    DeliveryErrorKind, EmailTransport, ProviderResponse, TransportFailure,
};

/// Retry policy for one send.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            exponential_backoff: true,
        }
    }
}

impl From<&DeliveryRetryConfig> for RetryPolicy {
    fn from(config: &DeliveryRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            exponential_backoff: config.exponential_backoff,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based). Attempt 1 runs immediately;
    /// before attempt n+1 the delay is `base * 2^(n-1)` when exponential,
    /// else constant `base`.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let millis = if self.exponential_backoff {
            self.base_delay_ms.saturating_mul(1u64 << (attempt - 2).min(20))
        } else {
            self.base_delay_ms
        };
        Duration::from_millis(millis)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// One entry in the attempt history (success or failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub backoff_before_ms: u64,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { message_id: String },
    Failed { kind: DeliveryErrorKind, message: String },
}

/// Final outcome of one pipeline send plus the full attempt history.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub outcome: Result<ProviderResponse, TransportFailure>,
    pub attempts: Vec<DeliveryAttempt>,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Attempt history as a JSON payload for the action ledger.
    pub fn history_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.attempts).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Clone)]
pub struct DeliveryPipeline {
    transport: Arc<dyn EmailTransport>,
    default_policy: RetryPolicy,
}

impl DeliveryPipeline {
    pub fn new(transport: Arc<dyn EmailTransport>, default_policy: RetryPolicy) -> Self {
        Self {
            transport,
            default_policy,
        }
    }

    pub fn default_policy(&self) -> RetryPolicy {
        self.default_policy
    }

    /// Send one templated email with bounded retries.
    ///
    /// A blank template name fails immediately with a `Template`
    /// classification and zero transport attempts; terminal classifications
    /// (auth, 4xx, rejected, invalid address) are never retried.
    pub async fn send(
        &self,
        recipient: &str,
        template: &str,
        merge_vars: &HashMap<String, String>,
        policy: &RetryPolicy,
    ) -> DeliveryReport {
        if template.trim().is_empty() {
            return DeliveryReport {
                outcome: Err(TransportFailure::new(
                    DeliveryErrorKind::Template,
                    "no email template assigned",
                )),
                attempts: Vec::new(),
            };
        }

        let max_attempts = policy.max_attempts();
        let mut attempts = Vec::with_capacity(max_attempts as usize);
        let mut attempt = 1u32;

        loop {
            let backoff = policy.backoff_before(attempt);
            if !backoff.is_zero() {
                tracing::debug!(recipient, attempt, "waiting {backoff:?} before retry");
                tokio::time::sleep(backoff).await;
            }

            let started_at = Utc::now();
            match self
                .transport
                .send_templated(recipient, template, merge_vars)
                .await
            {
                Ok(response) => {
                    attempts.push(DeliveryAttempt {
                        attempt,
                        started_at,
                        backoff_before_ms: backoff.as_millis() as u64,
                        outcome: AttemptOutcome::Succeeded {
                            message_id: response.message_id.clone(),
                        },
                    });
                    tracing::info!(recipient, template, attempt, "email delivered");
                    return DeliveryReport {
                        outcome: Ok(response),
                        attempts,
                    };
                }
                Err(failure) => {
                    attempts.push(DeliveryAttempt {
                        attempt,
                        started_at,
                        backoff_before_ms: backoff.as_millis() as u64,
                        outcome: AttemptOutcome::Failed {
                            kind: failure.kind,
                            message: failure.message.clone(),
                        },
                    });

                    if !failure.kind.is_retryable() || attempt >= max_attempts {
                        tracing::warn!(
                            recipient,
                            template,
                            attempt,
                            kind = %failure.kind,
                            "delivery failed terminally: {}",
                            failure.message
                        );
                        return DeliveryReport {
                            outcome: Err(failure),
                            attempts,
                        };
                    }

                    tracing::warn!(
                        recipient,
                        attempt,
                        kind = %failure.kind,
                        "delivery attempt failed, will retry"
                    );
                    attempt += 1;
                }
            }
        }
    }

    pub async fn send_with_default(
        &self,
        recipient: &str,
        template: &str,
        merge_vars: &HashMap<String, String>,
    ) -> DeliveryReport {
        let policy = self.default_policy;
        self.send(recipient, template, merge_vars, &policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport whose scripted outcomes are consumed one per attempt; the
    /// last script entry repeats forever.
    struct ScriptedTransport {
        script: Mutex<Vec<Result<ProviderResponse, TransportFailure>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<ProviderResponse, TransportFailure>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn always_failing(kind: DeliveryErrorKind) -> Self {
            Self::new(vec![Err(TransportFailure::new(kind, "scripted failure"))])
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn ok_response() -> ProviderResponse {
        ProviderResponse {
            message_id: "msg-1".to_string(),
            status: "sent".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl EmailTransport for ScriptedTransport {
        async fn send_templated(
            &self,
            _recipient: &str,
            _template: &str,
            _merge_vars: &HashMap<String, String>,
        ) -> Result<ProviderResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn pipeline(transport: Arc<ScriptedTransport>) -> DeliveryPipeline {
        DeliveryPipeline::new(transport, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn always_server_error_makes_exactly_four_attempts() {
        let transport = Arc::new(ScriptedTransport::always_failing(DeliveryErrorKind::Server));
        let report = pipeline(transport.clone())
            .send_with_default("a@b.test", "tpl", &HashMap::new())
            .await;

        assert!(!report.succeeded());
        assert_eq!(transport.calls(), 4);
        assert_eq!(report.attempts.len(), 4);
        assert!(matches!(
            report.outcome,
            Err(TransportFailure {
                kind: DeliveryErrorKind::Server,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_classification_is_never_retried() {
        for kind in [
            DeliveryErrorKind::Auth,
            DeliveryErrorKind::Client,
            DeliveryErrorKind::EmailRejected,
            DeliveryErrorKind::InvalidEmail,
        ] {
            let transport = Arc::new(ScriptedTransport::always_failing(kind));
            let report = pipeline(transport.clone())
                .send_with_default("a@b.test", "tpl", &HashMap::new())
                .await;
            assert_eq!(transport.calls(), 1, "{kind} should not retry");
            assert_eq!(report.attempts.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failures_keeps_full_history() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportFailure::new(DeliveryErrorKind::Timeout, "slow")),
            Err(TransportFailure::new(DeliveryErrorKind::Server, "502")),
            Ok(ok_response()),
        ]));
        let report = pipeline(transport.clone())
            .send_with_default("a@b.test", "tpl", &HashMap::new())
            .await;

        assert!(report.succeeded());
        assert_eq!(transport.calls(), 3);
        assert_eq!(report.attempts.len(), 3);
        assert!(matches!(
            report.attempts[2].outcome,
            AttemptOutcome::Succeeded { .. }
        ));
    }

    #[tokio::test]
    async fn blank_template_fails_without_touching_transport() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(ok_response())]));
        let report = pipeline(transport.clone())
            .send_with_default("a@b.test", "  ", &HashMap::new())
            .await;

        assert_eq!(transport.calls(), 0);
        assert!(report.attempts.is_empty());
        assert!(matches!(
            report.outcome,
            Err(TransportFailure {
                kind: DeliveryErrorKind::Template,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_backoff_waits_one_two_four_seconds() {
        let transport = Arc::new(ScriptedTransport::always_failing(DeliveryErrorKind::Server));
        let start = tokio::time::Instant::now();
        pipeline(transport)
            .send_with_default("a@b.test", "tpl", &HashMap::new())
            .await;
        // 1000 + 2000 + 4000 ms of backoff across attempts 2..4.
        assert_eq!(start.elapsed(), Duration::from_millis(7000));
    }

    #[tokio::test(start_paused = true)]
    async fn constant_backoff_waits_base_delay_each_time() {
        let transport = Arc::new(ScriptedTransport::always_failing(DeliveryErrorKind::Server));
        let policy = RetryPolicy {
            exponential_backoff: false,
            ..RetryPolicy::default()
        };
        let pipeline = DeliveryPipeline::new(transport, policy);
        let start = tokio::time::Instant::now();
        pipeline
            .send("a@b.test", "tpl", &HashMap::new(), &policy)
            .await;
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[test]
    fn backoff_schedule_is_deterministic() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_before(1), Duration::ZERO);
        assert_eq!(policy.backoff_before(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_before(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_before(4), Duration::from_millis(4000));
        assert_eq!(policy.max_attempts(), 4);
    }
}
