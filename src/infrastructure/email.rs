//! Transactional email collaborator
//!
//! Thin client over the provider's templated-send API plus the failure
//! classification the retry pipeline keys off. Merge-variable substitution
//! happens provider-side; this layer's job is classifying what went wrong.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Classification of a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    Timeout,
    Network,
    Auth,
    Client,
    Server,
    EmailRejected,
    InvalidEmail,
    QuotaExceeded,
    Template,
    Unknown,
}

impl DeliveryErrorKind {
    /// Retry only transient classes. Auth, 4xx, rejections, bad addresses
    /// and missing templates never get better on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network | Self::Server | Self::QuotaExceeded | Self::Unknown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Client => "client",
            Self::Server => "server",
            Self::EmailRejected => "email_rejected",
            Self::InvalidEmail => "invalid_email",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Template => "template",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed transport attempt, classified.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportFailure {
    pub kind: DeliveryErrorKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: DeliveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Provider acknowledgment for a successful send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message_id: String,
    pub status: String,
}

/// Templated-send contract of the transactional email collaborator.
#[async_trait::async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_templated(
        &self,
        recipient: &str,
        template: &str,
        merge_vars: &HashMap<String, String>,
    ) -> Result<ProviderResponse, TransportFailure>;
}

/// Classify a reqwest transport error.
fn classify_request_error(e: &reqwest::Error) -> DeliveryErrorKind {
    if e.is_timeout() {
        DeliveryErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        DeliveryErrorKind::Network
    } else {
        DeliveryErrorKind::Unknown
    }
}

/// Classify a non-2xx provider status plus its body.
fn classify_status(status: reqwest::StatusCode, body: &str) -> DeliveryErrorKind {
    let lowered = body.to_ascii_lowercase();
    match status.as_u16() {
        401 | 403 => DeliveryErrorKind::Auth,
        408 => DeliveryErrorKind::Timeout,
        429 => DeliveryErrorKind::QuotaExceeded,
        422 if lowered.contains("invalid") && lowered.contains("email") => {
            DeliveryErrorKind::InvalidEmail
        }
        400..=499 if lowered.contains("reject") => DeliveryErrorKind::EmailRejected,
        400..=499 => DeliveryErrorKind::Client,
        500..=599 => DeliveryErrorKind::Server,
        _ => DeliveryErrorKind::Unknown,
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    from: &'a str,
    template: &'a str,
    merge_vars: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct HttpEmailClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender: String,
}

impl HttpEmailClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        sender: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            sender,
        })
    }
}

#[async_trait::async_trait]
impl EmailTransport for HttpEmailClient {
    async fn send_templated(
        &self,
        recipient: &str,
        template: &str,
        merge_vars: &HashMap<String, String>,
    ) -> Result<ProviderResponse, TransportFailure> {
        let payload = SendRequest {
            to: recipient,
            from: &self.sender,
            template,
            merge_vars,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportFailure::new(classify_request_error(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportFailure::new(
                classify_status(status, &body),
                format!("provider returned {status}: {body}"),
            ));
        }

        let parsed: SendResponse = response.json().await.map_err(|e| {
            TransportFailure::new(
                DeliveryErrorKind::Unknown,
                format!("unparseable provider response: {e}"),
            )
        })?;

        Ok(ProviderResponse {
            message_id: parsed.message_id,
            status: parsed.status.unwrap_or_else(|| "sent".to_string()),
        })
    }
}
