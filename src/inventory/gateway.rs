use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::InventoryClientConfig;
use crate::domain::inventory::{AvailabilityCheckRequest, AvailabilityCheckResult};
use crate::domain::order::OrderItem;
use crate::metrics::Metrics;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Timeout or connection failure. Safe to retry.
    #[error("inventory service unavailable: {0}")]
    Unavailable(String),

    #[error("inventory service authentication failed (status {status})")]
    Auth { status: u16 },

    #[error("inventory service protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait InventoryGateway: Send + Sync {
    async fn check_availability(&self, items: &[OrderItem]) -> Result<AvailabilityCheckResult, InventoryError>;
}

#[derive(Deserialize)]
struct CheckEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<AvailabilityCheckResult>,
}

pub struct HttpInventoryGateway {
    client: reqwest::Client,
    check_url: String,
    token: String,
    timeout: Option<Duration>,
    metrics: Option<Arc<Metrics>>,
}

impl HttpInventoryGateway {
    pub fn new(config: &InventoryClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            check_url: format!("{}/api/inventory/check", config.base_url),
            token: config.token.clone(),
            timeout: config.timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn send(&self, request: &AvailabilityCheckRequest) -> Result<AvailabilityCheckResult, InventoryError> {
        let response = self
            .client
            .post(&self.check_url)
            .header("token", &self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&self.check_url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&self.check_url, e))?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %body, "Inventory service returned error");

            return Err(match status.as_u16() {
                401 | 403 => InventoryError::Auth { status: status.as_u16() },
                code => InventoryError::Protocol(format!("unexpected status {code}: {body}")),
            });
        }

        let envelope: CheckEnvelope = serde_json::from_str(&body)
            .map_err(|e| InventoryError::Protocol(format!("malformed response body: {e}")))?;

        if !envelope.success {
            return Err(InventoryError::Protocol(
                envelope.error.unwrap_or_else(|| "inventory check failed".to_string()),
            ));
        }

        envelope
            .data
            .ok_or_else(|| InventoryError::Protocol("response is missing availability data".to_string()))
    }

    fn observe(&self, outcome: &str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_availability_check(outcome, started.elapsed().as_secs_f64());
        }
    }
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> InventoryError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        tracing::error!(url = %url, error = %error, "Failed to reach inventory service");
        InventoryError::Unavailable(format!("connection failed: {error}"))
    } else {
        InventoryError::Protocol(error.to_string())
    }
}

#[async_trait]
impl InventoryGateway for HttpInventoryGateway {
    async fn check_availability(&self, items: &[OrderItem]) -> Result<AvailabilityCheckResult, InventoryError> {
        tracing::info!(item_count = items.len(), url = %self.check_url, "Checking product availability");

        let request = AvailabilityCheckRequest::for_items(items);
        let started = Instant::now();

        // Dropping the in-flight future on timeout cancels the request
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.send(&request)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(timeout_ms = limit.as_millis() as u64, "Inventory service request timeout");
                    Err(InventoryError::Unavailable(format!(
                        "request timed out after {}ms",
                        limit.as_millis()
                    )))
                }
            },
            None => self.send(&request).await,
        };

        match &result {
            Ok(check) => {
                self.observe(if check.available { "available" } else { "unavailable" }, started);
                tracing::info!(
                    available = check.available,
                    unavailable_count = check.unavailable_items.as_ref().map_or(0, Vec::len),
                    "Availability check completed"
                );
            }
            Err(e) => {
                self.observe("error", started);
                tracing::warn!(error = %e, "Availability check failed");
            }
        }

        result
    }
}
