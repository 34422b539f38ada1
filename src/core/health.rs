use crate::config::ServiceRegistry;
use crate::domain::model::{ServiceHealth, ServiceName};
use crate::domain::ports::BackendClient;
use crate::utils::error::BackendError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub type ServiceStatusReport = BTreeMap<ServiceName, ServiceHealth>;

/// Probes `GET /health` on every registered backend in parallel.
#[derive(Clone)]
pub struct HealthMonitor {
    client: Arc<dyn BackendClient>,
    registry: Arc<ServiceRegistry>,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(client: Arc<dyn BackendClient>, registry: Arc<ServiceRegistry>, timeout: Duration) -> Self {
        Self {
            client,
            registry,
            timeout,
        }
    }

    pub async fn check_all(&self) -> ServiceStatusReport {
        let checks = self.registry.services().map(|(service, _)| {
            let client = Arc::clone(&self.client);
            let timeout = self.timeout;
            async move {
                let result = client.health(service, timeout).await;
                (service, classify(&result))
            }
        });

        let report: ServiceStatusReport = futures::future::join_all(checks).await.into_iter().collect();

        let unhealthy = report
            .values()
            .filter(|h| **h != ServiceHealth::Healthy)
            .count();
        if unhealthy > 0 {
            tracing::warn!("🩺 {}/{} services not healthy", unhealthy, report.len());
        } else {
            tracing::info!("🩺 All {} services healthy", report.len());
        }
        report
    }
}

/// 任何傳輸錯誤都視為 unreachable
pub fn classify(result: &Result<Value, BackendError>) -> ServiceHealth {
    match result {
        Ok(body) if body.get("status").and_then(Value::as_str) == Some("healthy") => {
            ServiceHealth::Healthy
        }
        Ok(_) | Err(BackendError::BadResponse { .. }) => ServiceHealth::Unhealthy,
        Err(BackendError::Unreachable { .. }) | Err(BackendError::Cancelled { .. }) => {
            ServiceHealth::Unreachable
        }
    }
}

pub fn all_healthy(report: &ServiceStatusReport) -> bool {
    report.values().all(|h| *h == ServiceHealth::Healthy)
}
