use crate::config::ServiceRegistry;
use crate::domain::model::ServiceName;
use crate::domain::ports::BackendClient;
use crate::utils::error::BackendError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const ERROR_BODY_PREVIEW: usize = 200;

/// reqwest 實作的後端客戶端，連線池在所有請求間共用
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    client: Client,
    registry: Arc<ServiceRegistry>,
}

impl HttpBackendClient {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            client: Client::new(),
            registry,
        }
    }

    async fn execute(
        &self,
        service: ServiceName,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(service, e))?;

        let status = response.status();
        tracing::debug!("📡 {} responded with {}", service, status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(BackendError::BadResponse {
                service: service.to_string(),
                status: Some(status.as_u16()),
                reason: if preview.is_empty() {
                    "empty error body".to_string()
                } else {
                    preview
                },
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| classify_transport_error(service, e))?;

        match payload {
            Value::Object(_) | Value::Array(_) => Ok(payload),
            other => Err(BackendError::bad_payload(
                service.as_str(),
                format!("expected a JSON object or array, got {}", other),
            )),
        }
    }
}

/// 連線、DNS 或逾時 → Unreachable；其他（解碼失敗等）→ BadResponse
fn classify_transport_error(service: ServiceName, error: reqwest::Error) -> BackendError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        BackendError::Unreachable {
            service: service.to_string(),
            reason: error.to_string(),
        }
    } else {
        BackendError::BadResponse {
            service: service.to_string(),
            status: error.status().map(|s| s.as_u16()),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn call(
        &self,
        service: ServiceName,
        operation: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        let url = self.registry.url_for(service, operation);
        tracing::debug!("📡 POST {} (timeout {:?})", url, timeout);
        self.execute(service, self.client.post(&url).json(&payload), timeout)
            .await
    }

    async fn health(&self, service: ServiceName, timeout: Duration) -> Result<Value, BackendError> {
        let url = self.registry.url_for(service, "health");
        tracing::debug!("📡 GET {} (timeout {:?})", url, timeout);
        self.execute(service, self.client.get(&url), timeout).await
    }
}
