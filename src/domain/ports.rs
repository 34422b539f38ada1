use crate::domain::model::ServiceName;
use crate::utils::error::BackendError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// 與單一分析後端溝通的介面
///
/// Implementations enforce `timeout` per call, never retry, and classify every
/// failure as a [`BackendError`].
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// `POST /<operation>` on `service` with a JSON body.
    async fn call(
        &self,
        service: ServiceName,
        operation: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BackendError>;

    /// `GET /health` on `service`.
    async fn health(&self, service: ServiceName, timeout: Duration) -> Result<Value, BackendError>;
}
