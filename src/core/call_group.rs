use crate::domain::model::ServiceName;
use crate::domain::ports::BackendClient;
use crate::utils::error::BackendError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 一次獨立的後端呼叫
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    pub key: String,
    pub service: ServiceName,
    pub operation: String,
    pub payload: Value,
}

/// Issues independent backend calls concurrently and waits for every one of
/// them. A failing member never short-circuits the others; the caller gets
/// one `Result` per key and decides how to degrade.
pub struct ParallelCallGroup<'a> {
    client: &'a dyn BackendClient,
    timeout: Duration,
    cancel: CancellationToken,
    members: Vec<CallDescriptor>,
}

impl<'a> ParallelCallGroup<'a> {
    pub fn new(client: &'a dyn BackendClient, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            client,
            timeout,
            cancel,
            members: Vec::new(),
        }
    }

    /// Adds a member. Keys must be unique within the group; a repeated key
    /// replaces the earlier member.
    pub fn add(
        mut self,
        key: impl Into<String>,
        service: ServiceName,
        operation: impl Into<String>,
        payload: Value,
    ) -> Self {
        let key = key.into();
        self.members.retain(|m| m.key != key);
        self.members.push(CallDescriptor {
            key,
            service,
            operation: operation.into(),
            payload,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Runs every member to completion. When the group's token is cancelled,
    /// in-flight members are dropped and resolve to `BackendError::Cancelled`.
    pub async fn join(self) -> GroupOutcome {
        tracing::debug!("🔀 joining {} concurrent calls", self.len());
        let client = self.client;
        let timeout = self.timeout;
        let cancel = &self.cancel;

        let calls = self.members.into_iter().map(|member| async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(BackendError::Cancelled {
                    service: member.service.to_string(),
                }),
                result = client.call(member.service, &member.operation, member.payload, timeout) => result,
            };

            if let Err(e) = &result {
                if !e.is_cancelled() {
                    tracing::debug!("⚠️ group member '{}' failed: {}", member.key, e);
                }
            }
            (member.key, result)
        });

        let results = futures::future::join_all(calls).await;
        GroupOutcome {
            results: results.into_iter().collect(),
        }
    }
}

/// 每個成員的結果
#[derive(Debug, Default)]
pub struct GroupOutcome {
    results: BTreeMap<String, Result<Value, BackendError>>,
}

impl GroupOutcome {
    /// Removes and returns the outcome for `key`; `None` if the key was
    /// never part of the group.
    pub fn take(&mut self, key: &str) -> Option<Result<Value, BackendError>> {
        self.results.remove(key)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &BackendError)> {
        self.results
            .iter()
            .filter_map(|(key, result)| result.as_ref().err().map(|e| (key.as_str(), e)))
    }

    /// True when at least one member was cut short by the group's token.
    pub fn was_cancelled(&self) -> bool {
        self.failures().any(|(_, e)| e.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 依服務決定延遲與成敗的假後端
    struct ScriptedClient {
        calls: AtomicUsize,
        completed: Arc<AtomicUsize>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                completed: Arc::new(AtomicUsize::new(0)),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BackendClient for ScriptedClient {
        async fn call(
            &self,
            service: ServiceName,
            operation: &str,
            payload: Value,
            _timeout: Duration,
        ) -> Result<Value, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match service {
                ServiceName::DataIngestor => {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Err(BackendError::Unreachable {
                        service: service.to_string(),
                        reason: "connection refused".to_string(),
                    })
                }
                ServiceName::SoaComparator => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({}))
                }
                _ => {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"operation": operation, "echo": payload}))
                }
            }
        }

        async fn health(&self, _service: ServiceName, _timeout: Duration) -> Result<Value, BackendError> {
            Ok(json!({"status": "healthy"}))
        }
    }

    #[tokio::test]
    async fn test_join_waits_for_every_member() {
        let client = ScriptedClient::new();
        let mut outcome = ParallelCallGroup::new(&client, Duration::from_secs(5), CancellationToken::new())
            .add("sources", ServiceName::DataIngestor, "identify_sources", json!({}))
            .add("feasibility", ServiceName::FeasibilityPredictor, "predict_feasibility", json!({"country": "UK"}))
            .join()
            .await;

        // 失敗的成員不會讓較慢的成員被中斷
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.completed.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.failures().count(), 1);

        assert!(matches!(
            outcome.take("sources"),
            Some(Err(BackendError::Unreachable { .. }))
        ));
        let feasibility = outcome.take("feasibility").unwrap().unwrap();
        assert_eq!(feasibility["echo"]["country"], json!("UK"));
        assert!(outcome.take("missing").is_none());
    }

    #[tokio::test]
    async fn test_members_run_concurrently() {
        let client = ScriptedClient::new();
        let mut outcome = ParallelCallGroup::new(&client, Duration::from_secs(5), CancellationToken::new())
            .add("a", ServiceName::FeasibilityPredictor, "predict_feasibility", json!({}))
            .add("b", ServiceName::DiversityMapper, "calculate_diversity", json!({}))
            .add("c", ServiceName::ProtocolScorer, "score", json!({}))
            .join()
            .await;

        // 三個呼叫同時進行中，而非依序執行
        assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(client.completed.load(Ordering::SeqCst), 3);
        for key in ["a", "b", "c"] {
            assert!(matches!(outcome.take(key), Some(Ok(_))));
        }
    }

    #[tokio::test]
    async fn test_cancellation_resolves_pending_members() {
        let client = ScriptedClient::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut outcome = ParallelCallGroup::new(&client, Duration::from_secs(60), cancel)
            .add("burden", ServiceName::SoaComparator, "analyze_burden", json!({}))
            .join()
            .await;

        assert!(outcome.was_cancelled());
        assert!(matches!(
            outcome.take("burden"),
            Some(Err(BackendError::Cancelled { .. }))
        ));
        assert_eq!(client.completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_key_replaces_member() {
        let client = ScriptedClient::new();
        let group = ParallelCallGroup::new(&client, Duration::from_secs(1), CancellationToken::new())
            .add("x", ServiceName::ProtocolScorer, "score", json!({}))
            .add("x", ServiceName::DiversityMapper, "calculate_diversity", json!({}));
        assert_eq!(group.len(), 1);
    }
}
