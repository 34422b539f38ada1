use crate::domain::model::{Degradation, ServiceName};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// 規劃流程的狀態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStage {
    Started,
    ProtocolScored,
    SourcesAndCohortGathered,
    SitesRanked,
    ScheduleAnalyzed,
    Completed,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ServiceUnavailable(ServiceName),
    Cancelled,
    Internal(String),
}

impl PlanStage {
    pub fn name(&self) -> &'static str {
        match self {
            PlanStage::Started => "started",
            PlanStage::ProtocolScored => "protocol_scored",
            PlanStage::SourcesAndCohortGathered => "sources_and_cohort_gathered",
            PlanStage::SitesRanked => "sites_ranked",
            PlanStage::ScheduleAnalyzed => "schedule_analyzed",
            PlanStage::Completed => "completed",
            PlanStage::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStage::Completed | PlanStage::Failed(_))
    }

    /// The stage that must be current for `self` to be entered. `Failed`
    /// may be entered from any non-terminal stage.
    fn predecessor(&self) -> Option<PlanStage> {
        match self {
            PlanStage::Started | PlanStage::Failed(_) => None,
            PlanStage::ProtocolScored => Some(PlanStage::Started),
            PlanStage::SourcesAndCohortGathered => Some(PlanStage::ProtocolScored),
            PlanStage::SitesRanked => Some(PlanStage::SourcesAndCohortGathered),
            PlanStage::ScheduleAnalyzed => Some(PlanStage::SitesRanked),
            PlanStage::Completed => Some(PlanStage::ScheduleAnalyzed),
        }
    }
}

impl fmt::Display for PlanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStage::Failed(reason) => write!(f, "failed({:?})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// 已完成的階段與其耗時
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: PlanStage,
    pub duration: Duration,
}

/// Per-request state owned exclusively by the aggregator. Tracks the stage
/// machine, per-stage timings and the degradations accepted along the way.
#[derive(Debug)]
pub struct PlanContext {
    pub execution_id: String,
    stage: PlanStage,
    stage_started: Instant,
    history: Vec<StageRecord>,
    degradations: Vec<Degradation>,
}

impl PlanContext {
    pub fn new(execution_id: String) -> Self {
        Self {
            execution_id,
            stage: PlanStage::Started,
            stage_started: Instant::now(),
            history: Vec::new(),
            degradations: Vec::new(),
        }
    }

    pub fn stage(&self) -> &PlanStage {
        &self.stage
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    /// Moves to `next`. Returns `false` (and stays put) when the transition is
    /// not allowed from the current stage.
    pub fn advance(&mut self, next: PlanStage) -> bool {
        if self.stage.is_terminal() {
            tracing::warn!(
                "⛔ {}: ignoring transition to {} from terminal stage {}",
                self.execution_id,
                next,
                self.stage
            );
            return false;
        }
        if let Some(required) = next.predecessor() {
            if required != self.stage {
                tracing::warn!(
                    "⛔ {}: invalid transition {} -> {}",
                    self.execution_id,
                    self.stage,
                    next
                );
                return false;
            }
        }

        let duration = self.stage_started.elapsed();
        tracing::info!(
            "✅ {}: {} -> {} ({:?})",
            self.execution_id,
            self.stage,
            next,
            duration
        );
        self.history.push(StageRecord {
            stage: self.stage.clone(),
            duration,
        });
        self.stage = next;
        self.stage_started = Instant::now();
        true
    }

    pub fn fail(&mut self, reason: FailureReason) {
        self.advance(PlanStage::Failed(reason));
    }

    /// 記錄一次可容忍的失敗
    ///
    /// `stage` is the stage being worked on when the failure happened, i.e.
    /// the one that will be entered once it completes.
    pub fn degrade(&mut self, stage: PlanStage, service: ServiceName, reason: impl Into<String>) {
        let degradation = Degradation {
            stage: stage.name().to_string(),
            service,
            reason: reason.into(),
        };
        tracing::warn!(
            "🔶 {}: degraded at {} ({}): {}",
            self.execution_id,
            degradation.stage,
            degradation.service,
            degradation.reason
        );
        self.degradations.push(degradation);
    }

    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// 獲取執行摘要
    pub fn execution_summary(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        let total_duration: Duration = self.history.iter().map(|r| r.duration).sum();

        summary.insert(
            "execution_id".to_string(),
            serde_json::Value::String(self.execution_id.clone()),
        );
        summary.insert(
            "final_stage".to_string(),
            serde_json::Value::String(self.stage.to_string()),
        );
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::Number((total_duration.as_millis() as u64).into()),
        );
        summary.insert(
            "degradations".to_string(),
            serde_json::Value::Number(self.degradations.len().into()),
        );

        let stages: Vec<serde_json::Value> = self
            .history
            .iter()
            .map(|r| {
                serde_json::json!({
                    "stage": r.stage.name(),
                    "duration_ms": r.duration.as_millis() as u64,
                })
            })
            .collect();
        summary.insert("stages".to_string(), serde_json::Value::Array(stages));

        summary
    }
}
