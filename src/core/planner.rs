use crate::adapters::HttpBackendClient;
use crate::config::{PlannerConfig, ServiceRegistry};
use crate::core::call_group::ParallelCallGroup;
use crate::core::health::{HealthMonitor, ServiceStatusReport};
use crate::core::plan_context::{FailureReason, PlanContext, PlanStage};
use crate::core::ranking::{
    rank_sites, synthesize_candidates, SiteSeed, BASELINE_DIVERSITY, BASELINE_FEASIBILITY,
};
use crate::domain::model::{
    CohortEstimate, DataSource, ProtocolComplexity, QuickAssessment, ScheduleBurden,
    ServiceName, SiteCandidate, StudyPlan, StudyRequest, TimelineEstimate,
};
use crate::domain::payloads::{self, *};
use crate::domain::ports::BackendClient;
use crate::utils::error::{BackendError, PlannerError, Result};
use crate::utils::validation::Validate;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const KEY_SOURCES: &str = "data_sources";
const KEY_COHORT: &str = "cohort";
const KEY_FEASIBILITY: &str = "feasibility";
const KEY_DIVERSITY: &str = "diversity";

/// 研究規劃的協調器
///
/// Owns no per-request state: every call to [`StudyPlanner::plan_study`]
/// builds its own [`PlanContext`], so one planner is shared across all
/// concurrent requests.
#[derive(Clone)]
pub struct StudyPlanner {
    client: Arc<dyn BackendClient>,
    registry: Arc<ServiceRegistry>,
    config: Arc<PlannerConfig>,
}

/// A finished (or failed) planning run together with its context, for
/// callers that want the stage timings.
pub struct PlanRun {
    pub result: Result<StudyPlan>,
    pub context: Option<PlanContext>,
}

#[derive(Debug, Deserialize)]
struct QuickAssessmentRequest {
    protocol_text: String,
}

impl StudyPlanner {
    pub fn new(
        client: Arc<dyn BackendClient>,
        registry: Arc<ServiceRegistry>,
        config: Arc<PlannerConfig>,
    ) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    /// Validates `config`, resolves endpoints (file + environment) and wires
    /// the reqwest backend client.
    pub fn from_config(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(config.build_registry()?);
        for (service, url) in registry.services() {
            tracing::info!("🔗 {} -> {}", service, url);
        }
        let client = Arc::new(HttpBackendClient::new(Arc::clone(&registry)));
        Ok(Self::new(client, registry, Arc::new(config)))
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Decodes a raw request body, then plans. Decoding and validation
    /// failures happen before any backend call.
    pub async fn plan_from_json(&self, body: Value) -> Result<StudyPlan> {
        let request = StudyRequest::from_json(body)?;
        self.plan_study(request).await
    }

    pub async fn plan_study(&self, request: StudyRequest) -> Result<StudyPlan> {
        self.plan_study_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Plans with an external cancellation token. Cancelling aborts the
    /// current stage and every later one; no partial plan is returned.
    pub async fn plan_study_with_cancel(
        &self,
        request: StudyRequest,
        cancel: CancellationToken,
    ) -> Result<StudyPlan> {
        self.run(request, cancel).await.result
    }

    pub async fn run(&self, request: StudyRequest, cancel: CancellationToken) -> PlanRun {
        if let Err(e) = request.validate() {
            tracing::warn!("❌ Rejected study request: {}", e);
            return PlanRun {
                result: Err(e),
                context: None,
            };
        }

        let mut context = PlanContext::new(new_study_id());
        tracing::info!(
            "🚀 {}: planning {} study across {} countries",
            context.execution_id,
            request.disease_area,
            request.target_countries.len()
        );

        let result = self.execute(&request, &mut context, &cancel).await;
        match &result {
            Ok(plan) => tracing::info!(
                "🏁 {}: plan ready ({} sites, {} data sources, {} degradations)",
                plan.study_id,
                plan.recommended_sites.len(),
                plan.data_sources.len(),
                plan.degradations.len()
            ),
            Err(e) => tracing::error!("❌ {}: planning failed: {}", context.execution_id, e),
        }

        PlanRun {
            result,
            context: Some(context),
        }
    }

    async fn execute(
        &self,
        request: &StudyRequest,
        context: &mut PlanContext,
        cancel: &CancellationToken,
    ) -> Result<StudyPlan> {
        let timeout = self.config.timeouts.plan();

        // 1. 協定複雜度：後續可行性預測依賴這個分數
        let complexity = self
            .score_protocol(&request.protocol_text, timeout, cancel)
            .await
            .and_then(payloads::decode_protocol_complexity)
            .map_err(|e| fatal(context, ServiceName::ProtocolScorer, "protocol_scoring", e))?;
        self.transition(context, PlanStage::ProtocolScored)?;

        // 2. 資料來源與族群估計並行
        let (data_sources, cohort) = self
            .gather_sources_and_cohort(request, context, cancel)
            .await?;
        self.transition(context, PlanStage::SourcesAndCohortGathered)?;

        // 3. 每個國家各一組可行性 + 多樣性
        let recommended_sites = self
            .rank_country_sites(request, complexity.overall_score, context, cancel)
            .await?;
        self.transition(context, PlanStage::SitesRanked)?;

        // 4. 訪視負擔分析失敗時省略該段
        let schedule_burden = self.analyze_burden(request, context, cancel).await?;
        self.transition(context, PlanStage::ScheduleAnalyzed)?;

        let plan = self.assemble(
            request,
            context,
            complexity,
            cohort,
            data_sources,
            recommended_sites,
            schedule_burden,
        );
        self.transition(context, PlanStage::Completed)?;
        Ok(plan)
    }

    fn transition(&self, context: &mut PlanContext, next: PlanStage) -> Result<()> {
        if context.advance(next.clone()) {
            Ok(())
        } else {
            let message = format!("illegal stage transition from {} to {}", context.stage(), next);
            context.fail(FailureReason::Internal(message.clone()));
            Err(PlannerError::InternalError { message })
        }
    }

    async fn score_protocol(
        &self,
        protocol_text: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<Value, BackendError> {
        call_once(
            self.client.as_ref(),
            ServiceName::ProtocolScorer,
            OP_SCORE_PROTOCOL,
            protocol_score_payload(protocol_text),
            timeout,
            cancel,
        )
        .await
    }

    async fn gather_sources_and_cohort(
        &self,
        request: &StudyRequest,
        context: &mut PlanContext,
        cancel: &CancellationToken,
    ) -> Result<(Vec<DataSource>, CohortEstimate)> {
        let base_population = self.config.planning.base_population;
        let mut outcome = ParallelCallGroup::new(self.client.as_ref(), self.config.timeouts.plan(), cancel.clone())
            .add(KEY_SOURCES, ServiceName::DataIngestor, OP_IDENTIFY_SOURCES, identify_sources_payload(request))
            .add(KEY_COHORT, ServiceName::DataIngestor, OP_ESTIMATE_COHORT, cohort_payload(request, base_population))
            .join()
            .await;

        if outcome.was_cancelled() {
            return Err(cancelled(context, "sources_and_cohort"));
        }

        let cohort = take_member(context, &mut outcome, KEY_COHORT)?
            .and_then(|value| payloads::decode_cohort_estimate(value, request, base_population))
            .map_err(|e| fatal(context, ServiceName::DataIngestor, "cohort_estimation", e))?;

        let data_sources = match take_member(context, &mut outcome, KEY_SOURCES)?
            .and_then(payloads::decode_data_sources)
        {
            Ok(sources) => sources,
            Err(e) => {
                context.degrade(
                    PlanStage::SourcesAndCohortGathered,
                    ServiceName::DataIngestor,
                    format!("data sources unavailable: {}", e),
                );
                Vec::new()
            }
        };

        tracing::debug!(
            "📊 cohort estimate {} ({} data sources identified)",
            cohort.estimated_cohort_size,
            data_sources.len()
        );
        Ok((data_sources, cohort))
    }

    async fn rank_country_sites(
        &self,
        request: &StudyRequest,
        protocol_complexity: f64,
        context: &mut PlanContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<SiteCandidate>> {
        let mut seeds = Vec::with_capacity(request.target_countries.len());

        for country in &request.target_countries {
            let mut outcome = ParallelCallGroup::new(self.client.as_ref(), self.config.timeouts.plan(), cancel.clone())
                .add(
                    KEY_FEASIBILITY,
                    ServiceName::FeasibilityPredictor,
                    OP_PREDICT_FEASIBILITY,
                    feasibility_payload(country, protocol_complexity, request.target_enrollment),
                )
                .add(KEY_DIVERSITY, ServiceName::DiversityMapper, OP_CALCULATE_DIVERSITY, diversity_payload(country))
                .join()
                .await;

            if outcome.was_cancelled() {
                return Err(cancelled(context, "site_ranking"));
            }

            let feasibility = take_member(context, &mut outcome, KEY_FEASIBILITY)?.and_then(|value| {
                decode_country_score(ServiceName::FeasibilityPredictor, &value, "feasibility_score", BASELINE_FEASIBILITY)
            });
            let diversity = take_member(context, &mut outcome, KEY_DIVERSITY)?.and_then(|value| {
                decode_country_score(ServiceName::DiversityMapper, &value, "diversity_score", BASELINE_DIVERSITY)
            });

            match (feasibility, diversity) {
                (Ok(feasibility), Ok(diversity)) => {
                    seeds.push(SiteSeed::new(country.as_str(), feasibility, diversity));
                }
                (Err(e), _) => context.degrade(
                    PlanStage::SitesRanked,
                    ServiceName::FeasibilityPredictor,
                    format!("{} contributes no sites: {}", country, e),
                ),
                (_, Err(e)) => context.degrade(
                    PlanStage::SitesRanked,
                    ServiceName::DiversityMapper,
                    format!("{} contributes no sites: {}", country, e),
                ),
            }
        }

        let candidates = synthesize_candidates(&seeds);
        tracing::debug!(
            "🏥 synthesized {} site candidates from {} countries",
            candidates.len(),
            seeds.len()
        );
        Ok(rank_sites(candidates, self.config.planning.max_sites))
    }

    async fn analyze_burden(
        &self,
        request: &StudyRequest,
        context: &mut PlanContext,
        cancel: &CancellationToken,
    ) -> Result<Option<ScheduleBurden>> {
        let result = call_once(
            self.client.as_ref(),
            ServiceName::SoaComparator,
            OP_ANALYZE_BURDEN,
            burden_payload(request),
            self.config.timeouts.plan(),
            cancel,
        )
        .await;

        match result {
            Ok(value) => Ok(Some(decode_schedule_burden(value))),
            Err(e) if e.is_cancelled() => Err(cancelled(context, "schedule_analysis")),
            Err(e) => {
                context.degrade(
                    PlanStage::ScheduleAnalyzed,
                    ServiceName::SoaComparator,
                    format!("schedule burden omitted: {}", e),
                );
                Ok(None)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        request: &StudyRequest,
        context: &PlanContext,
        complexity: ProtocolComplexity,
        cohort: CohortEstimate,
        mut data_sources: Vec<DataSource>,
        recommended_sites: Vec<SiteCandidate>,
        schedule_burden: Option<ScheduleBurden>,
    ) -> StudyPlan {
        let planning = &self.config.planning;
        data_sources.truncate(planning.max_data_sources);

        StudyPlan {
            study_id: context.execution_id.clone(),
            protocol_complexity_score: complexity.overall_score,
            estimated_total_cohort_size: cohort.estimated_cohort_size,
            cohort_confidence_interval: cohort.confidence_interval,
            recommended_sites,
            data_sources,
            timeline_estimate: TimelineEstimate {
                startup_months: planning.startup_months,
                enrollment_months: request.study_duration_months,
                total_months: request
                    .study_duration_months
                    .saturating_add(planning.timeline_buffer_months),
            },
            risk_factors: complexity.warnings,
            optimization_opportunities: complexity.recommendations,
            schedule_burden,
            degradations: context.degradations().to_vec(),
        }
    }

    /// Single protocol-scoring call with the short timeout; independent of
    /// the full planning state machine.
    pub async fn quick_assessment(&self, protocol_text: &str) -> Result<QuickAssessment> {
        let complexity = self
            .score_protocol(protocol_text, self.config.timeouts.quick(), &CancellationToken::new())
            .await
            .and_then(payloads::decode_protocol_complexity)
            .map_err(|source| PlannerError::BackendUnavailable {
                stage: "quick_assessment".to_string(),
                source,
            })?;

        let assessment = QuickAssessment::from_complexity(complexity);
        tracing::info!(
            "⚡ Quick assessment: score {:.2} -> {}",
            assessment.complexity.overall_score,
            assessment.message
        );
        Ok(assessment)
    }

    pub async fn quick_assessment_from_json(&self, body: Value) -> Result<QuickAssessment> {
        let request: QuickAssessmentRequest = serde_json::from_value(body)
            .map_err(|e| PlannerError::validation("protocol_text", e.to_string()))?;
        self.quick_assessment(&request.protocol_text).await
    }

    pub async fn service_status(&self) -> ServiceStatusReport {
        HealthMonitor::new(
            Arc::clone(&self.client),
            Arc::clone(&self.registry),
            self.config.timeouts.health(),
        )
        .check_all()
        .await
    }
}

/// `RWE_{時間戳}_{隨機碼}`，同一秒內的請求也不會重複
fn new_study_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "RWE_{}_{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

async fn call_once(
    client: &dyn BackendClient,
    service: ServiceName,
    operation: &str,
    payload: Value,
    timeout: Duration,
    cancel: &CancellationToken,
) -> std::result::Result<Value, BackendError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackendError::Cancelled { service: service.to_string() }),
        result = client.call(service, operation, payload, timeout) => result,
    }
}

fn take_member(
    context: &mut PlanContext,
    outcome: &mut crate::core::call_group::GroupOutcome,
    key: &str,
) -> Result<std::result::Result<Value, BackendError>> {
    outcome.take(key).ok_or_else(|| {
        let message = format!("call group has no result for '{}'", key);
        context.fail(FailureReason::Internal(message.clone()));
        PlannerError::InternalError { message }
    })
}

/// 關鍵步驟失敗：標記 Failed 並回傳統一的錯誤
fn fatal(context: &mut PlanContext, service: ServiceName, stage: &str, error: BackendError) -> PlannerError {
    if error.is_cancelled() {
        return cancelled(context, stage);
    }
    context.fail(FailureReason::ServiceUnavailable(service));
    PlannerError::BackendUnavailable {
        stage: stage.to_string(),
        source: error,
    }
}

fn cancelled(context: &mut PlanContext, stage: &str) -> PlannerError {
    context.fail(FailureReason::Cancelled);
    PlannerError::Cancelled {
        stage: stage.to_string(),
    }
}
