use crate::utils::error::{PlannerError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 已註冊的分析後端服務
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    DataIngestor,
    EhrConnector,
    ClaimsParser,
    FeasibilityPredictor,
    DiversityMapper,
    ProtocolScorer,
    SoaComparator,
}

impl ServiceName {
    pub const ALL: [ServiceName; 7] = [
        ServiceName::DataIngestor,
        ServiceName::EhrConnector,
        ServiceName::ClaimsParser,
        ServiceName::FeasibilityPredictor,
        ServiceName::DiversityMapper,
        ServiceName::ProtocolScorer,
        ServiceName::SoaComparator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::DataIngestor => "data_ingestor",
            ServiceName::EhrConnector => "ehr_connector",
            ServiceName::ClaimsParser => "claims_parser",
            ServiceName::FeasibilityPredictor => "feasibility_predictor",
            ServiceName::DiversityMapper => "diversity_mapper",
            ServiceName::ProtocolScorer => "protocol_scorer",
            ServiceName::SoaComparator => "soa_comparator",
        }
    }

    /// 覆寫端點用的環境變數名稱
    pub fn env_var(&self) -> &'static str {
        match self {
            ServiceName::DataIngestor => "DATA_INGESTOR_URL",
            ServiceName::EhrConnector => "EHR_CONNECTOR_URL",
            ServiceName::ClaimsParser => "CLAIMS_PARSER_URL",
            ServiceName::FeasibilityPredictor => "FEASIBILITY_URL",
            ServiceName::DiversityMapper => "DIVERSITY_URL",
            ServiceName::ProtocolScorer => "PROTOCOL_URL",
            ServiceName::SoaComparator => "SOA_URL",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ServiceName::DataIngestor => "http://mcp_dataingestor:8240",
            ServiceName::EhrConnector => "http://mcp_ehrconnector:8240",
            ServiceName::ClaimsParser => "http://mcp_claimsparser:8240",
            ServiceName::FeasibilityPredictor => "http://mcp_feasibility:8240",
            ServiceName::DiversityMapper => "http://mcp_diversity:8240",
            ServiceName::ProtocolScorer => "http://mcp_protocolscorer:8240",
            ServiceName::SoaComparator => "http://mcp_soacomparator:8240",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        ServiceName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| PlannerError::InvalidConfigValueError {
                field: "services".to_string(),
                value: s.to_string(),
                reason: "Unknown service name".to_string(),
            })
    }
}

/// 客戶端送入的研究規劃請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRequest {
    pub protocol_text: String,
    pub disease_area: String,
    pub target_countries: Vec<String>,
    pub target_enrollment: u32,
    pub inclusion_criteria: Vec<String>,
    pub exclusion_criteria: Vec<String>,
    pub study_duration_months: u32,
    pub primary_endpoints: Vec<String>,
    pub secondary_endpoints: Vec<String>,
}

impl StudyRequest {
    /// Decodes and validates a raw JSON body. Missing or mistyped fields are
    /// reported as validation errors naming the offending field when serde
    /// exposes it.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let request: StudyRequest = serde_json::from_value(value).map_err(|e| {
            let message = e.to_string();
            let field = missing_field_name(&message).unwrap_or("body").to_string();
            PlannerError::ValidationError { field, message }
        })?;
        request.validate()?;
        Ok(request)
    }

    /// Primary endpoints followed by secondary endpoints.
    pub fn all_endpoints(&self) -> Vec<String> {
        self.primary_endpoints
            .iter()
            .chain(self.secondary_endpoints.iter())
            .cloned()
            .collect()
    }
}

fn missing_field_name(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

/// 五十年
pub const MAX_STUDY_DURATION_MONTHS: u32 = 600;

impl Validate for StudyRequest {
    fn validate(&self) -> Result<()> {
        if self.target_countries.is_empty() {
            return Err(PlannerError::validation(
                "target_countries",
                "at least one target country is required",
            ));
        }
        if self.target_countries.iter().any(|c| c.trim().is_empty()) {
            return Err(PlannerError::validation(
                "target_countries",
                "country names cannot be blank",
            ));
        }
        if self.target_enrollment == 0 {
            return Err(PlannerError::validation(
                "target_enrollment",
                "target enrollment must be positive",
            ));
        }
        if self.study_duration_months == 0 {
            return Err(PlannerError::validation(
                "study_duration_months",
                "study duration must be positive",
            ));
        }
        if self.study_duration_months > MAX_STUDY_DURATION_MONTHS {
            return Err(PlannerError::validation(
                "study_duration_months",
                format!(
                    "study duration cannot exceed {} months",
                    MAX_STUDY_DURATION_MONTHS
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolComplexity {
    pub overall_score: f64,
    pub complexity_factors: BTreeMap<String, f64>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Limited,
}

impl Availability {
    pub const QUALITY_THRESHOLD: f64 = 7.5;

    pub fn from_quality(quality_score: f64) -> Self {
        if quality_score > Self::QUALITY_THRESHOLD {
            Availability::Available
        } else {
            Availability::Limited
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub source_id: String,
    pub source_name: String,
    pub data_type: String,
    pub geography: String,
    pub patient_count: u64,
    pub last_updated: String,
    pub quality_score: f64,
    pub availability: Availability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: u64,
    pub upper: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortFactors {
    pub inclusion_criteria_count: usize,
    pub exclusion_criteria_count: usize,
    pub base_population: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortEstimate {
    pub estimated_cohort_size: u64,
    pub confidence_interval: ConfidenceInterval,
    pub factors_considered: CohortFactors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteCandidate {
    pub site_id: String,
    pub site_name: String,
    pub country: String,
    pub feasibility_score: f64,
    pub diversity_score: f64,
    pub data_availability_score: f64,
    pub composite_score: f64,
    pub overall_rank: u32,
    pub strengths: Vec<String>,
    pub challenges: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEstimate {
    pub startup_months: u32,
    pub enrollment_months: u32,
    pub total_months: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleBurden {
    pub burden_score: Option<f64>,
    pub confidence: Option<f64>,
    pub notes: Vec<String>,
}

/// 非關鍵步驟失敗時留下的紀錄
#[derive(Debug, Clone, PartialEq)]
pub struct Degradation {
    pub stage: String,
    pub service: ServiceName,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub study_id: String,
    pub protocol_complexity_score: f64,
    pub estimated_total_cohort_size: u64,
    pub cohort_confidence_interval: ConfidenceInterval,
    pub recommended_sites: Vec<SiteCandidate>,
    pub data_sources: Vec<DataSource>,
    pub timeline_estimate: TimelineEstimate,
    pub risk_factors: Vec<String>,
    pub optimization_opportunities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_burden: Option<ScheduleBurden>,
    #[serde(skip)]
    pub degradations: Vec<Degradation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "proceed")]
    Proceed,
    #[serde(rename = "simplify first")]
    SimplifyFirst,
}

impl Recommendation {
    pub const SIMPLIFY_THRESHOLD: f64 = 7.0;

    pub fn from_score(score: f64) -> Self {
        if score < Self::SIMPLIFY_THRESHOLD {
            Recommendation::Proceed
        } else {
            Recommendation::SimplifyFirst
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::Proceed => "Proceed with full planning",
            Recommendation::SimplifyFirst => "Consider protocol simplification first",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickAssessment {
    pub assessment: String,
    pub complexity: ProtocolComplexity,
    pub recommendation: Recommendation,
    pub message: String,
}

impl QuickAssessment {
    pub fn from_complexity(complexity: ProtocolComplexity) -> Self {
        let recommendation = Recommendation::from_score(complexity.overall_score);
        Self {
            assessment: "quick".to_string(),
            complexity,
            recommendation,
            message: recommendation.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Healthy,
    Unhealthy,
    Unreachable,
}
