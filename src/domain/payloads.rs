//! Wire schemas for the analytic backends.
//!
//! Outbound payloads are built from the [`StudyRequest`]; inbound payloads are
//! decoded tolerantly: unknown fields are ignored, the fields the orchestrator
//! relies on are checked, and anything unusable becomes a
//! [`BackendError::BadResponse`].

use crate::domain::model::{
    Availability, CohortEstimate, CohortFactors, ConfidenceInterval, DataSource,
    ProtocolComplexity, ScheduleBurden, ServiceName, StudyRequest,
};
use crate::utils::error::BackendError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const OP_SCORE_PROTOCOL: &str = "score";
pub const OP_IDENTIFY_SOURCES: &str = "identify_sources";
pub const OP_ESTIMATE_COHORT: &str = "estimate_cohort_size";
pub const OP_PREDICT_FEASIBILITY: &str = "predict_feasibility";
pub const OP_CALCULATE_DIVERSITY: &str = "calculate_diversity";
pub const OP_ANALYZE_BURDEN: &str = "analyze_burden";

pub fn protocol_score_payload(protocol_text: &str) -> Value {
    json!({ "protocol_text": protocol_text })
}

pub fn identify_sources_payload(request: &StudyRequest) -> Value {
    json!({
        "disease_area": request.disease_area,
        "geography": request.target_countries,
        "minimum_patient_count": request.target_enrollment,
    })
}

pub fn cohort_payload(request: &StudyRequest, base_population: u64) -> Value {
    json!({
        "base_population": base_population,
        "inclusion_criteria": request.inclusion_criteria,
        "exclusion_criteria": request.exclusion_criteria,
    })
}

/// 下游可行性預測需要上游的複雜度分數
pub fn feasibility_payload(country: &str, protocol_complexity: f64, target_enrollment: u32) -> Value {
    json!({
        "country": country,
        "protocol_complexity": protocol_complexity,
        "target_enrollment": target_enrollment,
    })
}

pub fn diversity_payload(country: &str) -> Value {
    json!({ "country": country })
}

pub fn burden_payload(request: &StudyRequest) -> Value {
    json!({
        "study_duration_months": request.study_duration_months,
        "endpoints": request.all_endpoints(),
    })
}

fn decode<T: DeserializeOwned>(
    service: ServiceName,
    operation: &str,
    value: Value,
) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| {
        BackendError::bad_payload(
            service.as_str(),
            format!("malformed '{}' payload: {}", operation, e),
        )
    })
}

fn check_score(service: ServiceName, field: &str, score: f64) -> Result<f64, BackendError> {
    if score.is_finite() && (0.0..=10.0).contains(&score) {
        Ok(score)
    } else {
        Err(BackendError::bad_payload(
            service.as_str(),
            format!("'{}' must be within 0-10, got {}", field, score),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ProtocolScoreResponse {
    overall_score: Option<f64>,
    #[serde(default)]
    complexity_factors: BTreeMap<String, f64>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

/// Decodes a protocol scoring response. The overall score is recomputed as
/// the mean of the factors; the reported `overall_score` is only used when
/// the backend sends no factors.
pub fn decode_protocol_complexity(value: Value) -> Result<ProtocolComplexity, BackendError> {
    let service = ServiceName::ProtocolScorer;
    let response: ProtocolScoreResponse = decode(service, OP_SCORE_PROTOCOL, value)?;

    for (name, score) in &response.complexity_factors {
        check_score(service, &format!("complexity_factors.{}", name), *score)?;
    }

    let overall_score = if response.complexity_factors.is_empty() {
        let reported = response.overall_score.ok_or_else(|| {
            BackendError::bad_payload(
                service.as_str(),
                "response has neither complexity_factors nor overall_score",
            )
        })?;
        check_score(service, "overall_score", reported)?
    } else {
        let total: f64 = response.complexity_factors.values().sum();
        let mean = total / response.complexity_factors.len() as f64;
        if let Some(reported) = response.overall_score {
            if (reported - mean).abs() > 0.01 {
                tracing::debug!(
                    "🔎 protocol_scorer reported overall_score {} but factor mean is {:.4}; using the mean",
                    reported,
                    mean
                );
            }
        }
        mean
    };

    Ok(ProtocolComplexity {
        overall_score,
        complexity_factors: response.complexity_factors,
        warnings: response.warnings,
        recommendations: response.recommendations,
    })
}

#[derive(Debug, Deserialize)]
struct DataSourceWire {
    source_id: String,
    #[serde(default)]
    source_name: String,
    #[serde(default)]
    data_type: String,
    #[serde(default)]
    geography: String,
    patient_count: u64,
    #[serde(default)]
    last_updated: String,
    quality_score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataSourceList {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(alias = "data_sources")]
        sources: Vec<Value>,
    },
}

/// 單筆資料來源：欄位不完整或分數超出範圍就略過
fn decode_data_source(index: usize, entry: Value) -> Option<DataSource> {
    let service = ServiceName::DataIngestor;
    let wire: DataSourceWire = match serde_json::from_value(entry) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::debug!("⏭️ skipping data source #{}: {}", index, e);
            return None;
        }
    };

    match check_score(service, "quality_score", wire.quality_score) {
        Ok(quality_score) => Some(DataSource {
            source_id: wire.source_id,
            source_name: wire.source_name,
            data_type: wire.data_type,
            geography: wire.geography,
            patient_count: wire.patient_count,
            last_updated: wire.last_updated,
            quality_score,
            availability: Availability::from_quality(quality_score),
        }),
        Err(e) => {
            tracing::debug!("⏭️ skipping data source '{}': {}", wire.source_id, e);
            None
        }
    }
}

/// Decodes the identified data sources and orders them by patient count,
/// then quality score, both descending. Availability is always re-derived
/// from the quality score.
///
/// Only a payload that is not a list at all is an error; individual entries
/// that are incomplete or out of range are dropped.
pub fn decode_data_sources(value: Value) -> Result<Vec<DataSource>, BackendError> {
    let entries = match decode(ServiceName::DataIngestor, OP_IDENTIFY_SOURCES, value)? {
        DataSourceList::Bare(entries) => entries,
        DataSourceList::Wrapped { sources } => sources,
    };

    let mut sources: Vec<DataSource> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| decode_data_source(index, entry))
        .collect();

    sources.sort_by(|a, b| {
        b.patient_count
            .cmp(&a.patient_count)
            .then_with(|| b.quality_score.total_cmp(&a.quality_score))
    });
    Ok(sources)
}

#[derive(Debug, Deserialize)]
struct CohortWire {
    estimated_cohort_size: u64,
    confidence_interval: Option<ConfidenceInterval>,
    factors_considered: Option<CohortFactorsWire>,
}

#[derive(Debug, Default, Deserialize)]
struct CohortFactorsWire {
    inclusion_criteria_count: Option<usize>,
    exclusion_criteria_count: Option<usize>,
    base_population: Option<u64>,
}

/// Decodes a cohort estimate. Criteria counts the backend omits fall back to
/// what the orchestrator sent.
pub fn decode_cohort_estimate(
    value: Value,
    request: &StudyRequest,
    base_population: u64,
) -> Result<CohortEstimate, BackendError> {
    let service = ServiceName::DataIngestor;
    let wire: CohortWire = decode(service, OP_ESTIMATE_COHORT, value)?;
    let estimate = wire.estimated_cohort_size;

    let confidence_interval = match wire.confidence_interval {
        Some(ci) => {
            if ci.lower > estimate || estimate > ci.upper {
                return Err(BackendError::bad_payload(
                    service.as_str(),
                    format!(
                        "confidence interval [{}, {}] does not contain estimate {}",
                        ci.lower, ci.upper, estimate
                    ),
                ));
            }
            ci
        }
        None => ConfidenceInterval {
            lower: (estimate as f64 * 0.8).floor() as u64,
            upper: (estimate as f64 * 1.2).floor() as u64,
        },
    };

    let factors = wire.factors_considered.unwrap_or_default();
    Ok(CohortEstimate {
        estimated_cohort_size: estimate,
        confidence_interval,
        factors_considered: CohortFactors {
            inclusion_criteria_count: factors
                .inclusion_criteria_count
                .unwrap_or(request.inclusion_criteria.len()),
            exclusion_criteria_count: factors
                .exclusion_criteria_count
                .unwrap_or(request.exclusion_criteria.len()),
            base_population: factors.base_population.unwrap_or(base_population),
        },
    })
}

/// 從頂層或 `data` 物件中讀取數值欄位
fn lookup_number(value: &Value, field: &str) -> Option<f64> {
    value
        .get(field)
        .or_else(|| value.get("data").and_then(|data| data.get(field)))
        .and_then(Value::as_f64)
}

/// Reads an optional country-level score, falling back to `baseline` when the
/// backend does not report one.
pub fn decode_country_score(
    service: ServiceName,
    value: &Value,
    field: &str,
    baseline: f64,
) -> Result<f64, BackendError> {
    match lookup_number(value, field) {
        Some(score) => check_score(service, field, score),
        None => Ok(baseline),
    }
}

pub fn decode_schedule_burden(value: Value) -> ScheduleBurden {
    let notes = value
        .get("notes")
        .or_else(|| value.get("data").and_then(|data| data.get("notes")))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    ScheduleBurden {
        burden_score: lookup_number(&value, "burden_score"),
        confidence: lookup_number(&value, "confidence"),
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StudyRequest {
        StudyRequest {
            protocol_text: "protocol".to_string(),
            disease_area: "Oncology".to_string(),
            target_countries: vec!["USA".to_string()],
            target_enrollment: 250,
            inclusion_criteria: vec!["Age > 18".to_string(), "Stage II".to_string()],
            exclusion_criteria: vec!["Pregnant".to_string()],
            study_duration_months: 18,
            primary_endpoints: vec!["OS".to_string()],
            secondary_endpoints: vec!["PFS".to_string()],
        }
    }

    #[test]
    fn test_overall_score_is_mean_of_factors() {
        let complexity = decode_protocol_complexity(json!({
            "overall_score": 9.9,
            "complexity_factors": {
                "length_score": 0.5,
                "procedures_complexity": 6.5,
                "inclusion_criteria_complexity": 7.2,
                "data_collection_complexity": 5.8,
                "visit_schedule_complexity": 6.0
            },
            "warnings": ["Stringent inclusion criteria may affect enrollment"],
            "recommendations": [],
            "unexpected": {"ignored": true}
        }))
        .unwrap();

        let expected = (0.5 + 6.5 + 7.2 + 5.8 + 6.0) / 5.0;
        assert!((complexity.overall_score - expected).abs() < 1e-9);
        assert_eq!(complexity.warnings.len(), 1);
    }

    #[test]
    fn test_reported_score_used_without_factors() {
        let complexity = decode_protocol_complexity(json!({"overall_score": 5.5})).unwrap();
        assert_eq!(complexity.overall_score, 5.5);
        assert!(complexity.warnings.is_empty());

        assert!(decode_protocol_complexity(json!({"warnings": []})).is_err());
        assert!(decode_protocol_complexity(json!({"overall_score": 12.0})).is_err());
    }

    #[test]
    fn test_data_sources_sorted_and_availability_rederived() {
        let sources = decode_data_sources(json!([
            {"source_id": "a", "patient_count": 100, "quality_score": 9.0, "availability": "Limited"},
            {"source_id": "b", "patient_count": 5000, "quality_score": 7.0},
            {"source_id": "c", "patient_count": 5000, "quality_score": 8.2}
        ]))
        .unwrap();

        let ids: Vec<&str> = sources.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(sources[0].availability, Availability::Available);
        assert_eq!(sources[1].availability, Availability::Limited);
        assert_eq!(sources[2].availability, Availability::Available);
    }

    #[test]
    fn test_invalid_data_sources_are_skipped() {
        let sources = decode_data_sources(json!([
            {"source_id": "good", "patient_count": 5000, "quality_score": 8.0},
            {"source_id": "bad", "patient_count": 10, "quality_score": 10.2},
            {"source_id": "no_count", "quality_score": 9.0},
            "not an object",
            {"source_id": "small", "patient_count": 20, "quality_score": 6.0}
        ]))
        .unwrap();

        let ids: Vec<&str> = sources.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["good", "small"]);
    }

    #[test]
    fn test_data_sources_payload_must_be_a_list() {
        assert!(matches!(
            decode_data_sources(json!({"status": "error"})),
            Err(BackendError::BadResponse { .. })
        ));
        assert!(decode_data_sources(json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_data_sources_accept_wrapped_list() {
        let sources = decode_data_sources(json!({
            "data_sources": [{"source_id": "x", "patient_count": 1, "quality_score": 8.0}]
        }))
        .unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_cohort_interval_derived_when_missing() {
        let cohort =
            decode_cohort_estimate(json!({"estimated_cohort_size": 1000}), &request(), 100_000)
                .unwrap();
        assert_eq!(cohort.confidence_interval, ConfidenceInterval { lower: 800, upper: 1200 });
        assert_eq!(cohort.factors_considered.inclusion_criteria_count, 2);
        assert_eq!(cohort.factors_considered.base_population, 100_000);
    }

    #[test]
    fn test_cohort_interval_must_contain_estimate() {
        let result = decode_cohort_estimate(
            json!({
                "estimated_cohort_size": 1000,
                "confidence_interval": {"lower": 1100, "upper": 1300}
            }),
            &request(),
            100_000,
        );
        assert!(matches!(result, Err(BackendError::BadResponse { .. })));
    }

    #[test]
    fn test_country_score_lookup() {
        let nested = json!({"status": "success", "data": {"feasibility_score": 6.4}});
        assert_eq!(
            decode_country_score(ServiceName::FeasibilityPredictor, &nested, "feasibility_score", 8.5)
                .unwrap(),
            6.4
        );

        let opaque = json!({"status": "success", "data": {"confidence": 0.8}});
        assert_eq!(
            decode_country_score(ServiceName::DiversityMapper, &opaque, "diversity_score", 7.8)
                .unwrap(),
            7.8
        );
    }

    #[test]
    fn test_burden_payload_concatenates_endpoints() {
        let payload = burden_payload(&request());
        assert_eq!(payload["endpoints"], json!(["OS", "PFS"]));
        assert_eq!(payload["study_duration_months"], json!(18));
    }
}
