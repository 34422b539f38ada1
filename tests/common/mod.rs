#![allow(dead_code)]

use httpmock::prelude::*;
use httpmock::Mock;
use rwe_planner::domain::model::ServiceName;
use rwe_planner::{HttpBackendClient, PlannerConfig, ServiceRegistry, StudyPlanner};
use serde_json::{json, Value};
use std::sync::Arc;

/// 沒有服務監聽的位址
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

pub fn study_request() -> Value {
    json!({
        "protocol_text": "Phase IV observational study of glycemic control",
        "disease_area": "Diabetes",
        "target_countries": ["USA", "UK"],
        "target_enrollment": 500,
        "inclusion_criteria": ["Age >= 18", "HbA1c > 7%"],
        "exclusion_criteria": ["Type 1 diabetes"],
        "study_duration_months": 24,
        "primary_endpoints": ["HbA1c change"],
        "secondary_endpoints": ["Weight change", "Hypoglycemia events"]
    })
}

/// Every backend served from one mock server, each operation on its own path.
pub struct Backends<'a> {
    pub score: Mock<'a>,
    pub sources: Mock<'a>,
    pub cohort: Mock<'a>,
    pub feasibility: Mock<'a>,
    pub diversity: Mock<'a>,
    pub burden: Mock<'a>,
}

pub fn mount_backends(server: &MockServer) -> Backends<'_> {
    let score = server.mock(|when, then| {
        when.method(POST).path("/score");
        then.status(200).json_body(json!({
            "overall_score": 5.5,
            "complexity_factors": {
                "length_score": 5.0,
                "visit_schedule_complexity": 6.0
            },
            "warnings": ["Stringent inclusion criteria may affect enrollment"],
            "recommendations": ["Consider remote visits"]
        }));
    });
    let sources = server.mock(|when, then| {
        when.method(POST).path("/identify_sources");
        then.status(200).json_body(json!([
            {"source_id": "EHR_US_1", "source_name": "US EHR Network", "data_type": "EHR",
             "geography": "USA", "patient_count": 45000, "last_updated": "2024-01-15", "quality_score": 8.4},
            {"source_id": "CLM_UK_1", "source_name": "UK Claims", "data_type": "Claims",
             "geography": "UK", "patient_count": 120000, "last_updated": "2024-02-01", "quality_score": 7.1}
        ]));
    });
    let cohort = server.mock(|when, then| {
        when.method(POST).path("/estimate_cohort_size");
        then.status(200).json_body(json!({
            "estimated_cohort_size": 15000,
            "confidence_interval": {"lower": 12000, "upper": 18000}
        }));
    });
    let feasibility = server.mock(|when, then| {
        when.method(POST).path("/predict_feasibility");
        then.status(200)
            .json_body(json!({"status": "success", "data": {"confidence": 0.85}}));
    });
    let diversity = server.mock(|when, then| {
        when.method(POST).path("/calculate_diversity");
        then.status(200).json_body(json!({"status": "success"}));
    });
    let burden = server.mock(|when, then| {
        when.method(POST).path("/analyze_burden");
        then.status(200)
            .json_body(json!({"burden_score": 4.2, "confidence": 0.7, "notes": ["14 visits"]}));
    });

    Backends {
        score,
        sources,
        cohort,
        feasibility,
        diversity,
        burden,
    }
}

pub fn registry_for(server: &MockServer) -> ServiceRegistry {
    ServiceName::ALL
        .iter()
        .fold(ServiceRegistry::with_defaults(), |registry, service| {
            registry.with_endpoint(*service, server.base_url())
        })
}

pub fn planner_with(registry: ServiceRegistry, config: PlannerConfig) -> StudyPlanner {
    let registry = Arc::new(registry);
    let client = Arc::new(HttpBackendClient::new(Arc::clone(&registry)));
    StudyPlanner::new(client, registry, Arc::new(config))
}
