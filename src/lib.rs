pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::cli::{CliConfig, Command};

pub use crate::adapters::HttpBackendClient;
pub use crate::config::{PlannerConfig, ServiceRegistry};
pub use crate::core::{PlanRun, StudyPlanner};
pub use crate::domain::model::{QuickAssessment, StudyPlan, StudyRequest};
pub use crate::utils::error::{BackendError, PlannerError, Result};
