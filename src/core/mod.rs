pub mod call_group;
pub mod health;
pub mod plan_context;
pub mod planner;
pub mod ranking;

pub use crate::domain::ports::BackendClient;
pub use crate::utils::error::Result;
pub use call_group::{GroupOutcome, ParallelCallGroup};
pub use health::{HealthMonitor, ServiceStatusReport};
pub use plan_context::{FailureReason, PlanContext, PlanStage};
pub use planner::{PlanRun, StudyPlanner};
