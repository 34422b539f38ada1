#[cfg(feature = "cli")]
pub mod cli;
pub mod registry;
pub mod toml_config;

pub use registry::ServiceRegistry;
pub use toml_config::{PlanningConfig, PlannerConfig, ServerConfig, TimeoutConfig};
