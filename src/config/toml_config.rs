use crate::config::registry::ServiceRegistry;
use crate::domain::model::ServiceName;
use crate::utils::error::{PlannerError, Result};
use crate::utils::validation::{validate_positive_number, validate_range, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// 服務名稱 → 端點，鍵值必須是已註冊的服務名稱
    #[serde(default)]
    pub services: BTreeMap<String, String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// 完整規劃流程中每次後端呼叫的上限
    pub plan_seconds: u64,
    pub quick_seconds: u64,
    pub health_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            plan_seconds: 30,
            quick_seconds: 10,
            health_seconds: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn plan(&self) -> Duration {
        Duration::from_secs(self.plan_seconds)
    }

    pub fn quick(&self) -> Duration {
        Duration::from_secs(self.quick_seconds)
    }

    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub max_sites: usize,
    pub max_data_sources: usize,
    pub base_population: u64,
    pub startup_months: u32,
    pub timeline_buffer_months: u32,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_sites: 10,
            max_data_sources: 5,
            base_population: 100_000,
            startup_months: 3,
            timeline_buffer_months: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// 是否在 500 回應中附上內部錯誤細節（僅限開發環境）
    pub expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8240".to_string(),
            expose_error_details: false,
        }
    }
}

impl PlannerConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| PlannerError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PROTOCOL_HOST})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PlannerError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    fn file_registry(&self) -> Result<ServiceRegistry> {
        self.services
            .iter()
            .try_fold(ServiceRegistry::with_defaults(), |registry, (name, url)| {
                let service: ServiceName = name.parse()?;
                Ok(registry.with_endpoint(service, url.clone()))
            })
    }

    /// Builds the registry: hard-coded defaults, then `[services]` entries,
    /// then `*_URL` values returned by `lookup`.
    pub fn build_registry_with<F>(&self, lookup: F) -> Result<ServiceRegistry>
    where
        F: Fn(&str) -> Option<String>,
    {
        let registry = self.file_registry()?.apply_overrides(lookup);
        registry.validate()?;
        Ok(registry)
    }

    pub fn build_registry(&self) -> Result<ServiceRegistry> {
        self.build_registry_with(|key| std::env::var(key).ok())
    }
}

impl Validate for PlannerConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("timeouts.plan_seconds", self.timeouts.plan_seconds, 1)?;
        validate_positive_number("timeouts.quick_seconds", self.timeouts.quick_seconds, 1)?;
        validate_positive_number("timeouts.health_seconds", self.timeouts.health_seconds, 1)?;
        validate_range("planning.max_sites", self.planning.max_sites, 1, 1000)?;
        validate_range("planning.max_data_sources", self.planning.max_data_sources, 1, 1000)?;
        validate_positive_number("planning.base_population", self.planning.base_population, 1)?;

        self.server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| PlannerError::InvalidConfigValueError {
                field: "server.bind_address".to_string(),
                value: self.server.bind_address.clone(),
                reason: e.to_string(),
            })?;

        // 只檢查檔案中明確寫出的端點，環境變數覆寫由 build_registry 驗證
        self.file_registry()?.validate()
    }
}
