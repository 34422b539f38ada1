use crate::domain::model::ServiceName;
use crate::utils::error::Result;
use crate::utils::validation::{validate_url, Validate};
use std::collections::BTreeMap;

/// Logical service name → base URL. Built once at startup and shared
/// read-only across requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRegistry {
    endpoints: BTreeMap<ServiceName, String>,
}

impl ServiceRegistry {
    /// 使用寫死的預設端點
    pub fn with_defaults() -> Self {
        let endpoints = ServiceName::ALL
            .iter()
            .map(|name| (*name, name.default_endpoint().to_string()))
            .collect();
        Self { endpoints }
    }

    /// Applies `lookup(env_var)` for every registered service; non-empty
    /// values replace the current endpoint.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in ServiceName::ALL {
            if let Some(url) = lookup(name.env_var()).filter(|v| !v.trim().is_empty()) {
                tracing::debug!("🔧 {} endpoint overridden by {}: {}", name, name.env_var(), url);
                self.endpoints.insert(name, url);
            }
        }
        self
    }

    pub fn with_endpoint(mut self, service: ServiceName, url: impl Into<String>) -> Self {
        self.endpoints.insert(service, url.into());
        self
    }

    pub fn endpoint(&self, service: ServiceName) -> &str {
        self.endpoints
            .get(&service)
            .map(String::as_str)
            .unwrap_or_else(|| service.default_endpoint())
    }

    /// `{endpoint}/{path}` without doubled slashes.
    pub fn url_for(&self, service: ServiceName, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint(service).trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn services(&self) -> impl Iterator<Item = (ServiceName, &str)> {
        self.endpoints.iter().map(|(name, url)| (*name, url.as_str()))
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Validate for ServiceRegistry {
    fn validate(&self) -> Result<()> {
        for (name, url) in self.services() {
            validate_url(&format!("services.{}", name), url)?;
        }
        Ok(())
    }
}
