use thiserror::Error;

/// 後端呼叫失敗的分類
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Service {service} is unreachable: {reason}")]
    Unreachable { service: String, reason: String },

    #[error("Service {service} returned a bad response{}: {reason}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    BadResponse {
        service: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Call to {service} was cancelled")]
    Cancelled { service: String },
}

impl BackendError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled { .. })
    }

    pub(crate) fn bad_payload(service: &str, reason: impl Into<String>) -> Self {
        BackendError::BadResponse {
            service: service.to_string(),
            status: None,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Validation error on '{field}': {message}")]
    ValidationError { field: String, message: String },

    #[error("Required backend unavailable during {stage}: {source}")]
    BackendUnavailable {
        stage: String,
        #[source]
        source: BackendError,
    },

    #[error("Request was cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("Internal orchestration error: {message}")]
    InternalError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Request,
    Backend,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PlannerError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        PlannerError::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PlannerError::ValidationError { .. } | PlannerError::Cancelled { .. } => {
                ErrorCategory::Request
            }
            PlannerError::BackendUnavailable { .. } => ErrorCategory::Backend,
            PlannerError::ConfigError { .. }
            | PlannerError::MissingConfigError { .. }
            | PlannerError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            PlannerError::InternalError { .. }
            | PlannerError::IoError(_)
            | PlannerError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlannerError::Cancelled { .. } => ErrorSeverity::Low,
            PlannerError::BackendUnavailable { .. } => ErrorSeverity::Medium,
            PlannerError::ValidationError { .. }
            | PlannerError::ConfigError { .. }
            | PlannerError::MissingConfigError { .. }
            | PlannerError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            PlannerError::InternalError { .. }
            | PlannerError::IoError(_)
            | PlannerError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    /// 給終端使用者看的訊息，不含內部細節
    pub fn user_friendly_message(&self) -> String {
        match self {
            PlannerError::ValidationError { field, message } => {
                format!("Invalid study request field '{}': {}", field, message)
            }
            PlannerError::BackendUnavailable { source, .. } => {
                format!("Service communication error: {}", source)
            }
            PlannerError::Cancelled { .. } => "The planning request was cancelled".to_string(),
            PlannerError::InternalError { .. }
            | PlannerError::IoError(_)
            | PlannerError::SerializationError(_) => "Internal orchestration error".to_string(),
            PlannerError::ConfigError { .. }
            | PlannerError::MissingConfigError { .. }
            | PlannerError::InvalidConfigValueError { .. } => {
                format!("Configuration problem: {}", self)
            }
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Request => "Check the request body against the StudyRequest schema",
            ErrorCategory::Backend => {
                "Check `service_status` and retry once the analytic services are healthy"
            }
            ErrorCategory::Configuration => {
                "Check the TOML config file and the *_URL environment overrides"
            }
            ErrorCategory::System => "Re-run with --verbose and inspect the logs",
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
