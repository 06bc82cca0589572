use thiserror::Error;

#[derive(Error, Debug)]
pub enum LimitsError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dependency unavailable ({dependency}): {details}")]
    DependencyUnavailable { dependency: String, details: String },

    #[error("Event publish failed on topic '{topic}': {details}")]
    EventPublish { topic: String, details: String },

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimitsError {
    pub fn dependency(dependency: impl Into<String>, details: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            dependency: dependency.into(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LimitsError>;
