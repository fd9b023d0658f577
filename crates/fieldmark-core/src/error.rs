use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldmarkError {
    #[error("not initialized: run 'fieldmark init'")]
    NotInitialized,

    #[error("invalid log type '{0}': expected IN or OUT")]
    InvalidLogType(String),

    #[error("invalid location status '{0}': expected ok, denied or unavailable")]
    InvalidLocationStatus(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FieldmarkError>;
