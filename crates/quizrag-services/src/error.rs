use thiserror::Error;

/// Failures while assembling the service container
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] quizrag_config::ConfigError),

    #[error("Invalid log filter '{directive}': {message}")]
    LogFilter { directive: String, message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;
