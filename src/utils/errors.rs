use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service unavailable: {0}")]
    Service(#[from] ServiceError),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Service operation failed: {0}")]
    OperationFailed(String),

    #[error("Service communication error: {0}")]
    CommunicationError(String),

    #[error("Unexpected response: {0}")]
    BadResponse(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_status() {
            AppError::Service(ServiceError::OperationFailed(err.to_string()))
        } else if err.is_decode() {
            AppError::Service(ServiceError::BadResponse(err.to_string()))
        } else {
            AppError::Service(ServiceError::CommunicationError(err.to_string()))
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Export(format!("CSV write failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
