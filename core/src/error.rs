use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemRadioError {
    #[error("Could not load config file: {0}")]
    ConfigNotFound(String),

    #[error("Invalid value for {key}: {value}")]
    ConfigValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Period size {actual} does not match the configured period of {expected} samples")]
    InvalidPeriodSize { expected: usize, actual: usize },

    #[error("Payload must be exactly {expected} bytes, got {actual}")]
    InvalidPayloadSize { expected: usize, actual: usize },

    #[error("Filter design error: {0}")]
    FilterDesign(String),

    #[error("Telemetry gathering failed: {0}")]
    Payload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TelemRadioError>;
