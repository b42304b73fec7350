//! Failures raised below the application layer: warehouse connectivity,
//! telemetry setup, configuration loading, and plain io.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("warehouse database error: {message}")]
    Database { message: String },
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
