//! Common error types for the Wake-on-LAN scheduler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WolError {
    /// Bad MAC, bad port, bad time of day. Rejected before any persistence or network action.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Send/probe timeout or resolution failure. Only surfaced when every target failed.
    #[error("Network error: {0}")]
    Network(String),

    /// No fire instant could be computed; prior timer state is left untouched.
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WolError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WolError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, WolError::Validation(_))
    }
}

impl From<anyhow::Error> for WolError {
    fn from(err: anyhow::Error) -> Self {
        WolError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for WolError {
    fn from(err: std::io::Error) -> Self {
        WolError::Network(err.to_string())
    }
}

pub type WolResult<T> = Result<T, WolError>;
