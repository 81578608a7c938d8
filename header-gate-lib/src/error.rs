use thiserror::Error;

/// Errors that can occur while loading or running the gateway
#[derive(Error, Debug)]
pub enum GateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("No backends configured")]
    NoBackends,
}

pub type Result<T> = std::result::Result<T, GateError>;
