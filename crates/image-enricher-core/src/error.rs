use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the image-enricher library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Image asset id not present in the store
    #[error("Image with ID {0} not found")]
    AssetNotFound(i64),

    /// Bad path or other unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vision model service unreachable, timed out or returned an error
    #[error("Vision service error: {0}")]
    Service(String),

    /// Persistence failure
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Service(format!("request timed out: {}", err))
        } else {
            Error::Service(err.to_string())
        }
    }
}
