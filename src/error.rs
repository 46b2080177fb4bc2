//! Error types shared by the retrieval pipeline.
//!
//! Only malformed configuration or input data surfaces here. Per-profile outcomes
//! such as a missing reference altitude or an outlier AOD are reported through
//! NaN slots and `RetrievalStats`, never through `Error`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::readers::{FileError, ReadError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("AOD a priori is not implemented, use a lidar ratio a priori instead")]
    UnsupportedApriori,

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("{feature} is not implemented")]
    Unsupported { feature: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("{0}")]
    File(#[from] FileError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }
}
