use thiserror::Error;

use crate::config::time_step::TimeStepParseError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("end_date cannot be earlier than start_date")]
    DateOrder,

    #[error("Failed to parse date: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("{0}")]
    TimeStep(#[from] TimeStepParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zmin ({zmin} m) must be lower than zmax ({zmax} m)")]
    AltitudeRange { zmin: f64, zmax: f64 },

    #[error("aod_min ({min}) cannot exceed aod_max ({max})")]
    AodBounds { min: f64, max: f64 },

    #[error("{name} must be a finite, non-negative number, got {value}")]
    Parameter { name: &'static str, value: f64 },

    #[error("filename_pattern '{0}' must contain a '{{}}' date placeholder")]
    FilenamePattern(String),
}
