use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::Result;

/// Descriptive metadata attached to an output variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attributes {
    pub long_name: String,
    pub units: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
}

impl Attributes {
    pub fn new(long_name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            long_name: long_name.into(),
            units: units.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable<T> {
    pub data: T,
    pub attributes: Attributes,
}

impl<T> Variable<T> {
    pub fn new(data: T, attributes: Attributes) -> Self {
        Self { data, attributes }
    }
}

/// Per-run counters of the outcomes that left NaN slots in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalStats {
    pub profiles: usize,
    pub retrieved: usize,
    /// Profiles without a usable reference level.
    pub no_reference: usize,
    /// Profiles discarded because of their AOD.
    pub outliers: usize,
    /// Forward-method levels that hit the iteration cap.
    pub non_converged_bins: usize,
}

/// Extinction retrieval of a time series. Missing values are NaN and written
/// as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutput {
    pub time: Vec<NaiveDateTime>,
    /// m ASL
    pub altitude: Vec<f64>,
    pub station_altitude: f64,
    pub wavelength: f64,
    pub extinction: Variable<Vec<Vec<f64>>>,
    pub aod: Variable<Vec<f64>>,
    pub lidar_ratio: Variable<Vec<f64>>,
    pub z_ref: Variable<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clouds: Option<Variable<Vec<Vec<bool>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foc: Option<Variable<Vec<bool>>>,
    /// Boundary layer height, m ASL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pbl: Option<Variable<Vec<f64>>>,
    pub stats: RetrievalStats,
}

impl RetrievalOutput {
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}
