//! Profile data model: altitude grid, backscatter time series and the helpers
//! operating on them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::instruments::Instrument;

pub mod preprocess;
pub mod signal;

/// Monotonic altitude axis (m ASL) shared by every profile of a time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AltitudeGrid {
    altitude: Vec<f64>,
    station_altitude: f64,
}

impl AltitudeGrid {
    pub fn new(altitude: Vec<f64>, station_altitude: f64) -> Result<Self> {
        if altitude.len() < 2 {
            return Err(Error::invalid(format!(
                "altitude grid needs at least 2 levels, got {}",
                altitude.len()
            )));
        }
        if altitude.iter().any(|z| !z.is_finite()) || !station_altitude.is_finite() {
            return Err(Error::invalid("altitude grid contains non-finite values"));
        }
        if altitude.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::invalid("altitude grid must be strictly increasing"));
        }

        Ok(Self {
            altitude,
            station_altitude,
        })
    }

    pub fn len(&self) -> usize {
        self.altitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.altitude.is_empty()
    }

    pub fn altitude(&self) -> &[f64] {
        &self.altitude
    }

    pub fn station_altitude(&self) -> f64 {
        self.station_altitude
    }

    /// Smallest spacing between two consecutive levels, in m.
    pub fn resolution(&self) -> f64 {
        self.altitude
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(f64::INFINITY, f64::min)
    }

    /// Altitudes above ground level.
    pub fn agl(&self) -> Vec<f64> {
        self.altitude
            .iter()
            .map(|z| z - self.station_altitude)
            .collect()
    }

    /// Index of the level closest to an altitude given above ground level.
    /// A NaN altitude maps to the top of the grid.
    pub fn index_from_agl(&self, z_agl: f64) -> usize {
        if z_agl.is_nan() {
            return self.len() - 1;
        }
        let target = z_agl + self.station_altitude;
        self.altitude
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Physical units of the attenuated backscatter delivered by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackscatterUnits {
    #[default]
    #[serde(rename = "m-1.sr-1")]
    PerMeterSr,
    #[serde(rename = "Mm-1.sr-1")]
    PerMegameterSr,
}

impl BackscatterUnits {
    /// Parses a free-form unit label. Any label mentioning `Mm` is taken as
    /// Mm-1.sr-1, everything else as SI.
    pub fn from_label(label: &str) -> Self {
        if label.contains("Mm") {
            BackscatterUnits::PerMegameterSr
        } else {
            BackscatterUnits::PerMeterSr
        }
    }

    /// Factor converting a value in these units to m-1.sr-1.
    pub fn to_si(&self) -> f64 {
        match self {
            BackscatterUnits::PerMeterSr => 1.0,
            BackscatterUnits::PerMegameterSr => 1e-6,
        }
    }
}

impl fmt::Display for BackscatterUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackscatterUnits::PerMeterSr => write!(f, "m-1.sr-1"),
            BackscatterUnits::PerMegameterSr => write!(f, "Mm-1.sr-1"),
        }
    }
}

/// A time series of attenuated backscatter profiles on one altitude grid.
#[derive(Debug, Clone)]
pub struct ProfilesData {
    time: Vec<NaiveDateTime>,
    grid: AltitudeGrid,
    wavelength: f64,
    units: BackscatterUnits,
    attenuated_backscatter: Vec<Vec<f64>>,
    cloud_base_height: Option<Vec<f64>>,
    instrument: Option<Instrument>,
}

impl ProfilesData {
    pub fn new(
        time: Vec<NaiveDateTime>,
        grid: AltitudeGrid,
        wavelength: f64,
        units: BackscatterUnits,
        attenuated_backscatter: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if !(wavelength.is_finite() && wavelength > 0.0) {
            return Err(Error::invalid(format!(
                "wavelength must be positive, got {wavelength}"
            )));
        }
        check_shape(&time, &grid, &attenuated_backscatter)?;

        Ok(Self {
            time,
            grid,
            wavelength,
            units,
            attenuated_backscatter,
            cloud_base_height: None,
            instrument: None,
        })
    }

    /// Attaches a precomputed altitude (m ASL) of the lowest cloud base per
    /// timestamp; NaN marks a clear profile.
    pub fn with_cloud_base_height(mut self, cloud_base_height: Vec<f64>) -> Result<Self> {
        if cloud_base_height.len() != self.time.len() {
            return Err(Error::ShapeMismatch {
                what: "cloud_base_height".to_string(),
                expected: self.time.len(),
                actual: cloud_base_height.len(),
            });
        }
        self.cloud_base_height = Some(cloud_base_height);
        Ok(self)
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = Some(instrument);
        self
    }

    /// Returns a copy holding `data` in place of the backscatter time series.
    pub fn with_backscatter(&self, data: Vec<Vec<f64>>) -> Result<Self> {
        check_shape(&self.time, &self.grid, &data)?;
        Ok(Self {
            attenuated_backscatter: data,
            ..self.clone()
        })
    }

    pub fn time(&self) -> &[NaiveDateTime] {
        &self.time
    }

    pub fn grid(&self) -> &AltitudeGrid {
        &self.grid
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn units(&self) -> BackscatterUnits {
        self.units
    }

    pub fn instrument(&self) -> Option<Instrument> {
        self.instrument
    }

    pub fn attenuated_backscatter(&self) -> &[Vec<f64>] {
        &self.attenuated_backscatter
    }

    pub fn cloud_base_height(&self) -> Option<&[f64]> {
        self.cloud_base_height.as_deref()
    }

    pub fn profile(&self, i: usize) -> &[f64] {
        &self.attenuated_backscatter[i]
    }

    pub fn n_time(&self) -> usize {
        self.time.len()
    }

    /// Smallest interval between two consecutive timestamps, in seconds.
    pub fn time_resolution(&self) -> Option<f64> {
        self.time
            .windows(2)
            .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
            .filter(|dt| *dt > 0.0)
            .reduce(f64::min)
    }
}

fn check_shape(time: &[NaiveDateTime], grid: &AltitudeGrid, data: &[Vec<f64>]) -> Result<()> {
    if data.len() != time.len() {
        return Err(Error::ShapeMismatch {
            what: "time dimension".to_string(),
            expected: time.len(),
            actual: data.len(),
        });
    }
    if let Some(row) = data.iter().find(|row| row.len() != grid.len()) {
        return Err(Error::ShapeMismatch {
            what: "altitude dimension".to_string(),
            expected: grid.len(),
            actual: row.len(),
        });
    }
    Ok(())
}
