//! Synthetic ceilometer measurements.
//!
//! Turns a known aerosol extinction model into attenuated backscatter profiles
//! through the lidar equation, so that the retrievals can be checked against
//! the truth.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

use crate::atmosphere::MolecularProfile;
use crate::error::Result;
use crate::profiles::{AltitudeGrid, BackscatterUnits, ProfilesData};

/// Aerosol extinction of the boundary layer in the step and aloft models, m-1.
const LAYER_EXTINCTION: f64 = 1e-4;
const LAYER_ALTITUDE: f64 = 3000.0;
const ALOFT_WIDTH: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtinctionModel {
    /// Aerosol-free atmosphere.
    Empty,
    /// Well-mixed layer from the ground to 3 km.
    Step,
    /// Gaussian layer centered at 3 km.
    Aloft,
}

impl ExtinctionModel {
    /// Aerosol extinction (m-1) at each altitude (m AGL).
    pub fn extinction(&self, altitude: &[f64]) -> Vec<f64> {
        altitude
            .iter()
            .map(|&z| match self {
                ExtinctionModel::Empty => 0.0,
                ExtinctionModel::Step if z < LAYER_ALTITUDE => LAYER_EXTINCTION,
                ExtinctionModel::Step => 0.0,
                ExtinctionModel::Aloft => {
                    let x = (z - LAYER_ALTITUDE) / ALOFT_WIDTH;
                    LAYER_EXTINCTION * (-0.5 * x * x).exp()
                }
            })
            .collect()
    }
}

impl FromStr for ExtinctionModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "empty" => Ok(ExtinctionModel::Empty),
            "step" => Ok(ExtinctionModel::Step),
            "aloft" => Ok(ExtinctionModel::Aloft),
            _ => Err(format!("unknown extinction model '{s}', expected empty, step or aloft")),
        }
    }
}

/// Attenuated backscatter (m-1.sr-1) of an aerosol extinction profile for a
/// constant lidar ratio, including the molecular contribution.
///
/// The two-way transmission at a level includes the level itself.
pub fn attenuated_backscatter(
    extinction: &[f64],
    lidar_ratio: f64,
    molecular: &MolecularProfile,
    dz: f64,
) -> Vec<f64> {
    let mut optical_depth = 0.0;
    extinction
        .iter()
        .zip(molecular.backscatter())
        .zip(molecular.extinction())
        .map(|((ext, bm), em)| {
            optical_depth += (em + ext) * dz;
            (bm + ext / lidar_ratio) * (-2.0 * optical_depth).exp()
        })
        .collect()
}

/// Generator of a day of simulated profiles every 5 minutes from 15 m to 15 km.
#[derive(Debug, Clone)]
pub struct Simulator {
    pub model: ExtinctionModel,
    pub wavelength: f64,
    pub lidar_ratio: f64,
    /// Noise level relative to the maximum model extinction, growing with the
    /// square of the altitude.
    pub noise: f64,
    pub date: NaiveDate,
    pub seed: u64,
}

pub struct SimulatedProfiles {
    pub profiles: ProfilesData,
    /// Extinction used to produce each profile, m-1.
    pub extinction: Vec<Vec<f64>>,
}

impl Simulator {
    pub fn new(model: ExtinctionModel, wavelength: f64, lidar_ratio: f64, noise: f64) -> Self {
        Self {
            model,
            wavelength,
            lidar_ratio,
            noise,
            date: NaiveDate::default(),
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn simulate(&self) -> Result<SimulatedProfiles> {
        let grid = AltitudeGrid::new((1..1000).map(|i| 15.0 * i as f64).collect(), 0.0)?;
        let molecular = MolecularProfile::standard(&grid, self.wavelength)?;
        let start = self.date.and_time(chrono::NaiveTime::MIN);
        let time: Vec<_> = (0..24 * 12)
            .map(|i| start + Duration::minutes(5 * i))
            .collect();

        let model = self.model.extinction(grid.altitude());
        let peak = model.iter().copied().fold(0.0, f64::max);
        let top = grid.altitude()[grid.len() - 1];
        let norm_noise = self.noise * peak / (top * top);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let extinction: Vec<Vec<f64>> = time
            .iter()
            .map(|_| {
                model
                    .iter()
                    .zip(grid.altitude())
                    .map(|(ext, z)| ext + norm_noise * rng.random::<f64>() * z * z)
                    .collect()
            })
            .collect();

        let data = extinction
            .iter()
            .map(|ext| attenuated_backscatter(ext, self.lidar_ratio, &molecular, grid.resolution()))
            .collect();

        info!(
            model = ?self.model,
            wavelength = self.wavelength,
            profiles = time.len(),
            "simulated profiles"
        );

        let profiles = ProfilesData::new(
            time,
            grid,
            self.wavelength,
            BackscatterUnits::PerMeterSr,
            data,
        )?;
        Ok(SimulatedProfiles {
            profiles,
            extinction,
        })
    }
}
