//! Cloud and fog detection
//!
//! Detectors produce a boolean cloud mask (time × altitude) behind the
//! `LayerDetectionStrategy` trait so that the retrieval pipeline can use either
//! the built-in gradient method or masks computed elsewhere.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::profiles::{AltitudeGrid, ProfilesData, preprocess};

pub mod clouds;
pub mod foc;
pub mod pbl;

pub use clouds::{Layer, LayerParams, detect_layers, layer_mask};
pub use foc::{FocMethod, detect_foc};
pub use pbl::{PblParams, detect_pbl};

pub trait LayerDetectionStrategy: Send + Sync {
    /// Cloud mask for every profile, aligned to `profiles.grid()`.
    fn cloud_mask(&self, profiles: &ProfilesData) -> Result<Vec<Vec<bool>>>;
}

/// Vertical-gradient detector applied to time-averaged profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientLayerDetector {
    pub params: LayerParams,
    /// Altitude AGL (m) above which layers are searched.
    pub zmin: f64,
    /// Rolling median applied before detection, in minutes.
    pub time_avg: f64,
}

impl Default for GradientLayerDetector {
    fn default() -> Self {
        Self {
            params: LayerParams::default(),
            zmin: 0.0,
            time_avg: 1.0,
        }
    }
}

impl GradientLayerDetector {
    /// Layers of every profile.
    pub fn layers(&self, profiles: &ProfilesData) -> Result<Vec<Vec<Layer>>> {
        let averaged = preprocess::time_avg(profiles, self.time_avg)?;
        let imin = profiles.grid().index_from_agl(self.zmin);

        let layers: Vec<Vec<Layer>> = averaged
            .attenuated_backscatter()
            .par_iter()
            .map(|row| detect_layers(row, imin, &self.params))
            .collect();

        debug!(
            profiles = layers.len(),
            cloudy = layers.iter().filter(|l| !l.is_empty()).count(),
            "gradient cloud detection"
        );
        Ok(layers)
    }
}

impl LayerDetectionStrategy for GradientLayerDetector {
    fn cloud_mask(&self, profiles: &ProfilesData) -> Result<Vec<Vec<bool>>> {
        let n = profiles.grid().len();
        Ok(self
            .layers(profiles)?
            .iter()
            .map(|layers| layer_mask(n, layers))
            .collect())
    }
}

/// Cloud masks computed outside this crate, for instance by a trained
/// classifier.
#[derive(Debug, Clone)]
pub struct PrecomputedLayers {
    mask: Vec<Vec<bool>>,
}

impl PrecomputedLayers {
    pub fn new(mask: Vec<Vec<bool>>) -> Self {
        Self { mask }
    }
}

impl LayerDetectionStrategy for PrecomputedLayers {
    fn cloud_mask(&self, profiles: &ProfilesData) -> Result<Vec<Vec<bool>>> {
        if self.mask.len() != profiles.n_time() {
            return Err(Error::ShapeMismatch {
                what: "precomputed cloud mask time dimension".to_string(),
                expected: profiles.n_time(),
                actual: self.mask.len(),
            });
        }
        if let Some(row) = self.mask.iter().find(|r| r.len() != profiles.grid().len()) {
            return Err(Error::ShapeMismatch {
                what: "precomputed cloud mask altitude dimension".to_string(),
                expected: profiles.grid().len(),
                actual: row.len(),
            });
        }
        Ok(self.mask.clone())
    }
}

/// Altitude (m ASL) of the lowest flagged level, NaN for a clear profile.
pub fn lowest_cloud_base(mask: &[bool], grid: &AltitudeGrid) -> f64 {
    mask.iter()
        .position(|m| *m)
        .map_or(f64::NAN, |i| grid.altitude()[i])
}
