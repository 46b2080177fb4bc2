//! Fog or condensation (FOC) flagging.
//!
//! A profile is flagged when the lowest cloud base sits close to the ground, or
//! when the signal is too noisy at a reference altitude because the beam is
//! extinguished by fog or condensation on the window.

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::profiles::ProfilesData;
use crate::profiles::signal::snr_at;

const SNR_STEP: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FocMethod {
    /// Flags profiles whose cloud base is at or below `zmin_cloud` (m AGL).
    CloudBase {
        #[serde(default = "default_zmin_cloud")]
        zmin_cloud: f64,
    },
    /// Flags profiles whose SNR at `z_snr` (m AGL) is at or below `min_snr`.
    Snr {
        #[serde(default = "default_z_snr")]
        z_snr: f64,
        #[serde(default = "default_min_snr")]
        min_snr: f64,
    },
}

fn default_zmin_cloud() -> f64 {
    200.0
}

fn default_z_snr() -> f64 {
    2000.0
}

fn default_min_snr() -> f64 {
    2.0
}

impl Default for FocMethod {
    fn default() -> Self {
        FocMethod::CloudBase {
            zmin_cloud: default_zmin_cloud(),
        }
    }
}

/// FOC flag per timestamp.
///
/// The cloud base method needs the cloud base heights of `profiles`.
pub fn detect_foc(profiles: &ProfilesData, method: FocMethod) -> Result<Vec<bool>> {
    let foc: Vec<bool> = match method {
        FocMethod::CloudBase { zmin_cloud } => {
            let cbh = profiles.cloud_base_height().ok_or_else(|| {
                Error::invalid("FOC detection from cloud base requires cloud base heights")
            })?;
            let station = profiles.grid().station_altitude();
            cbh.iter().map(|z| z - station <= zmin_cloud).collect()
        }
        FocMethod::Snr { z_snr, min_snr } => {
            let iz = profiles.grid().index_from_agl(z_snr);
            profiles
                .attenuated_backscatter()
                .iter()
                .map(|row| snr_at(row, iz, SNR_STEP) <= min_snr)
                .collect()
        }
    };

    debug!(
        flagged = foc.iter().filter(|f| **f).count(),
        total = foc.len(),
        "fog or condensation"
    );
    Ok(foc)
}
