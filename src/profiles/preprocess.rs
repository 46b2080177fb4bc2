//! Preprocessing of attenuated backscatter time series.
//!
//! Every operation returns a new `ProfilesData`; the input is left untouched.

use serde::Deserialize;
use tracing::debug;

use super::ProfilesData;
use super::signal::{gaussian_smooth, nan_median};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum ExtrapolationMethod {
    #[default]
    #[serde(rename = "cst")]
    Constant,
    #[serde(rename = "lin")]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ExtrapolationOptions {
    /// Altitude AGL (m) below which the signal is replaced.
    pub z: f64,
    #[serde(default)]
    pub method: ExtrapolationMethod,
}

/// Steps applied to the raw signal before detection and retrieval.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    pub extrapolate_below: Option<ExtrapolationOptions>,
    /// Standard deviation (in samples) of a gaussian filter along time and
    /// altitude.
    pub gaussian_filter: Option<f64>,
    pub desaturate_below: Option<f64>,
}

impl PreprocessOptions {
    pub fn apply(&self, profiles: &ProfilesData) -> Result<ProfilesData> {
        let mut out = profiles.clone();
        if let Some(opts) = self.extrapolate_below {
            out = extrapolate_below(&out, opts.z, opts.method)?;
        }
        if let Some(sigma) = self.gaussian_filter {
            out = gaussian_filter(&out, sigma)?;
        }
        if let Some(z) = self.desaturate_below {
            out = desaturate_below(&out, z)?;
        }
        Ok(out)
    }
}

/// Centered rolling median along time. The window spans `minutes` worth of
/// samples (at least one), is truncated at the edges and ignores NaN.
pub fn time_avg(profiles: &ProfilesData, minutes: f64) -> Result<ProfilesData> {
    let Some(dt_s) = profiles.time_resolution() else {
        return Ok(profiles.clone());
    };
    let nt = ((minutes * 60.0 / dt_s).round() as usize).max(1);
    if nt == 1 {
        return Ok(profiles.clone());
    }
    debug!(minutes, samples = nt, "rolling median in time");

    let data = profiles.attenuated_backscatter();
    let n_time = data.len();
    let n_alt = profiles.grid().len();
    let below = nt / 2;
    let above = nt - 1 - below;

    let filtered = (0..n_time)
        .map(|t| {
            let lo = t.saturating_sub(below);
            let hi = (t + above).min(n_time - 1);
            (0..n_alt)
                .map(|z| {
                    let column: Vec<f64> = data[lo..=hi].iter().map(|row| row[z]).collect();
                    nan_median(&column)
                })
                .collect()
        })
        .collect();

    profiles.with_backscatter(filtered)
}

/// Replaces the signal below `z` (m AGL) in every profile.
///
/// Only the constant method is available: each bin below `z` takes the value
/// found at `z`.
pub fn extrapolate_below(
    profiles: &ProfilesData,
    z: f64,
    method: ExtrapolationMethod,
) -> Result<ProfilesData> {
    if method == ExtrapolationMethod::Linear {
        return Err(Error::Unsupported {
            feature: "linear extrapolation of the lowest layers".to_string(),
        });
    }
    let imax = profiles.grid().index_from_agl(z);

    let data = profiles
        .attenuated_backscatter()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            let fill = row[imax];
            row[..imax].iter_mut().for_each(|v| *v = fill);
            row
        })
        .collect();

    profiles.with_backscatter(data)
}

/// 2D gaussian filter, applied along time then along altitude, to reduce high
/// frequency noise. NaN samples spread to their neighbours.
pub fn gaussian_filter(profiles: &ProfilesData, sigma: f64) -> Result<ProfilesData> {
    if !(sigma.is_finite() && sigma >= 0.0) {
        return Err(Error::invalid(format!(
            "gaussian filter sigma must be non-negative, got {sigma}"
        )));
    }
    let data = profiles.attenuated_backscatter();
    let n_alt = profiles.grid().len();

    let mut smoothed: Vec<Vec<f64>> = vec![vec![0.0; n_alt]; data.len()];
    for z in 0..n_alt {
        let column: Vec<f64> = data.iter().map(|row| row[z]).collect();
        for (row, v) in smoothed.iter_mut().zip(gaussian_smooth(&column, sigma)) {
            row[z] = v;
        }
    }
    let smoothed = smoothed
        .iter()
        .map(|row| gaussian_smooth(row, sigma))
        .collect();

    profiles.with_backscatter(smoothed)
}

/// Absolute value of the signal below `z` (m AGL).
pub fn desaturate_below(profiles: &ProfilesData, z: f64) -> Result<ProfilesData> {
    let imax = profiles.grid().index_from_agl(z);

    let data = profiles
        .attenuated_backscatter()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row[..imax].iter_mut().for_each(|v| *v = v.abs());
            row
        })
        .collect();

    profiles.with_backscatter(data)
}
