//! Planetary boundary layer (PBL) height.
//!
//! The top of the boundary layer is the strongest decrease of the smoothed
//! signal between two altitudes, kept only where the signal stands out of the
//! noise.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::profiles::signal::{gradient, moving_average, nan_argmin, snr_at};
use crate::profiles::{ProfilesData, preprocess};

const SMOOTHING_WINDOW: usize = 10;
const SNR_STEP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PblParams {
    /// Bottom of the search range, m AGL.
    pub zmin: f64,
    /// Top of the search range, m AGL.
    pub zmax: f64,
    /// The SNR at the PBL height must exceed this value.
    pub min_snr: f64,
    /// Rolling median applied before detection, in minutes.
    pub time_avg: f64,
}

impl Default for PblParams {
    fn default() -> Self {
        Self {
            zmin: 100.0,
            zmax: 3000.0,
            min_snr: 1.0,
            time_avg: 1.0,
        }
    }
}

/// Index of the PBL height in `[imin, imax)`, or `None` for an empty range, an
/// all-NaN profile or an SNR not above `min_snr`.
pub fn pbl_index(data: &[f64], imin: usize, imax: usize, min_snr: f64) -> Option<usize> {
    if data.iter().all(|v| v.is_nan()) {
        return None;
    }
    let imax = imax.min(data.len());
    if imin >= imax {
        return None;
    }

    let slope = gradient(&moving_average(data, SMOOTHING_WINDOW));
    let ipbl = imin + nan_argmin(&slope[imin..imax])?;
    (snr_at(data, ipbl, SNR_STEP) > min_snr).then_some(ipbl)
}

/// PBL height (m ASL) of every profile, NaN where none is found.
///
/// `cloud_bases` holds the lowest cloud base (m ASL, NaN when clear) of each
/// profile and lowers the top of the search range below it.
pub fn detect_pbl(
    profiles: &ProfilesData,
    params: &PblParams,
    cloud_bases: Option<&[f64]>,
) -> Result<Vec<f64>> {
    if let Some(bases) = cloud_bases
        && bases.len() != profiles.n_time()
    {
        return Err(Error::ShapeMismatch {
            what: "cloud bases".to_string(),
            expected: profiles.n_time(),
            actual: bases.len(),
        });
    }

    let averaged = preprocess::time_avg(profiles, params.time_avg)?;
    let grid = profiles.grid();
    let imin = grid.index_from_agl(params.zmin);

    let pbl: Vec<f64> = averaged
        .attenuated_backscatter()
        .par_iter()
        .enumerate()
        .map(|(i, row)| {
            let cloud_agl = cloud_bases.map_or(f64::NAN, |b| b[i] - grid.station_altitude());
            let ztop = if cloud_agl < params.zmax { cloud_agl } else { params.zmax };
            let imax = grid.index_from_agl(ztop);
            pbl_index(row, imin, imax, params.min_snr).map_or(f64::NAN, |k| grid.altitude()[k])
        })
        .collect();

    debug!(
        found = pbl.iter().filter(|z| z.is_finite()).count(),
        total = pbl.len(),
        "boundary layer detection"
    );
    Ok(pbl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::{AltitudeGrid, BackscatterUnits};
    use chrono::NaiveDate;

    /// Well-mixed layer of value 10 up to index 50 over a clean free troposphere.
    fn mixed_layer() -> Vec<f64> {
        (0..200)
            .map(|i| if i < 50 { 10.0 } else { 1.0 + 0.001 * i as f64 })
            .collect()
    }

    /// A residual layer (7) above a shallow surface layer (10).
    fn residual_layer() -> Vec<f64> {
        (0..200)
            .map(|i| match i {
                0..20 => 10.0,
                20..50 => 7.0,
                _ => 1.0 + 0.001 * i as f64,
            })
            .collect()
    }

    fn profiles_with(rows: Vec<Vec<f64>>, station: f64) -> ProfilesData {
        let n_alt = rows[0].len();
        let t0 = NaiveDate::from_ymd_opt(2021, 9, 9)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let time = (0..rows.len() as i64)
            .map(|i| t0 + chrono::Duration::minutes(5 * i))
            .collect();
        let grid = AltitudeGrid::new(
            (1..=n_alt).map(|i| station + 15.0 * i as f64).collect(),
            station,
        )
        .unwrap();
        ProfilesData::new(time, grid, 1064.0, BackscatterUnits::PerMeterSr, rows).unwrap()
    }

    #[test]
    fn test_pbl_at_strongest_decrease() {
        let ipbl = pbl_index(&mixed_layer(), 5, 150, 0.0).unwrap();
        assert!((44..=55).contains(&ipbl), "{ipbl}");
    }

    #[test]
    fn test_pbl_rejected() {
        let data = mixed_layer();
        assert_eq!(pbl_index(&data, 5, 150, 1e3), None);
        assert_eq!(pbl_index(&data, 60, 60, 0.0), None);
        assert_eq!(pbl_index(&[f64::NAN; 20], 0, 20, 0.0), None);
    }

    #[test]
    fn test_pbl_search_range() {
        let data = residual_layer();
        assert!((44..=55).contains(&pbl_index(&data, 5, 150, 0.0).unwrap()));
        let ipbl = pbl_index(&data, 5, 30, 0.0).unwrap();
        assert!((14..=25).contains(&ipbl), "{ipbl}");
        // The window reaches past the end of the profile.
        assert!(pbl_index(&data, 5, 1000, 0.0).is_some());
    }

    #[test]
    fn test_detect_pbl_below_clouds() {
        let profiles = profiles_with(vec![residual_layer(), residual_layer()], 100.0);
        let params = PblParams {
            zmin: 30.0,
            min_snr: 0.0,
            ..PblParams::default()
        };

        let pbl = detect_pbl(&profiles, &params, None).unwrap();
        // Index 44..=55 is 675..=840 m AGL.
        for z in &pbl {
            assert!((775.0..=940.0).contains(z), "{z}");
        }

        // A cloud at 400 m AGL in the second profile only.
        let bases = [f64::NAN, 500.0];
        let pbl = detect_pbl(&profiles, &params, Some(&bases)).unwrap();
        assert!((775.0..=940.0).contains(&pbl[0]));
        assert!((325.0..=490.0).contains(&pbl[1]), "{}", pbl[1]);

        assert!(matches!(
            detect_pbl(&profiles, &params, Some(&[500.0])),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
