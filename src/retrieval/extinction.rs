//! Aerosol extinction retrieval from attenuated backscatter.
//!
//! Two solvers share the same inputs: a calibrated profile (m-1.sr-1), the
//! index of the highest level to retrieve, a lidar ratio and the molecular
//! profile of the same grid.
//!
//! - The backward method (Klett, 1985) integrates the lidar equation
//!   analytically from an aerosol-free reference level down to the ground.
//! - The forward method (Li et al., 2021) solves each level from the ground up,
//!   iterating on the aerosol transmission until the extinction stabilises.
//!
//! Both return extinction in m-1 below the reference index and NaN elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::atmosphere::MolecularProfile;
use crate::atmosphere::constants::MOLECULAR_LIDAR_RATIO;
use crate::error::{Error, Result};

const MAX_ITERATIONS: usize = 30;
const CONVERGENCE_THRESHOLD: f64 = 0.01;

/// A priori constraint of the inversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Apriori {
    /// Lidar ratio, in sr.
    Lr(f64),
    /// Aerosol optical depth. Parsed but not supported by the solvers.
    Aod(f64),
}

impl Default for Apriori {
    fn default() -> Self {
        Apriori::Lr(50.0)
    }
}

impl Apriori {
    /// Lidar ratio to use, rejecting the AOD constraint.
    pub fn lidar_ratio(&self) -> Result<f64> {
        match *self {
            Apriori::Lr(lr) if lr.is_finite() && lr > 0.0 => Ok(lr),
            Apriori::Lr(lr) => Err(Error::invalid(format!(
                "lidar ratio must be positive, got {lr}"
            ))),
            Apriori::Aod(_) => Err(Error::UnsupportedApriori),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Apriori::Lr(_) => "lr",
            Apriori::Aod(_) => "aod",
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Apriori::Lr(v) | Apriori::Aod(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InversionMethod {
    Backward,
    #[default]
    Forward,
}

impl fmt::Display for InversionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InversionMethod::Backward => write!(f, "Backward Klett"),
            InversionMethod::Forward => write!(f, "Forward"),
        }
    }
}

/// Outcome of the forward solver.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardSolution {
    pub extinction: Vec<f64>,
    /// Iterations spent on each level, 0 above the reference.
    pub iterations: Vec<usize>,
    /// Whether each level met the convergence threshold.
    pub converged: Vec<bool>,
}

impl ForwardSolution {
    /// Levels with a finite extinction that hit the iteration cap.
    pub fn non_converged(&self) -> usize {
        self.extinction
            .iter()
            .zip(&self.converged)
            .filter(|(e, c)| e.is_finite() && !**c)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InversionResult {
    /// m-1
    pub extinction: Vec<f64>,
    pub aod: f64,
    pub lidar_ratio: f64,
    pub iref: Option<usize>,
    /// False when no extinction could be retrieved.
    pub valid: bool,
    /// Per-level diagnostics of the forward solver.
    pub forward: Option<ForwardSolution>,
}

impl InversionResult {
    fn empty(n: usize, lidar_ratio: f64, iref: Option<usize>) -> Self {
        Self {
            extinction: vec![f64::NAN; n],
            aod: f64::NAN,
            lidar_ratio,
            iref,
            valid: false,
            forward: None,
        }
    }

    pub fn non_converged(&self) -> usize {
        self.forward.as_ref().map_or(0, ForwardSolution::non_converged)
    }
}

/// Retrieves the extinction of `data` up to `iref` with the given method.
///
/// `dz` is the vertical resolution in m. Without a reference index the result
/// is all NaN and flagged invalid.
pub fn invert(
    data: &[f64],
    iref: Option<usize>,
    method: InversionMethod,
    apriori: Apriori,
    molecular: &MolecularProfile,
    dz: f64,
) -> Result<InversionResult> {
    let lidar_ratio = apriori.lidar_ratio()?;
    if data.len() != molecular.backscatter().len() {
        return Err(Error::ShapeMismatch {
            what: "profile and molecular profile".to_string(),
            expected: molecular.backscatter().len(),
            actual: data.len(),
        });
    }

    let Some(iref) = iref.filter(|i| *i < data.len()) else {
        return Ok(InversionResult::empty(data.len(), lidar_ratio, None));
    };

    let (extinction, forward) = match method {
        InversionMethod::Backward => {
            match backward_inversion(data, iref, lidar_ratio, molecular, dz) {
                Some(extinction) => (extinction, None),
                None => {
                    warn!(
                        iref,
                        value = data[iref],
                        "invalid signal at the reference level, profile skipped"
                    );
                    return Ok(InversionResult::empty(data.len(), lidar_ratio, Some(iref)));
                }
            }
        }
        InversionMethod::Forward => {
            let solution = forward_inversion(data, iref, lidar_ratio, molecular, dz);
            (solution.extinction.clone(), Some(solution))
        }
    };

    let aod = aod(&extinction, dz);
    Ok(InversionResult {
        extinction,
        aod,
        lidar_ratio,
        iref: Some(iref),
        valid: aod.is_finite(),
        forward,
    })
}

/// Klett backward inversion assuming no aerosol at `iref`.
///
/// Returns `None` when the signal at `iref` is not strictly positive.
pub fn backward_inversion(
    data: &[f64],
    iref: usize,
    lidar_ratio: f64,
    molecular: &MolecularProfile,
    dz: f64,
) -> Option<Vec<f64>> {
    let reference = *data.get(iref)?;
    if reference.is_nan() || reference <= 0.0 {
        return None;
    }
    let bm = molecular.backscatter();

    // Molecular correction integrated from each level up to the reference.
    let int1: Vec<f64> = bm[..iref]
        .iter()
        .scan(0.0, |acc, b| {
            *acc += (lidar_ratio - MOLECULAR_LIDAR_RATIO) * b * dz;
            Some(*acc)
        })
        .collect();
    let int1_top = int1.last().copied().unwrap_or(0.0);

    let phi: Vec<f64> = (0..iref)
        .map(|i| (data[i] / reference).abs().ln() + 2.0 * (int1_top - int1[i]))
        .collect();

    let int2: Vec<f64> = phi
        .iter()
        .scan(0.0, |acc, p| {
            let term = 2.0 * lidar_ratio * p.exp() * dz;
            if !term.is_nan() {
                *acc += term;
            }
            Some(*acc)
        })
        .collect();
    let int2_top = int2.last().copied().unwrap_or(0.0);

    let mut extinction = vec![f64::NAN; data.len()];
    for i in 0..iref {
        let beta_tot = phi[i].exp() / (1.0 / bm[iref] + int2_top - int2[i]);
        extinction[i] = lidar_ratio * (beta_tot - bm[i]);
    }
    Some(extinction)
}

/// Forward iterative inversion from the ground up to `iref` (excluded).
pub fn forward_inversion(
    data: &[f64],
    iref: usize,
    lidar_ratio: f64,
    molecular: &MolecularProfile,
    dz: f64,
) -> ForwardSolution {
    let n = data.len();
    let iref = iref.min(n);
    let bm = molecular.backscatter();

    let tm: Vec<f64> = molecular
        .extinction()
        .iter()
        .scan(0.0, |acc, e| {
            *acc += e * dz;
            Some((-*acc).exp())
        })
        .collect();

    let mut extinction = vec![f64::NAN; n];
    let mut iterations = vec![0; n];
    let mut converged = vec![false; n];
    // Aerosol optical depth of the levels already solved.
    let mut solved = 0.0;

    for i in 0..iref {
        let mut current = f64::NAN;
        for iteration in 1..=MAX_ITERATIONS {
            let ta = if current.is_nan() {
                1.0
            } else {
                (-(solved + current * dz)).exp()
            };
            let attenuation = (tm[i] * ta).powi(2);
            let beta_aer = if attenuation != 0.0 {
                data[i] / attenuation - bm[i]
            } else {
                f64::NAN
            };
            let next = lidar_ratio * beta_aer;
            iterations[i] = iteration;

            let done = (next - current).abs() <= CONVERGENCE_THRESHOLD * current.abs();
            current = next;
            if done {
                converged[i] = true;
                break;
            }
            if current.is_nan() {
                break;
            }
        }
        extinction[i] = current;
        if current.is_finite() {
            solved += current * dz;
        }
    }

    ForwardSolution {
        extinction,
        iterations,
        converged,
    }
}

/// Aerosol optical depth: sum of the finite extinction times `dz`. NaN when no
/// level is finite.
pub fn aod(extinction: &[f64], dz: f64) -> f64 {
    let finite: Vec<f64> = extinction
        .iter()
        .copied()
        .filter(|e| e.is_finite())
        .collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() * dz
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::AltitudeGrid;
    use crate::simulation::{ExtinctionModel, attenuated_backscatter};
    use approx::assert_abs_diff_eq;

    fn setup() -> (AltitudeGrid, MolecularProfile, Vec<f64>, Vec<f64>) {
        let grid = AltitudeGrid::new((1..=400).map(|i| 15.0 * i as f64).collect(), 0.0).unwrap();
        let molecular = MolecularProfile::standard(&grid, 1064.0).unwrap();
        let extinction = ExtinctionModel::Step.extinction(grid.altitude());
        let data = attenuated_backscatter(&extinction, 50.0, &molecular, grid.resolution());
        (grid, molecular, extinction, data)
    }

    #[test]
    fn test_backward_recovers_step_profile() {
        let (grid, molecular, truth, data) = setup();
        let iref = 299;
        let ext = backward_inversion(&data, iref, 50.0, &molecular, grid.resolution()).unwrap();
        for i in 0..iref {
            assert_abs_diff_eq!(ext[i], truth[i], epsilon = 1e-6);
        }
        assert!(ext[iref..].iter().all(|e| e.is_nan()));
    }

    #[test]
    fn test_forward_recovers_step_profile() {
        let (grid, molecular, truth, data) = setup();
        let solution = forward_inversion(&data, 299, 50.0, &molecular, grid.resolution());
        for i in 0..299 {
            assert_abs_diff_eq!(solution.extinction[i], truth[i], epsilon = 1e-7);
            assert!(solution.converged[i]);
            assert!(solution.iterations[i] <= MAX_ITERATIONS);
        }
        assert_eq!(solution.non_converged(), 0);
        assert_abs_diff_eq!(aod(&solution.extinction, grid.resolution()), 0.2985, epsilon = 1e-4);
    }

    #[test]
    fn test_forward_finite_count() {
        let grid = AltitudeGrid::new((1..=200).map(|i| 15.0 * i as f64).collect(), 0.0).unwrap();
        let molecular = MolecularProfile::standard(&grid, 910.0).unwrap();
        let data: Vec<f64> = molecular.backscatter().iter().map(|b| 2.0 * b).collect();
        let solution = forward_inversion(&data, 50, 50.0, &molecular, grid.resolution());
        assert_eq!(solution.extinction.iter().filter(|e| e.is_finite()).count(), 50);
    }

    #[test]
    fn test_backward_rejects_invalid_reference_signal() {
        let (grid, molecular, _, mut data) = setup();
        data[299] = 0.0;
        assert!(backward_inversion(&data, 299, 50.0, &molecular, grid.resolution()).is_none());

        let result = invert(
            &data,
            Some(299),
            InversionMethod::Backward,
            Apriori::Lr(50.0),
            &molecular,
            grid.resolution(),
        )
        .unwrap();
        assert!(!result.valid);
        assert!(result.extinction.iter().all(|e| e.is_nan()));
    }

    #[test]
    fn test_invert_without_reference() {
        let (grid, molecular, _, data) = setup();
        let result = invert(
            &data,
            None,
            InversionMethod::Forward,
            Apriori::default(),
            &molecular,
            grid.resolution(),
        )
        .unwrap();
        assert!(!result.valid);
        assert!(result.aod.is_nan());
        assert!(result.extinction.iter().all(|e| e.is_nan()));
    }

    #[test]
    fn test_aod_apriori_rejected() {
        let (grid, molecular, _, data) = setup();
        let result = invert(
            &data,
            Some(100),
            InversionMethod::Backward,
            Apriori::Aod(0.1),
            &molecular,
            grid.resolution(),
        );
        assert!(matches!(result, Err(Error::UnsupportedApriori)));
    }

    #[test]
    fn test_apriori_serde() {
        let lr: Apriori = serde_json::from_str(r#"{"lr": 40.0}"#).unwrap();
        assert_eq!(lr, Apriori::Lr(40.0));
        let aod: Apriori = serde_json::from_str(r#"{"aod": 0.2}"#).unwrap();
        assert!(matches!(aod.lidar_ratio(), Err(Error::UnsupportedApriori)));
        assert!(Apriori::Lr(-1.0).lidar_ratio().is_err());
    }

    #[test]
    fn test_aod_non_negative_and_nan_aware() {
        let ext = [1e-4, f64::NAN, 2e-4, 0.0];
        assert_abs_diff_eq!(aod(&ext, 15.0), 4.5e-3, epsilon = 1e-12);
        assert!(aod(&[f64::NAN; 3], 15.0).is_nan());
    }
}
