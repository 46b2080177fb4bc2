use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use super::options::{InversionOptions, PblOptions};
use super::output::{Attributes, RetrievalOutput, RetrievalStats, Variable};
use crate::atmosphere::MolecularProfile;
use crate::detection::{
    FocMethod, LayerDetectionStrategy, detect_foc, detect_pbl, lowest_cloud_base,
};
use crate::error::Result;
use crate::profiles::{ProfilesData, preprocess};
use crate::retrieval::{InversionMethod, InversionResult, invert, reference_index};

type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Runs cloud detection and the extinction retrieval over a time series.
pub struct ProfileOrchestrator {
    options: InversionOptions,
    detector: Option<Box<dyn LayerDetectionStrategy>>,
    foc: Option<FocMethod>,
    pbl: Option<PblOptions>,
    progress: Option<Box<ProgressFn>>,
}

/// Retrieval of one timestamp after outlier screening.
struct ProfileOutcome {
    result: InversionResult,
    outlier: bool,
}

impl ProfileOrchestrator {
    pub fn new(options: InversionOptions) -> Self {
        Self {
            options,
            detector: None,
            foc: None,
            pbl: None,
            progress: None,
        }
    }

    /// Detects clouds with `detector` before the retrieval. The cloud mask is
    /// part of the output and bounds the reference search when `under_clouds`
    /// is set.
    pub fn with_detector(mut self, detector: impl LayerDetectionStrategy + 'static) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    /// Flags fog or condensation on the window. The cloud base method falls
    /// back on the detector mask when the data carry no cloud base heights.
    pub fn with_foc(mut self, method: FocMethod) -> Self {
        self.foc = Some(method);
        self
    }

    /// Detects the boundary layer height, below the lowest cloud base when
    /// `under_clouds` is set.
    pub fn with_pbl(mut self, options: PblOptions) -> Self {
        self.pbl = Some(options);
        self
    }

    /// Called with `(done, total)` after each processed timestamp.
    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn options(&self) -> &InversionOptions {
        &self.options
    }

    pub fn run(&self, profiles: &ProfilesData) -> Result<RetrievalOutput> {
        let opts = &self.options;
        opts.validate()?;
        opts.apriori.lidar_ratio()?;

        let grid = profiles.grid();
        let clouds = match &self.detector {
            Some(detector) => Some(detector.cloud_mask(profiles)?),
            None => None,
        };
        let bases = cloud_bases(profiles, clouds.as_deref());
        let lowest_clouds = self.lowest_clouds(profiles, bases.as_deref());
        let foc = match self.foc {
            Some(method) => Some(foc_flags(profiles, method, bases.as_deref())?),
            None => None,
        };
        let pbl = match &self.pbl {
            Some(pbl_opts) => Some(self.pbl_heights(profiles, pbl_opts, bases.as_deref())?),
            None => None,
        };

        let averaged = preprocess::time_avg(profiles, opts.time_avg)?;
        let molecular = MolecularProfile::standard(grid, profiles.wavelength())?;
        let scale = profiles.units().to_si();
        let dz = grid.resolution();
        let imin = grid.index_from_agl(opts.zmin);
        let total = profiles.n_time();
        let done = AtomicUsize::new(0);

        let process = |i: usize| -> Result<ProfileOutcome> {
            let raw = averaged.profile(i);
            let calibrated: Vec<f64> = raw.iter().map(|v| v * scale).collect();

            let cloud_agl = lowest_clouds[i] - grid.station_altitude();
            let ztop = if cloud_agl < opts.zmax { cloud_agl } else { opts.zmax };
            let imax = grid.index_from_agl(ztop);
            let iref = match opts.method {
                InversionMethod::Backward => reference_index(raw, imin, imax, opts.min_snr),
                InversionMethod::Forward => Some(imax),
            };

            let mut result = invert(&calibrated, iref, opts.method, opts.apriori, &molecular, dz)?;
            let outlier = opts.remove_outliers
                && result.valid
                && (result.aod < opts.aod_min || result.aod > opts.aod_max);
            if outlier {
                debug!(time = %profiles.time()[i], aod = result.aod, "outlier discarded");
                result.extinction.iter_mut().for_each(|e| *e = f64::NAN);
                result.aod = f64::NAN;
                result.lidar_ratio = f64::NAN;
            }
            if result.iref.is_none() {
                debug!(time = %profiles.time()[i], "no reference level");
            }

            let count = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(progress) = &self.progress {
                progress(count, total);
            }
            Ok(ProfileOutcome { result, outlier })
        };

        let outcomes: Vec<ProfileOutcome> = if opts.parallel {
            (0..total).into_par_iter().map(process).collect::<Result<_>>()?
        } else {
            (0..total).map(process).collect::<Result<_>>()?
        };

        let output = self.assemble(profiles, outcomes, clouds, foc, pbl);
        info!(
            profiles = output.stats.profiles,
            retrieved = output.stats.retrieved,
            no_reference = output.stats.no_reference,
            outliers = output.stats.outliers,
            non_converged_bins = output.stats.non_converged_bins,
            "extinction retrieval done"
        );
        Ok(output)
    }

    /// Altitude (m ASL) of the lowest cloud base per timestamp, NaN when the
    /// search is not bounded by clouds.
    fn lowest_clouds(&self, profiles: &ProfilesData, bases: Option<&[f64]>) -> Vec<f64> {
        let n = profiles.n_time();
        if !self.options.under_clouds {
            return vec![f64::NAN; n];
        }
        match bases {
            Some(bases) => bases.to_vec(),
            None => {
                warn!("under_clouds is set but no cloud information is available");
                vec![f64::NAN; n]
            }
        }
    }

    fn pbl_heights(
        &self,
        profiles: &ProfilesData,
        pbl_opts: &PblOptions,
        bases: Option<&[f64]>,
    ) -> Result<Variable<Vec<f64>>> {
        let bound = if pbl_opts.under_clouds {
            if bases.is_none() {
                warn!("pbl under_clouds is set but no cloud information is available");
            }
            bases
        } else {
            None
        };
        let heights = detect_pbl(profiles, &pbl_opts.params(), bound)?;

        let attrs = Attributes::new("Planetary Boundary Layer Height, ASL", "m")
            .with("time_avg", pbl_opts.time_avg)
            .with("zmin", pbl_opts.zmin)
            .with("zmax", pbl_opts.zmax)
            .with("min_snr", pbl_opts.min_snr);
        Ok(Variable::new(heights, attrs))
    }

    fn assemble(
        &self,
        profiles: &ProfilesData,
        outcomes: Vec<ProfileOutcome>,
        clouds: Option<Vec<Vec<bool>>>,
        foc: Option<Vec<bool>>,
        pbl: Option<Variable<Vec<f64>>>,
    ) -> RetrievalOutput {
        let opts = &self.options;
        let grid = profiles.grid();
        let wavelength = profiles.wavelength();

        let mut stats = RetrievalStats {
            profiles: outcomes.len(),
            ..RetrievalStats::default()
        };
        let mut extinction = Vec::with_capacity(outcomes.len());
        let mut aod = Vec::with_capacity(outcomes.len());
        let mut lidar_ratio = Vec::with_capacity(outcomes.len());
        let mut z_ref = Vec::with_capacity(outcomes.len());

        for ProfileOutcome { result, outlier } in outcomes {
            if result.iref.is_none() {
                stats.no_reference += 1;
            }
            if outlier {
                stats.outliers += 1;
            } else if result.valid {
                stats.retrieved += 1;
            }
            stats.non_converged_bins += result.non_converged();

            z_ref.push(result.iref.map_or(f64::NAN, |i| grid.altitude()[i]));
            aod.push(result.aod);
            lidar_ratio.push(result.lidar_ratio);
            extinction.push(result.extinction);
        }

        let extinction_attrs = Attributes::new(
            format!("Extinction Coefficient @ {wavelength} nm"),
            "m-1",
        )
        .with("method", opts.method.to_string())
        .with("time_avg", opts.time_avg)
        .with("zmin", opts.zmin)
        .with("zmax", opts.zmax)
        .with("apriori_variable", opts.apriori.name())
        .with("apriori_value", opts.apriori.value());

        RetrievalOutput {
            time: profiles.time().to_vec(),
            altitude: grid.altitude().to_vec(),
            station_altitude: grid.station_altitude(),
            wavelength,
            extinction: Variable::new(extinction, extinction_attrs),
            aod: Variable::new(
                aod,
                Attributes::new(format!("Aerosol Optical Depth @ {wavelength} nm"), ""),
            ),
            lidar_ratio: Variable::new(
                lidar_ratio,
                Attributes::new(format!("Lidar Ratio @ {wavelength} nm"), "sr"),
            ),
            z_ref: Variable::new(z_ref, Attributes::new("Reference altitude ASL", "m")),
            clouds: clouds.map(|mask| Variable::new(mask, Attributes::new("Cloud mask", ""))),
            foc: foc.map(|flags| {
                Variable::new(flags, Attributes::new("Fog or condensation mask", ""))
            }),
            pbl,
            stats,
        }
    }
}

/// Lowest cloud base (m ASL) per timestamp, from the detector mask or else from
/// the cloud base heights carried by the data.
fn cloud_bases(profiles: &ProfilesData, clouds: Option<&[Vec<bool>]>) -> Option<Vec<f64>> {
    match clouds {
        Some(mask) => Some(
            mask.iter()
                .map(|row| lowest_cloud_base(row, profiles.grid()))
                .collect(),
        ),
        None => profiles.cloud_base_height().map(<[f64]>::to_vec),
    }
}

/// The cloud base method falls back on `bases` when the data carry no cloud
/// base heights.
fn foc_flags(
    profiles: &ProfilesData,
    method: FocMethod,
    bases: Option<&[f64]>,
) -> Result<Vec<bool>> {
    match (method, profiles.cloud_base_height(), bases) {
        (FocMethod::CloudBase { .. }, None, Some(bases)) => detect_foc(
            &profiles.clone().with_cloud_base_height(bases.to_vec())?,
            method,
        ),
        _ => detect_foc(profiles, method),
    }
}
