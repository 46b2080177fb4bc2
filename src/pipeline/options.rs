use serde::Deserialize;

use crate::config::ConfigError;
use crate::detection::{GradientLayerDetector, LayerParams, PblParams};
use crate::retrieval::{Apriori, InversionMethod};

/// Parameters of the extinction retrieval.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InversionOptions {
    pub method: InversionMethod,
    pub apriori: Apriori,
    /// Bottom of the reference search window, m AGL.
    pub zmin: f64,
    /// Top of the reference search window, m AGL.
    pub zmax: f64,
    /// Minimum SNR at the reference level.
    pub min_snr: f64,
    /// Keeps the reference below the lowest cloud base.
    pub under_clouds: bool,
    /// Discards profiles whose AOD falls outside `[aod_min, aod_max]`.
    pub remove_outliers: bool,
    pub aod_min: f64,
    pub aod_max: f64,
    /// Rolling median applied before the inversion, in minutes.
    pub time_avg: f64,
    /// Processes timestamps on the rayon thread pool.
    pub parallel: bool,
}

impl Default for InversionOptions {
    fn default() -> Self {
        Self {
            method: InversionMethod::Forward,
            apriori: Apriori::Lr(50.0),
            zmin: 4000.0,
            zmax: 6000.0,
            min_snr: 0.0,
            under_clouds: false,
            remove_outliers: false,
            aod_min: 0.0,
            aod_max: 2.0,
            time_avg: 1.0,
            parallel: true,
        }
    }
}

impl InversionOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("zmin", self.zmin)?;
        check_non_negative("zmax", self.zmax)?;
        check_non_negative("min_snr", self.min_snr)?;
        check_non_negative("time_avg", self.time_avg)?;
        if self.zmin >= self.zmax {
            return Err(ConfigError::AltitudeRange {
                zmin: self.zmin,
                zmax: self.zmax,
            });
        }
        if self.aod_min.is_nan() || self.aod_max.is_nan() || self.aod_min > self.aod_max {
            return Err(ConfigError::AodBounds {
                min: self.aod_min,
                max: self.aod_max,
            });
        }
        Ok(())
    }
}

/// Parameters of the gradient cloud detection.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CloudOptions {
    pub thr_noise: f64,
    pub thr_clouds: f64,
    /// Altitude AGL (m) above which clouds are searched.
    pub zmin: f64,
    pub min_snr: f64,
    /// Rolling median applied before detection, in minutes.
    pub time_avg: f64,
}

impl Default for CloudOptions {
    fn default() -> Self {
        let params = LayerParams::default();
        Self {
            thr_noise: params.thr_noise,
            thr_clouds: params.thr_clouds,
            zmin: 0.0,
            min_snr: params.min_snr,
            time_avg: 1.0,
        }
    }
}

impl CloudOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("thr_noise", self.thr_noise)?;
        check_non_negative("thr_clouds", self.thr_clouds)?;
        check_non_negative("clouds zmin", self.zmin)?;
        check_non_negative("clouds min_snr", self.min_snr)?;
        check_non_negative("clouds time_avg", self.time_avg)
    }

    pub fn detector(&self) -> GradientLayerDetector {
        GradientLayerDetector {
            params: LayerParams {
                thr_noise: self.thr_noise,
                thr_clouds: self.thr_clouds,
                min_snr: self.min_snr,
            },
            zmin: self.zmin,
            time_avg: self.time_avg,
        }
    }
}

/// Parameters of the boundary layer height detection.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PblOptions {
    /// Bottom of the search range, m AGL.
    pub zmin: f64,
    /// Top of the search range, m AGL.
    pub zmax: f64,
    /// Keeps the PBL height below the lowest cloud base.
    pub under_clouds: bool,
    pub min_snr: f64,
    /// Rolling median applied before detection, in minutes.
    pub time_avg: f64,
}

impl Default for PblOptions {
    fn default() -> Self {
        let params = PblParams::default();
        Self {
            zmin: params.zmin,
            zmax: params.zmax,
            under_clouds: true,
            min_snr: params.min_snr,
            time_avg: params.time_avg,
        }
    }
}

impl PblOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("pbl zmin", self.zmin)?;
        check_non_negative("pbl zmax", self.zmax)?;
        check_non_negative("pbl min_snr", self.min_snr)?;
        check_non_negative("pbl time_avg", self.time_avg)?;
        if self.zmin >= self.zmax {
            return Err(ConfigError::AltitudeRange {
                zmin: self.zmin,
                zmax: self.zmax,
            });
        }
        Ok(())
    }

    pub fn params(&self) -> PblParams {
        PblParams {
            zmin: self.zmin,
            zmax: self.zmax,
            min_snr: self.min_snr,
            time_avg: self.time_avg,
        }
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Parameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inversion_defaults() {
        let opts: InversionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, InversionOptions::default());
        assert_eq!(opts.method, InversionMethod::Forward);
        assert_eq!(opts.apriori, Apriori::Lr(50.0));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_inversion_overrides() {
        let opts: InversionOptions = serde_json::from_str(
            r#"{"method": "backward", "apriori": {"lr": 30.0}, "zmin": 3000.0, "remove_outliers": true}"#,
        )
        .unwrap();
        assert_eq!(opts.method, InversionMethod::Backward);
        assert_eq!(opts.apriori, Apriori::Lr(30.0));
        assert_eq!(opts.zmax, 6000.0);
        assert!(opts.remove_outliers);
    }

    #[test]
    fn test_inversion_validation() {
        let opts = InversionOptions {
            zmin: 6000.0,
            zmax: 4000.0,
            ..InversionOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(ConfigError::AltitudeRange { .. })
        ));

        let opts = InversionOptions {
            aod_min: 1.0,
            aod_max: 0.5,
            ..InversionOptions::default()
        };
        assert!(matches!(opts.validate(), Err(ConfigError::AodBounds { .. })));

        let opts = InversionOptions {
            time_avg: -1.0,
            ..InversionOptions::default()
        };
        assert!(matches!(opts.validate(), Err(ConfigError::Parameter { .. })));
    }

    #[test]
    fn test_cloud_options_detector() {
        let opts: CloudOptions = serde_json::from_str(r#"{"zmin": 300.0}"#).unwrap();
        let detector = opts.detector();
        assert_eq!(detector.zmin, 300.0);
        assert_eq!(detector.params, LayerParams::default());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_pbl_options() {
        let opts: PblOptions = serde_json::from_str(r#"{"zmax": 2000.0}"#).unwrap();
        assert!(opts.under_clouds);
        assert!(opts.validate().is_ok());
        assert_eq!(
            opts.params(),
            PblParams {
                zmax: 2000.0,
                ..PblParams::default()
            }
        );

        let opts = PblOptions {
            zmin: 3000.0,
            ..PblOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(ConfigError::AltitudeRange { .. })
        ));
    }
}
