use tracing::info;

use crate::pipeline::RetrievalOutput;

/// Minimum, maximum and mean of the finite values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid: usize,
    pub total: usize,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let mean = if finite.is_empty() {
            f64::NAN
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        let (min, max) = if finite.is_empty() {
            (f64::NAN, f64::NAN)
        } else {
            (
                finite.iter().copied().fold(f64::INFINITY, f64::min),
                finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };
        Self {
            min,
            max,
            mean,
            valid: finite.len(),
            total: values.len(),
        }
    }

    pub fn valid_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.valid as f64 / self.total as f64
        }
    }
}

pub fn log_retrieval_summary(label: &str, output: &RetrievalOutput) {
    let aod = Summary::of(&output.aod.data);
    let z_ref = Summary::of(&output.z_ref.data);
    info!(
        label,
        profiles = aod.total,
        valid = aod.valid,
        valid_pct = format_args!("{:.1}", 100.0 * aod.valid_fraction()),
        aod_min = format_args!("{:.3}", aod.min),
        aod_max = format_args!("{:.3}", aod.max),
        aod_mean = format_args!("{:.3}", aod.mean),
        z_ref_mean = format_args!("{:.0}", z_ref.mean),
        "retrieval summary"
    );
    if let Some(pbl) = &output.pbl {
        let pbl = Summary::of(&pbl.data);
        info!(
            label,
            found = pbl.valid,
            pbl_mean = format_args!("{:.0}", pbl.mean),
            "boundary layer summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_ignores_nan() {
        let summary = Summary::of(&[0.1, f64::NAN, 0.3, f64::INFINITY]);
        assert_eq!(summary.min, 0.1);
        assert_eq!(summary.max, 0.3);
        assert!((summary.mean - 0.2).abs() < 1e-12);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.valid_fraction(), 0.5);
    }

    #[test]
    fn test_summary_of_empty() {
        let summary = Summary::of(&[f64::NAN]);
        assert!(summary.mean.is_nan() && summary.min.is_nan());
        assert_eq!(summary.valid_fraction(), 0.0);
        assert_eq!(Summary::of(&[]).valid_fraction(), 0.0);
    }
}
