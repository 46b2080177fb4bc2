use crate::profiles::signal::{moving_average, nan_argmin, nan_max, snr_at};

const SMOOTHING_WINDOW: usize = 3;
const N_AROUND_MIN: usize = 3;
const SNR_STEP: usize = 4;

/// Index of the reference level for the backward inversion.
///
/// The reference is the cleanest (lowest signal) level in `[imin, imax)`: the
/// profile is smoothed, its minimum located, and among the levels within 3 bins
/// of that minimum the one whose raw value is closest to the smoothed one is
/// returned. Returns `None` for an empty window, a profile with no valid sample
/// or an SNR below `min_snr` at the selected level.
pub fn reference_index(data: &[f64], imin: usize, imax: usize, min_snr: f64) -> Option<usize> {
    let imax = imax.min(data.len());
    if imin >= imax {
        return None;
    }

    let ceiling = nan_max(data)?;
    let mut clamped = data.to_vec();
    clamped[..imin].iter_mut().for_each(|v| *v = ceiling);
    clamped[imax..].iter_mut().for_each(|v| *v = ceiling);

    let avg = moving_average(&clamped, SMOOTHING_WINDOW);
    let ilow = nan_argmin(&avg)?;

    let lo = ilow.saturating_sub(N_AROUND_MIN).max(imin);
    let hi = (ilow + N_AROUND_MIN + 1).min(imax);
    let distance: Vec<f64> = (lo..hi).map(|i| (clamped[i] - avg[i]).abs()).collect();
    let iref = lo + nan_argmin(&distance)?;

    if snr_at(data, iref, SNR_STEP) < min_snr {
        return None;
    }
    Some(iref)
}
