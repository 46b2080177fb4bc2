//! Vertical-gradient layer detection.
//!
//! Layers are strong, localised increases of the backscatter signal. Candidate
//! bases and peaks are taken from the sign changes of the first derivative of the
//! smoothed profile, then filtered against the high-frequency noise level, closed
//! with a top, merged when they overlap and finally kept only when the contrast
//! between peak and base is large enough to be a cloud rather than an aerosol
//! layer.

use serde::Deserialize;

use crate::profiles::signal::{
    gradient, highpass_filtfilt, moving_average, nan_argmax, nan_argmin, snr_at,
};

const SMOOTHING_WINDOW: usize = 10;
const NOISE_WINDOW: usize = 10 * SMOOTHING_WINDOW;
const NOISE_CUTOFF: f64 = 0.3;
const PEAK_SNR_STEP: usize = 10;
const BASE_SEARCH_GATES: usize = 5;

/// A detected layer as indices into the profile. `base <= peak < top`, and the
/// layer covers `[base, top)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    pub base: usize,
    pub peak: usize,
    pub top: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayerParams {
    /// A (base, peak) pair is significant when the smoothed signal rises by more
    /// than `thr_noise` times the noise level at the base.
    pub thr_noise: f64,
    /// Minimum relative increase between base and peak for a cloud.
    pub thr_clouds: f64,
    /// Minimum SNR at the peak.
    pub min_snr: f64,
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            thr_noise: 5.0,
            thr_clouds: 4.0,
            min_snr: 0.0,
        }
    }
}

/// Detects cloud layers in one profile, ignoring candidates below index `imin`.
pub fn detect_layers(data: &[f64], imin: usize, params: &LayerParams) -> Vec<Layer> {
    if data.iter().all(|v| v.is_nan()) {
        return Vec::new();
    }

    let avg = moving_average(data, SMOOTHING_WINDOW);
    let (mut bases, mut peaks) = sign_changes(&avg, imin);
    start_with_base(data, imin, &mut bases, &mut peaks);

    let noise: Vec<f64> = highpass_filtfilt(data, NOISE_CUTOFF)
        .iter()
        .map(|v| v.abs())
        .collect();
    let noise = moving_average(&noise, NOISE_WINDOW);

    // Bases and peaks pair up in order; unmatched trailing candidates are dropped.
    // An undefined noise level keeps the pair.
    let pairs: Vec<(usize, usize)> = bases
        .into_iter()
        .zip(peaks)
        .filter(|&(base, peak)| !(avg[peak] - avg[base] <= params.thr_noise * noise[base]))
        .collect();

    let layers = find_tops(&pairs, &avg);
    let layers = merge_layers(layers, data);

    layers
        .into_iter()
        .map(|layer| Layer {
            peak: layer.base + nan_argmax(&data[layer.base..layer.top]).unwrap_or(0),
            ..layer
        })
        .filter(|layer| {
            let contrast = (avg[layer.peak] - avg[layer.base]) / avg[layer.base];
            contrast.abs() > params.thr_clouds
        })
        .filter(|layer| snr_at(data, layer.peak, PEAK_SNR_STEP) >= params.min_snr)
        .collect()
}

/// Makes the candidate lists start with a base so that they pair up in order.
///
/// A profile starting on a rising slope has its first peak before any base. The
/// base is then looked for among the few gates below that peak, and the peak is
/// dropped when none lies at or above `imin`.
fn start_with_base(data: &[f64], imin: usize, bases: &mut Vec<usize>, peaks: &mut Vec<usize>) {
    while let Some(&first_peak) = peaks.first()
        && bases.first().is_none_or(|&b| b > first_peak)
    {
        let lo = first_peak.saturating_sub(BASE_SEARCH_GATES);
        match nan_argmin(&data[lo..first_peak]).map(|i| lo + i) {
            Some(base) if base >= imin => bases.insert(0, base),
            _ => {
                peaks.remove(0);
            }
        }
    }
}

/// Candidate bases (local minima) and peaks (local maxima) of a smoothed
/// profile at or above `imin`.
fn sign_changes(avg: &[f64], imin: usize) -> (Vec<usize>, Vec<usize>) {
    let sign: Vec<i8> = gradient(avg)
        .into_iter()
        .map(|g| {
            // A flat derivative counts as rising.
            let g = if g == 0.0 { 1e-9 } else { g };
            if g > 0.0 {
                1
            } else if g < 0.0 {
                -1
            } else {
                0
            }
        })
        .collect();

    let mut bases = Vec::new();
    let mut peaks = Vec::new();
    for (i, w) in sign.windows(2).enumerate().skip(imin) {
        match (w[0], w[1]) {
            (-1, 1) => bases.push(i),
            (1, -1) => peaks.push(i),
            _ => {}
        }
    }
    (bases, peaks)
}

/// Closes each (base, peak) pair with the first level above it where the
/// smoothed signal falls back below the base value.
///
/// Pairs are processed in order; a pair whose top was already claimed by an
/// earlier pair, or that never falls back, is dropped.
pub fn find_tops(pairs: &[(usize, usize)], avg: &[f64]) -> Vec<Layer> {
    let mut claimed = vec![false; avg.len()];
    let mut layers = Vec::with_capacity(pairs.len());

    for &(base, peak) in pairs {
        let start = base.max(peak) + 1;
        let Some(top) = (start..avg.len()).find(|&j| avg[j] < avg[base]) else {
            continue;
        };
        if claimed[top] {
            continue;
        }
        claimed[top] = true;
        layers.push(Layer { base, peak, top });
    }
    layers
}

/// Merges layers while the next base lies within the current layer, keeping the
/// lower base, the higher top and the peak with the larger value in `data`.
pub fn merge_layers(mut layers: Vec<Layer>, data: &[f64]) -> Vec<Layer> {
    layers.sort_by_key(|l| l.base);

    while let Some(i) = layers.windows(2).position(|w| w[1].base <= w[0].top) {
        let next = layers.remove(i + 1);
        let current = &mut layers[i];
        // NaN peaks lose against any value.
        if data[next.peak] > data[current.peak] || data[current.peak].is_nan() {
            current.peak = next.peak;
        }
        current.base = current.base.min(next.base);
        current.top = current.top.max(next.top);
    }
    layers
}

/// Boolean mask over `[base, top)` of every layer.
pub fn layer_mask(n: usize, layers: &[Layer]) -> Vec<bool> {
    let mut mask = vec![false; n];
    for layer in layers {
        let top = layer.top.min(n);
        mask[layer.base.min(top)..top].iter_mut().for_each(|m| *m = true);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Square noise of period 4 with a triangular layer peaking at index 110.
    fn single_layer_profile() -> Vec<f64> {
        let pattern = [1.0, 1.0, -1.0, -1.0];
        let mut data: Vec<f64> = (0..300).map(|j| pattern[(j + 1) % 4]).collect();
        for (k, v) in data.iter_mut().enumerate().take(121).skip(100) {
            *v += 10.0 - (k as f64 - 110.0).abs();
        }
        data
    }

    /// Uniform noise in [-1, 1) with a +10 box over indices 100..=120.
    fn noisy_box_profile(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..300)
            .map(|j| {
                let noise = rng.random_range(-1.0..1.0);
                if (100..=120).contains(&j) { noise + 10.0 } else { noise }
            })
            .collect()
    }

    #[test]
    fn test_leading_peak_dropped() {
        let data = vec![1.0; 10];
        let mut bases = vec![2, 5];
        let mut peaks = vec![0, 3, 7];
        start_with_base(&data, 0, &mut bases, &mut peaks);
        assert_eq!(bases, vec![2, 5]);
        assert_eq!(peaks, vec![3, 7]);
    }

    #[test]
    fn test_base_found_below_first_peak() {
        let data = [5.0, 4.0, 1.0, 3.0, 6.0, 2.0, 0.5, 4.0];
        let mut bases = vec![6];
        let mut peaks = vec![4];
        start_with_base(&data, 0, &mut bases, &mut peaks);
        assert_eq!(bases, vec![2, 6]);
        assert_eq!(peaks, vec![4]);

        // The only candidate base lies below imin.
        let mut bases = vec![6];
        let mut peaks = vec![4];
        start_with_base(&data, 3, &mut bases, &mut peaks);
        assert_eq!(bases, vec![6]);
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_noisy_single_layer() {
        for seed in [1, 2, 3, 7, 15, 42] {
            let data = noisy_box_profile(seed);
            let layers = detect_layers(&data, 0, &LayerParams::default());
            assert_eq!(layers.len(), 1, "seed {seed}: {layers:?}");
            let layer = layers[0];
            assert!((80..=100).contains(&layer.base), "seed {seed}: {layer:?}");
            assert!((100..=120).contains(&layer.peak), "seed {seed}: {layer:?}");
            assert!(layer.top > 120, "seed {seed}: {layer:?}");

            // A leading peak at index 0 must not shift the pairing.
            assert_eq!(
                layers,
                detect_layers(&data, 1, &LayerParams::default()),
                "seed {seed}"
            );
        }
    }

    #[test]
    fn test_all_nan_profile() {
        let data = vec![f64::NAN; 50];
        assert!(detect_layers(&data, 0, &LayerParams::default()).is_empty());
    }

    #[test]
    fn test_single_layer_scenario() {
        let data = single_layer_profile();
        let layers = detect_layers(&data, 10, &LayerParams::default());
        assert_eq!(
            layers,
            vec![Layer {
                base: 97,
                peak: 111,
                top: 125
            }]
        );

        let mask = layer_mask(data.len(), &layers);
        assert!(mask[97..125].iter().all(|m| *m));
        assert_eq!(mask.iter().filter(|m| **m).count(), 28);
    }

    #[test]
    fn test_min_snr_rejects_layer() {
        let data = single_layer_profile();
        let params = LayerParams {
            min_snr: 1e3,
            ..LayerParams::default()
        };
        assert!(detect_layers(&data, 10, &params).is_empty());
    }

    #[test]
    fn test_layer_invariants() {
        let data = single_layer_profile();
        for layer in detect_layers(&data, 10, &LayerParams::default()) {
            assert!(layer.base <= layer.peak && layer.peak < layer.top);
        }
    }

    #[test]
    fn test_find_tops_drops_claimed_top() {
        let avg = [5.0, 1.0, 6.0, 2.0, 7.0, 0.0, 9.0, 9.0];
        let layers = find_tops(&[(1, 2), (3, 4)], &avg);
        assert_eq!(
            layers,
            vec![Layer {
                base: 1,
                peak: 2,
                top: 5
            }]
        );
    }

    #[test]
    fn test_find_tops_without_fall_back() {
        let avg = [1.0, 0.0, 3.0, 4.0, 5.0];
        assert!(find_tops(&[(1, 2)], &avg).is_empty());
    }

    #[test]
    fn test_merge_multiple_overlaps() {
        let mut data = vec![0.0; 60];
        data[15] = 3.0;
        data[25] = 8.0;
        data[38] = 5.0;
        let layers = vec![
            Layer {
                base: 20,
                peak: 25,
                top: 40,
            },
            Layer {
                base: 10,
                peak: 15,
                top: 30,
            },
            Layer {
                base: 35,
                peak: 38,
                top: 50,
            },
        ];
        let merged = merge_layers(layers, &data);
        assert_eq!(
            merged,
            vec![Layer {
                base: 10,
                peak: 25,
                top: 50
            }]
        );
        assert_eq!(merge_layers(merged.clone(), &data), merged);
    }

    #[test]
    fn test_merge_keeps_disjoint_layers() {
        let data = vec![1.0; 40];
        let layers = vec![
            Layer {
                base: 2,
                peak: 4,
                top: 8,
            },
            Layer {
                base: 9,
                peak: 12,
                top: 15,
            },
        ];
        assert_eq!(merge_layers(layers.clone(), &data), layers);
    }

    #[test]
    fn test_layer_mask() {
        let layers = [
            Layer {
                base: 1,
                peak: 2,
                top: 3,
            },
            Layer {
                base: 5,
                peak: 5,
                top: 6,
            },
        ];
        assert_eq!(
            layer_mask(7, &layers),
            vec![false, true, true, false, false, true, false]
        );
    }
}
