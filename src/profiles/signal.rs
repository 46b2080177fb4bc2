//! 1D signal helpers shared by the detection and retrieval modules.
//!
//! All helpers take a profile as a slice and return freshly allocated vectors.
//! Missing samples are NaN.

/// Maps an out-of-range index back into `0..n`, mirroring about the edges with
/// the edge sample repeated (`d c b a | a b c d | d c b a`).
fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m < n { m as usize } else { (period - 1 - m) as usize }
}

/// Moving average over `size` samples with reflected boundaries.
///
/// For even sizes the window extends one sample further below the current index
/// (`i - size/2 ..= i + size/2 - 1`). NaN samples propagate into every window they
/// touch.
pub fn moving_average(data: &[f64], size: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || size <= 1 {
        return data.to_vec();
    }
    let below = (size / 2) as isize;
    let above = (size - 1) as isize - below;

    (0..n as isize)
        .map(|i| {
            let sum: f64 = (i - below..=i + above)
                .map(|j| data[reflect_index(j, n)])
                .sum();
            sum / size as f64
        })
        .collect()
}

/// Gaussian smoothing with standard deviation `sigma` (in samples), reflected
/// boundaries and a kernel truncated at four standard deviations.
pub fn gaussian_smooth(data: &[f64], sigma: f64) -> Vec<f64> {
    let n = data.len();
    if n == 0 || sigma.is_nan() || sigma <= 0.0 {
        return data.to_vec();
    }
    let radius = (4.0 * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    (0..n as isize)
        .map(|i| {
            (-radius..=radius)
                .zip(&weights)
                .map(|(k, w)| w * data[reflect_index(i + k, n)])
                .sum::<f64>()
                / total
        })
        .collect()
}

/// First derivative with central differences inside the profile and one-sided
/// differences at both ends.
pub fn gradient(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    data[1] - data[0]
                } else if i == n - 1 {
                    data[n - 1] - data[n - 2]
                } else {
                    (data[i + 1] - data[i - 1]) / 2.0
                }
            })
            .collect(),
    }
}

/// First-order Butterworth high-pass coefficients `(b, a)` for a cutoff given as
/// a fraction of the Nyquist frequency.
fn butter_highpass(cutoff: f64) -> ([f64; 2], [f64; 2]) {
    let k = (std::f64::consts::PI * cutoff / 2.0).tan();
    let norm = 1.0 / (1.0 + k);
    ([norm, -norm], [1.0, (k - 1.0) * norm])
}

fn lfilter(b: &[f64; 2], a: &[f64; 2], x: &[f64], z0: f64) -> Vec<f64> {
    let mut z = z0;
    x.iter()
        .map(|&xn| {
            let y = b[0] * xn + z;
            z = b[1] * xn - a[1] * y;
            y
        })
        .collect()
}

/// Zero-phase first-order high-pass filter (forward then backward pass) with odd
/// extension of the edges and steady-state initial conditions.
pub fn highpass_filtfilt(data: &[f64], cutoff: f64) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let (b, a) = butter_highpass(cutoff);
    let zi = (b[1] - a[1] * b[0]) / (1.0 + a[1]);
    let padlen = 6.min(n - 1);

    let first = data[0];
    let last = data[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    ext.extend((1..=padlen).rev().map(|k| 2.0 * first - data[k]));
    ext.extend_from_slice(data);
    ext.extend((1..=padlen).map(|k| 2.0 * last - data[n - 1 - k]));

    let mut forward = lfilter(&b, &a, &ext, zi * ext[0]);
    forward.reverse();
    let mut backward = lfilter(&b, &a, &forward, zi * forward[0]);
    backward.reverse();

    backward[padlen..padlen + n].to_vec()
}

/// Signal-to-noise ratio (mean / standard deviation) over `iz ± step`.
///
/// Out-of-range indices and NaN samples are ignored. Returns 0 when the window
/// holds no valid sample or has zero spread.
pub fn snr_at(data: &[f64], iz: usize, step: usize) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let lo = iz.saturating_sub(step);
    let hi = (iz + step).min(data.len() - 1);
    let values: Vec<f64> = data[lo..=hi]
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let std = var.sqrt();
    if std == 0.0 { 0.0 } else { mean / std }
}

pub fn nan_max(data: &[f64]) -> Option<f64> {
    data.iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
}

/// Index of the smallest non-NaN value, first occurrence on ties.
pub fn nan_argmin(data: &[f64]) -> Option<usize> {
    data.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Index of the largest non-NaN value, first occurrence on ties.
pub fn nan_argmax(data: &[f64]) -> Option<usize> {
    data.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub fn nan_median(values: &[f64]) -> f64 {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        (valid[mid - 1] + valid[mid]) / 2.0
    } else {
        valid[mid]
    }
}
