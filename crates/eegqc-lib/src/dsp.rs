//! Numeric helpers for the bridge search: zero-phase band-pass, epoching,
//! moments and a Gaussian kernel density estimate.

use crate::error::{QcError, QcResult};
use realfft::RealFftPlanner;
use std::f64::consts::PI;
use std::ops::Range;

/// Zero-phase FFT band-pass with raised-cosine transition bands.
///
/// The high edge is skipped when `h_freq` is at or above Nyquist and the low
/// edge when `l_freq` is not positive.
pub fn bandpass(samples: &[f64], sfreq: f64, l_freq: f64, h_freq: f64) -> QcResult<Vec<f64>> {
    let n = samples.len();
    if n < 2 {
        return Ok(samples.to_vec());
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(n);

    let mut input = samples.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum)
        .map_err(|err| QcError::Dsp(err.to_string()))?;

    let nyquist = sfreq / 2.0;
    let df = sfreq / n as f64;
    for (k, bin) in spectrum.iter_mut().enumerate() {
        *bin *= passband_gain(k as f64 * df, l_freq, h_freq, nyquist);
    }
    spectrum[0].im = 0.0;
    if n % 2 == 0 {
        if let Some(last) = spectrum.last_mut() {
            last.im = 0.0;
        }
    }

    let mut output = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut output)
        .map_err(|err| QcError::Dsp(err.to_string()))?;
    let scale = 1.0 / n as f64;
    output.iter_mut().for_each(|v| *v *= scale);
    Ok(output)
}

/// Amplitude response at `freq`.
fn passband_gain(freq: f64, l_freq: f64, h_freq: f64, nyquist: f64) -> f64 {
    let mut gain = 1.0;
    if l_freq > 0.0 {
        let l_trans = (0.25 * l_freq).max(2.0).min(l_freq);
        let stop = l_freq - l_trans;
        gain *= if freq >= l_freq {
            1.0
        } else if freq <= stop {
            0.0
        } else {
            0.5 * (1.0 - (PI * (freq - stop) / l_trans).cos())
        };
    }
    if h_freq < nyquist {
        let h_trans = (0.25 * h_freq).max(2.0).min(nyquist - h_freq);
        gain *= if freq <= h_freq {
            1.0
        } else if freq >= h_freq + h_trans {
            0.0
        } else {
            0.5 * (1.0 + (PI * (freq - h_freq) / h_trans).cos())
        };
    }
    gain
}

/// Non-overlapping epochs of `duration` seconds; trailing samples are
/// discarded. A recording shorter than one epoch yields a single epoch.
pub fn epoch_bounds(n_samples: usize, sfreq: f64, duration: f64) -> Vec<Range<usize>> {
    if n_samples == 0 {
        return Vec::new();
    }
    let len = (duration * sfreq).round() as usize;
    if len == 0 || n_samples < len {
        return vec![0..n_samples];
    }
    (0..n_samples / len).map(|e| e * len..(e + 1) * len).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance of `a - b` without allocating the difference.
pub fn difference_variance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let m = a.iter().zip(b).map(|(x, y)| x - y).sum::<f64>() / n as f64;
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y - m).powi(2))
        .sum::<f64>()
        / n as f64
}

/// Sample standard deviation (ddof = 1).
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}

/// One-dimensional Gaussian kernel density estimate.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    data: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Fit with Scott's factor `n^(-1/5)` unless `bw_factor` is given.
    /// Returns `None` when the data have no spread.
    pub fn fit(data: &[f64], bw_factor: Option<f64>) -> Option<Self> {
        let std = sample_std(data);
        if !(std.is_finite() && std > 0.0) {
            return None;
        }
        let factor = bw_factor.unwrap_or_else(|| (data.len() as f64).powf(-0.2));
        let bandwidth = factor * std;
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return None;
        }
        Some(Self {
            data: data.to_vec(),
            bandwidth,
        })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let norm = 1.0 / (self.data.len() as f64 * self.bandwidth * (2.0 * PI).sqrt());
        self.data
            .iter()
            .map(|xi| {
                let z = (x - xi) / self.bandwidth;
                (-0.5 * z * z).exp()
            })
            .sum::<f64>()
            * norm
    }
}

/// Index of the smallest value strictly inside `values`, excluding both
/// ends. Ties resolve to the highest index.
pub fn interior_minimum(values: &[f64]) -> Option<usize> {
    (1..values.len().saturating_sub(1)).fold(None, |best: Option<usize>, i| match best {
        Some(b) if values[b] < values[i] => Some(b),
        _ => Some(i),
    })
}
