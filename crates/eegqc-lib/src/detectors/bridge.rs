//! Bridged-electrode search based on electrical distance.
//!
//! The electrical distance of two channels within an epoch is the variance of
//! their difference (µV²). Bridged electrodes record nearly the same signal,
//! so their distance collapses towards zero. The cutoff separating bridged
//! from healthy pairs is the lowest point of the distance density between
//! zero and `lm_cutoff`.

use crate::config::BridgeConfig;
use crate::dsp::{self, GaussianKde};
use crate::error::{QcError, QcResult};
use crate::montage::NormalizedRecording;
use crate::progress::{check_cancel, CancelToken};
use crate::signal::volts_per_unit;
use serde::{Deserialize, Serialize};

/// Points of the density grid searched for the threshold.
const DENSITY_GRID: usize = 1000;

/// Channel metadata carried into the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub position: [f64; 3],
    pub position_2d: [f64; 2],
}

/// Symmetric matrix over unordered channel pairs, stored as the condensed
/// upper triangle. The diagonal is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size.saturating_sub(1) / 2],
        }
    }

    /// Number of channels.
    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, i: usize, j: usize) -> Option<usize> {
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        if a == b || b >= self.size {
            return None;
        }
        Some(a * (2 * self.size - a - 1) / 2 + (b - a - 1))
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.index(i, j).map(|idx| self.values[idx])
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        if let Some(idx) = self.index(i, j) {
            self.values[idx] = value;
        }
    }

    /// All `(i, j, value)` with `i < j`, in row order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.size)
            .flat_map(move |i| (i + 1..self.size).map(move |j| (i, j)))
            .zip(self.values.iter().copied())
            .map(|((i, j), v)| (i, j, v))
    }

    /// Dense rows with `None` on the diagonal.
    pub fn to_rows(&self) -> Vec<Vec<Option<f64>>> {
        (0..self.size)
            .map(|i| (0..self.size).map(|j| self.get(i, j)).collect())
            .collect()
    }
}

/// Outcome of one bridge search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeReport {
    pub channels: Vec<ChannelInfo>,
    /// Sorted `(i, j)` channel indices with `i < j`.
    pub bridged: Vec<(usize, usize)>,
    /// Median electrical distance across epochs, µV².
    pub distances: DistanceMatrix,
    /// Distance below which an epoch counts as bridged; `None` when no
    /// distance fell under the cutoff.
    pub threshold: Option<f64>,
    pub epochs: usize,
}

impl BridgeReport {
    pub fn bridged_names(&self) -> Vec<(String, String)> {
        self.bridged
            .iter()
            .map(|&(i, j)| (self.channels[i].name.clone(), self.channels[j].name.clone()))
            .collect()
    }
}

pub fn detect(recording: &NormalizedRecording) -> QcResult<BridgeReport> {
    detect_with(recording, &BridgeConfig::default())
}

pub fn detect_with(recording: &NormalizedRecording, config: &BridgeConfig) -> QcResult<BridgeReport> {
    detect_cancellable(recording, config, None)
}

/// As [`detect_with`], checking `cancel` between channels and epochs.
pub fn detect_cancellable(
    recording: &NormalizedRecording,
    config: &BridgeConfig,
    cancel: Option<&CancelToken>,
) -> QcResult<BridgeReport> {
    let n_ch = recording.channel_count();
    if n_ch < 2 {
        return Err(QcError::InsufficientChannels(n_ch));
    }
    let n_samples = recording.sample_count();
    if n_samples == 0 {
        return Err(QcError::InsufficientSamples);
    }

    let mut filtered = Vec::with_capacity(n_ch);
    for channel in &recording.channels {
        check_cancel(cancel)?;
        let to_uv = match volts_per_unit(&channel.unit) {
            Some(_) => 1e6,
            None => {
                log::debug!(
                    "channel {} has non-voltage unit {:?}; using raw values",
                    channel.name,
                    channel.unit
                );
                1.0
            }
        };
        let uv: Vec<f64> = channel.samples.iter().map(|v| v * to_uv).collect();
        filtered.push(dsp::bandpass(
            &uv,
            recording.sfreq,
            config.l_freq,
            config.h_freq,
        )?);
    }

    let epochs = dsp::epoch_bounds(n_samples, recording.sfreq, config.epoch_duration);
    if n_samples < (config.epoch_duration * recording.sfreq).round() as usize {
        log::warn!(
            "recording shorter than one {} s epoch; using all {} samples as a single epoch",
            config.epoch_duration,
            n_samples
        );
    }

    // eds[pair][epoch], pairs in condensed order
    let n_pairs = n_ch * (n_ch - 1) / 2;
    let mut eds: Vec<Vec<f64>> = vec![Vec::with_capacity(epochs.len()); n_pairs];
    for range in &epochs {
        check_cancel(cancel)?;
        let mut pair = 0;
        for i in 0..n_ch {
            for j in i + 1..n_ch {
                let ed = dsp::difference_variance(
                    &filtered[i][range.clone()],
                    &filtered[j][range.clone()],
                );
                eds[pair].push(ed);
                pair += 1;
            }
        }
    }

    let threshold = find_threshold(&eds, config);
    let mut distances = DistanceMatrix::zeros(n_ch);
    let mut bridged = Vec::new();
    let mut pair = 0;
    for i in 0..n_ch {
        for j in i + 1..n_ch {
            let pair_eds = &eds[pair];
            distances.set(i, j, dsp::median(pair_eds).unwrap_or(f64::NAN));
            if let Some(threshold) = threshold {
                let below = pair_eds.iter().filter(|&&ed| ed < threshold).count();
                if below as f64 / pair_eds.len() as f64 > config.epoch_threshold {
                    bridged.push((i, j));
                }
            }
            pair += 1;
        }
    }

    log::debug!(
        "bridge search over {} epochs: threshold {:?}, {} bridged pairs",
        epochs.len(),
        threshold,
        bridged.len()
    );

    let channels = recording
        .channels
        .iter()
        .map(|ch| ChannelInfo {
            name: ch.name.clone(),
            position: ch.position,
            position_2d: ch.position_2d,
        })
        .collect();
    Ok(BridgeReport {
        channels,
        bridged,
        distances,
        threshold,
        epochs: epochs.len(),
    })
}

/// Lowest point of the density of distances strictly inside `(0, lm_cutoff)`.
fn find_threshold(eds: &[Vec<f64>], config: &BridgeConfig) -> Option<f64> {
    let near: Vec<f64> = eds
        .iter()
        .flatten()
        .copied()
        .filter(|&ed| ed < config.lm_cutoff)
        .collect();
    if near.is_empty() {
        return None;
    }
    let Some(kde) = GaussianKde::fit(&near, config.bw_factor) else {
        return Some(config.lm_cutoff);
    };
    let grid = dsp::linspace(0.0, config.lm_cutoff, DENSITY_GRID);
    let density: Vec<f64> = grid.iter().map(|&x| kde.evaluate(x)).collect();
    Some(
        dsp::interior_minimum(&density)
            .map(|idx| grid[idx])
            .unwrap_or(config.lm_cutoff),
    )
}
