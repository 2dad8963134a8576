//! Seeded synthetic recordings with known bridged pairs.

use crate::error::{QcError, QcResult};
use crate::signal::{Channel, Recording};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// The 19 electrodes of the classic 10-20 montage.
pub const STANDARD_19: [&str; 19] = [
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T7", "C3", "Cz", "C4", "T8", "P7", "P3", "Pz",
    "P4", "P8", "O1", "O2",
];

const RHYTHM_HZ: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSpec {
    pub channels: Vec<String>,
    pub sfreq: f64,
    pub duration_s: f64,
    /// Pairs whose second channel copies the first.
    pub bridges: Vec<(String, String)>,
    /// Half-width of the independent uniform noise, µV.
    pub noise_uv: f64,
    /// Amplitude of the shared alpha rhythm, µV.
    pub common_uv: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            channels: STANDARD_19.iter().map(|s| s.to_string()).collect(),
            sfreq: 250.0,
            duration_s: 20.0,
            bridges: Vec::new(),
            noise_uv: 20.0,
            common_uv: 10.0,
            seed: 42,
        }
    }
}

/// Build a recording (samples in volts, unit "µV").
pub fn generate(spec: &SyntheticSpec) -> QcResult<Recording> {
    if !(spec.sfreq > 0.0 && spec.duration_s > 0.0) {
        return Err(QcError::Config(format!(
            "synthetic recording needs positive sfreq and duration, got {} Hz / {} s",
            spec.sfreq, spec.duration_s
        )));
    }
    let index_of = |name: &str| {
        spec.channels
            .iter()
            .position(|ch| ch == name)
            .ok_or_else(|| QcError::Config(format!("bridge channel {} is not generated", name)))
    };
    let pairs = spec
        .bridges
        .iter()
        .map(|(a, b)| Ok((index_of(a)?, index_of(b)?)))
        .collect::<QcResult<Vec<_>>>()?;

    let n = (spec.sfreq * spec.duration_s).round() as usize;
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let rhythm: Vec<f64> = (0..n)
        .map(|i| spec.common_uv * (2.0 * PI * RHYTHM_HZ * i as f64 / spec.sfreq).sin())
        .collect();
    let mut data: Vec<Vec<f64>> = spec
        .channels
        .iter()
        .map(|_| {
            rhythm
                .iter()
                .map(|common| {
                    let noise = if spec.noise_uv > 0.0 {
                        rng.gen_range(-spec.noise_uv..=spec.noise_uv)
                    } else {
                        0.0
                    };
                    (common + noise) * 1e-6
                })
                .collect()
        })
        .collect();
    for &(src, dst) in &pairs {
        if src != dst {
            data[dst] = data[src].clone();
        }
    }

    let channels = spec
        .channels
        .iter()
        .zip(data)
        .map(|(name, samples)| Channel::new(name.clone(), "µV", samples))
        .collect();
    log::debug!(
        "generated {} channels x {} samples with {} bridges (seed {})",
        spec.channels.len(),
        n,
        pairs.len(),
        spec.seed
    );
    Recording::new(Path::new("synthetic"), spec.sfreq, channels)
}

/// Parse `A:B` into a bridge pair.
pub fn parse_bridge(text: &str) -> QcResult<(String, String)> {
    match text.split_once(':') {
        Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            Ok((a.trim().to_string(), b.trim().to_string()))
        }
        _ => Err(QcError::Config(format!(
            "bridge must look like CH1:CH2, got {:?}",
            text
        ))),
    }
}
