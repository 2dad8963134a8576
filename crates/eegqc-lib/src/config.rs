use crate::error::{QcError, QcResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Sample width of Neuroscan `.cnt` data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CntDataFormat {
    #[default]
    Auto,
    Int16,
    Int32,
}

/// Channel cleanup applied by the reader before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCleanup {
    /// Leave labels untouched; the normalizer drops anything off-layout.
    #[default]
    Generic,
    /// Fixed drop/rename table for the legacy 64-channel Neuroscan cap.
    Legacy,
}

/// How strictly channel labels are matched against the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    /// Case-insensitive exact match, then label cleanup and aliases.
    #[default]
    Alias,
    /// Case-insensitive exact match only.
    Exact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub cnt_data_format: CntDataFormat,
    pub channel_cleanup: ChannelCleanup,
    /// Parent directory for archive extraction; system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cnt_data_format: CntDataFormat::Auto,
            channel_cleanup: ChannelCleanup::Generic,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub mode: NormalizeMode,
    /// Retained channel count below which a warning is logged.
    pub min_channels: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            mode: NormalizeMode::Alias,
            min_channels: 16,
        }
    }
}

/// Parameters of the electrical-distance bridge search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound (µV²) of distances considered when locating the threshold.
    pub lm_cutoff: f64,
    /// Fraction of epochs a pair must be below threshold to count as bridged.
    pub epoch_threshold: f64,
    /// High-pass edge of the band-pass filter (Hz).
    pub l_freq: f64,
    /// Low-pass edge of the band-pass filter (Hz).
    pub h_freq: f64,
    /// Epoch length (seconds).
    pub epoch_duration: f64,
    /// KDE bandwidth factor; Scott's rule when unset.
    pub bw_factor: Option<f64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            lm_cutoff: 16.0,
            epoch_threshold: 0.5,
            l_freq: 0.5,
            h_freq: 30.0,
            epoch_duration: 2.0,
            bw_factor: None,
        }
    }
}

/// Full run configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    pub reader: ReaderConfig,
    pub normalize: NormalizeConfig,
    pub bridge: BridgeConfig,
}

impl QcConfig {
    pub fn from_toml_str(text: &str) -> QcResult<Self> {
        let config: QcConfig =
            toml::from_str(text).map_err(|err| QcError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> QcResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> QcResult<()> {
        let b = &self.bridge;
        if !(b.lm_cutoff > 0.0) {
            return Err(QcError::Config("bridge.lm_cutoff must be positive".into()));
        }
        if !(0.0..=1.0).contains(&b.epoch_threshold) {
            return Err(QcError::Config(
                "bridge.epoch_threshold must lie in [0, 1]".into(),
            ));
        }
        if !(b.epoch_duration > 0.0) {
            return Err(QcError::Config(
                "bridge.epoch_duration must be positive".into(),
            ));
        }
        if b.l_freq < 0.0 || b.l_freq >= b.h_freq {
            return Err(QcError::Config(format!(
                "bridge.l_freq ({}) must be non-negative and below h_freq ({})",
                b.l_freq, b.h_freq
            )));
        }
        if matches!(b.bw_factor, Some(bw) if !(bw > 0.0)) {
            return Err(QcError::Config("bridge.bw_factor must be positive".into()));
        }
        Ok(())
    }
}
