use crate::error::{QcError, QcResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One recorded channel. Samples are in volts when `unit` is a voltage unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    /// Unit label as declared by the source file (e.g. "µV").
    pub unit: String,
    pub samples: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Marker read from a vendor marker file (sample index is 0-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: String,
    pub description: String,
    pub sample: usize,
    pub duration: usize,
}

/// Multichannel recording sharing one sampling rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Uniform sampling frequency in Hz
    pub sfreq: f64,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Recording {
    /// Build a recording, rejecting ragged channel lengths.
    pub fn new(source: &Path, sfreq: f64, channels: Vec<Channel>) -> QcResult<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(QcError::corrupt(
                source,
                format!("invalid sampling rate {}", sfreq),
            ));
        }
        if let Some(first) = channels.first() {
            if let Some(bad) = channels.iter().find(|ch| ch.len() != first.len()) {
                return Err(QcError::corrupt(
                    source,
                    format!(
                        "channel {} has {} samples, expected {}",
                        bad.name,
                        bad.len(),
                        first.len()
                    ),
                ));
            }
        }
        Ok(Self {
            sfreq,
            channels,
            annotations: Vec::new(),
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_count(&self) -> usize {
        self.channels.first().map(Channel::len).unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        self.sample_count() as f64 / self.sfreq
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|ch| ch.name.as_str()).collect()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|ch| ch.name == name)
    }
}

/// Scale factor converting a voltage unit label to volts.
pub fn volts_per_unit(unit: &str) -> Option<f64> {
    match unit.trim() {
        "V" => Some(1.0),
        "mV" => Some(1e-3),
        "µV" | "μV" | "uV" | "" => Some(1e-6),
        "nV" => Some(1e-9),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_channels() {
        let channels = vec![
            Channel::new("Fp1", "µV", vec![0.0; 10]),
            Channel::new("Fp2", "µV", vec![0.0; 9]),
        ];
        let err = Recording::new(Path::new("x.cnt"), 250.0, channels).unwrap_err();
        assert!(matches!(err, QcError::CorruptFile { .. }));
    }

    #[test]
    fn duration_follows_sample_count() {
        let channels = vec![Channel::new("Cz", "µV", vec![0.0; 500])];
        let rec = Recording::new(Path::new("x.cnt"), 250.0, channels).unwrap();
        assert_eq!(rec.sample_count(), 500);
        assert!((rec.duration() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn voltage_units_scale_to_volts() {
        assert_eq!(volts_per_unit("mV"), Some(1e-3));
        assert_eq!(volts_per_unit("uV"), Some(1e-6));
        assert_eq!(volts_per_unit("degC"), None);
    }
}
