use super::layout::{CanonicalLayout, Electrode};
use crate::config::{NormalizeConfig, NormalizeMode};
use crate::signal::{Annotation, Channel, Recording};
use serde::Serialize;

/// Old 10-20 temporal names that moved in the 10-10 system.
const ALIASES: [(&str, &str); 4] = [("T3", "T7"), ("T4", "T8"), ("T5", "P7"), ("T6", "P8")];

/// Reference suffixes some amplifiers append to every label.
const REFERENCE_SUFFIXES: [&str; 3] = ["-REF", "-LE", "-AVG"];

/// Channel matched to a layout electrode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedChannel {
    /// Canonical layout name.
    pub name: String,
    /// Label as read from the file.
    pub source_name: String,
    pub unit: String,
    #[serde(skip)]
    pub samples: Vec<f64>,
    pub position: [f64; 3],
    pub position_2d: [f64; 2],
}

/// Recording restricted to layout electrodes, in recording order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecording {
    pub sfreq: f64,
    pub channels: Vec<NormalizedChannel>,
    /// Labels that were not retained.
    pub dropped: Vec<String>,
    pub annotations: Vec<Annotation>,
}

impl NormalizedRecording {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_count(&self) -> usize {
        self.channels.first().map(|ch| ch.samples.len()).unwrap_or(0)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|ch| ch.name.as_str()).collect()
    }

    /// Back to a plain recording carrying the canonical names.
    pub fn into_recording(self) -> Recording {
        Recording {
            sfreq: self.sfreq,
            channels: self
                .channels
                .into_iter()
                .map(|ch| Channel::new(ch.name, ch.unit, ch.samples))
                .collect(),
            annotations: self.annotations,
        }
    }
}

/// Normalize with the default (alias) configuration.
pub fn normalize(recording: Recording, layout: &CanonicalLayout) -> NormalizedRecording {
    normalize_with(recording, layout, &NormalizeConfig::default())
}

pub fn normalize_with(
    recording: Recording,
    layout: &CanonicalLayout,
    config: &NormalizeConfig,
) -> NormalizedRecording {
    let mut channels: Vec<NormalizedChannel> = Vec::with_capacity(recording.channels.len());
    let mut dropped = Vec::new();

    for channel in recording.channels {
        let Some(electrode) = resolve(&channel.name, layout, config.mode) else {
            log::warn!("dropping channel {}: not a 10-20 electrode", channel.name);
            dropped.push(channel.name);
            continue;
        };
        if let Some(kept) = channels.iter().find(|ch| ch.name == electrode.name) {
            log::warn!(
                "dropping channel {}: duplicates {} already mapped to {}",
                channel.name,
                kept.source_name,
                electrode.name
            );
            dropped.push(channel.name);
            continue;
        }
        if !channel.name.eq_ignore_ascii_case(electrode.name) {
            log::debug!("mapped channel {} to {}", channel.name, electrode.name);
        }
        channels.push(NormalizedChannel {
            name: electrode.name.to_string(),
            source_name: channel.name,
            unit: channel.unit,
            samples: channel.samples,
            position: electrode.pos,
            position_2d: electrode.pos2d,
        });
    }

    if channels.len() < config.min_channels {
        log::warn!(
            "only {} EEG channels retained (expected at least {})",
            channels.len(),
            config.min_channels
        );
    }

    NormalizedRecording {
        sfreq: recording.sfreq,
        channels,
        dropped,
        annotations: recording.annotations,
    }
}

/// Resolve a raw label to a layout electrode.
pub fn resolve<'a>(
    label: &str,
    layout: &'a CanonicalLayout,
    mode: NormalizeMode,
) -> Option<&'a Electrode> {
    if let Some(electrode) = layout.get(label) {
        return Some(electrode);
    }
    if mode == NormalizeMode::Exact {
        return None;
    }
    let cleaned = clean_label(label);
    layout.get(cleaned).or_else(|| {
        ALIASES
            .iter()
            .find(|(old, _)| old.eq_ignore_ascii_case(cleaned))
            .and_then(|(_, new)| layout.get(new))
    })
}

/// Strip an `EEG` prefix and a reference suffix.
fn clean_label(label: &str) -> &str {
    let mut label = label.trim();
    if let Some(rest) = label
        .get(..3)
        .filter(|prefix| prefix.eq_ignore_ascii_case("EEG"))
        .and_then(|_| label.get(3..))
    {
        label = rest.trim_start_matches([' ', '-', '_']);
    }
    for suffix in REFERENCE_SUFFIXES {
        let upper = label.to_ascii_uppercase();
        if upper.ends_with(suffix) {
            label = &label[..label.len() - suffix.len()];
            break;
        }
    }
    label.trim()
}
