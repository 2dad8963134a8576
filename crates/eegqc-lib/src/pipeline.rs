//! Load → normalize → detect, run sequentially on the calling thread.

use crate::config::QcConfig;
use crate::detectors::bridge::{detect_cancellable, BridgeReport};
use crate::error::{QcError, QcResult};
use crate::io::{self, ReadOptions};
use crate::montage::{normalize_with, CanonicalLayout, NormalizedRecording};
use crate::progress::{check_cancel, report, CancelToken, ProgressEvent, ProgressSink};
use crate::signal::Recording;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a renderer needs from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRun {
    /// File name of the input.
    pub source: String,
    pub sfreq: f64,
    pub duration_s: f64,
    /// Labels removed by normalization.
    pub dropped: Vec<String>,
    pub report: BridgeReport,
}

impl BridgeRun {
    pub fn bridged_count(&self) -> usize {
        self.report.bridged.len()
    }

    /// Plot title, e.g. `sub01.cnt bridged: 2`.
    pub fn title(&self) -> String {
        format!("{} bridged: {}", self.source, self.bridged_count())
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: QcConfig,
    layout: &'static CanonicalLayout,
    cancel: Option<CancelToken>,
}

impl Pipeline {
    pub fn new(config: QcConfig) -> Self {
        Self {
            config,
            layout: CanonicalLayout::standard_1020(),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run all stages on `path`.
    pub fn run(&self, path: &Path, progress: &mut dyn ProgressSink) -> QcResult<BridgeRun> {
        self.config.validate()?;
        let options = ReadOptions {
            cancel: self.cancel.clone(),
            ..ReadOptions::from(&self.config.reader)
        };
        let recording = io::load_with(path, &options, progress)?;
        self.analyze(recording, &io::display_name(path), progress)
    }

    /// Normalize and search an already-loaded recording.
    pub fn analyze(
        &self,
        recording: Recording,
        source: &str,
        progress: &mut dyn ProgressSink,
    ) -> QcResult<BridgeRun> {
        check_cancel(self.cancel.as_ref())?;
        let duration_s = recording.duration();
        let normalized = self.normalize(recording, progress);

        if normalized.channel_count() < 2 {
            return Err(QcError::InsufficientChannels(normalized.channel_count()));
        }
        check_cancel(self.cancel.as_ref())?;
        report(progress, ProgressEvent::Searching);
        let bridge_report =
            detect_cancellable(&normalized, &self.config.bridge, self.cancel.as_ref())?;
        report(
            progress,
            ProgressEvent::Finished {
                bridged: bridge_report.bridged.len(),
            },
        );

        Ok(BridgeRun {
            source: source.to_string(),
            sfreq: normalized.sfreq,
            duration_s,
            dropped: normalized.dropped,
            report: bridge_report,
        })
    }

    fn normalize(
        &self,
        recording: Recording,
        progress: &mut dyn ProgressSink,
    ) -> NormalizedRecording {
        let normalized = normalize_with(recording, self.layout, &self.config.normalize);
        report(
            progress,
            ProgressEvent::Normalized {
                retained: normalized.channel_count(),
                dropped: normalized.dropped.clone(),
            },
        );
        normalized
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(QcConfig::default())
    }
}
