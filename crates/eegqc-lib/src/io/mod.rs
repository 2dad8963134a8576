//! Format-aware loading of EEG recordings.
//!
//! The format is resolved once from the file extension into [`RecordingFormat`]
//! and every reader produces the same [`Recording`] shape.

pub mod archive;
pub mod brainvision;
pub mod cnt;

use crate::config::{ChannelCleanup, CntDataFormat, ReaderConfig};
use crate::error::{QcError, QcResult};
use crate::progress::{report, CancelToken, LogSink, ProgressEvent, ProgressSink};
use crate::signal::Recording;
use std::path::{Path, PathBuf};

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingFormat {
    /// Neuroscan continuous `.cnt`
    Cnt,
    /// BrainVision `.vhdr` header with companion data/marker files
    BrainVision,
    /// `.zip` archive holding a BrainVision set
    Zip,
}

impl RecordingFormat {
    pub const EXTENSIONS: [&'static str; 3] = ["cnt", "vhdr", "zip"];

    fn expected() -> String {
        let listed: Vec<String> = Self::EXTENSIONS.iter().map(|ext| format!(".{ext}")).collect();
        format!("one of {}", listed.join(", "))
    }

    pub fn from_path(path: &Path) -> QcResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "cnt" => Ok(RecordingFormat::Cnt),
            "vhdr" => Ok(RecordingFormat::BrainVision),
            "zip" => Ok(RecordingFormat::Zip),
            "" => Err(QcError::UnsupportedFormat(format!(
                "{} has no file extension (expected {})",
                path.display(),
                Self::expected()
            ))),
            other => Err(QcError::UnsupportedFormat(format!(
                ".{} (expected {})",
                other,
                Self::expected()
            ))),
        }
    }
}

/// Reader knobs shared by all formats.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub cnt_data_format: CntDataFormat,
    pub channel_cleanup: ChannelCleanup,
    pub scratch_dir: Option<PathBuf>,
    pub cancel: Option<CancelToken>,
}

impl From<&ReaderConfig> for ReadOptions {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            cnt_data_format: config.cnt_data_format,
            channel_cleanup: config.channel_cleanup,
            scratch_dir: config.scratch_dir.clone(),
            cancel: None,
        }
    }
}

/// Load a recording with default options.
pub fn load(path: &Path) -> QcResult<Recording> {
    load_with(path, &ReadOptions::default(), &mut LogSink)
}

/// Load a recording, emitting progress before each blocking read.
pub fn load_with(
    path: &Path,
    options: &ReadOptions,
    progress: &mut dyn ProgressSink,
) -> QcResult<Recording> {
    let format = RecordingFormat::from_path(path)?;
    if !path.exists() {
        return Err(QcError::MissingFile(path.to_path_buf()));
    }
    let mut recording = match format {
        RecordingFormat::Cnt => {
            report(progress, reading_event(path));
            cnt::read_cnt(path, options.cnt_data_format, options.cancel.as_ref())?
        }
        RecordingFormat::BrainVision => {
            report(progress, reading_event(path));
            brainvision::read_brainvision(path, options.cancel.as_ref())?
        }
        RecordingFormat::Zip => archive::read_zip(path, options, progress)?,
    };
    if options.channel_cleanup == ChannelCleanup::Legacy {
        apply_legacy_cleanup(&mut recording);
    }
    log::debug!(
        "loaded {}: {} channels x {} samples at {} Hz",
        path.display(),
        recording.channel_count(),
        recording.sample_count(),
        recording.sfreq
    );
    Ok(recording)
}

pub(crate) fn reading_event(path: &Path) -> ProgressEvent {
    ProgressEvent::Reading {
        file: display_name(path),
    }
}

/// File name component used in progress lines and plot titles.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

const LEGACY_DROPPED: [&str; 3] = ["X", "BLANK", "Y"];

const LEGACY_RENAMES: [(&str, &str); 11] = [
    ("FP1", "Fp1"),
    ("FP2", "Fp2"),
    ("FZ", "Fz"),
    ("CZ", "Cz"),
    ("PZ", "Pz"),
    ("FPZ", "Fpz"),
    ("AFZ", "AFz"),
    ("FCZ", "FCz"),
    ("POZ", "POz"),
    ("OZ", "Oz"),
    ("CPZ", "CPz"),
];

/// Fixed drop/rename table of the first reader revision.
pub fn apply_legacy_cleanup(recording: &mut Recording) {
    recording
        .channels
        .retain(|ch| !LEGACY_DROPPED.contains(&ch.name.as_str()));
    for channel in &mut recording.channels {
        if let Some((_, to)) = LEGACY_RENAMES
            .iter()
            .find(|(from, _)| *from == channel.name)
        {
            channel.name = (*to).to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Channel;
    use tempfile::tempdir;

    #[test]
    fn resolves_formats_case_insensitively() {
        assert_eq!(
            RecordingFormat::from_path(Path::new("a/B.CNT")).unwrap(),
            RecordingFormat::Cnt
        );
        assert_eq!(
            RecordingFormat::from_path(Path::new("x.VHdr")).unwrap(),
            RecordingFormat::BrainVision
        );
        assert_eq!(
            RecordingFormat::from_path(Path::new("x.zip")).unwrap(),
            RecordingFormat::Zip
        );
        assert!(matches!(
            RecordingFormat::from_path(Path::new("noext")),
            Err(QcError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recording.xyz");
        std::fs::write(&path, b"not eeg").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, QcError::UnsupportedFormat(_)), "{err}");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load(Path::new("/definitely/not/here.cnt")).unwrap_err();
        assert!(matches!(err, QcError::MissingFile(_)));
    }

    #[test]
    fn legacy_cleanup_drops_and_renames() {
        let channels = ["FP1", "X", "CZ", "BLANK", "O1", "Y"]
            .iter()
            .map(|name| Channel::new(*name, "µV", vec![0.0; 4]))
            .collect();
        let mut rec = Recording::new(Path::new("x.cnt"), 100.0, channels).unwrap();
        apply_legacy_cleanup(&mut rec);
        assert_eq!(rec.channel_names(), vec!["Fp1", "Cz", "O1"]);
    }
}
