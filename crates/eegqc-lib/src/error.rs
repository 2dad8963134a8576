use std::path::PathBuf;
use thiserror::Error;

/// Failures of a bridge-detection run. Every variant is terminal for the run.
#[derive(Debug, Error)]
pub enum QcError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {}: {message}", path.display())]
    CorruptFile { path: PathBuf, message: String },
    #[error("archive {} does not contain a .vhdr header file", .0.display())]
    ArchiveContentsMissing(PathBuf),
    #[error("bridge detection needs at least 2 EEG channels, {0} left after normalization")]
    InsufficientChannels(usize),
    #[error("recording has no samples to analyse")]
    InsufficientSamples,
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("signal processing failed: {0}")]
    Dsp(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QcError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        QcError::CorruptFile {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type QcResult<T> = Result<T, QcError>;
