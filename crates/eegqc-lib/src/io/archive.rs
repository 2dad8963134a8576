//! `.zip` archives holding a BrainVision set.

use super::{brainvision, display_name, reading_event, ReadOptions};
use crate::error::{QcError, QcResult};
use crate::progress::{check_cancel, report, ProgressEvent, ProgressSink};
use crate::signal::Recording;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use walkdir::WalkDir;

/// Extract `path` to a scoped temporary directory and read the `.vhdr` inside.
///
/// The directory is removed when this function returns, whatever the outcome.
pub fn read_zip(
    path: &Path,
    options: &ReadOptions,
    progress: &mut dyn ProgressSink,
) -> QcResult<Recording> {
    let scratch = scratch_dir(options.scratch_dir.as_deref())?;
    report(
        progress,
        ProgressEvent::Extracting {
            archive: display_name(path),
        },
    );
    extract(path, scratch.path())?;
    check_cancel(options.cancel.as_ref())?;

    let header = find_header(scratch.path())?
        .ok_or_else(|| QcError::ArchiveContentsMissing(path.to_path_buf()))?;
    report(progress, reading_event(&header));
    brainvision::read_brainvision(&header, options.cancel.as_ref())
}

fn scratch_dir(parent: Option<&Path>) -> QcResult<TempDir> {
    let mut builder = Builder::new();
    builder.prefix("eegqc-");
    let dir = match parent {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    log::debug!("extracting into {}", dir.path().display());
    Ok(dir)
}

fn extract(path: &Path, into: &Path) -> QcResult<()> {
    let file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| QcError::corrupt(path, err.to_string()))?;
    archive
        .extract(into)
        .map_err(|err| QcError::corrupt(path, err.to_string()))
}

/// First `.vhdr` in file-name order. Several candidates only trigger a warning.
fn find_header(root: &Path) -> QcResult<Option<PathBuf>> {
    let mut headers = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| QcError::corrupt(root, err.to_string()))?;
        let is_header = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("vhdr"));
        if entry.file_type().is_file() && is_header {
            headers.push(entry.into_path());
        }
    }
    if headers.len() > 1 {
        let names: Vec<String> = headers
            .iter()
            .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
            .collect();
        log::warn!(
            "archive holds {} header files ({}); using {}",
            headers.len(),
            names.join(", "),
            names[0]
        );
    }
    Ok(headers.into_iter().next())
}
