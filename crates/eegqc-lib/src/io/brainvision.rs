//! BrainVision Core Data Format: `.vhdr` header, binary data file, optional
//! `.vmrk` marker file.
//!
//! `bvreader` parses the header, decodes the data file and applies channel
//! resolutions. Channel units and markers are read from the text files here.

use crate::error::{QcError, QcResult};
use crate::progress::{check_cancel, CancelToken};
use crate::signal::{volts_per_unit, Annotation, Channel, Recording};
use byteorder::{LittleEndian, WriteBytesExt};
use bvreader::bv_reader::BVFile;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const HEADER_MAGIC: &str = "Data Exchange Header File";
const MARKER_MAGIC: &str = "Data Exchange Marker File";
const DEFAULT_UNIT: &str = "µV";

/// Read a BrainVision set given the path to its `.vhdr` header.
pub fn read_brainvision(header_path: &Path, cancel: Option<&CancelToken>) -> QcResult<Recording> {
    let text = read_text(header_path)?;
    if !text.lines().next().unwrap_or_default().contains(HEADER_MAGIC) {
        return Err(QcError::corrupt(header_path, "not a BrainVision header file"));
    }
    if let Some(format) = common_info(&text, "DataFormat") {
        if !format.eq_ignore_ascii_case("BINARY") {
            return Err(QcError::corrupt(
                header_path,
                format!("DataFormat {} is not supported, only BINARY", format),
            ));
        }
    }
    let path_str = header_path
        .to_str()
        .ok_or_else(|| QcError::corrupt(header_path, "path is not valid UTF-8"))?;

    check_cancel(cancel)?;
    let mut file = BVFile::from_header(path_str)
        .map_err(|e| QcError::corrupt(header_path, format!("{:?}", e)))?;
    file.validate()
        .map_err(|e| QcError::corrupt(header_path, format!("invalid set: {:?}", e)))?;
    file.bv_data
        .scale_channels(&file.bv_header.channel_info)
        .map_err(|e| QcError::corrupt(header_path, format!("scaling channels: {:?}", e)))?;
    check_cancel(cancel)?;

    let info = &file.bv_header.channel_info;
    let data = &file.bv_data.data;
    if data.len() != info.len() {
        return Err(QcError::corrupt(
            header_path,
            format!("{} channel entries but {} data channels", info.len(), data.len()),
        ));
    }
    let interval_us = file.bv_header.sampling_interval as f64;
    if !(interval_us.is_finite() && interval_us > 0.0) {
        return Err(QcError::corrupt(header_path, "SamplingInterval must be positive"));
    }
    let units = channel_units(header_path, &text, info.len())?;
    log::debug!(
        "vhdr {}: {} channels, {} µs sampling interval",
        header_path.display(),
        info.len(),
        interval_us
    );

    let channels = info
        .iter()
        .zip(data)
        .zip(units)
        .map(|((ch, values), unit)| {
            let scale = volts_per_unit(&unit).unwrap_or(1.0);
            let samples = values.iter().map(|&v| v as f64 * scale).collect();
            Channel::new(ch.label.replace("\\1", ",").trim(), unit, samples)
        })
        .collect();
    let mut recording = Recording::new(header_path, 1_000_000.0 / interval_us, channels)?;

    if let Some(marker_file) = common_info(&text, "MarkerFile").filter(|v| !v.is_empty()) {
        let dir = header_path.parent().unwrap_or_else(|| Path::new("."));
        let marker_path = dir.join(marker_file);
        match read_text(&marker_path) {
            Ok(text) => recording.annotations = parse_markers(&marker_path, &text)?,
            Err(err) => log::warn!(
                "marker file {} not loaded: {}",
                marker_path.display(),
                err
            ),
        }
    }
    Ok(recording)
}

/// Header and marker files are UTF-8 or Latin-1 depending on the exporter.
fn read_text(path: &Path) -> QcResult<String> {
    let bytes = fs::read(path).map_err(|err| companion_error(path, err))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    })
}

fn companion_error(path: &Path, err: std::io::Error) -> QcError {
    if err.kind() == ErrorKind::NotFound {
        QcError::corrupt(path, "companion file not found")
    } else {
        QcError::corrupt(path, err.to_string())
    }
}

/// `(section, key, value)` for every `key=value` line after the magic line.
fn entries(text: &str) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
    let mut section = "";
    text.lines().skip(1).filter_map(move |line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            return None;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name;
            return None;
        }
        let (key, value) = line.split_once('=')?;
        Some((section, key.trim(), value.trim()))
    })
}

fn common_info<'a>(text: &'a str, wanted: &str) -> Option<&'a str> {
    entries(text)
        .find(|(section, key, _)| *section == "Common Infos" && *key == wanted)
        .map(|(_, _, value)| value)
}

/// Unit of each of the `n_channels` entries `ChN=<name>,<ref>,<res>,<unit>`.
fn channel_units(path: &Path, text: &str, n_channels: usize) -> QcResult<Vec<String>> {
    let mut units = vec![DEFAULT_UNIT.to_string(); n_channels];
    for (section, key, value) in entries(text) {
        if section != "Channel Infos" {
            continue;
        }
        let Some(number) = key.strip_prefix("Ch") else {
            continue;
        };
        let index: usize = parse_number(path, key, number)?;
        if index == 0 || index > n_channels {
            return Err(QcError::corrupt(
                path,
                format!("{} is outside the {} declared channels", key, n_channels),
            ));
        }
        if let Some(unit) = value.split(',').nth(3).map(str::trim).filter(|u| !u.is_empty()) {
            units[index - 1] = unit.to_string();
        }
    }
    Ok(units)
}

fn parse_number<T: std::str::FromStr>(path: &Path, key: &str, value: &str) -> QcResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| QcError::corrupt(path, format!("invalid value {:?} for {}", value, key)))
}

fn parse_markers(path: &Path, text: &str) -> QcResult<Vec<Annotation>> {
    if !text.lines().next().unwrap_or_default().contains(MARKER_MAGIC) {
        return Err(QcError::corrupt(path, "not a BrainVision marker file"));
    }
    let mut markers = Vec::new();
    for (section, key, value) in entries(text) {
        if section != "Marker Infos" || !key.starts_with("Mk") {
            continue;
        }
        let fields: Vec<&str> = value.split(',').collect();
        if fields.len() < 4 {
            return Err(QcError::corrupt(path, format!("malformed marker {}", key)));
        }
        let position: usize = parse_number(path, "marker position", fields[2])?;
        let duration: usize = parse_number(path, "marker length", fields[3])?;
        markers.push(Annotation {
            kind: fields[0].trim().to_string(),
            description: fields[1].trim().replace("\\1", ","),
            sample: position.saturating_sub(1),
            duration,
        });
    }
    Ok(markers)
}

/// Write `recording` as a float32 multiplexed BrainVision set next to `header_path`.
///
/// Returns the paths of the data and marker files that were written.
pub fn write_brainvision(
    header_path: &Path,
    recording: &Recording,
) -> QcResult<(PathBuf, PathBuf)> {
    let data_path = header_path.with_extension("eeg");
    let marker_path = header_path.with_extension("vmrk");
    let file_name = |path: &Path| crate::io::display_name(path);

    let mut header = String::new();
    header.push_str("Brain Vision Data Exchange Header File Version 1.0\n");
    header.push_str("; Data written by eegqc\n\n");
    header.push_str("[Common Infos]\nCodepage=UTF-8\n");
    header.push_str(&format!("DataFile={}\n", file_name(&data_path)));
    header.push_str(&format!("MarkerFile={}\n", file_name(&marker_path)));
    header.push_str("DataFormat=BINARY\nDataOrientation=MULTIPLEXED\n");
    header.push_str(&format!("NumberOfChannels={}\n", recording.channel_count()));
    header.push_str(&format!(
        "SamplingInterval={}\n\n",
        1_000_000.0 / recording.sfreq
    ));
    header.push_str("[Binary Infos]\nBinaryFormat=IEEE_FLOAT_32\n\n");
    header.push_str("[Channel Infos]\n");
    let mut scales = Vec::with_capacity(recording.channel_count());
    for (idx, channel) in recording.channels.iter().enumerate() {
        let (unit, scale) = match volts_per_unit(&channel.unit) {
            Some(_) => ("µV", 1e6),
            None => (channel.unit.as_str(), 1.0),
        };
        scales.push(scale);
        header.push_str(&format!(
            "Ch{}={},,1,{}\n",
            idx + 1,
            channel.name.replace(',', "\\1"),
            unit
        ));
    }

    let mut data = Vec::with_capacity(recording.sample_count() * recording.channel_count() * 4);
    for s in 0..recording.sample_count() {
        for (channel, scale) in recording.channels.iter().zip(&scales) {
            data.write_f32::<LittleEndian>((channel.samples[s] * scale) as f32)?;
        }
    }

    let mut markers = String::new();
    markers.push_str("Brain Vision Data Exchange Marker File, Version 1.0\n\n");
    markers.push_str("[Common Infos]\nCodepage=UTF-8\n");
    markers.push_str(&format!("DataFile={}\n\n", file_name(&data_path)));
    markers.push_str("[Marker Infos]\n");
    markers.push_str("Mk1=New Segment,,1,1,0\n");
    for (idx, annotation) in recording.annotations.iter().enumerate() {
        markers.push_str(&format!(
            "Mk{}={},{},{},{},0\n",
            idx + 2,
            annotation.kind,
            annotation.description.replace(',', "\\1"),
            annotation.sample + 1,
            annotation.duration
        ));
    }

    fs::write(header_path, header)?;
    fs::write(&data_path, data)?;
    fs::write(&marker_path, markers)?;
    Ok((data_path, marker_path))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_path(relative: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join(relative)
    }

    #[test]
    fn reads_int16_fixture() {
        let rec = read_brainvision(&sample_path("test_data/sample.vhdr"), None)
            .expect("read fixture");
        assert_eq!(rec.channel_names(), vec!["Fp1", "FP2", "Cz", "VEOG"]);
        assert_eq!(rec.sample_count(), 10);
        assert_eq!(rec.sfreq, 500.0);
        // raw 125 at 0.1 µV resolution
        assert!((rec.channels[0].samples[0] - 12.5e-6).abs() < 1e-9);
        assert!((rec.channels[3].samples[9] - 97.5e-6).abs() < 1e-9);
        assert_eq!(rec.annotations.len(), 2);
        assert_eq!(rec.annotations[1].description, "S  1");
        assert_eq!(rec.annotations[1].sample, 4);
    }

    #[test]
    fn non_voltage_channels_keep_their_unit() {
        let dir = tempdir().unwrap();
        let channels = vec![
            Channel::new("O1", "µV", vec![1e-6, 2e-6, 3e-6]),
            Channel::new("Temp,a", "C", vec![36.5, 36.6, 36.7]),
        ];
        let rec = Recording::new(Path::new("t.vhdr"), 250.0, channels).unwrap();
        let path = dir.path().join("t.vhdr");
        write_brainvision(&path, &rec).unwrap();

        let back = read_brainvision(&path, None).unwrap();
        assert_eq!(back.channel_names(), vec!["O1", "Temp,a"]);
        assert_eq!(back.channels[1].unit, "C");
        assert!((back.channels[1].samples[1] - 36.6).abs() < 1e-4);
        assert!((back.channels[0].samples[2] - 3e-6).abs() < 1e-12);
    }

    #[test]
    fn missing_data_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let header = "Brain Vision Data Exchange Header File Version 1.0\n\
            [Common Infos]\nDataFile=gone.eeg\nMarkerFile=gone.vmrk\nDataFormat=BINARY\n\
            DataOrientation=MULTIPLEXED\nNumberOfChannels=1\nSamplingInterval=1000\n\
            [Binary Infos]\nBinaryFormat=IEEE_FLOAT_32\n\
            [Channel Infos]\nCh1=Cz,,1,µV\n";
        let path = dir.path().join("gone.vhdr");
        fs::write(&path, header).unwrap();
        let err = read_brainvision(&path, None).unwrap_err();
        assert!(matches!(err, QcError::CorruptFile { .. }), "{err}");
    }

    #[test]
    fn ascii_data_is_rejected() {
        let dir = tempdir().unwrap();
        let header = "Brain Vision Data Exchange Header File Version 1.0\n\
            [Common Infos]\nDataFile=a.dat\nDataFormat=ASCII\nNumberOfChannels=1\n\
            SamplingInterval=1000\n[Channel Infos]\nCh1=Cz,,1,µV\n";
        let path = dir.path().join("a.vhdr");
        fs::write(&path, header).unwrap();
        let err = read_brainvision(&path, None).unwrap_err();
        assert!(err.to_string().contains("ASCII"), "{err}");
    }

    #[test]
    fn rejects_non_header_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.vhdr");
        fs::write(&path, "hello\n").unwrap();
        assert!(matches!(
            read_brainvision(&path, None),
            Err(QcError::CorruptFile { .. })
        ));
    }

    #[test]
    fn channel_numbers_beyond_the_count_are_corrupt() {
        let path = Path::new("huge.vhdr");
        let text = "Brain Vision Data Exchange Header File Version 1.0\n\
            [Channel Infos]\nCh1000000000000000000=Cz,,1,µV\n";
        assert!(matches!(
            channel_units(path, text, 1),
            Err(QcError::CorruptFile { .. })
        ));
        let zero = "Brain Vision Data Exchange Header File Version 1.0\n\
            [Channel Infos]\nCh0=Cz,,1,µV\n";
        assert!(channel_units(path, zero, 1).is_err());
        let ok = "Brain Vision Data Exchange Header File Version 1.0\n\
            [Channel Infos]\nCh2=T,,1,C\nCh1=Cz,,0.1\n";
        assert_eq!(channel_units(path, ok, 2).unwrap(), vec!["µV", "C"]);
    }

    #[test]
    fn written_set_reads_back() {
        let dir = tempdir().unwrap();
        let channels = vec![
            Channel::new("Fp1", "µV", vec![1e-6, -2e-6, 3e-6]),
            Channel::new("Fp2", "µV", vec![0.0, 5e-6, -5e-6]),
        ];
        let mut rec = Recording::new(Path::new("w.vhdr"), 1000.0, channels).unwrap();
        rec.annotations.push(Annotation {
            kind: "Stimulus".into(),
            description: "S  2".into(),
            sample: 2,
            duration: 1,
        });
        let path = dir.path().join("w.vhdr");
        write_brainvision(&path, &rec).unwrap();

        let back = read_brainvision(&path, None).unwrap();
        assert_eq!(back.sfreq, 1000.0);
        assert_eq!(back.channel_names(), vec!["Fp1", "Fp2"]);
        for (a, b) in rec.channels.iter().zip(&back.channels) {
            for (x, y) in a.samples.iter().zip(&b.samples) {
                assert!((x - y).abs() < 1e-12);
            }
        }
        assert_eq!(back.annotations.len(), 2);
        assert_eq!(back.annotations[1].sample, 2);
    }
}
