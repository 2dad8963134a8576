//! Neuroscan continuous (`.cnt`) reader and a minimal writer.
//!
//! Layout: 900-byte setup header, one 75-byte electrode record per channel,
//! then integer samples up to the event table. Samples are stored in blocks of
//! `ChannelOffset / bytes` samples per channel, channel-major inside a block.

use crate::config::CntDataFormat;
use crate::error::{QcError, QcResult};
use crate::progress::{check_cancel, CancelToken};
use crate::signal::{Channel, Recording};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs;
use std::path::Path;

const SETUP_SIZE: usize = 900;
const ELECTRODE_SIZE: usize = 75;
const LABEL_LEN: usize = 10;

const OFF_N_CHANNELS: usize = 370;
const OFF_RATE: usize = 376;
const OFF_N_SAMPLES: usize = 864;
const OFF_EVENT_TABLE: usize = 886;
const OFF_CHANNEL_OFFSET: usize = 894;

const EL_BASELINE: usize = 47;
const EL_SENSITIVITY: usize = 59;
const EL_CALIBRATION: usize = 71;

/// Scanner gain constant used by the Neuroscan calibration formula.
const GAIN_DIVISOR: f64 = 204.8;
/// Sensitivity written by [`write_cnt`]: one LSB is 0.1 µV.
const WRITE_SENSITIVITY: f32 = 20.48;
const WRITE_LSB_UV: f64 = 0.1;

const CANCEL_CHECK_CHUNKS: usize = 4096;

#[derive(Debug, Clone)]
struct Electrode {
    label: String,
    baseline: i16,
    /// Volts per raw unit.
    scale: f64,
}

/// Read an entire `.cnt` file into memory.
pub fn read_cnt(
    path: &Path,
    format: CntDataFormat,
    cancel: Option<&CancelToken>,
) -> QcResult<Recording> {
    let bytes = fs::read(path)?;
    parse_cnt(path, &bytes, format, cancel)
}

fn parse_cnt(
    path: &Path,
    bytes: &[u8],
    format: CntDataFormat,
    cancel: Option<&CancelToken>,
) -> QcResult<Recording> {
    if bytes.len() < SETUP_SIZE {
        return Err(QcError::corrupt(
            path,
            format!("file is {} bytes, shorter than the setup header", bytes.len()),
        ));
    }
    let raw = CntBytes { path, bytes };
    let n_channels = raw.u16(OFF_N_CHANNELS)? as usize;
    let rate = raw.u16(OFF_RATE)?;
    let header_samples = raw.u32(OFF_N_SAMPLES)? as usize;
    let event_table = raw.i32(OFF_EVENT_TABLE)?;
    let channel_offset = raw.i32(OFF_CHANNEL_OFFSET)?;
    if n_channels == 0 {
        return Err(QcError::corrupt(path, "header declares zero channels"));
    }
    let data_offset = SETUP_SIZE + ELECTRODE_SIZE * n_channels;
    if bytes.len() < data_offset {
        return Err(QcError::corrupt(
            path,
            format!("truncated electrode table for {} channels", n_channels),
        ));
    }
    log::debug!(
        "cnt header: {} channels, {} Hz, {} samples, event table @{}, channel offset {}",
        n_channels,
        rate,
        header_samples,
        event_table,
        channel_offset
    );

    let electrodes = (0..n_channels)
        .map(|idx| read_electrode(&raw, SETUP_SIZE + ELECTRODE_SIZE * idx))
        .collect::<QcResult<Vec<_>>>()?;

    let data_end = match usize::try_from(event_table) {
        Ok(pos) if pos > data_offset && pos <= bytes.len() => pos,
        _ => bytes.len(),
    };
    let data_size = data_end - data_offset;
    let n_bytes = sample_width(format, data_size, header_samples, n_channels, path);
    let block = usize::try_from(channel_offset)
        .map(|offset| (offset / n_bytes).max(1))
        .unwrap_or(1);
    let chunk_bytes = block * n_channels * n_bytes;
    let n_chunks = data_size / chunk_bytes;
    let mut n_samples = n_chunks * block;
    if header_samples > 0 && header_samples < n_samples {
        n_samples = header_samples;
    }
    if n_samples == 0 {
        log::warn!("{} contains no samples", path.display());
    }

    let mut samples: Vec<Vec<f64>> = vec![Vec::with_capacity(n_samples); n_channels];
    for chunk in 0..n_chunks {
        if chunk * block >= n_samples {
            break;
        }
        if chunk % CANCEL_CHECK_CHUNKS == 0 {
            check_cancel(cancel)?;
        }
        let base = data_offset + chunk * chunk_bytes;
        let valid = block.min(n_samples - chunk * block);
        for (ch, electrode) in electrodes.iter().enumerate() {
            for s in 0..valid {
                let at = base + (ch * block + s) * n_bytes;
                let value = if n_bytes == 4 {
                    raw.i32(at)? as f64
                } else {
                    raw.i16(at)? as f64
                };
                samples[ch].push((value - electrode.baseline as f64) * electrode.scale);
            }
        }
    }

    let channels = electrodes
        .into_iter()
        .zip(samples)
        .map(|(electrode, data)| Channel::new(electrode.label, "µV", data))
        .collect();
    Recording::new(path, rate as f64, channels)
}

fn sample_width(
    format: CntDataFormat,
    data_size: usize,
    header_samples: usize,
    n_channels: usize,
    path: &Path,
) -> usize {
    match format {
        CntDataFormat::Int16 => 2,
        CntDataFormat::Int32 => 4,
        CntDataFormat::Auto => {
            let width = if header_samples > 0 {
                data_size / (header_samples * n_channels)
            } else {
                0
            };
            if width == 2 || width == 4 {
                width
            } else {
                log::warn!(
                    "could not infer sample width of {}; assuming 16-bit data",
                    path.display()
                );
                2
            }
        }
    }
}

fn read_electrode(raw: &CntBytes<'_>, pos: usize) -> QcResult<Electrode> {
    let raw_label = raw.slice(pos, LABEL_LEN)?;
    let end = raw_label
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(LABEL_LEN);
    let label = String::from_utf8_lossy(&raw_label[..end]).trim().to_string();
    let baseline = raw.i16(pos + EL_BASELINE)?;
    let sensitivity = raw.f32(pos + EL_SENSITIVITY)? as f64;
    let calibration = raw.f32(pos + EL_CALIBRATION)? as f64;
    Ok(Electrode {
        label,
        baseline,
        scale: sensitivity * calibration / GAIN_DIVISOR * 1e-6,
    })
}

/// Bounds-checked little-endian reads reported against the source file.
struct CntBytes<'a> {
    path: &'a Path,
    bytes: &'a [u8],
}

impl<'a> CntBytes<'a> {
    fn slice(&self, at: usize, len: usize) -> QcResult<&'a [u8]> {
        at.checked_add(len)
            .and_then(|end| self.bytes.get(at..end))
            .ok_or_else(|| {
                QcError::corrupt(
                    self.path,
                    format!("read of {} bytes at offset {} past end of file", len, at),
                )
            })
    }

    fn u16(&self, at: usize) -> QcResult<u16> {
        Ok(LittleEndian::read_u16(self.slice(at, 2)?))
    }

    fn u32(&self, at: usize) -> QcResult<u32> {
        Ok(LittleEndian::read_u32(self.slice(at, 4)?))
    }

    fn i16(&self, at: usize) -> QcResult<i16> {
        Ok(LittleEndian::read_i16(self.slice(at, 2)?))
    }

    fn i32(&self, at: usize) -> QcResult<i32> {
        Ok(LittleEndian::read_i32(self.slice(at, 4)?))
    }

    fn f32(&self, at: usize) -> QcResult<f32> {
        Ok(LittleEndian::read_f32(self.slice(at, 4)?))
    }
}

/// Write `recording` as 16-bit multiplexed `.cnt` with a 0.1 µV resolution.
pub fn write_cnt(path: &Path, recording: &Recording) -> QcResult<()> {
    let bytes = encode_cnt(recording, 2, 1)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn encode_cnt(recording: &Recording, n_bytes: usize, block: usize) -> QcResult<Vec<u8>> {
    let n_channels = recording.channel_count();
    let n_samples = recording.sample_count();
    let rate = recording.sfreq.round();
    if n_channels == 0 || n_channels > u16::MAX as usize {
        return Err(QcError::Config(format!(
            "cannot write {} channels to a .cnt file",
            n_channels
        )));
    }
    if (rate - recording.sfreq).abs() > 1e-9 || !(1.0..=u16::MAX as f64).contains(&rate) {
        return Err(QcError::Config(format!(
            ".cnt needs an integer sampling rate, got {}",
            recording.sfreq
        )));
    }

    let data_offset = SETUP_SIZE + ELECTRODE_SIZE * n_channels;
    let n_chunks = n_samples.div_ceil(block);
    let data_size = n_chunks * block * n_channels * n_bytes;
    let event_table = data_offset + data_size;
    let mut buf = vec![0u8; data_offset];

    buf[..11].copy_from_slice(b"Version 3.0");
    (&mut buf[OFF_N_CHANNELS..]).write_u16::<LittleEndian>(n_channels as u16)?;
    (&mut buf[OFF_RATE..]).write_u16::<LittleEndian>(rate as u16)?;
    (&mut buf[OFF_N_SAMPLES..]).write_u32::<LittleEndian>(n_samples as u32)?;
    (&mut buf[OFF_EVENT_TABLE..]).write_i32::<LittleEndian>(event_table as i32)?;
    (&mut buf[OFF_CHANNEL_OFFSET..]).write_i32::<LittleEndian>((block * n_bytes) as i32)?;

    for (idx, channel) in recording.channels.iter().enumerate() {
        let pos = SETUP_SIZE + ELECTRODE_SIZE * idx;
        let label = channel.name.as_bytes();
        let len = label.len().min(LABEL_LEN - 1);
        buf[pos..pos + len].copy_from_slice(&label[..len]);
        (&mut buf[pos + EL_BASELINE..]).write_i16::<LittleEndian>(0)?;
        (&mut buf[pos + EL_SENSITIVITY..]).write_f32::<LittleEndian>(WRITE_SENSITIVITY)?;
        (&mut buf[pos + EL_CALIBRATION..]).write_f32::<LittleEndian>(1.0)?;
    }

    buf.reserve(data_size + 9);
    for chunk in 0..n_chunks {
        for channel in &recording.channels {
            for s in 0..block {
                let volts = channel.samples.get(chunk * block + s).copied().unwrap_or(0.0);
                let raw = (volts * 1e6 / WRITE_LSB_UV).round();
                if n_bytes == 4 {
                    let raw = raw.clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                    buf.write_i32::<LittleEndian>(raw)?;
                } else {
                    let raw = raw.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
                    buf.write_i16::<LittleEndian>(raw)?;
                }
            }
        }
    }
    // empty event table: type 1, size 0, offset 0
    buf.write_u8(1)?;
    buf.write_i32::<LittleEndian>(0)?;
    buf.write_i32::<LittleEndian>(0)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_recording(n_samples: usize) -> Recording {
        let channels = ["FP1", "FP2", "CZ", "HEOG"]
            .iter()
            .enumerate()
            .map(|(ch, name)| {
                let data = (0..n_samples)
                    .map(|i| ((i as f64) * 0.5 + ch as f64 * 10.0 - 20.0) * 1e-6)
                    .collect();
                Channel::new(*name, "µV", data)
            })
            .collect();
        Recording::new(Path::new("fixture.cnt"), 500.0, channels).unwrap()
    }

    fn assert_samples_close(a: &Recording, b: &Recording) {
        for (x, y) in a.channels.iter().zip(&b.channels) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.len(), y.len());
            for (u, v) in x.samples.iter().zip(&y.samples) {
                assert!((u - v).abs() < 0.051e-6, "{} vs {}", u, v);
            }
        }
    }

    #[test]
    fn reads_back_written_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fixture.cnt");
        let original = sample_recording(1000);
        write_cnt(&path, &original).unwrap();

        let loaded = read_cnt(&path, CntDataFormat::Auto, None).unwrap();
        assert_eq!(loaded.channel_count(), 4);
        assert_eq!(loaded.sample_count(), 1000);
        assert_eq!(loaded.sfreq, 500.0);
        assert_eq!(loaded.channels[3].unit, "µV");
        assert_samples_close(&original, &loaded);
    }

    #[test]
    fn decodes_blocked_int32_layout() {
        let original = sample_recording(64);
        let bytes = encode_cnt(&original, 4, 8).unwrap();
        let loaded =
            parse_cnt(Path::new("blocked.cnt"), &bytes, CntDataFormat::Auto, None).unwrap();
        assert_eq!(loaded.sample_count(), 64);
        assert_samples_close(&original, &loaded);
    }

    #[test]
    fn explicit_width_overrides_detection() {
        let original = sample_recording(40);
        let bytes = encode_cnt(&original, 4, 1).unwrap();
        let loaded =
            parse_cnt(Path::new("wide.cnt"), &bytes, CntDataFormat::Int32, None).unwrap();
        assert_samples_close(&original, &loaded);
    }

    /// Two channels, three 16-bit samples, laid out at the Neuroscan offsets.
    fn hand_built_cnt() -> Vec<u8> {
        let mut bytes = vec![0u8; 900 + 2 * 75];
        bytes[370..372].copy_from_slice(&2u16.to_le_bytes());
        bytes[376..378].copy_from_slice(&250u16.to_le_bytes());
        bytes[864..868].copy_from_slice(&3u32.to_le_bytes());
        bytes[886..890].copy_from_slice(&(900i32 + 150 + 12).to_le_bytes());
        bytes[894..898].copy_from_slice(&2i32.to_le_bytes());
        // Fz: baseline 0, 204.8 * 1.0 / 204.8 = 1 µV per LSB
        bytes[900..902].copy_from_slice(b"Fz");
        bytes[947..949].copy_from_slice(&0i16.to_le_bytes());
        bytes[959..963].copy_from_slice(&204.8f32.to_le_bytes());
        bytes[971..975].copy_from_slice(&1.0f32.to_le_bytes());
        // Pz: baseline 10, 20.48 * 2.0 / 204.8 = 0.2 µV per LSB
        bytes[975..977].copy_from_slice(b"Pz");
        bytes[1022..1024].copy_from_slice(&10i16.to_le_bytes());
        bytes[1034..1038].copy_from_slice(&20.48f32.to_le_bytes());
        bytes[1046..1050].copy_from_slice(&2.0f32.to_le_bytes());
        for value in [100i16, 60, -50, 10, 7, -90] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 0]);
        bytes
    }

    #[test]
    fn decodes_hand_built_neuroscan_bytes() {
        let loaded = parse_cnt(
            Path::new("hand.cnt"),
            &hand_built_cnt(),
            CntDataFormat::Auto,
            None,
        )
        .unwrap();
        assert_eq!(loaded.channel_names(), vec!["Fz", "Pz"]);
        assert_eq!(loaded.sample_count(), 3);
        assert_eq!(loaded.sfreq, 250.0);
        let expected = [[100.0, -50.0, 7.0], [10.0, 0.0, -20.0]];
        for (channel, want) in loaded.channels.iter().zip(expected) {
            for (got, uv) in channel.samples.iter().zip(want) {
                assert!((got - uv * 1e-6).abs() < 1e-9, "{} vs {} µV", got, uv);
            }
        }
    }

    #[test]
    fn reads_past_the_end_name_the_file() {
        let bytes = hand_built_cnt();
        let raw = CntBytes {
            path: Path::new("hand.cnt"),
            bytes: &bytes,
        };
        match raw.i32(bytes.len() - 2) {
            Err(QcError::CorruptFile { path, .. }) => assert_eq!(path, Path::new("hand.cnt")),
            other => panic!("expected a corrupt-file error, got {:?}", other),
        }
        assert!(raw.slice(usize::MAX, 4).is_err());
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let err = parse_cnt(Path::new("short.cnt"), &[0u8; 100], CntDataFormat::Auto, None)
            .unwrap_err();
        assert!(matches!(err, QcError::CorruptFile { .. }));
    }

    #[test]
    fn honours_cancellation() {
        let original = sample_recording(10);
        let bytes = encode_cnt(&original, 2, 1).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = parse_cnt(Path::new("c.cnt"), &bytes, CntDataFormat::Auto, Some(&token))
            .unwrap_err();
        assert!(matches!(err, QcError::Cancelled));
    }
}
