use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use eegqc_lib::{
    config::{ChannelCleanup, NormalizeMode},
    io::{self as eeg_io, brainvision, cnt, ReadOptions},
    montage::{normalize_with, CanonicalLayout},
    plot::{figure_from_run, Figure, PlotBackend, Series},
    synth::{self, SyntheticSpec},
    BridgeRun, Pipeline, ProgressEvent, QcConfig,
};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle, TextStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "eegqc",
    version,
    about = "Detect bridged electrodes in EEG recordings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// Exact match, then vendor label cleanup and old 10-20 aliases
    Alias,
    /// Case-insensitive exact match only
    Exact,
}

impl From<Mode> for NormalizeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Alias => NormalizeMode::Alias,
            Mode::Exact => NormalizeMode::Exact,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search a .cnt, .vhdr or .zip recording for bridged electrodes and print JSON
    Detect {
        file: PathBuf,
        /// TOML file with [reader], [normalize] and [bridge] tables
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Apply the fixed drop/rename table of the legacy Neuroscan cap
        #[arg(long)]
        legacy_remap: bool,
        /// Write a topographic PNG of the result
        #[arg(long)]
        png: Option<PathBuf>,
        /// Write the median electrical distance matrix as CSV
        #[arg(long)]
        matrix_csv: Option<PathBuf>,
    },
    /// Show how channel labels map onto the 10-20 layout
    Channels {
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        #[arg(long)]
        legacy_remap: bool,
    },
    /// Print the standard electrode layout as JSON
    Layout,
    /// Write a synthetic recording with known bridges (.cnt or .vhdr)
    Simulate {
        #[arg(long)]
        out: PathBuf,
        /// Comma-separated channel names; the 19 classic 10-20 sites by default
        #[arg(long, value_delimiter = ',')]
        channels: Vec<String>,
        /// Bridged pair as CH1:CH2; repeatable
        #[arg(long = "bridge")]
        bridges: Vec<String>,
        #[arg(long, default_value_t = 250.0)]
        fs: f64,
        #[arg(long, default_value_t = 20.0)]
        duration: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 20.0)]
        noise_uv: f64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect {
            file,
            config,
            mode,
            legacy_remap,
            png,
            matrix_csv,
        } => {
            let config = load_config(config.as_deref(), mode, legacy_remap)?;
            cmd_detect(&file, config, png.as_deref(), matrix_csv.as_deref())?
        }
        Commands::Channels {
            file,
            config,
            mode,
            legacy_remap,
        } => {
            let config = load_config(config.as_deref(), mode, legacy_remap)?;
            cmd_channels(&file, &config)?
        }
        Commands::Layout => cmd_layout()?,
        Commands::Simulate {
            out,
            channels,
            bridges,
            fs,
            duration,
            seed,
            noise_uv,
        } => cmd_simulate(&out, channels, &bridges, fs, duration, seed, noise_uv)?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>, mode: Option<Mode>, legacy_remap: bool) -> Result<QcConfig> {
    let mut config = match path {
        Some(path) => QcConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => QcConfig::default(),
    };
    if let Some(mode) = mode {
        config.normalize.mode = mode.into();
    }
    if legacy_remap {
        config.reader.channel_cleanup = ChannelCleanup::Legacy;
    }
    config.validate()?;
    Ok(config)
}

fn stderr_progress(event: ProgressEvent) {
    eprintln!("{}", event);
}

#[derive(Serialize)]
struct DetectOutput<'a> {
    source: &'a str,
    sfreq: f64,
    duration_s: f64,
    channels: Vec<&'a str>,
    bridged: Vec<(String, String)>,
    bridged_idx: &'a [(usize, usize)],
    threshold: Option<f64>,
    epochs: usize,
    dropped: &'a [String],
}

impl<'a> DetectOutput<'a> {
    fn from_run(run: &'a BridgeRun) -> Self {
        Self {
            source: &run.source,
            sfreq: run.sfreq,
            duration_s: run.duration_s,
            channels: run.report.channels.iter().map(|ch| ch.name.as_str()).collect(),
            bridged: run.report.bridged_names(),
            bridged_idx: &run.report.bridged,
            threshold: run.report.threshold,
            epochs: run.report.epochs,
            dropped: &run.dropped,
        }
    }
}

fn cmd_detect(
    file: &Path,
    config: QcConfig,
    png: Option<&Path>,
    matrix_csv: Option<&Path>,
) -> Result<()> {
    let run = Pipeline::new(config).run(file, &mut stderr_progress)?;
    if let Some(path) = png {
        PngBackend::new(path).draw(&figure_from_run(&run))?;
        log::info!("wrote {}", path.display());
    }
    if let Some(path) = matrix_csv {
        write_matrix_csv(path, &run)?;
        log::info!("wrote {}", path.display());
    }
    println!("{}", serde_json::to_string(&DetectOutput::from_run(&run))?);
    Ok(())
}

#[derive(Serialize)]
struct ChannelRow<'a> {
    label: &'a str,
    name: Option<&'a str>,
    position: Option<[f64; 3]>,
    position_2d: Option<[f64; 2]>,
}

fn cmd_channels(file: &Path, config: &QcConfig) -> Result<()> {
    let recording = eeg_io::load_with(
        file,
        &ReadOptions::from(&config.reader),
        &mut stderr_progress,
    )?;
    let normalized = normalize_with(
        recording,
        CanonicalLayout::standard_1020(),
        &config.normalize,
    );
    for channel in &normalized.channels {
        let row = ChannelRow {
            label: &channel.source_name,
            name: Some(channel.name.as_str()),
            position: Some(channel.position),
            position_2d: Some(channel.position_2d),
        };
        println!("{}", serde_json::to_string(&row)?);
    }
    for label in &normalized.dropped {
        let row = ChannelRow {
            label,
            name: None,
            position: None,
            position_2d: None,
        };
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

fn cmd_layout() -> Result<()> {
    let layout = CanonicalLayout::standard_1020();
    println!("{}", serde_json::to_string(layout.electrodes())?);
    Ok(())
}

#[derive(Serialize)]
struct SimulateOutput<'a> {
    out: String,
    channels: usize,
    samples: usize,
    bridges: &'a [(String, String)],
}

fn cmd_simulate(
    out: &Path,
    channels: Vec<String>,
    bridges: &[String],
    fs: f64,
    duration: f64,
    seed: u64,
    noise_uv: f64,
) -> Result<()> {
    let mut spec = SyntheticSpec {
        sfreq: fs,
        duration_s: duration,
        seed,
        noise_uv,
        bridges: bridges
            .iter()
            .map(|b| synth::parse_bridge(b))
            .collect::<Result<_, _>>()?,
        ..SyntheticSpec::default()
    };
    if !channels.is_empty() {
        spec.channels = channels;
    }
    let recording = synth::generate(&spec)?;
    let ext = out
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "cnt" => cnt::write_cnt(out, &recording)?,
        "vhdr" => {
            brainvision::write_brainvision(out, &recording)?;
        }
        _ => bail!(
            "cannot write {}: use a .cnt or .vhdr output path",
            out.display()
        ),
    }
    let summary = SimulateOutput {
        out: out.display().to_string(),
        channels: recording.channel_count(),
        samples: recording.sample_count(),
        bridges: &spec.bridges,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn write_matrix_csv(path: &Path, run: &BridgeRun) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let names: Vec<&str> = run.report.channels.iter().map(|ch| ch.name.as_str()).collect();
    let mut header = vec![""];
    header.extend(&names);
    wtr.write_record(&header)?;
    for (name, row) in names.iter().zip(run.report.distances.to_rows()) {
        let mut record = vec![name.to_string()];
        record.extend(
            row.into_iter()
                .map(|v| v.map(|ed| format!("{:.4}", ed)).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            size: (640, 640),
        }
    }
}

fn rgb(color: eegqc_lib::plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

impl PlotBackend for PngBackend {
    type Error = anyhow::Error;

    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let (x_min, x_max, y_min, y_max) = fig
            .bounds()
            .ok_or_else(|| anyhow!("nothing to draw"))?;
        let pad = 0.1;
        let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Bridged electrodes".into()),
                ("sans-serif", 24),
            )
            .build_cartesian_2d(x_min - pad..x_max + pad, y_min - pad..y_max + pad)?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let color = rgb(line.style.color);
                    chart.draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        color.stroke_width(line.style.width.round().max(1.0) as u32),
                    ))?;
                }
                Series::Points(points) => {
                    let color = rgb(points.style.color);
                    chart.draw_series(
                        points
                            .points
                            .iter()
                            .map(|p| Circle::new((p[0], p[1]), points.radius, color.filled())),
                    )?;
                    let label_style = TextStyle::from(FontDesc::new(
                        FontFamily::SansSerif,
                        12.0,
                        FontStyle::Normal,
                    ));
                    chart.draw_series(points.points.iter().zip(&points.labels).map(
                        |(p, label)| {
                            Text::new(
                                label.clone(),
                                (p[0] + 0.02, p[1] + 0.02),
                                label_style.clone(),
                            )
                        },
                    ))?;
                }
            }
        }
        root.present()?;
        Ok(())
    }
}
