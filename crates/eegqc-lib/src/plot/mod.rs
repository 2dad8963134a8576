use crate::pipeline::BridgeRun;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const HEAD: Color = Color(0x333333);
    pub const ELECTRODE: Color = Color(0x1F77B4);
    pub const BRIDGE: Color = Color(0xD62728);

    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Scatter with one optional text label per point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub labels: Vec<String>,
    pub radius: u32,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Points(PointSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Points(points) => &points.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over all series, or `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        Some(points.fold(
            (first[0], first[0], first[1], first[1]),
            |(x0, x1, y0, y1), p| (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1])),
        ))
    }
}

/// Renderer for a [`Figure`].
pub trait PlotBackend {
    type Error;

    fn draw(&mut self, fig: &Figure) -> Result<(), Self::Error>;
}

const OUTLINE_SEGMENTS: usize = 128;

/// Unit-radius head with nose and ears, in projected coordinates.
pub fn head_outline() -> Vec<Series> {
    let style = Style {
        width: 2.0,
        color: Color::HEAD,
    };
    let circle: Vec<[f64; 2]> = (0..=OUTLINE_SEGMENTS)
        .map(|i| {
            let t = 2.0 * PI * i as f64 / OUTLINE_SEGMENTS as f64;
            [t.cos(), t.sin()]
        })
        .collect();
    let nose = vec![[-0.09, 0.995], [0.0, 1.12], [0.09, 0.995]];
    let ear = |side: f64| -> Vec<[f64; 2]> {
        (0..=16)
            .map(|i| {
                let t = -PI / 2.0 + PI * i as f64 / 16.0;
                [side * (1.0 + 0.06 * t.cos()), 0.14 * t.sin()]
            })
            .collect()
    };
    [("head", circle), ("nose", nose), ("left ear", ear(-1.0)), ("right ear", ear(1.0))]
        .into_iter()
        .map(|(name, points)| {
            Series::Line(LineSeries {
                name: name.into(),
                points,
                style: style.clone(),
            })
        })
        .collect()
}

/// Topographic view of a run: head outline, labelled electrodes and one
/// line per bridged pair.
pub fn figure_from_run(run: &BridgeRun) -> Figure {
    let mut fig = Figure::new(Some(run.title()));
    for outline in head_outline() {
        fig.add_series(outline);
    }
    let channels = &run.report.channels;
    for &(i, j) in &run.report.bridged {
        fig.add_series(Series::Line(LineSeries {
            name: format!("{}-{}", channels[i].name, channels[j].name),
            points: vec![channels[i].position_2d, channels[j].position_2d],
            style: Style {
                width: 3.0,
                        color: Color::BRIDGE,
            },
        }));
    }
    fig.add_series(Series::Points(PointSeries {
        name: "electrodes".into(),
        points: channels.iter().map(|ch| ch.position_2d).collect(),
        labels: channels.iter().map(|ch| ch.name.clone()).collect(),
        radius: 4,
        style: Style {
            width: 1.0,
                color: Color::ELECTRODE,
        },
    }));
    fig
}
