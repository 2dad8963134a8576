//! Canonical 10-20 / 10-10 electrode layout on a spherical head.
//!
//! Head coordinates: +x towards the right ear, +y towards the nasion, +z
//! through the vertex (Cz). Fpz, T7, Oz and T8 sit on the equator.

use serde::Serialize;
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::OnceLock;

/// Head radius in metres.
pub const HEAD_RADIUS: f64 = 0.095;

/// Standard electrode with its position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Electrode {
    pub name: &'static str,
    /// 3-D head coordinates in metres.
    pub pos: [f64; 3],
    /// Azimuthal equidistant projection, unit radius at the equator.
    pub pos2d: [f64; 2],
}

/// Immutable lookup table of standard electrode positions.
#[derive(Debug)]
pub struct CanonicalLayout {
    electrodes: Vec<Electrode>,
    by_lower: HashMap<String, usize>,
}

/// (row prefix, midline polar angle, lateral azimuth); polar angles are
/// positive towards the nasion, azimuths measured from the nose.
const ROWS: [(&str, f64, f64); 7] = [
    ("AF", 67.5, 36.0),
    ("F", 45.0, 54.0),
    ("FC", 22.5, 72.0),
    ("C", 0.0, 90.0),
    ("CP", -22.5, 108.0),
    ("P", -45.0, 126.0),
    ("PO", -67.5, 144.0),
];

/// Extra sites given as (name, polar angle from vertex, azimuth from nose, side).
const EXTRA_SITES: [(&str, f64, f64, f64); 6] = [
    ("Nz", 112.5, 0.0, 0.0),
    ("Iz", 112.5, 180.0, 0.0),
    ("A1", 112.5, 90.0, -1.0),
    ("A2", 112.5, 90.0, 1.0),
    ("M1", 120.0, 112.0, -1.0),
    ("M2", 120.0, 112.0, 1.0),
];

impl CanonicalLayout {
    /// Process-wide standard layout, built on first use.
    pub fn standard_1020() -> &'static CanonicalLayout {
        static LAYOUT: OnceLock<CanonicalLayout> = OnceLock::new();
        LAYOUT.get_or_init(build_standard_1020)
    }

    fn from_electrodes(electrodes: Vec<Electrode>) -> Self {
        let by_lower = electrodes
            .iter()
            .enumerate()
            .map(|(idx, el)| (el.name.to_ascii_lowercase(), idx))
            .collect();
        Self {
            electrodes,
            by_lower,
        }
    }

    /// Case-insensitive exact lookup.
    pub fn get(&self, name: &str) -> Option<&Electrode> {
        self.by_lower
            .get(&name.trim().to_ascii_lowercase())
            .map(|&idx| &self.electrodes[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn electrodes(&self) -> &[Electrode] {
        &self.electrodes
    }

    pub fn len(&self) -> usize {
        self.electrodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.electrodes.is_empty()
    }
}

fn build_standard_1020() -> CanonicalLayout {
    let mut sites: Vec<(&'static str, [f64; 3])> = Vec::new();

    // Fp and O rows run along the equator.
    let front = equator(0.0, 0.0);
    let back = equator(180.0, 0.0);
    sites.push(("Fp1", equator(18.0, -1.0)));
    sites.push(("Fpz", front));
    sites.push(("Fp2", equator(18.0, 1.0)));
    for (row, mid_angle, lateral_az) in ROWS {
        let mid = midline(mid_angle);
        for column in 1..=10u8 {
            let side = if column % 2 == 1 { -1.0 } else { 1.0 };
            let frac = f64::from(column.div_ceil(2)) / 4.0;
            let pos = slerp(mid, equator(lateral_az, side), frac);
            sites.push((site_name(row, column), pos));
        }
        sites.push((site_name(row, 0), mid));
    }
    sites.push(("O1", equator(162.0, -1.0)));
    sites.push(("Oz", back));
    sites.push(("O2", equator(162.0, 1.0)));
    sites.push(("O9", slerp(back, equator(162.0, -1.0), 1.25)));
    sites.push(("O10", slerp(back, equator(162.0, 1.0), 1.25)));
    for (name, polar, azimuth, side) in EXTRA_SITES {
        sites.push((name, spherical(polar, azimuth, side)));
    }

    let electrodes = sites
        .into_iter()
        .map(|(name, unit)| Electrode {
            name,
            pos: unit.map(|v| v * HEAD_RADIUS),
            pos2d: project(unit),
        })
        .collect();
    CanonicalLayout::from_electrodes(electrodes)
}

/// Label for `row` and `column` (0 = midline). Columns 7-10 of the
/// fronto-central, central and centro-parietal rows use temporal names.
fn site_name(row: &str, column: u8) -> &'static str {
    const NAMES: [[&str; 11]; 7] = [
        ["AFz", "AF1", "AF2", "AF3", "AF4", "AF5", "AF6", "AF7", "AF8", "AF9", "AF10"],
        ["Fz", "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10"],
        ["FCz", "FC1", "FC2", "FC3", "FC4", "FC5", "FC6", "FT7", "FT8", "FT9", "FT10"],
        ["Cz", "C1", "C2", "C3", "C4", "C5", "C6", "T7", "T8", "T9", "T10"],
        ["CPz", "CP1", "CP2", "CP3", "CP4", "CP5", "CP6", "TP7", "TP8", "TP9", "TP10"],
        ["Pz", "P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8", "P9", "P10"],
        ["POz", "PO1", "PO2", "PO3", "PO4", "PO5", "PO6", "PO7", "PO8", "PO9", "PO10"],
    ];
    let row_idx = ROWS
        .iter()
        .position(|(prefix, _, _)| *prefix == row)
        .unwrap_or(0);
    NAMES[row_idx][column as usize]
}

/// Point on the sagittal midline; positive angles lean towards the nasion.
fn midline(angle_deg: f64) -> [f64; 3] {
    let a = angle_deg.to_radians();
    [0.0, a.sin(), a.cos()]
}

/// Point on the equator at `azimuth_deg` from the nose; side -1 left, +1 right.
fn equator(azimuth_deg: f64, side: f64) -> [f64; 3] {
    let az = azimuth_deg.to_radians();
    [side * az.sin(), az.cos(), 0.0]
}

fn spherical(polar_deg: f64, azimuth_deg: f64, side: f64) -> [f64; 3] {
    let (polar, az) = (polar_deg.to_radians(), azimuth_deg.to_radians());
    [
        side * polar.sin() * az.sin(),
        polar.sin() * az.cos(),
        polar.cos(),
    ]
}

/// Great-circle interpolation between unit vectors; `t > 1` extrapolates.
fn slerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    let dot = (a[0] * b[0] + a[1] * b[1] + a[2] * b[2]).clamp(-1.0, 1.0);
    let omega = dot.acos();
    if omega.abs() < 1e-12 {
        return a;
    }
    let (wa, wb) = (
        ((1.0 - t) * omega).sin() / omega.sin(),
        (t * omega).sin() / omega.sin(),
    );
    [
        wa * a[0] + wb * b[0],
        wa * a[1] + wb * b[1],
        wa * a[2] + wb * b[2],
    ]
}

/// Azimuthal equidistant projection around the vertex.
fn project(unit: [f64; 3]) -> [f64; 2] {
    let polar = unit[2].clamp(-1.0, 1.0).acos();
    let radius = polar / FRAC_PI_2;
    let planar = unit[0].hypot(unit[1]);
    if planar < 1e-12 {
        return [0.0, 0.0];
    }
    [radius * unit[0] / planar, radius * unit[1] / planar]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: [f64; 3]) -> f64 {
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
    }

    #[test]
    fn layout_has_unique_standard_names() {
        let layout = CanonicalLayout::standard_1020();
        assert_eq!(layout.len(), 91);
        let mut names: Vec<_> = layout.electrodes().iter().map(|e| e.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), layout.len());
        for name in ["Fp1", "Fpz", "AFz", "FT9", "T7", "TP10", "PO8", "O10", "Iz", "M2"] {
            assert!(layout.contains(name), "{name} missing");
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let layout = CanonicalLayout::standard_1020();
        assert_eq!(layout.get("FPZ").map(|e| e.name), Some("Fpz"));
        assert_eq!(layout.get(" cz ").map(|e| e.name), Some("Cz"));
        assert!(layout.get("FOO").is_none());
    }

    #[test]
    fn positions_lie_on_head_sphere() {
        for electrode in CanonicalLayout::standard_1020().electrodes() {
            assert!(
                (norm(electrode.pos) - HEAD_RADIUS).abs() < 1e-9,
                "{} off sphere",
                electrode.name
            );
        }
    }

    #[test]
    fn hemispheres_follow_parity() {
        let layout = CanonicalLayout::standard_1020();
        let c3 = layout.get("C3").unwrap();
        let c4 = layout.get("C4").unwrap();
        let cz = layout.get("Cz").unwrap();
        assert!(c3.pos[0] < 0.0 && c4.pos[0] > 0.0);
        assert!((c3.pos[0] + c4.pos[0]).abs() < 1e-12);
        assert_eq!(cz.pos2d, [0.0, 0.0]);
        let t7 = layout.get("T7").unwrap();
        assert!((t7.pos2d[0] + 1.0).abs() < 1e-9);
        let fz = layout.get("Fz").unwrap();
        assert!(fz.pos[1] > 0.0 && layout.get("Pz").unwrap().pos[1] < 0.0);
    }
}
