//! Per-frame wind deformation of the static topology.
//!
//! Every frame is a pure function of the original points and elapsed time:
//!
//! * **Primary**: `x' = x + wind(t, y)·a + tremor(t, line, point)·a`,
//!   `y' = y`, where `a` is the point's anchored weight.  Points inside the
//!   dead zone have `a = 0` and therefore never move.
//! * **Bleed layers**: start from the already-deformed primary and add a
//!   second, smaller offset to both axes.  Rendered underneath at low
//!   opacity they read as ink soaking into paper.
//! * **Haze**: computed once from the undeformed tree, squashed into a
//!   band near the base, and never touched again.
//! * **Sway**: a single slow rotation of the whole tree about its base,
//!   applied to the root transform rather than to points.

use std::f32::consts::FRAC_PI_2;

use bevy::math::Vec2;

use crate::{
    hash::hash,
    topology::{Topology, anchored_weight},
};

/// A set of polylines, one `Vec` of points per line.
pub type Lines = Vec<Vec<Vec2>>;

/// Controls the primary layer's motion and the whole-tree sway.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct WindConfig {
    /// Height-weight fraction below which points are fully pinned.
    pub dead_zone: f32,
    /// Horizontal wind amplitude at full anchored weight.
    pub wind_amplitude: f32,
    /// Temporal frequency of the wind (rad/s).
    pub wind_frequency: f32,
    /// Phase change per world unit of height, so gusts travel up the tree.
    pub wind_height_phase: f32,
    /// Amplitude of the fast per-point tremor.
    pub tremor_amplitude: f32,
    pub tremor_frequency: f32,
    /// Tremor phase step between consecutive lines.
    pub tremor_line_phase: f32,
    /// Tremor phase step between consecutive points of one line.
    pub tremor_point_phase: f32,
    /// Peak sway of the whole tree (radians).
    pub sway_amplitude: f32,
    pub sway_frequency: f32,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            dead_zone: 0.10,
            wind_amplitude: 0.07,
            wind_frequency: 0.18,
            wind_height_phase: 1.2,
            tremor_amplitude: 0.003,
            tremor_frequency: 0.9,
            tremor_line_phase: 0.7,
            tremor_point_phase: 0.35,
            sway_amplitude: 0.12,
            sway_frequency: 0.14,
        }
    }
}

/// Error returned by [`WindConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum WindError {
    /// The anchoring dead zone was outside `[0, 1)`.
    DeadZoneOutOfRange(f32),
    /// An amplitude, frequency or phase was NaN or infinite.
    NonFinite { name: &'static str, value: f32 },
}

impl std::fmt::Display for WindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindError::DeadZoneOutOfRange(dz) => {
                write!(f, "anchoring dead zone must lie in [0, 1) (got {dz})")
            }
            WindError::NonFinite { name, value } => {
                write!(f, "wind {name} must be finite (got {value})")
            }
        }
    }
}

impl std::error::Error for WindError {}

impl WindConfig {
    pub fn validate(&self) -> Result<(), WindError> {
        if !(0.0..1.0).contains(&self.dead_zone) {
            return Err(WindError::DeadZoneOutOfRange(self.dead_zone));
        }
        for (name, value) in [
            ("wind_amplitude", self.wind_amplitude),
            ("wind_frequency", self.wind_frequency),
            ("wind_height_phase", self.wind_height_phase),
            ("tremor_amplitude", self.tremor_amplitude),
            ("tremor_frequency", self.tremor_frequency),
            ("tremor_line_phase", self.tremor_line_phase),
            ("tremor_point_phase", self.tremor_point_phase),
            ("sway_amplitude", self.sway_amplitude),
            ("sway_frequency", self.sway_frequency),
        ] {
            if !value.is_finite() {
                return Err(WindError::NonFinite { name, value });
            }
        }
        Ok(())
    }

    /// Rotation of the tree root about its base at time `t`.
    pub fn sway(&self, t: f32) -> f32 {
        (t * self.sway_frequency).sin() * self.sway_amplitude
    }
}

/// Motion of one "ink bleed" duplicate layer.
///
/// Offset per point: `o = amp·sin(freq·t + line_phase·line + phase)
/// + (hash(line_stride·line + point_stride·point) − 0.5)·jitter`, then
/// `x' = x + x_sign·o`, `y' = y + y_ratio·o`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BleedLayer {
    pub amplitude: f32,
    pub frequency: f32,
    pub line_phase: f32,
    /// Constant phase; `π/2` turns the sine into a cosine.
    pub phase: f32,
    /// Seed stride per line for the static jitter hash.
    pub jitter_line_stride: f64,
    /// Seed stride per point for the static jitter hash.
    pub jitter_point_stride: f64,
    /// Full width of the static jitter.
    pub jitter: f32,
    /// `1.0` pushes right with positive offsets, `-1.0` pushes left.
    pub x_sign: f32,
    /// Fraction of the offset applied vertically.
    pub y_ratio: f32,
}

impl BleedLayer {
    /// The nearer, stronger bleed.
    pub fn near() -> Self {
        Self {
            amplitude: 0.01,
            frequency: 0.22,
            line_phase: 1.0,
            phase: 0.0,
            jitter_line_stride: 10.0,
            jitter_point_stride: 1.0,
            jitter: 0.006,
            x_sign: 1.0,
            y_ratio: 0.35,
        }
    }

    /// The wider, fainter bleed, drifting opposite to [`near`](Self::near).
    pub fn far() -> Self {
        Self {
            amplitude: 0.016,
            frequency: 0.19,
            line_phase: 0.8,
            phase: FRAC_PI_2,
            jitter_line_stride: 20.0,
            jitter_point_stride: 2.0,
            jitter: 0.008,
            x_sign: -1.0,
            y_ratio: 0.2,
        }
    }

    #[inline]
    fn offset(&self, t: f32, line: usize, point: usize) -> f32 {
        let wave = (t * self.frequency + line as f32 * self.line_phase + self.phase).sin()
            * self.amplitude;
        let seed = line as f64 * self.jitter_line_stride + point as f64 * self.jitter_point_stride;
        wave + (hash(seed) - 0.5) as f32 * self.jitter
    }
}

/// Placement of the static haze band.
///
/// `x' = (x·x_scale + x_offset)·(1 − fade_spread + fade_spread·(1 − w))`,
/// `y' = root_y + band_offset + y·band_squash`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HazeConfig {
    pub band_offset: f32,
    pub band_squash: f32,
    pub x_scale: f32,
    pub x_offset: f32,
    pub fade_spread: f32,
}

impl Default for HazeConfig {
    fn default() -> Self {
        Self {
            band_offset: -0.12,
            band_squash: 0.05,
            x_scale: 1.05,
            x_offset: 0.22,
            fade_spread: 0.15,
        }
    }
}

/// Derive the haze polylines in world space.
///
/// Called once at scene start with the root's world height; the result is
/// a fixed decorative artifact.
pub fn haze_lines(topology: &Topology, root_y: f32, haze: &HazeConfig) -> Lines {
    topology
        .branches()
        .iter()
        .zip(topology.weights())
        .map(|(branch, weights)| {
            branch
                .points
                .iter()
                .zip(weights)
                .map(|(p, &w)| {
                    let fade = 1.0 - w;
                    let x = (p.x * haze.x_scale + haze.x_offset)
                        * (1.0 - haze.fade_spread + fade * haze.fade_spread);
                    Vec2::new(x, root_y + haze.band_offset + p.y * haze.band_squash)
                })
                .collect()
        })
        .collect()
}

/// Computes the primary layer from the topology and elapsed time.
pub struct InkDeformer {
    config: WindConfig,
    /// Anchored weight per point, cached because it depends only on the
    /// topology and the dead zone.
    anchored: Vec<Vec<f32>>,
}

impl InkDeformer {
    pub fn new(topology: &Topology, config: WindConfig) -> Self {
        let anchored = topology
            .weights()
            .iter()
            .map(|line| {
                line.iter()
                    .map(|&w| anchored_weight(w, config.dead_zone))
                    .collect()
            })
            .collect();
        Self { config, anchored }
    }

    pub fn config(&self) -> &WindConfig {
        &self.config
    }

    /// Overwrite `out` with the primary layer at time `t`.
    ///
    /// `out` must have the topology's shape (see [`InkFrame::new`]); its
    /// previous contents are ignored.
    pub fn deform_primary(&self, topology: &Topology, t: f32, out: &mut [Vec<Vec2>]) {
        let c = &self.config;
        for (li, ((branch, anchored), line)) in topology
            .branches()
            .iter()
            .zip(&self.anchored)
            .zip(out.iter_mut())
            .enumerate()
        {
            for (pi, ((p0, &a), p)) in branch
                .points
                .iter()
                .zip(anchored)
                .zip(line.iter_mut())
                .enumerate()
            {
                let tremor = (t * c.tremor_frequency
                    + li as f32 * c.tremor_line_phase
                    + pi as f32 * c.tremor_point_phase)
                    .sin()
                    * c.tremor_amplitude
                    * a;
                let wind = (t * c.wind_frequency + p0.y * c.wind_height_phase).sin()
                    * c.wind_amplitude
                    * a;
                *p = Vec2::new(p0.x + wind + tremor, p0.y);
            }
        }
    }
}

/// Overwrite `out` with a bleed layer derived from the deformed `primary`.
pub fn deform_bleed(primary: &[Vec<Vec2>], layer: &BleedLayer, t: f32, out: &mut [Vec<Vec2>]) {
    for (li, (src, dst)) in primary.iter().zip(out.iter_mut()).enumerate() {
        for (pi, (p, q)) in src.iter().zip(dst.iter_mut()).enumerate() {
            let o = layer.offset(t, li, pi);
            *q = Vec2::new(p.x + layer.x_sign * o, p.y + layer.y_ratio * o);
        }
    }
}

/// Reusable per-frame vertex buffers for the primary and bleed layers.
pub struct InkFrame {
    pub primary: Lines,
    pub bleeds: Vec<Lines>,
}

impl InkFrame {
    /// Allocate buffers shaped like `topology` for `bleed_count` bleeds.
    pub fn new(topology: &Topology, bleed_count: usize) -> Self {
        let lines = topology.lines();
        Self {
            bleeds: vec![lines.clone(); bleed_count],
            primary: lines,
        }
    }

    /// Recompute every live layer for time `t`.
    pub fn render(
        &mut self,
        deformer: &InkDeformer,
        topology: &Topology,
        bleeds: &[BleedLayer],
        t: f32,
    ) {
        deformer.deform_primary(topology, t, &mut self.primary);
        for (layer, out) in bleeds.iter().zip(self.bleeds.iter_mut()) {
            deform_bleed(&self.primary, layer, t, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeConfig;

    fn topology() -> Topology {
        Topology::generate(&TreeConfig::default(), Vec2::ZERO).unwrap()
    }

    fn bleeds() -> [BleedLayer; 2] {
        [BleedLayer::near(), BleedLayer::far()]
    }

    #[test]
    fn pinned_base_never_moves_over_twenty_seconds() {
        let topo = topology();
        let config = WindConfig::default();
        let dead_zone = config.dead_zone;
        let deformer = InkDeformer::new(&topo, config);
        let mut frame = InkFrame::new(&topo, 2);

        let dt = 1.0 / 60.0;
        let mut pinned_checked = 0usize;
        for step in 0..(20 * 60) {
            let t = step as f32 * dt;
            frame.render(&deformer, &topo, &bleeds(), t);
            for ((branch, weights), line) in topo
                .branches()
                .iter()
                .zip(topo.weights())
                .zip(&frame.primary)
            {
                for ((p0, &w), p) in branch.points.iter().zip(weights).zip(line) {
                    if w < dead_zone {
                        assert!(
                            (p.x - p0.x).abs() <= f32::EPSILON && p.y == p0.y,
                            "pinned point {p0} moved to {p} at t={t}"
                        );
                        pinned_checked += 1;
                    }
                }
            }
        }
        assert!(pinned_checked > 0, "no points inside the dead zone");
    }

    #[test]
    fn pinned_points_are_bit_exact() {
        let topo = topology();
        let deformer = InkDeformer::new(&topo, WindConfig::default());
        let mut out = topo.lines();
        deformer.deform_primary(&topo, 1234.5, &mut out);
        assert_eq!(out[0][0], topo.branches()[0].points[0]);
    }

    #[test]
    fn canopy_moves_and_y_is_preserved() {
        let topo = topology();
        let deformer = InkDeformer::new(&topo, WindConfig::default());
        let mut out = topo.lines();
        deformer.deform_primary(&topo, 7.0, &mut out);
        let mut moved = 0;
        for (branch, line) in topo.branches().iter().zip(&out) {
            for (p0, p) in branch.points.iter().zip(line) {
                assert_eq!(p0.y, p.y);
                if p0.x != p.x {
                    moved += 1;
                }
            }
        }
        assert!(moved > topo.point_count() / 2, "only {moved} points moved");
    }

    #[test]
    fn frame_is_pure_function_of_time() {
        let topo = topology();
        let deformer = InkDeformer::new(&topo, WindConfig::default());
        let mut a = InkFrame::new(&topo, 2);
        let mut b = InkFrame::new(&topo, 2);
        // Advance `a` through a long history first; no drift may accumulate.
        for step in 0..300 {
            a.render(&deformer, &topo, &bleeds(), step as f32 * 0.1);
        }
        a.render(&deformer, &topo, &bleeds(), 3.0);
        b.render(&deformer, &topo, &bleeds(), 3.0);
        assert_eq!(a.primary, b.primary);
        assert_eq!(a.bleeds, b.bleeds);
    }

    #[test]
    fn bleed_layers_differ_from_primary_and_each_other() {
        let topo = topology();
        let deformer = InkDeformer::new(&topo, WindConfig::default());
        let mut frame = InkFrame::new(&topo, 2);
        frame.render(&deformer, &topo, &bleeds(), 2.5);
        assert_ne!(frame.primary, frame.bleeds[0]);
        assert_ne!(frame.primary, frame.bleeds[1]);
        assert_ne!(frame.bleeds[0], frame.bleeds[1]);

        // Bleed offsets stay small: amplitude plus half the jitter.
        for (layer, lines) in bleeds().iter().zip(&frame.bleeds) {
            let bound = layer.amplitude + layer.jitter * 0.5 + 1e-5;
            for (src, dst) in frame.primary.iter().zip(lines) {
                for (p, q) in src.iter().zip(dst) {
                    assert!((q.x - p.x).abs() <= bound);
                }
            }
        }
    }

    #[test]
    fn haze_is_a_flat_band_near_the_root() {
        let topo = topology();
        let root_y = -8.5;
        let haze = HazeConfig::default();
        let lines = haze_lines(&topo, root_y, &haze);
        assert_eq!(lines.len(), topo.branch_count());
        let top = topo
            .branches()
            .iter()
            .flat_map(|b| b.points.iter())
            .map(|p| p.y)
            .fold(f32::MIN, f32::max);
        for p in lines.iter().flatten() {
            assert!(p.y >= root_y + haze.band_offset - 1.0);
            assert!(p.y <= root_y + haze.band_offset + top * haze.band_squash + 1e-4);
        }
        assert_eq!(lines, haze_lines(&topo, root_y, &haze));
    }

    #[test]
    fn sway_is_bounded_and_starts_upright() {
        let wind = WindConfig::default();
        assert_eq!(wind.sway(0.0), 0.0);
        for i in 0..1000 {
            assert!(wind.sway(i as f32 * 0.5).abs() <= wind.sway_amplitude);
        }
    }

    #[test]
    fn dead_zone_is_validated() {
        let bad = WindConfig {
            dead_zone: 1.0,
            ..WindConfig::default()
        };
        assert_eq!(bad.validate(), Err(WindError::DeadZoneOutOfRange(1.0)));
        let wild = WindConfig {
            tremor_frequency: f32::INFINITY,
            ..WindConfig::default()
        };
        assert!(matches!(
            wild.validate(),
            Err(WindError::NonFinite {
                name: "tremor_frequency",
                ..
            })
        ));
        assert!(WindConfig::default().validate().is_ok());
    }
}
