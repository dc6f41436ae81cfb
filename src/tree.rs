//! Recursive branch generator for the dead ink tree.
//!
//! A call to [`BranchGenerator::grow`] walks one polyline forward from its
//! start point, then recurses:
//!
//!  1. **Body**: `10..20` steps (count from `hash(seed + 10)`).  Each step
//!     heading is `angle + bend·t² − droop·t² + jitter`, with `t` the
//!     fraction of the branch walked so far.
//!  2. **Tip**: either a split into two diverging children or a single
//!     continuation.  The split probability falls off linearly as the tree
//!     gets deeper and is kept inside `[0.35, 0.95]`.
//!  3. **Twigs**: 2–6 candidate sprouts at hash-selected interior points,
//!     each gated twice (`sprout_along_chance`, `twig_spray_chance`) and
//!     recursing with `depth − 2`.
//!
//! All randomness is drawn from [`hash`] on fixed offsets of the parent seed,
//! so one seed always reproduces the same topology bit for bit.  Children
//! start *exactly* at the parent point they attach to; the tree has no gaps.

use std::f64::consts::FRAC_PI_2;

use bevy::math::{DVec2, Vec2};

use crate::hash::{hash, hash_centered};

// --- tuning constants -------------------------------------------------------

/// Minimum number of steps walked along one branch.
const MIN_STEPS: usize = 10;

/// Number of additional steps the seed may add (exclusive upper bound).
const STEP_RANGE: f64 = 10.0;

/// Multiplier applied to the step index when deriving per-step jitter seeds.
const STEP_SEED_STRIDE: f64 = 3.17;

/// Fraction of the chaos jitter that reaches the heading.
const JITTER_TO_HEADING: f64 = 0.35;

/// Split probability lost per level below the configured root depth.
const SPLIT_DECAY: f64 = 0.06;

/// Bounds for the split probability.
const SPLIT_CHANCE_MIN: f64 = 0.35;
const SPLIT_CHANCE_MAX: f64 = 0.95;

/// Child length as a fraction of the parent: `0.54 + hash · 0.2`.
const CHILD_LEN_BASE: f64 = 0.54;
const CHILD_LEN_RANGE: f64 = 0.2;

/// Split spread angle: `0.6 + hash · 0.6` radians.
const SPREAD_BASE: f64 = 0.6;
const SPREAD_RANGE: f64 = 0.6;

/// Maximum heading deviation of a single continuation.
const CONTINUE_DEVIATION: f64 = 0.55;

/// Seed offsets for the children.
const SEED_SPLIT_A: f64 = 1.11;
const SEED_SPLIT_B: f64 = 2.22;
const SEED_CONTINUE: f64 = 3.33;

/// Twig candidates per branch: `2 + floor(hash · 5)`, i.e. 2..=6.
const TWIG_MIN: usize = 2;
const TWIG_RANGE: f64 = 5.0;

/// Interior attachment window along the parent: `0.22 + hash · 0.62`.
const TWIG_ATTACH_BASE: f64 = 0.22;
const TWIG_ATTACH_RANGE: f64 = 0.62;

/// Twig length as a fraction of the parent: `0.16 + hash · 0.28`.
const TWIG_LEN_BASE: f64 = 0.16;
const TWIG_LEN_RANGE: f64 = 0.28;

/// Twig angular spread: `1.35 + 0.22 · levels below root`.
const TWIG_SPREAD_BASE: f64 = 1.35;
const TWIG_SPREAD_PER_LEVEL: f64 = 0.22;

/// Fraction of the droop that bends twigs further down.
const TWIG_DROOP: f64 = 0.65;

/// Twig seed: `seed + 10 + k · 0.77`.
const TWIG_SEED_BASE: f64 = 10.0;
const TWIG_SEED_STRIDE: f64 = 0.77;

/// Largest accepted recursion depth.
///
/// Branch count grows roughly as `3^depth`; at 12 the tree already carries
/// hundreds of thousands of vertices.
pub const MAX_DEPTH: i32 = 12;

// --- errors -----------------------------------------------------------------

/// Error returned when a tree configuration cannot produce a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeError {
    /// `depth` was zero or negative; the tree would be a bare trunk.
    ZeroDepth,
    /// `depth` exceeded [`MAX_DEPTH`].
    DepthTooLarge { depth: i32, max: i32 },
    /// `trunk_len` was zero, negative, or not finite.
    NonPositiveTrunk(f64),
    /// A probability field was outside `[0, 1]`.
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    /// A shape or seed field was NaN or infinite.
    NonFinite { name: &'static str, value: f64 },
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::ZeroDepth => write!(f, "tree depth must be at least 1"),
            TreeError::DepthTooLarge { depth, max } => {
                write!(f, "tree depth {depth} exceeds MAX_DEPTH={max}")
            }
            TreeError::NonPositiveTrunk(len) => {
                write!(f, "trunk length must be positive and finite (got {len})")
            }
            TreeError::ProbabilityOutOfRange { name, value } => {
                write!(f, "{name} must lie in [0, 1] (got {value})")
            }
            TreeError::NonFinite { name, value } => {
                write!(f, "{name} must be finite (got {value})")
            }
        }
    }
}

impl std::error::Error for TreeError {}

// --- config -----------------------------------------------------------------

/// How per-point height weights are normalised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WeightNormalization {
    /// Divide the height above the base by the configured trunk length.
    /// Branches that climb past the trunk's span clamp to 1.
    #[default]
    TrunkLength,
    /// Divide by the height of the tallest generated point, so the canopy
    /// tip is exactly 1.
    TallestPoint,
}

/// Configures the shape of a [`BranchGenerator`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TreeConfig {
    /// Recursion depth of the trunk call.
    pub depth: i32,
    /// Length of the trunk in world units.
    pub trunk_len: f64,
    /// Split probability at the trunk; decays with depth.
    pub base_split_chance: f64,
    /// Probability that a twig candidate sprouts at all.
    pub sprout_along_chance: f64,
    /// Probability that a sprouted candidate actually grows.
    pub twig_spray_chance: f64,
    /// Quadratic downward bend along each branch (radians at the tip).
    pub droop: f64,
    /// Quadratic bend along each branch (radians at the tip).
    pub bend: f64,
    /// Amplitude of per-step heading jitter.
    pub chaos: f64,
    /// Seed of the trunk call.
    pub seed: f64,
    /// Initial heading of the trunk in radians (`π/2` = straight up).
    pub trunk_angle: f64,
    pub normalization: WeightNormalization,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            depth: 8,
            trunk_len: 3.8,
            base_split_chance: 0.9,
            sprout_along_chance: 0.86,
            twig_spray_chance: 0.96,
            droop: 0.2,
            bend: 0.22,
            chaos: 0.26,
            seed: 1.2345,
            trunk_angle: FRAC_PI_2,
            normalization: WeightNormalization::TrunkLength,
        }
    }
}

impl TreeConfig {
    /// Reject configurations that would produce degenerate geometry.
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.depth <= 0 {
            return Err(TreeError::ZeroDepth);
        }
        if self.depth > MAX_DEPTH {
            return Err(TreeError::DepthTooLarge {
                depth: self.depth,
                max: MAX_DEPTH,
            });
        }
        if !(self.trunk_len.is_finite() && self.trunk_len > 0.0) {
            return Err(TreeError::NonPositiveTrunk(self.trunk_len));
        }
        for (name, value) in [
            ("seed", self.seed),
            ("trunk_angle", self.trunk_angle),
            ("bend", self.bend),
            ("droop", self.droop),
            ("chaos", self.chaos),
        ] {
            if !value.is_finite() {
                return Err(TreeError::NonFinite { name, value });
            }
        }
        for (name, value) in [
            ("base_split_chance", self.base_split_chance),
            ("sprout_along_chance", self.sprout_along_chance),
            ("twig_spray_chance", self.twig_spray_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TreeError::ProbabilityOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

// --- output -----------------------------------------------------------------

/// Where a branch hangs off its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// Index of the parent in the generator's output list.
    pub parent: usize,
    /// Index of the parent point this branch starts at.
    pub point: usize,
    /// `true` for an interior twig, `false` for a tip split/continuation.
    pub twig: bool,
}

/// One generated polyline.
#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    /// Points from the attachment point to the tip.
    pub points: Vec<Vec2>,
    /// Remaining recursion depth the branch was grown with.
    pub depth: i32,
    /// Seed the branch was grown from.
    pub seed: f64,
    /// Number of recursive calls between the trunk and this branch.
    pub level: u32,
    /// `None` for the trunk.
    pub attachment: Option<Attachment>,
}

impl Branch {
    /// Last point of the polyline.
    pub fn tip(&self) -> Vec2 {
        self.points[self.points.len() - 1]
    }
}

/// Procedural branch generator.
///
/// Construct with a [`TreeConfig`] and call [`grow`](Self::grow) for a raw
/// recursive expansion, or [`grow_tree`](Self::grow_tree) for the validated
/// trunk call.
pub struct BranchGenerator {
    config: TreeConfig,
}

/// Arguments of one recursive call.
#[derive(Clone, Copy)]
struct Sprout {
    start: Vec2,
    len: f64,
    angle: f64,
    depth: i32,
    seed: f64,
    level: u32,
    attachment: Option<Attachment>,
}

impl BranchGenerator {
    /// Create a new generator with the given configuration.
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Validate the config and grow the full tree from `start`.
    pub fn grow_tree(&self, start: Vec2) -> Result<Vec<Branch>, TreeError> {
        self.config.validate()?;
        let c = &self.config;
        Ok(self.grow(start, c.trunk_len, c.trunk_angle, c.depth, c.seed))
    }

    /// Grow one branch and its whole recursive expansion.
    ///
    /// Returns the branch itself first, followed by its tip children (each
    /// with their own descendants) and finally its twigs.  `depth <= 0`
    /// yields just the one branch.
    pub fn grow(&self, start: Vec2, len: f64, angle: f64, depth: i32, seed: f64) -> Vec<Branch> {
        let mut out = Vec::new();
        self.grow_into(
            &mut out,
            Sprout {
                start,
                len,
                angle,
                depth,
                seed,
                level: 0,
                attachment: None,
            },
        );
        out
    }

    fn grow_into(&self, out: &mut Vec<Branch>, s: Sprout) {
        let c = &self.config;
        let points = walk(c, s.start, s.len, s.angle, s.seed);
        let point_count = points.len();

        let index = out.len();
        out.push(Branch {
            points,
            depth: s.depth,
            seed: s.seed,
            level: s.level,
            attachment: s.attachment,
        });

        if s.depth <= 0 {
            return;
        }

        let seed = s.seed;
        let levels_below_root = (c.depth - s.depth) as f64;
        let tip_index = point_count - 1;
        let tip = out[index].points[tip_index];
        let tip_attachment = Some(Attachment {
            parent: index,
            point: tip_index,
            twig: false,
        });
        let child = |len: f64, angle: f64, seed: f64| Sprout {
            start: tip,
            len,
            angle,
            depth: s.depth - 1,
            seed,
            level: s.level + 1,
            attachment: tip_attachment,
        };

        let split_chance = (c.base_split_chance - levels_below_root * SPLIT_DECAY)
            .clamp(SPLIT_CHANCE_MIN, SPLIT_CHANCE_MAX);
        let child_len = s.len * (CHILD_LEN_BASE + hash(seed + 300.0) * CHILD_LEN_RANGE);
        let spread = SPREAD_BASE + hash(seed + 400.0) * SPREAD_RANGE;

        if hash(seed + 200.0) < split_chance {
            self.grow_into(out, child(child_len, s.angle + spread, seed + SEED_SPLIT_A));
            self.grow_into(
                out,
                child(
                    child_len * (0.86 + hash(seed + 500.0) * 0.18),
                    s.angle - spread * (0.85 + hash(seed + 600.0) * 0.25),
                    seed + SEED_SPLIT_B,
                ),
            );
        } else {
            self.grow_into(
                out,
                child(
                    child_len,
                    s.angle + hash_centered(seed + 700.0) * CONTINUE_DEVIATION,
                    seed + SEED_CONTINUE,
                ),
            );
        }

        let candidates = TWIG_MIN + (hash(seed + 800.0) * TWIG_RANGE) as usize;
        for k in 0..candidates {
            let kf = k as f64;
            if hash(seed + 900.0 + kf) >= c.sprout_along_chance {
                continue;
            }
            let along = TWIG_ATTACH_BASE + hash(seed + 1000.0 + kf) * TWIG_ATTACH_RANGE;
            let point = ((point_count as f64 * along) as usize).clamp(2, point_count - 2);
            let twig_len = s.len * (TWIG_LEN_BASE + hash(seed + 1100.0 + kf) * TWIG_LEN_RANGE);
            let twig_angle = s.angle
                + hash_centered(seed + 1200.0 + kf)
                    * (TWIG_SPREAD_BASE + levels_below_root * TWIG_SPREAD_PER_LEVEL)
                - c.droop * TWIG_DROOP;

            if hash(seed + 1300.0 + kf) < c.twig_spray_chance {
                let start = out[index].points[point];
                self.grow_into(
                    out,
                    Sprout {
                        start,
                        len: twig_len,
                        angle: twig_angle,
                        depth: s.depth - 2,
                        seed: seed + TWIG_SEED_BASE + kf * TWIG_SEED_STRIDE,
                        level: s.level + 1,
                        attachment: Some(Attachment {
                            parent: index,
                            point,
                            twig: true,
                        }),
                    },
                );
            }
        }
    }
}

/// Number of forward steps a branch grown from `seed` takes.
pub fn step_count(seed: f64) -> usize {
    MIN_STEPS + (hash(seed + 10.0) * STEP_RANGE) as usize
}

/// Walk one polyline body.  The first point is `start`, unmodified.
fn walk(c: &TreeConfig, start: Vec2, len: f64, angle: f64, seed: f64) -> Vec<Vec2> {
    let steps = step_count(seed);
    let step = len / steps as f64;
    let mut points = Vec::with_capacity(steps + 1);
    points.push(start);

    let mut p = start.as_dvec2();
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let curve = c.bend * t * t;
        let droop = -c.droop * t * t;
        let jitter = hash_centered(seed + i as f64 * STEP_SEED_STRIDE) * c.chaos;
        let heading = angle + curve + droop + jitter * JITTER_TO_HEADING;
        p += DVec2::new(heading.cos(), heading.sin()) * step;
        points.push(p.as_vec2());
    }
    points
}

// --- tests ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn default_tree() -> Vec<Branch> {
        BranchGenerator::new(TreeConfig::default())
            .grow_tree(Vec2::ZERO)
            .expect("default config is valid")
    }

    #[test]
    fn same_seed_is_bit_identical() {
        let a = default_tree();
        let b = default_tree();
        assert_eq!(a.len(), b.len());
        for (ba, bb) in a.iter().zip(&b) {
            assert_eq!(ba.points.len(), bb.points.len());
            for (pa, pb) in ba.points.iter().zip(&bb.points) {
                assert_eq!(pa.x.to_bits(), pb.x.to_bits());
                assert_eq!(pa.y.to_bits(), pb.y.to_bits());
            }
        }
    }

    #[test]
    fn different_seed_changes_shape() {
        let a = default_tree();
        let b = BranchGenerator::new(TreeConfig {
            seed: 7.77,
            ..TreeConfig::default()
        })
        .grow_tree(Vec2::ZERO)
        .unwrap();
        assert!(a != b, "seeds 1.2345 and 7.77 produced the same tree");
    }

    #[test]
    fn every_branch_starts_on_its_parent() {
        let tree = default_tree();
        assert!(tree[0].attachment.is_none(), "trunk must be first");
        for (i, branch) in tree.iter().enumerate().skip(1) {
            let att = branch
                .attachment
                .unwrap_or_else(|| panic!("branch {i} has no parent"));
            assert!(att.parent < i, "parent must precede child");
            let parent = &tree[att.parent];
            assert_eq!(
                branch.points[0], parent.points[att.point],
                "branch {i} does not start on its parent"
            );
            if !att.twig {
                assert_eq!(att.point, parent.points.len() - 1);
                assert_eq!(branch.points[0], parent.tip());
            }
        }
    }

    /// Number of recursive calls between the trunk and `index`, counted by
    /// walking attachment links rather than trusting `Branch::level`.
    fn call_depth(tree: &[Branch], mut index: usize) -> u32 {
        let mut calls = 0;
        while let Some(a) = tree[index].attachment {
            assert!(a.parent < index, "parent must be emitted before its child");
            index = a.parent;
            calls += 1;
        }
        calls
    }

    #[test]
    fn recursion_never_exceeds_depth() {
        let generator = BranchGenerator::new(TreeConfig::default());
        for d in [0, 1, 2, 5, 8] {
            let tree = generator.grow(Vec2::ZERO, 3.8, FRAC_PI_2, d, 1.2345);
            let mut deepest = 0;
            for (i, branch) in tree.iter().enumerate() {
                let calls = call_depth(&tree, i);
                deepest = deepest.max(calls);
                assert_eq!(branch.level, calls, "branch {i} level disagrees with its chain");

                if let Some(a) = branch.attachment {
                    let parent = &tree[a.parent];
                    assert!(parent.depth > 0, "depth {} branch recursed", parent.depth);
                    let step = if a.twig { 2 } else { 1 };
                    assert_eq!(branch.depth, parent.depth - step);
                }
            }
            assert!(deepest <= d.max(0) as u32, "depth {d} recursed {deepest} calls deep");
        }
    }

    #[test]
    fn depth_zero_is_a_single_branch() {
        let generator = BranchGenerator::new(TreeConfig::default());
        let tree = generator.grow(Vec2::new(1.0, 2.0), 1.0, 0.3, 0, 5.0);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].points[0], Vec2::new(1.0, 2.0));
    }

    #[test]
    fn step_count_in_range() {
        for i in 0..500 {
            let n = step_count(i as f64 * 0.37);
            assert!((10..20).contains(&n), "step count {n} out of range");
        }
        for branch in default_tree() {
            assert!((11..=20).contains(&branch.points.len()));
        }
    }

    #[test]
    fn default_tree_is_ornate_and_tall() {
        let tree = default_tree();
        assert!(tree.len() > 50, "only {} branches", tree.len());
        let top = tree
            .iter()
            .flat_map(|b| b.points.iter())
            .map(|p| p.y)
            .fold(f32::MIN, f32::max);
        assert!(top > 3.0, "tallest point at y={top}");
    }

    #[test]
    fn twigs_attach_in_the_interior() {
        let tree = default_tree();
        let twigs: Vec<_> = tree
            .iter()
            .filter_map(|b| b.attachment.filter(|a| a.twig))
            .collect();
        assert!(!twigs.is_empty(), "default tree grew no twigs");
        for att in twigs {
            let n = tree[att.parent].points.len();
            assert!(att.point >= 2 && att.point <= n - 2);
        }
    }

    #[test]
    fn validate_rejects_degenerate_configs() {
        let bad_depth = TreeConfig {
            depth: 0,
            ..TreeConfig::default()
        };
        assert_eq!(bad_depth.validate(), Err(TreeError::ZeroDepth));

        let too_deep = TreeConfig {
            depth: MAX_DEPTH + 1,
            ..TreeConfig::default()
        };
        assert!(matches!(
            too_deep.validate(),
            Err(TreeError::DepthTooLarge { .. })
        ));

        for len in [0.0, -1.0, f64::NAN] {
            let c = TreeConfig {
                trunk_len: len,
                ..TreeConfig::default()
            };
            assert!(matches!(c.validate(), Err(TreeError::NonPositiveTrunk(_))));
        }

        let chance = TreeConfig {
            twig_spray_chance: 1.5,
            ..TreeConfig::default()
        };
        assert!(matches!(
            chance.validate(),
            Err(TreeError::ProbabilityOutOfRange {
                name: "twig_spray_chance",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_non_finite_shape() {
        let cases: [(&str, fn(&mut TreeConfig)); 5] = [
            ("seed", |c| c.seed = f64::NAN),
            ("trunk_angle", |c| c.trunk_angle = f64::INFINITY),
            ("bend", |c| c.bend = f64::NEG_INFINITY),
            ("droop", |c| c.droop = f64::NAN),
            ("chaos", |c| c.chaos = f64::INFINITY),
        ];
        for (field, poison) in cases {
            let mut config = TreeConfig::default();
            poison(&mut config);
            match config.validate() {
                Err(TreeError::NonFinite { name, .. }) => assert_eq!(name, field),
                other => panic!("{field}: expected NonFinite, got {other:?}"),
            }
            assert!(BranchGenerator::new(config).grow_tree(Vec2::ZERO).is_err());
        }
    }

    #[test]
    fn grow_tree_surfaces_config_errors() {
        let generator = BranchGenerator::new(TreeConfig {
            trunk_len: 0.0,
            ..TreeConfig::default()
        });
        let err = generator.grow_tree(Vec2::ZERO).unwrap_err();
        assert!(err.to_string().contains("trunk length"));
    }
}
