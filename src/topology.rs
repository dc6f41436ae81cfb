//! The immutable generation-time tree: polylines plus per-point weights.
//!
//! [`Topology`] is built once from the branch generator and then only read.
//! Every frame derives its vertex positions from it afresh, so nothing in
//! here ever drifts.

use bevy::math::Vec2;

use crate::tree::{Branch, BranchGenerator, TreeConfig, TreeError, WeightNormalization};

/// Static tree shape shared by every render variant.
#[derive(Clone, Debug)]
pub struct Topology {
    branches: Vec<Branch>,
    /// Height weight per point, parallel to `branches[i].points`.
    weights: Vec<Vec<f32>>,
    base: Vec2,
    /// Height that maps to weight 1.
    span: f32,
}

impl Topology {
    /// Validate `config`, grow the tree from `base`, and derive weights.
    pub fn generate(config: &TreeConfig, base: Vec2) -> Result<Self, TreeError> {
        let branches = BranchGenerator::new(config.clone()).grow_tree(base)?;
        Ok(Self::from_branches(
            branches,
            base,
            config.trunk_len as f32,
            config.normalization,
        ))
    }

    /// Wrap already-grown branches.
    ///
    /// `trunk_len` is the span used by [`WeightNormalization::TrunkLength`].
    pub fn from_branches(
        branches: Vec<Branch>,
        base: Vec2,
        trunk_len: f32,
        normalization: WeightNormalization,
    ) -> Self {
        let span = match normalization {
            WeightNormalization::TrunkLength => trunk_len,
            WeightNormalization::TallestPoint => {
                let top = branches
                    .iter()
                    .flat_map(|b| b.points.iter())
                    .map(|p| p.y)
                    .fold(base.y, f32::max);
                top - base.y
            }
        }
        .max(f32::EPSILON);

        let weights = branches
            .iter()
            .map(|b| {
                b.points
                    .iter()
                    .map(|p| ((p.y - base.y) / span).clamp(0.0, 1.0))
                    .collect()
            })
            .collect();

        Self {
            branches,
            weights,
            base,
            span,
        }
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn weights(&self) -> &[Vec<f32>] {
        &self.weights
    }

    /// Root of the trunk.
    pub fn base(&self) -> Vec2 {
        self.base
    }

    /// Height above the base that normalises to weight 1.
    pub fn span(&self) -> f32 {
        self.span
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn point_count(&self) -> usize {
        self.branches.iter().map(|b| b.points.len()).sum()
    }

    /// Copy of the original point positions, one `Vec` per branch.
    pub fn lines(&self) -> Vec<Vec<Vec2>> {
        self.branches.iter().map(|b| b.points.clone()).collect()
    }

    /// Largest height weight of any point.
    pub fn max_weight(&self) -> f32 {
        self.weights
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f32::max)
    }

    /// Landing spots for crows.
    ///
    /// Takes the point `fraction` of the way along every branch and keeps
    /// those higher than `min_height` above the base.
    pub fn perch_points(&self, fraction: f32, min_height: f32) -> Vec<Vec2> {
        self.branches
            .iter()
            .filter_map(|b| {
                let idx = ((b.points.len() as f32 * fraction) as usize).min(b.points.len() - 1);
                let p = b.points[idx];
                (p.y - self.base.y > min_height).then_some(p)
            })
            .collect()
    }
}

/// Ease a height weight into an anchoring factor.
///
/// Exactly 0 at or below `dead_zone`, then rises quadratically to 1 at
/// `w = 1`.  Points with anchored weight 0 never move.
#[inline]
pub fn anchored_weight(w: f32, dead_zone: f32) -> f32 {
    if w <= dead_zone {
        return 0.0;
    }
    let t = ((w - dead_zone) / (1.0 - dead_zone)).min(1.0);
    t * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_topology() -> Topology {
        Topology::generate(&TreeConfig::default(), Vec2::ZERO).expect("valid config")
    }

    #[test]
    fn weights_parallel_branches_and_stay_in_unit_range() {
        let topo = default_topology();
        assert_eq!(topo.weights().len(), topo.branch_count());
        for (b, w) in topo.branches().iter().zip(topo.weights()) {
            assert_eq!(b.points.len(), w.len());
            assert!(w.iter().all(|w| (0.0..=1.0).contains(w)));
        }
    }

    #[test]
    fn trunk_base_has_zero_weight() {
        let topo = default_topology();
        assert_eq!(topo.weights()[0][0], 0.0);
    }

    #[test]
    fn reference_scenario_branch_count_and_top_weight() {
        let config = TreeConfig {
            depth: 8,
            trunk_len: 3.8,
            seed: 1.2345,
            ..TreeConfig::default()
        };
        for normalization in [
            WeightNormalization::TrunkLength,
            WeightNormalization::TallestPoint,
        ] {
            let topo = Topology::generate(
                &TreeConfig {
                    normalization,
                    ..config.clone()
                },
                Vec2::ZERO,
            )
            .unwrap();
            assert!(topo.branch_count() > 50);
            let top = topo.max_weight();
            assert!(
                (0.9..=1.0).contains(&top),
                "tallest weight {top} under {normalization:?}"
            );
        }
    }

    #[test]
    fn tallest_point_normalization_hits_one() {
        let topo = Topology::generate(
            &TreeConfig {
                normalization: WeightNormalization::TallestPoint,
                ..TreeConfig::default()
            },
            Vec2::new(0.0, -2.0),
        )
        .unwrap();
        assert_eq!(topo.max_weight(), 1.0);
        assert!(topo.span() > 0.0);
    }

    #[test]
    fn anchored_weight_is_pinned_inside_dead_zone() {
        for w in [0.0, 0.05, 0.0999, 0.1] {
            assert_eq!(anchored_weight(w, 0.1), 0.0, "w={w}");
        }
    }

    #[test]
    fn anchored_weight_strictly_increases_above_dead_zone() {
        let dz = 0.1;
        let mut prev = anchored_weight(dz, dz);
        for i in 1..=900 {
            let w = dz + i as f32 * (1.0 - dz) / 900.0;
            let a = anchored_weight(w, dz);
            assert!(a > prev, "not increasing at w={w}: {a} <= {prev}");
            prev = a;
        }
        assert!((anchored_weight(1.0, dz) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn perch_points_sit_above_min_height() {
        let topo = default_topology();
        let perches = topo.perch_points(0.86, 1.1);
        assert!(!perches.is_empty());
        assert!(perches.len() <= topo.branch_count());
        assert!(perches.iter().all(|p| p.y > 1.1));
    }

    #[test]
    fn lines_copy_original_points() {
        let topo = default_topology();
        let lines = topo.lines();
        assert_eq!(lines.len(), topo.branch_count());
        assert_eq!(
            lines.iter().map(Vec::len).sum::<usize>(),
            topo.point_count()
        );
        assert_eq!(lines[0], topo.branches()[0].points);
    }
}
