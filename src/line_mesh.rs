//! Line-mesh surface: polyline sets as Bevy meshes with rewritable vertices.
//!
//! A [`LineMesh`] records the shape (line count and points per line) of the
//! polylines it was built from.  Every later write must match that shape
//! exactly; only vertex positions change, the index buffer is never
//! touched.  A different point count needs a new mesh.
//!
//! Polylines are flattened into one vertex buffer and drawn as
//! [`PrimitiveTopology::LineList`] with an index pair per segment, so one
//! mesh carries the whole tree.

use bevy::{
    asset::RenderAssetUsages,
    math::Vec2,
    mesh::{Indices, Mesh, PrimitiveTopology, VertexAttributeValues},
};

/// Error returned when a write does not fit the mesh it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMeshError {
    /// The write carried a different number of polylines.
    LineCountMismatch { expected: usize, found: usize },
    /// One polyline carried a different number of points.
    PointCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// The mesh has no `Float32x3` position attribute of the recorded size.
    MissingPositions,
}

impl std::fmt::Display for LineMeshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineMeshError::LineCountMismatch { expected, found } => write!(
                f,
                "line mesh topology mismatch: built with {expected} lines, written with {found}"
            ),
            LineMeshError::PointCountMismatch {
                line,
                expected,
                found,
            } => write!(
                f,
                "line mesh topology mismatch: line {line} built with {expected} points, written with {found}"
            ),
            LineMeshError::MissingPositions => {
                write!(f, "mesh has no position buffer matching its line layout")
            }
        }
    }
}

impl std::error::Error for LineMeshError {}

/// Fixed shape of a line mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMesh {
    counts: Vec<usize>,
    vertex_count: usize,
}

impl LineMesh {
    /// Build a mesh from `lines` and remember its shape.
    ///
    /// The mesh keeps its data in the main world so it can be rewritten.
    pub fn build(lines: &[Vec<Vec2>]) -> (Self, Mesh) {
        let counts: Vec<usize> = lines.iter().map(Vec::len).collect();
        let vertex_count = counts.iter().sum();

        let positions: Vec<[f32; 3]> = lines.iter().flatten().map(|p| [p.x, p.y, 0.0]).collect();

        let segment_count: usize = counts.iter().map(|n| n.saturating_sub(1)).sum();
        let mut indices = Vec::with_capacity(segment_count * 2);
        let mut first = 0u32;
        for &n in &counts {
            for i in 1..n as u32 {
                indices.push(first + i - 1);
                indices.push(first + i);
            }
            first += n as u32;
        }

        let mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
            .with_inserted_indices(Indices::U32(indices));

        (
            Self {
                counts,
                vertex_count,
            },
            mesh,
        )
    }

    pub fn line_count(&self) -> usize {
        self.counts.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Check that `lines` has the recorded shape.
    pub fn check(&self, lines: &[Vec<Vec2>]) -> Result<(), LineMeshError> {
        if lines.len() != self.counts.len() {
            return Err(LineMeshError::LineCountMismatch {
                expected: self.counts.len(),
                found: lines.len(),
            });
        }
        for (line, (points, &expected)) in lines.iter().zip(&self.counts).enumerate() {
            if points.len() != expected {
                return Err(LineMeshError::PointCountMismatch {
                    line,
                    expected,
                    found: points.len(),
                });
            }
        }
        Ok(())
    }

    /// Overwrite the vertex positions of `mesh` with `lines`.
    ///
    /// Nothing is written unless the shape matches.
    pub fn try_write(&self, mesh: &mut Mesh, lines: &[Vec<Vec2>]) -> Result<(), LineMeshError> {
        self.check(lines)?;
        let Some(VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute_mut(Mesh::ATTRIBUTE_POSITION)
        else {
            return Err(LineMeshError::MissingPositions);
        };
        if positions.len() != self.vertex_count {
            return Err(LineMeshError::MissingPositions);
        }
        for (dst, src) in positions.iter_mut().zip(lines.iter().flatten()) {
            *dst = [src.x, src.y, 0.0];
        }
        Ok(())
    }

    /// Like [`try_write`](Self::try_write), but a mismatch is a programming
    /// error and panics.
    pub fn write(&self, mesh: &mut Mesh, lines: &[Vec<Vec2>]) {
        if let Err(e) = self.try_write(mesh, lines) {
            panic!("{e}");
        }
    }
}
