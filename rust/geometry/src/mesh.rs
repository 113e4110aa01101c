// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Renderable mesh data structures
//!
//! The reconstruction output: polygon soup with explicit loop/polygon
//! arrays, an edge set with sharp flags, and optional per-loop attribute
//! layers. Nothing in here knows about the wire format.

use nalgebra::Point3;

/// One polygon: a contiguous run of loops plus its shading flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polygon {
    /// First loop index of this polygon
    pub loop_start: u32,
    /// Number of loops (corners)
    pub loop_total: u32,
    /// Continuous shading across this polygon's edges
    pub smooth: bool,
}

/// One edge with its sharp-shading flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub vertices: [u32; 2],
    /// Explicitly breaks continuous shading (smoothing-group boundary)
    pub sharp: bool,
}

/// A named vertex-weight set attached to a mesh
#[derive(Debug, Clone, Default)]
pub struct VertexGroupWeights {
    pub name: String,
    pub weights: Vec<(u32, f32)>,
}

/// A reconstructed, renderable mesh ready to hand to a host
#[derive(Debug, Clone, Default)]
pub struct RenderableMesh {
    pub name: String,
    /// Vertex positions (x, y, z), flattened
    pub positions: Vec<f32>,
    /// Loop array: corner -> vertex index
    pub loops: Vec<u32>,
    pub polygons: Vec<Polygon>,
    pub edges: Vec<Edge>,
    /// Per-loop custom normals (nx, ny, nz), flattened; two faces sharing a
    /// vertex may disagree at that corner, so these are never per-vertex
    pub custom_normals: Option<Vec<f32>>,
    /// Per-loop texture coordinates (u, v), flattened
    pub uv_layer: Option<Vec<f32>>,
    pub vertex_groups: Vec<VertexGroupWeights>,
    /// Set when custom split normals drive shading
    pub use_custom_normals: bool,
}

impl RenderableMesh {
    pub fn new(name: impl Into<String>) -> Self {
        RenderableMesh {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get loop (corner) count
    #[inline]
    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    /// Get polygon count
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Check if mesh has no geometry at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.edges.is_empty()
    }

    /// Loop slice of one polygon
    #[inline]
    pub fn polygon_loops(&self, poly: &Polygon) -> &[u32] {
        &self.loops[poly.loop_start as usize..(poly.loop_start + poly.loop_total) as usize]
    }

    /// Vertex position as a point
    #[inline]
    pub fn position(&self, vertex: u32) -> Point3<f32> {
        let i = vertex as usize * 3;
        Point3::new(self.positions[i], self.positions[i + 1], self.positions[i + 2])
    }

    /// Calculate bounds (min, max)
    #[inline]
    pub fn bounds(&self) -> (Point3<f32>, Point3<f32>) {
        if self.positions.is_empty() {
            return (Point3::origin(), Point3::origin());
        }

        let mut min = Point3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Point3::new(f32::MIN, f32::MIN, f32::MIN);

        self.positions.chunks_exact(3).for_each(|chunk| {
            let (x, y, z) = (chunk[0], chunk[1], chunk[2]);
            min.x = min.x.min(x);
            min.y = min.y.min(y);
            min.z = min.z.min(z);
            max.x = max.x.max(x);
            max.y = max.y.max(y);
            max.z = max.z.max(z);
        });

        (min, max)
    }

    /// Internal consistency check: every loop references a valid vertex,
    /// every polygon's loop range is in bounds, non-overlapping, and the
    /// ranges cover the loop array exactly; attribute layers match the loop
    /// count; every edge references valid vertices.
    pub fn validate(&self) -> bool {
        let nverts = self.vertex_count() as u32;
        if self.loops.iter().any(|&v| v >= nverts) {
            return false;
        }
        let mut cursor = 0u32;
        for poly in &self.polygons {
            if poly.loop_start != cursor {
                return false;
            }
            cursor += poly.loop_total;
        }
        if cursor as usize != self.loops.len() {
            return false;
        }
        if let Some(normals) = &self.custom_normals {
            if normals.len() != self.loops.len() * 3 {
                return false;
            }
        }
        if let Some(uv) = &self.uv_layer {
            if uv.len() != self.loops.len() * 2 {
                return false;
            }
        }
        self.edges
            .iter()
            .all(|e| e.vertices[0] < nverts && e.vertices[1] < nverts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> RenderableMesh {
        RenderableMesh {
            name: "tri".to_string(),
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
            loops: vec![0, 1, 2],
            polygons: vec![Polygon {
                loop_start: 0,
                loop_total: 3,
                smooth: false,
            }],
            edges: vec![
                Edge {
                    vertices: [0, 1],
                    sharp: false,
                },
                Edge {
                    vertices: [1, 2],
                    sharp: false,
                },
                Edge {
                    vertices: [0, 2],
                    sharp: false,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_counts() {
        let mesh = triangle();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.loop_count(), 3);
        assert_eq!(mesh.polygon_count(), 1);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_validate_good_mesh() {
        assert!(triangle().validate());
    }

    #[test]
    fn test_validate_rejects_bad_loop() {
        let mut mesh = triangle();
        mesh.loops[1] = 7;
        assert!(!mesh.validate());
    }

    #[test]
    fn test_validate_rejects_gapped_polygons() {
        let mut mesh = triangle();
        mesh.polygons[0].loop_total = 2;
        assert!(!mesh.validate());
    }

    #[test]
    fn test_bounds() {
        let mesh = triangle();
        let (min, max) = mesh.bounds();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
    }
}
