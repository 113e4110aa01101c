// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Import pipeline entry
//!
//! Parser -> partitioner -> mesh reconstructor, plus world-transform baking
//! and the bounding-size auto-scale. Connector markers come out unresolved;
//! resolution is a separate phase once the host has registered all objects.

use std::io::BufRead;
use std::path::Path;

use brk_lite_core::{
    sniff_convention, MarkerRecord, NullProgress, ParseOptions, ParseOutput, Parser, ProgressSink,
};
use nalgebra::Matrix4;
use tracing::debug;

use crate::error::Result;
use crate::mesh::RenderableMesh;
use crate::reconstruct::build_mesh;
use crate::split::split_mesh;
use crate::Point3;

/// Options for one import call.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Emit edges for polylines and 2-corner faces
    pub use_edges: bool,
    /// Parse `l` records at all
    pub use_lines: bool,
    pub use_smooth_groups: bool,
    pub use_split_objects: bool,
    pub use_split_groups: bool,
    pub use_groups_as_vgroups: bool,
    /// Scale the scene down by decades until its largest bounding-box axis
    /// fits under this size; 0 disables
    pub clamp_size: f64,
    /// World transform baked into every reconstructed mesh
    pub global_matrix: Matrix4<f64>,
    pub fast_path_failure_limit: u32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            use_edges: true,
            use_lines: true,
            use_smooth_groups: true,
            use_split_objects: true,
            use_split_groups: false,
            use_groups_as_vgroups: false,
            clamp_size: 0.0,
            global_matrix: Matrix4::identity(),
            fast_path_failure_limit: 10_000,
        }
    }
}

impl ImportOptions {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            use_lines: self.use_lines,
            use_smooth_groups: self.use_smooth_groups,
            use_split_objects: self.use_split_objects,
            use_split_groups: self.use_split_groups,
            use_groups_as_vgroups: self.use_groups_as_vgroups,
            fast_path_failure_limit: self.fast_path_failure_limit,
        }
    }
}

/// A connector marker awaiting parent resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorMarker {
    pub name: String,
    pub position: Point3<f64>,
    /// Weak by-name parent reference, resolved in a later phase
    pub parent: Option<String>,
}

impl From<MarkerRecord> for ConnectorMarker {
    fn from(rec: MarkerRecord) -> Self {
        ConnectorMarker {
            name: rec.name,
            position: Point3::new(rec.position[0], rec.position[1], rec.position[2]),
            parent: rec.parent,
        }
    }
}

/// Degradation counters for one whole import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub malformed_records: u32,
    pub dropped_corners: u32,
    pub undissolved_seams: u32,
    pub unresolved_parents: u32,
}

/// One finished import: meshes owned by the caller from here on.
#[derive(Debug, Default)]
pub struct ImportResult {
    pub meshes: Vec<RenderableMesh>,
    pub markers: Vec<ConnectorMarker>,
    /// Uniform decade scale the host should apply to honor the clamp size
    pub uniform_scale: f64,
    pub summary: ImportSummary,
}

/// Import the BRK file at `path`.
pub fn import_path(
    path: &Path,
    opts: &ImportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<ImportResult> {
    progress.step(&format!("Importing BRK {:?}...", path));
    let output = Parser::parse_path(path, opts.parse_options(), progress)?;
    let source_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    import_parsed(output, &source_name, opts, progress)
}

/// Import BRK content from an in-memory buffer (or any reader), sniffing
/// the decimal convention from the same bytes.
pub fn import_source<R: BufRead + Clone>(
    source: R,
    source_name: &str,
    opts: &ImportOptions,
) -> Result<ImportResult> {
    let float = sniff_convention(source.clone())?;
    let output = Parser::parse(source, float, opts.parse_options(), &mut NullProgress)?;
    import_parsed(output, source_name, opts, &mut NullProgress)
}

fn import_parsed(
    output: ParseOutput,
    source_name: &str,
    opts: &ImportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<ImportResult> {
    let mut summary = ImportSummary {
        malformed_records: output.summary.malformed_records,
        dropped_corners: output.summary.dropped_corners,
        ..Default::default()
    };

    let split = opts.use_split_objects || opts.use_split_groups;
    let groups = split_mesh(
        &output.verts_loc,
        output.faces,
        &output.object_keys,
        source_name,
        split,
    );
    progress.step("Done, building geometries...");

    let mut meshes = Vec::with_capacity(groups.len());
    for group in groups {
        let nor: &[[f64; 3]] = if group.uses_normals {
            &output.verts_nor
        } else {
            &[]
        };
        let tex: &[[f64; 2]] = if group.uses_texcoords {
            &output.verts_tex
        } else {
            &[]
        };
        // Vertex-weight groups carry whole-pool indices; they only make
        // sense on the unsplit single mesh
        let vgroups: &[brk_lite_core::VertexGroup] = if split {
            &[]
        } else {
            &output.vertex_groups
        };
        let (mesh, undissolved) = build_mesh(
            &group.name,
            &group.verts,
            group.faces,
            nor,
            tex,
            output.smooth_group_count > 0,
            opts.use_edges,
            vgroups,
        );
        summary.undissolved_seams += undissolved;
        debug!(
            mesh = %mesh.name,
            verts = mesh.vertex_count(),
            polys = mesh.polygon_count(),
            "reconstructed mesh"
        );
        meshes.push(mesh);
    }

    if opts.global_matrix != Matrix4::identity() {
        for mesh in &mut meshes {
            bake_transform(mesh, &opts.global_matrix);
        }
    }

    let uniform_scale = if opts.clamp_size > 0.0 {
        clamp_scale(&meshes, opts.clamp_size)
    } else {
        1.0
    };

    progress.step("Done.");
    Ok(ImportResult {
        meshes,
        markers: output.markers.into_iter().map(Into::into).collect(),
        uniform_scale,
        summary,
    })
}

/// Bake a world transform into mesh positions; custom normals rotate with
/// the inverse-transpose and are renormalized.
fn bake_transform(mesh: &mut RenderableMesh, matrix: &Matrix4<f64>) {
    for chunk in mesh.positions.chunks_exact_mut(3) {
        let p = matrix.transform_point(&Point3::new(
            chunk[0] as f64,
            chunk[1] as f64,
            chunk[2] as f64,
        ));
        chunk[0] = p.x as f32;
        chunk[1] = p.y as f32;
        chunk[2] = p.z as f32;
    }
    if let Some(normals) = &mut mesh.custom_normals {
        let linear = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear
            .try_inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(linear);
        for chunk in normals.chunks_exact_mut(3) {
            let n = normal_matrix
                * crate::Vector3::new(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
            let n = if n.norm() > 1e-10 { n.normalize() } else { n };
            chunk[0] = n.x as f32;
            chunk[1] = n.y as f32;
            chunk[2] = n.z as f32;
        }
    }
}

/// Divide the scale by 10 until the scene's largest bounding-box axis
/// fits under the clamp.
fn clamp_scale(meshes: &[RenderableMesh], clamp_size: f64) -> f64 {
    let mut axis_min = [f64::MAX; 3];
    let mut axis_max = [f64::MIN; 3];
    let mut any = false;
    for mesh in meshes {
        if mesh.positions.is_empty() {
            continue;
        }
        any = true;
        let (min, max) = mesh.bounds();
        for axis in 0..3 {
            axis_min[axis] = axis_min[axis].min(min[axis] as f64);
            axis_max[axis] = axis_max[axis].max(max[axis] as f64);
        }
    }
    if !any {
        return 1.0;
    }
    let max_axis = (0..3)
        .map(|a| axis_max[a] - axis_min[a])
        .fold(0.0f64, f64::max);
    let mut scale = 1.0;
    if max_axis.is_finite() {
        while clamp_size < max_axis * scale {
            scale /= 10.0;
        }
    }
    scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(content: &str) -> ImportResult {
        import_source(content.as_bytes(), "part", &ImportOptions::default()).unwrap()
    }

    const TWO_OBJECTS: &str = "o A\n\
        v 0.0 0.0 0.0\nv 1.0 0.0 0.0\nv 1.0 1.0 0.0\nf 1 2 3\n\
        o B\n\
        v 0.0 0.0 1.0\nv 1.0 0.0 1.0\nv 1.0 1.0 1.0\nf 4 5 6\n";

    #[test]
    fn test_split_import_two_meshes() {
        let result = import(TWO_OBJECTS);
        assert_eq!(result.meshes.len(), 2);
        assert_eq!(result.meshes[0].name, "A");
        assert_eq!(result.meshes[1].name, "B");
        assert_eq!(result.meshes[0].vertex_count(), 3);
        assert!(result.meshes.iter().all(|m| m.validate()));
    }

    #[test]
    fn test_unsplit_import_single_mesh_named_from_source() {
        let opts = ImportOptions {
            use_split_objects: false,
            ..Default::default()
        };
        let result = import_source(TWO_OBJECTS.as_bytes(), "part", &opts).unwrap();
        assert_eq!(result.meshes.len(), 1);
        assert_eq!(result.meshes[0].name, "part");
        assert_eq!(result.meshes[0].vertex_count(), 6);
    }

    #[test]
    fn test_world_transform_baked() {
        let opts = ImportOptions {
            global_matrix: Matrix4::new_translation(&crate::Vector3::new(10.0, 0.0, 0.0)),
            ..Default::default()
        };
        let result = import_source(
            "v 1.0 2.0 3.0\nv 2.0 2.0 3.0\nv 2.0 3.0 3.0\nf 1 2 3\n".as_bytes(),
            "part",
            &opts,
        )
        .unwrap();
        assert_eq!(result.meshes[0].position(0), Point3::new(11.0, 2.0, 3.0));
    }

    #[test]
    fn test_clamp_size_scale() {
        let opts = ImportOptions {
            clamp_size: 1.0,
            ..Default::default()
        };
        // 250 units across: three decades down to 0.25
        let result = import_source(
            "v 0.0 0.0 0.0\nv 250.0 0.0 0.0\nv 250.0 1.0 0.0\nf 1 2 3\n".as_bytes(),
            "part",
            &opts,
        )
        .unwrap();
        assert!((result.uniform_scale - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_disabled_by_default() {
        let result = import("v 0.0 0.0 0.0\nv 250.0 0.0 0.0\nv 250.0 1.0 0.0\nf 1 2 3\n");
        assert_eq!(result.uniform_scale, 1.0);
    }

    #[test]
    fn test_markers_come_out_unresolved() {
        let result = import("st tip 1.0 2.0 3.0 0 base\n");
        assert_eq!(result.markers.len(), 1);
        assert_eq!(result.markers[0].parent.as_deref(), Some("base"));
        assert_eq!(result.markers[0].position, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_summary_aggregates_parse_skips() {
        let result = import("v 0.0 0.0 0.0\nv 1.0 0.0 0.0\nv 1.0 1.0 0.0\nv bad bad bad\nf 1 2 9\nf 1 2 3\n");
        assert_eq!(result.summary.malformed_records, 1);
        assert_eq!(result.summary.dropped_corners, 1);
    }
}
