// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BRK exporter (inverse path)
//!
//! Serializes geometry snapshots back into the textual grammar: one `v`
//! line per vertex, deduplicated `vt`/`vn` pools, face lines with global
//! running 1-based offsets carried across objects, loose edges as `l`
//! lines, and `st` marker lines for empties.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Matrix4;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mesh::{Edge, Polygon, RenderableMesh, VertexGroupWeights};
use crate::triangulation::{polygon_normal, tessellate_ngon};
use crate::{Point3, Vector3};

/// How smoothing context is written on face runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingMode {
    /// Only `s 1`/`s off` transitions
    None,
    /// Per-face positive integer group ids
    Groups,
    /// Power-of-two bit per group, capped at 32 distinct values
    Bitflags,
}

/// Options for one export call.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub selected_only: bool,
    /// Triangulate every polygon before writing
    pub triangulate: bool,
    pub write_edges: bool,
    pub write_normals: bool,
    pub write_uvs: bool,
    pub smoothing: SmoothingMode,
    /// Write the dominant vertex group of each face as `g` context lines
    pub vertex_groups_as_polygroups: bool,
    pub global_matrix: Matrix4<f64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            selected_only: true,
            triangulate: false,
            write_edges: true,
            write_normals: false,
            write_uvs: true,
            smoothing: SmoothingMode::None,
            vertex_groups_as_polygroups: false,
            global_matrix: Matrix4::identity(),
        }
    }
}

/// Geometry snapshot of one evaluable object, in object space.
#[derive(Debug, Clone, Default)]
pub struct MeshSnapshot {
    /// Vertex positions (x, y, z), flattened
    pub positions: Vec<f64>,
    pub loops: Vec<u32>,
    pub polygons: Vec<Polygon>,
    pub edges: Vec<Edge>,
    /// Per-loop normals (nx, ny, nz), flattened
    pub loop_normals: Option<Vec<f64>>,
    /// Per-loop texture coordinates (u, v), flattened
    pub loop_uvs: Option<Vec<f64>>,
    pub vertex_groups: Vec<VertexGroupWeights>,
}

impl MeshSnapshot {
    /// Snapshot a reconstructed mesh (mainly for round-trip use).
    pub fn from_mesh(mesh: &RenderableMesh) -> Self {
        MeshSnapshot {
            positions: mesh.positions.iter().map(|&v| v as f64).collect(),
            loops: mesh.loops.clone(),
            polygons: mesh.polygons.clone(),
            edges: mesh.edges.clone(),
            loop_normals: mesh
                .custom_normals
                .as_ref()
                .map(|n| n.iter().map(|&v| v as f64).collect()),
            loop_uvs: mesh
                .uv_layer
                .as_ref()
                .map(|u| u.iter().map(|&v| v as f64).collect()),
            vertex_groups: mesh.vertex_groups.clone(),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// One object handed to the exporter. `mesh: None` marks an empty, written
/// as a connector marker line.
#[derive(Debug, Clone)]
pub struct ExportObject {
    pub name: String,
    pub data_name: String,
    pub matrix: Matrix4<f64>,
    pub mesh: Option<MeshSnapshot>,
    pub parent: Option<String>,
    pub selected: bool,
}

impl ExportObject {
    pub fn from_mesh(mesh: &RenderableMesh) -> Self {
        ExportObject {
            name: mesh.name.clone(),
            data_name: mesh.name.clone(),
            matrix: Matrix4::identity(),
            mesh: Some(MeshSnapshot::from_mesh(mesh)),
            parent: None,
            selected: true,
        }
    }

    /// An empty at the given world position (a stud/connector point).
    pub fn empty(name: impl Into<String>, position: Point3<f64>, parent: Option<String>) -> Self {
        ExportObject {
            name: name.into(),
            data_name: String::new(),
            matrix: Matrix4::new_translation(&position.coords),
            mesh: None,
            parent,
            selected: true,
        }
    }
}

/// Export `objects` to the file at `path`.
pub fn export_path(objects: &[ExportObject], path: &Path, opts: &ExportOptions) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::sink(path, e))?;
    let mut writer = BufWriter::new(file);
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    write_brk(&mut writer, objects, opts, &label)?;
    writer.flush()?;
    Ok(())
}

/// Export one file per supplied frame, deriving `base_NNNNNN.ext` names.
/// Frame iteration itself stays with the caller.
pub fn export_animation(
    frames: &[(i32, Vec<ExportObject>)],
    path: &Path,
    opts: &ExportOptions,
) -> Result<()> {
    for (frame, objects) in frames {
        export_path(objects, &frame_path(path, *frame), opts)?;
    }
    Ok(())
}

/// `part.brk` + frame 12 -> `part_000012.brk`
fn frame_path(path: &Path, frame: i32) -> std::path::PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{:06}.{}", stem, frame, ext.to_string_lossy()),
        None => format!("{}_{:06}", stem, frame),
    };
    path.with_file_name(name)
}

fn name_compat(name: &str) -> String {
    name.replace(' ', "_")
}

#[inline]
fn round4(v: f64) -> i64 {
    (v * 1.0e4).round() as i64
}

#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SmoothState {
    Off,
    On,
    Group(u32),
}

/// Serialize `objects` as BRK text into any writer.
pub fn write_brk<W: Write>(
    w: &mut W,
    objects: &[ExportObject],
    opts: &ExportOptions,
    source_label: &str,
) -> Result<()> {
    writeln!(
        w,
        "# brk-lite v{} BRK File: '{}'",
        env!("CARGO_PKG_VERSION"),
        source_label
    )?;

    // Global running offsets carried across all objects in the file
    let mut totverts: u32 = 1;
    let mut totuvco: u32 = 1;
    let mut totno: u32 = 1;

    for ob in objects {
        if opts.selected_only && !ob.selected {
            continue;
        }

        let snapshot = match &ob.mesh {
            Some(snapshot) => snapshot,
            None => {
                // Empties mark stud/connector locations
                let t = ob.matrix.column(3);
                write!(
                    w,
                    "st {} {:.6} {:.6} {:.6}",
                    name_compat(&ob.name),
                    t[0],
                    t[1],
                    t[2]
                )?;
                if let Some(parent) = &ob.parent {
                    write!(w, " {}", name_compat(parent))?;
                }
                writeln!(w)?;
                continue;
            }
        };

        let mut me = snapshot.clone();
        // must triangulate before the transform, else tessellation may differ
        if opts.triangulate {
            triangulate_snapshot(&mut me);
        }
        let matrix = opts.global_matrix * ob.matrix;
        transform_snapshot(&mut me, &matrix);

        let edge_count = if opts.write_edges { me.edges.len() } else { 0 };
        if me.polygons.is_empty() && edge_count == 0 && me.positions.is_empty() {
            continue;
        }

        let faceuv = opts.write_uvs && me.loop_uvs.is_some();

        let smooth_groups: Vec<u32> = if opts.smoothing != SmoothingMode::None
            && !me.polygons.is_empty()
        {
            let (mut groups, total) = derive_smooth_groups(&me);
            if total <= 1 {
                Vec::new()
            } else {
                if opts.smoothing == SmoothingMode::Bitflags {
                    for g in groups.iter_mut() {
                        if *g > 0 {
                            // distinct values cap at 32; excess groups collapse
                            *g = 1 << ((*g - 1) % 32);
                        }
                    }
                }
                groups
            }
        } else {
            Vec::new()
        };

        let obname = if ob.name == ob.data_name {
            name_compat(&ob.name)
        } else {
            format!("{}_{}", name_compat(&ob.name), name_compat(&ob.data_name))
        };
        writeln!(w, "o {}", obname)?;

        // Vert: one line per vertex, never deduplicated
        for p in me.positions.chunks_exact(3) {
            writeln!(w, "v {:.6} {:.6} {:.6}", p[0], p[1], p[2])?;
        }

        // UV: deduped on (vertex, rounded value) so two vertices never share
        // a slot even when numerically identical
        let mut uv_unique_count: u32 = 0;
        let uv_face_mapping: Vec<Vec<u32>> = if faceuv {
            let uvs = me.loop_uvs.as_ref().expect("faceuv");
            let mut mapping = Vec::with_capacity(me.polygons.len());
            let mut uv_dict: FxHashMap<(u32, i64, i64), u32> = FxHashMap::default();
            for poly in &me.polygons {
                let mut slots = Vec::with_capacity(poly.loop_total as usize);
                for l in poly.loop_start..poly.loop_start + poly.loop_total {
                    let l = l as usize;
                    let (u, v) = (uvs[l * 2], uvs[l * 2 + 1]);
                    let key = (me.loops[l], round4(u), round4(v));
                    let slot = match uv_dict.get(&key) {
                        Some(&slot) => slot,
                        None => {
                            let slot = uv_unique_count;
                            uv_dict.insert(key, slot);
                            writeln!(w, "vt {:.6} {:.6}", u, v)?;
                            uv_unique_count += 1;
                            slot
                        }
                    };
                    slots.push(slot);
                }
                mapping.push(slots);
            }
            mapping
        } else {
            Vec::new()
        };

        // Normal: direction-only, deduped on the rounded triple alone
        let mut no_unique_count: u32 = 0;
        let loops_to_normals: Vec<u32> = if opts.write_normals && !me.polygons.is_empty() {
            let loop_normals = loop_normals_or_flat(&me);
            let mut normals_to_idx: FxHashMap<(i64, i64, i64), u32> = FxHashMap::default();
            let mut out = vec![0u32; me.loops.len()];
            for poly in &me.polygons {
                for l in poly.loop_start..poly.loop_start + poly.loop_total {
                    let l = l as usize;
                    let key = (
                        round4(loop_normals[l * 3]),
                        round4(loop_normals[l * 3 + 1]),
                        round4(loop_normals[l * 3 + 2]),
                    );
                    let slot = match normals_to_idx.get(&key) {
                        Some(&slot) => slot,
                        None => {
                            let slot = no_unique_count;
                            normals_to_idx.insert(key, slot);
                            writeln!(
                                w,
                                "vn {:.4} {:.4} {:.4}",
                                key.0 as f64 / 1.0e4,
                                key.1 as f64 / 1.0e4,
                                key.2 as f64 / 1.0e4
                            )?;
                            no_unique_count += 1;
                            slot
                        }
                    };
                    out[l] = slot;
                }
            }
            out
        } else {
            Vec::new()
        };
        let write_normals = !loops_to_normals.is_empty();

        // Per-vertex group lists for polygroup context lines
        let vgroups_map: Vec<Vec<(&str, f32)>> = if opts.vertex_groups_as_polygroups
            && !me.vertex_groups.is_empty()
        {
            let mut map: Vec<Vec<(&str, f32)>> = vec![Vec::new(); me.vertex_count()];
            for group in &me.vertex_groups {
                for &(v, weight) in &group.weights {
                    if let Some(slot) = map.get_mut(v as usize) {
                        slot.push((group.name.as_str(), weight));
                    }
                }
            }
            map
        } else {
            Vec::new()
        };
        let mut current_vgroup = String::new();

        let mut context_smooth: Option<SmoothState> = None;

        for (f_index, poly) in me.polygons.iter().enumerate() {
            let state = if poly.smooth {
                if smooth_groups.is_empty() {
                    SmoothState::On
                } else {
                    SmoothState::Group(smooth_groups[f_index])
                }
            } else {
                SmoothState::Off
            };

            if !vgroups_map.is_empty() {
                let vgroup_of_face = face_vertex_group(&me, poly, &vgroups_map);
                if vgroup_of_face != current_vgroup {
                    current_vgroup = vgroup_of_face;
                    writeln!(w, "g {}", name_compat(&current_vgroup))?;
                }
            }

            if context_smooth != Some(state) {
                match state {
                    SmoothState::Group(id) => writeln!(w, "s {}", id)?,
                    SmoothState::On => writeln!(w, "s 1")?,
                    SmoothState::Off => writeln!(w, "s off")?,
                }
                context_smooth = Some(state);
            }

            write!(w, "f")?;
            for (ci, l) in (poly.loop_start..poly.loop_start + poly.loop_total).enumerate() {
                let v = me.loops[l as usize];
                if faceuv {
                    if write_normals {
                        write!(
                            w,
                            " {}/{}/{}",
                            totverts + v,
                            totuvco + uv_face_mapping[f_index][ci],
                            totno + loops_to_normals[l as usize]
                        )?;
                    } else {
                        write!(
                            w,
                            " {}/{}",
                            totverts + v,
                            totuvco + uv_face_mapping[f_index][ci]
                        )?;
                    }
                } else if write_normals {
                    write!(w, " {}//{}", totverts + v, totno + loops_to_normals[l as usize])?;
                } else {
                    write!(w, " {}", totverts + v)?;
                }
            }
            writeln!(w)?;
        }

        // Loose edges only; polygon boundaries are implied by the faces
        if opts.write_edges {
            let mut boundary: FxHashSet<(u32, u32)> = FxHashSet::default();
            for poly in &me.polygons {
                let loops = &me.loops
                    [poly.loop_start as usize..(poly.loop_start + poly.loop_total) as usize];
                let mut prev = *loops.last().expect("polygon has loops");
                for &v in loops {
                    boundary.insert(edge_key(prev, v));
                    prev = v;
                }
            }
            for edge in &me.edges {
                if !boundary.contains(&edge_key(edge.vertices[0], edge.vertices[1])) {
                    writeln!(
                        w,
                        "l {} {}",
                        totverts + edge.vertices[0],
                        totverts + edge.vertices[1]
                    )?;
                }
            }
        }

        debug!(object = %ob.name, verts = me.vertex_count(), "wrote object");

        // Make the indices global rather than per mesh
        totverts += me.vertex_count() as u32;
        totuvco += uv_unique_count;
        totno += no_unique_count;
    }

    Ok(())
}

/// Apply a world transform to the snapshot; a negative determinant flips
/// face winding so outward normals survive mirroring.
fn transform_snapshot(me: &mut MeshSnapshot, matrix: &Matrix4<f64>) {
    for chunk in me.positions.chunks_exact_mut(3) {
        let p = matrix.transform_point(&Point3::new(chunk[0], chunk[1], chunk[2]));
        chunk[0] = p.x;
        chunk[1] = p.y;
        chunk[2] = p.z;
    }
    if let Some(normals) = &mut me.loop_normals {
        let linear = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear
            .try_inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(linear);
        for chunk in normals.chunks_exact_mut(3) {
            let n = normal_matrix * Vector3::new(chunk[0], chunk[1], chunk[2]);
            let n = if n.norm() > 1e-10 { n.normalize() } else { n };
            chunk[0] = n.x;
            chunk[1] = n.y;
            chunk[2] = n.z;
        }
    }
    if matrix.determinant() < 0.0 {
        flip_winding(me);
    }
}

fn flip_winding(me: &mut MeshSnapshot) {
    for poly in &me.polygons {
        let s = poly.loop_start as usize;
        let e = s + poly.loop_total as usize;
        me.loops[s..e].reverse();
        if let Some(normals) = &mut me.loop_normals {
            reverse_chunks(&mut normals[s * 3..e * 3], 3);
        }
        if let Some(uvs) = &mut me.loop_uvs {
            reverse_chunks(&mut uvs[s * 2..e * 2], 2);
        }
    }
    if let Some(normals) = &mut me.loop_normals {
        for v in normals.iter_mut() {
            *v = -*v;
        }
    }
}

/// Reverse a flat attribute slice in `width`-sized units.
fn reverse_chunks(slice: &mut [f64], width: usize) {
    let n = slice.len() / width;
    for i in 0..n / 2 {
        for k in 0..width {
            slice.swap(i * width + k, (n - 1 - i) * width + k);
        }
    }
}

/// Per-loop normals from the snapshot, or flat polygon normals when the
/// host provided none.
fn loop_normals_or_flat(me: &MeshSnapshot) -> Vec<f64> {
    if let Some(normals) = &me.loop_normals {
        return normals.clone();
    }
    let mut out = vec![0.0f64; me.loops.len() * 3];
    for poly in &me.polygons {
        let points: Vec<Point3<f64>> = (poly.loop_start..poly.loop_start + poly.loop_total)
            .map(|l| {
                let v = me.loops[l as usize] as usize * 3;
                Point3::new(me.positions[v], me.positions[v + 1], me.positions[v + 2])
            })
            .collect();
        let n = polygon_normal(&points);
        for l in poly.loop_start..poly.loop_start + poly.loop_total {
            let l = l as usize * 3;
            out[l] = n.x;
            out[l + 1] = n.y;
            out[l + 2] = n.z;
        }
    }
    out
}

/// Replace every n-gon with its tessellation, carrying per-loop attributes
/// through the corner mapping.
fn triangulate_snapshot(me: &mut MeshSnapshot) {
    let mut loops: Vec<u32> = Vec::with_capacity(me.loops.len());
    let mut polygons: Vec<Polygon> = Vec::with_capacity(me.polygons.len());
    let mut normals: Option<Vec<f64>> = me.loop_normals.as_ref().map(|_| Vec::new());
    let mut uvs: Option<Vec<f64>> = me.loop_uvs.as_ref().map(|_| Vec::new());

    let mut push_corner = |loops: &mut Vec<u32>,
                           normals: &mut Option<Vec<f64>>,
                           uvs: &mut Option<Vec<f64>>,
                           l: usize| {
        loops.push(me.loops[l]);
        if let (Some(out), Some(src)) = (normals.as_mut(), me.loop_normals.as_ref()) {
            out.extend_from_slice(&src[l * 3..l * 3 + 3]);
        }
        if let (Some(out), Some(src)) = (uvs.as_mut(), me.loop_uvs.as_ref()) {
            out.extend_from_slice(&src[l * 2..l * 2 + 2]);
        }
    };

    for poly in &me.polygons {
        let start = poly.loop_start as usize;
        let total = poly.loop_total as usize;
        if total <= 3 {
            let loop_start = loops.len() as u32;
            for l in start..start + total {
                push_corner(&mut loops, &mut normals, &mut uvs, l);
            }
            polygons.push(Polygon {
                loop_start,
                loop_total: total as u32,
                smooth: poly.smooth,
            });
            continue;
        }

        let points: Vec<Point3<f64>> = (start..start + total)
            .map(|l| {
                let v = me.loops[l] as usize * 3;
                Point3::new(me.positions[v], me.positions[v + 1], me.positions[v + 2])
            })
            .collect();
        let tris = tessellate_ngon(&points);
        if tris.is_empty() {
            // keep the polygon rather than lose it
            let loop_start = loops.len() as u32;
            for l in start..start + total {
                push_corner(&mut loops, &mut normals, &mut uvs, l);
            }
            polygons.push(Polygon {
                loop_start,
                loop_total: total as u32,
                smooth: poly.smooth,
            });
            continue;
        }
        for tri in tris {
            let loop_start = loops.len() as u32;
            for ci in tri {
                push_corner(&mut loops, &mut normals, &mut uvs, start + ci);
            }
            polygons.push(Polygon {
                loop_start,
                loop_total: 3,
                smooth: poly.smooth,
            });
        }
    }

    me.loops = loops;
    me.polygons = polygons;
    me.loop_normals = normals;
    me.loop_uvs = uvs;
}

/// Flood-fill smoothing groups: smooth faces connected through shared
/// non-sharp edges shade as one group. Returns per-face group ids (0 for
/// flat faces) and the number of groups found.
fn derive_smooth_groups(me: &MeshSnapshot) -> (Vec<u32>, u32) {
    let npolys = me.polygons.len();
    let mut edge_polys: FxHashMap<(u32, u32), SmallVec<[u32; 2]>> = FxHashMap::default();
    let poly_keys = |poly: &Polygon| {
        let loops =
            &me.loops[poly.loop_start as usize..(poly.loop_start + poly.loop_total) as usize];
        let mut keys: SmallVec<[(u32, u32); 4]> = SmallVec::new();
        let mut prev = *loops.last().expect("polygon has loops");
        for &v in loops {
            keys.push(edge_key(prev, v));
            prev = v;
        }
        keys
    };
    for (pi, poly) in me.polygons.iter().enumerate() {
        for key in poly_keys(poly) {
            edge_polys.entry(key).or_default().push(pi as u32);
        }
    }
    let sharp: FxHashSet<(u32, u32)> = me
        .edges
        .iter()
        .filter(|e| e.sharp)
        .map(|e| edge_key(e.vertices[0], e.vertices[1]))
        .collect();

    let mut groups = vec![0u32; npolys];
    let mut total = 0u32;
    for start in 0..npolys {
        if !me.polygons[start].smooth || groups[start] != 0 {
            continue;
        }
        total += 1;
        groups[start] = total;
        let mut stack = vec![start];
        while let Some(p) = stack.pop() {
            for key in poly_keys(&me.polygons[p]) {
                if sharp.contains(&key) {
                    continue;
                }
                for &q in edge_polys.get(&key).into_iter().flatten() {
                    let q = q as usize;
                    if q != p && me.polygons[q].smooth && groups[q] == 0 {
                        groups[q] = total;
                        stack.push(q);
                    }
                }
            }
        }
    }
    (groups, total)
}

/// Dominant vertex group of one face: accumulate member weights over the
/// face's vertices, highest total wins, name breaks ties.
fn face_vertex_group(me: &MeshSnapshot, poly: &Polygon, vgroups_map: &[Vec<(&str, f32)>]) -> String {
    let mut weights: FxHashMap<&str, f64> = FxHashMap::default();
    for l in poly.loop_start..poly.loop_start + poly.loop_total {
        let v = me.loops[l as usize] as usize;
        for &(name, weight) in &vgroups_map[v] {
            *weights.entry(name).or_insert(0.0) += weight as f64;
        }
    }
    weights
        .into_iter()
        .max_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        })
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "(null)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_snapshot() -> MeshSnapshot {
        MeshSnapshot {
            positions: vec![
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
            ],
            loops: vec![0, 1, 2, 3],
            polygons: vec![Polygon {
                loop_start: 0,
                loop_total: 4,
                smooth: false,
            }],
            edges: Vec::new(),
            ..Default::default()
        }
    }

    fn export_string(objects: &[ExportObject], opts: &ExportOptions) -> String {
        let mut out = Vec::new();
        write_brk(&mut out, objects, opts, "test.brk").unwrap();
        String::from_utf8(out).unwrap()
    }

    fn quad_object() -> ExportObject {
        ExportObject {
            name: "quad".to_string(),
            data_name: "quad".to_string(),
            matrix: Matrix4::identity(),
            mesh: Some(quad_snapshot()),
            parent: None,
            selected: true,
        }
    }

    #[test]
    fn test_basic_face_lines() {
        let text = export_string(&[quad_object()], &ExportOptions::default());
        assert!(text.contains("o quad\n"));
        assert!(text.contains("v 0.000000 0.000000 0.000000\n"));
        assert!(text.contains("f 1 2 3 4\n"));
    }

    #[test]
    fn test_triangulate_option() {
        let opts = ExportOptions {
            triangulate: true,
            ..Default::default()
        };
        let text = export_string(&[quad_object()], &opts);
        let faces: Vec<&str> = text.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(faces.len(), 2);
        assert!(faces.iter().all(|f| f.split_whitespace().count() == 4));
    }

    #[test]
    fn test_global_offsets_across_objects() {
        let text = export_string(
            &[quad_object(), quad_object()],
            &ExportOptions::default(),
        );
        let faces: Vec<&str> = text.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(faces[0], "f 1 2 3 4");
        assert_eq!(faces[1], "f 5 6 7 8");
    }

    #[test]
    fn test_mirrored_transform_flips_winding() {
        let mut ob = quad_object();
        ob.matrix = Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, 1.0));
        let text = export_string(&[ob], &ExportOptions::default());
        assert!(text.contains("f 4 3 2 1\n"));
    }

    #[test]
    fn test_empty_written_as_marker() {
        let ob = ExportObject::empty(
            "stud tip",
            Point3::new(1.0, 2.0, 3.0),
            Some("baseplate".to_string()),
        );
        let text = export_string(&[ob], &ExportOptions::default());
        assert!(text.contains("st stud_tip 1.000000 2.000000 3.000000 baseplate\n"));
    }

    #[test]
    fn test_selected_only_filter() {
        let mut ob = quad_object();
        ob.selected = false;
        let text = export_string(&[ob], &ExportOptions::default());
        assert!(!text.contains("o quad"));
    }

    #[test]
    fn test_void_object_skipped() {
        let mut ob = quad_object();
        ob.mesh = Some(MeshSnapshot::default());
        let text = export_string(&[ob], &ExportOptions::default());
        assert!(!text.contains("o quad"));
    }

    #[test]
    fn test_uv_dedup_keeps_vertex_identity() {
        // two triangles, all corners share the same numeric UV; slots must
        // still be distinct per vertex
        let mut me = quad_snapshot();
        me.loop_uvs = Some(vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5]);
        let mut ob = quad_object();
        ob.mesh = Some(me);
        let text = export_string(&[ob], &ExportOptions::default());
        let vts = text.lines().filter(|l| l.starts_with("vt ")).count();
        assert_eq!(vts, 4);
    }

    #[test]
    fn test_normal_dedup_ignores_vertex() {
        let opts = ExportOptions {
            write_normals: true,
            ..Default::default()
        };
        let text = export_string(&[quad_object()], &opts);
        // flat quad: every corner shares one normal line
        let vns = text.lines().filter(|l| l.starts_with("vn ")).count();
        assert_eq!(vns, 1);
        assert!(text.contains("f 1//1 2//1 3//1 4//1\n"));
    }

    #[test]
    fn test_loose_edge_written() {
        let mut me = quad_snapshot();
        me.positions.extend([2.0, 0.0, 0.0]);
        me.edges.push(Edge {
            vertices: [2, 4],
            sharp: false,
        });
        let mut ob = quad_object();
        ob.mesh = Some(me);
        let text = export_string(&[ob], &ExportOptions::default());
        assert!(text.contains("l 3 5\n"));
    }

    #[test]
    fn test_smoothing_groups_and_transitions() {
        // two smooth triangles separated by a sharp edge: two groups
        let me = MeshSnapshot {
            positions: vec![
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
            ],
            loops: vec![0, 1, 2, 0, 2, 3],
            polygons: vec![
                Polygon {
                    loop_start: 0,
                    loop_total: 3,
                    smooth: true,
                },
                Polygon {
                    loop_start: 3,
                    loop_total: 3,
                    smooth: true,
                },
            ],
            edges: vec![Edge {
                vertices: [0, 2],
                sharp: true,
            }],
            ..Default::default()
        };
        let mut ob = quad_object();
        ob.mesh = Some(me);
        let opts = ExportOptions {
            smoothing: SmoothingMode::Groups,
            ..Default::default()
        };
        let text = export_string(&[ob], &opts);
        assert!(text.contains("s 1\n"));
        assert!(text.contains("s 2\n"));
    }

    #[test]
    fn test_single_smooth_group_collapses_to_on_off() {
        let mut me = quad_snapshot();
        me.polygons[0].smooth = true;
        let mut ob = quad_object();
        ob.mesh = Some(me);
        let opts = ExportOptions {
            smoothing: SmoothingMode::Groups,
            ..Default::default()
        };
        let text = export_string(&[ob], &opts);
        assert!(text.contains("s 1\n"));
        assert!(!text.contains("s 2"));
    }

    #[test]
    fn test_bitflag_mode_powers_of_two() {
        let me = MeshSnapshot {
            positions: vec![
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
            ],
            loops: vec![0, 1, 2, 0, 2, 3],
            polygons: vec![
                Polygon {
                    loop_start: 0,
                    loop_total: 3,
                    smooth: true,
                },
                Polygon {
                    loop_start: 3,
                    loop_total: 3,
                    smooth: true,
                },
            ],
            edges: vec![Edge {
                vertices: [0, 2],
                sharp: true,
            }],
            ..Default::default()
        };
        let mut ob = quad_object();
        ob.mesh = Some(me);
        let opts = ExportOptions {
            smoothing: SmoothingMode::Bitflags,
            ..Default::default()
        };
        let text = export_string(&[ob], &opts);
        assert!(text.contains("s 1\n"));
        assert!(text.contains("s 2\n")); // 1 << 1
    }

    #[test]
    fn test_polygroup_context_lines() {
        let mut me = quad_snapshot();
        me.vertex_groups = vec![VertexGroupWeights {
            name: "anchor".to_string(),
            weights: vec![(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0)],
        }];
        let mut ob = quad_object();
        ob.mesh = Some(me);
        let opts = ExportOptions {
            vertex_groups_as_polygroups: true,
            ..Default::default()
        };
        let text = export_string(&[ob], &opts);
        assert!(text.contains("g anchor\n"));
    }

    #[test]
    fn test_frame_path_naming() {
        let path = frame_path(Path::new("/tmp/part.brk"), 12);
        assert_eq!(path.file_name().unwrap(), "part_000012.brk");
    }
}
