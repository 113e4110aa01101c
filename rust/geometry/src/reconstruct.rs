// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh reconstruction
//!
//! Turns one partitioned face group into a renderable mesh: drops
//! degenerate faces, converts polylines and 2-corner faces to edges,
//! triangulates invalid n-gons (tagging the introduced diagonals as
//! fold-seam candidates), dissolves those seams back where the forced
//! triangulation was unnecessary, derives sharp edges from smoothing-group
//! boundaries, and writes per-loop custom normals/UVs.

use brk_lite_core::{Corner, FaceKind, FaceRecord, VertexGroup};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::warn;

use crate::mesh::{Edge, Polygon, RenderableMesh, VertexGroupWeights};
use crate::triangulation::{polygon_normal, tessellate_ngon};
use crate::Point3;

/// Two triangles are merge-compatible when their normals agree this closely.
const COPLANAR_EPS: f64 = 1.0e-4;

#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Build one renderable mesh from a partitioned group.
///
/// `verts_nor`/`verts_tex` are the file-global pools, passed empty when the
/// group does not use them. Returns the mesh and the count of fold-seam
/// edges that could not be dissolved.
#[allow(clippy::too_many_arguments)]
pub fn build_mesh(
    name: &str,
    verts: &[[f64; 3]],
    mut faces: Vec<FaceRecord>,
    verts_nor: &[[f64; 3]],
    verts_tex: &[[f64; 2]],
    smoothing_active: bool,
    use_edges: bool,
    vertex_groups: &[VertexGroup],
) -> (RenderableMesh, u32) {
    let mut group_edge_users: FxHashMap<u32, FxHashMap<(u32, u32), u32>> = FxHashMap::default();
    let mut fgon_edges: Vec<(u32, u32)> = Vec::new();
    let mut fgon_seen: FxHashSet<(u32, u32)> = FxHashSet::default();
    let mut explicit_edges: Vec<[u32; 2]> = Vec::new();
    let mut appended: Vec<FaceRecord> = Vec::new();

    // Reverse scan so removals by position do not disturb remaining indices
    let mut i = faces.len();
    while i > 0 {
        i -= 1;
        let corner_count = faces[i].corners.len();

        if corner_count == 1 {
            // can't build anything from a single corner
            faces.remove(i);
            continue;
        }

        if faces[i].kind == FaceKind::Polyline || corner_count == 2 {
            if use_edges {
                for pair in faces[i].corners.windows(2) {
                    explicit_edges.push([pair[0].vertex, pair[1].vertex]);
                }
            }
            faces.remove(i);
            continue;
        }

        // Smoothing-group edge accounting runs for every retained polygon,
        // including ones about to be tessellated: the untriangulated
        // boundary is what defines the group's edges.
        if smoothing_active {
            if let Some(group) = faces[i].smooth_group {
                let users = group_edge_users.entry(group).or_default();
                let corners = &faces[i].corners;
                let mut prev = corners.last().expect("non-degenerate face").vertex;
                for c in corners {
                    let v = c.vertex;
                    *users.entry(edge_key(prev, v)).or_insert(0) += 1;
                    prev = v;
                }
            }
        }

        if faces[i].invalid {
            let face = faces.remove(i);
            if face.corners.len() > 3 {
                tessellate_invalid(
                    &face,
                    verts,
                    &mut appended,
                    &mut fgon_edges,
                    &mut fgon_seen,
                );
            }
            // invalid triangles are dropped outright
        }
    }
    faces.extend(appended);

    // An edge used by exactly one face within its group sits on the group's
    // boundary (or the mesh boundary) and shades sharp.
    let mut sharp_candidates: FxHashSet<(u32, u32)> = FxHashSet::default();
    for users in group_edge_users.values() {
        for (&key, &count) in users {
            if count == 1 {
                sharp_candidates.insert(key);
            }
        }
    }

    // Undo unnecessary forced triangulation wherever the diagonals dissolve
    // cleanly; a diagonal that resists (true hole) is reported, not fatal.
    let mut undissolved = 0u32;
    for &key in &fgon_edges {
        if !dissolve_seam(&mut faces, key, verts) {
            undissolved += 1;
        }
    }
    if undissolved > 0 {
        warn!(
            mesh = name,
            count = undissolved,
            "fold-seam edges could not be dissolved"
        );
    }

    let mesh = assemble(
        name,
        verts,
        &faces,
        verts_nor,
        verts_tex,
        smoothing_active,
        use_edges,
        &explicit_edges,
        &sharp_candidates,
        vertex_groups,
    );
    (mesh, undissolved)
}

/// Triangulate an invalid n-gon and record the internal diagonals that are
/// shared by two of the produced triangles as fold-seam candidates.
fn tessellate_invalid(
    face: &FaceRecord,
    verts: &[[f64; 3]],
    appended: &mut Vec<FaceRecord>,
    fgon_edges: &mut Vec<(u32, u32)>,
    fgon_seen: &mut FxHashSet<(u32, u32)>,
) {
    let points: Vec<Point3<f64>> = face
        .corners
        .iter()
        .map(|c| {
            let p = verts[c.vertex as usize];
            Point3::new(p[0], p[1], p[2])
        })
        .collect();
    let tris = tessellate_ngon(&points);
    if tris.is_empty() {
        warn!("dropping untriangulatable invalid polygon");
        return;
    }

    if tris.len() > 1 {
        let mut edge_users: FxHashSet<(u32, u32)> = FxHashSet::default();
        for tri in &tris {
            let mut prev = face.corners[tri[2]].vertex;
            for &ci in tri {
                let v = face.corners[ci].vertex;
                if v == prev {
                    // zero-length segment from a repeated index, skip
                    continue;
                }
                let key = edge_key(prev, v);
                prev = v;
                if !edge_users.insert(key) && fgon_seen.insert(key) {
                    fgon_edges.push(key);
                }
            }
        }
    }

    for tri in &tris {
        let mut t = FaceRecord::new(FaceKind::Polygon, face.smooth_group, face.object_key);
        t.corners.extend(tri.iter().map(|&ci| face.corners[ci]));
        appended.push(t);
    }
}

/// Try to dissolve one fold-seam edge by splicing its two coplanar adjacent
/// polygons back into a single n-gon. Returns false when the seam has to
/// stay (wrong user count, fold, or a self-touching merged loop).
fn dissolve_seam(faces: &mut Vec<FaceRecord>, key: (u32, u32), verts: &[[f64; 3]]) -> bool {
    let mut users: SmallVec<[usize; 2]> = SmallVec::new();
    for (fi, face) in faces.iter().enumerate() {
        if boundary_uses(&face.corners, key) > 0 {
            users.push(fi);
            if users.len() > 2 {
                return false;
            }
        }
    }
    if users.len() != 2 {
        return false;
    }
    let (a_idx, b_idx) = (users[0], users[1]);

    // A seam reused within one loop cannot splice cleanly
    if boundary_uses(&faces[a_idx].corners, key) != 1
        || boundary_uses(&faces[b_idx].corners, key) != 1
    {
        return false;
    }

    let normal_a = face_normal(&faces[a_idx], verts);
    let normal_b = face_normal(&faces[b_idx], verts);
    if normal_a.dot(&normal_b) < 1.0 - COPLANAR_EPS {
        return false;
    }

    let merged = match splice_loops(&faces[a_idx].corners, &faces[b_idx].corners, key) {
        Some(merged) => merged,
        None => return false,
    };

    faces[a_idx].corners = merged;
    faces.remove(b_idx);
    true
}

/// Count how many boundary edges of `corners` (closing edge included) match
/// the normalized `key`.
fn boundary_uses(corners: &[Corner], key: (u32, u32)) -> u32 {
    let mut count = 0;
    let mut prev = match corners.last() {
        Some(c) => c.vertex,
        None => return 0,
    };
    for c in corners {
        if edge_key(prev, c.vertex) == key {
            count += 1;
        }
        prev = c.vertex;
    }
    count
}

fn face_normal(face: &FaceRecord, verts: &[[f64; 3]]) -> crate::Vector3<f64> {
    let points: Vec<Point3<f64>> = face
        .corners
        .iter()
        .map(|c| {
            let p = verts[c.vertex as usize];
            Point3::new(p[0], p[1], p[2])
        })
        .collect();
    polygon_normal(&points)
}

/// Splice two corner loops sharing exactly one boundary edge into one loop,
/// preserving the first loop's winding. Returns None when the merged loop
/// would touch itself (a genuine hole diagonal).
fn splice_loops(
    a: &[Corner],
    b: &[Corner],
    key: (u32, u32),
) -> Option<SmallVec<[Corner; 4]>> {
    let n_a = a.len();
    let n_b = b.len();

    // Directed occurrence of the edge in a: a[ia] -> a[ia+1]
    let ia = (0..n_a).find(|&i| edge_key(a[i].vertex, a[(i + 1) % n_a].vertex) == key)?;
    let u = a[ia].vertex;
    let v = a[(ia + 1) % n_a].vertex;

    // Rotate a to start at v; it then ends at u
    let mut merged: SmallVec<[Corner; 4]> = SmallVec::with_capacity(n_a + n_b - 2);
    for off in 0..n_a {
        merged.push(a[(ia + 1 + off) % n_a]);
    }

    // Find the edge in b, in either winding, and append b's interior so the
    // merged boundary runs ... -> u -> (b interior) -> v(start)
    let interior: Vec<Corner> = if let Some(jb) =
        (0..n_b).find(|&j| b[j].vertex == v && b[(j + 1) % n_b].vertex == u)
    {
        // consistent winding: rotate b to start at u, drop u and trailing v
        (1..n_b - 1)
            .map(|off| b[(jb + 1 + off) % n_b])
            .collect()
    } else if let Some(jb) = (0..n_b).find(|&j| b[j].vertex == u && b[(j + 1) % n_b].vertex == v) {
        // opposite winding: walk b backwards from u
        (1..n_b - 1)
            .map(|off| b[(jb + n_b - off) % n_b])
            .collect()
    } else {
        return None;
    };
    merged.extend(interior);

    // Reject self-touching results; those mark a real topological split
    let mut seen: FxHashSet<u32> = FxHashSet::default();
    if !merged.iter().all(|c| seen.insert(c.vertex)) {
        return None;
    }
    Some(merged)
}

/// Flatten the final face list into the mesh arrays.
#[allow(clippy::too_many_arguments)]
fn assemble(
    name: &str,
    verts: &[[f64; 3]],
    faces: &[FaceRecord],
    verts_nor: &[[f64; 3]],
    verts_tex: &[[f64; 2]],
    smoothing_active: bool,
    use_edges: bool,
    explicit_edges: &[[u32; 2]],
    sharp_candidates: &FxHashSet<(u32, u32)>,
    vertex_groups: &[VertexGroup],
) -> RenderableMesh {
    let mut mesh = RenderableMesh::new(name);
    mesh.positions = verts
        .iter()
        .flat_map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();

    let use_nor = !verts_nor.is_empty();
    let use_tex = !verts_tex.is_empty();
    let mut normals: Vec<f32> = Vec::new();
    let mut uvs: Vec<f32> = Vec::new();

    for face in faces {
        let loop_start = mesh.loops.len() as u32;
        for c in &face.corners {
            mesh.loops.push(c.vertex);
            if use_nor {
                // An absent reference falls back to pool slot 0
                let n = verts_nor
                    .get(c.normal.unwrap_or(0) as usize)
                    .copied()
                    .unwrap_or([0.0; 3]);
                normals.extend([n[0] as f32, n[1] as f32, n[2] as f32]);
            }
            if use_tex {
                let t = verts_tex
                    .get(c.uv.unwrap_or(0) as usize)
                    .copied()
                    .unwrap_or([0.0; 2]);
                uvs.extend([t[0] as f32, t[1] as f32]);
            }
        }
        mesh.polygons.push(Polygon {
            loop_start,
            loop_total: face.corners.len() as u32,
            // Without per-corner normals, smoothing groups drive the flag;
            // with them, everything shades smooth below
            smooth: face.smooth_group.is_some(),
        });
    }

    if use_nor && !smoothing_active {
        for poly in mesh.polygons.iter_mut() {
            poly.smooth = true;
        }
    }

    // Edge set: explicit polyline edges first, then polygon boundaries
    let mut edge_slots: FxHashMap<(u32, u32), usize> = FxHashMap::default();
    if use_edges {
        for e in explicit_edges {
            if e[0] == e[1] {
                continue;
            }
            let key = edge_key(e[0], e[1]);
            edge_slots.entry(key).or_insert_with(|| {
                mesh.edges.push(Edge {
                    vertices: [e[0], e[1]],
                    sharp: false,
                });
                mesh.edges.len() - 1
            });
        }
    }
    for face in faces {
        let mut prev = match face.corners.last() {
            Some(c) => c.vertex,
            None => continue,
        };
        for c in &face.corners {
            let v = c.vertex;
            if v != prev {
                let key = edge_key(prev, v);
                let edges = &mut mesh.edges;
                edge_slots.entry(key).or_insert_with(|| {
                    edges.push(Edge {
                        vertices: [key.0, key.1],
                        sharp: false,
                    });
                    edges.len() - 1
                });
            }
            prev = v;
        }
    }
    for (key, &slot) in &edge_slots {
        if sharp_candidates.contains(key) {
            mesh.edges[slot].sharp = true;
        }
    }

    if use_nor && !mesh.loops.is_empty() {
        mesh.custom_normals = Some(normals);
        mesh.use_custom_normals = true;
    }
    if use_tex && !mesh.polygons.is_empty() {
        mesh.uv_layer = Some(uvs);
    }

    mesh.vertex_groups = vertex_groups
        .iter()
        .map(|g| VertexGroupWeights {
            name: g.name.clone(),
            weights: g.vertices.iter().map(|&v| (v, 1.0)).collect(),
        })
        .collect();

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use brk_lite_core::{Corner, FaceKind};

    fn polygon(verts: &[u32], smooth: Option<u32>) -> FaceRecord {
        let mut f = FaceRecord::new(FaceKind::Polygon, smooth, 0);
        f.corners.extend(verts.iter().map(|&v| Corner::new(v)));
        f
    }

    fn quad_verts() -> Vec<[f64; 3]> {
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]
    }

    fn build(
        verts: &[[f64; 3]],
        faces: Vec<FaceRecord>,
        smoothing: bool,
        use_edges: bool,
    ) -> (RenderableMesh, u32) {
        build_mesh("test", verts, faces, &[], &[], smoothing, use_edges, &[])
    }

    #[test]
    fn test_single_corner_face_dropped() {
        let (mesh, _) = build(&quad_verts(), vec![polygon(&[0], None)], false, true);
        assert_eq!(mesh.polygon_count(), 0);
        assert!(mesh.edges.is_empty());
    }

    #[test]
    fn test_two_corner_face_becomes_edge() {
        let (mesh, _) = build(&quad_verts(), vec![polygon(&[0, 1], None)], false, true);
        assert_eq!(mesh.polygon_count(), 0);
        assert_eq!(mesh.edges.len(), 1);
        assert_eq!(mesh.edges[0].vertices, [0, 1]);
    }

    #[test]
    fn test_two_corner_face_dropped_without_edges() {
        let (mesh, _) = build(&quad_verts(), vec![polygon(&[0, 1], None)], false, false);
        assert_eq!(mesh.polygon_count(), 0);
        assert!(mesh.edges.is_empty());
    }

    #[test]
    fn test_polyline_becomes_edge_chain() {
        let mut f = FaceRecord::new(FaceKind::Polyline, None, 0);
        f.corners
            .extend([Corner::new(0), Corner::new(1), Corner::new(2)]);
        let (mesh, _) = build(&quad_verts(), vec![f], false, true);
        assert_eq!(mesh.polygon_count(), 0);
        assert_eq!(mesh.edges.len(), 2);
    }

    #[test]
    fn test_plain_quad_assembles() {
        let (mesh, undissolved) =
            build(&quad_verts(), vec![polygon(&[0, 1, 2, 3], None)], false, true);
        assert_eq!(undissolved, 0);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.loop_count(), 4);
        assert_eq!(mesh.edges.len(), 4);
        assert!(mesh.validate());
    }

    #[test]
    fn test_sharp_edges_between_smooth_groups() {
        // two triangles sharing edge 1-2, in different groups: shared edge
        // is used once per group, so it comes out sharp
        let verts = quad_verts();
        let faces = vec![
            polygon(&[0, 1, 2], Some(0)),
            polygon(&[1, 3, 2], Some(1)),
        ];
        let (mesh, _) = build(&verts, faces, true, true);
        let shared = mesh
            .edges
            .iter()
            .find(|e| e.vertices == [1, 2])
            .expect("shared edge");
        assert!(shared.sharp);
    }

    #[test]
    fn test_no_sharp_edge_within_one_group() {
        let verts = quad_verts();
        let faces = vec![
            polygon(&[0, 1, 2], Some(0)),
            polygon(&[1, 3, 2], Some(0)),
        ];
        let (mesh, _) = build(&verts, faces, true, true);
        let shared = mesh
            .edges
            .iter()
            .find(|e| e.vertices == [1, 2])
            .expect("shared edge");
        assert!(!shared.sharp);
        // outline edges border the group once each and are sharp
        let outline = mesh
            .edges
            .iter()
            .find(|e| e.vertices == [0, 1])
            .expect("outline edge");
        assert!(outline.sharp);
    }

    #[test]
    fn test_invalid_triangle_dropped() {
        let mut f = polygon(&[0, 1, 2], None);
        f.invalid = true;
        let (mesh, _) = build(&quad_verts(), vec![f], false, true);
        assert_eq!(mesh.polygon_count(), 0);
    }

    #[test]
    fn test_invalid_planar_ngon_dissolves_back() {
        // a planar concave hexagon flagged invalid: forced triangulation
        // introduces diagonals, all of which dissolve back into one polygon
        let verts = vec![
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 2.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 2.0, 0.0],
            [-1.0, 1.0, 0.0],
        ];
        let mut f = polygon(&[0, 1, 2, 3, 4, 5], None);
        f.invalid = true;
        let (mesh, undissolved) = build(&verts, vec![f], false, true);
        assert_eq!(undissolved, 0);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.polygons[0].loop_total, 6);
        assert!(mesh.validate());
    }

    #[test]
    fn test_folded_invalid_ngon_keeps_seam() {
        // quad folded 90 degrees along the 0-2 diagonal: triangulation
        // splits it and the non-coplanar halves must not merge back
        let verts = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 1.0],
        ];
        let mut f = polygon(&[0, 1, 2, 3], None);
        f.invalid = true;
        let (mesh, undissolved) = build(&verts, vec![f], false, true);
        assert_eq!(mesh.polygon_count(), 2);
        assert_eq!(undissolved, 1);
    }

    #[test]
    fn test_custom_normals_assigned_per_loop() {
        let verts = quad_verts();
        let normals = vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
        let mut f = polygon(&[0, 1, 2], None);
        f.corners[0].normal = Some(1);
        f.corners[1].normal = Some(0);
        f.corners[2].normal = None; // falls back to pool slot 0
        let (mesh, _) =
            build_mesh("test", &verts, vec![f], &normals, &[], false, true, &[]);
        assert!(mesh.use_custom_normals);
        let lnors = mesh.custom_normals.as_ref().unwrap();
        assert_eq!(&lnors[0..3], &[0.0, 1.0, 0.0]);
        assert_eq!(&lnors[3..6], &[0.0, 0.0, 1.0]);
        assert_eq!(&lnors[6..9], &[0.0, 0.0, 1.0]);
        // no smoothing data: everything shades smooth
        assert!(mesh.polygons[0].smooth);
    }

    #[test]
    fn test_uv_layer_assigned_per_loop() {
        let verts = quad_verts();
        let uvs = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        let mut f = polygon(&[0, 1, 2], None);
        f.corners[0].uv = Some(0);
        f.corners[1].uv = Some(1);
        f.corners[2].uv = Some(2);
        let (mesh, _) = build_mesh("test", &verts, vec![f], &[], &uvs, false, true, &[]);
        let layer = mesh.uv_layer.as_ref().unwrap();
        assert_eq!(&layer[2..4], &[1.0, 0.0]);
    }

    #[test]
    fn test_vertex_groups_attached_with_unit_weight() {
        let groups = vec![VertexGroup {
            name: "anchor".to_string(),
            vertices: vec![0, 2],
        }];
        let (mesh, _) = build_mesh(
            "test",
            &quad_verts(),
            vec![polygon(&[0, 1, 2], None)],
            &[],
            &[],
            false,
            true,
            &groups,
        );
        assert_eq!(mesh.vertex_groups.len(), 1);
        assert_eq!(mesh.vertex_groups[0].weights, vec![(0, 1.0), (2, 1.0)]);
    }
}
