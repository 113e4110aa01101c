// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Object/group partitioner
//!
//! Splits the accumulated face pool into disjoint per-object (or
//! per-object+group) subsets, each with a locally remapped, compacted
//! vertex index space. Groups never share vertex storage: a vertex
//! referenced from two groups is duplicated into both.

use brk_lite_core::{FaceRecord, ObjectKey};
use rustc_hash::FxHashMap;

/// One partition of the face pool, with its compacted vertex subset.
#[derive(Debug, Default)]
pub struct SplitGroup {
    pub verts: Vec<[f64; 3]>,
    pub faces: Vec<FaceRecord>,
    pub name: String,
    pub uses_normals: bool,
    pub uses_texcoords: bool,
}

/// Partition `faces` by their object key.
///
/// With `split` off (or an empty face pool) a single group covering
/// everything is returned, named after `source_name`. Groups come out in
/// first-seen order; face corner indices are rewritten to each group's
/// local vertex space.
pub fn split_mesh(
    verts_loc: &[[f64; 3]],
    faces: Vec<FaceRecord>,
    object_keys: &[ObjectKey],
    source_name: &str,
    split: bool,
) -> Vec<SplitGroup> {
    if !split || faces.is_empty() {
        let uses_normals = faces
            .iter()
            .any(|f| f.corners.iter().any(|c| c.normal.is_some()));
        let uses_texcoords = faces.iter().any(|f| f.corners.iter().any(|c| c.uv.is_some()));
        return vec![SplitGroup {
            verts: verts_loc.to_vec(),
            faces,
            name: source_name.to_string(),
            uses_normals,
            uses_texcoords,
        }];
    }

    struct Accum {
        group: SplitGroup,
        remap: FxHashMap<u32, u32>,
    }

    let mut accums: Vec<Accum> = Vec::new();
    let mut by_key: FxHashMap<u32, usize> = FxHashMap::default();

    for mut face in faces {
        let slot = *by_key.entry(face.object_key).or_insert_with(|| {
            accums.push(Accum {
                group: SplitGroup {
                    name: key_to_name(&object_keys[face.object_key as usize], source_name),
                    ..Default::default()
                },
                remap: FxHashMap::default(),
            });
            accums.len() - 1
        });
        let accum = &mut accums[slot];

        if !accum.group.uses_normals && face.corners.iter().any(|c| c.normal.is_some()) {
            accum.group.uses_normals = true;
        }
        if !accum.group.uses_texcoords && face.corners.iter().any(|c| c.uv.is_some()) {
            accum.group.uses_texcoords = true;
        }

        // Remap verts to the group-local vertex list, adding on first use
        for corner in face.corners.iter_mut() {
            let verts = &mut accum.group.verts;
            let local = *accum.remap.entry(corner.vertex).or_insert_with(|| {
                verts.push(verts_loc[corner.vertex as usize]);
                (verts.len() - 1) as u32
            });
            corner.vertex = local;
        }
        accum.group.faces.push(face);
    }

    accums.into_iter().map(|a| a.group).collect()
}

/// Group name for a partition key: an empty or absent key falls back to the
/// source identifier, a pair joins its parts with an underscore.
fn key_to_name(key: &ObjectKey, source_name: &str) -> String {
    match key {
        ObjectKey::None => source_name.to_string(),
        ObjectKey::Name(name) if name.is_empty() => source_name.to_string(),
        ObjectKey::Name(name) => name.clone(),
        ObjectKey::Pair(object, group) => format!("{}_{}", object, group),
    }
}
