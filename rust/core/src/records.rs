// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed records produced by the streaming parser.
//!
//! Wire indices are 1-based with negatives meaning "relative to the current
//! end of the pool"; resolution happens once at parse time, so everything in
//! this module carries absolute, 0-based indices only.

use smallvec::SmallVec;

/// One vertex reference within a face, with optional texcoord/normal refs.
///
/// Absence is a real state here: the wire encodes a missing sub-index by
/// omitting the field (or writing the invalid index 0), never by pointing at
/// a sentinel pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub vertex: u32,
    pub uv: Option<u32>,
    pub normal: Option<u32>,
}

impl Corner {
    pub fn new(vertex: u32) -> Self {
        Corner {
            vertex,
            uv: None,
            normal: None,
        }
    }
}

/// Whether a record describes a polygon (`f`) or a polyline (`l`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceKind {
    Polygon,
    Polyline,
}

/// A parsed `f` or `l` record with its surrounding context.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    pub kind: FaceKind,
    pub corners: SmallVec<[Corner; 4]>,
    /// Interned smoothing-group id active when the record was read
    pub smooth_group: Option<u32>,
    /// Index into [`ParseOutput::object_keys`]
    pub object_key: u32,
    /// Set when the boundary-edge reuse check flagged a non-simple polygon
    pub invalid: bool,
}

impl FaceRecord {
    pub fn new(kind: FaceKind, smooth_group: Option<u32>, object_key: u32) -> Self {
        FaceRecord {
            kind,
            corners: SmallVec::new(),
            smooth_group,
            object_key,
            invalid: false,
        }
    }
}

/// Partition key for a face: the object and/or group context it was read in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    /// No `o`/`g` context seen (or splitting disabled)
    None,
    /// Object name, or bare group name when only group splitting is on
    Name(String),
    /// (object, group) pair when both contexts are active
    Pair(String, String),
}

/// A `st` connector-marker record, queued for deferred parent resolution.
///
/// The parent link is a weak by-name reference until all objects exist.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRecord {
    pub name: String,
    pub position: [f64; 3],
    pub parent: Option<String>,
}

/// A named vertex-weight set gathered from `g` lines in vgroup mode.
#[derive(Debug, Clone, Default)]
pub struct VertexGroup {
    pub name: String,
    /// Vertex indices added while the group was active (weight 1.0 each)
    pub vertices: Vec<u32>,
}

/// Per-record skip counters aggregated over one parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseSummary {
    /// Records dropped for too few tokens or an unparsable number
    pub malformed_records: u32,
    /// Face/line corners dropped for referencing outside a pool
    pub dropped_corners: u32,
}

/// Everything one parse pass produces.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub verts_loc: Vec<[f64; 3]>,
    pub verts_nor: Vec<[f64; 3]>,
    pub verts_tex: Vec<[f64; 2]>,
    pub faces: Vec<FaceRecord>,
    pub markers: Vec<MarkerRecord>,
    /// Interned object keys; id 0 is always [`ObjectKey::None`]
    pub object_keys: Vec<ObjectKey>,
    /// Number of distinct smoothing-group tokens seen
    pub smooth_group_count: u32,
    pub vertex_groups: Vec<VertexGroup>,
    pub summary: ParseSummary,
}

impl ParseOutput {
    pub fn object_key(&self, id: u32) -> &ObjectKey {
        &self.object_keys[id as usize]
    }
}

/// Coarse progress observer for long imports/exports.
///
/// The default implementation does nothing; absence of a real observer must
/// not change behavior.
pub trait ProgressSink {
    fn step(&mut self, _message: &str) {}
}

/// The no-op observer
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}
