// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming BRK grammar parser.
//!
//! Consumes one line at a time and appends fully-parsed records into the
//! growable pools of [`ParseOutput`]. All "current record" state (active
//! object/group keys, active smoothing group, in-progress multi-line record)
//! lives in an explicit [`Parser`] struct, so the parser is reentrant and
//! testable per-line.
//!
//! Index resolution happens here, once: wire indices `< 1` are relative to
//! the current end of their pool, everything else converts 1-based to
//! 0-based. Downstream code only ever sees absolute, validated indices.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use memchr::memchr;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::lexer::{split_fields, strip_continuation, Fields};
use crate::number::{self, parse_index, FloatParser};
use crate::records::{
    Corner, FaceKind, FaceRecord, MarkerRecord, ObjectKey, ParseOutput, ProgressSink, VertexGroup,
};

/// Parser-facing subset of the import options.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseOptions {
    /// Parse `l` records into polyline face records
    pub use_lines: bool,
    /// Honor `s` smoothing-group context lines
    pub use_smooth_groups: bool,
    /// Honor `o` lines as partition keys
    pub use_split_objects: bool,
    /// Honor `g` lines as partition keys
    pub use_split_groups: bool,
    /// Treat `g` lines as named vertex-weight sets instead of partition keys.
    /// Forced off when either split mode is on.
    pub use_groups_as_vgroups: bool,
    /// Fast-path failures tolerated before bulk vertex parsing is disabled
    pub fast_path_failure_limit: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            use_lines: true,
            use_smooth_groups: true,
            use_split_objects: true,
            use_split_groups: false,
            use_groups_as_vgroups: false,
            fast_path_failure_limit: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VecKind {
    Loc,
    Nor,
    Tex,
}

impl VecKind {
    fn components(self) -> usize {
        match self {
            VecKind::Loc | VecKind::Nor => 3,
            VecKind::Tex => 2,
        }
    }
}

/// The multi-line record currently open, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenRecord {
    None,
    Vec(VecKind),
    Face,
    Line,
}

/// Streaming parser state. Feed lines with [`Parser::feed_line`], then call
/// [`Parser::finish`].
pub struct Parser {
    opts: ParseOptions,
    float: FloatParser,
    out: ParseOutput,

    // Active record context
    smooth_group: Option<u32>,
    smooth_ids: FxHashMap<Vec<u8>, u32>,
    object_key: u32,
    object_part: Option<String>,
    key_ids: FxHashMap<ObjectKey, u32>,
    object_names: FxHashSet<String>,
    vgroup: Option<usize>,
    vgroup_ids: FxHashMap<String, usize>,

    // In-progress multi-line record
    open: OpenRecord,
    vec_acc: Vec<f64>,
    vec_bad: bool,
    record_discard: bool,

    // Pool lengths captured when the open face started
    loc_len: usize,
    nor_len: usize,
    tex_len: usize,
    used_verts: FxHashSet<u32>,

    // Vertex fast path
    quick_failures: u32,
    skip_quick: bool,
}

impl Parser {
    pub fn new(float: FloatParser, mut opts: ParseOptions) -> Self {
        // Splitting and vertex-weight groups are mutually exclusive; splitting wins.
        if opts.use_split_objects || opts.use_split_groups {
            opts.use_groups_as_vgroups = false;
        }
        let mut out = ParseOutput::default();
        let mut key_ids = FxHashMap::default();
        out.object_keys.push(ObjectKey::None);
        key_ids.insert(ObjectKey::None, 0);
        Parser {
            opts,
            float,
            out,
            smooth_group: None,
            smooth_ids: FxHashMap::default(),
            object_key: 0,
            object_part: None,
            key_ids,
            object_names: FxHashSet::default(),
            vgroup: None,
            vgroup_ids: FxHashMap::default(),
            open: OpenRecord::None,
            vec_acc: Vec::new(),
            vec_bad: false,
            record_discard: false,
            loc_len: 0,
            nor_len: 0,
            tex_len: 0,
            used_verts: FxHashSet::default(),
            quick_failures: 0,
            skip_quick: false,
        }
    }

    /// Parse an entire byte stream with a pre-chosen float convention.
    pub fn parse<R: BufRead>(
        mut reader: R,
        float: FloatParser,
        opts: ParseOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<ParseOutput> {
        let mut parser = Parser::new(float, opts);
        let mut line = Vec::with_capacity(256);
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            parser.feed_line(&line);
        }
        let out = parser.finish();
        progress.step(&format!(
            "parsed verts:{} faces:{} smoothgroups:{}",
            out.verts_loc.len(),
            out.faces.len(),
            out.smooth_group_count
        ));
        Ok(out)
    }

    /// Sniff the decimal convention of `path`, then parse it.
    pub fn parse_path(
        path: &Path,
        opts: ParseOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<ParseOutput> {
        let float = number::sniff_path(path)?;
        let file = File::open(path).map_err(|e| Error::unavailable(path, e))?;
        Self::parse(BufReader::new(file), float, opts, progress)
    }

    /// Consume one raw line (newline byte optional).
    pub fn feed_line(&mut self, line: &[u8]) {
        let fields = split_fields(line);
        if fields.is_empty() {
            return;
        }
        let tag = fields[0];

        // Vertex-coordinate lines win over any open record; most files store
        // each on a single line, so try the bulk fast path first and fall
        // back to the multi-line-aware handler only when it fails.
        let vec_kind = match tag {
            b"v" => Some(VecKind::Loc),
            b"vn" => Some(VecKind::Nor),
            b"vt" => Some(VecKind::Tex),
            _ => None,
        };
        if let Some(kind) = vec_kind {
            self.close_open_record();
            if !self.skip_quick && self.quick_vec(kind, &fields) {
                return;
            }
            self.open = OpenRecord::Vec(kind);
            self.vec_acc.clear();
            self.vec_bad = false;
            self.vec_line(&fields, true);
            return;
        }

        // Continuation lines extend the open record regardless of how they
        // start; line-at-a-time consumption cannot look ahead.
        match self.open {
            OpenRecord::Vec(_) => {
                self.vec_line(&fields, false);
                return;
            }
            OpenRecord::Face => {
                self.face_line(&fields, false);
                return;
            }
            OpenRecord::Line => {
                self.polyline_line(&fields, false);
                return;
            }
            OpenRecord::None => {}
        }

        match tag {
            b"f" => self.face_line(&fields, true),
            b"l" if self.opts.use_lines => self.polyline_line(&fields, true),
            b"s" => self.smooth_line(&fields),
            b"o" => self.object_line(&fields),
            b"g" => self.group_line(&fields),
            b"st" => self.marker_line(&fields),
            // Unrecognized tags (comments, material records, ...) are skipped.
            _ => {}
        }
    }

    /// Finalize any open record and return the accumulated output.
    pub fn finish(mut self) -> ParseOutput {
        self.close_open_record();
        self.out.smooth_group_count = self.smooth_ids.len() as u32;
        self.out
    }

    // ---- vertex data ----

    /// Bulk parse of a `v`/`vn`/`vt` line with the exact expected field
    /// count. Returns false when the slow path must take over.
    fn quick_vec(&mut self, kind: VecKind, fields: &Fields<'_>) -> bool {
        let n = kind.components();
        if fields.len() != n + 1 {
            return false;
        }
        let mut vals = [0.0f64; 3];
        for (i, tok) in fields[1..].iter().enumerate() {
            match self.float.parse(tok) {
                Some(v) => vals[i] = v,
                None => {
                    // Repeated failures mean the file has a shape this path
                    // cannot handle; stop paying for the attempts.
                    self.quick_failures += 1;
                    if self.quick_failures > self.opts.fast_path_failure_limit {
                        self.skip_quick = true;
                    }
                    return false;
                }
            }
        }
        self.push_vec(kind, &vals);
        true
    }

    fn vec_line(&mut self, fields: &Fields<'_>, new: bool) {
        let mut data: Fields<'_> = if new {
            fields[1..].iter().copied().collect()
        } else {
            fields.clone()
        };
        let cont = strip_continuation(&mut data);
        let float = self.float;
        for tok in &data {
            match float.parse(tok) {
                Some(v) => self.vec_acc.push(v),
                None => self.vec_bad = true,
            }
        }
        if !cont {
            self.finalize_vec();
            self.open = OpenRecord::None;
        }
    }

    fn finalize_vec(&mut self) {
        let kind = match self.open {
            OpenRecord::Vec(kind) => kind,
            _ => return,
        };
        let n = kind.components();
        if self.vec_bad || self.vec_acc.len() < n {
            self.out.summary.malformed_records += 1;
        } else {
            let mut vals = [0.0f64; 3];
            vals[..n].copy_from_slice(&self.vec_acc[..n]);
            self.push_vec(kind, &vals);
        }
        self.vec_acc.clear();
        self.vec_bad = false;
    }

    fn push_vec(&mut self, kind: VecKind, vals: &[f64; 3]) {
        match kind {
            VecKind::Loc => self.out.verts_loc.push([vals[0], vals[1], vals[2]]),
            VecKind::Nor => self.out.verts_nor.push([vals[0], vals[1], vals[2]]),
            VecKind::Tex => self.out.verts_tex.push([vals[0], vals[1]]),
        }
    }

    // ---- faces ----

    fn face_line(&mut self, fields: &Fields<'_>, new: bool) {
        if new {
            self.loc_len = self.out.verts_loc.len();
            self.nor_len = self.out.verts_nor.len();
            self.tex_len = self.out.verts_tex.len();
            self.used_verts.clear();
            self.record_discard = false;
            self.out.faces.push(FaceRecord::new(
                FaceKind::Polygon,
                self.smooth_group,
                self.object_key,
            ));
        }
        let mut data: Fields<'_> = if new {
            fields[1..].iter().copied().collect()
        } else {
            fields.clone()
        };
        let cont = strip_continuation(&mut data);

        if !self.record_discard {
            for tok in &data {
                if !self.face_corner(tok) {
                    // An unparsable number drops the whole record.
                    self.record_discard = true;
                    self.out.summary.malformed_records += 1;
                    break;
                }
            }
        }

        if cont {
            self.open = OpenRecord::Face;
        } else {
            self.finalize_face();
            self.open = OpenRecord::None;
        }
    }

    /// Parse one `v[/t][/n]` corner token onto the open face.
    /// Returns false on an unparsable index.
    fn face_corner(&mut self, tok: &[u8]) -> bool {
        let (v_tok, t_tok, n_tok) = split_corner(tok);
        let raw = match parse_index(v_tok) {
            Some(raw) => raw,
            None => return false,
        };
        let vert = match resolve_wire_index(raw, self.loc_len) {
            Some(idx) => idx,
            None => {
                // Corner dropped, the rest of the line is still attempted.
                self.out.summary.dropped_corners += 1;
                return true;
            }
        };
        if self.opts.use_groups_as_vgroups {
            if let Some(g) = self.vgroup {
                self.out.vertex_groups[g].vertices.push(vert);
            }
        }

        // First-round heuristic: reusing a vertex within one face suggests an
        // invalid polygon; the authoritative boundary-edge check runs once
        // the face is complete.
        let face = self.out.faces.last_mut().expect("open face");
        if !face.invalid && !self.used_verts.insert(vert) {
            face.invalid = true;
        }

        let mut corner = Corner::new(vert);
        match resolve_sub_index(t_tok, self.tex_len) {
            SubIndex::Present(idx) => corner.uv = Some(idx),
            SubIndex::Absent => {}
            SubIndex::OutOfRange => self.out.summary.dropped_corners += 1,
            SubIndex::Unparsable => return false,
        }
        match resolve_sub_index(n_tok, self.nor_len) {
            SubIndex::Present(idx) => corner.normal = Some(idx),
            SubIndex::Absent => {}
            SubIndex::OutOfRange => self.out.summary.dropped_corners += 1,
            SubIndex::Unparsable => return false,
        }
        self.out
            .faces
            .last_mut()
            .expect("open face")
            .corners
            .push(corner);
        true
    }

    fn finalize_face(&mut self) {
        if self.record_discard {
            self.out.faces.pop();
            self.record_discard = false;
            return;
        }
        let face = match self.out.faces.last_mut() {
            Some(face) => face,
            None => return,
        };
        if face.corners.is_empty() {
            self.out.faces.pop();
            return;
        }
        if face.invalid {
            face.invalid = boundary_edge_reused(&face.corners);
        }
    }

    // ---- polylines ----

    fn polyline_line(&mut self, fields: &Fields<'_>, new: bool) {
        if new {
            self.record_discard = false;
            self.out.faces.push(FaceRecord::new(
                FaceKind::Polyline,
                self.smooth_group,
                self.object_key,
            ));
        }
        let mut data: Fields<'_> = if new {
            fields[1..].iter().copied().collect()
        } else {
            fields.clone()
        };
        let cont = strip_continuation(&mut data);

        if !self.record_discard {
            for tok in &data {
                let (v_tok, _, _) = split_corner(tok);
                let raw = match parse_index(v_tok) {
                    Some(raw) => raw,
                    None => {
                        self.record_discard = true;
                        self.out.summary.malformed_records += 1;
                        break;
                    }
                };
                // Polyline corners resolve against the live pool length.
                match resolve_wire_index(raw, self.out.verts_loc.len()) {
                    Some(idx) => self
                        .out
                        .faces
                        .last_mut()
                        .expect("open polyline")
                        .corners
                        .push(Corner::new(idx)),
                    None => self.out.summary.dropped_corners += 1,
                }
            }
        }

        if cont {
            self.open = OpenRecord::Line;
        } else {
            self.finalize_polyline();
            self.open = OpenRecord::None;
        }
    }

    fn finalize_polyline(&mut self) {
        let empty = self
            .out
            .faces
            .last()
            .map(|f| f.corners.is_empty())
            .unwrap_or(false);
        if self.record_discard || empty {
            self.out.faces.pop();
            self.record_discard = false;
        }
    }

    // ---- context lines ----

    fn smooth_line(&mut self, fields: &Fields<'_>) {
        if !self.opts.use_smooth_groups {
            return;
        }
        self.smooth_group = match line_value(fields) {
            Some(val) if val.as_slice() != b"off".as_slice() => {
                let next = self.smooth_ids.len() as u32;
                Some(*self.smooth_ids.entry(val).or_insert(next))
            }
            _ => None,
        };
    }

    fn object_line(&mut self, fields: &Fields<'_>) {
        if !self.opts.use_split_objects {
            return;
        }
        let name = line_value(fields)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_default();
        let unique = self.unique_name(name);
        self.object_part = Some(unique.clone());
        self.object_key = self.intern_key(ObjectKey::Name(unique));
    }

    fn group_line(&mut self, fields: &Fields<'_>) {
        if self.opts.use_split_groups {
            let group = line_value(fields)
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .unwrap_or_default();
            let key = match &self.object_part {
                Some(part) => ObjectKey::Pair(part.clone(), group),
                None => ObjectKey::Name(group),
            };
            self.object_key = self.intern_key(key);
        } else if self.opts.use_groups_as_vgroups {
            self.vgroup = match line_value(fields) {
                Some(val) if val.as_slice() != b"(null)".as_slice() => {
                    let name = String::from_utf8_lossy(&val).into_owned();
                    let groups = &mut self.out.vertex_groups;
                    Some(*self.vgroup_ids.entry(name.clone()).or_insert_with(|| {
                        groups.push(VertexGroup {
                            name,
                            vertices: Vec::new(),
                        });
                        groups.len() - 1
                    }))
                }
                _ => None,
            };
        }
    }

    fn marker_line(&mut self, fields: &Fields<'_>) {
        // st name x y z [... parent-name]
        if fields.len() < 5 {
            self.out.summary.malformed_records += 1;
            return;
        }
        let mut position = [0.0f64; 3];
        for (i, tok) in fields[2..5].iter().enumerate() {
            match self.float.parse(tok) {
                Some(v) => position[i] = v,
                None => {
                    self.out.summary.malformed_records += 1;
                    return;
                }
            }
        }
        let parent = (fields.len() > 5)
            .then(|| String::from_utf8_lossy(fields.last().expect("nonempty")).into_owned());
        self.out.markers.push(MarkerRecord {
            name: String::from_utf8_lossy(fields[1]).into_owned(),
            position,
            parent,
        });
    }

    // ---- helpers ----

    fn close_open_record(&mut self) {
        match self.open {
            OpenRecord::None => {}
            OpenRecord::Vec(_) => self.finalize_vec(),
            OpenRecord::Face => self.finalize_face(),
            OpenRecord::Line => self.finalize_polyline(),
        }
        self.open = OpenRecord::None;
    }

    fn intern_key(&mut self, key: ObjectKey) -> u32 {
        if let Some(&id) = self.key_ids.get(&key) {
            return id;
        }
        let id = self.out.object_keys.len() as u32;
        self.out.object_keys.push(key.clone());
        self.key_ids.insert(key, id);
        id
    }

    /// Unique an object name against everything seen so far by appending a
    /// `.000`-style numeric suffix.
    fn unique_name(&mut self, name: String) -> String {
        if self.object_names.insert(name.clone()) {
            return name;
        }
        let mut i = 0u32;
        loop {
            let candidate = format!("{}.{:03}", name, i);
            if self.object_names.insert(candidate.clone()) {
                return candidate;
            }
            i += 1;
        }
    }
}

/// The value of a context line: everything after the tag, space-joined.
fn line_value(fields: &Fields<'_>) -> Option<Vec<u8>> {
    match fields.len() {
        0 | 1 => None,
        2 => Some(fields[1].to_vec()),
        _ => Some(fields[1..].join(&b' ')),
    }
}

/// Split a face corner token on `/` into its up-to-three sub-fields.
fn split_corner(tok: &[u8]) -> (&[u8], Option<&[u8]>, Option<&[u8]>) {
    match memchr(b'/', tok) {
        None => (tok, None, None),
        Some(i) => {
            let rest = &tok[i + 1..];
            match memchr(b'/', rest) {
                None => (&tok[..i], Some(rest), None),
                Some(j) => (&tok[..i], Some(&rest[..j]), Some(&rest[j + 1..])),
            }
        }
    }
}

/// Resolve a 1-based/relative wire index against a pool length.
#[inline]
fn resolve_wire_index(raw: i64, pool_len: usize) -> Option<u32> {
    let resolved = if raw < 1 {
        raw + pool_len as i64
    } else {
        raw - 1
    };
    (0..pool_len as i64)
        .contains(&resolved)
        .then_some(resolved as u32)
}

enum SubIndex {
    Present(u32),
    Absent,
    OutOfRange,
    Unparsable,
}

/// Resolve an optional texcoord/normal sub-field. An empty sub-field or the
/// invalid wire index `0` both mean "absent".
fn resolve_sub_index(tok: Option<&[u8]>, pool_len: usize) -> SubIndex {
    let tok = match tok {
        Some(tok) if !tok.is_empty() && tok != b"0" => tok,
        _ => return SubIndex::Absent,
    };
    let raw = match parse_index(tok) {
        Some(raw) => raw,
        None => return SubIndex::Unparsable,
    };
    match resolve_wire_index(raw, pool_len) {
        Some(idx) => SubIndex::Present(idx),
        None => SubIndex::OutOfRange,
    }
}

/// Definitive invalid-polygon check: a boundary edge (normalized pair of
/// consecutive corners, closing edge included) used twice within the same
/// face marks a non-simple polygon.
fn boundary_edge_reused(corners: &[Corner]) -> bool {
    let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();
    let mut prev = corners.last().map(|c| c.vertex).unwrap_or(0);
    for c in corners {
        let v = c.vertex;
        let key = if prev < v { (prev, v) } else { (v, prev) };
        if !seen.insert(key) {
            return true;
        }
        prev = v;
    }
    false
}
