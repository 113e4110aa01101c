// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # BRK-Lite Core Parser
//!
//! Streaming parser for the BRK brick-construction geometry text format.
//!
//! ## Overview
//!
//! This crate provides the wire-format layer of BRK-Lite:
//!
//! - **Line Tokenization**: whitespace field splitting with `\` continuation
//! - **Locale Sniffing**: one-shot decimal-comma detection per file
//! - **Streaming Parser**: line-at-a-time grammar with explicit record state
//! - **Topology Flags**: relative-index resolution and invalid-polygon detection
//!
//! ## Quick Start
//!
//! ```rust
//! use brk_lite_core::{NullProgress, ParseOptions, Parser, FloatParser};
//!
//! let content = b"v 0.0 0.0 0.0\nv 1.0 0.0 0.0\nv 1.0 1.0 0.0\nf 1 2 3\n" as &[u8];
//! let out = Parser::parse(content, FloatParser::DOT, ParseOptions::default(),
//!                         &mut NullProgress).unwrap();
//! assert_eq!(out.verts_loc.len(), 3);
//! assert_eq!(out.faces.len(), 1);
//! ```
//!
//! Mesh reconstruction and the export path live in `brk-lite-geometry`.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for option/summary types

pub mod error;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod records;

pub use error::{Error, Result};
pub use number::{parse_index, sniff_convention, sniff_path, FloatParser};
pub use parser::{ParseOptions, Parser};
pub use records::{
    Corner, FaceKind, FaceRecord, MarkerRecord, NullProgress, ObjectKey, ParseOutput,
    ParseSummary, ProgressSink, VertexGroup,
};
