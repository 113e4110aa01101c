// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Numeric field parsing with decimal-convention sniffing.
//!
//! BRK files from some tools use decimal commas instead of points. The
//! convention is decided once per file by inspecting the first vertex line,
//! then every numeric field is parsed with the same convention.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use memchr::memchr;
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Float-parsing function fixed for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatParser {
    decimal_comma: bool,
}

impl FloatParser {
    /// Dot-as-decimal parser (the default convention)
    pub const DOT: FloatParser = FloatParser {
        decimal_comma: false,
    };

    /// Comma-as-decimal parser
    pub const COMMA: FloatParser = FloatParser {
        decimal_comma: true,
    };

    /// Whether this file uses decimal commas
    #[inline]
    pub fn decimal_comma(&self) -> bool {
        self.decimal_comma
    }

    /// Parse one whole token as a float.
    ///
    /// In comma mode every `,` is rewritten to `.` before parsing. A token
    /// that is not entirely a number yields None.
    #[inline]
    pub fn parse(&self, token: &[u8]) -> Option<f64> {
        if self.decimal_comma && memchr(b',', token).is_some() {
            let buf: SmallVec<[u8; 32]> = token
                .iter()
                .map(|&b| if b == b',' { b'.' } else { b })
                .collect();
            fast_float::parse(&buf).ok()
        } else {
            fast_float::parse(token).ok()
        }
    }
}

/// Parse one whole token as a signed wire index.
#[inline]
pub fn parse_index(token: &[u8]) -> Option<i64> {
    lexical_core::parse::<i64>(token).ok()
}

/// Decide the file's decimal convention from its first vertex line.
///
/// Scans for the first line starting with `v` (this also matches `vn` and
/// `vt`): a `,` anywhere in it selects comma-as-decimal, a `.` selects dot.
/// A `v` line with neither keeps scanning. A file with no such line (all
/// integer coordinates) defaults to dot.
pub fn sniff_convention<R: BufRead>(mut reader: R) -> std::io::Result<FloatParser> {
    let mut line = Vec::with_capacity(128);
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(FloatParser::DOT);
        }
        let trimmed = match line.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => &line[i..],
            None => continue,
        };
        if trimmed.first() == Some(&b'v') {
            if memchr(b',', trimmed).is_some() {
                return Ok(FloatParser::COMMA);
            } else if memchr(b'.', trimmed).is_some() {
                return Ok(FloatParser::DOT);
            }
        }
    }
}

/// Sniff the decimal convention of the file at `path`
pub fn sniff_path(path: &Path) -> Result<FloatParser> {
    let file = File::open(path).map_err(|e| Error::unavailable(path, e))?;
    Ok(sniff_convention(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sniff(content: &[u8]) -> FloatParser {
        sniff_convention(content).unwrap()
    }

    #[test]
    fn test_sniff_dot() {
        assert_eq!(sniff(b"o part\nv 1.5 2.0 3.0\n"), FloatParser::DOT);
    }

    #[test]
    fn test_sniff_comma() {
        assert_eq!(sniff(b"o part\nv 1,5 2,0 3,0\n"), FloatParser::COMMA);
    }

    #[test]
    fn test_sniff_skips_integer_vertex_lines() {
        // first v line has neither separator, the second decides
        assert_eq!(sniff(b"v 1 2 3\nv 1,5 2 3\n"), FloatParser::COMMA);
    }

    #[test]
    fn test_sniff_default_for_all_int_file() {
        assert_eq!(sniff(b"o part\nf 1 2 3\n"), FloatParser::DOT);
    }

    #[test]
    fn test_parse_comma_mode() {
        let p = FloatParser::COMMA;
        assert_eq!(p.parse(b"1,5"), Some(1.5));
        // dot tokens still parse in comma mode
        assert_eq!(p.parse(b"2.25"), Some(2.25));
        // a token mixing both conventions is malformed
        assert_eq!(p.parse(b"1,5.2"), None);
    }

    #[test]
    fn test_parse_dot_mode_rejects_comma() {
        let p = FloatParser::DOT;
        assert_eq!(p.parse(b"1.5"), Some(1.5));
        assert_eq!(p.parse(b"2,0"), None);
    }

    #[test]
    fn test_parse_scientific() {
        assert_eq!(FloatParser::DOT.parse(b"1.5e-3"), Some(1.5e-3));
        assert_eq!(FloatParser::DOT.parse(b"-2E2"), Some(-200.0));
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index(b"42"), Some(42));
        assert_eq!(parse_index(b"-3"), Some(-3));
        assert_eq!(parse_index(b"x"), None);
        assert_eq!(parse_index(b"1.5"), None);
    }
}
