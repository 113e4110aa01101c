// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line tokenizer for the BRK format.
//!
//! BRK is line-oriented: whitespace-separated fields, with a trailing
//! backslash continuing the current record on the next line.

use smallvec::SmallVec;

/// Fields of one line, borrowed from the line buffer.
pub type Fields<'a> = SmallVec<[&'a [u8]; 8]>;

/// Split a raw line into whitespace-separated fields.
///
/// Trailing `\r`/`\n` bytes count as whitespace, so CRLF input needs no
/// special casing.
pub fn split_fields(line: &[u8]) -> Fields<'_> {
    let mut fields = Fields::new();
    let mut start = None;
    for (i, &b) in line.iter().enumerate() {
        if b.is_ascii_whitespace() {
            if let Some(s) = start.take() {
                fields.push(&line[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        fields.push(&line[s..]);
    }
    fields
}

/// Strip a trailing line-continuation backslash from the last field.
///
/// Returns true when the record continues on the next line. A lone `\`
/// field is removed entirely, otherwise the backslash is trimmed off the
/// final field.
pub fn strip_continuation(fields: &mut Fields<'_>) -> bool {
    let last = match fields.last() {
        Some(&last) if last.last() == Some(&b'\\') => last,
        _ => return false,
    };
    if last.len() == 1 {
        fields.pop();
    } else {
        let idx = fields.len() - 1;
        fields[idx] = &last[..last.len() - 1];
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fields() {
        let fields = split_fields(b"f 1/2/3 4//5  6\r\n");
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], b"f");
        assert_eq!(fields[1], b"1/2/3");
        assert_eq!(fields[2], b"4//5");
        assert_eq!(fields[3], b"6");
    }

    #[test]
    fn test_split_empty_line() {
        assert!(split_fields(b"").is_empty());
        assert!(split_fields(b"   \t \n").is_empty());
    }

    #[test]
    fn test_strip_continuation_lone_backslash() {
        let mut fields = split_fields(b"v 1.0 2.0 \\");
        assert!(strip_continuation(&mut fields));
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2], b"2.0");
    }

    #[test]
    fn test_strip_continuation_attached() {
        let mut fields = split_fields(b"v 1.0 2.0\\");
        assert!(strip_continuation(&mut fields));
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2], b"2.0");
    }

    #[test]
    fn test_no_continuation() {
        let mut fields = split_fields(b"v 1.0 2.0 3.0");
        assert!(!strip_continuation(&mut fields));
        assert_eq!(fields.len(), 4);
    }
}
