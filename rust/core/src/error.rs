// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for parsing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an import or export outright.
///
/// Everything else (malformed records, out-of-range indices) degrades to a
/// counted skip in [`crate::ParseSummary`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a failed open of `path`
    pub fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::SourceUnavailable {
            path: path.into(),
            source,
        }
    }
}
