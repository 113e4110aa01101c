use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during mesh reconstruction or export
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot write {path}: {source}")]
    SinkUnavailable {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core parser error: {0}")]
    CoreError(#[from] brk_lite_core::Error),
}

impl Error {
    /// Wrap a failed open-for-write of `path`
    pub fn sink(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Error::SinkUnavailable {
            path: path.into(),
            source,
        }
    }
}
