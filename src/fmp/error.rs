//! Custom error types for the fmp-reader crate.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum FmpError {
    /// The file could not be opened.
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An error originating from I/O reads.
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    /// The file size could not be determined.
    #[error("failed to determine file size")]
    Seek,

    /// The file does not begin with the FileMaker magic signature.
    #[error("not a FileMaker file (bad magic number)")]
    BadMagic,

    /// A sector index fell outside the file.
    #[error("sector {0} is out of range")]
    BadSector(usize),

    /// The sector count implied by the first block does not match the file size.
    #[error("sector count does not match the file size")]
    BadSectorCount,

    /// A memory mapping or allocation failed.
    #[error("allocation failed: {0}")]
    Malloc(String),

    /// The file declares a character set this crate cannot convert.
    #[error("unsupported character set")]
    UnsupportedCharset,

    /// Opening from an in-memory buffer is unavailable.
    #[error("opening from an in-memory buffer is not supported")]
    NoInMemoryOpenSupport,

    /// The value handler requested that traversal stop.
    #[error("traversal aborted by the value handler")]
    UserAborted,
}

/// A convenience `Result` type alias using the crate's `FmpError` type.
pub type Result<T> = std::result::Result<T, FmpError>;
