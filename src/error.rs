//! Error types for loading PE images.
//!
//! Only two conditions abort a load: a buffer too small to hold a DOS header,
//! and a missing DOS signature. Everything past the DOS header is parsed
//! fail-soft; a malformed directory leaves its presence flag unset instead of
//! surfacing an error, because adversarial images routinely contain bogus
//! values and callers still want whatever can be read.

use thiserror::Error;

/// Result type alias for peview operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can abort `Pe::load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// Buffer shorter than an `IMAGE_DOS_HEADER` (64 bytes).
    #[error("file too small: need at least 64 bytes for a DOS header")]
    FileTooSmall,
    /// DOS magic is not "MZ".
    #[error("no DOS header: e_magic is not 'MZ'")]
    NoDosHeader,
}
