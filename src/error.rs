//! Error types for the imago image abstraction.
//!
//! Every fallible operation in this crate returns an explicit `Result`;
//! malformed input is classified into these types and never panics.

use thiserror::Error;

/// A requested byte range lies outside the bounds of its source.
///
/// Returned by [`crate::ByteSource::slice`] and [`crate::Image::bytes_at`].
/// For `bytes_at`, `offset` is the virtual address that failed to translate
/// and `size` is the length of the resolved window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("range [{offset:#x}, {offset:#x}+{len:#x}) exceeds bounds of {size} bytes")]
pub struct OutOfBounds {
    /// Start of the requested range.
    pub offset: u64,
    /// Length of the requested range.
    pub len: u64,
    /// Total size of the source or window the range was checked against.
    pub size: u64,
}

/// Failure produced by a backend while decoding a container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input recognized as the target format but structurally invalid:
    /// truncated header, inconsistent table sizes, offsets past the end of
    /// the source. Fatal to the parse attempt.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Input is a valid instance of the format but uses a variant the
    /// backend does not decode (e.g. an unknown class or version). The
    /// resolver may fall through to another backend on this error.
    #[error("unsupported feature: {0}")]
    Unsupported(String),
}

impl ParseError {
    /// Creates a new `Malformed` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Creates a new `Unsupported` error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Returns true for the `Malformed` variant.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Returns true for the `Unsupported` variant.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

impl From<OutOfBounds> for ParseError {
    fn from(err: OutOfBounds) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Registration conflict in the backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A backend with this name is already registered. The existing entry
    /// is left untouched.
    #[error("backend name already registered: {0}")]
    DuplicateName(String),
}

/// Failure to resolve a byte source to an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No registered backend's probe claimed the input.
    #[error("no registered backend matched the input")]
    NoMatchingBackend,

    /// A backend claimed the format but failed to decode it.
    #[error("backend {backend} failed to parse input")]
    Parse {
        /// Name of the backend that failed.
        backend: String,
        /// The underlying decode failure.
        #[source]
        error: ParseError,
    },

    /// The requested window lies outside the source.
    #[error(transparent)]
    OutOfBounds(#[from] OutOfBounds),
}
