//! The backend contract for format-specific parsers.
//!
//! A backend is a decoder for one executable container format. It answers
//! two questions about a byte window: "might this be my format?" (a cheap
//! magic check) and "decode it" (the full parse). Backends are registered
//! by name into a [`registry::BackendRegistry`], which selects among them;
//! the registry never knows any format-specific magic itself, so new
//! formats can be added without touching the core.
//!
//! Backend names are hierarchical strings, by convention `image.<format>`
//! (e.g. `image.elf`). The registry enforces only uniqueness, not the
//! convention.

pub mod registry;

use crate::core::image::RawImage;
use crate::error::ParseError;

/// A format-specific parser.
///
/// Both operations are pure with respect to the input: they read the window
/// they are handed, allocate nothing global, and never panic on malformed
/// bytes. All decode failures are classified as
/// [`ParseError::Malformed`] or [`ParseError::Unsupported`].
pub trait ImageBackend: Send + Sync {
    /// Unique backend name, by convention `image.<format>`.
    fn name(&self) -> &str;

    /// Cheap structural check deciding whether this backend might own the
    /// format. Must not perform the full decode.
    fn probe(&self, data: &[u8]) -> bool;

    /// Full decode of the window into a [`RawImage`]. Offsets in the
    /// result are relative to `data`.
    fn parse(&self, data: &[u8]) -> Result<RawImage, ParseError>;
}

/// Probe function signature for [`FnBackend`].
pub type ProbeFn = fn(&[u8]) -> bool;

/// Parse function signature for [`FnBackend`].
pub type ParseFn = fn(&[u8]) -> Result<RawImage, ParseError>;

/// Adapter implementing [`ImageBackend`] over a pair of plain functions.
///
/// This is the registration surface for out-of-core decoders that do not
/// want to define a type: `registry.register_fns("image.fmt", probe, parse)`.
pub struct FnBackend {
    name: String,
    probe: ProbeFn,
    parse: ParseFn,
}

impl FnBackend {
    /// Wraps a probe/parse function pair under the given name.
    pub fn new(name: impl Into<String>, probe: ProbeFn, parse: ParseFn) -> Self {
        Self {
            name: name.into(),
            probe,
            parse,
        }
    }
}

impl ImageBackend for FnBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self, data: &[u8]) -> bool {
        (self.probe)(data)
    }

    fn parse(&self, data: &[u8]) -> Result<RawImage, ParseError> {
        (self.parse)(data)
    }
}
