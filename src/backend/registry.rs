//! Backend registry and format resolver.
//!
//! The registry is a table of named backends, populated during an explicit
//! initialization phase before any parsing is attempted. Registration order
//! is the resolution order: when several backends' probes claim the same
//! bytes, the first-registered one wins, deterministically. Built-in
//! backends are expected to register before externally loaded ones.
//!
//! Production wiring uses the process-wide registry behind [`global`];
//! tests construct their own [`BackendRegistry`] instances so nothing
//! leaks between them.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::backend::{FnBackend, ImageBackend, ParseFn, ProbeFn};
use crate::core::image::Image;
use crate::error::{ParseError, RegistryError, ResolveError};
use crate::io::ByteSource;

/// An ordered table of uniquely named backends.
#[derive(Default)]
pub struct BackendRegistry {
    // Vec rather than a map: resolution order is registration order, and
    // the table stays small enough that name lookups are linear scans.
    entries: Vec<Arc<dyn ImageBackend>>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under its own name.
    ///
    /// Fails with [`RegistryError::DuplicateName`] if the name is already
    /// present; the existing entry is left untouched. Re-registering the
    /// same backend is rejected like any other duplicate.
    pub fn register(&mut self, backend: Arc<dyn ImageBackend>) -> Result<(), RegistryError> {
        let name = backend.name();
        if self.entries.iter().any(|b| b.name() == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        debug!(backend = %name, "registered image backend");
        self.entries.push(backend);
        Ok(())
    }

    /// Registers a probe/parse function pair under the given name.
    pub fn register_fns(
        &mut self,
        name: impl Into<String>,
        probe: ProbeFn,
        parse: ParseFn,
    ) -> Result<(), RegistryError> {
        self.register(Arc::new(FnBackend::new(name, probe, parse)))
    }

    /// Removes the backend with the given name. Returns whether one was
    /// removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|b| b.name() != name);
        before != self.entries.len()
    }

    /// Returns the backend with the given name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ImageBackend>> {
        self.entries.iter().find(|b| b.name() == name)
    }

    /// Registered backend names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|b| b.name().to_string()).collect()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a byte source to an [`Image`] via the registered backends.
    ///
    /// The window `[pos, pos + len)` (the whole remainder of the source
    /// when `len` is `None`) is presented to each backend's probe in
    /// registration order. The first backend that claims the format
    /// parses it:
    ///
    /// - success normalizes the result into an [`Image`];
    /// - [`ParseError::Malformed`] is authoritative: the backend
    ///   recognized its format and the bytes are broken, so the error is
    ///   returned without trying anyone else;
    /// - [`ParseError::Unsupported`] permits falling through to the next
    ///   backend whose probe matches.
    ///
    /// If no probe matches, [`ResolveError::NoMatchingBackend`]. The
    /// outcome depends only on the registry contents and the input bytes.
    pub fn resolve<'a>(
        &self,
        source: &'a ByteSource,
        pos: u64,
        len: Option<u64>,
    ) -> Result<Image<'a>, ResolveError> {
        let window = match len {
            Some(len) => len,
            None => source.len().checked_sub(pos).ok_or(crate::error::OutOfBounds {
                offset: pos,
                len: 0,
                size: source.len(),
            })?,
        };
        let data = source.slice(pos, window)?;

        let mut deferred: Option<(String, ParseError)> = None;
        for backend in &self.entries {
            if !backend.probe(data) {
                continue;
            }
            debug!(backend = %backend.name(), window = window, "backend claimed format");
            match backend.parse(data) {
                Ok(raw) => {
                    return Image::normalize(raw, source, pos, window, backend.name()).map_err(
                        |error| ResolveError::Parse {
                            backend: backend.name().to_string(),
                            error,
                        },
                    );
                }
                Err(error @ ParseError::Malformed(_)) => {
                    debug!(backend = %backend.name(), error = %error, "parse failed");
                    return Err(ResolveError::Parse {
                        backend: backend.name().to_string(),
                        error,
                    });
                }
                Err(error @ ParseError::Unsupported(_)) => {
                    debug!(
                        backend = %backend.name(),
                        error = %error,
                        "backend does not decode this variant, trying next"
                    );
                    deferred = Some((backend.name().to_string(), error));
                }
            }
        }

        match deferred {
            Some((backend, error)) => Err(ResolveError::Parse { backend, error }),
            None => Err(ResolveError::NoMatchingBackend),
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

static GLOBAL: Lazy<RwLock<BackendRegistry>> = Lazy::new(|| RwLock::new(BackendRegistry::new()));

/// The process-wide registry used by the module-level [`register`] and
/// [`resolve`] helpers. Populated during startup; read-only afterwards.
pub fn global() -> &'static RwLock<BackendRegistry> {
    &GLOBAL
}

/// Registers a backend with the process-wide registry.
pub fn register(backend: Arc<dyn ImageBackend>) -> Result<(), RegistryError> {
    let mut registry = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
    registry.register(backend)
}

/// Registers a probe/parse function pair with the process-wide registry.
pub fn register_fns(
    name: impl Into<String>,
    probe: ProbeFn,
    parse: ParseFn,
) -> Result<(), RegistryError> {
    let mut registry = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
    registry.register_fns(name, probe, parse)
}

/// Removes a backend from the process-wide registry.
pub fn unregister(name: &str) -> bool {
    let mut registry = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
    if registry.unregister(name) {
        warn!(backend = %name, "unregistered image backend");
        true
    } else {
        false
    }
}

/// Resolves a byte source against the process-wide registry.
pub fn resolve<'a>(
    source: &'a ByteSource,
    pos: u64,
    len: Option<u64>,
) -> Result<Image<'a>, ResolveError> {
    let registry = GLOBAL.read().unwrap_or_else(|e| e.into_inner());
    registry.resolve(source, pos, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arch::{AddressSize, Arch, Endianness};
    use crate::core::image::RawImage;
    use crate::core::section::{Section, SectionFlags};

    fn probe_aa(data: &[u8]) -> bool {
        data.starts_with(b"AAAA")
    }

    fn parse_aa(_data: &[u8]) -> Result<RawImage, ParseError> {
        Ok(RawImage::new(
            Arch::X86,
            AddressSize::Bits32,
            Endianness::Little,
            0x100,
        ))
    }

    fn parse_aa_unsupported(_data: &[u8]) -> Result<RawImage, ParseError> {
        Err(ParseError::unsupported("variant 2"))
    }

    fn parse_aa_malformed(_data: &[u8]) -> Result<RawImage, ParseError> {
        Err(ParseError::malformed("broken table"))
    }

    fn parse_aa_alt(_data: &[u8]) -> Result<RawImage, ParseError> {
        Ok(RawImage::new(
            Arch::ARM,
            AddressSize::Bits32,
            Endianness::Big,
            0x200,
        ))
    }

    fn parse_aa_defective(_data: &[u8]) -> Result<RawImage, ParseError> {
        let mut raw = RawImage::new(Arch::X86, AddressSize::Bits32, Endianness::Little, 0);
        // File range far outside any plausible input.
        raw.sections.push(Section::new(
            ".broken",
            0x1000,
            0x10,
            0xffff_0000,
            0x10,
            SectionFlags::READ,
        ));
        Ok(raw)
    }

    #[test]
    fn test_register_and_names_in_order() {
        let mut registry = BackendRegistry::new();
        registry.register_fns("fmt.b", probe_aa, parse_aa).unwrap();
        registry.register_fns("fmt.a", probe_aa, parse_aa_alt).unwrap();
        assert_eq!(registry.names(), vec!["fmt.b", "fmt.a"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("fmt.a").is_some());
        assert!(registry.get("fmt.c").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = BackendRegistry::new();
        registry.register_fns("fmt.a", probe_aa, parse_aa).unwrap();
        let err = registry
            .register_fns("fmt.a", probe_aa, parse_aa_alt)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("fmt.a".to_string()));
        // The original implementation still dispatches.
        let source = ByteSource::from_vec(b"AAAA....".to_vec());
        let image = registry.resolve(&source, 0, None).unwrap();
        assert_eq!(image.architecture(), Arch::X86);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = BackendRegistry::new();
        registry.register_fns("fmt.a", probe_aa, parse_aa).unwrap();
        assert!(registry.unregister("fmt.a"));
        assert!(!registry.unregister("fmt.a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_no_matching_backend() {
        let mut registry = BackendRegistry::new();
        registry.register_fns("fmt.a", probe_aa, parse_aa).unwrap();
        let source = ByteSource::from_vec(vec![0u8; 16]);
        let err = registry.resolve(&source, 0, None).unwrap_err();
        assert_eq!(err, ResolveError::NoMatchingBackend);
    }

    #[test]
    fn test_first_registered_probe_wins() {
        let mut registry = BackendRegistry::new();
        registry.register_fns("fmt.first", probe_aa, parse_aa).unwrap();
        registry.register_fns("fmt.second", probe_aa, parse_aa_alt).unwrap();
        let source = ByteSource::from_vec(b"AAAA....".to_vec());
        let image = registry.resolve(&source, 0, None).unwrap();
        assert_eq!(image.backend(), "fmt.first");
        assert_eq!(image.architecture(), Arch::X86);
    }

    #[test]
    fn test_unsupported_falls_through_to_next_backend() {
        let mut registry = BackendRegistry::new();
        registry
            .register_fns("fmt.narrow", probe_aa, parse_aa_unsupported)
            .unwrap();
        registry.register_fns("fmt.wide", probe_aa, parse_aa_alt).unwrap();
        let source = ByteSource::from_vec(b"AAAA....".to_vec());
        let image = registry.resolve(&source, 0, None).unwrap();
        assert_eq!(image.backend(), "fmt.wide");
    }

    #[test]
    fn test_unsupported_with_no_fallback_is_reported() {
        let mut registry = BackendRegistry::new();
        registry
            .register_fns("fmt.narrow", probe_aa, parse_aa_unsupported)
            .unwrap();
        let source = ByteSource::from_vec(b"AAAA....".to_vec());
        let err = registry.resolve(&source, 0, None).unwrap_err();
        match err {
            ResolveError::Parse { backend, error } => {
                assert_eq!(backend, "fmt.narrow");
                assert!(error.is_unsupported());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_is_authoritative() {
        let mut registry = BackendRegistry::new();
        registry
            .register_fns("fmt.broken", probe_aa, parse_aa_malformed)
            .unwrap();
        // A later backend could parse the bytes, but must not be consulted.
        registry.register_fns("fmt.ok", probe_aa, parse_aa_alt).unwrap();
        let source = ByteSource::from_vec(b"AAAA....".to_vec());
        let err = registry.resolve(&source, 0, None).unwrap_err();
        match err {
            ResolveError::Parse { backend, error } => {
                assert_eq!(backend, "fmt.broken");
                assert!(error.is_malformed());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_backend_defect_surfaces_as_malformed() {
        let mut registry = BackendRegistry::new();
        registry
            .register_fns("fmt.defective", probe_aa, parse_aa_defective)
            .unwrap();
        let source = ByteSource::from_vec(b"AAAA....".to_vec());
        let err = registry.resolve(&source, 0, None).unwrap_err();
        match err {
            ResolveError::Parse { backend, error } => {
                assert_eq!(backend, "fmt.defective");
                assert!(error.is_malformed());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_window_out_of_bounds() {
        let registry = BackendRegistry::new();
        let source = ByteSource::from_vec(vec![0u8; 8]);
        assert!(matches!(
            registry.resolve(&source, 16, None),
            Err(ResolveError::OutOfBounds(_))
        ));
        assert!(matches!(
            registry.resolve(&source, 0, Some(64)),
            Err(ResolveError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_resolve_embedded_window() {
        let mut registry = BackendRegistry::new();
        registry.register_fns("fmt.a", probe_aa, parse_aa).unwrap();
        // Magic sits 4 bytes into the buffer; only the window should match.
        let source = ByteSource::from_vec(b"....AAAA....".to_vec());
        assert_eq!(
            registry.resolve(&source, 0, None).unwrap_err(),
            ResolveError::NoMatchingBackend
        );
        let image = registry.resolve(&source, 4, Some(8)).unwrap();
        assert_eq!(image.backend(), "fmt.a");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let mut registry = BackendRegistry::new();
        registry.register_fns("fmt.first", probe_aa, parse_aa).unwrap();
        registry.register_fns("fmt.second", probe_aa, parse_aa_alt).unwrap();
        let source = ByteSource::from_vec(b"AAAA....".to_vec());
        let a = registry.resolve(&source, 0, None).unwrap();
        let b = registry.resolve(&source, 0, None).unwrap();
        assert_eq!(a.backend(), b.backend());
        assert_eq!(a.architecture(), b.architecture());
        assert_eq!(a.entry_point(), b.entry_point());
        assert_eq!(a.sections(), b.sections());
        assert_eq!(a.symbols(), b.symbols());
    }
}
