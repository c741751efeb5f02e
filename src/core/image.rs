//! The normalized, format-agnostic image and its query frontend.
//!
//! A backend decodes a byte window into a [`RawImage`]. Normalization turns
//! that into an [`Image`]: every section and segment file range is checked
//! against the window, sections and symbols are sorted by address for
//! binary-search lookups, and symbol names are indexed. The image borrows
//! the originating [`ByteSource`] and owns no bytes of its own.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::core::arch::{AddressSize, Arch, Endianness};
use crate::core::section::Section;
use crate::core::segment::Segment;
use crate::core::symbol::Symbol;
use crate::error::{OutOfBounds, ParseError};
use crate::io::ByteSource;

/// Backend output, pre-normalization.
///
/// Offsets in `sections` and `segments` are relative to the window the
/// backend was handed, not to the whole source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// Target architecture.
    pub arch: Arch,
    /// Address width.
    pub address_size: AddressSize,
    /// Byte order.
    pub endianness: Endianness,
    /// Entry point virtual address.
    pub entry_point: u64,
    /// Sections in container order.
    pub sections: Vec<Section>,
    /// Segments in container order.
    pub segments: Vec<Segment>,
    /// Symbols in container order.
    pub symbols: Vec<Symbol>,
}

impl RawImage {
    /// Creates an empty raw image with the given machine facts.
    pub fn new(
        arch: Arch,
        address_size: AddressSize,
        endianness: Endianness,
        entry_point: u64,
    ) -> Self {
        Self {
            arch,
            address_size,
            endianness,
            entry_point,
            sections: Vec::new(),
            segments: Vec::new(),
            symbols: Vec::new(),
        }
    }
}

/// The immutable, queryable result of one successful parse.
///
/// Created exactly once per successful parse and never mutated afterwards;
/// all queries are read-only and return explicit `Option`/`Result` values.
pub struct Image<'a> {
    source: &'a ByteSource,
    /// Start of the resolved window within the source.
    base: u64,
    /// Length of the resolved window.
    window: u64,
    backend: String,
    arch: Arch,
    address_size: AddressSize,
    endianness: Endianness,
    entry_point: u64,
    /// Sorted by virtual address.
    sections: Vec<Section>,
    /// Sorted by virtual address.
    segments: Vec<Segment>,
    /// Sorted by value.
    symbols: Vec<Symbol>,
    /// Symbol name to index in `symbols`; first occurrence wins.
    symbol_index: HashMap<String, usize>,
}

impl<'a> Image<'a> {
    /// Normalizes a backend's [`RawImage`] against the window it was
    /// decoded from.
    ///
    /// A section or segment whose file range falls outside the window is a
    /// defect in the producing backend, not an input problem; it is logged
    /// with the backend's name and surfaced as [`ParseError::Malformed`]
    /// rather than trusted.
    pub(crate) fn normalize(
        raw: RawImage,
        source: &'a ByteSource,
        base: u64,
        window: u64,
        backend: &str,
    ) -> Result<Self, ParseError> {
        for section in &raw.sections {
            if !range_fits(section.file_offset, section.file_size, window) {
                warn!(
                    backend = %backend,
                    section = %section.name,
                    file_offset = section.file_offset,
                    file_size = section.file_size,
                    window = window,
                    "backend produced out-of-bounds section (backend defect)"
                );
                return Err(ParseError::malformed(format!(
                    "backend {} produced section {:?} with file range outside the input",
                    backend, section.name
                )));
            }
        }
        for segment in &raw.segments {
            if !range_fits(segment.file_offset, segment.file_size, window) {
                warn!(
                    backend = %backend,
                    vaddr = segment.virtual_address,
                    file_offset = segment.file_offset,
                    file_size = segment.file_size,
                    window = window,
                    "backend produced out-of-bounds segment (backend defect)"
                );
                return Err(ParseError::malformed(format!(
                    "backend {} produced segment at {:#x} with file range outside the input",
                    backend, segment.virtual_address
                )));
            }
        }

        let mut sections = raw.sections;
        sections.sort_by_key(|s| s.virtual_address);
        let mut segments = raw.segments;
        segments.sort_by_key(|s| s.virtual_address);

        // Resolve owning sections by containment against the sorted table,
        // then sort and index the symbols themselves.
        let mut symbols = raw.symbols;
        for symbol in &mut symbols {
            symbol.section = find_containing(&sections, symbol.value, Section::contains);
        }
        symbols.sort_by_key(|s| s.value);

        let mut symbol_index = HashMap::with_capacity(symbols.len());
        for (idx, symbol) in symbols.iter().enumerate() {
            symbol_index.entry(symbol.name.clone()).or_insert(idx);
        }

        debug!(
            backend = %backend,
            arch = %raw.arch,
            sections = sections.len(),
            segments = segments.len(),
            symbols = symbols.len(),
            "normalized image"
        );

        Ok(Self {
            source,
            base,
            window,
            backend: backend.to_string(),
            arch: raw.arch,
            address_size: raw.address_size,
            endianness: raw.endianness,
            entry_point: raw.entry_point,
            sections,
            segments,
            symbols,
            symbol_index,
        })
    }

    /// Name of the backend that produced this image.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Entry point virtual address.
    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Target architecture.
    pub fn architecture(&self) -> Arch {
        self.arch
    }

    /// Address width.
    pub fn address_size(&self) -> AddressSize {
        self.address_size
    }

    /// Byte order.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Sections, sorted by virtual address.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Segments, sorted by virtual address.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Symbols, sorted by value.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Looks up a section by exact name.
    pub fn section_named(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Returns the section whose memory range contains `addr`.
    pub fn section_containing(&self, addr: u64) -> Option<&Section> {
        find_containing(&self.sections, addr, Section::contains).map(|idx| &self.sections[idx])
    }

    /// Looks up a symbol by name. When several symbols share a name, the
    /// one at the lowest address wins.
    pub fn symbol_named(&self, name: &str) -> Option<&Symbol> {
        self.symbol_index.get(name).map(|&idx| &self.symbols[idx])
    }

    /// Returns the symbol covering `addr`: an exact value match, or a
    /// sized symbol whose `[value, value + size)` range contains `addr`.
    pub fn symbol_at(&self, addr: u64) -> Option<&Symbol> {
        let end = self.symbols.partition_point(|s| s.value <= addr);
        self.symbols[..end]
            .iter()
            .rev()
            .find(|s| s.value == addr || (s.size > 0 && addr.wrapping_sub(s.value) < s.size))
    }

    /// Returns `len` bytes of file content mapped at virtual address `addr`.
    ///
    /// Translation goes through the file-backed ranges of sections first,
    /// then segments, and defers to the byte source for the final
    /// bounds-checked read. Addresses with no file backing (zero-filled
    /// data, unmapped ranges) fail with [`OutOfBounds`] carrying the
    /// virtual address; no fabricated bytes are ever returned.
    pub fn bytes_at(&self, addr: u64, len: u64) -> Result<&'a [u8], OutOfBounds> {
        let unmapped = OutOfBounds {
            offset: addr,
            len,
            size: self.window,
        };
        let file_offset = self.translate(addr, len).ok_or(unmapped)?;
        let absolute = self.base.checked_add(file_offset).ok_or(unmapped)?;
        self.source.slice(absolute, len)
    }

    /// Translates a virtual address to a window-relative file offset,
    /// requiring `len` contiguous file-backed bytes at the address.
    /// Non-loadable sections (string tables and the like carry address
    /// zero) do not participate.
    fn translate(&self, addr: u64, len: u64) -> Option<u64> {
        if let Some(idx) = find_containing(&self.sections, addr, |s: &Section, a| {
            s.is_loadable() && s.file_backed(a)
        }) {
            let section = &self.sections[idx];
            let delta = addr - section.virtual_address;
            if delta.checked_add(len)? <= section.file_size {
                return Some(section.file_offset + delta);
            }
        }
        if let Some(idx) = find_containing(&self.segments, addr, Segment::file_backed) {
            let segment = &self.segments[idx];
            let delta = addr - segment.virtual_address;
            if delta.checked_add(len)? <= segment.file_size {
                return Some(segment.file_offset + delta);
            }
        }
        None
    }
}

impl std::fmt::Debug for Image<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("backend", &self.backend)
            .field("arch", &self.arch)
            .field("address_size", &self.address_size)
            .field("endianness", &self.endianness)
            .field("entry_point", &self.entry_point)
            .field("sections", &self.sections.len())
            .field("segments", &self.segments.len())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

/// Checks that `[offset, offset + len)` fits inside a window of `size`
/// bytes, treating zero-length ranges as always in bounds.
fn range_fits(offset: u64, len: u64, size: u64) -> bool {
    if len == 0 {
        return true;
    }
    offset.checked_add(len).is_some_and(|end| end <= size)
}

/// Binary search over entries sorted by virtual address for one whose
/// range (per `contains`) covers `addr`. Entries before the partition
/// point are scanned backwards so that zero-size neighbors at the same
/// address do not mask a hit.
fn find_containing<T, F>(entries: &[T], addr: u64, contains: F) -> Option<usize>
where
    F: Fn(&T, u64) -> bool,
    T: HasVirtualAddress,
{
    let end = entries.partition_point(|e| e.virtual_address() <= addr);
    entries[..end]
        .iter()
        .enumerate()
        .rev()
        .find(|(_, e)| contains(e, addr))
        .map(|(idx, _)| idx)
}

trait HasVirtualAddress {
    fn virtual_address(&self) -> u64;
}

impl HasVirtualAddress for Section {
    fn virtual_address(&self) -> u64 {
        self.virtual_address
    }
}

impl HasVirtualAddress for Segment {
    fn virtual_address(&self) -> u64 {
        self.virtual_address
    }
}
