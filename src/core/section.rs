//! Section type for file-format organizational units.
//!
//! Sections are the named, sized regions a container's metadata describes
//! (code, data, string tables). A section may occupy less space in the file
//! than in memory (`file_size < size`, e.g. zero-filled data), and segments
//! may overlap sections: segments are mapping units, sections semantic
//! units, so the overlap is expected rather than an error.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Permission and placement flags for a section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SectionFlags: u8 {
        /// Section contents are readable.
        const READ = 1;
        /// Section contents are writable at runtime.
        const WRITE = 2;
        /// Section contains executable code.
        const EXECUTE = 4;
        /// Section occupies memory when the image is loaded.
        const ALLOC = 8;
    }
}

impl fmt::Display for SectionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        out.push(if self.contains(SectionFlags::READ) { 'r' } else { '-' });
        out.push(if self.contains(SectionFlags::WRITE) { 'w' } else { '-' });
        out.push(if self.contains(SectionFlags::EXECUTE) { 'x' } else { '-' });
        out.push(if self.contains(SectionFlags::ALLOC) { 'a' } else { '-' });
        write!(f, "{}", out)
    }
}

/// A named region described by the container's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Section {
    /// Section name (e.g. ".text", "__text").
    pub name: String,
    /// Virtual address where the section is mapped.
    pub virtual_address: u64,
    /// Size in memory, in bytes.
    pub size: u64,
    /// Offset of the section's contents within the parsed window.
    pub file_offset: u64,
    /// Number of bytes the section occupies in the file. Zero for sections
    /// with no file backing (e.g. zero-initialized data).
    pub file_size: u64,
    /// Permission and placement flags.
    pub flags: SectionFlags,
}

impl Section {
    /// Creates a new section.
    pub fn new(
        name: impl Into<String>,
        virtual_address: u64,
        size: u64,
        file_offset: u64,
        file_size: u64,
        flags: SectionFlags,
    ) -> Self {
        Self {
            name: name.into(),
            virtual_address,
            size,
            file_offset,
            file_size,
            flags,
        }
    }

    /// Returns true if `addr` falls within the section's memory range.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.virtual_address
            && addr.wrapping_sub(self.virtual_address) < self.size
    }

    /// Returns true if `addr` falls within the file-backed part of the
    /// section's memory range.
    pub fn file_backed(&self, addr: u64) -> bool {
        addr >= self.virtual_address
            && addr.wrapping_sub(self.virtual_address) < self.file_size
    }

    /// Returns true if the section contains executable code.
    pub fn is_executable(&self) -> bool {
        self.flags.contains(SectionFlags::EXECUTE)
    }

    /// Returns true if the section is writable at runtime.
    pub fn is_writable(&self) -> bool {
        self.flags.contains(SectionFlags::WRITE)
    }

    /// Returns true if the section occupies memory when loaded.
    pub fn is_loadable(&self) -> bool {
        self.flags.contains(SectionFlags::ALLOC)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:#x}+{:#x} [{}]",
            self.name, self.virtual_address, self.size, self.flags
        )
    }
}
