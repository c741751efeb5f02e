//! Segment type for load-time memory mapping units.
//!
//! Segments describe how file contents are mapped into memory when the
//! image is loaded. A segment's memory size may exceed its file size; the
//! tail is zero-filled by the loader and has no bytes in the source.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Memory permissions for a segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Perms: u8 {
        /// Segment is readable.
        const READ = 1;
        /// Segment is writable.
        const WRITE = 2;
        /// Segment is executable.
        const EXECUTE = 4;
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        out.push(if self.contains(Perms::READ) { 'r' } else { '-' });
        out.push(if self.contains(Perms::WRITE) { 'w' } else { '-' });
        out.push(if self.contains(Perms::EXECUTE) { 'x' } else { '-' });
        write!(f, "{}", out)
    }
}

/// A load-time memory mapping unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    /// Virtual address where the segment is mapped.
    pub virtual_address: u64,
    /// Size of the mapping in memory, in bytes.
    pub memory_size: u64,
    /// Offset of the segment's contents within the parsed window.
    pub file_offset: u64,
    /// Number of bytes the segment occupies in the file.
    pub file_size: u64,
    /// Memory permissions.
    pub perms: Perms,
}

impl Segment {
    /// Creates a new segment.
    pub fn new(
        virtual_address: u64,
        memory_size: u64,
        file_offset: u64,
        file_size: u64,
        perms: Perms,
    ) -> Self {
        Self {
            virtual_address,
            memory_size,
            file_offset,
            file_size,
            perms,
        }
    }

    /// Returns true if `addr` falls within the segment's memory range.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.virtual_address
            && addr.wrapping_sub(self.virtual_address) < self.memory_size
    }

    /// Returns true if `addr` falls within the file-backed part of the
    /// segment's memory range.
    pub fn file_backed(&self, addr: u64) -> bool {
        addr >= self.virtual_address
            && addr.wrapping_sub(self.virtual_address) < self.file_size
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x}+{:#x} [{}]",
            self.virtual_address, self.memory_size, self.perms
        )
    }
}
