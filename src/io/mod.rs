//! Bounds-checked byte sources for image parsing.
//!
//! This module provides [`ByteSource`], the immutable view over raw input
//! bytes that all parsing rests on. Every multi-byte read a backend performs
//! goes through [`ByteSource::slice`] or a sub-slice of it; there is no
//! unchecked offset arithmetic anywhere downstream. File-backed sources use
//! memory-mapping with a size cap to protect against pathological inputs.

pub mod error;

use crate::error::OutOfBounds;
use crate::io::error::{Result, SourceError};
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Defines the resource limits for opening file-backed sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Backing storage for a byte source.
enum Backing {
    /// Owned in-memory buffer.
    Owned(Bytes),
    /// Read-only memory-mapped file.
    Mapped(Mmap),
}

/// An immutable, bounds-checked view over raw input bytes.
///
/// A `ByteSource` either owns its buffer or maps a file read-only; it is
/// never mutated after creation. Backends and the [`crate::Image`] built
/// from a parse only ever borrow slices of it. Any slice handed out is
/// guaranteed to lie within `[0, len())`.
pub struct ByteSource {
    backing: Backing,
}

impl ByteSource {
    /// Creates a source over an owned in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            backing: Backing::Owned(bytes.into()),
        }
    }

    /// Creates a source over an owned vector without copying.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(data))
    }

    /// Opens a file-backed source with the default [`SourceLimits`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_limits(path, SourceLimits::default())
    }

    /// Opens a file, memory-maps it read-only, and wraps it in a source.
    ///
    /// Fails with [`SourceError::FileTooLarge`] if the file size exceeds
    /// `limits.max_file_size`.
    pub fn open_with_limits<P: AsRef<Path>>(path: P, limits: SourceLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = limits.max_file_size,
            "opening file-backed byte source"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "file is too large"
            );
            return Err(SourceError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        // Zero-length files cannot be mapped; fall back to an empty buffer.
        if file_size == 0 {
            return Ok(Self::from_bytes(Bytes::new()));
        }

        // Safety: the file is backed by a real file on disk and we only
        // request a read-only map.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            backing: Backing::Mapped(mmap),
        })
    }

    /// Returns the total size of the source in bytes.
    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// Returns true if the source is empty.
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns the full content as a borrowed slice.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Owned(bytes) => bytes,
            Backing::Mapped(mmap) => mmap,
        }
    }

    /// Returns a borrowed view of exactly `len` bytes starting at `offset`.
    ///
    /// The view is valid for the lifetime of the source. Fails with
    /// [`OutOfBounds`] when `[offset, offset + len)` is not fully contained
    /// in `[0, self.len())`; the arithmetic is overflow-safe.
    pub fn slice(&self, offset: u64, len: u64) -> std::result::Result<&[u8], OutOfBounds> {
        let size = self.len();
        let end = offset.checked_add(len).ok_or(OutOfBounds {
            offset,
            len,
            size,
        })?;
        if end > size {
            return Err(OutOfBounds { offset, len, size });
        }
        // In-bounds per the check above; both fit in usize because the
        // backing buffer is addressable memory.
        Ok(&self.as_slice()[offset as usize..end as usize])
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.backing {
            Backing::Owned(_) => "owned",
            Backing::Mapped(_) => "mapped",
        };
        f.debug_struct("ByteSource")
            .field("backing", &kind)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn test_slice_within_bounds() {
        let source = ByteSource::from_vec(vec![1, 2, 3, 4, 5]);
        assert_eq!(source.len(), 5);
        assert_eq!(source.slice(1, 3).unwrap(), &[2, 3, 4]);
        assert_eq!(source.slice(0, 5).unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(source.slice(5, 0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let source = ByteSource::from_vec(vec![0u8; 8]);
        let err = source.slice(4, 5).unwrap_err();
        assert_eq!(
            err,
            OutOfBounds {
                offset: 4,
                len: 5,
                size: 8
            }
        );
        assert!(source.slice(9, 0).is_err());
    }

    #[test]
    fn test_slice_overflow_is_rejected() {
        let source = ByteSource::from_vec(vec![0u8; 8]);
        assert!(source.slice(u64::MAX, 2).is_err());
        assert!(source.slice(2, u64::MAX).is_err());
    }

    #[test]
    fn test_empty_source() {
        let source = ByteSource::from_bytes(bytes::Bytes::new());
        assert!(source.is_empty());
        assert_eq!(source.slice(0, 0).unwrap(), &[] as &[u8]);
        assert!(source.slice(0, 1).is_err());
    }

    #[test]
    fn test_open_mapped_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"\x7fELF rest of file").unwrap();
        let source = ByteSource::open(tmp.path()).unwrap();
        assert_eq!(source.slice(0, 4).unwrap(), b"\x7fELF");
    }

    #[test]
    fn test_open_empty_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let source = ByteSource::open(tmp.path()).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn test_open_rejects_oversized_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 64]).unwrap();
        let limits = SourceLimits { max_file_size: 16 };
        let err = ByteSource::open_with_limits(tmp.path(), limits).unwrap_err();
        assert!(matches!(err, SourceError::FileTooLarge { limit: 16, .. }));
    }

    proptest! {
        // For all (offset, len) pairs, slice either returns exactly `len`
        // bytes fully contained in the source or fails with OutOfBounds.
        #[test]
        fn prop_slice_is_bounds_safe(
            data in proptest::collection::vec(any::<u8>(), 0..64),
            offset in 0u64..128,
            len in 0u64..128,
        ) {
            let size = data.len() as u64;
            let source = ByteSource::from_vec(data.clone());
            match source.slice(offset, len) {
                Ok(view) => {
                    prop_assert_eq!(view.len() as u64, len);
                    prop_assert!(offset + len <= size);
                    prop_assert_eq!(view, &data[offset as usize..(offset + len) as usize]);
                }
                Err(err) => {
                    prop_assert!(offset.checked_add(len).map_or(true, |end| end > size));
                    prop_assert_eq!(err.size, size);
                }
            }
        }
    }
}
