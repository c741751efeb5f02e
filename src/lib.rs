//! # imago
//!
//! Format-agnostic executable image parsing with pluggable format backends.
//!
//! A [`ByteSource`] is an immutable, bounds-checked view over a file or
//! buffer. Backends implementing [`ImageBackend`] register by name into a
//! [`BackendRegistry`]; resolving a source tries registered backends in
//! registration order and normalizes the winner's output into an
//! [`Image`], the read-only view the rest of an analysis stack queries.
//!
//! ```no_run
//! use imago::{backend, ByteSource};
//!
//! imago::init();
//! let source = ByteSource::open("/bin/ls")?;
//! let image = backend::registry::resolve(&source, 0, None)?;
//! println!("{} entry {:#x}", image.architecture(), image.entry_point());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod backend;
pub mod core;
pub mod error;
pub mod formats;
pub mod io;
pub mod logging;

pub use backend::registry::BackendRegistry;
pub use backend::{FnBackend, ImageBackend};
pub use crate::core::arch::{AddressSize, Arch, Endianness};
pub use crate::core::image::{Image, RawImage};
pub use crate::core::section::{Section, SectionFlags};
pub use crate::core::segment::{Perms, Segment};
pub use crate::core::symbol::{Symbol, SymbolBinding, SymbolKind};
pub use error::{OutOfBounds, ParseError, RegistryError, ResolveError};
pub use io::{ByteSource, SourceLimits};

use std::sync::Arc;
use std::sync::Once;

static INIT: Once = Once::new();

/// Registers the built-in backends with the process-wide registry.
///
/// Call once during startup, before any resolve; subsequent calls are
/// ignored. Built-ins register first so they win probe ties against
/// externally loaded backends. Tests that build their own
/// [`BackendRegistry`] do not need this.
pub fn init() {
    INIT.call_once(|| {
        let builtin: Arc<dyn ImageBackend> = Arc::new(formats::elf::ElfBackend);
        if let Err(err) = backend::registry::register(builtin) {
            // Only reachable when a caller registered the name before init.
            tracing::warn!(error = %err, "built-in backend registration failed");
        }
    });
}
