//! Symbol type for named program entities.
//!
//! Symbols come from the container's symbol tables. Normalization resolves
//! each symbol to its owning section (if any) by address containment and
//! records the section's index on the symbol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol kinds for different types of program entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Function symbol
    Function,
    /// Data object symbol
    Object,
    /// Other/unknown symbol type
    Unknown,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Function => write!(f, "Function"),
            SymbolKind::Object => write!(f, "Object"),
            SymbolKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Symbol binding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolBinding {
    /// Local symbol
    Local,
    /// Global symbol
    Global,
    /// Weak symbol
    Weak,
}

impl fmt::Display for SymbolBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolBinding::Local => write!(f, "Local"),
            SymbolBinding::Global => write!(f, "Global"),
            SymbolBinding::Weak => write!(f, "Weak"),
        }
    }
}

/// A named program entity from the container's symbol tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// Symbol name as recorded in the container.
    pub name: String,
    /// Symbol value (virtual address).
    pub value: u64,
    /// Size of the symbol in bytes, zero when unknown.
    pub size: u64,
    /// Symbol kind.
    pub kind: SymbolKind,
    /// Symbol binding.
    pub binding: SymbolBinding,
    /// Index of the owning section in the image's sorted section table,
    /// resolved by address containment during normalization.
    pub section: Option<usize>,
}

impl Symbol {
    /// Creates a new symbol with no owning section; normalization fills
    /// the back-reference in.
    pub fn new(
        name: impl Into<String>,
        value: u64,
        size: u64,
        kind: SymbolKind,
        binding: SymbolBinding,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            size,
            kind,
            binding,
            section: None,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:#x} ({} {})",
            self.name, self.value, self.binding, self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_display() {
        let sym = Symbol::new("main", 0x1000, 0x40, SymbolKind::Function, SymbolBinding::Global);
        assert_eq!(sym.to_string(), "main @ 0x1000 (Global Function)");
        assert_eq!(sym.section, None);
    }

    #[test]
    fn test_kind_and_binding_display() {
        assert_eq!(SymbolKind::Object.to_string(), "Object");
        assert_eq!(SymbolBinding::Weak.to_string(), "Weak");
    }
}
