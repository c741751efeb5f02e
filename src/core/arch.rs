//! Architecture, address-size, and byte-order descriptors.
//!
//! These are the format-agnostic facts a backend reports about the machine
//! a container targets. They are recorded on the [`crate::Image`] and are
//! consistent across all of its sections, segments, and symbols.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The CPU architecture of a parsed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    /// 32-bit x86
    X86,
    /// 64-bit x86
    X86_64,
    /// 32-bit ARM
    ARM,
    /// 64-bit ARM
    AArch64,
    /// MIPS (32-bit)
    MIPS,
    /// MIPS (64-bit)
    MIPS64,
    /// PowerPC (32-bit)
    PPC,
    /// PowerPC (64-bit)
    PPC64,
    /// RISC-V (32-bit)
    RISCV,
    /// RISC-V (64-bit)
    RISCV64,
    /// Unknown or unsupported architecture
    Unknown,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::ARM => "arm",
            Arch::AArch64 => "aarch64",
            Arch::MIPS => "mips",
            Arch::MIPS64 => "mips64",
            Arch::PPC => "ppc",
            Arch::PPC64 => "ppc64",
            Arch::RISCV => "riscv",
            Arch::RISCV64 => "riscv64",
            Arch::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// The address width of a parsed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSize {
    /// 32-bit addresses
    Bits32,
    /// 64-bit addresses
    Bits64,
}

impl AddressSize {
    /// Returns the width in bits (32 or 64).
    pub fn bit_width(&self) -> u32 {
        match self {
            AddressSize::Bits32 => 32,
            AddressSize::Bits64 => 64,
        }
    }

    /// Returns the width in bytes (4 or 8).
    pub fn byte_width(&self) -> u32 {
        self.bit_width() / 8
    }
}

impl fmt::Display for AddressSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bit_width())
    }
}

/// The byte order of a parsed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    /// Least-significant byte first
    Little,
    /// Most-significant byte first
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => write!(f, "little"),
            Endianness::Big => write!(f, "big"),
        }
    }
}
