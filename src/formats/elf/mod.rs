//! Built-in ELF backend.
//!
//! Decodes ELF32/ELF64 containers in either byte order into the normalized
//! [`RawImage`] model: machine facts from the header, segments from the
//! program header table, sections from the section header table (named via
//! `.shstrtab`), and symbols from `.symtab`/`.dynsym`. All reads are
//! bounds-checked against the presented window; structural inconsistencies
//! are reported as [`ParseError::Malformed`] and recognizably-ELF variants
//! this decoder does not handle as [`ParseError::Unsupported`].

use crate::backend::ImageBackend;
use crate::core::arch::{AddressSize, Arch, Endianness};
use crate::core::image::RawImage;
use crate::core::section::{Section, SectionFlags};
use crate::core::segment::{Perms, Segment};
use crate::core::symbol::{Symbol, SymbolBinding, SymbolKind};
use crate::error::ParseError;

/// Name the backend registers under.
pub const BACKEND_NAME: &str = "image.elf";

/// ELF magic bytes.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;
const EV_CURRENT: u8 = 1;

const EHDR32_SIZE: u64 = 52;
const EHDR64_SIZE: u64 = 64;
const PHDR32_SIZE: u64 = 32;
const PHDR64_SIZE: u64 = 56;
const SHDR32_SIZE: u64 = 40;
const SHDR64_SIZE: u64 = 64;
const SYM32_SIZE: u64 = 16;
const SYM64_SIZE: u64 = 24;

const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

const SHT_SYMTAB: u32 = 2;
const SHT_NOBITS: u32 = 8;
const SHT_DYNSYM: u32 = 11;
const SHF_WRITE: u64 = 0x1;
const SHF_ALLOC: u64 = 0x2;
const SHF_EXECINSTR: u64 = 0x4;

const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;
const STB_GLOBAL: u8 = 1;
const STB_WEAK: u8 = 2;

const SHN_UNDEF: u16 = 0;

/// Endian-aware, bounds-checked reader over the parse window.
struct Reader<'d> {
    data: &'d [u8],
    endian: Endianness,
}

impl<'d> Reader<'d> {
    fn bytes(&self, offset: u64, len: u64, context: &str) -> Result<&'d [u8], ParseError> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len() as u64)
            .ok_or_else(|| {
                ParseError::malformed(format!(
                    "{}: range {:#x}+{:#x} exceeds input of {} bytes",
                    context,
                    offset,
                    len,
                    self.data.len()
                ))
            })?;
        Ok(&self.data[offset as usize..end as usize])
    }

    fn u8(&self, offset: u64, context: &str) -> Result<u8, ParseError> {
        Ok(self.bytes(offset, 1, context)?[0])
    }

    fn u16(&self, offset: u64, context: &str) -> Result<u16, ParseError> {
        let b = self.bytes(offset, 2, context)?;
        let bytes = [b[0], b[1]];
        Ok(match self.endian {
            Endianness::Little => u16::from_le_bytes(bytes),
            Endianness::Big => u16::from_be_bytes(bytes),
        })
    }

    fn u32(&self, offset: u64, context: &str) -> Result<u32, ParseError> {
        let b = self.bytes(offset, 4, context)?;
        let bytes = [b[0], b[1], b[2], b[3]];
        Ok(match self.endian {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        })
    }

    fn u64(&self, offset: u64, context: &str) -> Result<u64, ParseError> {
        let b = self.bytes(offset, 8, context)?;
        let bytes = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        Ok(match self.endian {
            Endianness::Little => u64::from_le_bytes(bytes),
            Endianness::Big => u64::from_be_bytes(bytes),
        })
    }
}

/// The header fields the rest of the decode needs.
struct ElfHeader {
    class: AddressSize,
    endian: Endianness,
    arch: Arch,
    entry: u64,
    phoff: u64,
    phentsize: u64,
    phnum: u64,
    shoff: u64,
    shentsize: u64,
    shnum: u64,
    shstrndx: u64,
}

fn arch_from_machine(machine: u16, class: AddressSize) -> Arch {
    match machine {
        3 => Arch::X86,
        8 => match class {
            AddressSize::Bits32 => Arch::MIPS,
            AddressSize::Bits64 => Arch::MIPS64,
        },
        20 => Arch::PPC,
        21 => Arch::PPC64,
        40 => Arch::ARM,
        62 => Arch::X86_64,
        183 => Arch::AArch64,
        243 => match class {
            AddressSize::Bits32 => Arch::RISCV,
            AddressSize::Bits64 => Arch::RISCV64,
        },
        _ => Arch::Unknown,
    }
}

fn parse_header(data: &[u8]) -> Result<ElfHeader, ParseError> {
    if data.len() < 16 {
        return Err(ParseError::malformed(format!(
            "truncated ELF identification: {} bytes",
            data.len()
        )));
    }
    if data[0..4] != ELF_MAGIC {
        return Err(ParseError::malformed("missing ELF magic"));
    }

    let class = match data[4] {
        ELFCLASS32 => AddressSize::Bits32,
        ELFCLASS64 => AddressSize::Bits64,
        other => return Err(ParseError::unsupported(format!("ELF class {}", other))),
    };
    let endian = match data[5] {
        ELFDATA2LSB => Endianness::Little,
        ELFDATA2MSB => Endianness::Big,
        other => {
            return Err(ParseError::unsupported(format!(
                "ELF data encoding {}",
                other
            )))
        }
    };
    if data[6] != EV_CURRENT {
        return Err(ParseError::unsupported(format!("ELF version {}", data[6])));
    }

    let header_size = match class {
        AddressSize::Bits32 => EHDR32_SIZE,
        AddressSize::Bits64 => EHDR64_SIZE,
    };
    if (data.len() as u64) < header_size {
        return Err(ParseError::malformed(format!(
            "truncated ELF header: expected {} bytes, got {}",
            header_size,
            data.len()
        )));
    }

    let r = Reader { data, endian };
    let machine = r.u16(18, "ELF header")?;

    let header = match class {
        AddressSize::Bits32 => ElfHeader {
            class,
            endian,
            arch: arch_from_machine(machine, class),
            entry: r.u32(24, "ELF header")? as u64,
            phoff: r.u32(28, "ELF header")? as u64,
            shoff: r.u32(32, "ELF header")? as u64,
            phentsize: r.u16(42, "ELF header")? as u64,
            phnum: r.u16(44, "ELF header")? as u64,
            shentsize: r.u16(46, "ELF header")? as u64,
            shnum: r.u16(48, "ELF header")? as u64,
            shstrndx: r.u16(50, "ELF header")? as u64,
        },
        AddressSize::Bits64 => ElfHeader {
            class,
            endian,
            arch: arch_from_machine(machine, class),
            entry: r.u64(24, "ELF header")?,
            phoff: r.u64(32, "ELF header")?,
            shoff: r.u64(40, "ELF header")?,
            phentsize: r.u16(54, "ELF header")? as u64,
            phnum: r.u16(56, "ELF header")? as u64,
            shentsize: r.u16(58, "ELF header")? as u64,
            shnum: r.u16(60, "ELF header")? as u64,
            shstrndx: r.u16(62, "ELF header")? as u64,
        },
    };
    Ok(header)
}

/// Validates that a table of `count` entries of `entsize` bytes starting at
/// `offset` lies within the input.
fn check_table(
    r: &Reader<'_>,
    offset: u64,
    entsize: u64,
    count: u64,
    min_entsize: u64,
    what: &str,
) -> Result<(), ParseError> {
    if entsize < min_entsize {
        return Err(ParseError::malformed(format!(
            "{} entry size {} below minimum {}",
            what, entsize, min_entsize
        )));
    }
    let total = entsize.checked_mul(count).ok_or_else(|| {
        ParseError::malformed(format!("{} table size overflows", what))
    })?;
    r.bytes(offset, total, what)?;
    Ok(())
}

fn parse_segments(r: &Reader<'_>, hdr: &ElfHeader) -> Result<Vec<Segment>, ParseError> {
    if hdr.phnum == 0 {
        return Ok(Vec::new());
    }
    let min = match hdr.class {
        AddressSize::Bits32 => PHDR32_SIZE,
        AddressSize::Bits64 => PHDR64_SIZE,
    };
    check_table(r, hdr.phoff, hdr.phentsize, hdr.phnum, min, "program header")?;

    let mut segments = Vec::new();
    for i in 0..hdr.phnum {
        let base = hdr.phoff + i * hdr.phentsize;
        let p_type = r.u32(base, "program header")?;
        if p_type != PT_LOAD {
            continue;
        }
        let (p_offset, p_vaddr, p_filesz, p_memsz, p_flags) = match hdr.class {
            AddressSize::Bits32 => (
                r.u32(base + 4, "program header")? as u64,
                r.u32(base + 8, "program header")? as u64,
                r.u32(base + 16, "program header")? as u64,
                r.u32(base + 20, "program header")? as u64,
                r.u32(base + 24, "program header")?,
            ),
            AddressSize::Bits64 => (
                r.u64(base + 8, "program header")?,
                r.u64(base + 16, "program header")?,
                r.u64(base + 32, "program header")?,
                r.u64(base + 40, "program header")?,
                r.u32(base + 4, "program header")?,
            ),
        };
        let mut perms = Perms::empty();
        if p_flags & PF_R != 0 {
            perms |= Perms::READ;
        }
        if p_flags & PF_W != 0 {
            perms |= Perms::WRITE;
        }
        if p_flags & PF_X != 0 {
            perms |= Perms::EXECUTE;
        }
        // The file-backed part must be inside the input.
        r.bytes(p_offset, p_filesz, "segment contents")?;
        segments.push(Segment::new(p_vaddr, p_memsz, p_offset, p_filesz, perms));
    }
    Ok(segments)
}

/// A section header in its raw, class-independent shape.
struct RawShdr {
    name: u32,
    stype: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    entsize: u64,
}

fn parse_section_headers(r: &Reader<'_>, hdr: &ElfHeader) -> Result<Vec<RawShdr>, ParseError> {
    if hdr.shnum == 0 {
        return Ok(Vec::new());
    }
    let min = match hdr.class {
        AddressSize::Bits32 => SHDR32_SIZE,
        AddressSize::Bits64 => SHDR64_SIZE,
    };
    check_table(r, hdr.shoff, hdr.shentsize, hdr.shnum, min, "section header")?;

    let mut headers = Vec::with_capacity(hdr.shnum as usize);
    for i in 0..hdr.shnum {
        let base = hdr.shoff + i * hdr.shentsize;
        let (flags, addr, offset, size, link, entsize) = match hdr.class {
            AddressSize::Bits32 => (
                r.u32(base + 8, "section header")? as u64,
                r.u32(base + 12, "section header")? as u64,
                r.u32(base + 16, "section header")? as u64,
                r.u32(base + 20, "section header")? as u64,
                r.u32(base + 24, "section header")?,
                r.u32(base + 36, "section header")? as u64,
            ),
            AddressSize::Bits64 => (
                r.u64(base + 8, "section header")?,
                r.u64(base + 16, "section header")?,
                r.u64(base + 24, "section header")?,
                r.u64(base + 32, "section header")?,
                r.u32(base + 40, "section header")?,
                r.u64(base + 56, "section header")?,
            ),
        };
        headers.push(RawShdr {
            name: r.u32(base, "section header")?,
            stype: r.u32(base + 4, "section header")?,
            flags,
            addr,
            offset,
            size,
            link,
            entsize,
        });
    }
    Ok(headers)
}

/// Reads a NUL-terminated name out of a string table.
fn read_name(table: &[u8], index: u32, what: &str) -> Result<String, ParseError> {
    let index = index as usize;
    if index >= table.len() {
        return Err(ParseError::malformed(format!(
            "{} string index {} out of range (table size {})",
            what,
            index,
            table.len()
        )));
    }
    let tail = &table[index..];
    let nul = tail.iter().position(|&b| b == 0).ok_or_else(|| {
        ParseError::malformed(format!("{} string at index {} is unterminated", what, index))
    })?;
    Ok(String::from_utf8_lossy(&tail[..nul]).into_owned())
}

/// Returns the contents of the string table section at `index`.
fn string_table<'d>(
    r: &Reader<'d>,
    headers: &[RawShdr],
    index: u64,
    what: &str,
) -> Result<&'d [u8], ParseError> {
    let shdr = headers.get(index as usize).ok_or_else(|| {
        ParseError::malformed(format!(
            "{} string table index {} out of range ({} sections)",
            what,
            index,
            headers.len()
        ))
    })?;
    r.bytes(shdr.offset, shdr.size, what)
}

fn build_sections(
    r: &Reader<'_>,
    hdr: &ElfHeader,
    headers: &[RawShdr],
) -> Result<Vec<Section>, ParseError> {
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    // An shstrndx of SHN_UNDEF means the container carries no section name
    // string table; its sections are unnamed.
    let shstrtab = if hdr.shstrndx == SHN_UNDEF as u64 {
        &[][..]
    } else {
        string_table(r, headers, hdr.shstrndx, "section name")?
    };

    let mut sections = Vec::new();
    // Index 0 is the reserved null entry.
    for shdr in headers.iter().skip(1) {
        let name = if shstrtab.is_empty() {
            String::new()
        } else {
            read_name(shstrtab, shdr.name, "section name")?
        };
        let file_size = if shdr.stype == SHT_NOBITS { 0 } else { shdr.size };
        r.bytes(shdr.offset, file_size, "section contents")?;

        let mut flags = SectionFlags::READ;
        if shdr.flags & SHF_WRITE != 0 {
            flags |= SectionFlags::WRITE;
        }
        if shdr.flags & SHF_EXECINSTR != 0 {
            flags |= SectionFlags::EXECUTE;
        }
        if shdr.flags & SHF_ALLOC != 0 {
            flags |= SectionFlags::ALLOC;
        }
        sections.push(Section::new(
            name,
            shdr.addr,
            shdr.size,
            shdr.offset,
            file_size,
            flags,
        ));
    }
    Ok(sections)
}

fn parse_symbols(
    r: &Reader<'_>,
    hdr: &ElfHeader,
    headers: &[RawShdr],
) -> Result<Vec<Symbol>, ParseError> {
    let min = match hdr.class {
        AddressSize::Bits32 => SYM32_SIZE,
        AddressSize::Bits64 => SYM64_SIZE,
    };

    let mut symbols = Vec::new();
    for shdr in headers {
        if shdr.stype != SHT_SYMTAB && shdr.stype != SHT_DYNSYM {
            continue;
        }
        if shdr.entsize < min {
            return Err(ParseError::malformed(format!(
                "symbol entry size {} below minimum {}",
                shdr.entsize, min
            )));
        }
        r.bytes(shdr.offset, shdr.size, "symbol table")?;
        let strtab = string_table(r, headers, shdr.link as u64, "symbol name")?;

        let count = shdr.size / shdr.entsize;
        // Entry 0 is the reserved null symbol.
        for i in 1..count {
            let base = shdr.offset + i * shdr.entsize;
            let (name_idx, value, size, info, shndx) = match hdr.class {
                AddressSize::Bits32 => (
                    r.u32(base, "symbol")?,
                    r.u32(base + 4, "symbol")? as u64,
                    r.u32(base + 8, "symbol")? as u64,
                    r.u8(base + 12, "symbol")?,
                    r.u16(base + 14, "symbol")?,
                ),
                AddressSize::Bits64 => (
                    r.u32(base, "symbol")?,
                    r.u64(base + 8, "symbol")?,
                    r.u64(base + 16, "symbol")?,
                    r.u8(base + 4, "symbol")?,
                    r.u16(base + 6, "symbol")?,
                ),
            };
            // Undefined symbols carry no address in this image.
            if shndx == SHN_UNDEF {
                continue;
            }
            let name = read_name(strtab, name_idx, "symbol name")?;
            if name.is_empty() {
                continue;
            }
            let kind = match info & 0xf {
                STT_FUNC => SymbolKind::Function,
                STT_OBJECT => SymbolKind::Object,
                _ => SymbolKind::Unknown,
            };
            let binding = match info >> 4 {
                STB_GLOBAL => SymbolBinding::Global,
                STB_WEAK => SymbolBinding::Weak,
                _ => SymbolBinding::Local,
            };
            symbols.push(Symbol::new(name, value, size, kind, binding));
        }
    }
    Ok(symbols)
}

/// The built-in ELF backend.
pub struct ElfBackend;

impl ImageBackend for ElfBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn probe(&self, data: &[u8]) -> bool {
        data.len() >= 4 && data[0..4] == ELF_MAGIC
    }

    fn parse(&self, data: &[u8]) -> Result<RawImage, ParseError> {
        let hdr = parse_header(data)?;
        let r = Reader {
            data,
            endian: hdr.endian,
        };

        let mut raw = RawImage::new(hdr.arch, hdr.class, hdr.endian, hdr.entry);
        raw.segments = parse_segments(&r, &hdr)?;
        let headers = parse_section_headers(&r, &hdr)?;
        raw.sections = build_sections(&r, &hdr, &headers)?;
        raw.symbols = parse_symbols(&r, &hdr, &headers)?;
        Ok(raw)
    }
}
