//! Shared fixtures for integration tests.
#![allow(dead_code)]

/// Load base of the fixture's single PT_LOAD segment.
pub const BASE: u64 = 0x400000;

/// A synthetic ELF64 executable and the layout facts tests assert against.
pub struct Elf64Fixture {
    pub bytes: Vec<u8>,
    pub entry: u64,
    pub text_offset: u64,
    pub text_vaddr: u64,
    pub text_size: u64,
    pub main_addr: u64,
    pub helper_addr: u64,
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

/// Appends one ELF64 section header.
#[allow(clippy::too_many_arguments)]
fn push_shdr(
    buf: &mut Vec<u8>,
    name: u32,
    stype: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    entsize: u64,
) {
    let off = buf.len();
    buf.resize(off + 64, 0);
    put_u32(buf, off, name);
    put_u32(buf, off + 4, stype);
    put_u64(buf, off + 8, flags);
    put_u64(buf, off + 16, addr);
    put_u64(buf, off + 24, offset);
    put_u64(buf, off + 32, size);
    put_u32(buf, off + 40, link);
    put_u64(buf, off + 56, entsize);
}

/// Builds a small but complete little-endian ELF64 x86_64 executable:
/// one PT_LOAD segment mapping the whole file at [`BASE`], a 16-byte
/// `.text` section, and a `.symtab` with `main` and `helper`.
pub fn elf64_fixture() -> Elf64Fixture {
    let mut buf = vec![0u8; 64]; // ELF header, patched below

    let phoff = buf.len();
    buf.resize(phoff + 56, 0); // program header, patched below

    let text_offset = buf.len();
    let text_size = 16u64;
    buf.extend(std::iter::repeat(0x90u8).take(text_size as usize));
    let text_vaddr = BASE + text_offset as u64;
    let main_addr = text_vaddr;
    let helper_addr = text_vaddr + 8;

    // .shstrtab: name indices are offsets into this blob.
    let shstr_offset = buf.len();
    let shstrtab: &[u8] = b"\0.text\0.shstrtab\0.symtab\0.strtab\0";
    buf.extend_from_slice(shstrtab);
    let (n_text, n_shstrtab, n_symtab, n_strtab) = (1u32, 7u32, 17u32, 25u32);

    // .symtab: null entry, then main and helper (GLOBAL FUNC in .text).
    let symtab_offset = buf.len();
    buf.resize(symtab_offset + 24, 0);
    for (name_idx, value, size) in [(1u32, main_addr, 8u64), (6, helper_addr, 8)] {
        let off = buf.len();
        buf.resize(off + 24, 0);
        put_u32(&mut buf, off, name_idx);
        buf[off + 4] = 0x12; // STB_GLOBAL << 4 | STT_FUNC
        put_u16(&mut buf, off + 6, 1); // .text section header index
        put_u64(&mut buf, off + 8, value);
        put_u64(&mut buf, off + 16, size);
    }
    let symtab_size = (buf.len() - symtab_offset) as u64;

    let strtab_offset = buf.len();
    let strtab: &[u8] = b"\0main\0helper\0";
    buf.extend_from_slice(strtab);

    // Section header table: null, .text, .symtab, .shstrtab, .strtab.
    let shoff = buf.len();
    push_shdr(&mut buf, 0, 0, 0, 0, 0, 0, 0, 0);
    push_shdr(
        &mut buf,
        n_text,
        1, // SHT_PROGBITS
        0x2 | 0x4, // SHF_ALLOC | SHF_EXECINSTR
        text_vaddr,
        text_offset as u64,
        text_size,
        0,
        0,
    );
    push_shdr(
        &mut buf,
        n_symtab,
        2, // SHT_SYMTAB
        0,
        0,
        symtab_offset as u64,
        symtab_size,
        4, // links to .strtab
        24,
    );
    push_shdr(
        &mut buf,
        n_shstrtab,
        3, // SHT_STRTAB
        0,
        0,
        shstr_offset as u64,
        shstrtab.len() as u64,
        0,
        0,
    );
    push_shdr(
        &mut buf,
        n_strtab,
        3,
        0,
        0,
        strtab_offset as u64,
        strtab.len() as u64,
        0,
        0,
    );

    let file_len = buf.len() as u64;

    // PT_LOAD mapping the whole file at BASE, r-x.
    put_u32(&mut buf, phoff, 1); // p_type
    put_u32(&mut buf, phoff + 4, 0x4 | 0x1); // PF_R | PF_X
    put_u64(&mut buf, phoff + 8, 0); // p_offset
    put_u64(&mut buf, phoff + 16, BASE); // p_vaddr
    put_u64(&mut buf, phoff + 24, BASE); // p_paddr
    put_u64(&mut buf, phoff + 32, file_len); // p_filesz
    put_u64(&mut buf, phoff + 40, file_len); // p_memsz
    put_u64(&mut buf, phoff + 48, 0x1000); // p_align

    // ELF header.
    let entry = main_addr;
    buf[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
    buf[4] = 2; // ELFCLASS64
    buf[5] = 1; // ELFDATA2LSB
    buf[6] = 1; // EV_CURRENT
    put_u16(&mut buf, 16, 2); // ET_EXEC
    put_u16(&mut buf, 18, 62); // EM_X86_64
    put_u32(&mut buf, 20, 1); // e_version
    put_u64(&mut buf, 24, entry);
    put_u64(&mut buf, 32, phoff as u64);
    put_u64(&mut buf, 40, shoff as u64);
    put_u16(&mut buf, 52, 64); // e_ehsize
    put_u16(&mut buf, 54, 56); // e_phentsize
    put_u16(&mut buf, 56, 1); // e_phnum
    put_u16(&mut buf, 58, 64); // e_shentsize
    put_u16(&mut buf, 60, 5); // e_shnum
    put_u16(&mut buf, 62, 3); // e_shstrndx

    Elf64Fixture {
        bytes: buf,
        entry,
        text_offset: text_offset as u64,
        text_vaddr,
        text_size,
        main_addr,
        helper_addr,
    }
}
