//! Reads the linked kernel ELF32 image and emits a sorted
//! `(address, name)` table as a Rust source file, so the panic handler
//! can resolve return addresses to symbol names without carrying a
//! full ELF/DWARF parser into the kernel binary itself.
//!
//! Usage: `gen-symtab <kernel-elf> <output.rs>`

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};

struct Elf32Header {
    e_shoff: u32,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

struct SectionHeader {
    sh_name: u32,
    sh_type: u32,
    sh_offset: u32,
    sh_size: u32,
    sh_link: u32,
    sh_entsize: u32,
}

struct Symbol {
    name: String,
    addr: u32,
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn parse_header(buf: &[u8]) -> Result<Elf32Header> {
    ensure!(buf.len() >= 52, "file too short to be an ELF32 image");
    ensure!(&buf[0..4] == b"\x7fELF", "missing ELF magic");
    ensure!(buf[4] == 1, "expected ELFCLASS32 (32-bit kernel target)");
    Ok(Elf32Header {
        e_shoff: read_u32(buf, 32),
        e_shentsize: read_u16(buf, 46),
        e_shnum: read_u16(buf, 48),
        e_shstrndx: read_u16(buf, 50),
    })
}

fn parse_section(buf: &[u8], off: usize) -> SectionHeader {
    SectionHeader {
        sh_name: read_u32(buf, off),
        sh_type: read_u32(buf, off + 4),
        sh_offset: read_u32(buf, off + 16),
        sh_size: read_u32(buf, off + 20),
        sh_link: read_u32(buf, off + 24),
        sh_entsize: read_u32(buf, off + 36),
    }
}

fn cstr_at(buf: &[u8], off: usize) -> String {
    let end = buf[off..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| off + p)
        .unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[off..end]).into_owned()
}

const SHT_SYMTAB: u32 = 2;
const STT_FUNC: u8 = 2;

fn extract_symbols(buf: &[u8]) -> Result<Vec<Symbol>> {
    let hdr = parse_header(buf)?;
    let sections: Vec<SectionHeader> = (0..hdr.e_shnum as usize)
        .map(|i| parse_section(buf, hdr.e_shoff as usize + i * hdr.e_shentsize as usize))
        .collect();

    let symtab = sections
        .iter()
        .find(|s| s.sh_type == SHT_SYMTAB)
        .context("kernel image has no .symtab section (was it stripped?)")?;
    let strtab = &sections[symtab.sh_link as usize];

    let entsize = symtab.sh_entsize as usize;
    ensure!(entsize == 16, "unexpected Elf32_Sym entry size {entsize}");
    let count = symtab.sh_size as usize / entsize;

    let mut out = Vec::new();
    for i in 0..count {
        let off = symtab.sh_offset as usize + i * entsize;
        let st_name = read_u32(buf, off);
        let st_value = read_u32(buf, off + 4);
        let st_info = buf[off + 12];
        if st_name == 0 || st_value == 0 {
            continue;
        }
        if st_info & 0xf != STT_FUNC {
            continue;
        }
        let name = cstr_at(buf, strtab.sh_offset as usize + st_name as usize);
        out.push(Symbol {
            name,
            addr: st_value,
        });
    }
    out.sort_by_key(|s| s.addr);
    Ok(out)
}

fn emit(symbols: &[Symbol]) -> String {
    let mut s = String::new();
    s.push_str("// Generated by gen-symtab. Do not edit.\n");
    s.push_str("pub static KERNEL_SYMTAB: &[(u32, &str)] = &[\n");
    for sym in symbols {
        s.push_str(&format!("    ({:#010x}, {:?}),\n", sym.addr, sym.name));
    }
    s.push_str("];\n");
    s
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        bail!("usage: gen-symtab <kernel-elf> <output.rs>");
    }
    let elf_path = PathBuf::from(&args[1]);
    let out_path = PathBuf::from(&args[2]);

    let buf = fs::read(&elf_path)
        .with_context(|| format!("reading kernel image {}", elf_path.display()))?;
    let symbols = extract_symbols(&buf)?;
    fs::write(&out_path, emit(&symbols))
        .with_context(|| format!("writing symtab to {}", out_path.display()))?;

    eprintln!("gen-symtab: wrote {} symbols to {}", symbols.len(), out_path.display());
    Ok(())
}
