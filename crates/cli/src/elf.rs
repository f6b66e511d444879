//! ELF executable loading
//!
//! Parses ELF32/ELF64 executables for the ARM and AArch64 machines (plus
//! the picoJava machine numbers, which select the Jazelle extension),
//! deduces the guest endianness from the header and the BE8 flag, loads
//! PT_LOAD segments into guest memory and collects mapping symbols for
//! disassembly-mode ISA switching.

use armemu::config::{Isa, JazelleLevel};
use armemu::{Endian, MemoryInterface};

use crate::loader::{Environment, EndianChoice, LoadError, Purpose, Reader};

const EV_CURRENT: u8 = 1;

const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

const ET_EXEC: u16 = 2;

const EM_ARM: u16 = 40;
const EM_PJ: u16 = 91;
// as given in the picoJava-II programmer's reference; collides with EM_SNP1K
const EM_OLD_PICOJAVA: u16 = 99;
const EM_AARCH64: u16 = 183;

const PT_LOAD: u32 = 1;
const SHT_SYMTAB: u32 = 2;

const EF_ARM_BE8: u32 = 0x0080_0000;

/// One mapping symbol: from `address` on, the section holds `isa` code
/// (or data when `isa` is `None`).
#[derive(Debug, Clone, Copy)]
pub struct MappingSymbol {
    pub address: u64,
    pub isa: Option<Isa>,
}

pub struct LoadedElf {
    pub mapping_symbols: Vec<MappingSymbol>,
    /// (virtual address, file offset, size) of each PT_LOAD segment.
    pub segments: Vec<(u64, usize, usize)>,
}

struct ElfReader<'a> {
    reader: Reader<'a>,
    class64: bool,
    big_endian: bool,
}

impl<'a> ElfReader<'a> {
    fn u16(&mut self) -> Result<u16, LoadError> {
        if self.big_endian { self.reader.u16be() } else { self.reader.u16le() }
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        if self.big_endian { self.reader.u32be() } else { self.reader.u32le() }
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        if self.big_endian { self.reader.u64be() } else { self.reader.u64le() }
    }

    /// Natural word of the ELF class.
    fn word(&mut self) -> Result<u64, LoadError> {
        if self.class64 { self.u64() } else { Ok(self.u32()? as u64) }
    }
}

/// Parse the headers, fix up the environment (ISA, endianness, entry,
/// default stack) and load the segments when the purpose asks for it.
pub fn read_elf_file(
    bytes: &[u8],
    env: &mut Environment,
    memory: &mut dyn MemoryInterface,
) -> Result<LoadedElf, LoadError> {
    let mut header = Reader::new(bytes);
    header.seek(4);

    let class64 = match header.u8()? {
        ELFCLASS32 => false,
        ELFCLASS64 => true,
        _ => return Err(LoadError::Invalid("invalid ELF class")),
    };
    let big_endian = match header.u8()? {
        ELFDATA2LSB => false,
        ELFDATA2MSB => true,
        _ => return Err(LoadError::Invalid("invalid ELF data format")),
    };
    if header.u8()? != EV_CURRENT {
        return Err(LoadError::Invalid("invalid ELF header version"));
    }

    let mut elf = ElfReader {
        reader: Reader::new(bytes),
        class64,
        big_endian,
    };
    elf.reader.seek(0x10);

    if elf.u16()? != ET_EXEC {
        return Err(LoadError::Invalid("not executable"));
    }
    let machine = elf.u16()?;
    let mut force_32bit = false;
    match machine {
        EM_ARM | EM_AARCH64 => {}
        EM_PJ | EM_OLD_PICOJAVA => {
            env.config.jazelle = Some(JazelleLevel::Extension);
        }
        _ => return Err(LoadError::Invalid("invalid machine type")),
    }

    if elf.u32()? != EV_CURRENT as u32 {
        return Err(LoadError::Invalid("invalid object version"));
    }

    env.entry = elf.word()?;
    env.stack = if class64 { 0x0000_4000_8000_0000 } else { 0x4080_0000 };

    let phoff = elf.word()? as usize;
    let shoff = elf.word()? as usize;
    let flags = elf.u32()?;

    if env.isa.is_none() {
        if class64 {
            env.isa = Some(Isa::Arm64);
        } else {
            match machine {
                EM_AARCH64 => env.isa = Some(Isa::Arm64),
                EM_PJ | EM_OLD_PICOJAVA => env.isa = Some(Isa::Jazelle),
                _ => {
                    if env.purpose == Purpose::Load {
                        if env.entry & 1 != 0 {
                            env.isa = Some(Isa::Thumb);
                            env.entry &= !1;
                        } else {
                            env.isa = Some(Isa::Arm32);
                        }
                    } else {
                        // the mapping symbols decide during parsing
                        force_32bit = true;
                    }
                }
            }
        }
    }

    // big endian 32-bit executables distinguish BE-8 through a flag
    if big_endian {
        if machine == EM_ARM && flags & EF_ARM_BE8 == 0 {
            match env.endian {
                EndianChoice::Default | EndianChoice::BigVersionSpecific => {
                    env.endian = EndianChoice::Exact(Endian::Swapped)
                }
                EndianChoice::Exact(Endian::Swapped) => {}
                _ => log::warn!("Invalid endian directive"),
            }
        } else {
            match env.endian {
                EndianChoice::Default | EndianChoice::BigVersionSpecific => {
                    env.endian = EndianChoice::Exact(Endian::Big)
                }
                EndianChoice::Exact(Endian::Big) => {}
                _ => log::warn!("Invalid endian directive"),
            }
        }
    } else {
        match env.endian {
            EndianChoice::Default => env.endian = EndianChoice::Exact(Endian::Little),
            EndianChoice::Exact(Endian::Little) => {}
            _ => log::warn!("Invalid endian directive"),
        }
    }

    elf.reader.skip(2); // ehsize
    let phentsize = elf.u16()? as usize;
    let phnum = elf.u16()? as usize;
    let shentsize = elf.u16()? as usize;
    let shnum = elf.u16()? as usize;

    let follow_mapping_symbols = force_32bit;
    env.resolve_isa(force_32bit);

    let mut mapping_symbols = Vec::new();
    if env.purpose == Purpose::Parse && follow_mapping_symbols && shnum != 0 {
        mapping_symbols = collect_mapping_symbols(&mut elf, shoff, shentsize, shnum)?;
        mapping_symbols.sort_by_key(|symbol| symbol.address);
    }

    let mut segments = Vec::new();
    for i in 0..phnum {
        elf.reader.seek(phoff + i * phentsize);
        let segment_type = elf.u32()?;
        if segment_type != PT_LOAD {
            continue;
        }
        if class64 {
            elf.reader.skip(4); // p_flags
        }
        let offset = elf.word()? as usize;
        let v_address = elf.word()?;
        elf.reader.skip(if class64 { 8 } else { 4 }); // p_paddr
        let filesize = elf.word()? as usize;

        segments.push((v_address, offset, filesize));

        if env.purpose == Purpose::Load {
            let data = bytes
                .get(offset..offset + filesize)
                .ok_or(LoadError::Truncated)?;
            crate::loader::write_image(memory, v_address, data, env.code_byte_endian());
        }
    }

    Ok(LoadedElf {
        mapping_symbols,
        segments,
    })
}

/// Walk every symbol table looking for `$a`/`$t`/`$t.x`/`$d`/`$x`/`$j`
/// names and record the ISA transitions they mark.
fn collect_mapping_symbols(
    elf: &mut ElfReader<'_>,
    shoff: usize,
    shentsize: usize,
    shnum: usize,
) -> Result<Vec<MappingSymbol>, LoadError> {
    let class64 = elf.class64;
    let mut symbols = Vec::new();

    for i in 0..shnum {
        elf.reader.seek(shoff + i * shentsize + 4);
        if elf.u32()? != SHT_SYMTAB {
            continue;
        }
        elf.reader.skip(if class64 { 16 } else { 8 });
        let offset = elf.word()? as usize;
        let size = elf.word()? as usize;
        let link = elf.u32()? as usize;
        elf.reader.skip(if class64 { 12 } else { 8 });
        let entsize = elf.word()? as usize;
        if entsize == 0 {
            continue;
        }

        elf.reader.seek(shoff + link * shentsize + if class64 { 24 } else { 16 });
        let strtab_offset = elf.word()? as usize;

        let mut symbol_offset = 0;
        while symbol_offset < size {
            elf.reader.seek(offset + symbol_offset);
            let name = elf.u32()? as usize;
            if class64 {
                elf.reader.skip(4);
            }
            let address = elf.word()?;

            let strings = &elf.reader.bytes[strtab_offset..];
            let name_bytes = strings.get(name..).unwrap_or(&[]);
            if name_bytes.first() == Some(&b'$') {
                let isa = match name_bytes.get(1) {
                    Some(b'a') => Some(Some(Isa::Arm32)),
                    Some(b't') => {
                        if name_bytes.get(2..4) == Some(b".x") {
                            Some(Some(Isa::ThumbEe))
                        } else {
                            Some(Some(Isa::Thumb))
                        }
                    }
                    // 64-bit binaries only; we never collect those
                    Some(b'x') => Some(Some(Isa::Arm64)),
                    Some(b'd') => Some(None),
                    // custom extension, never emitted by binutils
                    Some(b'j') => Some(Some(Isa::Jazelle)),
                    _ => None,
                };
                if let Some(isa) = isa {
                    symbols.push(MappingSymbol { address, isa });
                }
            }
            symbol_offset += entsize;
        }
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PagedMemory;

    /// Minimal ELF32 LE executable with one PT_LOAD segment.
    fn tiny_elf(entry: u32, code: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 0x54 + code.len()];
        image[0..4].copy_from_slice(b"\x7FELF");
        image[4] = ELFCLASS32;
        image[5] = ELFDATA2LSB;
        image[6] = EV_CURRENT;
        image[0x10..0x12].copy_from_slice(&ET_EXEC.to_le_bytes());
        image[0x12..0x14].copy_from_slice(&EM_ARM.to_le_bytes());
        image[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        image[0x18..0x1C].copy_from_slice(&entry.to_le_bytes());
        image[0x1C..0x20].copy_from_slice(&0x34u32.to_le_bytes()); // phoff
        image[0x2A..0x2C].copy_from_slice(&0x20u16.to_le_bytes()); // phentsize
        image[0x2C..0x2E].copy_from_slice(&1u16.to_le_bytes()); // phnum
        // program header
        image[0x34..0x38].copy_from_slice(&PT_LOAD.to_le_bytes());
        image[0x38..0x3C].copy_from_slice(&0x54u32.to_le_bytes()); // offset
        image[0x3C..0x40].copy_from_slice(&0x8000u32.to_le_bytes()); // vaddr
        image[0x44..0x48].copy_from_slice(&(code.len() as u32).to_le_bytes());
        image[0x54..].copy_from_slice(code);
        image
    }

    #[test]
    fn test_load_tiny_elf() {
        let image = tiny_elf(0x8000, &[0x01, 0x02, 0x03, 0x04]);
        let mut env = Environment::new();
        let mut memory = PagedMemory::new();
        let loaded = read_elf_file(&image, &mut env, &mut memory).unwrap();
        assert_eq!(env.entry, 0x8000);
        assert_eq!(env.isa, Some(Isa::Arm32));
        assert_eq!(loaded.segments, vec![(0x8000, 0x54, 4)]);
        let mut byte = [0u8];
        memory.read(0x8003, &mut byte, false);
        assert_eq!(byte[0], 0x04);
    }

    #[test]
    fn test_thumb_entry_bit() {
        let image = tiny_elf(0x8001, &[0; 2]);
        let mut env = Environment::new();
        let mut memory = PagedMemory::new();
        read_elf_file(&image, &mut env, &mut memory).unwrap();
        assert_eq!(env.isa, Some(Isa::Thumb));
        assert_eq!(env.entry, 0x8000);
    }

    #[test]
    fn test_non_elf_rejected() {
        let mut env = Environment::new();
        let mut memory = PagedMemory::new();
        let result = read_elf_file(&[0u8; 64], &mut env, &mut memory);
        assert!(result.is_err());
    }
}
