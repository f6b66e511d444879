//! Load environment shared by the flat-image, ELF and class loaders
//!
//! Everything a loader determines about an input (instruction set,
//! endianness, entry point, initial stack, Jazelle frame layout) travels
//! through this structure to the run loop; nothing is communicated through
//! globals.

use armemu::config::{self, Isa, IsaSet, Syntax, Thumb2Support};
use armemu::cpu::reg;
use armemu::exec::jazelle;
use armemu::{Configuration, Cpu, Endian, MemoryInterface};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated file")]
    Truncated,
    #[error("{0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Parse,
    Load,
}

/// Endianness request: a concrete choice, a generic "big endian" resolved
/// by architecture version, or the loader default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndianChoice {
    Default,
    BigVersionSpecific,
    Exact(Endian),
}

pub struct Environment {
    // input parameters
    pub purpose: Purpose,
    pub thumb2: Thumb2Support,

    // input/output parameters
    pub config: Configuration,
    pub version_requested: bool,
    pub supported_isas: IsaSet,
    pub isa: Option<Isa>,
    pub syntax: Option<Syntax>,
    pub endian: EndianChoice,

    // output parameters
    pub entry: u64,
    pub stack: u64,

    // output parameters, Jazelle only
    pub cp_start: u32,
    pub loc_count: u32,
    pub clinit_entry: u32,
    pub clinit_loc_count: u32,
    pub heap_start: u64,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            purpose: Purpose::Load,
            thumb2: Thumb2Support::Permitted,
            config: Configuration::default(),
            version_requested: false,
            supported_isas: IsaSet::empty(),
            isa: None,
            syntax: None,
            endian: EndianChoice::Default,
            entry: 0,
            stack: 0,
            cp_start: 0,
            loc_count: 0,
            clinit_entry: 0,
            clinit_loc_count: 0,
            heap_start: 0,
        }
    }

    /// Resolve the configuration/ISA/syntax triple (see
    /// [`armemu::config::resolve`]) in place.
    pub fn resolve_isa(&mut self, force_32bit: bool) {
        config::resolve(
            &mut self.config,
            &mut self.isa,
            &mut self.syntax,
            self.version_requested,
            self.thumb2,
            force_32bit,
        );
    }

    /// Concrete data endianness after resolution.
    pub fn resolved_endian(&self) -> Endian {
        match self.endian {
            EndianChoice::Exact(endian) => endian,
            EndianChoice::Default => Endian::Little,
            EndianChoice::BigVersionSpecific => {
                // before v6 only the word-invariant scheme existed
                if self.config.version < config::Version::V6 {
                    Endian::Swapped
                } else {
                    Endian::Big
                }
            }
        }
    }

    /// Endianness used when streaming code bytes into memory: BE-32 images
    /// are stored with their lanes flipped, everything else byte-for-byte.
    pub fn code_byte_endian(&self) -> Endian {
        if self.resolved_endian() == Endian::Swapped {
            Endian::Swapped
        } else {
            Endian::Little
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream a byte image into guest memory before the processor exists.
pub fn write_image(memory: &mut dyn MemoryInterface, address: u64, bytes: &[u8], endian: Endian) {
    for (offset, byte) in bytes.iter().enumerate() {
        armemu::mem::write8(memory, address + offset as u64, *byte, endian, false);
    }
}

/// Build the initial Linux process stack: argc, the argv and envp pointer
/// vectors, a terminating null and the string contents. The Jazelle
/// variant instead lays the strings out as length-prefixed word-aligned
/// arrays growing upward, with the vectors after them.
pub fn build_initial_stack(
    cpu: &mut Cpu,
    stack: u64,
    args: &[String],
    env_vars: &[String],
) -> u64 {
    let is_jazelle = cpu.current_isa() == Isa::Jazelle;
    let argc = args.len();
    let envp_count = env_vars.len();

    let content_size = |strings: &[String]| -> u64 {
        strings
            .iter()
            .map(|s| {
                let mut size = s.len() as u64 + 1;
                if is_jazelle {
                    size = (size + 4 + 3) & !3; // length word plus alignment
                }
                size
            })
            .sum()
    };
    let argv_content_size = content_size(args);
    let envp_content_size = content_size(env_vars);

    let mut stack = stack;
    let mut string_offset;
    let argc_address;
    let argv_contents;
    let envp_contents;
    let ptr_shift: u64;

    match cpu.current_isa() {
        Isa::Jazelle => {
            ptr_shift = 2;
            string_offset = (stack + 3) & !3;
            argc_address = string_offset + argv_content_size + envp_content_size;
            argv_contents = argc_address + 4;
            envp_contents = argv_contents + 4 * argc as u64 + 4;
            cpu.write32_data(envp_contents - 4, envp_count as u32 + 1);
            stack = envp_contents + 4 * envp_count as u64 + 4;
            cpu.write32_data(stack - 4, 0); // last envp entry is null
            cpu.write32_data(stack, argv_contents as u32);
            cpu.write32_data(stack + 4, envp_contents as u32);
        }
        Isa::Arm64 => {
            ptr_shift = 3;
            stack -= envp_content_size + argv_content_size;
            string_offset = stack;
            stack -= 8 * (3 + argc as u64 + envp_count as u64);
            stack &= !0xF;
            argc_address = stack;
            argv_contents = stack + 8;
            envp_contents = argv_contents + argc as u64 * 8 + 8;
        }
        _ => {
            ptr_shift = 2;
            stack -= envp_content_size + argv_content_size;
            string_offset = stack;
            stack -= 4 * (3 + argc as u64 + envp_count as u64);
            stack &= !3;
            argc_address = stack;
            argv_contents = stack + 4;
            envp_contents = argv_contents + argc as u64 * 4 + 4;
        }
    }

    let write_ptr = |cpu: &mut Cpu, address: u64, value: u64| {
        if ptr_shift == 2 {
            cpu.write32_data(address, value as u32);
        } else {
            cpu.write64_data(address, value);
        }
    };

    write_ptr(cpu, argc_address, argc as u64);

    for (i, arg) in args.iter().enumerate() {
        if is_jazelle {
            cpu.write32_data(string_offset, arg.len() as u32);
            string_offset += 4;
        }
        write_ptr(cpu, argv_contents + ((i as u64) << ptr_shift), string_offset);
        for (j, byte) in arg.bytes().chain(std::iter::once(0)).enumerate() {
            cpu.write8_data(string_offset + j as u64, byte);
        }
        string_offset += arg.len() as u64 + 1;
        if is_jazelle {
            string_offset = (string_offset + 3) & !3;
        }
    }

    for (i, var) in env_vars.iter().enumerate() {
        if is_jazelle {
            cpu.write32_data(string_offset, var.len() as u32);
            string_offset += 4;
        }
        write_ptr(cpu, envp_contents + ((i as u64) << ptr_shift), string_offset);
        for (j, byte) in var.bytes().chain(std::iter::once(0)).enumerate() {
            cpu.write8_data(string_offset + j as u64, byte);
        }
        string_offset += var.len() as u64 + 1;
    }

    write_ptr(cpu, envp_contents + ((envp_count as u64) << ptr_shift), 0);

    stack
}

/// Seed the processor registers for a Linux-style run.
pub fn setup_initial_state(cpu: &mut Cpu, env: &mut Environment, args: &[String], env_vars: &[String]) {
    env.stack = build_initial_stack(cpu, env.stack, args, env_vars);
    // a fixed 64 KiB initial stack reservation, then the heap
    env.heap_start = (env.stack + 0x1_0000 + 3) & !3;

    cpu.r[reg::PC] = env.entry;

    match cpu.current_isa() {
        Isa::Jazelle => {
            let loc = ((env.stack + 3) & !3) as u32;
            cpu.a32_set_reg(jazelle::J32_LOC, loc);
            cpu.a32_set_reg(jazelle::J32_TOS, (loc + env.loc_count + 3) & !3);
            cpu.a32_set_reg(jazelle::J32_CP, env.cp_start);
            cpu.a32_set_reg(jazelle::J32_LINK, 0);
            cpu.a32_set_reg(jazelle::J32_HEAP, env.heap_start as u32);
            if env.clinit_entry != 0 {
                crate::jvm::j32_invoke(cpu, 0, env.clinit_loc_count, env.clinit_entry);
            }
            jazelle::update_locals(cpu);
        }
        Isa::Arm64 => {
            cpu.a64_set_reg64(reg::A64_SP, false, env.stack);
        }
        _ => {
            cpu.a32_set_reg(reg::A32_SP, env.stack as u32);
        }
    }
}

/// Seed the registers for a bare or minimal run (no Linux stack image).
pub fn setup_bare_state(cpu: &mut Cpu, env: &Environment) {
    cpu.r[reg::PC] = env.entry;
    match cpu.current_isa() {
        Isa::Jazelle => {
            let loc = cpu.a32_reg(jazelle::J32_LOC);
            cpu.a32_set_reg(jazelle::J32_TOS, (loc + env.loc_count + 3) & !3);
        }
        Isa::Arm64 => {
            cpu.a64_set_reg64(reg::A64_SP, false, env.stack);
        }
        _ => {
            cpu.a32_set_reg(reg::A32_SP, env.stack as u32);
        }
    }
}

/// Byte readers for the loaders.
pub struct Reader<'a> {
    pub bytes: &'a [u8],
    pub pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    pub fn u8(&mut self) -> Result<u8, LoadError> {
        let value = *self.bytes.get(self.pos).ok_or(LoadError::Truncated)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn slice(&mut self, length: usize) -> Result<&'a [u8], LoadError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + length)
            .ok_or(LoadError::Truncated)?;
        self.pos += length;
        Ok(slice)
    }

    pub fn u16be(&mut self) -> Result<u16, LoadError> {
        Ok(u16::from_be_bytes(self.slice(2)?.try_into().unwrap()))
    }

    pub fn u32be(&mut self) -> Result<u32, LoadError> {
        Ok(u32::from_be_bytes(self.slice(4)?.try_into().unwrap()))
    }

    pub fn u64be(&mut self) -> Result<u64, LoadError> {
        Ok(u64::from_be_bytes(self.slice(8)?.try_into().unwrap()))
    }

    pub fn u16le(&mut self) -> Result<u16, LoadError> {
        Ok(u16::from_le_bytes(self.slice(2)?.try_into().unwrap()))
    }

    pub fn u32le(&mut self) -> Result<u32, LoadError> {
        Ok(u32::from_le_bytes(self.slice(4)?.try_into().unwrap()))
    }

    pub fn u64le(&mut self) -> Result<u64, LoadError> {
        Ok(u64::from_le_bytes(self.slice(8)?.try_into().unwrap()))
    }
}
