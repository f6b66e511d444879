//! Instruction parsing and disassembling
//!
//! One printer per instruction set, driven either from a file image (parse
//! mode) or from the live processor (trace mode). The Thumb printer keeps
//! an IT tracker so conditional suffixes appear on the guarded
//! instructions; the Jazelle printer follows the tableswitch/lookupswitch
//! operand layout. Anything unrecognized prints as a data directive.

use armemu::config::{Features, Isa, Syntax, Version};
use armemu::{Configuration, Cpu};

pub const A32_CONDITION: [&str; 16] = [
    "eq", "ne", "cs", "cc", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le", "", "nv",
];

/// Where the instruction stream comes from.
pub enum CodeSource<'a> {
    Bytes { bytes: &'a [u8], big_endian: bool },
    Cpu(&'a mut Cpu),
}

pub struct Disassembler<'a> {
    pub config: Configuration,
    pub isa: Isa,
    pub syntax: Syntax,
    pub pc: u64,
    source: CodeSource<'a>,
    /// IT tracker: (condition, remaining mask)
    it_state: u8,
}

impl<'a> Disassembler<'a> {
    pub fn new(config: Configuration, isa: Isa, syntax: Syntax, source: CodeSource<'a>) -> Self {
        Disassembler {
            config,
            isa,
            syntax,
            pc: 0,
            source,
            it_state: 0,
        }
    }

    fn fetch8(&mut self) -> u8 {
        let value = match &mut self.source {
            CodeSource::Bytes { bytes, .. } => bytes.get(self.pc as usize).copied().unwrap_or(0),
            CodeSource::Cpu(cpu) => cpu.fetch_next8(),
        };
        self.pc += 1;
        value
    }

    fn fetch16(&mut self) -> u16 {
        let value = match &mut self.source {
            CodeSource::Bytes { bytes, big_endian } => {
                let at = self.pc as usize;
                let pair = [
                    bytes.get(at).copied().unwrap_or(0),
                    bytes.get(at + 1).copied().unwrap_or(0),
                ];
                if *big_endian {
                    u16::from_be_bytes(pair)
                } else {
                    u16::from_le_bytes(pair)
                }
            }
            CodeSource::Cpu(cpu) => cpu.fetch_next16(),
        };
        self.pc += 2;
        value
    }

    fn fetch16be(&mut self) -> u16 {
        let value = match &mut self.source {
            CodeSource::Bytes { bytes, .. } => {
                let at = self.pc as usize;
                u16::from_be_bytes([
                    bytes.get(at).copied().unwrap_or(0),
                    bytes.get(at + 1).copied().unwrap_or(0),
                ])
            }
            CodeSource::Cpu(cpu) => cpu.fetch_next16be(),
        };
        self.pc += 2;
        value
    }

    fn fetch32(&mut self) -> u32 {
        let value = match &mut self.source {
            CodeSource::Bytes { bytes, big_endian } => {
                let at = self.pc as usize;
                let quad = [
                    bytes.get(at).copied().unwrap_or(0),
                    bytes.get(at + 1).copied().unwrap_or(0),
                    bytes.get(at + 2).copied().unwrap_or(0),
                    bytes.get(at + 3).copied().unwrap_or(0),
                ];
                if *big_endian {
                    u32::from_be_bytes(quad)
                } else {
                    u32::from_le_bytes(quad)
                }
            }
            CodeSource::Cpu(cpu) => cpu.fetch_next32(),
        };
        self.pc += 4;
        value
    }

    fn fetch32be(&mut self) -> u32 {
        let value = match &mut self.source {
            CodeSource::Bytes { bytes, .. } => {
                let at = self.pc as usize;
                u32::from_be_bytes([
                    bytes.get(at).copied().unwrap_or(0),
                    bytes.get(at + 1).copied().unwrap_or(0),
                    bytes.get(at + 2).copied().unwrap_or(0),
                    bytes.get(at + 3).copied().unwrap_or(0),
                ])
            }
            CodeSource::Cpu(cpu) => cpu.fetch_next32be(),
        };
        self.pc += 4;
        value
    }

    /// Decode one instruction and return "address\traw\ttext".
    pub fn parse(&mut self) -> String {
        let pc = self.pc;
        match self.isa {
            Isa::Arm26 | Isa::Arm32 => {
                let opcode = self.fetch32();
                let text = a32_disasm(opcode, pc, &self.config, self.syntax);
                format!("{pc:08X}\t{opcode:08X}\t{text}")
            }
            Isa::Thumb | Isa::ThumbEe => {
                let hw1 = self.fetch16();
                if hw1 >> 11 >= 0b11101 {
                    let hw2 = self.fetch16();
                    let suffix = self.it_suffix();
                    let text = t32_disasm32(hw1, hw2, pc, &suffix);
                    format!("{pc:08X}\t{hw1:04X} {hw2:04X}\t{text}")
                } else {
                    let suffix = self.it_suffix();
                    let text = t16_disasm(hw1, pc, &suffix, self.isa == Isa::ThumbEe);
                    if let Some(rest) = text.strip_prefix("it") {
                        // reload the tracker from the IT instruction itself
                        let _ = rest;
                        self.it_state = (hw1 & 0xFF) as u8;
                    }
                    format!("{pc:08X}\t{hw1:04X}\t{text}")
                }
            }
            Isa::Jazelle => {
                let opcode = self.fetch8();
                let text = self.j32_parse(opcode, pc);
                format!("{pc:08X}\t{opcode:02X}\t{text}")
            }
            Isa::Arm64 => {
                let opcode = self.fetch32();
                let text = a64_disasm(opcode, pc);
                format!("{pc:08X}\t{opcode:08X}\t{text}")
            }
        }
    }

    /// Condition suffix of the current IT slot, advancing the tracker.
    fn it_suffix(&mut self) -> String {
        if self.it_state & 0xF == 0 {
            return String::new();
        }
        let cond = (self.it_state >> 4) & 0xE;
        let negate = self.it_state & 0x10 != 0;
        let code = (cond | negate as u8) as usize;
        self.it_state = if self.it_state & 0x7 == 0 {
            0
        } else {
            (self.it_state & 0xE0) | ((self.it_state << 1) & 0x1F)
        };
        A32_CONDITION[code].to_string()
    }

    fn j32_parse(&mut self, opcode: u8, pc: u64) -> String {
        j32_disasm(self, opcode, pc)
    }
}

pub fn reg_name(reg: usize) -> String {
    match reg {
        13 => "sp".into(),
        14 => "lr".into(),
        15 => "pc".into(),
        n => format!("r{n}"),
    }
}

fn x_reg(reg: usize, is64: bool, sp: bool) -> String {
    match (reg, is64, sp) {
        (31, true, false) => "xzr".into(),
        (31, false, false) => "wzr".into(),
        (31, true, true) => "sp".into(),
        (31, false, true) => "wsp".into(),
        (n, true, _) => format!("x{n}"),
        (n, false, _) => format!("w{n}"),
    }
}

/// Register list as ranges: {r0-r3,r7,lr}.
pub fn register_list(list: u32) -> String {
    let mut out = String::from("{");
    let mut first = true;
    let mut i = 0;
    while i < 16 {
        if list & (1 << i) != 0 {
            let start = i;
            while i + 1 < 16 && list & (1 << (i + 1)) != 0 {
                i += 1;
            }
            if !first {
                out.push(',');
            }
            first = false;
            if i > start {
                out.push_str(&format!("{}-{}", reg_name(start), reg_name(i)));
            } else {
                out.push_str(&reg_name(start));
            }
        }
        i += 1;
    }
    out.push('}');
    out
}

fn shift_suffix(opcode: u32) -> String {
    if opcode & 0xFF0 == 0 {
        return String::new();
    }
    if opcode & 0xFF0 == 0x060 {
        return ", rrx".into();
    }
    let names = ["lsl", "lsr", "asr", "ror"];
    let kind = names[((opcode >> 5) & 3) as usize];
    if opcode & 0x10 != 0 {
        format!(", {} {}", kind, reg_name(((opcode >> 8) & 0xF) as usize))
    } else {
        let mut amount = (opcode >> 7) & 0x1F;
        if amount == 0 {
            amount = 32; // encoded as zero for the right shifts
        }
        format!(", {kind} #{amount}")
    }
}

fn a32_operand2(opcode: u32) -> String {
    if opcode & 0x0200_0000 != 0 {
        let imm = (opcode & 0xFF).rotate_right(((opcode >> 8) & 0xF) * 2);
        format!("#0x{imm:X}")
    } else {
        format!("{}{}", reg_name((opcode & 0xF) as usize), shift_suffix(opcode))
    }
}

/// The 32-bit ARM printer.
pub fn a32_disasm(opcode: u32, pc: u64, _config: &Configuration, syntax: Syntax) -> String {
    let cond = A32_CONDITION[(opcode >> 28) as usize];
    if opcode >> 28 == 0xF {
        return a32_disasm_unconditional(opcode, pc);
    }
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;
    let s = if opcode & 0x0010_0000 != 0 { "s" } else { "" };

    match (opcode >> 25) & 7 {
        0b000 | 0b001 => {
            if opcode & 0x0FFF_FFF0 == 0x012F_FF10 {
                return format!("bx{cond} {}", reg_name(rm));
            }
            if opcode & 0x0FFF_FFF0 == 0x012F_FF30 {
                return format!("blx{cond} {}", reg_name(rm));
            }
            if opcode & 0x0FFF_FFF0 == 0x012F_FF20 {
                return format!("bxj{cond} {}", reg_name(rm));
            }
            if opcode & 0x0FFF_0FF0 == 0x016F_0F10 {
                return format!("clz{cond} {}, {}", reg_name(rd), reg_name(rm));
            }
            if opcode & 0x0FF0_00F0 == 0x0120_0070 {
                let imm = ((opcode >> 4) & 0xFFF0) | (opcode & 0xF);
                return format!("bkpt #0x{imm:X}");
            }
            if opcode & 0x0FB0_0FFF == 0x0100_0000 && opcode & 0x90 != 0x90 {
                let psr = if opcode & 0x0040_0000 != 0 { "spsr" } else { "cpsr" };
                return format!("mrs{cond} {}, {psr}", reg_name(rd));
            }
            if opcode & 0x0DB0_F000 == 0x0120_F000 && (opcode & 0x0200_0000 != 0 || opcode & 0xFF0 == 0) {
                let psr = if opcode & 0x0040_0000 != 0 { "spsr" } else { "cpsr" };
                let mut fields = String::new();
                for (bit, name) in [(19, 'f'), (18, 's'), (17, 'x'), (16, 'c')] {
                    if opcode & (1 << bit) != 0 {
                        fields.push(name);
                    }
                }
                return format!("msr{cond} {psr}_{fields}, {}", a32_operand2(opcode));
            }
            if opcode & 0x0F90_00F0 == 0x0100_0050 {
                let op = ["qadd", "qsub", "qdadd", "qdsub"][((opcode >> 21) & 3) as usize];
                return format!(
                    "{op}{cond} {}, {}, {}",
                    reg_name(rd),
                    reg_name(rm),
                    reg_name(rn)
                );
            }
            if opcode & 0x0FC0_00F0 == 0x0000_0090 {
                // mul/mla
                let rd16 = ((opcode >> 16) & 0xF) as usize;
                let rs = ((opcode >> 8) & 0xF) as usize;
                return if opcode & 0x0020_0000 != 0 {
                    format!(
                        "mla{cond}{s} {}, {}, {}, {}",
                        reg_name(rd16),
                        reg_name(rm),
                        reg_name(rs),
                        reg_name(rd)
                    )
                } else {
                    format!(
                        "mul{cond}{s} {}, {}, {}",
                        reg_name(rd16),
                        reg_name(rm),
                        reg_name(rs)
                    )
                };
            }
            if opcode & 0x0F80_00F0 == 0x0080_0090 {
                let name = match (opcode >> 21) & 3 {
                    0b00 => "umull",
                    0b01 => "umlal",
                    0b10 => "smull",
                    _ => "smlal",
                };
                let rs = ((opcode >> 8) & 0xF) as usize;
                return format!(
                    "{name}{cond}{s} {}, {}, {}, {}",
                    reg_name(rd),
                    reg_name(rn),
                    reg_name(rm),
                    reg_name(rs)
                );
            }
            if opcode & 0x0FB0_0FF0 == 0x0100_0090 {
                let byte = if opcode & 0x0040_0000 != 0 { "b" } else { "" };
                return format!(
                    "swp{byte}{cond} {}, {}, [{}]",
                    reg_name(rd),
                    reg_name(rm),
                    reg_name(rn)
                );
            }
            if opcode & 0x0F90_00F0 == 0x0190_0090 {
                let size = ["", "d", "b", "h"][((opcode >> 21) & 3) as usize];
                return format!("ldrex{size}{cond} {}, [{}]", reg_name(rd), reg_name(rn));
            }
            if opcode & 0x0F90_00F0 == 0x0180_0090 {
                let size = ["", "d", "b", "h"][((opcode >> 21) & 3) as usize];
                return format!(
                    "strex{size}{cond} {}, {}, [{}]",
                    reg_name(rd),
                    reg_name(rm),
                    reg_name(rn)
                );
            }
            if opcode & 0x0E00_0090 == 0x0000_0090 && opcode & 0x60 != 0 {
                // halfword and signed transfers
                let load = opcode & 0x0010_0000 != 0;
                let kind = match ((opcode >> 5) & 3, load) {
                    (0b01, true) => "ldrh",
                    (0b01, false) => "strh",
                    (0b10, true) => "ldrsb",
                    (0b10, false) => "ldrd",
                    (0b11, true) => "ldrsh",
                    _ => "strd",
                };
                let sign = if opcode & 0x0080_0000 != 0 { "" } else { "-" };
                let addr = if opcode & 0x0040_0000 != 0 {
                    let imm = ((opcode >> 4) & 0xF0) | (opcode & 0xF);
                    if imm == 0 {
                        format!("[{}]", reg_name(rn))
                    } else {
                        format!("[{}, #{sign}0x{imm:X}]", reg_name(rn))
                    }
                } else {
                    format!("[{}, {sign}{}]", reg_name(rn), reg_name(rm))
                };
                return format!("{kind}{cond} {}, {addr}", reg_name(rd));
            }
            if opcode & 0x0FB0_0000 == 0x0300_0000 {
                let imm = ((opcode >> 4) & 0xF000) | (opcode & 0xFFF);
                let name = if opcode & 0x0040_0000 != 0 { "movt" } else { "movw" };
                return format!("{name}{cond} {}, #0x{imm:X}", reg_name(rd));
            }
            // plain data processing
            let names = [
                "and", "eor", "sub", "rsb", "add", "adc", "sbc", "rsc", "tst", "teq", "cmp",
                "cmn", "orr", "mov", "bic", "mvn",
            ];
            let op = ((opcode >> 21) & 0xF) as usize;
            let name = names[op];
            match op {
                0x8..=0xB => {
                    // test ops; the P suffix marks the R15 flag write
                    let p = if rd == 15 { "p" } else { "" };
                    format!("{name}{cond}{p} {}, {}", reg_name(rn), a32_operand2(opcode))
                }
                0xD | 0xF => format!("{name}{cond}{s} {}, {}", reg_name(rd), a32_operand2(opcode)),
                _ => format!(
                    "{name}{cond}{s} {}, {}, {}",
                    reg_name(rd),
                    reg_name(rn),
                    a32_operand2(opcode)
                ),
            }
        }
        0b010 | 0b011 => {
            if (opcode >> 25) & 7 == 0b011 && opcode & 0x10 != 0 {
                return a32_disasm_media(opcode, cond);
            }
            let load = opcode & 0x0010_0000 != 0;
            let byte = if opcode & 0x0040_0000 != 0 { "b" } else { "" };
            let name = if load { "ldr" } else { "str" };
            let t = if opcode & 0x0100_0000 == 0 && opcode & 0x0020_0000 != 0 { "t" } else { "" };
            let sign = if opcode & 0x0080_0000 != 0 { "" } else { "-" };
            let wb = if opcode & 0x0120_0000 == 0x0120_0000 { "!" } else { "" };
            let addr = if opcode & 0x0200_0000 == 0 {
                let imm = opcode & 0xFFF;
                if opcode & 0x0100_0000 != 0 {
                    if imm == 0 {
                        format!("[{}]{wb}", reg_name(rn))
                    } else {
                        format!("[{}, #{sign}0x{imm:X}]{wb}", reg_name(rn))
                    }
                } else {
                    format!("[{}], #{sign}0x{imm:X}", reg_name(rn))
                }
            } else if opcode & 0x0100_0000 != 0 {
                format!(
                    "[{}, {sign}{}{}]{wb}",
                    reg_name(rn),
                    reg_name(rm),
                    shift_suffix(opcode & !0x10)
                )
            } else {
                format!(
                    "[{}], {sign}{}{}",
                    reg_name(rn),
                    reg_name(rm),
                    shift_suffix(opcode & !0x10)
                )
            };
            format!("{name}{byte}{t}{cond} {}, {addr}", reg_name(rd))
        }
        0b100 => {
            let load = opcode & 0x0010_0000 != 0;
            let mode = match (opcode >> 23) & 3 {
                0b00 => "da",
                0b01 => "ia",
                0b10 => "db",
                _ => "ib",
            };
            let name = if load { "ldm" } else { "stm" };
            let wb = if opcode & 0x0020_0000 != 0 { "!" } else { "" };
            let user = if opcode & 0x0040_0000 != 0 { "^" } else { "" };
            format!(
                "{name}{cond}{mode} {}{wb}, {}{user}",
                reg_name(rn),
                register_list(opcode & 0xFFFF)
            )
        }
        0b101 => {
            let link = if opcode & 0x0100_0000 != 0 { "l" } else { "" };
            let offset = ((opcode & 0x00FF_FFFF) << 8) as i32 >> 6;
            let target = pc.wrapping_add(8).wrapping_add(offset as i64 as u64);
            format!("b{link}{cond} 0x{target:X}")
        }
        0b110 => {
            let cp = (opcode >> 8) & 0xF;
            if opcode & 0x0FE0_0000 == 0x0C40_0000 {
                return format!(
                    "mcrr{cond} p{cp}, #{}, {}, {}, c{}",
                    (opcode >> 4) & 0xF,
                    reg_name(rd),
                    reg_name(rn),
                    opcode & 0xF
                );
            }
            if opcode & 0x0FE0_0000 == 0x0C50_0000 {
                return format!(
                    "mrrc{cond} p{cp}, #{}, {}, {}, c{}",
                    (opcode >> 4) & 0xF,
                    reg_name(rd),
                    reg_name(rn),
                    opcode & 0xF
                );
            }
            let name = if opcode & 0x0010_0000 != 0 { "ldc" } else { "stc" };
            let sign = if opcode & 0x0080_0000 != 0 { "" } else { "-" };
            format!(
                "{name}{cond} p{cp}, c{}, [{}, #{sign}0x{:X}]",
                rd,
                reg_name(rn),
                (opcode & 0xFF) << 2
            )
        }
        _ => {
            if opcode & 0x0100_0000 != 0 {
                let name = if syntax == Syntax::Divided { "swi" } else { "svc" };
                return format!("{name}{cond} #0x{:06X}", opcode & 0x00FF_FFFF);
            }
            let cp = (opcode >> 8) & 0xF;
            if opcode & 0x10 == 0 {
                format!(
                    "cdp{cond} p{cp}, #{}, c{}, c{}, c{}, #{}",
                    (opcode >> 20) & 0xF,
                    rd,
                    rn,
                    opcode & 0xF,
                    (opcode >> 5) & 7
                )
            } else {
                let name = if opcode & 0x0010_0000 != 0 { "mrc" } else { "mcr" };
                format!(
                    "{name}{cond} p{cp}, #{}, {}, c{}, c{}, #{}",
                    (opcode >> 21) & 7,
                    reg_name(rd),
                    rn,
                    opcode & 0xF,
                    (opcode >> 5) & 7
                )
            }
        }
    }
}

fn a32_disasm_media(opcode: u32, cond: &str) -> String {
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;
    match (opcode >> 20) & 0x1F {
        0x01 | 0x02 | 0x03 | 0x05 | 0x06 | 0x07 => {
            let prefix = match (opcode >> 20) & 7 {
                1 => "s",
                2 => "q",
                3 => "sh",
                5 => "u",
                6 => "uq",
                _ => "uh",
            };
            let op = match (opcode >> 5) & 7 {
                0b000 => "add16",
                0b011 => "sub16",
                0b100 => "add8",
                0b111 => "sub8",
                _ => return format!(".word 0x{opcode:08X}"),
            };
            format!(
                "{prefix}{op}{cond} {}, {}, {}",
                reg_name(rd),
                reg_name(rn),
                reg_name(rm)
            )
        }
        0x0A | 0x0B | 0x0E | 0x0F => {
            let unsigned = opcode & 0x0040_0000 != 0;
            if (opcode >> 4) & 0xF == 0x7 {
                let half = (opcode >> 20) & 1 != 0;
                let base = match (unsigned, half) {
                    (false, false) => "sxtb",
                    (false, true) => "sxth",
                    (true, false) => "uxtb",
                    (true, true) => "uxth",
                };
                let rotate = ((opcode >> 10) & 3) * 8;
                let rot = if rotate != 0 { format!(", ror #{rotate}") } else { String::new() };
                return if rn == 0xF {
                    format!("{base}{cond} {}, {}{rot}", reg_name(rd), reg_name(rm))
                } else {
                    format!(
                        "{}a{}{cond} {}, {}, {}{rot}",
                        &base[..3],
                        &base[3..],
                        reg_name(rd),
                        reg_name(rn),
                        reg_name(rm)
                    )
                };
            }
            if (opcode >> 4) & 0xF == 0x3 && (opcode >> 20) & 0x1F == 0x0B {
                return format!("rev{cond} {}, {}", reg_name(rd), reg_name(rm));
            }
            if (opcode >> 4) & 0xF == 0xB && (opcode >> 20) & 0x1F == 0x0B {
                return format!("rev16{cond} {}, {}", reg_name(rd), reg_name(rm));
            }
            if (opcode >> 4) & 0xF == 0x3 && (opcode >> 20) & 0x1F == 0x0F {
                return format!("rbit{cond} {}, {}", reg_name(rd), reg_name(rm));
            }
            if (opcode >> 4) & 0xF == 0xB && (opcode >> 20) & 0x1F == 0x0F {
                return format!("revsh{cond} {}, {}", reg_name(rd), reg_name(rm));
            }
            if (opcode >> 4) & 3 == 0b01 {
                let name = if unsigned { "usat" } else { "ssat" };
                let sat = (opcode >> 16) & 0x1F;
                let sat = if unsigned { sat } else { sat + 1 };
                return format!(
                    "{name}{cond} {}, #{sat}, {}{}",
                    reg_name(rd),
                    reg_name(rm),
                    shift_suffix(opcode & !0x10)
                );
            }
            format!(".word 0x{opcode:08X}")
        }
        0x08 if (opcode >> 4) & 0xF == 0xB => {
            format!("sel{cond} {}, {}, {}", reg_name(rd), reg_name(rn), reg_name(rm))
        }
        0x11 | 0x13 if (opcode >> 4) & 0xF == 0x1 => {
            let name = if opcode & 0x0040_0000 != 0 { "udiv" } else { "sdiv" };
            format!(
                "{name}{cond} {}, {}, {}",
                reg_name(rn),
                reg_name(rm),
                reg_name(((opcode >> 8) & 0xF) as usize)
            )
        }
        0x1A | 0x1B | 0x1E | 0x1F if (opcode >> 4) & 7 == 0b101 => {
            let name = if opcode & 0x0040_0000 != 0 { "ubfx" } else { "sbfx" };
            let lsb = (opcode >> 7) & 0x1F;
            let width = ((opcode >> 16) & 0x1F) + 1;
            format!("{name}{cond} {}, {}, #{lsb}, #{width}", reg_name(rd), reg_name(rm))
        }
        0x1C | 0x1D if (opcode >> 4) & 7 == 0b001 => {
            let lsb = (opcode >> 7) & 0x1F;
            let msb = (opcode >> 16) & 0x1F;
            if rm == 0xF {
                format!("bfc{cond} {}, #{lsb}, #{}", reg_name(rd), msb - lsb + 1)
            } else {
                format!(
                    "bfi{cond} {}, {}, #{lsb}, #{}",
                    reg_name(rd),
                    reg_name(rm),
                    msb - lsb + 1
                )
            }
        }
        _ => format!(".word 0x{opcode:08X}"),
    }
}

fn a32_disasm_unconditional(opcode: u32, pc: u64) -> String {
    if opcode & 0x0E00_0000 == 0x0A00_0000 {
        let mut offset = (((opcode & 0x00FF_FFFF) << 8) as i32 >> 6) as i64;
        offset |= ((opcode >> 23) & 2) as i64;
        let target = pc.wrapping_add(8).wrapping_add(offset as u64);
        return format!("blx 0x{target:X}");
    }
    if opcode & 0x0FD0_F000 == 0x0550_F000 {
        return "pld".into();
    }
    if opcode & 0x0FFF_FDFF == 0x0101_0000 {
        return format!("setend {}", if opcode & 0x200 != 0 { "be" } else { "le" });
    }
    if opcode & 0x0E50_0000 == 0x0840_0000 {
        return format!("srs #{}", opcode & 0xF);
    }
    if opcode & 0x0E50_0000 == 0x0810_0000 {
        return format!("rfe {}", reg_name(((opcode >> 16) & 0xF) as usize));
    }
    format!(".word 0x{opcode:08X}")
}

/// The 16-bit Thumb printer; `cond` carries the IT suffix.
pub fn t16_disasm(hw: u16, pc: u64, cond: &str, thumbee: bool) -> String {
    let rd = (hw & 7) as usize;
    let rm = ((hw >> 3) & 7) as usize;
    match hw >> 12 {
        0b0000 | 0b0001 => {
            if (hw >> 11) & 3 == 0b11 {
                let name = if hw & 0x0200 != 0 { "sub" } else { "add" };
                let s = if cond.is_empty() { "s" } else { "" };
                return if hw & 0x0400 != 0 {
                    format!("{name}{cond}{s} r{rd}, r{rm}, #{}", (hw >> 6) & 7)
                } else {
                    format!("{name}{cond}{s} r{rd}, r{rm}, r{}", (hw >> 6) & 7)
                };
            }
            let name = ["lsl", "lsr", "asr"][((hw >> 11) & 3) as usize];
            let s = if cond.is_empty() { "s" } else { "" };
            format!("{name}{cond}{s} r{rd}, r{rm}, #{}", (hw >> 6) & 0x1F)
        }
        0b0010 | 0b0011 => {
            let name = ["mov", "cmp", "add", "sub"][((hw >> 11) & 3) as usize];
            let s = if (hw >> 11) & 3 == 1 || !cond.is_empty() { "" } else { "s" };
            format!("{name}{cond}{s} r{}, #0x{:X}", (hw >> 8) & 7, hw & 0xFF)
        }
        0b0100 => match (hw >> 10) & 3 {
            0b00 => {
                let names = [
                    "and", "eor", "lsl", "lsr", "asr", "adc", "sbc", "ror", "tst", "neg", "cmp",
                    "cmn", "orr", "mul", "bic", "mvn",
                ];
                let name = names[((hw >> 6) & 0xF) as usize];
                let s = if matches!((hw >> 6) & 0xF, 0x8 | 0xA | 0xB) || !cond.is_empty() {
                    ""
                } else {
                    "s"
                };
                format!("{name}{cond}{s} r{rd}, r{rm}")
            }
            0b01 => {
                let full_rd = rd | ((hw as usize >> 4) & 8);
                let full_rm = ((hw >> 3) & 0xF) as usize;
                match (hw >> 8) & 3 {
                    0b00 => format!("add{cond} {}, {}", reg_name(full_rd), reg_name(full_rm)),
                    0b01 => format!("cmp{cond} {}, {}", reg_name(full_rd), reg_name(full_rm)),
                    0b10 => format!("mov{cond} {}, {}", reg_name(full_rd), reg_name(full_rm)),
                    _ => {
                        if hw & 0x80 != 0 {
                            format!("blx{cond} {}", reg_name(full_rm))
                        } else {
                            format!("bx{cond} {}", reg_name(full_rm))
                        }
                    }
                }
            }
            _ => {
                let target = (pc & !3).wrapping_add(4).wrapping_add((((hw & 0xFF) as u64) << 2) as u64);
                format!("ldr{cond} r{}, [pc, #0x{:X}] ; 0x{target:X}", (hw >> 8) & 7, ((hw & 0xFF) as u32) << 2)
            }
        },
        0b0101 => {
            let names = ["str", "strh", "strb", "ldrsb", "ldr", "ldrh", "ldrb", "ldrsh"];
            let name = names[((hw >> 9) & 7) as usize];
            format!("{name}{cond} r{rd}, [r{rm}, r{}]", (hw >> 6) & 7)
        }
        0b0110 | 0b0111 | 0b1000 => {
            let (name, scale) = match hw >> 11 {
                0b01100 => ("str", 2),
                0b01101 => ("ldr", 2),
                0b01110 => ("strb", 0),
                0b01111 => ("ldrb", 0),
                0b10000 => ("strh", 1),
                _ => ("ldrh", 1),
            };
            let offset = (((hw >> 6) & 0x1F) as u32) << scale;
            if offset == 0 {
                format!("{name}{cond} r{rd}, [r{rm}]")
            } else {
                format!("{name}{cond} r{rd}, [r{rm}, #0x{offset:X}]")
            }
        }
        0b1001 => {
            let name = if hw & 0x0800 != 0 { "ldr" } else { "str" };
            format!("{name}{cond} r{}, [sp, #0x{:X}]", (hw >> 8) & 7, ((hw & 0xFF) as u32) << 2)
        }
        0b1010 => {
            let base = if hw & 0x0800 != 0 { "sp" } else { "pc" };
            format!("add{cond} r{}, {base}, #0x{:X}", (hw >> 8) & 7, ((hw & 0xFF) as u32) << 2)
        }
        0b1011 => t16_disasm_misc(hw, pc, cond, thumbee),
        0b1100 => {
            if thumbee && hw >> 8 == 0xCA {
                let full_rn = rd | ((hw as usize >> 4) & 8);
                return format!("chka{cond} {}, {}", reg_name(full_rn), reg_name(((hw >> 3) & 0xF) as usize));
            }
            let name = if hw & 0x0800 != 0 { "ldmia" } else { "stmia" };
            format!(
                "{name}{cond} r{}!, {}",
                (hw >> 8) & 7,
                register_list((hw & 0xFF) as u32)
            )
        }
        0b1101 => {
            let c = (hw >> 8) & 0xF;
            match c {
                0xF => format!("svc{cond} #0x{:02X}", hw & 0xFF),
                0xE => format!("udf #0x{:02X}", hw & 0xFF),
                _ => {
                    let offset = ((hw & 0xFF) as i8 as i64) << 1;
                    let target = pc.wrapping_add(4).wrapping_add(offset as u64);
                    format!("b{} 0x{target:X}", A32_CONDITION[c as usize])
                }
            }
        }
        _ => {
            let offset = (((hw & 0x7FF) << 5) as i16 as i64) >> 4;
            let target = pc.wrapping_add(4).wrapping_add(offset as u64);
            format!("b{cond} 0x{target:X}")
        }
    }
}

fn t16_disasm_misc(hw: u16, pc: u64, cond: &str, _thumbee: bool) -> String {
    match (hw >> 8) & 0xF {
        0x0 => {
            let name = if hw & 0x80 != 0 { "sub" } else { "add" };
            format!("{name}{cond} sp, #0x{:X}", ((hw & 0x7F) as u32) << 2)
        }
        0x1 | 0x3 | 0x9 | 0xB => {
            let name = if hw & 0x0800 != 0 { "cbnz" } else { "cbz" };
            let offset = (((hw >> 9) & 1) << 6 | ((hw >> 3) & 0x1F) << 1) as u64;
            format!("{name} r{}, 0x{:X}", hw & 7, pc.wrapping_add(4).wrapping_add(offset))
        }
        0x2 => {
            let name = ["sxth", "sxtb", "uxth", "uxtb"][((hw >> 6) & 3) as usize];
            format!("{name}{cond} r{}, r{}", hw & 7, (hw >> 3) & 7)
        }
        0x4 | 0x5 => {
            let mut list = (hw & 0xFF) as u32;
            if hw & 0x0100 != 0 {
                list |= 1 << 14;
            }
            format!("push{cond} {}", register_list(list))
        }
        0x6 => {
            if (hw >> 4) & 0xF == 0x5 {
                format!("setend {}", if hw & 8 != 0 { "be" } else { "le" })
            } else {
                let enable = hw & 0x10 == 0;
                let mut flags = String::new();
                if hw & 4 != 0 {
                    flags.push('a');
                }
                if hw & 2 != 0 {
                    flags.push('i');
                }
                if hw & 1 != 0 {
                    flags.push('f');
                }
                format!("cps{} {flags}", if enable { "ie" } else { "id" })
            }
        }
        0xA => {
            let name = match (hw >> 6) & 3 {
                0b00 => "rev",
                0b01 => "rev16",
                0b11 => "revsh",
                _ => return format!(".hword 0x{hw:04X}"),
            };
            format!("{name}{cond} r{}, r{}", hw & 7, (hw >> 3) & 7)
        }
        0xC | 0xD => {
            let mut list = (hw & 0xFF) as u32;
            if hw & 0x0100 != 0 {
                list |= 1 << 15;
            }
            format!("pop{cond} {}", register_list(list))
        }
        0xE => format!("bkpt #0x{:02X}", hw & 0xFF),
        0xF => {
            if hw & 0xF == 0 {
                match (hw >> 4) & 0xF {
                    0 => "nop".into(),
                    1 => "yield".into(),
                    2 => "wfe".into(),
                    3 => "wfi".into(),
                    4 => "sev".into(),
                    _ => format!(".hword 0x{hw:04X}"),
                }
            } else {
                let first_cond = (hw >> 4) & 0xF;
                let mut suffix = String::new();
                let mut mask = hw & 0xF;
                while mask & 7 != 0 {
                    suffix.push(if (mask >> 3) & 1 == first_cond & 1 { 't' } else { 'e' });
                    mask = (mask << 1) & 0xF;
                }
                format!("it{suffix} {}", A32_CONDITION[first_cond as usize])
            }
        }
        _ => format!(".hword 0x{hw:04X}"),
    }
}

/// The 32-bit Thumb-2 printer (a representative subset).
pub fn t32_disasm32(hw1: u16, hw2: u16, pc: u64, cond: &str) -> String {
    let opcode = (hw1 as u32) << 16 | hw2 as u32;
    // bl/blx
    if hw1 >> 11 == 0b11110 && hw2 & 0xC000 == 0xC000 {
        let s = ((hw1 >> 10) & 1) as u32;
        let j1 = ((hw2 >> 13) & 1) as u32;
        let j2 = ((hw2 >> 11) & 1) as u32;
        let i1 = !(j1 ^ s) & 1;
        let i2 = !(j2 ^ s) & 1;
        let imm = (s << 24 | i1 << 23 | i2 << 22 | ((hw1 as u32 & 0x3FF) << 12) | ((hw2 as u32 & 0x7FF) << 1)) << 7;
        let offset = (imm as i32 >> 7) as i64;
        let target = pc.wrapping_add(4).wrapping_add(offset as u64);
        let name = if hw2 & 0x1000 != 0 { "bl" } else { "blx" };
        return format!("{name} 0x{target:X}");
    }
    if hw1 & 0xFBF0 == 0xF240 && hw2 & 0x8000 == 0 {
        let imm = (((hw1 as u32) & 0xF) << 12)
            | (((hw1 as u32) & 0x0400) << 1)
            | (((hw2 as u32) & 0x7000) >> 4)
            | ((hw2 as u32) & 0xFF);
        return format!("movw{cond} r{}, #0x{imm:X}", (hw2 >> 8) & 0xF);
    }
    if hw1 & 0xFBF0 == 0xF2C0 && hw2 & 0x8000 == 0 {
        let imm = (((hw1 as u32) & 0xF) << 12)
            | (((hw1 as u32) & 0x0400) << 1)
            | (((hw2 as u32) & 0x7000) >> 4)
            | ((hw2 as u32) & 0xFF);
        return format!("movt{cond} r{}, #0x{imm:X}", (hw2 >> 8) & 0xF);
    }
    if hw1 & 0xFE00 == 0xE800 || hw1 & 0xFE00 == 0xE900 {
        let load = hw1 & 0x10 != 0;
        let db = hw1 & 0x0100 != 0;
        let name = match (load, db) {
            (true, false) => "ldmia.w",
            (false, false) => "stmia.w",
            (true, true) => "ldmdb",
            (false, true) => "stmdb",
        };
        let wb = if hw1 & 0x20 != 0 { "!" } else { "" };
        return format!(
            "{name}{cond} {}{wb}, {}",
            reg_name((hw1 & 0xF) as usize),
            register_list(hw2 as u32)
        );
    }
    if hw1 & 0xFF80 == 0xF880 || hw1 & 0xFF80 == 0xF800 || hw1 & 0xFF00 == 0xF900 {
        // load/store single (subset: imm12 form)
        if hw1 & 0x80 != 0 {
            let size = (hw1 >> 5) & 3;
            let load = hw1 & 0x10 != 0;
            let signed = hw1 & 0x0100 != 0;
            let name = match (load, size, signed) {
                (false, 0, _) => "strb.w",
                (false, 1, _) => "strh.w",
                (false, _, _) => "str.w",
                (true, 0, false) => "ldrb.w",
                (true, 0, true) => "ldrsb.w",
                (true, 1, false) => "ldrh.w",
                (true, 1, true) => "ldrsh.w",
                (true, _, _) => "ldr.w",
            };
            let offset = hw2 & 0xFFF;
            return if offset == 0 {
                format!("{name}{cond} r{}, [{}]", (hw2 >> 12) & 0xF, reg_name((hw1 & 0xF) as usize))
            } else {
                format!(
                    "{name}{cond} r{}, [{}, #0x{offset:X}]",
                    (hw2 >> 12) & 0xF,
                    reg_name((hw1 & 0xF) as usize)
                )
            };
        }
    }
    if hw1 & 0xFBE0 == 0xF000 && hw2 & 0x8000 == 0 {
        // dp modified immediate (subset of spellings)
        let names = [
            "and", "bic", "orr", "orn", "eor", "", "", "", "add", "", "adc", "sbc", "", "sub",
            "rsb", "",
        ];
        let op = ((hw1 >> 5) & 0xF) as usize;
        let name = names.get(op).copied().unwrap_or("");
        if !name.is_empty() {
            let s = if hw1 & 0x10 != 0 { "s" } else { "" };
            let imm = armemu::exec::t32::t32_get_immediate_operand(hw1, hw2);
            return format!(
                "{name}{cond}{s}.w r{}, {}, #0x{imm:X}",
                (hw2 >> 8) & 0xF,
                reg_name((hw1 & 0xF) as usize)
            );
        }
    }
    format!(".word 0x{opcode:08X}")
}

/// The A64 printer (a representative subset).
pub fn a64_disasm(opcode: u32, pc: u64) -> String {
    let is64 = opcode & 0x8000_0000 != 0;
    let rd = (opcode & 0x1F) as usize;
    let rn = ((opcode >> 5) & 0x1F) as usize;
    let rm = ((opcode >> 16) & 0x1F) as usize;

    if opcode & 0x7C00_0000 == 0x1400_0000 {
        let offset = (((opcode & 0x03FF_FFFF) << 6) as i32 >> 4) as i64;
        let target = pc.wrapping_add(offset as u64);
        let name = if opcode & 0x8000_0000 != 0 { "bl" } else { "b" };
        return format!("{name} 0x{target:X}");
    }
    if opcode & 0xFF00_0010 == 0x5400_0000 {
        let offset = ((((opcode >> 5) & 0x7_FFFF) << 13) as i32 >> 11) as i64;
        let target = pc.wrapping_add(offset as u64);
        let cond = A32_CONDITION[(opcode & 0xF) as usize];
        let cond = if cond.is_empty() { "al" } else { cond };
        return format!("b.{cond} 0x{target:X}");
    }
    if opcode & 0x7E00_0000 == 0x3400_0000 {
        let offset = ((((opcode >> 5) & 0x7_FFFF) << 13) as i32 >> 11) as i64;
        let target = pc.wrapping_add(offset as u64);
        let name = if opcode & 0x0100_0000 != 0 { "cbnz" } else { "cbz" };
        return format!("{name} {}, 0x{target:X}", x_reg(rd, is64, false));
    }
    if opcode & 0xFFFF_FC1F == 0xD65F_0000 {
        return format!("ret {}", x_reg(rn, true, false));
    }
    if opcode & 0xFFFF_FC1F == 0xD61F_0000 {
        return format!("br {}", x_reg(rn, true, false));
    }
    if opcode & 0xFFFF_FC1F == 0xD63F_0000 {
        return format!("blr {}", x_reg(rn, true, false));
    }
    if opcode == 0xD503_201F {
        return "nop".into();
    }
    if opcode == 0xD69F_03E0 {
        return "eret".into();
    }
    if opcode & 0xFF00_001F == 0xD400_0001 {
        return format!("svc #0x{:X}", (opcode >> 5) & 0xFFFF);
    }
    if opcode & 0xFFE0_001F == 0xD420_0000 {
        return format!("brk #0x{:X}", (opcode >> 5) & 0xFFFF);
    }
    if opcode & 0x1F80_0000 == 0x1280_0000 || opcode & 0x1F80_0000 == 0x5280_0000
        || opcode & 0x1F80_0000 == 0x7280_0000
    {
        let name = match (opcode >> 29) & 3 {
            0b00 => "movn",
            0b10 => "movz",
            _ => "movk",
        };
        let shift = ((opcode >> 21) & 3) * 16;
        let imm = (opcode >> 5) & 0xFFFF;
        return if shift == 0 {
            format!("{name} {}, #0x{imm:X}", x_reg(rd, is64, false))
        } else {
            format!("{name} {}, #0x{imm:X}, lsl #{shift}", x_reg(rd, is64, false))
        };
    }
    if opcode & 0x1F00_0000 == 0x1100_0000 {
        let sub = opcode & 0x4000_0000 != 0;
        let s = opcode & 0x2000_0000 != 0;
        let imm = (opcode >> 10) & 0xFFF;
        let shift = if opcode & 0x0040_0000 != 0 { ", lsl #12" } else { "" };
        let name = match (sub, s) {
            (false, false) => "add",
            (false, true) => "adds",
            (true, false) => "sub",
            (true, true) => "subs",
        };
        return format!(
            "{name} {}, {}, #0x{imm:X}{shift}",
            x_reg(rd, is64, !s),
            x_reg(rn, is64, true)
        );
    }
    if opcode & 0x1F80_0000 == 0x1200_0000 || opcode & 0x1F80_0000 == 0x3200_0000
        || opcode & 0x1F80_0000 == 0x5200_0000 || opcode & 0x1F80_0000 == 0x7200_0000
    {
        let name = ["and", "orr", "eor", "ands"][((opcode >> 29) & 3) as usize];
        let mask = if is64 {
            armemu::alu::a64_bitmask64(opcode)
        } else {
            armemu::alu::a64_bitmask32(opcode) as u64
        };
        return format!(
            "{name} {}, {}, #0x{mask:X}",
            x_reg(rd, is64, (opcode >> 29) & 3 != 3),
            x_reg(rn, is64, false)
        );
    }
    if opcode & 0x3B00_0000 == 0x3900_0000 {
        let size = opcode >> 30;
        let load = opcode & 0x0040_0000 != 0;
        let name = match (load, size) {
            (false, 0) => "strb",
            (false, 1) => "strh",
            (false, _) => "str",
            (true, 0) => "ldrb",
            (true, 1) => "ldrh",
            (true, _) => "ldr",
        };
        let wide = size == 3;
        let offset = ((opcode >> 10) & 0xFFF) << size;
        return if offset == 0 {
            format!("{name} {}, [{}]", x_reg(rd, wide, false), x_reg(rn, true, true))
        } else {
            format!(
                "{name} {}, [{}, #0x{offset:X}]",
                x_reg(rd, wide, false),
                x_reg(rn, true, true)
            )
        };
    }
    if opcode & 0x3A00_0000 == 0x2800_0000 {
        let load = opcode & 0x0040_0000 != 0;
        let name = if load { "ldp" } else { "stp" };
        let wide = opcode >> 30 == 0b10;
        let scale = if wide { 8i64 } else { 4 };
        let offset = (((opcode >> 15) & 0x7F) << 25) as i32 as i64 >> 25;
        let offset = offset * scale;
        let rt2 = ((opcode >> 10) & 0x1F) as usize;
        let mode = (opcode >> 23) & 3;
        let addr = match mode {
            0b01 => format!("[{}], #{offset}", x_reg(rn, true, true)),
            0b11 => format!("[{}, #{offset}]!", x_reg(rn, true, true)),
            _ => format!("[{}, #{offset}]", x_reg(rn, true, true)),
        };
        return format!(
            "{name} {}, {}, {addr}",
            x_reg(rd, wide, false),
            x_reg(rt2, wide, false)
        );
    }
    if opcode & 0x1F20_0000 == 0x0B00_0000 {
        let sub = opcode & 0x4000_0000 != 0;
        let s = opcode & 0x2000_0000 != 0;
        let name = match (sub, s) {
            (false, false) => "add",
            (false, true) => "adds",
            (true, false) => "sub",
            (true, true) => "subs",
        };
        let amount = (opcode >> 10) & 0x3F;
        let kind = ["lsl", "lsr", "asr", "ror"][((opcode >> 22) & 3) as usize];
        let shift = if amount == 0 { String::new() } else { format!(", {kind} #{amount}") };
        return format!(
            "{name} {}, {}, {}{shift}",
            x_reg(rd, is64, false),
            x_reg(rn, is64, false),
            x_reg(rm, is64, false)
        );
    }
    if opcode & 0x1F00_0000 == 0x0A00_0000 {
        let negate = opcode & 0x0020_0000 != 0;
        let name = match ((opcode >> 29) & 3, negate) {
            (0b00, false) => "and",
            (0b00, true) => "bic",
            (0b01, false) => "orr",
            (0b01, true) => "orn",
            (0b10, false) => "eor",
            (0b10, true) => "eon",
            (_, false) => "ands",
            _ => "bics",
        };
        let amount = (opcode >> 10) & 0x3F;
        let kind = ["lsl", "lsr", "asr", "ror"][((opcode >> 22) & 3) as usize];
        let shift = if amount == 0 { String::new() } else { format!(", {kind} #{amount}") };
        return format!(
            "{name} {}, {}, {}{shift}",
            x_reg(rd, is64, false),
            x_reg(rn, is64, false),
            x_reg(rm, is64, false)
        );
    }
    format!(".word 0x{opcode:08X}")
}

/// JVM opcode mnemonics for the Jazelle printer.
#[rustfmt::skip]
pub const J32_MNEMONICS: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3",
    "iconst_4", "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2",
    "dconst_0", "dconst_1", "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload",
    "fload", "dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0",
    "lload_1", "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0",
    "dload_1", "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload",
    "laload", "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore",
    "fstore", "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0",
    "lstore_1", "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3",
    "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2",
    "astore_3", "iastore", "lastore", "fastore", "dastore", "aastore", "bastore", "castore",
    "sastore", "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap",
    "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul", "lmul", "fmul",
    "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg", "lneg",
    "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land", "ior",
    "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l",
    "f2d", "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl",
    "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne",
    "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto",
    "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn",
    "areturn", "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual",
    "invokespecial", "invokestatic", "invokeinterface", "invokedynamic", "new", "newarray",
    "anewarray", "arraylength", "athrow", "checkcast", "instanceof", "monitorenter",
    "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull", "goto_w", "jsr_w",
];

fn j32_disasm(dis: &mut Disassembler<'_>, opcode: u8, pc: u64) -> String {
    let name = J32_MNEMONICS
        .get(opcode as usize)
        .copied()
        .unwrap_or(".byte");
    match opcode {
        0x10 | 0x12 | 0x15..=0x19 | 0xA9 | 0xBC => {
            let operand = dis.fetch8();
            if opcode == 0xBC {
                let kind = match operand {
                    4 => "boolean",
                    5 => "char",
                    6 => "float",
                    7 => "double",
                    8 => "byte",
                    9 => "short",
                    10 => "int",
                    11 => "long",
                    _ => "?",
                };
                format!("{name} {kind}")
            } else {
                format!("{name} {}", operand as i8)
            }
        }
        0x11 => {
            let operand = dis.fetch16be() as i16;
            format!("{name} {operand}")
        }
        0x13 | 0x14 | 0xB2..=0xB8 | 0xBB | 0xBD | 0xC0 | 0xC1 => {
            let index = dis.fetch16be();
            format!("{name} #{index}")
        }
        0x84 => {
            let index = dis.fetch8();
            let delta = dis.fetch8() as i8;
            format!("{name} {index}, {delta}")
        }
        0x99..=0xA8 | 0xC6 | 0xC7 => {
            let offset = dis.fetch16be() as i16 as i64;
            format!("{name} 0x{:X}", pc.wrapping_add(offset as u64))
        }
        0xAA => {
            while dis.pc & 3 != 0 {
                dis.fetch8();
            }
            let default = dis.fetch32be() as i32;
            let low = dis.fetch32be() as i32;
            let high = dis.fetch32be() as i32;
            let mut text = format!(
                "{name} default 0x{:X}, {low}..{high}",
                pc.wrapping_add(default as i64 as u64)
            );
            for _ in low..=high {
                let offset = dis.fetch32be() as i32;
                text.push_str(&format!(", 0x{:X}", pc.wrapping_add(offset as i64 as u64)));
            }
            text
        }
        0xAB => {
            while dis.pc & 3 != 0 {
                dis.fetch8();
            }
            let default = dis.fetch32be() as i32;
            let npairs = dis.fetch32be() as i32;
            let mut text = format!(
                "{name} default 0x{:X}",
                pc.wrapping_add(default as i64 as u64)
            );
            for _ in 0..npairs {
                let key = dis.fetch32be() as i32;
                let offset = dis.fetch32be() as i32;
                text.push_str(&format!(
                    ", {key}: 0x{:X}",
                    pc.wrapping_add(offset as i64 as u64)
                ));
            }
            text
        }
        0xB9 | 0xBA => {
            let index = dis.fetch16be();
            dis.fetch16();
            format!("{name} #{index}")
        }
        0xC4 => {
            let wide_op = dis.fetch8();
            let index = dis.fetch16be();
            let wide_name = J32_MNEMONICS.get(wide_op as usize).copied().unwrap_or("?");
            if wide_op == 0x84 {
                let delta = dis.fetch16be() as i16;
                format!("wide {wide_name} {index}, {delta}")
            } else {
                format!("wide {wide_name} {index}")
            }
        }
        0xC5 => {
            let index = dis.fetch16be();
            let dims = dis.fetch8();
            format!("{name} #{index}, {dims}")
        }
        0xC8 | 0xC9 => {
            let offset = dis.fetch32be() as i32 as i64;
            format!("{name} 0x{:X}", pc.wrapping_add(offset as u64))
        }
        0xCA => "breakpoint".into(),
        0xFE => {
            match dis.fetch8() {
                0x00 => "ret_from_jazelle".into(),
                0x01 => "swi".into(),
                sub => format!(".byte 0xFE, 0x{sub:02X}"),
            }
        }
        0xFF => "bkpt #0".into(),
        _ if (opcode as usize) < J32_MNEMONICS.len() => name.to_string(),
        _ => format!(".byte 0x{opcode:02X}"),
    }
}

/// Human description of a resolved configuration, shown before a run.
pub fn isa_display(config: &Configuration, isa: Isa, syntax: Syntax, disasm: bool, endian: armemu::Endian) -> String {
    let mut out = String::from("Instruction set: ");
    match isa {
        Isa::Thumb => {
            out.push_str(if config.features.contains(Features::THUMB2) { "Thumb-2" } else { "Thumb" });
        }
        other => out.push_str(other.name()),
    }
    if isa != Isa::Jazelle {
        let version = match config.version {
            Version::V1 => "ARMv1",
            Version::V2 => "ARMv2",
            Version::V3 => "ARMv3",
            Version::V4 => "ARMv4",
            Version::V5 => "ARMv5",
            Version::V6 => "ARMv6",
            Version::V7 => "ARMv7",
            Version::V8 => "ARMv8",
            Version::V8_1 => "ARMv8.1",
            Version::V8_2 => "ARMv8.2",
            Version::V8_3 => "ARMv8.3",
            Version::V9 => "ARMv9",
        };
        out.push_str(&format!(", version: {version}"));
        if config.features.contains(Features::FPA) {
            out.push_str(", FPA");
        } else if config.features.contains(Features::VFP) {
            if let Some(fp) = config.fp_version {
                out.push_str(match fp {
                    armemu::FpVersion::Vfpv1 => ", VFPv1",
                    armemu::FpVersion::Vfpv2 => ", VFPv2",
                    armemu::FpVersion::Vfpv3 => ", VFPv3",
                    armemu::FpVersion::Vfpv4 => ", VFPv4",
                    armemu::FpVersion::Vfpv5 => ", VFPv5",
                    armemu::FpVersion::V8Fp => ", ARMv8 FP",
                });
            }
        }
        if config.features.contains(Features::SIMD) {
            out.push_str(", Advanced SIMD (Neon)");
        }
        if disasm && matches!(isa, Isa::Arm32 | Isa::Thumb | Isa::ThumbEe) {
            out.push_str(match syntax {
                Syntax::Divided => ", syntax: divided (pre-UAL)",
                Syntax::Unified => ", syntax: unified (UAL)",
            });
        }
        out.push_str(match endian {
            armemu::Endian::Little => ", little endian (LE)",
            armemu::Endian::Big => ", big endian, byte invariant (BE-8)",
            armemu::Endian::Swapped => ", big endian, word invariant (BE-32)",
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Configuration {
        Configuration {
            version: Version::V7,
            features: armemu::config::default_features(Version::V7),
            ..Configuration::default()
        }
    }

    /// Fixed instruction table: encoding on the left, canonical text on
    /// the right.
    #[test]
    fn test_a32_canonical_table() {
        let table: &[(u32, &str)] = &[
            (0xE3A0_0001, "mov r0, #0x1"),
            (0xE280_1002, "add r1, r0, #0x2"),
            (0xE250_1005, "subs r1, r0, #0x5"),
            (0x03A0_1001, "moveq r1, #0x1"),
            (0xE1A0_1080, "mov r1, r0, lsl #1"),
            (0xE590_2000, "ldr r2, [r0]"),
            (0xE580_1004, "str r1, [r0, #0x4]"),
            (0xE8B0_0003, "ldmia r0!, {r0-r1}"),
            (0xE92D_4003, "stmdb sp!, {r0-r1,lr}"),
            (0xEB00_0002, "bl 0x10"),
            (0xE12F_FF10, "bx r0"),
            (0xE102_0051, "qadd r0, r1, r2"),
            (0xE16F_0F11, "clz r0, r1"),
            (0xEF00_0000, "svc #0x000000"),
            (0xE305_0678, "movw r0, #0x5678"),
            (0xE6AF_0071, "sxtb r0, r1"),
            (0xE6FF_2071, "uxth r2, r1"),
            (0xE611_0F92, "sadd8 r0, r1, r2"),
            (0xE190_1F9F, "ldrex r1, [r0]"),
            (0xE180_2F93, "strex r2, r3, [r0]"),
            (0xE10F_0000, "mrs r0, cpsr"),
        ];
        let config = cfg();
        for (opcode, expected) in table {
            assert_eq!(
                a32_disasm(*opcode, 0, &config, Syntax::Unified),
                *expected,
                "opcode {opcode:08X}"
            );
        }
    }

    #[test]
    fn test_divided_syntax_swi() {
        let config = cfg();
        assert_eq!(
            a32_disasm(0xEF00_0004, 0, &config, Syntax::Divided),
            "swi #0x000004"
        );
    }

    #[test]
    fn test_t16_canonical_table() {
        let table: &[(u16, &str)] = &[
            (0x2005, "movs r0, #0x5"),
            (0x3007, "adds r0, #0x7"),
            (0x1888, "adds r0, r1, r2"),
            (0x6802, "ldr r2, [r0]"),
            (0xB406, "push {r1-r2}"),
            (0xBC18, "pop {r3-r4}"),
            (0xDF00, "svc #0x00"),
            (0x4708, "bx r1"),
            (0xBF06, "itte eq"),
        ];
        for (hw, expected) in table {
            assert_eq!(t16_disasm(*hw, 0, "", false), *expected, "halfword {hw:04X}");
        }
    }

    #[test]
    fn test_a64_canonical_table() {
        let table: &[(u32, &str)] = &[
            (0xD280_00E0, "movz x0, #0x7"),
            (0x9100_0420, "add x0, x1, #0x1"),
            (0xD65F_03C0, "ret x30"),
            (0xD400_0001, "svc #0x0"),
            (0x9400_0002, "bl 0x8"),
            (0xF900_0401, "str x1, [x0, #0x8]"),
            (0xB200_F3E0, "orr x0, xzr, #0x5555555555555555"),
        ];
        for (opcode, expected) in table {
            assert_eq!(a64_disasm(*opcode, 0), *expected, "opcode {opcode:08X}");
        }
    }

    #[test]
    fn test_jazelle_stream() {
        let code = [0x05u8, 0x06, 0x60, 0x10, 0xFE];
        let mut dis = Disassembler::new(
            cfg(),
            Isa::Jazelle,
            Syntax::Unified,
            CodeSource::Bytes { bytes: &code, big_endian: false },
        );
        assert!(dis.parse().ends_with("iconst_2"));
        assert!(dis.parse().ends_with("iconst_3"));
        assert!(dis.parse().ends_with("iadd"));
        assert!(dis.parse().ends_with("bipush -2"));
    }

    #[test]
    fn test_it_suffix_tracking() {
        // it eq; addeq; add
        let code: Vec<u8> = [0xBF08u16, 0x3001, 0x3001]
            .iter()
            .flat_map(|hw| hw.to_le_bytes())
            .collect();
        let mut dis = Disassembler::new(
            cfg(),
            Isa::Thumb,
            Syntax::Unified,
            CodeSource::Bytes { bytes: &code, big_endian: false },
        );
        assert!(dis.parse().ends_with("it eq"));
        assert!(dis.parse().ends_with("addeq r0, #0x1"));
        assert!(dis.parse().ends_with("adds r0, #0x1"));
    }

    #[test]
    fn test_register_list_ranges() {
        assert_eq!(register_list(0b1000_0000_1011), "{r0-r1,r3,r7}");
        assert_eq!(register_list(0xC000), "{lr-pc}");
    }
}
