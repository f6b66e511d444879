//! Processor state and register file
//!
//! One flat array of 64-bit slots backs every register of every execution
//! state. Banked AArch32 registers and the AArch64 registers differ only by
//! which physical slot a (mode, logical number) pair resolves to, so the
//! resolution is a precomputed alias table rather than per-mode register
//! structures.

use crate::config::{self, Configuration, Features, Isa, IsaSet, Version};
use crate::cop::CoprocOps;
use crate::exc::{EmuResult, Exception, ExecResult};
use crate::mem::{self, Endian, MemoryInterface};
use crate::psr::{self, Pstate, RegWidth, CPSR_A26_F, CPSR_A26_I, JT_ARM, JT_JAZELLE, JT_THUMB, JT_THUMBEE, MODE_USR};

use bitflags::bitflags;

/// Physical register slots.
///
/// Slots 0-14 are the user-mode AArch32 registers and the low AArch64
/// registers; 15-30 hold the banked registers (slot 30 doubles as the
/// AArch64 link register); then the four stack pointers, the PC, the
/// monitor bank, the exception link registers and the SPSR bank.
pub mod reg {
    pub const R13_HYP: usize = 15;
    pub const R14_IRQ: usize = 16;
    pub const R13_IRQ: usize = 17;
    pub const R14_SVC: usize = 18;
    pub const R13_SVC: usize = 19;
    pub const R14_ABT: usize = 20;
    pub const R13_ABT: usize = 21;
    pub const R14_UND: usize = 22;
    pub const R13_UND: usize = 23;
    pub const R8_FIQ: usize = 24;
    pub const R9_FIQ: usize = 25;
    pub const R10_FIQ: usize = 26;
    pub const R11_FIQ: usize = 27;
    pub const R12_FIQ: usize = 28;
    pub const R13_FIQ: usize = 29;
    pub const R14_FIQ: usize = 30;

    pub const A64_LR: usize = 30;

    // these come sequentially for indexed access
    pub const SP_EL0: usize = 31;
    pub const SP_EL1: usize = 32;
    pub const SP_EL2: usize = 33;
    pub const SP_EL3: usize = 34;

    pub const PC: usize = 35;
    pub const R14_MON: usize = 36;
    pub const R13_MON: usize = 37;
    pub const ELR_EL1: usize = 38;
    pub const ELR_EL2: usize = 39;
    pub const ELR_EL3: usize = 40;

    pub const SPSR_EL1: usize = 41;
    pub const SPSR_EL2: usize = 42;
    pub const SPSR_EL3: usize = 43;
    pub const SPSR_ABT: usize = 44;
    pub const SPSR_UND: usize = 45;
    pub const SPSR_IRQ: usize = 46;
    pub const SPSR_FIQ: usize = 47;

    pub const REG_COUNT: usize = 48;

    // synonyms between the AArch32 and AArch64 names
    pub const ELR_HYP: usize = ELR_EL2;
    pub const SPSR_SVC: usize = SPSR_EL1;
    pub const SPSR_HYP: usize = SPSR_EL2;
    pub const SPSR_MON: usize = SPSR_EL3;

    // numerical shorthands
    pub const A32_SP: usize = 13;
    pub const A32_LR: usize = 14;
    /// Accessed as r15 in assembly; the physical slot is `PC`.
    pub const A32_PC_NUM: usize = 15;
    /// Encoded as register 31 in many A64 instructions.
    pub const A64_SP: usize = 31;
}

use reg::*;

const NONE: u8 = 0xFF;

/// (mode, logical number) -> physical slot, ARMv3 and later.
#[rustfmt::skip]
const A32_REG_FOR_MODE: [[u8; 16]; 16] = {
    const PCB: u8 = PC as u8;
    [
        /* usr */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, PCB],
        /* fiq */ [0, 1, 2, 3, 4, 5, 6, 7,
                   R8_FIQ as u8, R9_FIQ as u8, R10_FIQ as u8, R11_FIQ as u8,
                   R12_FIQ as u8, R13_FIQ as u8, R14_FIQ as u8, PCB],
        /* irq */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_IRQ as u8, R14_IRQ as u8, PCB],
        /* svc */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_SVC as u8, R14_SVC as u8, PCB],
        [NONE; 16],
        [NONE; 16],
        /* mon */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_MON as u8, R14_MON as u8, PCB],
        /* abt */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_ABT as u8, R14_ABT as u8, PCB],
        [NONE; 16],
        [NONE; 16],
        /* hyp */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_HYP as u8, 14, PCB],
        /* und */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_UND as u8, R14_UND as u8, PCB],
        [NONE; 16],
        [NONE; 16],
        [NONE; 16],
        /* sys */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, PCB],
    ]
};

/// ARMv1 banks fewer FIQ registers (R8 and R9 are shared).
#[rustfmt::skip]
const A32_REG_FOR_MODE_V1: [[u8; 16]; 4] = {
    const PCB: u8 = PC as u8;
    [
        /* usr */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, PCB],
        /* fiq */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9,
                   R10_FIQ as u8, R11_FIQ as u8, R12_FIQ as u8,
                   R13_FIQ as u8, R14_FIQ as u8, PCB],
        /* irq */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_IRQ as u8, R14_IRQ as u8, PCB],
        /* svc */ [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, R13_SVC as u8, R14_SVC as u8, PCB],
    ]
};

/// mode -> SPSR slot; USR and SYS have none.
const A32_SPSR_FOR_MODE: [u8; 16] = [
    NONE,
    SPSR_FIQ as u8,
    SPSR_IRQ as u8,
    SPSR_SVC as u8,
    NONE,
    NONE,
    SPSR_MON as u8,
    SPSR_ABT as u8,
    NONE,
    NONE,
    SPSR_HYP as u8,
    SPSR_UND as u8,
    NONE,
    NONE,
    NONE,
    NONE,
];

bitflags! {
    /// System control register (SCTLR / SCTLR_EL1), plus the bits of the
    /// EL2/EL3 variants that this emulation consults.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Sctlr: u32 {
        const M  = 1 << 0;  // v3 (610)
        const A  = 1 << 1;  // strict alignment
        const C  = 1 << 2;
        const W  = 1 << 3;
        const P  = 1 << 4;  // 32-bit program space
        const D  = 1 << 5;  // 32-bit data space
        const L  = 1 << 6;
        const B  = 1 << 7;  // BE-32 byte order
        const S  = 1 << 8;
        const R  = 1 << 9;
        const F  = 1 << 10;
        const Z  = 1 << 11;
        const I  = 1 << 12;
        const V  = 1 << 13; // high vectors
        const RR = 1 << 14;
        const L4 = 1 << 15;
        const U  = 1 << 22; // v6: unaligned access permitted
        const SPAN = 1 << 23; // v8.1
        const E0E  = 1 << 24; // v8: EL0 data endianness
        const EE   = 1 << 25; // v6: exception/EL1 data endianness
        const TE   = 1 << 30; // v7: Thumb exception entry
    }
}

bitflags! {
    /// Secure configuration register (SCR / SCR_EL3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Scr: u32 {
        const NS = 1 << 0;
        const RW = 1 << 10;
    }
}

bitflags! {
    /// Hypervisor configuration register (HCR2:HCR / HCR_EL2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hcr: u64 {
        const TGE = 1 << 27;
        const RW  = 1 << 31;
        const E2H = 1 << 34;
    }
}

/// Legacy FPA register bank. The 80-bit internal format is approximated by
/// f64, which is also what the arithmetic subset operates on.
#[derive(Debug, Clone, Copy, Default)]
pub struct FpaState {
    pub f: [f64; 8],
    pub fpsr: u32,
    pub fpcr: u32,
}

/// VFP/Advanced SIMD register bank: 32 64-bit slots that alias as 32-bit
/// lanes. `format_bits` records, per D register, whether the last write was
/// a double (set) or a single (cleared).
#[derive(Debug, Clone)]
pub struct VfpState {
    pub format_bits: u32,
    pub w: [u64; 32],
    pub fpsid: u32,
    pub fpscr: u32,
    pub fpexc: u32,
}

impl Default for VfpState {
    fn default() -> Self {
        VfpState { format_bits: 0, w: [0; 32], fpsid: 0, fpscr: 0, fpexc: 0 }
    }
}

impl VfpState {
    pub fn s_bits(&self, i: usize) -> u32 {
        let w = self.w[(i & 0x1F) >> 1];
        if i & 1 == 0 { w as u32 } else { (w >> 32) as u32 }
    }

    pub fn set_s_bits(&mut self, i: usize, value: u32) {
        let i = i & 0x1F;
        self.format_bits &= !(1 << (i >> 1));
        let w = &mut self.w[i >> 1];
        if i & 1 == 0 {
            *w = (*w & 0xFFFF_FFFF_0000_0000) | value as u64;
        } else {
            *w = (*w & 0x0000_0000_FFFF_FFFF) | (value as u64) << 32;
        }
    }

    pub fn d_bits(&self, i: usize) -> u64 {
        self.w[i & 0x1F]
    }

    pub fn set_d_bits(&mut self, i: usize, value: u64) {
        let i = i & 0x1F;
        self.format_bits |= 1 << i;
        self.w[i] = value;
    }

    pub fn s(&self, i: usize) -> f32 {
        f32::from_bits(self.s_bits(i))
    }

    pub fn set_s(&mut self, i: usize, value: f32) {
        self.set_s_bits(i, value.to_bits());
    }

    pub fn d(&self, i: usize) -> f64 {
        f64::from_bits(self.d_bits(i))
    }

    pub fn set_d(&mut self, i: usize, value: f64) {
        self.set_d_bits(i, value.to_bits());
    }
}

/// Jazelle exception indices delivered through the software handler table.
pub const J32_EXCEPTION_NULLPTR: u32 = 0x100;
pub const J32_EXCEPTION_OUT_OF_BOUNDS: u32 = 0x101;
pub const J32_EXCEPTION_DISABLED: u32 = 0x102; // JE = 0
pub const J32_EXCEPTION_INVALID: u32 = 0x103; // CV = 0
pub const J32_EXCEPTION_PREFETCH_ABORT: u32 = 0x104;

/// JMCR bits (p14, 7, c2).
pub const JMCR_JE: u32 = 1 << 0;
pub const JMCR_CV: u32 = 1 << 1;

/// One emulated ARM processor.
pub struct Cpu {
    pub config: Configuration,
    pub supported_isas: IsaSet,
    pub part_number: u16,
    pub vendor: u8,

    /// Lowest EL that can only execute AArch64; 4 means fully 32-bit.
    pub lowest_64bit_only_el: u8,
    pub el2_supported: bool,
    pub el3_supported: bool,

    /// When set, breaks are returned to the monitor instead of being
    /// delivered through the architectural vectors.
    pub capture_breaks: bool,
    pub result: EmuResult,

    pub(crate) coproc: [CoprocOps; 16],

    pub r: [u64; REG_COUNT],
    pub old_pc: u64,
    pub pstate: Pstate,

    pub fpa: FpaState,
    pub vfp: VfpState,

    pub exclusive_procid: u32,
    pub exclusive_start: u64,
    pub exclusive_end: u64,

    // p14, 6, c1: ThumbEE handler base
    pub teehbr: u32,
    // Jazelle control registers (p14, 7, c0-c3)
    pub jidr: u32,
    pub joscr: u32,
    pub jmcr: u32,
    pub jaolr: u32,

    pub sctlr_el1: Sctlr,
    pub sctlr_el2: Sctlr,
    pub sctlr_el3: Sctlr,
    pub scr_el3: Scr,
    pub hcr_el2: Hcr,
    pub vbar_el1: u64,
    pub vbar_el2: u64,
    pub vbar_el3: u64,

    pub memory: Box<dyn MemoryInterface>,
}

impl Cpu {
    /// Build a processor from a configuration, forcing the configuration
    /// into coherence with the supported instruction sets.
    pub fn new(
        mut config: Configuration,
        mut supported_isas: IsaSet,
        memory: Box<dyn MemoryInterface>,
    ) -> Cpu {
        use crate::config::{JazelleLevel, ThumbLevel};

        if supported_isas.has(Isa::Arm32)
            && !config.features.intersects(Features::ARM26 | Features::ARM32)
        {
            config.features |= if config.version < Version::V3 {
                Features::ARM26
            } else {
                Features::ARM32
            };
        }
        if supported_isas.has(Isa::Arm64) {
            config.features |= Features::ARM64;
        }

        // make the Thumb implementation coherent with the constraints
        if config.features.contains(Features::THUMB2) && config.thumb < ThumbLevel::Thumb2 {
            config.thumb = ThumbLevel::Thumb2;
        } else if (config.features.contains(Features::THUMB) || supported_isas.has(Isa::Thumb))
            && config.thumb < ThumbLevel::Thumb1
        {
            config.thumb = ThumbLevel::Thumb1;
        }
        if config.thumb >= ThumbLevel::Thumb1 {
            config.features |= Features::THUMB;
            supported_isas |= IsaSet::THUMB;
        }
        if config.thumb >= ThumbLevel::Thumb2 {
            config.features |= Features::THUMB2;
        }

        // same for the Jazelle implementation level
        let jazelle = match config.jazelle {
            None => JazelleLevel::Jazelle,
            Some(JazelleLevel::None) => {
                if supported_isas.has(Isa::Jazelle) {
                    JazelleLevel::Jazelle
                } else if config.features.contains(Features::JAZELLE) {
                    JazelleLevel::Trivial
                } else {
                    JazelleLevel::None
                }
            }
            Some(JazelleLevel::Trivial) => {
                if supported_isas.has(Isa::Jazelle) {
                    JazelleLevel::Jazelle
                } else {
                    JazelleLevel::Trivial
                }
            }
            // the JVM/picoJava levels only exist for parsing
            Some(JazelleLevel::Jvm) | Some(JazelleLevel::PicoJava) => JazelleLevel::Extension,
            Some(level) => level,
        };
        config.jazelle = Some(jazelle);
        if jazelle >= JazelleLevel::Trivial {
            config.features |= Features::JAZELLE;
        }
        if jazelle >= JazelleLevel::Jazelle {
            supported_isas |= IsaSet::JAZELLE;
        }

        let el2_supported = config.features.contains(Features::VIRTUALIZATION);
        let el3_supported = config.features.contains(Features::SECURITY);
        let lowest_64bit_only_el = if config.features.contains(Features::ARM64) { 3 } else { 4 };

        // reset into a 32-bit program/data configuration; a 26-bit-only
        // processor ignores these bits and a guest may clear them
        let sctlr_el1 = Sctlr::P | Sctlr::D;

        // cores with a real Jazelle implementation come out of reset with
        // JE set; the trivial implementation keeps it clear
        let jmcr = if jazelle >= JazelleLevel::Jazelle { JMCR_JE | JMCR_CV } else { 0 };

        let mut cpu = Cpu {
            config,
            supported_isas,
            part_number: 0,
            vendor: config::vendor::ARM,
            lowest_64bit_only_el,
            el2_supported,
            el3_supported,
            capture_breaks: false,
            result: EmuResult::Ok,
            coproc: [CoprocOps::default(); 16],
            r: [0; REG_COUNT],
            old_pc: 0,
            pstate: Pstate::default(),
            fpa: FpaState::default(),
            vfp: VfpState::default(),
            exclusive_procid: 0,
            exclusive_start: u64::MAX,
            exclusive_end: 0,
            teehbr: 0,
            jidr: 0,
            joscr: 0,
            jmcr,
            jaolr: 0,
            sctlr_el1,
            sctlr_el2: Sctlr::empty(),
            sctlr_el3: Sctlr::empty(),
            scr_el3: Scr::empty(),
            hcr_el2: Hcr::empty(),
            vbar_el1: 0,
            vbar_el2: 0,
            vbar_el3: 0,
            memory,
        };
        crate::cop::install_coprocessors(&mut cpu);
        cpu
    }

    pub fn is_supported_isa(&self, isa: Isa) -> bool {
        match isa {
            Isa::Arm26 => self.config.features.contains(Features::ARM26),
            Isa::Arm32 => self.config.features.contains(Features::ARM32),
            Isa::Thumb => self.config.features.contains(Features::THUMB),
            Isa::Jazelle => self.config.features.contains(Features::JAZELLE),
            Isa::ThumbEe => {
                self.config.features.contains(Features::THUMB) && self.config.version == Version::V7
            }
            Isa::Arm64 => self.config.features.contains(Features::ARM64),
        }
    }

    /// Force the execution state to `isa` by writing PSTATE.
    pub fn set_isa(&mut self, isa: Isa) {
        match isa {
            Isa::Arm26 => {
                self.pstate.rw = RegWidth::W26;
                self.pstate.jt = JT_ARM;
            }
            Isa::Arm32 => {
                self.pstate.rw = RegWidth::W32;
                self.pstate.jt = JT_ARM;
                self.sctlr_el1 |= Sctlr::P | Sctlr::D;
            }
            Isa::Thumb => {
                self.pstate.rw = RegWidth::W32;
                self.pstate.jt = JT_THUMB;
            }
            Isa::Jazelle => {
                self.pstate.rw = RegWidth::W32;
                self.pstate.jt = JT_JAZELLE;
            }
            Isa::ThumbEe => {
                self.pstate.rw = RegWidth::W32;
                self.pstate.jt = JT_THUMBEE;
            }
            Isa::Arm64 => {
                self.pstate.rw = RegWidth::W64;
                self.pstate.jt = JT_ARM;
            }
        }
    }

    pub fn current_isa(&self) -> Isa {
        match self.pstate.rw {
            RegWidth::W26 => Isa::Arm26,
            RegWidth::W32 => match self.pstate.jt {
                JT_ARM => Isa::Arm32,
                JT_THUMB => Isa::Thumb,
                JT_JAZELLE => Isa::Jazelle,
                _ => Isa::ThumbEe,
            },
            RegWidth::W64 => Isa::Arm64,
        }
    }

    pub fn is_arm26(&self) -> bool {
        self.pstate.rw == RegWidth::W26
    }

    pub fn is_thumbee(&self) -> bool {
        self.pstate.jt == JT_THUMBEE
    }

    /// Whether the program space is 26-bit (SCTLR.P clear on a processor
    /// that supports both widths).
    pub fn is_prog26(&self) -> bool {
        if !self.is_supported_isa(Isa::Arm26) {
            false
        } else if !self.is_supported_isa(Isa::Arm32) {
            true
        } else {
            // the bit is redefined in ARMv8
            self.config.version < Version::V8 && !self.sctlr_el1.contains(Sctlr::P)
        }
    }

    /// Whether the data space is 26-bit (SCTLR.D clear).
    pub fn is_data26(&self) -> bool {
        if !self.is_supported_isa(Isa::Arm26) {
            false
        } else if !self.is_supported_isa(Isa::Arm32) {
            true
        } else {
            self.config.version < Version::V8 && !self.sctlr_el1.contains(Sctlr::D)
        }
    }

    pub fn privileged(&self) -> bool {
        match self.pstate.rw {
            RegWidth::W26 | RegWidth::W32 => self.pstate.mode != MODE_USR,
            RegWidth::W64 => self.pstate.el != 0,
        }
    }

    pub fn a32_instruction_endianness(&self) -> Endian {
        if self.sctlr_el1.contains(Sctlr::B) {
            Endian::Swapped // v5 and v6
        } else {
            Endian::Little
        }
    }

    pub fn a32_data_endianness(&self) -> Endian {
        if self.sctlr_el1.contains(Sctlr::B) {
            Endian::Swapped // v5 and v6
        } else if self.pstate.e {
            Endian::Big // v6 and v7
        } else {
            Endian::Little
        }
    }

    pub fn a64_data_endianness(&self) -> Endian {
        let ee = match self.pstate.el {
            0 => self.sctlr_el1.contains(Sctlr::E0E),
            1 => self.sctlr_el1.contains(Sctlr::EE),
            2 => self.sctlr_el2.contains(Sctlr::EE),
            _ => self.sctlr_el3.contains(Sctlr::EE),
        };
        if ee { Endian::Big } else { Endian::Little }
    }

    pub fn instruction_endianness(&self) -> Endian {
        if self.pstate.rw == RegWidth::W64 {
            Endian::Little
        } else {
            self.a32_instruction_endianness()
        }
    }

    pub fn data_endianness(&self) -> Endian {
        if self.pstate.rw == RegWidth::W64 {
            self.a64_data_endianness()
        } else {
            self.a32_data_endianness()
        }
    }

    // ---- register file ----

    fn a32_phys(&self, mode: u8, regnum: usize) -> usize {
        let slot = if self.config.version == Version::V1 {
            A32_REG_FOR_MODE_V1[(mode & 3) as usize][regnum & 0xF]
        } else {
            A32_REG_FOR_MODE[(mode & 0xF) as usize][regnum & 0xF]
        };
        debug_assert_ne!(slot, NONE);
        slot as usize
    }

    /// Raw banked-register access in an explicit mode, no PC adjustment.
    pub fn a32_reg_mode(&self, mode: u8, regnum: usize) -> u64 {
        self.r[self.a32_phys(mode, regnum)]
    }

    pub fn a32_set_reg_mode(&mut self, mode: u8, regnum: usize, value: u64) {
        let slot = self.a32_phys(mode, regnum);
        self.r[slot] = value;
    }

    fn pipeline_offset(&self) -> u32 {
        match self.pstate.jt {
            JT_ARM => 4,
            JT_THUMB | JT_THUMBEE => 2,
            _ => 0,
        }
    }

    /// Read an AArch32 register; R15 reads as the current PC plus the
    /// pipeline offset.
    pub fn a32_reg(&self, regnum: usize) -> u32 {
        let regnum = regnum & 0xF;
        let mut value = self.a32_reg_mode(self.pstate.mode, regnum) as u32;
        if regnum == A32_PC_NUM {
            value = value.wrapping_add(self.pipeline_offset());
        }
        value
    }

    /// Like [`Cpu::a32_reg`], but in 26-bit mode R15 additionally carries
    /// the packed PSR flags, modeling instructions that use R15 as both an
    /// address and the flag word.
    pub fn a32_reg_lhs(&self, regnum: usize) -> u32 {
        let regnum = regnum & 0xF;
        if self.pstate.rw == RegWidth::W26 && regnum == A32_PC_NUM {
            self.a26_pc().wrapping_add(4)
        } else {
            self.a32_reg(regnum)
        }
    }

    /// Displacement of a stored R15 beyond the pipeline offset (STR/STM);
    /// implementation defined before ARMv7, this models the ARMv2 value.
    pub fn stored_pc_displacement(&self) -> u32 {
        if self.config.version >= Version::V7 { 0 } else { 4 }
    }

    /// R15 value as stored by STR/STM.
    pub fn a32_reg_str(&self, regnum: usize) -> u32 {
        let regnum = regnum & 0xF;
        let mut value = self.a32_reg(regnum);
        if regnum == A32_PC_NUM {
            value = value.wrapping_add(self.stored_pc_displacement());
        }
        value
    }

    /// Write the PC with the alignment of the current instruction set.
    pub fn a32_set_pc(&mut self, value: u32) {
        self.r[PC] = match self.pstate.jt {
            JT_ARM => value & 0xFFFF_FFFC,
            JT_THUMB | JT_THUMBEE => value & 0xFFFF_FFFE,
            _ => value,
        } as u64;
    }

    /// Write the PC, switching between ARM and Thumb according to bit 0.
    pub fn a32_set_pc_interworking(&mut self, value: u32) {
        match self.pstate.jt {
            JT_ARM | JT_THUMB => {
                self.pstate.jt = if value & 1 != 0 { JT_THUMB } else { JT_ARM };
            }
            // ThumbEE and Jazelle stay in their state
            _ => {}
        }
        self.a32_set_pc(value);
    }

    pub fn a32_set_reg(&mut self, regnum: usize, value: u32) {
        let regnum = regnum & 0xF;
        if regnum == A32_PC_NUM {
            if self.pstate.rw == RegWidth::W26 {
                self.r[PC] = (value & 0x03FF_FFFC) as u64;
            } else {
                self.a32_set_pc(value);
            }
        } else {
            let slot = self.a32_phys(self.pstate.mode, regnum);
            self.r[slot] = value as u64;
        }
    }

    /// Assignment that may switch ARM/Thumb state when the target is R15.
    pub fn a32_set_reg_interworking(&mut self, regnum: usize, value: u32) {
        let regnum = regnum & 0xF;
        if regnum == A32_PC_NUM {
            if self.pstate.rw == RegWidth::W26 {
                self.r[PC] = (value & 0x03FF_FFFC) as u64;
            } else {
                self.a32_set_pc_interworking(value);
            }
        } else {
            let slot = self.a32_phys(self.pstate.mode, regnum);
            self.r[slot] = value as u64;
        }
    }

    /// On v5 and later, LDR/LDM to R15 interwork on bit 0.
    pub fn a32_set_reg_interworking_v5(&mut self, regnum: usize, value: u32) {
        if self.config.version < Version::V5 {
            self.a32_set_reg(regnum, value);
        } else {
            self.a32_set_reg_interworking(regnum, value);
        }
    }

    /// On v7 and later, arithmetic results written to R15 interwork too.
    pub fn a32_set_reg_interworking_v7(&mut self, regnum: usize, value: u32) {
        if self.config.version < Version::V7 {
            self.a32_set_reg(regnum, value);
        } else {
            self.a32_set_reg_interworking(regnum, value);
        }
    }

    /// R15 as used by an MCR operand; implementation defined before ARMv5.
    pub fn a32_mcr_pc_offset(&self) -> u32 {
        if self.config.version >= Version::V5 { 0 } else { 4 }
    }

    /// Extra R15 offset when a register-specified shift is in use,
    /// implementation defined before ARMv5 (this models ARMv2).
    pub fn a32_register_shift_pc_offset(&self, opcode: u32) -> u32 {
        if opcode & 0x0200_00F0 != 0x0000_0010 {
            0
        } else if self.config.version >= Version::V5 {
            0
        } else {
            4
        }
    }

    pub fn a64_reg32(&self, regnum: usize, suppress_sp: bool) -> u32 {
        self.a64_reg64(regnum, suppress_sp) as u32
    }

    pub fn a64_reg64(&self, regnum: usize, suppress_sp: bool) -> u64 {
        let regnum = regnum & 0x1F;
        if regnum != A64_SP {
            self.r[regnum]
        } else if suppress_sp {
            0
        } else if !self.pstate.sp {
            self.r[SP_EL0]
        } else {
            self.r[SP_EL0 + self.pstate.el as usize]
        }
    }

    pub fn a64_set_reg32(&mut self, regnum: usize, suppress_sp: bool, value: u32) {
        self.a64_set_reg64(regnum, suppress_sp, value as u64);
    }

    pub fn a64_set_reg64(&mut self, regnum: usize, suppress_sp: bool, value: u64) {
        let regnum = regnum & 0x1F;
        if regnum != A64_SP {
            self.r[regnum] = value;
        } else if suppress_sp {
            // the zero register discards the result
        } else if !self.pstate.sp {
            self.r[SP_EL0] = value;
        } else {
            self.r[SP_EL0 + self.pstate.el as usize] = value;
        }
    }

    // ---- status registers ----

    /// The 26-bit R15 view: PC packed with mode, interrupt masks and flags.
    pub fn a26_pc(&self) -> u32 {
        (self.r[PC] as u32 & 0x03FF_FFFC)
            | (self.pstate.mode & 3) as u32
            | if self.pstate.f { CPSR_A26_F } else { 0 }
            | if self.pstate.i { CPSR_A26_I } else { 0 }
            | self.pstate.nzcv()
    }

    pub fn cpsr(&self) -> u32 {
        psr::a32_cpsr(&self.pstate, &self.config)
    }

    pub fn set_cpsr(&mut self, mask: u32, value: u32) {
        let can_leave = !self.is_prog26();
        psr::a32_set_cpsr(&mut self.pstate, &self.config, can_leave, mask, value);
    }

    pub fn a64_cpsr(&self) -> u32 {
        psr::a64_cpsr(&self.pstate, &self.config)
    }

    pub fn a64_set_cpsr(&mut self, value: u32) {
        psr::a64_set_cpsr(&mut self.pstate, &self.config, value);
    }

    pub fn spsr_valid(&self) -> bool {
        A32_SPSR_FOR_MODE[(self.pstate.mode & 0xF) as usize] != NONE
    }

    /// SPSR of the current mode; modes without one read as zero.
    pub fn spsr(&self) -> u32 {
        let slot = A32_SPSR_FOR_MODE[(self.pstate.mode & 0xF) as usize];
        if slot == NONE { 0 } else { self.r[slot as usize] as u32 }
    }

    /// Masked SPSR write; silently dropped for modes without an SPSR.
    pub fn set_spsr(&mut self, mask: u32, value: u32) {
        let slot = A32_SPSR_FOR_MODE[(self.pstate.mode & 0xF) as usize];
        if slot == NONE {
            return;
        }
        let mask = mask & psr::xpsr_mask(self.config.version, self.config.features, self.supported_isas);
        let value = value | psr::xpsr_always_set(self.supported_isas);
        let old = self.r[slot as usize] as u32;
        self.r[slot as usize] = ((old & !mask) | (value & mask)) as u64;
    }

    pub(crate) fn spsr_slot_for_mode(&self, mode: u8) -> Option<usize> {
        let slot = A32_SPSR_FOR_MODE[(mode & 0xF) as usize];
        (slot != NONE).then_some(slot as usize)
    }

    /// Copy flags on an S-bit write to R15: from the value itself in 26-bit
    /// mode, from the SPSR of the current mode otherwise.
    pub fn a32_copy_flags(&mut self, value: u32) {
        if self.is_arm26() {
            self.pstate.set_nzcv(value);
            if self.pstate.mode != MODE_USR {
                self.pstate.i = value & CPSR_A26_I != 0;
                self.pstate.f = value & CPSR_A26_F != 0;
                self.pstate.mode = (value & 3) as u8;
                // a privileged transfer with M4 set leaves 26-bit mode on a
                // 32-bit program-space configuration (ARMv3)
                if value & crate::psr::CPSR_M4 != 0
                    && self.config.features.contains(Features::ARM32)
                    && !self.is_prog26()
                {
                    self.pstate.rw = RegWidth::W32;
                }
            }
        } else {
            if !self.spsr_valid() {
                return; // unpredictable; this models the v3 behavior
            }
            let spsr = self.spsr();
            self.set_cpsr(!0, spsr);
        }
    }

    // ---- identification registers ----

    pub fn midr(&self) -> u32 {
        use crate::config::{part, vendor};

        if self.part_number < part::ARM3 {
            0
        } else if self.part_number < part::ARM810 {
            let mut value = (vendor::ARM as u32) << 24;
            if self.part_number & 0xF000 == 0x7000 {
                value |= self.part_number as u32;
                if self.config.features.contains(Features::THUMB) {
                    value |= 0x0080_0000;
                }
            } else {
                value |= (self.part_number & 0x0FFF) as u32;
                value |= (vendor::MANUFACTURER_VLSI as u32) << 16;
            }
            value
        } else {
            const ARCH_V4: u32 = 0x1;
            const ARCH_V4T: u32 = 0x2;
            const ARCH_V5: u32 = 0x3;
            const ARCH_V5T: u32 = 0x4;
            const ARCH_V5TE: u32 = 0x5;
            const ARCH_V5TEJ: u32 = 0x6;
            const ARCH_V6: u32 = 0x7;
            const ARCH_CPUID: u32 = 0xF;

            let variant = match self.config.version {
                Version::V1 | Version::V2 | Version::V3 => 0,
                Version::V4 => {
                    if self.config.features.contains(Features::THUMB) {
                        ARCH_V4T
                    } else {
                        ARCH_V4
                    }
                }
                Version::V5 => {
                    if self.config.features.contains(Features::JAZELLE) {
                        ARCH_V5TEJ
                    } else if self.config.features.contains(Features::ENH_DSP) {
                        ARCH_V5TE
                    } else if self.config.features.contains(Features::THUMB) {
                        ARCH_V5T
                    } else {
                        ARCH_V5
                    }
                }
                Version::V6 => ARCH_V6,
                _ => ARCH_CPUID,
            };
            (self.vendor as u32) << 24
                | self.part_number as u32
                | (variant << 20)
                | 0x00F0_0000
        }
    }

    pub fn id_pfr0(&self) -> u32 {
        use crate::config::JazelleLevel;

        let mut value = 0;
        if self.config.features.intersects(Features::ARM26 | Features::ARM32) {
            value |= 0x0000_0001;
        }
        value |= (self.config.thumb as u32) << 4;
        let java = self.config.jazelle.unwrap_or(JazelleLevel::None);
        value |= (java as u32).min(2) << 8;
        if self.config.version == Version::V7 {
            value |= 1 << 12; // ThumbEE
        }
        value
    }

    // ---- exclusive monitor ----

    pub fn mark_exclusive(&mut self, base: u64, size: u64) {
        self.exclusive_procid = 0; // single-context monitor
        self.exclusive_start = base;
        self.exclusive_end = base + size - 1;
    }

    pub fn check_exclusive(&self, base: u64, size: u64) -> bool {
        self.exclusive_start < base + size && base <= self.exclusive_end
    }

    pub fn clear_exclusive(&mut self) {
        self.exclusive_start = u64::MAX;
        self.exclusive_end = 0;
    }

    fn clear_exclusive_on_store(&mut self, base: u64, size: u64) {
        if self.check_exclusive(base, size) {
            self.clear_exclusive();
        }
    }

    // ---- data accesses ----

    pub fn a32_read8(&mut self, address: u32, usermode: bool) -> ExecResult<u8> {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read8(self.memory.as_mut(), address as u64, endian, privileged)
            .ok_or(Exception::DataAbort)
    }

    pub fn a32_read16(&mut self, address: u32, usermode: bool) -> ExecResult<u16> {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read16(self.memory.as_mut(), address as u64, endian, privileged)
            .ok_or(Exception::DataAbort)
    }

    pub fn a32_read32(&mut self, address: u32, usermode: bool) -> ExecResult<u32> {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read32(self.memory.as_mut(), address as u64, endian, privileged)
            .ok_or(Exception::DataAbort)
    }

    pub fn a32_read64(&mut self, address: u32, usermode: bool) -> ExecResult<u64> {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read64(self.memory.as_mut(), address as u64, endian, privileged)
            .ok_or(Exception::DataAbort)
    }

    pub fn a32_write8(&mut self, address: u32, value: u8, usermode: bool) -> ExecResult {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address as u64, 1);
        mem::write8(self.memory.as_mut(), address as u64, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    pub fn a32_write16(&mut self, address: u32, value: u16, usermode: bool) -> ExecResult {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address as u64, 2);
        mem::write16(self.memory.as_mut(), address as u64, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    pub fn a32_write32(&mut self, address: u32, value: u32, usermode: bool) -> ExecResult {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address as u64, 4);
        mem::write32(self.memory.as_mut(), address as u64, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    pub fn a32_write64(&mut self, address: u32, value: u64, usermode: bool) -> ExecResult {
        let endian = self.a32_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address as u64, 8);
        mem::write64(self.memory.as_mut(), address as u64, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    pub fn a64_read8(&mut self, address: u64, usermode: bool) -> ExecResult<u8> {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read8(self.memory.as_mut(), address, endian, privileged).ok_or(Exception::DataAbort)
    }

    pub fn a64_read16(&mut self, address: u64, usermode: bool) -> ExecResult<u16> {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read16(self.memory.as_mut(), address, endian, privileged).ok_or(Exception::DataAbort)
    }

    pub fn a64_read32(&mut self, address: u64, usermode: bool) -> ExecResult<u32> {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read32(self.memory.as_mut(), address, endian, privileged).ok_or(Exception::DataAbort)
    }

    pub fn a64_read64(&mut self, address: u64, usermode: bool) -> ExecResult<u64> {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        mem::read64(self.memory.as_mut(), address, endian, privileged).ok_or(Exception::DataAbort)
    }

    pub fn a64_write8(&mut self, address: u64, value: u8, usermode: bool) -> ExecResult {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address, 1);
        mem::write8(self.memory.as_mut(), address, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    pub fn a64_write16(&mut self, address: u64, value: u16, usermode: bool) -> ExecResult {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address, 2);
        mem::write16(self.memory.as_mut(), address, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    pub fn a64_write32(&mut self, address: u64, value: u32, usermode: bool) -> ExecResult {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address, 4);
        mem::write32(self.memory.as_mut(), address, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    pub fn a64_write64(&mut self, address: u64, value: u64, usermode: bool) -> ExecResult {
        let endian = self.a64_data_endianness();
        let privileged = !usermode && self.privileged();
        self.clear_exclusive_on_store(address, 8);
        mem::write64(self.memory.as_mut(), address, value, endian, privileged)
            .then_some(())
            .ok_or(Exception::DataAbort)
    }

    /// Data read/write helpers that never fault, for the host side
    /// (loaders, syscall servicing, debugger).
    pub fn read8_data(&mut self, address: u64) -> u8 {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::read8(self.memory.as_mut(), address, endian, privileged).unwrap_or(0)
    }

    pub fn read16_data(&mut self, address: u64) -> u16 {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::read16(self.memory.as_mut(), address, endian, privileged).unwrap_or(0)
    }

    pub fn read32_data(&mut self, address: u64) -> u32 {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::read32(self.memory.as_mut(), address, endian, privileged).unwrap_or(0)
    }

    pub fn read64_data(&mut self, address: u64) -> u64 {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::read64(self.memory.as_mut(), address, endian, privileged).unwrap_or(0)
    }

    pub fn write8_data(&mut self, address: u64, value: u8) {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::write8(self.memory.as_mut(), address, value, endian, privileged);
    }

    pub fn write16_data(&mut self, address: u64, value: u16) {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::write16(self.memory.as_mut(), address, value, endian, privileged);
    }

    pub fn write32_data(&mut self, address: u64, value: u32) {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::write32(self.memory.as_mut(), address, value, endian, privileged);
    }

    pub fn write64_data(&mut self, address: u64, value: u64) {
        let endian = self.data_endianness();
        let privileged = self.privileged();
        mem::write64(self.memory.as_mut(), address, value, endian, privileged);
    }

    // ---- instruction fetch ----

    /// Fetch the next ARM26/ARM32 instruction word and advance the PC.
    pub(crate) fn a32_fetch32(&mut self) -> ExecResult<u32> {
        let endian = self.a32_instruction_endianness();
        let privileged = self.privileged();
        let value = mem::read32(self.memory.as_mut(), self.r[PC] & !3, endian, privileged)
            .ok_or(Exception::PrefetchAbort)?;
        self.r[PC] += 4;
        if self.pstate.rw == RegWidth::W26 {
            // only needed here: 26-bit modes can only run the ARM set
            self.r[PC] &= 0x03FF_FFFF;
        }
        Ok(value)
    }

    /// Fetch the next Thumb halfword and advance the PC.
    pub(crate) fn t32_fetch16(&mut self) -> ExecResult<u16> {
        let endian = self.a32_instruction_endianness();
        let privileged = self.privileged();
        let value = mem::read16(self.memory.as_mut(), self.r[PC] & !1, endian, privileged)
            .ok_or(Exception::PrefetchAbort)?;
        self.r[PC] += 2;
        Ok(value)
    }

    /// Fetch the next A64 instruction; the PC must be word aligned.
    pub(crate) fn a64_fetch32(&mut self) -> ExecResult<u32> {
        if self.r[PC] & 3 != 0 {
            return Err(Exception::UnalignedPc);
        }
        let privileged = self.privileged();
        let value = mem::read32(self.memory.as_mut(), self.r[PC], Endian::Little, privileged)
            .ok_or(Exception::PrefetchAbort)?;
        self.r[PC] += 4;
        Ok(value)
    }

    /// Jazelle bytecode fetch; the stream is big-endian regardless of the
    /// configured memory endianness.
    pub(crate) fn j32_fetch8(&mut self) -> ExecResult<u8> {
        let endian = self.a32_instruction_endianness();
        let privileged = self.privileged();
        let value = mem::read8(self.memory.as_mut(), self.r[PC], endian, privileged)
            .ok_or(Exception::JazelleBreak(J32_EXCEPTION_PREFETCH_ABORT))?;
        self.r[PC] += 1;
        Ok(value)
    }

    pub(crate) fn j32_fetch16(&mut self) -> ExecResult<u16> {
        let endian = self.a32_instruction_endianness();
        let privileged = self.privileged();
        let value = mem::read16(self.memory.as_mut(), self.r[PC], endian, privileged)
            .ok_or(Exception::JazelleBreak(J32_EXCEPTION_PREFETCH_ABORT))?;
        self.r[PC] += 2;
        Ok(if endian == Endian::Little { value.swap_bytes() } else { value })
    }

    pub(crate) fn j32_fetch32(&mut self) -> ExecResult<u32> {
        let endian = self.a32_instruction_endianness();
        let privileged = self.privileged();
        let value = mem::read32(self.memory.as_mut(), self.r[PC], endian, privileged)
            .ok_or(Exception::JazelleBreak(J32_EXCEPTION_PREFETCH_ABORT))?;
        self.r[PC] += 4;
        Ok(if endian == Endian::Little { value.swap_bytes() } else { value })
    }

    pub(crate) fn j32_read32_code(&mut self, address: u32) -> ExecResult<u32> {
        let endian = self.a32_instruction_endianness();
        let privileged = self.privileged();
        let value = mem::read32(self.memory.as_mut(), address as u64, endian, privileged)
            .ok_or(Exception::JazelleBreak(J32_EXCEPTION_PREFETCH_ABORT))?;
        Ok(if endian == Endian::Little { value.swap_bytes() } else { value })
    }

    // Non-faulting fetch views for the host (disassembly, trap servicing).

    pub fn peek8(&mut self, address: u64) -> u8 {
        let endian = self.instruction_endianness();
        let privileged = self.privileged();
        mem::read8(self.memory.as_mut(), address, endian, privileged).unwrap_or(0)
    }

    pub fn peek16(&mut self, address: u64) -> u16 {
        let endian = self.a32_instruction_endianness();
        let privileged = self.privileged();
        mem::read16(self.memory.as_mut(), address, endian, privileged).unwrap_or(0)
    }

    pub fn peek16be(&mut self, address: u64) -> u16 {
        let value = self.peek16(address);
        if self.a32_instruction_endianness() == Endian::Little {
            value.swap_bytes()
        } else {
            value
        }
    }

    pub fn peek32(&mut self, address: u64) -> u32 {
        let endian = self.instruction_endianness();
        let privileged = self.privileged();
        mem::read32(self.memory.as_mut(), address, endian, privileged).unwrap_or(0)
    }

    pub fn peek32be(&mut self, address: u64) -> u32 {
        let value = self.peek32(address);
        if self.a32_instruction_endianness() == Endian::Little {
            value.swap_bytes()
        } else {
            value
        }
    }

    /// Sequential fetches that advance the PC, used by the tracing
    /// disassembler when it walks in lockstep with execution.
    pub fn fetch_next8(&mut self) -> u8 {
        let value = self.peek8(self.r[PC]);
        self.r[PC] += 1;
        value
    }

    pub fn fetch_next16(&mut self) -> u16 {
        let value = self.peek16(self.r[PC]);
        self.r[PC] += 2;
        value
    }

    pub fn fetch_next16be(&mut self) -> u16 {
        let value = self.peek16be(self.r[PC]);
        self.r[PC] += 2;
        value
    }

    pub fn fetch_next32(&mut self) -> u32 {
        let value = self.peek32(self.r[PC]);
        self.r[PC] += 4;
        if self.pstate.rw == RegWidth::W26 {
            self.r[PC] &= 0x03FF_FFFF;
        }
        value
    }

    pub fn fetch_next32be(&mut self) -> u32 {
        let value = self.peek32be(self.r[PC]);
        self.r[PC] += 4;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, JazelleLevel};
    use crate::testutil::TestRam;

    pub fn test_cpu(version: Version) -> Cpu {
        let config = Configuration {
            version,
            features: default_features(version),
            ..Configuration::default()
        };
        let isas = match version {
            Version::V1 | Version::V2 => IsaSet::ARM26,
            Version::V3 => IsaSet::ARM26 | IsaSet::ARM32,
            Version::V8 => IsaSet::ARM32 | IsaSet::THUMB | IsaSet::ARM64,
            _ => IsaSet::ARM32 | IsaSet::THUMB,
        };
        Cpu::new(config, isas, Box::new(TestRam::new(0x1_0000)))
    }

    #[test]
    fn test_banked_registers_by_mode() {
        let mut cpu = test_cpu(Version::V7);
        cpu.set_isa(Isa::Arm32);
        cpu.pstate.mode = psr::MODE_SVC;
        cpu.a32_set_reg(13, 0x1000);
        cpu.pstate.mode = psr::MODE_FIQ;
        cpu.a32_set_reg(13, 0x2000);
        cpu.a32_set_reg(8, 0x42);
        cpu.pstate.mode = psr::MODE_SVC;
        assert_eq!(cpu.a32_reg(13), 0x1000);
        assert_eq!(cpu.a32_reg(8), 0); // FIQ r8 is banked
        cpu.pstate.mode = psr::MODE_FIQ;
        assert_eq!(cpu.a32_reg(13), 0x2000);
        assert_eq!(cpu.a32_reg(8), 0x42);
    }

    #[test]
    fn test_armv1_fiq_banking_starts_at_r10() {
        let mut cpu = test_cpu(Version::V1);
        cpu.set_isa(Isa::Arm26);
        cpu.pstate.mode = MODE_USR;
        cpu.a32_set_reg(8, 0x11);
        cpu.a32_set_reg(10, 0x22);
        cpu.pstate.mode = psr::MODE_FIQ;
        assert_eq!(cpu.a32_reg(8), 0x11); // shared on v1
        assert_eq!(cpu.a32_reg(10), 0); // banked on v1
    }

    #[test]
    fn test_pc_read_has_pipeline_offset() {
        let mut cpu = test_cpu(Version::V7);
        cpu.set_isa(Isa::Arm32);
        cpu.r[PC] = 0x100;
        assert_eq!(cpu.a32_reg(15), 0x104);
        cpu.set_isa(Isa::Thumb);
        assert_eq!(cpu.a32_reg(15), 0x102);
    }

    #[test]
    fn test_interworking_pc_write_switches_sets() {
        let mut cpu = test_cpu(Version::V7);
        cpu.set_isa(Isa::Arm32);
        cpu.a32_set_reg_interworking(15, 0x201);
        assert_eq!(cpu.pstate.jt, JT_THUMB);
        assert_eq!(cpu.r[PC], 0x200);
        cpu.a32_set_reg_interworking(15, 0x300);
        assert_eq!(cpu.pstate.jt, JT_ARM);
    }

    #[test]
    fn test_plain_pc_write_aligns_only() {
        let mut cpu = test_cpu(Version::V7);
        cpu.set_isa(Isa::Arm32);
        cpu.a32_set_reg(15, 0x203);
        assert_eq!(cpu.pstate.jt, JT_ARM);
        assert_eq!(cpu.r[PC], 0x200);
    }

    #[test]
    fn test_a64_zero_register() {
        let mut cpu = test_cpu(Version::V8);
        cpu.set_isa(Isa::Arm64);
        cpu.a64_set_reg64(31, true, 0x1234);
        assert_eq!(cpu.a64_reg64(31, true), 0);
        cpu.a64_set_reg64(31, false, 0x4000);
        assert_eq!(cpu.a64_reg64(31, false), 0x4000);
        assert_eq!(cpu.r[SP_EL0], 0x4000);
    }

    #[test]
    fn test_a64_sp_select() {
        let mut cpu = test_cpu(Version::V8);
        cpu.set_isa(Isa::Arm64);
        cpu.pstate.el = 1;
        cpu.pstate.sp = true;
        cpu.a64_set_reg64(31, false, 0x8000);
        assert_eq!(cpu.r[SP_EL1], 0x8000);
        assert_eq!(cpu.r[SP_EL0], 0);
    }

    #[test]
    fn test_a26_pc_packs_flags() {
        let mut cpu = test_cpu(Version::V2);
        cpu.set_isa(Isa::Arm26);
        cpu.pstate.mode = psr::MODE_SVC;
        cpu.pstate.n = true;
        cpu.pstate.i = true;
        cpu.r[PC] = 0x8000;
        let pc = cpu.a26_pc();
        assert_eq!(pc & 0x03FF_FFFC, 0x8000);
        assert_eq!(pc & 3, psr::MODE_SVC as u32 & 3);
        assert_ne!(pc & psr::CPSR_N, 0);
        assert_ne!(pc & CPSR_A26_I, 0);
    }

    #[test]
    fn test_spsr_dropped_in_user_mode() {
        let mut cpu = test_cpu(Version::V7);
        cpu.set_isa(Isa::Arm32);
        cpu.pstate.mode = MODE_USR;
        cpu.set_spsr(!0, 0xFFFF_FFFF);
        assert_eq!(cpu.spsr(), 0);
        cpu.pstate.mode = psr::MODE_SVC;
        cpu.set_spsr(psr::CPSR_N, psr::CPSR_N);
        assert_ne!(cpu.spsr() & psr::CPSR_N, 0);
    }

    #[test]
    fn test_exclusive_monitor_cleared_by_store() {
        let mut cpu = test_cpu(Version::V7);
        cpu.set_isa(Isa::Arm32);
        cpu.mark_exclusive(0x100, 4);
        assert!(cpu.check_exclusive(0x100, 4));
        cpu.a32_write32(0x102, 1, false).unwrap();
        assert!(!cpu.check_exclusive(0x100, 4));
    }

    #[test]
    fn test_jmcr_je_set_with_real_jazelle() {
        let mut config = Configuration {
            version: Version::V6,
            features: default_features(Version::V6),
            ..Configuration::default()
        };
        config.jazelle = Some(JazelleLevel::Jazelle);
        let cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::JAZELLE,
            Box::new(TestRam::new(0x100)),
        );
        assert_ne!(cpu.jmcr & JMCR_JE, 0);
    }
}
