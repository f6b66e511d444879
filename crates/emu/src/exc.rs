//! Exception and trap delivery
//!
//! Every fault raised while executing an instruction travels as the `Err`
//! side of [`ExecResult`] until it reaches `step`, which hands it to the
//! delivery pipeline here. Delivery either records a typed result code for
//! the host (capture mode) or performs the architectural vector transfer:
//! save the return state, switch mode, and branch into the vector table.

use crate::cpu::{reg::*, Cpu, Sctlr, Scr, Hcr, J32_EXCEPTION_DISABLED, J32_EXCEPTION_INVALID,
    J32_EXCEPTION_NULLPTR, J32_EXCEPTION_OUT_OF_BOUNDS, J32_EXCEPTION_PREFETCH_ABORT};
use crate::config::{Isa, Version};
use crate::psr::{RegWidth, JT_ARM, JT_THUMB, MODE_ABT, MODE_FIQ, MODE_HYP, MODE_IRQ, MODE_SVC,
    MODE_MON, MODE_UND};

/// Outcome of one `step`, as observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmuResult {
    #[default]
    Ok,
    Reset,
    Svc,
    Undefined,
    PrefetchAbort,
    DataAbort,
    Address26,
    Irq,
    Fiq,
    Breakpoint,
    Unaligned,
    UnalignedPc,
    UnalignedSp,
    SError,
    Smc,
    Hvc,
    SoftwareStep,
    JazelleUndefined,
    JazelleNullptr,
    JazelleOutOfBounds,
    JazelleDisabled,
    JazelleInvalid,
    JazellePrefetchAbort,
    ThumbEeOutOfBounds,
    ThumbEeNullptr,
}

impl EmuResult {
    pub fn name(self) -> &'static str {
        match self {
            EmuResult::Ok => "OK",
            EmuResult::Reset => "RESET",
            EmuResult::Svc => "SVC",
            EmuResult::Undefined => "UNDEFINED",
            EmuResult::PrefetchAbort => "PREFETCH ABORT",
            EmuResult::DataAbort => "DATA ABORT",
            EmuResult::Address26 => "ADDRESS (in 26-bit mode)",
            EmuResult::Irq => "IRQ",
            EmuResult::Fiq => "FIQ",
            EmuResult::Breakpoint => "BREAKPOINT",
            EmuResult::Unaligned => "UNALIGNED",
            EmuResult::UnalignedPc => "UNALIGNED PC",
            EmuResult::UnalignedSp => "UNALIGNED SP",
            EmuResult::SError => "SERROR",
            EmuResult::Smc => "SMC",
            EmuResult::Hvc => "HVC",
            EmuResult::SoftwareStep => "SOFTWARE STEP",
            EmuResult::JazelleUndefined => "UNDEFINED (Jazelle)",
            EmuResult::JazelleNullptr => "NULL POINTER (Jazelle)",
            EmuResult::JazelleOutOfBounds => "OUT OF BOUNDS (Jazelle)",
            EmuResult::JazelleDisabled => "JAZELLE DISABLED",
            EmuResult::JazelleInvalid => "JAZELLE INVALID",
            EmuResult::JazellePrefetchAbort => "PREFETCH ABORT (Jazelle)",
            EmuResult::ThumbEeOutOfBounds => "OUT OF BOUNDS (ThumbEE)",
            EmuResult::ThumbEeNullptr => "NULL POINTER (ThumbEE)",
        }
    }
}

impl std::fmt::Display for EmuResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An exception in flight, raised by an executor and consumed by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Reset,
    Undefined,
    Svc,
    Hvc,
    Smc,
    PrefetchAbort,
    DataAbort,
    /// ARMv3 26-bit address exception.
    Address26,
    Irq,
    Fiq,
    SError,
    Breakpoint,
    Unaligned,
    UnalignedPc,
    UnalignedSp,
    SoftwareStep,
    /// Jazelle break with its software-handler-table index.
    JazelleBreak(u32),
    ThumbEeNullptr,
    ThumbEeOutOfBounds,
}

pub type ExecResult<T = ()> = Result<T, Exception>;

// AArch32 vector table offsets
pub const A32_VECTOR_RESET: u32 = 0x0000_0000;
pub const A32_VECTOR_UNDEFINED: u32 = 0x0000_0004;
pub const A32_VECTOR_SWI: u32 = 0x0000_0008;
pub const A32_VECTOR_PREFETCH_ABORT: u32 = 0x0000_000C;
pub const A32_VECTOR_DATA_ABORT: u32 = 0x0000_0010;
pub const A32_VECTOR_ADDRESS: u32 = 0x0000_0014;
pub const A32_VECTOR_IRQ: u32 = 0x0000_0018;
pub const A32_VECTOR_FIQ: u32 = 0x0000_001C;

// AArch64 vector table offsets within a VBAR block
pub const A64_VECTOR_SYNCHRONOUS: u32 = 0x000;
pub const A64_VECTOR_IRQ: u32 = 0x080;
pub const A64_VECTOR_FIQ: u32 = 0x100;
pub const A64_VECTOR_SERROR: u32 = 0x180;

impl Cpu {
    /// Whether `selected_el` executes in AArch64, given the RW bits of the
    /// controlling registers.
    pub(crate) fn el_uses_aarch64(&self, selected_el: u8) -> bool {
        if selected_el >= self.lowest_64bit_only_el {
            return true;
        }
        if selected_el == 3 {
            return false;
        }
        if self.el3_supported && !self.scr_el3.contains(Scr::RW) {
            return false;
        }
        if selected_el == 2 {
            return true;
        }
        if self.el2_supported
            && !self.hcr_el2.contains(Hcr::RW)
            && !self.hcr_el2.contains(Hcr::E2H | Hcr::TGE)
        {
            return false;
        }
        if selected_el == 1 {
            return true;
        }
        self.pstate.rw == RegWidth::W64
    }

    /// End the step with a captured result code instead of a transfer.
    fn break_emulation(&mut self, result: EmuResult) {
        self.t32_advance_it();
        self.result = result;
    }

    /// Architectural AArch32 exception entry.
    pub(crate) fn a32_exception(&mut self, address: u32, mode: u8) {
        self.t32_advance_it();
        self.clear_exclusive();

        let prog26 = self.is_prog26();
        if !prog26 {
            if mode == MODE_HYP {
                self.r[ELR_HYP] = self.r[PC];
            } else {
                let pc = self.r[PC];
                self.a32_set_reg_mode(mode, 14, pc);
            }
            let cpsr = self.cpsr();
            if let Some(slot) = self.spsr_slot_for_mode(mode) {
                self.r[slot] = cpsr as u64;
            }
        } else {
            let packed = self.a26_pc();
            self.a32_set_reg_mode(mode, 14, packed as u64);
        }

        let mut target = address;
        if self.sctlr_el1.contains(Sctlr::V) {
            // v5 high vectors
            target = target.wrapping_add(0xFFFF_0000);
        }
        self.r[PC] = target as u64;

        self.pstate.i = true;
        self.pstate.mode = mode;
        self.pstate.rw = if prog26 { RegWidth::W26 } else { RegWidth::W32 };
        if address == A32_VECTOR_RESET || address == A32_VECTOR_FIQ {
            self.pstate.f = true;
        }
        self.pstate.jt =
            if self.config.version >= Version::V7 && self.sctlr_el1.contains(Sctlr::TE) {
                JT_THUMB
            } else {
                JT_ARM
            };
        self.pstate.e = self.config.version >= Version::V6 && self.sctlr_el1.contains(Sctlr::EE);
        if self.config.version >= Version::V6
            && address != A32_VECTOR_UNDEFINED
            && address != A32_VECTOR_SWI
        {
            self.pstate.a = true;
        }
        self.pstate.it = 0;
        if self.config.version >= Version::V8 {
            self.pstate.ss = true;
            self.pstate.il = true;
        }
        if self.config.version >= Version::V8_1 {
            self.pstate.pan = self.sctlr_el1.contains(Sctlr::SPAN);
        }
    }

    /// Architectural AArch64 exception entry into `target_el` (1..=3).
    pub(crate) fn a64_exception(&mut self, vector_offset: u32, target_el: u8) {
        self.t32_advance_it();
        self.clear_exclusive();

        let target_el = target_el.clamp(1, 3);
        let mut address = vector_offset;
        if target_el > self.pstate.el || self.pstate.rw != RegWidth::W64 {
            // taken from a lower (or 32-bit) exception level
            address += if self.pstate.rw == RegWidth::W64 { 0x400 } else { 0x600 };
        } else if self.pstate.sp {
            address += 0x200;
        }

        let vbar = match target_el {
            1 => self.vbar_el1,
            2 => self.vbar_el2,
            _ => self.vbar_el3,
        };
        let address = (vbar & !0x7FF) + address as u64;

        self.r[ELR_EL1 - 1 + target_el as usize] = self.r[PC];
        self.r[SPSR_EL1 - 1 + target_el as usize] = self.a64_cpsr() as u64;

        self.r[PC] = address;

        self.pstate.rw = RegWidth::W64;
        self.pstate.jt = JT_ARM;
        self.pstate.el = target_el;
        self.pstate.sp = true;

        self.pstate.d = true;
        self.pstate.a = true;
        self.pstate.i = true;
        self.pstate.f = true;

        self.pstate.it = 0;
        self.pstate.ss = false;
        self.pstate.il = false;

        if self.config.version >= Version::V8_1 {
            self.pstate.pan = self.sctlr_el1.contains(Sctlr::SPAN);
        }
    }

    /// Exception return in AArch32 state.
    pub fn a32_eret(&mut self) {
        if self.pstate.mode == MODE_HYP {
            self.r[PC] = self.r[ELR_HYP];
        } else {
            self.r[PC] = self.a32_reg_mode(self.pstate.mode, 14);
        }
        let spsr = self.spsr();
        self.set_cpsr(!0, spsr);
    }

    /// Exception return in AArch64 state.
    pub fn a64_eret(&mut self) {
        let el = self.pstate.el.clamp(1, 3) as usize;
        self.r[PC] = self.r[ELR_EL1 - 1 + el];
        let spsr = self.r[SPSR_EL1 - 1 + el] as u32;
        self.a64_set_cpsr(spsr);
    }

    /// Request a reset; vectors to the highest implemented exception level.
    pub fn reset(&mut self) {
        self.result = EmuResult::Ok;
        self.deliver(Exception::Reset);
    }

    /// Signal an interrupt from the host.
    pub fn raise_irq(&mut self) {
        self.result = EmuResult::Ok;
        self.old_pc = self.r[PC];
        self.deliver(Exception::Irq);
    }

    /// Signal a fast interrupt from the host.
    pub fn raise_fiq(&mut self) {
        self.result = EmuResult::Ok;
        self.old_pc = self.r[PC];
        self.deliver(Exception::Fiq);
    }

    /// Signal a system error from the host.
    pub fn raise_serror(&mut self) {
        self.result = EmuResult::Ok;
        self.old_pc = self.r[PC];
        self.deliver(Exception::SError);
    }

    fn a32_undefined_mode(&self) -> u8 {
        if !self.is_prog26() { MODE_UND } else { MODE_SVC }
    }

    fn a32_abort_mode(&self) -> u8 {
        if !self.is_prog26() { MODE_ABT } else { MODE_SVC }
    }

    /// Deliver a raised exception: capture it or take the vector.
    pub(crate) fn deliver(&mut self, exc: Exception) {
        let el1 = 1.max(self.pstate.el);
        match exc {
            Exception::Reset => {
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Reset);
                } else if self.el3_supported {
                    if self.lowest_64bit_only_el <= 3 {
                        self.a64_exception(A64_VECTOR_SYNCHRONOUS, 3);
                    } else {
                        self.a32_exception(A32_VECTOR_RESET, MODE_SVC);
                    }
                } else if self.el2_supported {
                    if self.lowest_64bit_only_el <= 2 {
                        self.a64_exception(A64_VECTOR_SYNCHRONOUS, 2);
                    } else {
                        self.a32_exception(A32_VECTOR_RESET, MODE_HYP);
                    }
                } else if self.lowest_64bit_only_el <= 1 {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, 1);
                } else {
                    self.a32_exception(A32_VECTOR_RESET, MODE_SVC);
                }
            }

            Exception::Undefined => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Undefined);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                } else {
                    match self.current_isa() {
                        Isa::Arm26 | Isa::Arm32 => self.r[PC] += 4,
                        Isa::Thumb | Isa::ThumbEe => self.r[PC] += 2,
                        // Jazelle cannot issue an undefined instruction
                        // exception, and A64 never reaches this path
                        _ => {}
                    }
                    let mode = self.a32_undefined_mode();
                    self.a32_exception(A32_VECTOR_UNDEFINED, mode);
                }
            }

            Exception::Svc => {
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Svc);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                } else {
                    self.a32_exception(A32_VECTOR_SWI, MODE_SVC);
                }
            }

            Exception::Hvc => {
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Hvc);
                } else if self.el_uses_aarch64(2) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, 2.max(self.pstate.el));
                } else {
                    self.a32_exception(A32_VECTOR_SWI, MODE_HYP);
                }
            }

            Exception::Smc => {
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Smc);
                } else if self.el_uses_aarch64(3) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, 3);
                } else {
                    self.a32_exception(A32_VECTOR_SWI, MODE_MON);
                }
            }

            Exception::PrefetchAbort => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::PrefetchAbort);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                } else {
                    self.r[PC] += 4;
                    let mode = self.a32_abort_mode();
                    self.a32_exception(A32_VECTOR_PREFETCH_ABORT, mode);
                }
            }

            Exception::DataAbort => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::DataAbort);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                } else {
                    self.r[PC] += 8;
                    let mode = self.a32_abort_mode();
                    self.a32_exception(A32_VECTOR_DATA_ABORT, mode);
                }
            }

            // only ARMv3, in 26-bit mode
            Exception::Address26 => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Address26);
                } else {
                    self.r[PC] += 8;
                    self.a32_exception(A32_VECTOR_ADDRESS, MODE_SVC);
                }
            }

            Exception::Irq => {
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Irq);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_IRQ, el1);
                } else {
                    self.r[PC] += 4;
                    self.a32_exception(A32_VECTOR_IRQ, MODE_IRQ);
                }
            }

            Exception::Fiq => {
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Fiq);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_FIQ, el1);
                } else {
                    self.r[PC] += 4;
                    self.a32_exception(A32_VECTOR_FIQ, MODE_FIQ);
                }
            }

            Exception::SError => {
                if self.capture_breaks {
                    self.break_emulation(EmuResult::SError);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SERROR, el1);
                } else {
                    self.r[PC] += 4;
                    self.a32_exception(A32_VECTOR_DATA_ABORT, MODE_ABT);
                }
            }

            Exception::Breakpoint => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Breakpoint);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                } else {
                    // prefetch abort; not defined on 26-bit processors
                    self.r[PC] += 4;
                    self.a32_exception(A32_VECTOR_PREFETCH_ABORT, MODE_ABT);
                }
            }

            Exception::Unaligned => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::Unaligned);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                } else {
                    // reported as a data abort
                    self.r[PC] += 8;
                    let mode = self.a32_abort_mode();
                    self.a32_exception(A32_VECTOR_DATA_ABORT, mode);
                }
            }

            Exception::UnalignedPc => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::UnalignedPc);
                } else if self.el_uses_aarch64(1) {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                } else {
                    // prefetch abort; not defined on 26-bit processors
                    self.r[PC] += 4;
                    self.a32_exception(A32_VECTOR_PREFETCH_ABORT, MODE_ABT);
                }
            }

            Exception::UnalignedSp => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::UnalignedSp);
                } else {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                }
            }

            Exception::SoftwareStep => {
                self.r[PC] = self.old_pc;
                if self.capture_breaks {
                    self.break_emulation(EmuResult::SoftwareStep);
                } else {
                    self.a64_exception(A64_VECTOR_SYNCHRONOUS, el1);
                }
            }

            Exception::JazelleBreak(index) => {
                crate::exec::jazelle::spill_fast_stack(self);
                self.r[PC] = self.old_pc;
                if !self.capture_breaks {
                    let pc = self.r[PC] as u32;
                    self.a32_set_reg(A32_LR, pc);
                    self.pstate.jt = JT_ARM;
                    let sht = self.a32_reg(crate::exec::jazelle::J32_SHT);
                    self.r[PC] = ((sht & 0xFFFF_F000) + (index << 2)) as u64;
                } else {
                    self.result = match index {
                        J32_EXCEPTION_NULLPTR => EmuResult::JazelleNullptr,
                        J32_EXCEPTION_OUT_OF_BOUNDS => EmuResult::JazelleOutOfBounds,
                        J32_EXCEPTION_DISABLED => EmuResult::JazelleDisabled,
                        J32_EXCEPTION_INVALID => EmuResult::JazelleInvalid,
                        J32_EXCEPTION_PREFETCH_ABORT => EmuResult::JazellePrefetchAbort,
                        _ => EmuResult::JazelleUndefined,
                    };
                }
            }

            Exception::ThumbEeNullptr => {
                if !self.capture_breaks {
                    let lr = self.r[PC] as u32 | 1;
                    self.a32_set_reg(A32_LR, lr);
                    self.pstate.it = 0;
                    self.r[PC] = (self.teehbr.wrapping_sub(4)) as u64;
                } else {
                    self.result = EmuResult::ThumbEeNullptr;
                }
            }

            Exception::ThumbEeOutOfBounds => {
                if !self.capture_breaks {
                    let lr = self.r[PC] as u32 | 1;
                    self.a32_set_reg(A32_LR, lr);
                    self.pstate.it = 0;
                    self.r[PC] = (self.teehbr.wrapping_sub(8)) as u64;
                } else {
                    self.result = EmuResult::ThumbEeOutOfBounds;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, Configuration, IsaSet};
    use crate::testutil::TestRam;

    fn cpu32() -> Cpu {
        let config = Configuration {
            version: Version::V7,
            features: default_features(Version::V7),
            ..Configuration::default()
        };
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB,
            Box::new(TestRam::new(0x2_0000)),
        );
        cpu.set_isa(Isa::Arm32);
        cpu
    }

    #[test]
    fn test_captured_fault_sets_result() {
        let mut cpu = cpu32();
        cpu.capture_breaks = true;
        cpu.old_pc = 0x100;
        cpu.r[PC] = 0x104;
        cpu.deliver(Exception::DataAbort);
        assert_eq!(cpu.result, EmuResult::DataAbort);
        // PC rewound to the faulting instruction
        assert_eq!(cpu.r[PC], 0x100);
    }

    #[test]
    fn test_svc_vector_transfer() {
        let mut cpu = cpu32();
        cpu.pstate.mode = crate::psr::MODE_USR;
        cpu.r[PC] = 0x104; // already past the SVC
        cpu.deliver(Exception::Svc);
        assert_eq!(cpu.r[PC], A32_VECTOR_SWI as u64);
        assert_eq!(cpu.pstate.mode, MODE_SVC);
        assert!(cpu.pstate.i);
        // LR_svc holds the return address
        assert_eq!(cpu.a32_reg_mode(MODE_SVC, 14), 0x104);
    }

    #[test]
    fn test_undefined_saves_next_pc_in_lr() {
        let mut cpu = cpu32();
        cpu.old_pc = 0x200;
        cpu.r[PC] = 0x204;
        cpu.deliver(Exception::Undefined);
        assert_eq!(cpu.pstate.mode, MODE_UND);
        assert_eq!(cpu.a32_reg_mode(MODE_UND, 14), 0x204);
        assert_eq!(cpu.r[PC], A32_VECTOR_UNDEFINED as u64);
    }

    #[test]
    fn test_high_vectors() {
        let mut cpu = cpu32();
        cpu.sctlr_el1 |= Sctlr::V;
        cpu.deliver(Exception::Svc);
        assert_eq!(cpu.r[PC], 0xFFFF_0008);
    }

    #[test]
    fn test_exception_zeroes_it_state() {
        let mut cpu = cpu32();
        cpu.set_isa(Isa::Thumb);
        cpu.pstate.it = 0xA4;
        cpu.deliver(Exception::Svc);
        assert_eq!(cpu.pstate.it, 0);
    }

    #[test]
    fn test_exception_clears_exclusive_monitor() {
        let mut cpu = cpu32();
        cpu.mark_exclusive(0x100, 4);
        cpu.deliver(Exception::Svc);
        assert!(!cpu.check_exclusive(0x100, 4));
    }

    #[test]
    fn test_a64_exception_offsets() {
        let config = Configuration {
            version: Version::V8,
            features: default_features(Version::V8),
            ..Configuration::default()
        };
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB | IsaSet::ARM64,
            Box::new(TestRam::new(0x2_0000)),
        );
        cpu.set_isa(Isa::Arm64);
        cpu.vbar_el1 = 0x8000;
        cpu.pstate.el = 0;
        cpu.r[PC] = 0x1000;
        cpu.deliver(Exception::Svc);
        // from EL0 (AArch64) into EL1: lower-EL AArch64 vector
        assert_eq!(cpu.r[PC], 0x8000 + 0x400);
        assert_eq!(cpu.pstate.el, 1);
        assert!(cpu.pstate.sp);
        assert_eq!(cpu.r[ELR_EL1], 0x1000);

        // same EL with SP_EL1 selected
        cpu.r[PC] = 0x2000;
        cpu.deliver(Exception::Svc);
        assert_eq!(cpu.r[PC], 0x8000 + 0x200);
        assert_eq!(cpu.r[ELR_EL1], 0x2000);
    }

    #[test]
    fn test_a64_eret_restores_state() {
        let config = Configuration {
            version: Version::V8,
            features: default_features(Version::V8),
            ..Configuration::default()
        };
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB | IsaSet::ARM64,
            Box::new(TestRam::new(0x2_0000)),
        );
        cpu.set_isa(Isa::Arm64);
        cpu.r[PC] = 0x1000;
        cpu.deliver(Exception::Svc);
        cpu.a64_eret();
        assert_eq!(cpu.r[PC], 0x1000);
        assert_eq!(cpu.pstate.el, 0);
    }

    #[test]
    fn test_reset_prefers_highest_el() {
        let config = Configuration {
            version: Version::V8,
            features: default_features(Version::V8),
            ..Configuration::default()
        };
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB | IsaSet::ARM64,
            Box::new(TestRam::new(0x2_0000)),
        );
        cpu.set_isa(Isa::Arm64);
        cpu.reset();
        assert_eq!(cpu.pstate.el, 3);
    }
}
