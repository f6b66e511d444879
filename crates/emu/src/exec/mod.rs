//! Instruction execution
//!
//! One executor per instruction set, all sharing the register file and
//! PSTATE. `Cpu::step` is the only progression primitive: it runs a single
//! instruction to completion or hands the raised exception to the delivery
//! pipeline, then returns.

pub mod a32;
pub mod a64;
pub mod jazelle;
pub mod t32;

use crate::cpu::{reg::PC, Cpu};
use crate::exc::EmuResult;
use crate::psr::{RegWidth, JT_ARM, JT_JAZELLE, JT_THUMB};

impl Cpu {
    /// Execute one instruction. On return, `self.result` holds `Ok` or the
    /// captured fault code.
    pub fn step(&mut self) {
        self.result = EmuResult::Ok;
        self.old_pc = self.r[PC];
        let outcome = match self.pstate.rw {
            RegWidth::W26 => a32::step(self),
            RegWidth::W32 => match self.pstate.jt {
                JT_ARM => a32::step(self),
                JT_THUMB => t32::step(self),
                JT_JAZELLE => jazelle::step(self),
                _ => t32::step(self),
            },
            RegWidth::W64 => a64::step(self),
        };
        if let Err(exception) = outcome {
            self.deliver(exception);
        }
    }
}
