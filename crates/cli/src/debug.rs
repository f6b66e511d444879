//! Processor state display and step-to-step change highlighting
//!
//! Captures a register snapshot before each step; the printer renders the
//! current state with ANSI bold on everything that changed, plus the
//! memory range the last instruction touched and a window onto the top of
//! the Jazelle operand stack.

use std::io::Write;

use armemu::config::Isa;
use armemu::cpu::reg;
use armemu::exec::jazelle;
use armemu::psr::{Pstate, RegWidth, JT_JAZELLE};
use armemu::Cpu;

pub const ANSI_BOLD: &str = "\x1b[1m";
pub const ANSI_RESET: &str = "\x1b[m";

/// One snapshot of the observable register state.
#[derive(Clone)]
pub struct DebugState {
    /// 31 registers plus SP and PC.
    pub r: [u64; 33],
    pub cpsr: u32,
    pub pstate: Pstate,

    // old floating point
    pub fpa: [f64; 8],

    // new floating point
    pub format_bits: u32,
    pub w: [u64; 32],

    /// Top four elements of the Jazelle stack (possibly register-cached)
    /// and the flushed stack pointer.
    pub j32_stack: [u32; 4],
    pub j32_stack_pointer: u32,

    /// If lowest > highest, no memory changed.
    pub memory_changed_lowest: u64,
    pub memory_changed_highest: u64,
}

fn j32_stack_value(cpu: &mut Cpu, index: u32) -> u32 {
    let size = jazelle::fast_stack_size(cpu);
    if index < size {
        let regnum = jazelle::fast_stack_element(cpu, index);
        cpu.a32_reg(regnum as usize)
    } else {
        let below = index - size;
        let tos = cpu.a32_reg(jazelle::J32_TOS) as u64;
        cpu.read32_data(tos - 4 * (1 + below) as u64)
    }
}

pub fn capture(cpu: &mut Cpu) -> DebugState {
    let mut state = DebugState {
        r: [0; 33],
        cpsr: 0,
        pstate: cpu.pstate,
        fpa: cpu.fpa.f,
        format_bits: cpu.vfp.format_bits,
        w: cpu.vfp.w,
        j32_stack: [0; 4],
        j32_stack_pointer: 0,
        memory_changed_lowest: u64::MAX,
        memory_changed_highest: 0,
    };

    match cpu.pstate.rw {
        RegWidth::W26 | RegWidth::W32 => {
            for i in 0..15 {
                state.r[i] = cpu.a32_reg(i) as u64;
            }
            state.r[32] = cpu.a32_reg_lhs(reg::A32_PC_NUM) as u64;
            state.cpsr = cpu.cpsr();
        }
        RegWidth::W64 => {
            for i in 0..32 {
                state.r[i] = cpu.a64_reg64(i, false);
            }
            state.r[32] = cpu.r[reg::PC];
        }
    }

    if cpu.pstate.jt == JT_JAZELLE {
        for i in 0..4 {
            state.j32_stack[i] = j32_stack_value(cpu, i as u32);
        }
        state.j32_stack_pointer =
            cpu.a32_reg(jazelle::J32_TOS) + 4 * jazelle::fast_stack_size(cpu);
    }

    state
}

fn flags_line(ps: &Pstate) -> String {
    let flag = |set: bool, name: char| if set { name } else { '-' };
    format!(
        "{}{}{}{}{} ge={:X} it={:02X} mode={:X}",
        flag(ps.n, 'N'),
        flag(ps.z, 'Z'),
        flag(ps.c, 'C'),
        flag(ps.v, 'V'),
        flag(ps.q, 'Q'),
        ps.ge,
        ps.it,
        ps.mode,
    )
}

fn print_value(out: &mut dyn Write, label: &str, value: u64, changed: bool, width: usize) {
    if changed {
        let _ = write!(out, "{label}={ANSI_BOLD}{value:0width$X}{ANSI_RESET} ");
    } else {
        let _ = write!(out, "{label}={value:0width$X} ");
    }
}

/// Print the current state; entries that differ from `old` come out bold.
pub fn print(out: &mut dyn Write, cpu: &mut Cpu, old: &DebugState) {
    let new = capture(cpu);

    match cpu.pstate.rw {
        RegWidth::W26 | RegWidth::W32 => {
            for i in 0..15 {
                print_value(out, &format!("r{i}"), new.r[i], new.r[i] != old.r[i], 8);
                if i % 8 == 7 {
                    let _ = writeln!(out);
                }
            }
            print_value(out, "pc", new.r[32], new.r[32] != old.r[32], 8);
            let _ = writeln!(out);
            let changed = new.cpsr != old.cpsr;
            if changed {
                let _ = writeln!(
                    out,
                    "cpsr={ANSI_BOLD}{:08X}{ANSI_RESET} {}",
                    new.cpsr,
                    flags_line(&new.pstate)
                );
            } else {
                let _ = writeln!(out, "cpsr={:08X} {}", new.cpsr, flags_line(&new.pstate));
            }
        }
        RegWidth::W64 => {
            for i in 0..31 {
                print_value(out, &format!("x{i}"), new.r[i], new.r[i] != old.r[i], 16);
                if i % 4 == 3 {
                    let _ = writeln!(out);
                }
            }
            print_value(out, "sp", new.r[31], new.r[31] != old.r[31], 16);
            print_value(out, "pc", new.r[32], new.r[32] != old.r[32], 16);
            let _ = writeln!(out);
            let _ = writeln!(out, "pstate el={} {}", new.pstate.el, flags_line(&new.pstate));
        }
    }

    if cpu.config.has_vfp_registers() {
        for i in 0..16 {
            let changed = new.w[i] != old.w[i];
            print_value(out, &format!("d{i}"), new.w[i], changed, 16);
            if i % 4 == 3 {
                let _ = writeln!(out);
            }
        }
    } else if cpu.config.features.contains(armemu::Features::FPA) {
        for i in 0..8 {
            let changed = new.fpa[i].to_bits() != old.fpa[i].to_bits();
            if changed {
                let _ = write!(out, "f{i}={ANSI_BOLD}{}{ANSI_RESET} ", new.fpa[i]);
            } else {
                let _ = write!(out, "f{i}={} ", new.fpa[i]);
            }
        }
        let _ = writeln!(out);
    }

    if cpu.current_isa() == Isa::Jazelle {
        let _ = write!(out, "stack:");
        for i in 0..4 {
            let changed = new.j32_stack[i] != old.j32_stack[i];
            if changed {
                let _ = write!(out, " {ANSI_BOLD}{:08X}{ANSI_RESET}", new.j32_stack[i]);
            } else {
                let _ = write!(out, " {:08X}", new.j32_stack[i]);
            }
        }
        let _ = writeln!(out, " tos={:08X}", new.j32_stack_pointer);
    }

    if old.memory_changed_lowest <= old.memory_changed_highest {
        let _ = writeln!(
            out,
            "memory changed: {:08X}-{:08X}",
            old.memory_changed_lowest, old.memory_changed_highest
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armemu::config::{default_features, Configuration, IsaSet, Version};
    use armemu::MemoryInterface;

    struct NullMemory;

    impl MemoryInterface for NullMemory {
        fn read(&mut self, _address: u64, buffer: &mut [u8], _privileged: bool) -> bool {
            buffer.fill(0);
            true
        }
        fn write(&mut self, _address: u64, _buffer: &[u8], _privileged: bool) -> bool {
            true
        }
    }

    #[test]
    fn test_changed_register_is_bold() {
        let config = Configuration {
            version: Version::V7,
            features: default_features(Version::V7),
            ..Configuration::default()
        };
        let mut cpu = Cpu::new(config, IsaSet::ARM32 | IsaSet::THUMB, Box::new(NullMemory));
        cpu.set_isa(Isa::Arm32);
        let before = capture(&mut cpu);
        cpu.a32_set_reg(3, 0x42);
        let mut buffer = Vec::new();
        print(&mut buffer, &mut cpu, &before);
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains(&format!("r3={ANSI_BOLD}00000042")));
        assert!(text.contains("r4=00000000"));
    }
}
