//! Debug and system control coprocessors (slots 14 and 15)
//!
//! Slot 14 carries the ThumbEE and Jazelle control registers, slot 15 the
//! AArch32 view of the system control registers. Anything not listed traps
//! as undefined.

use crate::cpu::{Cpu, Sctlr, Scr};
use crate::exc::{Exception, ExecResult};

fn fields(opcode: u32) -> (u32, u32, u32, u32) {
    let opc1 = (opcode >> 21) & 7;
    let crn = (opcode >> 16) & 0xF;
    let crm = opcode & 0xF;
    let opc2 = (opcode >> 5) & 7;
    (opc1, crn, crm, opc2)
}

pub fn cp14_mcr(cpu: &mut Cpu, opcode: u32, value: u32) -> ExecResult {
    match fields(opcode) {
        // p14, 6, c1, c0, 0: ThumbEE handler base
        (6, 1, 0, 0) => cpu.teehbr = value,
        // p14, 7, c0-c3: Jazelle identity and control
        (7, 0, 0, 0) => {} // JIDR is read only
        (7, 1, 0, 0) => cpu.joscr = value,
        (7, 2, 0, 0) => cpu.jmcr = value,
        (7, 3, 0, 0) => cpu.jaolr = value,
        _ => return Err(Exception::Undefined),
    }
    Ok(())
}

pub fn cp14_mrc(cpu: &mut Cpu, opcode: u32) -> ExecResult<u32> {
    match fields(opcode) {
        (6, 1, 0, 0) => Ok(cpu.teehbr),
        (7, 0, 0, 0) => Ok(cpu.jidr),
        (7, 1, 0, 0) => Ok(cpu.joscr),
        (7, 2, 0, 0) => Ok(cpu.jmcr),
        (7, 3, 0, 0) => Ok(cpu.jaolr),
        _ => Err(Exception::Undefined),
    }
}

pub fn cp15_mcr(cpu: &mut Cpu, opcode: u32, value: u32) -> ExecResult {
    match fields(opcode) {
        // c1: system control
        (0, 1, 0, 0) => cpu.sctlr_el1 = Sctlr::from_bits_retain(value),
        (4, 1, 0, 0) => cpu.sctlr_el2 = Sctlr::from_bits_retain(value),
        (0, 1, 1, 0) => cpu.scr_el3 = Scr::from_bits_retain(value),
        // c7: cache and barrier maintenance, nothing to do
        (_, 7, _, _) => {}
        // c12: vector base
        (0, 12, 0, 0) => cpu.vbar_el1 = value as u64,
        (4, 12, 0, 0) => cpu.vbar_el2 = value as u64,
        _ => return Err(Exception::Undefined),
    }
    Ok(())
}

pub fn cp15_mrc(cpu: &mut Cpu, opcode: u32) -> ExecResult<u32> {
    match fields(opcode) {
        // c0: identification
        (0, 0, 0, 0) | (0, 0, 0, 4) | (0, 0, 0, 7) => Ok(cpu.midr()),
        (0, 0, 1, 0) => Ok(cpu.id_pfr0()),
        // c1: system control
        (0, 1, 0, 0) => Ok(cpu.sctlr_el1.bits()),
        (4, 1, 0, 0) => Ok(cpu.sctlr_el2.bits()),
        (0, 1, 1, 0) => Ok(cpu.scr_el3.bits()),
        (_, 7, _, _) => Ok(0),
        (0, 12, 0, 0) => Ok(cpu.vbar_el1 as u32),
        (4, 12, 0, 0) => Ok(cpu.vbar_el2 as u32),
        _ => Err(Exception::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, Configuration, IsaSet, Version};
    use crate::testutil::TestRam;

    fn cpu() -> Cpu {
        let config = Configuration {
            version: Version::V7,
            features: default_features(Version::V7),
            ..Configuration::default()
        };
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB,
            Box::new(TestRam::new(0x100)),
        );
        cpu.set_isa(crate::config::Isa::Arm32);
        cpu
    }

    // mcr/mrc p15, opc1, rt, crn, crm, opc2
    fn sysreg(opc1: u32, crn: u32, crm: u32, opc2: u32) -> u32 {
        opc1 << 21 | crn << 16 | 0xF00 | opc2 << 5 | crm
    }

    #[test]
    fn test_sctlr_round_trip() {
        let mut cpu = cpu();
        let op = sysreg(0, 1, 0, 0);
        cp15_mcr(&mut cpu, op, (Sctlr::A | Sctlr::V).bits()).unwrap();
        assert!(cpu.sctlr_el1.contains(Sctlr::A | Sctlr::V));
        assert_eq!(cp15_mrc(&mut cpu, op).unwrap(), (Sctlr::A | Sctlr::V).bits());
    }

    #[test]
    fn test_cache_ops_are_nops() {
        let mut cpu = cpu();
        assert!(cp15_mcr(&mut cpu, sysreg(0, 7, 5, 0), 0).is_ok());
    }

    #[test]
    fn test_unknown_register_is_undefined() {
        let mut cpu = cpu();
        assert_eq!(
            cp15_mrc(&mut cpu, sysreg(3, 9, 9, 3)),
            Err(Exception::Undefined)
        );
    }

    #[test]
    fn test_jazelle_registers_via_cp14() {
        let mut cpu = cpu();
        cp14_mcr(&mut cpu, sysreg(7, 1, 0, 0), 0x2000_0000).unwrap();
        assert_eq!(cpu.joscr, 0x2000_0000);
        // JIDR writes are dropped
        cp14_mcr(&mut cpu, sysreg(7, 0, 0, 0), 0x1234).unwrap();
        assert_eq!(cp14_mrc(&mut cpu, sysreg(7, 0, 0, 0)).unwrap(), 0);
    }
}
