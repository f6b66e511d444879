//! Coprocessor dispatch
//!
//! A 16-slot table of operation hooks, indexed by the coprocessor number in
//! bits 8-11 of the opcode. Every hook receives the full opcode and decodes
//! its own sub-fields. Missing hooks make the instruction undefined.

pub mod fpa;
pub mod system;
pub mod vfp;

use crate::config::{Features, Version};
use crate::cpu::{reg::A32_PC_NUM, Cpu, Sctlr};
use crate::exc::{Exception, ExecResult};

/// Operation hooks of one coprocessor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoprocOps {
    pub cdp: Option<fn(&mut Cpu, u32) -> ExecResult>,
    pub ldc_stc: Option<fn(&mut Cpu, u32, u32) -> ExecResult>,
    pub mcr: Option<fn(&mut Cpu, u32, u32) -> ExecResult>,
    pub mcrr: Option<fn(&mut Cpu, u32, u32, u32) -> ExecResult>,
    pub mrc: Option<fn(&mut Cpu, u32) -> ExecResult<u32>>,
    pub mrrc: Option<fn(&mut Cpu, u32) -> ExecResult<(u32, u32)>>,
}

/// Wire up the coprocessor table for the configured feature set.
pub(crate) fn install_coprocessors(cpu: &mut Cpu) {
    if cpu.config.features.contains(Features::FPA) {
        cpu.coproc[1] = CoprocOps {
            cdp: Some(fpa::cp1_cdp),
            ldc_stc: Some(fpa::cp1_ldc_stc),
            mcr: Some(fpa::cp1_mcr),
            mrc: Some(fpa::cp1_mrc),
            ..CoprocOps::default()
        };
        cpu.coproc[2] = CoprocOps {
            ldc_stc: Some(fpa::cp2_ldc_stc),
            ..CoprocOps::default()
        };
    }
    if cpu.config.has_vfp_registers() {
        cpu.coproc[10] = CoprocOps {
            cdp: Some(vfp::cp10_cdp),
            ldc_stc: Some(vfp::cp10_ldc_stc),
            mcr: Some(vfp::cp10_mcr),
            mrc: Some(vfp::cp10_mrc),
            mcrr: Some(vfp::cp10_mcrr),
            mrrc: Some(vfp::cp10_mrrc),
        };
        cpu.coproc[11] = CoprocOps {
            cdp: Some(vfp::cp11_cdp),
            ldc_stc: Some(vfp::cp11_ldc_stc),
            mcr: Some(vfp::cp11_mcr),
            mrc: Some(vfp::cp11_mrc),
            mcrr: Some(vfp::cp11_mcrr),
            mrrc: Some(vfp::cp11_mrrc),
        };
    }
    cpu.coproc[14] = CoprocOps {
        mcr: Some(system::cp14_mcr),
        mrc: Some(system::cp14_mrc),
        ..CoprocOps::default()
    };
    cpu.coproc[15] = CoprocOps {
        mcr: Some(system::cp15_mcr),
        mrc: Some(system::cp15_mrc),
        ..CoprocOps::default()
    };
}

fn coproc_index(opcode: u32) -> usize {
    ((opcode >> 8) & 0xF) as usize
}

pub(crate) fn a32_perform_cdp(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    match cpu.coproc[coproc_index(opcode)].cdp {
        Some(hook) => hook(cpu, opcode),
        None => Err(Exception::Undefined),
    }
}

/// Compute the LDC/STC transfer address and hand it to the coprocessor.
pub(crate) fn a32_perform_ldc_stc(
    cpu: &mut Cpu,
    opcode: u32,
    base: usize,
    offset: u32,
    preindexed: bool,
    writeback: bool,
) -> ExecResult {
    let hook = cpu.coproc[coproc_index(opcode)]
        .ldc_stc
        .ok_or(Exception::Undefined)?;

    let mut address = cpu.a32_reg(base);
    if base == A32_PC_NUM {
        address &= !3;
    }
    crate::exec::t32::e32_check_nullptr(cpu, address)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }

    if cpu.config.version <= Version::V6 && !cpu.sctlr_el1.contains(Sctlr::U) {
        address &= !3;
    } else if address & 3 != 0 {
        return Err(Exception::Unaligned);
    }

    hook(cpu, opcode, address)?;

    if writeback {
        let mut address = address;
        if !preindexed {
            address = address.wrapping_add(offset);
        }
        cpu.a32_set_reg(base, address);
    }
    Ok(())
}

pub(crate) fn a32_perform_mcr(cpu: &mut Cpu, opcode: u32, regnum: usize) -> ExecResult {
    let hook = cpu.coproc[coproc_index(opcode)]
        .mcr
        .ok_or(Exception::Undefined)?;
    let mut value = cpu.a32_reg(regnum);
    if regnum == A32_PC_NUM {
        value = value.wrapping_add(cpu.a32_mcr_pc_offset());
    }
    hook(cpu, opcode, value)
}

pub(crate) fn a32_perform_mrc(cpu: &mut Cpu, opcode: u32, regnum: usize) -> ExecResult {
    let hook = cpu.coproc[coproc_index(opcode)]
        .mrc
        .ok_or(Exception::Undefined)?;
    let result = hook(cpu, opcode)?;
    if regnum != A32_PC_NUM {
        cpu.a32_set_reg(regnum, result);
    } else {
        cpu.pstate.set_nzcv(result);
    }
    Ok(())
}

pub(crate) fn a32_perform_mcrr(
    cpu: &mut Cpu,
    opcode: u32,
    reg1: usize,
    reg2: usize,
) -> ExecResult {
    let hook = cpu.coproc[coproc_index(opcode)]
        .mcrr
        .ok_or(Exception::Undefined)?;
    let value1 = cpu.a32_reg(reg1);
    let value2 = cpu.a32_reg(reg2);
    hook(cpu, opcode, value1, value2)
}

pub(crate) fn a32_perform_mrrc(
    cpu: &mut Cpu,
    opcode: u32,
    reg1: usize,
    reg2: usize,
) -> ExecResult {
    let hook = cpu.coproc[coproc_index(opcode)]
        .mrrc
        .ok_or(Exception::Undefined)?;
    let (low, high) = hook(cpu, opcode)?;
    cpu.a32_set_reg(reg1, low);
    cpu.a32_set_reg(reg2, high);
    Ok(())
}
