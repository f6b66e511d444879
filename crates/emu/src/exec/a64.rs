//! A64 executor
//!
//! Fixed 32-bit encodings, 31 general registers plus a register 31 that
//! reads as zero or as the selected stack pointer depending on the
//! instruction. Most operations exist in a 32-bit W and a 64-bit X form
//! selected by the top bit of the encoding.

use crate::alu;
use crate::cpu::{reg::*, Cpu};
use crate::exc::{Exception, ExecResult};

const SUPPRESS_SP: bool = true;
const PERMIT_SP: bool = false;

pub(crate) fn step(cpu: &mut Cpu) -> ExecResult {
    let opcode = cpu.a64_fetch32()?;
    match (opcode >> 25) & 0xF {
        0b1000 | 0b1001 => exec_dp_immediate(cpu, opcode),
        0b1010 | 0b1011 => exec_branch_system(cpu, opcode),
        0b0100 | 0b0110 | 0b1100 | 0b1110 => exec_load_store(cpu, opcode),
        0b0101 | 0b1101 => exec_dp_register(cpu, opcode),
        _ => Err(Exception::Undefined),
    }
}

fn is64(opcode: u32) -> bool {
    opcode & 0x8000_0000 != 0
}

fn rd(opcode: u32) -> usize {
    (opcode & 0x1F) as usize
}

fn rn(opcode: u32) -> usize {
    ((opcode >> 5) & 0x1F) as usize
}

fn rm(opcode: u32) -> usize {
    ((opcode >> 16) & 0x1F) as usize
}

/// Read a register in the selected width, zero extended to 64 bits.
fn reg(cpu: &Cpu, opcode: u32, regnum: usize, suppress_sp: bool) -> u64 {
    if is64(opcode) {
        cpu.a64_reg64(regnum, suppress_sp)
    } else {
        cpu.a64_reg32(regnum, suppress_sp) as u64
    }
}

fn set_reg(cpu: &mut Cpu, opcode: u32, regnum: usize, suppress_sp: bool, value: u64) {
    if is64(opcode) {
        cpu.a64_set_reg64(regnum, suppress_sp, value);
    } else {
        cpu.a64_set_reg32(regnum, suppress_sp, value as u32);
    }
}

fn set_nz(cpu: &mut Cpu, opcode: u32, res: u64) {
    if is64(opcode) {
        alu::set_nz64(&mut cpu.pstate, res);
    } else {
        alu::set_nz32(&mut cpu.pstate, res as u32);
    }
}

fn set_nzcv(cpu: &mut Cpu, opcode: u32, res: u64, op1: u64, op2: u64) {
    if is64(opcode) {
        alu::set_nzcv64(&mut cpu.pstate, res, op1, op2);
    } else {
        alu::set_nzcv32(&mut cpu.pstate, res as u32, op1 as u32, op2 as u32);
    }
}

fn mask_width(opcode: u32, value: u64) -> u64 {
    if is64(opcode) { value } else { value & 0xFFFF_FFFF }
}

fn bitmask(opcode: u32) -> u64 {
    if is64(opcode) {
        alu::a64_bitmask64(opcode)
    } else {
        alu::a64_bitmask32(opcode) as u64
    }
}

// ---- data processing, immediate ----

fn exec_dp_immediate(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    match (opcode >> 23) & 7 {
        0b000 | 0b001 => {
            // adr/adrp; the PC has already advanced past this instruction
            let pc = cpu.r[PC].wrapping_sub(4);
            let imm = ((opcode >> 3) & 0x001F_FFFC) as u64 | ((opcode >> 29) & 3) as u64;
            let imm = alu::sign_extend64(21, imm);
            let value = if opcode & 0x8000_0000 != 0 {
                // adrp: page granule
                (pc & !0xFFF).wrapping_add(imm << 12)
            } else {
                pc.wrapping_add(imm)
            };
            cpu.a64_set_reg64(rd(opcode), SUPPRESS_SP, value);
            Ok(())
        }
        0b010 | 0b011 => {
            // add/sub immediate, optionally shifted left by 12
            let mut imm = ((opcode >> 10) & 0xFFF) as u64;
            if opcode & 0x0040_0000 != 0 {
                imm <<= 12;
            }
            let sub = opcode & 0x4000_0000 != 0;
            let s = opcode & 0x2000_0000 != 0;
            let op1 = reg(cpu, opcode, rn(opcode), PERMIT_SP);
            let res = mask_width(opcode, if sub { op1.wrapping_sub(imm) } else { op1.wrapping_add(imm) });
            if s {
                set_nzcv(cpu, opcode, res, op1, if sub { mask_width(opcode, !imm) } else { imm });
            }
            // the flag-setting form writes the zero register, not SP
            set_reg(cpu, opcode, rd(opcode), s, res);
            Ok(())
        }
        0b100 => {
            // logical immediate
            if !is64(opcode) && opcode & 0x0040_0000 != 0 {
                return Err(Exception::Undefined); // N set in the 32-bit form
            }
            let imm = bitmask(opcode);
            let op1 = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
            let (res, s) = match (opcode >> 29) & 3 {
                0b00 => (op1 & imm, false),
                0b01 => (op1 | imm, false),
                0b10 => (op1 ^ imm, false),
                _ => (op1 & imm, true),
            };
            let res = mask_width(opcode, res);
            if s {
                set_nz(cpu, opcode, res);
                cpu.pstate.c = false;
                cpu.pstate.v = false;
                set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
            } else {
                set_reg(cpu, opcode, rd(opcode), PERMIT_SP, res);
            }
            Ok(())
        }
        0b101 => {
            // movn/movz/movk
            let hw = (opcode >> 21) & 3;
            if !is64(opcode) && hw > 1 {
                return Err(Exception::Undefined);
            }
            let shift = hw * 16;
            let imm16 = ((opcode >> 5) & 0xFFFF) as u64;
            let value = match (opcode >> 29) & 3 {
                0b00 => mask_width(opcode, !(imm16 << shift)),
                0b10 => imm16 << shift,
                0b11 => {
                    let old = reg(cpu, opcode, rd(opcode), SUPPRESS_SP);
                    (old & !(0xFFFFu64 << shift)) | imm16 << shift
                }
                _ => return Err(Exception::Undefined),
            };
            set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, value);
            Ok(())
        }
        0b110 => {
            // bitfield: sbfm/bfm/ubfm share one kernel
            let immr = (opcode >> 16) & 0x3F;
            let imms = (opcode >> 10) & 0x3F;
            let src = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
            let res = match (opcode >> 29) & 3 {
                0b00 => {
                    if is64(opcode) {
                        alu::sbfm64(src, immr, imms)
                    } else {
                        alu::sbfm32(src as u32, immr, imms) as u64
                    }
                }
                0b01 => {
                    let dst = reg(cpu, opcode, rd(opcode), SUPPRESS_SP);
                    if is64(opcode) {
                        alu::bfm64(dst, src, immr, imms)
                    } else {
                        alu::bfm32(dst as u32, src as u32, immr, imms) as u64
                    }
                }
                0b10 => {
                    if is64(opcode) {
                        alu::ubfm64(src, immr, imms)
                    } else {
                        alu::ubfm32(src as u32, immr, imms) as u64
                    }
                }
                _ => return Err(Exception::Undefined),
            };
            set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, mask_width(opcode, res));
            Ok(())
        }
        _ => {
            // extr
            let imms = (opcode >> 10) & 0x3F;
            let lo = reg(cpu, opcode, rm(opcode), SUPPRESS_SP);
            let hi = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
            let res = if is64(opcode) {
                if imms == 0 { lo } else { (lo >> imms) | (hi << (64 - imms)) }
            } else if imms == 0 {
                lo
            } else {
                mask_width(opcode, (lo >> imms) | (hi << (32 - imms)))
            };
            set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
            Ok(())
        }
    }
}

// ---- branches, exception generation, system ----

fn exec_branch_system(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let top = opcode >> 26;
    if top & 0x1F == 0b00101 {
        // b/bl imm26
        let offset = alu::sign_extend64(28, ((opcode & 0x03FF_FFFF) as u64) << 2);
        if opcode & 0x8000_0000 != 0 {
            let lr = cpu.r[PC];
            cpu.a64_set_reg64(A64_LR, SUPPRESS_SP, lr);
        }
        cpu.r[PC] = cpu.r[PC].wrapping_sub(4).wrapping_add(offset);
        return Ok(());
    }
    if opcode & 0x7E00_0000 == 0x3400_0000 {
        // cbz/cbnz
        let offset = alu::sign_extend64(21, (((opcode >> 5) & 0x7_FFFF) as u64) << 2);
        let value = reg(cpu, opcode, rd(opcode), SUPPRESS_SP);
        let nonzero = opcode & 0x0100_0000 != 0;
        if (value == 0) != nonzero {
            cpu.r[PC] = cpu.r[PC].wrapping_sub(4).wrapping_add(offset);
        }
        return Ok(());
    }
    if opcode & 0x7E00_0000 == 0x3600_0000 {
        // tbz/tbnz
        let bit = ((opcode >> 26) & 0x20) | ((opcode >> 19) & 0x1F);
        let offset = alu::sign_extend64(16, (((opcode >> 5) & 0x3FFF) as u64) << 2);
        let value = cpu.a64_reg64(rd(opcode), SUPPRESS_SP);
        let set = value & (1u64 << bit) != 0;
        if set == (opcode & 0x0100_0000 != 0) {
            cpu.r[PC] = cpu.r[PC].wrapping_sub(4).wrapping_add(offset);
        }
        return Ok(());
    }
    if opcode & 0xFF00_0010 == 0x5400_0000 {
        // b.cond
        if a64_check_condition(cpu, opcode & 0xF) {
            let offset = alu::sign_extend64(21, (((opcode >> 5) & 0x7_FFFF) as u64) << 2);
            cpu.r[PC] = cpu.r[PC].wrapping_sub(4).wrapping_add(offset);
        }
        return Ok(());
    }
    if opcode & 0xFF00_001F == 0xD400_0001 {
        return Err(Exception::Svc);
    }
    if opcode & 0xFF00_001F == 0xD400_0002 {
        if !cpu.el2_supported {
            return Err(Exception::Undefined);
        }
        return Err(Exception::Hvc);
    }
    if opcode & 0xFF00_001F == 0xD400_0003 {
        if !cpu.el3_supported {
            return Err(Exception::Undefined);
        }
        return Err(Exception::Smc);
    }
    if opcode & 0xFFE0_001F == 0xD420_0000 {
        return Err(Exception::Breakpoint); // brk
    }
    if opcode == 0xD69F_03E0 {
        // eret
        cpu.a64_eret();
        return Ok(());
    }
    if opcode & 0xFFFF_FC1F == 0xD61F_0000 {
        // br
        cpu.r[PC] = cpu.a64_reg64(rn(opcode), SUPPRESS_SP);
        return Ok(());
    }
    if opcode & 0xFFFF_FC1F == 0xD63F_0000 {
        // blr
        let target = cpu.a64_reg64(rn(opcode), SUPPRESS_SP);
        let lr = cpu.r[PC];
        cpu.a64_set_reg64(A64_LR, SUPPRESS_SP, lr);
        cpu.r[PC] = target;
        return Ok(());
    }
    if opcode & 0xFFFF_FC1F == 0xD65F_0000 {
        // ret
        cpu.r[PC] = cpu.a64_reg64(rn(opcode), SUPPRESS_SP);
        return Ok(());
    }
    if opcode & 0xFFF0_0000 == 0xD500_0000 {
        return exec_system(cpu, opcode);
    }
    Err(Exception::Undefined)
}

fn a64_check_condition(cpu: &Cpu, code: u32) -> bool {
    // 0b1111 behaves as always in A64
    if code & 0xF == 0xF {
        true
    } else {
        crate::exec::a32::check_condition(&cpu.pstate, code)
    }
}

fn exec_system(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if opcode & 0xFFFF_F01F == 0xD503_201F {
        return Ok(()); // nop/yield/wfe/wfi/sev hints
    }
    if opcode & 0xFFF0_00E0 == 0xD500_4000 {
        // msr immediate (daifset/daifclr)
        let set = (opcode >> 16) & 7 == 6;
        let imm = (opcode >> 8) & 0xF;
        if cpu.privileged() {
            if imm & 8 != 0 {
                cpu.pstate.d = set;
            }
            if imm & 4 != 0 {
                cpu.pstate.a = set;
            }
            if imm & 2 != 0 {
                cpu.pstate.i = set;
            }
            if imm & 1 != 0 {
                cpu.pstate.f = set;
            }
        }
        return Ok(());
    }
    if opcode & 0xFFF8_0000 == 0xD508_0000 {
        return Ok(()); // sys: cache/tlb maintenance, nothing to do
    }
    if opcode & 0xFFD0_0000 == 0xD510_0000 {
        // msr/mrs register forms
        let rt = rd(opcode);
        if opcode & 0x0020_0000 != 0 {
            let value = a64_sysreg_read(cpu, opcode)?;
            cpu.a64_set_reg64(rt, SUPPRESS_SP, value);
        } else {
            let value = cpu.a64_reg64(rt, SUPPRESS_SP);
            a64_sysreg_write(cpu, opcode, value)?;
        }
        return Ok(());
    }
    Err(Exception::Undefined)
}

fn sysreg_fields(opcode: u32) -> (u32, u32, u32, u32, u32) {
    let op0 = (opcode >> 19) & 3;
    let op1 = (opcode >> 16) & 7;
    let crn = (opcode >> 12) & 0xF;
    let crm = (opcode >> 8) & 0xF;
    let op2 = (opcode >> 5) & 7;
    (op0, op1, crn, crm, op2)
}

fn a64_sysreg_read(cpu: &mut Cpu, opcode: u32) -> ExecResult<u64> {
    match sysreg_fields(opcode) {
        // identification
        (3, 0, 0, 0, 0) => Ok(cpu.midr() as u64),
        (3, 0, 0, 1, 0) => Ok(cpu.id_pfr0() as u64),
        // control
        (3, 0, 1, 0, 0) => Ok(cpu.sctlr_el1.bits() as u64),
        (3, 4, 1, 0, 0) => Ok(cpu.sctlr_el2.bits() as u64),
        (3, 6, 1, 0, 0) => Ok(cpu.sctlr_el3.bits() as u64),
        (3, 6, 1, 1, 0) => Ok(cpu.scr_el3.bits() as u64),
        (3, 4, 1, 1, 0) => Ok(cpu.hcr_el2.bits()),
        // vectors
        (3, 0, 12, 0, 0) => Ok(cpu.vbar_el1),
        (3, 4, 12, 0, 0) => Ok(cpu.vbar_el2),
        (3, 6, 12, 0, 0) => Ok(cpu.vbar_el3),
        // nzcv
        (3, 3, 4, 2, 0) => Ok((cpu.pstate.nzcv() as u64) & 0xF000_0000),
        // current el / spsel
        (3, 0, 4, 2, 2) => Ok((cpu.pstate.el as u64) << 2),
        (3, 0, 4, 2, 0) => Ok(cpu.pstate.sp as u64),
        _ => Err(Exception::Undefined),
    }
}

fn a64_sysreg_write(cpu: &mut Cpu, opcode: u32, value: u64) -> ExecResult {
    match sysreg_fields(opcode) {
        (3, 0, 1, 0, 0) => cpu.sctlr_el1 = crate::cpu::Sctlr::from_bits_retain(value as u32),
        (3, 4, 1, 0, 0) => cpu.sctlr_el2 = crate::cpu::Sctlr::from_bits_retain(value as u32),
        (3, 6, 1, 0, 0) => cpu.sctlr_el3 = crate::cpu::Sctlr::from_bits_retain(value as u32),
        (3, 6, 1, 1, 0) => cpu.scr_el3 = crate::cpu::Scr::from_bits_retain(value as u32),
        (3, 4, 1, 1, 0) => cpu.hcr_el2 = crate::cpu::Hcr::from_bits_retain(value),
        (3, 0, 12, 0, 0) => cpu.vbar_el1 = value,
        (3, 4, 12, 0, 0) => cpu.vbar_el2 = value,
        (3, 6, 12, 0, 0) => cpu.vbar_el3 = value,
        (3, 3, 4, 2, 0) => cpu.pstate.set_nzcv(value as u32),
        (3, 0, 4, 2, 0) => cpu.pstate.sp = value & 1 != 0,
        _ => return Err(Exception::Undefined),
    }
    Ok(())
}

// ---- loads and stores ----

/// Base register read with the SP alignment check.
fn load_store_base(cpu: &mut Cpu, opcode: u32) -> ExecResult<u64> {
    let base = rn(opcode);
    let address = cpu.a64_reg64(base, PERMIT_SP);
    if base == A64_SP && address & 0xF != 0 {
        return Err(Exception::UnalignedSp);
    }
    Ok(address)
}

fn load_sized(cpu: &mut Cpu, address: u64, size: u32, signed: bool, usermode: bool) -> ExecResult<u64> {
    let value = match size {
        0 => {
            let v = cpu.a64_read8(address, usermode)? as u64;
            if signed { alu::sign_extend64(8, v) } else { v }
        }
        1 => {
            let v = cpu.a64_read16(address, usermode)? as u64;
            if signed { alu::sign_extend64(16, v) } else { v }
        }
        2 => {
            let v = cpu.a64_read32(address, usermode)? as u64;
            if signed { alu::sign_extend64(32, v) } else { v }
        }
        _ => cpu.a64_read64(address, usermode)?,
    };
    Ok(value)
}

fn store_sized(cpu: &mut Cpu, address: u64, size: u32, value: u64, usermode: bool) -> ExecResult {
    match size {
        0 => cpu.a64_write8(address, value as u8, usermode),
        1 => cpu.a64_write16(address, value as u16, usermode),
        2 => cpu.a64_write32(address, value as u32, usermode),
        _ => cpu.a64_write64(address, value, usermode),
    }
}

fn exec_load_store(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if opcode & 0x0400_0000 != 0 {
        return Err(Exception::Undefined); // SIMD/FP forms
    }
    if opcode & 0x3B00_0000 == 0x1800_0000 {
        // ldr literal
        let offset = alu::sign_extend64(21, (((opcode >> 5) & 0x7_FFFF) as u64) << 2);
        let address = cpu.r[PC].wrapping_sub(4).wrapping_add(offset);
        let opc = opcode >> 30;
        let value = match opc {
            0b00 => cpu.a64_read32(address, false)? as u64,
            0b01 => cpu.a64_read64(address, false)?,
            0b10 => alu::sign_extend64(32, cpu.a64_read32(address, false)? as u64), // ldrsw
            _ => return Err(Exception::Undefined),
        };
        cpu.a64_set_reg64(rd(opcode), SUPPRESS_SP, value);
        return Ok(());
    }
    if opcode & 0x3F00_0000 == 0x0800_0000 {
        return exec_load_store_exclusive(cpu, opcode);
    }
    if opcode & 0x3A00_0000 == 0x2800_0000 {
        return exec_load_store_pair(cpu, opcode);
    }
    exec_load_store_register(cpu, opcode)
}

fn exec_load_store_exclusive(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let size = opcode >> 30;
    let bytes = 1u64 << size;
    let load = opcode & 0x0040_0000 != 0;
    let exclusive = opcode & 0x0080_0000 == 0;
    let rt = rd(opcode);
    let rs = rm(opcode);

    let address = load_store_base(cpu, opcode)?;
    if address & (bytes - 1) != 0 {
        return Err(Exception::Unaligned);
    }

    if load {
        if exclusive {
            cpu.mark_exclusive(address, bytes);
        }
        let value = load_sized(cpu, address, size, false, false)?;
        cpu.a64_set_reg64(rt, SUPPRESS_SP, value);
    } else if exclusive {
        let status = if cpu.check_exclusive(address, bytes) {
            let value = cpu.a64_reg64(rt, SUPPRESS_SP);
            store_sized(cpu, address, size, value, false)?;
            cpu.clear_exclusive();
            0
        } else {
            1
        };
        cpu.a64_set_reg32(rs, SUPPRESS_SP, status);
    } else {
        // plain store-release
        let value = cpu.a64_reg64(rt, SUPPRESS_SP);
        store_sized(cpu, address, size, value, false)?;
    }
    Ok(())
}

fn exec_load_store_pair(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let opc = opcode >> 30;
    let load = opcode & 0x0040_0000 != 0;
    let mode = (opcode >> 23) & 3; // 01 post, 10 signed offset, 11 pre
    let rt = rd(opcode);
    let rt2 = ((opcode >> 10) & 0x1F) as usize;

    let (bytes, signed, wide) = match opc {
        0b00 => (4u64, false, false),
        0b01 => (4, true, false), // ldpsw
        0b10 => (8, false, true),
        _ => return Err(Exception::Undefined),
    };
    let offset = alu::sign_extend64(7, ((opcode >> 15) & 0x7F) as u64).wrapping_mul(bytes as u64);

    let base_value = load_store_base(cpu, opcode)?;
    let address = match mode {
        0b01 => base_value,
        _ => base_value.wrapping_add(offset),
    };

    if load {
        let v1 = load_sized(cpu, address, if wide { 3 } else { 2 }, signed, false)?;
        let v2 = load_sized(cpu, address.wrapping_add(bytes), if wide { 3 } else { 2 }, signed, false)?;
        cpu.a64_set_reg64(rt, SUPPRESS_SP, v1);
        cpu.a64_set_reg64(rt2, SUPPRESS_SP, v2);
    } else {
        let v1 = cpu.a64_reg64(rt, SUPPRESS_SP);
        let v2 = cpu.a64_reg64(rt2, SUPPRESS_SP);
        let v1 = if wide { v1 } else { v1 & 0xFFFF_FFFF };
        let v2 = if wide { v2 } else { v2 & 0xFFFF_FFFF };
        store_sized(cpu, address, if wide { 3 } else { 2 }, v1, false)?;
        store_sized(cpu, address.wrapping_add(bytes), if wide { 3 } else { 2 }, v2, false)?;
    }

    match mode {
        0b01 => {
            let new_base = base_value.wrapping_add(offset);
            cpu.a64_set_reg64(rn(opcode), PERMIT_SP, new_base);
        }
        0b11 => {
            cpu.a64_set_reg64(rn(opcode), PERMIT_SP, address);
        }
        _ => {}
    }
    Ok(())
}

fn exec_load_store_register(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let size = opcode >> 30;
    let opc = (opcode >> 22) & 3;
    let rt = rd(opcode);

    // opc: 00 store, 01 load, 10/11 sign-extending loads
    let (load, signed, wide_result) = match opc {
        0b00 => (false, false, size == 3),
        0b01 => (true, false, size == 3),
        0b10 => (true, true, true),
        _ => (true, true, false),
    };
    if signed && size == 3 {
        return Err(Exception::Undefined); // prfm space
    }

    let (address, wb_address) = if opcode & 0x0100_0000 != 0 {
        // unsigned scaled 12-bit offset
        let offset = (((opcode >> 10) & 0xFFF) as u64) << size;
        (load_store_base(cpu, opcode)?.wrapping_add(offset), None)
    } else if opcode & 0x0020_0000 != 0 {
        // register offset with extension
        if opcode & 0x0000_0C00 != 0x0000_0800 {
            return Err(Exception::Undefined);
        }
        let option = (opcode >> 13) & 7;
        let shift = if opcode & 0x1000 != 0 { size } else { 0 };
        let index = alu::extend64(cpu.a64_reg64(rm(opcode), SUPPRESS_SP), option, shift);
        (load_store_base(cpu, opcode)?.wrapping_add(index), None)
    } else {
        // 9-bit unscaled forms: unscaled, post, unprivileged, pre
        let offset = alu::sign_extend64(9, ((opcode >> 12) & 0x1FF) as u64);
        let base = load_store_base(cpu, opcode)?;
        match (opcode >> 10) & 3 {
            0b00 => (base.wrapping_add(offset), None), // ldur/stur
            0b01 => (base, Some(base.wrapping_add(offset))), // post-index
            0b10 => {
                // unprivileged
                let address = base.wrapping_add(offset);
                let value_result = if load {
                    let value = load_sized(cpu, address, size, signed, true)?;
                    let value = if wide_result { value } else { value & 0xFFFF_FFFF };
                    cpu.a64_set_reg64(rt, SUPPRESS_SP, value);
                    Ok(())
                } else {
                    let value = cpu.a64_reg64(rt, SUPPRESS_SP);
                    store_sized(cpu, address, size, value, true)
                };
                return value_result;
            }
            _ => {
                let address = base.wrapping_add(offset);
                (address, Some(address)) // pre-index
            }
        }
    };

    if load {
        let value = load_sized(cpu, address, size, signed, false)?;
        let value = if wide_result { value } else { value & 0xFFFF_FFFF };
        cpu.a64_set_reg64(rt, SUPPRESS_SP, value);
    } else {
        let value = cpu.a64_reg64(rt, SUPPRESS_SP);
        store_sized(cpu, address, size, value, false)?;
    }

    if let Some(new_base) = wb_address {
        cpu.a64_set_reg64(rn(opcode), PERMIT_SP, new_base);
    }
    Ok(())
}

// ---- data processing, register ----

fn exec_dp_register(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if opcode & 0x1F00_0000 == 0x0A00_0000 {
        // logical shifted register
        let shift_type = (opcode >> 22) & 3;
        let amount = (opcode >> 10) & 0x3F;
        if !is64(opcode) && amount >= 32 {
            return Err(Exception::Undefined);
        }
        let op2 = {
            let raw = reg(cpu, opcode, rm(opcode), SUPPRESS_SP);
            if is64(opcode) {
                alu::shifted64(raw, shift_type, amount)
            } else {
                alu::shifted32(raw as u32, shift_type, amount) as u64
            }
        };
        let op2 = if opcode & 0x0020_0000 != 0 { mask_width(opcode, !op2) } else { op2 };
        let op1 = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
        let (res, s) = match (opcode >> 29) & 3 {
            0b00 => (op1 & op2, false),
            0b01 => (op1 | op2, false),
            0b10 => (op1 ^ op2, false),
            _ => (op1 & op2, true),
        };
        let res = mask_width(opcode, res);
        if s {
            set_nz(cpu, opcode, res);
            cpu.pstate.c = false;
            cpu.pstate.v = false;
        }
        set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
        return Ok(());
    }

    if opcode & 0x1F20_0000 == 0x0B00_0000 {
        // add/sub shifted register
        let shift_type = (opcode >> 22) & 3;
        let amount = (opcode >> 10) & 0x3F;
        let op2 = {
            let raw = reg(cpu, opcode, rm(opcode), SUPPRESS_SP);
            if is64(opcode) {
                alu::shifted64(raw, shift_type, amount)
            } else {
                alu::shifted32(raw as u32, shift_type, amount) as u64
            }
        };
        return addsub_common(cpu, opcode, op2, false);
    }

    if opcode & 0x1F20_0000 == 0x0B20_0000 {
        // add/sub extended register
        let option = (opcode >> 13) & 7;
        let amount = (opcode >> 10) & 7;
        if amount > 4 {
            return Err(Exception::Undefined);
        }
        let op2 = mask_width(
            opcode,
            alu::extend64(reg(cpu, opcode, rm(opcode), SUPPRESS_SP), option, amount),
        );
        return addsub_common(cpu, opcode, op2, true);
    }

    if opcode & 0x1FE0_FC00 == 0x1A00_0000 {
        // adc/sbc
        let sub = opcode & 0x4000_0000 != 0;
        let s = opcode & 0x2000_0000 != 0;
        let op1 = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
        let op2 = reg(cpu, opcode, rm(opcode), SUPPRESS_SP);
        let carry = cpu.pstate.c as u64;
        let res = mask_width(
            opcode,
            if sub {
                op1.wrapping_sub(op2).wrapping_add(carry).wrapping_sub(1)
            } else {
                op1.wrapping_add(op2).wrapping_add(carry)
            },
        );
        if s {
            set_nzcv(cpu, opcode, res, op1, if sub { mask_width(opcode, !op2) } else { op2 });
        }
        set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
        return Ok(());
    }

    if opcode & 0x1FE0_0800 == 0x1A40_0000 {
        // conditional compare (register and immediate)
        let s = opcode & 0x2000_0000 != 0;
        if !s {
            return Err(Exception::Undefined);
        }
        if a64_check_condition(cpu, (opcode >> 12) & 0xF) {
            let op1 = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
            let op2 = if opcode & 0x0000_0800 != 0 {
                ((opcode >> 16) & 0x1F) as u64
            } else {
                reg(cpu, opcode, rm(opcode), SUPPRESS_SP)
            };
            let sub = opcode & 0x4000_0000 != 0;
            let res = mask_width(opcode, if sub { op1.wrapping_sub(op2) } else { op1.wrapping_add(op2) });
            set_nzcv(cpu, opcode, res, op1, if sub { mask_width(opcode, !op2) } else { op2 });
        } else {
            let nzcv = (opcode & 0xF) << 28;
            cpu.pstate.set_nzcv(nzcv);
        }
        return Ok(());
    }

    if opcode & 0x1FE0_0800 == 0x1A80_0000 {
        // conditional select
        let op1 = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
        let op2 = reg(cpu, opcode, rm(opcode), SUPPRESS_SP);
        let invert = opcode & 0x4000_0000 != 0;
        let increment = opcode & 0x0000_0400 != 0;
        let res = if a64_check_condition(cpu, (opcode >> 12) & 0xF) {
            op1
        } else if invert && increment {
            mask_width(opcode, (!op2).wrapping_add(1)) // csneg
        } else if invert {
            mask_width(opcode, !op2) // csinv
        } else if increment {
            mask_width(opcode, op2.wrapping_add(1)) // csinc
        } else {
            op2
        };
        set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
        return Ok(());
    }

    if opcode & 0x5FE0_0000 == 0x5AC0_0000 {
        // data processing, one source
        let value = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
        let res = match (opcode >> 10) & 0x3F {
            0b000000 => {
                if is64(opcode) { value.reverse_bits() } else { (value as u32).reverse_bits() as u64 }
            }
            0b000001 => {
                if is64(opcode) { alu::bswap64_16(value) } else { alu::bswap32_16(value as u32) as u64 }
            }
            0b000010 => {
                if is64(opcode) { alu::bswap64_32(value) } else { (value as u32).swap_bytes() as u64 }
            }
            0b000011 => {
                if !is64(opcode) {
                    return Err(Exception::Undefined);
                }
                value.swap_bytes()
            }
            0b000100 => {
                if is64(opcode) { value.leading_zeros() as u64 } else { (value as u32).leading_zeros() as u64 }
            }
            0b000101 => {
                // cls
                if is64(opcode) {
                    (value ^ alu::sign_extend64(1, value >> 63)).leading_zeros().saturating_sub(1) as u64
                } else {
                    let v = value as u32;
                    let sign = (v as i32) >> 31;
                    ((v ^ sign as u32).leading_zeros()).saturating_sub(1) as u64
                }
            }
            _ => return Err(Exception::Undefined),
        };
        set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
        return Ok(());
    }

    if opcode & 0x5FE0_0000 == 0x1AC0_0000 {
        // data processing, two sources
        let op1 = reg(cpu, opcode, rn(opcode), SUPPRESS_SP);
        let op2 = reg(cpu, opcode, rm(opcode), SUPPRESS_SP);
        let bits = if is64(opcode) { 64 } else { 32 };
        let res = match (opcode >> 10) & 0x3F {
            0b000010 => {
                // udiv; division by zero yields zero
                if op2 == 0 { 0 } else { op1 / op2 }
            }
            0b000011 => {
                if is64(opcode) {
                    let n = op1 as i64;
                    let d = op2 as i64;
                    if d == 0 { 0 } else { n.wrapping_div(d) as u64 }
                } else {
                    let n = op1 as u32 as i32;
                    let d = op2 as u32 as i32;
                    if d == 0 { 0 } else { n.wrapping_div(d) as u32 as u64 }
                }
            }
            0b001000 => mask_width(opcode, if (op2 % bits) < 64 { op1 << (op2 % bits) } else { 0 }),
            0b001001 => op1 >> (op2 % bits),
            0b001010 => {
                if is64(opcode) {
                    ((op1 as i64) >> (op2 % 64)) as u64
                } else {
                    (((op1 as u32 as i32) >> (op2 % 32)) as u32) as u64
                }
            }
            0b001011 => {
                if is64(opcode) {
                    op1.rotate_right((op2 % 64) as u32)
                } else {
                    (op1 as u32).rotate_right((op2 % 32) as u32) as u64
                }
            }
            _ => return Err(Exception::Undefined),
        };
        set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
        return Ok(());
    }

    if opcode & 0x1F00_0000 == 0x1B00_0000 {
        // data processing, three sources
        let op31 = ((opcode >> 21) & 7, (opcode >> 15) & 1);
        let op1 = cpu.a64_reg64(rn(opcode), SUPPRESS_SP);
        let op2 = cpu.a64_reg64(rm(opcode), SUPPRESS_SP);
        let acc = cpu.a64_reg64(((opcode >> 10) & 0x1F) as usize, SUPPRESS_SP);
        let res = match op31 {
            (0b000, 0) => mask_width(opcode, acc.wrapping_add(mask_width(opcode, op1.wrapping_mul(op2)))),
            (0b000, 1) => mask_width(opcode, acc.wrapping_sub(mask_width(opcode, op1.wrapping_mul(op2)))),
            (0b001, 0) => {
                // smaddl
                acc.wrapping_add((op1 as u32 as i32 as i64).wrapping_mul(op2 as u32 as i32 as i64) as u64)
            }
            (0b001, 1) => {
                acc.wrapping_sub((op1 as u32 as i32 as i64).wrapping_mul(op2 as u32 as i32 as i64) as u64)
            }
            (0b010, 0) => ((op1 as i64 as i128).wrapping_mul(op2 as i64 as i128) >> 64) as u64, // smulh
            (0b101, 0) => acc.wrapping_add((op1 as u32 as u64).wrapping_mul(op2 as u32 as u64)),
            (0b101, 1) => acc.wrapping_sub((op1 as u32 as u64).wrapping_mul(op2 as u32 as u64)),
            (0b110, 0) => ((op1 as u128).wrapping_mul(op2 as u128) >> 64) as u64, // umulh
            _ => return Err(Exception::Undefined),
        };
        set_reg(cpu, opcode, rd(opcode), SUPPRESS_SP, res);
        return Ok(());
    }

    Err(Exception::Undefined)
}

fn addsub_common(cpu: &mut Cpu, opcode: u32, op2: u64, extended: bool) -> ExecResult {
    let sub = opcode & 0x4000_0000 != 0;
    let s = opcode & 0x2000_0000 != 0;
    // only the extended form reads and writes the stack pointer
    let op1 = reg(cpu, opcode, rn(opcode), !extended);
    let res = mask_width(opcode, if sub { op1.wrapping_sub(op2) } else { op1.wrapping_add(op2) });
    if s {
        set_nzcv(cpu, opcode, res, op1, if sub { mask_width(opcode, !op2) } else { op2 });
    }
    set_reg(cpu, opcode, rd(opcode), if extended { s } else { SUPPRESS_SP }, res);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, Configuration, Isa, IsaSet, Version};
    use crate::exc::EmuResult;
    use crate::testutil::TestRam;

    fn a64_cpu(words: &[u32]) -> Cpu {
        let config = Configuration {
            version: Version::V8,
            features: default_features(Version::V8),
            ..Configuration::default()
        };
        let mut ram = TestRam::new(0x2_0000);
        for (i, word) in words.iter().enumerate() {
            ram.0[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB | IsaSet::ARM64,
            Box::new(ram),
        );
        cpu.set_isa(Isa::Arm64);
        cpu.capture_breaks = true;
        cpu
    }

    #[test]
    fn test_movz_movk() {
        // movz x0, #0x1234, lsl #16; movk x0, #0x5678
        let mut cpu = a64_cpu(&[0xD2A2_4680, 0xF28A_CF00]);
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 0x1234_0000);
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 0x1234_5678);
    }

    #[test]
    fn test_orr_bitmask_immediate() {
        // orr x0, xzr, #0x5555555555555555
        let mut cpu = a64_cpu(&[0xB200_F3E0]);
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 0x5555_5555_5555_5555);
    }

    #[test]
    fn test_add_sub_immediate_flags() {
        // adds x0, xzr, #5; subs x1, x0, #7
        let mut cpu = a64_cpu(&[0xB100_17E0, 0xF100_1C01]);
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 5);
        assert!(!cpu.pstate.z);
        cpu.step();
        assert_eq!(cpu.a64_reg64(1, true), 5u64.wrapping_sub(7));
        assert!(cpu.pstate.n);
        assert!(!cpu.pstate.c);
    }

    #[test]
    fn test_w_form_masks_to_32_bits() {
        // adds w0, wzr, #0 with a preloaded x0 high half
        let mut cpu = a64_cpu(&[0x3100_03E0]);
        cpu.r[0] = 0xFFFF_FFFF_0000_0000;
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 0);
        assert!(cpu.pstate.z);
    }

    #[test]
    fn test_bl_and_ret() {
        // bl 8; nop; mov x0, #7; ret
        let mut cpu = a64_cpu(&[0x9400_0002, 0xD503_201F, 0xD280_00E0, 0xD65F_03C0]);
        cpu.step();
        assert_eq!(cpu.r[PC], 8);
        assert_eq!(cpu.a64_reg64(30, true), 4);
        cpu.step(); // mov
        cpu.step(); // ret
        assert_eq!(cpu.r[PC], 4);
        assert_eq!(cpu.a64_reg64(0, true), 7);
    }

    #[test]
    fn test_cbz_and_bcond() {
        // cbz x0, +8; b.eq +8
        let mut cpu = a64_cpu(&[0xB400_0040, 0, 0, 0]);
        cpu.step();
        assert_eq!(cpu.r[PC], 8);

        let mut cpu = a64_cpu(&[0x5400_0040, 0, 0, 0]);
        cpu.pstate.z = true;
        cpu.step();
        assert_eq!(cpu.r[PC], 8);
    }

    #[test]
    fn test_ldr_str_pair_with_writeback() {
        // stp x1, x2, [sp, #-16]!; ldp x3, x4, [sp], #16
        let mut cpu = a64_cpu(&[0xA9BF_0BE1, 0xA8C1_13E3]);
        cpu.a64_set_reg64(31, false, 0x1000);
        cpu.a64_set_reg64(1, false, 0x1111);
        cpu.a64_set_reg64(2, false, 0x2222);
        cpu.step();
        assert_eq!(cpu.a64_reg64(31, false), 0xFF0);
        cpu.step();
        assert_eq!(cpu.a64_reg64(3, true), 0x1111);
        assert_eq!(cpu.a64_reg64(4, true), 0x2222);
        assert_eq!(cpu.a64_reg64(31, false), 0x1000);
    }

    #[test]
    fn test_ldr_unsigned_offset() {
        // str x1, [x0, #8]; ldr x2, [x0, #8]
        let mut cpu = a64_cpu(&[0xF900_0401, 0xF940_0402]);
        cpu.a64_set_reg64(0, false, 0x500);
        cpu.a64_set_reg64(1, false, 0xDEAD_BEEF_CAFE);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a64_reg64(2, true), 0xDEAD_BEEF_CAFE);
    }

    #[test]
    fn test_ldxr_stxr() {
        // ldxr x1, [x0]; stxr w2, x3, [x0]
        let mut cpu = a64_cpu(&[0xC85F_7C01, 0xC802_7C03]);
        cpu.a64_set_reg64(0, false, 0x600);
        cpu.a64_set_reg64(3, false, 77);
        cpu.write64_data(0x600, 55);
        cpu.step();
        assert_eq!(cpu.a64_reg64(1, true), 55);
        cpu.step();
        assert_eq!(cpu.a64_reg32(2, true), 0);
        assert_eq!(cpu.read64_data(0x600), 77);
    }

    #[test]
    fn test_csel_csinc() {
        // cmp x0, #0 (subs xzr); csinc x1, x2, x3, ne -> x3+1 when eq
        let mut cpu = a64_cpu(&[0xF100_001F, 0x9A83_1441]);
        cpu.a64_set_reg64(2, false, 10);
        cpu.a64_set_reg64(3, false, 20);
        cpu.step();
        assert!(cpu.pstate.z);
        cpu.step();
        assert_eq!(cpu.a64_reg64(1, true), 21);
    }

    #[test]
    fn test_udiv_sdiv() {
        // udiv x2, x0, x1; sdiv x3, x0, x1
        let mut cpu = a64_cpu(&[0x9AC1_0802, 0x9AC1_0C03]);
        cpu.a64_set_reg64(0, false, (-10i64) as u64);
        cpu.a64_set_reg64(1, false, 3);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a64_reg64(3, true), ((-10i64) / 3) as u64);
    }

    #[test]
    fn test_madd_umulh() {
        // madd x0, x1, x2, x3
        let mut cpu = a64_cpu(&[0x9B02_0C20]);
        cpu.a64_set_reg64(1, false, 6);
        cpu.a64_set_reg64(2, false, 7);
        cpu.a64_set_reg64(3, false, 1);
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 43);
    }

    #[test]
    fn test_clz_and_rbit() {
        // clz x1, x0; rbit x2, x0
        let mut cpu = a64_cpu(&[0xDAC0_1001, 0xDAC0_0002]);
        cpu.a64_set_reg64(0, false, 1 << 20);
        cpu.step();
        assert_eq!(cpu.a64_reg64(1, true), 43);
        cpu.step();
        assert_eq!(cpu.a64_reg64(2, true), 1u64.reverse_bits() >> 20);
    }

    #[test]
    fn test_svc_captured() {
        let mut cpu = a64_cpu(&[0xD400_0001]);
        cpu.step();
        assert_eq!(cpu.result, EmuResult::Svc);
    }

    #[test]
    fn test_unaligned_pc_faults() {
        let mut cpu = a64_cpu(&[0xD503_201F]);
        cpu.r[PC] = 2;
        cpu.step();
        assert_eq!(cpu.result, EmuResult::UnalignedPc);
        assert_eq!(cpu.r[PC], 2);
    }

    #[test]
    fn test_sp_misalignment_faults_loads() {
        // ldr x0, [sp]
        let mut cpu = a64_cpu(&[0xF940_03E0]);
        cpu.a64_set_reg64(31, false, 0x1001);
        cpu.step();
        assert_eq!(cpu.result, EmuResult::UnalignedSp);
    }

    #[test]
    fn test_ubfm_alias_lsr() {
        // lsr x0, x1, #4
        let mut cpu = a64_cpu(&[0xD344_FC20]);
        cpu.a64_set_reg64(1, false, 0x120);
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 0x12);
    }

    #[test]
    fn test_adr() {
        // adr x0, #0x10 at address 0
        let mut cpu = a64_cpu(&[0x1000_0080]);
        cpu.step();
        assert_eq!(cpu.a64_reg64(0, true), 0x10);
    }
}
