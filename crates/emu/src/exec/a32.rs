//! A32/A26 executor
//!
//! Decodes and executes the 32-bit ARM instruction set, including the
//! 26-bit compatibility behaviors: R15-packed flags, the 64 MiB PC mask and
//! the address exception. The load/store helpers here are shared with the
//! Thumb executor, which reuses them for its own encodings (this is also
//! where the ThumbEE null-pointer checks hook in).

use crate::alu;
use crate::config::{Features, Isa, JazelleLevel, Version};
use crate::cop;
use crate::cpu::{reg::*, Cpu, Sctlr};
use crate::exc::{Exception, ExecResult};
use crate::exec::t32::e32_check_nullptr;
use crate::psr::{Pstate, CPSR_GE_MASK, CPSR_IT_MASK, MODE_USR};

/// Condition field evaluation against (N, Z, C, V).
pub(crate) fn check_condition(ps: &Pstate, code: u32) -> bool {
    match code & 0xF {
        0x0 => ps.z,                      // eq
        0x1 => !ps.z,                     // ne
        0x2 => ps.c,                      // cs
        0x3 => !ps.c,                     // cc
        0x4 => ps.n,                      // mi
        0x5 => !ps.n,                     // pl
        0x6 => ps.v,                      // vs
        0x7 => !ps.v,                     // vc
        0x8 => ps.c && !ps.z,             // hi
        0x9 => !ps.c || ps.z,             // ls
        0xA => ps.n == ps.v,              // ge
        0xB => ps.n != ps.v,              // lt
        0xC => ps.n == ps.v && !ps.z,     // gt
        0xD => ps.n != ps.v || ps.z,      // le
        0xE => true,                      // al
        _ => false,                       // nv
    }
}

/// 12-bit rotated immediate: an 8-bit value rotated right by twice the
/// rotation field. The shifter carry is not affected.
pub fn a32_get_immediate_operand(opcode: u32) -> u32 {
    let immediate = opcode & 0xFF;
    let amount = ((opcode >> 8) & 0xF) * 2;
    immediate.rotate_right(amount)
}

/// Register operand with one of the five shifters; sets the carry-out when
/// the encoding asks for it.
pub(crate) fn a32_get_register_operand(cpu: &mut Cpu, opcode: u32, store_carry: bool) -> u32 {
    let mut value = cpu.a32_reg((opcode & 0xF) as usize);
    if opcode & 0x0000_0FF0 == 0 {
        return value;
    }
    if opcode & 0x0000_0FF0 == 0x0000_0060 {
        return alu::rrx32(&mut cpu.pstate, value, store_carry);
    }

    let amount;
    if opcode & 0x0000_0010 != 0 {
        // register-specified shift; R15 reads another word ahead here
        if opcode & 0xF == A32_PC_NUM as u32 {
            value = value.wrapping_add(4);
        }
        amount = cpu.a32_reg(((opcode >> 8) & 0xF) as usize) & 0xFF;
        if amount == 0 {
            return value;
        }
    } else {
        // 32 is encoded as 0, except for lsl
        amount = (((opcode >> 7).wrapping_sub(1)) & 0x1F) + 1;
    }
    match (opcode >> 5) & 3 {
        0b00 => alu::lsl32(&mut cpu.pstate, value, amount, store_carry),
        0b01 => alu::lsr32(&mut cpu.pstate, value, amount, store_carry),
        0b10 => alu::asr32(&mut cpu.pstate, value, amount, store_carry),
        _ => alu::ror32(&mut cpu.pstate, value, amount, store_carry),
    }
}

/// Signed load/store offset: a 12-bit immediate or a shifted register,
/// negated when the U bit is clear.
pub(crate) fn a32_get_address_operand(cpu: &mut Cpu, opcode: u32) -> u32 {
    let operand = if opcode & 0x0200_0000 != 0 {
        a32_get_register_operand(cpu, opcode, false)
    } else {
        opcode & 0xFFF
    };
    if opcode & 0x0080_0000 != 0 {
        operand
    } else {
        operand.wrapping_neg()
    }
}

/// 26-bit data-space address check.
fn a26_check_address(cpu: &Cpu, address: u32) -> ExecResult {
    if cpu.is_data26() && address & 0xFC00_0000 != 0 {
        return Err(Exception::Address26);
    }
    Ok(())
}

/// Alignment policy for halfword and larger accesses: strict mode aborts,
/// the pre-v7 relaxed mode rounds the address down.
fn aligned(cpu: &Cpu, address: u32, mask: u32) -> ExecResult<u32> {
    if cpu.sctlr_el1.contains(Sctlr::A) {
        if address & mask != 0 {
            return Err(Exception::Unaligned);
        }
        Ok(address)
    } else if cpu.config.version <= Version::V6 && !cpu.sctlr_el1.contains(Sctlr::U) {
        Ok(address & !mask)
    } else if address & mask != 0 {
        Err(Exception::Unaligned)
    } else {
        Ok(address)
    }
}

fn base_address(cpu: &mut Cpu, base: usize) -> ExecResult<u32> {
    let mut address = cpu.a32_reg(base);
    if base == A32_PC_NUM {
        address &= !3;
    }
    e32_check_nullptr(cpu, address)?;
    Ok(address)
}

fn writeback(cpu: &mut Cpu, base: usize, address: u32, offset: u32, preindexed: bool, enable: bool) {
    if enable {
        let final_address = if preindexed { address } else { address.wrapping_add(offset) };
        cpu.a32_set_reg(base, final_address);
    }
}

pub(crate) fn a32_ldrb(
    cpu: &mut Cpu,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult<u32> {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    a26_check_address(cpu, address)?;
    let result = cpu.a32_read8(address, usermode)? as u32;
    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(result)
}

pub(crate) fn a32_ldrsb(
    cpu: &mut Cpu,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult<u32> {
    let result = a32_ldrb(cpu, base, offset, preindexed, wb, usermode)?;
    Ok(alu::sign_extend32(8, result))
}

pub(crate) fn a32_strb(
    cpu: &mut Cpu,
    value: u32,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    a26_check_address(cpu, address)?;
    cpu.a32_write8(address, value as u8, usermode)?;
    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(())
}

pub(crate) fn a32_ldrh(
    cpu: &mut Cpu,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult<u32> {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    let actual = aligned(cpu, address, 1)?;
    a26_check_address(cpu, address)?;
    let result = cpu.a32_read16(actual, usermode)? as u32;
    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(result)
}

pub(crate) fn a32_ldrsh(
    cpu: &mut Cpu,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult<u32> {
    let result = a32_ldrh(cpu, base, offset, preindexed, wb, usermode)?;
    Ok(alu::sign_extend32(16, result))
}

pub(crate) fn a32_strh(
    cpu: &mut Cpu,
    value: u32,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    let actual = aligned(cpu, address, 1)?;
    a26_check_address(cpu, address)?;
    cpu.a32_write16(actual, value as u16, usermode)?;
    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(())
}

pub(crate) fn a32_ldr(
    cpu: &mut Cpu,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult<u32> {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    a26_check_address(cpu, address)?;

    let result = if cpu.sctlr_el1.contains(Sctlr::A) {
        if address & 3 != 0 {
            return Err(Exception::Unaligned);
        }
        cpu.a32_read32(address, usermode)?
    } else if cpu.config.version <= Version::V6 && !cpu.sctlr_el1.contains(Sctlr::U) {
        // the classic rotated unaligned load
        let word = cpu.a32_read32(address & !3, usermode)?;
        word.rotate_right((address & 3) * 8)
    } else {
        cpu.a32_read32(address, usermode)?
    };

    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(result)
}

pub(crate) fn a32_str(
    cpu: &mut Cpu,
    value: u32,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
    usermode: bool,
) -> ExecResult {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    a26_check_address(cpu, address)?;
    if cpu.sctlr_el1.contains(Sctlr::A) {
        if address & 3 != 0 {
            return Err(Exception::Unaligned);
        }
        cpu.a32_write32(address, value, usermode)?;
    } else if cpu.config.version <= Version::V6 && !cpu.sctlr_el1.contains(Sctlr::U) {
        // misaligned stores round the address down
        cpu.a32_write32(address & !3, value, usermode)?;
    } else {
        cpu.a32_write32(address, value, usermode)?;
    }
    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(())
}

pub(crate) fn a32_ldrd(
    cpu: &mut Cpu,
    op1: usize,
    op2: usize,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
) -> ExecResult {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    let mut actual = address;
    if cpu.config.version <= Version::V6 && !cpu.sctlr_el1.contains(Sctlr::U) {
        if cpu.sctlr_el1.contains(Sctlr::A) {
            if address & 7 != 0 {
                return Err(Exception::Unaligned);
            }
        } else {
            actual &= !7;
        }
    } else if address & 3 != 0 {
        // word alignment is the v7 requirement, doubleword is not
        return Err(Exception::Unaligned);
    }
    a26_check_address(cpu, address)?; // only the first address needs checking
    let low = cpu.a32_read32(actual, false)?;
    let high = cpu.a32_read32(actual.wrapping_add(4), false)?;
    cpu.a32_set_reg(op1, low);
    cpu.a32_set_reg(op2, high);
    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(())
}

pub(crate) fn a32_strd(
    cpu: &mut Cpu,
    op1: usize,
    op2: usize,
    base: usize,
    offset: u32,
    preindexed: bool,
    wb: bool,
) -> ExecResult {
    let mut address = base_address(cpu, base)?;
    if preindexed {
        address = address.wrapping_add(offset);
    }
    let mut actual = address;
    if cpu.config.version <= Version::V6 && !cpu.sctlr_el1.contains(Sctlr::U) {
        if cpu.sctlr_el1.contains(Sctlr::A) {
            if address & 7 != 0 {
                return Err(Exception::Unaligned);
            }
        } else {
            actual &= !7;
        }
    } else if address & 3 != 0 {
        return Err(Exception::Unaligned);
    }
    a26_check_address(cpu, address)?;
    let low = cpu.a32_reg(op1);
    let high = cpu.a32_reg(op2);
    cpu.a32_write32(actual, low, false)?;
    cpu.a32_write32(actual.wrapping_add(4), high, false)?;
    writeback(cpu, base, address, offset, preindexed, wb);
    Ok(())
}

/// Load multiple. The S bit selects the user-mode bank, or a CPSR restore
/// when R15 is in the list; a base in the list suppresses writeback.
pub(crate) fn a32_ldm(
    cpu: &mut Cpu,
    register_list: u16,
    base: usize,
    upward: bool,
    change_before: bool,
    wb: bool,
    include_cpsr: bool,
) -> ExecResult {
    let stacksize = (register_list.count_ones() << 2) as u32;
    let mut address = cpu.a32_reg(base);
    let final_address;

    if upward {
        final_address = address.wrapping_add(stacksize);
    } else {
        address = address.wrapping_sub(stacksize.wrapping_sub(4));
        final_address = address.wrapping_sub(4);
    }
    if change_before {
        address = if upward { address.wrapping_add(4) } else { address.wrapping_sub(4) };
    }
    let mut address = aligned(cpu, address, 3)?;

    let user_mode = register_list & 0x8000 == 0 && include_cpsr && !wb;
    a26_check_address(cpu, address)?; // only the first address needs checking
    for regnum in 0..15usize {
        if register_list & (1 << regnum) != 0 {
            let word = cpu.a32_read32(address, false)?;
            if user_mode {
                self::store_user_reg(cpu, regnum, word);
            } else {
                cpu.a32_set_reg_interworking_v5(regnum, word);
            }
            address = address.wrapping_add(4);
        }
    }

    if register_list & 0x8000 != 0 {
        let word = cpu.a32_read32(address, false)?;
        cpu.a32_set_reg_interworking_v5(15, word);
        if include_cpsr {
            cpu.a32_copy_flags(word);
        }
    }

    // with writeback, the base is only updated if it was not reloaded
    if wb && register_list & (1 << base) == 0 {
        cpu.a32_set_reg(base, final_address);
    }
    Ok(())
}

fn store_user_reg(cpu: &mut Cpu, regnum: usize, value: u32) {
    cpu.r[regnum] = value as u64;
}

/// Store multiple; a base that is the lowest register in the list is
/// stored before the writeback takes effect.
pub(crate) fn a32_stm(
    cpu: &mut Cpu,
    register_list: u16,
    base: usize,
    upward: bool,
    change_before: bool,
    wb: bool,
    user_mode: bool,
) -> ExecResult {
    let stacksize = (register_list.count_ones() << 2) as u32;
    let mut address = cpu.a32_reg(base);
    let final_address;

    if upward {
        final_address = address.wrapping_add(stacksize);
    } else {
        address = address.wrapping_sub(stacksize.wrapping_sub(4));
        final_address = address.wrapping_sub(4);
    }
    if change_before {
        address = if upward { address.wrapping_add(4) } else { address.wrapping_sub(4) };
    }
    let mut address = aligned(cpu, address, 3)?;

    // all registers below the base absent, base present: base is lowest
    let below_mask = (1u32 << (base + 1)) - 1;
    let base_is_lowest = (register_list as u32) & below_mask == 1 << base;

    if !base_is_lowest && wb {
        cpu.a32_set_reg(base, final_address);
    }

    a26_check_address(cpu, address)?;
    for regnum in 0..16usize {
        if register_list & (1 << regnum) != 0 {
            let mut value = if user_mode {
                cpu.r[regnum] as u32
            } else {
                cpu.a32_reg_lhs(regnum)
            };
            if regnum == A32_PC_NUM {
                value = value.wrapping_add(cpu.stored_pc_displacement());
            }
            cpu.a32_write32(address, value, false)?;
            address = address.wrapping_add(4);
        }
    }

    if base_is_lowest && wb {
        cpu.a32_set_reg(base, final_address);
    }
    Ok(())
}

/// RFE: reload PC and CPSR from the stack.
pub(crate) fn a32_rfe(
    cpu: &mut Cpu,
    base: usize,
    upward: bool,
    change_before: bool,
    wb: bool,
) -> ExecResult {
    let mut address = cpu.a32_reg(base);
    let final_address;
    if upward {
        final_address = address.wrapping_add(8);
    } else {
        address = address.wrapping_sub(4);
        final_address = address.wrapping_sub(4);
    }
    if change_before {
        address = if upward { address.wrapping_add(4) } else { address.wrapping_sub(4) };
    }
    let address = aligned(cpu, address, 3)?;

    a26_check_address(cpu, address)?;
    let pc = cpu.a32_read32(address, false)?;
    let cpsr = cpu.a32_read32(address.wrapping_add(4), false)?;
    cpu.r[PC] = pc as u64;
    cpu.set_cpsr(!0, cpsr);

    if wb {
        cpu.a32_set_reg(base, final_address);
    }
    Ok(())
}

/// SRS: push LR and SPSR onto the stack of `mode`.
pub(crate) fn a32_srs(
    cpu: &mut Cpu,
    mode: u8,
    upward: bool,
    change_before: bool,
    wb: bool,
) -> ExecResult {
    let mut address = cpu.a32_reg_mode(mode, A32_SP) as u32;
    let final_address;
    if upward {
        final_address = address.wrapping_add(8);
    } else {
        address = address.wrapping_sub(4);
        final_address = address.wrapping_sub(4);
    }
    if change_before {
        address = if upward { address.wrapping_add(4) } else { address.wrapping_sub(4) };
    }
    let address = aligned(cpu, address, 3)?;

    a26_check_address(cpu, address)?;
    let lr = cpu.a32_reg(A32_LR);
    let spsr = cpu.spsr();
    cpu.a32_write32(address, lr, false)?;
    cpu.a32_write32(address.wrapping_add(4), spsr, false)?;

    if wb {
        cpu.a32_set_reg_mode(mode, A32_SP, final_address as u64);
    }
    Ok(())
}

// Exclusive accesses: the load marks the monitor range, the store succeeds
// only when its target is fully contained in the live range.

pub(crate) fn a32_ldrex(cpu: &mut Cpu, base: usize, offset: u32, size: u32) -> ExecResult<u32> {
    let address = base_address(cpu, base)?.wrapping_add(offset);
    let address = if size > 1 { aligned(cpu, address, size - 1)? } else { address };
    a26_check_address(cpu, address)?;
    cpu.mark_exclusive(address as u64, size as u64);
    match size {
        1 => Ok(cpu.a32_read8(address, false)? as u32),
        2 => Ok(cpu.a32_read16(address, false)? as u32),
        _ => cpu.a32_read32(address, false),
    }
}

pub(crate) fn a32_ldrexd(cpu: &mut Cpu, op1: usize, op2: usize, base: usize) -> ExecResult {
    let address = base_address(cpu, base)?;
    let address = aligned(cpu, address, 7)?;
    a26_check_address(cpu, address)?;
    cpu.mark_exclusive(address as u64, 8);
    let low = cpu.a32_read32(address, false)?;
    let high = cpu.a32_read32(address.wrapping_add(4), false)?;
    cpu.a32_set_reg(op1, low);
    cpu.a32_set_reg(op2, high);
    Ok(())
}

pub(crate) fn a32_strex(
    cpu: &mut Cpu,
    value: u32,
    base: usize,
    offset: u32,
    size: u32,
) -> ExecResult<u32> {
    let address = base_address(cpu, base)?.wrapping_add(offset);
    let address = if size > 1 { aligned(cpu, address, size - 1)? } else { address };
    if cpu.check_exclusive(address as u64, size as u64) {
        a26_check_address(cpu, address)?;
        match size {
            1 => cpu.a32_write8(address, value as u8, false)?,
            2 => cpu.a32_write16(address, value as u16, false)?,
            _ => cpu.a32_write32(address, value, false)?,
        }
        cpu.clear_exclusive();
        Ok(0)
    } else {
        Ok(1)
    }
}

pub(crate) fn a32_strexd(cpu: &mut Cpu, op1: usize, op2: usize, base: usize) -> ExecResult<u32> {
    let address = base_address(cpu, base)?;
    let address = aligned(cpu, address, 7)?;
    if cpu.check_exclusive(address as u64, 8) {
        a26_check_address(cpu, address)?;
        let low = cpu.a32_reg(op1);
        let high = cpu.a32_reg(op2);
        cpu.a32_write32(address, low, false)?;
        cpu.a32_write32(address.wrapping_add(4), high, false)?;
        cpu.clear_exclusive();
        Ok(0)
    } else {
        Ok(1)
    }
}

/// BXJ: attempt to enter Jazelle state; the trivial implementation falls
/// through to the ARM/Thumb fallback address instead.
fn a32_bxj(cpu: &mut Cpu, fallback: u32) {
    let real_jazelle = cpu.config.jazelle >= Some(JazelleLevel::Jazelle)
        && cpu.is_supported_isa(Isa::Jazelle)
        && cpu.jmcr & crate::cpu::JMCR_JE != 0;
    if !real_jazelle {
        cpu.a32_set_pc_interworking(fallback);
    } else {
        cpu.pstate.jt = crate::psr::JT_JAZELLE;
        cpu.r[PC] = cpu.a32_reg(A32_LR) as u64;
        // entering with an empty register stack
        let sht = cpu.a32_reg(crate::exec::jazelle::J32_SHT) & !0x1F;
        cpu.a32_set_reg(crate::exec::jazelle::J32_SHT, sht);
    }
}

pub(crate) fn step(cpu: &mut Cpu) -> ExecResult {
    let opcode = cpu.a32_fetch32()?;
    let cond = opcode >> 28;
    if cond == 0xF {
        if cpu.config.version >= Version::V5 && !cpu.is_arm26() {
            return exec_unconditional(cpu, opcode);
        }
        return Ok(()); // nv is a never predicate on older versions
    }
    if !check_condition(&cpu.pstate, cond) {
        return Ok(());
    }
    exec(cpu, opcode)
}

fn exec_unconditional(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if opcode & 0x0E00_0000 == 0x0A00_0000 {
        // blx immediate: switch to Thumb, the H bit supplies bit 1
        let mut offset = alu::sign_extend32(24, opcode & 0x00FF_FFFF) << 2;
        offset |= (opcode >> 23) & 2;
        let lr = cpu.r[PC] as u32;
        cpu.a32_set_reg(A32_LR, lr);
        let target = cpu.a32_reg(A32_PC_NUM).wrapping_add(offset);
        cpu.pstate.jt = crate::psr::JT_THUMB;
        cpu.a32_set_pc(target | 1);
        return Ok(());
    }
    if opcode & 0x0FD0_F000 == 0x0550_F000 {
        return Ok(()); // pld
    }
    if opcode & 0x0FF0_00F0 == 0x0570_0040
        || opcode & 0x0FF0_00F0 == 0x0570_0050
        || opcode & 0x0FF0_00F0 == 0x0570_0060
    {
        return Ok(()); // dsb/dmb/isb
    }
    if opcode & 0x0FFF_FDFF == 0x0101_0000 {
        // setend
        cpu.pstate.e = opcode & 0x0000_0200 != 0;
        return Ok(());
    }
    if opcode & 0x0FF1_0020 == 0x0100_0000 {
        // cps
        if cpu.privileged() {
            let imod = (opcode >> 18) & 3;
            if imod & 2 != 0 {
                let enable = imod & 1 == 0;
                if opcode & 0x100 != 0 {
                    cpu.pstate.a = !enable;
                }
                if opcode & 0x080 != 0 {
                    cpu.pstate.i = !enable;
                }
                if opcode & 0x040 != 0 {
                    cpu.pstate.f = !enable;
                }
            }
            if opcode & 0x0002_0000 != 0 {
                cpu.pstate.mode = (opcode & 0x1F) as u8 & 0xF;
            }
        }
        return Ok(());
    }
    if opcode & 0x0E50_0000 == 0x0840_0000 {
        // srs
        let mode = (opcode & 0xF) as u8;
        return a32_srs(
            cpu,
            mode,
            opcode & 0x0080_0000 != 0,
            opcode & 0x0100_0000 != 0,
            opcode & 0x0020_0000 != 0,
        );
    }
    if opcode & 0x0E50_0000 == 0x0810_0000 {
        // rfe
        let base = ((opcode >> 16) & 0xF) as usize;
        return a32_rfe(
            cpu,
            base,
            opcode & 0x0080_0000 != 0,
            opcode & 0x0100_0000 != 0,
            opcode & 0x0020_0000 != 0,
        );
    }
    if opcode & 0x0E00_0000 == 0x0C00_0000 || opcode & 0x0F00_0010 == 0x0E00_0010 {
        // coprocessor forms with the NV prefix (cp14/cp15 accesses)
        return exec(cpu, opcode);
    }
    Err(Exception::Undefined)
}

fn exec(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    match (opcode >> 25) & 7 {
        0b000 => exec_000(cpu, opcode),
        0b001 => exec_001(cpu, opcode),
        0b010 => exec_load_store(cpu, opcode),
        0b011 => {
            if opcode & 0x10 == 0 {
                exec_load_store(cpu, opcode)
            } else {
                exec_media(cpu, opcode)
            }
        }
        0b100 => {
            // ldm/stm
            let list = (opcode & 0xFFFF) as u16;
            let base = ((opcode >> 16) & 0xF) as usize;
            let upward = opcode & 0x0080_0000 != 0;
            let before = opcode & 0x0100_0000 != 0;
            let wb = opcode & 0x0020_0000 != 0;
            let s = opcode & 0x0040_0000 != 0;
            if opcode & 0x0010_0000 != 0 {
                a32_ldm(cpu, list, base, upward, before, wb, s)
            } else {
                a32_stm(cpu, list, base, upward, before, wb, s)
            }
        }
        0b101 => {
            // b/bl
            let offset = alu::sign_extend32(24, opcode & 0x00FF_FFFF) << 2;
            if opcode & 0x0100_0000 != 0 {
                let lr = if cpu.is_arm26() { cpu.a26_pc() } else { cpu.r[PC] as u32 };
                cpu.a32_set_reg(A32_LR, lr);
            }
            let target = cpu.a32_reg(A32_PC_NUM).wrapping_add(offset);
            cpu.a32_set_reg(A32_PC_NUM, target);
            Ok(())
        }
        0b110 => exec_coproc_transfer(cpu, opcode),
        _ => {
            if opcode & 0x0100_0000 != 0 {
                Err(Exception::Svc)
            } else if opcode & 0x10 == 0 {
                cop::a32_perform_cdp(cpu, opcode)
            } else if opcode & 0x0010_0000 == 0 {
                cop::a32_perform_mcr(cpu, opcode, ((opcode >> 12) & 0xF) as usize)
            } else {
                cop::a32_perform_mrc(cpu, opcode, ((opcode >> 12) & 0xF) as usize)
            }
        }
    }
}

fn exec_coproc_transfer(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if opcode & 0x0FE0_0000 == 0x0C40_0000 {
        // mcrr
        return cop::a32_perform_mcrr(
            cpu,
            opcode,
            ((opcode >> 12) & 0xF) as usize,
            ((opcode >> 16) & 0xF) as usize,
        );
    }
    if opcode & 0x0FE0_0000 == 0x0C50_0000 {
        // mrrc
        return cop::a32_perform_mrrc(
            cpu,
            opcode,
            ((opcode >> 12) & 0xF) as usize,
            ((opcode >> 16) & 0xF) as usize,
        );
    }
    // ldc/stc
    let base = ((opcode >> 16) & 0xF) as usize;
    let mut offset = (opcode & 0xFF) << 2;
    if opcode & 0x0080_0000 == 0 {
        offset = offset.wrapping_neg();
    }
    let preindexed = opcode & 0x0100_0000 != 0;
    let wb = opcode & 0x0020_0000 != 0;
    cop::a32_perform_ldc_stc(cpu, opcode, base, offset, preindexed, wb)
}

/// Data-processing and miscellaneous space (bits 27-25 = 000).
fn exec_000(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if opcode & 0x90 == 0x90 {
        if opcode & 0xF0 == 0x90 {
            return exec_mul_swp_ex(cpu, opcode);
        }
        return exec_extra_load_store(cpu, opcode);
    }
    if opcode & 0x0190_0000 == 0x0100_0000 {
        return exec_misc(cpu, opcode);
    }
    exec_dp(cpu, opcode)
}

fn exec_mul_swp_ex(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let s = opcode & 0x0010_0000 != 0;
    let rd16 = ((opcode >> 16) & 0xF) as usize;
    let rd12 = ((opcode >> 12) & 0xF) as usize;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;
    let rs = ((opcode >> 8) & 0xF) as usize;

    match (opcode >> 20) & 0xFF {
        0x00 | 0x01 => {
            // mul
            let res = cpu.a32_reg(rm).wrapping_mul(cpu.a32_reg(rs));
            if s {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            cpu.a32_set_reg(rd16, res);
            Ok(())
        }
        0x02 | 0x03 => {
            // mla
            let res = cpu
                .a32_reg(rm)
                .wrapping_mul(cpu.a32_reg(rs))
                .wrapping_add(cpu.a32_reg(rd12));
            if s {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            cpu.a32_set_reg(rd16, res);
            Ok(())
        }
        0x04 => {
            // umaal (v6)
            if cpu.config.version < Version::V6 {
                return Err(Exception::Undefined);
            }
            let res = cpu.a32_reg(rm) as u64 * cpu.a32_reg(rs) as u64
                + cpu.a32_reg(rd12) as u64
                + cpu.a32_reg(rd16) as u64;
            cpu.a32_set_reg(rd12, res as u32);
            cpu.a32_set_reg(rd16, (res >> 32) as u32);
            Ok(())
        }
        0x06 => {
            // mls (v6T2)
            if !cpu.config.features.contains(Features::THUMB2) {
                return Err(Exception::Undefined);
            }
            let res = cpu
                .a32_reg(rd12)
                .wrapping_sub(cpu.a32_reg(rm).wrapping_mul(cpu.a32_reg(rs)));
            cpu.a32_set_reg(rd16, res);
            Ok(())
        }
        0x08..=0x0F => {
            // long multiplies
            if !cpu.config.features.contains(Features::MULL) {
                return Err(Exception::Undefined);
            }
            let signed = opcode & 0x0040_0000 != 0;
            let accumulate = opcode & 0x0020_0000 != 0;
            let mut res = if signed {
                (cpu.a32_reg(rm) as i32 as i64).wrapping_mul(cpu.a32_reg(rs) as i32 as i64) as u64
            } else {
                cpu.a32_reg(rm) as u64 * cpu.a32_reg(rs) as u64
            };
            if accumulate {
                let acc = cpu.a32_reg(rd12) as u64 | (cpu.a32_reg(rd16) as u64) << 32;
                res = res.wrapping_add(acc);
            }
            if s {
                alu::set_nz64(&mut cpu.pstate, res);
            }
            cpu.a32_set_reg(rd12, res as u32);
            cpu.a32_set_reg(rd16, (res >> 32) as u32);
            Ok(())
        }
        0x10 | 0x14 => {
            // swp/swpb
            if !cpu.config.features.contains(Features::SWP) {
                return Err(Exception::Undefined);
            }
            let address = cpu.a32_reg(rn);
            a26_check_address(cpu, address)?;
            if opcode & 0x0040_0000 != 0 {
                let old = cpu.a32_read8(address, false)?;
                let value = cpu.a32_reg(rm) as u8;
                cpu.a32_write8(address, value, false)?;
                cpu.a32_set_reg(rd12, old as u32);
            } else {
                let old = cpu.a32_read32(address & !3, false)?;
                let old = old.rotate_right((address & 3) * 8);
                let value = cpu.a32_reg(rm);
                cpu.a32_write32(address & !3, value, false)?;
                cpu.a32_set_reg(rd12, old);
            }
            Ok(())
        }
        0x18 => {
            // strex
            let value = cpu.a32_reg(rm);
            let res = a32_strex(cpu, value, rn, 0, 4)?;
            cpu.a32_set_reg(rd12, res);
            Ok(())
        }
        0x19 => {
            let res = a32_ldrex(cpu, rn, 0, 4)?;
            cpu.a32_set_reg(rd12, res);
            Ok(())
        }
        0x1A => {
            let res = a32_strexd(cpu, rm, rm + 1, rn)?;
            cpu.a32_set_reg(rd12, res);
            Ok(())
        }
        0x1B => a32_ldrexd(cpu, rd12, rd12 + 1, rn),
        0x1C => {
            let value = cpu.a32_reg(rm);
            let res = a32_strex(cpu, value, rn, 0, 1)?;
            cpu.a32_set_reg(rd12, res);
            Ok(())
        }
        0x1D => {
            let res = a32_ldrex(cpu, rn, 0, 1)?;
            cpu.a32_set_reg(rd12, res);
            Ok(())
        }
        0x1E => {
            let value = cpu.a32_reg(rm);
            let res = a32_strex(cpu, value, rn, 0, 2)?;
            cpu.a32_set_reg(rd12, res);
            Ok(())
        }
        0x1F => {
            let res = a32_ldrex(cpu, rn, 0, 2)?;
            cpu.a32_set_reg(rd12, res);
            Ok(())
        }
        _ => Err(Exception::Undefined),
    }
}

fn exec_extra_load_store(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let p = opcode & 0x0100_0000 != 0;
    let u = opcode & 0x0080_0000 != 0;
    let w = opcode & 0x0020_0000 != 0;
    let l = opcode & 0x0010_0000 != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;

    let mut offset = if opcode & 0x0040_0000 != 0 {
        ((opcode >> 4) & 0xF0) | (opcode & 0xF)
    } else {
        cpu.a32_reg((opcode & 0xF) as usize)
    };
    if !u {
        offset = offset.wrapping_neg();
    }
    let wb = !p || w;
    let usermode = !p && w;

    match ((opcode >> 5) & 3, l) {
        (0b01, true) => {
            let value = a32_ldrh(cpu, rn, offset, p, wb, usermode)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        (0b01, false) => {
            let value = cpu.a32_reg_str(rd);
            a32_strh(cpu, value, rn, offset, p, wb, usermode)
        }
        (0b10, true) => {
            let value = a32_ldrsb(cpu, rn, offset, p, wb, usermode)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        (0b10, false) => {
            // ldrd (v5TE)
            if !cpu.config.features.contains(Features::DSP_PAIR) {
                return Err(Exception::Undefined);
            }
            a32_ldrd(cpu, rd, rd + 1, rn, offset, p, wb)
        }
        (0b11, true) => {
            let value = a32_ldrsh(cpu, rn, offset, p, wb, usermode)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        (0b11, false) => {
            // strd (v5TE)
            if !cpu.config.features.contains(Features::DSP_PAIR) {
                return Err(Exception::Undefined);
            }
            a32_strd(cpu, rd, rd + 1, rn, offset, p, wb)
        }
        _ => Err(Exception::Undefined),
    }
}

/// The miscellaneous space: mode transfers, branches-and-exchange,
/// saturating arithmetic, halfword multiplies, software breakpoints.
fn exec_misc(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let rm = (opcode & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let spsr = opcode & 0x0040_0000 != 0;

    match (opcode >> 4) & 0xF {
        0b0000 => {
            if opcode & 0x0020_0000 == 0 {
                // mrs, including the banked-register form (bit 9)
                if opcode & 0x0000_0200 != 0 {
                    return exec_banked_mrs(cpu, opcode);
                }
                let value = if spsr { cpu.spsr() } else { cpu.cpsr() };
                cpu.a32_set_reg(rd, value);
            } else {
                if opcode & 0x0000_0200 != 0 {
                    return exec_banked_msr(cpu, opcode);
                }
                // msr register
                let value = cpu.a32_reg(rm);
                msr(cpu, opcode, spsr, value);
            }
            Ok(())
        }
        0b0001 => {
            if opcode & 0x0FFF_0FF0 == 0x016F_0F10 {
                // clz (v5)
                if cpu.config.version < Version::V5 {
                    return Err(Exception::Undefined);
                }
                let res = cpu.a32_reg(rm).leading_zeros();
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            // bx (v4T)
            let target = cpu.a32_reg(rm);
            cpu.a32_set_pc_interworking(target);
            Ok(())
        }
        0b0010 => {
            // bxj (v5TEJ)
            if !cpu.config.features.contains(Features::JAZELLE) {
                return Err(Exception::Undefined);
            }
            let fallback = cpu.a32_reg(rm);
            a32_bxj(cpu, fallback);
            Ok(())
        }
        0b0011 => {
            // blx register (v5)
            if cpu.config.version < Version::V5 {
                return Err(Exception::Undefined);
            }
            let target = cpu.a32_reg(rm);
            let lr = cpu.r[PC] as u32;
            cpu.a32_set_reg(A32_LR, lr);
            cpu.a32_set_pc_interworking(target);
            Ok(())
        }
        0b0101 => {
            // saturating add/subtract (v5TE)
            if !cpu.config.features.contains(Features::ENH_DSP) {
                return Err(Exception::Undefined);
            }
            let op1 = cpu.a32_reg(rm) as i32;
            let op2 = cpu.a32_reg(rn) as i32;
            let res = match (opcode >> 21) & 3 {
                0b00 => alu::qadd32(&mut cpu.pstate, op1, op2),
                0b01 => alu::qsub32(&mut cpu.pstate, op1, op2),
                0b10 => alu::qdadd32(&mut cpu.pstate, op1, op2),
                _ => alu::qdsub32(&mut cpu.pstate, op1, op2),
            };
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0b0110 if (opcode >> 21) & 3 == 0b11 && opcode & 0xF == 0xE => {
            // eret (virtualization extensions)
            cpu.a32_eret();
            Ok(())
        }
        0b0111 => match (opcode >> 21) & 3 {
            0b01 => Err(Exception::Breakpoint), // bkpt (v5)
            0b10 => {
                if !cpu.el2_supported {
                    return Err(Exception::Undefined);
                }
                Err(Exception::Hvc)
            }
            0b11 => {
                if !cpu.el3_supported {
                    return Err(Exception::Undefined);
                }
                Err(Exception::Smc)
            }
            _ => Err(Exception::Undefined),
        },
        0b1000 | 0b1010 | 0b1100 | 0b1110 => exec_halfword_multiply(cpu, opcode),
        _ => Err(Exception::Undefined),
    }
}

/// Banked register transfer tables (MRS/MSR with the R<m:m1> syntax).
const A32_BANKED_REGISTERS: [u8; 32] = [
    8, 9, 10, 11, 12, 13, 14, 0xFF,
    R8_FIQ as u8, R9_FIQ as u8, R10_FIQ as u8, R11_FIQ as u8,
    R12_FIQ as u8, R13_FIQ as u8, R14_FIQ as u8, 0xFF,
    R14_IRQ as u8, R13_IRQ as u8, R14_SVC as u8, R13_SVC as u8,
    R14_ABT as u8, R13_ABT as u8, R14_UND as u8, R13_UND as u8,
    R14_MON as u8, R13_MON as u8, R14_MON as u8, R13_MON as u8,
    ELR_HYP as u8, R13_HYP as u8, ELR_HYP as u8, R13_HYP as u8,
];

const A32_BANKED_SPSRS: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, SPSR_FIQ as u8, 0xFF,
    SPSR_IRQ as u8, 0xFF, SPSR_SVC as u8, 0xFF,
    SPSR_ABT as u8, 0xFF, SPSR_UND as u8, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, SPSR_MON as u8, 0xFF, SPSR_HYP as u8, 0xFF,
];

fn banked_index(opcode: u32) -> usize {
    (((opcode >> 4) & 0x10) | ((opcode >> 16) & 0xF)) as usize
}

fn exec_banked_mrs(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let rd = ((opcode >> 12) & 0xF) as usize;
    let table = if opcode & 0x0040_0000 != 0 { &A32_BANKED_SPSRS } else { &A32_BANKED_REGISTERS };
    let slot = table[banked_index(opcode)];
    if slot == 0xFF {
        return Err(Exception::Undefined);
    }
    let value = cpu.r[slot as usize] as u32;
    cpu.a32_set_reg(rd, value);
    Ok(())
}

fn exec_banked_msr(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let rn = (opcode & 0xF) as usize;
    let table = if opcode & 0x0040_0000 != 0 { &A32_BANKED_SPSRS } else { &A32_BANKED_REGISTERS };
    let slot = table[banked_index(opcode)];
    if slot == 0xFF {
        return Err(Exception::Undefined);
    }
    cpu.r[slot as usize] = cpu.a32_reg(rn) as u64;
    Ok(())
}

fn msr_mask(opcode: u32) -> u32 {
    let mut mask = 0;
    if opcode & 0x0008_0000 != 0 {
        mask |= 0xFF00_0000;
    }
    if opcode & 0x0004_0000 != 0 {
        mask |= 0x00FF_0000;
    }
    if opcode & 0x0002_0000 != 0 {
        mask |= 0x0000_FF00;
    }
    if opcode & 0x0001_0000 != 0 {
        mask |= 0x0000_00FF;
    }
    mask
}

fn msr(cpu: &mut Cpu, opcode: u32, spsr: bool, value: u32) {
    let mut mask = msr_mask(opcode);
    if spsr {
        cpu.set_spsr(mask, value);
    } else {
        if !cpu.privileged() {
            // user mode can only touch the flags byte
            mask &= 0xFF00_0000 & !(CPSR_IT_MASK | CPSR_GE_MASK);
        }
        cpu.set_cpsr(mask, value);
    }
}

fn exec_halfword_multiply(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if !cpu.config.features.contains(Features::ENH_DSP) {
        return Err(Exception::Undefined);
    }
    let rd = ((opcode >> 16) & 0xF) as usize;
    let ra = ((opcode >> 12) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;
    let rs = ((opcode >> 8) & 0xF) as usize;
    let x = opcode & 0x20 != 0;
    let y = opcode & 0x40 != 0;

    let half = |value: u32, top: bool| -> i32 {
        if top { (value >> 16) as i16 as i32 } else { value as i16 as i32 }
    };

    match (opcode >> 21) & 3 {
        0b00 => {
            // smla<x><y>: the accumulate saturates into Q
            let product = half(cpu.a32_reg(rm), x).wrapping_mul(half(cpu.a32_reg(rs), y));
            let acc = cpu.a32_reg(ra) as i32;
            let res = alu::qadd32(&mut cpu.pstate, product, acc);
            cpu.a32_set_reg(rd, res);
        }
        0b01 => {
            let product =
                ((cpu.a32_reg(rm) as i32 as i64 * half(cpu.a32_reg(rs), y) as i64) >> 16) as i32;
            if x {
                // smulw<y>
                cpu.a32_set_reg(rd, product as u32);
            } else {
                // smlaw<y>
                let acc = cpu.a32_reg(ra) as i32;
                let res = alu::qadd32(&mut cpu.pstate, product, acc);
                cpu.a32_set_reg(rd, res);
            }
        }
        0b10 => {
            // smlal<x><y>
            let product = half(cpu.a32_reg(rm), x) as i64 * half(cpu.a32_reg(rs), y) as i64;
            let acc = cpu.a32_reg(ra) as u64 | (cpu.a32_reg(rd) as u64) << 32;
            let res = (acc as i64).wrapping_add(product) as u64;
            cpu.a32_set_reg(ra, res as u32);
            cpu.a32_set_reg(rd, (res >> 32) as u32);
        }
        _ => {
            // smul<x><y>
            let product = half(cpu.a32_reg(rm), x).wrapping_mul(half(cpu.a32_reg(rs), y));
            cpu.a32_set_reg(rd, product as u32);
        }
    }
    Ok(())
}

/// Data processing with a register operand.
fn exec_dp(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let op = (opcode >> 21) & 0xF;
    let s = opcode & 0x0010_0000 != 0;
    let logical = matches!(op, 0x0 | 0x1 | 0x8 | 0x9 | 0xC | 0xD | 0xE | 0xF);
    let operand2 = a32_get_register_operand(cpu, opcode, s && logical);
    dp_common(cpu, opcode, operand2)
}

/// Data processing, immediate and register forms share this back end.
pub(crate) fn dp_common(cpu: &mut Cpu, opcode: u32, operand2: u32) -> ExecResult {
    let op = (opcode >> 21) & 0xF;
    let s = opcode & 0x0010_0000 != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let dest_pc = rd == A32_PC_NUM;
    let op1 = cpu.a32_reg_lhs(rn);

    let set_nz = |cpu: &mut Cpu, res: u32| {
        if dest_pc {
            cpu.a32_copy_flags(res);
        } else {
            alu::set_nz32(&mut cpu.pstate, res);
        }
    };
    let set_nzcv = |cpu: &mut Cpu, res: u32, a: u32, b: u32| {
        if dest_pc {
            cpu.a32_copy_flags(res);
        } else {
            alu::set_nzcv32(&mut cpu.pstate, res, a, b);
        }
    };

    let result = match op {
        0x0 => {
            // and
            let res = op1 & operand2;
            if s {
                set_nz(cpu, res);
            }
            Some(res)
        }
        0x1 => {
            let res = op1 ^ operand2;
            if s {
                set_nz(cpu, res);
            }
            Some(res)
        }
        0x2 => {
            let res = op1.wrapping_sub(operand2);
            if s {
                set_nzcv(cpu, res, op1, !operand2);
            }
            Some(res)
        }
        0x3 => {
            let res = operand2.wrapping_sub(op1);
            if s {
                set_nzcv(cpu, res, operand2, !op1);
            }
            Some(res)
        }
        0x4 => {
            let res = op1.wrapping_add(operand2);
            if s {
                set_nzcv(cpu, res, op1, operand2);
            }
            Some(res)
        }
        0x5 => {
            let res = op1.wrapping_add(operand2).wrapping_add(cpu.pstate.c as u32);
            if s {
                set_nzcv(cpu, res, op1, operand2);
            }
            Some(res)
        }
        0x6 => {
            let res = op1
                .wrapping_sub(operand2)
                .wrapping_add(cpu.pstate.c as u32)
                .wrapping_sub(1);
            if s {
                set_nzcv(cpu, res, op1, !operand2);
            }
            Some(res)
        }
        0x7 => {
            let res = operand2
                .wrapping_sub(op1)
                .wrapping_add(cpu.pstate.c as u32)
                .wrapping_sub(1);
            if s {
                set_nzcv(cpu, res, operand2, !op1);
            }
            Some(res)
        }
        0x8 => {
            set_nz(cpu, op1 & operand2); // tst
            None
        }
        0x9 => {
            set_nz(cpu, op1 ^ operand2); // teq
            None
        }
        0xA => {
            let res = op1.wrapping_sub(operand2); // cmp
            set_nzcv(cpu, res, op1, !operand2);
            None
        }
        0xB => {
            let res = op1.wrapping_add(operand2); // cmn
            set_nzcv(cpu, res, op1, operand2);
            None
        }
        0xC => {
            let res = op1 | operand2;
            if s {
                set_nz(cpu, res);
            }
            Some(res)
        }
        0xD => {
            if s {
                set_nz(cpu, operand2); // mov
            }
            Some(operand2)
        }
        0xE => {
            let res = op1 & !operand2; // bic
            if s {
                set_nz(cpu, res);
            }
            Some(res)
        }
        _ => {
            let res = !operand2; // mvn
            if s {
                set_nz(cpu, res);
            }
            Some(res)
        }
    };

    if let Some(mut res) = result {
        if dest_pc && s && !cpu.is_arm26() {
            // the CPSR transfer controls the instruction set; pin bit 0 so
            // the interworking assignment keeps the restored state
            res = match cpu.pstate.jt {
                crate::psr::JT_ARM => res & !1,
                _ => res | 1,
            };
        }
        cpu.a32_set_reg_interworking_v7(rd, res);
    }
    Ok(())
}

/// Immediate data processing space, plus MSR immediate, hints and the wide
/// moves.
fn exec_001(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let op = (opcode >> 20) & 0xFF;
    match op {
        0x30 | 0x34 => {
            // movw/movt (v6T2)
            if !cpu.config.features.contains(Features::THUMB2) {
                return Err(Exception::Undefined);
            }
            let rd = ((opcode >> 12) & 0xF) as usize;
            let imm16 = ((opcode >> 4) & 0xF000) | (opcode & 0xFFF);
            if op == 0x30 {
                cpu.a32_set_reg(rd, imm16);
            } else {
                let low = cpu.a32_reg(rd) & 0xFFFF;
                cpu.a32_set_reg(rd, imm16 << 16 | low);
            }
            Ok(())
        }
        0x32 | 0x36 => {
            // msr immediate; an all-zero mask is the hint space (nop/wfi)
            if msr_mask(opcode) == 0 {
                return Ok(());
            }
            let value = a32_get_immediate_operand(opcode);
            msr(cpu, opcode, opcode & 0x0040_0000 != 0, value);
            Ok(())
        }
        _ => {
            let operand2 = a32_get_immediate_operand(opcode);
            dp_common(cpu, opcode, operand2)
        }
    }
}

fn exec_load_store(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let p = opcode & 0x0100_0000 != 0;
    let w = opcode & 0x0020_0000 != 0;
    let byte = opcode & 0x0040_0000 != 0;
    let load = opcode & 0x0010_0000 != 0;
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;

    let offset = a32_get_address_operand(cpu, opcode);
    let wb = !p || w;
    let usermode = !p && w;

    match (load, byte) {
        (true, true) => {
            let value = a32_ldrb(cpu, rn, offset, p, wb, usermode)?;
            cpu.a32_set_reg(rd, value);
        }
        (true, false) => {
            let value = a32_ldr(cpu, rn, offset, p, wb, usermode)?;
            cpu.a32_set_reg_interworking_v5(rd, value);
        }
        (false, true) => {
            let value = cpu.a32_reg_str(rd);
            a32_strb(cpu, value, rn, offset, p, wb, usermode)?;
        }
        (false, false) => {
            let value = cpu.a32_reg_str(rd);
            a32_str(cpu, value, rn, offset, p, wb, usermode)?;
        }
    }
    Ok(())
}

/// The v6 media space: parallel add/sub, saturation, extension, reversal,
/// bitfields and division.
fn exec_media(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;

    match (opcode >> 20) & 0x1F {
        0x01 | 0x02 | 0x03 | 0x05 | 0x06 | 0x07 => return exec_parallel(cpu, opcode),
        0x08 => {
            if (opcode >> 4) & 7 == 0b001 {
                // pkhbt/pkhtb
                if cpu.config.version < Version::V6 {
                    return Err(Exception::Undefined);
                }
                let imm5 = (opcode >> 7) & 0x1F;
                let a = cpu.a32_reg(rn);
                let b = cpu.a32_reg(rm);
                let res = if opcode & 0x40 == 0 {
                    (a & 0xFFFF) | ((b << imm5) & 0xFFFF_0000)
                } else {
                    let amount = if imm5 == 0 { 31 } else { imm5 };
                    (a & 0xFFFF_0000) | ((((b as i32) >> amount) as u32) & 0xFFFF)
                };
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0xB {
                // sel: GE bits pick bytes
                if cpu.config.version < Version::V6 {
                    return Err(Exception::Undefined);
                }
                let a = cpu.a32_reg(rn);
                let b = cpu.a32_reg(rm);
                let mut res = 0u32;
                for i in 0..4 {
                    let byte = if cpu.pstate.ge & (1 << i) != 0 {
                        (a >> (i * 8)) & 0xFF
                    } else {
                        (b >> (i * 8)) & 0xFF
                    };
                    res |= byte << (i * 8);
                }
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
        }
        0x0A | 0x0B => {
            // ssat / ssat16
            if (opcode >> 4) & 3 == 0b01 {
                let sat_to = ((opcode >> 16) & 0x1F) + 1;
                let shifted = {
                    let shift_type = ((opcode >> 6) & 1) << 1; // lsl or asr
                    let amount = (opcode >> 7) & 0x1F;
                    let amount = if shift_type == 2 && amount == 0 { 31 } else { amount };
                    alu::shifted32(cpu.a32_reg(rm), shift_type, amount)
                };
                let (res, saturated) = alu::ssat(shifted as i32, sat_to);
                if saturated {
                    cpu.pstate.q = true;
                }
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0x3 && (opcode >> 20) & 0x1F == 0x0A {
                // ssat16
                let sat_to = ((opcode >> 16) & 0xF) + 1;
                let value = cpu.a32_reg(rm);
                let (lo, s1) = alu::ssat(value as i16 as i32, sat_to);
                let (hi, s2) = alu::ssat((value >> 16) as i16 as i32, sat_to);
                if s1 || s2 {
                    cpu.pstate.q = true;
                }
                cpu.a32_set_reg(rd, (hi << 16) | (lo & 0xFFFF));
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0x7 {
                // sxtab/sxtb (0x0A), sxtah/sxth (0x0B)
                let rotate = ((opcode >> 10) & 3) * 8;
                let value = cpu.a32_reg(rm).rotate_right(rotate);
                let extended = if (opcode >> 20) & 1 == 0 {
                    alu::sign_extend32(8, value & 0xFF)
                } else {
                    alu::sign_extend32(16, value & 0xFFFF)
                };
                let res = if rn == 0xF {
                    extended
                } else {
                    cpu.a32_reg(rn).wrapping_add(extended)
                };
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0x3 && (opcode >> 20) & 0x1F == 0x0B {
                // rev
                let res = cpu.a32_reg(rm).swap_bytes();
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0xB && (opcode >> 20) & 0x1F == 0x0B {
                // rev16
                let res = alu::bswap32_16(cpu.a32_reg(rm));
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
        }
        0x0E | 0x0F => {
            if (opcode >> 4) & 3 == 0b01 {
                // usat
                let sat_to = (opcode >> 16) & 0x1F;
                let shifted = {
                    let shift_type = ((opcode >> 6) & 1) << 1;
                    let amount = (opcode >> 7) & 0x1F;
                    let amount = if shift_type == 2 && amount == 0 { 31 } else { amount };
                    alu::shifted32(cpu.a32_reg(rm), shift_type, amount)
                };
                let (res, saturated) = alu::usat(shifted as i32, sat_to);
                if saturated {
                    cpu.pstate.q = true;
                }
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0x3 && (opcode >> 20) & 0x1F == 0x0E {
                // usat16
                let sat_to = (opcode >> 16) & 0xF;
                let value = cpu.a32_reg(rm);
                let (lo, s1) = alu::usat(value as i16 as i32, sat_to);
                let (hi, s2) = alu::usat((value >> 16) as i16 as i32, sat_to);
                if s1 || s2 {
                    cpu.pstate.q = true;
                }
                cpu.a32_set_reg(rd, (hi << 16) | (lo & 0xFFFF));
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0x7 {
                // uxtab/uxtb (0x0E), uxtah/uxth (0x0F)
                let rotate = ((opcode >> 10) & 3) * 8;
                let value = cpu.a32_reg(rm).rotate_right(rotate);
                let extended = if (opcode >> 20) & 1 == 0 { value & 0xFF } else { value & 0xFFFF };
                let res = if rn == 0xF {
                    extended
                } else {
                    cpu.a32_reg(rn).wrapping_add(extended)
                };
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0x3 && (opcode >> 20) & 0x1F == 0x0F {
                // rbit (v6T2)
                let res = cpu.a32_reg(rm).reverse_bits();
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
            if (opcode >> 4) & 0xF == 0xB && (opcode >> 20) & 0x1F == 0x0F {
                // revsh
                let res = alu::sign_extend32(16, (cpu.a32_reg(rm) as u16).swap_bytes() as u32);
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
        }
        0x11 | 0x13 => {
            if (opcode >> 4) & 0xF == 0x1 && (opcode >> 12) & 0xF == 0xF {
                // sdiv/udiv (v7 with the division extension)
                if cpu.config.version < Version::V7 {
                    return Err(Exception::Undefined);
                }
                let rd = ((opcode >> 16) & 0xF) as usize;
                let rn = (opcode & 0xF) as usize;
                let rm = ((opcode >> 8) & 0xF) as usize;
                let num = cpu.a32_reg(rn);
                let den = cpu.a32_reg(rm);
                let res = if (opcode >> 21) & 1 == 0 {
                    // sdiv; division by zero yields zero
                    let num = num as i32;
                    let den = den as i32;
                    if den == 0 { 0 } else { num.wrapping_div(den) as u32 }
                } else if den == 0 {
                    0
                } else {
                    num / den
                };
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
        }
        0x1A | 0x1B | 0x1E | 0x1F => {
            if (opcode >> 4) & 7 == 0b101 {
                // sbfx/ubfx (v6T2)
                if !cpu.config.features.contains(Features::THUMB2) {
                    return Err(Exception::Undefined);
                }
                let lsb = (opcode >> 7) & 0x1F;
                let widthm1 = (opcode >> 16) & 0x1F;
                let value = cpu.a32_reg(rm);
                let res = if opcode & 0x0040_0000 == 0 {
                    alu::sbfm32(value, lsb, lsb + widthm1)
                } else {
                    alu::ubfm32(value, lsb, lsb + widthm1)
                };
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
        }
        0x1C | 0x1D => {
            if (opcode >> 4) & 7 == 0b001 {
                // bfi/bfc (v6T2)
                if !cpu.config.features.contains(Features::THUMB2) {
                    return Err(Exception::Undefined);
                }
                let lsb = (opcode >> 7) & 0x1F;
                let msb = (opcode >> 16) & 0x1F;
                let base = cpu.a32_reg(rd);
                let res = if rm == 0xF {
                    alu::bfc32(base, lsb, msb)
                } else {
                    alu::bfi32(base, cpu.a32_reg(rm), lsb, msb)
                };
                cpu.a32_set_reg(rd, res);
                return Ok(());
            }
        }
        _ => {}
    }
    Err(Exception::Undefined)
}

/// Parallel add/sub in the four signedness flavours, 8- and 16-bit lanes.
fn exec_parallel(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    if cpu.config.version < Version::V6 {
        return Err(Exception::Undefined);
    }
    let rn = ((opcode >> 16) & 0xF) as usize;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let rm = (opcode & 0xF) as usize;
    let a = cpu.a32_reg(rn);
    let b = cpu.a32_reg(rm);
    let flavor = (opcode >> 20) & 7; // 1 signed, 2 Q, 3 SH, 5 unsigned, 6 UQ, 7 UH
    let op2 = (opcode >> 5) & 7;

    let mut ge = cpu.pstate.ge;
    let mut res = 0u32;

    match op2 {
        0b000 | 0b011 => {
            // 16-bit lanes
            let sub = op2 == 0b011;
            for lane in 0..2 {
                let shift = lane * 16;
                let x = (a >> shift) as u16;
                let y = (b >> shift) as u16;
                let value: u16 = match flavor {
                    1 => {
                        let full = if sub {
                            x as i16 as i32 - y as i16 as i32
                        } else {
                            x as i16 as i32 + y as i16 as i32
                        };
                        let bits = 3 << (lane * 2);
                        if full >= 0 { ge |= bits } else { ge &= !bits }
                        full as u16
                    }
                    2 => {
                        let full = if sub {
                            (x as i16).saturating_sub(y as i16)
                        } else {
                            (x as i16).saturating_add(y as i16)
                        };
                        full as u16
                    }
                    3 => {
                        let full = if sub {
                            x as i16 as i32 - y as i16 as i32
                        } else {
                            x as i16 as i32 + y as i16 as i32
                        };
                        (full >> 1) as u16
                    }
                    5 => {
                        let full = if sub {
                            x as i32 - y as i32
                        } else {
                            x as i32 + y as i32
                        };
                        let bits = 3 << (lane * 2);
                        let ok = if sub { full >= 0 } else { full >= 0x1_0000 };
                        if ok { ge |= bits } else { ge &= !bits }
                        full as u16
                    }
                    6 => {
                        if sub { x.saturating_sub(y) } else { x.saturating_add(y) }
                    }
                    7 => {
                        let full = if sub { x as u32 as i32 - y as i32 } else { x as i32 + y as i32 };
                        (full >> 1) as u16
                    }
                    _ => return Err(Exception::Undefined),
                };
                res |= (value as u32) << shift;
            }
        }
        0b100 | 0b111 => {
            // 8-bit lanes
            let sub = op2 == 0b111;
            for lane in 0..4 {
                let shift = lane * 8;
                let x = (a >> shift) as u8;
                let y = (b >> shift) as u8;
                let value: u8 = match flavor {
                    1 => {
                        let full = if sub {
                            x as i8 as i16 - y as i8 as i16
                        } else {
                            x as i8 as i16 + y as i8 as i16
                        };
                        let bit = 1 << lane;
                        if full >= 0 { ge |= bit } else { ge &= !bit }
                        full as u8
                    }
                    2 => {
                        (if sub { (x as i8).saturating_sub(y as i8) } else { (x as i8).saturating_add(y as i8) }) as u8
                    }
                    3 => {
                        let full = if sub {
                            x as i8 as i16 - y as i8 as i16
                        } else {
                            x as i8 as i16 + y as i8 as i16
                        };
                        (full >> 1) as u8
                    }
                    5 => {
                        let full = if sub { x as i16 - y as i16 } else { x as i16 + y as i16 };
                        let bit = 1 << lane;
                        let ok = if sub { full >= 0 } else { full >= 0x100 };
                        if ok { ge |= bit } else { ge &= !bit }
                        full as u8
                    }
                    6 => {
                        if sub { x.saturating_sub(y) } else { x.saturating_add(y) }
                    }
                    7 => {
                        let full = if sub { x as i16 - y as i16 } else { x as i16 + y as i16 };
                        (full >> 1) as u8
                    }
                    _ => return Err(Exception::Undefined),
                };
                res |= (value as u32) << shift;
            }
        }
        _ => return Err(Exception::Undefined),
    }

    cpu.pstate.ge = ge;
    cpu.a32_set_reg(rd, res);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, Configuration, IsaSet};
    use crate::exc::EmuResult;
    use crate::testutil::TestRam;

    fn cpu_with_program(version: Version, words: &[u32]) -> Cpu {
        let config = Configuration {
            version,
            features: default_features(version),
            ..Configuration::default()
        };
        let isas = match version {
            Version::V1 | Version::V2 => IsaSet::ARM26,
            Version::V3 => IsaSet::ARM26 | IsaSet::ARM32,
            _ => IsaSet::ARM32 | IsaSet::THUMB | IsaSet::JAZELLE,
        };
        let mut ram = TestRam::new(0x1_0000);
        for (i, word) in words.iter().enumerate() {
            ram.0[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        let mut cpu = Cpu::new(config, isas, Box::new(ram));
        cpu.set_isa(if version <= Version::V2 { Isa::Arm26 } else { Isa::Arm32 });
        cpu.capture_breaks = true;
        cpu
    }

    #[test]
    fn test_mov_add_immediates() {
        // mov r0, #1; add r1, r0, #2
        let mut cpu = cpu_with_program(Version::V7, &[0xE3A0_0001, 0xE280_1002]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 1);
        assert_eq!(cpu.a32_reg(1), 3);
        assert_eq!(cpu.result, EmuResult::Ok);
    }

    #[test]
    fn test_subs_sets_borrow_convention() {
        // mov r0, #3; subs r1, r0, #5
        let mut cpu = cpu_with_program(Version::V7, &[0xE3A0_0003, 0xE250_1005]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(1), 3u32.wrapping_sub(5));
        assert!(!cpu.pstate.c); // borrow
        assert!(cpu.pstate.n);
    }

    #[test]
    fn test_condition_gating() {
        // movs r0, #0; moveq r1, #1; movne r2, #2
        let mut cpu = cpu_with_program(
            Version::V7,
            &[0xE3B0_0000, 0x03A0_1001, 0x13A0_2002],
        );
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(1), 1);
        assert_eq!(cpu.a32_reg(2), 0);
    }

    #[test]
    fn test_shifter_carry_out() {
        // movs r0, #0x80000000; movs r1, r0, lsl #1
        let mut cpu = cpu_with_program(Version::V7, &[0xE3B0_0102, 0xE1B0_1080]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(1), 0);
        assert!(cpu.pstate.c);
        assert!(cpu.pstate.z);
    }

    #[test]
    fn test_ldr_str_round_trip() {
        // mov r0, #0x100; mov r1, #42; str r1, [r0]; ldr r2, [r0]
        let mut cpu = cpu_with_program(
            Version::V7,
            &[0xE3A0_0C01, 0xE3A0_102A, 0xE580_1000, 0xE590_2000],
        );
        for _ in 0..4 {
            cpu.step();
        }
        assert_eq!(cpu.a32_reg(2), 42);
    }

    #[test]
    fn test_pre_v7_rotated_unaligned_load() {
        // word at 0x100 = 0x11223344, ldr from 0x102 rotates
        let mut cpu = cpu_with_program(Version::V5, &[0xE590_2000]);
        cpu.write32_data(0x100, 0x1122_3344);
        cpu.a32_set_reg(0, 0x102);
        cpu.step();
        assert_eq!(cpu.a32_reg(2), 0x3344_1122);
    }

    #[test]
    fn test_ldm_base_restore_wins_over_writeback() {
        // ldmia r0!, {r0, r1}: the loaded r0 is kept, no writeback
        let mut cpu = cpu_with_program(Version::V7, &[0xE8B0_0003]);
        cpu.write32_data(0x200, 0xAAAA);
        cpu.write32_data(0x204, 0xBBBB);
        cpu.a32_set_reg(0, 0x200);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0xAAAA);
        assert_eq!(cpu.a32_reg(1), 0xBBBB);
    }

    #[test]
    fn test_stm_lowest_base_stores_old_value() {
        // stmia r0!, {r0, r1}: r0 is the lowest register, the pre-writeback
        // value goes to memory
        let mut cpu = cpu_with_program(Version::V7, &[0xE8A0_0003]);
        cpu.a32_set_reg(0, 0x300);
        cpu.a32_set_reg(1, 7);
        cpu.step();
        assert_eq!(cpu.read32_data(0x300), 0x300);
        assert_eq!(cpu.read32_data(0x304), 7);
        assert_eq!(cpu.a32_reg(0), 0x308);
    }

    #[test]
    fn test_stmdb_then_ldmia_round_trip() {
        // mov sp, #0x400; stmdb sp!, {r1, r2}; ldmia sp!, {r3, r4}
        let mut cpu = cpu_with_program(
            Version::V7,
            &[0xE3A0_DB01, 0xE92D_0006, 0xE8BD_0018],
        );
        cpu.a32_set_reg(1, 0x11);
        cpu.a32_set_reg(2, 0x22);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(13), 0x3F8);
        cpu.step();
        assert_eq!(cpu.a32_reg(3), 0x11);
        assert_eq!(cpu.a32_reg(4), 0x22);
        assert_eq!(cpu.a32_reg(13), 0x400);
    }

    #[test]
    fn test_branch_and_link() {
        // bl +8 (target 0x10); lr = 4
        let mut cpu = cpu_with_program(Version::V7, &[0xEB00_0002]);
        cpu.step();
        assert_eq!(cpu.r[crate::cpu::reg::PC], 0x10);
        assert_eq!(cpu.a32_reg(14), 4);
    }

    #[test]
    fn test_bx_switches_to_thumb() {
        // mov r0, #0x101; bx r0
        let mut cpu = cpu_with_program(Version::V7, &[0xE3A0_0000, 0xE12F_FF10]);
        cpu.a32_set_reg(0, 0x101);
        cpu.r[crate::cpu::reg::PC] = 4;
        cpu.step();
        assert_eq!(cpu.pstate.jt, crate::psr::JT_THUMB);
        assert_eq!(cpu.r[crate::cpu::reg::PC], 0x100);
    }

    #[test]
    fn test_qadd_saturates_and_sets_q() {
        // qadd r0, r1, r2 with r1 = INT_MAX, r2 = 1
        let mut cpu = cpu_with_program(Version::V7, &[0xE102_0051]);
        cpu.a32_set_reg(1, i32::MAX as u32);
        cpu.a32_set_reg(2, 1);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), i32::MAX as u32);
        assert!(cpu.pstate.q);
    }

    #[test]
    fn test_ldrex_strex_pair() {
        // ldrex r1, [r0]; strex r2, r3, [r0]
        let mut cpu = cpu_with_program(Version::V7, &[0xE190_1F9F, 0xE180_2F93]);
        cpu.a32_set_reg(0, 0x100);
        cpu.a32_set_reg(3, 99);
        cpu.write32_data(0x100, 5);
        cpu.step();
        assert_eq!(cpu.a32_reg(1), 5);
        cpu.step();
        assert_eq!(cpu.a32_reg(2), 0); // success
        assert_eq!(cpu.read32_data(0x100), 99);
    }

    #[test]
    fn test_strex_fails_after_intervening_store() {
        // ldrex r1, [r0]; str r3, [r0]; strex r2, r3, [r0]
        let mut cpu = cpu_with_program(
            Version::V7,
            &[0xE190_1F9F, 0xE580_3000, 0xE180_2F93],
        );
        cpu.a32_set_reg(0, 0x100);
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(2), 1); // failed
    }

    #[test]
    fn test_clz() {
        let mut cpu = cpu_with_program(Version::V7, &[0xE16F_0F11]);
        cpu.a32_set_reg(1, 1 << 20);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 11);
    }

    #[test]
    fn test_movw_movt() {
        // movw r0, #0x5678; movt r0, #0x1234
        let mut cpu = cpu_with_program(Version::V7, &[0xE305_0678, 0xE341_0234]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0x1234_5678);
    }

    #[test]
    fn test_bfi_sbfx_ubfx() {
        // bfi r0, r1, #8, #8; ubfx r2, r0, #8, #8; sbfx r3, r0, #8, #8
        let mut cpu = cpu_with_program(
            Version::V7,
            &[0xE7CF_0411, 0xE7E7_2450, 0xE7A7_3450],
        );
        cpu.a32_set_reg(0, 0xFFFF_FFFF);
        cpu.a32_set_reg(1, 0x80);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0xFFFF_80FF);
        cpu.step();
        assert_eq!(cpu.a32_reg(2), 0x80);
        cpu.step();
        assert_eq!(cpu.a32_reg(3), 0xFFFF_FF80);
    }

    #[test]
    fn test_sadd8_ge_bits() {
        // sadd8 r0, r1, r2
        let mut cpu = cpu_with_program(Version::V7, &[0xE611_0F92]);
        cpu.a32_set_reg(1, 0x0000_007F);
        cpu.a32_set_reg(2, 0x0000_00FF); // -1 in the low byte
        cpu.step();
        assert_eq!(cpu.a32_reg(0) & 0xFF, 0x7E);
        assert_ne!(cpu.pstate.ge & 1, 0); // non-negative result
    }

    #[test]
    fn test_sxtb_uxth() {
        // sxtb r0, r1; uxth r2, r1
        let mut cpu = cpu_with_program(Version::V7, &[0xE6AF_0071, 0xE6FF_2071]);
        cpu.a32_set_reg(1, 0x0001_2380);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0xFFFF_FF80);
        cpu.step();
        assert_eq!(cpu.a32_reg(2), 0x2380);
    }

    #[test]
    fn test_svc_is_captured() {
        let mut cpu = cpu_with_program(Version::V7, &[0xEF00_0000]);
        cpu.step();
        assert_eq!(cpu.result, EmuResult::Svc);
    }

    #[test]
    fn test_mrs_msr_round_trip() {
        // msr cpsr_f, #0xF0000000; mrs r0, cpsr
        let mut cpu = cpu_with_program(Version::V7, &[0xE328_F20F, 0xE10F_0000]);
        cpu.pstate.mode = crate::psr::MODE_SVC;
        cpu.step();
        assert!(cpu.pstate.n && cpu.pstate.z && cpu.pstate.c && cpu.pstate.v);
        cpu.step();
        assert_eq!(cpu.a32_reg(0) & 0xF000_0000, 0xF000_0000);
    }

    #[test]
    fn test_arm26_pc_stays_in_range() {
        let mut cpu = cpu_with_program(Version::V2, &[0xE1A0_0000; 8]);
        for _ in 0..8 {
            cpu.step();
            assert!(cpu.r[crate::cpu::reg::PC] < 0x0400_0000);
        }
    }

    #[test]
    fn test_teqp_switches_to_32bit_mode() {
        // ARMv3 in 26-bit mode: teqp pc, #0x10
        let mut cpu = cpu_with_program(Version::V3, &[0xE33F_F010]);
        cpu.set_isa(Isa::Arm26);
        cpu.pstate.mode = crate::psr::MODE_SVC & 3;
        cpu.step();
        assert_eq!(cpu.pstate.rw, crate::psr::RegWidth::W32);
    }

    #[test]
    fn test_data_processing_to_pc_with_s_restores_spsr() {
        // movs pc, lr from SVC mode returns to user state
        let mut cpu = cpu_with_program(Version::V7, &[0xE1B0_F00E]);
        cpu.pstate.mode = crate::psr::MODE_SVC;
        cpu.set_spsr(!0, 0x0000_0010 | crate::psr::CPSR_N); // user mode, N set
        cpu.a32_set_reg(14, 0x2000);
        cpu.step();
        assert_eq!(cpu.pstate.mode, MODE_USR);
        assert!(cpu.pstate.n);
        assert_eq!(cpu.r[crate::cpu::reg::PC], 0x2000);
    }

    #[test]
    fn test_umull() {
        // umull r0, r1, r2, r3
        let mut cpu = cpu_with_program(Version::V7, &[0xE081_0392]);
        cpu.a32_set_reg(2, 0xFFFF_FFFF);
        cpu.a32_set_reg(3, 2);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0xFFFF_FFFE);
        assert_eq!(cpu.a32_reg(1), 1);
    }
}
