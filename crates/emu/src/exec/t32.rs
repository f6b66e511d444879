//! T32 executor
//!
//! 16-bit Thumb, the 32-bit Thumb-2 encodings (first halfword starting
//! 0b11101/0b11110/0b11111), the IT block state machine and the ThumbEE
//! variant with its null-pointer and array-bounds checks.
//!
//! An instruction guarded by an IT block still consumes its full encoding
//! (both halfwords of a 32-bit form) when the condition fails; only its
//! register and memory effects are suppressed.

use crate::alu;
use crate::config::{Features, Version};
use crate::cop;
use crate::cpu::{reg::*, Cpu};
use crate::exc::{Exception, ExecResult};
use crate::exec::a32;
use crate::psr::{JT_THUMB, JT_THUMBEE};

impl Cpu {
    pub(crate) fn t32_in_it_block(&self) -> bool {
        self.pstate.it & 0xF != 0
    }

    pub(crate) fn t32_last_in_it_block(&self) -> bool {
        self.pstate.it & 0xF == 0x8
    }

    /// Shift the IT state by one instruction; the low nibble reaching 0x8
    /// or 0x0 terminates the block.
    pub(crate) fn t32_advance_it(&mut self) {
        if !self.t32_in_it_block() {
            return;
        }
        let it = self.pstate.it;
        self.pstate.it = if it & 0x07 == 0 {
            0
        } else {
            (it & 0xE0) | ((it << 1) & 0x1F)
        };
    }

    /// Effective condition of the current instruction inside an IT block.
    pub(crate) fn t32_check_condition(&self) -> bool {
        if !self.t32_in_it_block() {
            return true;
        }
        let it = self.pstate.it;
        let mut condition = a32::check_condition(&self.pstate, ((it & 0xE0) >> 4) as u32);
        if it & 0x10 != 0 {
            condition = !condition;
        }
        condition
    }
}

/// ThumbEE null-pointer check on a load/store base; a zero base branches to
/// the handler table. A no-op in every other state.
pub(crate) fn e32_check_nullptr(cpu: &Cpu, address: u32) -> ExecResult {
    if cpu.config.version == Version::V7 && cpu.pstate.jt == JT_THUMBEE && address == 0 {
        return Err(Exception::ThumbEeNullptr);
    }
    Ok(())
}

fn is_wide(halfword: u16) -> bool {
    halfword >> 11 >= 0b11101
}

pub(crate) fn step(cpu: &mut Cpu) -> ExecResult {
    let hw1 = cpu.t32_fetch16()?;
    let result = if is_wide(hw1) {
        let hw2 = cpu.t32_fetch16()?;
        if cpu.t32_check_condition() {
            exec32(cpu, hw1, hw2)
        } else {
            Ok(())
        }
    } else if cpu.t32_check_condition() {
        exec16(cpu, hw1)
    } else {
        Ok(())
    };
    result?;
    cpu.t32_advance_it();
    Ok(())
}

fn set_flags_out_of_it(cpu: &Cpu) -> bool {
    !cpu.t32_in_it_block()
}

fn reg3(hw: u16, shift: u32) -> usize {
    ((hw >> shift) & 7) as usize
}

fn exec16(cpu: &mut Cpu, hw: u16) -> ExecResult {
    match hw >> 12 {
        0b0000 | 0b0001 => exec16_shift_addsub(cpu, hw),
        0b0010 | 0b0011 => exec16_imm8(cpu, hw),
        0b0100 => match (hw >> 10) & 3 {
            0b00 => exec16_dp(cpu, hw),
            0b01 => exec16_special(cpu, hw),
            _ => {
                // ldr literal
                let rd = reg3(hw, 8);
                let offset = ((hw & 0xFF) as u32) << 2;
                let base = (cpu.a32_reg(A32_PC_NUM) & !3).wrapping_add(offset);
                e32_check_nullptr(cpu, base)?;
                let value = cpu.a32_read32(base, false)?;
                cpu.a32_set_reg(rd, value);
                Ok(())
            }
        },
        0b0101 => exec16_load_store_reg(cpu, hw),
        0b0110 | 0b0111 | 0b1000 | 0b1001 => exec16_load_store_imm(cpu, hw),
        0b1010 => {
            // adr / add from sp
            let rd = reg3(hw, 8);
            let offset = ((hw & 0xFF) as u32) << 2;
            let base = if hw & 0x0800 != 0 {
                cpu.a32_reg(A32_SP)
            } else {
                cpu.a32_reg(A32_PC_NUM) & !3
            };
            cpu.a32_set_reg(rd, base.wrapping_add(offset));
            Ok(())
        }
        0b1011 => exec16_misc(cpu, hw),
        0b1100 => {
            // ldm/stm (ThumbEE replaces this space with its checks)
            if cpu.is_thumbee() {
                return exec16_thumbee_c(cpu, hw);
            }
            let base = reg3(hw, 8);
            let list = (hw & 0xFF) as u16;
            if hw & 0x0800 != 0 {
                // base register writeback unless reloaded
                a32::a32_ldm(cpu, list, base, true, false, list & (1 << base) == 0, false)
            } else {
                a32::a32_stm(cpu, list, base, true, false, true, false)
            }
        }
        0b1101 => {
            let cond = (hw >> 8) & 0xF;
            match cond {
                0xF => Err(Exception::Svc),
                0xE => Err(Exception::Undefined), // permanently undefined
                _ => {
                    if a32::check_condition(&cpu.pstate, cond as u32) {
                        let offset = alu::sign_extend32(8, (hw & 0xFF) as u32) << 1;
                        let target = cpu.a32_reg(A32_PC_NUM).wrapping_add(offset);
                        cpu.a32_set_reg(A32_PC_NUM, target);
                    }
                    Ok(())
                }
            }
        }
        _ => {
            // 0b11100: unconditional branch
            let offset = alu::sign_extend32(11, (hw & 0x7FF) as u32) << 1;
            let target = cpu.a32_reg(A32_PC_NUM).wrapping_add(offset);
            cpu.a32_set_reg(A32_PC_NUM, target);
            Ok(())
        }
    }
}

fn exec16_shift_addsub(cpu: &mut Cpu, hw: u16) -> ExecResult {
    let set_flags = set_flags_out_of_it(cpu);
    let rd = reg3(hw, 0);
    let rm = reg3(hw, 3);
    match (hw >> 11) & 3 {
        0b11 => {
            // add/sub register or 3-bit immediate
            let op1 = cpu.a32_reg(rm);
            let op2 = if hw & 0x0400 != 0 {
                ((hw >> 6) & 7) as u32
            } else {
                cpu.a32_reg(reg3(hw, 6))
            };
            let res = if hw & 0x0200 != 0 {
                if set_flags {
                    let res = op1.wrapping_sub(op2);
                    alu::set_nzcv32(&mut cpu.pstate, res, op1, !op2);
                    res
                } else {
                    op1.wrapping_sub(op2)
                }
            } else {
                let res = op1.wrapping_add(op2);
                if set_flags {
                    alu::set_nzcv32(&mut cpu.pstate, res, op1, op2);
                }
                res
            };
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        shift => {
            // lsl/lsr/asr immediate; 32 encoded as 0 for the right shifts
            let amount = ((hw >> 6) & 0x1F) as u32;
            let value = cpu.a32_reg(rm);
            let res = match shift {
                0b00 => alu::lsl32(&mut cpu.pstate, value, amount, set_flags),
                0b01 => alu::lsr32(
                    &mut cpu.pstate,
                    value,
                    if amount == 0 { 32 } else { amount },
                    set_flags,
                ),
                _ => alu::asr32(
                    &mut cpu.pstate,
                    value,
                    if amount == 0 { 32 } else { amount },
                    set_flags,
                ),
            };
            if set_flags {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
    }
}

fn exec16_imm8(cpu: &mut Cpu, hw: u16) -> ExecResult {
    let set_flags = set_flags_out_of_it(cpu);
    let rd = reg3(hw, 8);
    let imm = (hw & 0xFF) as u32;
    match (hw >> 11) & 3 {
        0b00 => {
            if set_flags {
                alu::set_nz32(&mut cpu.pstate, imm);
            }
            cpu.a32_set_reg(rd, imm);
        }
        0b01 => {
            // cmp always sets flags
            let op1 = cpu.a32_reg(rd);
            let res = op1.wrapping_sub(imm);
            alu::set_nzcv32(&mut cpu.pstate, res, op1, !imm);
        }
        0b10 => {
            let op1 = cpu.a32_reg(rd);
            let res = op1.wrapping_add(imm);
            if set_flags {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, imm);
            }
            cpu.a32_set_reg(rd, res);
        }
        _ => {
            let op1 = cpu.a32_reg(rd);
            let res = op1.wrapping_sub(imm);
            if set_flags {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, !imm);
            }
            cpu.a32_set_reg(rd, res);
        }
    }
    Ok(())
}

fn exec16_dp(cpu: &mut Cpu, hw: u16) -> ExecResult {
    let set_flags = set_flags_out_of_it(cpu);
    let rd = reg3(hw, 0);
    let rm = reg3(hw, 3);
    let op1 = cpu.a32_reg(rd);
    let op2 = cpu.a32_reg(rm);

    let mut write = true;
    let res = match (hw >> 6) & 0xF {
        0x0 => op1 & op2,
        0x1 => op1 ^ op2,
        0x2 => {
            let res = alu::lsl32(&mut cpu.pstate, op1, op2 & 0xFF, set_flags);
            res
        }
        0x3 => alu::lsr32(&mut cpu.pstate, op1, op2 & 0xFF, set_flags),
        0x4 => alu::asr32(&mut cpu.pstate, op1, op2 & 0xFF, set_flags),
        0x5 => {
            let res = op1.wrapping_add(op2).wrapping_add(cpu.pstate.c as u32);
            if set_flags {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, op2);
            }
            cpu.a32_set_reg(rd, res);
            return Ok(());
        }
        0x6 => {
            let res = op1
                .wrapping_sub(op2)
                .wrapping_add(cpu.pstate.c as u32)
                .wrapping_sub(1);
            if set_flags {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, !op2);
            }
            cpu.a32_set_reg(rd, res);
            return Ok(());
        }
        0x7 => alu::ror32(&mut cpu.pstate, op1, op2 & 0xFF, set_flags),
        0x8 => {
            write = false;
            op1 & op2 // tst, flags always
        }
        0x9 => {
            // rsb #0 (neg)
            let res = 0u32.wrapping_sub(op2);
            if set_flags {
                alu::set_nzcv32(&mut cpu.pstate, res, 0, !op2);
            }
            cpu.a32_set_reg(rd, res);
            return Ok(());
        }
        0xA => {
            let res = op1.wrapping_sub(op2);
            alu::set_nzcv32(&mut cpu.pstate, res, op1, !op2);
            return Ok(());
        }
        0xB => {
            let res = op1.wrapping_add(op2);
            alu::set_nzcv32(&mut cpu.pstate, res, op1, op2);
            return Ok(());
        }
        0xC => op1 | op2,
        0xD => op1.wrapping_mul(op2),
        0xE => op1 & !op2,
        _ => !op2,
    };

    if set_flags || matches!((hw >> 6) & 0xF, 0x8) {
        alu::set_nz32(&mut cpu.pstate, res);
    }
    if write {
        cpu.a32_set_reg(rd, res);
    }
    Ok(())
}

fn exec16_special(cpu: &mut Cpu, hw: u16) -> ExecResult {
    let rd = (reg3(hw, 0) | ((hw as usize >> 4) & 8)) as usize;
    let rm = ((hw >> 3) & 0xF) as usize;
    match (hw >> 8) & 3 {
        0b00 => {
            // add rd, rm (no flags)
            let res = cpu.a32_reg(rd).wrapping_add(cpu.a32_reg(rm));
            if rd == A32_PC_NUM {
                cpu.a32_set_reg(rd, res & !1);
            } else {
                cpu.a32_set_reg(rd, res);
            }
            Ok(())
        }
        0b01 => {
            let op1 = cpu.a32_reg(rd);
            let op2 = cpu.a32_reg(rm);
            let res = op1.wrapping_sub(op2);
            alu::set_nzcv32(&mut cpu.pstate, res, op1, !op2);
            Ok(())
        }
        0b10 => {
            let value = cpu.a32_reg(rm);
            if rd == A32_PC_NUM {
                cpu.a32_set_reg(rd, value & !1);
            } else {
                cpu.a32_set_reg(rd, value);
            }
            Ok(())
        }
        _ => {
            // bx/blx register
            let target = cpu.a32_reg(rm);
            if hw & 0x0080 != 0 {
                let lr = cpu.r[PC] as u32 | 1;
                cpu.a32_set_reg(A32_LR, lr);
            }
            cpu.a32_set_pc_interworking(target);
            Ok(())
        }
    }
}

fn exec16_load_store_reg(cpu: &mut Cpu, hw: u16) -> ExecResult {
    let rd = reg3(hw, 0);
    let rn = reg3(hw, 3);
    let offset = cpu.a32_reg(reg3(hw, 6));
    match (hw >> 9) & 7 {
        0b000 => {
            let value = cpu.a32_reg(rd);
            a32::a32_str(cpu, value, rn, offset, true, false, false)
        }
        0b001 => {
            let value = cpu.a32_reg(rd);
            a32::a32_strh(cpu, value, rn, offset, true, false, false)
        }
        0b010 => {
            let value = cpu.a32_reg(rd);
            a32::a32_strb(cpu, value, rn, offset, true, false, false)
        }
        0b011 => {
            let value = a32::a32_ldrsb(cpu, rn, offset, true, false, false)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        0b100 => {
            let value = a32::a32_ldr(cpu, rn, offset, true, false, false)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        0b101 => {
            let value = a32::a32_ldrh(cpu, rn, offset, true, false, false)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        0b110 => {
            let value = a32::a32_ldrb(cpu, rn, offset, true, false, false)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        _ => {
            let value = a32::a32_ldrsh(cpu, rn, offset, true, false, false)?;
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
    }
}

fn exec16_load_store_imm(cpu: &mut Cpu, hw: u16) -> ExecResult {
    match hw >> 12 {
        0b0110 => {
            // word, imm5 << 2
            let rd = reg3(hw, 0);
            let rn = reg3(hw, 3);
            let offset = (((hw >> 6) & 0x1F) as u32) << 2;
            if hw & 0x0800 != 0 {
                let value = a32::a32_ldr(cpu, rn, offset, true, false, false)?;
                cpu.a32_set_reg(rd, value);
            } else {
                let value = cpu.a32_reg(rd);
                a32::a32_str(cpu, value, rn, offset, true, false, false)?;
            }
            Ok(())
        }
        0b0111 => {
            let rd = reg3(hw, 0);
            let rn = reg3(hw, 3);
            let offset = ((hw >> 6) & 0x1F) as u32;
            if hw & 0x0800 != 0 {
                let value = a32::a32_ldrb(cpu, rn, offset, true, false, false)?;
                cpu.a32_set_reg(rd, value);
            } else {
                let value = cpu.a32_reg(rd);
                a32::a32_strb(cpu, value, rn, offset, true, false, false)?;
            }
            Ok(())
        }
        0b1000 => {
            let rd = reg3(hw, 0);
            let rn = reg3(hw, 3);
            let offset = (((hw >> 6) & 0x1F) as u32) << 1;
            if hw & 0x0800 != 0 {
                let value = a32::a32_ldrh(cpu, rn, offset, true, false, false)?;
                cpu.a32_set_reg(rd, value);
            } else {
                let value = cpu.a32_reg(rd);
                a32::a32_strh(cpu, value, rn, offset, true, false, false)?;
            }
            Ok(())
        }
        _ => {
            // sp relative, imm8 << 2
            let rd = reg3(hw, 8);
            let offset = ((hw & 0xFF) as u32) << 2;
            if hw & 0x0800 != 0 {
                let value = a32::a32_ldr(cpu, A32_SP, offset, true, false, false)?;
                cpu.a32_set_reg(rd, value);
            } else {
                let value = cpu.a32_reg(rd);
                a32::a32_str(cpu, value, A32_SP, offset, true, false, false)?;
            }
            Ok(())
        }
    }
}

fn exec16_misc(cpu: &mut Cpu, hw: u16) -> ExecResult {
    match (hw >> 8) & 0xF {
        0x0 => {
            // add/sub sp, imm7
            let imm = ((hw & 0x7F) as u32) << 2;
            let sp = cpu.a32_reg(A32_SP);
            let res = if hw & 0x0080 != 0 { sp.wrapping_sub(imm) } else { sp.wrapping_add(imm) };
            cpu.a32_set_reg(A32_SP, res);
            Ok(())
        }
        0x1 | 0x3 | 0x9 | 0xB => {
            // cbz/cbnz (v6T2)
            if !cpu.config.features.contains(Features::THUMB2) {
                return Err(Exception::Undefined);
            }
            let rn = reg3(hw, 0);
            let offset = ((((hw >> 9) & 1) << 6 | ((hw >> 3) & 0x1F) << 1) as u32) & 0x7E;
            let nonzero = hw & 0x0800 != 0;
            if (cpu.a32_reg(rn) == 0) != nonzero {
                let target = cpu.a32_reg(A32_PC_NUM).wrapping_add(offset);
                cpu.a32_set_reg(A32_PC_NUM, target);
            }
            Ok(())
        }
        0x2 => {
            // sign/zero extension
            let rd = reg3(hw, 0);
            let rm = reg3(hw, 3);
            let value = cpu.a32_reg(rm);
            let res = match (hw >> 6) & 3 {
                0b00 => alu::sign_extend32(16, value & 0xFFFF),
                0b01 => alu::sign_extend32(8, value & 0xFF),
                0b10 => value & 0xFFFF,
                _ => value & 0xFF,
            };
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0x4 | 0x5 => {
            // push, optionally with lr
            let mut list = (hw & 0xFF) as u16;
            if hw & 0x0100 != 0 {
                list |= 1 << A32_LR;
            }
            a32::a32_stm(cpu, list, A32_SP, false, true, true, false)
        }
        0x6 => {
            match (hw >> 4) & 0xF {
                0x5 => {
                    // setend
                    cpu.pstate.e = hw & 0x0008 != 0;
                    Ok(())
                }
                0x6 | 0x7 => {
                    // cps
                    if cpu.privileged() {
                        let disable = hw & 0x0010 != 0;
                        if hw & 4 != 0 {
                            cpu.pstate.a = disable;
                        }
                        if hw & 2 != 0 {
                            cpu.pstate.i = disable;
                        }
                        if hw & 1 != 0 {
                            cpu.pstate.f = disable;
                        }
                    }
                    Ok(())
                }
                _ => Err(Exception::Undefined),
            }
        }
        0xA => {
            let rd = reg3(hw, 0);
            let rm = reg3(hw, 3);
            let value = cpu.a32_reg(rm);
            let res = match (hw >> 6) & 3 {
                0b00 => value.swap_bytes(),
                0b01 => alu::bswap32_16(value),
                0b11 => alu::sign_extend32(16, (value as u16).swap_bytes() as u32),
                _ => return Err(Exception::Undefined),
            };
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0xC | 0xD => {
            // pop, optionally with pc
            let mut list = (hw & 0xFF) as u16;
            if hw & 0x0100 != 0 {
                list |= 1 << A32_PC_NUM;
            }
            a32::a32_ldm(cpu, list, A32_SP, true, false, true, false)
        }
        0xE => Err(Exception::Breakpoint), // bkpt
        0xF => {
            // it and hints
            let mask = hw & 0xF;
            if mask != 0 {
                // ThumbEE disables the hardware interpretation of IT
                if cpu.is_thumbee() {
                    return Err(Exception::Undefined);
                }
                if !cpu.config.features.contains(Features::THUMB2) {
                    return Err(Exception::Undefined);
                }
                cpu.pstate.it = (hw & 0xFF) as u8;
            }
            Ok(())
        }
        _ => Err(Exception::Undefined),
    }
}

/// The 0b1100 space in ThumbEE: the array-bounds check (the multiple
/// transfers of that space are not available in this state).
fn exec16_thumbee_c(cpu: &mut Cpu, hw: u16) -> ExecResult {
    if hw >> 8 == 0xCA {
        // chka: index in Rm checked against the size in Rn
        let rn = (reg3(hw, 0) | ((hw as usize >> 4) & 8)) as usize;
        let rm = ((hw >> 3) & 0xF) as usize;
        if cpu.a32_reg(rm) >= cpu.a32_reg(rn) {
            return Err(Exception::ThumbEeOutOfBounds);
        }
        return Ok(());
    }
    Err(Exception::Undefined)
}

// ---- 32-bit encodings ----

fn exec32(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let opcode = (hw1 as u32) << 16 | hw2 as u32;
    // op2 is bits 26-20 of the combined word
    let op2 = (hw1 >> 4) & 0x7F;
    match (hw1 >> 11) & 3 {
        0b01 => {
            if op2 & 0x40 != 0 {
                exec32_coproc(cpu, opcode)
            } else if op2 & 0x20 != 0 {
                exec32_dp_shifted(cpu, hw1, hw2)
            } else if op2 & 0x04 != 0 {
                exec32_load_store_dual(cpu, hw1, hw2)
            } else {
                exec32_load_store_multiple(cpu, hw1, hw2)
            }
        }
        0b10 => {
            if hw2 & 0x8000 == 0 {
                if hw1 & 0x0200 == 0 {
                    exec32_dp_modified_imm(cpu, hw1, hw2)
                } else {
                    exec32_dp_plain_imm(cpu, hw1, hw2)
                }
            } else {
                exec32_branch_misc(cpu, hw1, hw2)
            }
        }
        _ => {
            if op2 & 0x40 != 0 {
                exec32_coproc(cpu, opcode)
            } else if op2 & 0x70 == 0x20 {
                exec32_dp_register(cpu, hw1, hw2)
            } else if op2 & 0x78 == 0x30 {
                exec32_multiply(cpu, hw1, hw2)
            } else if op2 & 0x78 == 0x38 {
                exec32_long_multiply(cpu, hw1, hw2)
            } else {
                exec32_load_store_single(cpu, hw1, hw2)
            }
        }
    }
}

fn exec32_coproc(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    // same layout as the ARM coprocessor space
    if opcode & 0x0E00_0000 == 0x0C00_0000 {
        if opcode & 0x0FE0_0000 == 0x0C40_0000 {
            return cop::a32_perform_mcrr(
                cpu,
                opcode,
                ((opcode >> 12) & 0xF) as usize,
                ((opcode >> 16) & 0xF) as usize,
            );
        }
        if opcode & 0x0FE0_0000 == 0x0C50_0000 {
            return cop::a32_perform_mrrc(
                cpu,
                opcode,
                ((opcode >> 12) & 0xF) as usize,
                ((opcode >> 16) & 0xF) as usize,
            );
        }
        let base = ((opcode >> 16) & 0xF) as usize;
        let mut offset = (opcode & 0xFF) << 2;
        if opcode & 0x0080_0000 == 0 {
            offset = offset.wrapping_neg();
        }
        let preindexed = opcode & 0x0100_0000 != 0;
        let wb = opcode & 0x0020_0000 != 0;
        return cop::a32_perform_ldc_stc(cpu, opcode, base, offset, preindexed, wb);
    }
    if opcode & 0x0F00_0010 == 0x0E00_0010 {
        return if opcode & 0x0010_0000 == 0 {
            cop::a32_perform_mcr(cpu, opcode, ((opcode >> 12) & 0xF) as usize)
        } else {
            cop::a32_perform_mrc(cpu, opcode, ((opcode >> 12) & 0xF) as usize)
        };
    }
    if opcode & 0x0F00_0010 == 0x0E00_0000 {
        return cop::a32_perform_cdp(cpu, opcode);
    }
    Err(Exception::Undefined)
}

fn exec32_load_store_multiple(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let base = (hw1 & 0xF) as usize;
    let load = hw1 & 0x0010 != 0;
    let wb = hw1 & 0x0020 != 0;
    let mode = (hw1 >> 7) & 3; // 01 ia, 10 db
    let list = hw2;

    match mode {
        0b01 => {
            if load {
                a32::a32_ldm(cpu, list, base, true, false, wb && list & (1 << base) == 0, false)
            } else {
                a32::a32_stm(cpu, list, base, true, false, wb, false)
            }
        }
        0b10 => {
            if load {
                a32::a32_ldm(cpu, list, base, false, true, wb && list & (1 << base) == 0, false)
            } else {
                a32::a32_stm(cpu, list, base, false, true, wb, false)
            }
        }
        0b00 => {
            // srs/rfe (db form)
            if load {
                a32::a32_rfe(cpu, base, false, true, wb)
            } else {
                a32::a32_srs(cpu, (hw2 & 0xF) as u8, false, true, wb)
            }
        }
        _ => {
            // srs/rfe (ia form)
            if load {
                a32::a32_rfe(cpu, base, true, false, wb)
            } else {
                a32::a32_srs(cpu, (hw2 & 0xF) as u8, true, false, wb)
            }
        }
    }
}

fn exec32_load_store_dual(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let p = hw1 & 0x0100 != 0;
    let u = hw1 & 0x0080 != 0;
    let w = hw1 & 0x0020 != 0;
    let load = hw1 & 0x0010 != 0;
    let rn = (hw1 & 0xF) as usize;
    let rt = ((hw2 >> 12) & 0xF) as usize;
    let rt2 = ((hw2 >> 8) & 0xF) as usize;

    if !p && !w {
        // exclusive accesses and table branches
        match (hw1 >> 4) & 0xF {
            0x4 => {
                // strex
                let value = cpu.a32_reg(rt);
                let res = a32::a32_strex(cpu, value, rn, ((hw2 & 0xFF) as u32) << 2, 4)?;
                cpu.a32_set_reg(rt2, res);
                return Ok(());
            }
            0x5 => {
                let res = a32::a32_ldrex(cpu, rn, ((hw2 & 0xFF) as u32) << 2, 4)?;
                cpu.a32_set_reg(rt, res);
                return Ok(());
            }
            0xC => match (hw2 >> 4) & 0xF {
                0x4 => {
                    let value = cpu.a32_reg(rt);
                    let res = a32::a32_strex(cpu, value, rn, 0, 1)?;
                    cpu.a32_set_reg((hw2 & 0xF) as usize, res);
                    return Ok(());
                }
                0x5 => {
                    let value = cpu.a32_reg(rt);
                    let res = a32::a32_strex(cpu, value, rn, 0, 2)?;
                    cpu.a32_set_reg((hw2 & 0xF) as usize, res);
                    return Ok(());
                }
                0x7 => {
                    let res = a32::a32_strexd(cpu, rt, rt2, rn)?;
                    cpu.a32_set_reg((hw2 & 0xF) as usize, res);
                    return Ok(());
                }
                _ => return Err(Exception::Undefined),
            },
            0xD => match (hw2 >> 4) & 0xF {
                0x0 | 0x1 => {
                    // tbb/tbh
                    let rm = (hw2 & 0xF) as usize;
                    let base = if rn == A32_PC_NUM { cpu.r[PC] as u32 } else { cpu.a32_reg(rn) };
                    e32_check_nullptr(cpu, base)?;
                    let entry = if hw2 & 0x10 != 0 {
                        let address = base.wrapping_add(cpu.a32_reg(rm) << 1);
                        cpu.a32_read16(address, false)? as u32
                    } else {
                        let address = base.wrapping_add(cpu.a32_reg(rm));
                        cpu.a32_read8(address, false)? as u32
                    };
                    let target = (cpu.r[PC] as u32).wrapping_add(entry << 1);
                    cpu.a32_set_reg(A32_PC_NUM, target | 1);
                    return Ok(());
                }
                0x4 => {
                    let res = a32::a32_ldrex(cpu, rn, 0, 1)?;
                    cpu.a32_set_reg(rt, res);
                    return Ok(());
                }
                0x5 => {
                    let res = a32::a32_ldrex(cpu, rn, 0, 2)?;
                    cpu.a32_set_reg(rt, res);
                    return Ok(());
                }
                0x7 => {
                    return a32::a32_ldrexd(cpu, rt, rt2, rn);
                }
                _ => return Err(Exception::Undefined),
            },
            _ => return Err(Exception::Undefined),
        }
    }

    // ldrd/strd immediate
    let mut offset = ((hw2 & 0xFF) as u32) << 2;
    if !u {
        offset = offset.wrapping_neg();
    }
    let wb = w || !p;
    if load {
        a32::a32_ldrd(cpu, rt, rt2, rn, offset, p, wb)
    } else {
        a32::a32_strd(cpu, rt, rt2, rn, offset, p, wb)
    }
}

/// Thumb-2 modified immediate: 8 bits splatted or rotated by i:imm3:a.
pub fn t32_get_immediate_operand(hw1: u16, hw2: u16) -> u32 {
    let imm = (hw2 & 0xFF) as u32;
    let shift = ((hw2 >> 12) & 0x7) as u32 | (((hw1 >> 10) & 1) as u32) << 3;
    match shift {
        0 => imm,
        1 => imm << 16 | imm,
        2 => imm << 24 | imm << 8,
        3 => imm << 24 | imm << 16 | imm << 8 | imm,
        _ => {
            let shift = (shift << 1) | (imm >> 7);
            (0x80 | (imm & 0x7F)) << (32 - shift)
        }
    }
}

/// Carry-out of the modified immediate, for the logical operations.
fn t32_immediate_carry(hw1: u16, hw2: u16, carry_in: bool) -> bool {
    let shift = ((hw2 >> 12) & 0x7) as u32 | (((hw1 >> 10) & 1) as u32) << 3;
    if shift < 4 {
        carry_in
    } else {
        t32_get_immediate_operand(hw1, hw2) >> 31 != 0
    }
}

fn exec32_dp_modified_imm(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let op = ((hw1 >> 5) & 0xF) as u32;
    let s = hw1 & 0x0010 != 0;
    let rn = (hw1 & 0xF) as usize;
    let rd = ((hw2 >> 8) & 0xF) as usize;
    let imm = t32_get_immediate_operand(hw1, hw2);

    let logical = matches!(op, 0x0 | 0x1 | 0x2 | 0x3 | 0x4 | 0x6);
    if s && logical {
        cpu.pstate.c = t32_immediate_carry(hw1, hw2, cpu.pstate.c);
    }
    dp32(cpu, op, s, rn, rd, imm)
}

/// The 16 Thumb-2 data-processing operations, shared between the immediate
/// and shifted-register forms. Register numbering is flat (no PC quirks;
/// r15 as Rn encodes the move/test forms).
fn dp32(cpu: &mut Cpu, op: u32, s: bool, rn: usize, rd: usize, op2: u32) -> ExecResult {
    let op1 = if rn == 0xF { 0 } else { cpu.a32_reg(rn) };
    let discard = rd == 0xF;

    match op {
        0x0 => {
            // and / tst
            let res = op1 & op2;
            if s {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            if !discard {
                cpu.a32_set_reg(rd, res);
            }
        }
        0x1 => {
            let res = op1 & !op2; // bic
            if s {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            cpu.a32_set_reg(rd, res);
        }
        0x2 => {
            // orr / mov
            let res = op1 | op2;
            if s {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            cpu.a32_set_reg(rd, res);
        }
        0x3 => {
            // orn / mvn
            let res = if rn == 0xF { !op2 } else { op1 | !op2 };
            if s {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            cpu.a32_set_reg(rd, res);
        }
        0x4 => {
            // eor / teq
            let res = op1 ^ op2;
            if s {
                alu::set_nz32(&mut cpu.pstate, res);
            }
            if !discard {
                cpu.a32_set_reg(rd, res);
            }
        }
        0x8 => {
            // add / cmn
            let res = op1.wrapping_add(op2);
            if s {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, op2);
            }
            if !discard {
                cpu.a32_set_reg(rd, res);
            }
        }
        0xA => {
            let res = op1.wrapping_add(op2).wrapping_add(cpu.pstate.c as u32); // adc
            if s {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, op2);
            }
            cpu.a32_set_reg(rd, res);
        }
        0xB => {
            let res = op1
                .wrapping_sub(op2)
                .wrapping_add(cpu.pstate.c as u32)
                .wrapping_sub(1); // sbc
            if s {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, !op2);
            }
            cpu.a32_set_reg(rd, res);
        }
        0xD => {
            // sub / cmp
            let res = op1.wrapping_sub(op2);
            if s {
                alu::set_nzcv32(&mut cpu.pstate, res, op1, !op2);
            }
            if !discard {
                cpu.a32_set_reg(rd, res);
            }
        }
        0xE => {
            let res = op2.wrapping_sub(op1); // rsb
            if s {
                alu::set_nzcv32(&mut cpu.pstate, res, op2, !op1);
            }
            cpu.a32_set_reg(rd, res);
        }
        _ => return Err(Exception::Undefined),
    }
    Ok(())
}

fn exec32_dp_plain_imm(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let op = ((hw1 >> 4) & 0x1F) as u32;
    let rn = (hw1 & 0xF) as usize;
    let rd = ((hw2 >> 8) & 0xF) as usize;
    let imm12 = (hw1 as u32 & 0x0400) << 1 | (hw2 as u32 & 0x7000) >> 4 | hw2 as u32 & 0xFF;

    match op {
        0x00 => {
            // addw
            let res = cpu.a32_reg(rn).wrapping_add(imm12);
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0x04 => {
            // movw
            let imm16 = ((hw1 as u32 & 0xF) << 12)
                | ((hw1 as u32 & 0x0400) << 1)
                | ((hw2 as u32 & 0x7000) >> 4)
                | (hw2 as u32 & 0xFF);
            cpu.a32_set_reg(rd, imm16);
            Ok(())
        }
        0x0A => {
            // subw
            let res = cpu.a32_reg(rn).wrapping_sub(imm12);
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0x0C => {
            // movt
            let imm16 = ((hw1 as u32 & 0xF) << 12)
                | ((hw1 as u32 & 0x0400) << 1)
                | ((hw2 as u32 & 0x7000) >> 4)
                | (hw2 as u32 & 0xFF);
            let low = cpu.a32_reg(rd) & 0xFFFF;
            cpu.a32_set_reg(rd, imm16 << 16 | low);
            Ok(())
        }
        0x10 | 0x12 => {
            // ssat
            let sat_to = ((hw2 & 0x1F) as u32) + 1;
            let amount = (((hw2 >> 12) & 7) << 2 | (hw2 >> 6) & 3) as u32;
            let shift_type = ((hw1 >> 4) & 2) as u32;
            let amount = if shift_type == 2 && amount == 0 { 31 } else { amount };
            let shifted = alu::shifted32(cpu.a32_reg(rn), shift_type, amount);
            let (res, saturated) = alu::ssat(shifted as i32, sat_to);
            if saturated {
                cpu.pstate.q = true;
            }
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0x14 => {
            // sbfx
            let lsb = ((hw2 >> 12) & 7) << 2 | (hw2 >> 6) & 3;
            let widthm1 = hw2 & 0x1F;
            let value = cpu.a32_reg(rn);
            cpu.a32_set_reg(rd, alu::sbfm32(value, lsb as u32, (lsb + widthm1) as u32));
            Ok(())
        }
        0x16 => {
            // bfi/bfc
            let lsb = ((hw2 >> 12) & 7) << 2 | (hw2 >> 6) & 3;
            let msb = hw2 & 0x1F;
            let base = cpu.a32_reg(rd);
            let res = if rn == 0xF {
                alu::bfc32(base, lsb as u32, msb as u32)
            } else {
                alu::bfi32(base, cpu.a32_reg(rn), lsb as u32, msb as u32)
            };
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0x18 | 0x1A => {
            // usat
            let sat_to = (hw2 & 0x1F) as u32;
            let amount = (((hw2 >> 12) & 7) << 2 | (hw2 >> 6) & 3) as u32;
            let shift_type = ((hw1 >> 4) & 2) as u32;
            let amount = if shift_type == 2 && amount == 0 { 31 } else { amount };
            let shifted = alu::shifted32(cpu.a32_reg(rn), shift_type, amount);
            let (res, saturated) = alu::usat(shifted as i32, sat_to);
            if saturated {
                cpu.pstate.q = true;
            }
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        0x1C => {
            // ubfx
            let lsb = ((hw2 >> 12) & 7) << 2 | (hw2 >> 6) & 3;
            let widthm1 = hw2 & 0x1F;
            let value = cpu.a32_reg(rn);
            cpu.a32_set_reg(rd, alu::ubfm32(value, lsb as u32, (lsb + widthm1) as u32));
            Ok(())
        }
        _ => Err(Exception::Undefined),
    }
}

fn exec32_dp_shifted(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let op = ((hw1 >> 5) & 0xF) as u32;
    let s = hw1 & 0x0010 != 0;
    let rn = (hw1 & 0xF) as usize;
    let rd = ((hw2 >> 8) & 0xF) as usize;

    let logical = matches!(op, 0x0 | 0x1 | 0x2 | 0x3 | 0x4 | 0x6);
    let operand2 = t32_get_register_operand(cpu, hw2, s && logical);

    // mov with a shifter is the shift instruction itself
    dp32(cpu, op, s, rn, rd, operand2)
}

/// Shifted register operand of the Thumb-2 three-register forms.
fn t32_get_register_operand(cpu: &mut Cpu, hw2: u16, store_carry: bool) -> u32 {
    let value = cpu.a32_reg((hw2 & 0xF) as usize);
    if hw2 & 0x70F0 == 0 {
        return value;
    }
    if hw2 & 0x70F0 == 0x0030 {
        return alu::rrx32(&mut cpu.pstate, value, store_carry);
    }
    let amount = (((hw2 & 0x7000) >> 10) | ((hw2 & 0x00C0) >> 6)) as u32;
    // 32 is encoded as 0, except for lsl
    let amount = ((amount.wrapping_sub(1)) & 0x1F) + 1;
    match (hw2 >> 4) & 3 {
        0b00 => alu::lsl32(&mut cpu.pstate, value, amount, store_carry),
        0b01 => alu::lsr32(&mut cpu.pstate, value, amount, store_carry),
        0b10 => alu::asr32(&mut cpu.pstate, value, amount, store_carry),
        _ => alu::ror32(&mut cpu.pstate, value, amount, store_carry),
    }
}

fn exec32_branch_misc(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    // bl/blx have bit 14 set; plain branches clear
    if hw2 & 0x5000 != 0 {
        let s = ((hw1 >> 10) & 1) as u32;
        let j1 = ((hw2 >> 13) & 1) as u32;
        let j2 = ((hw2 >> 11) & 1) as u32;
        let i1 = !(j1 ^ s) & 1;
        let i2 = !(j2 ^ s) & 1;
        let offset = alu::sign_extend32(
            25,
            s << 24 | i1 << 23 | i2 << 22 | ((hw1 as u32 & 0x3FF) << 12) | ((hw2 as u32 & 0x7FF) << 1),
        );
        let lr = cpu.r[PC] as u32 | 1;
        let target = (cpu.r[PC] as u32).wrapping_add(offset);
        if hw2 & 0x1000 != 0 {
            // bl
            cpu.a32_set_reg(A32_LR, lr);
            cpu.a32_set_reg(A32_PC_NUM, target);
        } else {
            // blx: switch to ARM
            if cpu.is_thumbee() {
                return Err(Exception::Undefined);
            }
            cpu.a32_set_reg(A32_LR, lr);
            cpu.pstate.jt = crate::psr::JT_ARM;
            let target = ((cpu.r[PC] as u32) & !3).wrapping_add(offset);
            cpu.a32_set_pc(target);
        }
        return Ok(());
    }

    if hw2 & 0x1000 != 0 {
        // b.w unconditional
        let s = ((hw1 >> 10) & 1) as u32;
        let j1 = ((hw2 >> 13) & 1) as u32;
        let j2 = ((hw2 >> 11) & 1) as u32;
        let i1 = !(j1 ^ s) & 1;
        let i2 = !(j2 ^ s) & 1;
        let offset = alu::sign_extend32(
            25,
            s << 24 | i1 << 23 | i2 << 22 | ((hw1 as u32 & 0x3FF) << 12) | ((hw2 as u32 & 0x7FF) << 1),
        );
        let target = (cpu.r[PC] as u32).wrapping_add(offset);
        cpu.a32_set_reg(A32_PC_NUM, target);
        return Ok(());
    }

    let op = (hw1 >> 4) & 0x7F;
    match op {
        0x38 | 0x39 => {
            // msr
            let value = cpu.a32_reg((hw1 & 0xF) as usize);
            let mask = ((hw2 >> 8) & 0xF) as u32;
            let mut psr_mask = 0u32;
            if mask & 8 != 0 {
                psr_mask |= 0xFF00_0000;
            }
            if mask & 4 != 0 {
                psr_mask |= 0x00FF_0000;
            }
            if mask & 2 != 0 {
                psr_mask |= 0x0000_FF00;
            }
            if mask & 1 != 0 {
                psr_mask |= 0x0000_00FF;
            }
            if hw1 & 0x0010 != 0 {
                cpu.set_spsr(psr_mask, value);
            } else {
                if !cpu.privileged() {
                    psr_mask &= 0xFF00_0000;
                }
                cpu.set_cpsr(psr_mask, value);
            }
            Ok(())
        }
        0x3A => Ok(()), // cps and hints
        0x3B => {
            // misc control: enterx/leavex, barriers
            match (hw2 >> 4) & 0xF {
                0x0 => {
                    // leavex
                    if cpu.pstate.jt == JT_THUMBEE {
                        cpu.pstate.jt = JT_THUMB;
                    }
                    Ok(())
                }
                0x2 | 0x4 | 0x5 | 0x6 => Ok(()), // clrex and barriers
                0x1 => {
                    // enterx
                    if cpu.is_supported_isa(crate::config::Isa::ThumbEe) {
                        cpu.pstate.jt = JT_THUMBEE;
                    }
                    Ok(())
                }
                _ => Err(Exception::Undefined),
            }
        }
        0x3C => {
            // bxj
            if !cpu.config.features.contains(Features::JAZELLE) {
                return Err(Exception::Undefined);
            }
            Ok(())
        }
        0x3E | 0x3F => {
            // mrs
            let rd = ((hw2 >> 8) & 0xF) as usize;
            let value = if hw1 & 0x0010 != 0 { cpu.spsr() } else { cpu.cpsr() };
            cpu.a32_set_reg(rd, value);
            Ok(())
        }
        0x7F => {
            if hw2 & 0x2000 != 0 {
                return Err(Exception::Undefined); // udf.w
            }
            Err(Exception::Smc)
        }
        _ => {
            // conditional branch, 20-bit offset
            let cond = ((hw1 >> 6) & 0xF) as u32;
            if a32::check_condition(&cpu.pstate, cond) {
                let s = ((hw1 >> 10) & 1) as u32;
                let j1 = ((hw2 >> 13) & 1) as u32;
                let j2 = ((hw2 >> 11) & 1) as u32;
                let offset = alu::sign_extend32(
                    21,
                    s << 20
                        | j2 << 19
                        | j1 << 18
                        | ((hw1 as u32 & 0x3F) << 12)
                        | ((hw2 as u32 & 0x7FF) << 1),
                );
                let target = (cpu.r[PC] as u32).wrapping_add(offset);
                cpu.a32_set_reg(A32_PC_NUM, target);
            }
            Ok(())
        }
    }
}

fn exec32_load_store_single(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let size = (hw1 >> 5) & 3; // 00 byte, 01 half, 10 word
    let signed = hw1 & 0x0100 != 0;
    let load = hw1 & 0x0010 != 0;
    let rn = (hw1 & 0xF) as usize;
    let rt = ((hw2 >> 12) & 0xF) as usize;

    if rn == 0xF {
        // literal: pc-relative with U bit
        let up = hw1 & 0x0080 != 0;
        let offset = (hw2 & 0xFFF) as u32;
        let base = (cpu.r[PC] as u32) & !3;
        let address = if up { base.wrapping_add(offset) } else { base.wrapping_sub(offset) };
        if !load {
            return Err(Exception::Undefined);
        }
        let value = match size {
            0 => {
                let v = cpu.a32_read8(address, false)? as u32;
                if signed { alu::sign_extend32(8, v) } else { v }
            }
            1 => {
                let v = cpu.a32_read16(address, false)? as u32;
                if signed { alu::sign_extend32(16, v) } else { v }
            }
            _ => cpu.a32_read32(address, false)?,
        };
        if size == 2 && rt == A32_PC_NUM {
            cpu.a32_set_reg_interworking_v5(rt, value);
        } else {
            cpu.a32_set_reg(rt, value);
        }
        return Ok(());
    }

    // addressing forms
    let (offset, preindexed, wb, usermode) = if hw1 & 0x0080 != 0 {
        // imm12, positive offset
        ((hw2 & 0xFFF) as u32, true, false, false)
    } else if hw2 & 0x0800 != 0 {
        // imm8 with P/U/W in hw2 bits 10-8
        let p = hw2 & 0x0400 != 0;
        let u = hw2 & 0x0200 != 0;
        let w = hw2 & 0x0100 != 0;
        let usermode = hw2 & 0x0F00 == 0x0E00; // ldrt/strt class
        let mut offset = (hw2 & 0xFF) as u32;
        if !u {
            offset = offset.wrapping_neg();
        }
        (offset, p, w && !usermode, usermode)
    } else {
        // register with a 2-bit shift
        let rm = (hw2 & 0xF) as usize;
        let shift = ((hw2 >> 4) & 3) as u32;
        (cpu.a32_reg(rm) << shift, true, false, false)
    };

    match (load, size) {
        (true, 0) => {
            let value = if signed {
                a32::a32_ldrsb(cpu, rn, offset, preindexed, wb, usermode)?
            } else {
                a32::a32_ldrb(cpu, rn, offset, preindexed, wb, usermode)?
            };
            cpu.a32_set_reg(rt, value);
        }
        (true, 1) => {
            let value = if signed {
                a32::a32_ldrsh(cpu, rn, offset, preindexed, wb, usermode)?
            } else {
                a32::a32_ldrh(cpu, rn, offset, preindexed, wb, usermode)?
            };
            cpu.a32_set_reg(rt, value);
        }
        (true, _) => {
            let value = a32::a32_ldr(cpu, rn, offset, preindexed, wb, usermode)?;
            cpu.a32_set_reg_interworking_v5(rt, value);
        }
        (false, 0) => {
            let value = cpu.a32_reg(rt);
            a32::a32_strb(cpu, value, rn, offset, preindexed, wb, usermode)?;
        }
        (false, 1) => {
            let value = cpu.a32_reg(rt);
            a32::a32_strh(cpu, value, rn, offset, preindexed, wb, usermode)?;
        }
        (false, _) => {
            let value = cpu.a32_reg(rt);
            a32::a32_str(cpu, value, rn, offset, preindexed, wb, usermode)?;
        }
    }
    Ok(())
}

fn exec32_dp_register(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let rn = (hw1 & 0xF) as usize;
    let rd = ((hw2 >> 8) & 0xF) as usize;
    let rm = (hw2 & 0xF) as usize;
    let op = (hw1 >> 4) & 0xF;

    if hw2 & 0xF000 == 0xF000 && hw2 & 0x00F0 == 0 {
        // variable shifts: lsl/lsr/asr/ror rd, rn, rm
        let s = hw1 & 0x0010 != 0;
        let value = cpu.a32_reg(rn);
        let amount = cpu.a32_reg(rm) & 0xFF;
        let res = match (hw1 >> 5) & 3 {
            0b00 => alu::lsl32(&mut cpu.pstate, value, amount, s),
            0b01 => alu::lsr32(&mut cpu.pstate, value, amount, s),
            0b10 => alu::asr32(&mut cpu.pstate, value, amount, s),
            _ => alu::ror32(&mut cpu.pstate, value, amount, s),
        };
        if s {
            alu::set_nz32(&mut cpu.pstate, res);
        }
        cpu.a32_set_reg(rd, res);
        return Ok(());
    }

    if op & 0x8 == 0 && hw2 & 0x0080 != 0 {
        // extension: sxth/uxth/sxtb/uxtb with rotation, optionally add
        let rotate = (((hw2 >> 4) & 3) as u32) * 8;
        let value = cpu.a32_reg(rm).rotate_right(rotate);
        let extended = match op {
            0x0 => alu::sign_extend32(16, value & 0xFFFF),
            0x1 => value & 0xFFFF,
            0x4 => alu::sign_extend32(8, value & 0xFF),
            0x5 => value & 0xFF,
            _ => return Err(Exception::Undefined),
        };
        let res = if rn == 0xF { extended } else { cpu.a32_reg(rn).wrapping_add(extended) };
        cpu.a32_set_reg(rd, res);
        return Ok(());
    }

    if op & 0x8 != 0 && hw2 & 0x00C0 == 0x0080 {
        // miscellaneous: rev/rev16/rbit/revsh/clz/sel
        let value = cpu.a32_reg(rm);
        let res = match ((hw1 >> 4) & 3, (hw2 >> 4) & 3) {
            (1, 0) => value.swap_bytes(),
            (1, 1) => alu::bswap32_16(value),
            (1, 2) => value.reverse_bits(),
            (1, 3) => alu::sign_extend32(16, (value as u16).swap_bytes() as u32),
            (3, 0) => value.leading_zeros(),
            _ => return Err(Exception::Undefined),
        };
        cpu.a32_set_reg(rd, res);
        return Ok(());
    }

    Err(Exception::Undefined)
}

fn exec32_multiply(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let rn = (hw1 & 0xF) as usize;
    let ra = ((hw2 >> 12) & 0xF) as usize;
    let rd = ((hw2 >> 8) & 0xF) as usize;
    let rm = (hw2 & 0xF) as usize;

    match ((hw1 >> 4) & 7, (hw2 >> 4) & 3) {
        (0, 0) => {
            if ra == 0xF {
                // mul
                let res = cpu.a32_reg(rn).wrapping_mul(cpu.a32_reg(rm));
                cpu.a32_set_reg(rd, res);
            } else {
                let res = cpu
                    .a32_reg(rn)
                    .wrapping_mul(cpu.a32_reg(rm))
                    .wrapping_add(cpu.a32_reg(ra));
                cpu.a32_set_reg(rd, res);
            }
            Ok(())
        }
        (0, 1) => {
            // mls
            let res = cpu
                .a32_reg(ra)
                .wrapping_sub(cpu.a32_reg(rn).wrapping_mul(cpu.a32_reg(rm)));
            cpu.a32_set_reg(rd, res);
            Ok(())
        }
        _ => Err(Exception::Undefined),
    }
}

fn exec32_long_multiply(cpu: &mut Cpu, hw1: u16, hw2: u16) -> ExecResult {
    let rn = (hw1 & 0xF) as usize;
    let rdlo = ((hw2 >> 12) & 0xF) as usize;
    let rdhi = ((hw2 >> 8) & 0xF) as usize;
    let rm = (hw2 & 0xF) as usize;

    match ((hw1 >> 4) & 7, (hw2 >> 4) & 0xF) {
        (0, 0) => {
            // smull
            let res = (cpu.a32_reg(rn) as i32 as i64).wrapping_mul(cpu.a32_reg(rm) as i32 as i64)
                as u64;
            cpu.a32_set_reg(rdlo, res as u32);
            cpu.a32_set_reg(rdhi, (res >> 32) as u32);
            Ok(())
        }
        (1, 0xF) => {
            // sdiv
            let num = cpu.a32_reg(rn) as i32;
            let den = cpu.a32_reg(rm) as i32;
            let res = if den == 0 { 0 } else { num.wrapping_div(den) as u32 };
            cpu.a32_set_reg(rdhi, res);
            Ok(())
        }
        (2, 0) => {
            // umull
            let res = cpu.a32_reg(rn) as u64 * cpu.a32_reg(rm) as u64;
            cpu.a32_set_reg(rdlo, res as u32);
            cpu.a32_set_reg(rdhi, (res >> 32) as u32);
            Ok(())
        }
        (3, 0xF) => {
            // udiv
            let num = cpu.a32_reg(rn);
            let den = cpu.a32_reg(rm);
            cpu.a32_set_reg(rdhi, if den == 0 { 0 } else { num / den });
            Ok(())
        }
        (4, 0) => {
            // smlal
            let acc = cpu.a32_reg(rdlo) as u64 | (cpu.a32_reg(rdhi) as u64) << 32;
            let res = (acc as i64)
                .wrapping_add((cpu.a32_reg(rn) as i32 as i64).wrapping_mul(cpu.a32_reg(rm) as i32 as i64))
                as u64;
            cpu.a32_set_reg(rdlo, res as u32);
            cpu.a32_set_reg(rdhi, (res >> 32) as u32);
            Ok(())
        }
        (6, 0) => {
            // umlal
            let acc = cpu.a32_reg(rdlo) as u64 | (cpu.a32_reg(rdhi) as u64) << 32;
            let res = acc.wrapping_add(cpu.a32_reg(rn) as u64 * cpu.a32_reg(rm) as u64);
            cpu.a32_set_reg(rdlo, res as u32);
            cpu.a32_set_reg(rdhi, (res >> 32) as u32);
            Ok(())
        }
        _ => Err(Exception::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, Configuration, Isa, IsaSet};
    use crate::exc::EmuResult;
    use crate::testutil::TestRam;

    fn thumb_cpu(halfwords: &[u16]) -> Cpu {
        let config = Configuration {
            version: Version::V7,
            features: default_features(Version::V7),
            ..Configuration::default()
        };
        let mut ram = TestRam::new(0x1_0000);
        for (i, hw) in halfwords.iter().enumerate() {
            ram.0[i * 2..i * 2 + 2].copy_from_slice(&hw.to_le_bytes());
        }
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB | IsaSet::THUMBEE,
            Box::new(ram),
        );
        cpu.set_isa(Isa::Thumb);
        cpu.capture_breaks = true;
        cpu
    }

    #[test]
    fn test_mov_and_add_imm8() {
        // movs r0, #5; adds r0, #7
        let mut cpu = thumb_cpu(&[0x2005, 0x3007]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 12);
    }

    #[test]
    fn test_it_block_itte() {
        // cmp r0, #0; itte eq; moveq r1, #1; moveq r2, #2; movne r3, #3
        let program = [0x2800, 0xBF06, 0x2101, 0x2202, 0x2303];
        // taken path: r0 = 0
        let mut cpu = thumb_cpu(&program);
        for _ in 0..5 {
            cpu.step();
        }
        assert_eq!(cpu.a32_reg(1), 1);
        assert_eq!(cpu.a32_reg(2), 2);
        assert_eq!(cpu.a32_reg(3), 0);
        assert_eq!(cpu.pstate.it, 0);

        // not-taken path: r0 = 1
        let mut cpu = thumb_cpu(&program);
        cpu.a32_set_reg(0, 1);
        for _ in 0..5 {
            cpu.step();
        }
        assert_eq!(cpu.a32_reg(1), 0);
        assert_eq!(cpu.a32_reg(2), 0);
        assert_eq!(cpu.a32_reg(3), 3);
        assert_eq!(cpu.pstate.it, 0);
    }

    #[test]
    fn test_it_state_advances_on_untaken() {
        // movs r0, #1 (NE); it eq; moveq r1, #7; movs r4, #9
        let mut cpu = thumb_cpu(&[0x2001, 0xBF08, 0x2107, 0x2409]);
        cpu.step();
        cpu.step();
        assert!(cpu.t32_in_it_block());
        cpu.step(); // skipped, but PC advanced and IT state shifted
        assert!(!cpu.t32_in_it_block());
        assert_eq!(cpu.a32_reg(1), 0);
        cpu.step();
        assert_eq!(cpu.a32_reg(4), 9);
    }

    #[test]
    fn test_flags_suppressed_inside_it() {
        // movs r0, #0 (sets Z); it eq; addeq r0, #1 (no flag update); beq +2
        let mut cpu = thumb_cpu(&[0x2000, 0xBF08, 0x3001]);
        cpu.step();
        assert!(cpu.pstate.z);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 1);
        // Z unchanged even though the result was nonzero
        assert!(cpu.pstate.z);
    }

    #[test]
    fn test_16bit_load_store() {
        // movs r0, #0x80; movs r1, #42; str r1, [r0]; ldr r2, [r0]
        let mut cpu = thumb_cpu(&[0x2080, 0x212A, 0x6001, 0x6802]);
        for _ in 0..4 {
            cpu.step();
        }
        assert_eq!(cpu.a32_reg(2), 42);
    }

    #[test]
    fn test_push_pop_round_trip() {
        // mov sp; movs r1, #3; movs r2, #4; push {r1, r2}; pop {r3, r4}
        let mut cpu = thumb_cpu(&[0x2103, 0x2204, 0xB406, 0xBC18]);
        cpu.a32_set_reg(A32_SP, 0x1000);
        for _ in 0..4 {
            cpu.step();
        }
        assert_eq!(cpu.a32_reg(3), 3);
        assert_eq!(cpu.a32_reg(4), 4);
        assert_eq!(cpu.a32_reg(A32_SP), 0x1000);
    }

    #[test]
    fn test_cbz_taken_and_not() {
        // cbz r0, +4
        let mut cpu = thumb_cpu(&[0xB110, 0x2001, 0x2002, 0x2003]);
        cpu.step();
        // r0 == 0: branch to pc+4+offset
        assert_eq!(cpu.r[PC], 0x8);
        let mut cpu = thumb_cpu(&[0xB110, 0x2001]);
        cpu.a32_set_reg(0, 5);
        cpu.step();
        assert_eq!(cpu.r[PC], 0x2);
    }

    #[test]
    fn test_bl_pair() {
        // bl +0x10: f000 f808
        let mut cpu = thumb_cpu(&[0xF000, 0xF808]);
        cpu.step();
        assert_eq!(cpu.r[PC], 0x14);
        assert_eq!(cpu.a32_reg(A32_LR), 0x5); // return address with thumb bit
    }

    #[test]
    fn test_t2_movw_movt() {
        // movw r0, #0x5678: f245 6078 / movt r0, #0x1234: f2c1 2034
        let mut cpu = thumb_cpu(&[0xF245, 0x6078, 0xF2C1, 0x2034]);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0x5678);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0x1234_5678);
    }

    #[test]
    fn test_t2_modified_immediate() {
        // mov.w r0, #0x01010101: f04f 3001
        let mut cpu = thumb_cpu(&[0xF04F, 0x3001]);
        cpu.step();
        assert_eq!(cpu.a32_reg(0), 0x0101_0101);
    }

    #[test]
    fn test_t2_ldr_imm12() {
        // ldr.w r1, [r0, #0x20]: f8d0 1020
        let mut cpu = thumb_cpu(&[0xF8D0, 0x1020]);
        cpu.write32_data(0x120, 0xCAFE);
        cpu.a32_set_reg(0, 0x100);
        cpu.step();
        assert_eq!(cpu.a32_reg(1), 0xCAFE);
    }

    #[test]
    fn test_svc_captured() {
        let mut cpu = thumb_cpu(&[0xDF00]);
        cpu.step();
        assert_eq!(cpu.result, EmuResult::Svc);
    }

    #[test]
    fn test_conditional_branch_16() {
        // movs r0, #0; beq +4
        let mut cpu = thumb_cpu(&[0x2000, 0xD001, 0x2001, 0x2002]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.r[PC], 0x8);
    }

    #[test]
    fn test_thumbee_null_check() {
        // ldr r2, [r0] with r0 = 0 in ThumbEE state
        let mut cpu = thumb_cpu(&[0x6802]);
        cpu.set_isa(Isa::ThumbEe);
        cpu.teehbr = 0x8000;
        cpu.step();
        assert_eq!(cpu.result, EmuResult::ThumbEeNullptr);

        // without capture the trap vectors to the handler base - 4
        let mut cpu = thumb_cpu(&[0x6802]);
        cpu.set_isa(Isa::ThumbEe);
        cpu.capture_breaks = false;
        cpu.teehbr = 0x8000;
        cpu.step();
        assert_eq!(cpu.r[PC], 0x8000 - 4);
    }

    #[test]
    fn test_thumbee_chka() {
        // chka r1, r0: index r0 against size r1
        let mut cpu = thumb_cpu(&[0xCA01]);
        cpu.set_isa(Isa::ThumbEe);
        cpu.teehbr = 0x8000;
        cpu.a32_set_reg(0, 10);
        cpu.a32_set_reg(1, 4); // index 10 >= size 4
        cpu.step();
        assert_eq!(cpu.result, EmuResult::ThumbEeOutOfBounds);
    }

    #[test]
    fn test_exception_zeroes_it_from_thumb() {
        // it eq; svceq #0 after setting Z
        let mut cpu = thumb_cpu(&[0x2800, 0xBF08, 0xDF00]);
        cpu.capture_breaks = false;
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.pstate.it, 0);
        assert_eq!(cpu.pstate.jt, crate::psr::JT_ARM); // vectored to ARM state
    }
}
