//! Jazelle executor and operand-stack cache
//!
//! Single-byte dispatch on the PC over a big-endian bytecode stream. The
//! operand stack grows upward in memory from the TOS register; for speed
//! the top four elements may live in R0-R3 under a small state machine
//! whose (top register, live count) pair is encoded in the low bits of the
//! handler-table register R5.
//!
//! This implementation follows the publicly documented reverse engineering
//! of the hardware (register conventions, array layout registers, handler
//! table dispatch). The 0xFE prefix opcodes are a non-historical extension
//! available at the EXTENSION implementation level only.

use crate::alu;
use crate::config::JazelleLevel;
use crate::cpu::{Cpu, J32_EXCEPTION_NULLPTR, J32_EXCEPTION_OUT_OF_BOUNDS, JMCR_JE,
    J32_EXCEPTION_DISABLED, reg::PC};
use crate::exc::{Exception, ExecResult};
use crate::psr::JT_ARM;

/// Register conventions of the Jazelle state.
pub const J32_LOC0: usize = 4; // cached local 0
pub const J32_SHT: usize = 5; // software handler table | fast-stack state
pub const J32_TOS: usize = 6; // top of stack
pub const J32_LOC: usize = 7; // locals base
pub const J32_CP: usize = 8; // constant pool
pub const J32_LINK: usize = 9; // frame link
pub const J32_HEAP: usize = 10; // allocation pointer (simulated subset)

// JOSCR bits
pub const JOSCR_FLAT_ARRAY: u32 = 0x2000_0000;
pub const JOSCR_DISABLE_ARRAY_INSTRUCTIONS: u32 = 0x8000_0000;

// JAOLR fields (array object layout register)
pub const JAOLR_ELEMENT_OFF_MASK: u32 = 0x0000_0F00;
pub const JAOLR_ELEMENT_OFF_SHIFT: u32 = 8 - 2;
pub const JAOLR_LENGTH_OFF_MASK: u32 = 0x0000_F000;
pub const JAOLR_LENGTH_OFF_SHIFT: u32 = 12 - 2;
pub const JAOLR_LENGTH_SUB: u32 = 0x0001_0000;
pub const JAOLR_LENSHIFT_MASK: u32 = 0x000E_0000;
pub const JAOLR_LENSHIFT_SHIFT: u32 = 17;

// ---- fast stack state machine ----

/// Number of stack values held in R0-R3.
pub fn fast_stack_size(cpu: &Cpu) -> u32 {
    (cpu.a32_reg(J32_SHT) >> 2) & 7
}

/// Register holding the top of the stack (R3 when empty, so the next push
/// starts at R0).
pub fn fast_stack_top(cpu: &Cpu) -> u32 {
    if cpu.a32_reg(J32_SHT) & 0x1C != 0 {
        cpu.a32_reg(J32_SHT) & 3
    } else {
        3
    }
}

/// Register holding the element `offset` positions below the top.
pub fn fast_stack_element(cpu: &Cpu, offset: u32) -> u32 {
    if cpu.a32_reg(J32_SHT) & 0x1C != 0 {
        (cpu.a32_reg(J32_SHT).wrapping_sub(offset)) & 3
    } else {
        (offset + 3) & 3
    }
}

fn set_fast_stack(cpu: &mut Cpu, size: u32, top: u32) {
    let top = if size == 0 { 0 } else { top };
    let sht = cpu.a32_reg(J32_SHT) & !0x1F;
    let sht = sht | (top & 3) | size.min(4) << 2;
    cpu.a32_set_reg(J32_SHT, sht);
}

fn push_word_memory(cpu: &mut Cpu, value: u32) -> ExecResult {
    let sp = cpu.a32_reg(J32_TOS);
    cpu.a32_write32(sp, value, false)?;
    cpu.a32_set_reg(J32_TOS, sp.wrapping_add(4));
    Ok(())
}

fn pop_word_memory(cpu: &mut Cpu) -> ExecResult<u32> {
    let sp = cpu.a32_reg(J32_TOS).wrapping_sub(4);
    let value = cpu.a32_read32(sp, false)?;
    cpu.a32_set_reg(J32_TOS, sp);
    Ok(value)
}

/// Store registers into memory until at most `target` remain cached.
fn spill_to(cpu: &mut Cpu, target: u32) -> ExecResult {
    let mut current = fast_stack_size(cpu);
    let top = fast_stack_top(cpu);
    while current > target {
        let reg = (top.wrapping_sub(current - 1)) & 3;
        let value = cpu.a32_reg(reg as usize);
        push_word_memory(cpu, value)?;
        current -= 1;
    }
    set_fast_stack(cpu, target.min(fast_stack_size(cpu)), top);
    Ok(())
}

/// Reload registers from memory until at least `target` are cached.
fn fill_to(cpu: &mut Cpu, target: u32) -> ExecResult {
    let mut current = fast_stack_size(cpu);
    let mut top = fast_stack_top(cpu);
    if current >= target {
        return Ok(());
    }
    if current == 0 {
        // the bottom of the reloaded run lands in R0
        top = target - 1;
    }
    while current < target {
        let value = pop_word_memory(cpu)?;
        let reg = (top.wrapping_sub(current)) & 3;
        cpu.a32_set_reg(reg as usize, value);
        current += 1;
    }
    set_fast_stack(cpu, target, top);
    Ok(())
}

/// Flush the whole register cache to memory. Required before anything
/// observes the stack through TOS (system calls, frames, the debugger).
pub fn spill_all(cpu: &mut Cpu) -> ExecResult {
    spill_to(cpu, 0)
}

/// Infallible spill used on the exception delivery path.
pub(crate) fn spill_fast_stack(cpu: &mut Cpu) {
    let _ = spill_to(cpu, 0);
}

/// Refresh the cached local 0 from memory.
pub fn update_locals(cpu: &mut Cpu) {
    let loc = cpu.a32_reg(J32_LOC);
    let value = cpu.read32_data(loc as u64);
    cpu.a32_set_reg(J32_LOC0, value);
}

pub fn push_word(cpu: &mut Cpu, value: u32) -> ExecResult {
    let mut size = fast_stack_size(cpu);
    if size == 4 {
        spill_to(cpu, 3)?;
        size = 3;
    }
    let top = (fast_stack_top(cpu) + 1) & 3;
    cpu.a32_set_reg(top as usize, value);
    set_fast_stack(cpu, size + 1, top);
    Ok(())
}

pub fn pop_word(cpu: &mut Cpu) -> ExecResult<u32> {
    let mut size = fast_stack_size(cpu);
    if size == 0 {
        fill_to(cpu, 1)?;
        size = 1;
    }
    let top = fast_stack_top(cpu);
    let value = cpu.a32_reg(top as usize);
    set_fast_stack(cpu, size - 1, top.wrapping_sub(1) & 3);
    Ok(value)
}

/// Value `index` positions below the top without changing the stack.
pub fn peek_word(cpu: &mut Cpu, index: u32) -> ExecResult<u32> {
    if index <= 3 {
        if fast_stack_size(cpu) <= index {
            fill_to(cpu, index + 1)?;
        }
        let reg = fast_stack_element(cpu, index);
        Ok(cpu.a32_reg(reg as usize))
    } else {
        let size = fast_stack_size(cpu);
        let sp = cpu.a32_reg(J32_TOS);
        cpu.a32_read32(sp.wrapping_sub(4 * (1 + index - size)), false)
    }
}

/// 64-bit values occupy two slots, high half on top.
pub fn push_dword(cpu: &mut Cpu, value: u64) -> ExecResult {
    push_word(cpu, value as u32)?;
    push_word(cpu, (value >> 32) as u32)
}

pub fn pop_dword(cpu: &mut Cpu) -> ExecResult<u64> {
    let high = pop_word(cpu)? as u64;
    let low = pop_word(cpu)? as u64;
    Ok(high << 32 | low)
}

// ---- constant pool and locals ----

fn load_const_word(cpu: &mut Cpu, offset: u32) -> ExecResult<u32> {
    let cp = cpu.a32_reg(J32_CP);
    cpu.a32_read32(cp.wrapping_add(offset * 4), false)
}

fn load_const_dword(cpu: &mut Cpu, offset: u32) -> ExecResult<u64> {
    let cp = cpu.a32_reg(J32_CP);
    cpu.a32_read64(cp.wrapping_add(offset * 4), false)
}

fn read_local_word(cpu: &mut Cpu, offset: u32) -> ExecResult<u32> {
    if offset == 0 {
        return Ok(cpu.a32_reg(J32_LOC0));
    }
    let loc = cpu.a32_reg(J32_LOC);
    cpu.a32_read32(loc.wrapping_add(offset * 4), false)
}

fn read_local_dword(cpu: &mut Cpu, offset: u32) -> ExecResult<u64> {
    let loc = cpu.a32_reg(J32_LOC);
    cpu.a32_read64(loc.wrapping_add(offset * 4), false)
}

fn write_local_word(cpu: &mut Cpu, offset: u32, value: u32) -> ExecResult {
    if offset == 0 {
        cpu.a32_set_reg(J32_LOC0, value);
    }
    let loc = cpu.a32_reg(J32_LOC);
    cpu.a32_write32(loc.wrapping_add(offset * 4), value, false)
}

fn write_local_dword(cpu: &mut Cpu, offset: u32, value: u64) -> ExecResult {
    let loc = cpu.a32_reg(J32_LOC);
    cpu.a32_write64(loc.wrapping_add(offset * 4), value, false)
}

// ---- arrays ----

fn array_length(cpu: &mut Cpu, array: u32) -> ExecResult<u32> {
    if array == 0 {
        return Err(Exception::JazelleBreak(J32_EXCEPTION_NULLPTR));
    }
    let offset = (cpu.jaolr & JAOLR_LENGTH_OFF_MASK) >> JAOLR_LENGTH_OFF_SHIFT;
    let address = if cpu.jaolr & JAOLR_LENGTH_SUB != 0 {
        array.wrapping_sub(offset)
    } else {
        array.wrapping_add(offset)
    };
    let length = cpu.a32_read32(address, false)?;
    let shift = (cpu.jaolr & JAOLR_LENSHIFT_MASK) >> JAOLR_LENSHIFT_SHIFT;
    Ok(length >> shift)
}

fn array_element_start(cpu: &mut Cpu, array: u32) -> ExecResult<u32> {
    let mut start = array.wrapping_add((cpu.jaolr & JAOLR_ELEMENT_OFF_MASK) >> JAOLR_ELEMENT_OFF_SHIFT);
    if cpu.joscr & JOSCR_FLAT_ARRAY == 0 {
        // indirect through a header pointer
        start = cpu.a32_read32(start, false)?;
    }
    Ok(start)
}

fn array_bound_check(cpu: &mut Cpu, array: u32, index: u32) -> ExecResult {
    if index >= array_length(cpu, array)? {
        return Err(Exception::JazelleBreak(J32_EXCEPTION_OUT_OF_BOUNDS));
    }
    Ok(())
}

/// Address of the object-sized element `index`, using the JAOLR stride.
fn array_element_address(cpu: &mut Cpu, array: u32, index: u32) -> ExecResult<u32> {
    array_bound_check(cpu, array, index)?;
    let start = array_element_start(cpu, array)?;
    let shift = (cpu.jaolr & JAOLR_LENSHIFT_MASK) >> JAOLR_LENSHIFT_SHIFT;
    Ok(start.wrapping_add(index << shift))
}

fn array_sized_address(cpu: &mut Cpu, array: u32, index: u32, size: u32) -> ExecResult<u32> {
    array_bound_check(cpu, array, index)?;
    let start = array_element_start(cpu, array)?;
    Ok(start.wrapping_add(index * size))
}

// ---- execution ----

fn break_op(op: u8) -> Exception {
    Exception::JazelleBreak(op as u32)
}

fn branch16(cpu: &mut Cpu) -> ExecResult {
    let offset = alu::sign_extend32(16, cpu.j32_fetch16()? as u32) as i32;
    cpu.r[PC] = cpu.old_pc.wrapping_add(offset as i64 as u64) & 0xFFFF_FFFF;
    Ok(())
}

fn skip16(cpu: &mut Cpu) -> ExecResult {
    cpu.j32_fetch16()?;
    Ok(())
}

pub(crate) fn step(cpu: &mut Cpu) -> ExecResult {
    if cpu.jmcr & JMCR_JE == 0 {
        return Err(Exception::JazelleBreak(J32_EXCEPTION_DISABLED));
    }
    let op = cpu.j32_fetch8()?;
    let level = cpu.config.jazelle.unwrap_or(JazelleLevel::None);
    if level < JazelleLevel::Jazelle {
        // trivial implementation: everything goes to the handler table
        return Err(break_op(op));
    }
    exec(cpu, op, level)
}

fn exec(cpu: &mut Cpu, op: u8, level: JazelleLevel) -> ExecResult {
    match op {
        0x00 => Ok(()), // nop
        0x01 => push_word(cpu, 0), // aconst_null
        0x02..=0x08 => push_word(cpu, (op as i32 - 3) as u32), // iconst_m1..iconst_5
        0x09 | 0x0A => push_dword(cpu, (op - 0x09) as u64), // lconst
        0x0B..=0x0D => push_word(cpu, ((op - 0x0B) as f32).to_bits()), // fconst
        0x0E | 0x0F => push_dword(cpu, ((op - 0x0E) as f64).to_bits()), // dconst
        0x10 => {
            let value = alu::sign_extend32(8, cpu.j32_fetch8()? as u32);
            push_word(cpu, value) // bipush
        }
        0x11 => {
            let value = alu::sign_extend32(16, cpu.j32_fetch16()? as u32);
            push_word(cpu, value) // sipush
        }
        0x12 => {
            let index = cpu.j32_fetch8()? as u32;
            let value = load_const_word(cpu, index)?;
            push_word(cpu, value) // ldc
        }
        0x13 => {
            let index = cpu.j32_fetch16()? as u32;
            let value = load_const_word(cpu, index)?;
            push_word(cpu, value) // ldc_w
        }
        0x14 => {
            let index = cpu.j32_fetch16()? as u32;
            let value = load_const_dword(cpu, index)?;
            push_dword(cpu, value) // ldc2_w
        }
        0x15 | 0x17 | 0x19 => {
            // iload/fload/aload
            let index = cpu.j32_fetch8()? as u32;
            let value = read_local_word(cpu, index)?;
            push_word(cpu, value)
        }
        0x16 | 0x18 => {
            let index = cpu.j32_fetch8()? as u32;
            let value = read_local_dword(cpu, index)?;
            push_dword(cpu, value)
        }
        0x1A..=0x1D => {
            let value = read_local_word(cpu, (op - 0x1A) as u32)?;
            push_word(cpu, value)
        }
        0x1E..=0x21 => {
            let value = read_local_dword(cpu, (op - 0x1E) as u32)?;
            push_dword(cpu, value)
        }
        0x22..=0x25 => {
            let value = read_local_word(cpu, (op - 0x22) as u32)?;
            push_word(cpu, value)
        }
        0x26..=0x29 => {
            let value = read_local_dword(cpu, (op - 0x26) as u32)?;
            push_dword(cpu, value)
        }
        0x2A..=0x2D => {
            let value = read_local_word(cpu, (op - 0x2A) as u32)?;
            push_word(cpu, value)
        }
        0x2E..=0x35 => exec_array_load(cpu, op),
        0x36 | 0x38 | 0x3A => {
            let index = cpu.j32_fetch8()? as u32;
            let value = pop_word(cpu)?;
            write_local_word(cpu, index, value)
        }
        0x37 | 0x39 => {
            let index = cpu.j32_fetch8()? as u32;
            let value = pop_dword(cpu)?;
            write_local_dword(cpu, index, value)
        }
        0x3B..=0x3E => {
            let value = pop_word(cpu)?;
            write_local_word(cpu, (op - 0x3B) as u32, value)
        }
        0x3F..=0x42 => {
            let value = pop_dword(cpu)?;
            write_local_dword(cpu, (op - 0x3F) as u32, value)
        }
        0x43..=0x46 => {
            let value = pop_word(cpu)?;
            write_local_word(cpu, (op - 0x43) as u32, value)
        }
        0x47..=0x4A => {
            let value = pop_dword(cpu)?;
            write_local_dword(cpu, (op - 0x47) as u32, value)
        }
        0x4B..=0x4E => {
            let value = pop_word(cpu)?;
            write_local_word(cpu, (op - 0x4B) as u32, value)
        }
        0x4F..=0x56 => exec_array_store(cpu, op),
        0x57 => pop_word(cpu).map(|_| ()), // pop
        0x58 => {
            pop_word(cpu)?;
            pop_word(cpu)?;
            Ok(())
        }
        0x59 => {
            let value = peek_word(cpu, 0)?;
            push_word(cpu, value) // dup
        }
        0x5A => {
            let v1 = pop_word(cpu)?;
            let v2 = pop_word(cpu)?;
            push_word(cpu, v1)?;
            push_word(cpu, v2)?;
            push_word(cpu, v1) // dup_x1
        }
        0x5B => {
            let v1 = pop_word(cpu)?;
            let v2 = pop_word(cpu)?;
            let v3 = pop_word(cpu)?;
            push_word(cpu, v1)?;
            push_word(cpu, v3)?;
            push_word(cpu, v2)?;
            push_word(cpu, v1) // dup_x2
        }
        0x5C => {
            let v1 = peek_word(cpu, 0)?;
            let v2 = peek_word(cpu, 1)?;
            push_word(cpu, v2)?;
            push_word(cpu, v1) // dup2
        }
        0x5D => {
            let v1 = pop_word(cpu)?;
            let v2 = pop_word(cpu)?;
            let v3 = pop_word(cpu)?;
            push_word(cpu, v2)?;
            push_word(cpu, v1)?;
            push_word(cpu, v3)?;
            push_word(cpu, v2)?;
            push_word(cpu, v1) // dup2_x1
        }
        0x5E => {
            let v1 = pop_word(cpu)?;
            let v2 = pop_word(cpu)?;
            let v3 = pop_word(cpu)?;
            let v4 = pop_word(cpu)?;
            push_word(cpu, v2)?;
            push_word(cpu, v1)?;
            push_word(cpu, v4)?;
            push_word(cpu, v3)?;
            push_word(cpu, v2)?;
            push_word(cpu, v1) // dup2_x2
        }
        0x5F => {
            let v1 = pop_word(cpu)?;
            let v2 = pop_word(cpu)?;
            push_word(cpu, v1)?;
            push_word(cpu, v2) // swap
        }
        0x60..=0x83 => exec_arithmetic(cpu, op),
        0x84 => {
            // iinc
            let index = cpu.j32_fetch8()? as u32;
            let delta = alu::sign_extend32(8, cpu.j32_fetch8()? as u32);
            let value = read_local_word(cpu, index)?.wrapping_add(delta);
            write_local_word(cpu, index, value)
        }
        0x85..=0x93 => exec_conversion(cpu, op),
        0x94 => {
            // lcmp
            let op2 = pop_dword(cpu)? as i64;
            let op1 = pop_dword(cpu)? as i64;
            push_word(cpu, op1.cmp(&op2) as i32 as u32)
        }
        0x95 | 0x96 => {
            let op2 = f32::from_bits(pop_word(cpu)?);
            let op1 = f32::from_bits(pop_word(cpu)?);
            let result = match op1.partial_cmp(&op2) {
                Some(ordering) => ordering as i32,
                None => if op == 0x95 { -1 } else { 1 }, // fcmpl / fcmpg
            };
            push_word(cpu, result as u32)
        }
        0x97 | 0x98 => {
            let op2 = f64::from_bits(pop_dword(cpu)?);
            let op1 = f64::from_bits(pop_dword(cpu)?);
            let result = match op1.partial_cmp(&op2) {
                Some(ordering) => ordering as i32,
                None => if op == 0x97 { -1 } else { 1 },
            };
            push_word(cpu, result as u32)
        }
        0x99..=0x9E => {
            // ifeq..ifle against zero
            let value = pop_word(cpu)? as i32;
            let take = match op {
                0x99 => value == 0,
                0x9A => value != 0,
                0x9B => value < 0,
                0x9C => value >= 0,
                0x9D => value > 0,
                _ => value <= 0,
            };
            if take { branch16(cpu) } else { skip16(cpu) }
        }
        0x9F..=0xA4 => {
            let op2 = pop_word(cpu)? as i32;
            let op1 = pop_word(cpu)? as i32;
            let take = match op {
                0x9F => op1 == op2,
                0xA0 => op1 != op2,
                0xA1 => op1 < op2,
                0xA2 => op1 >= op2,
                0xA3 => op1 > op2,
                _ => op1 <= op2,
            };
            if take { branch16(cpu) } else { skip16(cpu) }
        }
        0xA5 | 0xA6 => {
            let op2 = pop_word(cpu)?;
            let op1 = pop_word(cpu)?;
            let take = (op1 == op2) == (op == 0xA5);
            if take { branch16(cpu) } else { skip16(cpu) }
        }
        0xA7 => branch16(cpu), // goto
        0xA8 => {
            // jsr: push the return address
            let after = cpu.r[PC].wrapping_add(2) as u32;
            push_word(cpu, after)?;
            branch16(cpu)
        }
        0xA9 => {
            // ret
            let index = cpu.j32_fetch8()? as u32;
            let target = read_local_word(cpu, index)?;
            cpu.r[PC] = target as u64;
            Ok(())
        }
        0xAA => exec_tableswitch(cpu),
        0xAB => exec_lookupswitch(cpu),
        0xBE => {
            // arraylength
            let array = pop_word(cpu)?;
            let length = array_length(cpu, array)?;
            push_word(cpu, length)
        }
        0xC4 => exec_wide(cpu),
        0xC6 | 0xC7 => {
            let value = pop_word(cpu)?;
            let take = (value == 0) == (op == 0xC6);
            if take { branch16(cpu) } else { skip16(cpu) }
        }
        0xC8 => {
            // goto_w
            let offset = cpu.j32_fetch32()?;
            cpu.r[PC] = cpu.old_pc.wrapping_add(offset as i32 as i64 as u64) & 0xFFFF_FFFF;
            Ok(())
        }
        0xC9 => {
            let after = cpu.r[PC].wrapping_add(4) as u32;
            push_word(cpu, after)?;
            let offset = cpu.j32_fetch32()?;
            cpu.r[PC] = cpu.old_pc.wrapping_add(offset as i32 as i64 as u64) & 0xFFFF_FFFF;
            Ok(())
        }
        0xFE if level >= JazelleLevel::Extension => exec_extension(cpu),
        0xFF if level < JazelleLevel::Extension => Err(Exception::Breakpoint), // bkpt #0
        // everything else (returns, field access, invocations, allocation,
        // monitors, throws) is handled through the software handler table
        _ => Err(break_op(op)),
    }
}

fn exec_array_load(cpu: &mut Cpu, op: u8) -> ExecResult {
    if cpu.joscr & JOSCR_DISABLE_ARRAY_INSTRUCTIONS != 0 {
        return Err(break_op(op));
    }
    let index = pop_word(cpu)?;
    let array = pop_word(cpu)?;
    match op {
        0x2E | 0x30 => {
            // iaload/faload
            let address = array_sized_address(cpu, array, index, 4)?;
            let value = cpu.a32_read32(address, false)?;
            push_word(cpu, value)
        }
        0x2F | 0x31 => {
            let address = array_sized_address(cpu, array, index, 8)?;
            let value = cpu.a32_read64(address, false)?;
            push_dword(cpu, value)
        }
        0x32 => {
            // aaload goes through the object stride
            let address = array_element_address(cpu, array, index)?;
            let value = cpu.a32_read32(address, false)?;
            push_word(cpu, value)
        }
        0x33 => {
            let address = array_sized_address(cpu, array, index, 1)?;
            let value = cpu.a32_read8(address, false)? as u32;
            push_word(cpu, alu::sign_extend32(8, value)) // baload
        }
        0x34 => {
            let address = array_sized_address(cpu, array, index, 2)?;
            let value = cpu.a32_read16(address, false)? as u32;
            push_word(cpu, value) // caload
        }
        _ => {
            let address = array_sized_address(cpu, array, index, 2)?;
            let value = cpu.a32_read16(address, false)? as u32;
            push_word(cpu, alu::sign_extend32(16, value)) // saload
        }
    }
}

fn exec_array_store(cpu: &mut Cpu, op: u8) -> ExecResult {
    if cpu.joscr & JOSCR_DISABLE_ARRAY_INSTRUCTIONS != 0 {
        return Err(break_op(op));
    }
    match op {
        0x50 | 0x52 => {
            // lastore/dastore
            let value = pop_dword(cpu)?;
            let index = pop_word(cpu)?;
            let array = pop_word(cpu)?;
            let address = array_sized_address(cpu, array, index, 8)?;
            cpu.a32_write64(address, value, false)
        }
        _ => {
            let value = pop_word(cpu)?;
            let index = pop_word(cpu)?;
            let array = pop_word(cpu)?;
            match op {
                0x4F | 0x51 => {
                    let address = array_sized_address(cpu, array, index, 4)?;
                    cpu.a32_write32(address, value, false)
                }
                0x53 => {
                    let address = array_element_address(cpu, array, index)?;
                    cpu.a32_write32(address, value, false) // aastore
                }
                0x54 => {
                    let address = array_sized_address(cpu, array, index, 1)?;
                    cpu.a32_write8(address, value as u8, false) // bastore
                }
                _ => {
                    let address = array_sized_address(cpu, array, index, 2)?;
                    cpu.a32_write16(address, value as u16, false) // castore/sastore
                }
            }
        }
    }
}

fn exec_arithmetic(cpu: &mut Cpu, op: u8) -> ExecResult {
    // the operand kind cycles int, long, float, double
    match op & 3 {
        0 => {
            // int column
            let op2 = if op == 0x74 { 0 } else { pop_word(cpu)? as i32 };
            let op1 = pop_word(cpu)? as i32;
            let result = match op {
                0x60 => op1.wrapping_add(op2),
                0x64 => op1.wrapping_sub(op2),
                0x68 => op1.wrapping_mul(op2),
                0x6C => {
                    if op2 == 0 {
                        return Err(break_op(op));
                    }
                    op1.wrapping_div(op2)
                }
                0x70 => {
                    if op2 == 0 {
                        return Err(break_op(op));
                    }
                    op1.wrapping_rem(op2)
                }
                0x74 => op1.wrapping_neg(),
                0x78 => op1 << (op2 & 0x1F),
                0x7C => ((op1 as u32) >> (op2 & 0x1F)) as i32,
                0x80 => op1 | op2, // ior
                _ => return Err(break_op(op)),
            };
            push_word(cpu, result as u32)
        }
        1 => {
            // long column; the shifts take an int shift amount
            match op {
                0x79 | 0x7B | 0x7D => {
                    let amount = pop_word(cpu)? & 0x3F;
                    let value = pop_dword(cpu)? as i64;
                    let result = match op {
                        0x79 => value << amount,
                        0x7B => value >> amount,
                        _ => ((value as u64) >> amount) as i64,
                    };
                    push_dword(cpu, result as u64)
                }
                0x75 => {
                    let value = pop_dword(cpu)? as i64;
                    push_dword(cpu, value.wrapping_neg() as u64)
                }
                _ => {
                    let op2 = pop_dword(cpu)? as i64;
                    let op1 = pop_dword(cpu)? as i64;
                    let result = match op {
                        0x61 => op1.wrapping_add(op2),
                        0x65 => op1.wrapping_sub(op2),
                        0x69 => op1.wrapping_mul(op2),
                        0x6D => {
                            if op2 == 0 {
                                return Err(break_op(op));
                            }
                            op1.wrapping_div(op2)
                        }
                        0x71 => {
                            if op2 == 0 {
                                return Err(break_op(op));
                            }
                            op1.wrapping_rem(op2)
                        }
                        0x81 => op1 | op2, // lor
                        _ => return Err(break_op(op)),
                    };
                    push_dword(cpu, result as u64)
                }
            }
        }
        2 => {
            // float column, plus the int logical operations that share it
            match op {
                0x7E => {
                    let op2 = pop_word(cpu)?;
                    let op1 = pop_word(cpu)?;
                    push_word(cpu, op1 & op2) // iand
                }
                0x82 => {
                    let op2 = pop_word(cpu)?;
                    let op1 = pop_word(cpu)?;
                    push_word(cpu, op1 ^ op2) // ixor
                }
                0x76 => {
                    let value = f32::from_bits(pop_word(cpu)?);
                    push_word(cpu, (-value).to_bits())
                }
                _ => {
                    let op2 = f32::from_bits(pop_word(cpu)?);
                    let op1 = f32::from_bits(pop_word(cpu)?);
                    let result = match op {
                        0x62 => op1 + op2,
                        0x66 => op1 - op2,
                        0x6A => op1 * op2,
                        0x6E => op1 / op2,
                        0x72 => op1 % op2,
                        _ => return Err(break_op(op)),
                    };
                    push_word(cpu, result.to_bits())
                }
            }
        }
        _ => {
            // double column, plus the long/int logical operations
            match op {
                0x7F => {
                    let op2 = pop_dword(cpu)?;
                    let op1 = pop_dword(cpu)?;
                    push_dword(cpu, op1 & op2) // land
                }
                0x83 => {
                    let op2 = pop_dword(cpu)?;
                    let op1 = pop_dword(cpu)?;
                    push_dword(cpu, op1 ^ op2) // lxor
                }
                0x77 => {
                    let value = f64::from_bits(pop_dword(cpu)?);
                    push_dword(cpu, (-value).to_bits())
                }
                _ => {
                    let op2 = f64::from_bits(pop_dword(cpu)?);
                    let op1 = f64::from_bits(pop_dword(cpu)?);
                    let result = match op {
                        0x63 => op1 + op2,
                        0x67 => op1 - op2,
                        0x6B => op1 * op2,
                        0x6F => op1 / op2,
                        0x73 => op1 % op2,
                        _ => return Err(break_op(op)),
                    };
                    push_dword(cpu, result.to_bits())
                }
            }
        }
    }
}

fn exec_conversion(cpu: &mut Cpu, op: u8) -> ExecResult {
    match op {
        0x85 => {
            let value = pop_word(cpu)? as i32;
            push_dword(cpu, value as i64 as u64) // i2l
        }
        0x86 => {
            let value = pop_word(cpu)? as i32;
            push_word(cpu, (value as f32).to_bits()) // i2f
        }
        0x87 => {
            let value = pop_word(cpu)? as i32;
            push_dword(cpu, (value as f64).to_bits()) // i2d
        }
        0x88 => {
            let value = pop_dword(cpu)?;
            push_word(cpu, value as u32) // l2i
        }
        0x89 => {
            let value = pop_dword(cpu)? as i64;
            push_word(cpu, (value as f32).to_bits()) // l2f
        }
        0x8A => {
            let value = pop_dword(cpu)? as i64;
            push_dword(cpu, (value as f64).to_bits()) // l2d
        }
        0x8B => {
            let value = f32::from_bits(pop_word(cpu)?);
            push_word(cpu, (value as i32) as u32) // f2i
        }
        0x8C => {
            let value = f32::from_bits(pop_word(cpu)?);
            push_dword(cpu, (value as i64) as u64) // f2l
        }
        0x8D => {
            let value = f32::from_bits(pop_word(cpu)?);
            push_dword(cpu, (value as f64).to_bits()) // f2d
        }
        0x8E => {
            let value = f64::from_bits(pop_dword(cpu)?);
            push_word(cpu, (value as i32) as u32) // d2i
        }
        0x8F => {
            let value = f64::from_bits(pop_dword(cpu)?);
            push_dword(cpu, (value as i64) as u64) // d2l
        }
        0x90 => {
            let value = f64::from_bits(pop_dword(cpu)?);
            push_word(cpu, (value as f32).to_bits()) // d2f
        }
        0x91 => {
            let value = pop_word(cpu)?;
            push_word(cpu, alu::sign_extend32(8, value & 0xFF)) // i2b
        }
        0x92 => {
            let value = pop_word(cpu)?;
            push_word(cpu, value & 0xFFFF) // i2c
        }
        _ => {
            let value = pop_word(cpu)?;
            push_word(cpu, alu::sign_extend32(16, value & 0xFFFF)) // i2s
        }
    }
}

fn exec_tableswitch(cpu: &mut Cpu) -> ExecResult {
    // the table is aligned to a word boundary
    while cpu.r[PC] & 3 != 0 {
        cpu.j32_fetch8()?;
    }
    let default = cpu.j32_fetch32()? as i32;
    let low = cpu.j32_fetch32()? as i32;
    let high = cpu.j32_fetch32()? as i32;
    let index = pop_word(cpu)? as i32;

    let offset = if index < low || index > high {
        default
    } else {
        let entry = cpu.r[PC].wrapping_add(((index - low) as u64) * 4) as u32;
        cpu.j32_read32_code(entry)? as i32
    };
    cpu.r[PC] = cpu.old_pc.wrapping_add(offset as i64 as u64) & 0xFFFF_FFFF;
    Ok(())
}

fn exec_lookupswitch(cpu: &mut Cpu) -> ExecResult {
    while cpu.r[PC] & 3 != 0 {
        cpu.j32_fetch8()?;
    }
    let default = cpu.j32_fetch32()? as i32;
    let npairs = cpu.j32_fetch32()? as i32;
    let key = pop_word(cpu)? as i32;

    let mut offset = default;
    for i in 0..npairs {
        let entry = cpu.r[PC].wrapping_add(i as u64 * 8) as u32;
        let candidate = cpu.j32_read32_code(entry)? as i32;
        if candidate == key {
            offset = cpu.j32_read32_code(entry.wrapping_add(4))? as i32;
            break;
        }
    }
    cpu.r[PC] = cpu.old_pc.wrapping_add(offset as i64 as u64) & 0xFFFF_FFFF;
    Ok(())
}

fn exec_wide(cpu: &mut Cpu) -> ExecResult {
    let op = cpu.j32_fetch8()?;
    let index = cpu.j32_fetch16()? as u32;
    match op {
        0x15 | 0x17 | 0x19 => {
            let value = read_local_word(cpu, index)?;
            push_word(cpu, value)
        }
        0x16 | 0x18 => {
            let value = read_local_dword(cpu, index)?;
            push_dword(cpu, value)
        }
        0x36 | 0x38 | 0x3A => {
            let value = pop_word(cpu)?;
            write_local_word(cpu, index, value)
        }
        0x37 | 0x39 => {
            let value = pop_dword(cpu)?;
            write_local_dword(cpu, index, value)
        }
        0x84 => {
            let delta = alu::sign_extend32(16, cpu.j32_fetch16()? as u32);
            let value = read_local_word(cpu, index)?.wrapping_add(delta);
            write_local_word(cpu, index, value)
        }
        0xA9 => {
            let target = read_local_word(cpu, index)?;
            cpu.r[PC] = target as u64;
            Ok(())
        }
        _ => Err(break_op(op)),
    }
}

/// The 0xFE prefix extension opcodes: interworking return and software
/// interrupt. These reuse the byte the historical BKPT #0 occupied, which
/// is why they only exist at the EXTENSION level.
fn exec_extension(cpu: &mut Cpu) -> ExecResult {
    match cpu.j32_fetch8()? {
        0x00 => {
            // ret_from_jazelle: pop an interworking target
            let target = pop_word(cpu)?;
            spill_all(cpu)?;
            cpu.pstate.jt = JT_ARM;
            cpu.a32_set_pc_interworking(target);
            Ok(())
        }
        0x01 => Err(Exception::Svc),
        op => Err(break_op(op)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, Configuration, Isa, IsaSet, Version};
    use crate::exc::EmuResult;
    use crate::testutil::TestRam;

    fn jazelle_cpu(bytecode: &[u8]) -> Cpu {
        let mut config = Configuration {
            version: Version::V6,
            features: default_features(Version::V6),
            ..Configuration::default()
        };
        config.jazelle = Some(JazelleLevel::Jazelle);
        let mut ram = TestRam::new(0x2_0000);
        ram.0[0x1000..0x1000 + bytecode.len()].copy_from_slice(bytecode);
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB | IsaSet::JAZELLE,
            Box::new(ram),
        );
        cpu.set_isa(Isa::Jazelle);
        cpu.capture_breaks = true;
        cpu.r[PC] = 0x1000;
        cpu.a32_set_reg(J32_TOS, 0x8000);
        cpu.a32_set_reg(J32_LOC, 0x7000);
        cpu
    }

    #[test]
    fn test_iconst_iadd_keeps_result_in_registers() {
        // iconst_2; iconst_3; iadd
        let mut cpu = jazelle_cpu(&[0x05, 0x06, 0x60]);
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(fast_stack_size(&cpu), 1);
        let top = fast_stack_top(&cpu);
        assert_eq!(cpu.a32_reg(top as usize), 5);
        // nothing spilled
        assert_eq!(cpu.a32_reg(J32_TOS), 0x8000);
    }

    #[test]
    fn test_fast_stack_spills_fifth_push() {
        let mut cpu = jazelle_cpu(&[0x03, 0x04, 0x05, 0x06, 0x07]);
        for _ in 0..5 {
            cpu.step();
        }
        assert_eq!(fast_stack_size(&cpu), 4);
        // the bottom element went to memory
        assert_eq!(cpu.a32_reg(J32_TOS), 0x8004);
        assert_eq!(cpu.read32_data(0x8000), 0);
    }

    #[test]
    fn test_spill_reload_round_trip() {
        let mut cpu = jazelle_cpu(&[0x03, 0x04, 0x05]);
        for _ in 0..3 {
            cpu.step();
        }
        spill_all(&mut cpu).unwrap();
        assert_eq!(fast_stack_size(&cpu), 0);
        assert_eq!(cpu.a32_reg(J32_TOS), 0x800C);
        // values sit in push order
        assert_eq!(cpu.read32_data(0x8000), 0);
        assert_eq!(cpu.read32_data(0x8004), 1);
        assert_eq!(cpu.read32_data(0x8008), 2);
        // reload and check the top
        let value = pop_word(&mut cpu).unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_bipush_sipush() {
        let mut cpu = jazelle_cpu(&[0x10, 0xFE, 0x11, 0x12, 0x34]);
        cpu.step();
        assert_eq!(peek_word(&mut cpu, 0).unwrap() as i32, -2);
        cpu.step();
        assert_eq!(peek_word(&mut cpu, 0).unwrap(), 0x1234);
    }

    #[test]
    fn test_locals_and_iinc() {
        // istore_1; iload_1; iinc 1, 5; iload_1
        let mut cpu = jazelle_cpu(&[0x10, 0x07, 0x3C, 0x84, 0x01, 0x05, 0x1B]);
        cpu.step(); // bipush 7
        cpu.step(); // istore_1
        cpu.step(); // iinc
        cpu.step(); // iload_1
        assert_eq!(peek_word(&mut cpu, 0).unwrap(), 12);
    }

    #[test]
    fn test_local_zero_cache() {
        // istore_0 updates both memory and the R4 cache
        let mut cpu = jazelle_cpu(&[0x05, 0x3B, 0x1A]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.a32_reg(J32_LOC0), 2);
        assert_eq!(cpu.read32_data(0x7000), 2);
        cpu.step();
        assert_eq!(peek_word(&mut cpu, 0).unwrap(), 2);
    }

    #[test]
    fn test_branch_if_icmplt() {
        // iconst_1; iconst_2; if_icmplt +5 -> lands on iconst_5
        let mut cpu = jazelle_cpu(&[0x04, 0x05, 0xA1, 0x00, 0x05, 0x00, 0x00, 0x08]);
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.r[PC], 0x1002 + 5);
        cpu.step(); // iconst_5
        assert_eq!(peek_word(&mut cpu, 0).unwrap(), 5);
    }

    #[test]
    fn test_long_two_slot_convention() {
        // ldc2_w-free variant: lconst_1; l2i
        let mut cpu = jazelle_cpu(&[0x0A, 0x88]);
        cpu.step();
        assert_eq!(fast_stack_size(&cpu), 2);
        // high half on top
        assert_eq!(peek_word(&mut cpu, 0).unwrap(), 0);
        assert_eq!(peek_word(&mut cpu, 1).unwrap(), 1);
        cpu.step();
        assert_eq!(peek_word(&mut cpu, 0).unwrap(), 1);
    }

    #[test]
    fn test_array_load_flat_layout() {
        // array at 0x4000: length word directly before the elements
        let mut cpu = jazelle_cpu(&[0x10, 0x00, 0x10, 0x01, 0x2E]);
        cpu.joscr = JOSCR_FLAT_ARRAY;
        cpu.jaolr = JAOLR_LENGTH_SUB | (4 << JAOLR_LENGTH_OFF_SHIFT) | (2 << JAOLR_LENSHIFT_SHIFT);
        cpu.write32_data(0x3FFC, 2 << 2); // length 2 before shift
        cpu.write32_data(0x4000, 0xAA);
        cpu.write32_data(0x4004, 0xBB);
        // push array, push index 1, iaload
        cpu.step();
        let top = fast_stack_top(&cpu);
        cpu.a32_set_reg(top as usize, 0x4000);
        cpu.step();
        cpu.step();
        assert_eq!(peek_word(&mut cpu, 0).unwrap(), 0xBB);
    }

    #[test]
    fn test_array_bounds_trap() {
        let mut cpu = jazelle_cpu(&[0x10, 0x00, 0x10, 0x05, 0x2E]);
        cpu.joscr = JOSCR_FLAT_ARRAY;
        cpu.jaolr = JAOLR_LENGTH_SUB | (4 << JAOLR_LENGTH_OFF_SHIFT) | (2 << JAOLR_LENSHIFT_SHIFT);
        cpu.write32_data(0x3FFC, 2 << 2);
        cpu.step();
        let top = fast_stack_top(&cpu);
        cpu.a32_set_reg(top as usize, 0x4000);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.result, EmuResult::JazelleOutOfBounds);
    }

    #[test]
    fn test_null_array_traps() {
        let mut cpu = jazelle_cpu(&[0x01, 0xBE]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.result, EmuResult::JazelleNullptr);
    }

    #[test]
    fn test_unhandled_opcode_goes_to_handler_table() {
        // invokestatic is not executed directly
        let mut cpu = jazelle_cpu(&[0xB8, 0x00, 0x01]);
        cpu.capture_breaks = false;
        cpu.a32_set_reg(J32_SHT, 0x0005_0000);
        cpu.step();
        // dispatched into the software handler table, back in ARM state
        assert_eq!(cpu.pstate.jt, JT_ARM);
        assert_eq!(cpu.r[PC], 0x0005_0000 + (0xB8 << 2));
        assert_eq!(cpu.a32_reg(crate::cpu::reg::A32_LR), 0x1000);
    }

    #[test]
    fn test_captured_undefined_bytecode() {
        let mut cpu = jazelle_cpu(&[0xB8, 0x00, 0x01]);
        cpu.step();
        assert_eq!(cpu.result, EmuResult::JazelleUndefined);
        // PC rewound to the invoke for the host simulation layer
        assert_eq!(cpu.r[PC], 0x1000);
    }

    #[test]
    fn test_jazelle_disabled_without_je() {
        let mut cpu = jazelle_cpu(&[0x00]);
        cpu.jmcr = 0;
        cpu.step();
        assert_eq!(cpu.result, EmuResult::JazelleDisabled);
    }

    #[test]
    fn test_trivial_level_traps_everything() {
        let mut config = Configuration {
            version: Version::V6,
            features: default_features(Version::V6),
            ..Configuration::default()
        };
        config.jazelle = Some(JazelleLevel::Trivial);
        let mut ram = TestRam::new(0x2000);
        ram.0[0x100] = 0x03; // iconst_0
        let mut cpu = Cpu::new(config, IsaSet::ARM32 | IsaSet::THUMB, Box::new(ram));
        cpu.set_isa(Isa::Jazelle);
        cpu.jmcr = JMCR_JE;
        cpu.capture_breaks = true;
        cpu.r[PC] = 0x100;
        cpu.step();
        assert_eq!(cpu.result, EmuResult::JazelleUndefined);
    }

    #[test]
    fn test_tableswitch() {
        // iconst_1; tableswitch {default +20, low 0, high 1, offsets...}
        let code: &[u8] = &[
            0x04, // iconst_1
            0xAA, // tableswitch at 0x1001, operands padded to 0x1004
            0x00, 0x00, // padding
            0x00, 0x00, 0x00, 0x14, // default +20
            0x00, 0x00, 0x00, 0x00, // low 0
            0x00, 0x00, 0x00, 0x01, // high 1
            0x00, 0x00, 0x00, 0x10, // offset for 0
            0x00, 0x00, 0x00, 0x12, // offset for 1
        ];
        let mut cpu = jazelle_cpu(code);
        cpu.step();
        cpu.step();
        // branch base is the tableswitch opcode itself
        assert_eq!(cpu.r[PC], 0x1001 + 0x12);
    }

    #[test]
    fn test_extension_ret_from_jazelle() {
        let mut config = Configuration {
            version: Version::V6,
            features: default_features(Version::V6),
            ..Configuration::default()
        };
        config.jazelle = Some(JazelleLevel::Extension);
        let mut ram = TestRam::new(0x2000);
        ram.0[0x100..0x102].copy_from_slice(&[0xFE, 0x00]);
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB | IsaSet::JAZELLE,
            Box::new(ram),
        );
        cpu.set_isa(Isa::Jazelle);
        cpu.capture_breaks = true;
        cpu.r[PC] = 0x100;
        cpu.a32_set_reg(J32_TOS, 0x1000);
        push_word(&mut cpu, 0x501).unwrap(); // thumb target
        cpu.step();
        assert_eq!(cpu.pstate.jt, crate::psr::JT_THUMB);
        assert_eq!(cpu.r[PC], 0x500);
    }
}
