//! Simulated JVM layer over the Jazelle core
//!
//! Instructions the hardware traps (invocations, field access, allocation,
//! returns) come back to the host as Jazelle-undefined results; this layer
//! interprets the ones a minimal runtime needs and resumes execution.
//! Method calls whose header carries a zero constant-pool address are
//! system-call stubs and execute natively.

use armemu::cpu::reg::PC;
use armemu::exec::jazelle::{self, J32_CP, J32_HEAP, J32_LINK, J32_LOC, J32_TOS};
use armemu::Cpu;

use crate::class::LoadedClass;
use crate::linux::{A32_SYS_BRK, A32_SYS_EXIT, A32_SYS_WRITE, J32_SYS_GETBYTES};
use crate::memory::read_block;

/// What servicing one trapped instruction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOutcome {
    Handled,
    Exit(i32),
    Unhandled,
}

/// Push a call frame (old PC, old locals, old constant pool, old link) and
/// transfer to a method body. Counts are in bytes.
pub fn j32_invoke(cpu: &mut Cpu, argument_bytes: u32, local_bytes: u32, address: u32) {
    let old_loc = cpu.a32_reg(J32_LOC);
    let tos = cpu.a32_reg(J32_TOS);
    cpu.a32_set_reg(J32_LOC, tos.wrapping_sub(argument_bytes));
    let loc = cpu.a32_reg(J32_LOC);
    cpu.a32_set_reg(J32_TOS, loc.wrapping_add(local_bytes));

    let pc = cpu.r[PC] as u32;
    let cp = cpu.a32_reg(J32_CP);
    let link = cpu.a32_reg(J32_LINK);
    let _ = jazelle::push_word(cpu, pc);
    let _ = jazelle::push_word(cpu, old_loc);
    let _ = jazelle::push_word(cpu, cp);
    let _ = jazelle::push_word(cpu, link);
    // flush so the TOS register reflects the frame
    let _ = jazelle::spill_all(cpu);
    let tos = cpu.a32_reg(J32_TOS);
    cpu.a32_set_reg(J32_LINK, tos);
    cpu.r[PC] = address as u64;
}

fn pop(cpu: &mut Cpu) -> u32 {
    jazelle::pop_word(cpu).unwrap_or(0)
}

fn push(cpu: &mut Cpu, value: u32) {
    let _ = jazelle::push_word(cpu, value);
}

/// Unwind one frame; `slots` is 1 or 2 for the returned value, 0 for void.
fn unwind_frame(cpu: &mut Cpu, slots: u32) {
    let result = match slots {
        0 => 0u64,
        1 => pop(cpu) as u64,
        _ => jazelle::pop_dword(cpu).unwrap_or(0),
    };

    let link = cpu.a32_reg(J32_LINK);
    cpu.a32_set_reg(J32_TOS, link);
    let old_link = pop(cpu);
    cpu.a32_set_reg(J32_LINK, old_link);
    let old_cp = pop(cpu);
    cpu.a32_set_reg(J32_CP, old_cp);
    let new_sp = cpu.a32_reg(J32_LOC);
    let old_loc = pop(cpu);
    cpu.a32_set_reg(J32_LOC, old_loc);
    let return_pc = pop(cpu);
    cpu.r[PC] = return_pc as u64;
    cpu.a32_set_reg(J32_TOS, new_sp);

    match slots {
        0 => {}
        1 => push(cpu, result as u32),
        _ => {
            let _ = jazelle::push_dword(cpu, result);
        }
    }
}

/// Interpret one trapped bytecode at the current PC. Returns `Unhandled`
/// when the opcode is not part of the simulated runtime.
pub fn simulate_instruction(cpu: &mut Cpu, heap_start: u32, class: &LoadedClass) -> SimOutcome {
    let _ = jazelle::spill_all(cpu);
    let op = cpu.peek8(cpu.r[PC]);
    cpu.r[PC] += 1;

    let outcome = match op {
        0xAC | 0xAE | 0xB0 => {
            // ireturn/freturn/areturn
            unwind_frame(cpu, 1);
            SimOutcome::Handled
        }
        0xAD | 0xAF => {
            // lreturn/dreturn
            unwind_frame(cpu, 2);
            SimOutcome::Handled
        }
        0xB1 => {
            unwind_frame(cpu, 0);
            SimOutcome::Handled
        }

        0xB2 => {
            // getstatic
            let index = cpu.peek16be(cpu.r[PC]);
            let cp = cpu.a32_reg(J32_CP) as u64;
            let field_address = cpu.read32_data(cp + 4 * index as u64) as u64;
            match class.field_descriptor_char(index) {
                b'B' => {
                    let value = cpu.read8_data(field_address) as u32;
                    push(cpu, ((value as i8) as i32) as u32);
                }
                b'Z' => {
                    let value = cpu.read8_data(field_address) as u32;
                    push(cpu, value);
                }
                b'C' => {
                    let value = cpu.read16_data(field_address) as u32;
                    push(cpu, value);
                }
                b'S' => {
                    let value = cpu.read16_data(field_address) as u32;
                    push(cpu, ((value as i16) as i32) as u32);
                }
                b'D' | b'J' => {
                    let value = cpu.read64_data(field_address);
                    let _ = jazelle::push_dword(cpu, value);
                }
                _ => {
                    let value = cpu.read32_data(field_address);
                    push(cpu, value);
                }
            }
            cpu.r[PC] += 2;
            SimOutcome::Handled
        }
        0xB3 => {
            // putstatic
            let index = cpu.peek16be(cpu.r[PC]);
            let cp = cpu.a32_reg(J32_CP) as u64;
            let field_address = cpu.read32_data(cp + 4 * index as u64) as u64;
            match class.field_descriptor_char(index) {
                b'B' | b'Z' => {
                    let value = pop(cpu);
                    cpu.write8_data(field_address, value as u8);
                }
                b'C' | b'S' => {
                    let value = pop(cpu);
                    cpu.write16_data(field_address, value as u16);
                }
                b'D' | b'J' => {
                    let value = jazelle::pop_dword(cpu).unwrap_or(0);
                    cpu.write64_data(field_address, value);
                }
                _ => {
                    let value = pop(cpu);
                    cpu.write32_data(field_address, value);
                }
            }
            cpu.r[PC] += 2;
            SimOutcome::Handled
        }

        0xB6 => {
            // invokevirtual: only the getBytes stub exists
            let index = cpu.peek16be(cpu.r[PC]);
            let cp = cpu.a32_reg(J32_CP) as u64;
            let method_address = cpu.read32_data(cp + 4 * index as u64) as u64;
            let new_cp = cpu.read32_data(method_address);
            if new_cp == 0 {
                let number = cpu.read32_data(method_address + 8);
                match number {
                    J32_SYS_GETBYTES => {
                        // string data is already a length-prefixed array
                        cpu.r[PC] += 2;
                        SimOutcome::Handled
                    }
                    _ => SimOutcome::Unhandled,
                }
            } else {
                SimOutcome::Unhandled
            }
        }

        0xB8 => {
            // invokestatic
            let index = cpu.peek16be(cpu.r[PC]);
            let cp = cpu.a32_reg(J32_CP) as u64;
            let method_address = cpu.read32_data(cp + 4 * index as u64) as u64;
            let new_cp = cpu.read32_data(method_address);
            if new_cp == 0 {
                let number = cpu.read32_data(method_address + 8);
                match number {
                    A32_SYS_EXIT => {
                        let status = pop(cpu) as i32;
                        return SimOutcome::Exit(status);
                    }
                    A32_SYS_WRITE => {
                        let count = pop(cpu);
                        let buffer = pop(cpu);
                        let offset = pop(cpu);
                        let fd = pop(cpu);
                        let bytes =
                            read_block(cpu, (buffer + offset) as u64, count as usize);
                        let written = crate::linux::host_write(fd as i32, &bytes);
                        push(cpu, written as u32);
                        cpu.r[PC] += 2;
                        SimOutcome::Handled
                    }
                    A32_SYS_BRK => {
                        let new_heap = pop(cpu);
                        let heap = cpu.a32_reg(J32_HEAP);
                        push(cpu, heap);
                        if new_heap >= heap_start {
                            cpu.a32_set_reg(J32_HEAP, new_heap);
                        }
                        cpu.r[PC] += 2;
                        SimOutcome::Handled
                    }
                    _ => SimOutcome::Unhandled,
                }
            } else {
                let argument_bytes = cpu.read32_data(method_address + 4);
                let local_bytes = cpu.read32_data(method_address + 8);
                cpu.r[PC] += 2;
                j32_invoke(cpu, argument_bytes, local_bytes, method_address as u32 + 12);
                cpu.a32_set_reg(J32_CP, new_cp);
                SimOutcome::Handled
            }
        }

        0xB9 => {
            // invokeinterface: only functional interfaces, the receiver is a
            // method reference below the arguments
            let index = cpu.peek16be(cpu.r[PC]);
            let cp = cpu.a32_reg(J32_CP) as u64;
            let arg_bytes = cpu.read16_data(cp + 4 * index as u64) as u32;
            let tos = cpu.a32_reg(J32_TOS);
            let method_address =
                cpu.read32_data((tos - arg_bytes - 4) as u64) as u64;
            // close the receiver slot by sliding the arguments down a word
            for i in 0..arg_bytes {
                let byte = cpu.read8_data((tos - arg_bytes + i) as u64);
                cpu.write8_data((tos - arg_bytes + i - 4) as u64, byte);
            }
            cpu.a32_set_reg(J32_TOS, tos - 4);
            cpu.r[PC] += 4;

            let new_cp = cpu.read32_data(method_address);
            let argument_bytes = cpu.read32_data(method_address + 4);
            let local_bytes = cpu.read32_data(method_address + 8);
            j32_invoke(cpu, argument_bytes, local_bytes, method_address as u32 + 12);
            cpu.a32_set_reg(J32_CP, new_cp);
            SimOutcome::Handled
        }

        0xBA => {
            // invokedynamic: metafactory sites push the method reference
            let index = cpu.peek16be(cpu.r[PC]);
            let cp = cpu.a32_reg(J32_CP) as u64;
            let reference = cpu.read32_data(cp + 4 * index as u64);
            push(cpu, reference);
            cpu.r[PC] += 4;
            SimOutcome::Handled
        }

        0xBC => {
            // newarray
            let size = pop(cpu);
            let elsize = match cpu.peek8(cpu.r[PC]) {
                4 | 8 => 1,       // boolean, byte
                5 | 9 => 2,       // char, short
                6 | 10 => 4,      // float, int
                7 | 11 => 8,      // long, double
                _ => return SimOutcome::Unhandled,
            };
            cpu.r[PC] += 1;
            allocate_array(cpu, size, elsize);
            SimOutcome::Handled
        }
        0xBD => {
            // anewarray
            cpu.r[PC] += 2;
            let size = pop(cpu);
            allocate_array(cpu, size, 4);
            SimOutcome::Handled
        }

        _ => SimOutcome::Unhandled,
    };

    if outcome == SimOutcome::Handled {
        // frames and returns moved the locals base
        jazelle::update_locals(cpu);
        let _ = jazelle::spill_all(cpu);
    }
    outcome
}

/// Bump allocation: a length word, then the elements. The stored length is
/// pre-shifted to match the configured JAOLR length shift.
fn allocate_array(cpu: &mut Cpu, size: u32, elsize: u32) {
    let heap = cpu.a32_reg(J32_HEAP);
    let shift = (cpu.jaolr & jazelle::JAOLR_LENSHIFT_MASK) >> jazelle::JAOLR_LENSHIFT_SHIFT;
    push(cpu, heap + 4);
    cpu.write32_data(heap as u64, size << shift);
    cpu.a32_set_reg(J32_HEAP, heap + 4 + elsize * size);
}
