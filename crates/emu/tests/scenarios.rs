//! End-to-end execution scenarios
//!
//! Drives whole flat images through the capture-mode step loop the way the
//! host CLI does, observing the typed result codes instead of delivering
//! architectural vectors.

use armemu::config::{default_features, Configuration, Isa, IsaSet, Version};
use armemu::cpu::reg;
use armemu::exec::jazelle;
use armemu::{Cpu, EmuResult, MemoryInterface};

/// Fixed-size test memory; accesses past the end fail like a bus abort.
struct Ram(Vec<u8>);

impl MemoryInterface for Ram {
    fn read(&mut self, address: u64, buffer: &mut [u8], _privileged: bool) -> bool {
        let start = address as usize;
        match self.0.get(start..start + buffer.len()) {
            Some(slice) => {
                buffer.copy_from_slice(slice);
                true
            }
            None => false,
        }
    }

    fn write(&mut self, address: u64, buffer: &[u8], _privileged: bool) -> bool {
        let start = address as usize;
        match self.0.get_mut(start..start + buffer.len()) {
            Some(slice) => {
                slice.copy_from_slice(buffer);
                true
            }
            None => false,
        }
    }
}

fn arm32_cpu(words: &[u32]) -> Cpu {
    let config = Configuration {
        version: Version::V7,
        features: default_features(Version::V7),
        ..Configuration::default()
    };
    let mut ram = Ram(vec![0; 0x2_0000]);
    for (i, word) in words.iter().enumerate() {
        ram.0[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    let mut cpu = Cpu::new(
        config,
        IsaSet::ARM32 | IsaSet::THUMB | IsaSet::JAZELLE,
        Box::new(ram),
    );
    cpu.set_isa(Isa::Arm32);
    cpu.capture_breaks = true;
    cpu
}

/// Decimal print under the A32 Linux EABI: the program issues a write(1,
/// msg, 6) followed by an exit(123), both observed as captured SVCs.
#[test]
fn scenario_decimal_print_a32_eabi() {
    let program = [
        0xE3A0_0001, // mov r0, #1
        0xE28F_1014, // adr r1, msg (pc + 0x14 -> 0x20)
        0xE3A0_2006, // mov r2, #6
        0xE3A0_7004, // mov r7, #4 (write)
        0xEF00_0000, // svc #0
        0xE3A0_007B, // mov r0, #123
        0xE3A0_7001, // mov r7, #1 (exit)
        0xEF00_0000, // svc #0
        u32::from_le_bytes(*b"1234"), // msg: .ascii "12345\n"
        u32::from_le_bytes(*b"5\n\0\0"),
    ];
    let mut cpu = arm32_cpu(&program);

    // run to the first system call
    while cpu.result == EmuResult::Ok {
        cpu.step();
    }
    assert_eq!(cpu.result, EmuResult::Svc);
    assert_eq!(cpu.a32_reg(7), 4, "write system call number");
    assert_eq!(cpu.a32_reg(0), 1, "stdout");
    assert_eq!(cpu.a32_reg(2), 6, "count");
    let address = cpu.a32_reg(1) as u64;
    let message: Vec<u8> = (0..6).map(|i| cpu.read8_data(address + i)).collect();
    assert_eq!(&message, b"12345\n");

    // service it the way the host does and continue to the exit
    cpu.result = EmuResult::Ok;
    while cpu.result == EmuResult::Ok {
        cpu.step();
    }
    assert_eq!(cpu.result, EmuResult::Svc);
    assert_eq!(cpu.a32_reg(7), 1, "exit system call number");
    assert_eq!(cpu.a32_reg(0), 123);
}

/// BE-32 halfword loads swap within the aligned word: bytes 11 22 33 44 at
/// word A read back as 0x1122 at A and 0x3344 at A+2.
#[test]
fn scenario_be32_halfword_load() {
    let mut cpu = arm32_cpu(&[
        0xE1D0_20B0, // ldrh r2, [r0]
        0xE1D0_30B2, // ldrh r3, [r0, #2]
    ]);
    cpu.sctlr_el1 |= armemu::cpu::Sctlr::B; // word-invariant big endian

    // store the bytes through the byte-invariant view
    for (i, byte) in [0x11u8, 0x22, 0x33, 0x44].iter().enumerate() {
        cpu.write8_data(0x1000 + i as u64, *byte);
    }
    cpu.a32_set_reg(0, 0x1000);
    cpu.step();
    cpu.step();
    assert_eq!(cpu.a32_reg(2), 0x1122);
    assert_eq!(cpu.a32_reg(3), 0x3344);
    assert_eq!(cpu.result, EmuResult::Ok);
}

/// Interworking round trip: ARM calls a Thumb function through BLX, the
/// Thumb side returns through BX LR.
#[test]
fn scenario_arm_thumb_interworking() {
    let mut cpu = arm32_cpu(&[
        0xE3A0_0011, // mov r0, #0x11 (thumb target at 0x10)
        0xE12F_FF30, // blx r0
        0xE3A0_3003, // mov r3, #3 (return lands here)
        0xEF00_0000, // svc #0
        // 0x10: thumb code: movs r1, #7; bx lr
        (0x4770 << 16) | 0x2107,
    ]);
    while cpu.result == EmuResult::Ok {
        cpu.step();
    }
    assert_eq!(cpu.result, EmuResult::Svc);
    assert_eq!(cpu.a32_reg(1), 7, "thumb side executed");
    assert_eq!(cpu.a32_reg(3), 3, "returned to the ARM side");
    assert_eq!(cpu.pstate.jt, armemu::psr::JT_ARM);
}

/// Jazelle iadd with the operand stack spilled and reloaded around it:
/// spill-all, reload, spill-all leaves the memory image byte-identical.
#[test]
fn scenario_jazelle_stack_round_trip() {
    let config = {
        let mut config = Configuration {
            version: Version::V6,
            features: default_features(Version::V6),
            ..Configuration::default()
        };
        config.jazelle = Some(armemu::JazelleLevel::Jazelle);
        config
    };
    let mut ram = Ram(vec![0; 0x1_0000]);
    // iconst_2; iconst_3; iadd
    ram.0[0x100..0x103].copy_from_slice(&[0x05, 0x06, 0x60]);
    let mut cpu = Cpu::new(
        config,
        IsaSet::ARM32 | IsaSet::THUMB | IsaSet::JAZELLE,
        Box::new(ram),
    );
    cpu.set_isa(Isa::Jazelle);
    cpu.capture_breaks = true;
    cpu.r[reg::PC] = 0x100;
    cpu.a32_set_reg(jazelle::J32_TOS, 0x8000);

    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.result, EmuResult::Ok);
    assert_eq!(jazelle::fast_stack_size(&cpu), 1);
    let top = jazelle::fast_stack_top(&cpu);
    assert_eq!(cpu.a32_reg(top as usize), 5);

    // spill, snapshot, reload, spill: byte-equal stacks
    jazelle::spill_all(&mut cpu).unwrap();
    let bytes_before: Vec<u8> = (0..8).map(|i| cpu.read8_data(0x8000 + i)).collect();
    let tos_before = cpu.a32_reg(jazelle::J32_TOS);
    let value = jazelle::pop_word(&mut cpu).unwrap();
    jazelle::push_word(&mut cpu, value).unwrap();
    jazelle::spill_all(&mut cpu).unwrap();
    let bytes_after: Vec<u8> = (0..8).map(|i| cpu.read8_data(0x8000 + i)).collect();
    assert_eq!(bytes_before, bytes_after);
    assert_eq!(cpu.a32_reg(jazelle::J32_TOS), tos_before);
}

/// ARM26 keeps the PC inside the 26-bit space across branches.
#[test]
fn scenario_arm26_pc_wraps() {
    let config = Configuration {
        version: Version::V2,
        features: default_features(Version::V2),
        ..Configuration::default()
    };
    let mut ram = Ram(vec![0; 0x1000]);
    // b 0 (tight loop)
    ram.0[0..4].copy_from_slice(&0xEAFF_FFFEu32.to_le_bytes());
    let mut cpu = Cpu::new(config, IsaSet::ARM26, Box::new(ram));
    cpu.set_isa(Isa::Arm26);
    cpu.capture_breaks = true;
    for _ in 0..4 {
        cpu.step();
        assert!(cpu.r[reg::PC] < 0x0400_0000);
        assert_eq!(cpu.r[reg::PC], 0);
    }
}

/// The data endianness the guest observes follows PSTATE.E on v6+.
#[test]
fn scenario_setend_changes_data_view() {
    let mut cpu = arm32_cpu(&[
        0xE590_1000, // ldr r1, [r0]
        0xF101_0200, // setend be
        0xE590_2000, // ldr r2, [r0]
    ]);
    cpu.write32_data(0x1000, 0x1122_3344);
    cpu.a32_set_reg(0, 0x1000);
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.a32_reg(1), 0x1122_3344);
    assert_eq!(cpu.a32_reg(2), 0x4433_2211);
    assert_eq!(cpu.result, EmuResult::Ok);
}
