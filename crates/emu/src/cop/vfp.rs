//! VFP and Advanced SIMD coprocessor (slots 10 and 11)
//!
//! Both slots operate on the same register bank: slot 10 carries the
//! single-precision views, slot 11 the double-precision and pair views.
//! The scalar arithmetic subset, the GPR transfers and the load/store
//! forms are implemented; short-vector (FPSCR.LEN) operation is not.

use crate::cpu::Cpu;
use crate::exc::{Exception, ExecResult};

// FPSCR condition flags
const FPSCR_V: u32 = 0x1000_0000;
const FPSCR_C: u32 = 0x2000_0000;
const FPSCR_Z: u32 = 0x4000_0000;
const FPSCR_N: u32 = 0x8000_0000;

fn sd(opcode: u32) -> usize {
    (((opcode >> 12) & 0xF) << 1 | (opcode >> 22) & 1) as usize
}

fn sn(opcode: u32) -> usize {
    (((opcode >> 16) & 0xF) << 1 | (opcode >> 7) & 1) as usize
}

fn sm(opcode: u32) -> usize {
    ((opcode & 0xF) << 1 | (opcode >> 5) & 1) as usize
}

fn dd(opcode: u32) -> usize {
    ((opcode >> 12) & 0xF | (opcode >> 18) & 0x10) as usize
}

fn dn(opcode: u32) -> usize {
    ((opcode >> 16) & 0xF | (opcode >> 3) & 0x10) as usize
}

fn dm(opcode: u32) -> usize {
    (opcode & 0xF | (opcode >> 1) & 0x10) as usize
}

fn set_fpscr_nzcv(cpu: &mut Cpu, flags: u32) {
    cpu.vfp.fpscr = (cpu.vfp.fpscr & !(FPSCR_N | FPSCR_Z | FPSCR_C | FPSCR_V)) | flags;
}

fn compare_f64(cpu: &mut Cpu, op1: f64, op2: f64) {
    let flags = if op1.is_nan() || op2.is_nan() {
        FPSCR_C | FPSCR_V
    } else if op1 < op2 {
        FPSCR_N
    } else if op1 == op2 {
        FPSCR_Z | FPSCR_C
    } else {
        FPSCR_C
    };
    set_fpscr_nzcv(cpu, flags);
}

/// VFPExpandImm for an 8-bit modified immediate.
fn expand_imm32(imm8: u32) -> u32 {
    let sign = (imm8 >> 7) & 1;
    let exp = if imm8 & 0x40 != 0 { 0x7C | (imm8 >> 4) & 3 } else { 0x80 | (imm8 >> 4) & 3 };
    let frac = imm8 & 0xF;
    sign << 31 | exp << 23 | frac << 19
}

fn expand_imm64(imm8: u32) -> u64 {
    let sign = ((imm8 >> 7) & 1) as u64;
    let exp = if imm8 & 0x40 != 0 { 0x3FC | ((imm8 >> 4) & 3) as u64 } else { 0x400 | ((imm8 >> 4) & 3) as u64 };
    let frac = (imm8 & 0xF) as u64;
    sign << 63 | exp << 52 | frac << 48
}

/// Single-precision data processing.
pub fn cp10_cdp(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let d = sd(opcode);
    let main = (opcode >> 20) & 0xB;
    let sub = opcode & 0x0040 != 0; // opc3 bit

    if main != 0xB {
        let vn = cpu.vfp.s(sn(opcode));
        let vm = cpu.vfp.s(sm(opcode));
        let vd = cpu.vfp.s(d);
        let result = match main {
            0x0 => {
                if !sub { vd + vn * vm } else { vd - vn * vm } // vmla/vmls
            }
            0x1 => {
                if !sub { -(vd - vn * vm) } else { -(vd + vn * vm) } // vnmls/vnmla
            }
            0x2 => {
                if !sub { vn * vm } else { -(vn * vm) } // vmul/vnmul
            }
            0x3 => {
                if !sub { vn + vm } else { vn - vm } // vadd/vsub
            }
            0x8 => {
                if !sub { vn / vm } else { return Err(Exception::Undefined) } // vdiv
            }
            _ => return Err(Exception::Undefined),
        };
        cpu.vfp.set_s(d, result);
        return Ok(());
    }

    // extension space: bits 19:16 select the operation
    if opcode & 0x0040 == 0 {
        // vmov immediate
        let imm8 = ((opcode >> 12) & 0xF0) | (opcode & 0xF);
        cpu.vfp.set_s_bits(d, expand_imm32(imm8));
        return Ok(());
    }
    match (opcode >> 16) & 0xF {
        0x0 => {
            // vmov / vabs
            let vm = cpu.vfp.s(sm(opcode));
            let result = if opcode & 0x0080 != 0 { vm.abs() } else { vm };
            cpu.vfp.set_s(d, result);
        }
        0x1 => {
            // vneg / vsqrt
            let vm = cpu.vfp.s(sm(opcode));
            let result = if opcode & 0x0080 != 0 { vm.sqrt() } else { -vm };
            cpu.vfp.set_s(d, result);
        }
        0x4 | 0x5 => {
            // vcmp / vcmp #0.0
            let vd = cpu.vfp.s(d) as f64;
            let vm = if (opcode >> 16) & 1 != 0 { 0.0 } else { cpu.vfp.s(sm(opcode)) as f64 };
            compare_f64(cpu, vd, vm);
        }
        0x7 => {
            // vcvt single to double
            let vm = cpu.vfp.s(sm(opcode));
            cpu.vfp.set_d(dd(opcode), vm as f64);
        }
        0x8 => {
            // vcvt from integer (bit 7: signed)
            let bits = cpu.vfp.s_bits(sm(opcode));
            let result = if opcode & 0x0080 != 0 {
                bits as i32 as f32
            } else {
                bits as f32
            };
            cpu.vfp.set_s(d, result);
        }
        0xC | 0xD => {
            // vcvt to unsigned/signed integer
            let vm = cpu.vfp.s(sm(opcode));
            let bits = if (opcode >> 16) & 1 != 0 {
                vm as i32 as u32
            } else {
                vm as u32
            };
            cpu.vfp.set_s_bits(d, bits);
        }
        _ => return Err(Exception::Undefined),
    }
    Ok(())
}

/// Double-precision data processing.
pub fn cp11_cdp(cpu: &mut Cpu, opcode: u32) -> ExecResult {
    let d = dd(opcode);
    let main = (opcode >> 20) & 0xB;
    let sub = opcode & 0x0040 != 0;

    if main != 0xB {
        let vn = cpu.vfp.d(dn(opcode));
        let vm = cpu.vfp.d(dm(opcode));
        let vd = cpu.vfp.d(d);
        let result = match main {
            0x0 => if !sub { vd + vn * vm } else { vd - vn * vm },
            0x1 => if !sub { -(vd - vn * vm) } else { -(vd + vn * vm) },
            0x2 => if !sub { vn * vm } else { -(vn * vm) },
            0x3 => if !sub { vn + vm } else { vn - vm },
            0x8 => {
                if !sub { vn / vm } else { return Err(Exception::Undefined) }
            }
            _ => return Err(Exception::Undefined),
        };
        cpu.vfp.set_d(d, result);
        return Ok(());
    }

    if opcode & 0x0040 == 0 {
        let imm8 = ((opcode >> 12) & 0xF0) | (opcode & 0xF);
        cpu.vfp.set_d_bits(d, expand_imm64(imm8));
        return Ok(());
    }
    match (opcode >> 16) & 0xF {
        0x0 => {
            let vm = cpu.vfp.d(dm(opcode));
            let result = if opcode & 0x0080 != 0 { vm.abs() } else { vm };
            cpu.vfp.set_d(d, result);
        }
        0x1 => {
            let vm = cpu.vfp.d(dm(opcode));
            let result = if opcode & 0x0080 != 0 { vm.sqrt() } else { -vm };
            cpu.vfp.set_d(d, result);
        }
        0x4 | 0x5 => {
            let vd = cpu.vfp.d(d);
            let vm = if (opcode >> 16) & 1 != 0 { 0.0 } else { cpu.vfp.d(dm(opcode)) };
            compare_f64(cpu, vd, vm);
        }
        0x7 => {
            // vcvt double to single
            let vm = cpu.vfp.d(dm(opcode));
            cpu.vfp.set_s(sd(opcode), vm as f32);
        }
        0x8 => {
            let bits = cpu.vfp.s_bits(sm(opcode));
            let result = if opcode & 0x0080 != 0 { bits as i32 as f64 } else { bits as f64 };
            cpu.vfp.set_d(d, result);
        }
        0xC | 0xD => {
            let vm = cpu.vfp.d(dm(opcode));
            let bits = if (opcode >> 16) & 1 != 0 { vm as i32 as u32 } else { vm as u32 };
            cpu.vfp.set_s_bits(sd(opcode), bits);
        }
        _ => return Err(Exception::Undefined),
    }
    Ok(())
}

/// VLDR/VSTR/VLDM/VSTM on the single-precision views.
pub fn cp10_ldc_stc(cpu: &mut Cpu, opcode: u32, address: u32) -> ExecResult {
    let load = opcode & 0x0010_0000 != 0;
    let single_transfer = opcode & 0x0100_0000 != 0 && opcode & 0x0020_0000 == 0;
    let start = sd(opcode);
    let count = if single_transfer { 1 } else { (opcode & 0xFF) as usize };
    let mut address = address;
    for i in 0..count {
        let reg = (start + i) & 0x1F;
        if load {
            let bits = cpu.a32_read32(address, false)?;
            cpu.vfp.set_s_bits(reg, bits);
        } else {
            let bits = cpu.vfp.s_bits(reg);
            cpu.a32_write32(address, bits, false)?;
        }
        address = address.wrapping_add(4);
    }
    Ok(())
}

/// VLDR/VSTR/VLDM/VSTM on the double-precision views.
pub fn cp11_ldc_stc(cpu: &mut Cpu, opcode: u32, address: u32) -> ExecResult {
    let load = opcode & 0x0010_0000 != 0;
    let single_transfer = opcode & 0x0100_0000 != 0 && opcode & 0x0020_0000 == 0;
    let start = dd(opcode);
    let count = if single_transfer { 1 } else { ((opcode & 0xFF) as usize) / 2 };
    let mut address = address;
    for i in 0..count {
        let reg = (start + i) & 0x1F;
        if load {
            let bits = cpu.a32_read64(address, false)?;
            cpu.vfp.set_d_bits(reg, bits);
        } else {
            let bits = cpu.vfp.d_bits(reg);
            cpu.a32_write64(address, bits, false)?;
        }
        address = address.wrapping_add(8);
    }
    Ok(())
}

/// GPR to single-precision register, and VMSR.
pub fn cp10_mcr(cpu: &mut Cpu, opcode: u32, value: u32) -> ExecResult {
    match (opcode >> 21) & 7 {
        0 => {
            cpu.vfp.set_s_bits(sn(opcode), value);
            Ok(())
        }
        7 => {
            match (opcode >> 16) & 0xF {
                0x0 => cpu.vfp.fpsid = value,
                0x1 => cpu.vfp.fpscr = value,
                0x8 => cpu.vfp.fpexc = value,
                _ => return Err(Exception::Undefined),
            }
            Ok(())
        }
        _ => Err(Exception::Undefined),
    }
}

/// Single-precision register to GPR, VMRS (R15 targets the CPSR flags).
pub fn cp10_mrc(cpu: &mut Cpu, opcode: u32) -> ExecResult<u32> {
    match (opcode >> 21) & 7 {
        0 => Ok(cpu.vfp.s_bits(sn(opcode))),
        7 => match (opcode >> 16) & 0xF {
            0x0 => Ok(cpu.vfp.fpsid),
            0x1 => Ok(cpu.vfp.fpscr),
            0x8 => Ok(cpu.vfp.fpexc),
            _ => Err(Exception::Undefined),
        },
        _ => Err(Exception::Undefined),
    }
}

/// GPR to one 32-bit lane of a double register.
pub fn cp11_mcr(cpu: &mut Cpu, opcode: u32, value: u32) -> ExecResult {
    let d = dn(opcode);
    let index = (opcode >> 21) & 1;
    let old = cpu.vfp.d_bits(d);
    let new = if index == 0 {
        (old & 0xFFFF_FFFF_0000_0000) | value as u64
    } else {
        (old & 0x0000_0000_FFFF_FFFF) | (value as u64) << 32
    };
    cpu.vfp.set_d_bits(d, new);
    Ok(())
}

pub fn cp11_mrc(cpu: &mut Cpu, opcode: u32) -> ExecResult<u32> {
    let d = dn(opcode);
    let index = (opcode >> 21) & 1;
    let bits = cpu.vfp.d_bits(d);
    Ok(if index == 0 { bits as u32 } else { (bits >> 32) as u32 })
}

/// Two GPRs to a pair of single registers.
pub fn cp10_mcrr(cpu: &mut Cpu, opcode: u32, value1: u32, value2: u32) -> ExecResult {
    let m = sm(opcode);
    cpu.vfp.set_s_bits(m, value1);
    cpu.vfp.set_s_bits((m + 1) & 0x1F, value2);
    Ok(())
}

pub fn cp10_mrrc(cpu: &mut Cpu, opcode: u32) -> ExecResult<(u32, u32)> {
    let m = sm(opcode);
    Ok((cpu.vfp.s_bits(m), cpu.vfp.s_bits((m + 1) & 0x1F)))
}

/// Two GPRs to one double register.
pub fn cp11_mcrr(cpu: &mut Cpu, opcode: u32, value1: u32, value2: u32) -> ExecResult {
    let m = dm(opcode);
    cpu.vfp.set_d_bits(m, (value2 as u64) << 32 | value1 as u64);
    Ok(())
}

pub fn cp11_mrrc(cpu: &mut Cpu, opcode: u32) -> ExecResult<(u32, u32)> {
    let bits = cpu.vfp.d_bits(dm(opcode));
    Ok((bits as u32, (bits >> 32) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_features, Configuration, Features, FpVersion, IsaSet, Version};
    use crate::testutil::TestRam;

    fn vfp_cpu() -> Cpu {
        let config = Configuration {
            version: Version::V7,
            features: default_features(Version::V7) | Features::VFP | Features::DREG,
            fp_version: Some(FpVersion::Vfpv3),
            ..Configuration::default()
        };
        let mut cpu = Cpu::new(
            config,
            IsaSet::ARM32 | IsaSet::THUMB,
            Box::new(TestRam::new(0x1000)),
        );
        cpu.set_isa(crate::config::Isa::Arm32);
        cpu
    }

    #[test]
    fn test_vadd_single() {
        let mut cpu = vfp_cpu();
        cpu.vfp.set_s(1, 1.5);
        cpu.vfp.set_s(2, 2.25);
        // vadd.f32 s0, s1, s2: main op 0x3, Sn=1 -> n=0 N=1, Sm=2 -> m=1 M=0
        let opcode = 0x0E30_0A80 | (0 << 16) | (1 << 7) | 1;
        cp10_cdp(&mut cpu, opcode).unwrap();
        assert_eq!(cpu.vfp.s(0), 3.75);
    }

    #[test]
    fn test_format_bits_track_width() {
        let mut cpu = vfp_cpu();
        cpu.vfp.set_d(3, 1.0);
        assert_ne!(cpu.vfp.format_bits & (1 << 3), 0);
        cpu.vfp.set_s(6, 2.0); // lane of d3
        assert_eq!(cpu.vfp.format_bits & (1 << 3), 0);
    }

    #[test]
    fn test_vcmp_equal_sets_zc() {
        let mut cpu = vfp_cpu();
        cpu.vfp.set_d(0, 4.0);
        cpu.vfp.set_d(1, 4.0);
        // vcmp.f64 d0, d1: extension op 4
        let opcode = 0x0EB4_0B40 | 1;
        cp11_cdp(&mut cpu, opcode).unwrap();
        assert_ne!(cpu.vfp.fpscr & FPSCR_Z, 0);
        assert_ne!(cpu.vfp.fpscr & FPSCR_C, 0);
        assert_eq!(cpu.vfp.fpscr & FPSCR_N, 0);
    }

    #[test]
    fn test_vmov_pair_round_trip() {
        let mut cpu = vfp_cpu();
        cp11_mcrr(&mut cpu, 5, 0xDEAD_BEEF, 0x0123_4567).unwrap();
        assert_eq!(cpu.vfp.d_bits(5), 0x0123_4567_DEAD_BEEF);
        let (low, high) = cp11_mrrc(&mut cpu, 5).unwrap();
        assert_eq!(low, 0xDEAD_BEEF);
        assert_eq!(high, 0x0123_4567);
    }

    #[test]
    fn test_vmrs_fpscr() {
        let mut cpu = vfp_cpu();
        // vmsr fpscr, rt / vmrs rt, fpscr use opc1 = 7, crn = 1
        cp10_mcr(&mut cpu, 0x0EE1_0A10, 0x8000_0000).unwrap();
        assert_eq!(cp10_mrc(&mut cpu, 0x0EF1_0A10).unwrap(), 0x8000_0000);
    }

    #[test]
    fn test_vfp_expand_imm() {
        // 0x70 encodes 1.0
        assert_eq!(f32::from_bits(expand_imm32(0x70)), 1.0);
        assert_eq!(f64::from_bits(expand_imm64(0x70)), 1.0);
        // 0xF0 encodes -1.0
        assert_eq!(f32::from_bits(expand_imm32(0xF0)), -1.0);
    }
}
