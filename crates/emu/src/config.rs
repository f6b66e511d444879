//! Architecture configuration and ISA negotiation
//!
//! Resolves a user request (architecture version, optional forced ISA,
//! feature options) into a coherent, immutable configuration: every
//! supported instruction set, the feature word, the floating-point
//! coprocessor generation and the Thumb/Jazelle implementation levels.

use bitflags::bitflags;

/// Architecture version, 26-bit: V1/V2, 32-bit: V3 to V7, 64-bit: V8 or above
/// (unless only 32-bit mode is supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V1 = 1, // ARMv1 (1985)
    V2,     // ARMv2 (1986): ARM2aS, ARM250, ARM3
    V3,     // ARMv3 (1993): ARM6, ARM7
    V4,     // ARMv4 (1994): ARM8, ARM7T, SecurCore
    V5,     // ARMv5 (1999): ARM9E, ARM10E, ARM7EJ
    V6,     // ARMv6 (2002): ARM11, Cortex-M
    V7,     // ARMv7 (2005): Cortex-M/R/A
    V8,     // ARMv8 (2011): Cortex-A/X, Neoverse
    V8_1,
    V8_2,
    V8_3,
    V9,     // ARMv9 (2021)
}

/// Floating point coprocessor generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FpVersion {
    Vfpv1 = 1, // Vector Floating Point, for ARM10 (v5TE)
    Vfpv2,     // for v5TE and later
    Vfpv3,     // also SIMDv1, for v7 and later
    Vfpv4,     // also SIMDv2, for v7 and later
    Vfpv5,     // for v7VE-M and v8-R
    V8Fp,      // ARMv8 floating point
}

/// Instruction set emulation.
///
/// (Note that naming them after AArch26/AArch32/AArch64 would be a misnomer:
/// those are execution states, not instruction sets.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Isa {
    /// Original 26-bit instruction set, introduced with ARMv1, removed in ARMv4.
    Arm26 = 1,
    /// 32-bit extension, identical instruction format, introduced with ARMv3.
    Arm32,
    /// Compressed Thumb and Thumb-2 sets, introduced in ARMv4 and ARMv6T2.
    Thumb,
    /// Java bytecode, introduced in ARMv5.
    Jazelle,
    /// ThumbEE, variant of Thumb, introduced in ARMv7.
    ThumbEe,
    /// 64-bit extension, introduced with ARMv8.
    Arm64,
}

impl Isa {
    pub const ALL: [Isa; 6] = [
        Isa::Arm26,
        Isa::Arm32,
        Isa::Thumb,
        Isa::Jazelle,
        Isa::ThumbEe,
        Isa::Arm64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Isa::Arm26 => "ARM26",
            Isa::Arm32 => "ARM32",
            Isa::Thumb => "Thumb",
            Isa::Jazelle => "Java",
            Isa::ThumbEe => "ThumbEE",
            Isa::Arm64 => "ARM64",
        }
    }
}

bitflags! {
    /// A set of instruction sets, one bit per [`Isa`] discriminant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IsaSet: u16 {
        const ARM26   = 1 << 1;
        const ARM32   = 1 << 2;
        const THUMB   = 1 << 3;
        const JAZELLE = 1 << 4;
        const THUMBEE = 1 << 5;
        const ARM64   = 1 << 6;
    }
}

impl IsaSet {
    pub fn of(isa: Isa) -> IsaSet {
        IsaSet::from_bits_truncate(1 << isa as u16)
    }

    pub fn has(self, isa: Isa) -> bool {
        self.contains(IsaSet::of(isa))
    }
}

/// Assembly syntax flavour, relevant for disassembly only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Pre-UAL "divided" syntax (swi, stmfd, fp register names).
    Divided,
    /// Unified Assembler Language, ARMv7 and later.
    Unified,
}

/// Java bytecode support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JazelleLevel {
    /// No bytecode is recognized.
    None = 0,
    /// All bytecodes are trapped to the software handler table.
    Trivial = 1,
    /// The subset implemented by v5TEJ hardware is executed directly.
    Jazelle = 2,
    /// All JVM instructions (parsing only).
    Jvm = 3,
    /// JVM plus picoJava instructions (parsing only).
    PicoJava = 4,
    /// JVM/picoJava plus custom interworking extensions, also for emulation.
    /// This extension was never implemented in real hardware.
    Extension = 5,
}

/// Thumb support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThumbLevel {
    None = 0,
    Thumb1 = 1,
    Thumb2 = 3,
}

/// Whether a Thumb request insists on, rules out, or permits Thumb-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thumb2Support {
    Permitted,
    Excluded,
    Expected,
}

/// Processor profile. "Classic" is the pre-profile setting, treated the same
/// as the A profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Classic,
    A,
    R,
    M,
}

bitflags! {
    /// Architecture feature set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Features: u32 {
        const SWP            = 1 << 0;  // 2a, 3+
        const ARM26          = 1 << 1;  // 1, 2, 3 but not 3G
        const ARM32          = 1 << 2;  // 3+
        const MULL           = 1 << 3;  // 3M, 4+ but not xM variants
        const THUMB          = 1 << 4;  // 4T+, 6+
        const ENH_DSP        = 1 << 5;  // 5TE(xP), 5TEJ, 6+
        const DSP_PAIR       = 1 << 6;  // 5TE but not 5TExP, 6+
        const JAZELLE        = 1 << 7;  // 5TEJ, 6+; BXJ instruction
        const MULTIPROC      = 1 << 8;  // 6K, 7+
        const THUMB2         = 1 << 9;  // 6T2, 7+
        const SECURITY       = 1 << 10; // 6Z, 6KZ, 7 + Security Extensions
        const VIRTUALIZATION = 1 << 11; // 7VE, 8+ (optional)
        const ARM64          = 1 << 12; // 8-A
        const CRYPTOGRAPHY   = 1 << 13;
        const FPA            = 1 << 14; // Floating Point Accelerator (1989)
        const VFP            = 1 << 15; // 32-bit floating point support
        const DREG           = 1 << 16; // VFP D registers
        const DREG32         = 1 << 17; // 32 D registers instead of 16
        const FP16           = 1 << 18; // 16-bit floating point support
        const SIMD           = 1 << 19; // Advanced SIMD (Neon)
        const MVE            = 1 << 20; // M-profile vector extension (Helium)
    }
}

/// Common set of information for emulation and disassembly.
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub version: Version,
    pub fp_version: Option<FpVersion>,
    pub features: Features,
    pub profile: Profile,
    pub thumb: ThumbLevel,
    pub jazelle: Option<JazelleLevel>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            version: Version::V7,
            fp_version: None,
            features: Features::empty(),
            profile: Profile::Classic,
            thumb: ThumbLevel::None,
            jazelle: None,
        }
    }
}

impl Configuration {
    /// Whether the VFP register bank exists in this configuration.
    pub fn has_vfp_registers(&self) -> bool {
        self.features
            .intersects(Features::VFP | Features::SIMD | Features::MVE)
    }
}

/// Feature words ORed in for each architecture version.
pub fn default_features(version: Version) -> Features {
    let v3 = Features::ARM26.union(Features::SWP).union(Features::ARM32);
    let v4 = Features::SWP.union(Features::ARM32).union(Features::MULL);
    let v6 = v4
        .union(Features::THUMB)
        .union(Features::ENH_DSP)
        .union(Features::DSP_PAIR)
        .union(Features::JAZELLE);
    let v7 = v6.union(Features::THUMB2);
    let v8 = v7
        .union(Features::MULTIPROC)
        .union(Features::SECURITY)
        .union(Features::VIRTUALIZATION)
        .union(Features::ARM64);
    match version {
        Version::V1 | Version::V2 => Features::ARM26,
        // 26-bit compatibility is opt-in from v3 on
        Version::V3 => v3.difference(Features::ARM26),
        Version::V4 | Version::V5 => v4.difference(Features::MULL),
        Version::V6 => v6,
        Version::V7 => v7,
        _ => v8,
    }
}

/// Resolve a partial configuration into a coherent one.
///
/// `isa` is the requested default instruction set (None picks one from the
/// version); `version_requested` tells whether the version came from the user
/// (an explicit request that conflicts with the ISA is warned about and
/// rounded) or is still the `Default` placeholder.
pub fn resolve(
    cfg: &mut Configuration,
    isa: &mut Option<Isa>,
    syntax: &mut Option<Syntax>,
    version_requested: bool,
    mut thumb2: Thumb2Support,
    force_32bit: bool,
) {
    if isa.is_none() {
        if !version_requested {
            // ARMv7 supports the most instruction sets (ARM, Thumb, Jazelle, ThumbEE)
            cfg.version = Version::V7;
        }
        *isa = Some(match cfg.version {
            // these versions only support 26-bit
            Version::V1 | Version::V2 => Isa::Arm26,
            // these normally run in 32-bit, ARMv3 included
            Version::V3 | Version::V4 | Version::V5 | Version::V6 | Version::V7 => Isa::Arm32,
            // unless 32-bit is specifically requested, use 64-bit
            _ => {
                if force_32bit {
                    Isa::Arm32
                } else {
                    Isa::Arm64
                }
            }
        });
    } else {
        match isa.unwrap() {
            Isa::Arm26 => {
                // ARMv1, ARMv2 and ARMv3 support 26-bit mode
                if !version_requested {
                    cfg.version = Version::V3;
                } else if cfg.version > Version::V3 {
                    log::warn!("ARM26 not supported from ARMv4 on");
                    cfg.version = Version::V3;
                }
                cfg.features |= Features::ARM26;
            }
            Isa::Arm32 => {
                if !version_requested {
                    cfg.version = Version::V7;
                } else if cfg.version < Version::V3 {
                    log::warn!("ARM32 not supported before ARMv3");
                    cfg.version = Version::V3;
                }
                cfg.features |= Features::ARM32;
            }
            Isa::Thumb => {
                if !version_requested {
                    cfg.version = if thumb2 == Thumb2Support::Excluded {
                        Version::V6
                    } else {
                        Version::V7
                    };
                } else if thumb2 == Thumb2Support::Expected && cfg.version < Version::V6 {
                    log::warn!("Thumb-2 not supported before ARMv6");
                    cfg.version = Version::V6;
                } else if thumb2 == Thumb2Support::Excluded && cfg.version >= Version::V7 {
                    log::warn!("Adding support for Thumb-2");
                    thumb2 = Thumb2Support::Expected;
                } else if cfg.version < Version::V4 {
                    log::warn!("Thumb not supported before ARMv4");
                    cfg.version = Version::V4;
                }
                cfg.features |= Features::THUMB;
                if thumb2 == Thumb2Support::Expected {
                    cfg.features |= Features::THUMB2;
                }
            }
            Isa::Jazelle => {
                // Jazelle is supported in ARMv5TEJ, ARMv6 and ARMv7
                if !version_requested {
                    cfg.version = Version::V6;
                } else if cfg.version < Version::V5 {
                    log::warn!("Jazelle not supported before ARMv5");
                    cfg.version = Version::V5;
                }
                cfg.features |= Features::JAZELLE;
            }
            Isa::ThumbEe => {
                // only ARMv7 supports ThumbEE
                if cfg.version != Version::V7 {
                    if version_requested {
                        log::warn!(
                            "ThumbEE not supported {} ARMv7",
                            if cfg.version < Version::V7 { "before" } else { "after" }
                        );
                    }
                    cfg.version = Version::V7;
                }
            }
            Isa::Arm64 => {
                if !version_requested {
                    cfg.version = Version::V8;
                } else if cfg.version < Version::V8 {
                    log::warn!("AArch64 not supported before ARMv8");
                    cfg.version = Version::V8;
                }
            }
        }
    }

    if syntax.is_none() {
        *syntax = Some(if cfg.version < Version::V7 {
            Syntax::Divided
        } else {
            Syntax::Unified
        });
    }

    cfg.features |= default_features(cfg.version);

    // select a default floating-point coprocessor
    if cfg.fp_version.is_none() && cfg.features.intersects(Features::VFP | Features::SIMD) {
        let need_fp = cfg.features.contains(Features::VFP);
        let need_simd = cfg.features.contains(Features::SIMD);
        match cfg.version {
            Version::V1 => {
                log::warn!("No floating point support for selected architecture");
                cfg.features &= !(Features::VFP | Features::SIMD);
            }
            Version::V2 | Version::V3 | Version::V4 => {
                // FPA only, through emulation
                if need_simd {
                    log::warn!("No SIMD support for selected architecture");
                    cfg.features &= !Features::SIMD;
                }
                if need_fp {
                    cfg.features &= !Features::VFP;
                    cfg.features |= Features::FPA;
                }
            }
            Version::V5 | Version::V6 => {
                if need_simd {
                    log::warn!("No SIMD support for selected architecture");
                    cfg.features &= !Features::SIMD;
                }
                if need_fp {
                    cfg.fp_version = Some(FpVersion::Vfpv2);
                }
            }
            Version::V7 => {
                cfg.fp_version = Some(if cfg.profile == Profile::M {
                    FpVersion::Vfpv5
                } else if !cfg.features.contains(Features::VIRTUALIZATION) {
                    FpVersion::Vfpv3
                } else {
                    FpVersion::Vfpv4
                });
            }
            _ => cfg.fp_version = Some(FpVersion::V8Fp),
        }
    }
}

/// Part numbers, as reported through the MIDR.
pub mod part {
    // no MIDR
    pub const ARM1: u16 = 0x0100;
    pub const ARM2: u16 = 0x0200;
    pub const ARM250: u16 = 0x0250;

    // pre-ARM8 layout
    pub const ARM3: u16 = 0x0300;
    pub const ARM600: u16 = 0x0600;
    pub const ARM610: u16 = 0x0610;
    pub const ARM620: u16 = 0x0620;
    pub const ARM710: u16 = 0x7100;
    pub const ARM720: u16 = 0x7200;

    // ARM8 and later
    pub const ARM810: u16 = 0x8100;
    pub const ARM920: u16 = 0x9200;
    pub const ARM922: u16 = 0x9220;
    pub const ARM926: u16 = 0x9260;
    pub const ARM940: u16 = 0x9400;
    pub const ARM946: u16 = 0x9460;
    pub const ARM966: u16 = 0x9660;
    pub const ARM968: u16 = 0x9680;
    pub const ARM996: u16 = 0x9960;
    pub const ARM1020: u16 = 0xA200;
    pub const ARM1022: u16 = 0xA220;
    pub const ARM1026: u16 = 0xA260;
    pub const ARM11MPCORE: u16 = 0xB020;
    pub const ARM1136: u16 = 0xB360;
    pub const ARM1156: u16 = 0xB560;
    pub const ARM1176: u16 = 0xB760;
    pub const CORTEX_A17: u16 = 0xC0E0;
    pub const CORTEX_R4: u16 = 0xC140;
    pub const CORTEX_R52: u16 = 0xD130;
    pub const CORTEX_M0: u16 = 0xC200;
    pub const CORTEX_M3: u16 = 0xC230;
    pub const CORTEX_M33: u16 = 0xD210;
    pub const CORTEX_A32: u16 = 0xD010;
    pub const CORTEX_A53: u16 = 0xD030;
}

/// Implementer codes, as reported through the MIDR.
pub mod vendor {
    pub const ARM: u8 = b'A';
    pub const BROADCOM: u8 = b'B';
    pub const CAVIUM: u8 = b'C';
    pub const DEC: u8 = b'D';
    pub const INFINEON: u8 = b'I';
    pub const MOTOROLA: u8 = b'M';
    pub const NVIDIA: u8 = b'N';
    pub const QUALCOMM: u8 = b'Q';
    pub const MARVELL: u8 = b'V';
    pub const INTEL: u8 = b'i';

    // manufacturer for pre-ARM6 parts only
    pub const MANUFACTURER_VLSI: u8 = b'V';
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(isa: Option<Isa>) -> (Configuration, Isa) {
        let mut cfg = Configuration::default();
        let mut isa = isa;
        let mut syntax = None;
        resolve(&mut cfg, &mut isa, &mut syntax, false, Thumb2Support::Permitted, false);
        (cfg, isa.unwrap())
    }

    #[test]
    fn test_default_isa_is_arm32_on_v7() {
        let (cfg, isa) = resolved(None);
        assert_eq!(cfg.version, Version::V7);
        assert_eq!(isa, Isa::Arm32);
        assert!(cfg.features.contains(Features::THUMB2));
    }

    #[test]
    fn test_arm26_rounds_version_down() {
        let mut cfg = Configuration {
            version: Version::V5,
            ..Configuration::default()
        };
        let mut isa = Some(Isa::Arm26);
        let mut syntax = None;
        resolve(&mut cfg, &mut isa, &mut syntax, true, Thumb2Support::Permitted, false);
        assert_eq!(cfg.version, Version::V3);
        assert!(cfg.features.contains(Features::ARM26));
    }

    #[test]
    fn test_thumbee_pins_v7() {
        let (cfg, isa) = resolved(Some(Isa::ThumbEe));
        assert_eq!(cfg.version, Version::V7);
        assert_eq!(isa, Isa::ThumbEe);
    }

    #[test]
    fn test_default_fp_selection() {
        let mut cfg = Configuration {
            version: Version::V5,
            features: Features::VFP,
            ..Configuration::default()
        };
        let mut isa = Some(Isa::Arm32);
        let mut syntax = None;
        resolve(&mut cfg, &mut isa, &mut syntax, true, Thumb2Support::Permitted, false);
        assert_eq!(cfg.fp_version, Some(FpVersion::Vfpv2));

        let mut cfg = Configuration {
            version: Version::V4,
            features: Features::VFP,
            ..Configuration::default()
        };
        resolve(&mut cfg, &mut Some(Isa::Arm32), &mut None, true, Thumb2Support::Permitted, false);
        assert!(cfg.features.contains(Features::FPA));
        assert!(!cfg.features.contains(Features::VFP));
    }

    #[test]
    fn test_divided_syntax_before_v7() {
        let mut cfg = Configuration {
            version: Version::V5,
            ..Configuration::default()
        };
        let mut isa = Some(Isa::Arm32);
        let mut syntax = None;
        resolve(&mut cfg, &mut isa, &mut syntax, true, Thumb2Support::Permitted, false);
        assert_eq!(syntax, Some(Syntax::Divided));
    }
}
