//! armrun: ARM family emulator and disassembler front end
//!
//! Loads a flat image, an ELF executable or a Java class file, then either
//! disassembles it or runs it on the emulation core, servicing the
//! captured traps (system calls, simulated JVM instructions) and printing
//! a state diff per step when tracing is on.

mod class;
mod debug;
mod dis;
mod elf;
mod jvm;
mod linux;
mod loader;
mod memory;

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use armemu::config::{part, vendor, Features, FpVersion, Isa, IsaSet, JazelleLevel, Thumb2Support, Version};
use armemu::cpu::reg;
use armemu::exec::jazelle::{JAOLR_ELEMENT_OFF_SHIFT, JAOLR_LENGTH_OFF_SHIFT, JAOLR_LENGTH_SUB,
    JAOLR_LENSHIFT_SHIFT, JOSCR_FLAT_ARRAY};
use armemu::{Cpu, EmuResult, Endian, Syntax};

use crate::dis::{CodeSource, Disassembler};
use crate::linux::SyscallOutcome;
use crate::loader::{EndianChoice, Environment, Purpose};

struct CpuName {
    name: &'static str,
    version: Version,
    part_number: u16,
    isas: IsaSet,
    features: Features,
}

fn v1_features() -> Features {
    Features::ARM26
}

fn v3_features() -> Features {
    Features::ARM26 | Features::SWP | Features::ARM32
}

fn v4_features() -> Features {
    Features::SWP | Features::ARM32 | Features::MULL
}

fn v6_features() -> Features {
    v4_features() | Features::THUMB | Features::ENH_DSP | Features::DSP_PAIR | Features::JAZELLE
}

fn v7_features() -> Features {
    v6_features() | Features::THUMB2
}

fn v8_features() -> Features {
    v7_features() | Features::MULTIPROC | Features::SECURITY | Features::VIRTUALIZATION | Features::ARM64
}

fn isas_v1() -> IsaSet {
    IsaSet::ARM26
}

fn isas_v3() -> IsaSet {
    IsaSet::ARM26 | IsaSet::ARM32
}

fn isas_v4t() -> IsaSet {
    IsaSet::ARM32 | IsaSet::THUMB
}

fn isas_v5tej() -> IsaSet {
    isas_v4t() | IsaSet::JAZELLE
}

fn isas_v7() -> IsaSet {
    isas_v5tej() | IsaSet::THUMBEE
}

fn isas_v8() -> IsaSet {
    isas_v5tej() | IsaSet::ARM64
}

/// The `-v<name>` architecture and chip table.
fn cpu_names() -> Vec<CpuName> {
    let te = Features::THUMB | Features::ENH_DSP | Features::DSP_PAIR;
    vec![
        CpuName { name: "1", version: Version::V1, part_number: part::ARM1, isas: isas_v1(), features: v1_features() },
        CpuName { name: "2", version: Version::V2, part_number: part::ARM2, isas: isas_v1(), features: v1_features() },
        CpuName { name: "2a", version: Version::V2, part_number: part::ARM3, isas: isas_v1(), features: v1_features() | Features::SWP },
        CpuName { name: "3", version: Version::V3, part_number: part::ARM600, isas: isas_v3(), features: v3_features() },
        CpuName { name: "3m", version: Version::V3, part_number: part::ARM600, isas: isas_v3(), features: v3_features() | Features::MULL },
        CpuName { name: "3g", version: Version::V3, part_number: part::ARM600, isas: IsaSet::ARM32, features: v3_features() & !Features::ARM26 },
        CpuName { name: "4", version: Version::V4, part_number: part::ARM810, isas: IsaSet::ARM32, features: v4_features() },
        CpuName { name: "4t", version: Version::V4, part_number: part::ARM720, isas: isas_v4t(), features: v4_features() | Features::THUMB },
        CpuName { name: "5", version: Version::V5, part_number: part::ARM946, isas: IsaSet::ARM32, features: v4_features() },
        CpuName { name: "5t", version: Version::V5, part_number: part::ARM1022, isas: isas_v4t(), features: v4_features() | Features::THUMB },
        CpuName { name: "5te", version: Version::V5, part_number: part::ARM1022, isas: isas_v4t(), features: v4_features() | te },
        CpuName { name: "5texp", version: Version::V5, part_number: part::ARM1022, isas: isas_v4t(), features: v4_features() | Features::THUMB | Features::ENH_DSP },
        CpuName { name: "5tej", version: Version::V5, part_number: part::ARM1026, isas: isas_v5tej(), features: v4_features() | te | Features::JAZELLE },
        CpuName { name: "6", version: Version::V6, part_number: part::ARM1136, isas: isas_v5tej(), features: v6_features() },
        CpuName { name: "6z", version: Version::V6, part_number: part::ARM1176, isas: isas_v5tej(), features: v6_features() | Features::SECURITY },
        CpuName { name: "6k", version: Version::V6, part_number: part::ARM11MPCORE, isas: isas_v5tej(), features: v6_features() | Features::MULTIPROC },
        CpuName { name: "6kz", version: Version::V6, part_number: part::ARM11MPCORE, isas: isas_v5tej(), features: v6_features() | Features::MULTIPROC | Features::SECURITY },
        CpuName { name: "6t2", version: Version::V6, part_number: part::ARM1156, isas: isas_v5tej(), features: v6_features() | Features::THUMB2 },
        CpuName { name: "7", version: Version::V7, part_number: part::CORTEX_A17, isas: isas_v7(), features: v7_features() },
        CpuName { name: "7-a", version: Version::V7, part_number: part::CORTEX_A17, isas: isas_v7(), features: v7_features() },
        CpuName { name: "7-r", version: Version::V7, part_number: part::CORTEX_R4, isas: isas_v7(), features: v7_features() },
        CpuName { name: "7ve", version: Version::V7, part_number: part::CORTEX_A17, isas: isas_v7(), features: v7_features() | Features::VIRTUALIZATION },
        CpuName { name: "8", version: Version::V8, part_number: part::CORTEX_A32, isas: isas_v8(), features: v8_features() },
        CpuName { name: "8-a", version: Version::V8, part_number: part::CORTEX_A32, isas: isas_v8(), features: v8_features() },
        // rough approximations of specific chips
        CpuName { name: "arm1", version: Version::V1, part_number: part::ARM1, isas: isas_v1(), features: v1_features() },
        CpuName { name: "arm2", version: Version::V2, part_number: part::ARM2, isas: isas_v1(), features: v1_features() },
        CpuName { name: "arm250", version: Version::V2, part_number: part::ARM250, isas: isas_v1(), features: v1_features() | Features::SWP },
        CpuName { name: "arm3", version: Version::V2, part_number: part::ARM3, isas: isas_v1(), features: v1_features() | Features::SWP },
        CpuName { name: "arm600", version: Version::V3, part_number: part::ARM600, isas: isas_v3(), features: v3_features() },
        CpuName { name: "arm610", version: Version::V3, part_number: part::ARM610, isas: isas_v3(), features: v3_features() },
        CpuName { name: "arm6", version: Version::V3, part_number: part::ARM610, isas: isas_v3(), features: v3_features() },
        CpuName { name: "arm710", version: Version::V3, part_number: part::ARM710, isas: IsaSet::ARM32, features: v3_features() },
        CpuName { name: "arm7", version: Version::V3, part_number: part::ARM710, isas: IsaSet::ARM32, features: v3_features() },
        CpuName { name: "arm7tdmi", version: Version::V4, part_number: part::ARM710, isas: isas_v4t(), features: v4_features() | Features::THUMB },
        CpuName { name: "arm9", version: Version::V4, part_number: part::ARM940, isas: isas_v4t(), features: v4_features() | Features::THUMB },
        CpuName { name: "arm926ej", version: Version::V5, part_number: part::ARM926, isas: isas_v5tej(), features: v4_features() | te | Features::JAZELLE },
        CpuName { name: "arm1026ej", version: Version::V5, part_number: part::ARM1026, isas: isas_v5tej(), features: v4_features() | te | Features::JAZELLE },
        CpuName { name: "arm1136j", version: Version::V6, part_number: part::ARM1136, isas: isas_v5tej(), features: v6_features() },
        CpuName { name: "arm1156t2", version: Version::V6, part_number: part::ARM1156, isas: isas_v5tej(), features: v6_features() | Features::THUMB2 },
        CpuName { name: "arm1176jz", version: Version::V6, part_number: part::ARM1176, isas: isas_v5tej(), features: v6_features() | Features::SECURITY },
        CpuName { name: "arm11mpcore", version: Version::V6, part_number: part::ARM11MPCORE, isas: isas_v5tej(), features: v6_features() | Features::MULTIPROC | Features::SECURITY },
    ]
}

struct CpuOption {
    name: &'static str,
    features: Features,
    remove_features: Features,
    min_fp: Option<FpVersion>,
    min_java: Option<JazelleLevel>,
}

/// The `+option` suffix table.
fn cpu_options() -> Vec<CpuOption> {
    let none = CpuOption {
        name: "",
        features: Features::empty(),
        remove_features: Features::empty(),
        min_fp: None,
        min_java: None,
    };
    vec![
        CpuOption { name: "nofp", remove_features: Features::FPA | Features::VFP, ..none_clone(&none) },
        CpuOption { name: "fp", features: Features::VFP, ..none_clone(&none) },
        CpuOption { name: "fpa", features: Features::FPA, ..none_clone(&none) },
        CpuOption { name: "dp", features: Features::VFP | Features::DREG, min_fp: Some(FpVersion::Vfpv1), ..none_clone(&none) },
        CpuOption { name: "vfpv1", features: Features::VFP | Features::DREG, min_fp: Some(FpVersion::Vfpv1), ..none_clone(&none) },
        CpuOption { name: "vfpv2", features: Features::VFP | Features::DREG, min_fp: Some(FpVersion::Vfpv2), ..none_clone(&none) },
        CpuOption { name: "vfpv3", features: Features::VFP | Features::DREG | Features::DREG32, min_fp: Some(FpVersion::Vfpv3), ..none_clone(&none) },
        CpuOption { name: "vfpv3-d16", features: Features::VFP | Features::DREG, min_fp: Some(FpVersion::Vfpv3), ..none_clone(&none) },
        CpuOption { name: "vfpv3-d32", features: Features::VFP | Features::DREG | Features::DREG32, min_fp: Some(FpVersion::Vfpv3), ..none_clone(&none) },
        CpuOption { name: "vfpv4", features: Features::VFP | Features::DREG | Features::DREG32 | Features::FP16, min_fp: Some(FpVersion::Vfpv4), ..none_clone(&none) },
        CpuOption { name: "fp16", features: Features::FP16, min_fp: Some(FpVersion::Vfpv3), ..none_clone(&none) },
        CpuOption { name: "mp", features: Features::MULTIPROC, ..none_clone(&none) },
        CpuOption { name: "sec", features: Features::SECURITY, ..none_clone(&none) },
        CpuOption { name: "nosimd", remove_features: Features::SIMD, ..none_clone(&none) },
        CpuOption { name: "simd", features: Features::SIMD, ..none_clone(&none) },
        CpuOption { name: "simdv1", features: Features::SIMD, min_fp: Some(FpVersion::Vfpv3), ..none_clone(&none) },
        CpuOption { name: "simdv2", features: Features::SIMD, min_fp: Some(FpVersion::Vfpv4), ..none_clone(&none) },
        CpuOption { name: "nojava", min_java: Some(JazelleLevel::None), ..none_clone(&none) },
        CpuOption { name: "trivjava", min_java: Some(JazelleLevel::Trivial), ..none_clone(&none) },
        CpuOption { name: "java", min_java: Some(JazelleLevel::Jazelle), ..none_clone(&none) },
        CpuOption { name: "jvm", min_java: Some(JazelleLevel::Jvm), ..none_clone(&none) },
        CpuOption { name: "picojava", min_java: Some(JazelleLevel::PicoJava), ..none_clone(&none) },
        CpuOption { name: "javaext", min_java: Some(JazelleLevel::Extension), ..none_clone(&none) },
    ]
}

fn none_clone(template: &CpuOption) -> CpuOption {
    CpuOption {
        name: template.name,
        features: template.features,
        remove_features: template.remove_features,
        min_fp: template.min_fp,
        min_java: template.min_java,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    /// Only set up the CPU and entry point.
    BareCpu,
    /// Set up CPU and system calls, but no initial stack.
    Minimal,
    /// Emulate system calls and an initial stack.
    Linux,
}

fn parse_number(text: &str) -> Result<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Ok(u64::from_str_radix(hex, 16)?)
    } else {
        Ok(text.parse()?)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut env = Environment::new();
    let mut part_number: u16 = 0;
    let mut load_address: Option<u64> = None;
    let mut start_offset: u64 = 0;
    let mut run = false;
    let mut disasm = false;
    let mut run_mode = RunMode::BareCpu;
    let mut input_path: Option<String> = None;
    let mut guest_args: Vec<String> = Vec::new();

    let names = cpu_names();
    let options = cpu_options();

    let mut args = std::env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        if !arg.starts_with('-') || input_path.is_some() {
            if input_path.is_none() {
                input_path = Some(arg);
            } else {
                guest_args.push(arg);
            }
            continue;
        }
        let lower = arg.to_ascii_lowercase();
        match lower.as_str() {
            "-r" => run = true,
            "-d" => disasm = true,
            "-u" => run_mode = RunMode::Minimal,
            "-le" => env.endian = EndianChoice::Exact(Endian::Little),
            "-be8" => env.endian = EndianChoice::Exact(Endian::Big),
            "-be32" => env.endian = EndianChoice::Exact(Endian::Swapped),
            "-be" => env.endian = EndianChoice::BigVersionSpecific,
            "-a26" | "-arm26" => env.isa = Some(Isa::Arm26),
            "-a32" | "-arm32" | "-aarch32" => env.isa = Some(Isa::Arm32),
            "-t16" | "-thumb" | "-thumb32" => env.isa = Some(Isa::Thumb),
            "-t32" | "-thumb2" => {
                env.isa = Some(Isa::Thumb);
                env.thumb2 = Thumb2Support::Expected;
            }
            "-thumb1" => {
                env.isa = Some(Isa::Thumb);
                env.thumb2 = Thumb2Support::Excluded;
            }
            "-tee" | "-e32" | "-thumbee" => env.isa = Some(Isa::ThumbEe),
            "-j" | "-j32" | "-java" | "-jazelle" => env.isa = Some(Isa::Jazelle),
            "-a64" | "-arm64" | "-aarch64" | "-armv8" => env.isa = Some(Isa::Arm64),
            "-ual" | "-new" => env.syntax = Some(Syntax::Unified),
            "-old" => env.syntax = Some(Syntax::Divided),
            _ => {
                if let Some(value) = lower.strip_prefix("-l=") {
                    load_address = Some(parse_number(value)?);
                } else if let Some(value) = lower.strip_prefix("-s=") {
                    start_offset = parse_number(value)?;
                } else if let Some(selector) = lower.strip_prefix("-v") {
                    let mut parts = selector.split('+');
                    let base = parts.next().unwrap_or("");
                    let entry = names
                        .iter()
                        .find(|candidate| candidate.name == base)
                        .with_context(|| format!("Invalid option: {arg}"))?;
                    env.config.version = entry.version;
                    env.config.features = entry.features;
                    env.supported_isas = entry.isas;
                    env.version_requested = true;
                    part_number = entry.part_number;
                    for option_name in parts {
                        let option = options
                            .iter()
                            .find(|candidate| candidate.name == option_name)
                            .with_context(|| format!("Invalid option: {option_name}"))?;
                        env.config.features &= !option.remove_features;
                        env.config.features |= option.features;
                        if let Some(min_fp) = option.min_fp {
                            env.config.fp_version =
                                Some(env.config.fp_version.map_or(min_fp, |fp| fp.max(min_fp)));
                        }
                        if let Some(min_java) = option.min_java {
                            env.config.jazelle =
                                Some(env.config.jazelle.map_or(min_java, |java| java.max(min_java)));
                        }
                    }
                } else {
                    bail!("Invalid option: {arg}");
                }
            }
        }
    }

    let input_path = input_path.context("usage: armrun [options] <image> [guest args...]")?;
    let bytes = std::fs::read(&input_path)
        .with_context(|| format!("unable to open file {input_path}"))?;

    let mut memory = memory::PagedMemory::new();
    let mut class: Option<class::LoadedClass> = None;

    if load_address.is_none() && bytes.starts_with(b"\x7FELF") {
        println!("Parsing as ELF file");
        run_mode = RunMode::Linux;
        if !run && !disasm {
            run = true;
        }
        env.purpose = if run { Purpose::Load } else { Purpose::Parse };
        let loaded = elf::read_elf_file(&bytes, &mut env, &mut memory)?;
        if env.purpose == Purpose::Parse {
            disassemble_elf(&bytes, &env, &loaded.segments, &loaded.mapping_symbols);
            return Ok(());
        }
    } else if load_address.is_none() && bytes.starts_with(&[0xCA, 0xFE, 0xBA, 0xBE]) {
        println!("Parsing as Java class file");
        run_mode = RunMode::Linux;
        if !run && !disasm {
            run = true;
        }
        env.purpose = if run { Purpose::Load } else { Purpose::Parse };
        class = Some(class::read_class_file(&bytes, &mut env, &mut memory)?);
        if env.purpose == Purpose::Parse {
            let loaded = class.as_ref().unwrap();
            let syntax = env.syntax.unwrap_or(Syntax::Unified);
            println!(
                "{}",
                dis::isa_display(&env.config, Isa::Jazelle, syntax, true, env.resolved_endian())
            );
            for (label, offset, length) in &loaded.method_code {
                println!("{label}:");
                let code = bytes.get(*offset..*offset + *length).unwrap_or(&[]);
                let mut dis = Disassembler::new(
                    env.config,
                    Isa::Jazelle,
                    syntax,
                    CodeSource::Bytes { bytes: code, big_endian: false },
                );
                while (dis.pc as usize) < code.len() {
                    println!("{}", dis.parse());
                }
            }
            return Ok(());
        }
    } else {
        if !run && !disasm {
            if load_address.is_some() {
                run = true;
            } else {
                disasm = true;
            }
        }
        env.purpose = if run { Purpose::Load } else { Purpose::Parse };
        env.resolve_isa(false);
        let image = bytes.get(start_offset as usize..).unwrap_or(&[]);
        if run {
            let address = load_address.unwrap_or(0);
            env.entry = address;
            loader::write_image(&mut memory, address, image, env.code_byte_endian());
        } else {
            disassemble_flat(image, &env);
            return Ok(());
        }
    }

    // build the processor
    let isa = env.isa.unwrap_or(Isa::Arm32);
    env.supported_isas |= IsaSet::of(isa);
    let mut cpu = Cpu::new(env.config, env.supported_isas, Box::new(memory));
    cpu.part_number = part_number;
    cpu.vendor = vendor::ARM;
    cpu.set_isa(isa);

    println!(
        "{}",
        dis::isa_display(&cpu.config, cpu.current_isa(), env.syntax.unwrap_or(Syntax::Unified), disasm, env.resolved_endian())
    );

    match env.resolved_endian() {
        Endian::Little => {}
        Endian::Big => cpu.pstate.e = true, // v6+
        Endian::Swapped => cpu.sctlr_el1 |= armemu::cpu::Sctlr::B, // until v7
    }

    if run_mode != RunMode::BareCpu {
        // array layout: a length word directly before the elements
        cpu.joscr = JOSCR_FLAT_ARRAY;
        cpu.jaolr = JAOLR_LENGTH_SUB | (4 << JAOLR_LENGTH_OFF_SHIFT) | (2 << JAOLR_LENSHIFT_SHIFT);
    } else {
        // array layout: a length word, then a pointer to the elements
        cpu.joscr = 0;
        cpu.jaolr = (9 << JAOLR_ELEMENT_OFF_SHIFT) | (3 << JAOLR_LENSHIFT_SHIFT);
    }

    let mut host = linux::HostState::new(0);
    match run_mode {
        RunMode::BareCpu | RunMode::Minimal => loader::setup_bare_state(&mut cpu, &env),
        RunMode::Linux => {
            let mut full_args = vec![input_path.clone()];
            full_args.extend(guest_args.iter().cloned());
            let env_vars: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
            loader::setup_initial_state(&mut cpu, &mut env, &full_args, &env_vars);
            host.brk = env.heap_start;
        }
    }

    cpu.capture_breaks = run_mode != RunMode::BareCpu;

    run_loop(&mut cpu, &mut env, &mut host, class.as_ref(), disasm);
    Ok(())
}

fn disassemble_flat(image: &[u8], env: &Environment) {
    let isa = env.isa.unwrap_or(Isa::Arm32);
    let syntax = env.syntax.unwrap_or(Syntax::Unified);
    println!(
        "{}",
        dis::isa_display(&env.config, isa, syntax, true, env.resolved_endian())
    );
    let big_endian = env.resolved_endian() != Endian::Little;
    let mut dis = Disassembler::new(
        env.config,
        isa,
        syntax,
        CodeSource::Bytes { bytes: image, big_endian },
    );
    while (dis.pc as usize) < image.len() {
        println!("{}", dis.parse());
    }
}

fn disassemble_elf(
    bytes: &[u8],
    env: &Environment,
    segments: &[(u64, usize, usize)],
    mapping_symbols: &[elf::MappingSymbol],
) {
    let syntax = env.syntax.unwrap_or(Syntax::Unified);
    let default_isa = env.isa.unwrap_or(Isa::Arm32);
    println!(
        "{}",
        dis::isa_display(&env.config, default_isa, syntax, true, env.resolved_endian())
    );
    let big_endian = env.resolved_endian() != Endian::Little;

    for (v_address, offset, size) in segments {
        let image = match bytes.get(*offset..*offset + *size) {
            Some(image) => image,
            None => continue,
        };
        let mut isa = default_isa;
        let mut index = 0;
        let mut pc = 0u64;
        while (pc as usize) < image.len() {
            let mut switched = pc == 0;
            while index < mapping_symbols.len()
                && mapping_symbols[index].address <= v_address + pc
            {
                if let Some(next) = mapping_symbols[index].isa {
                    if next != isa {
                        switched = true;
                    }
                    isa = next;
                }
                index += 1;
            }
            if switched {
                println!("Instruction set: {}", isa.name());
            }
            let mut dis = Disassembler::new(
                env.config,
                isa,
                syntax,
                CodeSource::Bytes { bytes: image, big_endian },
            );
            dis.pc = pc;
            let line = dis.parse();
            // present addresses in the virtual space
            let advance = dis.pc - pc;
            println!("{:08X}{}", v_address + pc, line.split_once('\t').map(|(_, rest)| format!("\t{rest}")).unwrap_or_default());
            pc += advance;
        }
    }
}

/// Disassemble the instruction at the current PC without perturbing it.
fn trace_instruction(cpu: &mut Cpu, env: &Environment) {
    let pc = cpu.r[reg::PC];
    let mut dis = Disassembler::new(
        cpu.config,
        cpu.current_isa(),
        env.syntax.unwrap_or(Syntax::Unified),
        CodeSource::Cpu(cpu),
    );
    dis.pc = pc;
    let line = dis.parse();
    println!("{line}");
    cpu.r[reg::PC] = pc;
}

fn run_loop(
    cpu: &mut Cpu,
    env: &mut Environment,
    host: &mut linux::HostState,
    class: Option<&class::LoadedClass>,
    disasm: bool,
) {
    let mut debug_state = debug::capture(cpu);
    let mut loop_address: u64 = 0;
    let stdin = std::io::stdin();

    loop {
        if disasm && cpu.r[reg::PC] >= loop_address {
            loop_address = 0;

            debug_state.memory_changed_lowest = u64::MAX;
            debug_state.memory_changed_highest = 0;
            let mut stdout = std::io::stdout();
            debug::print(&mut stdout, cpu, &debug_state);

            let current_pc = cpu.r[reg::PC];
            trace_instruction(cpu, env);

            let mut line = String::new();
            if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
                // no interactive input left; free-run
                loop_address = u64::MAX;
            } else {
                let line = line.trim();
                if let Some(rest) = line.strip_prefix('g') {
                    let rest = rest.trim();
                    loop_address = if rest.is_empty() {
                        current_pc + 1
                    } else {
                        u64::from_str_radix(rest.trim_start_matches("0x"), 16)
                            .unwrap_or(current_pc + 1)
                    };
                }
            }
            debug_state = debug::capture(cpu);
        }

        cpu.step();
        match cpu.result {
            EmuResult::Ok => {}
            EmuResult::Reset => {
                println!("RESET");
                std::process::exit(0);
            }
            EmuResult::Svc => {
                if let Some(code) = service_svc(cpu, env, host, class) {
                    std::process::exit(code);
                }
            }
            EmuResult::Undefined => {
                match cpu.current_isa() {
                    Isa::Thumb | Isa::ThumbEe => {
                        let opcode = cpu.peek16(cpu.r[reg::PC].wrapping_sub(2));
                        println!("UNDEFINED 0x{opcode:04X}");
                    }
                    _ => {
                        let opcode = cpu.peek32(cpu.r[reg::PC].wrapping_sub(4));
                        println!("UNDEFINED 0x{opcode:08X}");
                    }
                }
                std::process::exit(0);
            }
            EmuResult::JazelleUndefined => {
                let outcome = match class {
                    Some(class) => {
                        jvm::simulate_instruction(cpu, env.heap_start as u32, class)
                    }
                    None => jvm::SimOutcome::Unhandled,
                };
                match outcome {
                    jvm::SimOutcome::Handled => {}
                    jvm::SimOutcome::Exit(code) => std::process::exit(code),
                    jvm::SimOutcome::Unhandled => {
                        let opcode = cpu.peek8(cpu.r[reg::PC]);
                        println!("UNDEFINED (Jazelle) {opcode:02X}");
                        std::process::exit(0);
                    }
                }
            }
            other => {
                println!("{}", other.name());
                std::process::exit(0);
            }
        }
    }
}

/// Service a captured SVC: the Linux conventions plus the SVC #1 mode
/// switch extension. Returns an exit code when the guest terminates.
fn service_svc(
    cpu: &mut Cpu,
    env: &Environment,
    host: &mut linux::HostState,
    _class: Option<&class::LoadedClass>,
) -> Option<i32> {
    let syntax = env.syntax.unwrap_or(Syntax::Unified);
    let swi_name = if syntax == Syntax::Divided { "SWI" } else { "SVC" };

    match cpu.current_isa() {
        Isa::Jazelle => match linux::j32_linux_syscall(cpu, host) {
            SyscallOutcome::Handled => None,
            SyscallOutcome::Exit(code) => Some(code),
            SyscallOutcome::Unhandled => {
                let number = armemu::exec::jazelle::peek_word(cpu, 0).unwrap_or(0);
                println!("{swi_name}");
                println!("Unknown Jazelle system call: {number}");
                Some(0)
            }
        },
        Isa::Arm64 => {
            let swi_number = (cpu.peek32(cpu.r[reg::PC].wrapping_sub(4)) >> 5) & 0xFFFF;
            if swi_number == 1 {
                linux::mode_switch_extension(cpu);
                None
            } else if swi_number != 0 {
                println!("SVC #0x{swi_number:04X}");
                Some(0)
            } else {
                match linux::a64_linux_syscall(cpu, host) {
                    SyscallOutcome::Handled => None,
                    SyscallOutcome::Exit(code) => Some(code),
                    SyscallOutcome::Unhandled => {
                        println!("SVC #0");
                        println!("Unknown 64-bit system call: {}", cpu.a64_reg64(8, true));
                        Some(0)
                    }
                }
            }
        }
        current => {
            let swi_number = match current {
                Isa::Thumb | Isa::ThumbEe => {
                    let number = (cpu.peek16(cpu.r[reg::PC].wrapping_sub(2)) & 0xFF) as u32;
                    if number > 1 {
                        // only the EABI convention is allowed from Thumb
                        println!("{swi_name} #0x{number:04X}");
                        return Some(0);
                    }
                    number
                }
                _ => cpu.peek32(cpu.r[reg::PC].wrapping_sub(4)) & 0x00FF_FFFF,
            };

            if swi_number == 1 && current != Isa::ThumbEe {
                linux::mode_switch_extension(cpu);
                None
            } else if swi_number == 0 {
                match linux::a32_linux_eabi_syscall(cpu, host) {
                    SyscallOutcome::Handled => None,
                    SyscallOutcome::Exit(code) => Some(code),
                    SyscallOutcome::Unhandled => {
                        println!("{swi_name} #0x{swi_number:06X}");
                        println!("Unknown EABI system call: {}", cpu.a32_reg(7));
                        Some(0)
                    }
                }
            } else {
                match linux::a32_linux_oabi_syscall(cpu, host, swi_number) {
                    SyscallOutcome::Handled => None,
                    SyscallOutcome::Exit(code) => Some(code),
                    SyscallOutcome::Unhandled => {
                        println!("{swi_name} #0x{swi_number:06X}");
                        if swi_number >= linux::A32_OABI_SYS_BASE {
                            println!(
                                "Unknown OABI system call: {}",
                                swi_number - linux::A32_OABI_SYS_BASE
                            );
                        }
                        Some(0)
                    }
                }
            }
        }
    }
}
