//! Java class file loading
//!
//! Builds a flat memory image the Jazelle core can run: the constant pool
//! resolved to addresses at a fixed base, static fields, then each method
//! body prefixed by a (constant-pool address, argument bytes, local bytes)
//! header. Methods of the `abi/Linux` class lower to system-call stubs
//! whose header carries a zero constant-pool address as the sentinel.

use armemu::config::Isa;
use armemu::{Endian, MemoryInterface};

use crate::linux::{A32_SYS_BRK, A32_SYS_EXIT, A32_SYS_WRITE, J32_SYS_GETBYTES};
use crate::loader::{Environment, EndianChoice, LoadError, Purpose, Reader};

const ACC_STATIC: u16 = 0x0008;
const ACC_NATIVE_OR_ABSTRACT: u16 = 0x0500;

const REF_INVOKE_STATIC: u8 = 6;

#[derive(Debug, Clone, Default)]
pub enum Constant {
    #[default]
    Unused,
    Utf8(Vec<u8>),
    /// Integer and Float entries both keep the raw word.
    Integer(u32),
    /// Long and Double entries both keep the raw doubleword.
    Long(u64),
    Class(u16),
    String(u16),
    Fieldref {
        class_index: u16,
        name_and_type: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type: u16,
    },
    InterfaceMethodref {
        name_and_type: u16,
    },
    NameAndType {
        name: u16,
        descriptor: u16,
    },
    MethodHandle {
        kind: u8,
        ref_index: u16,
    },
    MethodType,
    InvokeDynamic {
        bootstrap: u16,
        name_and_type: u16,
    },
}

pub struct LoadedClass {
    pub constant_pool: Vec<Constant>,
    /// (name+descriptor, file offset, length) of each method body, for
    /// the disassembler.
    pub method_code: Vec<(String, usize, usize)>,
}

impl LoadedClass {
    pub fn utf8(&self, index: u16) -> &[u8] {
        match self.constant_pool.get(index as usize) {
            Some(Constant::Utf8(bytes)) => bytes,
            _ => &[],
        }
    }

    /// First character of the descriptor behind a field reference, which
    /// determines the access width.
    pub fn field_descriptor_char(&self, fieldref_index: u16) -> u8 {
        if let Some(Constant::Fieldref { name_and_type, .. }) =
            self.constant_pool.get(fieldref_index as usize)
        {
            if let Some(Constant::NameAndType { descriptor, .. }) =
                self.constant_pool.get(*name_and_type as usize)
            {
                return self.utf8(*descriptor).first().copied().unwrap_or(0);
            }
        }
        0
    }
}

/// Bytes an argument list occupies on the Jazelle operand stack.
fn count_argument_bytes(descriptor: &[u8]) -> u32 {
    let mut bytes = 0;
    let mut i = 1; // skip the opening parenthesis
    while i < descriptor.len() && descriptor[i] != b')' {
        match descriptor[i] {
            b'B' | b'C' | b'F' | b'I' | b'S' | b'Z' => bytes += 4,
            b'D' | b'J' => bytes += 8,
            b'[' => {
                bytes += 4;
                while i + 1 < descriptor.len() && descriptor[i + 1] == b'[' {
                    i += 1;
                }
                if descriptor.get(i + 1) == Some(&b'L') {
                    i += 1;
                    while i < descriptor.len() && descriptor[i] != b';' {
                        i += 1;
                    }
                }
            }
            b'L' => {
                bytes += 4;
                while i < descriptor.len() && descriptor[i] != b';' {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes
}

struct Field {
    name_index: u16,
    type_index: u16,
    address: u32,
}

struct Method {
    name_index: u16,
    type_index: u16,
    address: u32,
}

fn name_type_is(pool: &[Constant], name_and_type: u16, name: &[u8], descriptor: &[u8]) -> bool {
    if let Some(Constant::NameAndType { name: n, descriptor: d }) = pool.get(name_and_type as usize) {
        let get = |index: u16| match pool.get(index as usize) {
            Some(Constant::Utf8(bytes)) => bytes.as_slice(),
            _ => &[],
        };
        return get(*n) == name && get(*d) == descriptor;
    }
    false
}

fn class_name_is(pool: &[Constant], class_index: u16, name: &[u8]) -> bool {
    if let Some(Constant::Class(name_index)) = pool.get(class_index as usize) {
        if let Some(Constant::Utf8(bytes)) = pool.get(*name_index as usize) {
            return bytes.as_slice() == name;
        }
    }
    false
}

pub fn read_class_file(
    bytes: &[u8],
    env: &mut Environment,
    memory: &mut dyn MemoryInterface,
) -> Result<LoadedClass, LoadError> {
    if env.isa.is_none() {
        env.isa = Some(Isa::Jazelle);
    }
    if !matches!(env.endian, EndianChoice::Exact(_)) {
        // the class file and bytecode stream parse as big-endian either way
        env.endian = EndianChoice::Exact(Endian::Little);
    }
    env.resolve_isa(false);
    let data_endian = env.resolved_endian();
    let code_endian = env.code_byte_endian();

    let write32 = |memory: &mut dyn MemoryInterface, address: u32, value: u32| {
        armemu::mem::write32(memory, address as u64, value, data_endian, false);
    };
    let write64 = |memory: &mut dyn MemoryInterface, address: u32, value: u64| {
        armemu::mem::write64(memory, address as u64, value, data_endian, false);
    };
    let read32 = |memory: &mut dyn MemoryInterface, address: u32| -> u32 {
        armemu::mem::read32(memory, address as u64, data_endian, false).unwrap_or(0)
    };

    let mut reader = Reader::new(bytes);
    reader.seek(8); // magic and version

    // the constant pool is placed at the load base, entries resolved to words
    let mut address: u32 = 0x10004;
    env.cp_start = address;

    let constant_pool_count = reader.u16be()?;
    let mut pool = vec![Constant::Unused; constant_pool_count as usize];
    let mut i = 1;
    while i < constant_pool_count {
        let tag = reader.u8()?;
        pool[i as usize] = match tag {
            1 => {
                let length = reader.u16be()? as usize;
                Constant::Utf8(reader.slice(length)?.to_vec())
            }
            3 | 4 => Constant::Integer(reader.u32be()?),
            5 | 6 => {
                let value = Constant::Long(reader.u64be()?);
                i += 1; // wide entries take two slots
                value
            }
            7 => Constant::Class(reader.u16be()?),
            8 => Constant::String(reader.u16be()?),
            9 => Constant::Fieldref {
                class_index: reader.u16be()?,
                name_and_type: reader.u16be()?,
            },
            10 => Constant::Methodref {
                class_index: reader.u16be()?,
                name_and_type: reader.u16be()?,
            },
            11 => {
                let _class_index = reader.u16be()?;
                Constant::InterfaceMethodref {
                    name_and_type: reader.u16be()?,
                }
            }
            12 => Constant::NameAndType {
                name: reader.u16be()?,
                descriptor: reader.u16be()?,
            },
            15 => Constant::MethodHandle {
                kind: reader.u8()?,
                ref_index: reader.u16be()?,
            },
            16 => {
                reader.skip(2);
                Constant::MethodType
            }
            18 => Constant::InvokeDynamic {
                bootstrap: reader.u16be()?,
                name_and_type: reader.u16be()?,
            },
            _ => return Err(LoadError::Invalid("invalid constant pool entry")),
        };
        i += 1;
    }

    address += 4 * constant_pool_count as u32;

    reader.skip(2); // access flags
    let _this_class = reader.u16be()?;
    reader.skip(2); // super class
    let interfaces_count = reader.u16be()? as usize;
    reader.skip(interfaces_count * 2);

    // static fields get addresses; ConstantValue initializers land directly
    let fields_count = reader.u16be()?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        let access_flags = reader.u16be()?;
        let name_index = reader.u16be()?;
        let type_index = reader.u16be()?;
        let attributes_count = reader.u16be()?;

        let mut field = Field {
            name_index,
            type_index,
            address: 0,
        };
        let mut elsize = 0u32;
        if access_flags & ACC_STATIC != 0 {
            let descriptor = match pool.get(type_index as usize) {
                Some(Constant::Utf8(bytes)) => bytes.first().copied().unwrap_or(0),
                _ => 0,
            };
            elsize = match descriptor {
                b'B' | b'Z' => 1,
                b'C' | b'S' => 2,
                b'D' | b'J' => 8,
                _ => 4,
            };
            address = (address + elsize - 1) & !(elsize - 1);
            field.address = address;
            address += elsize;
        }

        for _ in 0..attributes_count {
            let name_index = reader.u16be()?;
            let attribute_length = reader.u32be()?;
            let is_constant_value = attribute_length == 2
                && matches!(pool.get(name_index as usize), Some(Constant::Utf8(n)) if n == b"ConstantValue");
            if is_constant_value {
                let index = reader.u16be()?;
                if field.address != 0 {
                    match pool.get(index as usize) {
                        Some(Constant::Integer(value)) => match elsize {
                            1 => {
                                armemu::mem::write8(memory, field.address as u64, *value as u8, data_endian, false);
                            }
                            2 => {
                                armemu::mem::write16(memory, field.address as u64, *value as u16, data_endian, false);
                            }
                            _ => write32(memory, field.address, *value),
                        },
                        Some(Constant::Long(value)) => write64(memory, field.address, *value),
                        _ => {}
                    }
                }
            } else {
                reader.skip(attribute_length as usize);
            }
        }
        fields.push(field);
    }

    // methods: a three-word header, then the bytecode
    let methods_count = reader.u16be()?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    let mut method_code = Vec::new();
    for _ in 0..methods_count {
        let access_flags = reader.u16be()?;
        let name_index = reader.u16be()?;
        let type_index = reader.u16be()?;
        let attributes_count = reader.u16be()?;

        let mut method = Method {
            name_index,
            type_index,
            address: 0,
        };

        for _ in 0..attributes_count {
            let attr_name = reader.u16be()?;
            let attribute_length = reader.u32be()? as usize;
            let attr_start = reader.pos;
            let is_code = matches!(pool.get(attr_name as usize), Some(Constant::Utf8(n)) if n == b"Code");
            if is_code {
                // record the body span for the disassembler
                let peek_length = reader
                    .bytes
                    .get(attr_start + 4..attr_start + 8)
                    .map(|b| u32::from_be_bytes(b.try_into().unwrap()) as usize)
                    .unwrap_or(0);
                let label = format!(
                    "{}{}",
                    String::from_utf8_lossy(match pool.get(name_index as usize) {
                        Some(Constant::Utf8(bytes)) => bytes,
                        _ => &[],
                    }),
                    String::from_utf8_lossy(match pool.get(type_index as usize) {
                        Some(Constant::Utf8(bytes)) => bytes,
                        _ => &[],
                    })
                );
                method_code.push((label, attr_start + 8, peek_length));
            }
            if is_code && env.purpose == Purpose::Load {
                if access_flags & ACC_NATIVE_OR_ABSTRACT != 0 {
                    return Err(LoadError::Invalid("native/abstract method with body"));
                }
                let _max_stack = reader.u16be()?;
                let max_locals = reader.u16be()?;
                let code_length = reader.u32be()? as usize;

                address = (address + 3) & !3;
                method.address = address;

                let name = match pool.get(name_index as usize) {
                    Some(Constant::Utf8(bytes)) => bytes.as_slice(),
                    _ => &[],
                };
                if name == b"_start" {
                    env.entry = (address + 12) as u64;
                    env.loc_count = 4 * max_locals as u32;
                } else if name == b"<clinit>" {
                    env.clinit_entry = address + 12;
                    env.clinit_loc_count = 4 * max_locals as u32;
                }

                write32(memory, address, env.cp_start);
                let arg_bytes = match pool.get(type_index as usize) {
                    Some(Constant::Utf8(descriptor)) => count_argument_bytes(descriptor),
                    _ => 0,
                };
                write32(memory, address + 4, arg_bytes);
                write32(memory, address + 8, 4 * max_locals as u32);
                address += 12;

                let code = reader.slice(code_length)?;
                crate::loader::write_image(memory, address as u64, code, code_endian);
                address += code_length as u32;
                address = (address + 3) & !3;
            }
            reader.seek(attr_start + attribute_length);
        }
        methods.push(method);
    }

    // class attributes: only BootstrapMethods matters, and of those only
    // LambdaMetafactory.metafactory call sites
    let attributes_count = reader.u16be()?;
    let mut bootstrap_methods: Vec<u16> = Vec::new();
    for _ in 0..attributes_count {
        let name_index = reader.u16be()?;
        let attribute_length = reader.u32be()? as usize;
        let attr_start = reader.pos;
        let is_bootstrap = matches!(pool.get(name_index as usize), Some(Constant::Utf8(n)) if n == b"BootstrapMethods");
        if is_bootstrap {
            let count = reader.u16be()?;
            for _ in 0..count {
                let method_ref = reader.u16be()?;
                let args_count = reader.u16be()?;
                let is_metafactory = match pool.get(method_ref as usize) {
                    Some(Constant::MethodHandle { kind, ref_index }) => {
                        *kind == REF_INVOKE_STATIC
                            && match pool.get(*ref_index as usize) {
                                Some(Constant::Methodref { class_index, name_and_type }) => {
                                    class_name_is(&pool, *class_index, b"java/lang/invoke/LambdaMetafactory")
                                        && name_type_is(
                                            &pool,
                                            *name_and_type,
                                            b"metafactory",
                                            b"(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
                                        )
                                }
                                _ => false,
                            }
                    }
                    _ => false,
                } && args_count == 3;
                if is_metafactory {
                    reader.skip(2); // first argument is ignored
                    bootstrap_methods.push(reader.u16be()?);
                    reader.skip(2);
                } else {
                    bootstrap_methods.push(0);
                    reader.skip(2 * args_count as usize);
                }
            }
        }
        reader.seek(attr_start + attribute_length);
    }

    // resolve the constant pool into memory words
    for i in 1..constant_pool_count {
        let cp_word = env.cp_start + 4 * i as u32;
        match &pool[i as usize] {
            Constant::Integer(value) => write32(memory, cp_word, *value),
            Constant::Long(value) => write64(memory, cp_word, *value),
            Constant::String(utf8_index) => {
                // length-prefixed byte array, the entry points at the bytes
                let contents = match pool.get(*utf8_index as usize) {
                    Some(Constant::Utf8(bytes)) => bytes.clone(),
                    _ => Vec::new(),
                };
                address = (address + 3) & !3;
                write32(memory, cp_word, address + 4);
                write32(memory, address, contents.len() as u32);
                for (pos, byte) in contents.iter().enumerate() {
                    armemu::mem::write8(memory, (address + 4 + pos as u32) as u64, *byte, data_endian, false);
                }
                address += 4 + contents.len() as u32;
            }
            Constant::Fieldref { name_and_type, .. } => {
                let matching = fields.iter().find(|field| {
                    matches!(
                        pool.get(*name_and_type as usize),
                        Some(Constant::NameAndType { name, descriptor })
                            if *name == field.name_index && *descriptor == field.type_index
                    )
                });
                if let Some(field) = matching {
                    write32(memory, cp_word, field.address);
                }
            }
            Constant::Methodref { class_index, name_and_type } => {
                let matching = methods.iter().find(|method| {
                    matches!(
                        pool.get(*name_and_type as usize),
                        Some(Constant::NameAndType { name, descriptor })
                            if *name == method.name_index && *descriptor == method.type_index
                    )
                });
                if let Some(method) = matching {
                    write32(memory, cp_word, method.address);
                } else if class_name_is(&pool, *class_index, b"abi/Linux") {
                    // a system-call stub: zero constant pool address
                    write32(memory, cp_word, address);
                    write32(memory, address, 0);
                    write32(memory, address + 4, 0);
                    let number = if name_type_is(&pool, *name_and_type, b"exit", b"(I)V") {
                        A32_SYS_EXIT
                    } else if name_type_is(&pool, *name_and_type, b"write", b"(I[BII)I") {
                        A32_SYS_WRITE
                    } else if name_type_is(&pool, *name_and_type, b"brk", b"(I)I") {
                        A32_SYS_BRK
                    } else {
                        0
                    };
                    write32(memory, address + 8, number);
                    address += 12;
                } else if class_name_is(&pool, *class_index, b"java/lang/String")
                    && name_type_is(&pool, *name_and_type, b"getBytes", b"()[B")
                {
                    write32(memory, cp_word, address);
                    write32(memory, address, 0);
                    write32(memory, address + 4, 0);
                    write32(memory, address + 8, J32_SYS_GETBYTES);
                    address += 12;
                }
            }
            Constant::InterfaceMethodref { name_and_type } => {
                // keep the argument byte count for the stack adjustment
                let arg_bytes = match pool.get(*name_and_type as usize) {
                    Some(Constant::NameAndType { descriptor, .. }) => match pool.get(*descriptor as usize) {
                        Some(Constant::Utf8(bytes)) => count_argument_bytes(bytes),
                        _ => 0,
                    },
                    _ => 0,
                };
                armemu::mem::write16(memory, cp_word as u64, arg_bytes as u16, data_endian, false);
            }
            _ => {}
        }
    }

    // invoke-dynamic sites resolve once the methods are installed
    for i in 1..constant_pool_count {
        if let Constant::InvokeDynamic { bootstrap, .. } = &pool[i as usize] {
            let handle = bootstrap_methods.get(*bootstrap as usize).copied().unwrap_or(0);
            if handle != 0 {
                if let Some(Constant::MethodHandle { ref_index, .. }) = pool.get(handle as usize) {
                    let resolved = read32(memory, env.cp_start + 4 * *ref_index as u32);
                    write32(memory, env.cp_start + 4 * i as u32, resolved);
                }
            }
        }
    }

    env.stack = address as u64;
    Ok(LoadedClass {
        constant_pool: pool,
        method_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_argument_bytes() {
        assert_eq!(count_argument_bytes(b"()V"), 0);
        assert_eq!(count_argument_bytes(b"(I)V"), 4);
        assert_eq!(count_argument_bytes(b"(I[BII)I"), 16);
        assert_eq!(count_argument_bytes(b"(JD)V"), 16);
        assert_eq!(count_argument_bytes(b"(Ljava/lang/String;I)V"), 8);
        assert_eq!(count_argument_bytes(b"([[Ljava/lang/Object;)V"), 4);
    }
}
