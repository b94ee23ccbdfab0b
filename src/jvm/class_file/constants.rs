use crate::jvm::class_file::{Attribute, AttributeLike};
use crate::jvm::{ByteReader, ByteWriter, Error, Result, Serialize};
use crate::util::{Offset, OffsetResult, OffsetVec, Width};
use std::collections::HashMap;
use std::fmt;

/// Index into the constant pool
///
/// Indices are plain keys, validated when they are resolved against a [`ConstantPool`]. Index `0`
/// is never valid, although several structures use it to mean "absent" (those are modelled as
/// `Option<ConstantIndex>`).
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConstantIndex(pub u16);

impl fmt::Debug for ConstantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl ConstantIndex {
    pub fn parse(reader: &mut ByteReader) -> Result<ConstantIndex> {
        Ok(ConstantIndex(reader.read_u2()?))
    }

    /// Parse an index where `0` means "absent"
    pub fn parse_optional(reader: &mut ByteReader) -> Result<Option<ConstantIndex>> {
        match reader.read_u2()? {
            0 => Ok(None),
            idx => Ok(Some(ConstantIndex(idx))),
        }
    }

    pub fn parse_list(reader: &mut ByteReader) -> Result<Vec<ConstantIndex>> {
        Ok(reader
            .read_u2_list()?
            .into_iter()
            .map(ConstantIndex)
            .collect())
    }
}

impl Serialize for ConstantIndex {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for Option<ConstantIndex> {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.map_or(0, |idx| idx.0).serialize(writer)
    }
}

/// Structures holding constant pool indices
///
/// Compaction walks these to find which entries are still needed, then rewrites them to point
/// into the compacted pool.
pub trait ConstantRefs {
    /// Call `visit` on every constant pool index held
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex));

    /// Replace every constant pool index held
    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()>;
}

impl ConstantRefs for ConstantIndex {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        visit(*self)
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        *self = remap(*self)?;
        Ok(())
    }
}

impl<T: ConstantRefs> ConstantRefs for Option<T> {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        if let Some(inner) = self {
            inner.visit_constants(visit)
        }
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        match self {
            Some(inner) => inner.remap_constants(remap),
            None => Ok(()),
        }
    }
}

impl<T: ConstantRefs> ConstantRefs for Vec<T> {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        for elem in self {
            elem.visit_constants(visit);
        }
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        for elem in self {
            elem.remap_constants(remap)?;
        }
        Ok(())
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    fn from_u8(byte: u8) -> Option<HandleKind> {
        Some(match byte {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }
}

impl Serialize for HandleKind {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

/// Constants as in the constant pool
///
/// Floating point constants are kept as their raw bits so that every NaN payload survives a
/// round trip unchanged.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(u32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(u64),

    /// Class or an interface
    Class(ConstantIndex),

    /// Constant object of type `java.lang.String`
    String(ConstantIndex),

    /// Field
    FieldRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
    },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ConstantIndex,
        name_and_type: ConstantIndex,
        is_interface: bool,
    },

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: ConstantIndex,
        descriptor: ConstantIndex,
    },

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: ConstantIndex,
    },

    /// Module (only in `module-info` classes)
    Module { name: ConstantIndex },

    /// Package exported or opened by a module
    Package { name: ConstantIndex },
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef {
                is_interface: false,
                ..
            } => 10,
            Constant::MethodRef {
                is_interface: true, ..
            } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType { .. } => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module { .. } => 19,
            Constant::Package { .. } => 20,
        }
    }

    /// Name of the kind of constant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef {
                is_interface: false,
                ..
            } => "Methodref",
            Constant::MethodRef {
                is_interface: true, ..
            } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module { .. } => "Module",
            Constant::Package { .. } => "Package",
        }
    }

    /// Bootstrap method referenced by a dynamic constant or call site
    pub fn bootstrap_method(&self) -> Option<u16> {
        match self {
            Constant::Dynamic {
                bootstrap_method, ..
            }
            | Constant::InvokeDynamic {
                bootstrap_method, ..
            } => Some(*bootstrap_method),
            _ => None,
        }
    }

    /// Renumber the bootstrap method referenced by a dynamic constant or call site
    pub fn remap_bootstrap_method(&mut self, remap: impl FnOnce(u16) -> Result<u16>) -> Result<()> {
        match self {
            Constant::Dynamic {
                bootstrap_method, ..
            }
            | Constant::InvokeDynamic {
                bootstrap_method, ..
            } => {
                *bootstrap_method = remap(*bootstrap_method)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Parse one constant. `index` is only used for error reporting.
    fn parse(reader: &mut ByteReader, index: u16) -> Result<Constant> {
        let offset = reader.offset();
        let malformed = |reason: String| Error::MalformedConstantPool {
            index,
            offset,
            reason,
        };

        let tag = reader.read_u1()?;
        let constant = match tag {
            1 => {
                let length = reader.read_u2()?;
                let bytes = reader.read_bytes(length as usize)?;
                Constant::Utf8(decode_modified_utf8(bytes).map_err(malformed)?)
            }
            3 => Constant::Integer(reader.read_u4()? as i32),
            4 => Constant::Float(reader.read_u4()?),
            5 => Constant::Long(reader.read_u8()? as i64),
            6 => Constant::Double(reader.read_u8()?),
            7 => Constant::Class(ConstantIndex::parse(reader)?),
            8 => Constant::String(ConstantIndex::parse(reader)?),
            9 => Constant::FieldRef {
                class: ConstantIndex::parse(reader)?,
                name_and_type: ConstantIndex::parse(reader)?,
            },
            10 | 11 => Constant::MethodRef {
                class: ConstantIndex::parse(reader)?,
                name_and_type: ConstantIndex::parse(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: ConstantIndex::parse(reader)?,
                descriptor: ConstantIndex::parse(reader)?,
            },
            15 => {
                let kind = reader.read_u1()?;
                let handle_kind = HandleKind::from_u8(kind)
                    .ok_or_else(|| malformed(format!("invalid method handle kind {}", kind)))?;
                Constant::MethodHandle {
                    handle_kind,
                    member: ConstantIndex::parse(reader)?,
                }
            }
            16 => Constant::MethodType {
                descriptor: ConstantIndex::parse(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: reader.read_u2()?,
                name_and_type: ConstantIndex::parse(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: reader.read_u2()?,
                name_and_type: ConstantIndex::parse(reader)?,
            },
            19 => Constant::Module {
                name: ConstantIndex::parse(reader)?,
            },
            20 => Constant::Package {
                name: ConstantIndex::parse(reader)?,
            },
            _ => return Err(malformed(format!("unknown tag {}", tag))),
        };
        Ok(constant)
    }
}

impl ConstantRefs for Constant {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        match self {
            Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_) => (),
            Constant::Class(name)
            | Constant::String(name)
            | Constant::MethodType { descriptor: name }
            | Constant::Module { name }
            | Constant::Package { name } => visit(*name),
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                visit(*class);
                visit(*name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                visit(*name);
                visit(*descriptor);
            }
            Constant::MethodHandle { member, .. } => visit(*member),
            Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => visit(*name_and_type),
        }
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        match self {
            Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_) => (),
            Constant::Class(name)
            | Constant::String(name)
            | Constant::MethodType { descriptor: name }
            | Constant::Module { name }
            | Constant::Package { name } => *name = remap(*name)?,
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                *class = remap(*class)?;
                *name_and_type = remap(*name_and_type)?;
            }
            Constant::NameAndType { name, descriptor } => {
                *name = remap(*name)?;
                *descriptor = remap(*descriptor)?;
            }
            Constant::MethodHandle { member, .. } => *member = remap(*member)?,
            Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => {
                *name_and_type = remap(*name_and_type)?
            }
        }
        Ok(())
    }
}

impl Serialize for Constant {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.tag().serialize(writer)?;
        match self {
            Constant::Utf8(string) => {
                let buffer: Vec<u8> = encode_modified_utf8(string);
                writer.write_len_u2("Utf8 constant length", buffer.len())?;
                writer.write_bytes(&buffer);
            }
            Constant::Integer(integer) => writer.write_u4(*integer as u32),
            Constant::Float(bits) => writer.write_u4(*bits),
            Constant::Long(long) => writer.write_u8(*long as u64),
            Constant::Double(bits) => writer.write_u8(*bits),
            Constant::Class(name)
            | Constant::String(name)
            | Constant::MethodType { descriptor: name }
            | Constant::Module { name }
            | Constant::Package { name } => name.serialize(writer)?,
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVMS:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Only the canonical encoding is accepted, so that decoding then re-encoding reproduces the input
/// bytes exactly. Unpaired surrogates cannot be represented in a `String` and are rejected.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, String> {
    fn continuation(bytes: &[u8], at: usize) -> Result<u32, String> {
        match bytes.get(at) {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u32),
            Some(b) => Err(format!("invalid continuation byte 0x{:02X} at {}", b, at)),
            None => Err(String::from("string ends in the middle of a character")),
        }
    }

    /// Decode a 3-byte sequence starting at `at`
    fn three_byte(bytes: &[u8], at: usize) -> Result<u32, String> {
        let lead = bytes[at];
        if lead & 0b1111_0000 != 0b1110_0000 {
            return Err(format!("expected 3-byte sequence at {}", at));
        }
        let code = ((lead & 0x0F) as u32) << 12
            | continuation(bytes, at + 1)? << 6
            | continuation(bytes, at + 2)?;
        if code < 0x800 {
            return Err(format!("overlong encoding at {}", at));
        }
        Ok(code)
    }

    let mut string = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let code = if lead == 0 {
            return Err(format!("raw NUL byte at {}", i));
        } else if lead < 0x80 {
            i += 1;
            lead as u32
        } else if lead & 0b1110_0000 == 0b1100_0000 {
            let code = ((lead & 0x1F) as u32) << 6 | continuation(bytes, i + 1)?;
            if code != 0 && code < 0x80 {
                return Err(format!("overlong encoding at {}", i));
            }
            i += 2;
            code
        } else if lead & 0b1111_0000 == 0b1110_0000 {
            let code = three_byte(bytes, i)?;
            match code {
                0xD800..=0xDBFF => {
                    let low = if i + 3 < bytes.len() {
                        three_byte(bytes, i + 3)?
                    } else {
                        0
                    };
                    if !(0xDC00..=0xDFFF).contains(&low) {
                        return Err(format!("unpaired surrogate at {}", i));
                    }
                    i += 6;
                    0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00)
                }
                0xDC00..=0xDFFF => return Err(format!("unpaired surrogate at {}", i)),
                _ => {
                    i += 3;
                    code
                }
            }
        } else {
            return Err(format!("invalid lead byte 0x{:02X} at {}", lead, i));
        };
        let c = char::from_u32(code).ok_or_else(|| format!("invalid code point {:X}", code))?;
        string.push(c);
    }
    Ok(string)
}

/// Parsed constant pool, indexed the way the class file indexes it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
        }
    }
}

impl ConstantPool {
    /// Parse the `constant_pool_count` and the entries that follow it
    pub fn parse(reader: &mut ByteReader) -> Result<ConstantPool> {
        let count_offset = reader.offset();
        let count = reader.read_u2()?;
        if count == 0 {
            return Err(Error::MalformedConstantPool {
                index: 0,
                offset: count_offset,
                reason: String::from("constant pool count must be at least 1"),
            });
        }

        let mut pool = ConstantPool::default();
        while pool.slot_count() < count as usize {
            let index = pool.slot_count() as u16;
            let offset = reader.offset();
            let constant = Constant::parse(reader, index)?;
            if pool.slot_count() + constant.width() > count as usize {
                return Err(Error::MalformedConstantPool {
                    index,
                    offset,
                    reason: format!("{} entry overruns the pool", constant.kind_name()),
                });
            }
            pool.constants.push(constant);
        }
        Ok(pool)
    }

    /// Number of slots, including the unusable slot 0 (aka. `constant_pool_count`)
    pub fn slot_count(&self) -> usize {
        self.constants.offset_len().0
    }

    /// Number of entries (wide entries count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Resolve an index to its entry
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant> {
        match self.constants.get_offset(Offset(index.0 as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            OffsetResult::TooSmall => Err(Error::dangling(index.0, "constant", "index 0")),
            OffsetResult::TooLarge => Err(Error::dangling(index.0, "constant", "out of range")),
            OffsetResult::InvalidOffset(_) => Err(Error::dangling(
                index.0,
                "constant",
                "unusable second slot of a wide constant",
            )),
        }
    }

    pub fn get_utf8(&self, index: ConstantIndex) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(string) => Ok(string),
            other => Err(Error::dangling(index.0, "Utf8", other.kind_name())),
        }
    }

    /// Resolve a `Class` entry to the class name it holds
    pub fn get_class_name(&self, index: ConstantIndex) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.get_utf8(*name),
            other => Err(Error::dangling(index.0, "Class", other.kind_name())),
        }
    }

    /// Check that an index resolves to an entry of the expected kind
    pub fn expect_kind(
        &self,
        index: ConstantIndex,
        expected: &'static str,
        matches: impl FnOnce(&Constant) -> bool,
    ) -> Result<&Constant> {
        let constant = self.get(index)?;
        if matches(constant) {
            Ok(constant)
        } else {
            Err(Error::dangling(index.0, expected, constant.kind_name()))
        }
    }
}

impl ConstantPool {
    /// Check that the entries a constant points to exist and are of the kind the format demands
    pub fn check_references(&self, constant: &Constant) -> Result<()> {
        match constant {
            Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_) => (),
            Constant::Class(name)
            | Constant::String(name)
            | Constant::MethodType { descriptor: name }
            | Constant::Module { name }
            | Constant::Package { name } => {
                self.get_utf8(*name)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                self.expect_kind(*class, "Class", |c| matches!(c, Constant::Class(_)))?;
                self.expect_kind(*name_and_type, "NameAndType", |c| {
                    matches!(c, Constant::NameAndType { .. })
                })?;
            }
            Constant::NameAndType { name, descriptor } => {
                self.get_utf8(*name)?;
                self.get_utf8(*descriptor)?;
            }
            Constant::MethodHandle { member, .. } => {
                self.expect_kind(*member, "Fieldref or Methodref", |c| {
                    matches!(c, Constant::FieldRef { .. } | Constant::MethodRef { .. })
                })?;
            }
            Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => {
                self.expect_kind(*name_and_type, "NameAndType", |c| {
                    matches!(c, Constant::NameAndType { .. })
                })?;
            }
        }
        Ok(())
    }
}

impl Serialize for ConstantPool {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_len_u2("constant pool count", self.slot_count())?;
        for (_, _, constant) in &self.constants {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// Append-only constant pool builder
///
/// Entries can be pushed verbatim (eg. when carrying over retained entries in their original
/// order) or looked up with the `get_*` methods, which only insert an entry if an identical one is
/// not already present.
pub struct ConstantPoolBuilder {
    constants: OffsetVec<Constant>,

    utf8s: HashMap<String, ConstantIndex>,
    classes: HashMap<ConstantIndex, ConstantIndex>,
    name_and_types: HashMap<(ConstantIndex, ConstantIndex), ConstantIndex>,
    method_refs: HashMap<(ConstantIndex, ConstantIndex, bool), ConstantIndex>,
}

impl Default for ConstantPoolBuilder {
    fn default() -> Self {
        ConstantPoolBuilder::new()
    }
}

impl ConstantPoolBuilder {
    /// Largest valid `constant_pool_count`
    pub const MAX_SLOTS: usize = u16::MAX as usize;

    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPoolBuilder {
        ConstantPoolBuilder {
            constants: OffsetVec::new_starting_at(Offset(1)),
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            name_and_types: HashMap::new(),
            method_refs: HashMap::new(),
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65534, indexing starts at 1, and some constants take two
    /// spaces. If an identical constant is already present, the earlier one stays the one
    /// returned by lookups.
    pub fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex> {
        let offset = self.constants.offset_len().0;
        let slots = offset + constant.width();
        if slots > Self::MAX_SLOTS {
            return Err(Error::overflow("constant pool count", slots, Self::MAX_SLOTS));
        }
        let idx = ConstantIndex(offset as u16);

        match &constant {
            Constant::Utf8(string) => {
                self.utf8s.entry(string.clone()).or_insert(idx);
            }
            Constant::Class(name) => {
                self.classes.entry(*name).or_insert(idx);
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(idx);
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.method_refs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(idx);
            }
            _ => (),
        }

        self.constants.push(constant);
        Ok(idx)
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8(&mut self, utf8: &str) -> Result<ConstantIndex> {
        match self.utf8s.get(utf8) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Utf8(utf8.to_owned())),
        }
    }

    /// Get or insert a class constant for the given binary name
    pub fn get_class(&mut self, name: &str) -> Result<ConstantIndex> {
        let name = self.get_utf8(name)?;
        match self.classes.get(&name) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::Class(name)),
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<ConstantIndex> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        match self.name_and_types.get(&(name, descriptor)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::NameAndType { name, descriptor }),
        }
    }

    /// Get or insert a `Methodref` or `InterfaceMethodref`
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<ConstantIndex> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        match self.method_refs.get(&(class, name_and_type, is_interface)) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            }),
        }
    }

    /// Encode an attribute, interning its name
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute> {
        let name_index = self.get_utf8(A::NAME)?;
        let info = attribute.to_bytes()?;
        Ok(Attribute {
            name_index,
            info,
            offset: 0,
        })
    }

    /// Current `constant_pool_count`
    pub fn slot_count(&self) -> usize {
        self.constants.offset_len().0
    }

    /// Consume the builder and return the final pool
    pub fn into_pool(self) -> ConstantPool {
        ConstantPool {
            constants: self.constants,
        }
    }
}

#[cfg(test)]
mod encode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(
            encode_modified_utf8("hel10_World"),
            vec![104, 101, 108, 49, 48, 95, 87, 111, 114, 108, 100]
        );
    }

    #[test]
    fn two_and_three_byte_encodings() {
        for text in ["ĄǍǞǠǺȀȂȦȺӐӒ", "ऄअॲঅਅઅଅஅఅಅഅะະ༁ཨ"] {
            let encoded = encode_modified_utf8(text);
            assert_eq!(encoded, text.as_bytes());
            assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
        }
    }

    #[test]
    fn supplementary_characters() {
        let encoded = vec![
            237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237, 191,
            191,
        ];
        assert_eq!(encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"), encoded);
        assert_eq!(
            decode_modified_utf8(&encoded).unwrap(),
            "\u{10000}\u{dffff}\u{10FFFF}"
        );
    }

    #[test]
    fn non_canonical_inputs() {
        // raw NUL
        assert!(decode_modified_utf8(&[97, 0]).is_err());
        // overlong 'a'
        assert!(decode_modified_utf8(&[0xC1, 0xA1]).is_err());
        // standard 4-byte UTF-8
        assert!(decode_modified_utf8("\u{10000}".as_bytes()).is_err());
        // lone high surrogate
        assert!(decode_modified_utf8(&[237, 160, 128]).is_err());
        // lone low surrogate
        assert!(decode_modified_utf8(&[237, 176, 128]).is_err());
        // truncated sequence
        assert!(decode_modified_utf8(&[0xE0, 0xA4]).is_err());
    }
}

#[cfg(test)]
mod constant_pool_tests {
    use super::*;

    fn sample_pool_bytes() -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u2(6); // count: #1 Utf8, #2 Long (2 slots), #4 Class, #5 Integer
        writer.write_u1(1);
        writer.write_u2(3);
        writer.write_bytes(b"Foo");
        writer.write_u1(5);
        writer.write_u8(42);
        writer.write_u1(7);
        writer.write_u2(1);
        writer.write_u1(3);
        writer.write_u4(7);
        writer.into_bytes()
    }

    #[test]
    fn parses_wide_entries() {
        let bytes = sample_pool_bytes();
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(pool.slot_count(), 6);
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.get(ConstantIndex(2)).unwrap(), &Constant::Long(42));
        assert_eq!(pool.get_class_name(ConstantIndex(4)).unwrap(), "Foo");
        assert_eq!(pool.get(ConstantIndex(5)).unwrap(), &Constant::Integer(7));
        assert_eq!(pool.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn dangling_references() {
        let bytes = sample_pool_bytes();
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        for idx in [0, 3, 6, 1000] {
            assert!(matches!(
                pool.get(ConstantIndex(idx)),
                Err(Error::DanglingReference { index, .. }) if index == idx
            ));
        }
        assert_eq!(
            pool.get_utf8(ConstantIndex(5)),
            Err(Error::dangling(5, "Utf8", "Integer"))
        );
        assert_eq!(
            pool.check_references(&Constant::String(ConstantIndex(4))),
            Err(Error::dangling(4, "Utf8", "Class"))
        );
        assert!(pool
            .check_references(&Constant::String(ConstantIndex(1)))
            .is_ok());
    }

    #[test]
    fn unknown_tag() {
        let bytes = [0, 2, 99];
        assert!(matches!(
            ConstantPool::parse(&mut ByteReader::new(&bytes)),
            Err(Error::MalformedConstantPool { index: 1, offset: 2, .. })
        ));
    }

    #[test]
    fn truncated_pool() {
        let bytes = sample_pool_bytes();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(
            ConstantPool::parse(&mut ByteReader::new(truncated)),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn wide_entry_overrunning_pool() {
        let mut writer = ByteWriter::new();
        writer.write_u2(2);
        writer.write_u1(6);
        writer.write_u8(0);
        let bytes = writer.into_bytes();
        assert!(matches!(
            ConstantPool::parse(&mut ByteReader::new(&bytes)),
            Err(Error::MalformedConstantPool { index: 1, .. })
        ));
    }

    #[test]
    fn builder_deduplicates() {
        let mut builder = ConstantPoolBuilder::new();
        let a = builder.get_method_ref("pkg/A", "run", "()V", false).unwrap();
        let b = builder.get_method_ref("pkg/A", "run", "()V", false).unwrap();
        let c = builder.get_method_ref("pkg/A", "run", "()V", true).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(builder.get_class("pkg/A").unwrap(), ConstantIndex(2));
        let long = builder.push_constant(Constant::Long(1)).unwrap();
        let next = builder.get_utf8("next").unwrap();
        assert_eq!(next.0, long.0 + 2);
    }

    #[test]
    fn builder_overflows() {
        let mut builder = ConstantPoolBuilder::new();
        for i in 0..(u16::MAX as usize - 1) {
            builder.push_constant(Constant::Integer(i as i32)).unwrap();
        }
        assert_eq!(builder.slot_count(), ConstantPoolBuilder::MAX_SLOTS);
        assert!(matches!(
            builder.get_utf8("one too many"),
            Err(Error::EmissionOverflow { .. })
        ));
    }
}
