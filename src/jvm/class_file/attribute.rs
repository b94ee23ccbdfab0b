use crate::jvm::class_file::{ConstantIndex, ConstantRefs};
use crate::jvm::{ByteReader, ByteWriter, Error, InnerClassAccessFlags, Result, Serialize};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are read as opaque payloads. The ones whose meaning matters are decoded on demand
/// through [`AttributeLike::decode`].
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: ConstantIndex,
    pub info: Vec<u8>,

    /// Offset of `info` in the buffer it was read from (`0` for attributes built in memory)
    pub offset: usize,
}

impl Attribute {
    pub fn parse(reader: &mut ByteReader) -> Result<Attribute> {
        let name_index = ConstantIndex::parse(reader)?;
        let length_offset = reader.offset();
        let length = reader.read_u4()? as usize;
        let offset = reader.offset();
        if length > reader.remaining() {
            return Err(Error::malformed(
                length_offset,
                format!(
                    "attribute length {} overruns the {} remaining bytes",
                    length,
                    reader.remaining()
                ),
            ));
        }
        let info = reader.read_bytes(length)?.to_vec();
        Ok(Attribute {
            name_index,
            info,
            offset,
        })
    }

    /// Parse a `u2` count followed by that many attributes
    pub fn parse_list(reader: &mut ByteReader) -> Result<Vec<Attribute>> {
        let count = reader.read_u2()?;
        (0..count).map(|_| Attribute::parse(reader)).collect()
    }
}

impl Serialize for Attribute {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        writer.write_len_u4("attribute length", self.info.len())?;
        writer.write_bytes(&self.info);

        Ok(())
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes, and read back out of them.
pub trait AttributeLike: Serialize + Sized {
    /// Name of the attribute
    const NAME: &'static str;

    /// Parse the attribute payload
    fn parse(reader: &mut ByteReader) -> Result<Self>;

    /// Decode a raw attribute, which must be consumed exactly
    ///
    /// The payload length was declared up front, so running out of bytes here means the class
    /// file is inconsistent rather than cut short.
    fn decode(attribute: &Attribute) -> Result<Self> {
        let mut reader = ByteReader::with_base_offset(&attribute.info, attribute.offset);
        let parsed = Self::parse(&mut reader).map_err(|err| match err {
            Error::TruncatedInput { offset, .. } => Error::malformed(
                offset,
                format!("{} attribute ends before its contents", Self::NAME),
            ),
            other => other,
        })?;
        reader.expect_end(Self::NAME)?;
        Ok(parsed)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantValue(pub ConstantIndex);

impl Serialize for ConstantValue {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl AttributeLike for ConstantValue {
    const NAME: &'static str = "ConstantValue";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(ConstantValue(ConstantIndex::parse(reader)?))
    }
}

impl ConstantRefs for ConstantValue {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.0.visit_constants(visit)
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.0.remap_constants(remap)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        writer.write_len_u4("code length", self.code_array.len())?;
        writer.write_bytes(&self.code_array);
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        let max_stack = reader.read_u2()?;
        let max_locals = reader.read_u2()?;
        let code_length = reader.read_u4()? as usize;
        let code_array = reader.read_bytes(code_length)?.to_vec();
        let handler_count = reader.read_u2()?;
        let exception_table = (0..handler_count)
            .map(|_| {
                Ok(ExceptionHandler {
                    start_pc: reader.read_u2()?,
                    end_pc: reader.read_u2()?,
                    handler_pc: reader.read_u2()?,
                    catch_type: ConstantIndex::parse_optional(reader)?,
                })
            })
            .collect::<Result<_>>()?;
        let attributes = Attribute::parse_list(reader)?;
        Ok(Code {
            max_stack,
            max_locals,
            code_array,
            exception_table,
            attributes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Class of exceptions caught (`None` catches everything)
    pub catch_type: Option<ConstantIndex>,
}

impl Serialize for ExceptionHandler {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exceptions(pub Vec<ConstantIndex>);

impl AttributeLike for Exceptions {
    const NAME: &'static str = "Exceptions";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(Exceptions(ConstantIndex::parse_list(reader)?))
    }
}

impl Serialize for Exceptions {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl ConstantRefs for Exceptions {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.0.visit_constants(visit)
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.0.remap_constants(remap)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.23
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethods(pub Vec<BootstrapMethod>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    pub bootstrap_method: ConstantIndex,
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

impl AttributeLike for BootstrapMethods {
    const NAME: &'static str = "BootstrapMethods";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        let count = reader.read_u2()?;
        let methods = (0..count)
            .map(|_| {
                Ok(BootstrapMethod {
                    bootstrap_method: ConstantIndex::parse(reader)?,
                    bootstrap_arguments: ConstantIndex::parse_list(reader)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(BootstrapMethods(methods))
    }
}

impl Serialize for BootstrapMethods {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for BootstrapMethod {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.bootstrap_method.serialize(writer)?;
        self.bootstrap_arguments.serialize(writer)?;
        Ok(())
    }
}

impl ConstantRefs for BootstrapMethod {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.bootstrap_method.visit_constants(visit);
        self.bootstrap_arguments.visit_constants(visit);
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.bootstrap_method.remap_constants(remap)?;
        self.bootstrap_arguments.remap_constants(remap)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.28
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestHost(pub ConstantIndex);

impl AttributeLike for NestHost {
    const NAME: &'static str = "NestHost";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(NestHost(ConstantIndex::parse(reader)?))
    }
}

impl Serialize for NestHost {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl ConstantRefs for NestHost {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.0.visit_constants(visit)
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.0.remap_constants(remap)
    }
}

/// Lists of classes: `NestMembers` and `PermittedSubclasses` share their layout
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.29
/// [1]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.31
macro_rules! class_list_attribute {
    ($ty:ident, $name:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $ty(pub Vec<ConstantIndex>);

        impl AttributeLike for $ty {
            const NAME: &'static str = $name;

            fn parse(reader: &mut ByteReader) -> Result<Self> {
                Ok($ty(ConstantIndex::parse_list(reader)?))
            }
        }

        impl Serialize for $ty {
            fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
                self.0.serialize(writer)
            }
        }

        impl ConstantRefs for $ty {
            fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
                self.0.visit_constants(visit)
            }

            fn remap_constants(
                &mut self,
                remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
            ) -> Result<()> {
                self.0.remap_constants(remap)
            }
        }
    };
}

class_list_attribute!(NestMembers, "NestMembers");
class_list_attribute!(PermittedSubclasses, "PermittedSubclasses");

/// Every inner class referenced in a class' constant pool must be included in the inner classes
/// attribute on the class.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.6
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClasses(pub Vec<InnerClass>);

impl AttributeLike for InnerClasses {
    const NAME: &'static str = "InnerClasses";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        let count = reader.read_u2()?;
        let classes = (0..count)
            .map(|_| {
                Ok(InnerClass {
                    inner_class: ConstantIndex::parse(reader)?,
                    outer_class: ConstantIndex::parse_optional(reader)?,
                    inner_name: ConstantIndex::parse_optional(reader)?,
                    access_flags: InnerClassAccessFlags::from_bits_truncate(reader.read_u2()?),
                })
            })
            .collect::<Result<_>>()?;
        Ok(InnerClasses(classes))
    }
}

impl Serialize for InnerClasses {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class: ConstantIndex,

    /// `None` for local and anonymous classes
    pub outer_class: Option<ConstantIndex>,

    /// `None` for anonymous classes
    pub inner_name: Option<ConstantIndex>,
    pub access_flags: InnerClassAccessFlags,
}

impl Serialize for InnerClass {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.inner_class.serialize(writer)?;
        self.outer_class.serialize(writer)?;
        self.inner_name.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        Ok(())
    }
}

impl ConstantRefs for InnerClass {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.inner_class.visit_constants(visit);
        self.outer_class.visit_constants(visit);
        self.inner_name.visit_constants(visit);
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.inner_class.remap_constants(remap)?;
        self.outer_class.remap_constants(remap)?;
        self.inner_name.remap_constants(remap)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class: ConstantIndex,

    /// `NameAndType` of the enclosing method, absent for classes not enclosed by a method
    pub method: Option<ConstantIndex>,
}

impl AttributeLike for EnclosingMethod {
    const NAME: &'static str = "EnclosingMethod";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(EnclosingMethod {
            class: ConstantIndex::parse(reader)?,
            method: ConstantIndex::parse_optional(reader)?,
        })
    }
}

impl Serialize for EnclosingMethod {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.class.serialize(writer)?;
        self.method.serialize(writer)
    }
}

impl ConstantRefs for EnclosingMethod {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.class.visit_constants(visit);
        self.method.visit_constants(visit);
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.class.remap_constants(remap)?;
        self.method.remap_constants(remap)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.9
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub signature: ConstantIndex,
}

impl AttributeLike for Signature {
    const NAME: &'static str = "Signature";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(Signature {
            signature: ConstantIndex::parse(reader)?,
        })
    }
}

impl Serialize for Signature {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.signature.serialize(writer)?;
        Ok(())
    }
}

impl ConstantRefs for Signature {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.signature.visit_constants(visit)
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.signature.remap_constants(remap)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.30
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(pub Vec<RecordComponent>);

/// Component of a record, whose own attributes are left undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    pub name_index: ConstantIndex,
    pub descriptor_index: ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl AttributeLike for Record {
    const NAME: &'static str = "Record";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        let count = reader.read_u2()?;
        let components = (0..count)
            .map(|_| {
                Ok(RecordComponent {
                    name_index: ConstantIndex::parse(reader)?,
                    descriptor_index: ConstantIndex::parse(reader)?,
                    attributes: Attribute::parse_list(reader)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Record(components))
    }
}

impl Serialize for Record {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for RecordComponent {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)
    }
}
