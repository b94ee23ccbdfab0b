use crate::jvm::class_file::{Attribute, ConstantIndex, ConstantPool, Field, Method, Version};
use crate::jvm::{ByteReader, ByteWriter, ClassAccessFlags, Error, Result, Serialize};

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ConstantIndex,

    /// Absent only for `java/lang/Object` and `module-info`
    pub super_class: Option<ConstantIndex>,
    pub interfaces: Vec<ConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: u32 = 0xCAFE_BABE;

    /// Parse a complete class file
    ///
    /// Only the layout is checked here: constant pool references are resolved later, when they
    /// are used.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.read_u4()?;
        if magic != Self::MAGIC {
            return Err(Error::UnsupportedFormat {
                reason: format!("bad magic number 0x{:08X}", magic),
            });
        }

        let version = Version::parse(&mut reader)?;
        let constants = ConstantPool::parse(&mut reader)?;
        let access_flags = ClassAccessFlags::from_bits_truncate(reader.read_u2()?);
        let this_class = ConstantIndex::parse(&mut reader)?;
        let super_class = ConstantIndex::parse_optional(&mut reader)?;
        let interfaces = ConstantIndex::parse_list(&mut reader)?;

        let field_count = reader.read_u2()?;
        let fields = (0..field_count)
            .map(|_| Field::parse(&mut reader))
            .collect::<Result<_>>()?;

        let method_count = reader.read_u2()?;
        let methods = (0..method_count)
            .map(|_| Method::parse(&mut reader))
            .collect::<Result<_>>()?;

        let attributes = Attribute::parse_list(&mut reader)?;
        reader.expect_end("class file")?;

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Binary name of the class, as resolved through `this_class`
    pub fn class_name(&self) -> Result<&str> {
        self.constants.get_class_name(self.this_class)
    }
}

impl Serialize for ClassFile {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write_u4(Self::MAGIC);
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ConstantPoolBuilder, Signature};
    use crate::jvm::{FieldAccessFlags, MethodAccessFlags};

    fn sample_class() -> ClassFile {
        let mut pool = ConstantPoolBuilder::new();
        let this_class = pool.get_class("pkg/Sample").unwrap();
        let super_class = pool.get_class("java/lang/Object").unwrap();
        let field_name = pool.get_utf8("count").unwrap();
        let field_descriptor = pool.get_utf8("I").unwrap();
        let method_name = pool.get_utf8("run").unwrap();
        let method_descriptor = pool.get_utf8("()V").unwrap();
        let signature = pool.get_utf8("Ljava/lang/Object;").unwrap();
        let signature = pool
            .get_attribute(&Signature { signature })
            .unwrap();

        ClassFile {
            version: Version::JAVA8,
            constants: pool.into_pool(),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![Field {
                access_flags: FieldAccessFlags::PRIVATE,
                name_index: field_name,
                descriptor_index: field_descriptor,
                attributes: vec![],
            }],
            methods: vec![Method {
                access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                name_index: method_name,
                descriptor_index: method_descriptor,
                attributes: vec![],
            }],
            attributes: vec![signature],
        }
    }

    #[test]
    fn parse_what_was_serialized() {
        let bytes = sample_class().to_bytes().unwrap();
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.class_name().unwrap(), "pkg/Sample");
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.methods.len(), 1);
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn bad_magic() {
        let mut bytes = sample_class().to_bytes().unwrap();
        bytes[0] = 0xCB;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn trailing_bytes() {
        let mut bytes = sample_class().to_bytes().unwrap();
        let end = bytes.len();
        bytes.push(0);
        assert_eq!(
            ClassFile::parse(&bytes),
            Err(Error::malformed(end, "1 trailing bytes after class file"))
        );
    }

    #[test]
    fn truncated_anywhere() {
        let bytes = sample_class().to_bytes().unwrap();
        for len in 0..bytes.len() {
            assert!(
                ClassFile::parse(&bytes[..len]).is_err(),
                "prefix of length {} parsed",
                len
            );
        }
    }
}
