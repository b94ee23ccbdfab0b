use crate::jvm::class_file::{Attribute, ConstantIndex};
use crate::jvm::{ByteReader, ByteWriter, FieldAccessFlags, Result, Serialize};

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: ConstantIndex,
    pub descriptor_index: ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Field {
    pub fn parse(reader: &mut ByteReader) -> Result<Field> {
        Ok(Field {
            access_flags: FieldAccessFlags::from_bits_truncate(reader.read_u2()?),
            name_index: ConstantIndex::parse(reader)?,
            descriptor_index: ConstantIndex::parse(reader)?,
            attributes: Attribute::parse_list(reader)?,
        })
    }
}

impl Serialize for Field {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
