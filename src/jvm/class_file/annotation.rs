use crate::jvm::class_file::{AttributeLike, ConstantIndex, ConstantRefs};
use crate::jvm::{ByteReader, ByteWriter, Error, Result, Serialize};

/// Deepest nesting of annotations and arrays inside element values that will be parsed
pub const MAX_ANNOTATION_NESTING: usize = 256;

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface
    pub type_index: ConstantIndex,
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name_index: ConstantIndex,
    pub value: ElementValue,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.16.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant (tags `B C D F I J S Z s`)
    Const { tag: u8, value: ConstantIndex },

    /// Enum constant: field descriptor of the enum and the constant's simple name
    Enum {
        type_name: ConstantIndex,
        const_name: ConstantIndex,
    },

    /// Class literal, as a return descriptor
    Class(ConstantIndex),

    Annotation(Annotation),

    Array(Vec<ElementValue>),
}

fn check_nesting(reader: &ByteReader, depth: usize) -> Result<()> {
    if depth > MAX_ANNOTATION_NESTING {
        Err(Error::malformed(
            reader.offset(),
            format!(
                "annotation values nested deeper than {} levels",
                MAX_ANNOTATION_NESTING
            ),
        ))
    } else {
        Ok(())
    }
}

impl Annotation {
    pub fn parse(reader: &mut ByteReader) -> Result<Annotation> {
        Annotation::parse_nested(reader, 0)
    }

    fn parse_nested(reader: &mut ByteReader, depth: usize) -> Result<Annotation> {
        check_nesting(reader, depth)?;
        let type_index = ConstantIndex::parse(reader)?;
        let pair_count = reader.read_u2()?;
        let element_value_pairs = (0..pair_count)
            .map(|_| {
                Ok(ElementValuePair {
                    name_index: ConstantIndex::parse(reader)?,
                    value: ElementValue::parse_nested(reader, depth + 1)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Annotation {
            type_index,
            element_value_pairs,
        })
    }

    fn parse_list(reader: &mut ByteReader) -> Result<Vec<Annotation>> {
        let count = reader.read_u2()?;
        (0..count).map(|_| Annotation::parse(reader)).collect()
    }
}

impl ElementValue {
    pub fn parse(reader: &mut ByteReader) -> Result<ElementValue> {
        ElementValue::parse_nested(reader, 0)
    }

    fn parse_nested(reader: &mut ByteReader, depth: usize) -> Result<ElementValue> {
        check_nesting(reader, depth)?;
        let tag_offset = reader.offset();
        let tag = reader.read_u1()?;
        let value = match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                value: ConstantIndex::parse(reader)?,
            },
            b'e' => ElementValue::Enum {
                type_name: ConstantIndex::parse(reader)?,
                const_name: ConstantIndex::parse(reader)?,
            },
            b'c' => ElementValue::Class(ConstantIndex::parse(reader)?),
            b'@' => ElementValue::Annotation(Annotation::parse_nested(reader, depth + 1)?),
            b'[' => {
                let count = reader.read_u2()?;
                let values = (0..count)
                    .map(|_| ElementValue::parse_nested(reader, depth + 1))
                    .collect::<Result<_>>()?;
                ElementValue::Array(values)
            }
            _ => {
                return Err(Error::malformed(
                    tag_offset,
                    format!("unknown element value tag 0x{:02X}", tag),
                ))
            }
        };
        Ok(value)
    }
}

impl Serialize for Annotation {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.type_index.serialize(writer)?;
        self.element_value_pairs.serialize(writer)
    }
}

impl Serialize for ElementValuePair {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.name_index.serialize(writer)?;
        self.value.serialize(writer)
    }
}

impl Serialize for ElementValue {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        match self {
            ElementValue::Const { tag, value } => {
                tag.serialize(writer)?;
                value.serialize(writer)
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)
            }
            ElementValue::Class(class) => {
                b'c'.serialize(writer)?;
                class.serialize(writer)
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)
            }
        }
    }
}

impl ConstantRefs for Annotation {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        visit(self.type_index);
        for pair in &self.element_value_pairs {
            visit(pair.name_index);
            pair.value.visit_constants(visit);
        }
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.type_index = remap(self.type_index)?;
        for pair in &mut self.element_value_pairs {
            pair.name_index = remap(pair.name_index)?;
            pair.value.remap_constants(remap)?;
        }
        Ok(())
    }
}

impl ConstantRefs for ElementValue {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        match self {
            ElementValue::Const { value, .. } => visit(*value),
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                visit(*type_name);
                visit(*const_name);
            }
            ElementValue::Class(class) => visit(*class),
            ElementValue::Annotation(annotation) => annotation.visit_constants(visit),
            ElementValue::Array(values) => values.visit_constants(visit),
        }
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        match self {
            ElementValue::Const { value, .. } => *value = remap(*value)?,
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                *type_name = remap(*type_name)?;
                *const_name = remap(*const_name)?;
            }
            ElementValue::Class(class) => *class = remap(*class)?,
            ElementValue::Annotation(annotation) => annotation.remap_constants(remap)?,
            ElementValue::Array(values) => values.remap_constants(remap)?,
        }
        Ok(())
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.20
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub target_info: TargetInfo,
    pub target_path: Vec<TypePathEntry>,
    pub annotation: Annotation,
}

/// Location of the annotated type within a declaration
///
/// Targets inside method bodies (`target_type` 0x40 to 0x4B) only occur on `Code` attributes,
/// which are never decoded, so they are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetInfo {
    TypeParameter { index: u8 },
    SuperType { index: u16 },
    TypeParameterBound { type_parameter: u8, bound: u8 },
    Empty,
    FormalParameter { index: u8 },
    Throws { index: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePathEntry {
    pub type_path_kind: u8,
    pub type_argument_index: u8,
}

impl TypeAnnotation {
    pub fn parse(reader: &mut ByteReader) -> Result<TypeAnnotation> {
        let target_offset = reader.offset();
        let target_type = reader.read_u1()?;
        let target_info = match target_type {
            0x00 | 0x01 => TargetInfo::TypeParameter {
                index: reader.read_u1()?,
            },
            0x10 => TargetInfo::SuperType {
                index: reader.read_u2()?,
            },
            0x11 | 0x12 => TargetInfo::TypeParameterBound {
                type_parameter: reader.read_u1()?,
                bound: reader.read_u1()?,
            },
            0x13..=0x15 => TargetInfo::Empty,
            0x16 => TargetInfo::FormalParameter {
                index: reader.read_u1()?,
            },
            0x17 => TargetInfo::Throws {
                index: reader.read_u2()?,
            },
            0x40..=0x4B => {
                return Err(Error::malformed(
                    target_offset,
                    format!(
                        "type annotation target 0x{:02X} is only valid on code",
                        target_type
                    ),
                ))
            }
            _ => {
                return Err(Error::malformed(
                    target_offset,
                    format!("unknown type annotation target 0x{:02X}", target_type),
                ))
            }
        };

        let path_length = reader.read_u1()?;
        let target_path = (0..path_length)
            .map(|_| {
                Ok(TypePathEntry {
                    type_path_kind: reader.read_u1()?,
                    type_argument_index: reader.read_u1()?,
                })
            })
            .collect::<Result<_>>()?;

        Ok(TypeAnnotation {
            target_type,
            target_info,
            target_path,
            annotation: Annotation::parse(reader)?,
        })
    }
}

impl Serialize for TypeAnnotation {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.target_type.serialize(writer)?;
        match self.target_info {
            TargetInfo::TypeParameter { index } | TargetInfo::FormalParameter { index } => {
                index.serialize(writer)?
            }
            TargetInfo::SuperType { index } | TargetInfo::Throws { index } => {
                index.serialize(writer)?
            }
            TargetInfo::TypeParameterBound {
                type_parameter,
                bound,
            } => {
                type_parameter.serialize(writer)?;
                bound.serialize(writer)?;
            }
            TargetInfo::Empty => (),
        }
        let path_length = u8::try_from(self.target_path.len()).map_err(|_| {
            Error::overflow("type path length", self.target_path.len(), u8::MAX as usize)
        })?;
        path_length.serialize(writer)?;
        for entry in &self.target_path {
            entry.type_path_kind.serialize(writer)?;
            entry.type_argument_index.serialize(writer)?;
        }
        self.annotation.serialize(writer)
    }
}

impl ConstantRefs for TypeAnnotation {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        self.annotation.visit_constants(visit)
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.annotation.remap_constants(remap)
    }
}

macro_rules! annotations_attribute {
    ($ty:ident, $name:literal) => {
        /// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.16
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $ty(pub Vec<Annotation>);

        impl AttributeLike for $ty {
            const NAME: &'static str = $name;

            fn parse(reader: &mut ByteReader) -> Result<Self> {
                Ok($ty(Annotation::parse_list(reader)?))
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

macro_rules! parameter_annotations_attribute {
    ($ty:ident, $name:literal) => {
        /// Annotations per formal parameter (the count is a `u1`)
        ///
        /// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.18
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $ty(pub Vec<Vec<Annotation>>);

        impl AttributeLike for $ty {
            const NAME: &'static str = $name;

            fn parse(reader: &mut ByteReader) -> Result<Self> {
                let count = reader.read_u1()?;
                let parameters = (0..count)
                    .map(|_| Annotation::parse_list(reader))
                    .collect::<Result<_>>()?;
                Ok($ty(parameters))
            }
        }

        impl Serialize for $ty {
            fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
                let count = u8::try_from(self.0.len()).map_err(|_| {
                    Error::overflow("annotated parameter count", self.0.len(), u8::MAX as usize)
                })?;
                count.serialize(writer)?;
                for parameter in &self.0 {
                    parameter.serialize(writer)?;
                }
                Ok(())
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

macro_rules! type_annotations_attribute {
    ($ty:ident, $name:literal) => {
        /// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.20
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $ty(pub Vec<TypeAnnotation>);

        impl AttributeLike for $ty {
            const NAME: &'static str = $name;

            fn parse(reader: &mut ByteReader) -> Result<Self> {
                let count = reader.read_u2()?;
                let annotations = (0..count)
                    .map(|_| TypeAnnotation::parse(reader))
                    .collect::<Result<_>>()?;
                Ok($ty(annotations))
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

annotations_attribute!(RuntimeVisibleAnnotations, "RuntimeVisibleAnnotations");
annotations_attribute!(RuntimeInvisibleAnnotations, "RuntimeInvisibleAnnotations");
parameter_annotations_attribute!(
    RuntimeVisibleParameterAnnotations,
    "RuntimeVisibleParameterAnnotations"
);
parameter_annotations_attribute!(
    RuntimeInvisibleParameterAnnotations,
    "RuntimeInvisibleParameterAnnotations"
);
type_annotations_attribute!(RuntimeVisibleTypeAnnotations, "RuntimeVisibleTypeAnnotations");
type_annotations_attribute!(
    RuntimeInvisibleTypeAnnotations,
    "RuntimeInvisibleTypeAnnotations"
);

/// Default value of an annotation interface element
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.22
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationDefault(pub ElementValue);

impl AttributeLike for AnnotationDefault {
    const NAME: &'static str = "AnnotationDefault";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(AnnotationDefault(ElementValue::parse(reader)?))
    }
}

impl Serialize for AnnotationDefault {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl ConstantRefs for AnnotationDefault {
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Attribute;

    fn raw(info: Vec<u8>) -> Attribute {
        Attribute {
            name_index: ConstantIndex(1),
            info,
            offset: 0,
        }
    }

    #[test]
    fn nested_element_values() {
        // @A(v = {1, E.X, @B}) with indices chosen arbitrarily
        let info = vec![
            0, 1, // one annotation
            0, 2, 0, 1, // type #2, one pair
            0, 3, b'[', 0, 3, // name #3, array of three
            b'I', 0, 4, // int #4
            b'e', 0, 5, 0, 6, // enum #5.#6
            b'@', 0, 7, 0, 0, // annotation #7 without pairs
        ];
        let decoded = RuntimeVisibleAnnotations::decode(&raw(info.clone())).unwrap();
        assert_eq!(decoded.to_bytes().unwrap(), info);

        let mut seen = vec![];
        decoded.visit_constants(&mut |idx| seen.push(idx.0));
        assert_eq!(seen, vec![2, 3, 4, 5, 6, 7]);

        let mut shifted = decoded.clone();
        shifted
            .remap_constants(&mut |idx| Ok(ConstantIndex(idx.0 + 10)))
            .unwrap();
        let mut seen = vec![];
        shifted.visit_constants(&mut |idx| seen.push(idx.0));
        assert_eq!(seen, vec![12, 13, 14, 15, 16, 17]);
    }

    #[test]
    fn nesting_limit() {
        // 300 nested arrays
        let mut info = vec![];
        for _ in 0..300 {
            info.extend_from_slice(&[b'[', 0, 1]);
        }
        info.extend_from_slice(&[b'I', 0, 1]);
        assert!(matches!(
            AnnotationDefault::decode(&raw(info)),
            Err(Error::MalformedClassFile { .. })
        ));
    }

    #[test]
    fn parameter_annotations_use_a_byte_count() {
        let info = vec![2, 0, 0, 0, 1, 0, 9, 0, 0];
        let decoded = RuntimeInvisibleParameterAnnotations::decode(&raw(info.clone())).unwrap();
        assert_eq!(decoded.0.len(), 2);
        assert!(decoded.0[0].is_empty());
        assert_eq!(decoded.0[1][0].type_index, ConstantIndex(9));
        assert_eq!(decoded.to_bytes().unwrap(), info);
    }

    #[test]
    fn type_annotations() {
        // method return type (0x14), path into a type argument
        let info = vec![0, 1, 0x14, 1, 3, 0, 0, 8, 0, 0];
        let decoded = RuntimeVisibleTypeAnnotations::decode(&raw(info.clone())).unwrap();
        assert_eq!(decoded.0[0].target_info, TargetInfo::Empty);
        assert_eq!(decoded.to_bytes().unwrap(), info);

        // local variable target (0x40) belongs to code
        let local = vec![0, 1, 0x40, 0, 0];
        assert!(matches!(
            RuntimeVisibleTypeAnnotations::decode(&raw(local)),
            Err(Error::MalformedClassFile { offset: 2, .. })
        ));
    }
}
