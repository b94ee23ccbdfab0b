use super::{BinaryName, Name};
use crate::util::Width;
use std::collections::BTreeSet;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing base type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

impl RefType {
    /// Class mentioned by this type, if any (the element class for arrays of objects)
    pub fn class_name(&self) -> Option<&BinaryName> {
        match self {
            RefType::Object(name) => Some(name),
            RefType::ObjectArray(arr) => Some(&arr.element_type),
            RefType::PrimitiveArray(_) => None,
        }
    }
}

/// Generic array type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source.next().ok_or_else(|| {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    Error::new(ErrorKind::UnexpectedEof, msg)
                })?;
                if c == ';' {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg));
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected object type to start with `L`",
            ))
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(BinaryName::parse_from(source)?),
            Some('[') => {
                source.next();
                let mut additional_dimensions = 0;
                while let Some('[') = source.peek().copied() {
                    additional_dimensions += 1;
                    source.next();
                }
                if additional_dimensions >= 255 {
                    let msg = "Array type has more than 255 dimensions";
                    return Err(Error::new(ErrorKind::InvalidInput, msg));
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: BinaryName::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing field type";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        })
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub fn class_name(&self) -> Option<&BinaryName> {
        match self {
            FieldType::Base(_) => None,
            FieldType::Ref(ref_type) => ref_type.class_name(),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Classes mentioned in parameters or the return type
    pub fn class_names(&self) -> impl Iterator<Item = &BinaryName> {
        self.parameters
            .iter()
            .chain(self.return_type.iter())
            .filter_map(FieldType::class_name)
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        // Assert open paren
        if source.next() != Some('(') {
            let msg = "Expected '(' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        // Parse parameters
        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            parameters.push(FieldType::parse_from(source)?);
        }

        // Parse return type
        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

/// Collect the binary names of every class mentioned in a generic signature
///
/// Handles class, method, and field signatures. Nested class types written as
/// `Lpkg/Outer<TT;>.Inner;` are reported both as `pkg/Outer` and `pkg/Outer$Inner`. Type
/// variables are not class names and are skipped.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.9.1
pub fn signature_class_names(signature: &str, names: &mut BTreeSet<String>) -> Result<()> {
    let mut source = signature.chars().peekable();
    if source.peek() == Some(&'<') {
        parse_type_parameters(&mut source, names)?;
    }

    if source.next_if_eq(&'(').is_some() {
        while source.next_if_eq(&')').is_none() {
            parse_java_type_signature(&mut source, names)?;
        }
        if source.next_if_eq(&'V').is_none() {
            parse_java_type_signature(&mut source, names)?;
        }
        while source.next_if_eq(&'^').is_some() {
            parse_reference_type_signature(&mut source, names)?;
        }
    } else {
        // Superclass followed by superinterfaces, or a single field type
        parse_reference_type_signature(&mut source, names)?;
        while source.peek().is_some() {
            parse_reference_type_signature(&mut source, names)?;
        }
    }

    match source.next() {
        None => Ok(()),
        Some(c) => {
            let msg = format!("Unexpected leftover signature input '{}'", c);
            Err(Error::new(ErrorKind::InvalidInput, msg))
        }
    }
}

fn expect_char(source: &mut Peekable<Chars>, expected: char) -> Result<()> {
    match source.next() {
        Some(c) if c == expected => Ok(()),
        Some(c) => {
            let msg = format!("Expected '{}' in signature, found '{}'", expected, c);
            Err(Error::new(ErrorKind::InvalidInput, msg))
        }
        None => {
            let msg = format!("Expected '{}' in signature, found end of input", expected);
            Err(Error::new(ErrorKind::UnexpectedEof, msg))
        }
    }
}

/// Read characters up to (but not including) one of the terminators
fn read_identifier(source: &mut Peekable<Chars>, terminators: &[char]) -> Result<String> {
    let mut identifier = String::new();
    while let Some(c) = source.next_if(|c| !terminators.contains(c)) {
        identifier.push(c);
    }
    if identifier.is_empty() {
        let msg = "Empty identifier in signature";
        return Err(Error::new(ErrorKind::InvalidInput, msg));
    }
    Ok(identifier)
}

fn parse_type_parameters(source: &mut Peekable<Chars>, names: &mut BTreeSet<String>) -> Result<()> {
    expect_char(source, '<')?;
    loop {
        read_identifier(source, &[':', '>', ';'])?;
        expect_char(source, ':')?;

        // Class bound may be empty (eg. `T::Ljava/lang/Comparable;`)
        if !matches!(source.peek(), Some(':') | Some('>')) {
            parse_reference_type_signature(source, names)?;
        }
        while source.next_if_eq(&':').is_some() {
            parse_reference_type_signature(source, names)?;
        }
        if source.next_if_eq(&'>').is_some() {
            return Ok(());
        }
    }
}

fn parse_java_type_signature(
    source: &mut Peekable<Chars>,
    names: &mut BTreeSet<String>,
) -> Result<()> {
    match source.peek().copied() {
        Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
            source.next();
            Ok(())
        }
        _ => parse_reference_type_signature(source, names),
    }
}

fn parse_reference_type_signature(
    source: &mut Peekable<Chars>,
    names: &mut BTreeSet<String>,
) -> Result<()> {
    match source.peek().copied() {
        Some('L') => parse_class_type_signature(source, names),
        Some('T') => {
            source.next();
            read_identifier(source, &[';'])?;
            expect_char(source, ';')
        }
        Some('[') => {
            source.next();
            parse_java_type_signature(source, names)
        }
        Some(c) => {
            let msg = format!("Invalid reference type signature character '{}'", c);
            Err(Error::new(ErrorKind::InvalidInput, msg))
        }
        None => {
            let msg = "Missing reference type signature";
            Err(Error::new(ErrorKind::UnexpectedEof, msg))
        }
    }
}

fn parse_class_type_signature(
    source: &mut Peekable<Chars>,
    names: &mut BTreeSet<String>,
) -> Result<()> {
    const TERMINATORS: [char; 3] = ['<', '.', ';'];

    expect_char(source, 'L')?;
    let mut class_name = read_identifier(source, &TERMINATORS)?;
    names.insert(class_name.clone());
    if source.peek() == Some(&'<') {
        parse_type_arguments(source, names)?;
    }
    while source.next_if_eq(&'.').is_some() {
        let simple_name = read_identifier(source, &TERMINATORS)?;
        class_name.push('$');
        class_name.push_str(&simple_name);
        names.insert(class_name.clone());
        if source.peek() == Some(&'<') {
            parse_type_arguments(source, names)?;
        }
    }
    expect_char(source, ';')
}

fn parse_type_arguments(source: &mut Peekable<Chars>, names: &mut BTreeSet<String>) -> Result<()> {
    expect_char(source, '<')?;
    loop {
        match source.peek().copied() {
            Some('>') => {
                source.next();
                return Ok(());
            }
            Some('*') => {
                source.next();
            }
            Some('+' | '-') => {
                source.next();
                parse_reference_type_signature(source, names)?;
            }
            _ => parse_reference_type_signature(source, names)?,
        }
    }
}
