use crate::jvm::class_file::{Attribute, Code, ConstantPoolBuilder};
use crate::jvm::{
    BaseType, BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor, Name, Result,
    UnqualifiedName,
};

/// Body given to a retained method so that the class can still be loaded
///
/// Stubs never do anything useful: constructors throw, everything else returns the default value
/// of its return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodStub {
    /// `new E; dup; invokespecial E.<init>()V; athrow`
    ThrowFromConstructor { max_locals: u16 },

    /// Push the default value (if any) and return it
    ReturnDefault { kind: ReturnKind, max_locals: u16 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ReturnKind {
    fn of(return_type: &Option<FieldType>) -> ReturnKind {
        match return_type {
            None => ReturnKind::Void,
            Some(FieldType::Ref(_)) => ReturnKind::Reference,
            Some(FieldType::Base(BaseType::Long)) => ReturnKind::Long,
            Some(FieldType::Base(BaseType::Float)) => ReturnKind::Float,
            Some(FieldType::Base(BaseType::Double)) => ReturnKind::Double,
            Some(FieldType::Base(_)) => ReturnKind::Int,
        }
    }

    /// Instructions and the stack depth they need
    fn instructions(self) -> (&'static [u8], u16) {
        match self {
            ReturnKind::Void => (&[0xb1], 0),      // return
            ReturnKind::Int => (&[0x03, 0xac], 1), // iconst_0; ireturn
            ReturnKind::Long => (&[0x09, 0xad], 2), // lconst_0; lreturn
            ReturnKind::Float => (&[0x0b, 0xae], 1), // fconst_0; freturn
            ReturnKind::Double => (&[0x0e, 0xaf], 2), // dconst_0; dreturn
            ReturnKind::Reference => (&[0x01, 0xb0], 1), // aconst_null; areturn
        }
    }
}

impl MethodStub {
    /// Stub for a method, or `None` for abstract methods (which must not have a body)
    pub fn for_method(
        name: &str,
        descriptor: &MethodDescriptor,
        flags: MethodAccessFlags,
    ) -> Result<Option<MethodStub>> {
        if flags.contains(MethodAccessFlags::ABSTRACT) {
            return Ok(None);
        }
        let slots = descriptor.parameter_length(!flags.contains(MethodAccessFlags::STATIC));
        let max_locals = u16::try_from(slots)
            .map_err(|_| Error::overflow("max_locals", slots, u16::MAX as usize))?;
        let stub = if name == UnqualifiedName::INIT.as_str() {
            MethodStub::ThrowFromConstructor { max_locals }
        } else {
            MethodStub::ReturnDefault {
                kind: ReturnKind::of(&descriptor.return_type),
                max_locals,
            }
        };
        Ok(Some(stub))
    }

    /// Build the `Code` attribute, adding whatever constants it needs to the pool
    pub fn to_code(
        &self,
        exception_class: &BinaryName,
        constants: &mut ConstantPoolBuilder,
    ) -> Result<Attribute> {
        let code = match self {
            MethodStub::ThrowFromConstructor { max_locals } => {
                let class = constants.get_class(exception_class.as_str())?;
                let constructor = constants.get_method_ref(
                    exception_class.as_str(),
                    UnqualifiedName::INIT.as_str(),
                    "()V",
                    false,
                )?;
                let [class_hi, class_lo] = class.0.to_be_bytes();
                let [init_hi, init_lo] = constructor.0.to_be_bytes();
                Code {
                    max_stack: 2,
                    max_locals: *max_locals,
                    code_array: vec![
                        0xbb, class_hi, class_lo, // new
                        0x59, // dup
                        0xb7, init_hi, init_lo, // invokespecial
                        0xbf, // athrow
                    ],
                    exception_table: vec![],
                    attributes: vec![],
                }
            }
            MethodStub::ReturnDefault { kind, max_locals } => {
                let (instructions, max_stack) = kind.instructions();
                Code {
                    max_stack,
                    max_locals: *max_locals,
                    code_array: instructions.to_vec(),
                    exception_table: vec![],
                    attributes: vec![],
                }
            }
        };
        constants.get_attribute(&code)
    }
}
