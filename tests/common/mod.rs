#![allow(dead_code)]

use abi_extractor::jvm::class_file::{
    AnnotationDefault, Attribute, AttributeLike, ClassFile, Code, ConstantIndex, ConstantPool,
    ConstantPoolBuilder, ConstantRefs, ConstantValue, EnclosingMethod, Exceptions, Field,
    InnerClasses, Method, Module, ModuleMainClass, ModulePackages, NestHost, NestMembers,
    PermittedSubclasses, Record, RuntimeInvisibleAnnotations, RuntimeInvisibleParameterAnnotations,
    RuntimeInvisibleTypeAnnotations, RuntimeVisibleAnnotations,
    RuntimeVisibleParameterAnnotations, RuntimeVisibleTypeAnnotations, Signature, Version,
};
use abi_extractor::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, Serialize};
use std::collections::BTreeSet;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assembles class files for tests, one member at a time
///
/// Constants are interned in the order members are added, so two fixtures built with the same
/// sequence of calls have identical pools.
pub struct ClassFixture {
    pub constants: ConstantPoolBuilder,
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub this_class: ConstantIndex,
    pub super_class: Option<ConstantIndex>,
    pub interfaces: Vec<ConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFixture {
    /// Public class extending `java/lang/Object`
    pub fn new(name: &str) -> ClassFixture {
        let mut constants = ConstantPoolBuilder::new();
        let this_class = constants.get_class(name).unwrap();
        let super_class = constants.get_class("java/lang/Object").unwrap();
        ClassFixture {
            constants,
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    pub fn field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) {
        let name_index = self.constants.get_utf8(name).unwrap();
        let descriptor_index = self.constants.get_utf8(descriptor).unwrap();
        self.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }

    pub fn method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) {
        let name_index = self.constants.get_utf8(name).unwrap();
        let descriptor_index = self.constants.get_utf8(descriptor).unwrap();
        self.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }

    /// Attribute with an arbitrary name and payload
    pub fn raw_attribute(&mut self, name: &str, info: Vec<u8>) -> Attribute {
        Attribute {
            name_index: self.constants.get_utf8(name).unwrap(),
            info,
            offset: 0,
        }
    }

    /// `Code` attribute with a `LineNumberTable` mapping every instruction to `line`
    pub fn code(&mut self, code_array: Vec<u8>, line: u16) -> Attribute {
        let [hi, lo] = line.to_be_bytes();
        let line_numbers = self.raw_attribute("LineNumberTable", vec![0, 1, 0, 0, hi, lo]);
        let code = Code {
            max_stack: 2,
            max_locals: 1,
            code_array,
            exception_table: vec![],
            attributes: vec![line_numbers],
        };
        self.constants.get_attribute(&code).unwrap()
    }

    pub fn signature(&mut self, signature: &str) -> Attribute {
        let signature = Signature {
            signature: self.constants.get_utf8(signature).unwrap(),
        };
        self.constants.get_attribute(&signature).unwrap()
    }

    pub fn int_constant(&mut self, value: i32) -> Attribute {
        let value = self
            .constants
            .push_constant(abi_extractor::jvm::class_file::Constant::Integer(value))
            .unwrap();
        self.constants.get_attribute(&ConstantValue(value)).unwrap()
    }

    pub fn source_file(&mut self, file: &str) -> Attribute {
        let file = self.constants.get_utf8(file).unwrap();
        let [hi, lo] = file.0.to_be_bytes();
        self.raw_attribute("SourceFile", vec![hi, lo])
    }

    pub fn to_bytes(self) -> Vec<u8> {
        ClassFile {
            version: self.version,
            constants: self.constants.into_pool(),
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
        .to_bytes()
        .unwrap()
    }
}

/// Every `Utf8` entry of the pool
pub fn utf8_entries(constants: &ConstantPool) -> Vec<String> {
    constants
        .iter()
        .filter_map(|(index, _)| constants.get_utf8(index).ok().map(str::to_owned))
        .collect()
}

pub fn attribute_names(constants: &ConstantPool, attributes: &[Attribute]) -> Vec<String> {
    attributes
        .iter()
        .map(|attribute| constants.get_utf8(attribute.name_index).unwrap().to_owned())
        .collect()
}

fn visit_attributes(
    constants: &ConstantPool,
    attributes: &[Attribute],
    visit: &mut dyn FnMut(ConstantIndex),
) {
    for attribute in attributes {
        visit(attribute.name_index);
        match constants.get_utf8(attribute.name_index).unwrap() {
            "ConstantValue" => ConstantValue::decode(attribute).unwrap().visit_constants(visit),
            "Signature" => Signature::decode(attribute).unwrap().visit_constants(visit),
            "Exceptions" => Exceptions::decode(attribute).unwrap().visit_constants(visit),
            "InnerClasses" => InnerClasses::decode(attribute).unwrap().0.visit_constants(visit),
            "EnclosingMethod" => EnclosingMethod::decode(attribute).unwrap().visit_constants(visit),
            "NestHost" => NestHost::decode(attribute).unwrap().visit_constants(visit),
            "NestMembers" => NestMembers::decode(attribute).unwrap().visit_constants(visit),
            "PermittedSubclasses" => PermittedSubclasses::decode(attribute)
                .unwrap()
                .visit_constants(visit),
            "RuntimeVisibleAnnotations" => RuntimeVisibleAnnotations::decode(attribute)
                .unwrap()
                .visit_constants(visit),
            "RuntimeInvisibleAnnotations" => RuntimeInvisibleAnnotations::decode(attribute)
                .unwrap()
                .visit_constants(visit),
            "RuntimeVisibleParameterAnnotations" => {
                RuntimeVisibleParameterAnnotations::decode(attribute)
                    .unwrap()
                    .visit_constants(visit)
            }
            "RuntimeInvisibleParameterAnnotations" => {
                RuntimeInvisibleParameterAnnotations::decode(attribute)
                    .unwrap()
                    .visit_constants(visit)
            }
            "RuntimeVisibleTypeAnnotations" => RuntimeVisibleTypeAnnotations::decode(attribute)
                .unwrap()
                .visit_constants(visit),
            "RuntimeInvisibleTypeAnnotations" => {
                RuntimeInvisibleTypeAnnotations::decode(attribute)
                    .unwrap()
                    .visit_constants(visit)
            }
            "AnnotationDefault" => AnnotationDefault::decode(attribute)
                .unwrap()
                .visit_constants(visit),
            "Module" => Module::decode(attribute).unwrap().visit_constants(visit),
            "ModulePackages" => ModulePackages::decode(attribute).unwrap().visit_constants(visit),
            "ModuleMainClass" => ModuleMainClass::decode(attribute)
                .unwrap()
                .visit_constants(visit),
            "Record" => {
                for component in Record::decode(attribute).unwrap().0 {
                    visit(component.name_index);
                    visit(component.descriptor_index);
                    visit_attributes(constants, &component.attributes, visit);
                }
            }
            "Deprecated" => (),
            other => panic!("closure check does not understand {} attributes", other),
        }
    }
}

/// Pool entries reachable from the structure of the class
pub fn reachable_constants(class: &ClassFile) -> BTreeSet<u16> {
    let constants = &class.constants;
    let mut roots = vec![class.this_class];
    class.super_class.visit_constants(&mut |idx| roots.push(idx));
    roots.extend(&class.interfaces);
    for field in &class.fields {
        roots.push(field.name_index);
        roots.push(field.descriptor_index);
        visit_attributes(constants, &field.attributes, &mut |idx| roots.push(idx));
    }
    for method in &class.methods {
        roots.push(method.name_index);
        roots.push(method.descriptor_index);
        visit_attributes(constants, &method.attributes, &mut |idx| roots.push(idx));
    }
    visit_attributes(constants, &class.attributes, &mut |idx| roots.push(idx));

    let mut reachable = BTreeSet::new();
    while let Some(index) = roots.pop() {
        if reachable.insert(index.0) {
            constants
                .get(index)
                .unwrap()
                .visit_constants(&mut |idx| roots.push(idx));
        }
    }
    reachable
}
