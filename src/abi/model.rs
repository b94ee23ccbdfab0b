use super::{
    decide_attribute, decide_field, decide_method, AbiAttribute, AbiRecordComponent,
    AttributeBody, AttributeRewrite, ExtractionPolicy, FilterDecision, MemberContext, MethodStub,
};
use crate::jvm::class_file::{
    Annotation, AnnotationDefault, Attribute, AttributeLike, BootstrapMethods, ClassFile,
    ConstantIndex, ConstantPool, ConstantRefs, ElementValue, InnerClass, InnerClasses, Record,
    RuntimeInvisibleAnnotations, RuntimeInvisibleParameterAnnotations,
    RuntimeInvisibleTypeAnnotations, RuntimeVisibleAnnotations,
    RuntimeVisibleParameterAnnotations, RuntimeVisibleTypeAnnotations, Version,
};
use crate::jvm::{
    signature_class_names, ClassAccessFlags, Error, FieldAccessFlags, FieldType,
    MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, Result,
};
use log::trace;
use std::collections::BTreeSet;

/// Class reduced to its ABI, still pointing into the original constant pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiClass {
    /// Binary name of the class
    pub name: String,
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub this_class: ConstantIndex,
    pub super_class: Option<ConstantIndex>,
    pub interfaces: Vec<ConstantIndex>,

    /// Ordered by name, then descriptor
    pub fields: Vec<AbiField>,

    /// Ordered by name, then descriptor
    pub methods: Vec<AbiMethod>,
    pub attributes: Vec<AbiAttribute>,

    /// `InnerClasses` entries, pruned during compaction
    pub inner_classes: Option<DeferredAttribute<Vec<InnerClass>>>,

    /// `BootstrapMethods`, pruned during compaction
    pub bootstrap_methods: Option<DeferredAttribute<BootstrapMethods>>,

    /// Classes named by retained descriptors and generic signatures
    pub referenced_types: BTreeSet<String>,
}

/// Class attribute whose retained content depends on the rest of the retained structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredAttribute<T> {
    pub name_index: ConstantIndex,
    pub entries: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiField {
    pub access_flags: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub name_index: ConstantIndex,
    pub descriptor_index: ConstantIndex,
    pub attributes: Vec<AbiAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiMethod {
    pub access_flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub name_index: ConstantIndex,
    pub descriptor_index: ConstantIndex,
    pub attributes: Vec<AbiAttribute>,

    /// Body to generate, if method bodies are being stubbed
    pub stub: Option<MethodStub>,
}

/// Where an attribute was found
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AttributeOwner {
    Class,
    Field,
    Method,
    RecordComponent,
}

/// State accumulated while filtering one class
struct Filter<'a> {
    constants: &'a ConstantPool,
    policy: &'a ExtractionPolicy,
    class_name: &'a str,
    referenced_types: BTreeSet<String>,
    inner_classes: Option<DeferredAttribute<Vec<InnerClass>>>,
    bootstrap_methods: Option<DeferredAttribute<BootstrapMethods>>,
}

impl AbiClass {
    /// Keep only the parts of the class that are part of its ABI
    ///
    /// Returns the filtered class along with the original constant pool, which it still indexes.
    pub fn filter(class: ClassFile, policy: &ExtractionPolicy) -> Result<(AbiClass, ConstantPool)> {
        let ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        } = class;

        let name = constants.get_class_name(this_class)?.to_owned();
        if let Some(super_class) = super_class {
            constants.get_class_name(super_class)?;
        }
        for interface in &interfaces {
            constants.get_class_name(*interface)?;
        }

        let mut filter = Filter {
            constants: &constants,
            policy,
            class_name: &name,
            referenced_types: BTreeSet::new(),
            inner_classes: None,
            bootstrap_methods: None,
        };

        let attributes = filter.attributes(&attributes, AttributeOwner::Class)?;
        let context = MemberContext {
            record_accessors: record_accessors(&attributes, &constants)?,
        };

        let mut abi_fields = vec![];
        for field in fields {
            let field_name = constants.get_utf8(field.name_index)?;
            let descriptor = constants.get_utf8(field.descriptor_index)?;
            let field_type = FieldType::parse(descriptor).map_err(|_| {
                Error::dangling(field.descriptor_index.0, "field descriptor", "Utf8")
            })?;

            let access_flags = match decide_field(field.access_flags, policy) {
                FilterDecision::Drop => {
                    trace!("{}: dropping field {} {}", name, field_name, descriptor);
                    continue;
                }
                FilterDecision::Keep => field.access_flags,
                FilterDecision::Rewrite(flags) => flags,
            };
            filter.note_types(field_type.class_name().map(Name::as_str));
            abi_fields.push(AbiField {
                access_flags,
                name: field_name.to_owned(),
                descriptor: descriptor.to_owned(),
                name_index: field.name_index,
                descriptor_index: field.descriptor_index,
                attributes: filter.attributes(&field.attributes, AttributeOwner::Field)?,
            });
        }

        let mut abi_methods = vec![];
        for method in methods {
            let method_name = constants.get_utf8(method.name_index)?;
            let descriptor = constants.get_utf8(method.descriptor_index)?;
            let method_descriptor = MethodDescriptor::parse(descriptor).map_err(|_| {
                Error::dangling(method.descriptor_index.0, "method descriptor", "Utf8")
            })?;

            let decision = decide_method(
                method_name,
                descriptor,
                method.access_flags,
                &context,
                policy,
            );
            let access_flags = match decision {
                FilterDecision::Drop => {
                    trace!("{}: dropping method {}{}", name, method_name, descriptor);
                    continue;
                }
                FilterDecision::Keep => method.access_flags,
                FilterDecision::Rewrite(flags) => flags,
            };
            let stub = if policy.stub_method_bodies {
                MethodStub::for_method(method_name, &method_descriptor, access_flags)?
            } else {
                None
            };
            filter.note_types(method_descriptor.class_names().map(Name::as_str));
            abi_methods.push(AbiMethod {
                access_flags,
                name: method_name.to_owned(),
                descriptor: descriptor.to_owned(),
                name_index: method.name_index,
                descriptor_index: method.descriptor_index,
                attributes: filter.attributes(&method.attributes, AttributeOwner::Method)?,
                stub,
            });
        }

        abi_fields.sort_by(|a, b| (&a.name, &a.descriptor).cmp(&(&b.name, &b.descriptor)));
        abi_methods.sort_by(|a, b| (&a.name, &a.descriptor).cmp(&(&b.name, &b.descriptor)));

        let Filter {
            referenced_types,
            inner_classes,
            bootstrap_methods,
            ..
        } = filter;

        let abi_class = AbiClass {
            name,
            version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields: abi_fields,
            methods: abi_methods,
            attributes,
            inner_classes,
            bootstrap_methods,
            referenced_types,
        };
        Ok((abi_class, constants))
    }

    /// Whether some retained attribute was copied without being understood
    pub fn has_opaque_attributes(&self) -> bool {
        self.attributes
            .iter()
            .chain(self.fields.iter().flat_map(|field| &field.attributes))
            .chain(self.methods.iter().flat_map(|method| &method.attributes))
            .any(|attribute| attribute.body.is_opaque())
    }

    /// Visit every constant the retained structure needs, except for those only needed by
    /// `InnerClasses` and `BootstrapMethods`
    pub fn visit_roots(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        visit(self.this_class);
        self.super_class.visit_constants(visit);
        self.interfaces.visit_constants(visit);
        for field in &self.fields {
            visit(field.name_index);
            visit(field.descriptor_index);
            field.attributes.visit_constants(visit);
        }
        for method in &self.methods {
            visit(method.name_index);
            visit(method.descriptor_index);
            method.attributes.visit_constants(visit);
        }
        self.attributes.visit_constants(visit);
    }

    /// Renumber every constant reference, including those in deferred attributes
    pub fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.this_class = remap(self.this_class)?;
        self.super_class.remap_constants(remap)?;
        self.interfaces.remap_constants(remap)?;
        for field in &mut self.fields {
            field.name_index = remap(field.name_index)?;
            field.descriptor_index = remap(field.descriptor_index)?;
            field.attributes.remap_constants(remap)?;
        }
        for method in &mut self.methods {
            method.name_index = remap(method.name_index)?;
            method.descriptor_index = remap(method.descriptor_index)?;
            method.attributes.remap_constants(remap)?;
        }
        self.attributes.remap_constants(remap)?;
        if let Some(inner_classes) = &mut self.inner_classes {
            inner_classes.name_index = remap(inner_classes.name_index)?;
            inner_classes.entries.remap_constants(remap)?;
        }
        if let Some(bootstrap_methods) = &mut self.bootstrap_methods {
            bootstrap_methods.name_index = remap(bootstrap_methods.name_index)?;
            bootstrap_methods.entries.0.remap_constants(remap)?;
        }
        Ok(())
    }
}

impl<'a> Filter<'a> {
    fn note_types<'b>(&mut self, names: impl IntoIterator<Item = &'b str>) {
        self.referenced_types
            .extend(names.into_iter().map(str::to_owned));
    }

    /// Note the class named by a descriptor stored in the pool
    ///
    /// Annotation payloads are not validated, so descriptors that don't parse are skipped.
    fn note_descriptor_type(&mut self, descriptor: ConstantIndex) -> Result<()> {
        let descriptor = self.constants.get_utf8(descriptor)?;
        if let Ok(field_type) = FieldType::parse(descriptor) {
            self.note_types(field_type.class_name().map(Name::as_str));
        }
        Ok(())
    }

    fn note_annotation_types(&mut self, annotations: &[Annotation]) -> Result<()> {
        for annotation in annotations {
            self.note_annotation_type(annotation)?;
        }
        Ok(())
    }

    fn note_annotation_type(&mut self, annotation: &Annotation) -> Result<()> {
        self.note_descriptor_type(annotation.type_index)?;
        for pair in &annotation.element_value_pairs {
            self.note_element_value_types(&pair.value)?;
        }
        Ok(())
    }

    fn note_element_value_types(&mut self, value: &ElementValue) -> Result<()> {
        match value {
            ElementValue::Const { .. } => Ok(()),
            ElementValue::Enum { type_name, .. } => self.note_descriptor_type(*type_name),
            // Return descriptor, but `V` is the only one that isn't also a field type
            ElementValue::Class(class) => self.note_descriptor_type(*class),
            ElementValue::Annotation(annotation) => self.note_annotation_type(annotation),
            ElementValue::Array(values) => {
                for value in values {
                    self.note_element_value_types(value)?;
                }
                Ok(())
            }
        }
    }

    /// Filter and decode the attributes of one owner
    fn attributes(
        &mut self,
        attributes: &[Attribute],
        owner: AttributeOwner,
    ) -> Result<Vec<AbiAttribute>> {
        let mut retained = vec![];
        for attribute in attributes {
            let name = self.constants.get_utf8(attribute.name_index)?;
            let body = match decide_attribute(name, self.policy) {
                FilterDecision::Drop => {
                    trace!("{}: dropping {} attribute", self.class_name, name);
                    continue;
                }
                FilterDecision::Keep => AttributeBody::decode(name, attribute)?,
                FilterDecision::Rewrite(rewrite) => {
                    match self.rewrite(name, attribute, rewrite, owner)? {
                        Some(body) => body,
                        None => continue,
                    }
                }
            };

            match &body {
                AttributeBody::Signature(signature) => {
                    let signature = self.constants.get_utf8(signature.signature)?;
                    // Malformed signatures are kept as they are, contributing whatever names
                    // were read before the error
                    let _ = signature_class_names(signature, &mut self.referenced_types);
                }
                AttributeBody::RuntimeVisibleAnnotations(RuntimeVisibleAnnotations(list))
                | AttributeBody::RuntimeInvisibleAnnotations(RuntimeInvisibleAnnotations(list)) => {
                    self.note_annotation_types(list)?;
                }
                AttributeBody::RuntimeVisibleParameterAnnotations(
                    RuntimeVisibleParameterAnnotations(parameters),
                )
                | AttributeBody::RuntimeInvisibleParameterAnnotations(
                    RuntimeInvisibleParameterAnnotations(parameters),
                ) => {
                    for list in parameters {
                        self.note_annotation_types(list)?;
                    }
                }
                AttributeBody::RuntimeVisibleTypeAnnotations(RuntimeVisibleTypeAnnotations(list))
                | AttributeBody::RuntimeInvisibleTypeAnnotations(
                    RuntimeInvisibleTypeAnnotations(list),
                ) => {
                    for type_annotation in list {
                        self.note_annotation_type(&type_annotation.annotation)?;
                    }
                }
                AttributeBody::AnnotationDefault(AnnotationDefault(value)) => {
                    self.note_element_value_types(value)?;
                }
                _ => (),
            }

            retained.push(AbiAttribute {
                name: name.to_owned(),
                name_index: attribute.name_index,
                body,
            });
        }
        Ok(retained)
    }

    fn rewrite(
        &mut self,
        name: &str,
        attribute: &Attribute,
        rewrite: AttributeRewrite,
        owner: AttributeOwner,
    ) -> Result<Option<AttributeBody>> {
        match (rewrite, owner) {
            (AttributeRewrite::InnerClasses, AttributeOwner::Class) => {
                let InnerClasses(entries) = InnerClasses::decode(attribute)?;
                self.inner_classes = Some(DeferredAttribute {
                    name_index: attribute.name_index,
                    entries,
                });
                Ok(None)
            }
            (AttributeRewrite::BootstrapMethods, AttributeOwner::Class) => {
                self.bootstrap_methods = Some(DeferredAttribute {
                    name_index: attribute.name_index,
                    entries: BootstrapMethods::decode(attribute)?,
                });
                Ok(None)
            }
            (AttributeRewrite::RecordComponents, AttributeOwner::Class) => {
                let Record(components) = Record::decode(attribute)?;
                let mut abi_components = Vec::with_capacity(components.len());
                for component in components {
                    let descriptor = self.constants.get_utf8(component.descriptor_index)?;
                    self.constants.get_utf8(component.name_index)?;
                    if let Ok(field_type) = FieldType::parse(descriptor) {
                        self.note_types(field_type.class_name().map(Name::as_str));
                    }
                    let mut attributes =
                        self.attributes(&component.attributes, AttributeOwner::RecordComponent)?;
                    attributes.sort_by(|a, b| a.name.cmp(&b.name));
                    abi_components.push(AbiRecordComponent {
                        name_index: component.name_index,
                        descriptor_index: component.descriptor_index,
                        attributes,
                    });
                }
                Ok(Some(AttributeBody::Record(abi_components)))
            }
            _ => {
                trace!("{}: dropping {} attribute", self.class_name, name);
                Ok(None)
            }
        }
    }
}

/// Accessors implied by the `Record` attribute, if there is one
fn record_accessors(
    attributes: &[AbiAttribute],
    constants: &ConstantPool,
) -> Result<Vec<(String, String)>> {
    let mut accessors = vec![];
    for attribute in attributes {
        if let AttributeBody::Record(components) = &attribute.body {
            for component in components {
                let name = constants.get_utf8(component.name_index)?;
                let descriptor = constants.get_utf8(component.descriptor_index)?;
                accessors.push((name.to_owned(), format!("(){}", descriptor)));
            }
        }
    }
    Ok(accessors)
}
