use super::{AbiAttribute, AbiClass, ExtractionPolicy};
use crate::jvm::class_file::{
    Attribute, AttributeLike, BootstrapMethods, ClassFile, ConstantPoolBuilder, Field,
    InnerClasses, Method,
};
use crate::jvm::{Result, Serialize};

/// Attributes in the order they are written: by name, keeping the original order among equals
fn sorted_attributes(mut attributes: Vec<(String, Attribute)>) -> Vec<Attribute> {
    attributes.sort_by(|(a, _), (b, _)| a.cmp(b));
    attributes
        .into_iter()
        .map(|(_, attribute)| attribute)
        .collect()
}

fn encode_attributes(attributes: &[AbiAttribute]) -> Result<Vec<(String, Attribute)>> {
    attributes
        .iter()
        .map(|attribute| Ok((attribute.name.clone(), attribute.to_attribute()?)))
        .collect()
}

/// Serialize a compacted class
///
/// `constants` must already hold every entry `class` refers to. Method stubs add whatever they
/// need after those entries, so that re-extracting the output yields the same bytes.
pub fn emit(
    class: &AbiClass,
    mut constants: ConstantPoolBuilder,
    policy: &ExtractionPolicy,
) -> Result<Vec<u8>> {
    let fields = class
        .fields
        .iter()
        .map(|field| {
            Ok(Field {
                access_flags: field.access_flags,
                name_index: field.name_index,
                descriptor_index: field.descriptor_index,
                attributes: sorted_attributes(encode_attributes(&field.attributes)?),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut methods = Vec::with_capacity(class.methods.len());
    for method in &class.methods {
        let mut attributes = encode_attributes(&method.attributes)?;
        if let Some(stub) = &method.stub {
            let code = stub.to_code(&policy.stub_exception_class, &mut constants)?;
            attributes.push((String::from("Code"), code));
        }
        methods.push(Method {
            access_flags: method.access_flags,
            name_index: method.name_index,
            descriptor_index: method.descriptor_index,
            attributes: sorted_attributes(attributes),
        });
    }

    let mut attributes = encode_attributes(&class.attributes)?;
    if let Some(inner_classes) = &class.inner_classes {
        attributes.push((
            String::from(InnerClasses::NAME),
            Attribute {
                name_index: inner_classes.name_index,
                info: InnerClasses(inner_classes.entries.clone()).to_bytes()?,
                offset: 0,
            },
        ));
    }
    if let Some(bootstrap_methods) = &class.bootstrap_methods {
        attributes.push((
            String::from(BootstrapMethods::NAME),
            Attribute {
                name_index: bootstrap_methods.name_index,
                info: bootstrap_methods.entries.to_bytes()?,
                offset: 0,
            },
        ));
    }

    let class_file = ClassFile {
        version: class.version,
        constants: constants.into_pool(),
        access_flags: class.access_flags,
        this_class: class.this_class,
        super_class: class.super_class,
        interfaces: class.interfaces.clone(),
        fields,
        methods,
        attributes: sorted_attributes(attributes),
    };
    class_file.to_bytes()
}
