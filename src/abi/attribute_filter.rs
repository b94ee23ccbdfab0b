use super::{ExtractionPolicy, FilterDecision, UnknownAttributePolicy};
use crate::jvm::class_file::{
    AnnotationDefault, Attribute, AttributeLike, ConstantIndex, ConstantRefs, ConstantValue,
    EnclosingMethod, Exceptions, Module, ModuleMainClass, ModulePackages, NestHost, NestMembers,
    PermittedSubclasses, RuntimeInvisibleAnnotations, RuntimeInvisibleParameterAnnotations,
    RuntimeInvisibleTypeAnnotations, RuntimeVisibleAnnotations,
    RuntimeVisibleParameterAnnotations, RuntimeVisibleTypeAnnotations, Signature,
};
use crate::jvm::{ByteWriter, Error, Result, Serialize};

/// How an attribute is treated, by name
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeRule {
    /// Observable by a compiler of dependent code
    Keep,

    /// Runtime-only or debugging information
    Drop,

    /// Kept when `keep_deprecated` is set
    Deprecation,

    /// Kept when `keep_invisible_annotations` is set
    InvisibleAnnotation,

    /// Replaced by something derived from the retained structure
    Rewrite(AttributeRewrite),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeRewrite {
    /// Entries filtered down to the classes still referenced
    InnerClasses,

    /// Entries filtered down to those used by retained dynamic constants, then renumbered
    BootstrapMethods,

    /// Body dropped (and possibly replaced by a stub)
    MethodBody,

    /// Components kept, with their own attributes filtered
    RecordComponents,
}

/// Every attribute defined by the class file format, sorted by name
const ATTRIBUTE_RULES: [(&str, AttributeRule); 30] = [
    ("AnnotationDefault", AttributeRule::Keep),
    (
        "BootstrapMethods",
        AttributeRule::Rewrite(AttributeRewrite::BootstrapMethods),
    ),
    ("Code", AttributeRule::Rewrite(AttributeRewrite::MethodBody)),
    ("ConstantValue", AttributeRule::Keep),
    ("Deprecated", AttributeRule::Deprecation),
    ("EnclosingMethod", AttributeRule::Keep),
    ("Exceptions", AttributeRule::Keep),
    (
        "InnerClasses",
        AttributeRule::Rewrite(AttributeRewrite::InnerClasses),
    ),
    ("LineNumberTable", AttributeRule::Drop),
    ("LocalVariableTable", AttributeRule::Drop),
    ("LocalVariableTypeTable", AttributeRule::Drop),
    ("MethodParameters", AttributeRule::Drop),
    ("Module", AttributeRule::Keep),
    ("ModuleMainClass", AttributeRule::Keep),
    ("ModulePackages", AttributeRule::Keep),
    ("NestHost", AttributeRule::Keep),
    ("NestMembers", AttributeRule::Keep),
    ("PermittedSubclasses", AttributeRule::Keep),
    (
        "Record",
        AttributeRule::Rewrite(AttributeRewrite::RecordComponents),
    ),
    (
        "RuntimeInvisibleAnnotations",
        AttributeRule::InvisibleAnnotation,
    ),
    (
        "RuntimeInvisibleParameterAnnotations",
        AttributeRule::InvisibleAnnotation,
    ),
    (
        "RuntimeInvisibleTypeAnnotations",
        AttributeRule::InvisibleAnnotation,
    ),
    ("RuntimeVisibleAnnotations", AttributeRule::Keep),
    ("RuntimeVisibleParameterAnnotations", AttributeRule::Keep),
    ("RuntimeVisibleTypeAnnotations", AttributeRule::Keep),
    ("Signature", AttributeRule::Keep),
    ("SourceDebugExtension", AttributeRule::Drop),
    ("SourceFile", AttributeRule::Drop),
    ("StackMapTable", AttributeRule::Drop),
    ("Synthetic", AttributeRule::Drop),
];

/// Rule for a known attribute, or `None` if the name is not part of the class file format
pub fn attribute_rule(name: &str) -> Option<AttributeRule> {
    ATTRIBUTE_RULES
        .binary_search_by_key(&name, |(rule_name, _)| *rule_name)
        .ok()
        .map(|idx| ATTRIBUTE_RULES[idx].1)
}

/// Decide what happens to an attribute with this name
pub fn decide_attribute(name: &str, policy: &ExtractionPolicy) -> FilterDecision<AttributeRewrite> {
    let keep_if = |keep: bool| {
        if keep {
            FilterDecision::Keep
        } else {
            FilterDecision::Drop
        }
    };
    match attribute_rule(name) {
        Some(AttributeRule::Keep) => FilterDecision::Keep,
        Some(AttributeRule::Drop) => FilterDecision::Drop,
        Some(AttributeRule::Deprecation) => keep_if(policy.keep_deprecated),
        Some(AttributeRule::InvisibleAnnotation) => keep_if(policy.keep_invisible_annotations),
        Some(AttributeRule::Rewrite(rewrite)) => FilterDecision::Rewrite(rewrite),
        None => keep_if(policy.unknown_attribute_policy == UnknownAttributePolicy::Keep),
    }
}

/// Attribute retained in the ABI, decoded so its constant references can be renumbered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiAttribute {
    pub name: String,
    pub name_index: ConstantIndex,
    pub body: AttributeBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeBody {
    ConstantValue(ConstantValue),
    Signature(Signature),
    Exceptions(Exceptions),
    EnclosingMethod(EnclosingMethod),
    NestHost(NestHost),
    NestMembers(NestMembers),
    PermittedSubclasses(PermittedSubclasses),
    RuntimeVisibleAnnotations(RuntimeVisibleAnnotations),
    RuntimeInvisibleAnnotations(RuntimeInvisibleAnnotations),
    RuntimeVisibleParameterAnnotations(RuntimeVisibleParameterAnnotations),
    RuntimeInvisibleParameterAnnotations(RuntimeInvisibleParameterAnnotations),
    RuntimeVisibleTypeAnnotations(RuntimeVisibleTypeAnnotations),
    RuntimeInvisibleTypeAnnotations(RuntimeInvisibleTypeAnnotations),
    AnnotationDefault(AnnotationDefault),
    Module(Module),
    ModulePackages(ModulePackages),
    ModuleMainClass(ModuleMainClass),
    Record(Vec<AbiRecordComponent>),

    /// Attribute without payload (eg. `Deprecated`)
    Marker,

    /// Unclassified attribute, copied byte for byte
    Opaque(Vec<u8>),
}

/// Record component whose attributes have been filtered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiRecordComponent {
    pub name_index: ConstantIndex,
    pub descriptor_index: ConstantIndex,
    pub attributes: Vec<AbiAttribute>,
}

impl AttributeBody {
    /// Decode the payload of a kept attribute
    ///
    /// `Record` is not handled here since its components need filtering of their own.
    pub fn decode(name: &str, attribute: &Attribute) -> Result<AttributeBody> {
        Ok(match name {
            "ConstantValue" => AttributeBody::ConstantValue(ConstantValue::decode(attribute)?),
            "Signature" => AttributeBody::Signature(Signature::decode(attribute)?),
            "Exceptions" => AttributeBody::Exceptions(Exceptions::decode(attribute)?),
            "EnclosingMethod" => {
                AttributeBody::EnclosingMethod(EnclosingMethod::decode(attribute)?)
            }
            "NestHost" => AttributeBody::NestHost(NestHost::decode(attribute)?),
            "NestMembers" => AttributeBody::NestMembers(NestMembers::decode(attribute)?),
            "PermittedSubclasses" => {
                AttributeBody::PermittedSubclasses(PermittedSubclasses::decode(attribute)?)
            }
            "RuntimeVisibleAnnotations" => AttributeBody::RuntimeVisibleAnnotations(
                RuntimeVisibleAnnotations::decode(attribute)?,
            ),
            "RuntimeInvisibleAnnotations" => AttributeBody::RuntimeInvisibleAnnotations(
                RuntimeInvisibleAnnotations::decode(attribute)?,
            ),
            "RuntimeVisibleParameterAnnotations" => {
                AttributeBody::RuntimeVisibleParameterAnnotations(
                    RuntimeVisibleParameterAnnotations::decode(attribute)?,
                )
            }
            "RuntimeInvisibleParameterAnnotations" => {
                AttributeBody::RuntimeInvisibleParameterAnnotations(
                    RuntimeInvisibleParameterAnnotations::decode(attribute)?,
                )
            }
            "RuntimeVisibleTypeAnnotations" => AttributeBody::RuntimeVisibleTypeAnnotations(
                RuntimeVisibleTypeAnnotations::decode(attribute)?,
            ),
            "RuntimeInvisibleTypeAnnotations" => {
                AttributeBody::RuntimeInvisibleTypeAnnotations(
                    RuntimeInvisibleTypeAnnotations::decode(attribute)?,
                )
            }
            "AnnotationDefault" => {
                AttributeBody::AnnotationDefault(AnnotationDefault::decode(attribute)?)
            }
            "Module" => AttributeBody::Module(Module::decode(attribute)?),
            "ModulePackages" => {
                AttributeBody::ModulePackages(ModulePackages::decode(attribute)?)
            }
            "ModuleMainClass" => {
                AttributeBody::ModuleMainClass(ModuleMainClass::decode(attribute)?)
            }
            "Deprecated" | "Synthetic" => {
                if !attribute.info.is_empty() {
                    return Err(Error::malformed(
                        attribute.offset,
                        format!("{} attribute must be empty", name),
                    ));
                }
                AttributeBody::Marker
            }
            _ => AttributeBody::Opaque(attribute.info.clone()),
        })
    }

    pub fn is_opaque(&self) -> bool {
        match self {
            AttributeBody::Opaque(_) => true,
            AttributeBody::Record(components) => components
                .iter()
                .flat_map(|component| &component.attributes)
                .any(|attribute| attribute.body.is_opaque()),
            _ => false,
        }
    }
}

impl AbiAttribute {
    /// Encode back into a raw attribute
    pub fn to_attribute(&self) -> Result<Attribute> {
        Ok(Attribute {
            name_index: self.name_index,
            info: self.body.to_bytes()?,
            offset: 0,
        })
    }
}

impl Serialize for AttributeBody {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        match self {
            AttributeBody::ConstantValue(attr) => attr.serialize(writer),
            AttributeBody::Signature(attr) => attr.serialize(writer),
            AttributeBody::Exceptions(attr) => attr.serialize(writer),
            AttributeBody::EnclosingMethod(attr) => attr.serialize(writer),
            AttributeBody::NestHost(attr) => attr.serialize(writer),
            AttributeBody::NestMembers(attr) => attr.serialize(writer),
            AttributeBody::PermittedSubclasses(attr) => attr.serialize(writer),
            AttributeBody::RuntimeVisibleAnnotations(attr) => attr.serialize(writer),
            AttributeBody::RuntimeInvisibleAnnotations(attr) => attr.serialize(writer),
            AttributeBody::RuntimeVisibleParameterAnnotations(attr) => attr.serialize(writer),
            AttributeBody::RuntimeInvisibleParameterAnnotations(attr) => attr.serialize(writer),
            AttributeBody::RuntimeVisibleTypeAnnotations(attr) => attr.serialize(writer),
            AttributeBody::RuntimeInvisibleTypeAnnotations(attr) => attr.serialize(writer),
            AttributeBody::AnnotationDefault(attr) => attr.serialize(writer),
            AttributeBody::Module(attr) => attr.serialize(writer),
            AttributeBody::ModulePackages(attr) => attr.serialize(writer),
            AttributeBody::ModuleMainClass(attr) => attr.serialize(writer),
            AttributeBody::Record(components) => {
                writer.write_len_u2("record component count", components.len())?;
                for component in components {
                    component.name_index.serialize(writer)?;
                    component.descriptor_index.serialize(writer)?;
                    component
                        .attributes
                        .iter()
                        .map(AbiAttribute::to_attribute)
                        .collect::<Result<Vec<_>>>()?
                        .serialize(writer)?;
                }
                Ok(())
            }
            AttributeBody::Marker => Ok(()),
            AttributeBody::Opaque(bytes) => {
                writer.write_bytes(bytes);
                Ok(())
            }
        }
    }
}

impl ConstantRefs for AbiAttribute {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        visit(self.name_index);
        self.body.visit_constants(visit);
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.name_index = remap(self.name_index)?;
        self.body.remap_constants(remap)
    }
}

impl ConstantRefs for AbiRecordComponent {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        visit(self.name_index);
        visit(self.descriptor_index);
        self.attributes.visit_constants(visit);
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.name_index = remap(self.name_index)?;
        self.descriptor_index = remap(self.descriptor_index)?;
        self.attributes.remap_constants(remap)
    }
}

impl ConstantRefs for AttributeBody {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        match self {
            AttributeBody::ConstantValue(attr) => attr.visit_constants(visit),
            AttributeBody::Signature(attr) => attr.visit_constants(visit),
            AttributeBody::Exceptions(attr) => attr.visit_constants(visit),
            AttributeBody::EnclosingMethod(attr) => attr.visit_constants(visit),
            AttributeBody::NestHost(attr) => attr.visit_constants(visit),
            AttributeBody::NestMembers(attr) => attr.visit_constants(visit),
            AttributeBody::PermittedSubclasses(attr) => attr.visit_constants(visit),
            AttributeBody::RuntimeVisibleAnnotations(attr) => attr.visit_constants(visit),
            AttributeBody::RuntimeInvisibleAnnotations(attr) => attr.visit_constants(visit),
            AttributeBody::RuntimeVisibleParameterAnnotations(attr) => attr.visit_constants(visit),
            AttributeBody::RuntimeInvisibleParameterAnnotations(attr) => {
                attr.visit_constants(visit)
            }
            AttributeBody::RuntimeVisibleTypeAnnotations(attr) => attr.visit_constants(visit),
            AttributeBody::RuntimeInvisibleTypeAnnotations(attr) => attr.visit_constants(visit),
            AttributeBody::AnnotationDefault(attr) => attr.visit_constants(visit),
            AttributeBody::Module(attr) => attr.visit_constants(visit),
            AttributeBody::ModulePackages(attr) => attr.visit_constants(visit),
            AttributeBody::ModuleMainClass(attr) => attr.visit_constants(visit),
            AttributeBody::Record(components) => components.visit_constants(visit),
            AttributeBody::Marker | AttributeBody::Opaque(_) => (),
        }
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        match self {
            AttributeBody::ConstantValue(attr) => attr.remap_constants(remap),
            AttributeBody::Signature(attr) => attr.remap_constants(remap),
            AttributeBody::Exceptions(attr) => attr.remap_constants(remap),
            AttributeBody::EnclosingMethod(attr) => attr.remap_constants(remap),
            AttributeBody::NestHost(attr) => attr.remap_constants(remap),
            AttributeBody::NestMembers(attr) => attr.remap_constants(remap),
            AttributeBody::PermittedSubclasses(attr) => attr.remap_constants(remap),
            AttributeBody::RuntimeVisibleAnnotations(attr) => attr.remap_constants(remap),
            AttributeBody::RuntimeInvisibleAnnotations(attr) => attr.remap_constants(remap),
            AttributeBody::RuntimeVisibleParameterAnnotations(attr) => {
                attr.remap_constants(remap)
            }
            AttributeBody::RuntimeInvisibleParameterAnnotations(attr) => {
                attr.remap_constants(remap)
            }
            AttributeBody::RuntimeVisibleTypeAnnotations(attr) => attr.remap_constants(remap),
            AttributeBody::RuntimeInvisibleTypeAnnotations(attr) => attr.remap_constants(remap),
            AttributeBody::AnnotationDefault(attr) => attr.remap_constants(remap),
            AttributeBody::Module(attr) => attr.remap_constants(remap),
            AttributeBody::ModulePackages(attr) => attr.remap_constants(remap),
            AttributeBody::ModuleMainClass(attr) => attr.remap_constants(remap),
            AttributeBody::Record(components) => components.remap_constants(remap),
            AttributeBody::Marker | AttributeBody::Opaque(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rules_are_sorted_by_name() {
        for pair in ATTRIBUTE_RULES.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{} is out of order", pair[1].0);
        }
        for (name, rule) in ATTRIBUTE_RULES {
            assert_eq!(attribute_rule(name), Some(rule));
        }
    }

    #[test]
    fn default_decisions() {
        let policy = ExtractionPolicy::default();
        assert_eq!(decide_attribute("Signature", &policy), FilterDecision::Keep);
        assert_eq!(decide_attribute("LineNumberTable", &policy), FilterDecision::Drop);
        assert_eq!(decide_attribute("Deprecated", &policy), FilterDecision::Drop);
        assert_eq!(
            decide_attribute("RuntimeInvisibleAnnotations", &policy),
            FilterDecision::Drop
        );
        assert_eq!(
            decide_attribute("Code", &policy),
            FilterDecision::Rewrite(AttributeRewrite::MethodBody)
        );
        assert_eq!(
            decide_attribute("kotlin.Metadata", &policy),
            FilterDecision::Drop
        );
    }

    #[test]
    fn policy_switches() {
        let policy = ExtractionPolicy::default()
            .with_keep_deprecated(true)
            .with_keep_invisible_annotations(true)
            .with_unknown_attribute_policy(UnknownAttributePolicy::Keep);
        assert_eq!(decide_attribute("Deprecated", &policy), FilterDecision::Keep);
        assert_eq!(
            decide_attribute("RuntimeInvisibleTypeAnnotations", &policy),
            FilterDecision::Keep
        );
        assert_eq!(decide_attribute("ScalaSig", &policy), FilterDecision::Keep);
        assert_eq!(decide_attribute("StackMapTable", &policy), FilterDecision::Drop);
    }

    #[test]
    fn markers_must_be_empty() {
        let attribute = Attribute {
            name_index: ConstantIndex(1),
            info: vec![0],
            offset: 40,
        };
        assert!(matches!(
            AttributeBody::decode("Deprecated", &attribute),
            Err(Error::MalformedClassFile { offset: 40, .. })
        ));
    }
}
