use crate::jvm::BinaryName;

/// Knobs controlling what counts as part of a class' ABI
///
/// The defaults produce the smallest output that still compiles dependents correctly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionPolicy {
    /// Keep `Deprecated` attributes
    ///
    /// Compilers warn when a dependent uses a deprecated member, so callers that treat warnings
    /// as part of the build result may want this.
    pub keep_deprecated: bool,

    /// Keep `RuntimeInvisible*Annotations` (including type annotations)
    ///
    /// These are only observable to annotation processors and bytecode tools, not to `javac`'s
    /// type checking.
    pub keep_invisible_annotations: bool,

    /// Drop package-private members, for callers whose dependents always live in another package
    pub exclude_package_private: bool,

    /// What to do with attributes whose name is not part of the class file format
    pub unknown_attribute_policy: UnknownAttributePolicy,

    /// Give non-abstract methods a body that throws or returns a default value, instead of no
    /// `Code` attribute at all
    ///
    /// Without bodies the output is only fit for compiling against. With stubs it can also be
    /// loaded (but not meaningfully run).
    pub stub_method_bodies: bool,

    /// Exception thrown by stubbed constructors (needs a public no-argument constructor)
    pub stub_exception_class: BinaryName,

    /// Reject class files with a newer major version than this
    pub max_major_version: Option<u16>,
}

/// Treatment of attributes that are not classified
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnknownAttributePolicy {
    /// Copy the attribute as-is
    ///
    /// The payload might contain constant pool indices, so the whole constant pool is then kept
    /// unchanged.
    Keep,

    /// Leave the attribute out
    Drop,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        ExtractionPolicy {
            keep_deprecated: false,
            keep_invisible_annotations: false,
            exclude_package_private: false,
            unknown_attribute_policy: UnknownAttributePolicy::Drop,
            stub_method_bodies: false,
            stub_exception_class: BinaryName::ERROR,
            max_major_version: None,
        }
    }
}

impl ExtractionPolicy {
    pub fn with_keep_deprecated(mut self, keep_deprecated: bool) -> Self {
        self.keep_deprecated = keep_deprecated;
        self
    }

    pub fn with_keep_invisible_annotations(mut self, keep_invisible_annotations: bool) -> Self {
        self.keep_invisible_annotations = keep_invisible_annotations;
        self
    }

    pub fn with_exclude_package_private(mut self, exclude_package_private: bool) -> Self {
        self.exclude_package_private = exclude_package_private;
        self
    }

    pub fn with_unknown_attribute_policy(mut self, policy: UnknownAttributePolicy) -> Self {
        self.unknown_attribute_policy = policy;
        self
    }

    pub fn with_stub_method_bodies(mut self, stub_method_bodies: bool) -> Self {
        self.stub_method_bodies = stub_method_bodies;
        self
    }

    pub fn with_stub_exception_class(mut self, class: BinaryName) -> Self {
        self.stub_exception_class = class;
        self
    }

    pub fn with_max_major_version(mut self, max_major_version: Option<u16>) -> Self {
        self.max_major_version = max_major_version;
        self
    }
}
