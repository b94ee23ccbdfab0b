use super::{ExtractionPolicy, FilterDecision};
use crate::jvm::{
    FieldAccessFlags, MemberAccessFlags, MethodAccessFlags, Name, UnqualifiedName, Visibility,
};

/// Facts about the enclosing class that member decisions depend on
#[derive(Debug, Default)]
pub struct MemberContext {
    /// `(name, descriptor)` of the accessor each record component implies
    pub record_accessors: Vec<(String, String)>,
}

impl MemberContext {
    fn is_record_accessor(&self, name: &str, descriptor: &str, flags: MethodAccessFlags) -> bool {
        !flags.contains(MethodAccessFlags::STATIC)
            && self
                .record_accessors
                .iter()
                .any(|(accessor, accessor_descriptor)| {
                    accessor == name && accessor_descriptor == descriptor
                })
    }
}

/// Whether a member visible at this level is part of the ABI
fn visible(visibility: Visibility, policy: &ExtractionPolicy) -> bool {
    match visibility {
        Visibility::Public | Visibility::Protected => true,
        Visibility::Package => !policy.exclude_package_private,
        Visibility::Private => false,
    }
}

/// Decide whether a method is part of the ABI
///
/// The checks are applied in order and the first one that matches wins:
///
///   1. static initializers are dropped (their absence never changes the ABI)
///   2. synthetic methods are dropped, unless they are record component accessors
///   3. private methods are dropped
///   4. bridge methods are kept only if they are public or protected
///   5. constructors are kept
///   6. public and protected methods are kept, package-private ones unless excluded by policy
///
/// Kept methods have their flags normalized: `ACC_SYNCHRONIZED` and `ACC_STRICT` have no effect
/// on callers, and `ACC_NATIVE` is cleared when a stub body will be attached.
pub fn decide_method(
    name: &str,
    descriptor: &str,
    flags: MethodAccessFlags,
    context: &MemberContext,
    policy: &ExtractionPolicy,
) -> FilterDecision<MethodAccessFlags> {
    if name == UnqualifiedName::CLINIT.as_str() {
        return FilterDecision::Drop;
    }
    if flags.is_synthetic() && !context.is_record_accessor(name, descriptor, flags) {
        return FilterDecision::Drop;
    }
    let visibility = flags.visibility();
    if visibility == Visibility::Private {
        return FilterDecision::Drop;
    }
    let keep = if flags.contains(MethodAccessFlags::BRIDGE) {
        matches!(visibility, Visibility::Public | Visibility::Protected)
    } else {
        name == UnqualifiedName::INIT.as_str() || visible(visibility, policy)
    };
    if !keep {
        return FilterDecision::Drop;
    }

    let mut normalized = flags - (MethodAccessFlags::SYNCHRONIZED | MethodAccessFlags::STRICT);
    if policy.stub_method_bodies && !flags.contains(MethodAccessFlags::ABSTRACT) {
        normalized.remove(MethodAccessFlags::NATIVE);
    }
    if normalized == flags {
        FilterDecision::Keep
    } else {
        FilterDecision::Rewrite(normalized)
    }
}

/// Decide whether a field is part of the ABI
pub fn decide_field(
    flags: FieldAccessFlags,
    policy: &ExtractionPolicy,
) -> FilterDecision<FieldAccessFlags> {
    if flags.is_synthetic() || !visible(flags.visibility(), policy) {
        FilterDecision::Drop
    } else {
        FilterDecision::Keep
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decide(name: &str, flags: MethodAccessFlags) -> FilterDecision<MethodAccessFlags> {
        decide_method(
            name,
            "()V",
            flags,
            &MemberContext::default(),
            &ExtractionPolicy::default(),
        )
    }

    #[test]
    fn static_initializers_are_dropped() {
        assert_eq!(
            decide("<clinit>", MethodAccessFlags::STATIC),
            FilterDecision::Drop
        );
    }

    #[test]
    fn visibility() {
        assert_eq!(decide("run", MethodAccessFlags::PUBLIC), FilterDecision::Keep);
        assert_eq!(
            decide("run", MethodAccessFlags::PROTECTED),
            FilterDecision::Keep
        );
        assert_eq!(decide("run", MethodAccessFlags::empty()), FilterDecision::Keep);
        assert_eq!(decide("run", MethodAccessFlags::PRIVATE), FilterDecision::Drop);
        assert_eq!(
            decide("<init>", MethodAccessFlags::PRIVATE),
            FilterDecision::Drop
        );
    }

    #[test]
    fn package_private_exclusion_spares_constructors() {
        let policy = ExtractionPolicy::default().with_exclude_package_private(true);
        let context = MemberContext::default();
        let package = MethodAccessFlags::empty();
        assert_eq!(
            decide_method("run", "()V", package, &context, &policy),
            FilterDecision::Drop
        );
        assert_eq!(
            decide_method("<init>", "()V", package, &context, &policy),
            FilterDecision::Keep
        );
        assert_eq!(
            decide_field(FieldAccessFlags::empty(), &policy),
            FilterDecision::Drop
        );
    }

    #[test]
    fn synthetic_and_bridge_methods() {
        let bridge = MethodAccessFlags::PUBLIC | MethodAccessFlags::BRIDGE;
        assert_eq!(
            decide("compareTo", bridge | MethodAccessFlags::SYNTHETIC),
            FilterDecision::Drop
        );
        assert_eq!(decide("compareTo", bridge), FilterDecision::Keep);
        assert_eq!(
            decide("compareTo", MethodAccessFlags::BRIDGE),
            FilterDecision::Drop
        );
        assert_eq!(
            decide(
                "lambda$run$0",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC
            ),
            FilterDecision::Drop
        );
    }

    #[test]
    fn record_accessors_survive_synthetic_flag() {
        let context = MemberContext {
            record_accessors: vec![(String::from("x"), String::from("()I"))],
        };
        let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC;
        let policy = ExtractionPolicy::default();
        assert_eq!(
            decide_method("x", "()I", flags, &context, &policy),
            FilterDecision::Keep
        );
        assert_eq!(
            decide_method("x", "()J", flags, &context, &policy),
            FilterDecision::Drop
        );
    }

    #[test]
    fn flags_are_normalized() {
        assert_eq!(
            decide(
                "run",
                MethodAccessFlags::PUBLIC
                    | MethodAccessFlags::SYNCHRONIZED
                    | MethodAccessFlags::STRICT
            ),
            FilterDecision::Rewrite(MethodAccessFlags::PUBLIC)
        );

        let native = MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE;
        assert_eq!(decide("run", native), FilterDecision::Keep);
        let stubbing = ExtractionPolicy::default().with_stub_method_bodies(true);
        assert_eq!(
            decide_method("run", "()V", native, &MemberContext::default(), &stubbing),
            FilterDecision::Rewrite(MethodAccessFlags::PUBLIC)
        );
    }

    #[test]
    fn fields() {
        let policy = ExtractionPolicy::default();
        assert_eq!(
            decide_field(FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC, &policy),
            FilterDecision::Keep
        );
        assert_eq!(
            decide_field(FieldAccessFlags::PRIVATE, &policy),
            FilterDecision::Drop
        );
        assert_eq!(
            decide_field(
                FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::SYNTHETIC,
                &policy
            ),
            FilterDecision::Drop
        );
    }
}
