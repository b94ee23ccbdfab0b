use super::AbiClass;
use crate::jvm::class_file::{
    BootstrapMethods, ConstantIndex, ConstantPool, ConstantPoolBuilder, ConstantRefs, InnerClass,
};
use crate::jvm::{Error, InnerClassAccessFlags, Result};
use crate::util::Width;

/// Mapping from constant pool indices of the input to those of the output
///
/// Retained entries keep their relative order, which is what makes the output stable across
/// compilations that only differ in stripped parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionMap {
    /// New index for every old slot (`None` if the slot is not retained)
    constants: Vec<Option<ConstantIndex>>,

    /// New position of every old bootstrap method (`None` if it is not retained)
    bootstrap_methods: Vec<Option<u16>>,

    /// Final `constant_pool_count`
    slot_count: usize,
}

impl CompactionMap {
    /// New index of a retained entry
    pub fn get(&self, index: ConstantIndex) -> Result<ConstantIndex> {
        self.constants
            .get(index.0 as usize)
            .copied()
            .flatten()
            .ok_or_else(|| Error::dangling(index.0, "retained constant", "compacted entry"))
    }

    /// New position of a retained bootstrap method
    pub fn get_bootstrap_method(&self, index: u16) -> Result<u16> {
        self.bootstrap_methods
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or_else(|| {
                Error::malformed(0, format!("bootstrap method {} was not retained", index))
            })
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.constants.iter().filter(|idx| idx.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `constant_pool_count` of the compacted pool
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn from_retained(
        constants: &ConstantPool,
        retained: &[bool],
        retained_bootstrap_methods: &[bool],
    ) -> Result<CompactionMap> {
        let mut map = vec![None; constants.slot_count()];
        let mut next_slot: usize = 1;
        for (index, constant) in constants.iter() {
            if retained[index.0 as usize] {
                let slots = next_slot + constant.width();
                if slots > ConstantPoolBuilder::MAX_SLOTS {
                    return Err(Error::overflow(
                        "constant pool count",
                        slots,
                        ConstantPoolBuilder::MAX_SLOTS,
                    ));
                }
                map[index.0 as usize] = Some(ConstantIndex(next_slot as u16));
                next_slot = slots;
            }
        }

        let mut next_method: u16 = 0;
        let bootstrap_methods = retained_bootstrap_methods
            .iter()
            .map(|&keep| {
                keep.then(|| {
                    next_method += 1;
                    next_method - 1
                })
            })
            .collect();

        Ok(CompactionMap {
            constants: map,
            bootstrap_methods,
            slot_count: next_slot,
        })
    }

    /// Copy retained entries into a fresh pool, renumbering the references between them
    pub fn rebuild_pool(&self, constants: &ConstantPool) -> Result<ConstantPoolBuilder> {
        let mut builder = ConstantPoolBuilder::new();
        for (index, constant) in constants.iter() {
            if self.constants[index.0 as usize].is_none() {
                continue;
            }
            let mut constant = constant.clone();
            constant.remap_constants(&mut |idx| self.get(idx))?;
            constant.remap_bootstrap_method(|idx| self.get_bootstrap_method(idx))?;
            builder.push_constant(constant)?;
        }
        Ok(builder)
    }
}

/// Marks constant pool entries reachable from a set of roots
struct Reachability<'a> {
    constants: &'a ConstantPool,
    bootstrap_methods: Option<&'a BootstrapMethods>,
    retained: Vec<bool>,
    retained_bootstrap_methods: Vec<bool>,
    worklist: Vec<ConstantIndex>,
}

impl<'a> Reachability<'a> {
    fn new(
        constants: &'a ConstantPool,
        bootstrap_methods: Option<&'a BootstrapMethods>,
    ) -> Reachability<'a> {
        Reachability {
            constants,
            bootstrap_methods,
            retained: vec![false; constants.slot_count()],
            retained_bootstrap_methods: vec![false; bootstrap_methods.map_or(0, |bsm| bsm.0.len())],
            worklist: vec![],
        }
    }

    fn is_retained(&self, index: ConstantIndex) -> bool {
        self.retained
            .get(index.0 as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Queue a root; it is only resolved in `close`
    fn mark(&mut self, index: ConstantIndex) {
        if !self.is_retained(index) {
            self.worklist.push(index);
        }
    }

    fn mark_bootstrap_method(&mut self, position: u16, from: ConstantIndex) -> Result<()> {
        let methods = self.bootstrap_methods.ok_or_else(|| {
            Error::dangling(from.0, "bootstrap method", "no BootstrapMethods attribute")
        })?;
        let method = methods.0.get(position as usize).ok_or_else(|| {
            Error::malformed(
                0,
                format!(
                    "constant #{} uses bootstrap method {} but only {} are declared",
                    from.0,
                    position,
                    methods.0.len()
                ),
            )
        })?;
        if !self.retained_bootstrap_methods[position as usize] {
            self.retained_bootstrap_methods[position as usize] = true;
            let worklist = &mut self.worklist;
            method.visit_constants(&mut |idx| worklist.push(idx));
        }
        Ok(())
    }

    /// Resolve everything queued, and everything that refers to
    fn close(&mut self) -> Result<()> {
        while let Some(index) = self.worklist.pop() {
            let constants = self.constants;
            let constant = constants.get(index)?;
            if self.retained[index.0 as usize] {
                continue;
            }
            self.retained[index.0 as usize] = true;
            constants.check_references(constant)?;

            let worklist = &mut self.worklist;
            constant.visit_constants(&mut |idx| worklist.push(idx));
            if let Some(position) = constant.bootstrap_method() {
                self.mark_bootstrap_method(position, index)?;
            }
        }
        Ok(())
    }
}

/// Whether an `InnerClasses` entry must stay
///
/// Entries stay for this class itself, for non-private member classes it declares, for classes
/// the retained structure refers to, and for classes named in retained descriptors or signatures.
fn keep_inner_class(
    entry: &InnerClass,
    class: &AbiClass,
    constants: &ConstantPool,
    reachability: &Reachability,
) -> Result<bool> {
    let inner_name = constants.get_class_name(entry.inner_class)?;
    if inner_name == class.name || reachability.is_retained(entry.inner_class) {
        return Ok(true);
    }
    if let Some(outer_class) = entry.outer_class {
        let declared_here = constants.get_class_name(outer_class)? == class.name;
        if declared_here && !entry.access_flags.contains(InnerClassAccessFlags::PRIVATE) {
            return Ok(true);
        }
    }
    Ok(class.referenced_types.contains(inner_name))
}

/// Work out which constants the filtered class still needs, prune `InnerClasses` and
/// `BootstrapMethods` accordingly, and return the class renumbered against a fresh pool
///
/// If the class retains an attribute that was copied without being understood, every constant
/// (and every bootstrap method) is retained, since the attribute may refer to any of them.
pub fn compact(
    mut class: AbiClass,
    constants: &ConstantPool,
) -> Result<(AbiClass, ConstantPoolBuilder, CompactionMap)> {
    let bootstrap_methods = class.bootstrap_methods.as_ref().map(|bsm| &bsm.entries);
    let mut reachability = Reachability::new(constants, bootstrap_methods);

    let keep_everything = class.has_opaque_attributes();
    if keep_everything {
        for (index, _) in constants.iter() {
            reachability.mark(index);
        }
        for position in 0..reachability.retained_bootstrap_methods.len() {
            reachability.mark_bootstrap_method(position as u16, ConstantIndex(0))?;
        }
    }
    class.visit_roots(&mut |idx| reachability.mark(idx));
    reachability.close()?;

    // Keeping an entry makes its outer class reachable, which can make more entries necessary
    let mut kept_inner_classes = vec![];
    if let Some(inner_classes) = &class.inner_classes {
        let mut kept = vec![false; inner_classes.entries.len()];
        loop {
            let mut changed = false;
            for (entry, is_kept) in inner_classes.entries.iter().zip(kept.iter_mut()) {
                if !*is_kept && keep_inner_class(entry, &class, constants, &reachability)? {
                    *is_kept = true;
                    changed = true;
                    entry.visit_constants(&mut |idx| reachability.mark(idx));
                }
            }
            reachability.close()?;
            if !changed {
                break;
            }
        }
        kept_inner_classes = kept;
    }

    if kept_inner_classes.contains(&true) {
        if let Some(inner_classes) = &class.inner_classes {
            reachability.mark(inner_classes.name_index);
        }
    }
    if reachability.retained_bootstrap_methods.contains(&true) {
        if let Some(bootstrap_methods) = &class.bootstrap_methods {
            reachability.mark(bootstrap_methods.name_index);
        }
    }
    reachability.close()?;

    let map = CompactionMap::from_retained(
        constants,
        &reachability.retained,
        &reachability.retained_bootstrap_methods,
    )?;
    let retained_bootstrap_methods = reachability.retained_bootstrap_methods;

    class.inner_classes = class.inner_classes.take().and_then(|mut inner_classes| {
        let mut kept = kept_inner_classes.into_iter();
        inner_classes
            .entries
            .retain(|_| kept.next().unwrap_or(false));
        (!inner_classes.entries.is_empty()).then(|| inner_classes)
    });
    class.bootstrap_methods = class.bootstrap_methods.take().and_then(|mut bootstrap_methods| {
        let mut kept = retained_bootstrap_methods.iter();
        bootstrap_methods
            .entries
            .0
            .retain(|_| kept.next().copied().unwrap_or(false));
        (!bootstrap_methods.entries.0.is_empty()).then(|| bootstrap_methods)
    });

    let pool = map.rebuild_pool(constants)?;
    class.remap_constants(&mut |idx| map.get(idx))?;
    Ok((class, pool, map))
}
