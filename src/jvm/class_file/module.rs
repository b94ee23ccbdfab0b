use crate::jvm::class_file::{AttributeLike, ConstantIndex, ConstantRefs};
use crate::jvm::{ByteReader, ByteWriter, Result, Serialize};

/// Module declaration of a `module-info` class
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.25
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: ConstantIndex,
    pub flags: u16,
    pub version: Option<ConstantIndex>,
    pub requires: Vec<ModuleRequires>,
    pub exports: Vec<ModulePackageAccess>,
    pub opens: Vec<ModulePackageAccess>,
    pub uses: Vec<ConstantIndex>,
    pub provides: Vec<ModuleProvides>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequires {
    pub module: ConstantIndex,
    pub flags: u16,
    pub version: Option<ConstantIndex>,
}

/// Entry of either `exports` or `opens`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePackageAccess {
    pub package: ConstantIndex,
    pub flags: u16,

    /// Modules the package is restricted to (all modules if empty)
    pub to: Vec<ConstantIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProvides {
    pub service: ConstantIndex,
    pub with: Vec<ConstantIndex>,
}

impl ModulePackageAccess {
    fn parse(reader: &mut ByteReader) -> Result<ModulePackageAccess> {
        Ok(ModulePackageAccess {
            package: ConstantIndex::parse(reader)?,
            flags: reader.read_u2()?,
            to: ConstantIndex::parse_list(reader)?,
        })
    }
}

impl AttributeLike for Module {
    const NAME: &'static str = "Module";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        let name = ConstantIndex::parse(reader)?;
        let flags = reader.read_u2()?;
        let version = ConstantIndex::parse_optional(reader)?;

        let requires_count = reader.read_u2()?;
        let requires = (0..requires_count)
            .map(|_| {
                Ok(ModuleRequires {
                    module: ConstantIndex::parse(reader)?,
                    flags: reader.read_u2()?,
                    version: ConstantIndex::parse_optional(reader)?,
                })
            })
            .collect::<Result<_>>()?;

        let exports_count = reader.read_u2()?;
        let exports = (0..exports_count)
            .map(|_| ModulePackageAccess::parse(reader))
            .collect::<Result<_>>()?;

        let opens_count = reader.read_u2()?;
        let opens = (0..opens_count)
            .map(|_| ModulePackageAccess::parse(reader))
            .collect::<Result<_>>()?;

        let uses = ConstantIndex::parse_list(reader)?;

        let provides_count = reader.read_u2()?;
        let provides = (0..provides_count)
            .map(|_| {
                Ok(ModuleProvides {
                    service: ConstantIndex::parse(reader)?,
                    with: ConstantIndex::parse_list(reader)?,
                })
            })
            .collect::<Result<_>>()?;

        Ok(Module {
            name,
            flags,
            version,
            requires,
            exports,
            opens,
            uses,
            provides,
        })
    }
}

impl Serialize for Module {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.name.serialize(writer)?;
        self.flags.serialize(writer)?;
        self.version.serialize(writer)?;
        self.requires.serialize(writer)?;
        self.exports.serialize(writer)?;
        self.opens.serialize(writer)?;
        self.uses.serialize(writer)?;
        self.provides.serialize(writer)
    }
}

impl Serialize for ModuleRequires {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.module.serialize(writer)?;
        self.flags.serialize(writer)?;
        self.version.serialize(writer)
    }
}

impl Serialize for ModulePackageAccess {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.package.serialize(writer)?;
        self.flags.serialize(writer)?;
        self.to.serialize(writer)
    }
}

impl Serialize for ModuleProvides {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.service.serialize(writer)?;
        self.with.serialize(writer)
    }
}

impl ConstantRefs for Module {
    fn visit_constants(&self, visit: &mut dyn FnMut(ConstantIndex)) {
        visit(self.name);
        self.version.visit_constants(visit);
        for requires in &self.requires {
            visit(requires.module);
            requires.version.visit_constants(visit);
        }
        for access in self.exports.iter().chain(&self.opens) {
            visit(access.package);
            access.to.visit_constants(visit);
        }
        self.uses.visit_constants(visit);
        for provides in &self.provides {
            visit(provides.service);
            provides.with.visit_constants(visit);
        }
    }

    fn remap_constants(
        &mut self,
        remap: &mut dyn FnMut(ConstantIndex) -> Result<ConstantIndex>,
    ) -> Result<()> {
        self.name = remap(self.name)?;
        self.version.remap_constants(remap)?;
        for requires in &mut self.requires {
            requires.module = remap(requires.module)?;
            requires.version.remap_constants(remap)?;
        }
        for access in self.exports.iter_mut().chain(&mut self.opens) {
            access.package = remap(access.package)?;
            access.to.remap_constants(remap)?;
        }
        self.uses.remap_constants(remap)?;
        for provides in &mut self.provides {
            provides.service = remap(provides.service)?;
            provides.with.remap_constants(remap)?;
        }
        Ok(())
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.26
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePackages(pub Vec<ConstantIndex>);

impl AttributeLike for ModulePackages {
    const NAME: &'static str = "ModulePackages";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(ModulePackages(ConstantIndex::parse_list(reader)?))
    }
}

impl Serialize for ModulePackages {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl ConstantRefs for ModulePackages {
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

/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.27
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMainClass(pub ConstantIndex);

impl AttributeLike for ModuleMainClass {
    const NAME: &'static str = "ModuleMainClass";

    fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(ModuleMainClass(ConstantIndex::parse(reader)?))
    }
}

impl Serialize for ModuleMainClass {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.0.serialize(writer)
    }
}

impl ConstantRefs for ModuleMainClass {
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
