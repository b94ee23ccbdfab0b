use crate::jvm::{ByteReader, ByteWriter, Error, Result, Serialize};

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// JVM class file version corresponding to JDK 1.1, the oldest format still defined
    pub const JAVA1_1: Version = Version {
        minor_version: 3,
        major_version: 45,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };

    /// Oldest major version that is accepted
    pub const MIN_MAJOR: u16 = 45;

    /// Read the version, rejecting major versions that predate the class file format
    pub fn parse(reader: &mut ByteReader) -> Result<Version> {
        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        if major_version < Self::MIN_MAJOR {
            return Err(Error::UnsupportedFormat {
                reason: format!("class file major version {} is too old", major_version),
            });
        }
        Ok(Version {
            minor_version,
            major_version,
        })
    }
}

impl Serialize for Version {
    fn serialize(&self, writer: &mut ByteWriter) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}
