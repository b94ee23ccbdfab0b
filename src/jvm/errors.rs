use thiserror::Error;

/// Errors raised while reading, interpreting, or writing class files
///
/// Every variant is terminal for the class being processed. Offsets are byte offsets into the
/// buffer being read (or written, for `EmissionOverflow`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Input ended before a fixed-width item could be read
    #[error("truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Unknown tag or undecodable payload in the constant pool
    #[error("malformed constant pool entry #{index} at offset {offset}: {reason}")]
    MalformedConstantPool {
        index: u16,
        offset: usize,
        reason: String,
    },

    /// Constant pool index that is zero, out of range, the unusable half of a wide entry, or
    /// pointing at an entry of the wrong kind
    #[error("constant pool reference #{index} is dangling: expected {expected}, found {found}")]
    DanglingReference {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    /// Not a class file, or a class file version the caller does not accept
    #[error("unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Structural inconsistency outside of the constant pool
    #[error("malformed class file at offset {offset}: {reason}")]
    MalformedClassFile { offset: usize, reason: String },

    /// A count, length, or index does not fit the width the format gives it
    #[error("cannot emit {what}: {value} exceeds the limit of {limit}")]
    EmissionOverflow {
        what: &'static str,
        value: usize,
        limit: usize,
    },
}

impl Error {
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Error {
        Error::MalformedClassFile {
            offset,
            reason: reason.into(),
        }
    }

    pub fn dangling(index: u16, expected: &'static str, found: &'static str) -> Error {
        Error::DanglingReference {
            index,
            expected,
            found,
        }
    }

    pub fn overflow(what: &'static str, value: usize, limit: usize) -> Error {
        Error::EmissionOverflow { what, value, limit }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
