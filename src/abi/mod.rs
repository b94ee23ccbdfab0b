//! Extracting the ABI of a class: the parts that dependents are compiled against
//!
//! Extraction runs in four stages:
//!
//!   1. parse the class file (`jvm::class_file`)
//!   2. filter out members and attributes that do not affect dependents ([`AbiClass::filter`])
//!   3. work out which constant pool entries are still used and renumber them ([`compact`])
//!   4. serialize the result, adding stub method bodies if asked to ([`emit`])

mod attribute_filter;
mod compaction;
mod emit;
mod errors;
mod member_filter;
mod model;
mod policy;
mod stub;

pub use attribute_filter::*;
pub use compaction::*;
pub use emit::*;
pub use errors::*;
pub use member_filter::*;
pub use model::*;
pub use policy::*;
pub use stub::*;

use crate::jvm::class_file::ClassFile;
use crate::jvm::Error;
use log::debug;

/// Outcome of deciding what to do with one element of the class
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterDecision<T> {
    /// Retain the element unchanged
    Keep,

    /// Leave the element out of the ABI
    Drop,

    /// Retain a modified version of the element
    Rewrite(T),
}

/// Extract the ABI of a single class file
///
/// The output is itself a valid class file. Extraction is deterministic and idempotent: equal
/// inputs (or inputs differing only in the parts that get stripped) produce identical outputs, and
/// extracting the output again returns it unchanged.
pub fn extract(bytes: &[u8], policy: &ExtractionPolicy) -> Result<Vec<u8>> {
    let class = ClassFile::parse(bytes)?;
    let name = class.class_name()?.to_owned();

    let extracted = extract_class(class, policy).map_err(|err| err.in_class(&name))?;
    debug!(
        "{}: extracted ABI ({} bytes in, {} bytes out)",
        name,
        bytes.len(),
        extracted.len()
    );
    Ok(extracted)
}

fn extract_class(class: ClassFile, policy: &ExtractionPolicy) -> Result<Vec<u8>> {
    if let Some(max_major_version) = policy.max_major_version {
        let major_version = class.version.major_version;
        if major_version > max_major_version {
            return Err(Error::UnsupportedFormat {
                reason: format!(
                    "major version {} is newer than the supported {}",
                    major_version, max_major_version
                ),
            }
            .into());
        }
    }

    let (class, constants) = AbiClass::filter(class, policy)?;
    let (class, compacted, _) = compact(class, &constants)?;
    Ok(emit(&class, compacted, policy)?)
}
