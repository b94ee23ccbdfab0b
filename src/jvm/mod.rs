//! Reading, interpreting, and writing JVM class files

mod access_flags;
mod binary_format;
pub mod class_file;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use binary_format::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
