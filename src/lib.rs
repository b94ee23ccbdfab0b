//! Extract the compile-time ABI of JVM class files
//!
//! The ABI of a class is everything a compiler looks at when compiling code that depends on it:
//! signatures of visible members, compile-time constants, annotations, generic signatures, and
//! so on. Method bodies, private members, and debugging information are stripped, and what
//! remains is normalized so that equivalent compilations produce byte-identical output. Build
//! tools can then hash the output to decide whether dependents need recompiling.
//!
//! ```no_run
//! use abi_extractor::{extract, ExtractionPolicy};
//!
//! let class_bytes = std::fs::read("Foo.class").unwrap();
//! let abi_bytes = extract(&class_bytes, &ExtractionPolicy::default()).unwrap();
//! ```

pub mod abi;
pub mod jvm;
mod util;

pub use abi::{extract, ExtractionError, ExtractionPolicy, UnknownAttributePolicy};
