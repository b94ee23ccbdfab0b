mod annotation;
mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod module;
mod version;

pub use annotation::*;
pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use module::*;
pub use version::*;
