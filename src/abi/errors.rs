use crate::jvm;
use thiserror::Error;

/// Failure to extract the ABI of one class file
///
/// The underlying error is always one of the class file format errors. Once the name of the class
/// has been resolved, it is attached so that callers processing many classes can tell which one
/// failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("while extracting {}: {error}", .class_name.as_deref().unwrap_or("class"))]
pub struct ExtractionError {
    pub class_name: Option<String>,
    #[source]
    pub error: jvm::Error,
}

impl ExtractionError {
    /// Underlying error
    pub fn kind(&self) -> &jvm::Error {
        &self.error
    }

    pub(crate) fn in_class(mut self, class_name: &str) -> Self {
        if self.class_name.is_none() {
            self.class_name = Some(class_name.to_owned());
        }
        self
    }
}

impl From<jvm::Error> for ExtractionError {
    fn from(error: jvm::Error) -> ExtractionError {
        ExtractionError {
            class_name: None,
            error,
        }
    }
}

pub type Result<T, E = ExtractionError> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_includes_class_name() {
        let err = ExtractionError::from(jvm::Error::dangling(4, "Class", "Integer"))
            .in_class("pkg/Foo");
        assert_eq!(
            err.to_string(),
            "while extracting pkg/Foo: constant pool reference #4 is dangling: expected Class, found Integer"
        );
        assert_eq!(err.kind(), &jvm::Error::dangling(4, "Class", "Integer"));
    }
}
