//! Annotation error types

use thiserror::Error;

/// Error raised by an annotation input source
///
/// Errors are never recovered locally: the first one terminates the
/// annotation sequence that observed it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotationError {
    /// Focus source failed
    #[error("focus source failed: {0}")]
    Focus(String),

    /// Anchor geometry source failed
    #[error("offset source failed: {0}")]
    Offset(String),

    /// Container scroll source failed
    #[error("scroll source failed: {0}")]
    Scroll(String),

    /// Scoped element lookup returned nothing
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Pointer source went away while armed
    #[error("pointer source closed: {0}")]
    PointerClosed(String),
}

/// Result alias for annotation operations
pub type Result<T, E = AnnotationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AnnotationError::Scroll("detached".into()).to_string(),
            "scroll source failed: detached"
        );
        assert_eq!(
            AnnotationError::ElementNotFound(":scope > :last-child".into()).to_string(),
            "element not found: :scope > :last-child"
        );
    }
}
