//! Structured errors surfaced to the host.
//!
//! Structural failures are surfaced directly and never retried. Anchor
//! resolution failing is a value (`Option`), not an error, but the renderer
//! reports it as `ResolutionFailed` when a highlight cannot be drawn at
//! all. Wrap failures aggregate per-node problems while keeping the
//! partial success list available to the caller.

use thiserror::Error;

/// One violated field in a rejected record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl core::fmt::Display for FieldError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Error taxonomy of the engine, with a kind discriminator and a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Collapsed, empty or cross-document selection.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// An anchor failed structural validation.
    #[error("invalid anchor: {0}")]
    InvalidAnchor(String),

    /// No resolution strategy produced a range for the given highlight.
    #[error("anchor for highlight {id:?} did not resolve")]
    ResolutionFailed { id: String },

    /// Text-node splitting or child replacement errored; per-node failures
    /// are listed alongside the count of successful wraps.
    #[error("wrapping failed on {} of {attempted} text nodes", .failures.len())]
    WrapFailed {
        attempted: usize,
        failures: Vec<String>,
    },

    /// Persistence rejected a record; every violated field is listed.
    #[error("validation failed: {}", format_field_errors(.0))]
    ValidationFailed(Vec<FieldError>),

    /// A storage write lost a race; the caller may refresh and retry.
    #[error("concurrent modification of key {key:?}")]
    ConcurrentModification { key: String },

    /// The underlying key/value operation raised.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Discriminator for hosts that dispatch on error class rather than
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSelection,
    InvalidAnchor,
    ResolutionFailed,
    WrapFailed,
    ValidationFailed,
    ConcurrentModification,
    StorageUnavailable,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidSelection(_) => ErrorKind::InvalidSelection,
            EngineError::InvalidAnchor(_) => ErrorKind::InvalidAnchor,
            EngineError::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
            EngineError::WrapFailed { .. } => ErrorKind::WrapFailed,
            EngineError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            EngineError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            EngineError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discriminator() {
        let err = EngineError::ConcurrentModification {
            key: "bookmarks".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    }

    #[test]
    fn test_validation_message_names_fields() {
        let err = EngineError::ValidationFailed(vec![FieldError {
            field: "color",
            message: "not a hex color".into(),
        }]);
        assert!(err.to_string().contains("color"));
    }

    #[test]
    fn test_wrap_failed_counts() {
        let err = EngineError::WrapFailed {
            attempted: 3,
            failures: vec!["node 7: detached".into()],
        };
        assert_eq!(err.to_string(), "wrapping failed on 1 of 3 text nodes");
    }
}
