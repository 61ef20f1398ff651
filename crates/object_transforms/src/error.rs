use thiserror::Error;

/// Errors raised by the geometric core and the sample transforms.
///
/// Transforms return `anyhow::Result`, so these convert with `?` and pick up
/// context on the way out (see [`crate::transforms::Chain`]).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("mask '{key}' has no foreground pixels")]
    EmptyMask { key: String },

    #[error("spatial shape mismatch for '{key}': expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        key: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("feature '{key}' has kind {found}, expected {expected}")]
    UnexpectedKind {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("feature '{0}' not found")]
    MissingFeature(String),
}

impl TransformError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn empty_mask(key: impl Into<String>) -> Self {
        Self::EmptyMask { key: key.into() }
    }
}
