use super::VariantKind;
use std::fmt;

/// Errors raised by Variant accessors, conversions and typed-object handling
#[derive(Debug, Clone, PartialEq)]
pub enum VariantError {
    /// Typed accessor called on a variant of another kind
    KindMismatch {
        expected: VariantKind,
        actual: VariantKind,
    },
    /// Named conversion not defined for this kind or value
    NotConvertible { from: VariantKind, to: VariantKind },
    /// `from_typed_object` called without a serializer
    MissingSerializer,
    /// The serializer itself failed
    Serialization(String),
}

impl fmt::Display for VariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantError::KindMismatch { expected, actual } => {
                write!(f, "expected variant of kind {}, found {}", expected, actual)
            }
            VariantError::NotConvertible { from, to } => {
                write!(f, "cannot convert {} variant to {}", from, to)
            }
            VariantError::MissingSerializer => write!(f, "typed object requires a serializer"),
            VariantError::Serialization(reason) => {
                write!(f, "typed object serialization failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for VariantError {}
