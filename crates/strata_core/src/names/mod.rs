//! Identifier scheme for content documents.
//!
//! # Responsibility
//! - Derive canonical, filesystem-safe document names from typed fields.
//! - Report malformed input with the offending field.
//!
//! # Invariants
//! - Identifier text never contains path separators.
//! - Ordering of identifiers is by field declaration order, not alphabetical.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod field;
pub mod identifier;

pub use field::{Field, FieldKind, FieldMap, FieldValue, DEFAULT_SUFFIX};
pub use identifier::Identifier;

pub type NameResult<T> = Result<T, NameError>;

/// Identifier construction and parsing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Required field is absent.
    MissingField(Field),
    /// Field value does not match the field pattern.
    InvalidField { field: Field, value: String },
    /// Field name given by a caller is not part of the scheme.
    UnknownField(String),
    /// Text is not a serialized identifier.
    InvalidName(String),
}

impl Display for NameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required identifier field `{field}`"),
            Self::InvalidField { field, value } => {
                write!(f, "invalid value `{value}` for identifier field `{field}`")
            }
            Self::UnknownField(name) => write!(f, "unknown identifier field `{name}`"),
            Self::InvalidName(text) => write!(f, "invalid identifier name `{text}`"),
        }
    }
}

impl Error for NameError {}
