//! Identifier field declarations.
//!
//! # Responsibility
//! - Declare the closed set of identifier fields in serialization order.
//! - Own per-field validity patterns, kinds and defaults.
//!
//! # Invariants
//! - `Field` ordering is declaration order and drives identifier ordering.
//! - Every value stored in an identifier matched its field pattern.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::NameError;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid word regex"));
static OUTPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]\w*$").expect("valid output regex"));
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid number regex"));
static SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(sqlite|db)$").expect("valid suffix regex"));

/// Extension used when a caller does not provide `suffix`.
pub const DEFAULT_SUFFIX: &str = "sqlite";

/// Typed field mapping used to build identifiers.
pub type FieldMap = BTreeMap<Field, FieldValue>;

/// Identifier field names, in serialization and ordering precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Code,
    Media,
    Kingdom,
    /// Taxon grouping. Assigned by the taxonomy, never by callers.
    Cluster,
    Area,
    Stream,
    /// Unit discriminator. Assigned by the unit factory.
    Item,
    Step,
    Variant,
    Part,
    Output,
    Version,
    /// Process-unique discriminator of anonymous identifiers.
    Index,
    Suffix,
}

/// Value kind accepted by one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
}

impl Field {
    /// All fields in declaration order.
    pub const ALL: [Field; 14] = [
        Field::Code,
        Field::Media,
        Field::Kingdom,
        Field::Cluster,
        Field::Area,
        Field::Stream,
        Field::Item,
        Field::Step,
        Field::Variant,
        Field::Part,
        Field::Output,
        Field::Version,
        Field::Index,
        Field::Suffix,
    ];

    /// Dash separated name fields, the leading part of a serialized identifier.
    pub const NAME_FIELDS: [Field; 10] = [
        Field::Code,
        Field::Media,
        Field::Kingdom,
        Field::Cluster,
        Field::Area,
        Field::Stream,
        Field::Item,
        Field::Step,
        Field::Variant,
        Field::Part,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Media => "media",
            Self::Kingdom => "kingdom",
            Self::Cluster => "cluster",
            Self::Area => "area",
            Self::Stream => "stream",
            Self::Item => "item",
            Self::Step => "step",
            Self::Variant => "variant",
            Self::Part => "part",
            Self::Output => "output",
            Self::Version => "version",
            Self::Index => "index",
            Self::Suffix => "suffix",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Self::Version | Self::Index => FieldKind::Int,
            _ => FieldKind::Text,
        }
    }

    /// Whether `build` fails with `MissingField` when this field is absent.
    pub fn is_required(self) -> bool {
        !matches!(self, Self::Output | Self::Index | Self::Suffix)
    }

    /// Value used by `Identifier::default_fields`.
    pub fn default_value(self) -> Option<FieldValue> {
        let text = match self {
            Self::Code => "demo",
            Self::Media => "3d",
            Self::Kingdom => "abc",
            Self::Cluster => "entity",
            Self::Area => "rnd",
            Self::Stream => "main",
            Self::Item => "atom",
            Self::Step => "lead",
            Self::Variant => "base",
            Self::Part => "whole",
            Self::Version => return Some(FieldValue::Int(1)),
            Self::Suffix => DEFAULT_SUFFIX,
            Self::Output | Self::Index => return None,
        };
        Some(FieldValue::Text(text.to_string()))
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Output => &*OUTPUT_RE,
            Self::Version | Self::Index => &*NUMBER_RE,
            Self::Suffix => &*SUFFIX_RE,
            _ => &*WORD_RE,
        }
    }

    /// Validates and normalizes one value for this field.
    ///
    /// Digit-only text is accepted for integer fields, and integers are
    /// rendered for text fields, so presentation layers can pass raw strings.
    pub fn normalize(self, value: &FieldValue) -> Result<FieldValue, NameError> {
        let text = value.to_string();
        if !self.pattern().is_match(&text) {
            return Err(NameError::InvalidField {
                field: self,
                value: text,
            });
        }
        match self.kind() {
            FieldKind::Text => Ok(FieldValue::Text(text)),
            FieldKind::Int => match value {
                FieldValue::Int(number) => Ok(FieldValue::Int(*number)),
                FieldValue::Text(raw) => raw
                    .parse::<u64>()
                    .map(FieldValue::Int)
                    .map_err(|_| NameError::InvalidField {
                        field: self,
                        value: raw.clone(),
                    }),
            },
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| NameError::UnknownField(value.to_string()))
    }
}

/// Scalar value of one identifier field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(u64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(left), Self::Int(right)) => left.cmp(right),
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            (Self::Int(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Int(_)) => Ordering::Greater,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Int(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Int(u64::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{Field, FieldValue};
    use crate::names::NameError;

    #[test]
    fn field_order_follows_declaration() {
        let mut shuffled = vec![Field::Suffix, Field::Code, Field::Version, Field::Cluster];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Field::Code, Field::Cluster, Field::Version, Field::Suffix]
        );
    }

    #[test]
    fn normalize_converts_digit_text_for_int_fields() {
        let value = Field::Version
            .normalize(&FieldValue::from("42"))
            .expect("digits are a valid version");
        assert_eq!(value, FieldValue::Int(42));
    }

    #[test]
    fn normalize_rejects_separator_characters() {
        let err = Field::Kingdom
            .normalize(&FieldValue::from("a-b"))
            .expect_err("dash is the name separator");
        assert!(matches!(err, NameError::InvalidField { field: Field::Kingdom, .. }));
    }

    #[test]
    fn output_must_start_with_a_letter() {
        assert!(Field::Output.normalize(&FieldValue::from("7")).is_err());
        assert!(Field::Output.normalize(&FieldValue::from("cache")).is_ok());
    }

    #[test]
    fn field_names_parse_case_insensitively() {
        assert_eq!(" Kingdom ".parse::<Field>().unwrap(), Field::Kingdom);
        assert!(matches!(
            "colour".parse::<Field>(),
            Err(NameError::UnknownField(value)) if value == "colour"
        ));
    }
}
