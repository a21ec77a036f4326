//! Canonical document identifiers.
//!
//! # Responsibility
//! - Build, parse and derive field-based document names.
//! - Mint anonymous identifiers for prototyping without touching storage.
//!
//! # Invariants
//! - Serialized text is exactly the document file name.
//! - `build(parse(text).fields())` reproduces the same identifier.
//! - Anonymous identifiers never collide within one process.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use uuid::Uuid;

use super::field::{Field, FieldMap, FieldValue, DEFAULT_SUFFIX};
use super::{NameError, NameResult};

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<code>\w+)-(?P<media>\w+)-(?P<kingdom>\w+)-(?P<cluster>\w+)-(?P<area>\w+)-(?P<stream>\w+)-(?P<item>\w+)-(?P<step>\w+)-(?P<variant>\w+)-(?P<part>\w+)(\.(?P<output>[A-Za-z]\w*))?\.(?P<version>\d+)(\.(?P<index>\d+))?\.(?P<suffix>sqlite|db)$",
    )
    .expect("valid identifier regex")
});

static ANONYMOUS_COUNTER: AtomicU64 = AtomicU64::new(0);

const ANONYMOUS_TOKEN_LEN: usize = 8;

/// Canonical, field-derived document name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    fields: FieldMap,
}

impl Identifier {
    /// Builds an identifier from typed fields.
    ///
    /// `suffix` defaults to `sqlite` when absent.
    ///
    /// # Errors
    /// - `MissingField` for the first absent required field.
    /// - `InvalidField` for the first value failing its field pattern.
    pub fn build(fields: &FieldMap) -> NameResult<Self> {
        let mut normalized = FieldMap::new();
        for field in Field::ALL {
            match fields.get(&field) {
                Some(value) => {
                    normalized.insert(field, field.normalize(value)?);
                }
                None if field == Field::Suffix => {
                    normalized.insert(field, FieldValue::from(DEFAULT_SUFFIX));
                }
                None if field.is_required() => return Err(NameError::MissingField(field)),
                None => {}
            }
        }
        Ok(Self { fields: normalized })
    }

    /// Parses serialized identifier text.
    pub fn parse(text: &str) -> NameResult<Self> {
        let captures = IDENTIFIER_RE
            .captures(text)
            .ok_or_else(|| NameError::InvalidName(text.to_string()))?;
        let mut fields = FieldMap::new();
        for field in Field::ALL {
            if let Some(value) = captures.name(field.as_str()) {
                fields.insert(field, FieldValue::from(value.as_str()));
            }
        }
        Self::build(&fields)
    }

    /// Default field values, useful as a base for `build`.
    pub fn default_fields() -> FieldMap {
        Field::ALL
            .into_iter()
            .filter_map(|field| field.default_value().map(|value| (field, value)))
            .collect()
    }

    /// Returns an identifier with unique placeholder values for absent name fields.
    ///
    /// `index` is always replaced by the next value of a process-wide counter,
    /// so two calls never produce the same identifier.
    pub fn anonymous(base: &FieldMap) -> NameResult<Self> {
        let mut fields = Self::default_fields();
        let token = Uuid::new_v4().simple().to_string();
        let chunks = token
            .as_bytes()
            .chunks(ANONYMOUS_TOKEN_LEN)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>();
        for (field, chunk) in Field::NAME_FIELDS.into_iter().zip(chunks.iter().cycle()) {
            fields.insert(field, FieldValue::Text(chunk.clone()));
        }
        fields.extend(base.iter().map(|(field, value)| (*field, value.clone())));

        let discriminator = ANONYMOUS_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        fields.insert(Field::Index, FieldValue::Int(discriminator));
        Self::build(&fields)
    }

    /// Returns a new identifier with `overrides` applied on top of this one.
    pub fn with(&self, overrides: &FieldMap) -> NameResult<Self> {
        let mut fields = self.fields.clone();
        fields.extend(overrides.iter().map(|(field, value)| (*field, value.clone())));
        Self::build(&fields)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Extension of the document file.
    pub fn suffix(&self) -> &str {
        self.get(Field::Suffix)
            .and_then(FieldValue::as_text)
            .unwrap_or(DEFAULT_SUFFIX)
    }

    /// Serialized document file name.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for field in Field::NAME_FIELDS {
            if !first {
                f.write_str("-")?;
            }
            first = false;
            if let Some(value) = self.get(field) {
                write!(f, "{value}")?;
            }
        }
        if let Some(output) = self.get(Field::Output) {
            write!(f, ".{output}")?;
        }
        if let Some(version) = self.get(Field::Version) {
            write!(f, ".{version}")?;
        }
        if let Some(index) = self.get(Field::Index) {
            write!(f, ".{index}")?;
        }
        write!(f, ".{}", self.suffix())
    }
}

impl FromStr for Identifier {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        for field in Field::ALL {
            let ordering = self.get(field).cmp(&other.get(field));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::Identifier;
    use crate::names::{Field, FieldMap, FieldValue};

    #[test]
    fn default_identifier_serializes_in_field_order() {
        let id = Identifier::build(&Identifier::default_fields()).unwrap();
        assert_eq!(
            id.name(),
            "demo-3d-abc-entity-rnd-main-atom-lead-base-whole.1.sqlite"
        );
    }

    #[test]
    fn optional_pipe_fields_are_rendered_around_version() {
        let mut fields = Identifier::default_fields();
        fields.insert(Field::Output, FieldValue::from("cache"));
        fields.insert(Field::Index, FieldValue::Int(7));
        fields.insert(Field::Suffix, FieldValue::from("db"));
        let id = Identifier::build(&fields).unwrap();
        assert_eq!(
            id.name(),
            "demo-3d-abc-entity-rnd-main-atom-lead-base-whole.cache.1.7.db"
        );
        assert_eq!(Identifier::parse(&id.name()).unwrap(), id);
    }

    #[test]
    fn with_overrides_single_fields() {
        let base = Identifier::build(&Identifier::default_fields()).unwrap();
        let overrides = FieldMap::from([(Field::Item, FieldValue::from("hero"))]);
        let derived = base.with(&overrides).unwrap();
        assert_eq!(derived.get(Field::Item), Some(&FieldValue::from("hero")));
        assert_eq!(derived.get(Field::Code), base.get(Field::Code));
    }
}
