//! Taxon read model.

use serde::Serialize;

use super::node::NodePath;
use crate::names::FieldMap;

/// Namespace node holding every taxon of a document.
pub const TAXONOMY_NODE: &str = "Taxonomy";

/// Metadata dictionary holding classification fields.
pub const FIELDS_DICTIONARY: &str = "fields";

/// Metadata dictionary holding taxon membership markers.
pub const TAXA_DICTIONARY: &str = "taxa";

/// Value object describing one taxon for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonRef {
    pub name: String,
    /// Node path inside the owning document, e.g. `/Taxonomy/Character`.
    pub path: NodePath,
    /// Identifier text of the owning document, `None` for anonymous layers.
    pub document: Option<String>,
    /// Classification fields, composed through arcs.
    pub fields: FieldMap,
    /// Names of inherited taxa, strongest first.
    pub inherits: Vec<String>,
    /// Names of referenced taxa, strongest first.
    pub references: Vec<String>,
}
