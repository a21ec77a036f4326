//! Unit read model.

use serde::Serialize;

use super::node::NodePath;
use super::value::PropertyMap;
use crate::names::Identifier;

/// Top-level node grouping unit entries by taxon.
pub const CATALOGUE_NODE: &str = "Catalogue";

/// Default node of every unit layer.
pub const ORIGIN_NODE: &str = "Origin";

/// Metadata dictionary holding asset name and identifier.
pub const ASSET_DICTIONARY: &str = "asset";

/// Metadata dictionary holding display values such as `label`.
pub const DISPLAY_DICTIONARY: &str = "display";

/// Metadata dictionary holding authored unit properties.
pub const PROPS_DICTIONARY: &str = "props";

/// Value object describing one unit for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRef {
    pub taxon: String,
    /// Caller supplied discriminator.
    pub name: String,
    /// Catalogue node path, `/Catalogue/<taxon>/<name>`.
    pub path: NodePath,
    /// Identifier of the unit's own layer.
    pub asset: Identifier,
    pub label: Option<String>,
    pub fields: PropertyMap,
}

impl UnitRef {
    /// Display identity, `Taxon/Name`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.taxon, self.name)
    }
}
