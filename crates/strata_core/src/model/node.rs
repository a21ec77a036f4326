//! Layer node, path and composition arc model.
//!
//! # Invariants
//! - `NodePath` is absolute, non-root and made of valid node names.
//! - Arc order within one kind is composition precedence, strongest first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};

static NODE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid node name regex"));

/// Returns whether `name` can be used as one path element.
pub fn is_valid_node_name(name: &str) -> bool {
    NODE_NAME_RE.is_match(name)
}

/// Absolute path of one node inside a layer, e.g. `/Taxonomy/Character`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(String);

impl NodePath {
    /// Path of a top-level node.
    pub fn root_child(name: &str) -> Option<Self> {
        is_valid_node_name(name).then(|| Self(format!("/{name}")))
    }

    /// Parses an absolute path such as `/Catalogue/Character/Hero01`.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.strip_prefix('/')?;
        if rest.is_empty() || !rest.split('/').all(is_valid_node_name) {
            return None;
        }
        Some(Self(value.to_string()))
    }

    pub fn child(&self, name: &str) -> Option<Self> {
        is_valid_node_name(name).then(|| Self(format!("{}/{name}", self.0)))
    }

    /// Parent path, `None` for top-level nodes.
    pub fn parent(&self) -> Option<Self> {
        let (parent, _) = self.0.rsplit_once('/')?;
        (!parent.is_empty()).then(|| Self(parent.to_string()))
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of path elements.
    pub fn depth(&self) -> usize {
        self.0.matches('/').count()
    }
}

impl Display for NodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// How a node is introduced in a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSpecifier {
    /// Concrete definition.
    Def,
    /// Opinions over a node defined elsewhere.
    Over,
    /// Abstract node meant to be inherited from.
    Class,
}

impl NodeSpecifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Def => "def",
            Self::Over => "over",
            Self::Class => "class",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "def" => Some(Self::Def),
            "over" => Some(Self::Over),
            "class" => Some(Self::Class),
            _ => None,
        }
    }
}

/// Composition arc kind, declared from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcKind {
    Inherits,
    References,
    Specializes,
}

impl ArcKind {
    pub const ALL: [ArcKind; 3] = [ArcKind::Inherits, ArcKind::References, ArcKind::Specializes];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inherits => "inherits",
            Self::References => "references",
            Self::Specializes => "specializes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inherits" => Some(Self::Inherits),
            "references" => Some(Self::References),
            "specializes" => Some(Self::Specializes),
            _ => None,
        }
    }
}

/// One directed composition arc authored on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CompositionArc {
    pub kind: ArcKind,
    /// Identifier of the target layer. `None` targets the same layer.
    pub target_layer: Option<String>,
    pub target_path: NodePath,
}

impl CompositionArc {
    /// Arc to a node of the same layer.
    pub fn internal(kind: ArcKind, target_path: NodePath) -> Self {
        Self {
            kind,
            target_layer: None,
            target_path,
        }
    }

    /// Arc to a node of another layer.
    pub fn external(kind: ArcKind, target_layer: impl Into<String>, target_path: NodePath) -> Self {
        Self {
            kind,
            target_layer: Some(target_layer.into()),
            target_path,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.target_layer.is_none()
    }
}

/// Node read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub path: NodePath,
    pub specifier: NodeSpecifier,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::NodePath;

    #[test]
    fn paths_navigate_parents_and_children() {
        let taxonomy = NodePath::root_child("Taxonomy").unwrap();
        let taxon = taxonomy.child("Character").unwrap();
        assert_eq!(taxon.as_str(), "/Taxonomy/Character");
        assert_eq!(taxon.name(), "Character");
        assert_eq!(taxon.parent(), Some(taxonomy.clone()));
        assert_eq!(taxonomy.parent(), None);
        assert_eq!(taxon.depth(), 2);
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(NodePath::root_child("#invalid").is_none());
        assert!(NodePath::parse("Taxonomy/Character").is_none());
        assert!(NodePath::parse("/Taxonomy//Character").is_none());
        assert!(NodePath::parse("/").is_none());
        assert!(NodePath::parse("/Catalogue/Character/Hero01").is_some());
    }
}
