//! Domain model for layered taxonomy content.
//!
//! # Responsibility
//! - Define node paths, composition arcs and metadata scalars of a layer.
//! - Define `TaxonRef`/`UnitRef` value objects handed to presentation layers.
//!
//! # Invariants
//! - Value objects never expose document handles.
//! - Fixed node names (`Taxonomy`, `Catalogue`, `Origin`) are shared by all layers.

pub mod node;
pub mod taxon;
pub mod unit;
pub mod value;

pub use node::{ArcKind, CompositionArc, NodePath, NodeSpec, NodeSpecifier};
pub use taxon::TaxonRef;
pub use unit::UnitRef;
pub use value::{MetaValue, PropertyMap};
