//! Taxonomy and unit composition engine.
//! This crate is the single source of truth for engine invariants.

pub mod config;
pub mod db;
pub mod define;
pub mod locator;
pub mod logging;
pub mod model;
pub mod names;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use define::Defined;
pub use locator::{LocatorError, RepositoryLocator};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{MetaValue, NodePath, PropertyMap, TaxonRef, UnitRef};
pub use names::{Field, FieldMap, FieldValue, Identifier, NameError};
pub use service::graph::{Lineage, TaxonomyGraph};
pub use service::taxonomy_service::{TaxonDefinition, TaxonomyError, TaxonomyService};
pub use service::unit_service::{
    BatchReport, CancelFlag, UnitError, UnitOutcome, UnitService,
};
pub use store::{Document, DocumentRef, DocumentStore, StoreError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
