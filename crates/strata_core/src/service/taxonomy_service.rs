//! Taxonomy use-case service.
//!
//! # Responsibility
//! - Define taxa under `/Taxonomy` with classification fields and arcs.
//! - Reject cycles and incompatible re-definitions before committing.
//! - List taxa and walk their lineage.
//!
//! # Invariants
//! - Taxon names are unique under `/Taxonomy`; re-definition never duplicates arcs.
//! - `cluster` is always the taxon name and `item` is never set on a taxon.
//! - Cycle checks run on a graph snapshot inside the defining transaction.
//! - Composed fields resolve local first, then inherits, then references.

use crate::define::define_keyed;
use crate::model::node::{ArcKind, CompositionArc, NodePath, NodeSpecifier};
use crate::model::taxon::{TaxonRef, FIELDS_DICTIONARY, TAXA_DICTIONARY, TAXONOMY_NODE};
use crate::model::value::{MetaValue, PropertyMap};
use crate::names::{Field, FieldMap, FieldValue, NameError};
use crate::repo::layer_repo::{LayerRepoError, LayerRepository, SqliteLayerRepository};
use crate::service::graph::{Direction, Lineage, TaxonomyGraph};
use crate::store::{Document, StoreError};
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Fields assigned by the engine and refused from callers.
pub const RESERVED_FIELDS: [Field; 2] = [Field::Cluster, Field::Item];

pub type TaxonomyResult<T> = Result<T, TaxonomyError>;

/// Errors from taxonomy service operations.
#[derive(Debug)]
pub enum TaxonomyError {
    /// Name is not a valid node name.
    InvalidTaxonName(String),
    /// Name collides with the taxonomy namespace itself.
    ReservedName(String),
    /// Field is assigned by the engine.
    ReservedField(Field),
    /// Existing taxon differs from the requested definition.
    TaxonConflict { taxon: String, reason: String },
    /// Arc from `taxon` to `target` would close a cycle.
    CyclicTaxonomy { taxon: String, target: String },
    /// Taxon is not defined in the document.
    TaxonNotFound(String),
    /// Field value failed validation.
    Name(NameError),
    /// Repository-level failure.
    Repo(LayerRepoError),
    /// Document persistence failure.
    Store(StoreError),
}

impl Display for TaxonomyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTaxonName(name) => write!(
                f,
                "invalid taxon name `{name}`; expected letters, digits or underscores"
            ),
            Self::ReservedName(name) => write!(f, "taxon name `{name}` is reserved"),
            Self::ReservedField(field) => {
                write!(f, "field `{field}` is assigned by the taxonomy and cannot be set")
            }
            Self::TaxonConflict { taxon, reason } => {
                write!(f, "taxon `{taxon}` already exists with a different definition: {reason}")
            }
            Self::CyclicTaxonomy { taxon, target } => {
                write!(f, "arc from `{taxon}` to `{target}` would create a cycle")
            }
            Self::TaxonNotFound(name) => write!(f, "taxon not found: {name}"),
            Self::Name(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaxonomyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Name(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NameError> for TaxonomyError {
    fn from(value: NameError) -> Self {
        Self::Name(value)
    }
}

impl From<LayerRepoError> for TaxonomyError {
    fn from(value: LayerRepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<StoreError> for TaxonomyError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Requested shape of one taxon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonDefinition {
    pub name: String,
    pub fields: FieldMap,
    /// Inherited taxa, strongest first.
    pub inherits: Vec<String>,
    /// Referenced taxa, strongest first.
    pub references: Vec<String>,
}

impl TaxonDefinition {
    /// Copy with repeated inherits and references targets collapsed,
    /// keeping the first occurrence of each.
    fn deduplicated(&self) -> Self {
        fn unique(names: &[String]) -> Vec<String> {
            let mut seen = HashSet::new();
            names
                .iter()
                .filter(|name| seen.insert(name.as_str()))
                .cloned()
                .collect()
        }
        Self {
            inherits: unique(&self.inherits),
            references: unique(&self.references),
            ..self.clone()
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn fields(mut self, fields: FieldMap) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn inherits<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherits.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn references<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Taxonomy service bound to one document.
pub struct TaxonomyService<'doc> {
    document: &'doc Document,
}

impl<'doc> TaxonomyService<'doc> {
    pub fn new(document: &'doc Document) -> Self {
        Self { document }
    }

    /// Defines a taxon, or returns the existing one when compatible.
    ///
    /// # Errors
    /// - `InvalidTaxonName`/`ReservedName` for the taxon or an arc target.
    /// - `ReservedField` when `cluster` or `item` is supplied.
    /// - `CyclicTaxonomy` when an arc would reach back to the taxon.
    /// - `TaxonConflict` when an existing taxon is incompatible.
    pub fn define_taxon(&self, definition: &TaxonDefinition) -> TaxonomyResult<TaxonRef> {
        let started_at = Instant::now();
        let definition = &definition.deduplicated();
        let name = definition.name.trim();
        let path = taxon_path(name)?;
        for target in definition.inherits.iter().chain(&definition.references) {
            taxon_path(target)?;
        }
        let fields = normalize_fields(&definition.fields)?;

        let result = self.document.edit(|repo| {
            let taxonomy = taxonomy_path()?;
            repo.define_node(&taxonomy, NodeSpecifier::Class)?;

            let graph = TaxonomyGraph::load(repo)?;
            let targets = definition
                .inherits
                .iter()
                .chain(&definition.references)
                .map(String::as_str)
                .collect::<Vec<_>>();
            if let Some(target) = graph.would_cycle(name, &targets) {
                return Err(TaxonomyError::CyclicTaxonomy {
                    taxon: name.to_string(),
                    target: target.to_string(),
                });
            }

            let defined = define_keyed(
                || repo.get_node(&path).map_err(TaxonomyError::from),
                |existing| {
                    ensure_compatible(repo, name, definition, &fields)?;
                    Ok(existing)
                },
                || {
                    let node = repo.define_node(&path, NodeSpecifier::Def)?.into_inner();
                    write_taxon(repo, name, definition, &fields, &graph)?;
                    Ok(node)
                },
            )?;
            Ok((defined.is_created(), load_taxon_ref(repo, self.document, &path)?))
        });

        match result {
            Ok((created, taxon)) => {
                info!(
                    "event=taxon_define module=taxonomy status=ok outcome={} taxon={} document={} duration_ms={}",
                    if created { "created" } else { "existing" },
                    name,
                    self.document.display_id(),
                    started_at.elapsed().as_millis()
                );
                Ok(taxon)
            }
            Err(err) => {
                warn!(
                    "event=taxon_define module=taxonomy status=error taxon={} document={} error={}",
                    name,
                    self.document.display_id(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Lists defined taxa ordered by name.
    pub fn list_taxa(&self) -> TaxonomyResult<Vec<TaxonRef>> {
        self.document.read(|repo| {
            let taxonomy = taxonomy_path()?;
            repo.list_children(Some(&taxonomy))?
                .iter()
                .map(|node| load_taxon_ref(repo, self.document, &node.path))
                .collect()
        })
    }

    /// Loads one taxon, `None` when it is not defined.
    pub fn find_taxon(&self, name: &str) -> TaxonomyResult<Option<TaxonRef>> {
        let path = taxon_path(name)?;
        self.document.read(|repo| match repo.get_node(&path)? {
            Some(_) => load_taxon_ref(repo, self.document, &path).map(Some),
            None => Ok(None),
        })
    }

    /// Loads one taxon.
    pub fn taxon(&self, name: &str) -> TaxonomyResult<TaxonRef> {
        self.find_taxon(name)?
            .ok_or_else(|| TaxonomyError::TaxonNotFound(name.to_string()))
    }

    /// Snapshot of the taxonomy graph.
    pub fn graph(&self) -> TaxonomyResult<TaxonomyGraph> {
        self.document
            .read(|repo| TaxonomyGraph::load(repo).map_err(TaxonomyError::from))
    }

    /// Taxa `name` inherits or references, directly or transitively.
    pub fn ancestors(&self, name: &str) -> TaxonomyResult<Lineage> {
        self.lineage(name, Direction::Ancestors)
    }

    /// Taxa inheriting or referencing `name`, directly or transitively.
    pub fn descendants(&self, name: &str) -> TaxonomyResult<Lineage> {
        self.lineage(name, Direction::Descendants)
    }

    /// Whether the node at `path` belongs to `taxon` through composed membership.
    pub fn is_member(&self, path: &NodePath, taxon: &str) -> TaxonomyResult<bool> {
        self.document.read(|repo| {
            let taxa = repo.composed_metadata(path, TAXA_DICTIONARY)?;
            Ok(taxa.contains_key(taxon))
        })
    }

    /// Persists the document. Returns `false` for in-memory documents.
    pub fn save(&self) -> TaxonomyResult<bool> {
        Ok(self.document.save()?)
    }

    fn lineage(&self, name: &str, direction: Direction) -> TaxonomyResult<Lineage> {
        let graph = self.graph()?;
        if !graph.is_defined(name) {
            return Err(TaxonomyError::TaxonNotFound(name.to_string()));
        }
        Lineage::new(Arc::new(graph), name, direction)
            .ok_or_else(|| TaxonomyError::TaxonNotFound(name.to_string()))
    }
}

/// Node path of taxon `name`, validating the name.
pub fn taxon_path(name: &str) -> TaxonomyResult<NodePath> {
    if name == TAXONOMY_NODE {
        return Err(TaxonomyError::ReservedName(name.to_string()));
    }
    taxonomy_path()?
        .child(name)
        .ok_or_else(|| TaxonomyError::InvalidTaxonName(name.to_string()))
}

fn taxonomy_path() -> TaxonomyResult<NodePath> {
    NodePath::root_child(TAXONOMY_NODE)
        .ok_or_else(|| TaxonomyError::InvalidTaxonName(TAXONOMY_NODE.to_string()))
}

fn normalize_fields(fields: &FieldMap) -> TaxonomyResult<FieldMap> {
    let mut normalized = FieldMap::new();
    for (field, value) in fields {
        if RESERVED_FIELDS.contains(field) {
            return Err(TaxonomyError::ReservedField(*field));
        }
        normalized.insert(*field, field.normalize(value)?);
    }
    Ok(normalized)
}

fn write_taxon(
    repo: &SqliteLayerRepository<'_>,
    name: &str,
    definition: &TaxonDefinition,
    fields: &FieldMap,
    graph: &TaxonomyGraph,
) -> TaxonomyResult<()> {
    let path = taxon_path(name)?;
    for (field, value) in fields {
        repo.set_metadata(&path, FIELDS_DICTIONARY, field.as_str(), &MetaValue::from(value))?;
    }
    repo.set_metadata(
        &path,
        FIELDS_DICTIONARY,
        Field::Cluster.as_str(),
        &MetaValue::from(name),
    )?;
    repo.set_metadata(&path, TAXA_DICTIONARY, name, &MetaValue::Int(0))?;

    for (kind, targets) in [
        (ArcKind::Inherits, &definition.inherits),
        (ArcKind::References, &definition.references),
    ] {
        for target in targets {
            if !graph.is_defined(target) {
                info!(
                    "event=taxon_forward_arc module=taxonomy status=ok taxon={} kind={} target={}",
                    name,
                    kind.as_str(),
                    target
                );
            }
            repo.add_arc(&path, &CompositionArc::internal(kind, taxon_path(target)?))?;
        }
    }
    Ok(())
}

fn ensure_compatible(
    repo: &SqliteLayerRepository<'_>,
    name: &str,
    definition: &TaxonDefinition,
    fields: &FieldMap,
) -> TaxonomyResult<()> {
    let path = taxon_path(name)?;
    let conflict = |reason: String| TaxonomyError::TaxonConflict {
        taxon: name.to_string(),
        reason,
    };

    let existing = repo.metadata(&path, FIELDS_DICTIONARY)?;
    for (field, value) in fields {
        let requested = MetaValue::from(value);
        match existing.get(field.as_str()) {
            Some(current) if *current == requested => {}
            Some(current) => {
                return Err(conflict(format!(
                    "field `{field}` is `{current}`, requested `{requested}`"
                )))
            }
            None => return Err(conflict(format!("field `{field}` is not set"))),
        }
    }

    for (kind, requested) in [
        (ArcKind::Inherits, &definition.inherits),
        (ArcKind::References, &definition.references),
    ] {
        let current = arc_target_names(repo, &path, kind)?;
        if !is_subsequence(requested, &current) {
            return Err(conflict(format!(
                "{} {:?} do not match existing {:?}",
                kind.as_str(),
                requested,
                current
            )));
        }
    }
    Ok(())
}

fn is_subsequence(requested: &[String], existing: &[String]) -> bool {
    let mut remaining = existing.iter();
    requested
        .iter()
        .all(|name| remaining.any(|candidate| candidate == name))
}

fn arc_target_names(
    repo: &SqliteLayerRepository<'_>,
    path: &NodePath,
    kind: ArcKind,
) -> TaxonomyResult<Vec<String>> {
    Ok(repo
        .list_arcs(path, kind)?
        .into_iter()
        .filter(CompositionArc::is_internal)
        .map(|arc| arc.target_path.name().to_string())
        .collect())
}

fn load_taxon_ref(
    repo: &SqliteLayerRepository<'_>,
    document: &Document,
    path: &NodePath,
) -> TaxonomyResult<TaxonRef> {
    let composed = repo.composed_metadata(path, FIELDS_DICTIONARY)?;
    Ok(TaxonRef {
        name: path.name().to_string(),
        path: path.clone(),
        document: document.identifier().map(|identifier| identifier.name()),
        fields: to_field_map(&composed),
        inherits: arc_target_names(repo, path, ArcKind::Inherits)?,
        references: arc_target_names(repo, path, ArcKind::References)?,
    })
}

/// Keeps entries that are identifier fields with identifier-compatible values.
pub(crate) fn to_field_map(properties: &PropertyMap) -> FieldMap {
    properties
        .iter()
        .filter_map(|(key, value)| {
            let field = Field::from_str(key).ok()?;
            Some((field, value.to_field_value()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{is_subsequence, TaxonDefinition};

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn subsequence_respects_order() {
        let existing = names(&["A", "B", "C"]);
        assert!(is_subsequence(&names(&[]), &existing));
        assert!(is_subsequence(&names(&["A", "C"]), &existing));
        assert!(!is_subsequence(&names(&["C", "A"]), &existing));
        assert!(!is_subsequence(&names(&["D"]), &existing));
    }

    #[test]
    fn repeated_targets_collapse_to_first_occurrence() {
        let definition = TaxonDefinition::new("Hero")
            .inherits(["B", "A", "B"])
            .references(["C", "C"])
            .deduplicated();
        assert_eq!(definition.inherits, names(&["B", "A"]));
        assert_eq!(definition.references, names(&["C"]));
    }
}
