//! Unit factory use-case service.
//!
//! # Responsibility
//! - Create units under a taxon, one layer document per unit.
//! - Catalogue units in the taxonomy document under `/Catalogue/<taxon>/<name>`.
//! - Batch creation with per-unit outcomes and cooperative cancellation.
//!
//! # Invariants
//! - Unit identity is a pure function of taxon name and discriminator.
//! - Re-creating a unit updates supplied label/fields and keeps the rest.
//! - One failing unit in a batch never undoes another.
//! - Cancellation is observed between units, never inside one.

use crate::define::define_keyed;
use crate::model::node::{ArcKind, CompositionArc, NodePath, NodeSpecifier};
use crate::model::taxon::{FIELDS_DICTIONARY, TAXONOMY_NODE};
use crate::model::unit::{
    UnitRef, ASSET_DICTIONARY, CATALOGUE_NODE, DISPLAY_DICTIONARY, ORIGIN_NODE, PROPS_DICTIONARY,
};
use crate::model::value::{MetaValue, PropertyMap};
use crate::names::{Field, FieldValue, Identifier, NameError};
use crate::repo::layer_repo::{
    LayerRepoError, LayerRepository, SqliteLayerRepository, DEFAULT_NODE_KEY,
};
use crate::service::graph::{Direction, Lineage, TaxonomyGraph};
use crate::service::taxonomy_service::to_field_map;
use crate::store::{Document, DocumentStore, StoreError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const LABEL_KEY: &str = "label";
const MODEL_DICTIONARY: &str = "model";
const MODEL_KIND_KEY: &str = "kind";
const ASSEMBLY_KIND: &str = "assembly";

pub type UnitResult<T> = Result<T, UnitError>;

/// Errors from unit factory operations.
#[derive(Debug)]
pub enum UnitError {
    /// Discriminator is not a valid node name.
    InvalidDiscriminator(String),
    /// Taxon is not defined in the document.
    TaxonNotFound(String),
    /// Taxon carries no classification fields to derive an identifier from.
    MissingTaxonFields(String),
    /// Document is anonymous, so unit identifiers cannot be derived.
    DocumentWithoutIdentifier,
    /// No catalogue entry for `taxon/name`.
    UnitNotFound { taxon: String, name: String },
    /// Derived unit identifier would name the taxonomy document itself.
    IdentifierCollision(String),
    /// Property value cannot be stored.
    InvalidProperty { key: String, value: String },
    /// Derived identifier is invalid.
    Name(NameError),
    /// Repository-level failure.
    Repo(LayerRepoError),
    /// Document store failure.
    Store(StoreError),
}

impl Display for UnitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDiscriminator(value) => write!(
                f,
                "invalid unit discriminator `{value}`; expected letters, digits or underscores"
            ),
            Self::TaxonNotFound(name) => write!(f, "taxon not found: {name}"),
            Self::MissingTaxonFields(name) => {
                write!(f, "taxon `{name}` has no classification fields")
            }
            Self::DocumentWithoutIdentifier => {
                write!(f, "units can only be created in documents with an identifier")
            }
            Self::UnitNotFound { taxon, name } => write!(f, "unit not found: {taxon}/{name}"),
            Self::IdentifierCollision(identifier) => write!(
                f,
                "unit identifier `{identifier}` collides with the taxonomy document"
            ),
            Self::InvalidProperty { key, value } => {
                write!(f, "property `{key}` has unstorable value `{value}`")
            }
            Self::Name(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UnitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Name(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NameError> for UnitError {
    fn from(value: NameError) -> Self {
        Self::Name(value)
    }
}

impl From<LayerRepoError> for UnitError {
    fn from(value: LayerRepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<StoreError> for UnitError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Cloneable cancellation signal for batch creation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one discriminator in a batch.
#[derive(Debug)]
pub struct UnitOutcome {
    pub discriminator: String,
    pub result: UnitResult<UnitRef>,
}

/// Per-discriminator report of `create_units`.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Processed discriminators, in request order.
    pub outcomes: Vec<UnitOutcome>,
    /// Whether the batch stopped early on cancellation.
    pub cancelled: bool,
    /// Discriminators left unprocessed after cancellation.
    pub pending: Vec<String>,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &UnitRef> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &UnitError)> {
        self.outcomes.iter().filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .err()
                .map(|err| (outcome.discriminator.as_str(), err))
        })
    }
}

/// Unit factory bound to one taxonomy document.
pub struct UnitService<'a> {
    store: &'a DocumentStore,
    document: &'a Document,
}

impl<'a> UnitService<'a> {
    pub fn new(store: &'a DocumentStore, document: &'a Document) -> Self {
        Self { store, document }
    }

    /// Creates `taxon/discriminator`, or updates it when it already exists.
    ///
    /// Supplied `label` and `fields` are written over existing values;
    /// omitted keys are kept. The unit layer and the document are saved.
    ///
    /// # Errors
    /// - `InvalidDiscriminator` when `discriminator` is not a valid node name.
    /// - `TaxonNotFound`/`MissingTaxonFields` for unusable taxa.
    /// - `DocumentWithoutIdentifier` for anonymous documents.
    pub fn create_unit(
        &self,
        taxon: &str,
        discriminator: &str,
        label: Option<&str>,
        fields: &PropertyMap,
    ) -> UnitResult<UnitRef> {
        let started_at = Instant::now();
        let result = self.write_unit(taxon, discriminator, label, fields);
        match &result {
            Ok((created, unit)) => info!(
                "event=unit_create module=unit status=ok outcome={} unit={} asset={} duration_ms={}",
                if *created { "created" } else { "updated" },
                unit.id(),
                unit.asset,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=unit_create module=unit status=error unit={}/{} error={}",
                taxon, discriminator, err
            ),
        }
        result.map(|(_, unit)| unit)
    }

    /// Creates many units of one taxon, checking `cancel` between units.
    ///
    /// `labels` pair with `discriminators` in order. Missing or empty labels
    /// leave the unit unlabeled; extra labels are ignored.
    pub fn create_units<S: AsRef<str>>(
        &self,
        taxon: &str,
        discriminators: &[S],
        labels: &[S],
        cancel: &CancelFlag,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for (position, discriminator) in discriminators.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.pending = discriminators[position..]
                    .iter()
                    .map(|value| value.as_ref().to_string())
                    .collect();
                break;
            }
            let discriminator = discriminator.as_ref();
            let label = labels
                .get(position)
                .map(AsRef::as_ref)
                .filter(|label| !label.is_empty());
            report.outcomes.push(UnitOutcome {
                discriminator: discriminator.to_string(),
                result: self.create_unit(taxon, discriminator, label, &PropertyMap::new()),
            });
        }
        info!(
            "event=unit_batch module=unit status=ok taxon={} succeeded={} failed={} pending={} cancelled={}",
            taxon,
            report.successes().count(),
            report.failures().count(),
            report.pending.len(),
            report.cancelled
        );
        report
    }

    /// Loads one unit through its catalogue entry.
    pub fn unit(&self, taxon: &str, name: &str) -> UnitResult<UnitRef> {
        let catalogue_path = catalogue_path(taxon, name)?;
        let asset = self
            .catalogued_asset(&catalogue_path)?
            .ok_or_else(|| unit_not_found(taxon, name))?;
        let unit_document = self.store.fetch(&asset, false)?;
        unit_document.read(|repo| load_unit_ref(repo, taxon, name, &catalogue_path, &asset))
    }

    /// Lists units of `taxon` and of every taxon descending from it.
    ///
    /// Units of the taxon come first, then descendants in breadth-first
    /// order; names are sorted within one taxon.
    pub fn list_units(&self, taxon: &str) -> UnitResult<Vec<UnitRef>> {
        let entries = self.document.read(|repo| -> UnitResult<Vec<(String, String)>> {
            let graph = TaxonomyGraph::load(repo)?;
            if !graph.is_defined(taxon) {
                return Err(UnitError::TaxonNotFound(taxon.to_string()));
            }
            let lineage = Lineage::new(Arc::new(graph), taxon, Direction::Descendants)
                .ok_or_else(|| UnitError::TaxonNotFound(taxon.to_string()))?;

            let mut entries = Vec::new();
            for member in std::iter::once(taxon.to_string()).chain(lineage) {
                let Some(group) = catalogue_root()?.child(&member) else {
                    continue;
                };
                for node in repo.list_children(Some(&group))? {
                    entries.push((member.clone(), node.path.name().to_string()));
                }
            }
            Ok(entries)
        })?;

        entries
            .iter()
            .map(|(member, name)| self.unit(member, name))
            .collect()
    }

    /// Brings `child` into `parent` as `/Origin/<name>`, specializing the
    /// child's catalogue entry.
    pub fn spawn_unit(&self, parent: &UnitRef, child: &UnitRef, name: &str) -> UnitResult<NodePath> {
        let document_id = self
            .document
            .identifier()
            .ok_or(UnitError::DocumentWithoutIdentifier)?
            .name();
        let origin = origin_path()?;
        let spawned = origin
            .child(name)
            .ok_or_else(|| UnitError::InvalidDiscriminator(name.to_string()))?;

        let parent_document = self.store.fetch(&parent.asset, false)?;
        parent_document.edit(|repo| -> UnitResult<()> {
            repo.define_node(&spawned, NodeSpecifier::Def)?;
            repo.add_arc(
                &spawned,
                &CompositionArc::external(ArcKind::Specializes, document_id.as_str(), child.path.clone()),
            )?;
            Ok(())
        })?;
        parent_document.save()?;
        info!(
            "event=unit_spawn module=unit status=ok parent={} child={} path={}",
            parent.id(),
            child.id(),
            spawned
        );
        Ok(spawned)
    }

    fn write_unit(
        &self,
        taxon: &str,
        discriminator: &str,
        label: Option<&str>,
        fields: &PropertyMap,
    ) -> UnitResult<(bool, UnitRef)> {
        let catalogue_path = catalogue_path(taxon, discriminator)?;
        let document_id = self
            .document
            .identifier()
            .ok_or(UnitError::DocumentWithoutIdentifier)?
            .clone();
        if let Some((key, value)) = fields.iter().find(|(_, value)| !value.is_storable()) {
            return Err(UnitError::InvalidProperty {
                key: key.clone(),
                value: value.to_string(),
            });
        }
        let asset = match self.catalogued_asset(&catalogue_path)? {
            Some(asset) => asset,
            None => self.unit_identifier(&document_id, taxon, discriminator)?,
        };
        let unit_id = format!("{taxon}/{discriminator}");

        let unit_document = self.store.fetch(&asset, true)?;
        let created = unit_document.edit(|repo| -> UnitResult<bool> {
            let origin = origin_path()?;
            let defined = define_keyed(
                || repo.get_node(&origin).map_err(UnitError::from),
                Ok,
                || {
                    let node = repo.define_node(&origin, NodeSpecifier::Def)?.into_inner();
                    repo.set_layer_info(DEFAULT_NODE_KEY, ORIGIN_NODE)?;
                    repo.add_sublayer(&document_id.name())?;
                    repo.add_arc(
                        &origin,
                        &CompositionArc::external(
                            ArcKind::Inherits,
                            document_id.name(),
                            taxon_node(taxon)?,
                        ),
                    )?;
                    repo.set_metadata(&origin, ASSET_DICTIONARY, "name", &MetaValue::from(discriminator))?;
                    repo.set_metadata(
                        &origin,
                        ASSET_DICTIONARY,
                        "identifier",
                        &MetaValue::from(unit_id.as_str()),
                    )?;
                    Ok(node)
                },
            )?;

            if let Some(label) = label {
                repo.set_metadata(&origin, DISPLAY_DICTIONARY, LABEL_KEY, &MetaValue::from(label))?;
            }
            for (key, value) in fields {
                repo.set_metadata(&origin, PROPS_DICTIONARY, key, value)?;
            }
            Ok(defined.is_created())
        })?;

        self.document.edit(|repo| -> UnitResult<()> {
            let catalogue = catalogue_root()?;
            define_assembly(repo, &catalogue)?;
            if let Some(group) = catalogue_path.parent() {
                define_assembly(repo, &group)?;
            }
            repo.define_node(&catalogue_path, NodeSpecifier::Over)?;
            repo.add_arc(
                &catalogue_path,
                &CompositionArc::external(ArcKind::References, asset.name(), origin_path()?),
            )?;
            Ok(())
        })?;

        unit_document.save()?;
        self.document.save()?;

        let unit = unit_document
            .read(|repo| load_unit_ref(repo, taxon, discriminator, &catalogue_path, &asset))?;
        Ok((created, unit))
    }

    /// Layer named by the references arc of an existing catalogue entry.
    fn catalogued_asset(&self, catalogue_path: &NodePath) -> UnitResult<Option<Identifier>> {
        self.document.read(|repo| -> UnitResult<Option<Identifier>> {
            if repo.get_node(catalogue_path)?.is_none() {
                return Ok(None);
            }
            repo.list_arcs(catalogue_path, ArcKind::References)?
                .into_iter()
                .find_map(|arc| arc.target_layer)
                .map(|layer| Identifier::parse(&layer))
                .transpose()
                .map_err(UnitError::from)
        })
    }

    /// Document identifier with the taxon's fields and `item = discriminator`.
    ///
    /// # Errors
    /// - `IdentifierCollision` when the result keeps the document's own
    ///   `cluster` and `item`, which would make the unit the document itself.
    fn unit_identifier(
        &self,
        document_id: &Identifier,
        taxon: &str,
        discriminator: &str,
    ) -> UnitResult<Identifier> {
        let taxon_path = taxon_node(taxon)?;
        let mut fields = self.document.read(|repo| -> UnitResult<_> {
            if repo.get_node(&taxon_path)?.is_none() {
                return Err(UnitError::TaxonNotFound(taxon.to_string()));
            }
            Ok(to_field_map(&repo.composed_metadata(&taxon_path, FIELDS_DICTIONARY)?))
        })?;
        if !fields.contains_key(&Field::Cluster) {
            return Err(UnitError::MissingTaxonFields(taxon.to_string()));
        }
        fields.insert(Field::Item, FieldValue::from(discriminator));
        let asset = document_id.with(&fields)?;
        let same_slot = [Field::Cluster, Field::Item]
            .into_iter()
            .all(|field| asset.get(field) == document_id.get(field));
        if same_slot {
            return Err(UnitError::IdentifierCollision(asset.name()));
        }
        Ok(asset)
    }
}

fn define_assembly(repo: &SqliteLayerRepository<'_>, path: &NodePath) -> UnitResult<()> {
    if repo.define_node(path, NodeSpecifier::Def)?.is_created() {
        repo.set_metadata(
            path,
            MODEL_DICTIONARY,
            MODEL_KIND_KEY,
            &MetaValue::from(ASSEMBLY_KIND),
        )?;
    }
    Ok(())
}

fn load_unit_ref(
    repo: &SqliteLayerRepository<'_>,
    taxon: &str,
    name: &str,
    catalogue_path: &NodePath,
    asset: &Identifier,
) -> UnitResult<UnitRef> {
    let origin = origin_path()?;
    if repo.get_node(&origin)?.is_none() {
        return Err(unit_not_found(taxon, name));
    }
    let label = repo
        .metadata(&origin, DISPLAY_DICTIONARY)?
        .remove(LABEL_KEY)
        .map(|value| value.to_string());
    Ok(UnitRef {
        taxon: taxon.to_string(),
        name: name.to_string(),
        path: catalogue_path.clone(),
        asset: asset.clone(),
        label,
        fields: repo.metadata(&origin, PROPS_DICTIONARY)?,
    })
}

fn unit_not_found(taxon: &str, name: &str) -> UnitError {
    UnitError::UnitNotFound {
        taxon: taxon.to_string(),
        name: name.to_string(),
    }
}

fn taxon_node(taxon: &str) -> UnitResult<NodePath> {
    NodePath::root_child(TAXONOMY_NODE)
        .and_then(|taxonomy| taxonomy.child(taxon))
        .ok_or_else(|| UnitError::TaxonNotFound(taxon.to_string()))
}

fn catalogue_root() -> UnitResult<NodePath> {
    NodePath::root_child(CATALOGUE_NODE)
        .ok_or_else(|| UnitError::InvalidDiscriminator(CATALOGUE_NODE.to_string()))
}

fn origin_path() -> UnitResult<NodePath> {
    NodePath::root_child(ORIGIN_NODE)
        .ok_or_else(|| UnitError::InvalidDiscriminator(ORIGIN_NODE.to_string()))
}

/// Catalogue path of `taxon/name`, validating both parts.
fn catalogue_path(taxon: &str, name: &str) -> UnitResult<NodePath> {
    let group = catalogue_root()?
        .child(taxon)
        .ok_or_else(|| UnitError::TaxonNotFound(taxon.to_string()))?;
    group
        .child(name)
        .ok_or_else(|| UnitError::InvalidDiscriminator(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{catalogue_path, CancelFlag, UnitError};

    #[test]
    fn catalogue_path_validates_discriminator() {
        let path = catalogue_path("Character", "Hero01").unwrap();
        assert_eq!(path.as_str(), "/Catalogue/Character/Hero01");
        assert!(matches!(
            catalogue_path("Character", "#invalid"),
            Err(UnitError::InvalidDiscriminator(value)) if value == "#invalid"
        ));
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let worker = flag.clone();
        assert!(!worker.is_cancelled());
        flag.cancel();
        assert!(worker.is_cancelled());
    }
}
