use std::sync::Arc;
use strata_core::model::{MetaValue, NodePath, NodeSpecifier};
use strata_core::repo::layer_repo::{LayerRepoError, LayerRepository};
use strata_core::{DocumentStore, Identifier, RepositoryLocator, StoreError};
use tempfile::TempDir;

fn default_identifier() -> Identifier {
    Identifier::build(&Identifier::default_fields()).unwrap()
}

fn store_in(dir: &TempDir) -> DocumentStore {
    DocumentStore::new(RepositoryLocator::with_root(dir.path()))
}

#[test]
fn fetch_requires_repository_root() {
    let store = DocumentStore::new(RepositoryLocator::new());
    let err = store.fetch(&default_identifier(), true).unwrap_err();
    assert!(matches!(err, StoreError::RepositoryNotSet));
}

#[test]
fn fetch_without_create_reports_missing_document() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let identifier = default_identifier();

    let err = store.fetch(&identifier, false).unwrap_err();
    match err {
        StoreError::DocumentNotFound { identifier: name, path } => {
            assert_eq!(name, identifier.name());
            assert_eq!(path, dir.path().join(identifier.name()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join(identifier.name()).exists());
}

#[test]
fn created_document_is_on_disk_and_cached() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let identifier = default_identifier();

    let first = store.fetch(&identifier, true).unwrap();
    assert!(dir.path().join(identifier.name()).is_file());
    assert_eq!(first.path(), Some(dir.path().join(identifier.name()).as_path()));
    assert_eq!(first.identifier(), Some(&identifier));
    assert!(store.is_open(&identifier).unwrap());

    let second = store.fetch(&identifier, false).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn root_changes_apply_to_the_next_fetch() {
    let first_root = TempDir::new().unwrap();
    let second_root = TempDir::new().unwrap();
    let locator = RepositoryLocator::with_root(first_root.path());
    let store = DocumentStore::new(locator.clone());
    let identifier = default_identifier();

    store.fetch(&identifier, true).unwrap();
    locator.set(second_root.path());
    assert_eq!(
        store.resolve(&identifier).unwrap(),
        second_root.path().join(identifier.name())
    );
    assert!(!store.is_open(&identifier).unwrap());

    store.fetch(&identifier, true).unwrap();
    assert!(first_root.path().join(identifier.name()).is_file());
    assert!(second_root.path().join(identifier.name()).is_file());
}

#[test]
fn edits_survive_close_and_reload() {
    let dir = TempDir::new().unwrap();
    let identifier = default_identifier();
    let node = NodePath::parse("/Origin").unwrap();

    {
        let store = store_in(&dir);
        let document = store.fetch(&identifier, true).unwrap();
        document
            .edit(|repo| -> Result<(), LayerRepoError> {
                repo.define_node(&node, NodeSpecifier::Def)?;
                repo.set_metadata(&node, "props", "lod", &MetaValue::Int(2))
            })
            .unwrap();
        assert!(document.is_dirty());
        store.close().unwrap();
        assert!(!document.is_dirty());
        assert!(!store.is_open(&identifier).unwrap());
    }

    let store = store_in(&dir);
    let document = store.fetch(&identifier, false).unwrap();
    let props = document
        .read(|repo| repo.metadata(&node, "props"))
        .unwrap();
    assert_eq!(props["lod"], MetaValue::Int(2));
}

#[test]
fn dropping_the_store_saves_dirty_documents() {
    let dir = TempDir::new().unwrap();
    let identifier = default_identifier();

    {
        let store = store_in(&dir);
        let document = store.fetch(&identifier, true).unwrap();
        document
            .edit(|repo| repo.set_layer_info("default_node", "Origin"))
            .unwrap();
    }

    let store = store_in(&dir);
    let document = store.fetch(&identifier, false).unwrap();
    let default_node = document
        .read(|repo| repo.layer_info("default_node"))
        .unwrap();
    assert_eq!(default_node.as_deref(), Some("Origin"));
}

#[test]
fn failed_edit_rolls_back() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let document = store.fetch(&default_identifier(), true).unwrap();
    let node = NodePath::parse("/Origin").unwrap();

    let result = document.edit(|repo| -> Result<(), LayerRepoError> {
        repo.define_node(&node, NodeSpecifier::Def)?;
        repo.define_node(&NodePath::parse("/Missing/Child").unwrap(), NodeSpecifier::Def)?;
        Ok(())
    });
    assert!(matches!(result, Err(LayerRepoError::ParentNotFound(_))));
    assert!(document.read(|repo| repo.get_node(&node)).unwrap().is_none());
}

#[test]
fn in_memory_documents_are_never_written() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let identifier = Identifier::anonymous(&Default::default()).unwrap();

    let document = store.create_in_memory(Some(identifier.clone())).unwrap();
    document
        .edit(|repo| repo.set_layer_info("default_node", "Origin"))
        .unwrap();
    assert_eq!(document.path(), None);
    assert!(!document.save().unwrap());
    assert!(!store.is_open(&identifier).unwrap());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let anonymous = store.create_in_memory(None).unwrap();
    assert_eq!(anonymous.display_id(), "anonymous");
}
