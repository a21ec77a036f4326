use strata_core::db::open_db_in_memory;
use strata_core::model::{ArcKind, CompositionArc, MetaValue, NodePath, NodeSpecifier};
use strata_core::repo::layer_repo::{LayerRepoError, LayerRepository, SqliteLayerRepository};

fn path(value: &str) -> NodePath {
    NodePath::parse(value).unwrap()
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let err = SqliteLayerRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        LayerRepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[test]
fn define_node_requires_parent_and_keeps_existing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();

    let err = repo
        .define_node(&path("/Taxonomy/Character"), NodeSpecifier::Def)
        .unwrap_err();
    assert!(matches!(err, LayerRepoError::ParentNotFound(parent) if parent == path("/Taxonomy")));

    let created = repo
        .define_node(&path("/Taxonomy"), NodeSpecifier::Class)
        .unwrap();
    assert!(created.is_created());

    let again = repo
        .define_node(&path("/Taxonomy"), NodeSpecifier::Def)
        .unwrap();
    assert!(!again.is_created());
    assert_eq!(again.get().specifier, NodeSpecifier::Class);
}

#[test]
fn children_are_listed_by_name() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();
    repo.define_node(&path("/Taxonomy"), NodeSpecifier::Class)
        .unwrap();
    for name in ["Prop", "Character", "Set"] {
        repo.define_node(&path(&format!("/Taxonomy/{name}")), NodeSpecifier::Def)
            .unwrap();
    }

    let names = repo
        .list_children(Some(&path("/Taxonomy")))
        .unwrap()
        .into_iter()
        .map(|node| node.path.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Character", "Prop", "Set"]);

    let roots = repo.list_children(None).unwrap();
    assert_eq!(roots.len(), 1);
}

#[test]
fn arcs_are_idempotent_and_ordered() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();
    let hero = path("/Hero");
    repo.define_node(&hero, NodeSpecifier::Def).unwrap();

    let character = CompositionArc::internal(ArcKind::Inherits, path("/Character"));
    let asset = CompositionArc::internal(ArcKind::Inherits, path("/Asset"));
    let external = CompositionArc::external(ArcKind::References, "other.sqlite", path("/Origin"));

    assert!(repo.add_arc(&hero, &character).unwrap());
    assert!(repo.add_arc(&hero, &asset).unwrap());
    assert!(!repo.add_arc(&hero, &character).unwrap());
    assert!(repo.add_arc(&hero, &external).unwrap());

    assert_eq!(
        repo.list_arcs(&hero, ArcKind::Inherits).unwrap(),
        vec![character, asset]
    );
    assert_eq!(
        repo.list_arcs(&hero, ArcKind::References).unwrap(),
        vec![external]
    );

    let missing = repo
        .add_arc(&path("/Missing"), &CompositionArc::internal(ArcKind::Inherits, hero))
        .unwrap_err();
    assert!(matches!(missing, LayerRepoError::NodeNotFound(_)));
}

#[test]
fn metadata_round_trips_every_scalar_kind() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();
    let node = path("/Origin");
    repo.define_node(&node, NodeSpecifier::Def).unwrap();

    repo.set_metadata(&node, "props", "name", &MetaValue::from("hero"))
        .unwrap();
    repo.set_metadata(&node, "props", "lod", &MetaValue::Int(2))
        .unwrap();
    repo.set_metadata(&node, "props", "scale", &MetaValue::Float(0.5))
        .unwrap();
    repo.set_metadata(&node, "props", "hidden", &MetaValue::Bool(true))
        .unwrap();
    repo.set_metadata(&node, "props", "lod", &MetaValue::Int(3))
        .unwrap();

    let props = repo.metadata(&node, "props").unwrap();
    assert_eq!(props.len(), 4);
    assert_eq!(props["name"], MetaValue::from("hero"));
    assert_eq!(props["lod"], MetaValue::Int(3));
    assert_eq!(props["scale"], MetaValue::Float(0.5));
    assert_eq!(props["hidden"], MetaValue::Bool(true));
    assert!(repo.metadata(&node, "display").unwrap().is_empty());
}

#[test]
fn non_finite_floats_are_refused_and_leave_the_node_readable() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();
    let node = path("/Origin");
    repo.define_node(&node, NodeSpecifier::Def).unwrap();
    repo.set_metadata(&node, "props", "weight", &MetaValue::Float(1.5))
        .unwrap();

    for value in [f64::NAN, f64::INFINITY] {
        let err = repo
            .set_metadata(&node, "props", "weight", &MetaValue::Float(value))
            .unwrap_err();
        assert!(matches!(err, LayerRepoError::NonFiniteValue { ref key } if key == "weight"));
    }

    let props = repo.metadata(&node, "props").unwrap();
    assert_eq!(props["weight"], MetaValue::Float(1.5));
}

#[test]
fn composed_metadata_prefers_local_then_inherits_then_references() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();
    let (base, shared, child) = (path("/Base"), path("/Shared"), path("/Child"));
    for node in [&base, &shared, &child] {
        repo.define_node(node, NodeSpecifier::Def).unwrap();
    }
    repo.set_metadata(&base, "fields", "area", &MetaValue::from("base"))
        .unwrap();
    repo.set_metadata(&base, "fields", "stream", &MetaValue::from("base"))
        .unwrap();
    repo.set_metadata(&shared, "fields", "area", &MetaValue::from("shared"))
        .unwrap();
    repo.set_metadata(&shared, "fields", "step", &MetaValue::from("shared"))
        .unwrap();
    repo.set_metadata(&child, "fields", "stream", &MetaValue::from("child"))
        .unwrap();

    // References are added before inherits.
    repo.add_arc(&child, &CompositionArc::internal(ArcKind::References, shared.clone()))
        .unwrap();
    repo.add_arc(&child, &CompositionArc::internal(ArcKind::Inherits, base.clone()))
        .unwrap();

    let composed = repo.composed_metadata(&child, "fields").unwrap();
    assert_eq!(composed["stream"], MetaValue::from("child"));
    assert_eq!(composed["area"], MetaValue::from("base"));
    assert_eq!(composed["step"], MetaValue::from("shared"));
}

#[test]
fn composed_metadata_terminates_on_cycles() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();
    let (left, right) = (path("/Left"), path("/Right"));
    repo.define_node(&left, NodeSpecifier::Def).unwrap();
    repo.define_node(&right, NodeSpecifier::Def).unwrap();
    repo.add_arc(&left, &CompositionArc::internal(ArcKind::Inherits, right.clone()))
        .unwrap();
    repo.add_arc(&right, &CompositionArc::internal(ArcKind::Inherits, left.clone()))
        .unwrap();
    repo.set_metadata(&right, "taxa", "Right", &MetaValue::Int(0))
        .unwrap();

    let composed = repo.composed_metadata(&left, "taxa").unwrap();
    assert_eq!(composed.len(), 1);
}

#[test]
fn layer_info_and_sublayers_persist() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLayerRepository::try_new(&conn).unwrap();

    assert_eq!(repo.layer_info("default_node").unwrap(), None);
    repo.set_layer_info("default_node", "Origin").unwrap();
    repo.set_layer_info("default_node", "Root").unwrap();
    assert_eq!(
        repo.layer_info("default_node").unwrap().as_deref(),
        Some("Root")
    );

    assert!(repo.add_sublayer("b.sqlite").unwrap());
    assert!(repo.add_sublayer("a.sqlite").unwrap());
    assert!(!repo.add_sublayer("b.sqlite").unwrap());
    assert_eq!(repo.sublayers().unwrap(), vec!["b.sqlite", "a.sqlite"]);
}
