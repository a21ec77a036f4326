use std::collections::HashSet;
use strata_core::names::{Field, FieldMap, FieldValue, Identifier, NameError};

fn fields(pairs: &[(Field, &str)]) -> FieldMap {
    let mut fields = Identifier::default_fields();
    for (field, value) in pairs {
        fields.insert(*field, FieldValue::from(*value));
    }
    fields
}

#[test]
fn parse_inverts_build_for_valid_field_sets() {
    let samples = [
        fields(&[]),
        fields(&[(Field::Cluster, "Character"), (Field::Item, "Hero01")]),
        fields(&[(Field::Output, "cache"), (Field::Version, "12")]),
        fields(&[(Field::Index, "3"), (Field::Suffix, "db")]),
    ];
    for sample in samples {
        let built = Identifier::build(&sample).unwrap();
        let parsed = Identifier::parse(&built.name()).unwrap();
        assert_eq!(parsed, built);
        assert_eq!(Identifier::build(parsed.fields()).unwrap(), built);
    }
}

#[test]
fn build_reports_offending_field() {
    let err = Identifier::build(&fields(&[(Field::Area, "r&d")])).unwrap_err();
    assert_eq!(
        err,
        NameError::InvalidField {
            field: Field::Area,
            value: "r&d".to_string()
        }
    );

    let mut missing = Identifier::default_fields();
    missing.remove(&Field::Step);
    assert_eq!(
        Identifier::build(&missing).unwrap_err(),
        NameError::MissingField(Field::Step)
    );
}

#[test]
fn build_defaults_suffix_and_rejects_unknown_extensions() {
    let mut without_suffix = Identifier::default_fields();
    without_suffix.remove(&Field::Suffix);
    let built = Identifier::build(&without_suffix).unwrap();
    assert_eq!(built.suffix(), "sqlite");

    let err = Identifier::build(&fields(&[(Field::Suffix, "usda")])).unwrap_err();
    assert!(matches!(err, NameError::InvalidField { field: Field::Suffix, .. }));
}

#[test]
fn parse_rejects_foreign_names() {
    for text in [
        "notes.txt",
        "demo-3d-abc.1.sqlite",
        "demo-3d-abc-entity-rnd-main-atom-lead-base-whole.sqlite",
        "demo-3d-abc-entity-rnd-main-atom-lead-base-whole.1.usda",
    ] {
        assert!(
            matches!(Identifier::parse(text), Err(NameError::InvalidName(_))),
            "{text} should not parse"
        );
    }
}

#[test]
fn anonymous_identifiers_never_collide() {
    let base = FieldMap::from([(Field::Code, FieldValue::from("proto"))]);
    let identifiers = (0..64)
        .map(|_| Identifier::anonymous(&base).unwrap())
        .collect::<Vec<_>>();

    let unique = identifiers
        .iter()
        .map(Identifier::name)
        .collect::<HashSet<_>>();
    assert_eq!(unique.len(), identifiers.len());
    assert!(identifiers
        .iter()
        .all(|id| id.get(Field::Code) == Some(&FieldValue::from("proto"))));
    assert!(identifiers.iter().all(|id| id.get(Field::Index).is_some()));
}

#[test]
fn ordering_follows_field_declaration_not_text() {
    let low_version = Identifier::build(&fields(&[(Field::Version, "2")])).unwrap();
    let high_version = Identifier::build(&fields(&[(Field::Version, "10")])).unwrap();
    assert!(low_version < high_version);
    assert!(low_version.name() > high_version.name());

    let early_code = Identifier::build(&fields(&[(Field::Code, "a"), (Field::Version, "10")]))
        .unwrap();
    assert!(early_code < low_version);

    let indexed = Identifier::build(&fields(&[(Field::Version, "2"), (Field::Index, "0")]))
        .unwrap();
    assert!(low_version < indexed);
}

#[test]
fn identifier_serializes_as_its_name() {
    let id = Identifier::build(&Identifier::default_fields()).unwrap();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", id.name()));
}
