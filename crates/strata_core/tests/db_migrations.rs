use rusqlite::Connection;
use strata_core::db::migrations::latest_version;
use strata_core::db::{load_db, open_db_in_memory, persist_db, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["layer_info", "nodes", "arcs", "metadata", "sublayers"] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn persisted_layer_loads_back_with_its_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("layer.sqlite");

    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO layer_info (key, value) VALUES ('identifier', 'marker');",
        [],
    )
    .unwrap();
    persist_db(&conn, &path).unwrap();
    assert!(path.is_file());

    let loaded = load_db(&path).unwrap();
    assert_eq!(schema_version(&loaded), latest_version());
    let value: String = loaded
        .query_row(
            "SELECT value FROM layer_info WHERE key = 'identifier';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(value, "marker");
}

#[test]
fn persist_replaces_existing_file_without_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layer.sqlite");

    let conn = open_db_in_memory().unwrap();
    persist_db(&conn, &path).unwrap();
    conn.execute(
        "INSERT INTO layer_info (key, value) VALUES ('default_node', 'Origin');",
        [],
    )
    .unwrap();
    persist_db(&conn, &path).unwrap();

    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);
    let loaded = load_db(&path).unwrap();
    let count: i64 = loaded
        .query_row("SELECT COUNT(*) FROM layer_info;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn loading_layer_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = load_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
