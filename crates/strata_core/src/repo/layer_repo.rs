//! Layer node repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist nodes, composition arcs, metadata and sublayers of one layer.
//! - Resolve composed metadata across internal arcs.
//!
//! # Invariants
//! - A node is only inserted under an existing parent.
//! - `define_node` never changes an existing node.
//! - Arcs are unique per `(node, kind, target)` and keep insertion order.
//! - Composition strength: local, inherits, references, specializes.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::define::{define_keyed, Defined};
use crate::model::node::{ArcKind, CompositionArc, NodePath, NodeSpec, NodeSpecifier};
use crate::model::value::{MetaValue, PropertyMap};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Layer info key naming the default node.
pub const DEFAULT_NODE_KEY: &str = "default_node";

/// Layer info key holding the layer's own identifier text.
pub const IDENTIFIER_KEY: &str = "identifier";

const REQUIRED_TABLES: [&str; 5] = ["layer_info", "nodes", "arcs", "metadata", "sublayers"];

/// Result type used by layer repository operations.
pub type LayerRepoResult<T> = Result<T, LayerRepoError>;

/// Errors from layer repository operations.
#[derive(Debug)]
pub enum LayerRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target node does not exist.
    NodeNotFound(NodePath),
    /// Parent of a node being defined does not exist.
    ParentNotFound(NodePath),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Metadata value under `key` is a NaN or infinite float.
    NonFiniteValue { key: String },
    /// Persisted data cannot be converted to valid read model.
    InvalidData(String),
}

impl Display for LayerRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(path) => write!(f, "layer node not found: {path}"),
            Self::ParentNotFound(path) => write!(f, "parent node not found: {path}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "layer repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "layer repository requires table `{table}`")
            }
            Self::NonFiniteValue { key } => {
                write!(f, "metadata `{key}` must be a finite number")
            }
            Self::InvalidData(message) => write!(f, "invalid layer data: {message}"),
        }
    }
}

impl Error for LayerRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NodeNotFound(_) => None,
            Self::ParentNotFound(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::NonFiniteValue { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for LayerRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LayerRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for one layer document.
pub trait LayerRepository {
    /// Loads one node by path.
    fn get_node(&self, path: &NodePath) -> LayerRepoResult<Option<NodeSpec>>;
    /// Defines a node, returning the existing one unchanged when present.
    fn define_node(
        &self,
        path: &NodePath,
        specifier: NodeSpecifier,
    ) -> LayerRepoResult<Defined<NodeSpec>>;
    /// Lists children of `parent` ordered by name. `None` lists top-level nodes.
    fn list_children(&self, parent: Option<&NodePath>) -> LayerRepoResult<Vec<NodeSpec>>;
    /// Appends one arc. Returns `false` when the same arc already exists.
    fn add_arc(&self, path: &NodePath, arc: &CompositionArc) -> LayerRepoResult<bool>;
    /// Lists arcs of one kind, strongest first.
    fn list_arcs(&self, path: &NodePath, kind: ArcKind) -> LayerRepoResult<Vec<CompositionArc>>;
    /// Writes one metadata value, replacing any previous value for `key`.
    fn set_metadata(
        &self,
        path: &NodePath,
        dictionary: &str,
        key: &str,
        value: &MetaValue,
    ) -> LayerRepoResult<()>;
    /// Loads the locally authored entries of one dictionary.
    fn metadata(&self, path: &NodePath, dictionary: &str) -> LayerRepoResult<PropertyMap>;
    /// Loads one dictionary resolved through internal arcs.
    fn composed_metadata(&self, path: &NodePath, dictionary: &str)
        -> LayerRepoResult<PropertyMap>;
    /// Loads one layer info value.
    fn layer_info(&self, key: &str) -> LayerRepoResult<Option<String>>;
    /// Writes one layer info value.
    fn set_layer_info(&self, key: &str, value: &str) -> LayerRepoResult<()>;
    /// Appends one sublayer. Returns `false` when it is already present.
    fn add_sublayer(&self, identifier: &str) -> LayerRepoResult<bool>;
    /// Lists sublayers, strongest first.
    fn sublayers(&self) -> LayerRepoResult<Vec<String>>;
}

/// SQLite-backed layer repository.
pub struct SqliteLayerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLayerRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> LayerRepoResult<Self> {
        ensure_layer_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn require_node(&self, path: &NodePath) -> LayerRepoResult<()> {
        if node_exists(self.conn, path)? {
            Ok(())
        } else {
            Err(LayerRepoError::NodeNotFound(path.clone()))
        }
    }

    fn insert_node(&self, path: &NodePath, specifier: NodeSpecifier) -> LayerRepoResult<NodeSpec> {
        let parent = path.parent();
        if let Some(parent) = &parent {
            if !node_exists(self.conn, parent)? {
                return Err(LayerRepoError::ParentNotFound(parent.clone()));
            }
        }
        self.conn.execute(
            "INSERT INTO nodes (path, parent_path, name, specifier)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                path.as_str(),
                parent.as_ref().map(NodePath::as_str),
                path.name(),
                specifier.as_str(),
            ],
        )?;
        load_node(self.conn, path)?.ok_or_else(|| LayerRepoError::NodeNotFound(path.clone()))
    }
}

impl LayerRepository for SqliteLayerRepository<'_> {
    fn get_node(&self, path: &NodePath) -> LayerRepoResult<Option<NodeSpec>> {
        load_node(self.conn, path)
    }

    fn define_node(
        &self,
        path: &NodePath,
        specifier: NodeSpecifier,
    ) -> LayerRepoResult<Defined<NodeSpec>> {
        define_keyed(
            || load_node(self.conn, path),
            Ok,
            || self.insert_node(path, specifier),
        )
    }

    fn list_children(&self, parent: Option<&NodePath>) -> LayerRepoResult<Vec<NodeSpec>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, specifier, created_at, updated_at
             FROM nodes
             WHERE parent_path IS ?1
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([parent.map(NodePath::as_str)])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }

    fn add_arc(&self, path: &NodePath, arc: &CompositionArc) -> LayerRepoResult<bool> {
        self.require_node(path)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO arcs (node_path, kind, target_layer, target_path, position)
             VALUES (
                ?1, ?2, ?3, ?4,
                (SELECT COALESCE(MAX(position) + 1, 0)
                 FROM arcs
                 WHERE node_path = ?1 AND kind = ?2)
             );",
            params![
                path.as_str(),
                arc.kind.as_str(),
                arc.target_layer.as_deref().unwrap_or_default(),
                arc.target_path.as_str(),
            ],
        )?;
        if inserted > 0 {
            touch_node(self.conn, path)?;
        }
        Ok(inserted > 0)
    }

    fn list_arcs(&self, path: &NodePath, kind: ArcKind) -> LayerRepoResult<Vec<CompositionArc>> {
        let mut stmt = self.conn.prepare(
            "SELECT target_layer, target_path
             FROM arcs
             WHERE node_path = ?1 AND kind = ?2
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query(params![path.as_str(), kind.as_str()])?;
        let mut arcs = Vec::new();
        while let Some(row) = rows.next()? {
            let target_layer: String = row.get(0)?;
            let target_text: String = row.get(1)?;
            let target_path = parse_path(&target_text, "arcs.target_path")?;
            arcs.push(CompositionArc {
                kind,
                target_layer: (!target_layer.is_empty()).then_some(target_layer),
                target_path,
            });
        }
        Ok(arcs)
    }

    fn set_metadata(
        &self,
        path: &NodePath,
        dictionary: &str,
        key: &str,
        value: &MetaValue,
    ) -> LayerRepoResult<()> {
        if !value.is_storable() {
            return Err(LayerRepoError::NonFiniteValue {
                key: key.to_string(),
            });
        }
        self.require_node(path)?;
        self.conn.execute(
            "INSERT INTO metadata (node_path, dictionary, key, value_type, value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(node_path, dictionary, key) DO UPDATE SET
                value_type = excluded.value_type,
                value = excluded.value;",
            params![path.as_str(), dictionary, key, value.type_tag(), to_sql_value(value)],
        )?;
        touch_node(self.conn, path)
    }

    fn metadata(&self, path: &NodePath, dictionary: &str) -> LayerRepoResult<PropertyMap> {
        load_metadata(self.conn, path, dictionary)
    }

    fn composed_metadata(
        &self,
        path: &NodePath,
        dictionary: &str,
    ) -> LayerRepoResult<PropertyMap> {
        let mut contributors = Vec::new();
        let mut visited = HashSet::new();
        collect_contributors(self, path, &mut visited, &mut contributors)?;

        let mut composed = PropertyMap::new();
        for contributor in contributors {
            for (key, value) in load_metadata(self.conn, &contributor, dictionary)? {
                composed.entry(key).or_insert(value);
            }
        }
        Ok(composed)
    }

    fn layer_info(&self, key: &str) -> LayerRepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM layer_info WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_layer_info(&self, key: &str, value: &str) -> LayerRepoResult<()> {
        self.conn.execute(
            "INSERT INTO layer_info (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![key, value],
        )?;
        Ok(())
    }

    fn add_sublayer(&self, identifier: &str) -> LayerRepoResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sublayers (position, identifier)
             VALUES ((SELECT COALESCE(MAX(position) + 1, 0) FROM sublayers), ?1);",
            [identifier],
        )?;
        Ok(inserted > 0)
    }

    fn sublayers(&self) -> LayerRepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT identifier FROM sublayers ORDER BY position ASC;")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut identifiers = Vec::new();
        for row in rows {
            identifiers.push(row?);
        }
        Ok(identifiers)
    }
}

/// Depth-first walk in strength order, recording each node once.
fn collect_contributors(
    repo: &SqliteLayerRepository<'_>,
    path: &NodePath,
    visited: &mut HashSet<NodePath>,
    contributors: &mut Vec<NodePath>,
) -> LayerRepoResult<()> {
    if !visited.insert(path.clone()) {
        return Ok(());
    }
    contributors.push(path.clone());
    for kind in ArcKind::ALL {
        for arc in repo.list_arcs(path, kind)? {
            if arc.is_internal() {
                collect_contributors(repo, &arc.target_path, visited, contributors)?;
            }
        }
    }
    Ok(())
}

fn load_node(conn: &Connection, path: &NodePath) -> LayerRepoResult<Option<NodeSpec>> {
    let mut stmt = conn.prepare(
        "SELECT path, specifier, created_at, updated_at
         FROM nodes
         WHERE path = ?1;",
    )?;
    let mut rows = stmt.query([path.as_str()])?;
    if let Some(row) = rows.next()? {
        return parse_node_row(row).map(Some);
    }
    Ok(None)
}

fn node_exists(conn: &Connection, path: &NodePath) -> LayerRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE path = ?1);",
        [path.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn touch_node(conn: &Connection, path: &NodePath) -> LayerRepoResult<()> {
    conn.execute(
        "UPDATE nodes
         SET updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
         WHERE path = ?1;",
        [path.as_str()],
    )?;
    Ok(())
}

fn load_metadata(
    conn: &Connection,
    path: &NodePath,
    dictionary: &str,
) -> LayerRepoResult<PropertyMap> {
    let mut stmt = conn.prepare(
        "SELECT key, value_type, value
         FROM metadata
         WHERE node_path = ?1 AND dictionary = ?2
         ORDER BY key ASC;",
    )?;
    let mut rows = stmt.query(params![path.as_str(), dictionary])?;
    let mut entries = PropertyMap::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let value_type: String = row.get(1)?;
        let raw: Value = row.get(2)?;
        entries.insert(key, from_sql_value(&value_type, raw)?);
    }
    Ok(entries)
}

fn parse_node_row(row: &Row<'_>) -> LayerRepoResult<NodeSpec> {
    let path_text: String = row.get("path")?;
    let path = parse_path(&path_text, "nodes.path")?;

    let specifier_text: String = row.get("specifier")?;
    let specifier = NodeSpecifier::parse(&specifier_text).ok_or_else(|| {
        LayerRepoError::InvalidData(format!(
            "invalid node specifier `{specifier_text}` in nodes.specifier"
        ))
    })?;

    Ok(NodeSpec {
        path,
        specifier,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_path(value: &str, column: &'static str) -> LayerRepoResult<NodePath> {
    NodePath::parse(value)
        .ok_or_else(|| LayerRepoError::InvalidData(format!("invalid node path `{value}` in {column}")))
}

fn to_sql_value(value: &MetaValue) -> Value {
    match value {
        MetaValue::Bool(flag) => Value::Integer(i64::from(*flag)),
        MetaValue::Int(number) => Value::Integer(*number),
        MetaValue::Float(number) => Value::Real(*number),
        MetaValue::Text(text) => Value::Text(text.clone()),
    }
}

fn from_sql_value(value_type: &str, raw: Value) -> LayerRepoResult<MetaValue> {
    match (value_type, raw) {
        ("bool", Value::Integer(flag)) => Ok(MetaValue::Bool(flag != 0)),
        ("int", Value::Integer(number)) => Ok(MetaValue::Int(number)),
        ("float", Value::Real(number)) => Ok(MetaValue::Float(number)),
        ("float", Value::Integer(number)) => Ok(MetaValue::Float(number as f64)),
        ("text", Value::Text(text)) => Ok(MetaValue::Text(text)),
        (value_type, raw) => Err(LayerRepoError::InvalidData(format!(
            "metadata value {raw:?} does not match type `{value_type}`"
        ))),
    }
}

fn ensure_layer_connection_ready(conn: &Connection) -> LayerRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(LayerRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(LayerRepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> LayerRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
