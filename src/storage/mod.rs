//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - object_types(id, name, labels, is_custom)
//! - objects(id, object_type_id, archived, archived_at, merged_into_id)
//! - property_values(object_id, property_name, value, updated_at) + property_value_history
//! - association_types(id, from/to type, category, label) + associations(from, to, type)
//! - property_definitions, property_groups, pipelines, pipeline_stages, owners, lists
//!
//! One connection, one writer: `Store` keeps the connection behind a mutex and
//! every operation runs while holding a `Session`.

pub mod schema;
pub mod seed;
pub mod types;
pub mod values;
pub mod objects;
pub mod associations;
pub mod search;
pub mod properties;
pub mod pipelines;
pub mod owners;
pub mod lists;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;
use serde::Serialize;

use crate::Result;

pub use associations::AssociationStore;
pub use lists::ListStore;
pub use objects::{ListOptions, ObjectStore};
pub use owners::OwnerStore;
pub use pipelines::PipelineStore;
pub use properties::PropertyStore;
pub use search::{Filter, FilterGroup, Operator, SearchRequest, SearchStore, Sort};
pub use types::SchemaStore;

/// SQLite-backed store for every CRM entity.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open a database file (creates if doesn't exist) and seed built-in data
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open a database file, optionally skipping the built-in seed data
    pub fn open_with(path: &Path, seed: bool) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.initialize(seed)?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(true)
    }

    pub fn open_in_memory_with(seed: bool) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.initialize(seed)?;
        Ok(store)
    }

    /// Path of the backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Initialize the database schema
    fn initialize(&self, seed: bool) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        if seed && seed::is_empty(&conn)? {
            seed::seed_builtin(&conn)?;
        }
        Ok(())
    }

    /// Lock the connection for a sequence of operations.
    ///
    /// Holding the session serializes access: no other caller can touch the
    /// database until it is dropped.
    pub fn session(&self) -> Session<'_> {
        Session { conn: self.lock() }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delete all data and re-seed built-in types, association types and pipelines
    pub fn reset(&self) -> Result<()> {
        let conn = self.lock();
        for table in schema::ALL_TABLES {
            conn.execute(&format!("DELETE FROM {}", table), [])?;
        }
        conn.execute("DELETE FROM sqlite_sequence", [])?;
        seed::seed_builtin(&conn)?;
        tracing::info!("store reset to seed data");
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.lock();
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(DbStats {
            object_types: count("SELECT COUNT(*) FROM object_types")?,
            objects: count("SELECT COUNT(*) FROM objects WHERE archived = 0")?,
            archived_objects: count("SELECT COUNT(*) FROM objects WHERE archived = 1")?,
            property_values: count("SELECT COUNT(*) FROM property_values")?,
            history_rows: count("SELECT COUNT(*) FROM property_value_history")?,
            association_types: count("SELECT COUNT(*) FROM association_types")?,
            associations: count("SELECT COUNT(*) FROM associations")?,
            lists: count("SELECT COUNT(*) FROM lists")?,
            pipelines: count("SELECT COUNT(*) FROM pipelines WHERE archived = 0")?,
            owners: count("SELECT COUNT(*) FROM owners WHERE archived = 0")?,
        })
    }
}

/// Exclusive access to the store for the lifetime of the value.
pub struct Session<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl Session<'_> {
    pub fn objects(&self) -> ObjectStore<'_> {
        ObjectStore::new(&self.conn)
    }

    pub fn associations(&self) -> AssociationStore<'_> {
        AssociationStore::new(&self.conn)
    }

    pub fn search(&self) -> SearchStore<'_> {
        SearchStore::new(&self.conn)
    }

    pub fn schemas(&self) -> SchemaStore<'_> {
        SchemaStore::new(&self.conn)
    }

    pub fn properties(&self) -> PropertyStore<'_> {
        PropertyStore::new(&self.conn)
    }

    pub fn pipelines(&self) -> PipelineStore<'_> {
        PipelineStore::new(&self.conn)
    }

    pub fn owners(&self) -> OwnerStore<'_> {
        OwnerStore::new(&self.conn)
    }

    pub fn lists(&self) -> ListStore<'_> {
        ListStore::new(&self.conn)
    }

    /// Resolve a type name or id to the canonical type id
    pub fn resolve_type(&self, type_ref: &str) -> Result<String> {
        types::resolve(&self.conn, type_ref)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub object_types: usize,
    pub objects: usize,
    pub archived_objects: usize,
    pub property_values: usize,
    pub history_rows: usize,
    pub association_types: usize,
    pub associations: usize,
    pub lists: usize,
    pub pipelines: usize,
    pub owners: usize,
}

impl DbStats {
    /// Label/value rows for display
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Object types", self.object_types.to_string()),
            ("Objects", self.objects.to_string()),
            ("Archived objects", self.archived_objects.to_string()),
            ("Property values", self.property_values.to_string()),
            ("History rows", self.history_rows.to_string()),
            ("Association types", self.association_types.to_string()),
            ("Associations", self.associations.to_string()),
            ("Lists", self.lists.to_string()),
            ("Pipelines", self.pipelines.to_string()),
            ("Owners", self.owners.to_string()),
        ]
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (label, value) in self.rows() {
            writeln!(f, "  {}: {}", label, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Properties;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_open_seeds_builtin_types() {
        let store = Store::open_in_memory().unwrap();
        let stats = store.stats().unwrap();
        assert!(stats.object_types >= 4);
        assert!(stats.association_types > 0);
        assert_eq!(stats.objects, 0);
    }

    #[test]
    fn test_open_without_seed() {
        let store = Store::open_in_memory_with(false).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.object_types, 0);
        assert!(store.session().resolve_type("contacts").unwrap_err().is_not_found());
    }

    #[test]
    fn test_file_store_persists_and_does_not_reseed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubsim.db");

        {
            let store = Store::open(&path).unwrap();
            let session = store.session();
            session.objects().create("contacts", props(&[("email", "a@example.com")])).unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let stats = store.stats().unwrap();
        assert_eq!(stats.objects, 1);

        let fresh = Store::open_in_memory().unwrap();
        assert_eq!(stats.association_types, fresh.stats().unwrap().association_types);
    }

    #[test]
    fn test_reset_wipes_objects_and_restarts_ids() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .session()
            .objects()
            .create("contacts", props(&[("firstname", "A")]))
            .unwrap();
        store.reset().unwrap();

        assert_eq!(store.stats().unwrap().objects, 0);
        let again = store
            .session()
            .objects()
            .create("contacts", props(&[("firstname", "B")]))
            .unwrap();
        assert_eq!(first.id, again.id);
    }
}
