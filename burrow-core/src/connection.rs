// burrow-core/src/connection.rs
//! Connection and collection lifecycle.
//!
//! A `Connection` owns a registry of collections, each backed by its own
//! datastore file (or a purely in-memory store when no database path is
//! configured). Registering a collection wires up its indexes from the
//! attribute definition and recovers the insertion-order counter from any
//! persisted documents.

use dashmap::DashMap;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{BurrowError, Result};
use crate::schema::Definition;
use crate::store::{DataStore, DocumentStore, IndexSpec};
use crate::value_utils::{PUBLIC_KEY, SEQ_FIELD};
use crate::{log_debug, log_warn};

/// Where a connection keeps its data.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Directory holding one `<collection>.db` file per collection.
    /// `None` keeps every collection in memory.
    pub db_path: Option<PathBuf>,
}

impl ConnectionConfig {
    pub fn in_memory() -> Self {
        ConnectionConfig { db_path: None }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        ConnectionConfig {
            db_path: Some(path.into()),
        }
    }
}

/// A registered collection: its store, schema, and insertion-order counter.
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    definition: Option<Definition>,
    seq: AtomicU64,
}

impl Collection {
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn definition(&self) -> Option<&Definition> {
        self.definition.as_ref()
    }

    /// The next value of the monotonic `_seq` field.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// One database connection holding an owned collection registry.
pub struct Connection {
    config: ConnectionConfig,
    collections: DashMap<String, Arc<Collection>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        if let Some(path) = &config.db_path {
            std::fs::create_dir_all(path)?;
        }
        Ok(Connection {
            config,
            collections: DashMap::new(),
        })
    }

    /// Register a collection, creating or reopening its backing store.
    pub fn register_collection(
        &self,
        name: &str,
        definition: Option<Definition>,
    ) -> Result<()> {
        let store: Arc<dyn DocumentStore> = match &self.config.db_path {
            Some(dir) => Arc::new(DataStore::open(&dir.join(format!("{}.db", name)))?),
            None => Arc::new(DataStore::in_memory()),
        };
        self.register_collection_with_store(name, definition, store)
    }

    /// Register a collection over an externally constructed store.
    ///
    /// This is the seam tests use to interpose on store calls; production
    /// code goes through [`register_collection`](Self::register_collection).
    pub fn register_collection_with_store(
        &self,
        name: &str,
        definition: Option<Definition>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<()> {
        let mut definition = definition.map(|def| sanitize_definition(name, def));

        if let Some(def) = &mut definition {
            for (attr, spec) in def.iter_mut() {
                // The public identifier is an alias for the internal key,
                // which the store already keys documents by.
                if attr == PUBLIC_KEY {
                    continue;
                }
                if spec.unique {
                    store.ensure_index(IndexSpec::sparse_unique(attr))?;
                } else if spec.index {
                    store.ensure_index(IndexSpec::plain(attr))?;
                } else {
                    continue;
                }
                spec.indexed = true;
            }
        }
        // Insertion order is tracked on every document, so the index cannot
        // be sparse.
        store.ensure_index(IndexSpec::unique(SEQ_FIELD))?;

        let seq = recover_seq(store.as_ref())?;
        log_debug!("registered collection '{}' (seq={})", name, seq);

        self.collections.insert(
            name.to_string(),
            Arc::new(Collection {
                store,
                definition,
                seq: AtomicU64::new(seq),
            }),
        );
        Ok(())
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BurrowError::CollectionNotFound(name.to_string()))
    }

    /// Unregister a collection and delete its backing file. Dropping an
    /// unknown collection is a no-op.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        if let Some((_, collection)) = self.collections.remove(name) {
            collection.store.remove_backing_file()?;
        }
        Ok(())
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|e| e.key().clone()).collect()
    }
}

/// Clear the `autoIncrement` flag, which the storage engine does not
/// support; the definition is otherwise cached as handed over. The
/// identifier gets monotonic behaviour from the ordering counter, so only
/// other attributes draw a warning.
fn sanitize_definition(name: &str, mut def: Definition) -> Definition {
    for (attr, spec) in def.iter_mut() {
        if spec.auto_increment {
            if attr != PUBLIC_KEY {
                log_warn!(
                    "collection '{}': attribute '{}' requests autoIncrement, which is not supported; ignoring",
                    name,
                    attr
                );
            }
            spec.auto_increment = false;
        }
    }
    def
}

fn recover_seq(store: &dyn DocumentStore) -> Result<u64> {
    let docs = store.find(&json!({}))?;
    Ok(docs
        .iter()
        .filter_map(|d| d.get(SEQ_FIELD).and_then(Value::as_u64))
        .max()
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definition_from_value;
    use tempfile::TempDir;

    #[test]
    fn test_register_and_fetch_collection() {
        let conn = Connection::new(ConnectionConfig::in_memory()).unwrap();
        conn.register_collection("users", None).unwrap();
        assert!(conn.collection("users").is_ok());
        assert!(matches!(
            conn.collection("ghosts"),
            Err(BurrowError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn test_seq_counter_is_monotonic() {
        let conn = Connection::new(ConnectionConfig::in_memory()).unwrap();
        conn.register_collection("t", None).unwrap();
        let col = conn.collection("t").unwrap();
        assert_eq!(col.next_seq(), 1);
        assert_eq!(col.next_seq(), 2);
    }

    #[test]
    fn test_seq_counter_recovers_from_persisted_docs() {
        let dir = TempDir::new().unwrap();
        let config = ConnectionConfig::at_path(dir.path());

        {
            let conn = Connection::new(config.clone()).unwrap();
            conn.register_collection("t", None).unwrap();
            let col = conn.collection("t").unwrap();
            for _ in 0..3 {
                let seq = col.next_seq();
                col.store().insert(json!({"_seq": seq})).unwrap();
            }
        }

        let conn = Connection::new(config).unwrap();
        conn.register_collection("t", None).unwrap();
        let col = conn.collection("t").unwrap();
        assert_eq!(col.next_seq(), 4);
    }

    #[test]
    fn test_definition_keeps_id_but_never_indexes_it() {
        let def = definition_from_value(&json!({
            "id": {"type": "string", "unique": true, "autoIncrement": true},
            "counter": {"type": "integer", "autoIncrement": true},
            "email": {"type": "string", "unique": true}
        }))
        .unwrap();

        let conn = Connection::new(ConnectionConfig::in_memory()).unwrap();
        conn.register_collection("t", Some(def)).unwrap();
        let col = conn.collection("t").unwrap();
        let stored = col.definition().unwrap();

        // The full definition stays reportable; `id` is only exempt from
        // index provisioning.
        assert!(stored.contains_key("id"));
        assert!(stored["id"].unique);
        assert!(!stored["id"].indexed);
        assert!(!stored["id"].auto_increment);
        assert!(!stored["counter"].auto_increment);
        assert!(stored["email"].unique);
        assert!(stored["email"].indexed);

        // No store-level unique constraint exists for the alias.
        col.store().insert(json!({"id": "same", "email": "a@x"})).unwrap();
        col.store().insert(json!({"id": "same", "email": "b@x"})).unwrap();
    }

    #[test]
    fn test_unique_attribute_is_enforced() {
        let def = definition_from_value(&json!({
            "email": {"type": "string", "unique": true}
        }))
        .unwrap();
        let conn = Connection::new(ConnectionConfig::in_memory()).unwrap();
        conn.register_collection("t", Some(def)).unwrap();
        let col = conn.collection("t").unwrap();
        col.store().insert(json!({"email": "a@x"})).unwrap();
        assert!(col.store().insert(json!({"email": "a@x"})).is_err());
    }

    #[test]
    fn test_drop_collection_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::new(ConnectionConfig::at_path(dir.path())).unwrap();
        conn.register_collection("t", None).unwrap();
        conn.collection("t")
            .unwrap()
            .store()
            .insert(json!({"x": 1}))
            .unwrap();
        assert!(dir.path().join("t.db").exists());

        conn.drop_collection("t").unwrap();
        assert!(!dir.path().join("t.db").exists());
        assert!(conn.collection("t").is_err());
        conn.drop_collection("t").unwrap();
        conn.drop_collection("never-registered").unwrap();
    }
}
