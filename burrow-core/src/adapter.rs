// burrow-core/src/adapter.rs
//! The outward-facing CRUD surface.
//!
//! An `Adapter` multiplexes named connections and exposes the operations a
//! caller drives with [`Criteria`]: select, insert, update, destroy, count,
//! plus connection and collection lifecycle.
//!
//! Updates and destroys are two-phase: snapshot the matching documents, run
//! the mutation with the same filter, then verify the mutation touched
//! exactly the snapshot's cardinality. A concurrent writer slipping between
//! the phases is detected and reported as `ConsistencyMismatch`, never
//! silently absorbed. Nothing is rolled back.

use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionConfig};
use crate::criteria::{translate, Criteria};
use crate::error::{BurrowError, Result};
use crate::log_info;
use crate::schema::Definition;
use crate::store;
use crate::value_utils::{rewrite_id, rewrite_ids, strip_ids, INTERNAL_KEY, SEQ_FIELD};

#[derive(Default)]
pub struct Adapter {
    connections: DashMap<String, Arc<Connection>>,
}

impl Adapter {
    pub fn new() -> Self {
        Adapter::default()
    }

    // ===== CONNECTION LIFECYCLE =====

    /// Register a connection under `identity` and set up its collections.
    pub fn register_connection(
        &self,
        identity: Option<&str>,
        config: ConnectionConfig,
        collections: HashMap<String, Option<Definition>>,
    ) -> Result<()> {
        let identity = match identity {
            Some(id) if !id.is_empty() => id,
            _ => return Err(BurrowError::IdentityMissing),
        };
        if self.connections.contains_key(identity) {
            return Err(BurrowError::IdentityDuplicate(identity.to_string()));
        }

        let connection = Connection::new(config)?;
        for (name, definition) in collections {
            connection.register_collection(&name, definition)?;
        }
        self.connections
            .insert(identity.to_string(), Arc::new(connection));
        log_info!("registered connection '{}'", identity);
        Ok(())
    }

    /// Tear down one connection, or every connection when `identity` is
    /// `None`. Backing files are left on disk.
    pub fn teardown(&self, identity: Option<&str>) -> Result<()> {
        match identity {
            Some(id) => {
                self.connections.remove(id);
            }
            None => self.connections.clear(),
        }
        Ok(())
    }

    pub fn connection(&self, identity: &str) -> Result<Arc<Connection>> {
        self.connections
            .get(identity)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BurrowError::ConnectionNotFound(identity.to_string()))
    }

    // ===== COLLECTION LIFECYCLE =====

    /// Register an additional collection on an existing connection.
    pub fn define(
        &self,
        identity: &str,
        collection: &str,
        definition: Option<Definition>,
    ) -> Result<()> {
        self.connection(identity)?
            .register_collection(collection, definition)
    }

    /// Report the cached schema for a collection. Unknown collections and
    /// schemaless collections both come back empty rather than erroring.
    pub fn describe(&self, identity: &str, collection: &str) -> Result<Option<Value>> {
        let col = match self.connection(identity)?.collection(collection) {
            Ok(col) => col,
            Err(_) => return Ok(None),
        };
        match col.definition() {
            Some(def) => Ok(Some(serde_json::to_value(def)?)),
            None => Ok(None),
        }
    }

    pub fn drop_collection(&self, identity: &str, collection: &str) -> Result<()> {
        self.connection(identity)?.drop_collection(collection)
    }

    // ===== CRUD =====

    /// Find documents (or group folds) matching `criteria`.
    pub fn select(
        &self,
        identity: &str,
        collection: &str,
        criteria: &Criteria,
    ) -> Result<Vec<Value>> {
        let col = self.connection(identity)?.collection(collection)?;
        let mut query = translate(criteria, col.definition())?;
        if query.sort.is_empty() {
            // Unsorted reads come back in insertion order.
            query.sort = vec![(SEQ_FIELD.to_string(), 1)];
        }

        let docs = store::execute(col.store(), &query)?;
        if query.group.is_some() {
            // Group folds are synthetic documents with no identifiers.
            Ok(docs)
        } else {
            Ok(rewrite_ids(docs))
        }
    }

    /// Insert one document, returning it with its public `id`.
    pub fn insert(&self, identity: &str, collection: &str, mut values: Value) -> Result<Value> {
        let col = self.connection(identity)?.collection(collection)?;
        strip_ids(&mut values);
        if let Some(obj) = values.as_object_mut() {
            obj.insert(SEQ_FIELD.to_string(), json!(col.next_seq()));
        }
        let stored = col.store().insert(values)?;
        Ok(rewrite_id(stored))
    }

    /// Insert a batch in one all-or-nothing store call, preserving argument
    /// order in the result. A rejected batch stores none of its elements.
    pub fn insert_many(
        &self,
        identity: &str,
        collection: &str,
        values: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let col = self.connection(identity)?.collection(collection)?;
        let batch: Vec<Value> = values
            .into_iter()
            .map(|mut v| {
                strip_ids(&mut v);
                if let Some(obj) = v.as_object_mut() {
                    obj.insert(SEQ_FIELD.to_string(), json!(col.next_seq()));
                }
                v
            })
            .collect();
        let stored = col.store().insert_many(batch)?;
        Ok(rewrite_ids(stored))
    }

    /// Update every document matching `criteria` with the given values.
    ///
    /// Matching nothing is an error; a cardinality change between the
    /// snapshot and the mutation is a `ConsistencyMismatch`.
    pub fn update(
        &self,
        identity: &str,
        collection: &str,
        criteria: &Criteria,
        mut values: Value,
    ) -> Result<Vec<Value>> {
        let col = self.connection(identity)?.collection(collection)?;
        let query = translate(criteria, col.definition())?;

        let snapshot = col.store().find(&query.filter)?;
        if snapshot.is_empty() {
            return Err(BurrowError::NotFound);
        }
        let ids = snapshot_ids(&snapshot);

        strip_ids(&mut values);
        if let Some(obj) = values.as_object_mut() {
            obj.remove(SEQ_FIELD);
        }

        let modified = col
            .store()
            .update(&query.filter, &json!({ "$set": values }))?;
        verify_cardinality(snapshot.len(), modified)?;

        let mut updated = col
            .store()
            .find(&json!({ INTERNAL_KEY: { "$in": ids } }))?;
        store::apply_sort(&mut updated, &[(SEQ_FIELD.to_string(), 1)]);
        Ok(rewrite_ids(updated))
    }

    /// Delete every document matching `criteria`, returning the deleted
    /// documents as they were at snapshot time.
    pub fn destroy(
        &self,
        identity: &str,
        collection: &str,
        criteria: &Criteria,
    ) -> Result<Vec<Value>> {
        let col = self.connection(identity)?.collection(collection)?;
        let query = translate(criteria, col.definition())?;

        let mut snapshot = col.store().find(&query.filter)?;
        let removed = col.store().remove(&query.filter)?;
        verify_cardinality(snapshot.len(), removed)?;

        store::apply_sort(&mut snapshot, &[(SEQ_FIELD.to_string(), 1)]);
        Ok(rewrite_ids(snapshot))
    }

    pub fn count(&self, identity: &str, collection: &str, criteria: &Criteria) -> Result<usize> {
        let col = self.connection(identity)?.collection(collection)?;
        let query = translate(criteria, col.definition())?;
        col.store().count(&query.filter)
    }
}

fn snapshot_ids(docs: &[Value]) -> Vec<Value> {
    docs.iter()
        .filter_map(|d| d.get(INTERNAL_KEY).cloned())
        .collect()
}

fn verify_cardinality(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(BurrowError::ConsistencyMismatch { expected, actual });
    }
    Ok(())
}
