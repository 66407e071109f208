// burrow-core/src/store/datastore.rs
//! Append-only JSONL datastore.
//!
//! The live dataset is held in memory; every mutation appends a line to the
//! backing file (full documents for inserts and updates, `{"$deleted": true}`
//! markers for removals). Loading replays the log with last-write-wins
//! semantics, so the file never needs rewriting during normal operation.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{BurrowError, Result};
use crate::log_warn;
use crate::store::matcher;
use crate::store::{DocumentStore, IndexSpec};
use crate::value_utils::INTERNAL_KEY;

const DELETED_MARKER: &str = "$deleted";

struct Inner {
    docs: HashMap<String, Value>,
    indexes: Vec<IndexSpec>,
    // field -> canonical value -> _id, for unique indexes only
    unique_maps: HashMap<String, HashMap<String, String>>,
}

/// A single collection's storage engine.
pub struct DataStore {
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl DataStore {
    /// A purely in-memory store with no backing file.
    pub fn in_memory() -> Self {
        DataStore {
            path: None,
            inner: Mutex::new(Inner {
                docs: HashMap::new(),
                indexes: Vec::new(),
                unique_maps: HashMap::new(),
            }),
        }
    }

    /// Open a file-backed store, replaying any existing log.
    pub fn open(path: &Path) -> Result<Self> {
        let store = DataStore {
            path: Some(path.to_path_buf()),
            inner: Mutex::new(Inner {
                docs: HashMap::new(),
                indexes: Vec::new(),
                unique_maps: HashMap::new(),
            }),
        };
        store.replay()?;
        Ok(store)
    }

    fn replay(&self) -> Result<()> {
        let path = match &self.path {
            Some(p) if p.exists() => p.clone(),
            _ => return Ok(()),
        };

        let mut inner = self.inner.lock();
        let reader = BufReader::new(File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    // A torn final write is survivable; keep what parsed.
                    log_warn!("skipping corrupt datastore line in {:?}: {}", path, e);
                    continue;
                }
            };
            let id = match entry.get(INTERNAL_KEY).and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    log_warn!("skipping datastore line without _id in {:?}", path);
                    continue;
                }
            };
            if entry.get(DELETED_MARKER).and_then(Value::as_bool) == Some(true) {
                inner.docs.remove(&id);
            } else {
                inner.docs.insert(id, entry);
            }
        }
        Ok(())
    }

    fn append_lines(&self, entries: &[Value]) -> Result<()> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for entry in entries {
            serde_json::to_writer(&mut file, entry)?;
            file.write_all(b"\n")?;
        }
        file.sync_data()?;
        Ok(())
    }
}

// Unique-index bookkeeping. Values are keyed by a canonical string so that
// numerically equal values collide regardless of representation.
fn canonical_key(v: &Value) -> String {
    match v {
        Value::Number(n) => n
            .as_f64()
            .map(|f| format!("n:{}", f))
            .unwrap_or_else(|| format!("n:{}", n)),
        other => other.to_string(),
    }
}

static NULL: Value = Value::Null;

fn indexed_value<'a>(doc: &'a Value, spec: &IndexSpec) -> Option<&'a Value> {
    match doc.get(spec.field.as_str()) {
        None if spec.sparse => None,
        None => Some(&NULL),
        Some(v) => Some(v),
    }
}

impl Inner {
    fn check_unique(&self, doc: &Value, own_id: &str) -> Result<()> {
        for spec in self.indexes.iter().filter(|s| s.unique) {
            let value = match indexed_value(doc, spec) {
                Some(v) => v,
                None => continue,
            };
            if let Some(holder) = self
                .unique_maps
                .get(&spec.field)
                .and_then(|m| m.get(&canonical_key(value)))
            {
                if holder != own_id {
                    return Err(BurrowError::UniqueViolation {
                        field: spec.field.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn index_doc(&mut self, doc: &Value, id: &str) {
        for spec in self.indexes.iter().filter(|s| s.unique) {
            if let Some(value) = indexed_value(doc, spec) {
                self.unique_maps
                    .entry(spec.field.clone())
                    .or_default()
                    .insert(canonical_key(value), id.to_string());
            }
        }
    }

    fn unindex_doc(&mut self, doc: &Value) {
        for spec in self.indexes.iter().filter(|s| s.unique) {
            if let Some(value) = indexed_value(doc, spec) {
                if let Some(map) = self.unique_maps.get_mut(&spec.field) {
                    map.remove(&canonical_key(value));
                }
            }
        }
    }
}

impl DocumentStore for DataStore {
    fn insert(&self, mut doc: Value) -> Result<Value> {
        let obj = doc.as_object_mut().ok_or_else(|| {
            BurrowError::InvalidQuery("documents must be objects".to_string())
        })?;
        let id = match obj.get(INTERNAL_KEY).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                obj.insert(INTERNAL_KEY.to_string(), json!(id));
                id
            }
        };

        let mut inner = self.inner.lock();
        if inner.docs.contains_key(&id) {
            return Err(BurrowError::UniqueViolation {
                field: INTERNAL_KEY.to_string(),
                value: id,
            });
        }
        inner.check_unique(&doc, &id)?;
        inner.index_doc(&doc, &id);
        inner.docs.insert(id, doc.clone());
        drop(inner);

        self.append_lines(std::slice::from_ref(&doc))?;
        Ok(doc)
    }

    fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut prepared: Vec<(String, Value)> = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let obj = doc.as_object_mut().ok_or_else(|| {
                BurrowError::InvalidQuery("documents must be objects".to_string())
            })?;
            let id = match obj.get(INTERNAL_KEY).and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    obj.insert(INTERNAL_KEY.to_string(), json!(id));
                    id
                }
            };
            prepared.push((id, doc));
        }

        let mut inner = self.inner.lock();

        // All-or-nothing: every document is checked against the store and
        // the rest of the batch before anything is committed.
        let mut batch_ids = HashSet::new();
        for (id, _) in &prepared {
            if inner.docs.contains_key(id) || !batch_ids.insert(id.clone()) {
                return Err(BurrowError::UniqueViolation {
                    field: INTERNAL_KEY.to_string(),
                    value: id.clone(),
                });
            }
        }
        for spec in inner.indexes.iter().filter(|s| s.unique) {
            let mut batch_keys = HashSet::new();
            for (_, doc) in &prepared {
                if let Some(value) = indexed_value(doc, spec) {
                    let key = canonical_key(value);
                    let taken = inner
                        .unique_maps
                        .get(&spec.field)
                        .map_or(false, |m| m.contains_key(&key));
                    if taken || !batch_keys.insert(key) {
                        return Err(BurrowError::UniqueViolation {
                            field: spec.field.clone(),
                            value: value.to_string(),
                        });
                    }
                }
            }
        }

        for (id, doc) in &prepared {
            inner.index_doc(doc, id);
            inner.docs.insert(id.clone(), doc.clone());
        }
        drop(inner);

        let stored: Vec<Value> = prepared.into_iter().map(|(_, doc)| doc).collect();
        self.append_lines(&stored)?;
        Ok(stored)
    }

    fn find(&self, filter: &Value) -> Result<Vec<Value>> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for doc in inner.docs.values() {
            if matcher::matches(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }

    fn update(&self, filter: &Value, update: &Value) -> Result<usize> {
        let set = update
            .get("$set")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                BurrowError::InvalidQuery("update requires a {\"$set\": {...}} modifier".to_string())
            })?;
        if set.contains_key(INTERNAL_KEY) {
            return Err(BurrowError::InvalidQuery(
                "cannot modify _id".to_string(),
            ));
        }

        let mut inner = self.inner.lock();
        let matched: Vec<String> = inner
            .docs
            .iter()
            .filter_map(|(id, doc)| match matcher::matches(doc, filter) {
                Ok(true) => Some(Ok(id.clone())),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<_>>()?;

        let mut pending: Vec<(String, Value)> = Vec::with_capacity(matched.len());
        for id in &matched {
            let mut updated = inner.docs[id].clone();
            if let Some(obj) = updated.as_object_mut() {
                for (k, v) in set {
                    obj.insert(k.clone(), v.clone());
                }
            }
            pending.push((id.clone(), updated));
        }

        // Validate the whole post-update state against every unique index
        // before touching a single document, so a violation mid-batch cannot
        // leave the live set and the journal disagreeing.
        for spec in inner.indexes.iter().filter(|s| s.unique) {
            let mut map = inner
                .unique_maps
                .get(&spec.field)
                .cloned()
                .unwrap_or_default();
            for (id, _) in &pending {
                if let Some(value) = indexed_value(&inner.docs[id], spec) {
                    map.remove(&canonical_key(value));
                }
            }
            for (id, doc) in &pending {
                if let Some(value) = indexed_value(doc, spec) {
                    if map.insert(canonical_key(value), id.clone()).is_some() {
                        return Err(BurrowError::UniqueViolation {
                            field: spec.field.clone(),
                            value: value.to_string(),
                        });
                    }
                }
            }
        }

        let mut written = Vec::with_capacity(pending.len());
        for (id, updated) in pending {
            if let Some(previous) = inner.docs.insert(id.clone(), updated.clone()) {
                inner.unindex_doc(&previous);
            }
            inner.index_doc(&updated, &id);
            written.push(updated);
        }
        drop(inner);

        self.append_lines(&written)?;
        Ok(written.len())
    }

    fn remove(&self, filter: &Value) -> Result<usize> {
        let mut inner = self.inner.lock();
        let matched: Vec<String> = inner
            .docs
            .iter()
            .filter_map(|(id, doc)| match matcher::matches(doc, filter) {
                Ok(true) => Some(Ok(id.clone())),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<_>>()?;

        let mut markers = Vec::with_capacity(matched.len());
        for id in &matched {
            if let Some(doc) = inner.docs.remove(id) {
                inner.unindex_doc(&doc);
                let mut marker = Map::new();
                marker.insert(INTERNAL_KEY.to_string(), json!(id));
                marker.insert(DELETED_MARKER.to_string(), json!(true));
                markers.push(Value::Object(marker));
            }
        }
        drop(inner);

        self.append_lines(&markers)?;
        Ok(markers.len())
    }

    fn count(&self, filter: &Value) -> Result<usize> {
        let inner = self.inner.lock();
        let mut n = 0;
        for doc in inner.docs.values() {
            if matcher::matches(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    fn ensure_index(&self, spec: IndexSpec) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.indexes.iter().any(|s| s.field == spec.field) {
            return Ok(());
        }

        if spec.unique {
            // Validate the existing dataset before accepting the index.
            let mut seen: HashMap<String, String> = HashMap::new();
            for (id, doc) in &inner.docs {
                let value = match indexed_value(doc, &spec) {
                    Some(v) => v,
                    None => continue,
                };
                if let Some(_holder) = seen.insert(canonical_key(value), id.clone()) {
                    return Err(BurrowError::UniqueViolation {
                        field: spec.field.clone(),
                        value: value.to_string(),
                    });
                }
            }
            inner.unique_maps.insert(spec.field.clone(), seen);
        }
        inner.indexes.push(spec);
        Ok(())
    }

    fn remove_backing_file(&self) -> Result<()> {
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.inner.lock().docs.clear();
        self.inner.lock().unique_maps.clear();
        Ok(())
    }
}
