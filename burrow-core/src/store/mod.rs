// burrow-core/src/store/mod.rs
//! Embedded document store abstraction.
//!
//! `DocumentStore` is the seam between the query layer and the storage
//! engine. Production code uses [`DataStore`]; tests can wrap a store to
//! observe or perturb individual calls.

pub mod datastore;
pub mod matcher;

pub use datastore::DataStore;
pub use matcher::matches;

use serde_json::Value;
use std::cmp::Ordering;

use crate::criteria::NativeQuery;
use crate::error::Result;

/// A secondary index declaration.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
    /// Sparse indexes ignore documents missing the field entirely.
    pub sparse: bool,
}

impl IndexSpec {
    pub fn unique(field: &str) -> Self {
        IndexSpec {
            field: field.to_string(),
            unique: true,
            sparse: false,
        }
    }

    pub fn sparse_unique(field: &str) -> Self {
        IndexSpec {
            field: field.to_string(),
            unique: true,
            sparse: true,
        }
    }

    pub fn plain(field: &str) -> Self {
        IndexSpec {
            field: field.to_string(),
            unique: false,
            sparse: true,
        }
    }
}

/// The operations a backing store must provide.
pub trait DocumentStore: Send + Sync {
    /// Insert a document, returning it with its assigned `_id`.
    fn insert(&self, doc: Value) -> Result<Value>;

    /// Insert a batch atomically: every document is validated against the
    /// unique indexes (and against the rest of the batch) before any is
    /// committed, so a rejected batch stores nothing. Results preserve
    /// argument order.
    fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<Value>>;

    /// All documents matching `filter`, in unspecified order.
    fn find(&self, filter: &Value) -> Result<Vec<Value>>;

    /// Apply a `{"$set": {...}}` modifier to every match; returns the number
    /// of documents modified.
    fn update(&self, filter: &Value, update: &Value) -> Result<usize>;

    /// Delete every match; returns the number of documents removed.
    fn remove(&self, filter: &Value) -> Result<usize>;

    fn count(&self, filter: &Value) -> Result<usize>;

    fn ensure_index(&self, spec: IndexSpec) -> Result<()>;

    /// Delete the store's on-disk file, if any. Idempotent.
    fn remove_backing_file(&self) -> Result<()>;
}

/// Run a translated query against a store: filter, sort, paginate, and
/// optionally fold into groups.
pub fn execute(store: &dyn DocumentStore, query: &NativeQuery) -> Result<Vec<Value>> {
    let mut docs = store.find(&query.filter)?;

    if !query.sort.is_empty() {
        apply_sort(&mut docs, &query.sort);
    }
    if let Some(skip) = query.skip {
        docs = docs.into_iter().skip(skip).collect();
    }
    if let Some(limit) = query.limit {
        docs.truncate(limit);
    }

    if let Some(group) = &query.group {
        return Ok(group.apply(&docs));
    }
    Ok(docs)
}

/// Stable multi-key sort. Missing fields sort before present ones and values
/// of different types order by type rank, so mixed collections still sort
/// deterministically.
pub fn apply_sort(docs: &mut [Value], sort: &[(String, i32)]) {
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let ord = sort_compare(a.get(field.as_str()), b.get(field.as_str()));
            let ord = if *direction < 0 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn sort_compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let rank = type_rank(a).cmp(&type_rank(b));
            if rank != Ordering::Equal {
                return rank;
            }
            crate::value_utils::compare_values(a, b).unwrap_or(Ordering::Equal)
        }
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_ascending_and_descending() {
        let mut docs = vec![json!({"n": 3}), json!({"n": 1}), json!({"n": 2})];
        apply_sort(&mut docs, &[("n".to_string(), 1)]);
        assert_eq!(docs[0]["n"], json!(1));
        apply_sort(&mut docs, &[("n".to_string(), -1)]);
        assert_eq!(docs[0]["n"], json!(3));
    }

    #[test]
    fn test_sort_missing_fields_first() {
        let mut docs = vec![json!({"n": 1}), json!({}), json!({"n": 0})];
        apply_sort(&mut docs, &[("n".to_string(), 1)]);
        assert_eq!(docs[0], json!({}));
        assert_eq!(docs[1]["n"], json!(0));
    }

    #[test]
    fn test_sort_multi_key_tiebreak() {
        let mut docs = vec![
            json!({"a": 1, "b": "y"}),
            json!({"a": 1, "b": "x"}),
            json!({"a": 0, "b": "z"}),
        ];
        apply_sort(
            &mut docs,
            &[("a".to_string(), 1), ("b".to_string(), 1)],
        );
        assert_eq!(docs[0]["b"], json!("z"));
        assert_eq!(docs[1]["b"], json!("x"));
        assert_eq!(docs[2]["b"], json!("y"));
    }

    #[test]
    fn test_sort_mixed_types_by_rank() {
        let mut docs = vec![json!({"v": "s"}), json!({"v": 1}), json!({"v": null})];
        apply_sort(&mut docs, &[("v".to_string(), 1)]);
        assert_eq!(docs[0]["v"], json!(null));
        assert_eq!(docs[1]["v"], json!(1));
        assert_eq!(docs[2]["v"], json!("s"));
    }
}
