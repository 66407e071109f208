// burrow-core/src/value_utils.rs
//! Identifier and value utilities shared across modules
//!
//! The store keys documents by an internal `_id` field that must never reach
//! callers; callers address documents by a public `id` alias. The reserved
//! `_seq` field carries the per-collection insertion counter and is likewise
//! internal. Everything that crosses the adapter boundary goes through the
//! rewrite helpers here.

use serde_json::Value;
use std::cmp::Ordering;

/// The store's internal document key.
pub const INTERNAL_KEY: &str = "_id";

/// The public identifier attribute exposed to callers.
pub const PUBLIC_KEY: &str = "id";

/// Reserved ordering field holding the monotonic insertion counter.
pub const SEQ_FIELD: &str = "_seq";

/// Rewrite one outbound document: `_id` becomes `id`, `_seq` is dropped.
pub fn rewrite_id(mut doc: Value) -> Value {
    if let Value::Object(ref mut map) = doc {
        if let Some(internal) = map.remove(INTERNAL_KEY) {
            map.insert(PUBLIC_KEY.to_string(), internal);
        }
        map.remove(SEQ_FIELD);
    }
    doc
}

/// Rewrite a batch of outbound documents.
pub fn rewrite_ids(docs: Vec<Value>) -> Vec<Value> {
    docs.into_iter().map(rewrite_id).collect()
}

/// Strip caller-supplied identifier fields before storage. The store assigns
/// the internal key; a caller-provided `id` is never honored on create.
pub fn strip_ids(values: &mut Value) {
    if let Value::Object(map) = values {
        map.remove(PUBLIC_KEY);
        map.remove(INTERNAL_KEY);
    }
}

/// Escape regex metacharacters in a pattern operand.
///
/// Matches the metacharacter set the adapter has always escaped; the operand
/// is user data, never a pattern.
pub fn escape_regex(val: &str) -> String {
    let mut out = String::with_capacity(val.len());
    for ch in val.chars() {
        match ch {
            '-' | '[' | ']' | '{' | '}' | '(' | ')' | '+' | '?' | '*' | '.' | '/' | ','
            | '\\' | '^' | '$' | '|' | '#' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Compare two JSON values, `None` when the types are incomparable.
///
/// Numbers compare across integer/float representations; strings and bools
/// compare natively. Objects and arrays are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            let f1 = n1.as_f64()?;
            let f2 = n2.as_f64()?;
            f1.partial_cmp(&f2)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
