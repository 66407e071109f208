// burrow-core/src/store/matcher.rs
//! Document filter evaluation for the native query dialect.
//!
//! The dialect is the Mongo-flavored subset the translator emits: implicit
//! field equality, `$lt`/`$lte`/`$gt`/`$gte`/`$ne`/`$in`/`$not`/`$regex`, and
//! `$or` at any nesting level. Unknown operators are rejected rather than
//! silently matching nothing.

use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::{BurrowError, Result};
use crate::value_utils::compare_values;

const REGEX_CACHE_SIZE: usize = 256;

lazy_static! {
    // Compiled patterns are shared across collections; translation emits the
    // same anchored patterns repeatedly for hot criteria.
    static ref REGEX_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(REGEX_CACHE_SIZE).unwrap()));
}

fn compile_regex(pattern: &str) -> Result<Arc<Regex>> {
    let mut cache = REGEX_CACHE.lock();
    if let Some(re) = cache.get(pattern) {
        return Ok(Arc::clone(re));
    }
    let re = Arc::new(Regex::new(pattern).map_err(|e| {
        BurrowError::InvalidQuery(format!("invalid regex '{}': {}", pattern, e))
    })?);
    cache.put(pattern.to_string(), Arc::clone(&re));
    Ok(re)
}

/// Check whether `doc` satisfies `filter`. An empty filter matches everything.
pub fn matches(doc: &Value, filter: &Value) -> Result<bool> {
    let clauses = match filter {
        Value::Object(map) => map,
        Value::Null => return Ok(true),
        other => {
            return Err(BurrowError::InvalidQuery(format!(
                "filter must be an object, got {}",
                other
            )))
        }
    };

    for (key, condition) in clauses {
        if key == "$or" {
            if !matches_or(doc, condition)? {
                return Ok(false);
            }
            continue;
        }
        if key.starts_with('$') {
            return Err(BurrowError::InvalidQuery(format!(
                "unknown top-level operator '{}'",
                key
            )));
        }
        if !matches_field(doc.get(key.as_str()), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_or(doc: &Value, branches: &Value) -> Result<bool> {
    let branches = branches.as_array().ok_or_else(|| {
        BurrowError::InvalidQuery("$or expects an array of filters".to_string())
    })?;
    for branch in branches {
        if matches(doc, branch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn matches_field(actual: Option<&Value>, condition: &Value) -> Result<bool> {
    match condition {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            for (op, operand) in ops {
                if !apply_operator(actual, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        // Plain value (or operator-free subdocument): equality.
        expected => Ok(values_equal(actual.unwrap_or(&Value::Null), expected)),
    }
}

fn apply_operator(actual: Option<&Value>, op: &str, operand: &Value) -> Result<bool> {
    let missing = Value::Null;
    let actual_ref = actual.unwrap_or(&missing);
    match op {
        "$lt" => Ok(ordered(actual, operand, |o| o == std::cmp::Ordering::Less)),
        "$lte" => Ok(ordered(actual, operand, |o| o != std::cmp::Ordering::Greater)),
        "$gt" => Ok(ordered(actual, operand, |o| o == std::cmp::Ordering::Greater)),
        "$gte" => Ok(ordered(actual, operand, |o| o != std::cmp::Ordering::Less)),
        "$ne" => Ok(!values_equal(actual_ref, operand)),
        "$in" => {
            let candidates = operand.as_array().ok_or_else(|| {
                BurrowError::InvalidQuery("$in expects an array".to_string())
            })?;
            Ok(candidates.iter().any(|c| values_equal(actual_ref, c)))
        }
        "$not" => Ok(!matches_field(actual, operand)?),
        "$regex" => {
            let pattern = operand.as_str().ok_or_else(|| {
                BurrowError::InvalidQuery("$regex expects a string pattern".to_string())
            })?;
            match actual {
                Some(Value::String(s)) => Ok(compile_regex(pattern)?.is_match(s)),
                _ => Ok(false),
            }
        }
        other => Err(BurrowError::InvalidQuery(format!(
            "unknown operator '{}'",
            other
        ))),
    }
}

fn ordered<F>(actual: Option<&Value>, operand: &Value, check: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    match actual {
        Some(v) => compare_values(v, operand).map(&check).unwrap_or(false),
        None => false,
    }
}

/// Equality with cross-representation numeric comparison: `1` and `1.0` are
/// equal even though serde_json stores them differently.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}
