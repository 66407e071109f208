// burrow-core/src/aggregate.rs
//! Aggregation builder: groupBy/sum/min/max/average directives → group fold
//!
//! A `GroupSpec` is a grouping key plus an accumulator state machine with the
//! classic initial/reduce/finalize shape. The reduce step is a streaming,
//! order-independent fold: sum, min, max and average are all commutative, so
//! no ordering guarantee is needed (or provided) within a group.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::criteria::Criteria;
use crate::error::{BurrowError, Result};

/// A grouping-accumulator specification.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    key: Vec<String>,
    sum: Vec<String>,
    min: Vec<String>,
    max: Vec<String>,
    average: Vec<String>,
}

/// Running accumulator state for one group bucket.
///
/// min/max are seeded with NaN: NaN never compares smaller (or greater), so
/// the first real value always replaces the seed via the explicit NaN check.
#[derive(Debug)]
struct Bucket {
    key_fields: Map<String, Value>,
    sums: HashMap<String, f64>,
    mins: HashMap<String, f64>,
    maxs: HashMap<String, f64>,
    averages: HashMap<String, (f64, u64)>,
}

impl GroupSpec {
    /// Build a group spec from the criteria's aggregate directives.
    ///
    /// Returns `Ok(None)` when the criteria is not an aggregation request and
    /// `InvalidGroupBy` when `groupBy` names fields but no accumulator
    /// directive is present.
    pub fn build(criteria: &Criteria) -> Result<Option<GroupSpec>> {
        if !criteria.is_aggregation() {
            if !criteria.group_by.is_empty() {
                return Err(BurrowError::InvalidGroupBy);
            }
            return Ok(None);
        }

        Ok(Some(GroupSpec {
            key: criteria.group_by.clone(),
            sum: criteria.sum.clone(),
            min: criteria.min.clone(),
            max: criteria.max.clone(),
            average: criteria.average.clone(),
        }))
    }

    /// Fold the matched documents into group buckets and finalize.
    ///
    /// Order between groups is unspecified; this implementation emits them in
    /// bucket-key order for determinism.
    pub fn apply(&self, docs: &[Value]) -> Vec<Value> {
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

        for doc in docs {
            let key_fields: Map<String, Value> = self
                .key
                .iter()
                .map(|k| (k.clone(), doc.get(k).cloned().unwrap_or(Value::Null)))
                .collect();
            let bucket_key = Value::Object(key_fields.clone()).to_string();

            let bucket = buckets
                .entry(bucket_key)
                .or_insert_with(|| self.initial_bucket(key_fields));
            self.reduce(bucket, doc);
        }

        buckets.into_values().map(|b| self.finalize(b)).collect()
    }

    fn initial_bucket(&self, key_fields: Map<String, Value>) -> Bucket {
        Bucket {
            key_fields,
            sums: self.sum.iter().map(|f| (f.clone(), 0.0)).collect(),
            mins: self.min.iter().map(|f| (f.clone(), f64::NAN)).collect(),
            maxs: self.max.iter().map(|f| (f.clone(), f64::NAN)).collect(),
            averages: self
                .average
                .iter()
                .map(|f| (f.clone(), (0.0, 0)))
                .collect(),
        }
    }

    /// Reduce step: fold one document into its bucket.
    fn reduce(&self, bucket: &mut Bucket, doc: &Value) {
        for field in &self.sum {
            if let (Some(v), Some(running)) = (numeric(doc, field), bucket.sums.get_mut(field)) {
                *running += v;
            }
        }
        for field in &self.min {
            if let (Some(v), Some(running)) = (numeric(doc, field), bucket.mins.get_mut(field)) {
                // NaN never compares as smaller; the explicit check seeds the
                // first real value.
                if v < *running || running.is_nan() {
                    *running = v;
                }
            }
        }
        for field in &self.max {
            if let (Some(v), Some(running)) = (numeric(doc, field), bucket.maxs.get_mut(field)) {
                if v > *running || running.is_nan() {
                    *running = v;
                }
            }
        }
        for field in &self.average {
            if let (Some(v), Some((total, count))) =
                (numeric(doc, field), bucket.averages.get_mut(field))
            {
                *total += v;
                *count += 1;
            }
        }
    }

    /// Finalize step: divide averages, drop their counters, emit the group
    /// document.
    fn finalize(&self, bucket: Bucket) -> Value {
        let mut out = bucket.key_fields;

        for field in &self.sum {
            out.insert(field.clone(), number_value(bucket.sums[field]));
        }
        for field in &self.min {
            out.insert(field.clone(), number_value(bucket.mins[field]));
        }
        for field in &self.max {
            out.insert(field.clone(), number_value(bucket.maxs[field]));
        }
        for field in &self.average {
            let (total, count) = bucket.averages[field];
            let value = if count == 0 {
                Value::Null
            } else {
                number_value(total / count as f64)
            };
            out.insert(field.clone(), value);
        }

        Value::Object(out)
    }
}

fn numeric(doc: &Value, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

/// Emit integers as integers; JSON has no NaN, so an untouched min/max seed
/// becomes null.
fn number_value(v: f64) -> Value {
    if v.is_nan() {
        return Value::Null;
    }
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        return Value::Number(Number::from(v as i64));
    }
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(criteria: &Criteria) -> GroupSpec {
        GroupSpec::build(criteria).unwrap().unwrap()
    }

    #[test]
    fn test_group_by_without_accumulator_is_invalid() {
        let criteria = Criteria::new().with_group_by(&["k"]);
        assert!(matches!(
            GroupSpec::build(&criteria),
            Err(BurrowError::InvalidGroupBy)
        ));
    }

    #[test]
    fn test_no_directives_builds_nothing() {
        assert!(GroupSpec::build(&Criteria::new()).unwrap().is_none());
    }

    #[test]
    fn test_group_sum() {
        let criteria = Criteria::new().with_group_by(&["k"]).with_sum(&["v"]);
        let docs = vec![
            json!({"k": "a", "v": 1}),
            json!({"k": "a", "v": 3}),
            json!({"k": "b", "v": 5}),
        ];

        let mut groups = spec(&criteria).apply(&docs);
        groups.sort_by_key(|g| g["k"].as_str().unwrap().to_string());

        assert_eq!(groups, vec![json!({"k": "a", "v": 4}), json!({"k": "b", "v": 5})]);
    }

    #[test]
    fn test_min_and_max_on_distinct_fields() {
        let criteria = Criteria::new()
            .with_group_by(&["k"])
            .with_min(&["lo"])
            .with_max(&["hi"]);
        let docs = vec![
            json!({"k": "a", "lo": 7, "hi": 7}),
            json!({"k": "a", "lo": -2, "hi": 12}),
        ];

        let groups = spec(&criteria).apply(&docs);
        assert_eq!(groups, vec![json!({"k": "a", "lo": -2, "hi": 12})]);
    }

    #[test]
    fn test_average_divides_and_drops_counter() {
        let criteria = Criteria::new().with_group_by(&["k"]).with_average(&["v"]);
        let docs = vec![
            json!({"k": "a", "v": 2}),
            json!({"k": "a", "v": 4}),
            json!({"k": "a", "v": 6}),
        ];

        let groups = spec(&criteria).apply(&docs);
        assert_eq!(groups, vec![json!({"k": "a", "v": 4})]);
        assert!(groups[0].get("count").is_none());
    }

    #[test]
    fn test_fold_is_order_independent() {
        let criteria = Criteria::new()
            .with_group_by(&["k"])
            .with_sum(&["v"])
            .with_min(&["v"])
            .with_average(&["v"]);
        let docs = vec![
            json!({"k": "a", "v": 1}),
            json!({"k": "a", "v": 9}),
            json!({"k": "a", "v": 5}),
        ];
        let mut reversed = docs.clone();
        reversed.reverse();

        let s = spec(&criteria);
        assert_eq!(s.apply(&docs), s.apply(&reversed));
    }

    #[test]
    fn test_empty_group_seeds_surface_as_null() {
        let criteria = Criteria::new().with_group_by(&["k"]).with_min(&["v"]);
        let docs = vec![json!({"k": "a"})]; // no numeric "v" anywhere
        let groups = spec(&criteria).apply(&docs);
        assert_eq!(groups, vec![json!({"k": "a", "v": null})]);
    }

    #[test]
    fn test_accumulators_without_group_by() {
        // One bucket over the whole matched set.
        let criteria = Criteria::new().with_sum(&["v"]);
        let docs = vec![json!({"v": 1}), json!({"v": 2})];
        let groups = spec(&criteria).apply(&docs);
        assert_eq!(groups, vec![json!({"v": 3})]);
    }

    #[test]
    fn test_float_results_stay_float() {
        let criteria = Criteria::new().with_group_by(&["k"]).with_average(&["v"]);
        let docs = vec![json!({"k": "a", "v": 1}), json!({"k": "a", "v": 2})];
        let groups = spec(&criteria).apply(&docs);
        assert_eq!(groups, vec![json!({"k": "a", "v": 1.5})]);
    }
}
