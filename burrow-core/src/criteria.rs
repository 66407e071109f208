// burrow-core/src/criteria.rs
//! Criteria translator: abstract query criteria → native store query
//!
//! Callers describe filters as a predicate tree (field → literal, list,
//! operator object, or `or` combinator). The translator parses that tree once
//! into a typed AST, applies the coercion rules (literal `"true"`/`"false"`/
//! `"null"`, datetime fields, list → member-of), then compiles the AST with a
//! single exhaustive match into the Mongo-style filter form the store
//! evaluates. Translation is pure: it never touches the store and never
//! mutates the schema it reads.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::aggregate::GroupSpec;
use crate::error::{BurrowError, Result};
use crate::schema::{is_datetime_field, Definition};
use crate::value_utils::{escape_regex, INTERNAL_KEY, PUBLIC_KEY};

/// Abstract query criteria, as handed over by the ORM layer.
///
/// `where_clause` holds the raw predicate tree (`None` and explicit JSON
/// `null` both mean match-all). `sort` keeps caller order; directions are
/// normalized during translation. The aggregate directives turn the criteria
/// into an aggregation request.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub where_clause: Option<Value>,
    pub sort: Vec<(String, Value)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub group_by: Vec<String>,
    pub sum: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
    pub average: Vec<String>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_where(mut self, predicate: Value) -> Self {
        self.where_clause = Some(predicate);
        self
    }

    pub fn with_sort(mut self, field: &str, direction: i64) -> Self {
        self.sort.push((field.to_string(), json!(direction)));
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_group_by(mut self, fields: &[&str]) -> Self {
        self.group_by = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_sum(mut self, fields: &[&str]) -> Self {
        self.sum = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_min(mut self, fields: &[&str]) -> Self {
        self.min = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_max(mut self, fields: &[&str]) -> Self {
        self.max = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_average(mut self, fields: &[&str]) -> Self {
        self.average = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Parse criteria from the raw JSON form used on the wire.
    ///
    /// Recognized keys: `where`, `sort`, `skip`, `limit`, `groupBy`, `sum`,
    /// `min`, `max`, `average`. Anything else is ignored.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            BurrowError::InvalidCriteria("criteria must be an object".to_string())
        })?;

        let mut criteria = Criteria::new();

        if let Some(where_clause) = obj.get("where") {
            criteria.where_clause = Some(where_clause.clone());
        }
        if let Some(sort) = obj.get("sort") {
            let sort_obj = sort.as_object().ok_or_else(|| {
                BurrowError::InvalidCriteria("sort must be an object".to_string())
            })?;
            for (field, direction) in sort_obj {
                criteria.sort.push((field.clone(), direction.clone()));
            }
        }
        if let Some(skip) = obj.get("skip").and_then(Value::as_u64) {
            criteria.skip = Some(skip as usize);
        }
        if let Some(limit) = obj.get("limit").and_then(Value::as_u64) {
            criteria.limit = Some(limit as usize);
        }
        criteria.group_by = field_list(obj, "groupBy")?;
        criteria.sum = field_list(obj, "sum")?;
        criteria.min = field_list(obj, "min")?;
        criteria.max = field_list(obj, "max")?;
        criteria.average = field_list(obj, "average")?;

        Ok(criteria)
    }

    /// True when any accumulator directive is present.
    pub fn is_aggregation(&self) -> bool {
        !self.sum.is_empty()
            || !self.min.is_empty()
            || !self.max.is_empty()
            || !self.average.is_empty()
    }
}

fn field_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    match obj.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    BurrowError::InvalidCriteria(format!("{} entries must be field names", key))
                })
            })
            .collect(),
        Some(_) => Err(BurrowError::InvalidCriteria(format!(
            "{} must be a list of field names",
            key
        ))),
    }
}

/// The compiled query understood by the store.
#[derive(Debug, Clone)]
pub struct NativeQuery {
    pub filter: Value,
    pub sort: Vec<(String, i32)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub group: Option<GroupSpec>,
}

// ============================================================================
// PREDICATE AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn native_key(self) -> &'static str {
        match self {
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
        }
    }
}

/// One condition applied to a single field.
#[derive(Debug, Clone)]
enum FieldExpr {
    /// Literal scalar or subdocument equality
    Equals(Value),
    /// Member-of over a list of scalars
    In(Vec<Value>),
    /// Range comparison
    Compare(CompareOp, Value),
    /// Negation of the enclosed condition
    Not(Box<FieldExpr>),
    /// Case-insensitive substring match
    Contains(String),
    /// Case-insensitive prefix match
    StartsWith(String),
    /// Case-insensitive suffix match
    EndsWith(String),
    /// Pass-through operand (wrapping semantics intentionally not applied)
    Like(Value),
    /// Nested predicate tree compiled in place and matched as a literal
    /// subdocument. The store never recurses into subdocument conditions,
    /// so operators or pattern strings nested below the first level end up
    /// compared verbatim and match nothing; only exact subdocument equality
    /// is useful here. Long-standing behaviour, kept as is.
    Document(Predicate),
}

/// A parsed predicate tree: an implicit conjunction of per-field conditions
/// plus any number of `or` branches.
#[derive(Debug, Clone, Default)]
struct Predicate {
    clauses: Vec<(String, Vec<FieldExpr>)>,
    any_of: Vec<Predicate>,
}

fn is_operator_key(key: &str) -> bool {
    matches!(
        key,
        "<" | "lessThan"
            | "<=" | "lessThanOrEqual"
            | ">" | "greaterThan"
            | ">=" | "greaterThanOrEqual"
            | "!" | "contains" | "startsWith" | "endsWith" | "like"
    ) || key.eq_ignore_ascii_case("not")
}

// ============================================================================
// TRANSLATION
// ============================================================================

/// Translate abstract criteria into the native query form.
///
/// Fails with `InvalidGroupBy` when `groupBy` is present without any
/// accumulator directive, and with `InvalidCriteria` for predicates that
/// cannot be parsed. Never mutates `schema`.
pub fn translate(criteria: &Criteria, schema: Option<&Definition>) -> Result<NativeQuery> {
    // Aggregate directives are validated before the store is touched.
    let group = GroupSpec::build(criteria)?;

    let filter = match &criteria.where_clause {
        // Absent and explicit null both normalize to match-all.
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::Object(obj)) => {
            let predicate = parse_predicate(obj, schema, true)?;
            compile_predicate(&predicate)?
        }
        Some(other) => {
            return Err(BurrowError::InvalidCriteria(format!(
                "where clause must be an object or null, got {}",
                other
            )))
        }
    };

    let sort = criteria
        .sort
        .iter()
        .map(|(field, direction)| (field.clone(), normalize_direction(direction)))
        .collect();

    Ok(NativeQuery {
        filter,
        sort,
        skip: criteria.skip,
        limit: criteria.limit,
        group,
    })
}

/// Normalize a sort direction: the descending sentinels (`0`, `-1`) map to
/// `-1`, anything else to `1`.
fn normalize_direction(direction: &Value) -> i32 {
    match direction.as_i64() {
        Some(0) | Some(-1) => -1,
        _ => 1,
    }
}

fn parse_predicate(
    obj: &Map<String, Value>,
    schema: Option<&Definition>,
    top_level: bool,
) -> Result<Predicate> {
    let mut predicate = Predicate::default();

    for (key, value) in obj {
        if key == "or" {
            let branches = value.as_array().ok_or_else(|| {
                BurrowError::InvalidCriteria("'or' must hold a list of sub-predicates".to_string())
            })?;
            for branch in branches {
                let branch_obj = branch.as_object().ok_or_else(|| {
                    BurrowError::InvalidCriteria("'or' branches must be objects".to_string())
                })?;
                predicate
                    .any_of
                    .push(parse_predicate(branch_obj, schema, false)?);
            }
            continue;
        }

        // Alias rewrite: the store does not know the public identifier name.
        let field = if top_level && key == PUBLIC_KEY && !obj.contains_key(INTERNAL_KEY) {
            INTERNAL_KEY.to_string()
        } else {
            key.clone()
        };

        let datetime = is_datetime_field(schema, key);
        let exprs = parse_field_exprs(value, datetime)?;
        predicate.clauses.push((field, exprs));
    }

    Ok(predicate)
}

fn parse_field_exprs(value: &Value, datetime: bool) -> Result<Vec<FieldExpr>> {
    match value {
        // A list value means "member of".
        Value::Array(items) => Ok(vec![FieldExpr::In(
            items.iter().map(|v| coerce_scalar(v, datetime)).collect(),
        )]),
        Value::Object(obj) => {
            let has_operators = obj.keys().any(|k| is_operator_key(k));
            if !has_operators {
                // Nested predicate tree: matched as a subdocument. Definitions
                // carry no nested schemas, so only the generic coercions apply.
                let nested = parse_predicate(obj, None, false)?;
                return Ok(vec![FieldExpr::Document(nested)]);
            }

            let mut exprs = Vec::with_capacity(obj.len());
            for (op, operand) in obj {
                if !is_operator_key(op) {
                    return Err(BurrowError::InvalidCriteria(format!(
                        "cannot mix operator and field keys ('{}')",
                        op
                    )));
                }
                exprs.push(parse_operator(op, operand, datetime)?);
            }
            Ok(exprs)
        }
        scalar => Ok(vec![FieldExpr::Equals(coerce_scalar(scalar, datetime))]),
    }
}

fn parse_operator(op: &str, operand: &Value, datetime: bool) -> Result<FieldExpr> {
    let compare = |cmp: CompareOp| -> Result<FieldExpr> {
        Ok(FieldExpr::Compare(cmp, coerce_scalar(operand, datetime)))
    };

    match op {
        "<" | "lessThan" => compare(CompareOp::Lt),
        "<=" | "lessThanOrEqual" => compare(CompareOp::Lte),
        ">" | "greaterThan" => compare(CompareOp::Gt),
        ">=" | "greaterThanOrEqual" => compare(CompareOp::Gte),
        "contains" => Ok(FieldExpr::Contains(pattern_operand(op, operand)?)),
        "startsWith" => Ok(FieldExpr::StartsWith(pattern_operand(op, operand)?)),
        "endsWith" => Ok(FieldExpr::EndsWith(pattern_operand(op, operand)?)),
        "like" => Ok(FieldExpr::Like(coerce_scalar(operand, datetime))),
        "!" => parse_not(operand, datetime),
        _ if op.eq_ignore_ascii_case("not") => parse_not(operand, datetime),
        _ => Err(BurrowError::InvalidCriteria(format!(
            "unrecognized operator '{}'",
            op
        ))),
    }
}

fn parse_not(operand: &Value, datetime: bool) -> Result<FieldExpr> {
    let mut inner = parse_field_exprs(operand, datetime)?;
    if inner.len() != 1 {
        return Err(BurrowError::InvalidCriteria(
            "'not' requires a single operand".to_string(),
        ));
    }
    let inner = inner.remove(0);
    if matches!(inner, FieldExpr::Not(_)) {
        return Err(BurrowError::InvalidCriteria(
            "'not' cannot be nested".to_string(),
        ));
    }
    Ok(FieldExpr::Not(Box::new(inner)))
}

fn pattern_operand(op: &str, operand: &Value) -> Result<String> {
    operand.as_str().map(str::to_string).ok_or_else(|| {
        BurrowError::InvalidCriteria(format!("'{}' requires a string operand", op))
    })
}

// ============================================================================
// COERCION
// ============================================================================

/// Leaf coercions: literal `"true"`/`"false"`/`"null"` strings become typed
/// values unconditionally (legacy behaviour, kept even though it can misfire
/// on text fields), and values for `datetime`-typed fields that parse as
/// dates are canonicalized to RFC 3339 UTC strings.
fn coerce_scalar(value: &Value, datetime: bool) -> Value {
    match value {
        Value::String(s) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            _ if datetime => parse_date(s)
                .map(|d| Value::String(d.to_rfc3339()))
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Parse a date string: RFC 3339 first, then the common unqualified forms.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

// ============================================================================
// COMPILATION
// ============================================================================

fn compile_predicate(predicate: &Predicate) -> Result<Value> {
    let mut filter = Map::new();

    for (field, exprs) in &predicate.clauses {
        let identifier = field == INTERNAL_KEY || field == PUBLIC_KEY;
        filter.insert(field.clone(), compile_field(exprs, identifier)?);
    }

    if !predicate.any_of.is_empty() {
        let branches = predicate
            .any_of
            .iter()
            .map(compile_predicate)
            .collect::<Result<Vec<_>>>()?;
        filter.insert("$or".to_string(), Value::Array(branches));
    }

    Ok(Value::Object(filter))
}

fn compile_field(exprs: &[FieldExpr], identifier: bool) -> Result<Value> {
    if exprs.len() == 1 {
        return compile_expr(&exprs[0], identifier);
    }

    // An operator set like {">": 1, "<": 9} merges into one condition object.
    let mut merged = Map::new();
    for expr in exprs {
        match compile_expr(expr, identifier)? {
            Value::Object(obj) => merged.extend(obj),
            _ => {
                return Err(BurrowError::InvalidCriteria(
                    "cannot combine a literal condition with other operators".to_string(),
                ))
            }
        }
    }
    Ok(Value::Object(merged))
}

fn compile_expr(expr: &FieldExpr, identifier: bool) -> Result<Value> {
    match expr {
        // General string rule: unless the field is an identifier, plain string
        // equality is case-insensitive anchored pattern equality with `%`
        // converted to a wildcard.
        FieldExpr::Equals(Value::String(s)) if !identifier => {
            Ok(json!({ "$regex": equality_pattern(s) }))
        }
        FieldExpr::Equals(v) => Ok(v.clone()),
        FieldExpr::In(items) => Ok(json!({ "$in": items })),
        FieldExpr::Compare(op, v) => Ok(json!({ op.native_key(): v })),
        FieldExpr::Contains(s) => Ok(json!({
            "$regex": format!("(?i)^.*{}.*$", escape_regex(s))
        })),
        FieldExpr::StartsWith(s) => Ok(json!({
            "$regex": format!("(?i)^{}.*$", escape_regex(s))
        })),
        FieldExpr::EndsWith(s) => Ok(json!({
            "$regex": format!("(?i)^.*{}$", escape_regex(s))
        })),
        // `like` passes its operand through untouched.
        FieldExpr::Like(v) => Ok(v.clone()),
        FieldExpr::Not(inner) => compile_not(inner, identifier),
        FieldExpr::Document(nested) => compile_predicate(nested),
    }
}

fn compile_not(inner: &FieldExpr, identifier: bool) -> Result<Value> {
    match inner {
        // Negated equality keeps the same matching semantics as the positive
        // form: strings negate the case-insensitive pattern, everything else
        // compares exactly.
        FieldExpr::Equals(Value::String(_)) if !identifier => {
            Ok(json!({ "$not": compile_expr(inner, identifier)? }))
        }
        FieldExpr::Equals(v) | FieldExpr::Like(v) => Ok(json!({ "$ne": v })),
        FieldExpr::Document(nested) => Ok(json!({ "$ne": compile_predicate(nested)? })),
        FieldExpr::In(_)
        | FieldExpr::Compare(..)
        | FieldExpr::Contains(_)
        | FieldExpr::StartsWith(_)
        | FieldExpr::EndsWith(_) => Ok(json!({ "$not": compile_expr(inner, identifier)? })),
        FieldExpr::Not(_) => Err(BurrowError::InvalidCriteria(
            "'not' cannot be nested".to_string(),
        )),
    }
}

fn equality_pattern(s: &str) -> String {
    format!("(?i)^{}$", escape_regex(s).replace('%', ".*"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definition_from_value;

    fn translate_where(where_clause: Value) -> NativeQuery {
        translate(&Criteria::new().with_where(where_clause), None).unwrap()
    }

    #[test]
    fn test_missing_where_matches_all() {
        let native = translate(&Criteria::new(), None).unwrap();
        assert_eq!(native.filter, json!({}));
    }

    #[test]
    fn test_null_where_normalizes_to_match_all() {
        let native = translate_where(Value::Null);
        assert_eq!(native.filter, json!({}));
    }

    #[test]
    fn test_id_alias_rewrite() {
        let native = translate_where(json!({"id": "abc123"}));
        assert_eq!(native.filter, json!({"_id": "abc123"}));
    }

    #[test]
    fn test_id_alias_not_rewritten_when_internal_present() {
        let native = translate_where(json!({"id": "a", "_id": "b"}));
        // Both keys survive; only the alias-less case is rewritten.
        assert_eq!(native.filter.get("id"), Some(&json!("a")));
        assert_eq!(native.filter.get("_id"), Some(&json!("b")));
    }

    #[test]
    fn test_string_equality_becomes_anchored_pattern() {
        let native = translate_where(json!({"name": "Bob"}));
        assert_eq!(native.filter, json!({"name": {"$regex": "(?i)^Bob$"}}));
    }

    #[test]
    fn test_percent_becomes_wildcard() {
        let native = translate_where(json!({"name": "b%b"}));
        assert_eq!(native.filter, json!({"name": {"$regex": "(?i)^b.*b$"}}));
    }

    #[test]
    fn test_identifier_fields_compare_exactly() {
        let native = translate_where(json!({"id": "AbC"}));
        assert_eq!(native.filter, json!({"_id": "AbC"}));
    }

    #[test]
    fn test_range_operators() {
        let native = translate_where(json!({"age": {">": 18, "lessThanOrEqual": 65}}));
        assert_eq!(native.filter, json!({"age": {"$gt": 18, "$lte": 65}}));
    }

    #[test]
    fn test_symbol_and_word_operators_agree() {
        let a = translate_where(json!({"age": {"<": 5}}));
        let b = translate_where(json!({"age": {"lessThan": 5}}));
        assert_eq!(a.filter, b.filter);
    }

    #[test]
    fn test_list_value_becomes_member_of() {
        let native = translate_where(json!({"city": ["NYC", "LA"]}));
        assert_eq!(native.filter, json!({"city": {"$in": ["NYC", "LA"]}}));
    }

    #[test]
    fn test_not_scalar() {
        let native = translate_where(json!({"age": {"not": 30}}));
        assert_eq!(native.filter, json!({"age": {"$ne": 30}}));
    }

    #[test]
    fn test_not_is_case_insensitive() {
        let native = translate_where(json!({"age": {"NOT": 30}}));
        assert_eq!(native.filter, json!({"age": {"$ne": 30}}));
        let native = translate_where(json!({"age": {"!": 30}}));
        assert_eq!(native.filter, json!({"age": {"$ne": 30}}));
    }

    #[test]
    fn test_not_string_keeps_pattern_semantics() {
        let native = translate_where(json!({"name": {"not": "bob"}}));
        assert_eq!(
            native.filter,
            json!({"name": {"$not": {"$regex": "(?i)^bob$"}}})
        );
    }

    #[test]
    fn test_contains_escapes_and_anchors() {
        let native = translate_where(json!({"name": {"contains": "o.o"}}));
        assert_eq!(
            native.filter,
            json!({"name": {"$regex": "(?i)^.*o\\.o.*$"}})
        );
    }

    #[test]
    fn test_starts_with_and_ends_with() {
        let native = translate_where(json!({"name": {"startsWith": "fo"}}));
        assert_eq!(native.filter, json!({"name": {"$regex": "(?i)^fo.*$"}}));

        let native = translate_where(json!({"name": {"endsWith": "oo"}}));
        assert_eq!(native.filter, json!({"name": {"$regex": "(?i)^.*oo$"}}));
    }

    #[test]
    fn test_like_passes_operand_through() {
        let native = translate_where(json!({"name": {"like": "b%"}}));
        assert_eq!(native.filter, json!({"name": "b%"}));
    }

    #[test]
    fn test_or_compiles_to_disjunction() {
        let native = translate_where(json!({
            "or": [{"age": {"<": 18}}, {"age": {">": 65}}]
        }));
        assert_eq!(
            native.filter,
            json!({"$or": [{"age": {"$lt": 18}}, {"age": {"$gt": 65}}]})
        );
    }

    #[test]
    fn test_or_branches_are_independent_predicates() {
        let native = translate_where(json!({
            "status": "active",
            "or": [{"name": {"startsWith": "a"}}, {"id": "x"}]
        }));
        let or = native.filter.get("$or").unwrap().as_array().unwrap();
        assert_eq!(or.len(), 2);
        // The id alias is only rewritten at the top level of the predicate.
        assert_eq!(or[1], json!({"id": "x"}));
        assert!(native.filter.get("status").is_some());
    }

    #[test]
    fn test_boolean_and_null_literal_coercion() {
        let native = translate_where(json!({"active": "true", "deleted": "false", "tag": "null"}));
        assert_eq!(native.filter.get("active"), Some(&json!(true)));
        assert_eq!(native.filter.get("deleted"), Some(&json!(false)));
        assert_eq!(native.filter.get("tag"), Some(&Value::Null));
    }

    #[test]
    fn test_datetime_coercion_uses_schema() {
        let schema = definition_from_value(&json!({
            "createdAt": {"type": "datetime"},
            "name": {"type": "string"}
        }))
        .unwrap();

        let criteria =
            Criteria::new().with_where(json!({"createdAt": {">": "2024-03-01 12:00:00"}}));
        let native = translate(&criteria, Some(&schema)).unwrap();
        assert_eq!(
            native.filter,
            json!({"createdAt": {"$gt": "2024-03-01T12:00:00+00:00"}})
        );
    }

    #[test]
    fn test_non_datetime_fields_left_alone() {
        let schema = definition_from_value(&json!({"name": {"type": "string"}})).unwrap();
        let criteria = Criteria::new().with_where(json!({"name": {">": "2024-03-01"}}));
        let native = translate(&criteria, Some(&schema)).unwrap();
        assert_eq!(native.filter, json!({"name": {"$gt": "2024-03-01"}}));
    }

    #[test]
    fn test_unparseable_datetime_passes_through() {
        let schema = definition_from_value(&json!({"createdAt": {"type": "datetime"}})).unwrap();
        let criteria = Criteria::new().with_where(json!({"createdAt": "not a date"}));
        let native = translate(&criteria, Some(&schema)).unwrap();
        // Falls back to the general string rule.
        assert_eq!(
            native.filter,
            json!({"createdAt": {"$regex": "(?i)^not a date$"}})
        );
    }

    #[test]
    fn test_sort_normalization() {
        let criteria = Criteria::new()
            .with_sort("a", 1)
            .with_sort("b", -1)
            .with_sort("c", 0)
            .with_sort("d", 42);
        let native = translate(&criteria, None).unwrap();
        assert_eq!(
            native.sort,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), -1),
                ("c".to_string(), -1),
                ("d".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_group_by_without_accumulator_fails() {
        let criteria = Criteria::new().with_group_by(&["city"]);
        let err = translate(&criteria, None).unwrap_err();
        assert!(matches!(err, BurrowError::InvalidGroupBy));
    }

    #[test]
    fn test_aggregation_attaches_group_stage() {
        let criteria = Criteria::new().with_group_by(&["city"]).with_sum(&["total"]);
        let native = translate(&criteria, None).unwrap();
        assert!(native.group.is_some());
    }

    #[test]
    fn test_nested_document_equality() {
        let native = translate_where(json!({"address": {"zip": 10001}}));
        assert_eq!(native.filter, json!({"address": {"zip": 10001}}));
    }

    #[test]
    fn test_schema_not_mutated() {
        let schema = definition_from_value(&json!({"createdAt": {"type": "datetime"}})).unwrap();
        let before = schema.clone();
        let criteria = Criteria::new().with_where(json!({"createdAt": "2024-01-01"}));
        translate(&criteria, Some(&schema)).unwrap();
        assert_eq!(schema, before);
    }

    #[test]
    fn test_unrecognized_mixed_keys_fail() {
        let err = translate(
            &Criteria::new().with_where(json!({"age": {">": 1, "name": "x"}})),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BurrowError::InvalidCriteria(_)));
    }

    #[test]
    fn test_criteria_from_value() {
        let criteria = Criteria::from_value(&json!({
            "where": {"name": "Ann"},
            "sort": {"age": -1},
            "limit": 10,
            "skip": 2,
            "groupBy": ["city"],
            "sum": ["total"]
        }))
        .unwrap();

        assert_eq!(criteria.where_clause, Some(json!({"name": "Ann"})));
        assert_eq!(criteria.limit, Some(10));
        assert_eq!(criteria.skip, Some(2));
        assert_eq!(criteria.group_by, vec!["city"]);
        assert_eq!(criteria.sum, vec!["total"]);
        assert!(criteria.is_aggregation());
    }
}
