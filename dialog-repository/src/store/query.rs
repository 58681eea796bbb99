//! Filter matching, value ordering and sort specifications
//!
//! Filters use the document-query dialect: `{field: value}` equality (an
//! array field matches when any element equals the value), operator objects
//! such as `{field: {"$gte": 3}}`, and the logical combinators `$and`, `$or`
//! and `$nor`. Field names may be dotted paths into nested objects.

use std::cmp::Ordering;

use serde_json::Value;

use super::{Document, StoreError, StoreResult};

/// Resolve a dotted path inside a document
///
/// Numeric segments index into arrays.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a dotted path inside a document, creating intermediate objects
pub fn set_path(document: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Remove a dotted path from a document
pub fn remove_path(document: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Value::Object(child)) => remove_path(child, rest),
            _ => None,
        },
    }
}

/// Test whether a document satisfies a filter
pub fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => all_clauses(condition, key)?
                .iter()
                .try_fold(true, |acc, clause| Ok::<_, StoreError>(acc && matches(document, clause)?))?,
            "$or" => {
                let mut any = false;
                for clause in all_clauses(condition, key)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in all_clauses(condition, key)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            operator if operator.starts_with('$') => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown top level operator: {operator}"
                )));
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_clauses<'a>(condition: &'a Value, operator: &str) -> StoreResult<Vec<&'a Document>> {
    let items = condition.as_array().ok_or_else(|| {
        StoreError::InvalidQuery(format!("{operator} argument must be an array"))
    })?;
    if items.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "{operator} argument must be a non-empty array"
        )));
    }
    items
        .iter()
        .map(|item| {
            item.as_object().ok_or_else(|| {
                StoreError::InvalidQuery(format!("{operator} entries must be objects"))
            })
        })
        .collect()
}

fn is_operator_object(condition: &Value) -> Option<&Document> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

fn field_matches(value: Option<&Value>, condition: &Value) -> StoreResult<bool> {
    let Some(operators) = is_operator_object(condition) else {
        return Ok(equals(value, condition));
    };

    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, operand, operator)?,
            "$nin" => !in_list(value, operand, operator)?,
            "$exists" => value.is_some() == truthy(operand),
            "$not" => !field_matches(value, operand)?,
            other => {
                return Err(StoreError::InvalidQuery(format!("unknown operator: {other}")));
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(value: Option<&Value>, target: &Value) -> bool {
    match value {
        None => target.is_null(),
        Some(Value::Array(items)) if !target.is_array() => {
            items.iter().any(|item| compare_values(item, target) == Ordering::Equal)
        }
        Some(v) => compare_values(v, target) == Ordering::Equal,
    }
}

fn compares(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |candidate: &Value| {
        type_rank(candidate) == type_rank(operand) && accept(compare_values(candidate, operand))
    };
    match value {
        None => false,
        Some(Value::Array(items)) if !operand.is_array() => items.iter().any(check),
        Some(v) => check(v),
    }
}

fn in_list(value: Option<&Value>, operand: &Value, operator: &str) -> StoreResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{operator} needs an array")))?;
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Canonical cross-type ordering: null < numbers < strings < objects < arrays < booleans
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x.cmp(&y)
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x.cmp(&y)
            } else {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y)
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// One key of a sort specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field path
    pub path: String,
    /// `true` for descending
    pub descending: bool,
}

/// Parse an ordered `{field: 1 | -1}` specification
pub fn parse_sort(spec: &Document) -> StoreResult<Vec<SortKey>> {
    spec.iter()
        .map(|(path, direction)| match direction.as_i64() {
            Some(1) => Ok(SortKey {
                path: path.clone(),
                descending: false,
            }),
            Some(-1) => Ok(SortKey {
                path: path.clone(),
                descending: true,
            }),
            _ => Err(StoreError::InvalidQuery(format!(
                "bad sort specification for {path}: {direction}"
            ))),
        })
        .collect()
}

/// Stable in-place sort; missing fields order as null
pub fn sort_documents(documents: &mut [Document], spec: &Document) -> StoreResult<()> {
    let keys = parse_sort(spec)?;
    if keys.is_empty() {
        return Ok(());
    }
    documents.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let left = lookup(a, &key.path).unwrap_or(&Value::Null);
                let right = lookup(b, &key.path).unwrap_or(&Value::Null);
                let ordering = compare_values(left, right);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    Ok(())
}
