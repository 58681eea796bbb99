//! Aggregation pipeline evaluation
//!
//! Supports the stages repositories and their callers build: `$match`,
//! `$sort`, `$skip`, `$limit`, `$count`, `$project`, `$group` and `$unwind`.

use serde_json::Value;

use super::query::{compare_values, lookup, matches, remove_path, set_path, sort_documents};
use super::{Document, StoreError, StoreResult, ID_FIELD};

/// Run `pipeline` over `documents`
pub fn run(mut documents: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(StoreError::InvalidQuery(
                    "a pipeline stage specification object must contain exactly one field"
                        .to_string(),
                ));
            }
        };

        documents = match name.as_str() {
            "$match" => {
                let filter = as_object(spec, name)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                let spec = as_object(spec, name)?;
                if spec.is_empty() {
                    return Err(StoreError::InvalidQuery(
                        "$sort stage must have at least one sort key".to_string(),
                    ));
                }
                sort_documents(&mut documents, spec)?;
                documents
            }
            "$skip" => {
                let skip = as_count(spec, name)?;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => {
                let limit = as_count(spec, name)?;
                if limit == 0 {
                    return Err(StoreError::InvalidQuery(
                        "the limit must be positive".to_string(),
                    ));
                }
                documents.truncate(limit);
                documents
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .filter(|field| !field.is_empty() && !field.starts_with('$'))
                    .ok_or_else(|| {
                        StoreError::InvalidQuery(
                            "the count field must be a non-empty string".to_string(),
                        )
                    })?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field.to_string(), Value::from(documents.len() as u64));
                    vec![counted]
                }
            }
            "$project" => project(documents, as_object(spec, name)?)?,
            "$group" => group(documents, as_object(spec, name)?)?,
            "$unwind" => unwind(documents, spec)?,
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unrecognized pipeline stage name: '{other}'"
                )));
            }
        };
    }
    Ok(documents)
}

fn as_object<'a>(spec: &'a Value, stage: &str) -> StoreResult<&'a Document> {
    spec.as_object()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{stage} specification must be an object")))
}

fn as_count(spec: &Value, stage: &str) -> StoreResult<usize> {
    spec.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            StoreError::InvalidQuery(format!("{stage} requires a non-negative integer"))
        })
}

/// Evaluate an expression against a document
///
/// `"$path"` strings resolve to field values, objects and arrays evaluate
/// element-wise and everything else is a literal.
fn evaluate(document: &Document, expression: &Value) -> Value {
    match expression {
        Value::String(s) if s.starts_with('$') => lookup(document, &s[1..])
            .cloned()
            .unwrap_or(Value::Null),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), evaluate(document, v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| evaluate(document, v)).collect()),
        literal => literal.clone(),
    }
}

fn project(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let is_exclusion = |v: &Value| matches!(v, Value::Bool(false)) || v.as_f64() == Some(0.0);
    let excluding = spec
        .iter()
        .filter(|(field, _)| field.as_str() != ID_FIELD)
        .any(|(_, v)| is_exclusion(v));

    if excluding {
        if spec
            .iter()
            .any(|(field, v)| field.as_str() != ID_FIELD && !is_exclusion(v))
        {
            return Err(StoreError::InvalidQuery(
                "cannot mix inclusion and exclusion in $project".to_string(),
            ));
        }
        return Ok(documents
            .into_iter()
            .map(|mut document| {
                for field in spec.keys() {
                    remove_path(&mut document, field);
                }
                document
            })
            .collect());
    }

    let keep_id = spec.get(ID_FIELD).map_or(true, |v| !is_exclusion(v));
    Ok(documents
        .into_iter()
        .map(|document| {
            let mut projected = Document::new();
            if keep_id {
                if let Some(id) = document.get(ID_FIELD) {
                    projected.insert(ID_FIELD.to_string(), id.clone());
                }
            }
            for (field, rule) in spec {
                if field == ID_FIELD && is_exclusion(rule) {
                    continue;
                }
                match rule {
                    Value::Bool(true) | Value::Number(_) => {
                        if let Some(value) = lookup(&document, field) {
                            set_path(&mut projected, field, value.clone());
                        }
                    }
                    expression => set_path(&mut projected, field, evaluate(&document, expression)),
                }
            }
            projected
        })
        .collect())
}

#[derive(Debug)]
enum Accumulator {
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
}

impl Accumulator {
    fn new(operator: &str) -> StoreResult<Self> {
        Ok(match operator {
            "$sum" => Self::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            "$avg" => Self::Avg {
                total: 0.0,
                count: 0,
            },
            "$min" => Self::Min(None),
            "$max" => Self::Max(None),
            "$first" => Self::First(None),
            "$last" => Self::Last(Value::Null),
            "$push" => Self::Push(Vec::new()),
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown group operator '{other}'"
                )));
            }
        })
    }

    fn add(&mut self, value: Value) {
        match self {
            Self::Sum {
                int,
                float,
                is_float,
            } => {
                if let Value::Number(n) = &value {
                    match n.as_i64() {
                        Some(i) if !*is_float => *int = int.saturating_add(i),
                        _ => {
                            if !*is_float {
                                *is_float = true;
                                *float = *int as f64;
                            }
                            *float += n.as_f64().unwrap_or(0.0);
                        }
                    }
                }
            }
            Self::Avg { total, count } => {
                if let Some(n) = value.as_f64() {
                    *total += n;
                    *count += 1;
                }
            }
            Self::Min(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map_or(true, |c| compare_values(&value, c).is_lt())
                {
                    *current = Some(value);
                }
            }
            Self::Max(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map_or(true, |c| compare_values(&value, c).is_gt())
                {
                    *current = Some(value);
                }
            }
            Self::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Self::Last(current) => *current = value,
            Self::Push(items) => items.push(value),
        }
    }

    fn finish(self) -> Value {
        match self {
            Self::Sum {
                int,
                float,
                is_float,
            } => {
                if is_float {
                    Value::from(float)
                } else {
                    Value::from(int)
                }
            }
            Self::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::from(total / count as f64)
                }
            }
            Self::Min(v) | Self::Max(v) | Self::First(v) => v.unwrap_or(Value::Null),
            Self::Last(v) => v,
            Self::Push(items) => Value::Array(items),
        }
    }
}

fn group(documents: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let key_expression = spec.get(ID_FIELD).ok_or_else(|| {
        StoreError::InvalidQuery("a group specification must include an _id".to_string())
    })?;

    let mut fields = Vec::new();
    for (field, accumulator) in spec.iter().filter(|(f, _)| f.as_str() != ID_FIELD) {
        let mut operator = accumulator.as_object().map(|m| m.iter()).into_iter().flatten();
        match (operator.next(), operator.next()) {
            (Some((name, expression)), None) => {
                Accumulator::new(name)?;
                fields.push((field.clone(), name.clone(), expression.clone()));
            }
            _ => {
                return Err(StoreError::InvalidQuery(format!(
                    "the field '{field}' must be an accumulator object"
                )));
            }
        }
    }

    // Groups keep first-seen order.
    let mut groups: Vec<(Value, Vec<Accumulator>)> = Vec::new();
    for document in &documents {
        let key = evaluate(document, key_expression);
        let index = match groups.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                let accumulators = fields
                    .iter()
                    .map(|(_, name, _)| Accumulator::new(name))
                    .collect::<StoreResult<Vec<_>>>()?;
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };
        for ((_, _, expression), accumulator) in fields.iter().zip(groups[index].1.iter_mut()) {
            accumulator.add(evaluate(document, expression));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut output = Document::new();
            output.insert(ID_FIELD.to_string(), key);
            for ((field, _, _), accumulator) in fields.iter().zip(accumulators) {
                output.insert(field.clone(), accumulator.finish());
            }
            output
        })
        .collect())
}

fn unwind(documents: Vec<Document>, spec: &Value) -> StoreResult<Vec<Document>> {
    let (path, preserve_empty) = match spec {
        Value::String(path) => (path.as_str(), false),
        Value::Object(options) => (
            options.get("path").and_then(Value::as_str).unwrap_or_default(),
            options
                .get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        ),
        _ => ("", false),
    };
    let Some(path) = path.strip_prefix('$') else {
        return Err(StoreError::InvalidQuery(
            "$unwind path must be prefixed by a '$'".to_string(),
        ));
    };

    let mut output = Vec::with_capacity(documents.len());
    for document in documents {
        match lookup(&document, path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut unwound = document.clone();
                    set_path(&mut unwound, path, item);
                    output.push(unwound);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve_empty {
                    output.push(document);
                }
            }
            Some(_) => output.push(document),
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use serde_json::json;

    fn messages() -> Vec<Document> {
        vec![
            doc!({"_id": "1", "senderId": "a", "type": "REQUEST", "len": 3, "tags": ["x", "y"]}),
            doc!({"_id": "2", "senderId": "b", "type": "RESPONSE", "len": 5, "tags": []}),
            doc!({"_id": "3", "senderId": "a", "type": "RESPONSE", "len": 1.5, "tags": ["z"]}),
        ]
    }

    #[test]
    fn test_match_sort_skip_limit() {
        let out = run(
            messages(),
            &[
                doc!({"$match": {"senderId": "a"}}),
                doc!({"$sort": {"_id": -1}}),
                doc!({"$skip": 1}),
                doc!({"$limit": 5}),
            ],
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["_id"], json!("1"));
    }

    #[test]
    fn test_count_stage() {
        let out = run(messages(), &[doc!({"$count": "count"})]).unwrap();
        assert_eq!(out, vec![doc!({"count": 3})]);
    }

    #[test]
    fn test_count_over_empty_input_emits_nothing() {
        let out = run(
            messages(),
            &[doc!({"$match": {"senderId": "nobody"}}), doc!({"$count": "count"})],
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_group_accumulators() {
        let out = run(
            messages(),
            &[doc!({"$group": {
                "_id": "$senderId",
                "total": {"$sum": "$len"},
                "n": {"$sum": 1},
                "avg": {"$avg": "$len"},
                "max": {"$max": "$len"},
                "types": {"$push": "$type"},
                "first": {"$first": "$_id"}
            }})],
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], json!("a"));
        assert_eq!(out[0]["total"], json!(4.5));
        assert_eq!(out[0]["n"], json!(2));
        assert_eq!(out[0]["avg"], json!(2.25));
        assert_eq!(out[0]["max"], json!(3));
        assert_eq!(out[0]["types"], json!(["REQUEST", "RESPONSE"]));
        assert_eq!(out[0]["first"], json!("1"));
        assert_eq!(out[1]["total"], json!(5));
    }

    #[test]
    fn test_group_by_null_collapses_everything() {
        let out = run(
            messages(),
            &[doc!({"$group": {"_id": null, "n": {"$sum": 1}}})],
        )
        .unwrap();
        assert_eq!(out, vec![doc!({"_id": null, "n": 3})]);
    }

    #[test]
    fn test_project_inclusion_and_rename() {
        let out = run(
            messages(),
            &[doc!({"$project": {"_id": 0, "type": 1, "who": "$senderId"}})],
        )
        .unwrap();
        assert_eq!(out[0], doc!({"type": "REQUEST", "who": "a"}));
    }

    #[test]
    fn test_project_exclusion() {
        let out = run(messages(), &[doc!({"$project": {"tags": 0, "len": 0}})]).unwrap();
        assert_eq!(out[1], doc!({"_id": "2", "senderId": "b", "type": "RESPONSE"}));
    }

    #[test]
    fn test_unwind() {
        let out = run(messages(), &[doc!({"$unwind": "$tags"})]).unwrap();
        let tags: Vec<_> = out.iter().map(|d| d["tags"].clone()).collect();
        assert_eq!(tags, vec![json!("x"), json!("y"), json!("z")]);

        let preserved = run(
            messages(),
            &[doc!({"$unwind": {"path": "$tags", "preserveNullAndEmptyArrays": true}})],
        )
        .unwrap();
        assert_eq!(preserved.len(), 4);
    }

    #[test]
    fn test_unknown_stage_is_invalid() {
        let err = run(messages(), &[doc!({"$lookup": {}})]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));

        let err = run(messages(), &[doc!({"$skip": 1, "$limit": 1})]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }
}
