//! Native filter, update, sort and projection evaluation for in-memory documents.
//!
//! Filters use the same operator documents the MongoDB server understands, so a
//! repository behaves the same against either client for the supported subset:
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists $regex $options $not $all $size`
//! on fields (with dotted paths), `$and $or $nor` at the top level, and
//! implicit equality including array membership.

use bson::{Bson, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};
use std::{cmp::Ordering, collections::HashMap};

use docrepo_core::error::{RepositoryError, RepositoryResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64. Values of different kinds never
/// compare as ordered.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Binary(&'a [u8]),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Anything else; compared by BSON equality only.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Binary(binary) => Comparable::Binary(&binary.bytes),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's kind in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Binary(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
            Comparable::Other(_) => 9,
        }
    }

    /// Total order used for sorting: by kind first, then by value.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::Binary(a), Comparable::Binary(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path (`a.b.c`) inside a document.
pub(crate) fn lookup<'a>(document: &'a bson::Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn unsupported(operator: &str) -> RepositoryError {
    RepositoryError::InvalidDocument(format!("unsupported operator {}", operator))
}

fn expect_array<'a>(operator: &str, value: &'a Bson) -> RepositoryResult<&'a Vec<Bson>> {
    value
        .as_array()
        .ok_or_else(|| RepositoryError::InvalidDocument(format!("{} requires an array", operator)))
}

fn expect_document<'a>(operator: &str, value: &'a Bson) -> RepositoryResult<&'a bson::Document> {
    value
        .as_document()
        .ok_or_else(|| RepositoryError::InvalidDocument(format!("{} requires a document", operator)))
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(doc) => doc.keys().next().is_some_and(|key| key.starts_with('$')),
        _ => false,
    }
}

/// Evaluates native filter documents against stored documents.
pub(crate) struct FilterEvaluator<'a> {
    document: &'a bson::Document,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(document: &'a bson::Document) -> Self {
        Self { document }
    }

    /// Returns whether the document satisfies every clause of `filter`.
    pub fn matches(&self, filter: &bson::Document) -> RepositoryResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(expect_array(key, condition)?)?,
                "$or" => self.any(expect_array(key, condition)?)?,
                "$nor" => !self.any(expect_array(key, condition)?)?,
                operator if operator.starts_with('$') => return Err(unsupported(operator)),
                field => Self::matches_field(lookup(self.document, field), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn all(&self, clauses: &[Bson]) -> RepositoryResult<bool> {
        for clause in clauses {
            if !self.matches(expect_document("$and", clause)?)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, clauses: &[Bson]) -> RepositoryResult<bool> {
        for clause in clauses {
            if self.matches(expect_document("$or", clause)?)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn matches_field(value: Option<&Bson>, condition: &Bson) -> RepositoryResult<bool> {
        let operators = match condition {
            Bson::Document(operators) if is_operator_document(condition) => operators,
            literal => return Ok(Self::equals(value, literal)),
        };

        for (operator, operand) in operators {
            let matched = match operator.as_str() {
                "$eq" => Self::equals(value, operand),
                "$ne" => !Self::equals(value, operand),
                "$gt" => Self::compare(value, operand, |o| o == Ordering::Greater),
                "$gte" => Self::compare(value, operand, |o| o != Ordering::Less),
                "$lt" => Self::compare(value, operand, |o| o == Ordering::Less),
                "$lte" => Self::compare(value, operand, |o| o != Ordering::Greater),
                "$in" => expect_array(operator, operand)?
                    .iter()
                    .any(|candidate| Self::equals(value, candidate)),
                "$nin" => !expect_array(operator, operand)?
                    .iter()
                    .any(|candidate| Self::equals(value, candidate)),
                "$exists" => value.is_some() == Self::truthy(operand),
                "$regex" => {
                    let pattern = operand.as_str().ok_or_else(|| {
                        RepositoryError::InvalidDocument("$regex requires a string".into())
                    })?;
                    let options = operators.get_str("$options").unwrap_or("");

                    Self::matches_regex(value, pattern, options)?
                }
                "$options" => true,
                "$not" => !Self::matches_field(value, operand)?,
                "$all" => match value {
                    Some(Bson::Array(items)) => expect_array(operator, operand)?
                        .iter()
                        .all(|wanted| items.iter().any(|item| Comparable::from(item) == Comparable::from(wanted))),
                    _ => false,
                },
                "$size" => match (value, operand) {
                    (Some(Bson::Array(items)), Bson::Int32(n)) => items.len() as i64 == *n as i64,
                    (Some(Bson::Array(items)), Bson::Int64(n)) => items.len() as i64 == *n,
                    _ => false,
                },
                other => return Err(unsupported(other)),
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Equality with the server's conventions: a missing field equals `null`
    /// and an array field equals any of its elements.
    fn equals(value: Option<&Bson>, target: &Bson) -> bool {
        let Some(value) = value else {
            return matches!(target, Bson::Null);
        };
        let target = Comparable::from(target);

        match value {
            Bson::Array(items) => {
                Comparable::from(value) == target
                    || items.iter().any(|item| Comparable::from(item) == target)
            }
            _ => Comparable::from(value) == target,
        }
    }

    fn compare(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let target = Comparable::from(target);
        let check = |item: &Bson| {
            Comparable::from(item)
                .partial_cmp(&target)
                .is_some_and(&accept)
        };

        match value {
            Some(Bson::Array(items)) => items.iter().any(check),
            Some(item) => check(item),
            None => false,
        }
    }

    fn matches_regex(value: Option<&Bson>, pattern: &str, options: &str) -> RepositoryResult<bool> {
        let regex = Self::compile(pattern, options)?;

        Ok(match value {
            Some(Bson::String(s)) => regex.is_match(s),
            Some(Bson::Array(items)) => items
                .iter()
                .any(|item| item.as_str().is_some_and(|s| regex.is_match(s))),
            _ => false,
        })
    }

    fn compile(pattern: &str, options: &str) -> RepositoryResult<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(options.contains('i'))
            .multi_line(options.contains('m'))
            .dot_matches_new_line(options.contains('s'))
            .ignore_whitespace(options.contains('x'))
            .build()
            .map_err(|e| RepositoryError::InvalidDocument(format!("invalid $regex: {}", e)))
    }

    fn truthy(value: &Bson) -> bool {
        match value {
            Bson::Boolean(b) => *b,
            Bson::Int32(n) => *n != 0,
            Bson::Int64(n) => *n != 0,
            Bson::Double(n) => *n != 0.0,
            Bson::Null => false,
            _ => true,
        }
    }
}

/// Orders documents according to a native sort specification (`{ field: 1 | -1 }`).
pub(crate) fn compare_by(sort: &bson::Document, a: &bson::Document, b: &bson::Document) -> Ordering {
    for (field, direction) in sort {
        let left = lookup(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
        let right = lookup(b, field).map(Comparable::from).unwrap_or(Comparable::Null);

        let descending = match direction {
            Bson::Int32(d) => *d < 0,
            Bson::Int64(d) => *d < 0,
            Bson::Double(d) => *d < 0.0,
            _ => false,
        };
        let ordering = if descending {
            right.sort_cmp(&left)
        } else {
            left.sort_cmp(&right)
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies a native projection (`{ field: 1 }` to include, `{ field: 0 }` to exclude).
pub(crate) fn project(document: bson::Document, projection: &bson::Document) -> bson::Document {
    let keep_id = projection
        .get("_id")
        .is_none_or(FilterEvaluator::truthy);
    let inclusive = projection
        .iter()
        .any(|(field, flag)| field != "_id" && FilterEvaluator::truthy(flag));

    if inclusive {
        document
            .into_iter()
            .filter(|(field, _)| {
                if field == "_id" {
                    keep_id
                } else {
                    projection.get(field).is_some_and(FilterEvaluator::truthy)
                }
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(field, _)| {
                if field == "_id" {
                    keep_id
                } else {
                    !projection.contains_key(field)
                }
            })
            .collect()
    }
}

/// Applies a native update to `document` in place.
///
/// Operator updates support `$set` and `$unset` (dotted paths included).
/// Any other document is a replacement that keeps the existing `_id`.
pub(crate) fn apply_update(document: &mut bson::Document, update: &bson::Document) -> RepositoryResult<()> {
    let is_operator = update.keys().next().is_some_and(|key| key.starts_with('$'));

    if !is_operator {
        if let Some(id) = update.get("_id") {
            if document.get("_id") != Some(id) {
                return Err(RepositoryError::InvalidDocument("the _id field is immutable".into()));
            }
        }

        let mut replacement = bson::Document::new();
        if let Some(id) = document.remove("_id") {
            replacement.insert("_id", id);
        }
        *document = replacement;
        for (key, value) in update {
            document.insert(key.clone(), value.clone());
        }

        return Ok(());
    }

    for (operator, fields) in update {
        let fields = expect_document(operator, fields)?;

        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    if path == "_id" && document.get("_id") != Some(value) {
                        return Err(RepositoryError::InvalidDocument("the _id field is immutable".into()));
                    }
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for (path, _) in fields {
                    unset_path(document, path);
                }
            }
            other => return Err(unsupported(other)),
        }
    }

    Ok(())
}

fn set_path(document: &mut bson::Document, path: &str, value: Bson) -> RepositoryResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, bson::Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(RepositoryError::InvalidDocument(format!(
                    "cannot create field {} inside a non-document value",
                    path,
                ))),
            }
        }
    }
}

fn unset_path(document: &mut bson::Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}
