//! In-process transactional store.
//!
//! Collections are vectors of JSON records kept in insertion order. A commit
//! applies its changes to a copy of the data and swaps it in only when every
//! change succeeded, which gives all-or-nothing semantics.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde_json::{Number, Value};
use tokio::sync::RwLock;

use super::{
    Change, DeleteBehavior, Direction, FetchRequest, Filter, Order, Record, Schema, Store,
    StoreError, StoreResult, is_soft_deleted, key_string, record_key,
};

type Collections = HashMap<&'static str, Vec<Record>>;

static NULL: Value = Value::Null;

/// Store backed by process memory.
///
/// Cloning is cheap and clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
    schema: Arc<Schema>,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            schema: Arc::new(schema),
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("relationships", &self.schema.relationships().len())
            .finish()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn fetch(&self, request: &FetchRequest) -> StoreResult<Vec<Record>> {
        let collections = self.collections.read().await;
        let mut rows: Vec<Record> = collections
            .get(request.collection)
            .map(|rows| {
                rows.iter()
                    .filter(|record| is_visible(request, record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        sort_records(&mut rows, &request.order);

        if let Some(window) = request.window {
            let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
            let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);
            rows = rows.into_iter().skip(offset).take(limit).collect();
        }

        Ok(rows)
    }

    async fn count(&self, request: &FetchRequest) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        let total = collections
            .get(request.collection)
            .map(|rows| rows.iter().filter(|record| is_visible(request, record)).count())
            .unwrap_or(0);
        Ok(total as u64)
    }

    async fn commit(&self, changes: Vec<Change>) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        let mut staged = guard.clone();
        for change in &changes {
            apply_change(&self.schema, &mut staged, change)?;
        }
        *guard = staged;
        tracing::debug!(changes = changes.len(), "Memory store commit applied");
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn is_visible(request: &FetchRequest, record: &Record) -> bool {
    if !request.ignore_default_filter && is_soft_deleted(record) {
        return false;
    }
    request
        .filter
        .as_ref()
        .is_none_or(|filter| matches_filter(filter, record))
}

fn field<'a>(record: &'a Record, name: &str) -> &'a Value {
    record.get(name).unwrap_or(&NULL)
}

/// Orders two scalar JSON values of the same kind. RFC 3339 strings compare
/// as instants so that differing fractional precision sorts correctly.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => {
            match (a.parse::<Timestamp>(), b.parse::<Timestamp>()) {
                (Ok(x), Ok(y)) => Some(x.cmp(&y)),
                _ => Some(a.cmp(b)),
            }
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Integers compare exactly; floats only when either side is one.
fn compare_numbers(left: &Number, right: &Number) -> Option<Ordering> {
    let integer = |n: &Number| n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from));
    match (integer(left), integer(right)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

/// `None` when either side is null, matching SQL comparison semantics.
fn values_equal(left: &Value, right: &Value) -> Option<bool> {
    if left.is_null() || right.is_null() {
        return None;
    }
    Some(match compare_values(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    })
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub(crate) fn matches_filter(filter: &Filter, record: &Record) -> bool {
    evaluate(filter, record) == Some(true)
}

/// Three-valued evaluation: `None` is SQL's UNKNOWN, which NOT keeps and
/// which only a definite answer can outweigh inside AND and OR.
fn evaluate(filter: &Filter, record: &Record) -> Option<bool> {
    let ordered = |name: &str, value: &Value, accept: fn(Ordering) -> bool| {
        let current = field(record, name);
        if current.is_null() || value.is_null() {
            return None;
        }
        Some(compare_values(current, value).is_some_and(accept))
    };

    match filter {
        Filter::Eq(name, value) => values_equal(field(record, name), value),
        Filter::Ne(name, value) => values_equal(field(record, name), value).map(|eq| !eq),
        Filter::Gt(name, value) => ordered(name, value, Ordering::is_gt),
        Filter::Ge(name, value) => ordered(name, value, Ordering::is_ge),
        Filter::Lt(name, value) => ordered(name, value, Ordering::is_lt),
        Filter::Le(name, value) => ordered(name, value, Ordering::is_le),
        Filter::In(name, values) => {
            let current = field(record, name);
            any_of(values.iter().map(|value| values_equal(current, value)))
        }
        Filter::Contains(name, needle) => {
            text_of(field(record, name)).map(|text| text.contains(needle.as_str()))
        }
        Filter::IsNull(name) => Some(field(record, name).is_null()),
        Filter::IsNotNull(name) => Some(!field(record, name).is_null()),
        Filter::And(filters) => all_of(filters.iter().map(|f| evaluate(f, record))),
        Filter::Or(filters) => any_of(filters.iter().map(|f| evaluate(f, record))),
        Filter::Not(inner) => evaluate(inner, record).map(|matched| !matched),
    }
}

fn all_of(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut outcome = Some(true);
    for result in results {
        match result {
            Some(false) => return Some(false),
            None => outcome = None,
            Some(true) => {}
        }
    }
    outcome
}

fn any_of(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut outcome = Some(false);
    for result in results {
        match result {
            Some(true) => return Some(true),
            None => outcome = None,
            Some(false) => {}
        }
    }
    outcome
}

/// Stable sort; nulls sort as the largest value, as in PostgreSQL.
fn sort_records(rows: &mut [Record], order: &[Order]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for term in order {
            let left = field(a, &term.field);
            let right = field(b, &term.field);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
            };
            let ordering = match term.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn position_of(rows: &[Record], key: &str, value: &Value) -> Option<usize> {
    rows.iter()
        .position(|record| values_equal(field(record, key), value) == Some(true))
}

fn apply_change(schema: &Schema, collections: &mut Collections, change: &Change) -> StoreResult<()> {
    match change {
        Change::Insert {
            collection,
            key,
            record,
        } => {
            let value = record_key(collection, key, record)?;
            let rows = collections.entry(*collection).or_default();
            if position_of(rows, key, &value).is_some() {
                return Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    key: key_string(&value),
                });
            }
            rows.push(record.clone());
        }
        Change::Replace {
            collection,
            key,
            record,
        } => {
            let value = record_key(collection, key, record)?;
            let rows = collections.entry(*collection).or_default();
            let index = position_of(rows, key, &value).ok_or_else(|| StoreError::StaleRecord {
                collection: collection.to_string(),
                key: key_string(&value),
            })?;
            rows[index] = record.clone();
        }
        Change::Remove {
            collection,
            key,
            value,
        } => {
            let rows = collections.entry(*collection).or_default();
            let index = position_of(rows, key, value).ok_or_else(|| StoreError::StaleRecord {
                collection: collection.to_string(),
                key: key_string(value),
            })?;
            let removed = rows.remove(index);
            remove_dependents(schema, collections, collection, &removed)?;
        }
    }
    Ok(())
}

/// Store-side foreign key enforcement for a removed principal row.
fn remove_dependents(
    schema: &Schema,
    collections: &mut Collections,
    collection: &str,
    principal: &Record,
) -> StoreResult<()> {
    for relationship in schema.dependents_of(collection) {
        let principal_value = field(principal, relationship.principal_key);
        if principal_value.is_null() {
            continue;
        }
        let rows = collections.entry(relationship.dependent).or_default();
        let references = |record: &Record| {
            values_equal(field(record, relationship.foreign_key), principal_value) == Some(true)
        };
        if !rows.iter().any(references) {
            continue;
        }

        if relationship.owned || relationship.on_delete == DeleteBehavior::Cascade {
            let (removed, kept): (Vec<Record>, Vec<Record>) =
                rows.drain(..).partition(|record| references(record));
            *rows = kept;
            for row in &removed {
                remove_dependents(schema, collections, relationship.dependent, row)?;
            }
        } else if relationship.on_delete == DeleteBehavior::SetNull {
            for row in rows.iter_mut().filter(|record| references(record)) {
                row.insert(relationship.foreign_key.to_string(), Value::Null);
            }
        } else {
            return Err(StoreError::Referenced {
                collection: collection.to_string(),
                key: key_string(principal_value),
                dependent: relationship.dependent.to_string(),
            });
        }
    }
    Ok(())
}
