//! Storage backends behind the generic repository.
//!
//! A [`Store`] is a transactional collection store: it answers filtered,
//! ordered, windowed reads, applies a batch of staged changes atomically and
//! exposes the relationship [`Schema`] of the collections it serves.
//!
//! Every collection carries a standing visibility filter
//! (`deleted_at IS NULL`); a [`FetchRequest`] opts out of it explicitly.

mod change;
mod error;
mod memory;
mod postgres;
mod query;
mod schema;

pub use change::Change;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::{Direction, FetchRequest, Filter, Order, Window};
pub use schema::{Cardinality, DeleteBehavior, Navigation, NavigationSide, Relationship, Schema};

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A row as a JSON object keyed by column name.
pub type Record = Map<String, Value>;

/// Transactional storage backend.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    fn schema(&self) -> &Schema;

    async fn fetch(&self, request: &FetchRequest) -> StoreResult<Vec<Record>>;

    /// Number of rows matching the request's filters; window and order are ignored.
    async fn count(&self, request: &FetchRequest) -> StoreResult<u64>;

    /// Apply every change or none of them.
    async fn commit(&self, changes: Vec<Change>) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Canonical identity of a key value, usable as a map key.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read the key column of a record.
pub fn record_key(collection: &str, key: &str, record: &Record) -> StoreResult<Value> {
    match record.get(key) {
        Some(Value::Null) | None => Err(StoreError::malformed(
            collection,
            format!("missing key column '{}'", key),
        )),
        Some(value) => Ok(value.clone()),
    }
}

/// Whether the record carries a soft-delete stamp.
pub fn is_soft_deleted(record: &Record) -> bool {
    record
        .get(crate::models::DELETED_AT)
        .is_some_and(|value| !value.is_null())
}
