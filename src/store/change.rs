//! Staged writes submitted to a store in one atomic commit.

use serde_json::Value;

use super::Record;

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert a new row
    Insert {
        collection: &'static str,
        key: &'static str,
        record: Record,
    },
    /// Overwrite an existing row matched by key
    Replace {
        collection: &'static str,
        key: &'static str,
        record: Record,
    },
    /// Remove the row matched by key
    Remove {
        collection: &'static str,
        key: &'static str,
        value: Value,
    },
}

impl Change {
    pub fn collection(&self) -> &'static str {
        match self {
            Change::Insert { collection, .. }
            | Change::Replace { collection, .. }
            | Change::Remove { collection, .. } => *collection,
        }
    }

    /// The key value this change targets, if present.
    pub fn key_value(&self) -> Option<&Value> {
        match self {
            Change::Insert { key, record, .. } | Change::Replace { key, record, .. } => record.get(*key),
            Change::Remove { value, .. } => Some(value),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::Insert { .. } => "insert",
            Change::Replace { .. } => "replace",
            Change::Remove { .. } => "remove",
        }
    }
}
