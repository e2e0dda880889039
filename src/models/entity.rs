//! Base entity contract shared by every persisted model.
//!
//! Entities are plain serde structs. Their serialized field names double as
//! column names, which is what lets the generic repository and the stores
//! work over any entity without per-table code.

use jiff::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Column holding the creation timestamp.
pub const CREATED_AT: &str = "created_at";
/// Column holding the update timestamp.
pub const UPDATED_AT: &str = "updated_at";
/// Column holding the soft-delete timestamp.
pub const DELETED_AT: &str = "deleted_at";
/// Column holding the actor that soft-deleted the row.
pub const DELETED_BY: &str = "deleted_by";

/// Audit stamps carried by every entity.
///
/// Flattened into the entity when serialized, so the fields appear as
/// ordinary columns (`created_at`, `deleted_at`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: Timestamp,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
    #[serde(default)]
    pub deleted_by: Option<String>,
}

impl Audit {
    /// Fresh stamps with `created_at` set to now.
    pub fn new() -> Self {
        Self {
            created_at: Timestamp::now(),
            created_by: None,
            updated_at: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self::new()
    }
}

/// A persisted record with an identifier and audit stamps.
///
/// `COLLECTION` names the table (or in-memory collection) the entity lives
/// in and `KEY` names its primary key column.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Id: Serialize + Clone + Send + Sync + std::fmt::Debug;

    const COLLECTION: &'static str;
    const KEY: &'static str = "id";

    fn id(&self) -> &Self::Id;
    fn audit(&self) -> &Audit;
    fn audit_mut(&mut self) -> &mut Audit;

    fn is_deleted(&self) -> bool {
        self.audit().is_deleted()
    }
}

/// Implements [`Entity`] for a struct with an `id` field and an `audit: Audit`
/// field.
///
/// ```ignore
/// impl_entity!(User, Uuid, "users");
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($entity:ty, $id:ty, $collection:literal) => {
        impl $crate::models::Entity for $entity {
            type Id = $id;

            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &Self::Id {
                &self.id
            }

            fn audit(&self) -> &$crate::models::Audit {
                &self.audit
            }

            fn audit_mut(&mut self) -> &mut $crate::models::Audit {
                &mut self.audit
            }
        }
    };
}
