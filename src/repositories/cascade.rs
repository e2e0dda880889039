//! Cascading soft delete.
//!
//! Soft-deleting a row stamps `deleted_at`/`deleted_by` and stages a replace.
//! The walk then follows every cascading navigation declared by the schema
//! and stamps the live dependents the same way. Rows are always resolved
//! through the identity map, so a row stamped earlier in the walk is seen as
//! deleted and the walk terminates on cyclic graphs.

use jiff::Timestamp;
use serde_json::Value;

use super::DbContext;
use crate::error::{AppError, AppResult};
use crate::models::{DELETED_AT, DELETED_BY};
use crate::store::{
    Change, FetchRequest, Filter, Record, is_soft_deleted, key_string, record_key,
};

impl DbContext {
    /// Refuse to soft delete rows of a collection that is the dependent side
    /// of a one-to-one relationship: the stamped row would keep occupying the
    /// unique foreign key slot.
    pub(crate) fn ensure_soft_deletable(&self, collection: &'static str) -> AppResult<()> {
        match self.schema().one_to_one_dependencies(collection).next() {
            Some(relationship) => Err(AppError::OneToOneDeleteConflict {
                entity: collection.to_string(),
                relationship: relationship.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Soft delete `record` and its cascading dependents, staging a replace
    /// for every row stamped. Returns the root row as stamped.
    ///
    /// Callers check [`Self::ensure_soft_deletable`] for the root collection
    /// first and run the walk under [`Self::staging`].
    pub(crate) async fn soft_delete(
        &self,
        collection: &'static str,
        key: &'static str,
        record: Record,
        deleted_at: Timestamp,
    ) -> AppResult<Record> {
        let root = key_string(&record_key(collection, key, &record)?);
        match self.entry(collection, &root).await {
            Some(tracked) if is_soft_deleted(&tracked) => {}
            _ => self.track(collection, key, std::slice::from_ref(&record)).await?,
        }

        let stamp = Value::String(deleted_at.to_string());
        let actor = self.actor().map_or(Value::Null, |a| Value::String(a.to_string()));
        let mut stack = vec![(collection, key, root.clone())];
        let mut stamped = 0usize;

        while let Some((collection, key, id)) = stack.pop() {
            let Some(mut row) = self.entry(collection, &id).await else {
                continue;
            };
            if is_soft_deleted(&row) {
                continue;
            }

            row.insert(DELETED_AT.to_string(), stamp.clone());
            row.insert(DELETED_BY.to_string(), actor.clone());
            self.stage(Change::Replace {
                collection,
                key,
                record: row.clone(),
            })
            .await?;
            stamped += 1;

            let navigations: Vec<_> = self.schema().cascading_navigations(collection).collect();
            for navigation in navigations {
                let related = match self.cached_navigation(collection, &id, navigation.name).await {
                    Some(rows) => rows,
                    None => {
                        let Some(value) = row
                            .get(navigation.source_column())
                            .filter(|value| !value.is_null())
                        else {
                            continue;
                        };
                        // the default filter is bypassed, so visibility is
                        // applied by hand
                        let request =
                            FetchRequest::new(navigation.target(), navigation.target_key())
                                .ignoring_default_filter(true)
                                .with_filter(Filter::is_null(DELETED_AT))
                                .with_filter(Filter::Eq(
                                    navigation.target_column().to_string(),
                                    value.clone(),
                                ));
                        let rows = self.fetch(&request).await?;
                        self.cache_navigation(collection, id.clone(), navigation.name, rows.clone())
                            .await;
                        rows
                    }
                };

                for related_row in related {
                    let related_id = key_string(&record_key(
                        navigation.target(),
                        navigation.target_key(),
                        &related_row,
                    )?);
                    self.attach(navigation.target(), related_id.clone(), related_row)
                        .await;
                    stack.push((navigation.target(), navigation.target_key(), related_id));
                }
            }
        }

        tracing::debug!(collection, id = %root, stamped, "Soft delete staged");

        self.entry(collection, &root)
            .await
            .ok_or_else(|| AppError::not_found(collection, key, &root))
    }

    /// Stage removal of the row; dependents are handled by the store's
    /// foreign key configuration.
    pub(crate) async fn permanent_delete(
        &self,
        collection: &'static str,
        key: &'static str,
        record: &Record,
    ) -> AppResult<()> {
        let value = record_key(collection, key, record)?;
        self.stage(Change::Remove {
            collection,
            key,
            value,
        })
        .await
    }
}
