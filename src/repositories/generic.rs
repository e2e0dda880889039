//! Generic soft-delete-aware repository.

use std::marker::PhantomData;

use jiff::Timestamp;
use serde_json::Value;

use super::{DbContext, Paginate, Query};
use crate::error::{AppError, AppResult};
use crate::models::Entity;
use crate::store::{Change, Filter, Navigation, Record, StoreError, key_string, record_key};

fn to_record<E: Entity>(entity: &E) -> AppResult<Record> {
    match serde_json::to_value(entity).map_err(StoreError::from)? {
        Value::Object(record) => Ok(record),
        _ => Err(StoreError::malformed(E::COLLECTION, "entity did not serialize to an object").into()),
    }
}

fn from_record<E: Entity>(record: Record) -> AppResult<E> {
    Ok(serde_json::from_value(Value::Object(record)).map_err(StoreError::from)?)
}

fn from_records<E: Entity>(records: Vec<Record>) -> AppResult<Vec<E>> {
    records.into_iter().map(from_record).collect()
}

/// Data access for one entity type over a [`DbContext`].
///
/// Reads apply the standing `deleted_at IS NULL` filter unless the query
/// opts out with [`Query::with_deleted`]. Every write method stages its
/// changes and commits them once before returning.
pub struct Repository<E: Entity> {
    context: DbContext,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self::new(self.context.clone())
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(context: DbContext) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    pub fn context(&self) -> &DbContext {
        &self.context
    }

    fn navigation(&self, name: &str) -> AppResult<Navigation<'_>> {
        self.context
            .schema()
            .navigation(E::COLLECTION, name)
            .ok_or_else(|| AppError::UnknownNavigation {
                entity: E::COLLECTION.to_string(),
                navigation: name.to_string(),
            })
    }

    async fn load(&self, query: &Query<E>, window: Option<(u64, u64)>) -> AppResult<Vec<Record>> {
        let navigations = query
            .includes()
            .iter()
            .map(|name| self.navigation(name))
            .collect::<AppResult<Vec<_>>>()?;

        let mut request = query.request();
        if let Some((offset, limit)) = window {
            request = request.with_window(offset, limit);
        }
        let rows = self.context.fetch(&request).await?;

        for navigation in navigations {
            self.context
                .load_related(
                    navigation,
                    E::KEY,
                    &rows,
                    query.is_with_deleted(),
                    query.is_tracking(),
                )
                .await?;
        }
        if query.is_tracking() {
            self.context.track(E::COLLECTION, E::KEY, &rows).await?;
        }
        Ok(rows)
    }

    /// First matching entity, if any.
    pub async fn get_first(&self, query: &Query<E>) -> AppResult<Option<E>> {
        let rows = self.load(query, Some((0, 1))).await?;
        rows.into_iter().next().map(from_record::<E>).transpose()
    }

    /// The only matching entity, if any.
    ///
    /// # Errors
    /// `AppError::AmbiguousResult` when more than one row matches.
    pub async fn get_single(&self, query: &Query<E>) -> AppResult<Option<E>> {
        let mut rows = self.load(query, Some((0, 2))).await?;
        if rows.len() > 1 {
            return Err(AppError::AmbiguousResult {
                entity: E::COLLECTION.to_string(),
            });
        }
        rows.pop().map(from_record::<E>).transpose()
    }

    pub async fn any(&self, query: &Query<E>) -> AppResult<bool> {
        let request = query.request().with_window(0, 1);
        Ok(!self.context.fetch(&request).await?.is_empty())
    }

    pub async fn count(&self, query: &Query<E>) -> AppResult<u64> {
        self.context.count(&query.request()).await
    }

    /// One page of matching entities.
    ///
    /// The total count and the page of items come from two separate store
    /// reads. A zero or negative `size` yields an empty page without
    /// fetching items.
    pub async fn get_list(&self, query: &Query<E>, index: u32, size: i32) -> AppResult<Paginate<E>> {
        let count = self.count(query).await?;
        let page_size = u32::try_from(size).unwrap_or(0);
        let items = if page_size == 0 {
            Vec::new()
        } else {
            let offset = Paginate::<E>::offset(index, page_size);
            from_records(self.load(query, Some((offset, u64::from(page_size)))).await?)?
        };
        Ok(Paginate::new(items, index, size, count))
    }

    /// Entity by key, subject to the default visibility filter.
    pub async fn find(&self, id: &E::Id) -> AppResult<Option<E>> {
        let value = serde_json::to_value(id).map_err(StoreError::from)?;
        self.get_first(&Query::new().filter(Filter::Eq(E::KEY.to_string(), value)))
            .await
    }

    /// Entities reachable from `entity` through `navigation`.
    ///
    /// Uses the rows loaded by an earlier `include` when present, otherwise
    /// loads the navigation with the default visibility filter.
    pub async fn related<R: Entity>(&self, entity: &E, navigation: &str) -> AppResult<Vec<R>> {
        let resolved = self.navigation(navigation)?;
        if resolved.target() != R::COLLECTION {
            return Err(AppError::UnknownNavigation {
                entity: R::COLLECTION.to_string(),
                navigation: navigation.to_string(),
            });
        }

        let record = to_record(entity)?;
        let id = key_string(&record_key(E::COLLECTION, E::KEY, &record)?);
        if let Some(rows) = self
            .context
            .cached_navigation(E::COLLECTION, &id, resolved.name)
            .await
        {
            return from_records(rows);
        }

        self.context
            .load_related(resolved, E::KEY, std::slice::from_ref(&record), false, true)
            .await?;
        let rows = self
            .context
            .cached_navigation(E::COLLECTION, &id, resolved.name)
            .await
            .unwrap_or_default();
        from_records(rows)
    }

    pub async fn add(&self, entity: E) -> AppResult<E> {
        self.add_range(vec![entity]).await?.pop().ok_or_else(|| {
            AppError::from(anyhow::anyhow!("add returned no entity for {}", E::COLLECTION))
        })
    }

    /// Insert entities, stamping `created_at` (UTC) and `created_by`.
    pub async fn add_range(&self, entities: Vec<E>) -> AppResult<Vec<E>> {
        let added = self
            .context
            .staging(async {
                let mut added = Vec::with_capacity(entities.len());
                for mut entity in entities {
                    let audit = entity.audit_mut();
                    audit.created_at = Timestamp::now();
                    audit.created_by = self.context.actor().map(str::to_string);
                    self.context
                        .stage(Change::Insert {
                            collection: E::COLLECTION,
                            key: E::KEY,
                            record: to_record(&entity)?,
                        })
                        .await?;
                    added.push(entity);
                }
                Ok::<_, AppError>(added)
            })
            .await?;
        self.context.save_changes().await?;
        Ok(added)
    }

    pub async fn update(&self, entity: E) -> AppResult<E> {
        self.update_range(vec![entity]).await?.pop().ok_or_else(|| {
            AppError::from(anyhow::anyhow!("update returned no entity for {}", E::COLLECTION))
        })
    }

    /// Replace entities, stamping `updated_at` (UTC) and `updated_by`.
    pub async fn update_range(&self, entities: Vec<E>) -> AppResult<Vec<E>> {
        let updated = self
            .context
            .staging(async {
                let mut updated = Vec::with_capacity(entities.len());
                for mut entity in entities {
                    let audit = entity.audit_mut();
                    audit.updated_at = Some(Timestamp::now());
                    audit.updated_by = self.context.actor().map(str::to_string);
                    self.context
                        .stage(Change::Replace {
                            collection: E::COLLECTION,
                            key: E::KEY,
                            record: to_record(&entity)?,
                        })
                        .await?;
                    updated.push(entity);
                }
                Ok::<_, AppError>(updated)
            })
            .await?;
        self.context.save_changes().await?;
        Ok(updated)
    }

    pub async fn delete(&self, entity: E, permanent: bool) -> AppResult<E> {
        self.delete_range(vec![entity], permanent)
            .await?
            .pop()
            .ok_or_else(|| {
                AppError::from(anyhow::anyhow!("delete returned no entity for {}", E::COLLECTION))
            })
    }

    /// Soft or permanently delete entities and commit once.
    ///
    /// Soft deletes cascade through the schema's cascading navigations and
    /// share one deletion instant. The returned entities carry their stamps.
    ///
    /// # Errors
    /// `AppError::OneToOneDeleteConflict` when `E` is the dependent of a
    /// one-to-one relationship. Any error raised while staging leaves the
    /// context as it was before the call.
    pub async fn delete_range(&self, entities: Vec<E>, permanent: bool) -> AppResult<Vec<E>> {
        if !permanent {
            self.context.ensure_soft_deletable(E::COLLECTION)?;
        }
        let deleted = self
            .context
            .staging(async {
                let mut deleted = Vec::with_capacity(entities.len());
                if permanent {
                    for entity in entities {
                        self.context
                            .permanent_delete(E::COLLECTION, E::KEY, &to_record(&entity)?)
                            .await?;
                        deleted.push(entity);
                    }
                } else {
                    let deleted_at = Timestamp::now();
                    for entity in entities {
                        let record = self
                            .context
                            .soft_delete(E::COLLECTION, E::KEY, to_record(&entity)?, deleted_at)
                            .await?;
                        deleted.push(from_record(record)?);
                    }
                }
                Ok::<_, AppError>(deleted)
            })
            .await?;
        self.context.save_changes().await?;
        Ok(deleted)
    }
}
