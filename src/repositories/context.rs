//! Request-scoped unit of work.
//!
//! A [`DbContext`] pairs a shared [`Store`] with per-request state: an
//! identity map of tracked rows, a cache of loaded navigations and the list
//! of changes staged for the next commit. Every store call is raced against
//! the context's cancellation token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult, DatabaseErrorConverter};
use crate::store::{
    Change, FetchRequest, Filter, Navigation, Record, Schema, Store, StoreResult, key_string,
    record_key,
};

type EntryKey = (&'static str, String);
type NavigationKey = (&'static str, String, &'static str);

#[derive(Default)]
struct Session {
    entries: HashMap<EntryKey, Record>,
    navigations: HashMap<NavigationKey, Vec<Record>>,
    pending: Vec<Change>,
}

/// Unit of work bound to one inbound request.
///
/// Clones share the same session, so repositories for different entities
/// created from one context stage into the same commit.
#[derive(Clone)]
pub struct DbContext {
    store: Arc<dyn Store>,
    session: Arc<Mutex<Session>>,
    actor: Option<String>,
    cancellation: CancellationToken,
}

impl DbContext {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            session: Arc::new(Mutex::new(Session::default())),
            actor: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Identity recorded in `created_by`, `updated_by` and `deleted_by`.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    async fn guarded<T>(
        &self,
        operation: &str,
        future: impl Future<Output = StoreResult<T>>,
    ) -> AppResult<T> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(AppError::cancelled(operation)),
            result = future => result.map_err(|error| {
                DatabaseErrorConverter::convert_store_error(error, operation)
            }),
        }
    }

    pub(crate) async fn fetch(&self, request: &FetchRequest) -> AppResult<Vec<Record>> {
        let operation = format!("fetch {}", request.collection);
        self.guarded(&operation, self.store.fetch(request)).await
    }

    pub(crate) async fn count(&self, request: &FetchRequest) -> AppResult<u64> {
        let operation = format!("count {}", request.collection);
        self.guarded(&operation, self.store.count(request)).await
    }

    /// Register rows in the identity map, replacing earlier copies.
    pub(crate) async fn track(
        &self,
        collection: &'static str,
        key: &'static str,
        records: &[Record],
    ) -> AppResult<()> {
        let mut session = self.session.lock().await;
        for record in records {
            let id = key_string(&record_key(collection, key, record)?);
            session.entries.insert((collection, id), record.clone());
        }
        Ok(())
    }

    /// Register a row unless the identity map already holds it.
    pub(crate) async fn attach(&self, collection: &'static str, id: String, record: Record) {
        let mut session = self.session.lock().await;
        session.entries.entry((collection, id)).or_insert(record);
    }

    /// The identity map's copy of a row.
    pub(crate) async fn entry(&self, collection: &'static str, id: &str) -> Option<Record> {
        let session = self.session.lock().await;
        session.entries.get(&(collection, id.to_string())).cloned()
    }

    /// Stage a change for the next commit, keeping the identity map in step.
    pub(crate) async fn stage(&self, change: Change) -> AppResult<()> {
        let mut session = self.session.lock().await;
        match &change {
            Change::Insert {
                collection,
                key,
                record,
            }
            | Change::Replace {
                collection,
                key,
                record,
            } => {
                let id = key_string(&record_key(collection, key, record)?);
                session.entries.insert((*collection, id), record.clone());
            }
            Change::Remove {
                collection, value, ..
            } => {
                session.entries.remove(&(*collection, key_string(value)));
            }
        }
        session.pending.push(change);
        Ok(())
    }

    /// Run a multi-step staging walk as one step: when it fails, the staged
    /// changes and identity map entries it produced are discarded, so a later
    /// commit never sees half of it.
    pub(crate) async fn staging<T>(&self, work: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        let (pending, entries) = {
            let session = self.session.lock().await;
            (session.pending.len(), session.entries.clone())
        };
        let result = work.await;
        if result.is_err() {
            let mut session = self.session.lock().await;
            let discarded = session.pending.len().saturating_sub(pending);
            session.pending.truncate(pending);
            session.entries = entries;
            tracing::debug!(discarded, "Staging failed, session rolled back");
        }
        result
    }

    pub async fn has_pending_changes(&self) -> bool {
        !self.session.lock().await.pending.is_empty()
    }

    /// Commit every staged change in one store transaction.
    ///
    /// Returns the number of changes written. The pending list is cleared
    /// whether or not the commit succeeds.
    pub async fn save_changes(&self) -> AppResult<usize> {
        let pending = std::mem::take(&mut self.session.lock().await.pending);
        if pending.is_empty() {
            return Ok(0);
        }
        let total = pending.len();
        self.guarded("commit", self.store.commit(pending)).await?;
        tracing::debug!(changes = total, backend = self.store.backend(), "Saved changes");
        Ok(total)
    }

    pub(crate) async fn cached_navigation(
        &self,
        collection: &'static str,
        id: &str,
        navigation: &'static str,
    ) -> Option<Vec<Record>> {
        let session = self.session.lock().await;
        session
            .navigations
            .get(&(collection, id.to_string(), navigation))
            .cloned()
    }

    pub(crate) async fn cache_navigation(
        &self,
        collection: &'static str,
        id: String,
        navigation: &'static str,
        records: Vec<Record>,
    ) {
        let mut session = self.session.lock().await;
        session.navigations.insert((collection, id, navigation), records);
    }

    /// Load one level of `navigation` for every source row in a single query
    /// and cache the related rows per source.
    pub(crate) async fn load_related(
        &self,
        navigation: Navigation<'_>,
        source_key: &'static str,
        sources: &[Record],
        with_deleted: bool,
        track: bool,
    ) -> AppResult<()> {
        let source_column = navigation.source_column();
        let target_column = navigation.target_column();

        let mut values: Vec<Value> = Vec::new();
        for source in sources {
            match source.get(source_column) {
                Some(value) if !value.is_null() && !values.contains(value) => {
                    values.push(value.clone());
                }
                _ => {}
            }
        }

        let related = if values.is_empty() {
            Vec::new()
        } else {
            let request = FetchRequest::new(navigation.target(), navigation.target_key())
                .with_filter(Filter::In(target_column.to_string(), values))
                .ignoring_default_filter(with_deleted);
            self.fetch(&request).await?
        };
        if track {
            self.track(navigation.target(), navigation.target_key(), &related)
                .await?;
        }

        for source in sources {
            let id = key_string(&record_key(navigation.source(), source_key, source)?);
            let matched = match source.get(source_column).filter(|v| !v.is_null()) {
                Some(value) => {
                    let wanted = key_string(value);
                    related
                        .iter()
                        .filter(|row| {
                            row.get(target_column)
                                .is_some_and(|v| !v.is_null() && key_string(v) == wanted)
                        })
                        .cloned()
                        .collect()
                }
                None => Vec::new(),
            };
            self.cache_navigation(navigation.source(), id, navigation.name, matched)
                .await;
        }

        tracing::trace!(
            navigation = navigation.name,
            sources = sources.len(),
            related = related.len(),
            "Loaded navigation"
        );
        Ok(())
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("backend", &self.store.backend())
            .field("actor", &self.actor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Relationship};
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn context() -> DbContext {
        let schema = Schema::new().with(
            Relationship::one_to_many("authors", "books", "author_id")
                .navigation("books")
                .inverse("author"),
        );
        DbContext::new(Arc::new(MemoryStore::new(schema)))
    }

    #[tokio::test]
    async fn test_save_changes_commits_and_clears_pending() {
        let ctx = context();
        ctx.stage(Change::Insert {
            collection: "authors",
            key: "id",
            record: record(json!({"id": 1})),
        })
        .await
        .unwrap();
        assert!(ctx.has_pending_changes().await);

        assert_eq!(ctx.save_changes().await.unwrap(), 1);
        assert!(!ctx.has_pending_changes().await);
        assert_eq!(ctx.save_changes().await.unwrap(), 0);

        let rows = ctx.fetch(&FetchRequest::new("authors", "id")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_drops_pending() {
        let ctx = context();
        ctx.stage(Change::Replace {
            collection: "authors",
            key: "id",
            record: record(json!({"id": 9})),
        })
        .await
        .unwrap();

        let result = ctx.save_changes().await;
        assert!(matches!(result, Err(AppError::StaleRecord { .. })));
        assert!(!ctx.has_pending_changes().await);
        // the identity map keeps the in-memory mutation
        assert!(ctx.entry("authors", "9").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_staging_restores_session() {
        let ctx = context();
        ctx.stage(Change::Insert {
            collection: "authors",
            key: "id",
            record: record(json!({"id": 1})),
        })
        .await
        .unwrap();

        let result: AppResult<()> = ctx
            .staging(async {
                ctx.stage(Change::Insert {
                    collection: "authors",
                    key: "id",
                    record: record(json!({"id": 2})),
                })
                .await?;
                Err::<(), _>(AppError::cancelled("walk"))
            })
            .await;
        assert!(matches!(result, Err(AppError::Cancelled { .. })));
        assert!(ctx.entry("authors", "1").await.is_some());
        assert!(ctx.entry("authors", "2").await.is_none());

        assert_eq!(ctx.save_changes().await.unwrap(), 1);
        let rows = ctx.fetch(&FetchRequest::new("authors", "id")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_context_rejects_store_calls() {
        let token = CancellationToken::new();
        let ctx = context().with_cancellation(token.clone());
        token.cancel();

        let result = ctx.fetch(&FetchRequest::new("authors", "id")).await;
        assert!(matches!(result, Err(AppError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_load_related_batches_and_groups() {
        let ctx = context();
        for change in [
            Change::Insert {
                collection: "authors",
                key: "id",
                record: record(json!({"id": 1})),
            },
            Change::Insert {
                collection: "authors",
                key: "id",
                record: record(json!({"id": 2})),
            },
            Change::Insert {
                collection: "books",
                key: "id",
                record: record(json!({"id": 10, "author_id": 1})),
            },
            Change::Insert {
                collection: "books",
                key: "id",
                record: record(json!({"id": 11, "author_id": 1})),
            },
        ] {
            ctx.stage(change).await.unwrap();
        }
        ctx.save_changes().await.unwrap();

        let authors = ctx.fetch(&FetchRequest::new("authors", "id")).await.unwrap();
        let navigation = ctx.schema().navigation("authors", "books").unwrap();
        ctx.load_related(navigation, "id", &authors, false, true)
            .await
            .unwrap();

        let first = ctx.cached_navigation("authors", "1", "books").await.unwrap();
        let second = ctx.cached_navigation("authors", "2", "books").await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert!(ctx.entry("books", "10").await.is_some());
    }
}
