//! Composable query description for one entity collection.

use std::marker::PhantomData;

use crate::models::Entity;
use crate::store::{FetchRequest, Filter, Order};

/// A query over the collection of `E`.
///
/// Steps compose in a fixed order regardless of the order the builder
/// methods are called in: filter, include, tracking, deletion visibility,
/// ordering.
///
/// ```ignore
/// let query = Query::<User>::new()
///     .filter(Filter::contains("email", "@example.com"))
///     .order_by(Order::desc("created_at"))
///     .with_deleted(true);
/// ```
pub struct Query<E: Entity> {
    filter: Option<Filter>,
    includes: Vec<String>,
    order: Vec<Order>,
    with_deleted: bool,
    track_changes: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Query<E> {
    pub fn new() -> Self {
        Self {
            filter: None,
            includes: Vec::new(),
            order: Vec::new(),
            with_deleted: false,
            track_changes: true,
            _entity: PhantomData,
        }
    }

    /// Add a predicate; repeated calls are combined with AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Eagerly load one level of the named navigation.
    pub fn include(mut self, navigation: impl Into<String>) -> Self {
        self.includes.push(navigation.into());
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// Also return soft-deleted rows.
    pub fn with_deleted(mut self, with_deleted: bool) -> Self {
        self.with_deleted = with_deleted;
        self
    }

    pub fn track_changes(mut self, track: bool) -> Self {
        self.track_changes = track;
        self
    }

    pub fn as_no_tracking(self) -> Self {
        self.track_changes(false)
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn is_with_deleted(&self) -> bool {
        self.with_deleted
    }

    pub fn is_tracking(&self) -> bool {
        self.track_changes
    }

    /// The store request for this query, without a window.
    pub(crate) fn request(&self) -> FetchRequest {
        let mut request = FetchRequest::new(E::COLLECTION, E::KEY);
        if let Some(filter) = &self.filter {
            request = request.with_filter(filter.clone());
        }
        request
            .ignoring_default_filter(self.with_deleted)
            .with_order(self.order.clone())
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            includes: self.includes.clone(),
            order: self.order.clone(),
            with_deleted: self.with_deleted,
            track_changes: self.track_changes,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("collection", &E::COLLECTION)
            .field("filter", &self.filter)
            .field("includes", &self.includes)
            .field("order", &self.order)
            .field("with_deleted", &self.with_deleted)
            .field("track_changes", &self.track_changes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    #[test]
    fn test_defaults_hide_deleted_and_track() {
        let query = Query::<User>::new();
        let request = query.request();

        assert_eq!(request.collection, "users");
        assert!(!request.ignore_default_filter);
        assert!(request.filter.is_none());
        assert!(request.window.is_none());
        assert!(query.is_tracking());
    }

    #[test]
    fn test_builder_composes_request() {
        let query = Query::<User>::new()
            .order_by(Order::asc("name"))
            .filter(Filter::eq("name", "Ada"))
            .filter(Filter::contains("email", "@x"))
            .with_deleted(true)
            .as_no_tracking();
        let request = query.request();

        assert!(request.ignore_default_filter);
        assert_eq!(request.order, vec![Order::asc("name")]);
        assert_eq!(
            request.filter,
            Some(Filter::eq("name", "Ada").and(Filter::contains("email", "@x")))
        );
        assert!(!query.is_tracking());
    }
}
