//! User repository.
//!
//! Thin binding of the generic repository to the users table.

use uuid::Uuid;

use super::{DbContext, Paginate, Query, Repository};
use crate::error::AppResult;
use crate::models::User;
use crate::store::{Filter, Order};

/// User repository over a request-scoped [`DbContext`].
///
/// Cloning is cheap; clones share the unit of work.
#[derive(Clone)]
pub struct UserRepository {
    inner: Repository<User>,
}

impl UserRepository {
    pub fn new(context: DbContext) -> Self {
        Self {
            inner: Repository::new(context),
        }
    }

    /// Access to the generic operations.
    pub fn generic(&self) -> &Repository<User> {
        &self.inner
    }

    /// Creates a new user.
    pub async fn create(&self, user: User) -> AppResult<User> {
        self.inner.add(user).await
    }

    /// Finds a live user by their ID.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        self.inner.find(&id).await
    }

    /// Finds a live user by their email address.
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.inner
            .get_first(&Query::new().filter(Filter::eq("email", email)))
            .await
    }

    /// Lists users oldest first.
    ///
    /// # Arguments
    /// * `index` - Zero-based page index
    /// * `size` - Page size; zero or negative yields an empty page
    /// * `with_deleted` - Include soft-deleted users
    pub async fn list(&self, index: u32, size: i32, with_deleted: bool) -> AppResult<Paginate<User>> {
        let query = Query::new()
            .with_deleted(with_deleted)
            .order_by(Order::asc("created_at"))
            .order_by(Order::asc("id"))
            .as_no_tracking();
        self.inner.get_list(&query, index, size).await
    }

    pub async fn update(&self, user: User) -> AppResult<User> {
        self.inner.update(user).await
    }

    pub async fn delete(&self, user: User, permanent: bool) -> AppResult<User> {
        self.inner.delete(user, permanent).await
    }
}
