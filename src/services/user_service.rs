//! User service for business logic operations.
//!
//! Every call runs in its own unit of work: a fresh [`DbContext`] over the
//! shared store, cancelled when the server shuts down.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewUser, UpdateUser, User};
use crate::repositories::{DbContext, Paginate, Query, Repositories};
use crate::store::{Filter, Store};

/// Page used by the user listing when the caller gives none.
pub const DEFAULT_PAGE_INDEX: u32 = 0;
pub const DEFAULT_PAGE_SIZE: i32 = 5;

/// User service for handling user-related business logic.
///
/// Cloning is cheap: the store is shared behind an `Arc` and the token is a
/// handle.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    shutdown: CancellationToken,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, shutdown: CancellationToken) -> Self {
        Self { store, shutdown }
    }

    fn repositories(&self) -> Repositories {
        Repositories::new(
            DbContext::new(self.store.clone()).with_cancellation(self.shutdown.child_token()),
        )
    }

    /// Creates a new user with a generated id.
    pub async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let user = self.repositories().users.create(new_user.into_user()).await?;
        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Lists users, soft-deleted ones included.
    ///
    /// # Arguments
    /// * `index` - Zero-based page index
    /// * `size` - Page size
    pub async fn list_users(&self, index: u32, size: i32) -> AppResult<Paginate<User>> {
        self.repositories().users.list(index, size, true).await
    }

    /// Gets a live user by their ID.
    ///
    /// # Returns
    /// The user if found, or `NotFound` error
    pub async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.repositories()
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("user", "id", id))
    }

    /// Applies a partial update to a live user.
    pub async fn update_user(&self, id: Uuid, update: UpdateUser) -> AppResult<User> {
        let repos = self.repositories();
        let mut user = repos
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("user", "id", id))?;
        update.apply_to(&mut user);
        repos.users.update(user).await
    }

    /// Deletes a user.
    ///
    /// A soft delete only sees live users; a permanent delete also removes
    /// users that were soft-deleted before.
    pub async fn delete_user(&self, id: Uuid, permanent: bool) -> AppResult<User> {
        let repos = self.repositories();
        let query = Query::new()
            .filter(Filter::eq("id", id.to_string()))
            .with_deleted(permanent);
        let user = repos
            .users
            .generic()
            .get_first(&query)
            .await?
            .ok_or_else(|| AppError::not_found("user", "id", id))?;
        let user = repos.users.delete(user, permanent).await?;
        tracing::info!(user_id = %id, permanent, "User deleted");
        Ok(user)
    }
}
