//! Service layer for business logic operations.
//!
//! Services encapsulate business logic and open one unit of work per call.

mod user_service;

pub use user_service::{DEFAULT_PAGE_INDEX, DEFAULT_PAGE_SIZE, UserService};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::store::Store;

/// Aggregates all services for convenient access.
///
/// This struct is designed to be used as Axum application state.
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
}

impl Services {
    /// Creates every service over the shared store.
    ///
    /// # Arguments
    /// * `store` - The backing store
    /// * `shutdown` - Root token; each unit of work runs on a child of it
    pub fn new(store: Arc<dyn Store>, shutdown: CancellationToken) -> Self {
        Self {
            users: UserService::new(store, shutdown),
        }
    }
}
