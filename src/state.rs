//! Application state for Axum web framework.
//!
//! Contains shared services and resources that are accessible
//! across all request handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::services::Services;
use crate::store::Store;

/// Application state containing all shared services and resources.
///
/// Cloning is cheap: the store sits behind an `Arc` and the token is a handle.
#[derive(Clone)]
pub struct AppState {
    /// All business logic services
    pub services: Services,
    /// Direct access to the backing store, for health checks
    pub store: Arc<dyn Store>,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates the state over a store.
    ///
    /// Every unit of work the services open is cancelled together with
    /// `shutdown`.
    pub fn new(store: Arc<dyn Store>, shutdown: CancellationToken) -> Self {
        let services = Services::new(store.clone(), shutdown.clone());
        Self {
            services,
            store,
            shutdown,
        }
    }
}
