//! Repository layer for data access operations.
//!
//! [`Repository`] is generic over any [`Entity`](crate::models::Entity) and
//! works through a request-scoped [`DbContext`]; entity repositories such as
//! [`UserRepository`] add domain-specific queries on top.

mod cascade;
mod context;
mod generic;
mod paginate;
mod query;
mod user_repo;

pub use context::DbContext;
pub use generic::Repository;
pub use paginate::Paginate;
pub use query::Query;
pub use user_repo::UserRepository;

/// Aggregates the repositories of one unit of work.
///
/// All repositories share the same [`DbContext`], so they see the same
/// tracked rows and commit through the same store.
#[derive(Clone)]
pub struct Repositories {
    pub context: DbContext,
    pub users: UserRepository,
}

impl Repositories {
    /// Creates every repository over `context`.
    pub fn new(context: DbContext) -> Self {
        Self {
            users: UserRepository::new(context.clone()),
            context,
        }
    }
}
